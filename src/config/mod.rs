use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Result, RpaError};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub portals: PortalConfig,
    pub storage: StorageConfig,
    pub certificate: CertificateConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: String,
    pub rotate_user_agent: bool,
    pub disable_images: bool,
    pub page_load_timeout_ms: u64,
    pub settle_ms: u64,  // after the page body is present
    pub typing_pause_ms: u64,  // between filling the field and submitting
    pub result_wait_ms: u64,  // after submitting the search
    pub debug_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortalConfig {
    pub dni_url: String,
    pub uni_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub tracking_file: PathBuf,
    pub pdf_dir: PathBuf,
    pub extra_pdf_dirs: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CertificateConfig {
    pub university: String,
    pub city: String,
    pub signer: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ValidationConfig {
    pub institutional_domain: String,
    pub name_match_threshold: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            browser: BrowserConfig {
                headless: true,
                chrome_executable: None,
                window_width: 1920,
                window_height: 1080,
                user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
                rotate_user_agent: false,
                disable_images: true,
                page_load_timeout_ms: 15_000,
                settle_ms: 2_000,
                typing_pause_ms: 1_000,
                result_wait_ms: 5_000,
                debug_dir: None,
            },
            portals: PortalConfig {
                dni_url: "https://eldni.com/pe/buscar-datos-por-dni".to_string(),
                uni_url: "https://dirce.uni.edu.pe/alumnos/busqueda".to_string(),
            },
            storage: StorageConfig {
                tracking_file: PathBuf::from("seguimiento.xlsx"),
                pdf_dir: PathBuf::from("autoridad_entrada"),
                extra_pdf_dirs: vec![PathBuf::from("PDFs"), PathBuf::from("constancias")],
            },
            certificate: CertificateConfig {
                university: "UNIVERSIDAD NACIONAL DE INGENIERÍA".to_string(),
                city: "Lima".to_string(),
                signer: "Coordinador Académico".to_string(),
            },
            validation: ValidationConfig {
                institutional_domain: "@uni.pe".to_string(),
                name_match_threshold: 60.0,
            },
        }
    }
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_millis(self.page_load_timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn typing_pause(&self) -> Duration {
        Duration::from_millis(self.typing_pause_ms)
    }

    pub fn result_wait(&self) -> Duration {
        Duration::from_millis(self.result_wait_ms)
    }
}

#[async_trait::async_trait]
pub trait ConfigManager {
    async fn load_config(&self) -> Result<Config>;
    async fn save_config(&self, config: &Config) -> Result<()>;
    fn validate_config(&self, config: &Config) -> Result<()>;
}

pub struct FileConfigManager {
    config_path: PathBuf,
}

impl FileConfigManager {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// Writes the default configuration. An existing file is only replaced
    /// when `force` is set.
    pub async fn init_config(&self, force: bool) -> Result<()> {
        if self.config_path.exists() && !force {
            return Err(RpaError::ConfigError(format!(
                "{} already exists, pass --force to overwrite",
                self.config_path.display()
            ))
            .into());
        }
        self.create_default_config().await
    }
}

#[async_trait::async_trait]
impl ConfigManager for FileConfigManager {
    async fn load_config(&self) -> Result<Config> {
        info!("Loading configuration from {:?}", self.config_path);

        // check if config file exists, create default if not
        if !self.config_path.exists() {
            warn!("Configuration file not found, creating default config at {:?}", self.config_path);
            self.create_default_config().await?;
        }

        let config_content = fs::read_to_string(&self.config_path)
            .map_err(|e| RpaError::ConfigError(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&config_content)
            .map_err(|e| RpaError::ConfigError(format!("Failed to parse TOML config: {}", e)))?;

        self.validate_config(&config)?;

        info!("Configuration loaded successfully");
        Ok(config)
    }

    fn validate_config(&self, config: &Config) -> Result<()> {
        debug!("Validating configuration");

        if config.server.port < 1024 {
            return Err(RpaError::ConfigError("port must be between 1024 and 65535".to_string()).into());
        }
        if config.server.host.trim().is_empty() {
            return Err(RpaError::ConfigError("host cannot be empty".to_string()).into());
        }

        for (name, url) in [("dni_url", &config.portals.dni_url), ("uni_url", &config.portals.uni_url)] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(RpaError::ConfigError(format!("{} must start with http:// or https://", name)).into());
            }
        }

        let browser = &config.browser;
        if browser.window_width == 0 || browser.window_height == 0 {
            return Err(RpaError::ConfigError("window size must be non-zero".to_string()).into());
        }
        for (name, ms) in [
            ("page_load_timeout_ms", browser.page_load_timeout_ms),
            ("settle_ms", browser.settle_ms),
            ("typing_pause_ms", browser.typing_pause_ms),
            ("result_wait_ms", browser.result_wait_ms),
        ] {
            if ms > 60_000 {
                return Err(RpaError::ConfigError(format!("{} cannot exceed 60 seconds", name)).into());
            }
        }
        if browser.user_agent.trim().is_empty() {
            return Err(RpaError::ConfigError("user_agent cannot be empty".to_string()).into());
        }

        if config.storage.tracking_file.as_os_str().is_empty() {
            return Err(RpaError::ConfigError("tracking_file cannot be empty".to_string()).into());
        }
        if config.storage.pdf_dir.as_os_str().is_empty() {
            return Err(RpaError::ConfigError("pdf_dir cannot be empty".to_string()).into());
        }

        let threshold = config.validation.name_match_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(RpaError::ConfigError(format!("name_match_threshold {} must be between 0 and 100", threshold)).into());
        }
        if !config.validation.institutional_domain.starts_with('@') {
            return Err(RpaError::ConfigError(format!(
                "institutional_domain '{}' must start with '@'",
                config.validation.institutional_domain
            )).into());
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn save_config(&self, config: &Config) -> Result<()> {
        info!("Saving configuration to {:?}", self.config_path);

        let toml_content = toml::to_string_pretty(config)
            .map_err(|e| RpaError::ConfigError(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, toml_content)
            .map_err(|e| RpaError::ConfigError(format!("Failed to write config file: {}", e)))?;

        info!("Configuration saved successfully");
        Ok(())
    }
}

impl FileConfigManager {
    /// Create a default configuration file
    async fn create_default_config(&self) -> Result<()> {
        let default_config = Config::default();
        let toml_content = toml::to_string_pretty(&default_config)
            .map_err(|e| RpaError::ConfigError(format!("Failed to serialize default config: {}", e)))?;

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| RpaError::ConfigError(format!("Failed to create config directory: {}", e)))?;
            }
        }

        fs::write(&self.config_path, toml_content)
            .map_err(|e| RpaError::ConfigError(format!("Failed to write default config: {}", e)))?;

        info!("Default configuration file created at {:?}", self.config_path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_default_config() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let config = manager.load_config().await.unwrap();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.tracking_file, PathBuf::from("seguimiento.xlsx"));
        assert_eq!(config.validation.institutional_domain, "@uni.pe");
        assert!(config_path.exists());
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");
        let manager = FileConfigManager::new(config_path.clone());

        let mut config = Config::default();
        config.server.port = 8081;
        config.browser.debug_dir = Some(PathBuf::from("debug"));
        std::fs::create_dir_all(config_path.parent().unwrap()).unwrap();
        manager.save_config(&config).await.unwrap();

        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.server.port, 8081);
        assert_eq!(reloaded.browser.debug_dir, Some(PathBuf::from("debug")));
    }

    #[tokio::test]
    async fn test_rejects_broken_toml() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "server = [").unwrap();

        let manager = FileConfigManager::new(config_path);
        assert!(manager.load_config().await.is_err());
    }

    #[tokio::test]
    async fn test_init_config_respects_force() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        fs::write(&config_path, "[server]\nport = 9000\n").unwrap();
        let manager = FileConfigManager::new(config_path.clone());

        let err = manager.init_config(false).await.unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert_eq!(fs::read_to_string(&config_path).unwrap(), "[server]\nport = 9000\n");

        manager.init_config(true).await.unwrap();
        let config = manager.load_config().await.unwrap();
        assert_eq!(config.server.port, Config::default().server.port);

        let fresh = FileConfigManager::new(temp_dir.path().join("nested").join("new.toml"));
        fresh.init_config(false).await.unwrap();
        assert!(fresh.path().exists());
    }

    #[test]
    fn test_config_validation() {
        let manager = FileConfigManager::new(PathBuf::from("test.toml"));

        assert!(manager.validate_config(&Config::default()).is_ok());

        let mut invalid = Config::default();
        invalid.server.port = 80;
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.portals.uni_url = "dirce.uni.edu.pe".to_string();
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.browser.result_wait_ms = 120_000;
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.validation.name_match_threshold = 140.0;
        assert!(manager.validate_config(&invalid).is_err());

        let mut invalid = Config::default();
        invalid.validation.institutional_domain = "uni.pe".to_string();
        assert!(manager.validate_config(&invalid).is_err());
    }

    #[test]
    fn test_durations() {
        let browser = Config::default().browser;
        assert_eq!(browser.settle(), Duration::from_secs(2));
        assert_eq!(browser.typing_pause(), Duration::from_secs(1));
        assert_eq!(browser.result_wait(), Duration::from_secs(5));
        assert_eq!(browser.page_load_timeout(), Duration::from_secs(15));
    }
}
