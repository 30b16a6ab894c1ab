use rand::Rng;

use crate::config::BrowserConfig;

pub struct UserAgentGenerator {
    user_agents: Vec<String>,
}

impl UserAgentGenerator {
    pub fn new() -> Self {
        let user_agents = vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
        ];

        Self { user_agents }
    }

    pub fn random_user_agent(&self) -> &str {
        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..self.user_agents.len());
        &self.user_agents[index]
    }

    /// The configured agent, or a random one when rotation is on.
    pub fn pick<'a>(&'a self, config: &'a BrowserConfig) -> &'a str {
        if config.rotate_user_agent {
            self.random_user_agent()
        } else {
            &config.user_agent
        }
    }
}

impl Default for UserAgentGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Chromium flags for a lookup session.
pub fn launch_args(config: &BrowserConfig, user_agent: &str) -> Vec<String> {
    let mut args = vec![
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-extensions".to_string(),
        "--no-first-run".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--mute-audio".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),    // hide automation
        format!("--user-agent={}", user_agent),
    ];
    if config.disable_images {
        args.push("--blink-settings=imagesEnabled=false".to_string());
    }
    args
}

/// Hides `navigator.webdriver` from portal scripts.
pub fn generate_stealth_script() -> &'static str {
    r#"
        Object.defineProperty(navigator, 'webdriver', {
            get: () => undefined,
        });
        window.chrome = window.chrome || { runtime: {} };
    "#
}
