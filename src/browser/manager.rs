use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as CdpBrowserConfig};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::browser::session::{PortalSession, SessionFactory};
use crate::browser::stealth::{generate_stealth_script, launch_args, UserAgentGenerator};
use crate::config::BrowserConfig;
use crate::error::{Result, RpaError};

const LAUNCH_ATTEMPTS: u32 = 3;

/// Launches one Chromium process per lookup session.
pub struct ChromiumLauncher {
    config: BrowserConfig,
    user_agent_generator: UserAgentGenerator,
}

impl ChromiumLauncher {
    pub fn new(config: BrowserConfig) -> Self {
        Self {
            config,
            user_agent_generator: UserAgentGenerator::new(),
        }
    }

    fn build_config(&self, user_data_dir: &Path) -> Result<CdpBrowserConfig> {
        let user_agent = self.user_agent_generator.pick(&self.config);
        debug!("Using user agent: {}", user_agent);

        let mut builder = CdpBrowserConfig::builder()
            .no_sandbox()
            .window_size(self.config.window_width, self.config.window_height)
            .user_data_dir(user_data_dir)
            .request_timeout(self.config.page_load_timeout())
            .args(launch_args(&self.config, user_agent));

        if !self.config.headless {
            builder = builder.with_head();
        }
        if let Some(executable) = &self.config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }

        builder
            .build()
            .map_err(|e| RpaError::BrowserError(format!("Failed to create browser config: {}", e)).into())
    }

    async fn launch(&self, user_data_dir: &Path) -> Result<(Browser, JoinHandle<()>)> {
        let browser_config = self.build_config(user_data_dir)?;

        let mut last_error = String::new();
        for attempt in 1..=LAUNCH_ATTEMPTS {
            match Browser::launch(browser_config.clone()).await {
                Ok((browser, mut handler)) => {
                    info!("Browser launched successfully on attempt {}", attempt);

                    let handle = tokio::spawn(async move {
                        while let Some(event) = handler.next().await {
                            if let Err(e) = event {
                                let error_msg = e.to_string();
                                if error_msg.contains("data did not match any variant")
                                    || error_msg.contains("untagged enum Message")
                                {
                                    debug!("Ignoring WebSocket deserialization error: {}", e);
                                } else {
                                    warn!("Browser handler error: {}", e);
                                }
                            }
                        }
                        debug!("Browser handler task ended");
                    });

                    return Ok((browser, handle));
                }
                Err(e) => {
                    error!("Browser launch attempt {} failed: {}", attempt, e);
                    last_error = e.to_string();
                    if attempt < LAUNCH_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        }

        Err(RpaError::BrowserError(format!(
            "Failed to launch browser after {} attempts: {}",
            LAUNCH_ATTEMPTS, last_error
        ))
        .into())
    }
}

#[async_trait]
impl SessionFactory for ChromiumLauncher {
    async fn open_session(&self) -> Result<Box<dyn PortalSession>> {
        // a fresh profile per session avoids the singleton lock
        let user_data_dir = std::env::temp_dir().join(format!(
            "certificate-rpa-{}-{}",
            std::process::id(),
            Uuid::new_v4()
        ));
        std::fs::create_dir_all(&user_data_dir)?;

        let (mut browser, handler) = match self.launch(&user_data_dir).await {
            Ok(launched) => launched,
            Err(e) => {
                let _ = std::fs::remove_dir_all(&user_data_dir);
                return Err(e);
            }
        };

        let page = match tokio::time::timeout(Duration::from_secs(10), browser.new_page("about:blank")).await {
            Ok(Ok(page)) => page,
            Ok(Err(e)) => {
                shutdown(&mut browser, handler, &user_data_dir).await;
                return Err(RpaError::BrowserError(format!("Failed to create new page: {}", e)).into());
            }
            Err(_) => {
                shutdown(&mut browser, handler, &user_data_dir).await;
                return Err(RpaError::BrowserError("Timeout creating new page".to_string()).into());
            }
        };

        info!("Opened browser session");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler,
            user_data_dir,
            config: self.config.clone(),
        }))
    }
}

async fn shutdown(browser: &mut Browser, handler: JoinHandle<()>, user_data_dir: &Path) {
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser: {}", e);
    }
    if let Err(e) = browser.wait().await {
        warn!("Failed waiting for browser exit: {}", e);
    }
    handler.abort();
    if let Err(e) = std::fs::remove_dir_all(user_data_dir) {
        debug!("Could not remove {:?}: {}", user_data_dir, e);
    }
}

pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    user_data_dir: PathBuf,
    config: BrowserConfig,
}

impl ChromiumSession {
    async fn element(&self, selector: &str) -> Result<chromiumoxide::element::Element> {
        self.page
            .find_element(selector)
            .await
            .map_err(|e| RpaError::BrowserError(format!("Element {} not found: {}", selector, e)).into())
    }
}

#[async_trait]
impl PortalSession for ChromiumSession {
    async fn open(&mut self, url: &str) -> Result<()> {
        info!("Navigating to {}", url);
        let timeout = self.config.page_load_timeout();

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                return Err(RpaError::BrowserError(format!("Failed to navigate to {}: {}", url, e)).into())
            }
            Err(_) => {
                return Err(RpaError::BrowserError(format!(
                    "Navigation to {} timed out after {}ms",
                    url, self.config.page_load_timeout_ms
                ))
                .into())
            }
        }

        if tokio::time::timeout(timeout, self.page.wait_for_navigation()).await.is_err() {
            warn!("Page at {} did not finish loading in time", url);
        }
        if let Err(e) = self.page.evaluate(generate_stealth_script()).await {
            debug!("Failed to inject stealth script: {}", e);
        }

        tokio::time::sleep(self.config.settle()).await;
        debug!("Page {} ready", url);
        Ok(())
    }

    async fn html(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| RpaError::BrowserError(format!("Failed to get page content: {}", e)).into())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<()> {
        let element = self.element(selector).await?;

        element
            .call_js_fn("function() { this.value = ''; }", false)
            .await
            .map_err(|e| RpaError::BrowserError(format!("Failed to clear field: {}", e)))?;
        element
            .click()
            .await
            .map_err(|e| RpaError::BrowserError(format!("Failed to focus field: {}", e)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| RpaError::BrowserError(format!("Failed to type into field: {}", e)))?;

        debug!("Filled {} with {}", selector, text);
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.element(selector).await?;

        if let Err(e) = element.click().await {
            // covered or off-screen buttons still take a scripted click
            debug!("Native click failed ({}), using script click", e);
            element
                .call_js_fn("function() { this.click(); }", false)
                .await
                .map_err(|e| RpaError::BrowserError(format!("Failed to click {}: {}", selector, e)))?;
        }
        Ok(())
    }

    async fn press_enter(&self, selector: &str) -> Result<()> {
        let element = self.element(selector).await?;
        element
            .press_key("Enter")
            .await
            .map_err(|e| RpaError::BrowserError(format!("Failed to press Enter: {}", e)))?;
        Ok(())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let params = ScreenshotParams::builder().full_page(true).build();
        self.page
            .save_screenshot(params, path)
            .await
            .map_err(|e| RpaError::BrowserError(format!("Failed to save screenshot: {}", e)))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler,
            user_data_dir,
            ..
        } = *self;

        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }
        shutdown(&mut browser, handler, &user_data_dir).await;
        info!("Closed browser session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_build_config() {
        let mut config = Config::default().browser;
        config.headless = false;
        let launcher = ChromiumLauncher::new(config);

        let dir = tempfile::tempdir().unwrap();
        assert!(launcher.build_config(dir.path()).is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_open_and_read_page() {
        let launcher = ChromiumLauncher::new(Config::default().browser);
        let mut session = launcher.open_session().await.unwrap();

        session.open("data:text/html,<input name='codigo'>").await.unwrap();
        let html = session.html().await.unwrap();
        assert!(html.contains("codigo"));

        session.fill("input[name='codigo']", "20220259H").await.unwrap();
        session.close().await.unwrap();
    }
}
