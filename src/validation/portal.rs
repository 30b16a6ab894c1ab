use scraper::Html;
use std::path::Path;
use tracing::{debug, error, info, warn};

use crate::browser::PortalSession;
use crate::config::BrowserConfig;
use crate::error::{Result, RpaError};
use crate::parser::Located;

/// One search-form submission against a portal.
pub struct SearchPlan<'a> {
    pub portal: &'a str,
    pub url: &'a str,
    pub query: &'a str,
    pub find_field: fn(&Html) -> Option<Located>,
    pub find_button: fn(&Html) -> Option<Located>,
    /// Screenshot name when the search field cannot be found.
    pub missing_field_shot: &'a str,
    /// Screenshot name taken once results are in.
    pub result_shot: Option<String>,
}

/// Opens the portal, types the query, submits and returns the result page.
pub async fn submit_search(
    session: &mut dyn PortalSession,
    browser: &BrowserConfig,
    plan: &SearchPlan<'_>,
) -> Result<String> {
    session.open(plan.url).await?;
    info!("{} portal loaded", plan.portal);

    let page = session.html().await?;
    // Html is not Send; keep it out of any await
    let (field, button) = {
        let document = Html::parse_document(&page);
        ((plan.find_field)(&document), (plan.find_button)(&document))
    };

    let field = match field {
        Some(field) => field,
        None => {
            save_screenshot(session, browser.debug_dir.as_deref(), plan.missing_field_shot).await;
            error!("No search field found on {} portal", plan.portal);
            return Err(RpaError::BrowserError(format!(
                "No se pudo encontrar el campo de búsqueda en el portal {}",
                plan.portal
            ))
            .into());
        }
    };
    debug!("Search field {} ({})", field.selector, field.matched_by);

    session.fill(&field.selector, plan.query).await?;
    info!("Query entered: {}", plan.query);
    tokio::time::sleep(browser.typing_pause()).await;

    match button {
        Some(button) => {
            info!("Clicking search button ({})", button.matched_by);
            session.click(&button.selector).await?;
        }
        None => {
            info!("No search button, pressing Enter");
            session.press_enter(&field.selector).await?;
        }
    }

    info!("Waiting for results...");
    tokio::time::sleep(browser.result_wait()).await;

    if let Some(name) = &plan.result_shot {
        save_screenshot(session, browser.debug_dir.as_deref(), name).await;
    }
    session.html().await
}

async fn save_screenshot(session: &dyn PortalSession, debug_dir: Option<&Path>, name: &str) {
    let Some(dir) = debug_dir else { return };
    if let Err(e) = std::fs::create_dir_all(dir) {
        warn!("Could not create debug dir {:?}: {}", dir, e);
        return;
    }
    let path = dir.join(name);
    match session.screenshot(&path).await {
        Ok(()) => info!("Screenshot saved to {:?}", path),
        Err(e) => warn!("Screenshot failed: {}", e),
    }
}

/// Writes the result page for later inspection when extraction fails.
pub fn dump_html(debug_dir: Option<&Path>, name: &str, html: &str) {
    let Some(dir) = debug_dir else { return };
    let path = dir.join(name);
    let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, html));
    match written {
        Ok(()) => info!("Page HTML saved to {:?}", path),
        Err(e) => warn!("Could not save page HTML to {:?}: {}", path, e),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted session that serves one page before the search is
    //! submitted and another after.

    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::browser::{PortalSession, SessionFactory};
    use crate::config::{BrowserConfig, Config};
    use crate::error::{Result, RpaError};

    pub fn quick_browser() -> BrowserConfig {
        let mut browser = Config::default().browser;
        browser.settle_ms = 0;
        browser.typing_pause_ms = 0;
        browser.result_wait_ms = 0;
        browser
    }

    #[derive(Clone, Default)]
    pub struct FakeFactory {
        pub search_page: String,
        pub result_page: String,
        pub launch_fails: bool,
        pub log: Arc<Mutex<Vec<String>>>,
    }

    impl FakeFactory {
        pub fn new(search_page: &str, result_page: &str) -> Self {
            Self {
                search_page: search_page.to_string(),
                result_page: result_page.to_string(),
                ..Default::default()
            }
        }

        pub fn actions(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionFactory for FakeFactory {
        async fn open_session(&self) -> Result<Box<dyn PortalSession>> {
            if self.launch_fails {
                return Err(RpaError::BrowserError("Failed to launch browser after 3 attempts".to_string()).into());
            }
            Ok(Box::new(FakeSession {
                factory: self.clone(),
                submitted: AtomicBool::new(false),
            }))
        }
    }

    pub struct FakeSession {
        factory: FakeFactory,
        submitted: AtomicBool,
    }

    impl FakeSession {
        fn record(&self, action: String) {
            self.factory.log.lock().unwrap().push(action);
        }
    }

    #[async_trait]
    impl PortalSession for FakeSession {
        async fn open(&mut self, url: &str) -> Result<()> {
            self.record(format!("open {}", url));
            Ok(())
        }

        async fn html(&self) -> Result<String> {
            if self.submitted.load(Ordering::SeqCst) {
                Ok(self.factory.result_page.clone())
            } else {
                Ok(self.factory.search_page.clone())
            }
        }

        async fn fill(&self, selector: &str, text: &str) -> Result<()> {
            self.record(format!("fill {} {}", selector, text));
            Ok(())
        }

        async fn click(&self, selector: &str) -> Result<()> {
            self.record(format!("click {}", selector));
            self.submitted.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn press_enter(&self, selector: &str) -> Result<()> {
            self.record(format!("enter {}", selector));
            self.submitted.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn screenshot(&self, path: &Path) -> Result<()> {
            std::fs::write(path, b"png")?;
            self.record(format!("screenshot {}", path.display()));
            Ok(())
        }

        async fn close(self: Box<Self>) -> Result<()> {
            self.record("close".to_string());
            Ok(())
        }
    }
}
