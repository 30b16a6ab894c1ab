use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::portal::{submit_search, SearchPlan};
use super::{is_valid_dni, IdentityLookup, PersonLookup};
use crate::browser::SessionFactory;
use crate::config::{BrowserConfig, Config};
use crate::error::Result;
use crate::parser::{extract_person, find_dni_button, find_dni_field, Extraction};

/// Person lookups against the public national ID portal.
pub struct DniPortal {
    sessions: Arc<dyn SessionFactory>,
    browser: BrowserConfig,
    url: String,
}

impl DniPortal {
    pub fn new(sessions: Arc<dyn SessionFactory>, config: &Config) -> Self {
        Self {
            sessions,
            browser: config.browser.clone(),
            url: config.portals.dni_url.clone(),
        }
    }

    async fn search(&self, dni: &str) -> Result<String> {
        let plan = SearchPlan {
            portal: "DNI",
            url: &self.url,
            query: dni,
            find_field: find_dni_field,
            find_button: find_dni_button,
            missing_field_shot: "debug_dni_page.png",
            result_shot: None,
        };

        let mut session = self.sessions.open_session().await?;
        let outcome = submit_search(session.as_mut(), &self.browser, &plan).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close DNI session: {}", e);
        }
        outcome
    }
}

#[async_trait]
impl IdentityLookup for DniPortal {
    async fn lookup_person(&self, dni: &str) -> PersonLookup {
        if !is_valid_dni(dni) {
            return PersonLookup::failed(dni, "DNI debe tener exactamente 8 dígitos");
        }
        info!("Starting DNI validation for {}", dni);

        let html = match self.search(dni).await {
            Ok(html) => html,
            Err(e) => {
                warn!("DNI validation failed for {}: {}", dni, e);
                return PersonLookup::failed(dni, e.to_string());
            }
        };

        match extract_person(&html) {
            Extraction::Found { record, strategy } => {
                info!("DNI {} resolved via {} strategy", dni, strategy);
                PersonLookup::found(dni, record)
            }
            Extraction::NotFound(message) => {
                warn!("DNI not found: {}", dni);
                PersonLookup::failed(dni, format!("DNI no encontrado: {}", message))
            }
            Extraction::Unreadable => PersonLookup::failed(dni, "No se pudieron extraer datos del DNI"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::portal::testing::{quick_browser, FakeFactory};

    const SEARCH_PAGE: &str = r#"<html><body>
        <form><input type="text" id="dni" placeholder="Ingrese DNI">
        <button class="btn">Buscar</button></form>
    </body></html>"#;

    fn portal(factory: FakeFactory) -> DniPortal {
        let mut config = Config::default();
        config.browser = quick_browser();
        DniPortal::new(Arc::new(factory), &config)
    }

    #[tokio::test]
    async fn test_bad_dni_format() {
        let factory = FakeFactory::new(SEARCH_PAGE, "");
        let lookup = portal(factory.clone()).lookup_person("1234567").await;

        assert!(!lookup.success);
        assert_eq!(lookup.error.as_deref(), Some("DNI debe tener exactamente 8 dígitos"));
        assert!(factory.actions().is_empty());
    }

    #[tokio::test]
    async fn test_person_found_from_labels() {
        let result = r#"<html><body>
            <div><p>Nombres</p><p>KEVIN ALONSO</p>
            <p>Apellido Paterno</p><p>PINTO</p>
            <p>Apellido Materno</p><p>RAMOS</p></div>
        </body></html>"#;
        let factory = FakeFactory::new(SEARCH_PAGE, result);

        let lookup = portal(factory.clone()).lookup_person("12345678").await;
        assert!(lookup.success);
        assert_eq!(lookup.full_name.as_deref(), Some("KEVIN ALONSO PINTO RAMOS"));
        assert_eq!(lookup.source.as_deref(), Some("eldni.com"));

        let actions = factory.actions();
        assert!(actions.iter().any(|a| a.starts_with("fill ") && a.ends_with(" 12345678")));
        assert!(actions.iter().any(|a| a.starts_with("click ")));
        assert_eq!(actions.last().map(String::as_str), Some("close"));
    }

    #[tokio::test]
    async fn test_portal_reports_missing_dni() {
        let factory = FakeFactory::new(SEARCH_PAGE, "<html><body><p>DNI no encontrado</p></body></html>");

        let lookup = portal(factory).lookup_person("87654321").await;
        assert_eq!(lookup.error.as_deref(), Some("DNI no encontrado: dni no encontrado"));
    }
}
