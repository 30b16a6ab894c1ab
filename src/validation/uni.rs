use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use super::portal::{dump_html, submit_search, SearchPlan};
use super::{is_valid_student_code, StudentLookup, StudentRegistry};
use crate::browser::SessionFactory;
use crate::config::{BrowserConfig, Config};
use crate::error::Result;
use crate::parser::{extract_student, find_code_field, find_search_button, Extraction};

/// Student lookups against the UNI enrollment registry (DIRCE).
pub struct UniRegistry {
    sessions: Arc<dyn SessionFactory>,
    browser: BrowserConfig,
    url: String,
    name_match_threshold: f64,
}

impl UniRegistry {
    pub fn new(sessions: Arc<dyn SessionFactory>, config: &Config) -> Self {
        Self {
            sessions,
            browser: config.browser.clone(),
            url: config.portals.uni_url.clone(),
            name_match_threshold: config.validation.name_match_threshold,
        }
    }

    async fn search(&self, code: &str) -> Result<String> {
        let plan = SearchPlan {
            portal: "UNI",
            url: &self.url,
            query: code,
            find_field: find_code_field,
            find_button: find_search_button,
            missing_field_shot: "debug_uni_page.png",
            result_shot: Some(format!("debug_resultados_{}.png", code)),
        };

        let mut session = self.sessions.open_session().await?;
        let outcome = submit_search(session.as_mut(), &self.browser, &plan).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close UNI session: {}", e);
        }
        outcome
    }
}

#[async_trait]
impl StudentRegistry for UniRegistry {
    async fn lookup_student(&self, code: &str, expected_name: Option<String>) -> StudentLookup {
        if !is_valid_student_code(code) {
            return StudentLookup::failed(
                code,
                "Formato de código inválido. Debe ser 8 dígitos + 1 letra mayúscula (ej: 20220259H)",
            );
        }
        info!("Starting UNI validation for code {}", code);

        let html = match self.search(code).await {
            Ok(html) => html,
            Err(e) => {
                warn!("UNI validation failed for {}: {}", code, e);
                return StudentLookup::failed(code, e.to_string());
            }
        };

        let mut lookup = match extract_student(&html, code) {
            Extraction::Found { record, strategy } => {
                info!("Student {} found via {} strategy", code, strategy);
                StudentLookup::found(record)
            }
            Extraction::NotFound(message) => {
                warn!("Student not found: {}", code);
                StudentLookup::failed(code, format!("Estudiante no encontrado: {}", message))
            }
            Extraction::Unreadable => {
                dump_html(self.browser.debug_dir.as_deref(), &format!("debug_html_{}.html", code), &html);
                StudentLookup::failed(code, "No se pudieron extraer datos del estudiante")
            }
        };

        if let Some(expected) = expected_name.as_deref().filter(|n| !n.trim().is_empty()) {
            lookup.check_name(expected, self.name_match_threshold);
        }
        lookup
    }
}
