//! Identity checks against the two external portals, plus the local format
//! rules applied before any browser is launched.

pub mod dni;
pub mod portal;
pub mod uni;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::parser::{PersonFields, StudentFields};

pub use dni::DniPortal;
pub use uni::UniRegistry;

static STUDENT_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{8}[A-Z]$").expect("student code pattern is valid"));

pub const UNI_SOURCE: &str = "Portal UNI DIRCE";
pub const DNI_SOURCE: &str = "eldni.com";
pub const DEFAULT_STATUS: &str = "Activo";

/// Eight digits and an uppercase letter, e.g. `20220259H`.
pub fn is_valid_student_code(code: &str) -> bool {
    STUDENT_CODE.is_match(code)
}

pub fn is_valid_dni(dni: &str) -> bool {
    dni.len() == 8 && dni.bytes().all(|b| b.is_ascii_digit())
}

pub fn is_institutional_email(email: &str, domain: &str) -> bool {
    email.to_lowercase().ends_with(&domain.to_lowercase())
}

/// Share of the expected name's words that appear in the found name, as a
/// percentage. `None` when either side has no words.
pub fn name_match(found: &str, expected: &str) -> Option<f64> {
    let words = |s: &str| -> HashSet<String> { s.to_lowercase().split_whitespace().map(String::from).collect() };
    let found = words(found);
    let expected = words(expected);

    if found.is_empty() || expected.is_empty() {
        return None;
    }
    let common = expected.intersection(&found).count();
    Some(common as f64 / expected.len() as f64 * 100.0)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentLookup {
    pub success: bool,
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "carrera", skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(rename = "facultad", skip_serializing_if = "Option::is_none")]
    pub faculty: Option<String>,
    #[serde(rename = "estado", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "fuente", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "validado")]
    pub validated: bool,
    #[serde(rename = "coincidencia_nombres", skip_serializing_if = "Option::is_none")]
    pub name_match: Option<f64>,
    #[serde(rename = "nombres_validados", skip_serializing_if = "Option::is_none")]
    pub names_validated: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StudentLookup {
    pub fn failed(code: &str, error: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn found(fields: StudentFields) -> Self {
        Self {
            success: true,
            code: fields.code,
            name: fields.name,
            program: fields.program,
            faculty: fields.faculty,
            status: Some(fields.status.unwrap_or_else(|| DEFAULT_STATUS.to_string())),
            source: Some(UNI_SOURCE.to_string()),
            validated: true,
            ..Default::default()
        }
    }

    /// Cross-checks the registry name against the one the user typed.
    pub fn check_name(&mut self, expected: &str, threshold: f64) {
        if !self.success {
            return;
        }
        let found = self.name.as_deref().unwrap_or("");
        if let Some(percent) = name_match(found, expected) {
            self.name_match = Some(percent);
            self.names_validated = Some(percent >= threshold);
            if percent < threshold {
                self.warning = Some(format!(
                    "Los nombres no coinciden completamente ({:.1}% coincidencia)",
                    percent
                ));
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonLookup {
    pub success: bool,
    pub dni: String,
    #[serde(rename = "nombres", skip_serializing_if = "Option::is_none")]
    pub given_names: Option<String>,
    #[serde(rename = "apellido_paterno", skip_serializing_if = "Option::is_none")]
    pub paternal_surname: Option<String>,
    #[serde(rename = "apellido_materno", skip_serializing_if = "Option::is_none")]
    pub maternal_surname: Option<String>,
    #[serde(rename = "nombre_completo", skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(rename = "fuente", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(rename = "validado")]
    pub validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PersonLookup {
    pub fn failed(dni: &str, error: impl Into<String>) -> Self {
        Self {
            dni: dni.to_string(),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn found(dni: &str, fields: PersonFields) -> Self {
        Self {
            success: true,
            dni: dni.to_string(),
            given_names: fields.given_names,
            paternal_surname: fields.paternal_surname,
            maternal_surname: fields.maternal_surname,
            full_name: fields.full_name,
            source: Some(DNI_SOURCE.to_string()),
            validated: true,
            error: None,
        }
    }
}

/// Looks students up in the university enrollment registry. Never fails:
/// problems come back as an unsuccessful `StudentLookup`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StudentRegistry: Send + Sync {
    async fn lookup_student(&self, code: &str, expected_name: Option<String>) -> StudentLookup;
}

/// Looks people up by national ID number.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn lookup_person(&self, dni: &str) -> PersonLookup;
}
