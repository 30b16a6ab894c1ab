//! The certificate workflow: validate the student against both portals,
//! merge what they report with what the user typed, render the PDF and log
//! it for the signing authority.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use crate::certificate::{CertificateData, CertificateWriter};
use crate::config::Config;
use crate::error::{Result, RpaError};
use crate::tracking::{NewRecord, TrackingRecord, TrackingStore};
use crate::validation::{
    is_institutional_email, IdentityLookup, PersonLookup, StudentLookup, StudentRegistry, DEFAULT_STATUS,
};

pub const SOURCE_USER: &str = "input_usuario";
pub const SOURCE_UNI: &str = "uni_validado";
pub const SOURCE_DNI: &str = "dni_validado";
pub const DEFAULT_FACULTY: &str = "FIEE";

/// Form fields arrive loosely typed: `null` counts as missing and numbers
/// (a term of `3`, a numeric DNI) are read as their text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CertificateRequest {
    #[serde(rename = "nombre", default, deserialize_with = "text_field")]
    pub name: String,
    #[serde(rename = "codigo", default, deserialize_with = "text_field")]
    pub code: String,
    #[serde(rename = "carrera", default, deserialize_with = "text_field")]
    pub program: String,
    #[serde(rename = "ciclo", default, deserialize_with = "text_field")]
    pub term: String,
    #[serde(default, deserialize_with = "optional_text_field")]
    pub dni: Option<String>,
    #[serde(rename = "correo", default, deserialize_with = "optional_text_field")]
    pub email: Option<String>,
}

fn text_field<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_text_field(deserializer)?.unwrap_or_default())
}

fn optional_text_field<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        other => Err(serde::de::Error::custom(format!("expected text, found {}", other))),
    }
}

impl CertificateRequest {
    fn check_required(&self) -> Result<()> {
        for (field, value) in [
            ("nombre", &self.name),
            ("codigo", &self.code),
            ("carrera", &self.program),
            ("ciclo", &self.term),
        ] {
            if value.trim().is_empty() {
                return Err(RpaError::ValidationError(format!("Campo {} es requerido", field)).into());
            }
        }
        Ok(())
    }
}

/// The data that ends up on the certificate and in the tracking row.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedData {
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "codigo")]
    pub code: String,
    pub dni: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "carrera")]
    pub program: String,
    #[serde(rename = "ciclo")]
    pub term: String,
    #[serde(rename = "fuente")]
    pub source: String,
    #[serde(rename = "validado_uni")]
    pub uni_validated: bool,
    #[serde(rename = "validado_dni")]
    pub dni_validated: bool,
    #[serde(rename = "facultad")]
    pub faculty: String,
    #[serde(rename = "estado_uni")]
    pub uni_status: String,
    #[serde(rename = "nombre_dni", skip_serializing_if = "Option::is_none")]
    pub dni_name: Option<String>,
}

/// Registry data wins over typed data; the ID portal's name is only used
/// when the registry did not validate the student.
pub fn merge(request: &CertificateRequest, uni: &StudentLookup, dni: Option<&PersonLookup>) -> MergedData {
    let mut merged = MergedData {
        name: request.name.trim().to_string(),
        code: request.code.trim().to_string(),
        dni: request.dni.as_deref().map(str::trim).unwrap_or_default().to_string(),
        email: request.email.as_deref().map(str::trim).unwrap_or_default().to_string(),
        program: request.program.trim().to_string(),
        term: request.term.trim().to_string(),
        source: SOURCE_USER.to_string(),
        ..Default::default()
    };

    if uni.success {
        if let Some(name) = uni.name.as_ref().filter(|n| !n.is_empty()) {
            merged.name = name.clone();
            merged.source = SOURCE_UNI.to_string();
        }
        if let Some(program) = uni.program.as_ref().filter(|p| !p.is_empty()) {
            merged.program = program.clone();
        }
        merged.uni_validated = true;
        merged.uni_status = uni.status.clone().unwrap_or_default();
        merged.faculty = uni.faculty.clone().unwrap_or_default();
    }

    if let Some(person) = dni.filter(|p| p.success) {
        if let Some(full_name) = person.full_name.as_ref().filter(|n| !n.is_empty()) {
            if !merged.uni_validated {
                merged.name = full_name.clone();
                merged.source = SOURCE_DNI.to_string();
            }
        }
        merged.dni_validated = true;
        merged.dni_name = Some(person.full_name.clone().unwrap_or_default());
    }

    if merged.faculty.is_empty() {
        merged.faculty = DEFAULT_FACULTY.to_string();
    }
    if merged.uni_status.is_empty() {
        merged.uni_status = DEFAULT_STATUS.to_string();
    }
    merged
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub success: bool,
    #[serde(rename = "mensaje", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "archivo_pdf", skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(rename = "registro_id", skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(rename = "datos_validados", skip_serializing_if = "Option::is_none")]
    pub data: Option<MergedData>,
    #[serde(rename = "validacion_uni")]
    pub uni: StudentLookup,
    #[serde(rename = "validacion_dni")]
    pub dni: Option<PersonLookup>,
    #[serde(rename = "advertencias", skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct CertificateService {
    registry: Arc<dyn StudentRegistry>,
    identity: Arc<dyn IdentityLookup>,
    store: Arc<dyn TrackingStore>,
    writer: CertificateWriter,
    pdf_dirs: Vec<PathBuf>,
    institutional_domain: String,
}

impl CertificateService {
    pub fn new(
        config: &Config,
        registry: Arc<dyn StudentRegistry>,
        identity: Arc<dyn IdentityLookup>,
        store: Arc<dyn TrackingStore>,
    ) -> Self {
        let mut pdf_dirs = vec![config.storage.pdf_dir.clone()];
        pdf_dirs.extend(config.storage.extra_pdf_dirs.iter().cloned());

        Self {
            registry,
            identity,
            store,
            writer: CertificateWriter::new(config),
            pdf_dirs,
            institutional_domain: config.validation.institutional_domain.clone(),
        }
    }

    pub async fn generate(&self, request: CertificateRequest) -> Result<GenerationOutcome> {
        request.check_required()?;
        let code = request.code.trim();
        info!("Generating certificate for {}", code);

        let dni = match request.dni.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            Some(dni) => {
                let person = self.identity.lookup_person(dni).await;
                if !person.success {
                    warn!("DNI validation failed, continuing: {}", person.error.as_deref().unwrap_or(""));
                }
                Some(person)
            }
            None => None,
        };

        let uni = self
            .registry
            .lookup_student(code, Some(request.name.trim().to_string()))
            .await;
        if !uni.success {
            let reason = uni.error.clone().unwrap_or_default();
            warn!("Student {} rejected by registry: {}", code, reason);
            return Ok(GenerationOutcome {
                success: false,
                message: None,
                error: Some(format!("Estudiante no encontrado en portal UNI: {}", reason)),
                document: None,
                record_id: None,
                data: None,
                uni,
                dni,
                warnings: Vec::new(),
            });
        }

        let mut warnings = Vec::new();
        if let Some(warning) = &uni.warning {
            warnings.push(warning.clone());
        }
        if let Some(email) = request.email.as_deref().filter(|e| !e.trim().is_empty()) {
            if !is_institutional_email(email, &self.institutional_domain) {
                warn!("Email {} is not institutional", email);
                warnings.push(format!("El correo no es institucional ({})", self.institutional_domain));
            }
        }

        let data = merge(&request, &uni, dni.as_ref());
        let document = self.writer.write(&CertificateData {
            name: data.name.clone(),
            code: data.code.clone(),
            program: data.program.clone(),
            term: data.term.clone(),
        })?;

        let record_id = self
            .store
            .append(NewRecord {
                student: data.name.clone(),
                code: data.code.clone(),
                dni: data.dni.clone(),
                email: data.email.clone(),
                program: data.program.clone(),
                term: data.term.clone(),
                document: document.clone(),
                uni_validated: data.uni_validated,
                dni_validated: data.dni_validated,
                source: data.source.clone(),
                faculty: data.faculty.clone(),
                uni_status: data.uni_status.clone(),
            })
            .await?;

        info!("Certificate {} generated as {}", record_id, document);
        Ok(GenerationOutcome {
            success: true,
            message: Some("Constancia generada con validación UNI y enviada a autoridad".to_string()),
            error: None,
            document: Some(document),
            record_id: Some(record_id),
            data: Some(data),
            uni,
            dni,
            warnings,
        })
    }

    pub async fn validate_dni(&self, dni: &str) -> PersonLookup {
        self.identity.lookup_person(dni.trim()).await
    }

    pub async fn validate_student(&self, code: &str, name: Option<String>) -> StudentLookup {
        let name = name.filter(|n| !n.trim().is_empty());
        self.registry.lookup_student(code.trim(), name).await
    }

    pub async fn list(&self) -> Result<Vec<TrackingRecord>> {
        self.store.list().await
    }

    pub async fn sign(&self, id: &str) -> Result<TrackingRecord> {
        self.store.sign(id).await
    }

    /// Removes the tracking row and the PDF behind it.
    pub async fn delete(&self, id: &str) -> Result<TrackingRecord> {
        info!("Deleting certificate {}", id);
        let record = self.store.remove(id).await?;

        if record.document.is_empty() {
            return Ok(record);
        }
        match self.locate_document(&record.document) {
            Some(path) => match std::fs::remove_file(&path) {
                Ok(()) => info!("PDF removed: {:?}", path),
                Err(e) => warn!("Failed to remove {:?}: {}", path, e),
            },
            None => warn!("PDF not found for deletion: {}", record.document),
        }
        Ok(record)
    }

    /// Path of the PDF for a tracking row, for download.
    pub async fn document_path(&self, id: &str) -> Result<PathBuf> {
        let record = self
            .store
            .find(id)
            .await?
            .ok_or_else(|| RpaError::NotFound(format!("Constancia {} no encontrada", id)))?;

        if record.document.is_empty() {
            return Err(RpaError::NotFound(format!("Constancia {} no tiene documento", id)).into());
        }
        self.locate_document(&record.document)
            .ok_or_else(|| RpaError::NotFound(format!("Archivo {} no encontrado", record.document)).into())
    }

    fn locate_document(&self, file_name: &str) -> Option<PathBuf> {
        // only a bare file name may come out of the sheet
        if file_name.contains('/') || file_name.contains('\\') || file_name.contains("..") {
            warn!("Refusing suspicious document name {}", file_name);
            return None;
        }
        self.pdf_dirs.iter().map(|dir| dir.join(file_name)).find(|path| path.is_file())
    }
}
