use async_trait::async_trait;
use calamine::{open_workbook, Reader, Xlsx};
use chrono::Local;
use rust_xlsxwriter::{Color, Format, Workbook};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Result, RpaError};

pub const SHEET_NAME: &str = "Seguimiento_Constancias";

pub const HEADERS: [&str; 17] = [
    "ID",
    "Alumno",
    "Codigo",
    "DNI",
    "Correo",
    "Carrera",
    "Ciclo",
    "Documento",
    "Estado",
    "Autoridad",
    "Firma",
    "Fecha_Creacion",
    "Validado_UNI",
    "Validado_DNI",
    "Fuente_Datos",
    "Facultad",
    "Estado_UNI",
];

pub const STATUS_SENT: &str = "Enviado";
pub const STATUS_APPROVED: &str = "Firmado y Aprobado";
pub const SIGNATURE_PENDING: &str = "Pendiente";
pub const SIGNATURE_DONE: &str = "Firmado";

pub fn flag(value: bool) -> String {
    let text = if value { "SÍ" } else { "NO" };
    text.to_string()
}

/// One row of the tracking sheet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub id: String,
    #[serde(rename = "alumno")]
    pub student: String,
    #[serde(rename = "codigo")]
    pub code: String,
    pub dni: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "carrera")]
    pub program: String,
    #[serde(rename = "ciclo")]
    pub term: String,
    #[serde(rename = "documento")]
    pub document: String,
    #[serde(rename = "estado")]
    pub status: String,
    #[serde(rename = "autoridad")]
    pub signer: String,
    #[serde(rename = "firma")]
    pub signature: String,
    #[serde(rename = "fecha")]
    pub created_at: String,
    #[serde(rename = "validado_uni")]
    pub uni_validated: String,
    #[serde(rename = "validado_dni")]
    pub dni_validated: String,
    #[serde(rename = "fuente_datos")]
    pub source: String,
    #[serde(rename = "facultad")]
    pub faculty: String,
    #[serde(rename = "estado_uni")]
    pub uni_status: String,
}

impl TrackingRecord {
    fn to_row(&self) -> [&str; 17] {
        [
            self.id.as_str(),
            self.student.as_str(),
            self.code.as_str(),
            self.dni.as_str(),
            self.email.as_str(),
            self.program.as_str(),
            self.term.as_str(),
            self.document.as_str(),
            self.status.as_str(),
            self.signer.as_str(),
            self.signature.as_str(),
            self.created_at.as_str(),
            self.uni_validated.as_str(),
            self.dni_validated.as_str(),
            self.source.as_str(),
            self.faculty.as_str(),
            self.uni_status.as_str(),
        ]
    }

    /// Missing trailing cells read as empty. Rows without an id are skipped.
    fn from_row(cells: &[String]) -> Option<Self> {
        let cell = |i: usize| cells.get(i).map(|c| c.trim().to_string()).unwrap_or_default();
        let id = cell(0);
        if id.is_empty() {
            return None;
        }
        Some(Self {
            id,
            student: cell(1),
            code: cell(2),
            dni: cell(3),
            email: cell(4),
            program: cell(5),
            term: cell(6),
            document: cell(7),
            status: cell(8),
            signer: cell(9),
            signature: cell(10),
            created_at: cell(11),
            uni_validated: cell(12),
            dni_validated: cell(13),
            source: cell(14),
            faculty: cell(15),
            uni_status: cell(16),
        })
    }
}

/// The fields a caller supplies for a new row; the store fills in the id,
/// the workflow status and the timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewRecord {
    pub student: String,
    pub code: String,
    pub dni: String,
    pub email: String,
    pub program: String,
    pub term: String,
    pub document: String,
    pub uni_validated: bool,
    pub dni_validated: bool,
    pub source: String,
    pub faculty: String,
    pub uni_status: String,
}

#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Appends a row and returns its generated id.
    async fn append(&self, record: NewRecord) -> Result<String>;
    async fn list(&self) -> Result<Vec<TrackingRecord>>;
    async fn find(&self, id: &str) -> Result<Option<TrackingRecord>>;
    async fn sign(&self, id: &str) -> Result<TrackingRecord>;
    async fn remove(&self, id: &str) -> Result<TrackingRecord>;
    /// Backs the sheet up and rewrites it with the header only. Returns the
    /// backup path when there was a file to back up.
    async fn reset(&self) -> Result<Option<PathBuf>>;
}

/// Tracking log kept in a single xlsx workbook. Every operation reads the
/// whole sheet and rewrites it; the mutex keeps writers from interleaving.
pub struct XlsxTrackingStore {
    path: PathBuf,
    signer: String,
    lock: Mutex<()>,
}

impl XlsxTrackingStore {
    pub fn new(path: impl Into<PathBuf>, signer: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            signer: signer.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.storage.tracking_file.clone(), config.certificate.signer.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the workbook with its header row when missing.
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.path.exists() {
            self.write_records(&[])?;
            info!("Tracking workbook created at {:?}", self.path);
        }
        Ok(())
    }

    fn read_records(&self) -> Result<Vec<TrackingRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut workbook: Xlsx<_> = open_workbook(&self.path)?;
        let range = match workbook.worksheet_range(SHEET_NAME) {
            Ok(range) => range,
            Err(e) => {
                debug!("Sheet {} unavailable ({}), reading first sheet", SHEET_NAME, e);
                workbook
                    .worksheet_range_at(0)
                    .ok_or_else(|| RpaError::StorageError(format!("{:?} has no worksheets", self.path)))??
            }
        };

        let records = range
            .rows()
            .skip(1)
            .filter_map(|row| {
                let cells: Vec<String> = row.iter().map(|c| c.to_string()).collect();
                TrackingRecord::from_row(&cells)
            })
            .collect();
        Ok(records)
    }

    fn write_records(&self, records: &[TrackingRecord]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut workbook = Workbook::new();
        let header_format = Format::new()
            .set_bold()
            .set_font_color(Color::White)
            .set_background_color(Color::RGB(0x366092));

        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME)?;
        for (col, header) in HEADERS.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &header_format)?;
        }
        for (i, record) in records.iter().enumerate() {
            let row = i as u32 + 1;
            for (col, value) in record.to_row().iter().enumerate() {
                sheet.write_string(row, col as u16, *value)?;
            }
        }

        workbook.save(&self.path)?;
        debug!("Wrote {} tracking rows to {:?}", records.len(), self.path);
        Ok(())
    }
}

#[async_trait]
impl TrackingStore for XlsxTrackingStore {
    async fn append(&self, record: NewRecord) -> Result<String> {
        let _guard = self.lock.lock().await;
        self.ensure_exists()?;

        let mut records = self.read_records()?;
        let id: String = Uuid::new_v4().to_string().chars().take(8).collect();
        records.push(TrackingRecord {
            id: id.clone(),
            student: record.student,
            code: record.code,
            dni: record.dni,
            email: record.email,
            program: record.program,
            term: record.term,
            document: record.document,
            status: STATUS_SENT.to_string(),
            signer: self.signer.clone(),
            signature: SIGNATURE_PENDING.to_string(),
            created_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            uni_validated: flag(record.uni_validated),
            dni_validated: flag(record.dni_validated),
            source: record.source,
            faculty: record.faculty,
            uni_status: record.uni_status,
        });
        self.write_records(&records)?;

        info!("Tracking row {} added", id);
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<TrackingRecord>> {
        let _guard = self.lock.lock().await;
        self.read_records()
    }

    async fn find(&self, id: &str) -> Result<Option<TrackingRecord>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_records()?.into_iter().find(|r| r.id == id))
    }

    async fn sign(&self, id: &str) -> Result<TrackingRecord> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_records()?;

        let record = records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| RpaError::NotFound(format!("Constancia {} no encontrada", id)))?;
        record.signature = SIGNATURE_DONE.to_string();
        record.status = STATUS_APPROVED.to_string();
        let signed = record.clone();

        self.write_records(&records)?;
        info!("Certificate {} signed", id);
        Ok(signed)
    }

    async fn remove(&self, id: &str) -> Result<TrackingRecord> {
        let _guard = self.lock.lock().await;
        let mut records = self.read_records()?;

        let index = records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| RpaError::NotFound(format!("Constancia {} no encontrada", id)))?;
        let removed = records.remove(index);

        self.write_records(&records)?;
        info!("Tracking row {} removed", id);
        Ok(removed)
    }

    async fn reset(&self) -> Result<Option<PathBuf>> {
        let _guard = self.lock.lock().await;

        let backup = if self.path.exists() {
            let stem = self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "seguimiento".to_string());
            let name = format!("{}_backup_{}.xlsx", stem, Local::now().format("%Y%m%d_%H%M%S"));
            let backup = self.path.with_file_name(name);
            fs::copy(&self.path, &backup)?;
            info!("Backup created: {:?}", backup);
            Some(backup)
        } else {
            warn!("Tracking workbook {:?} not found, creating a fresh one", self.path);
            None
        };

        self.write_records(&[])?;
        info!("Tracking workbook reset");
        Ok(backup)
    }
}
