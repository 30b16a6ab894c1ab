use chrono::{Datelike, Local, NaiveDate, NaiveDateTime};
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::Config;
use crate::error::{Result, RpaError};

// US Letter, in points
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const BODY_LEFT: f32 = 100.0;
const LINE_STEP: f32 = 25.0;
// average Helvetica glyph width relative to the font size
const GLYPH_WIDTH: f32 = 0.55;

const MONTHS: [&str; 12] = [
    "enero", "febrero", "marzo", "abril", "mayo", "junio", "julio", "agosto", "septiembre",
    "octubre", "noviembre", "diciembre",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CertificateData {
    pub name: String,
    pub code: String,
    pub program: String,
    pub term: String,
}

/// `16 de octubre de 2026`, day zero-padded.
pub fn spanish_long_date(date: NaiveDate) -> String {
    format!("{:02} de {} de {}", date.day(), MONTHS[date.month0() as usize], date.year())
}

pub fn body_lines(data: &CertificateData, city: &str, date: NaiveDate) -> Vec<String> {
    vec![
        "Por medio de la presente se hace constar que:".to_string(),
        String::new(),
        format!("Nombre del Estudiante: {}", data.name),
        format!("Código de Alumno: {}", data.code),
        format!("Carrera: {}", data.program),
        format!("Ciclo Académico: {}", data.term),
        String::new(),
        "Se encuentra matriculado y cursando estudios regulares".to_string(),
        "en esta casa de estudios superiores.".to_string(),
        String::new(),
        "Se expide la presente constancia a solicitud del interesado".to_string(),
        "para los fines que estime conveniente.".to_string(),
        String::new(),
        format!("{}, {}", city, spanish_long_date(date)),
    ]
}

pub fn file_name(code: &str, at: NaiveDateTime) -> String {
    format!("constancia_{}_{}.pdf", code, at.format("%Y%m%d_%H%M%S"))
}

fn pt(value: f32) -> Mm {
    Mm(value * 25.4 / 72.0)
}

fn centred(layer: &PdfLayerReference, text: &str, size: f32, y: f32, font: &IndirectFontRef) {
    let width = text.chars().count() as f32 * size * GLYPH_WIDTH;
    let x = ((PAGE_WIDTH - width) / 2.0).max(0.0);
    layer.use_text(text, size, pt(x), pt(y), font);
}

/// Renders study certificates into the configured output directory.
pub struct CertificateWriter {
    output_dir: PathBuf,
    university: String,
    city: String,
}

impl CertificateWriter {
    pub fn new(config: &Config) -> Self {
        Self {
            output_dir: config.storage.pdf_dir.clone(),
            university: config.certificate.university.clone(),
            city: config.certificate.city.clone(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes the certificate and returns its file name.
    pub fn write(&self, data: &CertificateData) -> Result<String> {
        self.write_at(data, Local::now().naive_local())
    }

    pub fn write_at(&self, data: &CertificateData, at: NaiveDateTime) -> Result<String> {
        fs::create_dir_all(&self.output_dir)?;
        let name = file_name(&data.code, at);
        let path = self.output_dir.join(&name);

        let (doc, page, layer) = PdfDocument::new(
            "Constancia de Estudios",
            pt(PAGE_WIDTH),
            pt(PAGE_HEIGHT),
            "Layer 1",
        );
        let bold = doc.add_builtin_font(BuiltinFont::HelveticaBold)?;
        let regular = doc.add_builtin_font(BuiltinFont::Helvetica)?;
        let italic = doc.add_builtin_font(BuiltinFont::HelveticaOblique)?;
        let layer = doc.get_page(page).get_layer(layer);

        centred(&layer, &self.university, 20.0, PAGE_HEIGHT - 100.0, &bold);
        centred(&layer, "CONSTANCIA DE ESTUDIOS", 16.0, PAGE_HEIGHT - 140.0, &bold);

        let mut y = PAGE_HEIGHT - 200.0;
        for line in body_lines(data, &self.city, at.date()) {
            if !line.is_empty() {
                layer.use_text(line, 12.0, pt(BODY_LEFT), pt(y), &regular);
            }
            y -= LINE_STEP;
        }

        centred(&layer, "Firma pendiente de autoridad competente", 10.0, 150.0, &italic);
        centred(&layer, "Coordinación Académica", 10.0, 130.0, &italic);

        let file = File::create(&path)
            .map_err(|e| RpaError::DocumentError(format!("Failed to create {:?}: {}", path, e)))?;
        doc.save(&mut BufWriter::new(file))?;

        info!("PDF generated: {}", name);
        Ok(name)
    }
}
