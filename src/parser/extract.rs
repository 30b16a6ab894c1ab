//! Pulls student and person records out of portal result pages.
//!
//! Each extractor runs a fixed sequence of strategies, from the most
//! structured (table rows) to brute force over every text line, and stops at
//! the first one that yields data.

use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::classify::{
    is_enrollment_status, looks_like_full_name, looks_like_name, looks_like_program,
};
use super::dom::{element_lines, element_text, own_text, select_all, select_within, visible_lines};

const REGISTRY_NOT_FOUND: &[&str] = &[
    "no se encontraron resultados",
    "no encontrado",
    "sin resultados",
    "no existe",
    "error en la búsqueda",
];

const IDENTITY_NOT_FOUND: &[&str] = &[
    "no se encontraron datos",
    "dni no encontrado",
    "no existe",
    "error en la consulta",
    "datos no disponibles",
];

const LABEL_WORDS: &[&str] = &["nombre", "apellido", "dni", "documento"];

#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    /// The page says there is no match.
    NotFound(&'static str),
    Found { record: T, strategy: &'static str },
    /// Nothing recognisable on the page.
    Unreadable,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentFields {
    pub code: String,
    pub name: Option<String>,
    pub program: Option<String>,
    pub faculty: Option<String>,
    pub status: Option<String>,
}

impl StudentFields {
    fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            ..Default::default()
        }
    }

    fn has_data(&self) -> bool {
        self.name.is_some()
            || self.program.is_some()
            || self.faculty.is_some()
            || self.status.is_some()
    }

    /// Files one piece of text under the first empty field it fits.
    fn absorb(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() || text == self.code {
            return;
        }
        let lower = text.to_lowercase();

        if lower.starts_with("facultad") {
            if self.faculty.is_none() {
                self.faculty = Some(text.to_string());
            }
        } else if looks_like_program(text) && self.program.is_none() {
            self.program = Some(text.to_string());
        } else if looks_like_name(text) && self.name.is_none() {
            self.name = Some(text.to_string());
        } else if is_enrollment_status(text) && self.status.is_none() {
            self.status = Some(text.to_string());
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonFields {
    pub given_names: Option<String>,
    pub paternal_surname: Option<String>,
    pub maternal_surname: Option<String>,
    pub full_name: Option<String>,
}

impl PersonFields {
    fn has_data(&self) -> bool {
        self.given_names.is_some() || self.full_name.is_some()
    }

    fn compose_full_name(&mut self) {
        if let Some(given) = &self.given_names {
            let mut full = given.clone();
            for part in [&self.paternal_surname, &self.maternal_surname].into_iter().flatten() {
                full.push(' ');
                full.push_str(part);
            }
            self.full_name = Some(full);
        }
    }
}

pub fn registry_not_found(html: &str) -> Option<&'static str> {
    let lower = html.to_lowercase();
    REGISTRY_NOT_FOUND.iter().copied().find(|m| lower.contains(m))
}

pub fn identity_not_found(lines: &[String]) -> Option<&'static str> {
    let lower = lines.join("\n").to_lowercase();
    IDENTITY_NOT_FOUND.iter().copied().find(|m| lower.contains(m))
}

/// Extracts the student row for `code` from a registry result page.
pub fn extract_student(html: &str, code: &str) -> Extraction<StudentFields> {
    if let Some(message) = registry_not_found(html) {
        info!("Registry reports no match: {}", message);
        return Extraction::NotFound(message);
    }

    let document = Html::parse_document(html);
    let strategies: [(&'static str, fn(&Html, &str) -> Option<StudentFields>); 4] = [
        ("table", student_from_tables),
        ("container", student_from_containers),
        ("page text", student_from_page_text),
        ("brute force", student_brute_force),
    ];

    for (name, strategy) in strategies {
        debug!("Trying student strategy: {}", name);
        if let Some(record) = strategy(&document, code) {
            info!("Student data extracted by {} strategy", name);
            return Extraction::Found { record, strategy: name };
        }
    }

    Extraction::Unreadable
}

fn student_from_tables(document: &Html, code: &str) -> Option<StudentFields> {
    for row in select_all(document, "tr") {
        if !element_text(row).contains(code) {
            continue;
        }
        let cells: Vec<String> = select_within(row, "td")
            .into_iter()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .collect();
        debug!("Row with code has cells: {:?}", cells);

        let mut fields = StudentFields::new(code);
        for cell in &cells {
            fields.absorb(cell);
        }
        if fields.has_data() {
            return Some(fields);
        }
    }
    None
}

fn student_from_containers(document: &Html, code: &str) -> Option<StudentFields> {
    for element in select_all(document, "body *") {
        if !own_text(element).contains(code) {
            continue;
        }
        let Some(parent) = element.parent().and_then(scraper::ElementRef::wrap) else {
            continue;
        };
        let lines = element_lines(parent);
        if lines.join("\n").chars().count() <= 20 {
            continue;
        }
        if let Some(fields) = student_near_code(&lines, code) {
            if fields.name.is_some() {
                return Some(fields);
            }
        }
    }
    None
}

fn student_from_page_text(document: &Html, code: &str) -> Option<StudentFields> {
    let lines = visible_lines(document);
    student_near_code(&lines, code)
}

fn student_brute_force(document: &Html, code: &str) -> Option<StudentFields> {
    let mut fields = StudentFields::new(code);
    for line in visible_lines(document) {
        if line.chars().count() <= 5 || line.contains(code) {
            continue;
        }
        if fields.name.is_none() && looks_like_name(&line) {
            fields.name = Some(line.clone());
        }
        if fields.program.is_none() && looks_like_program(&line) {
            fields.program = Some(line);
        }
    }
    fields.has_data().then_some(fields)
}

/// Classifies the lines from two above to two below the first line that
/// mentions `code`. The code line itself counts with the code removed.
fn student_near_code(lines: &[String], code: &str) -> Option<StudentFields> {
    let index = lines.iter().position(|l| l.contains(code))?;
    let start = index.saturating_sub(2);
    let end = (index + 3).min(lines.len());

    let mut fields = StudentFields::new(code);
    for (i, line) in lines[start..end].iter().enumerate() {
        if start + i == index {
            let rest = line.replace(code, " ");
            let rest = rest
                .split_whitespace()
                .filter(|w| !w.ends_with(':'))
                .collect::<Vec<_>>()
                .join(" ");
            fields.absorb(&rest);
        } else {
            fields.absorb(line);
        }
    }
    fields.has_data().then_some(fields)
}

/// Extracts the person behind a national ID from an identity portal page.
pub fn extract_person(html: &str) -> Extraction<PersonFields> {
    let document = Html::parse_document(html);
    let lines = visible_lines(&document);

    if let Some(message) = identity_not_found(&lines) {
        info!("Identity portal reports no match: {}", message);
        return Extraction::NotFound(message);
    }

    if let Some(record) = person_from_lines(&lines) {
        return Extraction::Found { record, strategy: "labelled text" };
    }
    if let Some(record) = person_from_tables(&document) {
        return Extraction::Found { record, strategy: "table" };
    }
    if let Some(record) = person_from_elements(&document) {
        return Extraction::Found { record, strategy: "text elements" };
    }

    Extraction::Unreadable
}

fn is_label(text: &str) -> bool {
    let lower = text.to_lowercase();
    LABEL_WORDS.iter().any(|w| lower.contains(w))
}

fn person_from_lines(lines: &[String]) -> Option<PersonFields> {
    let mut fields = PersonFields::default();

    for (i, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        // a label stands alone on its line; table header rows are handled elsewhere
        if !(lower.contains("nombre") || lower.contains("apellido"))
            || line.split_whitespace().count() > 3
        {
            continue;
        }
        let Some(value) = lines.get(i + 1).map(|v| v.trim()) else {
            continue;
        };
        if value.chars().count() <= 2
            || value.chars().any(|c| c.is_ascii_digit())
            || is_label(value)
        {
            continue;
        }
        let slot = if lower.contains("nombre") {
            &mut fields.given_names
        } else if lower.contains("paterno") {
            &mut fields.paternal_surname
        } else if lower.contains("materno") {
            &mut fields.maternal_surname
        } else {
            continue;
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    if fields.given_names.is_some() {
        fields.compose_full_name();
    } else {
        fields.full_name = lines
            .iter()
            .find(|l| !is_label(l) && looks_like_full_name(l))
            .cloned();
    }

    fields.has_data().then_some(fields)
}

fn person_from_tables(document: &Html) -> Option<PersonFields> {
    for table in select_all(document, "table") {
        let rows = select_within(table, "tr");
        let header: Vec<String> = rows
            .first()
            .map(|r| {
                select_within(*r, "th, td")
                    .into_iter()
                    .map(|c| element_text(c).to_lowercase())
                    .collect()
            })
            .unwrap_or_default();

        // header-driven: columns named nombres / paterno / materno
        if header.iter().any(|h| h.contains("nombre")) {
            for row in rows.iter().skip(1) {
                let cells: Vec<String> =
                    select_within(*row, "td").into_iter().map(element_text).collect();
                let mut fields = PersonFields::default();
                for (h, value) in header.iter().zip(cells.iter()) {
                    if value.is_empty() {
                        continue;
                    }
                    if h.contains("paterno") {
                        fields.paternal_surname = Some(value.clone());
                    } else if h.contains("materno") {
                        fields.maternal_surname = Some(value.clone());
                    } else if h.contains("nombre") {
                        fields.given_names = Some(value.clone());
                    }
                }
                if fields.given_names.is_some() {
                    fields.compose_full_name();
                    return Some(fields);
                }
            }
        }

        for row in &rows {
            let cells: Vec<String> =
                select_within(*row, "td").into_iter().map(element_text).collect();
            if cells.len() < 2 {
                continue;
            }
            if let Some(name) = cells.iter().find(|c| looks_like_full_name(c)) {
                return Some(PersonFields {
                    full_name: Some(name.clone()),
                    ..Default::default()
                });
            }
        }
    }
    None
}

fn person_from_elements(document: &Html) -> Option<PersonFields> {
    select_all(document, "body *")
        .into_iter()
        .map(own_text)
        .find(|text| !is_label(text) && looks_like_full_name(text))
        .map(|name| PersonFields {
            full_name: Some(name),
            ..Default::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CODE: &str = "20220259H";

    fn found<T: std::fmt::Debug>(extraction: Extraction<T>) -> (T, &'static str) {
        match extraction {
            Extraction::Found { record, strategy } => (record, strategy),
            other => panic!("expected a record, got {:?}", other),
        }
    }

    #[test]
    fn test_student_from_table() {
        let html = r#"<html><body><table>
            <tr><th>Código</th><th>Alumno</th><th>Especialidad</th><th>Situación</th></tr>
            <tr><td>20210001A</td><td>PEREZ GOMEZ JUAN</td><td>Ingeniería Civil</td><td>Activo</td></tr>
            <tr><td>20220259H</td><td>PINTO RAMOS KEVIN EDUARDO</td><td>Ingeniería Eléctrica</td><td>Egresado</td></tr>
        </table></body></html>"#;

        let (record, strategy) = found(extract_student(html, CODE));
        assert_eq!(strategy, "table");
        assert_eq!(record.code, CODE);
        assert_eq!(record.name.as_deref(), Some("PINTO RAMOS KEVIN EDUARDO"));
        assert_eq!(record.program.as_deref(), Some("Ingeniería Eléctrica"));
        assert_eq!(record.status.as_deref(), Some("Egresado"));
    }

    #[test]
    fn test_student_from_container() {
        let html = r#"<html><body>
            <div class="card">
                <h3>Kevin Eduardo Pinto</h3>
                <span class="code">20220259H</span>
                <p>Facultad de Ingeniería Eléctrica y Electrónica</p>
                <p>Ingeniería de Telecomunicaciones</p>
            </div>
        </body></html>"#;

        let (record, strategy) = found(extract_student(html, CODE));
        assert_eq!(strategy, "container");
        assert_eq!(record.name.as_deref(), Some("Kevin Eduardo Pinto"));
        assert_eq!(
            record.faculty.as_deref(),
            Some("Facultad de Ingeniería Eléctrica y Electrónica")
        );
        assert_eq!(record.program.as_deref(), Some("Ingeniería de Telecomunicaciones"));
    }

    #[test]
    fn test_student_code_line_carries_name() {
        let html = r#"<html><body>
            <p>Resultado de búsqueda</p>
            <p>Código: 20220259H PINTO RAMOS KEVIN</p>
        </body></html>"#;

        let (record, _) = found(extract_student(html, CODE));
        assert_eq!(record.name.as_deref(), Some("PINTO RAMOS KEVIN"));
    }

    #[test]
    fn test_student_brute_force() {
        let html = r#"<html><body>
            <input type="hidden" value="20220259H">
            <div><b>Pinto Ramos Kevin</b></div>
            <div>Ciencias de la Computación</div>
        </body></html>"#;

        let (record, strategy) = found(extract_student(html, CODE));
        assert_eq!(strategy, "brute force");
        assert_eq!(record.name.as_deref(), Some("Pinto Ramos Kevin"));
        assert_eq!(record.program.as_deref(), Some("Ciencias de la Computación"));
    }

    #[test]
    fn test_student_not_found_message() {
        let html =
            "<html><body><div class='alert'>No se encontraron resultados</div></body></html>";
        assert_eq!(
            extract_student(html, CODE),
            Extraction::NotFound("no se encontraron resultados")
        );
    }

    #[test]
    fn test_student_unreadable() {
        let html = "<html><body><p>20220259H</p><p>ok</p></body></html>";
        assert_eq!(extract_student(html, CODE), Extraction::Unreadable);
    }

    #[test]
    fn test_person_from_labels() {
        let html = r#"<html><body>
            <h2>Buscar datos por DNI</h2>
            <div>Nombres</div><div>JUAN CARLOS</div>
            <div>Apellido Paterno</div><div>PEREZ</div>
            <div>Apellido Materno</div><div>GARCIA</div>
        </body></html>"#;

        let (record, strategy) = found(extract_person(html));
        assert_eq!(strategy, "labelled text");
        assert_eq!(record.given_names.as_deref(), Some("JUAN CARLOS"));
        assert_eq!(record.paternal_surname.as_deref(), Some("PEREZ"));
        assert_eq!(record.maternal_surname.as_deref(), Some("GARCIA"));
        assert_eq!(record.full_name.as_deref(), Some("JUAN CARLOS PEREZ GARCIA"));
    }

    #[test]
    fn test_person_from_header_table() {
        let html = r#"<html><body><table>
            <thead><tr><th>Número</th><th>Nombres</th><th>Apellido Paterno</th><th>Apellido Materno</th></tr></thead>
            <tbody><tr><td>12345678</td><td>MARIA ELENA</td><td>QUISPE</td><td>MAMANI</td></tr></tbody>
        </table></body></html>"#;

        let (record, strategy) = found(extract_person(html));
        assert_eq!(strategy, "table");
        assert_eq!(record.full_name.as_deref(), Some("MARIA ELENA QUISPE MAMANI"));
    }

    #[test]
    fn test_person_full_name_line() {
        let html = r#"<html><body>
            <h1>Consulta</h1>
            <p>Resultado</p>
            <p>ROSA MARIA TORRES VEGA</p>
        </body></html>"#;

        let (record, _) = found(extract_person(html));
        assert_eq!(record.full_name.as_deref(), Some("ROSA MARIA TORRES VEGA"));
        assert!(record.given_names.is_none());
    }

    #[test]
    fn test_person_not_found() {
        let html = "<html><body><p>DNI no encontrado en la base</p></body></html>";
        assert_eq!(extract_person(html), Extraction::NotFound("dni no encontrado"));
    }
}
