//! Multi-strategy lookup of the search field and search button on portal
//! pages whose markup is not known ahead of time. Every strategy runs against
//! an HTML snapshot and answers with a CSS path the live page can act on.

use scraper::{ElementRef, Html};
use serde::Serialize;
use tracing::{debug, info};

use super::dom::{attr, css_path, effective_type, element_text, is_usable, select_all};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Located {
    /// Structural CSS path of the chosen element.
    pub selector: String,
    /// The rule that picked it, for logs.
    pub matched_by: String,
}

impl Located {
    fn new(element: ElementRef, matched_by: impl Into<String>) -> Self {
        Self {
            selector: css_path(element),
            matched_by: matched_by.into(),
        }
    }
}

const TEXT_INPUTS: &str = "input[type='text'], input:not([type])";

const CODE_FIELD_SELECTORS: &[&str] = &[
    "input[name='codigo']",
    "input[id='codigo']",
    "input[name='codigoAlumno']",
    "input[id='codigoAlumno']",
    "input[placeholder*='código']",
    "input[placeholder*='Código']",
    "input[placeholder*='alumno']",
    "input[class*='codigo']",
    "input[class*='alumno']",
];

const CODE_FIELD_KEYWORDS: &[&str] = &["codigo", "alumno", "estudiante", "buscar"];

// any input type, not only text; catches type=search and type=number fields
const CODE_FIELD_LOOSE: &[&str] = &[
    "input[placeholder*='código'], input[placeholder*='Código']",
    "input[name*='codigo'], input[name*='alumno']",
];

const DNI_FIELD_SELECTORS: &[&str] = &[
    "input[name*='dni']",
    "input[id*='dni']",
    "input[placeholder*='DNI']",
    "input[placeholder*='dni']",
    "input[type='text']",
    "input[name*='documento']",
    "input[id*='documento']",
];

const SEARCH_BUTTON_SELECTORS: &[&str] = &[
    "button[type='submit']",
    "input[type='submit']",
    "button[value*='Buscar']",
    "input[value*='Buscar']",
    "button[value*='BUSCAR']",
    "input[value*='BUSCAR']",
    "button[class*='btn']",
    "input[class*='btn']",
];

const DNI_BUTTON_SELECTORS: &[&str] = &[
    "button[type='submit']",
    "input[type='submit']",
    "input[value*='Buscar']",
    ".btn",
    "button",
];

const BUTTON_KEYWORDS: &[&str] = &["buscar", "search", "consultar", "enviar", "submit"];

fn first_usable<'a>(document: &'a Html, selectors: &[&str]) -> Option<(ElementRef<'a>, String)> {
    for css in selectors {
        if let Some(el) = select_all(document, css).into_iter().find(|el| is_usable(*el)) {
            return Some((el, css.to_string()));
        }
    }
    None
}

fn button_label(element: ElementRef) -> String {
    element_text(element).to_lowercase()
}

fn says_search(element: ElementRef) -> bool {
    button_label(element).contains("buscar")
        || attr(element, "value").to_lowercase().contains("buscar")
        || effective_type(element) == "submit"
}

/// Finds the student code input on the registry search page.
pub fn find_code_field(document: &Html) -> Option<Located> {
    info!("Looking for student code field with specific selectors");
    if let Some((el, css)) = first_usable(document, CODE_FIELD_SELECTORS) {
        info!("Code field found with selector: {}", css);
        return Some(Located::new(el, css));
    }

    info!("Looking through all text inputs");
    let inputs: Vec<ElementRef> = select_all(document, TEXT_INPUTS)
        .into_iter()
        .filter(|el| is_usable(*el))
        .collect();
    debug!("Found {} usable text inputs", inputs.len());

    for (i, input) in inputs.iter().enumerate() {
        let haystack = format!(
            "{} {} {} {}",
            attr(*input, "name"),
            attr(*input, "id"),
            attr(*input, "placeholder"),
            attr(*input, "class")
        )
        .to_lowercase();
        debug!("Input {}: {}", i, haystack.trim());

        if CODE_FIELD_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            info!("Code field found by keyword on input {}", i);
            return Some(Located::new(*input, format!("keyword match on text input {}", i)));
        }
    }
    if let Some(first) = inputs.first() {
        info!("Using first usable text input as code field");
        return Some(Located::new(*first, "first text input"));
    }

    info!("Looking for code field by loose attribute match");
    first_usable(document, CODE_FIELD_LOOSE).map(|(el, css)| Located::new(el, css))
}

/// Finds the national ID input on the identity portal.
pub fn find_dni_field(document: &Html) -> Option<Located> {
    info!("Looking for DNI field");
    if let Some((el, css)) = first_usable(document, DNI_FIELD_SELECTORS) {
        info!("DNI field found with selector: {}", css);
        return Some(Located::new(el, css));
    }

    select_all(document, TEXT_INPUTS)
        .into_iter()
        .next()
        .filter(|el| is_usable(*el))
        .map(|el| {
            info!("Using first text input as DNI field");
            Located::new(el, "first text input")
        })
}

/// Finds the button that submits a registry search. `None` means the caller
/// should press Enter in the field instead.
pub fn find_search_button(document: &Html) -> Option<Located> {
    info!("Looking for search button");
    for css in SEARCH_BUTTON_SELECTORS {
        for el in select_all(document, css) {
            if is_usable(el) && says_search(el) {
                info!("Search button found: {}", css);
                return Some(Located::new(el, *css));
            }
        }
    }

    let candidates: Vec<ElementRef> = select_all(document, "button, input[type='submit']")
        .into_iter()
        .filter(|el| is_usable(*el))
        .collect();
    debug!("Found {} usable buttons", candidates.len());

    for (i, button) in candidates.iter().enumerate() {
        let haystack = format!(
            "{} {} {}",
            button_label(*button),
            attr(*button, "value"),
            attr(*button, "onclick")
        )
        .to_lowercase();

        if BUTTON_KEYWORDS.iter().any(|k| haystack.contains(k)) {
            info!("Search button found by keyword: {}", i);
            return Some(Located::new(*button, format!("keyword match on button {}", i)));
        }
    }
    candidates
        .into_iter()
        .find(|el| effective_type(*el) == "submit")
        .map(|submit| {
            info!("Using first submit button");
            Located::new(submit, "first submit button")
        })
}

/// Finds the identity portal's search button, falling back to the first
/// button on the page.
pub fn find_dni_button(document: &Html) -> Option<Located> {
    info!("Looking for DNI search button");
    for css in DNI_BUTTON_SELECTORS {
        for el in select_all(document, css) {
            if is_usable(el) && says_search(el) {
                info!("DNI search button found: {}", css);
                return Some(Located::new(el, *css));
            }
        }
    }

    select_all(document, "button")
        .into_iter()
        .next()
        .filter(|el| is_usable(*el))
        .map(|el| {
            info!("Using first available button");
            Located::new(el, "first button")
        })
}
