//! Text classifiers used when portal markup gives no labels: they guess
//! whether a string is a person's name, a degree program or an enrollment
//! status.

const PROGRAM_KEYWORDS: &[&str] = &[
    "ingeniería",
    "ing.",
    "ciencias",
    "arquitectura",
    "administración",
    "economía",
    "derecho",
    "medicina",
    "sistemas",
    "industrial",
    "civil",
    "mecánica",
    "eléctrica",
];

const STATUS_WORDS: &[&str] = &["activo", "inactivo", "egresado", "graduado"];

// words that show up in lookup page chrome and never in a real name
const PAGE_WORDS: &[&str] = &["buscar", "consultar", "datos", "información", "resultado"];

fn capitalized_words(text: &str) -> Option<Vec<&str>> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() < 2 {
        return None;
    }
    let all_upper = words
        .iter()
        .all(|w| w.chars().next().map_or(false, char::is_uppercase));
    if !all_upper {
        return None;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(words)
}

/// A student name as shown by the registry: two or more capitalized words,
/// no digits, at most 50 characters.
pub fn looks_like_name(text: &str) -> bool {
    let len = text.chars().count();
    if len < 3 || len > 50 {
        return false;
    }
    capitalized_words(text).is_some()
}

/// A full name from the identity portal. Same shape as [`looks_like_name`] but
/// allows up to 80 characters and rejects page vocabulary.
pub fn looks_like_full_name(text: &str) -> bool {
    let len = text.chars().count();
    if len < 5 || len > 80 {
        return false;
    }
    match capitalized_words(text) {
        Some(words) => !words
            .iter()
            .any(|w| PAGE_WORDS.contains(&w.to_lowercase().as_str())),
        None => false,
    }
}

pub fn looks_like_program(text: &str) -> bool {
    if text.chars().count() < 5 {
        return false;
    }
    let lower = text.to_lowercase();
    PROGRAM_KEYWORDS.iter().any(|k| lower.contains(k))
}

pub fn is_enrollment_status(text: &str) -> bool {
    STATUS_WORDS.contains(&text.trim().to_lowercase().as_str())
}
