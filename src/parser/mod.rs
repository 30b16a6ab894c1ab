pub mod classify;
pub mod dom;
pub mod extract;
pub mod locate;

pub use extract::{extract_person, extract_student, Extraction, PersonFields, StudentFields};
pub use locate::{find_code_field, find_dni_button, find_dni_field, find_search_button, Located};
