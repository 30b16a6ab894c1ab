use thiserror::Error;

pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Error, Debug)]
pub enum RpaError {
    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Document error: {0}")]
    DocumentError(String),
}

impl RpaError {
    /// Looks through a boxed error for an `RpaError`.
    pub fn find<'a>(err: &'a (dyn std::error::Error + Send + Sync + 'static)) -> Option<&'a RpaError> {
        err.downcast_ref::<RpaError>()
    }
}

// Conversion implementations for common error types
impl From<std::io::Error> for RpaError {
    fn from(err: std::io::Error) -> Self {
        RpaError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for RpaError {
    fn from(err: serde_json::Error) -> Self {
        RpaError::ParseError(err.to_string())
    }
}

impl From<toml::de::Error> for RpaError {
    fn from(err: toml::de::Error) -> Self {
        RpaError::ConfigError(err.to_string())
    }
}

impl From<chromiumoxide::error::CdpError> for RpaError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        RpaError::BrowserError(err.to_string())
    }
}

impl From<calamine::XlsxError> for RpaError {
    fn from(err: calamine::XlsxError) -> Self {
        RpaError::StorageError(err.to_string())
    }
}

impl From<rust_xlsxwriter::XlsxError> for RpaError {
    fn from(err: rust_xlsxwriter::XlsxError) -> Self {
        RpaError::StorageError(err.to_string())
    }
}

impl From<printpdf::Error> for RpaError {
    fn from(err: printpdf::Error) -> Self {
        RpaError::DocumentError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_through_box() {
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(RpaError::NotFound("abc12345".to_string()));
        match RpaError::find(boxed.as_ref()) {
            Some(RpaError::NotFound(id)) => assert_eq!(id, "abc12345"),
            other => panic!("unexpected: {:?}", other),
        }

        let io: Box<dyn std::error::Error + Send + Sync> =
            Box::new(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(RpaError::find(io.as_ref()).is_none());
    }

    #[test]
    fn test_validation_message_is_bare() {
        let err = RpaError::ValidationError("Campo nombre es requerido".to_string());
        assert_eq!(err.to_string(), "Campo nombre es requerido");
    }
}
