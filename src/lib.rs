pub mod api;
pub mod browser;
pub mod certificate;
pub mod config;
pub mod error;
pub mod parser;
pub mod service;
pub mod tracking;
pub mod validation;

pub use error::{Result, RpaError};
pub use config::Config;
pub use service::CertificateService;
