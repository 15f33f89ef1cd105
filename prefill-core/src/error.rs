use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrefillError {
    #[error("HTTP {status} from {url}: {detail}")]
    Http {
        url: String,
        status: u16,
        detail: String,
    },

    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid base64 content: {0}")]
    InvalidBase64(#[from] base64::DecodeError),

    #[error("Patient read failed: {message}")]
    PatientRead { message: String },

    #[error("Questionnaire package is missing {what}")]
    MissingArtifact { what: String },

    #[error("Unsupported FHIR version: {0}")]
    UnsupportedFhirVersion(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PrefillError>;
