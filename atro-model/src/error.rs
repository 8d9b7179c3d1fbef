use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("invalid {kind} value '{value}'")]
    InvalidValue { kind: &'static str, value: String },

    #[error("malformed message: {0}")]
    MalformedMessage(String),

    #[error("malformed '{command}' payload: {reason}")]
    MalformedPayload { command: String, reason: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
