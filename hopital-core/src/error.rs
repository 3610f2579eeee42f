use thiserror::Error;

#[derive(Error, Debug)]
pub enum HopitalError {
    #[error("{message}")]
    Validation { field: String, message: String },

    #[error("JSON invalide : {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Échec de l'export : {0}")]
    Export(String),
}

impl HopitalError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HopitalError>;
