//! Error types for Vitrina

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VitrinaError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("a reason is required when moving to {0}")]
    ReasonRequired(String),

    #[error("reopening requests is disabled")]
    ReopenDisabled,
}

pub type Result<T> = std::result::Result<T, VitrinaError>;
