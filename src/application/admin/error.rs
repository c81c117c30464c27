use thiserror::Error;

use crate::application::repos::RepoError;
use crate::domain::error::DomainError;

/// Failure of a management operation.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    Conflict { message: String },
    #[error("operator is not allowed to modify this application")]
    Forbidden,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error(transparent)]
    Repo(RepoError),
}

impl AdminError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

impl From<DomainError> for AdminError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => Self::Validation { message },
        }
    }
}

// Unique constraints can still fire after a service's own lookup when writers race.
impl From<RepoError> for AdminError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::Duplicate { constraint } => Self::Conflict {
                message: conflict_message(&constraint).to_string(),
            },
            RepoError::InvalidInput { message } => Self::Validation { message },
            other => Self::Repo(other),
        }
    }
}

fn conflict_message(constraint: &str) -> &'static str {
    if constraint.starts_with("flags_") {
        "a flag with this key already exists in the application"
    } else if constraint.starts_with("tags_") {
        "a tag with this name already exists in the application"
    } else {
        "record already exists"
    }
}

pub(crate) fn require_trimmed(value: &str, field: &'static str) -> Result<String, AdminError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AdminError::validation(format!("{field} must not be blank")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn optional_trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
