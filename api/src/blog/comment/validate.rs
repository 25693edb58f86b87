use axum::http::StatusCode;
use serde::Serialize;

use crate::error::ApiRequestError;

pub const NAME_MIN_CHARS: usize = 2;
pub const NAME_MAX_CHARS: usize = 50;
pub const COMMENT_MIN_CHARS: usize = 10;
pub const COMMENT_MAX_CHARS: usize = 500;

/// Per-field messages shown next to the offending input. `general` holds
/// problems that are not tied to a single field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldErrors {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub general: Option<String>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.comment.is_none() && self.general.is_none()
    }

    fn summary(&self) -> String {
        [&self.name, &self.comment, &self.general]
            .into_iter()
            .flatten()
            .cloned()
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Missing required fields")]
    MissingFields,

    #[error("Post ID is required")]
    MissingPostId,

    #[error("Post ID must be a number")]
    InvalidPostId,

    #[error("{}", .0.summary())]
    Fields(FieldErrors),
}

impl ApiRequestError for ValidationError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn code(&self) -> &'static str {
        "VALIDATION_ERR"
    }

    fn fields(&self) -> Option<FieldErrors> {
        match self {
            ValidationError::Fields(errors) => Some(errors.clone()),
            _ => None,
        }
    }
}

/// Trimmed input that passed every length check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidComment {
    pub name: String,
    pub comment: String,
}

pub fn validate(name: &str, comment: &str) -> Result<ValidComment, FieldErrors> {
    let name = name.trim();
    let comment = comment.trim();

    let errors = FieldErrors {
        name: check_length("Name", name, NAME_MIN_CHARS, NAME_MAX_CHARS),
        comment: check_length("Comment", comment, COMMENT_MIN_CHARS, COMMENT_MAX_CHARS),
        general: None,
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ValidComment {
        name: name.to_string(),
        comment: comment.to_string(),
    })
}

fn check_length(field: &str, value: &str, min: usize, max: usize) -> Option<String> {
    let len = value.chars().count();
    if len == 0 {
        Some(format!("{field} is required"))
    } else if len < min {
        Some(format!("{field} must be at least {min} characters"))
    } else if len > max {
        Some(format!("{field} must be at most {max} characters"))
    } else {
        None
    }
}

pub fn parse_post_id(raw: &str) -> Result<i32, ValidationError> {
    raw.trim()
        .parse()
        .map_err(|_| ValidationError::InvalidPostId)
}
