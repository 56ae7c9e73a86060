//! Configuration parsing and validation errors.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KDL parse error: {0}")]
    Parse(#[from] kdl::KdlError),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("duplicate definition: {0}")]
    Duplicate(String),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("unsupported backend '{0}', expected single_host or cluster")]
    UnsupportedBackend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad class of a [`ConfigError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed field.
    Schema,
    /// A name that points at nothing declared.
    Reference,
    UnsupportedBackend,
    Io,
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::Parse(_)
            | ConfigError::MissingField(_)
            | ConfigError::InvalidValue { .. }
            | ConfigError::Duplicate(_) => ErrorKind::Schema,
            ConfigError::InvalidReference(_) => ErrorKind::Reference,
            ConfigError::UnsupportedBackend(_) => ErrorKind::UnsupportedBackend,
            ConfigError::Io(_) => ErrorKind::Io,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Schema => "schema",
            ErrorKind::Reference => "reference",
            ErrorKind::UnsupportedBackend => "unsupported-backend",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

/// Every error found in one validation pass.
#[derive(Debug)]
pub struct ValidationErrors(Vec<ConfigError>);

impl ValidationErrors {
    pub fn new(errors: Vec<ConfigError>) -> Self {
        Self(errors)
    }

    pub fn errors(&self) -> &[ConfigError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<ConfigError> {
        self.0
    }
}

impl From<ConfigError> for ValidationErrors {
    fn from(error: ConfigError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration has {} error(s)", self.0.len())?;
        for error in &self.0 {
            write!(f, "\n  - {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Something worth telling the user that does not stop generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
