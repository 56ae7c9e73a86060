//! KDL configuration parsing for labgen.
//!
//! This crate handles:
//! - Parsing the unified configuration document (homelab.kdl)
//! - Validation, with every error of a pass collected
//! - Variable interpolation against the document's environment

pub mod document;
pub mod error;
pub mod nodes;
pub mod variables;

pub use document::{Validated, document_dir, validate, validate_at, validate_file};
pub use error::{ConfigError, ConfigResult, ErrorKind, ValidationErrors, ValidationWarning};
pub use variables::VariableContext;
