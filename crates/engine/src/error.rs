use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// Malformed or missing input field.
    InvalidInput(String),
    /// Date string that is not `YYYY-MM-DD`.
    InvalidDate { field: String, value: String },
    /// Referenced record is absent.
    NotFound { entity: &'static str, id: String },
    /// Name that must be unique is already taken.
    Duplicate { entity: &'static str, name: String },
    /// Engine config parse / validation error.
    Config(String),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::InvalidDate { field, value } => {
                write!(f, "invalid date for '{field}': '{value}' (expected YYYY-MM-DD)")
            }
            Self::NotFound { entity, id } => write!(f, "{entity} {id} not found"),
            Self::Duplicate { entity, name } => write!(f, "{entity} '{name}' already exists"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for LedgerError {}
