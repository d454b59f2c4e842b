//! Errors raised while parsing stream records

use thiserror::Error;

/// Errors that can occur while decoding a stream line
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Record '{tag}' expects {expected} fields, found {found}")]
    MissingField {
        tag: char,
        expected: usize,
        found: usize,
    },

    #[error("Record '{tag}': cannot parse '{token}' as a number")]
    InvalidNumber { tag: char, token: String },

    #[error("Record '{tag}': {message}")]
    InvalidValue { tag: char, message: String },
}

impl RecordError {
    /// Attach the input line number, producing the crate-wide error
    pub fn at_line(self, line: usize) -> tinsimp_core::Error {
        tinsimp_core::Error::Parse {
            line,
            message: self.to_string(),
        }
    }
}

impl From<RecordError> for tinsimp_core::Error {
    fn from(e: RecordError) -> Self {
        e.at_line(0)
    }
}
