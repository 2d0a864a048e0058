//! Error type for malformed or unsupported EAST3 documents.

use crate::error::{East3ErrorExt, Level};
use crate::location::Location;

#[derive(Debug, Clone)]
pub struct DocumentError {
    level: Level,
    message: String,
    issuer: String,
    location: Option<Location>,
}

impl DocumentError {
    pub fn with(level: Level, message: String, issuer: String, location: Option<Location>) -> Self {
        DocumentError { level, message, issuer, location }
    }
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loc_str = match &self.location {
            Some(loc) => loc.to_string(),
            None => "unknown".to_string(),
        };
        write!(f, "EAST3 | {} | {} | {} | {}", self.level, loc_str, self.issuer, self.message)
    }
}

impl std::error::Error for DocumentError {}

impl East3ErrorExt for DocumentError {
    fn level(&self) -> Level {
        self.level
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn issuer(&self) -> String {
        self.issuer.clone()
    }

    fn location(&self) -> Option<Location> {
        self.location.clone()
    }
}
