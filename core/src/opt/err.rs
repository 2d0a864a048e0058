//! Error type for optimizer configuration and pass failures.

use crate::error::{East3ErrorExt, Level};
use crate::location::Location;

#[derive(Debug, Clone)]
pub struct OptimizerError {
    level: Level,
    message: String,
    issuer: String,
    location: Option<Location>,
}

impl OptimizerError {
    pub fn with(level: Level, message: String, issuer: String, location: Option<Location>) -> Self {
        OptimizerError { level, message, issuer, location }
    }

    /// Shorthand for an `Error`-level failure with no location.
    pub fn boxed(message: impl Into<String>, issuer: &str) -> Box<dyn East3ErrorExt> {
        Box::new(OptimizerError::with(Level::Error, message.into(), issuer.to_string(), None))
    }
}

impl std::fmt::Display for OptimizerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loc_str = match &self.location {
            Some(loc) => loc.to_string(),
            None => "unknown".to_string(),
        };
        write!(f, "EAST3 | {} | {} | {} | {}", self.level, loc_str, self.issuer, self.message)
    }
}

impl std::error::Error for OptimizerError {}

impl East3ErrorExt for OptimizerError {
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
