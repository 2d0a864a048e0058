use std::fmt;

/// Severity attached to every diagnostic produced by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level_str = match self {
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
            Level::Critical => "CRITICAL",
        };
        write!(f, "{}", level_str)
    }
}

/// Common surface of every error the crate returns.
///
/// Public entry points hand back `Box<dyn East3ErrorExt>` so callers can
/// report failures uniformly without knowing which component raised them.
pub trait East3ErrorExt {
    fn level(&self) -> Level;
    fn message(&self) -> String;
    /// Dotted path of the function that raised the error, e.g.
    /// `east3.opt.optimize.resolve_opt_level`.
    fn issuer(&self) -> String;
    fn location(&self) -> Option<crate::location::Location>;
}

impl fmt::Debug for dyn East3ErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let loc_str = match self.location() {
            Some(loc) => loc.to_string(),
            None => "unknown".to_string(),
        };

        write!(
            f,
            "EAST3 | {} | {} | {} | {}",
            self.level(),
            loc_str,
            self.issuer(),
            self.message()
        )
    }
}

impl fmt::Display for dyn East3ErrorExt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
