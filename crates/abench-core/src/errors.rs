use std::fmt;

/// Pre-flight validation error: bad configuration, empty experiment
/// plan, or an operation requested in the wrong experiment state.
/// Raised before any external call or durable artifact is created.
#[derive(Debug, Clone)]
pub struct ConfigError(pub String);

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}
