//! Process environment seen by launch-command expansion.
//!
//! Only the names the shell tokenizer allows are ever looked up, so
//! providers never expose the wider environment.

use std::ffi::OsString;

pub trait EnvProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<OsString>;

    /// Lossy UTF-8 value, empty when unset.
    fn get_lossy(&self, key: &str) -> String {
        self.get(key)
            .map(|value| value.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Reads the real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl EnvProvider for SystemEnv {
    fn get(&self, key: &str) -> Option<OsString> {
        std::env::var_os(key)
    }
}

/// Test environment with predefined variables.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct MockEnv {
    vars: std::collections::HashMap<String, OsString>,
}

#[cfg(test)]
impl MockEnv {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<OsString>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
impl EnvProvider for MockEnv {
    fn get(&self, key: &str) -> Option<OsString> {
        self.vars.get(key).cloned()
    }
}
