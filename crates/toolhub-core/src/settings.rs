//! Global settings for the connection controller.
//!
//! These are pure domain types with no infrastructure dependencies. The
//! persisted record keeps every field optional so older registry documents
//! load cleanly; [`ControllerSettings`] is the resolved runtime view.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default seconds between health checks.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 300;

/// Default deadline for a single health probe.
pub const DEFAULT_HEALTH_PROBE_TIMEOUT_SECS: u64 = 5;

/// Default delay before reconnecting a failed server.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 30;

/// Default deadline for connect plus handshake.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default deadline for proxied requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Persisted global settings.
///
/// All fields are optional to support partial documents and graceful defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GlobalSettings {
    pub health_check_interval_secs: Option<u64>,
    pub health_probe_timeout_secs: Option<u64>,
    pub reconnect_delay_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
}

impl GlobalSettings {
    /// Create settings with sensible defaults.
    #[must_use]
    pub const fn with_defaults() -> Self {
        Self {
            health_check_interval_secs: Some(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            health_probe_timeout_secs: Some(DEFAULT_HEALTH_PROBE_TIMEOUT_SECS),
            reconnect_delay_secs: Some(DEFAULT_RECONNECT_DELAY_SECS),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            request_timeout_secs: Some(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    #[must_use]
    pub const fn effective_health_check_interval_secs(&self) -> u64 {
        match self.health_check_interval_secs {
            Some(secs) => secs,
            None => DEFAULT_HEALTH_CHECK_INTERVAL_SECS,
        }
    }

    #[must_use]
    pub const fn effective_health_probe_timeout_secs(&self) -> u64 {
        match self.health_probe_timeout_secs {
            Some(secs) => secs,
            None => DEFAULT_HEALTH_PROBE_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub const fn effective_reconnect_delay_secs(&self) -> u64 {
        match self.reconnect_delay_secs {
            Some(secs) => secs,
            None => DEFAULT_RECONNECT_DELAY_SECS,
        }
    }

    #[must_use]
    pub const fn effective_connect_timeout_secs(&self) -> u64 {
        match self.connect_timeout_secs {
            Some(secs) => secs,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub const fn effective_request_timeout_secs(&self) -> u64 {
        match self.request_timeout_secs {
            Some(secs) => secs,
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Validate settings values.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let fields = [
            ("health_check_interval_secs", self.health_check_interval_secs),
            ("health_probe_timeout_secs", self.health_probe_timeout_secs),
            ("reconnect_delay_secs", self.reconnect_delay_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        if let Some((field, _)) = fields.into_iter().find(|(_, value)| *value == Some(0)) {
            return Err(SettingsError::ZeroDuration(field));
        }

        let interval = self.effective_health_check_interval_secs();
        let probe = self.effective_health_probe_timeout_secs();
        if probe >= interval {
            return Err(SettingsError::ProbeExceedsInterval { probe, interval });
        }

        Ok(())
    }

    /// Resolve into runtime durations.
    #[must_use]
    pub const fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            health_check_interval: Duration::from_secs(self.effective_health_check_interval_secs()),
            health_probe_timeout: Duration::from_secs(self.effective_health_probe_timeout_secs()),
            reconnect_delay: Duration::from_secs(self.effective_reconnect_delay_secs()),
            connect_timeout: Duration::from_secs(self.effective_connect_timeout_secs()),
            request_timeout: Duration::from_secs(self.effective_request_timeout_secs()),
        }
    }
}

/// Resolved timing knobs for the connection controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerSettings {
    pub health_check_interval: Duration,
    pub health_probe_timeout: Duration,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        GlobalSettings::with_defaults().controller_settings()
    }
}

/// Settings validation error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("Health probe timeout ({probe}s) must be shorter than the check interval ({interval}s)")]
    ProbeExceedsInterval { probe: u64, interval: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = GlobalSettings::with_defaults();
        assert_eq!(settings.health_check_interval_secs, Some(300));
        assert!(settings.validate().is_ok());

        let resolved = ControllerSettings::default();
        assert_eq!(resolved.reconnect_delay, Duration::from_secs(30));
        assert_eq!(resolved.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_record_uses_defaults() {
        let settings: GlobalSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.effective_health_probe_timeout_secs(), 5);
        assert_eq!(settings.effective_connect_timeout_secs(), 30);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_zero_rejected() {
        let settings = GlobalSettings {
            reconnect_delay_secs: Some(0),
            ..GlobalSettings::default()
        };
        assert_eq!(
            settings.validate(),
            Err(SettingsError::ZeroDuration("reconnect_delay_secs"))
        );
    }

    #[test]
    fn test_probe_must_be_shorter_than_interval() {
        let settings = GlobalSettings {
            health_check_interval_secs: Some(10),
            health_probe_timeout_secs: Some(10),
            ..GlobalSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::ProbeExceedsInterval { .. })
        ));
    }
}
