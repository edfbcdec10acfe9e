//! Error types for scanning, session setup, and streaming.
//!
//! Every failure in the pipeline funnels into [`Error`]. The taxonomy
//! mirrors the stages of a session:
//!
//! | Variant | Raised by | Meaning |
//! |---------|-----------|---------|
//! | [`Error::LinkUnavailable`] | supervisor bootstrap | the collector never answered its readiness probe |
//! | [`Error::NotFound`] | device locator | no matching fitness machine within the scan budget |
//! | [`Error::ServiceNotFound`] | session setup | connected, but the fitness machine service is absent |
//! | [`Error::CharacteristicNotFound`] | session setup | service present, indoor bike data characteristic absent |
//! | [`Error::SetupFailed`] | session setup | every subscribe attempt failed; the connection was closed first |
//! | [`Error::LinkDropped`] | streaming pump | the notification stream ended or the radio link died |
//! | [`Error::Timeout`] | any bounded operation | a deadline elapsed |
//! | [`Error::Bluetooth`] | anywhere | error surfaced by the underlying BLE stack |
//! | [`Error::InvalidConfig`] | option validation | a tunable was rejected before any radio work started |
//!
//! # Recovery
//!
//! None of these are retried where they are raised, beyond the bounded
//! attempt budgets inside the locator and session setup. Once a budget is
//! exhausted the error unwinds to the supervisor, which discards the whole
//! session and restarts from bootstrap. Callers embedding this crate should
//! treat every variant the same way: tear down, then start over.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;
use velolink_types::uuids::{FITNESS_MACHINE_SERVICE, INDOOR_BIKE_DATA};

/// Result type alias for velolink-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Why the device locator came back empty-handed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFoundReason {
    /// No Bluetooth adapter is available on this host.
    NoAdapter,

    /// Every scan window completed without a matching advertisement.
    NoMatch {
        /// Number of scan windows that were exhausted.
        attempts: u32,
        /// Description of the filter that nothing matched.
        filter: String,
    },
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
            Self::NoMatch { attempts, filter } => {
                write!(f, "no device matching {filter} after {attempts} scan attempt(s)")
            }
        }
    }
}

/// Errors raised by the telemetry pipeline.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Error surfaced by the underlying Bluetooth stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// The uplink collector never became reachable during bootstrap.
    #[error("Uplink unavailable after {attempts} probe(s): {message}")]
    LinkUnavailable {
        /// Number of readiness probes that were sent.
        attempts: u32,
        /// Error reported by the last probe.
        message: String,
    },

    /// No matching fitness machine was found.
    #[error("Device not found: {0}")]
    NotFound(NotFoundReason),

    /// The fitness machine service was absent from the discovered services.
    #[error("Service {service} not found ({service_count} services discovered)")]
    ServiceNotFound {
        /// The service that was expected.
        service: Uuid,
        /// How many services discovery actually returned.
        service_count: usize,
    },

    /// The indoor bike data characteristic was absent from the service.
    #[error("Characteristic {characteristic} not found on the fitness machine service")]
    CharacteristicNotFound {
        /// The characteristic that was expected.
        characteristic: Uuid,
    },

    /// Connect-and-subscribe gave up; the connection was closed before this
    /// was raised.
    #[error("Session setup failed after {attempts} attempt(s): {last_error}")]
    SetupFailed {
        /// Number of subscribe attempts that were made.
        attempts: u32,
        /// Rendering of the error from the final attempt.
        last_error: String,
    },

    /// The notification stream ended while streaming.
    #[error("Link dropped: {0}")]
    LinkDropped(String),

    /// An operation exceeded its deadline.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// What was being attempted.
        operation: String,
        /// The deadline that elapsed.
        duration: Duration,
    },

    /// A tunable failed validation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// No Bluetooth adapter on this host.
    pub fn no_adapter() -> Self {
        Self::NotFound(NotFoundReason::NoAdapter)
    }

    /// Scan budget exhausted without a match.
    pub fn no_match(attempts: u32, filter: impl Into<String>) -> Self {
        Self::NotFound(NotFoundReason::NoMatch {
            attempts,
            filter: filter.into(),
        })
    }

    /// Bootstrap probe budget exhausted.
    pub fn link_unavailable(attempts: u32, message: impl Into<String>) -> Self {
        Self::LinkUnavailable {
            attempts,
            message: message.into(),
        }
    }

    /// The fitness machine service was missing after discovery.
    pub fn service_not_found(service_count: usize) -> Self {
        Self::ServiceNotFound {
            service: FITNESS_MACHINE_SERVICE,
            service_count,
        }
    }

    /// The indoor bike data characteristic was missing.
    pub fn characteristic_not_found() -> Self {
        Self::CharacteristicNotFound {
            characteristic: INDOOR_BIKE_DATA,
        }
    }

    /// Subscription setup exhausted its attempt budget.
    pub fn setup_failed(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::SetupFailed {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// The notification stream died.
    pub fn link_dropped(message: impl Into<String>) -> Self {
        Self::LinkDropped(message.into())
    }

    /// A bounded operation ran out of time.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// A tunable was rejected.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_adapter_display() {
        let err = Error::no_adapter();
        assert_eq!(
            err.to_string(),
            "Device not found: no Bluetooth adapter available"
        );
    }

    #[test]
    fn test_no_match_display() {
        let err = Error::no_match(3, "service 00001826-0000-1000-8000-00805f9b34fb");
        assert_eq!(
            err.to_string(),
            "Device not found: no device matching service 00001826-0000-1000-8000-00805f9b34fb after 3 scan attempt(s)"
        );
    }

    #[test]
    fn test_link_unavailable_display() {
        let err = Error::link_unavailable(50, "connection refused");
        assert_eq!(
            err.to_string(),
            "Uplink unavailable after 50 probe(s): connection refused"
        );
    }

    #[test]
    fn test_service_not_found_display() {
        let err = Error::service_not_found(4);
        assert_eq!(
            err.to_string(),
            "Service 00001826-0000-1000-8000-00805f9b34fb not found (4 services discovered)"
        );
    }

    #[test]
    fn test_characteristic_not_found_display() {
        let err = Error::characteristic_not_found();
        assert_eq!(
            err.to_string(),
            "Characteristic 00002ad2-0000-1000-8000-00805f9b34fb not found on the fitness machine service"
        );
    }

    #[test]
    fn test_setup_failed_display() {
        let err = Error::setup_failed(5, "Bluetooth error: not connected");
        assert_eq!(
            err.to_string(),
            "Session setup failed after 5 attempt(s): Bluetooth error: not connected"
        );
    }

    #[test]
    fn test_link_dropped_display() {
        let err = Error::link_dropped("notification stream ended");
        assert_eq!(err.to_string(), "Link dropped: notification stream ended");
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("connect to device", Duration::from_secs(10));
        assert_eq!(
            err.to_string(),
            "Operation 'connect to device' timed out after 10s"
        );
    }

    #[test]
    fn test_invalid_config_display() {
        let err = Error::invalid_config("scan attempts must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: scan attempts must be at least 1"
        );
    }

    #[test]
    fn test_bluetooth_error_conversion() {
        let err: Error = btleplug::Error::NotConnected.into();
        assert!(matches!(err, Error::Bluetooth(_)));
    }
}
