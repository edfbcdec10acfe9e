//! Platform-agnostic types for FTMS indoor-bike telemetry.
//!
//! This crate provides the shared types used by the BLE session layer
//! (velolink-core) and by anything that consumes decoded readings.
//!
//! # Features
//!
//! - The [`BikeReading`] record with its optional per-metric fields
//! - The Indoor Bike Data decoder, a total function over raw notifications
//! - UUID constants for the FTMS service and its characteristics
//! - The [`ReadingEnvelope`] handed to the uplink per reading
//!
//! # Example
//!
//! ```
//! use velolink_types::decode;
//!
//! // Flags declare instant cadence and instant power; the clear more-data
//! // bit adds instantaneous speed.
//! let reading = decode(&[0x44, 0x00, 0xB8, 0x0B, 0xB4, 0x00, 0xFA, 0x00]);
//! assert_eq!(reading.instant_speed, Some(30.0));
//! assert_eq!(reading.instant_cadence, Some(90.0));
//! assert_eq!(reading.instant_power, Some(250));
//! ```

pub mod decode;
pub mod reading;
pub mod uuid;

pub use decode::{decode, flags};
pub use reading::{BikeReading, ReadingEnvelope};
pub use uuid as uuids;
