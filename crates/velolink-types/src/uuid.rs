//! Bluetooth UUIDs for the Fitness Machine Service (FTMS).
//!
//! All identifiers are 16-bit Bluetooth SIG assigned numbers expanded onto
//! the standard base UUID.

use uuid::{Uuid, uuid};

// --- FTMS Service UUIDs ---

/// Fitness Machine Service, SIG assigned number `0x1826`.
pub const FITNESS_MACHINE_SERVICE: Uuid = uuid!("00001826-0000-1000-8000-00805f9b34fb");

// --- FTMS Characteristic UUIDs ---

/// Fitness Machine Feature characteristic, `0x2ACC`. READ.
///
/// Advertises which optional measurements the machine supports.
pub const FITNESS_MACHINE_FEATURE: Uuid = uuid!("00002acc-0000-1000-8000-00805f9b34fb");

/// Indoor Bike Data characteristic, `0x2AD2`. NOTIFY.
///
/// Carries the variable-layout ride telemetry decoded by
/// [`decode`](crate::decode::decode).
pub const INDOOR_BIKE_DATA: Uuid = uuid!("00002ad2-0000-1000-8000-00805f9b34fb");

/// Training Status characteristic, `0x2AD3`. NOTIFY.
pub const TRAINING_STATUS: Uuid = uuid!("00002ad3-0000-1000-8000-00805f9b34fb");
