//! Ride telemetry types produced by the Indoor Bike Data decoder.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One decoded Indoor Bike Data notification.
///
/// Every field is optional: a field is present only when the corresponding
/// bit in the notification's flag word was set, and a field whose bytes were
/// cut off the end of a truncated notification is omitted. No field is ever
/// fabricated.
///
/// Values are in output units: the raw `×0.01` speed, `×0.5` cadence and
/// `×0.1` MET resolutions are already applied.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BikeReading {
    /// Instantaneous speed in km/h.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub instant_speed: Option<f64>,
    /// Average speed in km/h.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub average_speed: Option<f64>,
    /// Instantaneous cadence in rpm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub instant_cadence: Option<f64>,
    /// Average cadence in rpm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub average_cadence: Option<f64>,
    /// Total distance in meters (24-bit counter).
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub total_distance: Option<u32>,
    /// Resistance level, unitless and signed.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub resistance_level: Option<i16>,
    /// Instantaneous power in watts, signed.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub instant_power: Option<i16>,
    /// Average power in watts, signed.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub average_power: Option<i16>,
    /// Total expended energy in kcal.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub total_energy: Option<u16>,
    /// Energy expenditure rate in kcal/h.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub energy_per_hour: Option<u16>,
    /// Energy expenditure rate in kcal/min.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub energy_per_minute: Option<u8>,
    /// Heart rate in bpm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub heart_rate: Option<u8>,
    /// Metabolic equivalent in METs.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub metabolic_equivalent: Option<f64>,
    /// Elapsed session time in seconds.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub elapsed_time: Option<u16>,
    /// Remaining session time in seconds.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub remaining_time: Option<u16>,
}

impl BikeReading {
    /// Returns `true` when no field is present.
    ///
    /// Empty readings come from notifications shorter than the flag word, or
    /// from flag words that declare nothing (with the more-data bit set).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.field_count() == 0
    }

    /// Number of present fields.
    #[must_use]
    pub fn field_count(&self) -> usize {
        let present = [
            self.instant_speed.is_some(),
            self.average_speed.is_some(),
            self.instant_cadence.is_some(),
            self.average_cadence.is_some(),
            self.total_distance.is_some(),
            self.resistance_level.is_some(),
            self.instant_power.is_some(),
            self.average_power.is_some(),
            self.total_energy.is_some(),
            self.energy_per_hour.is_some(),
            self.energy_per_minute.is_some(),
            self.heart_rate.is_some(),
            self.metabolic_equivalent.is_some(),
            self.elapsed_time.is_some(),
            self.remaining_time.is_some(),
        ];
        present.iter().filter(|p| **p).count()
    }
}

/// The record handed to the uplink for every non-empty reading.
///
/// Field names match the collector's ingest schema directly: `ts` is the
/// capture time in seconds since the Unix epoch, `src` is the constant tag
/// identifying the agent class, `device` identifies the bike the reading
/// came from.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReadingEnvelope {
    /// Capture time, seconds since the Unix epoch.
    pub ts: f64,
    /// Source tag for this agent class.
    pub src: String,
    /// Identifier of the bike the reading came from.
    pub device: String,
    /// The decoded reading.
    pub reading: BikeReading,
}

impl ReadingEnvelope {
    /// Create an envelope around a reading.
    #[must_use]
    pub fn new(ts: f64, src: &str, device: &str, reading: BikeReading) -> Self {
        Self {
            ts,
            src: src.to_string(),
            device: device.to_string(),
            reading,
        }
    }
}
