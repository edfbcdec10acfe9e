//! Decoder for the FTMS Indoor Bike Data notification.
//!
//! Indoor Bike Data is a self-describing binary record: a 16-bit flag word
//! declares which optional fields follow, and the fields appear in a fixed
//! order with fixed widths. The decoder walks a descriptor table in that
//! order, committing each declared field only when its bytes fit inside the
//! notification while always advancing the cursor by the field's nominal
//! width. A truncated notification therefore loses fields from the tail only;
//! it never shifts an earlier field onto the wrong bytes, and it never fails.

use bytes::Buf;

use crate::reading::BikeReading;

/// Flag word bits of the Indoor Bike Data characteristic.
///
/// Bit order matches field order in the byte stream. `MORE_DATA` is the
/// protocol's one inversion: instantaneous speed is present when that bit is
/// CLEAR, not set.
pub mod flags {
    /// Inverted presence bit for instantaneous speed.
    pub const MORE_DATA: u16 = 1 << 0;
    pub const AVERAGE_SPEED: u16 = 1 << 1;
    pub const INSTANT_CADENCE: u16 = 1 << 2;
    pub const AVERAGE_CADENCE: u16 = 1 << 3;
    pub const TOTAL_DISTANCE: u16 = 1 << 4;
    pub const RESISTANCE_LEVEL: u16 = 1 << 5;
    pub const INSTANT_POWER: u16 = 1 << 6;
    pub const AVERAGE_POWER: u16 = 1 << 7;
    /// Covers the contiguous total/per-hour/per-minute energy group.
    pub const EXPENDED_ENERGY: u16 = 1 << 8;
    pub const HEART_RATE: u16 = 1 << 9;
    pub const METABOLIC_EQUIVALENT: u16 = 1 << 10;
    pub const ELAPSED_TIME: u16 = 1 << 11;
    pub const REMAINING_TIME: u16 = 1 << 12;
}

/// One optional field of the notification layout.
struct FieldSpec {
    flag: u16,
    /// Present when the flag bit is clear rather than set.
    inverted: bool,
    /// Nominal width in bytes; the cursor advances by this even when the
    /// field's bytes fall outside a truncated notification.
    width: usize,
    /// Commits the decoded value; `raw` is exactly `width` bytes.
    apply: fn(reading: &mut BikeReading, raw: &[u8]),
}

/// Field layout of the notification, in byte-stream order.
const FIELDS: [FieldSpec; 13] = [
    FieldSpec {
        flag: flags::MORE_DATA,
        inverted: true,
        width: 2,
        apply: set_instant_speed,
    },
    FieldSpec {
        flag: flags::AVERAGE_SPEED,
        inverted: false,
        width: 2,
        apply: set_average_speed,
    },
    FieldSpec {
        flag: flags::INSTANT_CADENCE,
        inverted: false,
        width: 2,
        apply: set_instant_cadence,
    },
    FieldSpec {
        flag: flags::AVERAGE_CADENCE,
        inverted: false,
        width: 2,
        apply: set_average_cadence,
    },
    FieldSpec {
        flag: flags::TOTAL_DISTANCE,
        inverted: false,
        width: 3,
        apply: set_total_distance,
    },
    FieldSpec {
        flag: flags::RESISTANCE_LEVEL,
        inverted: false,
        width: 2,
        apply: set_resistance_level,
    },
    FieldSpec {
        flag: flags::INSTANT_POWER,
        inverted: false,
        width: 2,
        apply: set_instant_power,
    },
    FieldSpec {
        flag: flags::AVERAGE_POWER,
        inverted: false,
        width: 2,
        apply: set_average_power,
    },
    FieldSpec {
        flag: flags::EXPENDED_ENERGY,
        inverted: false,
        width: 5,
        apply: set_expended_energy,
    },
    FieldSpec {
        flag: flags::HEART_RATE,
        inverted: false,
        width: 1,
        apply: set_heart_rate,
    },
    FieldSpec {
        flag: flags::METABOLIC_EQUIVALENT,
        inverted: false,
        width: 1,
        apply: set_metabolic_equivalent,
    },
    FieldSpec {
        flag: flags::ELAPSED_TIME,
        inverted: false,
        width: 2,
        apply: set_elapsed_time,
    },
    FieldSpec {
        flag: flags::REMAINING_TIME,
        inverted: false,
        width: 2,
        apply: set_remaining_time,
    },
];

fn set_instant_speed(reading: &mut BikeReading, mut raw: &[u8]) {
    // Raw resolution is 0.01 km/h
    reading.instant_speed = Some(f64::from(raw.get_u16_le()) / 100.0);
}

fn set_average_speed(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.average_speed = Some(f64::from(raw.get_u16_le()) / 100.0);
}

fn set_instant_cadence(reading: &mut BikeReading, mut raw: &[u8]) {
    // Raw resolution is 0.5 rpm
    reading.instant_cadence = Some(f64::from(raw.get_u16_le()) / 2.0);
}

fn set_average_cadence(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.average_cadence = Some(f64::from(raw.get_u16_le()) / 2.0);
}

fn set_total_distance(reading: &mut BikeReading, mut raw: &[u8]) {
    // 24-bit little-endian counter, no native type
    reading.total_distance = Some(raw.get_uint_le(3) as u32);
}

fn set_resistance_level(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.resistance_level = Some(raw.get_i16_le());
}

fn set_instant_power(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.instant_power = Some(raw.get_i16_le());
}

fn set_average_power(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.average_power = Some(raw.get_i16_le());
}

fn set_expended_energy(reading: &mut BikeReading, mut raw: &[u8]) {
    // One flag, one contiguous group: commits all three or (on truncation)
    // none, matching the group's single 5-byte extent
    reading.total_energy = Some(raw.get_u16_le());
    reading.energy_per_hour = Some(raw.get_u16_le());
    reading.energy_per_minute = Some(raw.get_u8());
}

fn set_heart_rate(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.heart_rate = Some(raw.get_u8());
}

fn set_metabolic_equivalent(reading: &mut BikeReading, mut raw: &[u8]) {
    // Raw resolution is 0.1 MET
    reading.metabolic_equivalent = Some(f64::from(raw.get_u8()) / 10.0);
}

fn set_elapsed_time(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.elapsed_time = Some(raw.get_u16_le());
}

fn set_remaining_time(reading: &mut BikeReading, mut raw: &[u8]) {
    reading.remaining_time = Some(raw.get_u16_le());
}

/// Decode one Indoor Bike Data notification.
///
/// Total function: any input, including an empty or truncated one, produces a
/// [`BikeReading`]. Inputs shorter than the 2-byte flag word yield an empty
/// reading. Declared fields whose bytes fall outside the input are omitted
/// while still occupying their place in the layout.
///
/// # Examples
///
/// ```
/// use velolink_types::decode;
///
/// // No flag bits set: the more-data inversion makes instantaneous speed
/// // the one present field. 0x1234 raw = 46.6 km/h.
/// let reading = decode(&[0x00, 0x00, 0x34, 0x12]);
/// assert_eq!(reading.instant_speed, Some(46.6));
/// assert_eq!(reading.field_count(), 1);
///
/// // Setting the more-data bit removes it again.
/// let reading = decode(&[0x01, 0x00]);
/// assert!(reading.is_empty());
/// ```
#[must_use]
pub fn decode(data: &[u8]) -> BikeReading {
    let mut reading = BikeReading::default();
    if data.len() < 2 {
        return reading;
    }

    let flag_word = u16::from_le_bytes([data[0], data[1]]);
    let mut cursor = 2usize;

    for field in &FIELDS {
        let declared = if field.inverted {
            flag_word & field.flag == 0
        } else {
            flag_word & field.flag != 0
        };
        if !declared {
            continue;
        }

        if let Some(raw) = data.get(cursor..cursor + field.width) {
            (field.apply)(&mut reading, raw);
        }
        // Advance by the nominal width whether or not the value committed:
        // the layout is declared by the flags, not by the bytes that arrived
        cursor += field.width;
    }

    reading
}
