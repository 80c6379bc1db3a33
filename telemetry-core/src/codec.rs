// Wire codec for transmission records.
// Invariants: field tags are a fixed contract shared with the ingest server;
// an absent optional field is a signal to the server, never an error.

use thiserror::Error;

use crate::model::TransmissionRecord;

const TAG_TIMESTAMP: u8 = 1;
const TAG_ODOMETER: u8 = 2;
const TAG_IS_RESYNC: u8 = 3;
const TAG_SPEED: u8 = 4;
const TAG_POWER: u8 = 5;
const TAG_BATTERY: u8 = 6;
const TAG_HEADING: u8 = 7;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record truncated inside field tag {0}")]
    Truncated(u8),
    #[error("missing required field {0}")]
    MissingRequired(&'static str),
    #[error("unknown field tag {0}")]
    UnknownTag(u8),
    #[error("duplicate field tag {0}")]
    DuplicateTag(u8),
}

/// Encodes a record as a sequence of tagged little-endian fields, ascending
/// by tag. Optional fields are emitted only when present.
pub fn encode(record: &TransmissionRecord) -> Vec<u8> {
    let mut out = Vec::with_capacity(35);
    out.push(TAG_TIMESTAMP);
    out.extend_from_slice(&record.timestamp.to_le_bytes());
    out.push(TAG_ODOMETER);
    out.extend_from_slice(&record.odometer.to_le_bytes());
    out.push(TAG_IS_RESYNC);
    out.push(record.is_resync as u8);
    if let Some(speed) = record.speed {
        out.push(TAG_SPEED);
        out.extend_from_slice(&speed.to_le_bytes());
    }
    if let Some(power) = record.power {
        out.push(TAG_POWER);
        out.extend_from_slice(&power.to_le_bytes());
    }
    if let Some(battery) = record.battery {
        out.push(TAG_BATTERY);
        out.extend_from_slice(&battery.to_le_bytes());
    }
    if let Some(heading) = record.heading {
        out.push(TAG_HEADING);
        out.extend_from_slice(&heading.to_le_bytes());
    }
    out
}

pub fn decode(payload: &[u8]) -> Result<TransmissionRecord, DecodeError> {
    let mut timestamp: Option<i64> = None;
    let mut odometer: Option<f32> = None;
    let mut is_resync: Option<bool> = None;
    let mut speed: Option<f32> = None;
    let mut power: Option<f32> = None;
    let mut battery: Option<i32> = None;
    let mut heading: Option<i32> = None;

    let mut cursor = 0usize;
    while cursor < payload.len() {
        let tag = payload[cursor];
        cursor += 1;
        match tag {
            TAG_TIMESTAMP => {
                check_vacant(timestamp.is_some(), tag)?;
                timestamp = Some(read_i64(payload, &mut cursor).ok_or(DecodeError::Truncated(tag))?);
            }
            TAG_ODOMETER => {
                check_vacant(odometer.is_some(), tag)?;
                odometer = Some(read_f32(payload, &mut cursor).ok_or(DecodeError::Truncated(tag))?);
            }
            TAG_IS_RESYNC => {
                check_vacant(is_resync.is_some(), tag)?;
                let raw = read_u8(payload, &mut cursor).ok_or(DecodeError::Truncated(tag))?;
                is_resync = Some(raw != 0);
            }
            TAG_SPEED => {
                check_vacant(speed.is_some(), tag)?;
                speed = Some(read_f32(payload, &mut cursor).ok_or(DecodeError::Truncated(tag))?);
            }
            TAG_POWER => {
                check_vacant(power.is_some(), tag)?;
                power = Some(read_f32(payload, &mut cursor).ok_or(DecodeError::Truncated(tag))?);
            }
            TAG_BATTERY => {
                check_vacant(battery.is_some(), tag)?;
                battery = Some(read_i32(payload, &mut cursor).ok_or(DecodeError::Truncated(tag))?);
            }
            TAG_HEADING => {
                check_vacant(heading.is_some(), tag)?;
                heading = Some(read_i32(payload, &mut cursor).ok_or(DecodeError::Truncated(tag))?);
            }
            unknown => return Err(DecodeError::UnknownTag(unknown)),
        }
    }

    Ok(TransmissionRecord {
        timestamp: timestamp.ok_or(DecodeError::MissingRequired("timestamp"))?,
        odometer: odometer.ok_or(DecodeError::MissingRequired("odometer"))?,
        is_resync: is_resync.ok_or(DecodeError::MissingRequired("is_resync"))?,
        speed,
        power,
        battery,
        heading,
    })
}

fn check_vacant(seen: bool, tag: u8) -> Result<(), DecodeError> {
    if seen {
        return Err(DecodeError::DuplicateTag(tag));
    }
    Ok(())
}

fn read_u8(payload: &[u8], cursor: &mut usize) -> Option<u8> {
    let value = payload.get(*cursor).copied()?;
    *cursor += 1;
    Some(value)
}

fn read_f32(payload: &[u8], cursor: &mut usize) -> Option<f32> {
    let bytes = payload.get(*cursor..*cursor + 4)?;
    *cursor += 4;
    Some(f32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_i32(payload: &[u8], cursor: &mut usize) -> Option<i32> {
    let bytes = payload.get(*cursor..*cursor + 4)?;
    *cursor += 4;
    Some(i32::from_le_bytes(bytes.try_into().ok()?))
}

fn read_i64(payload: &[u8], cursor: &mut usize) -> Option<i64> {
    let bytes = payload.get(*cursor..*cursor + 8)?;
    *cursor += 8;
    Some(i64::from_le_bytes(bytes.try_into().ok()?))
}
