//! Decoding of NDEF messages read from a tag into a track code

use thiserror::Error;

use crate::domain::track::TrackCode;

/// Type Name Format of NFC Forum well-known types
pub const TNF_WELL_KNOWN: u8 = 1;
/// Record type of a well-known text record
pub const RTD_TEXT: &[u8] = b"T";

const LANGUAGE_LENGTH_MASK: u8 = 0x3f;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("message contains no well-known text record")]
    NoTextRecord,

    #[error("text record is empty")]
    EmptyPayload,
}

/// A single record of a discovered tag, as handed over by the radio layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NdefRecord {
    pub tnf: u8,
    pub record_type: Vec<u8>,
    pub payload: Vec<u8>,
}

impl NdefRecord {
    pub fn text(language: &str, text: &str) -> Self {
        let language = language.as_bytes();
        let mut payload = Vec::with_capacity(1 + language.len() + text.len());
        payload.push(language.len() as u8 & LANGUAGE_LENGTH_MASK);
        payload.extend_from_slice(language);
        payload.extend_from_slice(text.as_bytes());

        Self {
            tnf: TNF_WELL_KNOWN,
            record_type: RTD_TEXT.to_vec(),
            payload,
        }
    }

    pub fn is_text(&self) -> bool {
        self.tnf == TNF_WELL_KNOWN && self.record_type == RTD_TEXT
    }
}

/// Decodes the first well-known text record of a message.
///
/// Records after the first text record are never looked at, even if the first one is empty.
pub fn decode_message(records: &[NdefRecord]) -> Result<TrackCode, DecodeFailure> {
    let record = records
        .iter()
        .find(|r| r.is_text())
        .ok_or(DecodeFailure::NoTextRecord)?;
    decode(record)
}

/// Decodes a single text record.
///
/// Layout: status byte (low 6 bits = language code length), language code, text.
/// A language length running past the payload yields an empty text.
pub fn decode(record: &NdefRecord) -> Result<TrackCode, DecodeFailure> {
    if !record.is_text() {
        return Err(DecodeFailure::NoTextRecord);
    }

    let payload = &record.payload;
    let text = match payload.first() {
        Some(status) => {
            let skip = (1 + (status & LANGUAGE_LENGTH_MASK) as usize).min(payload.len());
            &payload[skip..]
        }
        None => &[],
    };

    TrackCode::parse(&String::from_utf8_lossy(text)).ok_or(DecodeFailure::EmptyPayload)
}
