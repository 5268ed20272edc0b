// Agrello bearing decoder for ADF units
//
// The Agrello format is a simple RS232 line used by APRS and ham radio DF
// packages, typically 4800 baud 8N2 at up to 15 lines per second:
//
//   %BBB/Q<cr>
//
//   %   message start character
//   BBB signal bearing in degrees (000-359)
//   /   separator
//   Q   signal quality (0-9)
//
// Example: %240/7

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sentence::AGRELLO_START;

const AGRELLO_SEPARATOR: u8 = b'/';
const AGRELLO_MIN_LEN: usize = 6;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BearingError {
    #[error("truncated packet length {len}")]
    Truncated { len: usize },
    #[error("missing Agrello start character")]
    MissingStart,
    #[error("missing Agrello separator character")]
    MissingSeparator,
}

/// A successfully decoded bearing line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BearingReading {
    /// Three bearing characters as sent, no range check
    pub bearing: String,
    /// Single quality character as sent
    pub quality: String,
    /// Wall clock when the line was decoded
    pub observed_at: DateTime<Utc>,
}

/// Decode an Agrello line, stamping it with the current time
pub fn decode(line: &str) -> Result<BearingReading, BearingError> {
    decode_at(line, Utc::now())
}

/// Decode an Agrello line with an explicit observation time.
/// Only the first six bytes matter; a trailing `\r` or vendor bytes are ignored.
pub fn decode_at(line: &str, observed_at: DateTime<Utc>) -> Result<BearingReading, BearingError> {
    let data = line.as_bytes();

    if data.len() < AGRELLO_MIN_LEN {
        return Err(BearingError::Truncated { len: data.len() });
    }
    if data[0] != AGRELLO_START {
        return Err(BearingError::MissingStart);
    }
    if data[4] != AGRELLO_SEPARATOR {
        return Err(BearingError::MissingSeparator);
    }

    Ok(BearingReading {
        bearing: String::from_utf8_lossy(&data[1..4]).into_owned(),
        quality: String::from_utf8_lossy(&data[5..6]).into_owned(),
        observed_at,
    })
}

/// Decode, discarding the rejection reason
pub fn try_decode(line: &str) -> Option<BearingReading> {
    decode(line).ok()
}
