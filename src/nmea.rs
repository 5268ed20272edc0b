// NMEA 0183 decoder for the GPS fixes passed through on the ADF serial line

use crate::sentence::{self, FrameError, SentenceFrame};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// GPS units typically exceed the 80 characters of the old NMEA 0183 limit
pub const DEFAULT_MAX_SENTENCE_LENGTH: usize = 256;

// Recommended minimum fix sentence, GPS-only and multi-GNSS talkers
const RMC_PREFIXES: [&str; 2] = ["$GPRMC", "$GNRMC"];

// Fields 0..=10 are mandatory, field 11 (mode) arrived with NMEA 2.3
const RMC_MIN_FIELDS: usize = 11;
const RMC_MODE_FIELD: usize = 11;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpsError {
    #[error("truncated/oversized sentence: {len} > {max}")]
    Oversized { len: usize, max: usize },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("unknown GPS message {prefix}")]
    UnknownMessage {
        prefix: String,
        frame: Box<SentenceFrame>,
    },
    #[error("{prefix} has {found} fields, expected at least {expected}")]
    MissingFields {
        prefix: String,
        found: usize,
        expected: usize,
    },
}

impl GpsError {
    /// Frame of a well-formed sentence this decoder does not handle
    pub fn unknown_frame(&self) -> Option<&SentenceFrame> {
        match self {
            GpsError::UnknownMessage { frame, .. } => Some(frame),
            _ => None,
        }
    }
}

/// One decoded RMC sentence. Values are kept as the receiver sent them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpsFix {
    pub utc_time: String,
    /// Status field was `A`
    pub status_good: bool,
    /// Value with hemisphere appended, e.g. `4814.67617N`
    pub latitude: String,
    pub longitude: String,
    /// Knots over ground
    pub speed: String,
    /// Track made good, degrees true
    pub heading: String,
    /// DDMMYY
    pub utc_date: String,
    pub magnetic_variation: String,
    /// A = autonomous, D = DGPS, E = dead reckoning, N = not valid
    pub mode: Option<String>,
    pub raw_sentence: String,
    pub received_at: DateTime<Utc>,
}

impl GpsFix {
    /// `"<lat> <lon>"` when the fix is good
    pub fn position(&self) -> Option<String> {
        self.status_good
            .then(|| format!("{} {}", self.latitude, self.longitude))
    }
}

/// RMC decoder with a bounded sentence length
#[derive(Debug, Clone)]
pub struct GpsDecoder {
    max_sentence_length: usize,
}

impl Default for GpsDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SENTENCE_LENGTH)
    }
}

impl GpsDecoder {
    pub fn new(max_sentence_length: usize) -> Self {
        Self { max_sentence_length }
    }

    pub fn max_sentence_length(&self) -> usize {
        self.max_sentence_length
    }

    /// Length guard, tokenize, verify checksum, decode
    pub fn decode_line(&self, line: &str) -> Result<GpsFix, GpsError> {
        self.decode_line_at(line, Utc::now())
    }

    pub fn decode_line_at(
        &self,
        line: &str,
        received_at: DateTime<Utc>,
    ) -> Result<GpsFix, GpsError> {
        let len = line.trim_end_matches(['\r', '\n']).len();
        if len > self.max_sentence_length {
            return Err(GpsError::Oversized {
                len,
                max: self.max_sentence_length,
            });
        }

        let frame = sentence::parse_sentence(line)?;
        self.decode_frame_at(&frame, received_at)
    }

    pub fn decode_frame(&self, frame: &SentenceFrame) -> Result<GpsFix, GpsError> {
        self.decode_frame_at(frame, Utc::now())
    }

    /// Decode a frame that already passed checksum verification.
    ///
    /// # Panics
    ///
    /// If `frame.checksum_ok` is false. Frames come from
    /// [`sentence::parse_sentence`], which never yields one; seeing it here
    /// means the tokenizer contract is broken.
    pub fn decode_frame_at(
        &self,
        frame: &SentenceFrame,
        received_at: DateTime<Utc>,
    ) -> Result<GpsFix, GpsError> {
        assert!(
            frame.checksum_ok,
            "tokenizer passed a frame with a bad checksum: {}",
            frame.sentence
        );

        if !RMC_PREFIXES.contains(&frame.prefix.as_str()) {
            return Err(GpsError::UnknownMessage {
                prefix: frame.prefix.clone(),
                frame: Box::new(frame.clone()),
            });
        }

        decode_rmc(frame, received_at)
    }
}

//        0         1 2          3 4           5 6     7 8      9 10 11
// $GPRMC,192856.00,A,4814.67224,N,12245.53131,W,0.060, ,250217, ,  ,D*6A
fn decode_rmc(frame: &SentenceFrame, received_at: DateTime<Utc>) -> Result<GpsFix, GpsError> {
    let f = &frame.fields;
    if f.len() < RMC_MIN_FIELDS {
        return Err(GpsError::MissingFields {
            prefix: frame.prefix.clone(),
            found: f.len(),
            expected: RMC_MIN_FIELDS,
        });
    }

    Ok(GpsFix {
        utc_time: f[0].clone(),
        status_good: f[1] == "A",
        latitude: format!("{}{}", f[2], f[3]),
        longitude: format!("{}{}", f[4], f[5]),
        speed: f[6].clone(),
        heading: f[7].clone(),
        utc_date: f[8].clone(),
        magnetic_variation: format!("{}{}", f[9], f[10]),
        mode: f.get(RMC_MODE_FIELD).cloned(),
        raw_sentence: frame.sentence.clone(),
        received_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentence::with_checksum;

    const RMC: &str = "$GPRMC,180747.00,A,4814.67617,N,12245.53305,W,0.059,,250217,,,A*68";

    #[test]
    fn test_parse_rmc() {
        let fix = GpsDecoder::default().decode_line(RMC).expect("example RMC should decode");
        assert!(fix.status_good);
        assert_eq!(fix.utc_time, "180747.00");
        assert_eq!(fix.latitude, "4814.67617N");
        assert_eq!(fix.longitude, "12245.53305W");
        assert_eq!(fix.speed, "0.059");
        assert_eq!(fix.heading, "");
        assert_eq!(fix.utc_date, "250217");
        assert_eq!(fix.magnetic_variation, "");
        assert_eq!(fix.mode.as_deref(), Some("A"));
        assert_eq!(fix.raw_sentence, RMC);
        assert_eq!(fix.position().as_deref(), Some("4814.67617N 12245.53305W"));
    }

    #[test]
    fn test_parse_rmc_without_mode() {
        let line = "$GPRMC,225446,A,4916.45,N,12311.12,W,000.5,054.7,191194,020.3,E*68";
        let fix = GpsDecoder::default().decode_line(line).unwrap();
        assert_eq!(fix.mode, None, "pre-2.3 sentence carries no mode");
        assert_eq!(fix.heading, "054.7");
        assert_eq!(fix.magnetic_variation, "020.3E");
    }

    #[test]
    fn test_status_not_good() {
        for status in ["V", "", "a", "AA"] {
            let line = with_checksum(&format!("GPRMC,180800.00,{},,,,,,,250217,,,N", status));
            let fix = GpsDecoder::default().decode_line(&line).unwrap();
            assert!(!fix.status_good, "status {:?} is not a valid fix", status);
            assert_eq!(fix.position(), None);
        }
    }

    #[test]
    fn test_gnss_talker_accepted() {
        let line = with_checksum("GNRMC,180747.00,A,4814.67617,N,12245.53305,W,0.059,,250217,,,A");
        assert!(GpsDecoder::default().decode_line(&line).unwrap().status_good);
    }

    #[test]
    fn test_unknown_message_carries_frame() {
        let gga = "$GPGGA,092750.000,5321.6802,N,00630.3372,W,1,8,1.03,61.7,M,55.2,M,,*76";
        let err = GpsDecoder::default().decode_line(gga).unwrap_err();
        assert_eq!(err.to_string(), "unknown GPS message $GPGGA");
        let frame = err.unknown_frame().expect("frame kept for the caller");
        assert_eq!(frame.fields[0], "092750.000");
    }

    #[test]
    fn test_checksum_mismatch_rejected() {
        let bad = RMC.replace("0.059", "0.058");
        let err = GpsDecoder::default().decode_line(&bad).unwrap_err();
        assert!(
            matches!(err, GpsError::Frame(FrameError::ChecksumMismatch { .. })),
            "got {:?}",
            err
        );
        assert!(err.to_string().starts_with("checksum mismatch"));
    }

    #[test]
    fn test_oversized_rejected_before_tokenizing() {
        let decoder = GpsDecoder::new(40);
        let err = decoder.decode_line(RMC).unwrap_err();
        assert_eq!(err, GpsError::Oversized { len: RMC.len(), max: 40 });
        assert!(err.to_string().starts_with("truncated/oversized sentence"));

        // Garbage past the limit is rejected without needing a start marker
        let flood = "x".repeat(DEFAULT_MAX_SENTENCE_LENGTH + 1);
        assert!(matches!(
            GpsDecoder::default().decode_line(&flood),
            Err(GpsError::Oversized { .. })
        ));
    }

    #[test]
    fn test_short_rmc_rejected() {
        let line = with_checksum("GPRMC,180747.00,A,4814.67617,N");
        let err = GpsDecoder::default().decode_line(&line).unwrap_err();
        assert_eq!(
            err,
            GpsError::MissingFields { prefix: "$GPRMC".into(), found: 4, expected: 11 }
        );
    }

    #[test]
    #[should_panic(expected = "bad checksum")]
    fn test_unverified_frame_is_a_bug() {
        let bad = RMC.replace("*68", "*00");
        let frame = sentence::tokenize(&bad).unwrap();
        let _ = GpsDecoder::default().decode_frame(&frame);
    }
}
