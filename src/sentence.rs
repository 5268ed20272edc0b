// Sentence tokenizer - splits a serial line into prefix, fields and XOR checksum

use thiserror::Error;

/// Start marker of an NMEA 0183 sentence
pub const NMEA_START: u8 = b'$';
/// Start marker of the proprietary Agrello bearing sentence
pub const AGRELLO_START: u8 = b'%';

const CHECKSUM_DELIMITER: u8 = b'*';
const MAX_PREFIX_LEN: usize = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(&'static str),
    #[error("checksum mismatch: declared {declared}, computed {computed}")]
    ChecksumMismatch { declared: String, computed: String },
    #[error("unrecognized prefix: {0:?}")]
    UnrecognizedPrefix(String),
}

/// A tokenized sentence. Not retained past the decoder that consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceFrame {
    pub marker: char,
    /// Marker plus talker/type, e.g. `$GPRMC`
    pub prefix: String,
    /// Comma separated fields after the prefix, empty fields kept
    pub fields: Vec<String>,
    pub checksum_declared: Option<String>,
    pub checksum_computed: String,
    pub checksum_ok: bool,
    /// The trimmed line this frame was cut from
    pub sentence: String,
}

/// XOR of every byte in `body`
pub fn nmea_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0u8, |acc, b| acc ^ b)
}

/// Build a `$`-sentence from its body (everything between `$` and `*`)
pub fn with_checksum(body: &str) -> String {
    format!("${}*{:02X}", body, nmea_checksum(body.as_bytes()))
}

fn parse_hex_byte(digits: &[u8]) -> Option<u8> {
    if digits.len() != 2 || !digits.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u8::from_str_radix(text, 16).ok()
}

/// Tokenize a line. A bad checksum is reported through `checksum_ok`,
/// not as an error; use [`parse_sentence`] to reject it.
pub fn tokenize(line: &str) -> Result<SentenceFrame, FrameError> {
    let trimmed = line.trim_end_matches(['\r', '\n']).trim_end();
    let bytes = trimmed.as_bytes();

    let marker = match bytes.first() {
        None => return Err(FrameError::Malformed("empty line")),
        Some(&b) if b == NMEA_START || b == AGRELLO_START => b,
        Some(_) => return Err(FrameError::Malformed("missing start marker")),
    };

    let (body, declared) = match bytes.iter().rposition(|&b| b == CHECKSUM_DELIMITER) {
        Some(star) => {
            let digits = &bytes[star + 1..];
            let declared =
                parse_hex_byte(digits).ok_or(FrameError::Malformed("bad checksum digits"))?;
            (&bytes[1..star], Some((declared, digits)))
        }
        None => (&bytes[1..], None),
    };

    let computed = nmea_checksum(body);
    let checksum_ok = declared.map_or(true, |(value, _)| value == computed);

    // Body is a byte slice of a str cut at ASCII delimiters, so it stays valid UTF-8
    let body = String::from_utf8_lossy(body);
    let mut parts = body.split(',');
    let head = parts.next().unwrap_or_default();

    if head.is_empty()
        || head.len() > MAX_PREFIX_LEN
        || !head.bytes().all(|b| b.is_ascii_alphanumeric())
    {
        return Err(FrameError::UnrecognizedPrefix(format!(
            "{}{}",
            marker as char, head
        )));
    }

    Ok(SentenceFrame {
        marker: marker as char,
        prefix: format!("{}{}", marker as char, head),
        fields: parts.map(str::to_string).collect(),
        checksum_declared: declared
            .map(|(_, digits)| String::from_utf8_lossy(digits).into_owned()),
        checksum_computed: format!("{:02X}", computed),
        checksum_ok,
        sentence: trimmed.to_string(),
    })
}

/// Tokenize and require a matching checksum when one is declared
pub fn parse_sentence(line: &str) -> Result<SentenceFrame, FrameError> {
    let frame = tokenize(line)?;
    if !frame.checksum_ok {
        return Err(FrameError::ChecksumMismatch {
            declared: frame.checksum_declared.unwrap_or_default(),
            computed: frame.checksum_computed,
        });
    }
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMC: &str = "$GPRMC,180747.00,A,4814.67617,N,12245.53305,W,0.059,,250217,,,A*68";

    #[test]
    fn test_tokenize_rmc() {
        let frame = tokenize(RMC).expect("example sentence should tokenize");
        assert_eq!(frame.prefix, "$GPRMC");
        assert_eq!(frame.fields.len(), 12);
        assert_eq!(frame.fields[7], "", "empty heading must be kept");
        assert_eq!(frame.fields[11], "A");
        assert_eq!(frame.checksum_declared.as_deref(), Some("68"));
        assert_eq!(frame.checksum_computed, "68");
        assert!(frame.checksum_ok);
    }

    #[test]
    fn test_checksum_case_insensitive() {
        let line = "$GPRMC,180751.00,A,4814.67620,N,12245.53309,W,0.040,,250217,,,A*6f";
        let frame = tokenize(line).unwrap();
        assert!(frame.checksum_ok, "lowercase hex should match: {}", line);
        assert_eq!(frame.checksum_computed, "6F");
    }

    #[test]
    fn test_single_bit_flip_breaks_checksum() {
        let star = RMC.find('*').unwrap();
        for pos in 1..star {
            for bit in 0..7 {
                let mut bytes = RMC.as_bytes().to_vec();
                bytes[pos] ^= 1 << bit;
                if bytes[pos] == b'*' || bytes[pos] == b'\r' || bytes[pos] == b'\n' {
                    continue;
                }
                let Ok(line) = String::from_utf8(bytes) else { continue };
                if let Ok(frame) = tokenize(&line) {
                    assert!(
                        !frame.checksum_ok,
                        "flip at {} bit {} not detected: {}",
                        pos, bit, line
                    );
                }
            }
        }
    }

    #[test]
    fn test_parse_sentence_rejects_mismatch() {
        let bad = RMC.replace("*68", "*69");
        match parse_sentence(&bad) {
            Err(FrameError::ChecksumMismatch { declared, computed }) => {
                assert_eq!(declared, "69");
                assert_eq!(computed, "68");
            }
            other => panic!("expected checksum mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_unchecksummed_frame() {
        let frame = tokenize("$PADF,1,2").unwrap();
        assert!(frame.checksum_declared.is_none());
        assert!(frame.checksum_ok, "no declared checksum means nothing to verify");
        assert_eq!(frame.fields, vec!["1", "2"]);
    }

    #[test]
    fn test_malformed_inputs_never_panic() {
        let malformed = [
            "",
            "\r\n",
            "GPRMC,1,2",
            "$",
            "$GPRMC*",
            "$GPRMC*6",
            "$GPRMC*ZZ",
            "$GPRMC*123",
            "\u{00e9}\u{00e9}",
        ];
        for line in malformed {
            assert!(tokenize(line).is_err(), "{:?} should not tokenize", line);
        }
    }

    #[test]
    fn test_unrecognized_prefix() {
        let err = tokenize("%240/7").unwrap_err();
        assert_eq!(err, FrameError::UnrecognizedPrefix("%240/7".into()));
        assert!(err.to_string().starts_with("unrecognized prefix"));
        assert!(matches!(tokenize("$,1,2"), Err(FrameError::UnrecognizedPrefix(_))));
        assert!(matches!(tokenize("$GP\u{00e9}MC,1"), Err(FrameError::UnrecognizedPrefix(_))));
    }

    #[test]
    fn test_trailing_line_delimiters_trimmed() {
        let frame = tokenize(&format!("{}\r\n", RMC)).unwrap();
        assert!(frame.checksum_ok);
        assert_eq!(frame.sentence, RMC);
    }

    #[test]
    fn test_agrees_with_reference_parser() {
        let good = "$GPRMC,225446,A,4916.45,N,12311.12,W,000.5,054.7,191194,020.3,E*68";
        let bad = good.replace("4916.45", "4916.46");
        assert!(parse_sentence(good).is_ok());
        assert!(::nmea::parse_str(good).is_ok(), "reference parser accepts the sentence");
        assert!(parse_sentence(&bad).is_err());
        assert!(::nmea::parse_str(&bad).is_err(), "reference parser rejects the corruption");
    }
}
