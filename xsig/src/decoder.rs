/*!
Byte stream to token decoding.

A buffer is a plain concatenation of encoded tokens. The header byte of each
token identifies its kind:

| Header bits | Kind    | Length                     |
|-------------|---------|----------------------------|
| `10xxxxxx`  | Digital | 2 bytes                    |
| `11xx0xxx`  | Analog  | 4 bytes                    |
| `11001xxx`  | Serial  | up to and including `0xFF` |

Analog and serial headers both start with `11`; bit 3 tells them apart.
*/

use crate::charset;
use crate::protocol::{
    ANALOG_TOKEN_LEN, DATA_MASK, DIGITAL_LOW_FLAG, DIGITAL_TOKEN_LEN, SERIAL_OVERHEAD_LEN,
    SERIAL_SENTINEL,
};
use crate::token::{AnalogToken, DigitalToken, SerialToken, SignalKind, Token};
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur while decoding a token buffer
///
/// Every offset is the position in the decoded buffer of the header byte of
/// the failing token, or of the offending byte for [`DecodeError::InvalidDataByte`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid token header 0x{byte:02X} at offset {offset}")]
    InvalidHeader { offset: usize, byte: u8 },

    #[error("invalid data byte 0x{byte:02X} at offset {offset}: high bit must be clear")]
    InvalidDataByte { offset: usize, byte: u8 },

    #[error("truncated {kind} token at offset {offset}: expected {expected} bytes, {available} available")]
    Truncated {
        offset: usize,
        kind: SignalKind,
        expected: usize,
        available: usize,
    },

    #[error("unterminated serial token at offset {offset}: no 0xFF sentinel before end of buffer")]
    UnterminatedSerial { offset: usize },

    #[error("{kind} index {index} at offset {offset} is out of range: valid indices are 1..{bound} (exclusive)")]
    IndexOutOfRange {
        offset: usize,
        kind: SignalKind,
        index: u16,
        bound: u16,
    },
}

impl DecodeError {
    /// Byte offset the error refers to
    pub fn offset(&self) -> usize {
        match self {
            Self::InvalidHeader { offset, .. }
            | Self::InvalidDataByte { offset, .. }
            | Self::Truncated { offset, .. }
            | Self::UnterminatedSerial { offset }
            | Self::IndexOutOfRange { offset, .. } => *offset,
        }
    }

    /// True when more input could complete the failing token
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Self::Truncated { .. } | Self::UnterminatedSerial { .. })
    }

    /// Same error with its offset moved by `base` bytes
    pub fn rebased(self, base: usize) -> Self {
        match self {
            Self::InvalidHeader { offset, byte } => Self::InvalidHeader { offset: offset + base, byte },
            Self::InvalidDataByte { offset, byte } => Self::InvalidDataByte { offset: offset + base, byte },
            Self::Truncated { offset, kind, expected, available } => Self::Truncated {
                offset: offset + base,
                kind,
                expected,
                available,
            },
            Self::UnterminatedSerial { offset } => Self::UnterminatedSerial { offset: offset + base },
            Self::IndexOutOfRange { offset, kind, index, bound } => Self::IndexOutOfRange {
                offset: offset + base,
                kind,
                index,
                bound,
            },
        }
    }
}

/// Classify a header byte
fn header_kind(offset: usize, header: u8) -> Result<SignalKind, DecodeError> {
    match header {
        h if h & 0xC0 == 0x80 => Ok(SignalKind::Digital),
        h if h & 0xC8 == 0xC0 => Ok(SignalKind::Analog),
        h if h & 0xF8 == 0xC8 => Ok(SignalKind::Serial),
        byte => Err(DecodeError::InvalidHeader { offset, byte }),
    }
}

/// Decoder walking a borrowed buffer one token at a time
///
/// Yields `Err` at most once; iteration ends after the first error.
pub struct TokenDecoder<'a> {
    buffer: &'a [u8],
    read_pos: usize,
    failed: bool,
}

impl<'a> TokenDecoder<'a> {
    /// Create a decoder over `buffer`
    pub fn new(buffer: &'a [u8]) -> Self {
        Self {
            buffer,
            read_pos: 0,
            failed: false,
        }
    }

    /// Offset of the next token header (bytes consumed so far)
    pub fn position(&self) -> usize {
        self.read_pos
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> &'a [u8] {
        &self.buffer[self.read_pos..]
    }

    fn require(&self, kind: SignalKind, expected: usize) -> Result<&'a [u8], DecodeError> {
        let rest = self.remaining();
        if rest.len() < expected {
            return Err(DecodeError::Truncated {
                offset: self.read_pos,
                kind,
                expected,
                available: rest.len(),
            });
        }
        Ok(&rest[..expected])
    }

    fn data_byte(&self, bytes: &[u8], at: usize) -> Result<u8, DecodeError> {
        let byte = bytes[at];
        if byte & !DATA_MASK != 0 {
            return Err(DecodeError::InvalidDataByte {
                offset: self.read_pos + at,
                byte,
            });
        }
        Ok(byte)
    }

    fn index_error(&self, kind: SignalKind, index: u16) -> DecodeError {
        DecodeError::IndexOutOfRange {
            offset: self.read_pos,
            kind,
            index,
            bound: kind.index_bound(),
        }
    }

    fn decode_digital(&self, header: u8) -> Result<(Token, usize), DecodeError> {
        let bytes = self.require(SignalKind::Digital, DIGITAL_TOKEN_LEN)?;
        let low = self.data_byte(bytes, 1)?;

        let index = ((u16::from(header & 0x1F) << 7) | u16::from(low)) + 1;
        let value = header & DIGITAL_LOW_FLAG == 0;

        let token = DigitalToken::new(index, value).map_err(|_| self.index_error(SignalKind::Digital, index))?;
        Ok((token.into(), DIGITAL_TOKEN_LEN))
    }

    fn decode_analog(&self, header: u8) -> Result<(Token, usize), DecodeError> {
        let bytes = self.require(SignalKind::Analog, ANALOG_TOKEN_LEN)?;
        let low = self.data_byte(bytes, 1)?;
        let mid_value = self.data_byte(bytes, 2)?;
        let low_value = self.data_byte(bytes, 3)?;

        // The header holds `index >> 7`, the next byte `(index - 1) & 0x7F`.
        // A low field of 0x7F means `index` itself is a multiple of 128.
        let high = u16::from(header & 0x07) << 7;
        let index = if low == DATA_MASK {
            high
        } else {
            high + u16::from(low) + 1
        };
        let value = (u16::from(header & 0x30) << 10) | (u16::from(mid_value) << 7) | u16::from(low_value);

        let token = AnalogToken::new(index, value).map_err(|_| self.index_error(SignalKind::Analog, index))?;
        Ok((token.into(), ANALOG_TOKEN_LEN))
    }

    fn decode_serial(&self, header: u8) -> Result<(Token, usize), DecodeError> {
        // Header and index byte; the sentinel is searched for below.
        let prefix = self.require(SignalKind::Serial, SERIAL_OVERHEAD_LEN - 1).map_err(|err| match err {
            DecodeError::Truncated { offset, kind, available, .. } => DecodeError::Truncated {
                offset,
                kind,
                expected: SERIAL_OVERHEAD_LEN,
                available,
            },
            other => other,
        })?;
        let low = self.data_byte(prefix, 1)?;
        let index = ((u16::from(header & 0x07) << 7) | u16::from(low)) + 1;

        let body = &self.remaining()[SERIAL_OVERHEAD_LEN - 1..];
        let payload_len = body
            .iter()
            .position(|&byte| byte == SERIAL_SENTINEL)
            .ok_or(DecodeError::UnterminatedSerial { offset: self.read_pos })?;
        let text = charset::decode(&body[..payload_len]);

        let token = SerialToken::new(index, text).map_err(|_| self.index_error(SignalKind::Serial, index))?;
        Ok((token.into(), SERIAL_OVERHEAD_LEN + payload_len))
    }

    fn decode_next(&self) -> Result<(Token, usize), DecodeError> {
        let header = self.buffer[self.read_pos];
        match header_kind(self.read_pos, header)? {
            SignalKind::Digital => self.decode_digital(header),
            SignalKind::Analog => self.decode_analog(header),
            SignalKind::Serial => self.decode_serial(header),
        }
    }
}

impl Iterator for TokenDecoder<'_> {
    type Item = Result<Token, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.read_pos >= self.buffer.len() {
            return None;
        }

        match self.decode_next() {
            Ok((token, consumed)) => {
                trace!(offset = self.read_pos, consumed, %token, "decoded token");
                self.read_pos += consumed;
                Some(Ok(token))
            }
            Err(err) => {
                debug!(offset = err.offset(), error = %err, "token decoding stopped");
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

impl std::iter::FusedIterator for TokenDecoder<'_> {}

/// Decode a whole buffer, failing on the first malformed or truncated token
pub fn decode(bytes: &[u8]) -> Result<Vec<Token>, DecodeError> {
    TokenDecoder::new(bytes).collect()
}

/// Outcome of [`decode_partial`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialDecode {
    /// Tokens decoded before the first error, in buffer order
    pub tokens: Vec<Token>,
    /// First error, `None` if the whole buffer decoded
    pub error: Option<DecodeError>,
    /// Bytes covered by `tokens`
    pub consumed: usize,
}

impl PartialDecode {
    /// True if the whole buffer decoded
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into the strict form, dropping partial results on error
    pub fn into_result(self) -> Result<Vec<Token>, DecodeError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.tokens),
        }
    }
}

/// Decode as much of a buffer as possible, keeping the tokens before an error
pub fn decode_partial(bytes: &[u8]) -> PartialDecode {
    let mut decoder = TokenDecoder::new(bytes);
    let mut tokens = Vec::new();
    let mut error = None;

    for item in decoder.by_ref() {
        match item {
            Ok(token) => tokens.push(token),
            Err(err) => error = Some(err),
        }
    }

    PartialDecode {
        tokens,
        error,
        consumed: decoder.position(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::XSigToken;

    fn roundtrip(token: Token) {
        let bytes = token.encode();
        let decoded = decode(&bytes).unwrap_or_else(|e| panic!("{token} failed to decode: {e}"));
        assert_eq!(decoded, vec![token]);
    }

    #[test]
    fn test_literal_buffers() {
        assert_eq!(decode(&[0x80, 0x00]).unwrap(), vec![Token::digital(1, true).unwrap()]);
        assert_eq!(decode(&[0xA0, 0x00]).unwrap(), vec![Token::digital(1, false).unwrap()]);
        assert_eq!(decode(&[0x81, 0x00]).unwrap(), vec![Token::digital(129, true).unwrap()]);
        assert_eq!(
            decode(&[0xC0, 0x00, 0x24, 0x34]).unwrap(),
            vec![Token::analog(1, 0x1234).unwrap()]
        );
        assert_eq!(
            decode(&[0xC8, 0x00, 0x41, 0x42, 0xFF]).unwrap(),
            vec![Token::serial(1, "AB").unwrap()]
        );
        assert_eq!(decode(&[0xC8, 0x00, 0xFF]).unwrap(), vec![Token::serial(1, "").unwrap()]);
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_roundtrip_every_digital_index() {
        for index in 1..4096 {
            roundtrip(Token::digital(index, index % 3 == 0).unwrap());
        }
    }

    #[test]
    fn test_roundtrip_every_analog_index() {
        for index in 1u16..1024 {
            let value = index.wrapping_mul(97) ^ 0xA5A5;
            roundtrip(Token::analog(index, value).unwrap());
        }
    }

    #[test]
    fn test_roundtrip_analog_values() {
        for value in (0..=u16::MAX).step_by(251).chain([0x3FFF, 0x4000, 0x8000, 0xC000, u16::MAX]) {
            roundtrip(Token::analog(128, value).unwrap());
            roundtrip(Token::analog(1023, value).unwrap());
        }
    }

    #[test]
    fn test_roundtrip_every_serial_index() {
        for index in 1..1024 {
            roundtrip(Token::serial(index, format!("#{index}")).unwrap());
        }
    }

    #[test]
    fn test_roundtrip_serial_texts() {
        let all_latin1: String = (0u8..0xFF).map(char::from).collect();
        let texts = ["", "A", "AB", "ABC", "\u{fe}\u{fe}", "line\r\n", "caf\u{e9}", all_latin1.as_str()];
        for text in texts {
            roundtrip(Token::serial(42, text).unwrap());
        }
    }

    #[test]
    fn test_serial_shorter_than_analog_followed_by_tokens() {
        let tokens = vec![
            Token::serial(3, "").unwrap(),
            Token::analog(3, 0x7F7F).unwrap(),
            Token::serial(4, "a").unwrap(),
            Token::digital(3, false).unwrap(),
        ];
        let bytes: Vec<u8> = tokens.iter().flat_map(|t| t.encode()).collect();
        assert_eq!(decode(&bytes).unwrap(), tokens);
    }

    #[test]
    fn test_sentinel_byte_in_payload_terminates_early() {
        // A 0xFF inside the payload cannot be told apart from the terminator,
        // which is why SerialToken refuses U+00FF.
        let bytes = [0xC8, 0x00, 0x41, 0xFF, 0x42, 0xFF];
        let result = decode_partial(&bytes);
        assert_eq!(result.tokens, vec![Token::serial(1, "A").unwrap()]);
        assert_eq!(result.error, Some(DecodeError::InvalidHeader { offset: 4, byte: 0x42 }));
    }

    #[test]
    fn test_truncated_digital() {
        let err = decode(&[0x80]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                offset: 0,
                kind: SignalKind::Digital,
                expected: 2,
                available: 1,
            }
        );
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_truncated_analog_after_token() {
        let err = decode(&[0x80, 0x00, 0xC0, 0x00, 0x24]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                offset: 2,
                kind: SignalKind::Analog,
                expected: 4,
                available: 3,
            }
        );
    }

    #[test]
    fn test_truncated_serial_header() {
        let err = decode(&[0xC8]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated { offset: 0, kind: SignalKind::Serial, expected: 3, available: 1 }
        ));
    }

    #[test]
    fn test_unterminated_serial() {
        let err = decode(&[0x80, 0x00, 0xC8, 0x00, 0x41, 0x42]).unwrap_err();
        assert_eq!(err, DecodeError::UnterminatedSerial { offset: 2 });
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_invalid_headers() {
        for byte in [0x00, 0x41, 0x7F, 0xD8, 0xE8, 0xF8, 0xFF] {
            let err = decode(&[byte, 0x00, 0x00, 0x00]).unwrap_err();
            assert_eq!(err, DecodeError::InvalidHeader { offset: 0, byte });
            assert!(!err.is_incomplete());
        }
    }

    #[test]
    fn test_invalid_data_byte() {
        let err = decode(&[0xC0, 0x00, 0x80, 0x00]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidDataByte { offset: 2, byte: 0x80 });

        let err = decode(&[0x80, 0x00, 0x80, 0x90]).unwrap_err();
        assert_eq!(err, DecodeError::InvalidDataByte { offset: 3, byte: 0x90 });
    }

    #[test]
    fn test_decoded_index_out_of_range() {
        // Digital zero-based 4095 would be index 4096.
        let err = decode(&[0x9F, 0x7F]).unwrap_err();
        assert_eq!(
            err,
            DecodeError::IndexOutOfRange { offset: 0, kind: SignalKind::Digital, index: 4096, bound: 4096 }
        );

        // Analog header high bits 0 with low 0x7F decodes to index 0.
        let err = decode(&[0xC0, 0x7F, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::IndexOutOfRange { kind: SignalKind::Analog, index: 0, .. }));

        // Serial zero-based 1023 would be index 1024.
        let err = decode(&[0xCF, 0x7F, 0xFF]).unwrap_err();
        assert!(matches!(err, DecodeError::IndexOutOfRange { kind: SignalKind::Serial, index: 1024, .. }));
    }

    #[test]
    fn test_partial_decode_keeps_leading_tokens() {
        let bytes = [0x80, 0x00, 0xC8, 0x00, 0x41, 0xFF, 0x00];
        let result = decode_partial(&bytes);
        assert!(!result.is_complete());
        assert_eq!(result.consumed, 6);
        assert_eq!(
            result.tokens,
            vec![Token::digital(1, true).unwrap(), Token::serial(1, "A").unwrap()]
        );
        assert_eq!(result.error, Some(DecodeError::InvalidHeader { offset: 6, byte: 0x00 }));
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_decoder_is_fused_after_error() {
        let mut decoder = TokenDecoder::new(&[0x00, 0x80, 0x00]);
        assert!(matches!(decoder.next(), Some(Err(_))));
        assert!(decoder.next().is_none());
        assert_eq!(decoder.position(), 0);
    }

    #[test]
    fn test_rebased_offsets() {
        let err = DecodeError::UnterminatedSerial { offset: 2 }.rebased(10);
        assert_eq!(err.offset(), 12);
        let err = DecodeError::InvalidHeader { offset: 0, byte: 1 }.rebased(5);
        assert_eq!(err, DecodeError::InvalidHeader { offset: 5, byte: 1 });
    }
}
