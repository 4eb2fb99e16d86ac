/*!
Single-byte Western (ISO-8859-1) text conversion for serial payloads.

Every character from U+0000 to U+00FE maps to the byte of the same value.
U+00FF is excluded because its byte is the serial sentinel.
*/

use crate::error::{Result, XSigError};
use crate::protocol::SERIAL_SENTINEL;
use bytes::BufMut;

/// Check that every character of `text` has a single-byte payload encoding
pub fn validate(text: &str) -> Result<()> {
    for (position, ch) in text.chars().enumerate() {
        match u32::from(ch) {
            code if code == u32::from(SERIAL_SENTINEL) => {
                return Err(XSigError::SentinelCharacter { position });
            }
            code if code > 0xFF => {
                return Err(XSigError::UnsupportedCharacter { ch, position });
            }
            _ => {}
        }
    }
    Ok(())
}

/// Number of payload bytes `text` encodes to
pub fn encoded_len(text: &str) -> usize {
    text.chars().count()
}

/// Write the payload bytes of already validated text
///
/// Characters that [`validate`] would reject are written as `?`.
pub fn encode_into<B: BufMut>(text: &str, buf: &mut B) {
    for ch in text.chars() {
        match u8::try_from(u32::from(ch)) {
            Ok(byte) if byte != SERIAL_SENTINEL => buf.put_u8(byte),
            _ => buf.put_u8(b'?'),
        }
    }
}

/// Convert payload bytes back to text
pub fn decode(payload: &[u8]) -> String {
    payload.iter().map(|&byte| char::from(byte)).collect()
}
