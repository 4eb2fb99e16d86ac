/*!
Token model and per-kind wire encoding.

Each token carries a 1-based index inside the address space of its
[`SignalKind`] and a value of the matching type. Tokens are validated when
they are built, so encoding never fails.
*/

use crate::charset;
use crate::error::{Result, XSigError};
use crate::protocol::{
    ANALOG_INDEX_BOUND, ANALOG_MARKER, ANALOG_TOKEN_LEN, DATA_MASK, DIGITAL_INDEX_BOUND,
    DIGITAL_LOW_FLAG, DIGITAL_MARKER, DIGITAL_TOKEN_LEN, SERIAL_INDEX_BOUND, SERIAL_MARKER,
    SERIAL_OVERHEAD_LEN, SERIAL_SENTINEL,
};
use bytes::BufMut;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Signal address spaces carried by the wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalKind {
    Digital,
    Analog,
    Serial,
}

impl SignalKind {
    /// Exclusive upper bound of valid indices for this kind
    pub fn index_bound(self) -> u16 {
        match self {
            Self::Digital => DIGITAL_INDEX_BOUND,
            Self::Analog => ANALOG_INDEX_BOUND,
            Self::Serial => SERIAL_INDEX_BOUND,
        }
    }

    /// Check that `index` lies in `1..index_bound()`
    pub fn check_index(self, index: i64) -> Result<u16> {
        u16::try_from(index)
            .ok()
            .filter(|&candidate| candidate >= 1 && candidate < self.index_bound())
            .ok_or_else(|| XSigError::out_of_range(self, index))
    }

    /// Single-letter prefix used by token literals
    pub fn letter(self) -> char {
        match self {
            Self::Digital => 'D',
            Self::Analog => 'A',
            Self::Serial => 'S',
        }
    }

    /// Parse a literal prefix letter (case-insensitive)
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'D' => Some(Self::Digital),
            'A' => Some(Self::Analog),
            'S' => Some(Self::Serial),
            _ => None,
        }
    }

    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Digital => "digital",
            Self::Analog => "analog",
            Self::Serial => "serial",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities shared by every token variant
pub trait XSigToken {
    /// 1-based signal index
    fn index(&self) -> u16;

    /// Address space of the token
    fn kind(&self) -> SignalKind;

    /// Exact number of bytes [`XSigToken::encode_into`] writes
    fn encoded_len(&self) -> usize;

    /// Append the wire encoding of this token to `buf`
    fn encode_into<B: BufMut>(&self, buf: &mut B);

    /// Wire encoding of this token
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Same token moved `delta` positions within its address space
    ///
    /// A zero delta returns the token unchanged. The shifted index is
    /// validated like a freshly built one.
    fn with_offset(self, delta: i32) -> Result<Self>
    where
        Self: Sized;
}

/// Zero-based index split into its high and low wire fields
#[inline]
fn split_index(index: u16) -> (u8, u8) {
    let zero_based = index - 1;
    ((zero_based >> 7) as u8, (zero_based as u8) & DATA_MASK)
}

#[inline]
fn shifted(kind: SignalKind, index: u16, delta: i32) -> Result<u16> {
    kind.check_index(i64::from(index) + i64::from(delta))
}

/// Boolean signal, index in `1..4096`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DigitalToken {
    index: u16,
    value: bool,
}

impl DigitalToken {
    /// Create a digital token, rejecting out-of-range indices
    pub fn new(index: u16, value: bool) -> Result<Self> {
        let index = SignalKind::Digital.check_index(i64::from(index))?;
        Ok(Self { index, value })
    }

    /// Signal state
    pub fn value(&self) -> bool {
        self.value
    }
}

impl XSigToken for DigitalToken {
    fn index(&self) -> u16 {
        self.index
    }

    fn kind(&self) -> SignalKind {
        SignalKind::Digital
    }

    fn encoded_len(&self) -> usize {
        DIGITAL_TOKEN_LEN
    }

    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        let (high, low) = split_index(self.index);
        // The state bit is inverted on the wire: clear means high.
        let state = if self.value { 0 } else { DIGITAL_LOW_FLAG };
        buf.put_u8(DIGITAL_MARKER | state | high);
        buf.put_u8(low);
    }

    fn with_offset(self, delta: i32) -> Result<Self> {
        if delta == 0 {
            return Ok(self);
        }
        let index = shifted(SignalKind::Digital, self.index, delta)?;
        Ok(Self { index, ..self })
    }
}

/// 16-bit unsigned signal, index in `1..1024`
///
/// The header byte carries `index >> 7` while the second byte carries the low
/// seven bits of `index - 1`. Digital and serial tokens use `index - 1` for
/// both. Deployed endpoints expect this exact layout, so it is kept as is;
/// the decoder inverts it (an index of `128 * n` arrives as high bits `n` and
/// low bits `0x7F`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AnalogToken {
    index: u16,
    value: u16,
}

impl AnalogToken {
    /// Create an analog token, rejecting out-of-range indices
    pub fn new(index: u16, value: u16) -> Result<Self> {
        let index = SignalKind::Analog.check_index(i64::from(index))?;
        Ok(Self { index, value })
    }

    /// Signal level
    pub fn value(&self) -> u16 {
        self.value
    }
}

impl XSigToken for AnalogToken {
    fn index(&self) -> u16 {
        self.index
    }

    fn kind(&self) -> SignalKind {
        SignalKind::Analog
    }

    fn encoded_len(&self) -> usize {
        ANALOG_TOKEN_LEN
    }

    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        let (_, low) = split_index(self.index);
        let value_high = ((self.value & 0xC000) >> 10) as u8;
        let index_high = (self.index >> 7) as u8;
        buf.put_u8(ANALOG_MARKER | value_high | index_high);
        buf.put_u8(low);
        buf.put_u8(((self.value & 0x3F80) >> 7) as u8);
        buf.put_u8((self.value as u8) & DATA_MASK);
    }

    fn with_offset(self, delta: i32) -> Result<Self> {
        if delta == 0 {
            return Ok(self);
        }
        let index = shifted(SignalKind::Analog, self.index, delta)?;
        Ok(Self { index, ..self })
    }
}

/// Text signal, index in `1..1024`
///
/// The text is restricted to characters U+0000..=U+00FE, see [`charset`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SerialToken {
    index: u16,
    value: String,
}

impl SerialToken {
    /// Create a serial token, rejecting out-of-range indices and text that
    /// has no single-byte encoding
    pub fn new(index: u16, value: impl Into<String>) -> Result<Self> {
        let index = SignalKind::Serial.check_index(i64::from(index))?;
        let value = value.into();
        charset::validate(&value)?;
        Ok(Self { index, value })
    }

    /// Signal text
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Take the text out of the token
    pub fn into_value(self) -> String {
        self.value
    }
}

impl XSigToken for SerialToken {
    fn index(&self) -> u16 {
        self.index
    }

    fn kind(&self) -> SignalKind {
        SignalKind::Serial
    }

    fn encoded_len(&self) -> usize {
        SERIAL_OVERHEAD_LEN + charset::encoded_len(&self.value)
    }

    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        let (high, low) = split_index(self.index);
        buf.put_u8(SERIAL_MARKER | high);
        buf.put_u8(low);
        charset::encode_into(&self.value, buf);
        buf.put_u8(SERIAL_SENTINEL);
    }

    fn with_offset(self, delta: i32) -> Result<Self> {
        if delta == 0 {
            return Ok(self);
        }
        let index = shifted(SignalKind::Serial, self.index, delta)?;
        Ok(Self { index, ..self })
    }
}

/// Borrowed view of a token's value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalValue<'a> {
    Digital(bool),
    Analog(u16),
    Serial(&'a str),
}

/// Any token of the wire format
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Token {
    Digital(DigitalToken),
    Analog(AnalogToken),
    Serial(SerialToken),
}

impl Token {
    /// Create a digital token
    pub fn digital(index: u16, value: bool) -> Result<Self> {
        DigitalToken::new(index, value).map(Self::Digital)
    }

    /// Create an analog token
    pub fn analog(index: u16, value: u16) -> Result<Self> {
        AnalogToken::new(index, value).map(Self::Analog)
    }

    /// Create a serial token
    pub fn serial(index: u16, value: impl Into<String>) -> Result<Self> {
        SerialToken::new(index, value).map(Self::Serial)
    }

    /// Borrowed value of the token
    pub fn value(&self) -> SignalValue<'_> {
        match self {
            Self::Digital(token) => SignalValue::Digital(token.value()),
            Self::Analog(token) => SignalValue::Analog(token.value()),
            Self::Serial(token) => SignalValue::Serial(token.value()),
        }
    }

    /// Key used for last-write-wins coalescing
    pub fn address(&self) -> (SignalKind, u16) {
        (self.kind(), self.index())
    }
}

impl XSigToken for Token {
    fn index(&self) -> u16 {
        match self {
            Self::Digital(token) => token.index(),
            Self::Analog(token) => token.index(),
            Self::Serial(token) => token.index(),
        }
    }

    fn kind(&self) -> SignalKind {
        match self {
            Self::Digital(_) => SignalKind::Digital,
            Self::Analog(_) => SignalKind::Analog,
            Self::Serial(_) => SignalKind::Serial,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Digital(token) => token.encoded_len(),
            Self::Analog(token) => token.encoded_len(),
            Self::Serial(token) => token.encoded_len(),
        }
    }

    fn encode_into<B: BufMut>(&self, buf: &mut B) {
        match self {
            Self::Digital(token) => token.encode_into(buf),
            Self::Analog(token) => token.encode_into(buf),
            Self::Serial(token) => token.encode_into(buf),
        }
    }

    fn with_offset(self, delta: i32) -> Result<Self> {
        match self {
            Self::Digital(token) => token.with_offset(delta).map(Self::Digital),
            Self::Analog(token) => token.with_offset(delta).map(Self::Analog),
            Self::Serial(token) => token.with_offset(delta).map(Self::Serial),
        }
    }
}

impl From<DigitalToken> for Token {
    fn from(token: DigitalToken) -> Self {
        Self::Digital(token)
    }
}

impl From<AnalogToken> for Token {
    fn from(token: AnalogToken) -> Self {
        Self::Analog(token)
    }
}

impl From<SerialToken> for Token {
    fn from(token: SerialToken) -> Self {
        Self::Serial(token)
    }
}

/// Token literal: `D12=1`, `A5=4660`, `S3="hello"`
impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = self.kind().letter();
        match self.value() {
            SignalValue::Digital(value) => write!(f, "{}{}={}", letter, self.index(), u8::from(value)),
            SignalValue::Analog(value) => write!(f, "{}{}={}", letter, self.index(), value),
            SignalValue::Serial(value) => write!(f, "{}{}=\"{}\"", letter, self.index(), value),
        }
    }
}

/// Parse a token literal
///
/// The kind letter is case-insensitive. Digital values accept
/// `1/0/true/false/high/low/on/off`, analog values decimal or `0x` hex, and
/// serial values take the rest of the literal with one pair of surrounding
/// double quotes removed.
impl FromStr for Token {
    type Err = XSigError;

    fn from_str(literal: &str) -> Result<Self> {
        let re = Regex::new(r"(?s)^([DdAaSs])([0-9]+)=(.*)$")?;
        let captures = re
            .captures(literal)
            .ok_or_else(|| XSigError::invalid_literal(format!("expected <kind><index>=<value>, got {literal:?}")))?;

        let kind = captures[1]
            .chars()
            .next()
            .and_then(SignalKind::from_letter)
            .ok_or_else(|| XSigError::invalid_literal(format!("unknown kind in {literal:?}")))?;

        let index: i64 = captures[2]
            .parse()
            .map_err(|_| XSigError::invalid_literal(format!("index too large in {literal:?}")))?;
        let index = kind.check_index(index)?;

        let raw_value = &captures[3];
        match kind {
            SignalKind::Digital => {
                let value = match raw_value.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "high" | "on" => true,
                    "0" | "false" | "low" | "off" => false,
                    other => {
                        return Err(XSigError::invalid_literal(format!("bad digital value {other:?}")));
                    }
                };
                Token::digital(index, value)
            }
            SignalKind::Analog => {
                let trimmed = raw_value.trim();
                let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
                    Some(hex) => u16::from_str_radix(hex, 16),
                    None => trimmed.parse::<u16>(),
                };
                let value = parsed
                    .map_err(|_| XSigError::invalid_literal(format!("bad analog value {trimmed:?}")))?;
                Token::analog(index, value)
            }
            SignalKind::Serial => {
                let value = raw_value
                    .strip_prefix('"')
                    .and_then(|inner| inner.strip_suffix('"'))
                    .unwrap_or(raw_value);
                Token::serial(index, value)
            }
        }
    }
}
