/*!
Wire representations for terminal input and output.
*/

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How encoded token bytes are written and read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    /// Hexadecimal text, whitespace ignored on input
    Hex,
    /// Standard base64 text
    Base64,
    /// Unmodified bytes
    Raw,
}

impl WireFormat {
    /// Render bytes in a text format, `None` for raw
    pub fn render(self, bytes: &[u8], uppercase: bool) -> Option<String> {
        match self {
            Self::Hex if uppercase => Some(hex::encode_upper(bytes)),
            Self::Hex => Some(hex::encode(bytes)),
            Self::Base64 => Some(STANDARD.encode(bytes)),
            Self::Raw => None,
        }
    }

    /// Parse text input back to bytes
    pub fn parse(self, text: &str) -> Result<Vec<u8>> {
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        match self {
            Self::Hex => hex::decode(&compact).with_context(|| "Input is not valid hex"),
            Self::Base64 => STANDARD.decode(&compact).with_context(|| "Input is not valid base64"),
            Self::Raw => Ok(text.as_bytes().to_vec()),
        }
    }
}
