/*!
# XSig Tokens

This crate implements the XSig wire format used to exchange digital, analog
and serial signal values between intersystem communication endpoints.

## Core Types

- [`Token`] - A single signal value (digital, analog or serial)
- [`SignalKind`] - The three signal address spaces
- [`TokenBatch`] - Ordered collection encoded into one contiguous buffer
- [`StreamDecoder`] - Incremental decoder for fragmented transport reads

## Modules

- [`token`] - Token model and per-kind encoding
- [`decoder`] - Byte stream to token decoding
- [`stream`] - Incremental decoding across partial reads
- [`collection`] - Batching and last-write-wins coalescing
- [`queue`] - Multi-producer token queue
- [`registry`] - Connection bookkeeping
- [`charset`] - Single-byte text conversion for serial payloads
- [`error`] - Common error types
*/

pub mod charset;
pub mod collection;
pub mod decoder;
pub mod error;
pub mod queue;
pub mod registry;
pub mod stream;
pub mod token;

// Re-export commonly used types
pub use collection::TokenBatch;
pub use decoder::{decode, decode_partial, DecodeError, PartialDecode, TokenDecoder};
pub use error::{Result, XSigError};
pub use queue::{token_queue, TokenReceiver, TokenSender};
pub use registry::{Connection, ConnectionRegistry};
pub use stream::StreamDecoder;
pub use token::{AnalogToken, DigitalToken, SerialToken, SignalKind, SignalValue, Token, XSigToken};

/// Version information for the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol constants
pub mod protocol {
    /// Exclusive upper bound of digital signal indices
    pub const DIGITAL_INDEX_BOUND: u16 = 4096;

    /// Exclusive upper bound of analog signal indices
    pub const ANALOG_INDEX_BOUND: u16 = 1024;

    /// Exclusive upper bound of serial signal indices
    pub const SERIAL_INDEX_BOUND: u16 = 1024;

    /// Encoded size of a digital token in bytes
    pub const DIGITAL_TOKEN_LEN: usize = 2;

    /// Encoded size of an analog token in bytes
    pub const ANALOG_TOKEN_LEN: usize = 4;

    /// Encoded size of an empty serial token (header, index byte, sentinel)
    pub const SERIAL_OVERHEAD_LEN: usize = 3;

    /// Terminator of a serial token payload
    pub const SERIAL_SENTINEL: u8 = 0xFF;

    /// Header bits marking a digital token
    pub const DIGITAL_MARKER: u8 = 0x80;

    /// Header bits marking an analog token
    pub const ANALOG_MARKER: u8 = 0xC0;

    /// Header bits marking a serial token
    pub const SERIAL_MARKER: u8 = 0xC8;

    /// Digital header bit set when the signal is low
    pub const DIGITAL_LOW_FLAG: u8 = 0x20;

    /// Mask of the 7-bit payload carried by every trailing byte
    pub const DATA_MASK: u8 = 0x7F;
}
