//! Link-layer concurrency core for a wearable biometric device's serial protocol.
//!
//! Owns the framing (`type|length|body|crc`), the dispatcher that routes decoded
//! messages to responses or notifications, a single-writer sender that arbitrates
//! concurrent callers, and the bulk file-transfer mode the device drops into for
//! `GetFileUart`. See [`builder::LinkBuilder`] for constructing a running link and
//! [`facade::DeviceFacade`] for the typed request/response surface built on top of it.
//!
//! # Example
//! ```no_run
//! # fn example() -> Result<(), biotel_link::Error> {
//! use biotel_link::builder::LinkBuilder;
//!
//! let link = LinkBuilder::new().with_serial("/dev/ttyACM0").connect()?;
//! let facade = biotel_link::facade::DeviceFacade::new(link);
//! let serial_no = facade.get_serial_no()?;
//! # let _ = serial_no;
//! # Ok(())
//! # }
//! ```
use std::str::Utf8Error;

use thiserror::Error;

pub mod autodetect;
pub mod builder;
pub mod codec;
pub mod config;
pub mod core;
pub mod facade;
pub mod transport;

pub use builder::LinkBuilder;
pub use codec::Message;
pub use core::LinkCore;

/// Errors produced anywhere in the link-layer core.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("no matching device found")]
    DeviceNotFound,
    #[error("{0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
    #[error(transparent)]
    Utf8(#[from] Utf8Error),
    /// A frame failed to decode: malformed header, truncated body, or an
    /// unrecognized field. Carries a human-readable description rather than
    /// structured fields since callers act on it uniformly (retry/drop).
    #[error("failed to decode frame: {0}")]
    DecodeError(String),
    /// The trailing CRC did not match the computed one.
    #[error("crc mismatch: expected {expected:#06x}, computed {computed:#06x}")]
    CrcError { expected: u16, computed: u16 },
    /// `send_and_wait` exhausted its outer timeout with no response.
    #[error("timed out waiting for a response")]
    Timeout,
    /// A response of the expected kind never arrived though the link stayed up.
    #[error("no matching response was received")]
    MissingResponse,
    /// The device answered with a NACK; `code` is the device-defined reason byte.
    #[error("device rejected the request (nack code {code:#04x})")]
    Nack { code: u8 },
    /// A bulk file download was requested while another was already in flight.
    #[error("a file transfer is already in progress")]
    FileSessionBusy,
    /// The link is not connected (shut down, or never connected).
    #[error("link is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, Error>;
