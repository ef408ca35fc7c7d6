//! Error types for the driver
//!
//! This module defines the error taxonomy used across the crate:
//!
//! - [`ParseError`] - Malformed descriptor blobs, fatal at table build
//! - [`EncodeError`] - Invalid register operations handed to the packet encoder
//! - [`IndexError`] - Failed lookups and patches against a built command index
//! - [`BuilderError`] - Errors during configuration construction
//! - [`Error`] - Runtime errors during chip operations, generic over the
//!   [`Transport`](crate::transport::Transport) implementation
//!
//! Build-time errors ([`ParseError`], [`BuilderError`]) mean the subsystem
//! must not start. Runtime errors always leave the chip in a documented
//! mode; see [`Iris::execute`](crate::chip::Iris::execute) for the fallback
//! contract.

use crate::chip::Mode;
use crate::power::PowerDomain;
use crate::transport::Transport;

/// Errors raised by the packet encoder
///
/// These indicate a caller-side bug in register-operation construction (or
/// a bad construction-time limit), not a hardware condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// A register write was requested with no data bytes
    EmptyPayload,
    /// The operation targets an address at or beyond the configured map size
    AddressOutOfRange {
        /// Offending base address
        address: u32,
    },
    /// The payload limit leaves no room for data after the address header
    LimitTooSmall {
        /// Configured per-packet payload limit
        limit: usize,
    },
    /// A read reply was neither short-form nor long-form for the value length
    ResponseLength {
        /// Value bytes the caller expected
        expected: usize,
        /// Raw reply bytes actually received
        actual: usize,
    },
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptyPayload => write!(f, "Zero-length register payload"),
            Self::AddressOutOfRange { address } => {
                write!(f, "Address {address:#010x} outside the register map")
            }
            Self::LimitTooSmall { limit } => {
                write!(f, "Payload limit {limit} cannot hold an address header")
            }
            Self::ResponseLength { expected, actual } => {
                write!(
                    f,
                    "Read reply of {actual} bytes matches no response form for {expected} value bytes"
                )
            }
        }
    }
}

impl core::error::Error for EncodeError {}

/// Errors raised while compiling a descriptor blob into a command index
///
/// All variants are fatal: the build returns no partial index, and the
/// subsystem must not start with a blob that produces any of these.
/// `offset` is the byte offset of the offending record header within the
/// blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The blob ended inside a record header
    TruncatedRecord {
        /// Record offset
        offset: usize,
    },
    /// A record carries an unknown wire-type byte
    UnknownWireType {
        /// Record offset
        offset: usize,
        /// Raw wire-type byte
        value: u8,
    },
    /// The last-in-group flag byte is neither 0 nor 1
    InvalidFlag {
        /// Record offset
        offset: usize,
        /// Raw flag byte
        value: u8,
    },
    /// The link byte carries bits outside {0, 1}
    InvalidLinkBits {
        /// Record offset
        offset: usize,
        /// Raw link byte
        value: u8,
    },
    /// A record's payload length is not valid for its wire type
    BadPayloadLength {
        /// Record offset
        offset: usize,
        /// Claimed payload length
        len: usize,
    },
    /// A record claims more payload than the blob has left
    PayloadOverrun {
        /// Record offset
        offset: usize,
        /// Claimed payload length
        claimed: usize,
        /// Bytes actually remaining after the header
        remaining: usize,
    },
    /// A (subsystem, option) pair reappeared after its group was closed
    DuplicateOption {
        /// Subsystem id
        subsystem: u8,
        /// Option id
        option: u8,
    },
    /// Records within one group disagree on link speed
    LinkMismatch {
        /// Subsystem id
        subsystem: u8,
        /// Option id
        option: u8,
    },
    /// A record's subsystem id belongs to the other table's id range
    WrongTable {
        /// Record offset
        offset: usize,
        /// Subsystem id
        subsystem: u8,
    },
    /// Splitting an oversized record through the encoder failed
    Encode {
        /// Record offset
        offset: usize,
        /// Underlying encoder error
        source: EncodeError,
    },
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TruncatedRecord { offset } => {
                write!(f, "Truncated record header at offset {offset}")
            }
            Self::UnknownWireType { offset, value } => {
                write!(f, "Unknown wire type {value:#04x} at offset {offset}")
            }
            Self::InvalidFlag { offset, value } => {
                write!(f, "Invalid last-flag byte {value:#04x} at offset {offset}")
            }
            Self::InvalidLinkBits { offset, value } => {
                write!(f, "Invalid link bits {value:#04x} at offset {offset}")
            }
            Self::BadPayloadLength { offset, len } => {
                write!(
                    f,
                    "Payload length {len} invalid for record at offset {offset}"
                )
            }
            Self::PayloadOverrun {
                offset,
                claimed,
                remaining,
            } => {
                write!(
                    f,
                    "Record at offset {offset} claims {claimed} payload bytes, {remaining} remain"
                )
            }
            Self::DuplicateOption { subsystem, option } => {
                write!(
                    f,
                    "Duplicate entry for subsystem {subsystem:#04x} option {option:#04x}"
                )
            }
            Self::LinkMismatch { subsystem, option } => {
                write!(
                    f,
                    "Conflicting link speeds in subsystem {subsystem:#04x} option {option:#04x}"
                )
            }
            Self::WrongTable { offset, subsystem } => {
                write!(
                    f,
                    "Subsystem {subsystem:#04x} at offset {offset} belongs to the other table"
                )
            }
            Self::Encode { offset, source } => {
                write!(f, "Record at offset {offset} failed to encode: {source}")
            }
        }
    }
}

impl core::error::Error for ParseError {}

/// Errors raised by lookups and patches against a built command index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexError {
    /// No entry exists for the (subsystem, option) pair
    ///
    /// Lookup failure is a configuration error, never a recoverable runtime
    /// condition; every pair the driver dispatches must exist at build time.
    MissingOption {
        /// Subsystem id
        subsystem: u8,
        /// Option id
        option: u8,
    },
    /// The descriptor index is past the end of the entry's command sequence
    DescriptorOutOfRange {
        /// Subsystem id
        subsystem: u8,
        /// Option id
        option: u8,
        /// Offending descriptor index
        index: usize,
    },
    /// The addressed descriptor carries no embedded address header
    NotPatchable {
        /// Subsystem id
        subsystem: u8,
        /// Option id
        option: u8,
        /// Offending descriptor index
        index: usize,
    },
    /// The replacement base address is outside the register map
    AddressOutOfRange {
        /// Offending address
        address: u32,
    },
}

impl core::fmt::Display for IndexError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingOption { subsystem, option } => {
                write!(
                    f,
                    "No entry for subsystem {subsystem:#04x} option {option:#04x}"
                )
            }
            Self::DescriptorOutOfRange {
                subsystem,
                option,
                index,
            } => {
                write!(
                    f,
                    "Descriptor {index} out of range for subsystem {subsystem:#04x} option {option:#04x}"
                )
            }
            Self::NotPatchable {
                subsystem,
                option,
                index,
            } => {
                write!(
                    f,
                    "Descriptor {index} of subsystem {subsystem:#04x} option {option:#04x} has no address header"
                )
            }
            Self::AddressOutOfRange { address } => {
                write!(f, "Patch address {address:#010x} outside the register map")
            }
        }
    }
}

impl core::error::Error for IndexError {}

/// Errors that can occur when building configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderError {
    /// The per-packet payload limit cannot hold an address header plus data
    PayloadLimitTooSmall {
        /// Requested limit
        limit: usize,
    },
}

impl core::fmt::Display for BuilderError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PayloadLimitTooSmall { limit } => {
                write!(f, "Payload limit {limit} too small for an address header")
            }
        }
    }
}

impl core::error::Error for BuilderError {}

/// Errors that can occur while operating the chip
///
/// Generic over the transport type to preserve the specific bus error.
/// Every failing [`Iris`](crate::chip::Iris) operation documents which mode
/// the chip is left in; no error exposes an undefined intermediate state.
#[derive(Debug)]
pub enum Error<T: Transport> {
    /// Bus-level I/O failure, propagated unchanged from the transport
    ///
    /// Fatal for the in-flight transition only; the state machine falls
    /// back to pass-through before surfacing it.
    Transport(T::Error),
    /// Packet construction failed
    Encode(EncodeError),
    /// A dispatched (subsystem, option) pair is absent from the index
    ///
    /// Indicates a configuration/table-building bug, not a runtime
    /// condition to retry.
    MissingOption {
        /// Subsystem id
        subsystem: u8,
        /// Option id
        option: u8,
    },
    /// A power-island dependency would be violated
    ///
    /// The operation is refused and island state is unchanged; disable the
    /// dependent island first.
    SequenceViolation {
        /// Island whose gating was requested
        domain: PowerDomain,
        /// Enabled island that depends on it
        dependent: PowerDomain,
    },
    /// The requested mode change is not an edge of the transition graph
    IllegalTransition {
        /// Committed mode at the time of the request
        from: Mode,
        /// Requested target mode
        to: Mode,
    },
    /// The chip did not acknowledge readiness within the bounded retries
    Timeout,
    /// The chip answered a readiness or identify query with a malformed reply
    HardwareNotReady,
}

impl<T: Transport> From<EncodeError> for Error<T> {
    fn from(e: EncodeError) -> Self {
        Error::Encode(e)
    }
}

impl<T: Transport> core::fmt::Display for Error<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {e:?}"),
            Self::Encode(e) => write!(f, "Encode error: {e}"),
            Self::MissingOption { subsystem, option } => {
                write!(
                    f,
                    "Missing command entry for subsystem {subsystem:#04x} option {option:#04x}"
                )
            }
            Self::SequenceViolation { domain, dependent } => {
                write!(f, "Cannot gate {domain} while {dependent} is enabled")
            }
            Self::IllegalTransition { from, to } => {
                write!(f, "Illegal mode transition {from} -> {to}")
            }
            Self::Timeout => write!(f, "Chip did not become ready in time"),
            Self::HardwareNotReady => write!(f, "Malformed readiness reply from chip"),
        }
    }
}

impl<T: Transport + core::fmt::Debug> core::error::Error for Error<T> {}
