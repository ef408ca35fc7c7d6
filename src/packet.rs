//! Bus packet types and the register-operation encoder
//!
//! A [`Packet`] is a single bus transaction destined for the co-processor:
//! a wire type, a payload, an optional post-dispatch wait, and a
//! last-in-group marker. Register writes and reads embed a 4-byte
//! little-endian base address at the start of the payload; panel-style
//! short writes carry their 1- or 2-byte payload bare.
//!
//! [`PacketEncoder`] converts one logical register operation into the
//! minimum number of bus-compliant packets. It is pure: no side effects,
//! no transport access. The split policy for oversized writes is fixed at
//! construction time.
//!
//! ## Example
//!
//! ```
//! use iris2p::{LastFlagPolicy, PacketEncoder};
//!
//! let encoder = match PacketEncoder::new(120, LastFlagPolicy::FinalOnly, 0x0400_0000) {
//!     Ok(encoder) => encoder,
//!     Err(_) => return,
//! };
//! let packets = match encoder.encode_write(0x2000, &[0xAA; 200]) {
//!     Ok(packets) => packets,
//!     Err(_) => return,
//! };
//! // 200 data bytes at a 120-byte packet limit (116 after the header)
//! assert_eq!(packets.len(), 2);
//! assert_eq!(packets[0].embedded_address(), Some(0x2000));
//! assert_eq!(packets[1].embedded_address(), Some(0x2000 + 116));
//! ```

use alloc::vec::Vec;

use crate::error::EncodeError;

/// Length of the base-address header embedded in register packets
pub const ADDR_HEADER_LEN: usize = 4;

/// Length of the status header on a short-form read reply
pub const SHORT_RESPONSE_HEADER_LEN: usize = 1;

/// Length of the echoed-address header on a long-form read reply
pub const LONG_RESPONSE_HEADER_LEN: usize = 4;

/// Wire-level transaction type of a packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    /// 1-byte panel command, no address header
    ShortWrite,
    /// 2-byte panel command (command + parameter), no address header
    ShortWriteParam,
    /// Register write: 4-byte address header plus data chunk
    LongWrite,
    /// Register read request: 4-byte address header, no data
    ReadRequest,
}

impl WireType {
    /// Decode a raw descriptor wire-type byte
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0x05 => Some(Self::ShortWrite),
            0x15 => Some(Self::ShortWriteParam),
            0x29 => Some(Self::LongWrite),
            0x06 => Some(Self::ReadRequest),
            _ => None,
        }
    }

    /// Raw wire-type byte as it appears in descriptors and bus framing
    pub fn raw(self) -> u8 {
        match self {
            Self::ShortWrite => 0x05,
            Self::ShortWriteParam => 0x15,
            Self::LongWrite => 0x29,
            Self::ReadRequest => 0x06,
        }
    }

    /// Whether packets of this type begin with an embedded address header
    pub fn has_address_header(self) -> bool {
        matches!(self, Self::LongWrite | Self::ReadRequest)
    }
}

/// A single bus transaction for the co-processor
///
/// Built command-index descriptors are stored in exactly this form, so an
/// indexed command sequence is wire-ready without further materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Wire-level transaction type
    pub wire_type: WireType,
    /// Raw payload; register operations begin with the 4-byte address
    pub payload: Vec<u8>,
    /// Delay to insert after dispatching this packet, in microseconds
    pub post_wait_us: u32,
    /// Marks the final packet of a command group
    pub last_in_group: bool,
}

impl Packet {
    /// Base address embedded in the payload header, if this wire type has one
    pub fn embedded_address(&self) -> Option<u32> {
        if !self.wire_type.has_address_header() {
            return None;
        }
        let bytes: [u8; ADDR_HEADER_LEN] = self.payload.get(..ADDR_HEADER_LEN)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }

    /// Payload with the address header stripped
    ///
    /// For short writes this is the whole payload; for register operations
    /// it is the data chunk after the 4-byte header.
    pub fn chunk(&self) -> &[u8] {
        if self.wire_type.has_address_header() {
            self.payload.get(ADDR_HEADER_LEN..).unwrap_or(&[])
        } else {
            &self.payload
        }
    }
}

/// Policy for marking last-in-group on packets expanded from one write
///
/// Preserved as a construction-time parameter because hardware revisions
/// disagree on which form they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastFlagPolicy {
    /// Only the true final packet of a group carries the flag
    #[default]
    FinalOnly,
    /// Every packet carries the flag
    PerPacket,
}

/// Stateless encoder turning register operations into bus packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketEncoder {
    /// Maximum bytes of payload (header included) a single packet may carry
    max_payload_len: usize,
    /// Last-in-group marking policy for split writes
    last_flag_policy: LastFlagPolicy,
    /// Size of the chip's register map; addresses at or past this are rejected
    address_space_len: u32,
}

impl PacketEncoder {
    /// Smallest usable payload limit: the address header plus one data byte
    pub const MIN_PAYLOAD_LIMIT: usize = ADDR_HEADER_LEN + 1;

    /// Create an encoder
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::LimitTooSmall`] if `max_payload_len` leaves no
    /// room for data after the address header.
    pub fn new(
        max_payload_len: usize,
        last_flag_policy: LastFlagPolicy,
        address_space_len: u32,
    ) -> Result<Self, EncodeError> {
        if max_payload_len < Self::MIN_PAYLOAD_LIMIT {
            return Err(EncodeError::LimitTooSmall {
                limit: max_payload_len,
            });
        }
        Ok(Self {
            max_payload_len,
            last_flag_policy,
            address_space_len,
        })
    }

    /// Per-packet payload limit this encoder splits against
    pub fn max_payload_len(&self) -> usize {
        self.max_payload_len
    }

    /// Configured last-in-group marking policy
    pub fn last_flag_policy(&self) -> LastFlagPolicy {
        self.last_flag_policy
    }

    /// Size of the register map addresses are checked against
    pub fn address_space_len(&self) -> u32 {
        self.address_space_len
    }

    /// Encode one logical register write into the minimum number of packets
    ///
    /// A payload that fits alongside the 4-byte header takes the
    /// single-packet path, including the exact boundary case. Oversized
    /// payloads split into chunks of `max_payload_len - 4` bytes, packet
    /// `i` carrying base address `address + i * chunk_len`. Continuation
    /// addresses wrap within the 32-bit space.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::EmptyPayload`] for zero-length data and
    /// [`EncodeError::AddressOutOfRange`] for a base address outside the
    /// register map.
    pub fn encode_write(&self, address: u32, data: &[u8]) -> Result<Vec<Packet>, EncodeError> {
        if data.is_empty() {
            return Err(EncodeError::EmptyPayload);
        }
        self.check_address(address)?;

        let chunk_len = self.max_payload_len - ADDR_HEADER_LEN;
        let count = data.len().div_ceil(chunk_len);
        let mut packets = Vec::with_capacity(count);
        for (i, chunk) in data.chunks(chunk_len).enumerate() {
            let base = address.wrapping_add((i * chunk_len) as u32);
            let mut payload = Vec::with_capacity(ADDR_HEADER_LEN + chunk.len());
            payload.extend_from_slice(&base.to_le_bytes());
            payload.extend_from_slice(chunk);
            let last = match self.last_flag_policy {
                LastFlagPolicy::PerPacket => true,
                LastFlagPolicy::FinalOnly => i + 1 == count,
            };
            packets.push(Packet {
                wire_type: WireType::LongWrite,
                payload,
                post_wait_us: 0,
                last_in_group: last,
            });
        }
        Ok(packets)
    }

    /// Encode a register read request
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::AddressOutOfRange`] for an address outside
    /// the register map.
    pub fn encode_read(&self, address: u32) -> Result<Packet, EncodeError> {
        self.check_address(address)?;
        Ok(Packet {
            wire_type: WireType::ReadRequest,
            payload: address.to_le_bytes().to_vec(),
            post_wait_us: 0,
            last_in_group: true,
        })
    }

    fn check_address(&self, address: u32) -> Result<(), EncodeError> {
        if address >= self.address_space_len {
            return Err(EncodeError::AddressOutOfRange { address });
        }
        Ok(())
    }
}

/// Strip the response header from a raw read reply
///
/// Replies arrive in one of two forms: short (1-byte status header) or
/// long (4-byte echoed-address header). The form is inferred from the
/// reply length relative to the expected value length.
///
/// # Errors
///
/// Returns [`EncodeError::ResponseLength`] if the reply length matches
/// neither form.
///
/// ```
/// use iris2p::packet::decode_read_response;
///
/// // short form: status byte + 2 value bytes
/// assert_eq!(decode_read_response(&[0x00, 0x12, 0x34], 2), Ok(&[0x12, 0x34][..]));
/// // long form: echoed address + 1 value byte
/// assert_eq!(decode_read_response(&[0, 0x20, 0, 0, 0x56], 1), Ok(&[0x56][..]));
/// assert!(decode_read_response(&[0x00], 3).is_err());
/// ```
pub fn decode_read_response(reply: &[u8], value_len: usize) -> Result<&[u8], EncodeError> {
    match reply.len().checked_sub(value_len) {
        Some(SHORT_RESPONSE_HEADER_LEN) => Ok(reply.get(SHORT_RESPONSE_HEADER_LEN..).unwrap_or(&[])),
        Some(LONG_RESPONSE_HEADER_LEN) => Ok(reply.get(LONG_RESPONSE_HEADER_LEN..).unwrap_or(&[])),
        _ => Err(EncodeError::ResponseLength {
            expected: value_len,
            actual: reply.len(),
        }),
    }
}
