//! Descriptor tables and the command index
//!
//! The chip is driven by declarative command tables: a binary descriptor
//! blob (device-tree sourced) compiles once at init into a [`CommandIndex`]
//! mapping (subsystem, option) pairs to wire-ready command sequences. A
//! second, independently loaded table in a reserved high subsystem-id range
//! carries look-up-table calibration sequences from firmware.
//!
//! ## Record format
//!
//! Each record is an 8-byte header followed by payload:
//!
//! | offset | field        | meaning                                        |
//! |--------|--------------|------------------------------------------------|
//! | 0      | wire type    | see [`WireType::from_raw`]                     |
//! | 1      | last flag    | 0 or 1, closes the (subsystem, option) group   |
//! | 2      | wait         | post-dispatch delay, units of 10 microseconds  |
//! | 3      | subsystem id | `>= 0xA0` is the LUT range                     |
//! | 4      | option id    | configuration variant                          |
//! | 5      | link         | 0 = low speed, 1 = high speed                  |
//! | 6..8   | payload len  | big-endian byte count of payload that follows  |
//!
//! Consecutive records sharing a (subsystem, option) pair fold into one
//! [`OptionEntry`]; oversized register writes are split through the
//! [`PacketEncoder`] at build time so dispatch never re-encodes.
//!
//! Tables are read-only after build. The single permitted mutation is
//! [`CommandIndex::patch_address`], a bounds-checked rewrite of one
//! descriptor's embedded address header, used to re-target a prepared LUT
//! sequence between ping-pong buffer destinations.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;

use crate::error::{Error, IndexError, ParseError};
use crate::packet::{ADDR_HEADER_LEN, LastFlagPolicy, Packet, PacketEncoder, WireType};
use crate::transport::Transport;

/// First subsystem id of the reserved LUT table range
pub const LUT_SUBSYSTEM_BASE: u8 = 0xA0;

/// Bytes in a descriptor record header
pub const RECORD_HEADER_LEN: usize = 8;

/// Link speed a command group must be dispatched at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkSpeed {
    /// Low-power escape-mode link
    #[default]
    Low,
    /// High-speed link
    High,
}

/// One (subsystem, option) command sequence
///
/// Immutable once built, except through
/// [`CommandIndex::patch_address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionEntry {
    /// Subsystem (IP block) id
    pub subsystem: u8,
    /// Option (configuration variant) id
    pub option: u8,
    /// Link speed the sequence must be sent at
    pub link_speed: LinkSpeed,
    /// Wire-ready command sequence, in dispatch order
    pub commands: Vec<Packet>,
}

/// Compiled, queryable command tables for one chip
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandIndex {
    /// Core table, subsystem ids below [`LUT_SUBSYSTEM_BASE`]
    core: BTreeMap<u8, Vec<OptionEntry>>,
    /// Calibration table, subsystem ids at or above [`LUT_SUBSYSTEM_BASE`]
    lut: BTreeMap<u8, Vec<OptionEntry>>,
    /// Register-map bound for patch validation
    address_space_len: u32,
}

impl CommandIndex {
    /// Compile a core descriptor blob into an index
    ///
    /// Fails atomically: a malformed record anywhere yields an error and no
    /// partial index.
    ///
    /// # Errors
    ///
    /// See [`ParseError`] for every rejected shape.
    pub fn build(blob: &[u8], encoder: &PacketEncoder) -> Result<Self, ParseError> {
        let core = parse_table(blob, encoder, TableKind::Core)?;
        log::debug!(
            "command index built: {} subsystems, {} descriptors",
            core.len(),
            table_command_count(&core)
        );
        Ok(Self {
            core,
            lut: BTreeMap::new(),
            address_space_len: encoder.address_space_len(),
        })
    }

    /// Load or replace the LUT table from a calibration-firmware blob
    ///
    /// Every record must carry a subsystem id in the reserved LUT range.
    /// The previous LUT table is replaced only if the whole blob parses.
    ///
    /// # Errors
    ///
    /// See [`ParseError`].
    pub fn load_lut_table(
        &mut self,
        blob: &[u8],
        encoder: &PacketEncoder,
    ) -> Result<(), ParseError> {
        let lut = parse_table(blob, encoder, TableKind::Lut)?;
        log::debug!(
            "lut table loaded: {} subsystems, {} descriptors",
            lut.len(),
            table_command_count(&lut)
        );
        self.lut = lut;
        Ok(())
    }

    /// Exact-match lookup of one option entry
    ///
    /// The subsystem id range selects the table; core and LUT entries are
    /// never mixed. `None` means the configuration never defined the pair —
    /// callers treat that as fatal, not as a runtime condition.
    pub fn lookup(&self, subsystem: u8, option: u8) -> Option<&OptionEntry> {
        self.table(subsystem)
            .get(&subsystem)?
            .iter()
            .find(|entry| entry.option == option)
    }

    /// Rewrite the embedded base address of one built descriptor
    ///
    /// The only permitted post-build mutation: an in-place, bounds-checked
    /// header rewrite that never changes packet count or payload length.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError`] if the entry or descriptor does not exist,
    /// the descriptor has no address header, or the address is outside the
    /// register map.
    pub fn patch_address(
        &mut self,
        subsystem: u8,
        option: u8,
        descriptor: usize,
        new_base: u32,
    ) -> Result<(), IndexError> {
        if new_base >= self.address_space_len {
            return Err(IndexError::AddressOutOfRange { address: new_base });
        }
        let entry = self
            .table_mut(subsystem)
            .get_mut(&subsystem)
            .and_then(|bucket| bucket.iter_mut().find(|entry| entry.option == option))
            .ok_or(IndexError::MissingOption { subsystem, option })?;
        let packet =
            entry
                .commands
                .get_mut(descriptor)
                .ok_or(IndexError::DescriptorOutOfRange {
                    subsystem,
                    option,
                    index: descriptor,
                })?;
        if !packet.wire_type.has_address_header() || packet.payload.len() < ADDR_HEADER_LEN {
            return Err(IndexError::NotPatchable {
                subsystem,
                option,
                index: descriptor,
            });
        }
        if let Some(header) = packet.payload.get_mut(..ADDR_HEADER_LEN) {
            header.copy_from_slice(&new_base.to_le_bytes());
        }
        Ok(())
    }

    /// Send one option's command sequence through a transport
    ///
    /// Packets are written in batches; a packet with a post-wait closes its
    /// batch and the wait elapses on `delay` before the next batch starts.
    ///
    /// # Errors
    ///
    /// [`Error::MissingOption`] for an undefined pair, [`Error::Transport`]
    /// for bus failures.
    pub fn dispatch<T: Transport, D: DelayNs>(
        &self,
        subsystem: u8,
        option: u8,
        transport: &mut T,
        delay: &mut D,
    ) -> Result<(), Error<T>> {
        let entry = self
            .lookup(subsystem, option)
            .ok_or(Error::MissingOption { subsystem, option })?;
        log::trace!(
            "dispatch subsystem {:#04x} option {:#04x}: {} packets",
            subsystem,
            option,
            entry.commands.len()
        );
        let mut start = 0;
        for (i, packet) in entry.commands.iter().enumerate() {
            if packet.post_wait_us > 0 || i + 1 == entry.commands.len() {
                let batch = entry.commands.get(start..=i).unwrap_or(&[]);
                transport.write(batch).map_err(Error::Transport)?;
                if packet.post_wait_us > 0 {
                    delay.delay_us(packet.post_wait_us);
                }
                start = i + 1;
            }
        }
        Ok(())
    }

    /// Total descriptor count across both tables
    pub fn command_count(&self) -> usize {
        table_command_count(&self.core) + table_command_count(&self.lut)
    }

    /// Number of option entries across both tables
    pub fn option_count(&self) -> usize {
        let count = |t: &BTreeMap<u8, Vec<OptionEntry>>| t.values().map(Vec::len).sum::<usize>();
        count(&self.core) + count(&self.lut)
    }

    fn table(&self, subsystem: u8) -> &BTreeMap<u8, Vec<OptionEntry>> {
        if subsystem >= LUT_SUBSYSTEM_BASE {
            &self.lut
        } else {
            &self.core
        }
    }

    fn table_mut(&mut self, subsystem: u8) -> &mut BTreeMap<u8, Vec<OptionEntry>> {
        if subsystem >= LUT_SUBSYSTEM_BASE {
            &mut self.lut
        } else {
            &mut self.core
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TableKind {
    Core,
    Lut,
}

fn table_command_count(table: &BTreeMap<u8, Vec<OptionEntry>>) -> usize {
    table
        .values()
        .flat_map(|bucket| bucket.iter())
        .map(|entry| entry.commands.len())
        .sum()
}

fn parse_table(
    blob: &[u8],
    encoder: &PacketEncoder,
    kind: TableKind,
) -> Result<BTreeMap<u8, Vec<OptionEntry>>, ParseError> {
    let mut table: BTreeMap<u8, Vec<OptionEntry>> = BTreeMap::new();
    let mut open_key: Option<(u8, u8)> = None;
    let mut offset = 0;

    while offset < blob.len() {
        let header = blob
            .get(offset..offset + RECORD_HEADER_LEN)
            .ok_or(ParseError::TruncatedRecord { offset })?;
        let wire_type = WireType::from_raw(header[0]).ok_or(ParseError::UnknownWireType {
            offset,
            value: header[0],
        })?;
        let last_flag = match header[1] {
            0 => false,
            1 => true,
            value => return Err(ParseError::InvalidFlag { offset, value }),
        };
        let wait = header[2];
        let subsystem = header[3];
        let option = header[4];
        let link_speed = match header[5] {
            0 => LinkSpeed::Low,
            1 => LinkSpeed::High,
            value => return Err(ParseError::InvalidLinkBits { offset, value }),
        };
        let payload_len = usize::from(u16::from_be_bytes([header[6], header[7]]));

        let in_lut_range = subsystem >= LUT_SUBSYSTEM_BASE;
        if in_lut_range != (kind == TableKind::Lut) {
            return Err(ParseError::WrongTable { offset, subsystem });
        }

        let payload_off = offset + RECORD_HEADER_LEN;
        let payload = blob
            .get(payload_off..payload_off + payload_len)
            .ok_or(ParseError::PayloadOverrun {
                offset,
                claimed: payload_len,
                remaining: blob.len() - payload_off,
            })?;

        let length_ok = match wire_type {
            WireType::ShortWrite => payload_len == 1,
            WireType::ShortWriteParam => payload_len == 2,
            WireType::ReadRequest => payload_len == ADDR_HEADER_LEN,
            WireType::LongWrite => payload_len > ADDR_HEADER_LEN,
        };
        if !length_ok {
            return Err(ParseError::BadPayloadLength {
                offset,
                len: payload_len,
            });
        }

        let mut commands = expand_record(wire_type, payload, encoder, offset)?;
        match encoder.last_flag_policy() {
            LastFlagPolicy::PerPacket => {
                for packet in &mut commands {
                    packet.last_in_group = true;
                }
            }
            LastFlagPolicy::FinalOnly => {
                for packet in &mut commands {
                    packet.last_in_group = false;
                }
                if let Some(tail) = commands.last_mut() {
                    tail.last_in_group = last_flag;
                }
            }
        }
        if let Some(tail) = commands.last_mut() {
            tail.post_wait_us = u32::from(wait) * 10;
        }

        let key = (subsystem, option);
        if open_key == Some(key) {
            // Continuation of the open group.
            if let Some(entry) = table
                .get_mut(&subsystem)
                .and_then(|bucket| bucket.last_mut())
            {
                if entry.link_speed != link_speed {
                    return Err(ParseError::LinkMismatch { subsystem, option });
                }
                entry.commands.append(&mut commands);
            }
        } else {
            let bucket = table.entry(subsystem).or_default();
            if bucket.iter().any(|entry| entry.option == option) {
                return Err(ParseError::DuplicateOption { subsystem, option });
            }
            bucket.push(OptionEntry {
                subsystem,
                option,
                link_speed,
                commands,
            });
            open_key = Some(key);
        }

        offset = payload_off + payload_len;
    }

    Ok(table)
}

/// Expand one record into descriptors, splitting oversized register writes
fn expand_record(
    wire_type: WireType,
    payload: &[u8],
    encoder: &PacketEncoder,
    offset: usize,
) -> Result<Vec<Packet>, ParseError> {
    if wire_type == WireType::LongWrite && payload.len() > encoder.max_payload_len() {
        let (addr_bytes, data) = payload.split_at(ADDR_HEADER_LEN);
        let bytes: [u8; ADDR_HEADER_LEN] = addr_bytes
            .try_into()
            .map_err(|_| ParseError::TruncatedRecord { offset })?;
        let address = u32::from_le_bytes(bytes);
        return encoder
            .encode_write(address, data)
            .map_err(|source| ParseError::Encode { offset, source });
    }
    Ok(vec![Packet {
        wire_type,
        payload: payload.to_vec(),
        post_wait_us: 0,
        last_in_group: false,
    }])
}
