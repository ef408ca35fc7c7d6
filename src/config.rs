//! Chip configuration types and builder
//!
//! Everything hardware revisions disagree on lives here as data: packet
//! limits and split policy, subsystem/option id assignments, readiness
//! polling bounds, and link-toggle delays. The values are opaque chip
//! configuration, not derived semantics; override them per board.

use alloc::vec::Vec;

pub use crate::error::BuilderError;
use crate::packet::{LastFlagPolicy, PacketEncoder};

/// Chip configuration
///
/// Use [`Builder`] to create a `Config`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Packet encoder carrying the bus limit and split policy
    pub encoder: PacketEncoder,
    /// Subsystem id of the power-gating command groups
    pub power_subsystem: u8,
    /// Subsystem id of the pixel-path routing command groups
    pub pipeline_subsystem: u8,
    /// Subsystem id of the analog-bypass command groups
    pub bypass_subsystem: u8,
    /// Pipeline option selecting pass-through routing
    pub pt_option: u8,
    /// Pipeline option selecting reduced-frame-buffer routing
    pub rfb_option: u8,
    /// Pipeline option selecting frame-rate-conversion routing
    pub frc_option: u8,
    /// Bypass option entering analog bypass
    pub abyp_enter_option: u8,
    /// Bypass option exiting analog bypass
    pub abyp_exit_option: u8,
    /// Bypass option toggling the physical link
    pub link_reset_option: u8,
    /// Register holding the readiness status byte
    pub status_address: u32,
    /// Bits of the status byte that signal readiness
    pub ready_mask: u8,
    /// Masked status value meaning ready
    pub ready_value: u8,
    /// Bounded readiness poll attempts per transition
    pub ready_retries: u32,
    /// Fixed interval between readiness polls, in microseconds
    pub ready_poll_interval_us: u32,
    /// Settle time after commanding the physical link down, in microseconds
    pub link_down_wait_us: u32,
    /// Settle time after commanding the physical link up, in microseconds
    pub link_up_wait_us: u32,
    /// Register holding the chip revision byte
    pub revision_address: u32,
    /// One-time bring-up dispatched after the first confirmed bypass exit
    pub bootstrap_sequence: Vec<(u8, u8)>,
}

/// Builder for constructing chip configuration
///
/// Defaults match the reference board; every id and timing is
/// panel-specific and overridable.
#[must_use]
pub struct Builder {
    max_payload_len: usize,
    last_flag_policy: LastFlagPolicy,
    address_space_len: u32,
    power_subsystem: u8,
    pipeline_subsystem: u8,
    bypass_subsystem: u8,
    pt_option: u8,
    rfb_option: u8,
    frc_option: u8,
    abyp_enter_option: u8,
    abyp_exit_option: u8,
    link_reset_option: u8,
    status_address: u32,
    ready_mask: u8,
    ready_value: u8,
    ready_retries: u32,
    ready_poll_interval_us: u32,
    link_down_wait_us: u32,
    link_up_wait_us: u32,
    revision_address: u32,
    bootstrap_sequence: Vec<(u8, u8)>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            // Default bus limit (override to the revision's OCP budget)
            max_payload_len: 240,
            last_flag_policy: LastFlagPolicy::FinalOnly,
            // 64 MiB register map
            address_space_len: 0x0400_0000,
            power_subsystem: 0x03,
            pipeline_subsystem: 0x02,
            bypass_subsystem: 0x04,
            pt_option: 0x00,
            rfb_option: 0x01,
            frc_option: 0x02,
            abyp_enter_option: 0x00,
            abyp_exit_option: 0x01,
            link_reset_option: 0x02,
            status_address: 0x0000_1140,
            ready_mask: 0x01,
            ready_value: 0x01,
            ready_retries: 10,
            ready_poll_interval_us: 1_000,
            link_down_wait_us: 10_000,
            link_up_wait_us: 5_000,
            revision_address: 0x0000_1000,
            bootstrap_sequence: Vec::new(),
        }
    }
}

impl Builder {
    /// Create a new Builder with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-packet payload limit in bytes (header included)
    pub fn max_payload_len(mut self, len: usize) -> Self {
        self.max_payload_len = len;
        self
    }

    /// Set the last-in-group marking policy for split writes
    pub fn last_flag_policy(mut self, policy: LastFlagPolicy) -> Self {
        self.last_flag_policy = policy;
        self
    }

    /// Set the register-map size addresses are validated against
    pub fn address_space_len(mut self, len: u32) -> Self {
        self.address_space_len = len;
        self
    }

    /// Set the power-gating subsystem id
    pub fn power_subsystem(mut self, id: u8) -> Self {
        self.power_subsystem = id;
        self
    }

    /// Set the pipeline-routing subsystem id
    pub fn pipeline_subsystem(mut self, id: u8) -> Self {
        self.pipeline_subsystem = id;
        self
    }

    /// Set the analog-bypass subsystem id
    pub fn bypass_subsystem(mut self, id: u8) -> Self {
        self.bypass_subsystem = id;
        self
    }

    /// Set the pipeline option ids for (pass-through, RFB, FRC) routing
    pub fn pipeline_options(mut self, pt: u8, rfb: u8, frc: u8) -> Self {
        self.pt_option = pt;
        self.rfb_option = rfb;
        self.frc_option = frc;
        self
    }

    /// Set the bypass option ids for (enter, exit, link reset)
    pub fn bypass_options(mut self, enter: u8, exit: u8, link_reset: u8) -> Self {
        self.abyp_enter_option = enter;
        self.abyp_exit_option = exit;
        self.link_reset_option = link_reset;
        self
    }

    /// Set the readiness status register address
    pub fn status_address(mut self, address: u32) -> Self {
        self.status_address = address;
        self
    }

    /// Set the readiness mask and expected masked value
    pub fn ready_condition(mut self, mask: u8, value: u8) -> Self {
        self.ready_mask = mask;
        self.ready_value = value;
        self
    }

    /// Set the bounded readiness retry count
    pub fn ready_retries(mut self, retries: u32) -> Self {
        self.ready_retries = retries;
        self
    }

    /// Set the fixed readiness poll interval in microseconds
    pub fn ready_poll_interval_us(mut self, interval: u32) -> Self {
        self.ready_poll_interval_us = interval;
        self
    }

    /// Set the link power-down and power-up settle times in microseconds
    pub fn link_toggle_waits_us(mut self, down: u32, up: u32) -> Self {
        self.link_down_wait_us = down;
        self.link_up_wait_us = up;
        self
    }

    /// Set the chip revision register address
    pub fn revision_address(mut self, address: u32) -> Self {
        self.revision_address = address;
        self
    }

    /// Set the one-time bring-up sequence of (subsystem, option) pairs
    pub fn bootstrap_sequence(mut self, sequence: Vec<(u8, u8)>) -> Self {
        self.bootstrap_sequence = sequence;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::PayloadLimitTooSmall`] if the payload limit
    /// cannot hold an address header plus one data byte.
    pub fn build(self) -> Result<Config, BuilderError> {
        let encoder = PacketEncoder::new(
            self.max_payload_len,
            self.last_flag_policy,
            self.address_space_len,
        )
        .map_err(|_| BuilderError::PayloadLimitTooSmall {
            limit: self.max_payload_len,
        })?;
        Ok(Config {
            encoder,
            power_subsystem: self.power_subsystem,
            pipeline_subsystem: self.pipeline_subsystem,
            bypass_subsystem: self.bypass_subsystem,
            pt_option: self.pt_option,
            rfb_option: self.rfb_option,
            frc_option: self.frc_option,
            abyp_enter_option: self.abyp_enter_option,
            abyp_exit_option: self.abyp_exit_option,
            link_reset_option: self.link_reset_option,
            status_address: self.status_address,
            ready_mask: self.ready_mask,
            ready_value: self.ready_value,
            ready_retries: self.ready_retries,
            ready_poll_interval_us: self.ready_poll_interval_us,
            link_down_wait_us: self.link_down_wait_us,
            link_up_wait_us: self.link_up_wait_us,
            revision_address: self.revision_address,
            bootstrap_sequence: self.bootstrap_sequence,
        })
    }
}
