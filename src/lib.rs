//! Iris2p display co-processor driver
//!
//! Driver core for the Iris2p pixel-processing chip that sits between an
//! application processor and its panel. The chip is table-driven: a
//! per-board binary descriptor stream compiles into a command index, and
//! the driver moves the chip between its four pipeline modes
//! (pass-through, reduced-frame-buffer, frame-rate-conversion, analog
//! bypass) by dispatching indexed command groups with dependency-safe
//! power-island gating and bounded readiness polling.
//!
//! ## Features
//!
//! - `no_std` compatible (requires `alloc`)
//! - `embedded-hal` v1.0 support
//! - Declarative per-revision command tables with build-time packet splitting
//! - Serial-link and block-bus transport flavors, plus a [`Transport`]
//!   trait for custom buses
//! - Pass-through fallback on failed transitions: the panel keeps showing
//!   an image even when enhanced processing is lost
//!
//! ## Usage
//!
//! ```rust,no_run
//! use embedded_hal::delay::DelayNs;
//! use iris2p::{Builder, CommandIndex, Iris, Mode, Packet, Transport};
//!
//! # struct MockTransport;
//! # impl Transport for MockTransport {
//! #     type Error = core::convert::Infallible;
//! #     fn write(&mut self, _packets: &[Packet]) -> Result<(), Self::Error> {
//! #         Ok(())
//! #     }
//! #     fn read(&mut self, _packet: &Packet, value_len: usize) -> Result<Vec<u8>, Self::Error> {
//! #         Ok(vec![0u8; value_len + 1])
//! #     }
//! # }
//! # struct MockDelay;
//! # impl DelayNs for MockDelay { fn delay_ns(&mut self, _ns: u32) {} }
//! let config = match Builder::new().max_payload_len(120).build() {
//!     Ok(config) => config,
//!     Err(_) => return,
//! };
//!
//! // Descriptor blob, normally sourced from the device tree
//! let blob: &[u8] = &[0x15, 1, 0, 0x02, 0x00, 0, 0, 2, 0x02, 0x00];
//! let index = match CommandIndex::build(blob, &config.encoder) {
//!     Ok(index) => index,
//!     Err(_) => return,
//! };
//!
//! // The chip powers up electrically transparent (analog bypass)
//! let mut chip = Iris::new(MockTransport, MockDelay, config, index, Mode::AnalogBypass);
//! let _ = chip.request_transition(Mode::PassThrough, false);
//! ```

#![no_std]

extern crate alloc;

/// Chip instance and the display-pipeline mode state machine
pub mod chip;
/// Chip configuration types and builder
pub mod config;
/// Error types for the driver
pub mod error;
/// Descriptor tables and the command index
pub mod index;
/// Bus packet types and the register-operation encoder
pub mod packet;
/// Power-island tracking and dependency-safe gating
pub mod power;
/// Transport abstraction and concrete bus flavors
pub mod transport;

pub use chip::{Iris, Mode};
pub use config::{Builder, Config};
pub use error::{BuilderError, EncodeError, Error, IndexError, ParseError};
pub use index::{CommandIndex, LUT_SUBSYSTEM_BASE, LinkSpeed, OptionEntry, RECORD_HEADER_LEN};
pub use packet::{
    ADDR_HEADER_LEN, LastFlagPolicy, Packet, PacketEncoder, WireType, decode_read_response,
};
pub use power::{PowerDomain, PowerSequencer};
pub use transport::{
    BlockBusTransport, DEFAULT_READY_BUDGET_US, LinkError, SpiLinkTransport, Transport,
};
