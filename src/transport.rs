//! Transport abstraction
//!
//! This module provides the [`Transport`] trait the command index and the
//! mode state machine are written against, plus the two concrete bus
//! flavors the chip ships with: a serial command/response link
//! ([`SpiLinkTransport`]) and a 16-bit-addressed block bus
//! ([`BlockBusTransport`]).
//!
//! Transports move bytes; they never interpret command semantics, insert
//! post-dispatch waits, or retry. Sequencing belongs to the callers.

use core::fmt::Debug;

use alloc::vec;
use alloc::vec::Vec;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use embedded_hal::i2c::I2c;
use embedded_hal::spi::{Operation, SpiDevice};

use crate::packet::{LONG_RESPONSE_HEADER_LEN, Packet, SHORT_RESPONSE_HEADER_LEN};

/// Byte-oriented duplex channel to the co-processor
///
/// Implementations are blocking; a call returns only once the bus
/// transaction completed or failed. They are never reentered from the
/// same thread.
pub trait Transport {
    /// Error type for bus operations
    ///
    /// Must implement [`Debug`] for error reporting.
    type Error: Debug;

    /// Send a batch of packets, in order
    fn write(&mut self, packets: &[Packet]) -> Result<(), Self::Error>;

    /// Issue a read-request packet and return the raw reply
    ///
    /// `value_len` is the number of value bytes the caller expects; the
    /// returned reply still carries the flavor's response header (1 byte
    /// on the serial link, 4 bytes on the block bus) for
    /// [`decode_read_response`](crate::packet::decode_read_response) to
    /// strip.
    fn read(&mut self, packet: &Packet, value_len: usize) -> Result<Vec<u8>, Self::Error>;
}

/// Errors that can occur on the serial link
///
/// Generic over SPI and GPIO error types.
#[derive(Debug)]
pub enum LinkError<SpiErr, PinErr> {
    /// SPI communication error
    Spi(SpiErr),
    /// GPIO pin error
    Pin(PinErr),
    /// The ready pin did not assert within the polling budget
    NotReady,
}

impl<SpiErr: Debug, PinErr: Debug> core::fmt::Display for LinkError<SpiErr, PinErr> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Spi(e) => write!(f, "SPI error: {e:?}"),
            Self::Pin(e) => write!(f, "Pin error: {e:?}"),
            Self::NotReady => write!(f, "Link not ready"),
        }
    }
}

impl<SpiErr: Debug, PinErr: Debug> core::error::Error for LinkError<SpiErr, PinErr> {}

/// Default ready-pin polling budget in microseconds
pub const DEFAULT_READY_BUDGET_US: u32 = 100_000;

/// Serial command/response link flavor
///
/// Frames every packet as a 1-byte wire-type opcode followed by the
/// payload, in a single bus transaction. A ready GPIO gates each
/// transaction: the chip deasserts it while digesting the previous
/// command.
///
/// ## Type Parameters
///
/// * `SPI` - SPI device implementing [`SpiDevice`]
/// * `RDY` - Ready pin implementing [`InputPin`] (active high)
/// * `D` - Delay implementing [`DelayNs`], used for ready polling
pub struct SpiLinkTransport<SPI, RDY, D> {
    /// SPI device for communication
    spi: SPI,
    /// Ready pin (active high)
    ready: RDY,
    /// Delay source for ready polling
    delay: D,
    /// Ready polling budget in microseconds
    ready_budget_us: u32,
}

impl<SPI, RDY, D> SpiLinkTransport<SPI, RDY, D>
where
    SPI: SpiDevice,
    RDY: InputPin,
    D: DelayNs,
{
    /// Create a new serial link transport
    pub fn new(spi: SPI, ready: RDY, delay: D) -> Self {
        Self {
            spi,
            ready,
            delay,
            ready_budget_us: DEFAULT_READY_BUDGET_US,
        }
    }

    /// Set the ready-pin polling budget in microseconds
    pub fn set_ready_budget(&mut self, budget_us: u32) -> &mut Self {
        self.ready_budget_us = budget_us;
        self
    }

    /// Poll the ready pin until it asserts or the budget elapses
    fn wait_ready(&mut self) -> Result<(), LinkError<SPI::Error, RDY::Error>> {
        const STEP_US: u32 = 10;
        let mut waited = 0;
        loop {
            if self.ready.is_high().map_err(LinkError::Pin)? {
                return Ok(());
            }
            if waited >= self.ready_budget_us {
                return Err(LinkError::NotReady);
            }
            self.delay.delay_us(STEP_US);
            waited += STEP_US;
        }
    }
}

impl<SPI, RDY, D> Transport for SpiLinkTransport<SPI, RDY, D>
where
    SPI: SpiDevice,
    SPI::Error: Debug,
    RDY: InputPin,
    RDY::Error: Debug,
    D: DelayNs,
{
    type Error = LinkError<SPI::Error, RDY::Error>;

    fn write(&mut self, packets: &[Packet]) -> Result<(), Self::Error> {
        for packet in packets {
            self.wait_ready()?;
            let opcode = [packet.wire_type.raw()];
            self.spi
                .transaction(&mut [Operation::Write(&opcode), Operation::Write(&packet.payload)])
                .map_err(LinkError::Spi)?;
        }
        Ok(())
    }

    fn read(&mut self, packet: &Packet, value_len: usize) -> Result<Vec<u8>, Self::Error> {
        self.wait_ready()?;
        let opcode = [packet.wire_type.raw()];
        self.spi
            .transaction(&mut [Operation::Write(&opcode), Operation::Write(&packet.payload)])
            .map_err(LinkError::Spi)?;
        self.wait_ready()?;
        let mut reply = vec![0u8; SHORT_RESPONSE_HEADER_LEN + value_len];
        self.spi.read(&mut reply).map_err(LinkError::Spi)?;
        Ok(reply)
    }
}

/// Default command-window register for packets without an address header
pub const DEFAULT_CMD_REGISTER: u16 = 0xFF00;

/// 16-bit-addressed block bus flavor
///
/// Maps each packet's embedded base address onto the bus's 64 KiB register
/// window (the window base is programmed by the platform); packets without
/// an address header land on a fixed command register. Reads are
/// write-then-read and the device prefixes the value with its 4-byte
/// echoed-address header.
pub struct BlockBusTransport<I2C> {
    /// I2C bus
    i2c: I2C,
    /// 7-bit device address
    address: u8,
    /// Register receiving addressless command payloads
    cmd_register: u16,
}

impl<I2C: I2c> BlockBusTransport<I2C> {
    /// Create a new block bus transport for a device address
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c,
            address,
            cmd_register: DEFAULT_CMD_REGISTER,
        }
    }

    /// Set the register receiving addressless command payloads
    pub fn set_cmd_register(&mut self, register: u16) -> &mut Self {
        self.cmd_register = register;
        self
    }

    fn register_for(&self, packet: &Packet) -> u16 {
        packet
            .embedded_address()
            .map_or(self.cmd_register, |address| address as u16)
    }
}

impl<I2C> Transport for BlockBusTransport<I2C>
where
    I2C: I2c,
    I2C::Error: Debug,
{
    type Error = I2C::Error;

    fn write(&mut self, packets: &[Packet]) -> Result<(), Self::Error> {
        for packet in packets {
            let register = self.register_for(packet);
            let chunk = packet.chunk();
            let mut frame = Vec::with_capacity(2 + chunk.len());
            frame.extend_from_slice(&register.to_be_bytes());
            frame.extend_from_slice(chunk);
            self.i2c.write(self.address, &frame)?;
        }
        Ok(())
    }

    fn read(&mut self, packet: &Packet, value_len: usize) -> Result<Vec<u8>, Self::Error> {
        let register = self.register_for(packet).to_be_bytes();
        let mut reply = vec![0u8; LONG_RESPONSE_HEADER_LEN + value_len];
        self.i2c.write_read(self.address, &register, &mut reply)?;
        Ok(reply)
    }
}
