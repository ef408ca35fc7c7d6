//! Power-island tracking and dependency-safe gating
//!
//! The chip's functional blocks sit on independently gateable power
//! islands. Gating commands are ordinary command-index entries under the
//! power subsystem; the sequencer's job is ordering and bookkeeping:
//! dependencies power up first, dependents power down first, and the
//! tracked state only advances after the transport confirms the write.

use embedded_hal::delay::DelayNs;

use crate::error::Error;
use crate::index::CommandIndex;
use crate::transport::Transport;

/// An independently gateable power island inside the chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerDomain {
    /// Secondary MIPI interface
    Mipi2,
    /// Bulk frame SRAM
    BulkSram,
    /// Frame-rate-conversion core
    Frc,
    /// Display stream compression unit
    DscUnit,
    /// Local contrast enhancement core
    Lce,
}

impl PowerDomain {
    /// Every island, in declaration order
    pub const ALL: [PowerDomain; 5] = [
        PowerDomain::Mipi2,
        PowerDomain::BulkSram,
        PowerDomain::Frc,
        PowerDomain::DscUnit,
        PowerDomain::Lce,
    ];

    /// Bit identifying this island in a state mask
    pub const fn mask(self) -> u8 {
        match self {
            PowerDomain::Mipi2 => 1 << 0,
            PowerDomain::BulkSram => 1 << 1,
            PowerDomain::Frc => 1 << 2,
            PowerDomain::DscUnit => 1 << 3,
            PowerDomain::Lce => 1 << 4,
        }
    }

    /// Island that must be enabled before this one
    pub const fn depends_on(self) -> Option<PowerDomain> {
        match self {
            PowerDomain::Frc => Some(PowerDomain::BulkSram),
            PowerDomain::DscUnit => Some(PowerDomain::Mipi2),
            _ => None,
        }
    }

    /// Command-table option ids gating this island (on, off)
    pub const fn gate_options(self) -> (u8, u8) {
        match self {
            PowerDomain::Mipi2 => (0x10, 0x11),
            PowerDomain::BulkSram => (0x12, 0x13),
            PowerDomain::Frc => (0x14, 0x15),
            PowerDomain::DscUnit => (0x16, 0x17),
            PowerDomain::Lce => (0x18, 0x19),
        }
    }
}

impl core::fmt::Display for PowerDomain {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            PowerDomain::Mipi2 => "mipi2",
            PowerDomain::BulkSram => "bulk-sram",
            PowerDomain::Frc => "frc",
            PowerDomain::DscUnit => "dsc",
            PowerDomain::Lce => "lce",
        };
        f.write_str(name)
    }
}

/// Dependents-first gating order used when shutting islands down
pub(crate) const SHUTDOWN_ORDER: [PowerDomain; 5] = [
    PowerDomain::Frc,
    PowerDomain::DscUnit,
    PowerDomain::Lce,
    PowerDomain::BulkSram,
    PowerDomain::Mipi2,
];

/// Tracks island enable state and issues gating commands in safe order
///
/// State bits advance only after the transport reports success, so an
/// interrupted sequence leaves the bookkeeping consistent with the last
/// confirmed hardware write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PowerSequencer {
    enabled: u8,
}

impl PowerSequencer {
    /// Create a sequencer with every island off
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an island is currently enabled
    pub fn is_on(&self, domain: PowerDomain) -> bool {
        self.enabled & domain.mask() != 0
    }

    /// Current island state as a mask
    pub fn enabled_mask(&self) -> u8 {
        self.enabled
    }

    /// Gate one island on or off
    ///
    /// Enabling an island whose dependency is off enables the dependency
    /// first. Disabling an island another enabled island depends on is
    /// refused with [`Error::SequenceViolation`] — disable the dependent
    /// first. Redundant requests dispatch nothing.
    pub fn set_domain<T: Transport, D: DelayNs>(
        &mut self,
        domain: PowerDomain,
        on: bool,
        subsystem: u8,
        index: &CommandIndex,
        transport: &mut T,
        delay: &mut D,
    ) -> Result<(), Error<T>> {
        if self.is_on(domain) == on {
            return Ok(());
        }
        if on {
            if let Some(dependency) = domain.depends_on() {
                if !self.is_on(dependency) {
                    self.set_domain(dependency, true, subsystem, index, transport, delay)?;
                }
            }
        } else {
            for dependent in PowerDomain::ALL {
                if dependent.depends_on() == Some(domain) && self.is_on(dependent) {
                    log::warn!("refusing to gate {domain} off while {dependent} is enabled");
                    return Err(Error::SequenceViolation { domain, dependent });
                }
            }
        }

        let (option_on, option_off) = domain.gate_options();
        let option = if on { option_on } else { option_off };
        index.dispatch(subsystem, option, transport, delay)?;
        if on {
            self.enabled |= domain.mask();
        } else {
            self.enabled &= !domain.mask();
        }
        log::debug!("island {domain} {}", if on { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Gate every enabled island down, dependents first
    ///
    /// Used on analog-bypass entry and host-side suspend.
    pub fn shutdown_islands<T: Transport, D: DelayNs>(
        &mut self,
        subsystem: u8,
        index: &CommandIndex,
        transport: &mut T,
        delay: &mut D,
    ) -> Result<(), Error<T>> {
        for domain in SHUTDOWN_ORDER {
            if self.is_on(domain) {
                self.set_domain(domain, false, subsystem, index, transport, delay)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{LastFlagPolicy, Packet, PacketEncoder};
    use alloc::vec::Vec;

    #[derive(Debug)]
    struct MockError;

    #[derive(Debug, Default)]
    struct MockTransport {
        writes: usize,
    }

    impl Transport for MockTransport {
        type Error = MockError;

        fn write(&mut self, _packets: &[Packet]) -> Result<(), Self::Error> {
            self.writes += 1;
            Ok(())
        }

        fn read(&mut self, _packet: &Packet, _value_len: usize) -> Result<Vec<u8>, Self::Error> {
            Err(MockError)
        }
    }

    struct MockDelay;
    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    const POWER_SUBSYSTEM: u8 = 0x03;

    fn gating_index() -> CommandIndex {
        let mut blob = Vec::new();
        for domain in PowerDomain::ALL {
            let (on, off) = domain.gate_options();
            for option in [on, off] {
                blob.extend([0x05, 1, 0, POWER_SUBSYSTEM, option, 0, 0, 1, option]);
            }
        }
        let encoder = PacketEncoder::new(120, LastFlagPolicy::FinalOnly, 0x0400_0000).unwrap();
        CommandIndex::build(&blob, &encoder).unwrap()
    }

    #[test]
    fn test_enable_dispatches_once() {
        let index = gating_index();
        let mut transport = MockTransport::default();
        let mut seq = PowerSequencer::new();

        seq.set_domain(
            PowerDomain::BulkSram,
            true,
            POWER_SUBSYSTEM,
            &index,
            &mut transport,
            &mut MockDelay,
        )
        .unwrap();
        assert!(seq.is_on(PowerDomain::BulkSram));
        assert_eq!(transport.writes, 1);
    }

    #[test]
    fn test_redundant_enable_is_idempotent() {
        let index = gating_index();
        let mut transport = MockTransport::default();
        let mut seq = PowerSequencer::new();

        for _ in 0..2 {
            seq.set_domain(
                PowerDomain::BulkSram,
                true,
                POWER_SUBSYSTEM,
                &index,
                &mut transport,
                &mut MockDelay,
            )
            .unwrap();
        }
        assert_eq!(transport.writes, 1);
    }

    #[test]
    fn test_enabling_frc_pulls_in_bulk_sram() {
        let index = gating_index();
        let mut transport = MockTransport::default();
        let mut seq = PowerSequencer::new();

        seq.set_domain(
            PowerDomain::Frc,
            true,
            POWER_SUBSYSTEM,
            &index,
            &mut transport,
            &mut MockDelay,
        )
        .unwrap();
        assert!(seq.is_on(PowerDomain::BulkSram));
        assert!(seq.is_on(PowerDomain::Frc));
        assert_eq!(transport.writes, 2);
    }

    #[test]
    fn test_disabling_dependency_is_refused() {
        let index = gating_index();
        let mut transport = MockTransport::default();
        let mut seq = PowerSequencer::new();

        seq.set_domain(
            PowerDomain::Frc,
            true,
            POWER_SUBSYSTEM,
            &index,
            &mut transport,
            &mut MockDelay,
        )
        .unwrap();
        let writes_before = transport.writes;

        let result = seq.set_domain(
            PowerDomain::BulkSram,
            false,
            POWER_SUBSYSTEM,
            &index,
            &mut transport,
            &mut MockDelay,
        );
        assert!(matches!(
            result,
            Err(Error::SequenceViolation {
                domain: PowerDomain::BulkSram,
                dependent: PowerDomain::Frc
            })
        ));
        // refused without dispatching, state unchanged
        assert_eq!(transport.writes, writes_before);
        assert!(seq.is_on(PowerDomain::BulkSram));
    }

    #[test]
    fn test_state_not_updated_on_transport_failure() {
        #[derive(Debug, Default)]
        struct FailingTransport;
        impl Transport for FailingTransport {
            type Error = MockError;
            fn write(&mut self, _packets: &[Packet]) -> Result<(), Self::Error> {
                Err(MockError)
            }
            fn read(
                &mut self,
                _packet: &Packet,
                _value_len: usize,
            ) -> Result<Vec<u8>, Self::Error> {
                Err(MockError)
            }
        }

        let index = gating_index();
        let mut transport = FailingTransport;
        let mut seq = PowerSequencer::new();

        let result = seq.set_domain(
            PowerDomain::BulkSram,
            true,
            POWER_SUBSYSTEM,
            &index,
            &mut transport,
            &mut MockDelay,
        );
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(!seq.is_on(PowerDomain::BulkSram));
    }

    #[test]
    fn test_shutdown_islands_clears_everything_in_order() {
        let index = gating_index();
        let mut transport = MockTransport::default();
        let mut seq = PowerSequencer::new();

        for domain in [PowerDomain::Frc, PowerDomain::DscUnit, PowerDomain::Lce] {
            seq.set_domain(
                domain,
                true,
                POWER_SUBSYSTEM,
                &index,
                &mut transport,
                &mut MockDelay,
            )
            .unwrap();
        }
        assert_eq!(seq.enabled_mask().count_ones(), 5);

        seq.shutdown_islands(POWER_SUBSYSTEM, &index, &mut transport, &mut MockDelay)
            .unwrap();
        assert_eq!(seq.enabled_mask(), 0);
    }
}
