//! Chip instance and the display-pipeline mode state machine
//!
//! [`Iris`] owns everything belonging to one physical chip: the transport,
//! the delay source, the configuration, the compiled command index, the
//! power sequencer, and the mode state. Multiple chips are multiple
//! `Iris` values; nothing in this crate is process-global.
//!
//! The exclusive `&mut self` borrow is the coarse-grained transition lock:
//! the embedding environment serializes callers, and the frame-kickoff
//! path contends for the same exclusivity before touching the pending
//! mode.
//!
//! ## Mode graph
//!
//! ```text
//!   PassThrough <-> ReducedFrameBuffer <-> FrameRateConversion
//!        |  \______        |
//!        |         \       v
//!        +--------- AnalogBypass   (exit always lands on PassThrough)
//! ```
//!
//! Frame-rate conversion and analog bypass are never adjacent; callers
//! route through RFB/PT. Failed transitions fall back to pass-through,
//! sacrificing enhanced processing but preserving a visible image.

use embedded_hal::delay::DelayNs;

use crate::config::Config;
use crate::error::{Error, IndexError, ParseError};
use crate::index::CommandIndex;
use crate::packet::decode_read_response;
use crate::power::{PowerDomain, PowerSequencer, SHUTDOWN_ORDER};
use crate::transport::Transport;

type ChipResult<T> = core::result::Result<(), Error<T>>;

/// Display-pipeline operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Direct pass-through, chip processing disabled
    PassThrough,
    /// Reduced-frame-buffer compositing
    ReducedFrameBuffer,
    /// Motion-compensated frame-rate conversion
    FrameRateConversion,
    /// Analog bypass, chip electrically transparent
    AnalogBypass,
}

impl Mode {
    /// Every mode, in declaration order
    pub const ALL: [Mode; 4] = [
        Mode::PassThrough,
        Mode::ReducedFrameBuffer,
        Mode::FrameRateConversion,
        Mode::AnalogBypass,
    ];

    /// Whether `self -> target` is an edge of the transition graph
    ///
    /// The identity pair is not an edge; [`Iris::execute`] treats it as a
    /// no-op before consulting the graph.
    pub fn can_transition_to(self, target: Mode) -> bool {
        matches!(
            (self, target),
            (Mode::PassThrough, Mode::ReducedFrameBuffer)
                | (Mode::ReducedFrameBuffer, Mode::PassThrough)
                | (Mode::ReducedFrameBuffer, Mode::FrameRateConversion)
                | (Mode::FrameRateConversion, Mode::ReducedFrameBuffer)
                | (Mode::PassThrough, Mode::AnalogBypass)
                | (Mode::ReducedFrameBuffer, Mode::AnalogBypass)
                | (Mode::AnalogBypass, Mode::PassThrough)
        )
    }

    /// Power islands this mode requires enabled
    fn required_domains(self) -> &'static [PowerDomain] {
        match self {
            Mode::PassThrough => &[PowerDomain::Mipi2],
            Mode::ReducedFrameBuffer => &[PowerDomain::Mipi2, PowerDomain::BulkSram],
            Mode::FrameRateConversion => &[
                PowerDomain::Mipi2,
                PowerDomain::BulkSram,
                PowerDomain::Frc,
            ],
            Mode::AnalogBypass => &[],
        }
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Mode::PassThrough => "pass-through",
            Mode::ReducedFrameBuffer => "rfb",
            Mode::FrameRateConversion => "frc",
            Mode::AnalogBypass => "analog-bypass",
        };
        f.write_str(name)
    }
}

/// One Iris display co-processor instance
///
/// Owns the per-chip state for the chip's operational lifetime. The
/// command index is read-only after build (safe to share for lookups);
/// mode and power state mutate only through `&mut self`.
pub struct Iris<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// Bus to the chip
    transport: T,
    /// Injectable sleep source for waits and polling
    delay: D,
    /// Board-specific ids, limits, and timings
    config: Config,
    /// Compiled command tables
    index: CommandIndex,
    /// Power-island state
    power: PowerSequencer,
    /// Committed operating mode
    current_mode: Mode,
    /// Deferred target, applied at the next frame kickoff
    pending_mode: Option<Mode>,
    /// Whether the one-time bring-up sequence has run
    bootstrapped: bool,
}

impl<T, D> Iris<T, D>
where
    T: Transport,
    D: DelayNs,
{
    /// Create a chip instance
    ///
    /// `initial_mode` states the mode the chip is in when the driver
    /// attaches; hardware straps bring the chip up in analog bypass, so
    /// that is the usual starting point.
    pub fn new(
        transport: T,
        delay: D,
        config: Config,
        index: CommandIndex,
        initial_mode: Mode,
    ) -> Self {
        Self {
            transport,
            delay,
            config,
            index,
            power: PowerSequencer::new(),
            current_mode: initial_mode,
            pending_mode: None,
            bootstrapped: false,
        }
    }

    /// Committed operating mode
    pub fn current_mode(&self) -> Mode {
        self.current_mode
    }

    /// Deferred target awaiting the next frame kickoff, if any
    pub fn pending_mode(&self) -> Option<Mode> {
        self.pending_mode
    }

    /// Whether the one-time bring-up sequence has run
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Access the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Access the compiled command index
    pub fn index(&self) -> &CommandIndex {
        &self.index
    }

    /// Whether a power island is currently enabled
    pub fn domain_is_on(&self, domain: PowerDomain) -> bool {
        self.power.is_on(domain)
    }

    /// Gate one power island on or off
    ///
    /// See [`PowerSequencer::set_domain`] for the dependency contract.
    pub fn set_domain(&mut self, domain: PowerDomain, on: bool) -> ChipResult<T> {
        self.power.set_domain(
            domain,
            on,
            self.config.power_subsystem,
            &self.index,
            &mut self.transport,
            &mut self.delay,
        )
    }

    /// Dispatch an arbitrary (subsystem, option) command group
    ///
    /// The escape hatch for feature options outside the mode graph, e.g.
    /// color-management variants.
    pub fn apply_option(&mut self, subsystem: u8, option: u8) -> ChipResult<T> {
        self.index
            .dispatch(subsystem, option, &mut self.transport, &mut self.delay)
    }

    /// Load or replace the LUT table from a calibration-firmware blob
    pub fn load_lut_table(&mut self, blob: &[u8]) -> Result<(), ParseError> {
        self.index.load_lut_table(blob, &self.config.encoder)
    }

    /// Re-target one built descriptor's embedded base address
    ///
    /// See [`CommandIndex::patch_address`].
    pub fn patch_address(
        &mut self,
        subsystem: u8,
        option: u8,
        descriptor: usize,
        new_base: u32,
    ) -> Result<(), IndexError> {
        self.index
            .patch_address(subsystem, option, descriptor, new_base)
    }

    /// Read the chip revision byte
    pub fn chip_revision(&mut self) -> Result<u8, Error<T>> {
        let packet = self.config.encoder.encode_read(self.config.revision_address)?;
        let reply = self
            .transport
            .read(&packet, 1)
            .map_err(Error::Transport)?;
        let value = decode_read_response(&reply, 1).map_err(|_| Error::HardwareNotReady)?;
        value.first().copied().ok_or(Error::HardwareNotReady)
    }

    /// Request a mode transition
    ///
    /// With `deferred` the target is stored and applied at the next
    /// [`on_frame_kickoff`](Self::on_frame_kickoff); a later deferred
    /// request overwrites an unapplied one (last write wins). Otherwise
    /// the transition executes synchronously.
    pub fn request_transition(&mut self, target: Mode, deferred: bool) -> ChipResult<T> {
        if deferred {
            log::debug!("deferring transition to {target} until next kickoff");
            self.pending_mode = Some(target);
            return Ok(());
        }
        self.execute(target)
    }

    /// Frame-kickoff hook
    ///
    /// Invoked by the video-pipeline driver once per frame; applies and
    /// clears the pending mode if one is set.
    pub fn on_frame_kickoff(&mut self) -> ChipResult<T> {
        match self.pending_mode.take() {
            Some(target) => self.execute(target),
            None => Ok(()),
        }
    }

    /// Execute a mode transition synchronously
    ///
    /// On success the target mode is committed. On failure the chip is
    /// never left in an undefined intermediate: an unacknowledged bypass
    /// entry reports [`Error::Timeout`] with the current mode unchanged,
    /// and every other mid-sequence failure forces a best-effort fallback
    /// to pass-through before surfacing the original error.
    pub fn execute(&mut self, target: Mode) -> ChipResult<T> {
        if target == self.current_mode {
            return Ok(());
        }
        let from = self.current_mode;
        if !from.can_transition_to(target) {
            return Err(Error::IllegalTransition { from, to: target });
        }
        log::debug!("mode transition {from} -> {target}");

        let result = match (from, target) {
            (_, Mode::AnalogBypass) => self.enter_bypass(),
            (Mode::AnalogBypass, _) => self.exit_bypass(),
            _ => self.switch_pipeline(target),
        };
        match result {
            Ok(()) => {
                log::debug!("mode {target} committed");
                Ok(())
            }
            Err(Error::Timeout) if target == Mode::AnalogBypass => {
                log::warn!("bypass entry not acknowledged, staying in {from}");
                Err(Error::Timeout)
            }
            Err(err) => {
                log::warn!("transition {from} -> {target} failed, forcing pass-through");
                self.force_passthrough();
                Err(err)
            }
        }
    }

    /// Enter analog bypass: command the mux over, wait for the chip to
    /// confirm, then gate every island down
    fn enter_bypass(&mut self) -> ChipResult<T> {
        self.index.dispatch(
            self.config.bypass_subsystem,
            self.config.abyp_enter_option,
            &mut self.transport,
            &mut self.delay,
        )?;
        self.poll_ready()?;
        self.power.shutdown_islands(
            self.config.power_subsystem,
            &self.index,
            &mut self.transport,
            &mut self.delay,
        )?;
        self.current_mode = Mode::AnalogBypass;
        Ok(())
    }

    /// Exit analog bypass into pass-through
    ///
    /// Power first, then the link toggle, then the exit command group;
    /// the mode commits only after the chip confirms readiness. The
    /// one-time bring-up runs after the first confirmed exit.
    fn exit_bypass(&mut self) -> ChipResult<T> {
        for domain in [PowerDomain::Mipi2, PowerDomain::BulkSram] {
            self.power.set_domain(
                domain,
                true,
                self.config.power_subsystem,
                &self.index,
                &mut self.transport,
                &mut self.delay,
            )?;
        }

        self.delay.delay_us(self.config.link_down_wait_us);
        self.index.dispatch(
            self.config.bypass_subsystem,
            self.config.link_reset_option,
            &mut self.transport,
            &mut self.delay,
        )?;
        self.delay.delay_us(self.config.link_up_wait_us);

        self.index.dispatch(
            self.config.bypass_subsystem,
            self.config.abyp_exit_option,
            &mut self.transport,
            &mut self.delay,
        )?;
        self.poll_ready()?;

        if !self.bootstrapped {
            for &(subsystem, option) in &self.config.bootstrap_sequence {
                self.index
                    .dispatch(subsystem, option, &mut self.transport, &mut self.delay)?;
            }
            self.bootstrapped = true;
        }
        self.current_mode = Mode::PassThrough;
        Ok(())
    }

    /// Register-driven pipeline re-route between PT, RFB, and FRC
    ///
    /// No readiness polling: routing writes complete with the next
    /// processed frame rather than an asynchronous acknowledgment.
    fn switch_pipeline(&mut self, target: Mode) -> ChipResult<T> {
        let required = target.required_domains();
        for &domain in required {
            self.power.set_domain(
                domain,
                true,
                self.config.power_subsystem,
                &self.index,
                &mut self.transport,
                &mut self.delay,
            )?;
        }
        for domain in SHUTDOWN_ORDER {
            if self.power.is_on(domain) && !required.contains(&domain) {
                self.power.set_domain(
                    domain,
                    false,
                    self.config.power_subsystem,
                    &self.index,
                    &mut self.transport,
                    &mut self.delay,
                )?;
            }
        }

        let option = match target {
            Mode::PassThrough => self.config.pt_option,
            Mode::ReducedFrameBuffer => self.config.rfb_option,
            Mode::FrameRateConversion => self.config.frc_option,
            Mode::AnalogBypass => {
                return Err(Error::IllegalTransition {
                    from: self.current_mode,
                    to: target,
                });
            }
        };
        self.index.dispatch(
            self.config.pipeline_subsystem,
            option,
            &mut self.transport,
            &mut self.delay,
        )?;
        self.current_mode = target;
        Ok(())
    }

    /// Best-effort recovery: route pass-through, gate extras down, commit
    ///
    /// Secondary failures are ignored; the committed mode becomes
    /// pass-through regardless so the subsystem stays in a known state.
    fn force_passthrough(&mut self) {
        self.pending_mode = None;
        let _ = self.index.dispatch(
            self.config.pipeline_subsystem,
            self.config.pt_option,
            &mut self.transport,
            &mut self.delay,
        );
        for domain in SHUTDOWN_ORDER {
            if domain != PowerDomain::Mipi2 && self.power.is_on(domain) {
                let _ = self.power.set_domain(
                    domain,
                    false,
                    self.config.power_subsystem,
                    &self.index,
                    &mut self.transport,
                    &mut self.delay,
                );
            }
        }
        let _ = self.power.set_domain(
            PowerDomain::Mipi2,
            true,
            self.config.power_subsystem,
            &self.index,
            &mut self.transport,
            &mut self.delay,
        );
        self.current_mode = Mode::PassThrough;
    }

    /// Poll the readiness status register within the bounded retry budget
    fn poll_ready(&mut self) -> ChipResult<T> {
        let packet = self.config.encoder.encode_read(self.config.status_address)?;
        for _ in 0..self.config.ready_retries {
            let reply = self
                .transport
                .read(&packet, 1)
                .map_err(Error::Transport)?;
            let status = decode_read_response(&reply, 1)
                .map_err(|_| Error::HardwareNotReady)?
                .first()
                .copied()
                .ok_or(Error::HardwareNotReady)?;
            if status & self.config.ready_mask == self.config.ready_value {
                return Ok(());
            }
            self.delay.delay_us(self.config.ready_poll_interval_us);
        }
        Err(Error::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Builder;
    use crate::packet::Packet;
    use alloc::collections::VecDeque;
    use alloc::vec;
    use alloc::vec::Vec;

    #[derive(Debug)]
    struct MockError;

    #[derive(Debug, Default)]
    struct MockTransport {
        /// payload of every packet written, in dispatch order
        frames: Vec<Vec<u8>>,
        write_calls: usize,
        read_calls: usize,
        /// fail every write call at or past this count
        fail_writes_at: Option<usize>,
        /// scripted read replies, then `default_reply`
        replies: VecDeque<Vec<u8>>,
        default_reply: Vec<u8>,
    }

    impl MockTransport {
        fn ready() -> Self {
            Self {
                // short form: status header + ready status byte
                default_reply: vec![0x00, 0x01],
                ..Self::default()
            }
        }

        fn dispatched(&self, subsystem: u8, option: u8) -> usize {
            self.frames
                .iter()
                .filter(|frame| frame.as_slice() == [subsystem, option].as_slice())
                .count()
        }
    }

    impl Transport for MockTransport {
        type Error = MockError;

        fn write(&mut self, packets: &[Packet]) -> Result<(), Self::Error> {
            if let Some(at) = self.fail_writes_at {
                if self.write_calls >= at {
                    return Err(MockError);
                }
            }
            self.write_calls += 1;
            for packet in packets {
                self.frames.push(packet.payload.clone());
            }
            Ok(())
        }

        fn read(&mut self, _packet: &Packet, _value_len: usize) -> Result<Vec<u8>, Self::Error> {
            self.read_calls += 1;
            Ok(self
                .replies
                .pop_front()
                .unwrap_or_else(|| self.default_reply.clone()))
        }
    }

    struct MockDelay;
    impl DelayNs for MockDelay {
        fn delay_ns(&mut self, _ns: u32) {}
    }

    const BOOTSTRAP: (u8, u8) = (0x05, 0x30);

    /// Every (subsystem, option) pair the state machine can dispatch, as
    /// 2-byte short-write-param records carrying [subsystem, option]
    fn test_blob() -> Vec<u8> {
        let mut pairs: Vec<(u8, u8)> = Vec::new();
        for domain in PowerDomain::ALL {
            let (on, off) = domain.gate_options();
            pairs.push((0x03, on));
            pairs.push((0x03, off));
        }
        for option in [0x00, 0x01, 0x02] {
            pairs.push((0x02, option)); // pipeline routing
            pairs.push((0x04, option)); // bypass enter/exit/link-reset
        }
        pairs.push(BOOTSTRAP);

        let mut blob = Vec::new();
        for (subsystem, option) in pairs {
            blob.extend([0x15, 1, 0, subsystem, option, 0, 0, 2, subsystem, option]);
        }
        blob
    }

    fn test_chip(initial: Mode, transport: MockTransport) -> Iris<MockTransport, MockDelay> {
        let config = Builder::new()
            .bootstrap_sequence(vec![BOOTSTRAP])
            .build()
            .unwrap();
        let index = CommandIndex::build(&test_blob(), &config.encoder).unwrap();
        Iris::new(transport, MockDelay, config, index, initial)
    }

    #[test]
    fn test_same_mode_is_a_no_op() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.execute(Mode::PassThrough).unwrap();
        assert_eq!(chip.transport.write_calls, 0);
        assert_eq!(chip.current_mode(), Mode::PassThrough);
    }

    #[test]
    fn test_every_non_edge_is_refused_without_side_effects() {
        for from in Mode::ALL {
            for to in Mode::ALL {
                if from == to || from.can_transition_to(to) {
                    continue;
                }
                let mut chip = test_chip(from, MockTransport::ready());
                let result = chip.execute(to);
                assert!(
                    matches!(result, Err(Error::IllegalTransition { .. })),
                    "{from} -> {to} must be refused"
                );
                assert_eq!(chip.current_mode(), from);
                assert_eq!(chip.transport.write_calls, 0);
            }
        }
    }

    #[test]
    fn test_frc_and_bypass_are_not_adjacent() {
        assert!(!Mode::FrameRateConversion.can_transition_to(Mode::AnalogBypass));
        assert!(!Mode::AnalogBypass.can_transition_to(Mode::FrameRateConversion));
    }

    #[test]
    fn test_pt_to_rfb_routes_and_powers() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.execute(Mode::ReducedFrameBuffer).unwrap();

        assert_eq!(chip.current_mode(), Mode::ReducedFrameBuffer);
        assert!(chip.domain_is_on(PowerDomain::Mipi2));
        assert!(chip.domain_is_on(PowerDomain::BulkSram));
        assert_eq!(chip.transport.dispatched(0x02, 0x01), 1);
        // routing writes are fire-and-forget
        assert_eq!(chip.transport.read_calls, 0);
    }

    #[test]
    fn test_rfb_to_frc_enables_frc_island() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.execute(Mode::ReducedFrameBuffer).unwrap();
        chip.execute(Mode::FrameRateConversion).unwrap();

        assert_eq!(chip.current_mode(), Mode::FrameRateConversion);
        assert!(chip.domain_is_on(PowerDomain::Frc));
        assert_eq!(chip.transport.dispatched(0x02, 0x02), 1);
    }

    #[test]
    fn test_frc_back_to_rfb_gates_frc_down() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.execute(Mode::ReducedFrameBuffer).unwrap();
        chip.execute(Mode::FrameRateConversion).unwrap();
        chip.execute(Mode::ReducedFrameBuffer).unwrap();

        assert!(!chip.domain_is_on(PowerDomain::Frc));
        assert!(chip.domain_is_on(PowerDomain::BulkSram));
        assert_eq!(chip.current_mode(), Mode::ReducedFrameBuffer);
    }

    #[test]
    fn test_enter_bypass_polls_then_gates_everything_down() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.execute(Mode::ReducedFrameBuffer).unwrap();
        chip.execute(Mode::AnalogBypass).unwrap();

        assert_eq!(chip.current_mode(), Mode::AnalogBypass);
        assert!(chip.transport.read_calls >= 1);
        assert_eq!(chip.transport.dispatched(0x04, 0x00), 1);
        assert_eq!(chip.power.enabled_mask(), 0);
    }

    #[test]
    fn test_enter_bypass_timeout_leaves_mode_unchanged() {
        let mut transport = MockTransport::default();
        // never ready
        transport.default_reply = vec![0x00, 0x00];
        let mut chip = test_chip(Mode::PassThrough, transport);

        let result = chip.execute(Mode::AnalogBypass);
        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(chip.current_mode(), Mode::PassThrough);
        // bounded retries, one read per attempt
        assert_eq!(chip.transport.read_calls, 10);
    }

    #[test]
    fn test_exit_bypass_runs_link_toggle_exit_and_bootstrap() {
        let mut chip = test_chip(Mode::AnalogBypass, MockTransport::ready());
        chip.execute(Mode::PassThrough).unwrap();

        assert_eq!(chip.current_mode(), Mode::PassThrough);
        assert!(chip.is_bootstrapped());
        assert!(chip.domain_is_on(PowerDomain::Mipi2));
        assert!(chip.domain_is_on(PowerDomain::BulkSram));
        assert_eq!(chip.transport.dispatched(0x04, 0x02), 1); // link reset
        assert_eq!(chip.transport.dispatched(0x04, 0x01), 1); // exit group
        assert_eq!(chip.transport.dispatched(BOOTSTRAP.0, BOOTSTRAP.1), 1);
    }

    #[test]
    fn test_bootstrap_runs_only_once() {
        let mut chip = test_chip(Mode::AnalogBypass, MockTransport::ready());
        chip.execute(Mode::PassThrough).unwrap();
        chip.execute(Mode::AnalogBypass).unwrap();
        chip.execute(Mode::PassThrough).unwrap();

        assert_eq!(chip.transport.dispatched(BOOTSTRAP.0, BOOTSTRAP.1), 1);
    }

    #[test]
    fn test_exit_bypass_transport_failure_falls_back_to_passthrough() {
        let mut transport = MockTransport::ready();
        // power-up writes succeed, the link-reset dispatch fails
        transport.fail_writes_at = Some(2);
        let mut chip = test_chip(Mode::AnalogBypass, transport);

        let result = chip.execute(Mode::PassThrough);
        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(chip.current_mode(), Mode::PassThrough);
        assert!(chip.pending_mode().is_none());
    }

    #[test]
    fn test_malformed_readiness_reply_reports_hardware_not_ready() {
        let mut transport = MockTransport::default();
        transport.default_reply = vec![0x00, 0x01, 0x02, 0x03, 0x04, 0x05];
        let mut chip = test_chip(Mode::PassThrough, transport);

        let result = chip.execute(Mode::AnalogBypass);
        assert!(matches!(result, Err(Error::HardwareNotReady)));
        assert_eq!(chip.current_mode(), Mode::PassThrough);
    }

    #[test]
    fn test_deferred_request_is_applied_on_kickoff() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.request_transition(Mode::ReducedFrameBuffer, true).unwrap();

        assert_eq!(chip.current_mode(), Mode::PassThrough);
        assert_eq!(chip.pending_mode(), Some(Mode::ReducedFrameBuffer));
        assert_eq!(chip.transport.write_calls, 0);

        chip.on_frame_kickoff().unwrap();
        assert_eq!(chip.current_mode(), Mode::ReducedFrameBuffer);
        assert_eq!(chip.pending_mode(), None);
    }

    #[test]
    fn test_last_deferred_request_wins() {
        let mut chip = test_chip(Mode::ReducedFrameBuffer, MockTransport::ready());
        chip.request_transition(Mode::PassThrough, true).unwrap();
        chip.request_transition(Mode::FrameRateConversion, true).unwrap();

        chip.on_frame_kickoff().unwrap();
        assert_eq!(chip.current_mode(), Mode::FrameRateConversion);
        // the overwritten pass-through request never routed
        assert_eq!(chip.transport.dispatched(0x02, 0x00), 0);
        assert_eq!(chip.transport.dispatched(0x02, 0x02), 1);
    }

    #[test]
    fn test_kickoff_without_pending_is_quiet() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.on_frame_kickoff().unwrap();
        assert_eq!(chip.transport.write_calls, 0);
    }

    #[test]
    fn test_immediate_request_executes_synchronously() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.request_transition(Mode::ReducedFrameBuffer, false).unwrap();
        assert_eq!(chip.current_mode(), Mode::ReducedFrameBuffer);
        assert_eq!(chip.pending_mode(), None);
    }

    #[test]
    fn test_chip_revision_reads_value() {
        let mut transport = MockTransport::ready();
        transport.replies.push_back(vec![0x00, 0x42]);
        let mut chip = test_chip(Mode::AnalogBypass, transport);
        assert_eq!(chip.chip_revision().unwrap(), 0x42);
    }

    #[test]
    fn test_apply_option_dispatches_lookup_entry() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        chip.apply_option(0x05, 0x30).unwrap();
        assert_eq!(chip.transport.dispatched(0x05, 0x30), 1);
    }

    #[test]
    fn test_apply_option_missing_entry_is_fatal() {
        let mut chip = test_chip(Mode::PassThrough, MockTransport::ready());
        let result = chip.apply_option(0x7E, 0x7E);
        assert!(matches!(
            result,
            Err(Error::MissingOption {
                subsystem: 0x7E,
                option: 0x7E
            })
        ));
    }
}
