//! The serial link watchdog: heartbeat, echo, fault reports and break recovery.
//!
//! Break recovery runs as a linear state machine re-entered by the timer
//! service at each suspension point:
//!
//! ```text
//! Idle -> BreakDetected -> Disabling --settle--> PinAsserted -> Recovering
//!      --hold--> Re-enabling -> Idle
//! ```
//!
//! Other events keep being dispatched between those steps. In particular an
//! activity pulse can arrive during the hold window and race step 7 for
//! `break_pending`; [`LinkState`] resolves that with a single test-and-clear.

use crate::config::WatchdogConfig;
use crate::dispatch::{Context, Dispatcher};
use crate::event::{Edge, EventKind, LinkEvent};
use crate::link::{ControlPin, Level, LinkState, RecoveryPhase, SerialLink};
use crate::message::Message;
use crate::stats::{LinkStats, StatsSnapshot};
use crate::timer::{Wake, WakeHandler};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct Watchdog<L, P> {
    config: WatchdogConfig,
    state: LinkState,
    link: Mutex<L>,
    pin: Mutex<P>,
    deferred: Mutex<Vec<Message>>,
    stats: LinkStats,
}

impl<L, P> Watchdog<L, P>
where
    L: SerialLink + 'static,
    P: ControlPin + 'static,
{
    pub fn new(config: WatchdogConfig, link: L, pin: P) -> Self {
        Self {
            config,
            state: LinkState::new(),
            link: Mutex::new(link),
            pin: Mutex::new(pin),
            deferred: Mutex::new(Vec::new()),
            stats: LinkStats::new(),
        }
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.config
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Registers one handler per event kind.
    pub fn install(this: &Arc<Self>, dispatcher: &mut Dispatcher) {
        let wd = Arc::clone(this);
        dispatcher.register(EventKind::DataReceived, move |_: &LinkEvent, _: &mut Context<'_>| {
            wd.on_data_received();
        });
        let wd = Arc::clone(this);
        dispatcher.register(EventKind::FramingError, move |_: &LinkEvent, _: &mut Context<'_>| {
            wd.on_framing_error();
        });
        let wd = Arc::clone(this);
        dispatcher.register(EventKind::Overrun, move |_: &LinkEvent, _: &mut Context<'_>| {
            wd.on_overrun();
        });
        let wd = Arc::clone(this);
        dispatcher.register(EventKind::BreakDetected, move |_: &LinkEvent, cx: &mut Context<'_>| {
            wd.on_break(cx);
        });
        let wd = Arc::clone(this);
        dispatcher.register(EventKind::Pulse, move |event: &LinkEvent, _: &mut Context<'_>| {
            if let LinkEvent::Pulse(edge) = event {
                wd.on_pulse(*edge);
            }
        });
    }

    /// Discards stale input and arms the heartbeat.
    pub fn start(&self, cx: &mut Context<'_>) {
        match self.link.lock().read_pending() {
            Ok(stale) if !stale.is_empty() => {
                log::debug!("discarded {} stale bytes at startup", stale.len());
            }
            Ok(_) => {}
            Err(e) => log::warn!("initial drain failed: {e}"),
        }
        cx.schedule_in(0, Wake::Heartbeat);
    }

    pub fn on_data_received(&self) {
        let bytes = match self.link.lock().read_pending() {
            Ok(bytes) => bytes,
            Err(e) => {
                log::warn!("read failed: {e}");
                return;
            }
        };
        if bytes.is_empty() {
            return;
        }
        log::trace!("echo {}", hex::encode(&bytes));
        self.stats.record_echo(bytes.len());
        self.emit(Message::Echo(bytes));
    }

    pub fn on_framing_error(&self) {
        self.stats.record_framing_error();
        self.emit(Message::FramingError);
    }

    pub fn on_overrun(&self) {
        self.stats.record_overrun();
        self.emit(Message::Overrun);
    }

    pub fn on_break(&self, cx: &mut Context<'_>) {
        self.stats.record_break();
        match self.state.begin_episode() {
            Ok(()) => self.enter_break(cx),
            Err(phase) => {
                let depth = self.state.queue_break();
                log::warn!("break during recovery ({phase}), {depth} episode(s) queued");
                self.stats.record_deferred_break();
            }
        }
    }

    pub fn on_pulse(&self, edge: Edge) {
        if edge != Edge::Rising {
            return;
        }
        if self.state.take_break_pending() {
            log::debug!("activity pulse acknowledged break");
            self.stats.record_pulse_acknowledged();
            self.emit(Message::PulseSeen);
        } else {
            self.stats.record_pulse_ignored();
        }
    }

    fn on_heartbeat(&self, cx: &mut Context<'_>) {
        if self.state.is_enabled() {
            self.stats.record_heartbeat();
            self.emit(Message::Heartbeat(cx.now()));
            cx.schedule_in(self.config.heartbeat_interval_ms, Wake::Heartbeat);
        } else {
            cx.schedule_in(self.config.idle_poll_ms, Wake::Heartbeat);
        }
    }

    fn on_recovery_step(&self, cx: &mut Context<'_>) {
        match self.state.phase() {
            RecoveryPhase::Disabling => self.assert_control(cx),
            RecoveryPhase::Recovering => self.finish_recovery(cx),
            phase => log::warn!("recovery wake in unexpected phase {phase}"),
        }
    }

    /// Steps 1 and 2, then suspends for the settle time.
    fn enter_break(&self, cx: &mut Context<'_>) {
        self.state.raise_break_pending();
        self.emit(Message::Break);
        self.advance(RecoveryPhase::Disabling);
        self.set_link_enabled(false);
        cx.schedule_in(self.config.settle_ms, Wake::Recovery);
    }

    /// Steps 4 and 5.
    fn assert_control(&self, cx: &mut Context<'_>) {
        self.drive_control(Level::Low);
        self.advance(RecoveryPhase::PinAsserted);
        self.advance(RecoveryPhase::Recovering);
        cx.schedule_in(self.config.hold_ms, Wake::Recovery);
    }

    /// Steps 6 and 7, then the next queued break if any arrived meanwhile.
    fn finish_recovery(&self, cx: &mut Context<'_>) {
        self.advance(RecoveryPhase::Reenabling);
        self.drive_control(Level::High);
        self.set_link_enabled(true);
        self.emit(Message::BreakDone);
        self.flush_deferred();

        if self.state.take_break_pending() {
            self.stats.record_pulse_missed();
            self.emit(Message::PulseMissed);
        }
        self.stats.record_recovery();
        self.advance(RecoveryPhase::Idle);

        if self.state.take_queued_break() && self.state.begin_episode().is_ok() {
            log::info!("starting queued break recovery");
            self.enter_break(cx);
        }
    }

    fn advance(&self, phase: RecoveryPhase) {
        log::debug!("recovery: {} -> {phase}", self.state.phase());
        self.state.set_phase(phase);
    }

    fn set_link_enabled(&self, enabled: bool) {
        if let Err(e) = self.link.lock().set_enabled(enabled) {
            log::warn!("failed to set link enabled={enabled}: {e}");
        }
        self.state.set_enabled(enabled);
    }

    fn drive_control(&self, level: Level) {
        if let Err(e) = self.pin.lock().set_level(level) {
            log::warn!("failed to drive control pin {level:?}: {e}");
        }
    }

    /// Writes one message under a single link guard. While the link is
    /// disabled the message is held until recovery re-enables it.
    fn emit(&self, message: Message) {
        if !self.state.is_enabled() {
            log::trace!("deferring {message:?} while disabled");
            self.deferred.lock().push(message);
            return;
        }
        let bytes = message.to_bytes();
        let mut link = self.link.lock();
        if let Err(e) = link.write(&bytes) {
            self.stats.record_write_dropped();
            log::debug!("dropped {} byte write: {e}", bytes.len());
        }
    }

    fn flush_deferred(&self) {
        let pending = std::mem::take(&mut *self.deferred.lock());
        for message in pending {
            self.emit(message);
        }
    }
}

impl<L, P> WakeHandler for Watchdog<L, P>
where
    L: SerialLink + 'static,
    P: ControlPin + 'static,
{
    fn on_wake(&self, wake: Wake, cx: &mut Context<'_>) {
        match wake {
            Wake::Heartbeat => self.on_heartbeat(cx),
            Wake::Recovery => self.on_recovery_step(cx),
        }
    }
}

impl<L, P> std::fmt::Debug for Watchdog<L, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watchdog")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
