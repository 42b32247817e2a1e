//! Single logical thread of control for a watchdog.
//!
//! The runtime owns the clock, the timer queue and the dispatcher. Events and
//! timer wakes are handled one at a time, and each handler runs to completion.
//! Timers due at or before an event's arrival fire first.

use crate::clock::{Clock, ManualClock, Millis, SystemClock};
use crate::dispatch::{Context, Dispatcher};
use crate::error::{LinkError, Result};
use crate::event::LinkEvent;
use crate::link::{ControlPin, SerialLink};
use crate::timer::{Timers, WakeHandler};
use crate::watchdog::Watchdog;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use linkwatch_decode::ErrorSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on a single wait. Also bounds how late a stop request is noticed.
const IDLE_WAIT: Duration = Duration::from_millis(100);

pub struct Runtime<C> {
    clock: C,
    timers: Timers,
    dispatcher: Dispatcher,
    wakes: Arc<dyn WakeHandler>,
}

impl<C: Clock> Runtime<C> {
    /// Installs the watchdog's handlers and starts it at the clock's current time.
    pub fn new<L, P>(clock: C, watchdog: &Arc<Watchdog<L, P>>) -> Self
    where
        L: SerialLink + 'static,
        P: ControlPin + 'static,
    {
        let mut dispatcher = Dispatcher::new();
        Watchdog::install(watchdog, &mut dispatcher);

        let mut timers = Timers::new();
        watchdog.start(&mut Context::new(clock.now(), &mut timers));

        let wakes: Arc<dyn WakeHandler> = Arc::clone(watchdog) as Arc<dyn WakeHandler>;
        Self {
            clock,
            timers,
            dispatcher,
            wakes,
        }
    }

    pub fn now(&self) -> Millis {
        self.clock.now()
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn next_deadline(&self) -> Option<Millis> {
        self.timers.next_deadline()
    }

    /// Handles one event at the current time. Returns how many handlers ran.
    pub fn dispatch(&mut self, event: LinkEvent) -> usize {
        let now = self.clock.now();
        self.fire_due(now);
        let mut cx = Context::new(now, &mut self.timers);
        self.dispatcher.dispatch(&event, &mut cx)
    }

    /// Feeds a UART error-source register value through the dispatcher.
    ///
    /// Backends that read an ERRORSRC-style register call this instead of
    /// dispatching each fault by hand. Parity errors have no handler and are
    /// skipped. Returns how many handlers ran in total.
    pub fn report_line_errors(&mut self, src: ErrorSource) -> usize {
        LinkEvent::from_error_source(src)
            .into_iter()
            .map(|event| self.dispatch(event))
            .sum()
    }

    fn fire_due(&mut self, until: Millis) {
        while let Some((at, wake)) = self.timers.pop_due(until) {
            let now = self.clock.now().max(at);
            let mut cx = Context::new(now, &mut self.timers);
            self.wakes.on_wake(wake, &mut cx);
        }
    }
}

impl Runtime<ManualClock> {
    /// Moves virtual time to `at`, firing each wake at its exact deadline.
    pub fn advance_to(&mut self, at: Millis) {
        while let Some((deadline, wake)) = self.timers.pop_due(at) {
            self.clock.set(deadline);
            let mut cx = Context::new(deadline, &mut self.timers);
            self.wakes.on_wake(wake, &mut cx);
        }
        self.clock.set(at);
    }

    pub fn advance_by(&mut self, delay: Millis) {
        let target = self.clock.now().saturating_add(delay);
        self.advance_to(target);
    }

    /// Advances to `at`, then dispatches `event` there.
    pub fn inject_at(&mut self, at: Millis, event: LinkEvent) -> usize {
        self.advance_to(at);
        self.dispatch(event)
    }
}

impl Runtime<SystemClock> {
    /// Services events and timers until `stop` is raised or the event source
    /// hangs up. A raised `stop` returns `Ok(())`.
    pub fn run(&mut self, events: &Receiver<LinkEvent>, stop: &AtomicBool) -> Result<()> {
        loop {
            if stop.load(Ordering::Acquire) {
                log::info!("stop requested");
                return Ok(());
            }

            let now = self.clock.now();
            self.fire_due(now);

            let wait = self
                .timers
                .next_deadline()
                .map(|at| Duration::from_millis(at.saturating_sub(self.clock.now())))
                .map_or(IDLE_WAIT, |wait| wait.min(IDLE_WAIT));

            match events.recv_timeout(wait) {
                Ok(event) => {
                    log::trace!("event {event:?}");
                    self.dispatch(event);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("event source closed");
                    return Err(LinkError::Disconnected);
                }
            }
        }
    }
}

impl<C> std::fmt::Debug for Runtime<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("pending_timers", &self.timers.len())
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatchdogConfig;
    use crate::event::{Edge, EventKind};
    use crate::memory::{MemoryLink, MemoryPin};
    use linkwatch_decode::LineError;
    use parking_lot::Mutex;

    fn runtime() -> (Runtime<ManualClock>, MemoryLink) {
        let clock = ManualClock::new();
        let link = MemoryLink::new(clock.clone());
        let pin = MemoryPin::new(clock.clone());
        let wd = Arc::new(Watchdog::new(WatchdogConfig::default(), link.clone(), pin));
        (Runtime::new(clock, &wd), link)
    }

    #[test]
    fn installs_one_handler_per_kind() {
        let (mut rt, _) = runtime();
        for kind in [
            EventKind::DataReceived,
            EventKind::FramingError,
            EventKind::Overrun,
            EventKind::BreakDetected,
            EventKind::Pulse,
        ] {
            assert_eq!(rt.dispatcher_mut().handler_count(kind), 1);
        }
    }

    #[test]
    fn heartbeat_fires_on_schedule() {
        let (mut rt, link) = runtime();
        rt.advance_to(2500);
        assert_eq!(link.lines(), vec!["0", "1000", "2000"]);
        assert_eq!(rt.now(), 2500);
    }

    #[test]
    fn extra_handlers_see_events_after_watchdog() {
        let (mut rt, link) = runtime();
        let seen = Arc::new(Mutex::new(0usize));
        {
            let seen = Arc::clone(&seen);
            rt.dispatcher_mut().register(
                EventKind::Pulse,
                move |_: &LinkEvent, _: &mut Context<'_>| *seen.lock() += 1,
            );
        }
        assert_eq!(rt.inject_at(10, LinkEvent::Pulse(Edge::Rising)), 2);
        assert_eq!(*seen.lock(), 1);
        assert_eq!(link.lines(), vec!["0"]);
    }

    #[test]
    fn run_returns_when_source_closes() {
        let clock = SystemClock::new();
        let link = MemoryLink::new(ManualClock::new());
        let pin = MemoryPin::new(ManualClock::new());
        let wd = Arc::new(Watchdog::new(WatchdogConfig::default(), link.clone(), pin));
        let mut rt = Runtime::new(clock, &wd);

        let (tx, rx) = crossbeam_channel::unbounded();
        link.feed_rx(b"AB");
        tx.send(LinkEvent::DataReceived).unwrap();
        drop(tx);

        let stop = AtomicBool::new(false);
        assert!(matches!(rt.run(&rx, &stop), Err(LinkError::Disconnected)));
        assert!(link.output_string().contains(">>AB<<\n"));
    }

    #[test]
    fn run_returns_ok_once_stop_is_raised() {
        let link = MemoryLink::new(ManualClock::new());
        let pin = MemoryPin::new(ManualClock::new());
        let wd = Arc::new(Watchdog::new(WatchdogConfig::default(), link.clone(), pin));
        let mut rt = Runtime::new(SystemClock::new(), &wd);

        // sender stays alive, so only the stop flag can end the loop
        let (tx, rx) = crossbeam_channel::unbounded::<LinkEvent>();
        let stop = Arc::new(AtomicBool::new(false));
        let raiser = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(50));
                stop.store(true, Ordering::Release);
            })
        };

        assert!(rt.run(&rx, &stop).is_ok());
        raiser.join().unwrap();
        drop(tx);
        assert!(wd.stats().heartbeats >= 1);
        assert!(!link.output().is_empty());
    }

    #[test]
    fn line_errors_are_dispatched_per_fault() {
        let (mut rt, link) = runtime();
        rt.advance_to(10);
        let src: ErrorSource = [LineError::Overrun, LineError::Parity, LineError::Framing]
            .into_iter()
            .collect();

        assert_eq!(rt.report_line_errors(src), 2);
        assert_eq!(link.lines(), vec!["0", "!!overrun!!", "!!frame!!"]);
    }

    #[test]
    fn break_bit_starts_recovery() {
        let (mut rt, link) = runtime();
        rt.advance_to(10);
        rt.report_line_errors(ErrorSource(LineError::Break.mask()));
        assert_eq!(link.lines(), vec!["0", "!!break!!"]);
        assert!(!link.is_enabled());
    }
}
