//! End-to-end scenarios in virtual time.

use linkwatch_core::{
    Edge, Level, LinkEvent, ManualClock, MemoryLink, MemoryPin, RecoveryPhase, Runtime, Watchdog,
    WatchdogConfig,
};
use std::sync::Arc;

type TestResult = Result<(), Box<dyn std::error::Error>>;

const MISSED: &str = "!!RX hi!! (pins.onPulsed() missed)";

struct Rig {
    rt: Runtime<ManualClock>,
    wd: Arc<Watchdog<MemoryLink, MemoryPin>>,
    link: MemoryLink,
    pin: MemoryPin,
}

fn rig() -> Rig {
    let clock = ManualClock::new();
    let link = MemoryLink::new(clock.clone());
    let pin = MemoryPin::new(clock.clone());
    let wd = Arc::new(Watchdog::new(WatchdogConfig::default(), link.clone(), pin.clone()));
    let rt = Runtime::new(clock, &wd);
    Rig { rt, wd, link, pin }
}

/// Output lines that are not heartbeats.
fn diagnostics(link: &MemoryLink) -> Vec<String> {
    link.lines()
        .into_iter()
        .filter(|l| !l.chars().all(|c| c.is_ascii_digit()))
        .collect()
}

#[test]
fn scenario_a_one_heartbeat_per_interval() {
    let mut r = rig();
    r.rt.advance_to(999);

    let out = r.link.output_string();
    assert_eq!(out, "0\n");
    let lines = r.link.lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].chars().all(|c| c.is_ascii_digit()));

    r.rt.advance_to(1000);
    assert_eq!(r.link.lines(), vec!["0", "1000"]);
}

#[test]
fn scenario_b_echo_is_delimited() {
    let mut r = rig();
    r.rt.advance_to(10);
    r.link.clear_output();

    r.link.feed_rx(&[0x41, 0x42]);
    r.rt.dispatch(LinkEvent::DataReceived);
    assert_eq!(r.link.output_string(), ">>AB<<\n");
    assert_eq!(r.wd.stats().bytes_echoed, 2);
}

#[test]
fn empty_read_produces_no_output() {
    let mut r = rig();
    r.rt.advance_to(10);
    r.link.clear_output();

    r.rt.dispatch(LinkEvent::DataReceived);
    r.rt.dispatch(LinkEvent::DataReceived);
    assert!(r.link.output().is_empty());
}

#[test]
fn scenario_c_pulse_during_hold() {
    let mut r = rig();
    r.rt.inject_at(0, LinkEvent::BreakDetected);
    r.rt.inject_at(2000, LinkEvent::Pulse(Edge::Rising));
    assert!(!r.wd.state().is_break_pending());

    r.rt.advance_to(6000);
    assert_eq!(
        diagnostics(&r.link),
        vec!["!!break!!", "!!break done!!", "!!RX hi!!"]
    );
    assert!(!r.link.output_string().contains(MISSED));
    assert_eq!(r.link.dropped_writes(), 0);

    let stats = r.wd.stats();
    assert_eq!(stats.pulses_acknowledged, 1);
    assert_eq!(stats.pulses_missed, 0);
}

#[test]
fn scenario_d_no_pulse_reports_missed() {
    let mut r = rig();
    r.rt.inject_at(0, LinkEvent::BreakDetected);
    r.rt.advance_to(5001);

    let out = r.link.output_string();
    assert!(out.ends_with("!!break done!!\n!!RX hi!! (pins.onPulsed() missed)\n"));
    assert_eq!(diagnostics(&r.link), vec!["!!break!!", "!!break done!!", MISSED]);
    assert!(!r.wd.state().is_break_pending());
    assert_eq!(r.wd.state().phase(), RecoveryPhase::Idle);
}

#[test]
fn scenario_e_second_break_reenters_after_first() {
    let mut r = rig();
    r.rt.inject_at(0, LinkEvent::BreakDetected);
    r.rt.inject_at(100, LinkEvent::BreakDetected);
    assert_eq!(r.wd.state().queued_breaks(), 1);

    r.rt.advance_to(5001);
    // first episode resolved, second already running
    assert_eq!(r.wd.state().phase(), RecoveryPhase::Disabling);
    assert!(!r.wd.state().is_enabled());

    r.rt.advance_to(10_002);
    assert_eq!(
        diagnostics(&r.link),
        vec![
            "!!break!!",
            "!!break done!!",
            MISSED,
            "!!break!!",
            "!!break done!!",
            MISSED,
        ]
    );
    assert!(r.wd.state().is_enabled());
    assert_eq!(r.wd.state().phase(), RecoveryPhase::Idle);

    let stats = r.wd.stats();
    assert_eq!(stats.breaks, 2);
    assert_eq!(stats.deferred_breaks, 1);
    assert_eq!(stats.recoveries_completed, 2);
}

#[test]
fn each_break_during_recovery_gets_its_own_episode() {
    let mut r = rig();
    for at in [0, 100, 200] {
        r.rt.inject_at(at, LinkEvent::BreakDetected);
    }
    assert_eq!(r.wd.state().queued_breaks(), 2);

    r.rt.advance_to(10_002);
    assert_eq!(r.wd.state().queued_breaks(), 0);
    assert_eq!(r.wd.state().phase(), RecoveryPhase::Disabling);

    r.rt.advance_to(15_003);
    let lines = diagnostics(&r.link);
    assert_eq!(lines.iter().filter(|l| *l == "!!break!!").count(), 3);
    assert_eq!(lines.iter().filter(|l| *l == "!!break done!!").count(), 3);
    assert_eq!(lines.iter().filter(|l| *l == MISSED).count(), 3);
    assert!(r.wd.state().is_enabled());
    assert_eq!(r.wd.state().phase(), RecoveryPhase::Idle);

    let stats = r.wd.stats();
    assert_eq!(stats.breaks, 3);
    assert_eq!(stats.deferred_breaks, 2);
    assert_eq!(stats.recoveries_completed, 3);
}

#[test]
fn recovery_timing_is_settle_plus_hold() {
    let mut r = rig();
    r.rt.inject_at(300, LinkEvent::BreakDetected);

    for t in [300, 301, 2800, 5300] {
        r.rt.advance_to(t);
        assert!(!r.wd.state().is_enabled(), "enabled at {t}");
    }
    r.rt.advance_to(5301);
    assert!(r.wd.state().is_enabled());

    assert_eq!(r.link.enable_log(), vec![(300, false), (5301, true)]);
    assert_eq!(r.pin.levels(), vec![(301, Level::Low), (5301, Level::High)]);
}

#[test]
fn heartbeat_pauses_while_disabled() {
    let mut r = rig();
    r.rt.inject_at(500, LinkEvent::BreakDetected);
    r.rt.advance_to(5600);

    let beats: Vec<u64> = r
        .link
        .lines()
        .iter()
        .filter_map(|l| l.parse().ok())
        .collect();
    // disabled over [500, 5501), resumes on the next idle poll
    assert_eq!(beats, vec![0, 5520]);
}

#[test]
fn pulse_without_break_is_noop() {
    let mut r = rig();
    r.rt.advance_to(10);
    r.link.clear_output();

    r.rt.dispatch(LinkEvent::Pulse(Edge::Rising));
    assert!(r.link.output().is_empty());
    assert!(r.wd.state().is_enabled());
    assert!(!r.wd.state().is_break_pending());
    assert_eq!(r.wd.stats().pulses_ignored, 1);
}

#[test]
fn faults_during_recovery_are_reported_after_reenable() {
    let mut r = rig();
    r.rt.inject_at(0, LinkEvent::BreakDetected);
    r.rt.inject_at(40, LinkEvent::FramingError);
    r.rt.inject_at(50, LinkEvent::Overrun);
    r.rt.advance_to(5001);

    assert_eq!(
        diagnostics(&r.link),
        vec!["!!break!!", "!!break done!!", "!!frame!!", "!!overrun!!", MISSED]
    );
}

#[test]
fn write_failures_are_dropped() -> TestResult {
    let mut r = rig();
    r.link.fail_writes(true);
    r.rt.inject_at(0, LinkEvent::FramingError);
    r.rt.advance_to(2000);
    r.link.fail_writes(false);

    assert!(r.link.output().is_empty());
    let stats = r.wd.stats();
    assert_eq!(stats.framing_errors, 1);
    assert!(stats.writes_dropped >= 2);

    r.rt.advance_to(3000);
    let last = r.link.lines().pop().ok_or("expected a heartbeat")?;
    assert_eq!(last, "3000");
    Ok(())
}

#[test]
fn transcript_records_both_directions() {
    let mut r = rig();
    r.rt.advance_to(10);
    r.link.feed_rx(b"hi");
    r.rt.dispatch(LinkEvent::DataReceived);

    let text = r.link.transcript().to_text(false, false);
    assert_eq!(text, "TX: 0\nRX: hi\nTX: >>hi<<\n");
}
