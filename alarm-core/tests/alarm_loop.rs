mod support;

use alarm_core::alarm::{AlarmLoop, AlarmPhase, StartupError};
use alarm_core::relay::AlarmCommand;
use alarm_core::telemetry::AlarmEventKind;
use alarm_core::tune::{ALARM_TUNE, Note, TuneTable};

use support::{
    FakeModem, RecordingTone, SimClock, SimContext, ToneCall, context, events,
    fast_network_config,
};

type Loop<'a> = AlarmLoop<FakeModem, RecordingTone, &'a SimClock, &'a SimClock, support::Recorder>;

const SHORT: [Note; 2] = [Note::new(880, 857), Note::rest(429)];

fn started(clock: &SimClock, tune: TuneTable) -> Loop<'_> {
    let ctx: SimContext<'_> = context(clock);
    AlarmLoop::start(
        FakeModem::healthy(),
        fast_network_config(),
        tune,
        RecordingTone::default(),
        ctx,
    )
    .expect("startup succeeds")
}

fn publish(alarm: &mut Loop<'_>, payload: &[u8]) {
    alarm.network_mut().modem_mut().publish(payload);
}

#[test]
fn startup_fails_without_wifi() {
    let clock = SimClock::new();
    let mut modem = FakeModem::healthy();
    modem.wifi_available = false;

    let result = AlarmLoop::start(
        modem,
        fast_network_config(),
        ALARM_TUNE,
        RecordingTone::default(),
        context(&clock),
    );
    assert!(matches!(result, Err(StartupError::AssociationFailed)));
}

#[test]
fn startup_fails_without_broker() {
    let clock = SimClock::new();
    let mut modem = FakeModem::healthy();
    modem.failing_opens = 3;

    let result = AlarmLoop::start(
        modem,
        fast_network_config(),
        ALARM_TUNE,
        RecordingTone::default(),
        context(&clock),
    );
    assert!(matches!(result, Err(StartupError::SessionFailed)));
}

#[test]
fn idle_loop_stays_silent_and_never_blocks() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);
    let start = clock.elapsed_ms();

    for _ in 0..10 {
        let report = alarm.run_iteration();
        assert_eq!(report.phase, AlarmPhase::Idle);
        assert_eq!(report.cursor, 0);
    }
    assert_eq!(clock.elapsed_ms(), start);
    assert!(alarm.tone().frequencies().is_empty());
    assert_eq!(alarm.network().modem().poll_calls, 10);
}

#[test]
fn trigger_plays_note_then_rest() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, TuneTable::new(&SHORT));
    let start = clock.elapsed_ms();

    publish(&mut alarm, b"100");
    let first = alarm.run_iteration();
    assert_eq!(first.command, Some(AlarmCommand::Trigger));
    assert_eq!(first.phase, AlarmPhase::Alarming);
    assert_eq!(first.cursor, 1);
    assert_eq!(clock.elapsed_ms() - start, 857 + 50);
    assert_eq!(alarm.tone().frequencies(), vec![880]);
    assert!(alarm.tone().calls.contains(&ToneCall::Duty(512)));

    let second = alarm.run_iteration();
    assert_eq!(second.command, None);
    assert_eq!(second.cursor, 0);
    assert_eq!(clock.elapsed_ms() - start, 857 + 50 + 429 + 50);
    assert_eq!(alarm.tone().frequencies(), vec![880]);
    assert_eq!(alarm.tone().last_duty(), Some(0));
}

#[test]
fn message_mid_tune_waits_for_current_note() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);

    publish(&mut alarm, b"100");
    alarm.run_iteration();
    alarm.run_iteration();
    assert_eq!(alarm.session().cursor(), 2);

    publish(&mut alarm, b"0");
    let before = clock.elapsed_ms();
    let report = alarm.run_iteration();
    assert_eq!(report.command, Some(AlarmCommand::Clear));
    assert_eq!(report.phase, AlarmPhase::Idle);
    assert_eq!(report.cursor, 0);
    assert_eq!(clock.elapsed_ms(), before);
    assert_eq!(alarm.tone().last_duty(), Some(0));

    let log = events(&alarm.context().sink);
    assert!(log.contains(&AlarmEventKind::AlarmTriggered));
    assert!(log.contains(&AlarmEventKind::AlarmCleared));
}

#[test]
fn repeated_trigger_records_one_transition() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);

    publish(&mut alarm, b"100");
    alarm.run_iteration();
    publish(&mut alarm, b"100");
    let report = alarm.run_iteration();
    assert_eq!(report.cursor, 2);

    let triggered = events(&alarm.context().sink)
        .into_iter()
        .filter(|event| *event == AlarmEventKind::AlarmTriggered)
        .count();
    assert_eq!(triggered, 1);
}

#[test]
fn session_loss_keeps_flag_and_cursor_and_reconnects_once() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);
    publish(&mut alarm, b"100");
    alarm.run_iteration();
    alarm.run_iteration();

    let opens = alarm.network().modem().open_calls;
    let notes = alarm.tone().frequencies().len();
    let before = clock.elapsed_ms();
    alarm.network_mut().modem_mut().break_next_poll = true;

    let report = alarm.run_iteration();
    assert!(alarm.session().alarm());
    assert_eq!(report.phase, AlarmPhase::Alarming);
    assert_eq!(report.cursor, 2);
    assert_eq!(alarm.tone().last_duty(), Some(0));
    assert_eq!(alarm.network().modem().open_calls, opens + 1);
    assert_eq!(alarm.tone().frequencies().len(), notes);
    assert_eq!(clock.elapsed_ms(), before);

    let log = events(&alarm.context().sink);
    let lost = log
        .iter()
        .position(|event| *event == AlarmEventKind::SessionLost)
        .expect("session loss recorded");
    assert_eq!(log[lost + 1], AlarmEventKind::SessionAttempt { attempt: 1 });
    assert_eq!(log.last(), Some(&AlarmEventKind::ReconnectSucceeded));

    // The tune carries on from the note after the last one played.
    alarm.run_iteration();
    assert_eq!(alarm.tone().frequencies().last(), Some(&698));
    assert_eq!(alarm.session().cursor(), 3);
}

#[test]
fn failed_reconnect_waits_and_keeps_recovering() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);
    publish(&mut alarm, b"100");
    alarm.run_iteration();

    {
        let modem = alarm.network_mut().modem_mut();
        modem.break_next_poll = true;
        modem.failing_opens = 3;
    }
    let before = clock.elapsed_ms();
    let report = alarm.run_iteration();
    assert_eq!(report.phase, AlarmPhase::Recovering);
    assert!(alarm.session().alarm());
    assert_eq!(report.cursor, 1);
    // Two session retry delays, then the reconnect delay.
    assert_eq!(clock.elapsed_ms() - before, 2 * 500 + 3_000);
    assert_eq!(alarm.tone().last_duty(), Some(0));
    assert!(!alarm.network().state().has_session());

    let notes = alarm.tone().frequencies().len();
    let report = alarm.run_iteration();
    assert_eq!(report.phase, AlarmPhase::Alarming);
    assert_eq!(alarm.tone().frequencies().len(), notes);

    alarm.run_iteration();
    assert_eq!(alarm.tone().frequencies().last(), Some(&784));
    assert_eq!(alarm.session().cursor(), 2);
}

#[test]
fn dropped_wifi_is_rejoined_during_recovery() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);

    {
        let modem = alarm.network_mut().modem_mut();
        modem.linked = false;
        modem.break_next_poll = true;
    }
    let report = alarm.run_iteration();
    assert_eq!(report.phase, AlarmPhase::Idle);
    assert_eq!(alarm.network().modem().connect_calls, 2);

    let log = events(&alarm.context().sink);
    assert!(log.contains(&AlarmEventKind::AssociationLost));
    assert_eq!(log.last(), Some(&AlarmEventKind::ReconnectSucceeded));
}

#[test]
fn unrecognised_payloads_clear_the_alarm() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);

    for payload in [&b"100"[..], b"99", b"100", b"", b"100", b"timer"] {
        publish(&mut alarm, payload);
        let report = alarm.run_iteration();
        let expected = payload == b"100";
        assert_eq!(alarm.session().alarm(), expected, "payload {payload:?}");
        assert_eq!(
            report.phase,
            if expected {
                AlarmPhase::Alarming
            } else {
                AlarmPhase::Idle
            }
        );
    }
}

#[test]
fn cursor_survives_successful_reconnect_mid_tune() {
    let clock = SimClock::new();
    let mut alarm = started(&clock, ALARM_TUNE);
    publish(&mut alarm, b"100");
    for _ in 0..5 {
        alarm.run_iteration();
    }
    let before = alarm.session().cursor();
    assert_eq!(before, 5);

    alarm.network_mut().modem_mut().break_next_poll = true;
    let report = alarm.run_iteration();
    assert_eq!(report.phase, AlarmPhase::Alarming);
    assert_eq!(report.cursor, before);

    let played = alarm.tone().frequencies().len();
    alarm.run_iteration();
    assert_eq!(alarm.session().cursor(), before + 1);
    let expected = ALARM_TUNE.get(before).expect("note in tune");
    if !expected.is_rest() {
        assert_eq!(
            alarm.tone().frequencies().last(),
            Some(&expected.frequency_hz)
        );
        assert_eq!(alarm.tone().frequencies().len(), played + 1);
    }
}
