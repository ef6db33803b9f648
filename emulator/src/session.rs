use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufWriter, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use alarm_core::alarm::{AlarmLoop, AlarmPhase, IterationReport};
use alarm_core::clock::{Clock, DelayNs, Instant};
use alarm_core::config::{BrokerConfig, NetworkConfig, WifiCredentials};
use alarm_core::context::Context;
use alarm_core::joystick::{AxisCalibration, IndicatorDriver, IndicatorMask, JoystickBuzzer};
use alarm_core::network::{Association, HardwareAddress, SessionRequest, SessionTransport};
use alarm_core::relay::InboundMessage;
use alarm_core::sequencer::ToneOutput;
use alarm_core::telemetry::{AlarmEventKind, ErrorSite, EventId, EventSink, TelemetryRecorder};
use alarm_core::tune::ALARM_TUNE;

/// Upper bound for a single `run` command.
const MAX_RUN_ITERATIONS: u32 = 1_000;
const SIM_MAC: HardwareAddress = [0x24, 0x0A, 0xC4, 0x5E, 0x11, 0x07];
const SIM_ADDRESS: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 20);
const SIM_USERNAME: &str = "emulator";
const DUTY_RANGE: u16 = 1023;
const BANNER: &str = "Buzzer alarm emulator ready. Type `help` for commands or `exit` to quit.";
const CLOSED: &str = "Session closed.";

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("publish", "publish <payload>          - deliver a message on the timer feed"),
    ("run", "run [count]                - run alarm loop iterations (default 1)"),
    ("drop", "drop                       - break the broker session"),
    ("wifi", "wifi <up|down>             - toggle the simulated access point"),
    ("broker", "broker <up|down>           - toggle the simulated broker"),
    ("joystick", "joystick <x> <y> [press]   - feed one joystick poll"),
    ("status", "status                     - display alarm and link state"),
    ("help", "help [topic]               - show help for a command"),
];

type Console = Rc<RefCell<Vec<String>>>;

type EmulatedAlarm = AlarmLoop<SimModem, ConsoleTone, VirtualClock, VirtualClock, ConsoleSink>;

/// Interactive alarm session driven by REPL commands on virtual time.
pub struct Session {
    alarm: EmulatedAlarm,
    joystick: JoystickBuzzer<ConsoleTone, ConsoleLeds>,
    clock: VirtualClock,
    console: Console,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    /// Boots the alarm against a healthy simulated network.
    pub fn new(transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = transcript.map(TranscriptLogger::new).transpose()?;
        let console = Console::default();
        let clock = VirtualClock::default();

        let ctx = Context::new(clock.clone(), clock.clone(), ConsoleSink::new(console.clone()));
        let alarm = AlarmLoop::start(
            SimModem::new(),
            network_config(),
            ALARM_TUNE,
            ConsoleTone::new("alarm", console.clone()),
            ctx,
        )
        .map_err(|err| io::Error::other(err.to_string()))?;

        let joystick = JoystickBuzzer::new(
            ConsoleTone::new("joystick", console.clone()),
            ConsoleLeds::new(console.clone()),
            AxisCalibration::default(),
        );

        let mut session = Self {
            alarm,
            joystick,
            clock,
            console,
            transcript,
        };
        // Startup chatter goes to the transcript only.
        let boot = session.drain_console();
        session.record_output(&boot)?;
        Ok(session)
    }

    /// Reads commands until `exit`, `quit`, or end of input, writing each
    /// reply to `output`.
    pub fn serve<R: BufRead, W: Write>(&mut self, mut input: R, mut output: W) -> io::Result<()> {
        writeln!(output, "{BANNER}")?;
        let mut line = String::new();
        loop {
            line.clear();
            write!(output, "> ")?;
            output.flush()?;

            if input.read_line(&mut line)? == 0 {
                writeln!(output)?;
                return Ok(());
            }

            let command = line.trim();
            if is_exit(command) {
                self.record_input(command)?;
                self.record_output(&[CLOSED.to_owned()])?;
                writeln!(output, "{CLOSED}")?;
                return Ok(());
            }

            for reply in self.handle_command(command)? {
                writeln!(output, "{reply}")?;
            }
        }
    }

    /// Returns everything logged during startup or the last command.
    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        self.record_input(trimmed)?;

        let mut words = trimmed.split_whitespace();
        let command = words.next().unwrap_or_default().to_ascii_lowercase();
        let args: Vec<&str> = words.collect();

        let mut lines = match command.as_str() {
            "help" => help(args.first().copied()),
            "publish" => self.publish(trimmed),
            "run" => self.run(&args),
            "drop" => self.drop_session(),
            "wifi" => self.toggle(&args, Toggle::Wifi),
            "broker" => self.toggle(&args, Toggle::Broker),
            "joystick" => self.joystick(&args),
            "status" => self.status(),
            _ => vec![format!("ERR unknown command `{command}`")],
        };

        let mut output = self.drain_console();
        output.append(&mut lines);
        self.record_output(&output)?;
        Ok(output)
    }

    fn publish(&mut self, line: &str) -> Vec<String> {
        // Everything after the command word is the payload, spaces included.
        let payload = line
            .split_once(char::is_whitespace)
            .map_or("", |(_, rest)| rest.trim_start());
        let topic = self.alarm.network().topic().to_owned();
        self.alarm
            .network_mut()
            .modem_mut()
            .deliver(InboundMessage::new(&topic, payload.as_bytes()));
        vec![format!("queued {payload:?} on {topic}")]
    }

    fn run(&mut self, args: &[&str]) -> Vec<String> {
        let count = match args.first() {
            None => 1,
            Some(raw) => match raw.parse::<u32>() {
                Ok(count) if (1..=MAX_RUN_ITERATIONS).contains(&count) => count,
                _ => {
                    return vec![format!(
                        "ERR run count must be 1..={MAX_RUN_ITERATIONS}"
                    )];
                }
            },
        };

        let mut lines = Vec::new();
        for _ in 0..count {
            let before = self.clock.now();
            let report = self.alarm.run_iteration();
            lines.append(&mut self.drain_console());
            lines.push(describe_iteration(&report, self.clock.now(), before));
        }
        lines
    }

    fn drop_session(&mut self) -> Vec<String> {
        let modem = self.alarm.network_mut().modem_mut();
        if modem.live_session.take().is_some() {
            vec!["broker session dropped".to_owned()]
        } else {
            vec!["no live session".to_owned()]
        }
    }

    fn toggle(&mut self, args: &[&str], target: Toggle) -> Vec<String> {
        let up = match args.first().map(|arg| arg.to_ascii_lowercase()) {
            Some(arg) if arg == "up" => true,
            Some(arg) if arg == "down" => false,
            _ => return vec![format!("ERR usage: {} <up|down>", target.label())],
        };

        let modem = self.alarm.network_mut().modem_mut();
        match target {
            Toggle::Wifi => {
                modem.wifi_available = up;
                if !up {
                    modem.linked = false;
                    modem.live_session = None;
                }
            }
            Toggle::Broker => {
                modem.broker_available = up;
                if !up {
                    modem.live_session = None;
                }
            }
        }
        vec![format!(
            "{} {}",
            target.label(),
            if up { "up" } else { "down" }
        )]
    }

    fn joystick(&mut self, args: &[&str]) -> Vec<String> {
        let parsed = match args {
            [x, y] => parse_axes(x, y).map(|(x, y)| (x, y, false)),
            [x, y, flag] if flag.eq_ignore_ascii_case("press") => {
                parse_axes(x, y).map(|(x, y)| (x, y, true))
            }
            _ => None,
        };
        let Some((x, y, pressed)) = parsed else {
            return vec!["ERR usage: joystick <x> <y> [press]".to_owned()];
        };

        let report = self.joystick.update(x, y, pressed, self.clock.now());
        let mut lines = self.drain_console();
        lines.push(match report.frequency {
            Some(hz) => format!(
                "joystick {} buzzer={} tone={hz} Hz{}",
                report.direction,
                on_off(report.buzzer_on),
                if report.toggled { " (toggled)" } else { "" }
            ),
            None => format!(
                "joystick {} buzzer={}{}",
                report.direction,
                on_off(report.buzzer_on),
                if report.toggled { " (toggled)" } else { "" }
            ),
        });
        // Polls are spaced by the firmware's poll period.
        self.clock
            .advance(alarm_core::config::JOYSTICK_POLL_PERIOD);
        lines
    }

    fn status(&self) -> Vec<String> {
        let session = self.alarm.session();
        let network = self.alarm.network();
        let modem = network.modem();
        let sink = &self.alarm.context().sink;
        vec![
            format!("time: {} ms", self.clock.now().as_millis()),
            format!(
                "alarm: {} phase={} cursor={}",
                on_off(session.alarm()),
                phase_label(session.phase()),
                session.cursor()
            ),
            format!(
                "wifi: {:?} (ap {})",
                network.state().association_status(),
                if modem.wifi_available { "up" } else { "down" }
            ),
            format!(
                "broker: session={} (server {}) client_id={}",
                if network.state().has_session() { "open" } else { "none" },
                if modem.broker_available { "up" } else { "down" },
                network.client_id().unwrap_or("-")
            ),
            format!("topic: {}", network.topic()),
            format!(
                "telemetry: {} events, {} transport errors, {} queued messages",
                sink.recorder.len(),
                sink.recorder.transport_errors(),
                modem.inbox.len()
            ),
        ]
    }

    fn drain_console(&mut self) -> Vec<String> {
        std::mem::take(&mut *self.console.borrow_mut())
    }

    fn record_input(&mut self, line: &str) -> io::Result<()> {
        let now = self.clock.now();
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(now, TranscriptRole::Host, line)?;
        }
        Ok(())
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let now = self.clock.now();
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(now, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

fn is_exit(command: &str) -> bool {
    command.eq_ignore_ascii_case("exit") || command.eq_ignore_ascii_case("quit")
}

#[derive(Clone, Copy)]
enum Toggle {
    Wifi,
    Broker,
}

impl Toggle {
    fn label(self) -> &'static str {
        match self {
            Toggle::Wifi => "wifi",
            Toggle::Broker => "broker",
        }
    }
}

fn network_config() -> NetworkConfig {
    NetworkConfig::new(
        WifiCredentials::new("emulated-ap", "emulated-pass"),
        BrokerConfig::adafruit(SIM_USERNAME, "emulated-key"),
    )
}

fn help(topic: Option<&str>) -> Vec<String> {
    match topic {
        None => HELP_TOPICS
            .iter()
            .map(|(_, line)| (*line).to_owned())
            .collect(),
        Some(topic) => HELP_TOPICS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(topic))
            .map_or_else(
                || vec![format!("ERR no help for `{topic}`")],
                |(_, line)| vec![(*line).to_owned()],
            ),
    }
}

fn parse_axes(x: &str, y: &str) -> Option<(u16, u16)> {
    Some((x.parse().ok()?, y.parse().ok()?))
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn phase_label(phase: AlarmPhase) -> &'static str {
    match phase {
        AlarmPhase::Idle => "idle",
        AlarmPhase::Alarming => "alarming",
        AlarmPhase::Recovering => "recovering",
    }
}

fn describe_iteration(report: &IterationReport, now: Instant, before: Instant) -> String {
    let elapsed = now.saturating_duration_since(before);
    let command = report
        .command
        .map_or_else(|| "-".to_owned(), |command| format!("{command:?}"));
    format!(
        "iteration: phase={} command={command} cursor={} took {}",
        phase_label(report.phase),
        report.cursor,
        format_duration_short(elapsed)
    )
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}

/// Shared virtual time: delays advance the clock instead of sleeping.
#[derive(Clone, Default)]
pub struct VirtualClock {
    now_ns: Rc<Cell<u64>>,
}

impl VirtualClock {
    fn advance(&self, duration: Duration) {
        let ns = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.set(self.now_ns.get().saturating_add(ns));
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.now_ns.get() / 1_000_000)
    }
}

impl DelayNs for VirtualClock {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns.set(self.now_ns.get().saturating_add(u64::from(ns)));
    }
}

/// Telemetry sink that prints each event to the console.
pub struct ConsoleSink {
    recorder: TelemetryRecorder,
    console: Console,
}

impl ConsoleSink {
    fn new(console: Console) -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
            console,
        }
    }
}

impl EventSink for ConsoleSink {
    fn record(&mut self, event: AlarmEventKind, timestamp: Instant) -> EventId {
        let id = self.recorder.record(event, timestamp);
        self.console.borrow_mut().push(format!(
            "[{:>8} ms] {:?} {event}",
            timestamp.as_millis(),
            event.severity()
        ));
        id
    }

    fn transport_error(&mut self, site: ErrorSite, error: &dyn fmt::Debug) {
        self.recorder.transport_error(site, error);
        self.console
            .borrow_mut()
            .push(format!("transport error at {site:?}: {error:?}"));
    }
}

/// Buzzer that narrates frequency and duty changes.
pub struct ConsoleTone {
    label: &'static str,
    console: Console,
    sounding: bool,
}

impl ConsoleTone {
    fn new(label: &'static str, console: Console) -> Self {
        Self {
            label,
            console,
            sounding: false,
        }
    }
}

impl ToneOutput for ConsoleTone {
    fn set_frequency(&mut self, hz: u32) {
        self.console
            .borrow_mut()
            .push(format!("{}: tone {hz} Hz", self.label));
    }

    fn set_duty(&mut self, duty: u16) {
        let sounding = duty != 0;
        // Repeated silences are noise in the transcript.
        if sounding || self.sounding {
            let line = if sounding {
                format!("{}: buzzer on (duty {duty}/{DUTY_RANGE})", self.label)
            } else {
                format!("{}: buzzer off", self.label)
            };
            self.console.borrow_mut().push(line);
        }
        self.sounding = sounding;
    }

    fn max_duty(&self) -> u16 {
        DUTY_RANGE
    }
}

/// Directional LEDs rendered as text whenever the lit set changes.
pub struct ConsoleLeds {
    console: Console,
    lit: IndicatorMask,
}

impl ConsoleLeds {
    fn new(console: Console) -> Self {
        Self {
            console,
            lit: IndicatorMask::NONE,
        }
    }
}

impl IndicatorDriver for ConsoleLeds {
    fn apply(&mut self, mask: IndicatorMask) {
        // The panel blanks the LEDs before every update; only report the result.
        if mask.is_empty() {
            self.lit = mask;
            return;
        }
        self.lit = mask;
        let names: Vec<&str> = [
            (IndicatorMask::UP, "up"),
            (IndicatorMask::DOWN, "down"),
            (IndicatorMask::LEFT, "left"),
            (IndicatorMask::RIGHT, "right"),
        ]
        .into_iter()
        .filter(|(bit, _)| mask.contains(*bit))
        .map(|(_, name)| name)
        .collect();
        self.console
            .borrow_mut()
            .push(format!("leds: {}", names.join("+")));
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SimError {
    NoAccessPoint,
    BrokerUnavailable,
    SessionClosed,
}

/// Simulated Wi-Fi adapter and broker client.
pub struct SimModem {
    pub wifi_available: bool,
    pub broker_available: bool,
    pub linked: bool,
    pub live_session: Option<u32>,
    pub inbox: VecDeque<InboundMessage>,
    next_session: u32,
}

impl SimModem {
    fn new() -> Self {
        Self {
            wifi_available: true,
            broker_available: true,
            linked: false,
            live_session: None,
            inbox: VecDeque::new(),
            next_session: 1,
        }
    }

    fn deliver(&mut self, message: InboundMessage) {
        self.inbox.push_back(message);
    }
}

impl Association for SimModem {
    type LinkError = SimError;

    fn connect(&mut self, _: &WifiCredentials) -> Result<(), SimError> {
        self.linked = self.wifi_available;
        Ok(())
    }

    fn is_connected(&mut self) -> Result<bool, SimError> {
        Ok(self.linked)
    }

    fn disconnect(&mut self) -> Result<(), SimError> {
        self.linked = false;
        self.live_session = None;
        Ok(())
    }

    fn local_address(&mut self) -> Option<Ipv4Addr> {
        self.linked.then_some(SIM_ADDRESS)
    }

    fn hardware_address(&mut self) -> Result<HardwareAddress, SimError> {
        if self.linked {
            Ok(SIM_MAC)
        } else {
            Err(SimError::NoAccessPoint)
        }
    }
}

impl SessionTransport for SimModem {
    type Handle = u32;
    type SessionError = SimError;

    fn open(&mut self, _: &SessionRequest<'_>) -> Result<u32, SimError> {
        if !self.linked {
            return Err(SimError::NoAccessPoint);
        }
        if !self.broker_available {
            return Err(SimError::BrokerUnavailable);
        }
        let handle = self.next_session;
        self.next_session += 1;
        self.live_session = Some(handle);
        Ok(handle)
    }

    fn subscribe(&mut self, handle: &mut u32, _: &str) -> Result<(), SimError> {
        if self.live_session == Some(*handle) {
            Ok(())
        } else {
            Err(SimError::SessionClosed)
        }
    }

    fn poll_incoming(&mut self, handle: &mut u32) -> Result<Option<InboundMessage>, SimError> {
        if self.live_session != Some(*handle) {
            return Err(SimError::SessionClosed);
        }
        Ok(self.inbox.pop_front())
    }

    fn close(&mut self, handle: u32) {
        if self.live_session == Some(handle) {
            self.live_session = None;
        }
    }
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Buzzer alarm emulator transcript")?;
        writeln!(self.writer, "# Timestamps are virtual milliseconds since boot")?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, now: Instant, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>8} ms] {} {}",
            now.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(None).expect("emulated startup succeeds")
    }

    fn contains(lines: &[String], needle: &str) -> bool {
        lines.iter().any(|line| line.contains(needle))
    }

    #[test]
    fn trigger_payload_starts_the_tune() {
        let mut session = session();
        session.handle_command("publish 100").expect("publish");
        let lines = session.handle_command("run").expect("run");

        assert!(contains(&lines, "alarm: tone 880 Hz"));
        assert!(contains(&lines, "phase=alarming"));
        assert!(session.alarm.session().alarm());
    }

    #[test]
    fn dropped_session_recovers_on_next_iteration() {
        let mut session = session();
        session.handle_command("drop").expect("drop");
        let lines = session.handle_command("run").expect("run");

        assert!(contains(&lines, "phase=idle"));
        assert!(session.alarm.network().state().has_session());
    }

    #[test]
    fn broker_outage_keeps_recovering_until_restored() {
        let mut session = session();
        session.handle_command("broker down").expect("broker down");
        let lines = session.handle_command("run").expect("run");
        assert!(contains(&lines, "phase=recovering"));

        session.handle_command("broker up").expect("broker up");
        let lines = session.handle_command("run").expect("run");
        assert!(contains(&lines, "phase=idle"));
    }

    #[test]
    fn joystick_press_toggles_buzzer() {
        let mut session = session();
        // Let the debounce window from boot pass first.
        for _ in 0..3 {
            session.handle_command("joystick 2000 2000").expect("joystick");
        }
        let lines = session
            .handle_command("joystick 2000 2000 press")
            .expect("joystick");
        assert!(contains(&lines, "buzzer=on (toggled)"));

        let lines = session.handle_command("joystick 3600 2000").expect("joystick");
        assert!(contains(&lines, "joystick: tone 440 Hz"));
        assert!(contains(&lines, "leds: right"));
    }

    fn serve_script(session: &mut Session, script: &str) -> String {
        let mut output = Vec::new();
        session
            .serve(script.as_bytes(), &mut output)
            .expect("serve reads the whole script");
        String::from_utf8(output).expect("utf-8 replies")
    }

    #[test]
    fn exit_stops_reading_further_commands() {
        let mut session = session();
        let output = serve_script(&mut session, "publish 100\nQUIT\nrun\n");

        assert!(output.starts_with(BANNER));
        assert!(output.ends_with("Session closed.\n"));
        assert!(!output.contains("phase="));
        assert!(!session.alarm.session().alarm());
    }

    #[test]
    fn end_of_input_ends_the_session() {
        let mut session = session();
        let output = serve_script(&mut session, "publish 100\n\nrun\n");

        assert!(output.contains("phase=alarming"));
        assert!(!output.contains(CLOSED));
        assert!(output.ends_with("> \n"));
    }

    #[test]
    fn bad_input_is_reported() {
        let mut session = session();
        assert!(contains(
            &session.handle_command("run 0").expect("run"),
            "ERR run count"
        ));
        assert!(contains(
            &session.handle_command("wifi sideways").expect("wifi"),
            "ERR usage"
        ));
        assert!(contains(
            &session.handle_command("bogus").expect("bogus"),
            "ERR unknown command"
        ));
    }
}
