//! ESP-AT WiFi co-processor driver.
//!
//! The board's wireless link lives on an ESP module running the stock AT
//! firmware, attached over a UART. [`EspAtClient`] implements both the
//! [`Association`] and [`SessionTransport`] capabilities by issuing AT
//! commands and parsing the replies with the `winnow` parsers in [`parse`].
//!
//! Replies are read line by line with a millisecond budget spent through the
//! delay capability. `+MQTTSUBRECV` notifications that arrive while a command
//! is in flight are queued and handed out by later `poll_incoming` calls.

pub mod parse;

use core::fmt::{self, Write as _};
use core::net::Ipv4Addr;
use core::time::Duration;

use embedded_io::{Read, ReadReady, Write};
use heapless::{Deque, String, Vec};

use crate::clock::{DelayNs, duration_millis_u32};
use crate::config::WifiCredentials;
use crate::network::{Association, HardwareAddress, SessionRequest, SessionTransport};
use crate::relay::InboundMessage;

use self::parse::FinalResult;

/// Longest response line retained.
pub const LINE_CAPACITY: usize = 256;
/// Longest command accepted, including the trailing CRLF.
pub const COMMAND_CAPACITY: usize = 256;
/// Inbound messages buffered while commands are in flight.
pub const PENDING_MESSAGES: usize = 4;

/// Timeout for quick configuration and query commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(2);
/// Timeout for `AT+CWJAP`, which only answers once the join settles.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(20);
/// Timeout for `AT+MQTTCONN` and `AT+MQTTSUB`.
pub const BROKER_TIMEOUT: Duration = Duration::from_secs(10);

/// MQTT link used for the single broker session.
const LINK_ID: u8 = 0;

type Line = Vec<u8, LINE_CAPACITY>;

/// Errors reported by the ESP-AT driver.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AtError {
    /// No final result arrived within the command's budget.
    Timeout,
    /// The module answered `ERROR` or `SEND FAIL`.
    Error,
    /// The module answered `FAIL`.
    Fail,
    /// A command or reply did not fit its buffer.
    Overflow,
    /// The serial port reported an error.
    Io,
    /// A reply line was missing or malformed.
    Parse,
    /// The broker link dropped (`+MQTTDISCONNECTED`).
    Disconnected,
}

impl fmt::Display for AtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AtError::Timeout => "timeout",
            AtError::Error => "error",
            AtError::Fail => "fail",
            AtError::Overflow => "overflow",
            AtError::Io => "serial i/o",
            AtError::Parse => "unexpected reply",
            AtError::Disconnected => "broker link down",
        })
    }
}

/// Handle for an open MQTT link.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MqttLink {
    link_id: u8,
}

impl MqttLink {
    pub const fn link_id(self) -> u8 {
        self.link_id
    }
}

/// AT string parameter, quoted with `\`, `"`, and `,` escaped.
struct Quoted<'a>(&'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('"')?;
        for ch in self.0.chars() {
            if matches!(ch, '\\' | '"' | ',') {
                f.write_char('\\')?;
            }
            f.write_char(ch)?;
        }
        f.write_char('"')
    }
}

/// Subscription message whose line outgrew the line buffer. The rest of its
/// announced payload is streamed straight into `message`.
struct Spill {
    message: InboundMessage,
    remaining: usize,
}

/// Driver for an ESP module running the AT firmware.
pub struct EspAtClient<S, D> {
    serial: S,
    delay: D,
    line: Line,
    spill: Option<Spill>,
    pending: Deque<InboundMessage, PENDING_MESSAGES>,
    link_up: bool,
    dropped_messages: u32,
}

impl<S, D> EspAtClient<S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    pub fn new(serial: S, delay: D) -> Self {
        Self {
            serial,
            delay,
            line: Vec::new(),
            spill: None,
            pending: Deque::new(),
            link_up: false,
            dropped_messages: 0,
        }
    }

    /// Checks the module answers `AT` and turns command echo off.
    ///
    /// # Errors
    ///
    /// Returns the first command failure.
    pub fn handshake(&mut self) -> Result<(), AtError> {
        self.command(format_args!("AT"), COMMAND_TIMEOUT, None)?;
        self.command(format_args!("ATE0"), COMMAND_TIMEOUT, None)?;
        Ok(())
    }

    /// Whether the broker link is believed to be up.
    pub const fn link_up(&self) -> bool {
        self.link_up
    }

    /// Messages discarded because the pending queue was full.
    pub const fn dropped_messages(&self) -> u32 {
        self.dropped_messages
    }

    pub fn serial(&self) -> &S {
        &self.serial
    }

    pub fn serial_mut(&mut self) -> &mut S {
        &mut self.serial
    }

    /// Sends one command and waits for its final result line.
    ///
    /// When `capture` is set, the first line starting with it is returned.
    fn command(
        &mut self,
        args: fmt::Arguments<'_>,
        timeout: Duration,
        capture: Option<&[u8]>,
    ) -> Result<Option<Line>, AtError> {
        let mut text: String<COMMAND_CAPACITY> = String::new();
        text.write_fmt(args).map_err(|_| AtError::Overflow)?;
        text.push_str("\r\n").map_err(|_| AtError::Overflow)?;
        self.serial
            .write_all(text.as_bytes())
            .map_err(|_| AtError::Io)?;
        self.serial.flush().map_err(|_| AtError::Io)?;

        let mut budget = duration_millis_u32(timeout);
        let mut captured = None;
        loop {
            let Some(line) = self.next_line(&mut budget)? else {
                return Err(AtError::Timeout);
            };
            match parse::final_result(&line) {
                Some(FinalResult::Ok) => return Ok(captured),
                Some(FinalResult::Error) => return Err(AtError::Error),
                Some(FinalResult::Fail) => return Err(AtError::Fail),
                None => {}
            }
            if self.handle_notice(&line) {
                continue;
            }
            if let Some(prefix) = capture
                && captured.is_none()
                && line.starts_with(prefix)
            {
                captured = Some(line);
            }
        }
    }

    fn query(&mut self, args: fmt::Arguments<'_>, prefix: &[u8]) -> Result<Line, AtError> {
        self.command(args, COMMAND_TIMEOUT, Some(prefix))?
            .ok_or(AtError::Parse)
    }

    /// Reads the next complete line, spending up to `budget` milliseconds.
    ///
    /// Returns `None` once the budget is exhausted with no complete line.
    fn next_line(&mut self, budget: &mut u32) -> Result<Option<Line>, AtError> {
        loop {
            if self.serial.read_ready().map_err(|_| AtError::Io)? {
                let mut byte = [0_u8; 1];
                if self.serial.read(&mut byte).map_err(|_| AtError::Io)? == 0 {
                    continue;
                }
                if let Some(line) = self.accept(byte[0])? {
                    return Ok(Some(line));
                }
            } else if *budget == 0 {
                return Ok(None);
            } else {
                self.delay.delay_ms(1);
                *budget -= 1;
            }
        }
    }

    fn accept(&mut self, byte: u8) -> Result<Option<Line>, AtError> {
        if self.spill.is_some() {
            self.spill_byte(byte);
            return Ok(None);
        }

        if byte != b'\n' {
            if self.line.push(byte).is_err() {
                return self.overflow(byte);
            }
            return Ok(None);
        }

        let body = self.line.strip_suffix(b"\r").unwrap_or(self.line.as_slice());
        if parse::subscription_bytes_missing(body).is_some() {
            // Payload contains a line break; keep reading.
            if self.line.push(byte).is_err() {
                return self.overflow(byte);
            }
            return Ok(None);
        }

        let mut line = core::mem::take(&mut self.line);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(line))
    }

    /// Handles a full line buffer while `byte` is still unconsumed.
    ///
    /// An oversized subscription message keeps its head and is queued as
    /// truncated once the announced length has been read; anything else is
    /// dropped with [`AtError::Overflow`].
    fn overflow(&mut self, byte: u8) -> Result<Option<Line>, AtError> {
        let spill = parse::subscription_prefix(&self.line)
            .filter(|prefix| prefix.bytes_missing() > 0)
            .map(|prefix| Spill {
                message: InboundMessage::new(topic_str(prefix.topic), prefix.payload),
                remaining: prefix.bytes_missing(),
            });
        self.line.clear();

        match spill {
            Some(spill) => {
                self.spill = Some(spill);
                self.spill_byte(byte);
                Ok(None)
            }
            None => Err(AtError::Overflow),
        }
    }

    fn spill_byte(&mut self, byte: u8) {
        let Some(spill) = self.spill.as_mut() else {
            return;
        };
        if spill.message.payload.push(byte).is_err() {
            spill.message.truncated = true;
        }
        spill.remaining -= 1;

        if spill.remaining == 0
            && let Some(done) = self.spill.take()
        {
            self.queue_message(done.message);
        }
    }

    /// Queues `message` for `poll_incoming`, evicting the oldest when full.
    fn queue_message(&mut self, message: InboundMessage) {
        let mut message = message;
        while let Err(rejected) = self.pending.push_back(message) {
            self.dropped_messages = self.dropped_messages.saturating_add(1);
            if self.pending.pop_front().is_none() {
                return;
            }
            message = rejected;
        }
    }

    /// Consumes unsolicited notices. Returns `true` when `line` was one.
    fn handle_notice(&mut self, line: &[u8]) -> bool {
        if let Some(message) = parse::subscription_message(line) {
            self.queue_message(InboundMessage::new(
                topic_str(message.topic),
                message.payload,
            ));
            return true;
        }
        if parse::mqtt_disconnected(line).is_some() {
            self.link_up = false;
            return true;
        }
        if parse::mqtt_connected(line).is_some() {
            self.link_up = true;
            return true;
        }
        false
    }
}

fn topic_str(topic: &[u8]) -> &str {
    core::str::from_utf8(topic).unwrap_or_default()
}

impl<S, D> Association for EspAtClient<S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    type LinkError = AtError;

    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), AtError> {
        self.command(format_args!("AT+CWMODE=1"), COMMAND_TIMEOUT, None)?;
        self.command(
            format_args!(
                "AT+CWJAP={},{}",
                Quoted(credentials.ssid),
                Quoted(credentials.password)
            ),
            JOIN_TIMEOUT,
            None,
        )?;
        Ok(())
    }

    fn is_connected(&mut self) -> Result<bool, AtError> {
        let line = self.query(format_args!("AT+CWSTATE?"), b"+CWSTATE:")?;
        let state = parse::cwstate(&line).ok_or(AtError::Parse)?;
        Ok(state == parse::CWSTATE_GOT_IP)
    }

    fn disconnect(&mut self) -> Result<(), AtError> {
        self.link_up = false;
        self.command(format_args!("AT+CWQAP"), COMMAND_TIMEOUT, None)?;
        Ok(())
    }

    fn local_address(&mut self) -> Option<Ipv4Addr> {
        let line = self
            .query(format_args!("AT+CIPSTA?"), b"+CIPSTA:ip:")
            .ok()?;
        parse::station_ip(&line)
    }

    fn hardware_address(&mut self) -> Result<HardwareAddress, AtError> {
        let line = self.query(format_args!("AT+CIPSTAMAC?"), b"+CIPSTAMAC:")?;
        parse::station_mac(&line).ok_or(AtError::Parse)
    }
}

impl<S, D> SessionTransport for EspAtClient<S, D>
where
    S: Read + Write + ReadReady,
    D: DelayNs,
{
    type Handle = MqttLink;
    type SessionError = AtError;

    fn open(&mut self, request: &SessionRequest<'_>) -> Result<MqttLink, AtError> {
        // A stale link from an earlier session makes USERCFG fail.
        let _ = self.command(
            format_args!("AT+MQTTCLEAN={LINK_ID}"),
            COMMAND_TIMEOUT,
            None,
        );
        self.link_up = false;
        self.spill = None;
        self.pending.clear();

        let broker = request.broker;
        self.command(
            format_args!(
                "AT+MQTTUSERCFG={LINK_ID},1,{},{},{},0,0,\"\"",
                Quoted(request.client_id),
                Quoted(broker.username),
                Quoted(broker.key)
            ),
            COMMAND_TIMEOUT,
            None,
        )?;
        self.command(
            format_args!(
                "AT+MQTTCONN={LINK_ID},{},{},0",
                Quoted(broker.host),
                broker.port
            ),
            BROKER_TIMEOUT,
            None,
        )?;

        self.link_up = true;
        Ok(MqttLink { link_id: LINK_ID })
    }

    fn subscribe(&mut self, handle: &mut MqttLink, topic: &str) -> Result<(), AtError> {
        self.command(
            format_args!("AT+MQTTSUB={},{},0", handle.link_id, Quoted(topic)),
            BROKER_TIMEOUT,
            None,
        )?;
        Ok(())
    }

    fn poll_incoming(&mut self, _: &mut MqttLink) -> Result<Option<InboundMessage>, AtError> {
        let mut budget = 0;
        while let Some(line) = self.next_line(&mut budget)? {
            self.handle_notice(&line);
        }

        if let Some(message) = self.pending.pop_front() {
            return Ok(Some(message));
        }
        if self.link_up {
            Ok(None)
        } else {
            Err(AtError::Disconnected)
        }
    }

    fn close(&mut self, handle: MqttLink) {
        let _ = self.command(
            format_args!("AT+MQTTCLEAN={}", handle.link_id),
            COMMAND_TIMEOUT,
            None,
        );
        self.link_up = false;
        self.spill = None;
        self.pending.clear();
    }
}
