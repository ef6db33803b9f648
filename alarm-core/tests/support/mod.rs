#![allow(dead_code)]

//! Hand-written capability fakes shared by the integration tests.

use std::cell::Cell;
use std::collections::VecDeque;
use std::net::Ipv4Addr;

use alarm_core::clock::{Clock, DelayNs, Instant};
use alarm_core::config::{
    AssociationPolicy, BrokerConfig, NetworkConfig, ReconnectPolicy, SessionPolicy,
    WifiCredentials,
};
use alarm_core::context::Context;
use alarm_core::network::{Association, HardwareAddress, SessionRequest, SessionTransport};
use alarm_core::relay::InboundMessage;
use alarm_core::sequencer::ToneOutput;
use alarm_core::telemetry::{AlarmEventKind, TelemetryRecorder};

/// Virtual clock: delays advance time instead of sleeping.
#[derive(Default)]
pub struct SimClock {
    now_ns: Cell<u64>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.now_ns.get() / 1_000_000
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        Instant::from_millis(self.elapsed_ms())
    }
}

impl DelayNs for &SimClock {
    fn delay_ns(&mut self, ns: u32) {
        self.now_ns.set(self.now_ns.get() + u64::from(ns));
    }
}

pub type Recorder = TelemetryRecorder<512>;
pub type SimContext<'a> = Context<&'a SimClock, &'a SimClock, Recorder>;

pub fn context(clock: &SimClock) -> SimContext<'_> {
    Context::new(clock, clock, Recorder::new())
}

pub fn events(recorder: &Recorder) -> Vec<AlarmEventKind> {
    recorder.oldest_first().map(|record| record.event).collect()
}

/// Network configuration with the production policies.
pub fn network_config() -> NetworkConfig {
    NetworkConfig::new(
        WifiCredentials::new("lab-ap", "secret"),
        BrokerConfig::adafruit("Bosco311", "aio_key"),
    )
}

/// Network configuration with short, distinct delays for timing assertions.
pub fn fast_network_config() -> NetworkConfig {
    let mut config = network_config();
    config.association = AssociationPolicy {
        max_attempts: 3,
        attempt_timeout: std::time::Duration::from_millis(40),
        poll_interval: std::time::Duration::from_millis(10),
        retry_delay: std::time::Duration::from_millis(100),
        settle_delay: std::time::Duration::from_millis(7),
    };
    config.session = SessionPolicy {
        max_attempts: 3,
        retry_delay: std::time::Duration::from_millis(500),
    };
    config.reconnect = ReconnectPolicy {
        reconnect_delay: std::time::Duration::from_millis(3_000),
    };
    config
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FakeError {
    Rejected,
    Broken,
}

/// Scriptable association plus broker session.
pub struct FakeModem {
    /// Whether the access point accepts joins.
    pub wifi_available: bool,
    /// Whether the adapter is currently joined.
    pub linked: bool,
    /// `connect` returns an error instead of starting a join.
    pub reject_connect: bool,
    /// Number of upcoming `open` calls that fail.
    pub failing_opens: u32,
    pub reject_subscribe: bool,
    /// Next poll reports a transport failure.
    pub break_next_poll: bool,
    pub inbox: VecDeque<InboundMessage>,
    pub mac: Option<HardwareAddress>,

    pub connect_calls: u32,
    pub is_connected_calls: u32,
    pub disconnect_calls: u32,
    pub open_calls: u32,
    pub subscribe_calls: u32,
    pub close_calls: u32,
    pub poll_calls: u32,
    pub last_client_id: Option<String>,
    pub subscriptions: Vec<String>,

    next_session: u32,
    live_session: Option<u32>,
}

impl FakeModem {
    pub fn healthy() -> Self {
        Self {
            wifi_available: true,
            linked: false,
            reject_connect: false,
            failing_opens: 0,
            reject_subscribe: false,
            break_next_poll: false,
            inbox: VecDeque::new(),
            mac: Some([0x24, 0x0A, 0xC4, 0x12, 0xFE, 0x01]),
            connect_calls: 0,
            is_connected_calls: 0,
            disconnect_calls: 0,
            open_calls: 0,
            subscribe_calls: 0,
            close_calls: 0,
            poll_calls: 0,
            last_client_id: None,
            subscriptions: Vec::new(),
            next_session: 1,
            live_session: None,
        }
    }

    pub fn publish(&mut self, payload: &[u8]) {
        self.inbox
            .push_back(InboundMessage::new("Bosco311/feeds/timer", payload));
    }

    pub fn live_session(&self) -> Option<u32> {
        self.live_session
    }
}

impl Association for FakeModem {
    type LinkError = FakeError;

    fn connect(&mut self, _: &WifiCredentials) -> Result<(), FakeError> {
        self.connect_calls += 1;
        if self.reject_connect {
            return Err(FakeError::Rejected);
        }
        self.linked = self.wifi_available;
        Ok(())
    }

    fn is_connected(&mut self) -> Result<bool, FakeError> {
        self.is_connected_calls += 1;
        Ok(self.linked)
    }

    fn disconnect(&mut self) -> Result<(), FakeError> {
        self.disconnect_calls += 1;
        self.linked = false;
        self.live_session = None;
        Ok(())
    }

    fn local_address(&mut self) -> Option<Ipv4Addr> {
        self.linked.then(|| Ipv4Addr::new(192, 168, 1, 42))
    }

    fn hardware_address(&mut self) -> Result<HardwareAddress, FakeError> {
        self.mac.ok_or(FakeError::Broken)
    }
}

impl SessionTransport for FakeModem {
    type Handle = u32;
    type SessionError = FakeError;

    fn open(&mut self, request: &SessionRequest<'_>) -> Result<u32, FakeError> {
        self.open_calls += 1;
        self.last_client_id = Some(request.client_id.to_owned());
        if !self.linked {
            return Err(FakeError::Broken);
        }
        if self.failing_opens > 0 {
            self.failing_opens -= 1;
            return Err(FakeError::Rejected);
        }
        let id = self.next_session;
        self.next_session += 1;
        self.live_session = Some(id);
        Ok(id)
    }

    fn subscribe(&mut self, _: &mut u32, topic: &str) -> Result<(), FakeError> {
        self.subscribe_calls += 1;
        if self.reject_subscribe {
            return Err(FakeError::Rejected);
        }
        self.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn poll_incoming(&mut self, handle: &mut u32) -> Result<Option<InboundMessage>, FakeError> {
        self.poll_calls += 1;
        if std::mem::take(&mut self.break_next_poll) || self.live_session != Some(*handle) {
            self.live_session = None;
            return Err(FakeError::Broken);
        }
        Ok(self.inbox.pop_front())
    }

    fn close(&mut self, handle: u32) {
        self.close_calls += 1;
        if self.live_session == Some(handle) {
            self.live_session = None;
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ToneCall {
    Frequency(u32),
    Duty(u16),
}

/// Buzzer fake recording every call on a 10-bit duty range.
#[derive(Default)]
pub struct RecordingTone {
    pub calls: Vec<ToneCall>,
}

impl RecordingTone {
    pub fn frequencies(&self) -> Vec<u32> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                ToneCall::Frequency(hz) => Some(*hz),
                ToneCall::Duty(_) => None,
            })
            .collect()
    }

    pub fn last_duty(&self) -> Option<u16> {
        self.calls.iter().rev().find_map(|call| match call {
            ToneCall::Duty(duty) => Some(*duty),
            ToneCall::Frequency(_) => None,
        })
    }
}

impl ToneOutput for RecordingTone {
    fn set_frequency(&mut self, hz: u32) {
        self.calls.push(ToneCall::Frequency(hz));
    }

    fn set_duty(&mut self, duty: u16) {
        self.calls.push(ToneCall::Duty(duty));
    }

    fn max_duty(&self) -> u16 {
        1023
    }
}
