#![cfg_attr(any(not(target_os = "none"), not(feature = "joystick")), allow(dead_code))]

//! Telemetry sink that mirrors alarm events to the console.
//!
//! Events are stored in the shared [`TelemetryRecorder`] ring and echoed
//! through `defmt` on the MCU or stdout on the host, at the level given by
//! [`AlarmEventKind::severity`].

use core::fmt;

use alarm_core::clock::Instant;
use alarm_core::joystick::JoystickReport;
use alarm_core::telemetry::{
    AlarmEventKind, ErrorSite, EventId, EventSink, Severity, TelemetryRecorder,
};

/// Records events into a ring buffer and logs each one as it arrives.
pub struct LoggingSink {
    recorder: TelemetryRecorder,
}

impl LoggingSink {
    pub const fn new() -> Self {
        Self {
            recorder: TelemetryRecorder::new(),
        }
    }

    pub fn recorder(&self) -> &TelemetryRecorder {
        &self.recorder
    }
}

impl Default for LoggingSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LoggingSink {
    fn record(&mut self, event: AlarmEventKind, timestamp: Instant) -> EventId {
        let id = self.recorder.record(event, timestamp);
        log_event(id, event, timestamp);
        id
    }

    fn transport_error(&mut self, site: ErrorSite, error: &dyn fmt::Debug) {
        self.recorder.transport_error(site, error);
        log_transport_error(site, error);
    }
}

#[cfg(target_os = "none")]
fn log_event(id: EventId, event: AlarmEventKind, timestamp: Instant) {
    let millis = timestamp.as_millis();
    let message = defmt::Display2Format(&event);
    match event.severity() {
        Severity::Info => defmt::info!("[{=u64} ms] #{=u32} {}", millis, id, message),
        Severity::Warn => defmt::warn!("[{=u64} ms] #{=u32} {}", millis, id, message),
        Severity::Error => defmt::error!("[{=u64} ms] #{=u32} {}", millis, id, message),
    }
}

#[cfg(not(target_os = "none"))]
fn log_event(id: EventId, event: AlarmEventKind, timestamp: Instant) {
    let level = match event.severity() {
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Error => "error",
    };
    println!(
        "[{:>8} ms] {level:<5} #{id} {event}",
        timestamp.as_millis()
    );
}

#[cfg(target_os = "none")]
fn log_transport_error(site: ErrorSite, error: &dyn fmt::Debug) {
    defmt::warn!(
        "transport error at {}: {}",
        defmt::Debug2Format(&site),
        defmt::Debug2Format(error)
    );
}

#[cfg(not(target_os = "none"))]
fn log_transport_error(site: ErrorSite, error: &dyn fmt::Debug) {
    println!("transport error at {site:?}: {error:?}");
}

/// Prints a joystick status line.
#[cfg(target_os = "none")]
pub fn log_joystick(report: &JoystickReport) {
    match report.frequency {
        Some(hz) => defmt::info!(
            "joystick {} buzzer={} tone={=u32} Hz",
            report.direction.label(),
            report.buzzer_on,
            hz
        ),
        None => defmt::info!(
            "joystick {} buzzer={}",
            report.direction.label(),
            report.buzzer_on
        ),
    }
}

#[cfg(not(target_os = "none"))]
pub fn log_joystick(report: &JoystickReport) {
    match report.frequency {
        Some(hz) => println!(
            "joystick {} buzzer={} tone={hz} Hz",
            report.direction, report.buzzer_on
        ),
        None => println!("joystick {} buzzer={}", report.direction, report.buzzer_on),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_kept_after_logging() {
        let mut sink = LoggingSink::new();
        let first = sink.record(AlarmEventKind::SessionConnected, Instant::from_millis(10));
        let second = sink.record(AlarmEventKind::AlarmTriggered, Instant::from_millis(25));

        assert!(second > first);
        let latest = sink.recorder().latest().expect("latest record");
        assert_eq!(latest.event, AlarmEventKind::AlarmTriggered);
        assert_eq!(latest.timestamp, Instant::from_millis(25));
    }

    #[test]
    fn transport_errors_are_counted() {
        let mut sink = LoggingSink::new();
        sink.transport_error(ErrorSite::Poll, &"link reset");
        assert_eq!(sink.recorder().transport_errors(), 1);
        assert!(sink.recorder().is_empty());
    }
}
