#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Build-time network settings.
//!
//! Credentials come from the build environment (`ALARM_WIFI_SSID`,
//! `ALARM_WIFI_PASSWORD`, `ALARM_AIO_USERNAME`, `ALARM_AIO_KEY`) so they never
//! live in the source tree. `ALARM_BROKER_HOST`, `ALARM_BROKER_PORT`, and
//! `ALARM_CLIENT_ID` optionally override the broker defaults.

use alarm_core::config::{
    BrokerConfig, DEFAULT_BROKER_HOST, DEFAULT_BROKER_PORT, NetworkConfig, WifiCredentials,
};

pub const WIFI_SSID: &str = or_default(option_env!("ALARM_WIFI_SSID"), "alarm-ap");
pub const WIFI_PASSWORD: &str = or_default(option_env!("ALARM_WIFI_PASSWORD"), "");
pub const BROKER_USERNAME: &str = or_default(option_env!("ALARM_AIO_USERNAME"), "alarm");
pub const BROKER_KEY: &str = or_default(option_env!("ALARM_AIO_KEY"), "");
pub const BROKER_HOST: &str = or_default(option_env!("ALARM_BROKER_HOST"), DEFAULT_BROKER_HOST);
pub const BROKER_PORT: u16 = parse_port(option_env!("ALARM_BROKER_PORT"), DEFAULT_BROKER_PORT);
pub const CLIENT_ID: Option<&str> = option_env!("ALARM_CLIENT_ID");

/// Network configuration assembled from the build-time settings.
pub fn network_config() -> NetworkConfig {
    let mut broker = BrokerConfig::adafruit(BROKER_USERNAME, BROKER_KEY);
    broker.host = BROKER_HOST;
    broker.port = BROKER_PORT;
    broker.client_id = CLIENT_ID;
    NetworkConfig::new(WifiCredentials::new(WIFI_SSID, WIFI_PASSWORD), broker)
}

const fn or_default(value: Option<&'static str>, fallback: &'static str) -> &'static str {
    match value {
        Some(value) => value,
        None => fallback,
    }
}

/// Parses a decimal port, falling back on anything empty, non-numeric, zero,
/// or out of range.
#[allow(clippy::cast_lossless, clippy::cast_possible_truncation)]
const fn parse_port(value: Option<&str>, fallback: u16) -> u16 {
    let Some(value) = value else {
        return fallback;
    };
    let bytes = value.as_bytes();
    if bytes.is_empty() {
        return fallback;
    }

    let mut port: u32 = 0;
    let mut index = 0;
    while index < bytes.len() {
        let byte = bytes[index];
        if !byte.is_ascii_digit() {
            return fallback;
        }
        port = port * 10 + (byte - b'0') as u32;
        if port > u16::MAX as u32 {
            return fallback;
        }
        index += 1;
    }

    if port == 0 { fallback } else { port as u16 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_parsing_falls_back_on_bad_input() {
        assert_eq!(parse_port(None, 1883), 1883);
        assert_eq!(parse_port(Some("8883"), 1883), 8883);
        assert_eq!(parse_port(Some(""), 1883), 1883);
        assert_eq!(parse_port(Some("88a3"), 1883), 1883);
        assert_eq!(parse_port(Some("70000"), 1883), 1883);
        assert_eq!(parse_port(Some("0"), 1883), 1883);
    }

    #[test]
    fn network_config_subscribes_to_the_timer_feed() {
        let config = network_config();
        assert_eq!(config.broker.port, BROKER_PORT);
        assert!(config.broker.timer_topic().ends_with("/feeds/timer"));
        assert_eq!(config.wifi.ssid, WIFI_SSID);
    }
}
