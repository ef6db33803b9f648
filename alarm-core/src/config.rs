//! Compiled-in configuration for the alarm buzzer and joystick demos.
//!
//! Credentials are supplied by the binary crates (the firmware reads them
//! from the build environment); everything else is fixed timing and wiring
//! data expressed as plain constants and `Copy` policy structs.

use core::time::Duration;

/// Number of association attempts before giving up.
pub const ASSOCIATION_MAX_ATTEMPTS: u8 = 3;
/// How long a single association attempt may take.
pub const ASSOCIATION_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);
/// Interval between `is_connected` checks within one attempt.
pub const ASSOCIATION_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Pause between failed association attempts.
pub const ASSOCIATION_RETRY_DELAY: Duration = Duration::from_secs(2);
/// Settle time after forcing a disassociation.
pub const ASSOCIATION_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Number of broker session attempts before giving up.
pub const SESSION_MAX_ATTEMPTS: u8 = 3;
/// Pause between failed session attempts.
pub const SESSION_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Wait after a failed mid-run reconnect before trying again.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// Default broker host (Adafruit IO).
pub const DEFAULT_BROKER_HOST: &str = "io.adafruit.com";
/// Default plain-text MQTT port.
pub const DEFAULT_BROKER_PORT: u16 = 1883;
/// Feed path appended to the username to form the subscribed topic.
pub const TIMER_FEED_SUFFIX: &str = "/feeds/timer";
/// Longest topic the firmware stores.
pub const MAX_TOPIC_LEN: usize = 96;

/// ADC reading of a centred joystick axis.
pub const JOYSTICK_CENTER: u16 = 2000;
/// Distance from centre an axis must exceed to register a direction.
pub const JOYSTICK_THRESHOLD: u16 = 500;
/// Joystick polling period.
pub const JOYSTICK_POLL_PERIOD: Duration = Duration::from_millis(100);
/// Minimum interval between two honoured switch presses.
pub const SWITCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Credentials for the wireless link.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct WifiCredentials {
    pub ssid: &'static str,
    pub password: &'static str,
}

impl WifiCredentials {
    pub const fn new(ssid: &'static str, password: &'static str) -> Self {
        Self { ssid, password }
    }
}

/// Broker address and login.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BrokerConfig {
    pub host: &'static str,
    pub port: u16,
    pub username: &'static str,
    pub key: &'static str,
    /// Fixed client identity; derived from the hardware address when `None`.
    pub client_id: Option<&'static str>,
}

impl BrokerConfig {
    /// Creates a configuration for the default Adafruit IO broker.
    pub const fn adafruit(username: &'static str, key: &'static str) -> Self {
        Self {
            host: DEFAULT_BROKER_HOST,
            port: DEFAULT_BROKER_PORT,
            username,
            key,
            client_id: None,
        }
    }

    /// Builds the `<username>/feeds/timer` topic the alarm listens on.
    pub fn timer_topic(&self) -> heapless::String<MAX_TOPIC_LEN> {
        let mut topic = heapless::String::new();
        // Overlong usernames truncate; the broker then rejects the subscribe.
        for part in [self.username, TIMER_FEED_SUFFIX] {
            for ch in part.chars() {
                if topic.push(ch).is_err() {
                    return topic;
                }
            }
        }
        topic
    }
}

/// Retry behaviour for joining the wireless network.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AssociationPolicy {
    pub max_attempts: u8,
    pub attempt_timeout: Duration,
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub settle_delay: Duration,
}

impl AssociationPolicy {
    /// Number of `is_connected` polls that fit in one attempt (at least one).
    pub fn polls_per_attempt(&self) -> u32 {
        if self.poll_interval.is_zero() {
            return 1;
        }
        let polls = self.attempt_timeout.as_millis() / self.poll_interval.as_millis().max(1);
        u32::try_from(polls).unwrap_or(u32::MAX).max(1)
    }
}

impl Default for AssociationPolicy {
    fn default() -> Self {
        Self {
            max_attempts: ASSOCIATION_MAX_ATTEMPTS,
            attempt_timeout: ASSOCIATION_ATTEMPT_TIMEOUT,
            poll_interval: ASSOCIATION_POLL_INTERVAL,
            retry_delay: ASSOCIATION_RETRY_DELAY,
            settle_delay: ASSOCIATION_SETTLE_DELAY,
        }
    }
}

/// Retry behaviour for opening the broker session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SessionPolicy {
    pub max_attempts: u8,
    pub retry_delay: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            max_attempts: SESSION_MAX_ATTEMPTS,
            retry_delay: SESSION_RETRY_DELAY,
        }
    }
}

/// Behaviour of the control loop after it loses the broker session.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ReconnectPolicy {
    pub reconnect_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Complete network configuration consumed by the session manager.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NetworkConfig {
    pub wifi: WifiCredentials,
    pub broker: BrokerConfig,
    pub association: AssociationPolicy,
    pub session: SessionPolicy,
    pub reconnect: ReconnectPolicy,
}

impl NetworkConfig {
    /// Creates a configuration with the default retry policies.
    pub fn new(wifi: WifiCredentials, broker: BrokerConfig) -> Self {
        Self {
            wifi,
            broker,
            association: AssociationPolicy::default(),
            session: SessionPolicy::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
