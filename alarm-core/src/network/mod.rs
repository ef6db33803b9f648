//! Wireless association and broker session supervision.
//!
//! [`NetworkSessionManager`] owns the modem and the single [`ConnectionState`].
//! Both layers are established with bounded retries: association first, then
//! the broker session. A session handle is only ever opened while the
//! association is `Connected`, and a new handle always replaces the old one.

use core::{fmt, net::Ipv4Addr};

use heapless::String;

use crate::clock::{Clock, DelayNs};
use crate::config::{BrokerConfig, MAX_TOPIC_LEN, NetworkConfig, WifiCredentials};
use crate::context::Context;
use crate::relay::InboundMessage;
use crate::telemetry::{AlarmEventKind, ErrorSite, EventSink};

/// Length of `esp32_` plus twelve hex digits.
pub const CLIENT_ID_LEN: usize = 18;
const CLIENT_ID_PREFIX: &str = "esp32_";

/// Hardware (MAC) address of the wireless adapter.
pub type HardwareAddress = [u8; 6];

/// Client identity presented to the broker.
pub type ClientId = String<CLIENT_ID_LEN>;

/// Link-layer capability: joining and leaving the wireless network.
pub trait Association {
    type LinkError: Copy + fmt::Debug;

    /// Starts joining the network described by `credentials`.
    fn connect(&mut self, credentials: &WifiCredentials) -> Result<(), Self::LinkError>;

    /// Reports whether the adapter is joined and has an address.
    fn is_connected(&mut self) -> Result<bool, Self::LinkError>;

    fn disconnect(&mut self) -> Result<(), Self::LinkError>;

    /// Address assigned to the adapter, when known.
    fn local_address(&mut self) -> Option<Ipv4Addr>;

    fn hardware_address(&mut self) -> Result<HardwareAddress, Self::LinkError>;
}

/// Parameters for opening a broker session.
#[derive(Copy, Clone, Debug)]
pub struct SessionRequest<'a> {
    pub client_id: &'a str,
    pub broker: &'a BrokerConfig,
}

/// Publish/subscribe capability layered over an association.
pub trait SessionTransport {
    type Handle;
    type SessionError: Copy + fmt::Debug;

    fn open(&mut self, request: &SessionRequest<'_>) -> Result<Self::Handle, Self::SessionError>;

    fn subscribe(&mut self, handle: &mut Self::Handle, topic: &str)
    -> Result<(), Self::SessionError>;

    /// Returns at most one pending message without blocking.
    fn poll_incoming(
        &mut self,
        handle: &mut Self::Handle,
    ) -> Result<Option<InboundMessage>, Self::SessionError>;

    /// Releases a handle. Errors are ignored; the handle is gone either way.
    fn close(&mut self, handle: Self::Handle);
}

/// A wireless adapter providing both capabilities.
pub trait Modem: Association + SessionTransport {}

impl<T: Association + SessionTransport> Modem for T {}

/// Link-layer status as tracked by the manager.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AssociationStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// Step of a session attempt that failed.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SessionStage {
    /// The association was not up, so no session was attempted.
    NotAssociated,
    /// The hardware address needed for the client id was unavailable.
    Identity,
    Connect,
    Subscribe,
}

impl fmt::Display for SessionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionStage::NotAssociated => "not-associated",
            SessionStage::Identity => "identity",
            SessionStage::Connect => "connect",
            SessionStage::Subscribe => "subscribe",
        })
    }
}

/// Error returned when polling for inbound messages.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PollError<E> {
    /// No session is open.
    NoSession,
    Transport(E),
}

/// Process-wide connection state.
#[derive(Debug)]
pub struct ConnectionState<H> {
    association_status: AssociationStatus,
    session: Option<H>,
}

impl<H> ConnectionState<H> {
    pub const fn new() -> Self {
        Self {
            association_status: AssociationStatus::Disconnected,
            session: None,
        }
    }

    pub const fn association_status(&self) -> AssociationStatus {
        self.association_status
    }

    pub const fn session(&self) -> Option<&H> {
        self.session.as_ref()
    }

    pub const fn has_session(&self) -> bool {
        self.session.is_some()
    }
}

impl<H> Default for ConnectionState<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Formats `esp32_` followed by the lowercase hex of `address`.
#[must_use]
pub fn client_id(address: &HardwareAddress) -> ClientId {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut id = ClientId::new();
    // Capacity is exactly prefix plus twelve digits.
    let _ = id.push_str(CLIENT_ID_PREFIX);
    for byte in address {
        let _ = id.push(char::from(HEX[usize::from(byte >> 4)]));
        let _ = id.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    id
}

/// Establishes and supervises the association and broker session.
pub struct NetworkSessionManager<M: Modem> {
    modem: M,
    config: NetworkConfig,
    state: ConnectionState<M::Handle>,
    client_id: Option<ClientId>,
    topic: String<MAX_TOPIC_LEN>,
}

impl<M: Modem> NetworkSessionManager<M> {
    pub fn new(modem: M, config: NetworkConfig) -> Self {
        let client_id = config.broker.client_id.map(|fixed| {
            let mut id = ClientId::new();
            for ch in fixed.chars() {
                if id.push(ch).is_err() {
                    break;
                }
            }
            id
        });
        Self {
            modem,
            topic: config.broker.timer_topic(),
            config,
            state: ConnectionState::new(),
            client_id,
        }
    }

    pub fn state(&self) -> &ConnectionState<M::Handle> {
        &self.state
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    pub fn modem(&self) -> &M {
        &self.modem
    }

    pub fn modem_mut(&mut self) -> &mut M {
        &mut self.modem
    }

    /// Joins the wireless network, returning `true` once connected.
    ///
    /// An existing association is dropped first and given the settle delay.
    /// Each attempt polls `is_connected` every `poll_interval` until
    /// `attempt_timeout`; attempts are separated by `retry_delay`.
    pub fn establish_association<D, C, S>(&mut self, ctx: &mut Context<D, C, S>) -> bool
    where
        D: DelayNs,
        C: Clock,
        S: EventSink,
    {
        let policy = self.config.association;

        if self.state.association_status == AssociationStatus::Connected
            || matches!(self.modem.is_connected(), Ok(true))
        {
            self.discard_session();
            if let Err(error) = self.modem.disconnect() {
                ctx.sink.transport_error(ErrorSite::Association, &error);
            }
            self.state.association_status = AssociationStatus::Disconnected;
            ctx.record(AlarmEventKind::AssociationReset);
            ctx.wait(policy.settle_delay);
        }

        let polls = policy.polls_per_attempt();
        for attempt in 1..=policy.max_attempts {
            self.state.association_status = AssociationStatus::Connecting;
            ctx.record(AlarmEventKind::AssociationAttempt { attempt });

            match self.modem.connect(&self.config.wifi) {
                Ok(()) => {
                    if self.await_link(ctx, polls) {
                        self.state.association_status = AssociationStatus::Connected;
                        let address = self.modem.local_address();
                        ctx.record(AlarmEventKind::AssociationConnected { address });
                        return true;
                    }
                    ctx.record(AlarmEventKind::AssociationTimedOut { attempt });
                }
                Err(error) => {
                    ctx.sink.transport_error(ErrorSite::Association, &error);
                    ctx.record(AlarmEventKind::AssociationError { attempt });
                }
            }

            self.state.association_status = AssociationStatus::Disconnected;
            if attempt < policy.max_attempts {
                ctx.wait(policy.retry_delay);
            }
        }

        ctx.record(AlarmEventKind::AssociationFailed {
            attempts: policy.max_attempts,
        });
        false
    }

    fn await_link<D, C, S>(&mut self, ctx: &mut Context<D, C, S>, polls: u32) -> bool
    where
        D: DelayNs,
        C: Clock,
        S: EventSink,
    {
        for _ in 0..polls {
            match self.modem.is_connected() {
                Ok(true) => return true,
                Ok(false) => {}
                Err(error) => ctx.sink.transport_error(ErrorSite::Association, &error),
            }
            ctx.wait(self.config.association.poll_interval);
        }
        false
    }

    /// Opens a broker session and subscribes to the timer topic.
    ///
    /// Any previous handle is closed first. Returns the new handle, or `None`
    /// once `max_attempts` attempts have failed.
    pub fn establish_session<D, C, S>(
        &mut self,
        ctx: &mut Context<D, C, S>,
    ) -> Option<&mut M::Handle>
    where
        D: DelayNs,
        C: Clock,
        S: EventSink,
    {
        self.discard_session();
        let policy = self.config.session;

        for attempt in 1..=policy.max_attempts {
            ctx.record(AlarmEventKind::SessionAttempt { attempt });
            match self.try_open_session(ctx) {
                Ok(handle) => {
                    self.state.session = Some(handle);
                    ctx.record(AlarmEventKind::SessionConnected);
                    return self.state.session.as_mut();
                }
                Err(stage) => {
                    ctx.record(AlarmEventKind::SessionAttemptFailed { attempt, stage });
                    if attempt < policy.max_attempts {
                        ctx.wait(policy.retry_delay);
                    }
                }
            }
        }

        ctx.record(AlarmEventKind::SessionFailed {
            attempts: policy.max_attempts,
        });
        None
    }

    fn try_open_session<D, C, S>(
        &mut self,
        ctx: &mut Context<D, C, S>,
    ) -> Result<M::Handle, SessionStage>
    where
        D: DelayNs,
        C: Clock,
        S: EventSink,
    {
        if self.state.association_status != AssociationStatus::Connected {
            return Err(SessionStage::NotAssociated);
        }

        let client_id = match &self.client_id {
            Some(id) => id.clone(),
            None => match self.modem.hardware_address() {
                Ok(address) => {
                    let id = client_id(&address);
                    self.client_id = Some(id.clone());
                    id
                }
                Err(error) => {
                    ctx.sink
                        .transport_error(ErrorSite::Session(SessionStage::Identity), &error);
                    return Err(SessionStage::Identity);
                }
            },
        };

        let request = SessionRequest {
            client_id: &client_id,
            broker: &self.config.broker,
        };
        let mut handle = match self.modem.open(&request) {
            Ok(handle) => handle,
            Err(error) => {
                ctx.sink
                    .transport_error(ErrorSite::Session(SessionStage::Connect), &error);
                return Err(SessionStage::Connect);
            }
        };

        if let Err(error) = self.modem.subscribe(&mut handle, &self.topic) {
            ctx.sink
                .transport_error(ErrorSite::Session(SessionStage::Subscribe), &error);
            self.modem.close(handle);
            return Err(SessionStage::Subscribe);
        }

        Ok(handle)
    }

    /// Full re-establish path used after a session loss.
    ///
    /// Re-joins the network first when the link layer dropped too. Returns
    /// `true` once a fresh session is subscribed.
    pub fn reestablish<D, C, S>(&mut self, ctx: &mut Context<D, C, S>) -> bool
    where
        D: DelayNs,
        C: Clock,
        S: EventSink,
    {
        self.discard_session();

        match self.modem.is_connected() {
            Ok(true) => self.state.association_status = AssociationStatus::Connected,
            linked => {
                if let Err(error) = linked {
                    ctx.sink.transport_error(ErrorSite::Association, &error);
                }
                self.state.association_status = AssociationStatus::Disconnected;
                ctx.record(AlarmEventKind::AssociationLost);
                if !self.establish_association(ctx) {
                    return false;
                }
            }
        }

        self.establish_session(ctx).is_some()
    }

    /// Checks the open session for one inbound message.
    pub fn poll_incoming(
        &mut self,
    ) -> Result<Option<InboundMessage>, PollError<M::SessionError>> {
        let handle = self.state.session.as_mut().ok_or(PollError::NoSession)?;
        self.modem.poll_incoming(handle).map_err(PollError::Transport)
    }

    /// Closes and forgets the current session handle, if any.
    pub fn discard_session(&mut self) {
        if let Some(handle) = self.state.session.take() {
            self.modem.close(handle);
        }
    }
}
