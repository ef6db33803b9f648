//! Remote-triggered alarm control loop.
//!
//! Every iteration polls the broker session for at most one message, applies
//! it to the alarm flag, then plays one sequencer step. A transport failure
//! while polling moves the loop into `Recovering`: the buzzer goes quiet, the
//! alarm flag is left alone, and the network manager's re-establish path is
//! retried every `reconnect_delay` until a session is back.

use core::fmt;

use crate::clock::{Clock, DelayNs};
use crate::config::NetworkConfig;
use crate::context::Context;
use crate::network::{Modem, NetworkSessionManager, PollError};
use crate::relay::{self, AlarmCommand};
use crate::sequencer::{ToneOutput, ToneSequencer};
use crate::telemetry::{AlarmEventKind, ErrorSite, EventSink};
use crate::tune::TuneTable;

/// Reason the loop could not start.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StartupError {
    AssociationFailed,
    SessionFailed,
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StartupError::AssociationFailed => "wifi association failed",
            StartupError::SessionFailed => "mqtt session failed",
        })
    }
}

/// Observable state of the control loop.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AlarmPhase {
    Idle,
    Alarming,
    /// Session lost; waiting to re-establish.
    Recovering,
}

/// Owned alarm state: the flag, the tune cursor, and the recovery marker.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AlarmSession {
    alarm: bool,
    sequencer: ToneSequencer,
    recovering: bool,
}

impl AlarmSession {
    pub const fn new(tune: TuneTable) -> Self {
        Self {
            alarm: false,
            sequencer: ToneSequencer::new(tune),
            recovering: false,
        }
    }

    pub const fn alarm(&self) -> bool {
        self.alarm
    }

    pub const fn cursor(&self) -> usize {
        self.sequencer.cursor()
    }

    pub const fn phase(&self) -> AlarmPhase {
        if self.recovering {
            AlarmPhase::Recovering
        } else if self.alarm {
            AlarmPhase::Alarming
        } else {
            AlarmPhase::Idle
        }
    }
}

/// Summary of one loop iteration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IterationReport {
    pub phase: AlarmPhase,
    pub command: Option<AlarmCommand>,
    pub cursor: usize,
}

/// Top-level driver wiring the network manager, relay, and sequencer.
pub struct AlarmLoop<M, T, D, C, S>
where
    M: Modem,
{
    network: NetworkSessionManager<M>,
    session: AlarmSession,
    tone: T,
    ctx: Context<D, C, S>,
}

impl<M, T, D, C, S> AlarmLoop<M, T, D, C, S>
where
    M: Modem,
    T: ToneOutput,
    D: DelayNs,
    C: Clock,
    S: EventSink,
{
    /// Associates, opens the broker session, and returns a ready loop.
    ///
    /// # Errors
    ///
    /// Fails when either layer exhausts its retries; the caller must not run
    /// the alarm without a session.
    pub fn start(
        modem: M,
        config: NetworkConfig,
        tune: TuneTable,
        mut tone: T,
        mut ctx: Context<D, C, S>,
    ) -> Result<Self, StartupError> {
        tone.silence();
        let mut network = NetworkSessionManager::new(modem, config);

        if !network.establish_association(&mut ctx) {
            return Err(StartupError::AssociationFailed);
        }
        if network.establish_session(&mut ctx).is_none() {
            return Err(StartupError::SessionFailed);
        }

        Ok(Self {
            network,
            session: AlarmSession::new(tune),
            tone,
            ctx,
        })
    }

    pub fn session(&self) -> &AlarmSession {
        &self.session
    }

    pub fn phase(&self) -> AlarmPhase {
        self.session.phase()
    }

    pub fn network(&self) -> &NetworkSessionManager<M> {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut NetworkSessionManager<M> {
        &mut self.network
    }

    pub fn tone(&self) -> &T {
        &self.tone
    }

    pub fn context(&self) -> &Context<D, C, S> {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut Context<D, C, S> {
        &mut self.ctx
    }

    /// Runs one pass of the loop.
    pub fn run_iteration(&mut self) -> IterationReport {
        if self.session.recovering {
            self.recover();
            return self.report(None);
        }

        let command = match self.network.poll_incoming() {
            Ok(Some(message)) => Some(self.apply(&message)),
            Ok(None) => None,
            Err(error) => {
                self.session_lost(&error);
                return self.report(None);
            }
        };

        self.session
            .sequencer
            .step(self.session.alarm, &mut self.tone, &mut self.ctx.delay);
        self.report(command)
    }

    /// Runs the loop forever.
    pub fn run(mut self) -> ! {
        loop {
            self.run_iteration();
        }
    }

    fn apply(&mut self, message: &relay::InboundMessage) -> AlarmCommand {
        let was_on = self.session.alarm;
        let command = relay::apply(message, &mut self.session.alarm);
        self.ctx.record(AlarmEventKind::MessageReceived { command });
        match (was_on, self.session.alarm) {
            (false, true) => {
                self.ctx.record(AlarmEventKind::AlarmTriggered);
            }
            (true, false) => {
                self.ctx.record(AlarmEventKind::AlarmCleared);
            }
            _ => {}
        }
        command
    }

    fn session_lost(&mut self, error: &PollError<M::SessionError>) {
        self.ctx.sink.transport_error(ErrorSite::Poll, error);
        self.ctx.record(AlarmEventKind::SessionLost);
        self.session.recovering = true;
        self.recover();
    }

    fn recover(&mut self) {
        // The cursor is kept so the tune resumes where it stopped.
        self.tone.silence();

        if self.network.reestablish(&mut self.ctx) {
            self.session.recovering = false;
            self.ctx.record(AlarmEventKind::ReconnectSucceeded);
        } else {
            let delay = self.network.config().reconnect.reconnect_delay;
            self.ctx.record(AlarmEventKind::ReconnectScheduled { delay });
            self.ctx.wait(delay);
        }
    }

    fn report(&self, command: Option<AlarmCommand>) -> IterationReport {
        IterationReport {
            phase: self.session.phase(),
            command,
            cursor: self.session.cursor(),
        }
    }
}
