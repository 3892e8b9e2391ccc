use std::time::Instant;

use statig::blocking::IntoStateMachineExt as _;

use crate::{error::SessionError, types::ChannelId};

use super::actions::{DecayApplyStatus, DecayReport};
use super::events::{ChannelSample, DecayCommand, DecayPlan};
use super::machine::{DecayMachine, DecaySession, DispatchContext};

/// Where samples come from: the value currently shown for a channel.
pub trait ValueSource {
    fn current_value(&self, channel: ChannelId) -> Option<i32>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct DecayApplyResult {
    pub status: DecayApplyStatus,
    pub reports: Vec<DecayReport>,
}

impl DecayApplyResult {
    pub fn finished(&self) -> bool {
        matches!(
            self.status,
            DecayApplyStatus::Completed | DecayApplyStatus::Cancelled
        )
    }
}

/// Decay session driver: the state machine plus the repeating timer that
/// feeds it ticks.
pub struct DecayEngine {
    machine: statig::blocking::StateMachine<DecayMachine>,
    plan_channels: Vec<ChannelId>,
    next_due: Option<Instant>,
}

impl DecayEngine {
    pub fn new() -> Self {
        Self {
            machine: DecayMachine::new().state_machine(),
            plan_channels: Vec::new(),
            next_due: None,
        }
    }

    pub fn session(&self) -> &DecaySession {
        &self.machine.inner().session
    }

    pub fn is_active(&self) -> bool {
        self.session().active
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.next_due
    }

    pub fn apply(&mut self, command: DecayCommand) -> DecayApplyResult {
        let mut context = DispatchContext::default();
        self.machine.handle_with_context(&command, &mut context);
        DecayApplyResult {
            status: context.status,
            reports: context.reports,
        }
    }

    /// Starts a session at `now`, taking the first sample immediately and
    /// arming the timer for the next one.
    pub fn start(
        &mut self,
        plan: DecayPlan,
        link_ready: bool,
        source: &impl ValueSource,
        now: Instant,
    ) -> Result<DecayApplyResult, SessionError> {
        if self.is_active() {
            return Err(SessionError::AlreadyActive);
        }
        if !link_ready {
            return Err(SessionError::LinkNotReady);
        }
        let interval = plan.interval;
        let samples = sample_channels(&plan.channels, source);
        self.plan_channels = plan.channels.clone();
        let result = self.apply(DecayCommand::Start { plan, samples });
        self.next_due = if self.is_active() {
            Some(now + interval)
        } else {
            None
        };
        Ok(result)
    }

    /// Feeds one tick regardless of the timer.
    pub fn tick(&mut self, source: &impl ValueSource) -> DecayApplyResult {
        let samples = sample_channels(&self.plan_channels, source);
        let result = self.apply(DecayCommand::Tick { samples });
        if !self.is_active() {
            self.next_due = None;
        }
        result
    }

    /// Fires the timer when it is due. A late poll produces one tick and the
    /// next deadline lands on the first interval boundary after `now`.
    pub fn poll(&mut self, now: Instant, source: &impl ValueSource) -> Option<DecayApplyResult> {
        let due = self.next_due?;
        if now < due {
            return None;
        }
        let interval = self.session().interval;
        let mut next = due + interval;
        if interval.is_zero() {
            next = now;
        } else {
            while next <= now {
                next += interval;
            }
        }
        self.next_due = Some(next);
        Some(self.tick(source))
    }

    /// Stops the running session; its timer will not fire again.
    pub fn cancel(&mut self) -> Result<DecayApplyResult, SessionError> {
        let result = self.apply(DecayCommand::Cancel);
        self.next_due = None;
        match result.status {
            DecayApplyStatus::Rejected(err) => Err(err),
            _ => Ok(result),
        }
    }
}

impl Default for DecayEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn sample_channels(channels: &[ChannelId], source: &impl ValueSource) -> Vec<ChannelSample> {
    channels
        .iter()
        .map(|channel| ChannelSample {
            channel: *channel,
            value: source.current_value(*channel),
        })
        .collect()
}
