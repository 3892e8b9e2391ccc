use std::time::Duration;

use statig::prelude::*;

use crate::{error::SessionError, types::ChannelId};

use super::actions::{DecayApplyStatus, DecayReport};
use super::events::{ChannelSample, DecayCommand, DecayPlan};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelHistory {
    pub channel: ChannelId,
    pub readings: Vec<i32>,
}

impl ChannelHistory {
    /// Mean of consecutive differences; `None` with fewer than two readings.
    pub fn average_delta(&self) -> Option<f64> {
        if self.readings.len() < 2 {
            return None;
        }
        let deltas: Vec<f64> = self
            .readings
            .windows(2)
            .map(|pair| f64::from(pair[1]) - f64::from(pair[0]))
            .collect();
        Some(deltas.iter().sum::<f64>() / deltas.len() as f64)
    }
}

/// Data carried by the decay state machine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DecaySession {
    pub active: bool,
    pub remaining: u32,
    pub interval: Duration,
    pub history: Vec<ChannelHistory>,
    pub averages: Vec<(ChannelId, Option<f64>)>,
}

impl DecaySession {
    fn begin(&mut self, plan: &DecayPlan) {
        *self = Self {
            active: true,
            remaining: plan.iterations,
            interval: plan.interval,
            history: plan
                .channels
                .iter()
                .map(|channel| ChannelHistory {
                    channel: *channel,
                    readings: Vec::new(),
                })
                .collect(),
            averages: Vec::new(),
        };
    }

    fn record(&mut self, samples: &[ChannelSample]) -> DecayReport {
        let iteration = self.remaining;
        let mut readings = Vec::new();
        let mut missing = Vec::new();
        for history in &mut self.history {
            let value = samples
                .iter()
                .find(|s| s.channel == history.channel)
                .and_then(|s| s.value);
            match value {
                Some(value) => {
                    history.readings.push(value);
                    readings.push((history.channel, value));
                }
                None => missing.push(history.channel),
            }
        }
        self.remaining = self.remaining.saturating_sub(1);
        DecayReport::Sampled {
            iteration,
            readings,
            missing,
        }
    }

    fn finish(&mut self) {
        self.active = false;
        self.remaining = 0;
    }
}

pub(super) struct DecayMachine {
    pub(super) session: DecaySession,
}

pub(super) struct DispatchContext {
    pub(super) status: DecayApplyStatus,
    pub(super) reports: Vec<DecayReport>,
}

impl Default for DispatchContext {
    fn default() -> Self {
        Self {
            status: DecayApplyStatus::Ignored,
            reports: Vec::new(),
        }
    }
}

impl DecayMachine {
    pub(super) fn new() -> Self {
        Self {
            session: DecaySession::default(),
        }
    }

    /// One timer step: sample while iterations remain, summarize once they
    /// run out. Returns true when the session completed.
    fn step(&mut self, context: &mut DispatchContext, samples: &[ChannelSample]) -> bool {
        if self.session.remaining == 0 {
            let averages: Vec<_> = self
                .session
                .history
                .iter()
                .map(|h| (h.channel, h.average_delta()))
                .collect();
            self.session.averages = averages.clone();
            self.session.finish();
            context.reports.push(DecayReport::Completed { averages });
            context.status = DecayApplyStatus::Completed;
            return true;
        }
        let report = self.session.record(samples);
        context.reports.push(report);
        context.status = DecayApplyStatus::Sampled;
        false
    }
}

#[state_machine(initial = "State::inactive()")]
impl DecayMachine {
    #[state]
    fn inactive(&mut self, context: &mut DispatchContext, event: &DecayCommand) -> Outcome<State> {
        match event {
            DecayCommand::Start { plan, samples } => {
                self.session.begin(plan);
                context.reports.push(DecayReport::Started {
                    iterations: plan.iterations,
                    interval: plan.interval,
                });
                // Iteration zero is taken right away rather than on the
                // first timer expiry.
                if self.step(context, samples) {
                    return Handled;
                }
                context.status = DecayApplyStatus::Started;
                Transition(State::running())
            }
            DecayCommand::Tick { .. } => {
                context.status = DecayApplyStatus::Ignored;
                Handled
            }
            DecayCommand::Cancel => {
                context.status = DecayApplyStatus::Rejected(SessionError::NotActive);
                Handled
            }
        }
    }

    #[state]
    fn running(&mut self, context: &mut DispatchContext, event: &DecayCommand) -> Outcome<State> {
        match event {
            DecayCommand::Start { .. } => {
                context.status = DecayApplyStatus::Rejected(SessionError::AlreadyActive);
                Handled
            }
            DecayCommand::Tick { samples } => {
                if self.step(context, samples) {
                    Transition(State::inactive())
                } else {
                    Handled
                }
            }
            DecayCommand::Cancel => {
                self.session.finish();
                context.reports.push(DecayReport::Cancelled);
                context.status = DecayApplyStatus::Cancelled;
                Transition(State::inactive())
            }
        }
    }
}
