use std::time::Duration;

use crate::{config::DecaySettings, types::ChannelId};

/// What the operator asked for: how many samples, how far apart, on which
/// transducers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecayPlan {
    pub iterations: u32,
    pub interval: Duration,
    pub channels: Vec<ChannelId>,
}

impl From<&DecaySettings> for DecayPlan {
    fn from(settings: &DecaySettings) -> Self {
        Self {
            iterations: settings.iterations,
            interval: settings.interval,
            channels: settings.channels.clone(),
        }
    }
}

/// Current displayed value of one channel, `None` when it is not numeric.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSample {
    pub channel: ChannelId,
    pub value: Option<i32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DecayCommand {
    Start {
        plan: DecayPlan,
        samples: Vec<ChannelSample>,
    },
    Tick {
        samples: Vec<ChannelSample>,
    },
    Cancel,
}
