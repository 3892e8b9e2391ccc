//! Pressure decay test: sample a set of transducers on a fixed interval and
//! report the mean change between consecutive samples.

pub mod actions;
pub mod engine;
pub mod events;
mod machine;

pub use actions::{DecayApplyStatus, DecayReport};
pub use engine::{DecayApplyResult, DecayEngine, ValueSource};
pub use events::{ChannelSample, DecayCommand, DecayPlan};
pub use machine::{ChannelHistory, DecaySession};
