use core::fmt;
use std::time::Duration;

use crate::{error::SessionError, types::ChannelId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecayApplyStatus {
    Started,
    Sampled,
    Completed,
    Cancelled,
    /// A tick arrived with no session running.
    Ignored,
    Rejected(SessionError),
}

/// Report lines produced by the session, rendered for the operator log.
#[derive(Clone, Debug, PartialEq)]
pub enum DecayReport {
    Started {
        iterations: u32,
        interval: Duration,
    },
    Sampled {
        iteration: u32,
        readings: Vec<(ChannelId, i32)>,
        missing: Vec<ChannelId>,
    },
    Completed {
        averages: Vec<(ChannelId, Option<f64>)>,
    },
    Cancelled,
}

impl fmt::Display for DecayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started {
                iterations,
                interval,
            } => write!(
                f,
                "Decay Test: {iterations} iterations, {} seconds per iter.",
                interval.as_secs()
            ),
            Self::Sampled {
                iteration,
                readings,
                missing,
            } => {
                write!(f, "DT{iteration}:")?;
                for (channel, value) in readings {
                    write!(f, " {channel}-{value}")?;
                }
                for channel in missing {
                    write!(f, " {channel}-N/A")?;
                }
                Ok(())
            }
            Self::Completed { averages } => {
                f.write_str("Averages (PSI):")?;
                for (channel, average) in averages {
                    match average {
                        Some(avg) => write!(f, " {channel}-{avg:.2}")?,
                        None => write!(f, " {channel}-N/A")?,
                    }
                }
                f.write_str("\nDecay Test Complete.")
            }
            Self::Cancelled => f.write_str("Decay Test terminated early."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_render_operator_text() {
        let started = DecayReport::Started {
            iterations: 5,
            interval: Duration::from_secs(60),
        };
        assert_eq!(
            started.to_string(),
            "Decay Test: 5 iterations, 60 seconds per iter."
        );

        let sampled = DecayReport::Sampled {
            iteration: 4,
            readings: vec![(ChannelId(1), 210), (ChannelId(3), 198)],
            missing: vec![ChannelId(2)],
        };
        assert_eq!(sampled.to_string(), "DT4: PT1-210 PT3-198 PT2-N/A");

        let completed = DecayReport::Completed {
            averages: vec![(ChannelId(1), Some(-0.5)), (ChannelId(2), None)],
        };
        assert_eq!(
            completed.to_string(),
            "Averages (PSI): PT1--0.50 PT2-N/A\nDecay Test Complete."
        );
    }
}
