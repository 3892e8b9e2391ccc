use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Idle,
    SystemChecks,
    HighPressure,
    TankHighPressure,
    Fire,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::Idle,
        Stage::SystemChecks,
        Stage::HighPressure,
        Stage::TankHighPressure,
        Stage::Fire,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::SystemChecks => "SYSTEM CHECKS",
            Self::HighPressure => "HIGH PRESSURE",
            Self::TankHighPressure => "TANK HIGH PRESSURE",
            Self::Fire => "FIRE",
        }
    }

    fn index(self) -> usize {
        self as usize
    }

    fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }

    fn previous(self) -> Option<Self> {
        self.index().checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StageChange {
    Advanced(Stage),
    Returned(Stage),
    Aborted,
}

impl fmt::Display for StageChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Advanced(stage) => write!(f, "Advance to: {stage}"),
            Self::Returned(stage) => write!(f, "Return to: {stage}"),
            Self::Aborted => f.write_str("System abort executed."),
        }
    }
}

/// Operator launch checklist. Ignition and main-valve commands are only
/// accepted at the final stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchSequence {
    stage: Stage,
    aborted: bool,
}

impl LaunchSequence {
    pub fn new() -> Self {
        Self {
            stage: Stage::Idle,
            aborted: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn at_final_stage(&self) -> bool {
        self.stage == Stage::Fire
    }

    pub fn advance(&mut self) -> Option<StageChange> {
        if self.aborted {
            return None;
        }
        let next = self.stage.next()?;
        self.stage = next;
        Some(StageChange::Advanced(next))
    }

    /// Clears the abort latch and steps back one stage. Refused at IDLE,
    /// where the latch is still cleared.
    pub fn retreat(&mut self) -> Option<StageChange> {
        self.aborted = false;
        let previous = self.stage.previous()?;
        self.stage = previous;
        Some(StageChange::Returned(previous))
    }

    /// Latches the abort. Returns `None` at IDLE or when already latched.
    pub fn abort(&mut self) -> Option<StageChange> {
        if self.aborted || self.stage == Stage::Idle {
            return None;
        }
        self.aborted = true;
        Some(StageChange::Aborted)
    }
}

impl Default for LaunchSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advances_through_every_stage_and_stops_at_fire() {
        let mut sequence = LaunchSequence::new();
        let reports: Vec<String> = std::iter::from_fn(|| sequence.advance())
            .map(|change| change.to_string())
            .collect();
        assert_eq!(
            reports,
            vec![
                "Advance to: SYSTEM CHECKS",
                "Advance to: HIGH PRESSURE",
                "Advance to: TANK HIGH PRESSURE",
                "Advance to: FIRE",
            ]
        );
        assert!(sequence.at_final_stage());
        assert_eq!(sequence.advance(), None);
    }

    #[test]
    fn retreat_refused_at_idle() {
        let mut sequence = LaunchSequence::new();
        assert_eq!(sequence.retreat(), None);
        assert_eq!(sequence.stage(), Stage::Idle);
    }

    #[test]
    fn abort_latches_until_retreat() {
        let mut sequence = LaunchSequence::new();
        assert_eq!(sequence.abort(), None);
        sequence.advance();
        sequence.advance();
        assert_eq!(sequence.abort(), Some(StageChange::Aborted));
        assert_eq!(sequence.abort(), None);
        assert_eq!(sequence.advance(), None);

        let change = sequence.retreat().expect("retreat clears abort");
        assert_eq!(change.to_string(), "Return to: SYSTEM CHECKS");
        assert_eq!(sequence.stage(), Stage::SystemChecks);
        assert!(!sequence.is_aborted());
        assert!(sequence.advance().is_some());
    }

    #[test]
    fn retreat_after_abort_also_steps_back() {
        let mut sequence = LaunchSequence::new();
        sequence.advance();
        assert_eq!(sequence.abort(), Some(StageChange::Aborted));
        assert_eq!(sequence.retreat(), Some(StageChange::Returned(Stage::Idle)));
        assert_eq!(sequence.stage(), Stage::Idle);
        assert!(!sequence.is_aborted());
    }
}
