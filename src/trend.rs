use std::collections::VecDeque;

use crate::{config::TrendSettings, types::TrendLine};

pub const RATE_LABEL: &str = "PSI/MIN";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrendSample {
    /// Seconds since the link was opened.
    pub t_secs: f64,
    pub value: i32,
}

/// Rolling window for one monitored line.
#[derive(Clone, Debug)]
pub struct TrendWindow {
    samples: VecDeque<TrendSample>,
    settings: TrendSettings,
}

impl TrendWindow {
    pub fn new(settings: TrendSettings) -> Self {
        Self {
            samples: VecDeque::with_capacity(settings.capacity),
            settings,
        }
    }

    pub fn push(&mut self, t_secs: f64, value: i32) {
        self.samples.push_back(TrendSample { t_secs, value });
        while self.samples.len() > self.settings.capacity {
            self.samples.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<TrendSample> {
        self.samples.back().copied()
    }

    /// Mean of the oldest `rate_samples` minus mean of the newest
    /// `rate_samples`; positive while pressure is bleeding off. `None` until
    /// both ends of the window are populated without overlap.
    pub fn rolling_rate(&self) -> Option<f64> {
        let n = self.settings.rate_samples;
        if n == 0 || self.samples.len() < 2 * n {
            return None;
        }
        let oldest = mean(self.samples.iter().take(n));
        let newest = mean(self.samples.iter().rev().take(n));
        Some(oldest - newest)
    }

    /// The last `display` samples with the newest one withheld, so a live
    /// chart never draws a half-finished trailing segment.
    pub fn display_window(&self) -> Vec<TrendSample> {
        let end = self.samples.len().saturating_sub(1);
        let start = self.samples.len().saturating_sub(self.settings.display);
        self.samples
            .iter()
            .skip(start)
            .take(end.saturating_sub(start))
            .copied()
            .collect()
    }
}

fn mean<'a>(samples: impl Iterator<Item = &'a TrendSample>) -> f64 {
    let (sum, count) = samples.fold((0f64, 0usize), |(sum, count), s| {
        (sum + f64::from(s.value), count + 1)
    });
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Trend windows for the fuel and oxidizer lines. Created once at startup and
/// kept for the whole session.
#[derive(Clone, Debug)]
pub struct TrendBuffer {
    fuel: TrendWindow,
    oxidizer: TrendWindow,
}

impl TrendBuffer {
    pub fn new(settings: TrendSettings) -> Self {
        Self {
            fuel: TrendWindow::new(settings),
            oxidizer: TrendWindow::new(settings),
        }
    }

    pub fn window(&self, line: TrendLine) -> &TrendWindow {
        match line {
            TrendLine::Fuel => &self.fuel,
            TrendLine::Oxidizer => &self.oxidizer,
        }
    }

    fn window_mut(&mut self, line: TrendLine) -> &mut TrendWindow {
        match line {
            TrendLine::Fuel => &mut self.fuel,
            TrendLine::Oxidizer => &mut self.oxidizer,
        }
    }

    pub fn push(&mut self, line: TrendLine, t_secs: f64, value: i32) {
        self.window_mut(line).push(t_secs, value);
    }

    pub fn rolling_rate(&self, line: TrendLine) -> Option<f64> {
        self.window(line).rolling_rate()
    }

    pub fn display_window(&self, line: TrendLine) -> Vec<TrendSample> {
        self.window(line).display_window()
    }
}

impl Default for TrendBuffer {
    fn default() -> Self {
        Self::new(TrendSettings::default())
    }
}

pub fn format_rate(rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{RATE_LABEL}: {rate:.1}"),
        None => format!("{RATE_LABEL}: N/A"),
    }
}
