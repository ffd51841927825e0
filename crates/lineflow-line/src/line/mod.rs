use std::{fmt, str::FromStr};

use serde::Serialize;

use crate::{InfoSpec, ScrapFactor, ScrapFactorError, StationAttribute, StationInfoValue};

pub use self::{assembly::AssemblyLine, multi_process::MultiProcess, waiting_time::WaitingTime};

mod assembly;
mod multi_process;
mod waiting_time;

/// Closed set of line variants the factory can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LineKind {
    PartDistribution,
    WorkerAssignment,
    ComplexLine,
    WaitingTime,
    WaitingTimeJump,
}

impl LineKind {
    pub const ALL: [Self; 5] = [
        Self::PartDistribution,
        Self::WorkerAssignment,
        Self::ComplexLine,
        Self::WaitingTime,
        Self::WaitingTimeJump,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PartDistribution => "part_distribution",
            Self::WorkerAssignment => "worker_assignment",
            Self::ComplexLine => "complex_line",
            Self::WaitingTime => "waiting_time",
            Self::WaitingTimeJump => "waiting_time_jump",
        }
    }

    /// Returns `true` if the variant is built for curriculum-driven scrap factors.
    #[must_use]
    pub const fn supports_curriculum(self) -> bool {
        matches!(self, Self::ComplexLine)
    }
}

impl fmt::Display for LineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown simulation `{name}`")]
pub struct UnknownSimulationError {
    pub name: String,
}

impl FromStr for LineKind {
    type Err = UnknownSimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| UnknownSimulationError { name: s.to_owned() })
    }
}

/// Counters accumulated over one or more ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StepReport {
    /// Ticks covered by the report.
    pub ticks: u32,
    /// Good parts that reached the sink.
    pub produced: u32,
    /// Parts scrapped at any station.
    pub scrapped: u32,
    /// Sum over ticks of the stations that were working.
    pub busy_station_ticks: u32,
    /// Sum over ticks of all stations.
    pub station_ticks: u32,
}

impl StepReport {
    pub fn merge(&mut self, other: Self) {
        self.ticks += other.ticks;
        self.produced += other.produced;
        self.scrapped += other.scrapped;
        self.busy_station_ticks += other.busy_station_ticks;
        self.station_ticks += other.station_ticks;
    }

    /// Fraction of station-ticks spent working.
    #[must_use]
    pub fn uptime(&self) -> f64 {
        if self.station_ticks == 0 {
            0.0
        } else {
            f64::from(self.busy_station_ticks) / f64::from(self.station_ticks)
        }
    }
}

/// A simulated production line.
///
/// Implementations own their random state; [`reset`](Line::reset) restarts the line with
/// a given seed but keeps the configuration, including the scrap factor.
pub trait Line: fmt::Debug + Send {
    fn kind(&self) -> LineKind;

    /// Ticks advanced by one [`step`](Line::step).
    fn step_size(&self) -> u32;

    /// Current simulation time in ticks.
    fn now(&self) -> u32;

    fn reset(&mut self, seed: u64);

    fn observation_len(&self) -> usize;

    /// Appends the current observation (`observation_len()` values) to `observation`.
    fn observe(&self, observation: &mut Vec<f64>);

    fn action_count(&self) -> usize;

    fn apply_action(&mut self, action: usize);

    /// Advances the line by one tick.
    fn tick(&mut self) -> StepReport;

    fn station_names(&self) -> Vec<String>;

    fn station_value(&self, station: &str, attribute: StationAttribute) -> Option<f64>;

    /// Station attributes reported at the end of each episode.
    fn info(&self) -> &InfoSpec;

    /// Current scrap factor, or `None` if the line never scraps parts.
    fn scrap_factor(&self) -> Option<ScrapFactor>;

    fn set_scrap_factor(&mut self, value: ScrapFactor) -> Result<(), ScrapFactorError>;

    fn clone_boxed(&self) -> BoxedLine;

    /// Applies `action` and advances the line by [`step_size`](Line::step_size) ticks.
    ///
    /// # Panics
    ///
    /// Panics if `action` is not below [`action_count`](Line::action_count).
    fn step(&mut self, action: usize) -> StepReport {
        assert!(
            action < self.action_count(),
            "action {action} out of range for {}",
            self.kind()
        );
        self.apply_action(action);
        let mut report = StepReport::default();
        for _ in 0..self.step_size() {
            report.merge(self.tick());
        }
        report
    }

    #[must_use]
    fn observation(&self) -> Vec<f64> {
        let mut observation = Vec::with_capacity(self.observation_len());
        self.observe(&mut observation);
        observation
    }

    /// Reads the values requested by [`info`](Line::info).
    #[must_use]
    fn info_values(&self) -> Vec<StationInfoValue> {
        self.info()
            .entries()
            .iter()
            .filter_map(|entry| {
                let value = self.station_value(&entry.station, entry.attribute)?;
                Some(StationInfoValue {
                    station: entry.station.clone(),
                    attribute: entry.attribute,
                    value,
                })
            })
            .collect()
    }
}

pub type BoxedLine = Box<dyn Line>;

impl Clone for BoxedLine {
    fn clone(&self) -> Self {
        self.clone_boxed()
    }
}

/// Period in ticks after which alternating lines swap their processing times.
pub(crate) const ALTERNATE_PERIOD: u32 = 1000;

pub(crate) fn station_index(station: &str, prefix: char, count: usize) -> Option<usize> {
    let index = station.strip_prefix(prefix)?.parse::<usize>().ok()?;
    (index < count).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in LineKind::ALL {
            assert_eq!(kind.name().parse::<LineKind>(), Ok(kind));
            assert_eq!(kind.to_string(), kind.name());
        }
    }

    #[test]
    fn test_unknown_kind() {
        let err = "assembly_line".parse::<LineKind>().unwrap_err();
        assert_eq!(err.name, "assembly_line");
        assert_eq!(err.to_string(), "unknown simulation `assembly_line`");
        assert!("Complex_Line".parse::<LineKind>().is_err());
    }

    #[test]
    fn test_only_complex_line_supports_curriculum() {
        let supported = LineKind::ALL
            .into_iter()
            .filter(|kind| kind.supports_curriculum())
            .collect::<Vec<_>>();
        assert_eq!(supported, vec![LineKind::ComplexLine]);
    }

    #[test]
    fn test_report_uptime() {
        let mut report = StepReport::default();
        assert_eq!(report.uptime(), 0.0);
        report.merge(StepReport {
            ticks: 1,
            produced: 1,
            scrapped: 0,
            busy_station_ticks: 1,
            station_ticks: 4,
        });
        report.merge(StepReport {
            ticks: 1,
            produced: 0,
            scrapped: 1,
            busy_station_ticks: 3,
            station_ticks: 4,
        });
        assert_eq!(report.ticks, 2);
        assert_eq!(report.produced, 1);
        assert_eq!(report.scrapped, 1);
        assert_eq!(report.uptime(), 0.5);
    }

    #[test]
    fn test_station_index() {
        assert_eq!(station_index("A1", 'A', 3), Some(1));
        assert_eq!(station_index("A3", 'A', 3), None);
        assert_eq!(station_index("P0", 'A', 3), None);
        assert_eq!(station_index("Ax", 'A', 3), None);
    }
}
