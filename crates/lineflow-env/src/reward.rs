use lineflow_line::StepReport;
use serde::Serialize;

/// How a step of the line is scored.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, derive_more::FromStr, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Good parts minus scrapped parts.
    #[default]
    Parts,
    /// Fraction of station-ticks spent working.
    Uptime,
}

impl RewardKind {
    #[must_use]
    pub fn reward(self, report: &StepReport) -> f64 {
        match self {
            Self::Parts => f64::from(report.produced) - f64::from(report.scrapped),
            Self::Uptime => report.uptime(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!("parts".parse::<RewardKind>().unwrap(), RewardKind::Parts);
        assert_eq!("uptime".parse::<RewardKind>().unwrap(), RewardKind::Uptime);
        assert!("throughput".parse::<RewardKind>().is_err());
    }

    #[test]
    fn test_reward() {
        let report = StepReport {
            ticks: 2,
            produced: 3,
            scrapped: 1,
            busy_station_ticks: 3,
            station_ticks: 4,
        };
        assert_eq!(RewardKind::Parts.reward(&report), 2.0);
        assert_eq!(RewardKind::Uptime.reward(&report), 0.75);

        let scrapped = StepReport {
            scrapped: 2,
            ..StepReport::default()
        };
        assert_eq!(RewardKind::Parts.reward(&scrapped), -2.0);
    }
}
