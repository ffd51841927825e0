use lineflow_line::{ScrapFactor, ScrapFactorError};

use crate::LineEnv;

/// Scalar task difficulty of an environment, backed by the line's scrap factor.
pub trait Difficulty {
    /// Current difficulty, or `None` if the environment has no difficulty knob.
    fn difficulty(&self) -> Option<f64>;

    /// Sets the difficulty; values outside `[0, MAX_SCRAP_FACTOR]` are rejected.
    fn set_difficulty(&mut self, value: f64) -> Result<(), ScrapFactorError>;
}

impl Difficulty for LineEnv {
    fn difficulty(&self) -> Option<f64> {
        self.line().scrap_factor().map(ScrapFactor::get)
    }

    fn set_difficulty(&mut self, value: f64) -> Result<(), ScrapFactorError> {
        let factor = ScrapFactor::new(value)?;
        self.line_mut().set_scrap_factor(factor)
    }
}

/// Several environments that share one difficulty.
///
/// Reads report the first member; writes are validated once and then applied to
/// every member.
pub struct DifficultyGroup<'a> {
    members: Vec<&'a mut dyn Difficulty>,
}

impl<'a> DifficultyGroup<'a> {
    #[must_use]
    pub fn new(members: Vec<&'a mut dyn Difficulty>) -> Self {
        Self { members }
    }
}

impl Difficulty for DifficultyGroup<'_> {
    fn difficulty(&self) -> Option<f64> {
        self.members.first()?.difficulty()
    }

    fn set_difficulty(&mut self, value: f64) -> Result<(), ScrapFactorError> {
        let factor = ScrapFactor::new(value)?;
        for member in &mut self.members {
            member.set_difficulty(factor.get())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lineflow_line::{LineConfig, LineKind, make_line};

    use super::*;
    use crate::RewardKind;

    fn env(kind: LineKind) -> LineEnv {
        let config = LineConfig {
            curriculum: true,
            ..LineConfig::default()
        };
        LineEnv::new(make_line(kind, &config).unwrap(), 100, RewardKind::Parts)
    }

    #[test]
    fn test_line_env_difficulty() {
        let mut env = env(LineKind::ComplexLine);
        assert_eq!(env.difficulty(), Some(0.0));
        env.set_difficulty(0.3).unwrap();
        assert_eq!(env.difficulty(), Some(0.3));
        env.reset(1);
        assert_eq!(env.difficulty(), Some(0.3));
    }

    #[test]
    fn test_rejects_out_of_range() {
        let mut env = env(LineKind::ComplexLine);
        for value in [-0.01, 1.01, f64::NAN] {
            assert!(matches!(
                env.set_difficulty(value),
                Err(ScrapFactorError::OutOfRange { .. })
            ));
        }
        assert_eq!(env.difficulty(), Some(0.0));
    }

    #[test]
    fn test_unsupported_line() {
        let mut env = env(LineKind::PartDistribution);
        assert_eq!(env.difficulty(), None);
        assert_eq!(
            env.set_difficulty(0.1),
            Err(ScrapFactorError::Unsupported {
                kind: LineKind::PartDistribution
            })
        );
    }

    #[test]
    fn test_group_writes_all_members() {
        let mut train = env(LineKind::ComplexLine);
        let mut eval = env(LineKind::ComplexLine);
        {
            let members = vec![&mut train as &mut dyn Difficulty, &mut eval];
            let mut group = DifficultyGroup::new(members);
            group.set_difficulty(0.4).unwrap();
            assert_eq!(group.difficulty(), Some(0.4));
            assert!(group.set_difficulty(2.0).is_err());
        }
        assert_eq!(train.difficulty(), Some(0.4));
        assert_eq!(eval.difficulty(), Some(0.4));
    }
}
