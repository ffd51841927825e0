//! Curriculum learning on the scrap factor.
//!
//! The controller watches the mean reward of every evaluation and raises the
//! difficulty of the linked environments once the task is solved consistently:
//!
//! 1. the reward is pushed into a rolling history of the last `look_back` rewards;
//! 2. while the history is not full, nothing happens;
//! 3. if every reward in the full history is strictly above `threshold`, the difficulty
//!    rises by `update` (clamped to `factor_max`) and the history is cleared, so the
//!    next raise needs `look_back` fresh passing evaluations at the new level;
//! 4. otherwise the history is kept and keeps sliding.
//!
//! The decision itself is the pure function [`decide`]; [`CurriculumController`] applies
//! its result to a [`Difficulty`] target.

use lineflow_env::Difficulty;
use lineflow_line::{MAX_SCRAP_FACTOR, ScrapFactorError};
use lineflow_stats::window::RollingWindow;
use log::{debug, info, warn};
use serde::Serialize;

use crate::EvalObserver;

/// Lowest difficulty any environment accepts.
pub const MIN_DIFFICULTY: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurriculumConfig {
    /// Reward every sample of the history has to exceed.
    pub threshold: f64,
    /// Difficulty increase per raise.
    pub update: f64,
    /// Upper bound of the difficulty.
    pub factor_max: f64,
    /// Number of consecutive evaluations considered.
    pub look_back: usize,
}

impl CurriculumConfig {
    /// Settings for a line of `n_cells` cells: the difficulty climbs to `1 / n_cells` in
    /// five raises.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineflow_learning::CurriculumConfig;
    ///
    /// let config = CurriculumConfig::for_cells(4, 100.0, 3);
    /// assert_eq!(config.factor_max, 0.25);
    /// assert_eq!(config.update, 0.05);
    /// ```
    #[must_use]
    #[expect(clippy::cast_precision_loss)]
    pub fn for_cells(n_cells: usize, threshold: f64, look_back: usize) -> Self {
        let factor_max = 1.0 / n_cells as f64;
        Self {
            threshold,
            update: factor_max / 5.0,
            factor_max,
            look_back,
        }
    }

    pub fn validate(&self) -> Result<(), CurriculumConfigError> {
        let Self {
            threshold,
            update,
            factor_max,
            look_back,
        } = *self;
        if look_back == 0 {
            return Err(CurriculumConfigError::ZeroLookBack);
        }
        if !(update.is_finite() && update > 0.0) {
            return Err(CurriculumConfigError::NonPositiveUpdate { update });
        }
        if !(factor_max.is_finite() && (MIN_DIFFICULTY..=MAX_SCRAP_FACTOR).contains(&factor_max))
        {
            return Err(CurriculumConfigError::FactorMaxOutOfRange { factor_max });
        }
        if !threshold.is_finite() {
            return Err(CurriculumConfigError::NonFiniteThreshold { threshold });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, derive_more::Display, derive_more::Error)]
pub enum CurriculumConfigError {
    #[display("curriculum look-back must be at least 1")]
    ZeroLookBack,
    #[display("curriculum update must be positive and finite, got {update}")]
    NonPositiveUpdate { update: f64 },
    #[display("curriculum factor_max must lie in [0, 1], got {factor_max}")]
    FactorMaxOutOfRange { factor_max: f64 },
    #[display("curriculum threshold must be finite, got {threshold}")]
    NonFiniteThreshold { threshold: f64 },
}

/// Pushes `reward` into `history` and returns the new history with the difficulty
/// increase it calls for (`0.0` or `config.update`).
///
/// The history is first resized to `config.look_back` samples, dropping the oldest
/// ones, whatever capacity the caller created it with. A zero `look_back` is treated
/// as one.
///
/// # Examples
///
/// ```
/// use lineflow_learning::{CurriculumConfig, decide};
/// use lineflow_stats::window::RollingWindow;
///
/// let config = CurriculumConfig { threshold: 100.0, update: 0.1, factor_max: 0.5, look_back: 2 };
/// let (history, delta) = decide(RollingWindow::new(2), 120.0, &config);
/// assert_eq!((history.len(), delta), (1, 0.0));
/// let (history, delta) = decide(history, 130.0, &config);
/// assert_eq!((history.len(), delta), (0, 0.1));
/// ```
#[must_use]
pub fn decide(
    mut history: RollingWindow<f64>,
    reward: f64,
    config: &CurriculumConfig,
) -> (RollingWindow<f64>, f64) {
    let look_back = config.look_back.max(1);
    if history.capacity() != look_back {
        history.resize(look_back);
    }
    history.push(reward);
    if history.len() < look_back {
        return (history, 0.0);
    }
    if history.iter().all(|&sample| sample > config.threshold) {
        history.clear();
        return (history, config.update);
    }
    (history, 0.0)
}

/// [`EvalObserver`] raising the difficulty of its target according to [`decide`].
#[derive(Debug, Clone)]
pub struct CurriculumController {
    config: CurriculumConfig,
    history: RollingWindow<f64>,
}

impl CurriculumController {
    pub fn new(config: CurriculumConfig) -> Result<Self, CurriculumConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            history: RollingWindow::new(config.look_back),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CurriculumConfig {
        &self.config
    }

    #[must_use]
    pub fn history(&self) -> &RollingWindow<f64> {
        &self.history
    }
}

impl EvalObserver for CurriculumController {
    fn on_eval(
        &mut self,
        mean_reward: f64,
        target: &mut dyn Difficulty,
    ) -> Result<(), ScrapFactorError> {
        let history = std::mem::replace(&mut self.history, RollingWindow::new(1));
        let (history, delta) = decide(history, mean_reward, &self.config);
        self.history = history;
        debug!(
            "curriculum: reward {mean_reward:.2}, history {}/{}",
            self.history.len(),
            self.config.look_back
        );
        if delta <= 0.0 {
            return Ok(());
        }

        let Some(current) = target.difficulty() else {
            warn!("curriculum: target has no difficulty, ignoring raise");
            return Ok(());
        };
        let next = current.max((current + delta).min(self.config.factor_max));
        if next > current {
            target.set_difficulty(next)?;
            info!("curriculum: scrap factor raised from {current:.4} to {next:.4}");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Bare difficulty knob.
    #[derive(Debug, Default)]
    struct Knob {
        value: f64,
        writes: usize,
    }

    impl Difficulty for Knob {
        fn difficulty(&self) -> Option<f64> {
            Some(self.value)
        }

        fn set_difficulty(&mut self, value: f64) -> Result<(), ScrapFactorError> {
            self.value = lineflow_line::ScrapFactor::new(value)?.get();
            self.writes += 1;
            Ok(())
        }
    }

    fn config(look_back: usize) -> CurriculumConfig {
        CurriculumConfig {
            threshold: 100.0,
            update: 0.1,
            factor_max: 0.5,
            look_back,
        }
    }

    fn feed(controller: &mut CurriculumController, knob: &mut Knob, rewards: &[f64]) {
        for &reward in rewards {
            controller.on_eval(reward, knob).unwrap();
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_scenario() {
        let mut controller = CurriculumController::new(config(3)).unwrap();
        let mut knob = Knob::default();

        feed(&mut controller, &mut knob, &[50.0, 120.0, 130.0]);
        assert_eq!(knob.value, 0.0);
        assert_eq!(controller.history().len(), 3);

        let mut controller = CurriculumController::new(config(3)).unwrap();
        feed(&mut controller, &mut knob, &[110.0, 120.0, 130.0]);
        assert_close(knob.value, 0.1);
        assert!(controller.history().is_empty());

        let mut values = vec![];
        for _ in 0..5 {
            feed(&mut controller, &mut knob, &[150.0]);
            values.push(knob.value);
        }
        assert_close(values[0], 0.1);
        assert_close(values[1], 0.1);
        assert_close(values[2], 0.2);
        assert_close(values[3], 0.2);
        assert_close(values[4], 0.2);
        assert_eq!(controller.history().len(), 2);
    }

    #[test]
    fn test_window_gating() {
        for k in 1..=5 {
            let mut controller = CurriculumController::new(config(k)).unwrap();
            let mut knob = Knob::default();
            feed(&mut controller, &mut knob, &vec![200.0; k - 1]);
            assert_eq!(knob.writes, 0, "look_back {k}");
            feed(&mut controller, &mut knob, &[200.0]);
            assert_eq!(knob.writes, 1, "look_back {k}");
            assert_close(knob.value, 0.1);
        }
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut controller = CurriculumController::new(config(1)).unwrap();
        let mut knob = Knob::default();
        feed(&mut controller, &mut knob, &[100.0, 100.0]);
        assert_eq!(knob.writes, 0);
        feed(&mut controller, &mut knob, &[100.5]);
        assert_eq!(knob.writes, 1);
    }

    #[test]
    fn test_failing_sample_needs_full_window_of_passes() {
        let k = 3;
        let mut controller = CurriculumController::new(config(k)).unwrap();
        let mut knob = Knob::default();
        // k - 1 passes, then a failure
        feed(&mut controller, &mut knob, &[150.0, 150.0, 10.0]);
        assert_eq!(knob.writes, 0);
        // the failure stays in the window until k more samples pushed it out
        feed(&mut controller, &mut knob, &[150.0, 150.0]);
        assert_eq!(knob.writes, 0);
        feed(&mut controller, &mut knob, &[150.0]);
        assert_eq!(knob.writes, 1);
    }

    #[test]
    fn test_monotonic_and_bounded() {
        let mut controller = CurriculumController::new(config(2)).unwrap();
        let mut knob = Knob::default();
        let rewards = [
            150.0, 90.0, 150.0, 150.0, 150.0, 150.0, 20.0, 150.0, 150.0, 150.0, 150.0, 150.0,
            150.0, 150.0, 150.0, 150.0, 150.0, 150.0, 150.0,
        ];
        let mut previous = knob.value;
        for reward in rewards {
            controller.on_eval(reward, &mut knob).unwrap();
            assert!(knob.value >= previous);
            assert!(knob.value <= 0.5 + 1e-12);
            previous = knob.value;
        }
        assert_close(knob.value, 0.5);
    }

    #[test]
    fn test_saturation_is_noop() {
        let config = CurriculumConfig {
            update: 0.3,
            ..config(1)
        };
        let mut controller = CurriculumController::new(config).unwrap();
        let mut knob = Knob::default();
        feed(&mut controller, &mut knob, &[200.0, 200.0]);
        assert_close(knob.value, 0.5);
        assert_eq!(knob.writes, 2);

        feed(&mut controller, &mut knob, &[200.0; 4]);
        assert_close(knob.value, 0.5);
        assert_eq!(knob.writes, 2);
    }

    #[test]
    fn test_never_lowers_difficulty_above_max() {
        let mut controller = CurriculumController::new(config(1)).unwrap();
        let mut knob = Knob {
            value: 0.8,
            writes: 0,
        };
        feed(&mut controller, &mut knob, &[200.0]);
        assert_eq!(knob.value, 0.8);
        assert_eq!(knob.writes, 0);
    }

    #[test]
    fn test_decide_is_pure() {
        let config = config(2);
        let mut history = RollingWindow::new(2);
        history.push(150.0);
        let (next, delta) = decide(history.clone(), 50.0, &config);
        assert_eq!(delta, 0.0);
        assert_eq!(next.iter().copied().collect::<Vec<_>>(), vec![150.0, 50.0]);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_decide_follows_look_back_not_window_capacity() {
        let config = config(3);

        let mut history = RollingWindow::new(5);
        let mut deltas = vec![];
        for reward in [50.0, 150.0, 150.0, 150.0] {
            let delta;
            (history, delta) = decide(history, reward, &config);
            deltas.push(delta);
        }
        assert_eq!(deltas, vec![0.0, 0.0, 0.0, 0.1]);
        assert!(history.is_empty());
        assert_eq!(history.capacity(), 3);

        let mut history = RollingWindow::new(2);
        let mut deltas = vec![];
        for _ in 0..3 {
            let delta;
            (history, delta) = decide(history, 150.0, &config);
            deltas.push(delta);
        }
        assert_eq!(deltas, vec![0.0, 0.0, 0.1]);
    }

    #[test]
    fn test_construction_validation() {
        let invalid = [
            (config(0), CurriculumConfigError::ZeroLookBack),
            (
                CurriculumConfig {
                    update: 0.0,
                    ..config(3)
                },
                CurriculumConfigError::NonPositiveUpdate { update: 0.0 },
            ),
            (
                CurriculumConfig {
                    update: -0.1,
                    ..config(3)
                },
                CurriculumConfigError::NonPositiveUpdate { update: -0.1 },
            ),
            (
                CurriculumConfig {
                    factor_max: -0.1,
                    ..config(3)
                },
                CurriculumConfigError::FactorMaxOutOfRange { factor_max: -0.1 },
            ),
            (
                CurriculumConfig {
                    factor_max: 1.5,
                    ..config(3)
                },
                CurriculumConfigError::FactorMaxOutOfRange { factor_max: 1.5 },
            ),
            (
                CurriculumConfig {
                    threshold: f64::INFINITY,
                    ..config(3)
                },
                CurriculumConfigError::NonFiniteThreshold {
                    threshold: f64::INFINITY,
                },
            ),
        ];
        for (config, expected) in invalid {
            assert_eq!(CurriculumController::new(config).unwrap_err(), expected);
        }
        assert!(CurriculumController::new(config(1)).is_ok());
        assert!(
            CurriculumController::new(CurriculumConfig {
                update: f64::NAN,
                ..config(3)
            })
            .is_err()
        );
    }

    #[test]
    fn test_for_cells_matches_line_defaults() {
        let config = CurriculumConfig::for_cells(3, 100.0, 3);
        assert_close(config.factor_max, 1.0 / 3.0);
        assert_close(config.update, 1.0 / 15.0);
        assert!(config.validate().is_ok());
    }
}
