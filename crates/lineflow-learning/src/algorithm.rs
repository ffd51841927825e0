use std::{fmt, str::FromStr};

use serde::Serialize;

/// On-policy algorithms a [`Model`](crate::Model) can train with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Algorithm {
    #[serde(rename = "PPO")]
    Ppo,
    #[serde(rename = "A2C")]
    A2c,
    #[serde(rename = "TRPO")]
    Trpo,
}

impl Algorithm {
    pub const ALL: [Self; 3] = [Self::Ppo, Self::A2c, Self::Trpo];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ppo => "PPO",
            Self::A2c => "A2C",
            Self::Trpo => "TRPO",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("unknown algorithm `{name}`, expected one of PPO, A2C, TRPO")]
pub struct UnknownAlgorithmError {
    pub name: String,
}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithmError;

    /// Names match case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownAlgorithmError { name: s.to_owned() })
    }
}

/// Settings shared by every algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CommonConfig {
    /// Steps per replica between two updates.
    pub n_steps: usize,
    pub gamma: f64,
    pub learning_rate: f64,
    pub normalize_advantage: bool,
    /// Finished episodes averaged into the rollout statistics.
    pub stats_window_size: usize,
    /// `None` draws the seed from OS entropy.
    pub seed: Option<u64>,
}

impl Default for CommonConfig {
    fn default() -> Self {
        Self {
            n_steps: 500,
            gamma: 0.99,
            learning_rate: 3e-4,
            normalize_advantage: false,
            stats_window_size: 10,
            seed: None,
        }
    }
}

/// Knobs the command line offers for every algorithm; each algorithm picks its subset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgorithmArgs {
    pub clip_range: f64,
    pub max_grad_norm: f64,
    pub ent_coef: f64,
}

impl Default for AlgorithmArgs {
    fn default() -> Self {
        Self {
            clip_range: 0.2,
            max_grad_norm: 0.5,
            ent_coef: 0.1,
        }
    }
}

/// Algorithm together with its hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "algorithm")]
pub enum Hyperparameters {
    #[serde(rename = "PPO")]
    Ppo {
        batch_size: usize,
        n_epochs: usize,
        clip_range: f64,
        max_grad_norm: f64,
        ent_coef: f64,
        gae_lambda: f64,
        recurrent: bool,
    },
    #[serde(rename = "A2C")]
    A2c {
        max_grad_norm: f64,
        ent_coef: f64,
        gae_lambda: f64,
    },
    #[serde(rename = "TRPO")]
    Trpo {
        batch_size: usize,
        target_kl: f64,
        cg_max_steps: usize,
        cg_damping: f64,
        line_search_max_iter: usize,
        line_search_shrinking_factor: f64,
        n_critic_updates: usize,
        gae_lambda: f64,
    },
}

impl Hyperparameters {
    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        match self {
            Self::Ppo { .. } => Algorithm::Ppo,
            Self::A2c { .. } => Algorithm::A2c,
            Self::Trpo { .. } => Algorithm::Trpo,
        }
    }

    #[must_use]
    pub fn gae_lambda(&self) -> f64 {
        match *self {
            Self::Ppo { gae_lambda, .. }
            | Self::A2c { gae_lambda, .. }
            | Self::Trpo { gae_lambda, .. } => gae_lambda,
        }
    }

    #[must_use]
    pub fn is_recurrent(&self) -> bool {
        matches!(self, Self::Ppo { recurrent: true, .. })
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ModelConfigError {
    #[display("{algorithm} has no recurrent variant")]
    RecurrentUnsupported { algorithm: Algorithm },
    #[display("n_steps must be positive")]
    ZeroSteps,
    #[display("stats window must hold at least one episode")]
    ZeroStatsWindow,
    #[display("gamma must lie in [0, 1], got {gamma}")]
    InvalidGamma { gamma: f64 },
    #[display("learning rate must be positive, got {learning_rate}")]
    InvalidLearningRate { learning_rate: f64 },
    #[display("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

/// Complete model configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelConfig {
    pub common: CommonConfig,
    pub hyperparameters: Hyperparameters,
}

impl ModelConfig {
    /// Selects the hyperparameter subset of `algorithm`.
    ///
    /// # Examples
    ///
    /// ```
    /// use lineflow_learning::{Algorithm, AlgorithmArgs, CommonConfig, Hyperparameters, ModelConfig};
    ///
    /// let config = ModelConfig::new(
    ///     Algorithm::Ppo,
    ///     false,
    ///     CommonConfig::default(),
    ///     AlgorithmArgs::default(),
    /// )
    /// .unwrap();
    /// assert!(matches!(
    ///     config.hyperparameters,
    ///     Hyperparameters::Ppo { batch_size: 500, n_epochs: 5, .. }
    /// ));
    ///
    /// assert!(ModelConfig::new(Algorithm::Trpo, true, CommonConfig::default(), AlgorithmArgs::default()).is_err());
    /// ```
    pub fn new(
        algorithm: Algorithm,
        recurrent: bool,
        common: CommonConfig,
        args: AlgorithmArgs,
    ) -> Result<Self, ModelConfigError> {
        if common.n_steps == 0 {
            return Err(ModelConfigError::ZeroSteps);
        }
        if common.stats_window_size == 0 {
            return Err(ModelConfigError::ZeroStatsWindow);
        }
        if !(0.0..=1.0).contains(&common.gamma) {
            return Err(ModelConfigError::InvalidGamma {
                gamma: common.gamma,
            });
        }
        if !(common.learning_rate.is_finite() && common.learning_rate > 0.0) {
            return Err(ModelConfigError::InvalidLearningRate {
                learning_rate: common.learning_rate,
            });
        }
        if recurrent && algorithm != Algorithm::Ppo {
            return Err(ModelConfigError::RecurrentUnsupported { algorithm });
        }

        let AlgorithmArgs {
            clip_range,
            max_grad_norm,
            ent_coef,
        } = args;
        let positive = |name, value: f64| {
            if value.is_finite() && value > 0.0 {
                Ok(())
            } else {
                Err(ModelConfigError::NonPositive { name, value })
            }
        };

        let hyperparameters = match algorithm {
            Algorithm::Ppo => {
                positive("clip_range", clip_range)?;
                positive("max_grad_norm", max_grad_norm)?;
                Hyperparameters::Ppo {
                    batch_size: common.n_steps,
                    n_epochs: 5,
                    clip_range,
                    max_grad_norm,
                    ent_coef,
                    gae_lambda: 0.95,
                    recurrent,
                }
            }
            Algorithm::A2c => {
                positive("max_grad_norm", max_grad_norm)?;
                Hyperparameters::A2c {
                    max_grad_norm,
                    ent_coef,
                    gae_lambda: 1.0,
                }
            }
            Algorithm::Trpo => Hyperparameters::Trpo {
                batch_size: common.n_steps,
                target_kl: 0.01,
                cg_max_steps: 15,
                cg_damping: 0.1,
                line_search_max_iter: 10,
                line_search_shrinking_factor: 0.8,
                n_critic_updates: 10,
                gae_lambda: 0.95,
            },
        };
        Ok(Self {
            common,
            hyperparameters,
        })
    }

    #[must_use]
    pub fn algorithm(&self) -> Algorithm {
        self.hyperparameters.algorithm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(algorithm: Algorithm, recurrent: bool) -> Result<ModelConfig, ModelConfigError> {
        ModelConfig::new(
            algorithm,
            recurrent,
            CommonConfig::default(),
            AlgorithmArgs::default(),
        )
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!("PPO".parse(), Ok(Algorithm::Ppo));
        assert_eq!("a2c".parse(), Ok(Algorithm::A2c));
        assert_eq!("Trpo".parse(), Ok(Algorithm::Trpo));
        let err = "DQN".parse::<Algorithm>().unwrap_err();
        assert_eq!(err.name, "DQN");
    }

    #[test]
    fn test_hyperparameter_subsets() {
        let ppo = config(Algorithm::Ppo, false).unwrap();
        assert_eq!(
            ppo.hyperparameters,
            Hyperparameters::Ppo {
                batch_size: 500,
                n_epochs: 5,
                clip_range: 0.2,
                max_grad_norm: 0.5,
                ent_coef: 0.1,
                gae_lambda: 0.95,
                recurrent: false,
            }
        );

        let a2c = config(Algorithm::A2c, false).unwrap();
        assert_eq!(
            a2c.hyperparameters,
            Hyperparameters::A2c {
                max_grad_norm: 0.5,
                ent_coef: 0.1,
                gae_lambda: 1.0,
            }
        );

        let trpo = config(Algorithm::Trpo, false).unwrap();
        assert_eq!(trpo.algorithm(), Algorithm::Trpo);
        assert!(!trpo.hyperparameters.is_recurrent());
    }

    #[test]
    fn test_recurrent_only_with_ppo() {
        assert!(config(Algorithm::Ppo, true)
            .unwrap()
            .hyperparameters
            .is_recurrent());
        for algorithm in [Algorithm::A2c, Algorithm::Trpo] {
            assert_eq!(
                config(algorithm, true).unwrap_err(),
                ModelConfigError::RecurrentUnsupported { algorithm }
            );
        }
    }

    #[test]
    fn test_invalid_common_settings() {
        let common = CommonConfig {
            n_steps: 0,
            ..CommonConfig::default()
        };
        assert_eq!(
            ModelConfig::new(Algorithm::A2c, false, common, AlgorithmArgs::default()).unwrap_err(),
            ModelConfigError::ZeroSteps
        );
        let common = CommonConfig {
            gamma: 1.5,
            ..CommonConfig::default()
        };
        assert!(ModelConfig::new(Algorithm::A2c, false, common, AlgorithmArgs::default()).is_err());
        let args = AlgorithmArgs {
            clip_range: 0.0,
            ..AlgorithmArgs::default()
        };
        assert_eq!(
            ModelConfig::new(Algorithm::Ppo, false, CommonConfig::default(), args).unwrap_err(),
            ModelConfigError::NonPositive {
                name: "clip_range",
                value: 0.0
            }
        );
    }
}
