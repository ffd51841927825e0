//! On-policy reinforcement learning for production line environments.
//!
//! - [`Model`]: linear actor-critic trained with PPO, A2C or TRPO ([`Algorithm`])
//! - [`EvalCallback`]: periodic evaluation on a separate environment, reporting every
//!   result to an [`EvalObserver`]
//! - [`CurriculumController`]: observer raising the scrap factor once evaluations pass a
//!   reward threshold consistently; [`NoCurriculum`] is the observer that does nothing
//!
//! Metrics are reported through a [`ScalarLogger`].
//!
//! # Example
//!
//! ```
//! use lineflow_env::{RewardKind, make_stacked_vec_env};
//! use lineflow_learning::{
//!     Algorithm, AlgorithmArgs, CommonConfig, EvalCallback, EvalSettings, Model, ModelConfig,
//!     NoCurriculum, NullLogger,
//! };
//! use lineflow_line::{LineConfig, LineKind, make_line};
//!
//! let line = make_line(LineKind::WaitingTime, &LineConfig::default()).unwrap();
//! let mut train = make_stacked_vec_env(&line, 50, RewardKind::Parts, 2, 1, Some(0)).unwrap();
//! let eval = make_stacked_vec_env(&line, 50, RewardKind::Parts, 1, 1, Some(1)).unwrap();
//!
//! let common = CommonConfig { n_steps: 25, seed: Some(0), ..CommonConfig::default() };
//! let config =
//!     ModelConfig::new(Algorithm::Ppo, false, common, AlgorithmArgs::default()).unwrap();
//! let settings = EvalSettings { eval_freq: 100, n_eval_episodes: 1, deterministic: true, seed: Some(2) };
//! let mut callback = EvalCallback::new(eval, Box::new(NoCurriculum), settings).unwrap();
//!
//! let mut model = Model::new(config, &train);
//! model.learn(&mut train, 200, &mut callback, &mut NullLogger).unwrap();
//! assert_eq!(model.num_timesteps(), 200);
//! assert!(callback.last_mean_reward().is_some());
//! ```

pub use self::{algorithm::*, callback::*, curriculum::*, evaluation::*, model::*, policy::*};

mod algorithm;
mod callback;
mod curriculum;
mod evaluation;
mod model;
mod optimizer;
mod policy;
mod rollout;
mod update;
