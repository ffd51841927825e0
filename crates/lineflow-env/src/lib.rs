//! Learning environments over production lines.
//!
//! [`LineEnv`] turns a [`Line`](lineflow_line::Line) into an episodic environment with a
//! fixed horizon and a selectable [`RewardKind`]. [`StackedVecEnv`] runs several
//! replicas side by side, resets finished episodes automatically and stacks the most
//! recent observations of each replica.
//!
//! Environments whose line carries a scrap factor expose it through the
//! [`Difficulty`] capability; [`DifficultyGroup`] links several environments so a
//! difficulty change reaches all of them.
//!
//! ```
//! use lineflow_env::{Difficulty, RewardKind, make_stacked_vec_env};
//! use lineflow_line::{LineConfig, LineKind, make_line};
//!
//! let config = LineConfig { curriculum: true, ..LineConfig::default() };
//! let line = make_line(LineKind::ComplexLine, &config).unwrap();
//! let mut env = make_stacked_vec_env(&line, 101, RewardKind::Parts, 2, 3, Some(0)).unwrap();
//!
//! let observations = env.reset();
//! assert_eq!(observations.len(), 2);
//! assert_eq!(observations[0].len(), 3 * line.observation_len());
//!
//! env.set_difficulty(0.2).unwrap();
//! assert_eq!(env.difficulty(), Some(0.2));
//! ```

pub use self::{difficulty::*, env::*, reward::*, vec_env::*};

mod difficulty;
mod env;
mod reward;
mod vec_env;
