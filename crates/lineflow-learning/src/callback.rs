use lineflow_env::StackedVecEnv;
use lineflow_line::ScrapFactorError;

use crate::Policy;

/// Sink for scalar training metrics, keyed like `rollout/ep_rew_mean`.
pub trait ScalarLogger {
    fn record(&mut self, step: u64, key: &str, value: f64);
}

/// Discards every metric.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl ScalarLogger for NullLogger {
    fn record(&mut self, _step: u64, _key: &str, _value: f64) {}
}

impl ScalarLogger for Vec<(u64, String, f64)> {
    fn record(&mut self, step: u64, key: &str, value: f64) {
        self.push((step, key.to_owned(), value));
    }
}

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum TrainingError {
    #[display("failed to update the environment difficulty: {_0}")]
    Difficulty(ScrapFactorError),
}

/// State a [`Callback`] sees after each environment step.
pub struct CallbackContext<'a> {
    /// Environment steps taken so far, summed over all replicas.
    pub num_timesteps: u64,
    pub policy: &'a Policy,
    pub train_env: &'a mut StackedVecEnv,
    pub logger: &'a mut dyn ScalarLogger,
}

/// Hooks into [`Model::learn`](crate::Model::learn).
pub trait Callback {
    fn on_training_start(&mut self, _total_timesteps: u64) {}

    /// Called after every vectorized step; returning `Ok(false)` stops training.
    fn on_step(&mut self, ctx: &mut CallbackContext<'_>) -> Result<bool, TrainingError>;

    fn on_training_end(&mut self, _num_timesteps: u64) {}
}

/// Runs its callbacks in order; training stops as soon as one asks for it.
#[derive(Default)]
pub struct CallbackList {
    callbacks: Vec<Box<dyn Callback>>,
}

impl CallbackList {
    #[must_use]
    pub fn new(callbacks: Vec<Box<dyn Callback>>) -> Self {
        Self { callbacks }
    }

    pub fn push(&mut self, callback: Box<dyn Callback>) {
        self.callbacks.push(callback);
    }
}

impl Callback for CallbackList {
    fn on_training_start(&mut self, total_timesteps: u64) {
        for callback in &mut self.callbacks {
            callback.on_training_start(total_timesteps);
        }
    }

    fn on_step(&mut self, ctx: &mut CallbackContext<'_>) -> Result<bool, TrainingError> {
        for callback in &mut self.callbacks {
            if !callback.on_step(ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn on_training_end(&mut self, num_timesteps: u64) {
        for callback in &mut self.callbacks {
            callback.on_training_end(num_timesteps);
        }
    }
}
