use lineflow_env::StackedVecEnv;
use lineflow_stats::{descriptive::DescriptiveStats, window::RollingWindow};
use log::{debug, info};
use rand::SeedableRng as _;
use rand_pcg::Pcg32;

use crate::{
    Callback, CallbackContext, Hyperparameters, Memory, ModelConfig, Policy, ScalarLogger,
    TrainingError,
    optimizer::Adam,
    policy::sample,
    rollout::{RolloutBuffer, Transition},
    update::{A2cUpdate, PpoUpdate, TrainStats, TrpoUpdate},
};

/// Observations and recurrent memories carried from one rollout to the next.
struct RolloutState {
    observations: Vec<Vec<f64>>,
    memories: Vec<Memory>,
}

/// On-policy learner.
///
/// Alternates between collecting `n_steps` steps from every replica and updating the
/// policy with the configured algorithm.
#[derive(Debug, Clone)]
pub struct Model {
    config: ModelConfig,
    policy: Policy,
    /// Optimizes all parameters, or only the critic for TRPO.
    optimizer: Adam,
    rng: Pcg32,
    num_timesteps: u64,
    episode_rewards: RollingWindow<f64>,
    episode_lengths: RollingWindow<f64>,
}

impl Model {
    /// Creates a model whose policy fits the observations and actions of `env`.
    #[must_use]
    pub fn new(config: ModelConfig, env: &StackedVecEnv) -> Self {
        let mut rng = match config.common.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_rng(&mut rand::rng()),
        };
        let policy = Policy::new(
            env.observation_len(),
            env.action_count(),
            config.hyperparameters.is_recurrent(),
            &mut rng,
        );
        let n_optimized = match config.hyperparameters {
            Hyperparameters::Trpo { .. } => policy.params().len() - policy.actor_len(),
            Hyperparameters::Ppo { .. } | Hyperparameters::A2c { .. } => policy.params().len(),
        };
        let window = config.common.stats_window_size;
        Self {
            optimizer: Adam::new(config.common.learning_rate, n_optimized),
            config,
            policy,
            rng,
            num_timesteps: 0,
            episode_rewards: RollingWindow::new(window),
            episode_lengths: RollingWindow::new(window),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Environment steps taken so far, summed over all replicas.
    #[must_use]
    pub fn num_timesteps(&self) -> u64 {
        self.num_timesteps
    }

    /// Trains until at least `total_timesteps` environment steps have been taken or
    /// `callback` asks to stop.
    ///
    /// # Panics
    ///
    /// Panics if `env` does not match the observation and action sizes of the policy.
    pub fn learn(
        &mut self,
        env: &mut StackedVecEnv,
        total_timesteps: u64,
        callback: &mut dyn Callback,
        logger: &mut dyn ScalarLogger,
    ) -> Result<(), TrainingError> {
        assert_eq!(env.observation_len(), self.policy.observation_len());
        assert_eq!(env.action_count(), self.policy.n_actions());

        let n_envs = env.num_envs();
        let mut buffer = RolloutBuffer::new(self.config.common.n_steps, n_envs);
        let mut state = RolloutState {
            observations: env.reset(),
            memories: vec![self.policy.memory(); n_envs],
        };

        info!(
            "training {} for {total_timesteps} timesteps on {n_envs} envs",
            self.config.algorithm()
        );
        callback.on_training_start(total_timesteps);
        let mut iteration = 0_u64;
        while self.num_timesteps < total_timesteps {
            buffer.clear();
            if !self.collect_rollout(env, &mut state, &mut buffer, callback, logger)? {
                break;
            }
            iteration += 1;
            self.log_rollout(iteration, logger);
            let stats = self.train(&buffer);
            stats.record(self.num_timesteps, logger);
        }
        callback.on_training_end(self.num_timesteps);
        Ok(())
    }

    /// Fills `buffer` with `n_steps` steps of every replica; returns `false` if the
    /// callback stopped training.
    fn collect_rollout(
        &mut self,
        env: &mut StackedVecEnv,
        state: &mut RolloutState,
        buffer: &mut RolloutBuffer,
        callback: &mut dyn Callback,
        logger: &mut dyn ScalarLogger,
    ) -> Result<bool, TrainingError> {
        let n_envs = env.num_envs() as u64;
        for _ in 0..self.config.common.n_steps {
            let mut pending = Vec::with_capacity(state.observations.len());
            for (observation, memory) in state.observations.iter().zip(&mut state.memories) {
                let features = self.policy.features(observation, memory);
                memory.observe(observation);
                let probabilities = self.policy.probabilities(&features);
                let action = sample(&probabilities, &mut self.rng);
                let value = self.policy.value(&features);
                pending.push((features, action, value, probabilities));
            }
            let actions = pending.iter().map(|p| p.1).collect::<Vec<_>>();

            let step = env.step(&actions);
            self.num_timesteps += n_envs;

            for (i, episode) in step.episodes.iter().enumerate() {
                if let Some(episode) = episode {
                    self.episode_rewards.push(episode.reward);
                    self.episode_lengths.push(f64::from(episode.length));
                    state.memories[i].reset();
                }
            }

            let mut ctx = CallbackContext {
                num_timesteps: self.num_timesteps,
                policy: &self.policy,
                train_env: &mut *env,
                logger: &mut *logger,
            };
            if !callback.on_step(&mut ctx)? {
                debug!("training stopped by callback at {}", self.num_timesteps);
                return Ok(false);
            }

            for ((features, action, value, probabilities), (&reward, &done)) in
                pending.into_iter().zip(step.rewards.iter().zip(&step.dones))
            {
                buffer.push(Transition {
                    features,
                    action,
                    reward,
                    done,
                    value,
                    probabilities,
                });
            }
            state.observations = step.observations;
        }

        let last_values = state
            .observations
            .iter()
            .zip(&state.memories)
            .map(|(observation, memory)| {
                self.policy
                    .value(&self.policy.features(observation, memory))
            })
            .collect::<Vec<_>>();
        buffer.compute_gae(
            &last_values,
            self.config.common.gamma,
            self.config.hyperparameters.gae_lambda(),
        );
        Ok(true)
    }

    fn log_rollout(&self, iteration: u64, logger: &mut dyn ScalarLogger) {
        let step = self.num_timesteps;
        #[expect(clippy::cast_precision_loss)]
        let (iterations, timesteps) = (iteration as f64, step as f64);
        logger.record(step, "time/iterations", iterations);
        logger.record(step, "time/total_timesteps", timesteps);

        let rewards = DescriptiveStats::new(self.episode_rewards.iter().copied());
        let lengths = DescriptiveStats::new(self.episode_lengths.iter().copied());
        if let (Some(rewards), Some(lengths)) = (rewards, lengths) {
            logger.record(step, "rollout/ep_rew_mean", rewards.mean);
            logger.record(step, "rollout/ep_len_mean", lengths.mean);
            info!(
                "iteration {iteration}: {step} timesteps, ep_rew_mean {:.2}, ep_len_mean {:.1}",
                rewards.mean, lengths.mean
            );
        } else {
            info!("iteration {iteration}: {step} timesteps, no finished episode yet");
        }
    }

    fn train(&mut self, buffer: &RolloutBuffer) -> TrainStats {
        let normalize_advantage = self.config.common.normalize_advantage;
        match self.config.hyperparameters {
            Hyperparameters::Ppo {
                batch_size,
                n_epochs,
                clip_range,
                max_grad_norm,
                ent_coef,
                ..
            } => PpoUpdate {
                batch_size,
                n_epochs,
                clip_range,
                max_grad_norm,
                ent_coef,
                normalize_advantage,
            }
            .apply(&mut self.policy, &mut self.optimizer, buffer, &mut self.rng),
            Hyperparameters::A2c {
                max_grad_norm,
                ent_coef,
                ..
            } => A2cUpdate {
                max_grad_norm,
                ent_coef,
                normalize_advantage,
            }
            .apply(&mut self.policy, &mut self.optimizer, buffer),
            Hyperparameters::Trpo {
                batch_size,
                target_kl,
                cg_max_steps,
                cg_damping,
                line_search_max_iter,
                line_search_shrinking_factor,
                n_critic_updates,
                ..
            } => TrpoUpdate {
                batch_size,
                target_kl,
                cg_max_steps,
                cg_damping,
                line_search_max_iter,
                line_search_shrinking_factor,
                n_critic_updates,
                normalize_advantage,
            }
            .apply(&mut self.policy, &mut self.optimizer, buffer, &mut self.rng),
        }
    }
}
