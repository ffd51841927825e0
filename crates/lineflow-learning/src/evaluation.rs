//! Periodic policy evaluation.

use lineflow_env::{Difficulty, DifficultyGroup, EpisodeInfo, StackedVecEnv};
use lineflow_line::ScrapFactorError;
use lineflow_stats::descriptive::DescriptiveStats;
use log::info;
use rand::{Rng, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{Callback, CallbackContext, Policy, TrainingError};

/// Reacts to the outcome of every evaluation.
pub trait EvalObserver {
    /// `target` links the difficulty of the training and evaluation environments.
    fn on_eval(
        &mut self,
        mean_reward: f64,
        target: &mut dyn Difficulty,
    ) -> Result<(), ScrapFactorError>;
}

/// Observer that leaves the difficulty alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCurriculum;

impl EvalObserver for NoCurriculum {
    fn on_eval(
        &mut self,
        _mean_reward: f64,
        _target: &mut dyn Difficulty,
    ) -> Result<(), ScrapFactorError> {
        Ok(())
    }
}

/// Runs `policy` on `env` until `n_eval_episodes` episodes have finished.
///
/// Episodes are spread evenly over the replicas so that short episodes do not dominate
/// the sample.
pub fn evaluate_policy<R>(
    policy: &Policy,
    env: &mut StackedVecEnv,
    n_eval_episodes: usize,
    deterministic: bool,
    rng: &mut R,
) -> Vec<EpisodeInfo>
where
    R: Rng + ?Sized,
{
    let n_envs = env.num_envs();
    let targets = (0..n_envs)
        .map(|i| (n_eval_episodes + i) / n_envs)
        .collect::<Vec<_>>();
    let mut counts = vec![0; n_envs];
    let mut memories = vec![policy.memory(); n_envs];
    let mut episodes = Vec::with_capacity(n_eval_episodes);

    let mut observations = env.reset();
    while counts.iter().zip(&targets).any(|(count, target)| count < target) {
        let actions = observations
            .iter()
            .zip(&mut memories)
            .map(|(observation, memory)| {
                let features = policy.features(observation, memory);
                memory.observe(observation);
                policy.act(&features, deterministic, rng)
            })
            .collect::<Vec<_>>();
        let step = env.step(&actions);
        for (i, (episode, memory)) in step.episodes.into_iter().zip(&mut memories).enumerate() {
            let Some(episode) = episode else {
                continue;
            };
            memory.reset();
            if counts[i] < targets[i] {
                counts[i] += 1;
                episodes.push(episode);
            }
        }
        observations = step.observations;
    }
    episodes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalSettings {
    /// Total environment steps between two evaluations.
    pub eval_freq: u64,
    pub n_eval_episodes: usize,
    pub deterministic: bool,
    /// Seed of the action sampler; `None` draws it from OS entropy.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum EvalSettingsError {
    #[display("evaluation frequency must be positive")]
    ZeroFrequency,
    #[display("at least one evaluation episode is required")]
    ZeroEpisodes,
}

/// [`Callback`] evaluating the current policy on a separate environment and handing
/// the mean reward to an [`EvalObserver`].
pub struct EvalCallback {
    eval_env: StackedVecEnv,
    observer: Box<dyn EvalObserver>,
    settings: EvalSettings,
    next_eval_at: u64,
    last_mean_reward: Option<f64>,
    best_mean_reward: Option<f64>,
    rng: Pcg32,
}

impl EvalCallback {
    pub fn new(
        eval_env: StackedVecEnv,
        observer: Box<dyn EvalObserver>,
        settings: EvalSettings,
    ) -> Result<Self, EvalSettingsError> {
        if settings.eval_freq == 0 {
            return Err(EvalSettingsError::ZeroFrequency);
        }
        if settings.n_eval_episodes == 0 {
            return Err(EvalSettingsError::ZeroEpisodes);
        }
        let rng = match settings.seed {
            Some(seed) => Pcg32::seed_from_u64(seed),
            None => Pcg32::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            eval_env,
            observer,
            settings,
            next_eval_at: settings.eval_freq,
            last_mean_reward: None,
            best_mean_reward: None,
            rng,
        })
    }

    #[must_use]
    pub fn eval_env(&self) -> &StackedVecEnv {
        &self.eval_env
    }

    #[must_use]
    pub fn last_mean_reward(&self) -> Option<f64> {
        self.last_mean_reward
    }

    #[must_use]
    pub fn best_mean_reward(&self) -> Option<f64> {
        self.best_mean_reward
    }

    fn evaluate(&mut self, ctx: &mut CallbackContext<'_>) -> Result<(), TrainingError> {
        let step = ctx.num_timesteps;
        let episodes = evaluate_policy(
            ctx.policy,
            &mut self.eval_env,
            self.settings.n_eval_episodes,
            self.settings.deterministic,
            &mut self.rng,
        );
        let Some(rewards) = DescriptiveStats::new(episodes.iter().map(|e| e.reward)) else {
            return Ok(());
        };
        let lengths = DescriptiveStats::new(episodes.iter().map(|e| f64::from(e.length)));

        info!(
            "eval num_timesteps={step}, episode_reward={:.2} +/- {:.2}",
            rewards.mean, rewards.std_dev
        );
        ctx.logger.record(step, "eval/mean_reward", rewards.mean);
        ctx.logger.record(step, "eval/std_reward", rewards.std_dev);
        if let Some(lengths) = lengths {
            ctx.logger.record(step, "eval/mean_ep_length", lengths.mean);
        }
        log_station_info(ctx, &episodes);

        self.last_mean_reward = Some(rewards.mean);
        if self.best_mean_reward.is_none_or(|best| rewards.mean > best) {
            info!("new best mean reward {:.2}", rewards.mean);
            self.best_mean_reward = Some(rewards.mean);
        }

        let mut target = DifficultyGroup::new(vec![
            &mut *ctx.train_env as &mut dyn Difficulty,
            &mut self.eval_env,
        ]);
        self.observer.on_eval(rewards.mean, &mut target)?;
        if let Some(scrap_factor) = target.difficulty() {
            ctx.logger.record(step, "curriculum/scrap_factor", scrap_factor);
        }
        Ok(())
    }
}

/// Logs the mean of every requested station value over `episodes`.
fn log_station_info(ctx: &mut CallbackContext<'_>, episodes: &[EpisodeInfo]) {
    let Some(first) = episodes.first() else {
        return;
    };
    for (i, entry) in first.info.iter().enumerate() {
        let values = episodes
            .iter()
            .filter_map(|episode| episode.info.get(i).map(|value| value.value));
        if let Some(stats) = DescriptiveStats::new(values) {
            let key = format!("info/{}/{}", entry.station, entry.attribute);
            ctx.logger.record(ctx.num_timesteps, &key, stats.mean);
        }
    }
}

impl Callback for EvalCallback {
    fn on_step(&mut self, ctx: &mut CallbackContext<'_>) -> Result<bool, TrainingError> {
        if ctx.num_timesteps < self.next_eval_at {
            return Ok(true);
        }
        while self.next_eval_at <= ctx.num_timesteps {
            self.next_eval_at += self.settings.eval_freq;
        }
        self.evaluate(ctx)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use lineflow_env::{RewardKind, make_stacked_vec_env};
    use lineflow_line::{InfoSpec, LineConfig, LineKind, make_line};

    use super::*;
    use crate::{CurriculumConfig, CurriculumController};

    fn envs(
        kind: LineKind,
        info: &str,
        n_envs: usize,
    ) -> (StackedVecEnv, StackedVecEnv, Policy) {
        let config = LineConfig {
            info: info.parse::<InfoSpec>().unwrap(),
            curriculum: true,
            ..LineConfig::default()
        };
        let line = make_line(kind, &config).unwrap();
        let train = make_stacked_vec_env(&line, 20, RewardKind::Parts, n_envs, 1, Some(1)).unwrap();
        let eval = make_stacked_vec_env(&line, 20, RewardKind::Parts, 1, 1, Some(2)).unwrap();
        let policy = Policy::new(
            train.observation_len(),
            train.action_count(),
            false,
            &mut Pcg32::seed_from_u64(3),
        );
        (train, eval, policy)
    }

    fn settings(eval_freq: u64, n_eval_episodes: usize) -> EvalSettings {
        EvalSettings {
            eval_freq,
            n_eval_episodes,
            deterministic: true,
            seed: Some(0),
        }
    }

    #[test]
    fn test_evaluate_collects_requested_episodes() {
        let (mut env, _, policy) = envs(LineKind::WorkerAssignment, "[]", 3);
        let mut rng = Pcg32::seed_from_u64(0);
        let episodes = evaluate_policy(&policy, &mut env, 4, false, &mut rng);
        assert_eq!(episodes.len(), 4);
        assert!(episodes.iter().all(|episode| episode.length == 20));
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let (_, eval, _) = envs(LineKind::WaitingTime, "[]", 1);
        assert_eq!(
            EvalCallback::new(eval.clone(), Box::new(NoCurriculum), settings(0, 1)).err(),
            Some(EvalSettingsError::ZeroFrequency)
        );
        assert_eq!(
            EvalCallback::new(eval, Box::new(NoCurriculum), settings(10, 0)).err(),
            Some(EvalSettingsError::ZeroEpisodes)
        );
    }

    #[test]
    fn test_evaluates_on_total_step_cadence() {
        let (mut train, eval, policy) = envs(LineKind::WaitingTime, "[('P0', 'n_parts')]", 1);
        let mut callback =
            EvalCallback::new(eval, Box::new(NoCurriculum), settings(10, 2)).unwrap();
        let mut logger = vec![];

        let mut evaluations = vec![];
        for num_timesteps in [5, 10, 15, 20, 45] {
            let mut ctx = CallbackContext {
                num_timesteps,
                policy: &policy,
                train_env: &mut train,
                logger: &mut logger,
            };
            assert!(callback.on_step(&mut ctx).unwrap());
            if callback.last_mean_reward().is_some() {
                evaluations.push(num_timesteps);
                callback.last_mean_reward = None;
            }
        }
        assert_eq!(evaluations, vec![10, 20, 45]);
        assert!(callback.best_mean_reward().is_some());

        let keys = logger
            .iter()
            .filter(|(step, ..)| *step == 10)
            .map(|(_, key, _)| key.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![
                "eval/mean_reward",
                "eval/std_reward",
                "eval/mean_ep_length",
                "info/P0/n_parts",
                "curriculum/scrap_factor",
            ]
        );
    }

    #[test]
    fn test_curriculum_raises_train_and_eval_difficulty() {
        let (mut train, eval, policy) = envs(LineKind::ComplexLine, "[]", 2);
        let config = CurriculumConfig {
            threshold: -1e9,
            update: 0.1,
            factor_max: 0.15,
            look_back: 1,
        };
        let observer = CurriculumController::new(config).unwrap();
        let mut callback = EvalCallback::new(eval, Box::new(observer), settings(5, 1)).unwrap();
        let mut logger = vec![];

        for num_timesteps in [5, 10] {
            let mut ctx = CallbackContext {
                num_timesteps,
                policy: &policy,
                train_env: &mut train,
                logger: &mut logger,
            };
            callback.on_step(&mut ctx).unwrap();
        }

        assert_eq!(train.difficulty(), Some(0.15));
        assert_eq!(callback.eval_env().difficulty(), Some(0.15));
        let factors = logger
            .iter()
            .filter(|(_, key, _)| key == "curriculum/scrap_factor")
            .map(|(.., value)| *value)
            .collect::<Vec<_>>();
        assert_eq!(factors, vec![0.1, 0.15]);
    }

    #[test]
    fn test_no_curriculum_keeps_difficulty() {
        let (mut train, eval, policy) = envs(LineKind::ComplexLine, "[]", 1);
        let mut callback =
            EvalCallback::new(eval, Box::new(NoCurriculum), settings(1, 1)).unwrap();
        let mut logger = vec![];
        let mut ctx = CallbackContext {
            num_timesteps: 1,
            policy: &policy,
            train_env: &mut train,
            logger: &mut logger,
        };
        callback.on_step(&mut ctx).unwrap();
        assert_eq!(train.difficulty(), Some(0.0));
        assert_eq!(callback.eval_env().difficulty(), Some(0.0));
    }
}
