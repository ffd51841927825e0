use std::collections::VecDeque;

use lineflow_line::{BoxedLine, ScrapFactor, ScrapFactorError};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{Difficulty, EpisodeInfo, LineEnv, RewardKind};

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum VecEnvError {
    #[display("at least one environment replica is required")]
    NoEnvs,
    #[display("frame stack must hold at least one observation")]
    ZeroStack,
}

/// Result of stepping every replica once.
#[derive(Debug, Clone, PartialEq)]
pub struct VecStep {
    /// Stacked observations; for finished replicas this is the first observation of the
    /// next episode.
    pub observations: Vec<Vec<f64>>,
    pub rewards: Vec<f64>,
    pub dones: Vec<bool>,
    pub episodes: Vec<Option<EpisodeInfo>>,
}

#[derive(Debug, Clone)]
struct FrameStack {
    n_stack: usize,
    frames: VecDeque<Vec<f64>>,
}

impl FrameStack {
    fn new(n_stack: usize) -> Self {
        Self {
            n_stack,
            frames: VecDeque::with_capacity(n_stack),
        }
    }

    /// Drops all frames, keeping `observation` as the newest one and zeros before it.
    fn reset(&mut self, observation: Vec<f64>) {
        self.frames.clear();
        self.frames
            .extend((1..self.n_stack).map(|_| vec![0.0; observation.len()]));
        self.frames.push_back(observation);
    }

    fn push(&mut self, observation: Vec<f64>) {
        self.frames.pop_front();
        self.frames.push_back(observation);
    }

    /// Frames concatenated from oldest to newest.
    fn stacked(&self) -> Vec<f64> {
        self.frames.iter().flatten().copied().collect()
    }
}

/// Replicas of a line environment stepped in lockstep, with frame stacking and
/// automatic resets.
#[derive(Debug, Clone)]
pub struct StackedVecEnv {
    envs: Vec<LineEnv>,
    stacks: Vec<FrameStack>,
    n_stack: usize,
    rng: Pcg32,
}

/// Builds `n_envs` replicas of `line` that stack their last `n_stack` observations.
///
/// Episodes end once the simulation time reaches `simulation_end`. Every reset draws
/// a fresh line seed from a generator seeded with `seed`, or from OS entropy if `seed`
/// is `None`.
pub fn make_stacked_vec_env(
    line: &BoxedLine,
    simulation_end: u32,
    reward: RewardKind,
    n_envs: usize,
    n_stack: usize,
    seed: Option<u64>,
) -> Result<StackedVecEnv, VecEnvError> {
    if n_envs == 0 {
        return Err(VecEnvError::NoEnvs);
    }
    if n_stack == 0 {
        return Err(VecEnvError::ZeroStack);
    }
    let rng = match seed {
        Some(seed) => Pcg32::seed_from_u64(seed),
        None => Pcg32::from_rng(&mut rand::rng()),
    };
    Ok(StackedVecEnv {
        envs: (0..n_envs)
            .map(|_| LineEnv::new(line.clone(), simulation_end, reward))
            .collect(),
        stacks: (0..n_envs).map(|_| FrameStack::new(n_stack)).collect(),
        n_stack,
        rng,
    })
}

impl StackedVecEnv {
    #[must_use]
    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }

    #[must_use]
    pub fn n_stack(&self) -> usize {
        self.n_stack
    }

    /// Length of a stacked observation.
    #[must_use]
    pub fn observation_len(&self) -> usize {
        self.n_stack * self.envs[0].observation_len()
    }

    #[must_use]
    pub fn action_count(&self) -> usize {
        self.envs[0].action_count()
    }

    #[must_use]
    pub fn envs(&self) -> &[LineEnv] {
        &self.envs
    }

    /// Resets every replica and returns the stacked first observations.
    pub fn reset(&mut self) -> Vec<Vec<f64>> {
        self.envs
            .iter_mut()
            .zip(&mut self.stacks)
            .map(|(env, stack)| {
                stack.reset(env.reset(self.rng.random()));
                stack.stacked()
            })
            .collect()
    }

    /// Steps replica `i` with `actions[i]`; finished replicas are reset right away.
    ///
    /// # Panics
    ///
    /// Panics if `actions` does not hold one action per replica, or if an action is
    /// out of range.
    pub fn step(&mut self, actions: &[usize]) -> VecStep {
        assert_eq!(actions.len(), self.envs.len(), "one action per replica");
        let mut result = VecStep {
            observations: Vec::with_capacity(actions.len()),
            rewards: Vec::with_capacity(actions.len()),
            dones: Vec::with_capacity(actions.len()),
            episodes: Vec::with_capacity(actions.len()),
        };
        for ((env, stack), &action) in self.envs.iter_mut().zip(&mut self.stacks).zip(actions) {
            let step = env.step(action);
            if step.done {
                stack.reset(env.reset(self.rng.random()));
            } else {
                stack.push(step.observation);
            }
            result.observations.push(stack.stacked());
            result.rewards.push(step.reward);
            result.dones.push(step.done);
            result.episodes.push(step.episode);
        }
        result
    }
}

impl Difficulty for StackedVecEnv {
    fn difficulty(&self) -> Option<f64> {
        self.envs[0].difficulty()
    }

    fn set_difficulty(&mut self, value: f64) -> Result<(), ScrapFactorError> {
        let factor = ScrapFactor::new(value)?;
        for env in &mut self.envs {
            env.set_difficulty(factor.get())?;
        }
        Ok(())
    }
}
