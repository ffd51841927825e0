use lineflow_line::{BoxedLine, Line, StationInfoValue};
use log::debug;

use crate::RewardKind;

/// Summary of a finished episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeInfo {
    /// Sum of the step rewards.
    pub reward: f64,
    /// Number of agent steps.
    pub length: u32,
    /// Station values requested by the line's info spec, read at the last step.
    pub info: Vec<StationInfoValue>,
    pub scrap_factor: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep {
    pub observation: Vec<f64>,
    pub reward: f64,
    pub done: bool,
    /// Set on the last step of an episode.
    pub episode: Option<EpisodeInfo>,
}

/// A line run in episodes that end once the simulation time reaches `simulation_end`.
#[derive(Debug, Clone)]
pub struct LineEnv {
    line: BoxedLine,
    simulation_end: u32,
    reward: RewardKind,
    episode_reward: f64,
    episode_length: u32,
}

impl LineEnv {
    #[must_use]
    pub fn new(line: BoxedLine, simulation_end: u32, reward: RewardKind) -> Self {
        Self {
            line,
            simulation_end,
            reward,
            episode_reward: 0.0,
            episode_length: 0,
        }
    }

    #[must_use]
    pub fn line(&self) -> &dyn Line {
        self.line.as_ref()
    }

    pub(crate) fn line_mut(&mut self) -> &mut dyn Line {
        self.line.as_mut()
    }

    #[must_use]
    pub fn reward_kind(&self) -> RewardKind {
        self.reward
    }

    #[must_use]
    pub fn observation_len(&self) -> usize {
        self.line.observation_len()
    }

    #[must_use]
    pub fn action_count(&self) -> usize {
        self.line.action_count()
    }

    /// Starts a new episode and returns its first observation.
    pub fn reset(&mut self, seed: u64) -> Vec<f64> {
        self.line.reset(seed);
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.line.observation()
    }

    /// # Panics
    ///
    /// Panics if `action` is out of range for the line.
    pub fn step(&mut self, action: usize) -> EnvStep {
        let report = self.line.step(action);
        let reward = self.reward.reward(&report);
        self.episode_reward += reward;
        self.episode_length += 1;

        let done = self.line.now() >= self.simulation_end;
        let episode = done.then(|| {
            debug!(
                "{} episode finished: reward {:.1}, length {}",
                self.line.kind(),
                self.episode_reward,
                self.episode_length
            );
            EpisodeInfo {
                reward: self.episode_reward,
                length: self.episode_length,
                info: self.line.info_values(),
                scrap_factor: self.line.scrap_factor().map(|factor| factor.get()),
            }
        });

        EnvStep {
            observation: self.line.observation(),
            reward,
            done,
            episode,
        }
    }
}
