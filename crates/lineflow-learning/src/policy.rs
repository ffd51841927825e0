//! Linear actor-critic policy.
//!
//! The actor is a linear softmax over the discrete actions, the critic a linear value
//! estimate; both read the same feature vector plus a bias term. A recurrent policy
//! extends the features with a [`Memory`], an exponentially decaying average of past
//! observations within the episode.

use rand::Rng;
use rand_distr::Normal;

const INIT_STD: f64 = 0.01;
const MEMORY_DECAY: f64 = 0.9;

/// Per-episode state of a recurrent policy. Empty for feed-forward policies.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    state: Vec<f64>,
}

impl Memory {
    /// Folds `observation` into the memory.
    pub fn observe(&mut self, observation: &[f64]) {
        for (m, &x) in self.state.iter_mut().zip(observation) {
            *m = MEMORY_DECAY * *m + (1.0 - MEMORY_DECAY) * x;
        }
    }

    pub fn reset(&mut self) {
        self.state.fill(0.0);
    }

    #[must_use]
    pub fn state(&self) -> &[f64] {
        &self.state
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    obs_len: usize,
    n_actions: usize,
    recurrent: bool,
    /// Actor rows (`n_actions` rows of `row_len`) followed by the critic row.
    params: Vec<f64>,
}

impl Policy {
    /// # Panics
    ///
    /// Panics if `n_actions` is zero.
    pub fn new<R>(obs_len: usize, n_actions: usize, recurrent: bool, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        assert!(n_actions > 0, "policy needs at least one action");
        let feature_len = obs_len * if recurrent { 2 } else { 1 };
        let row_len = feature_len + 1;
        let normal = Normal::new(0.0, INIT_STD).expect("constant standard deviation is valid");
        let mut params = Vec::with_capacity((n_actions + 1) * row_len);
        params.extend((0..n_actions * row_len).map(|_| rng.sample(normal)));
        params.resize((n_actions + 1) * row_len, 0.0);
        Self {
            obs_len,
            n_actions,
            recurrent,
            params,
        }
    }

    #[must_use]
    pub fn is_recurrent(&self) -> bool {
        self.recurrent
    }

    #[must_use]
    pub fn observation_len(&self) -> usize {
        self.obs_len
    }

    #[must_use]
    pub fn n_actions(&self) -> usize {
        self.n_actions
    }

    #[must_use]
    pub fn feature_len(&self) -> usize {
        self.row_len() - 1
    }

    fn row_len(&self) -> usize {
        self.params.len() / (self.n_actions + 1)
    }

    /// Number of actor parameters; the critic parameters follow them.
    pub(crate) fn actor_len(&self) -> usize {
        self.n_actions * self.row_len()
    }

    pub(crate) fn params(&self) -> &[f64] {
        &self.params
    }

    pub(crate) fn params_mut(&mut self) -> &mut [f64] {
        &mut self.params
    }

    /// A fresh memory for one environment replica.
    #[must_use]
    pub fn memory(&self) -> Memory {
        Memory {
            state: vec![0.0; if self.recurrent { self.obs_len } else { 0 }],
        }
    }

    /// Features of `observation` given the replica's `memory`.
    #[must_use]
    pub fn features(&self, observation: &[f64], memory: &Memory) -> Vec<f64> {
        debug_assert_eq!(observation.len(), self.obs_len);
        let mut features = Vec::with_capacity(self.feature_len());
        features.extend_from_slice(observation);
        features.extend_from_slice(&memory.state);
        features
    }

    fn dot(row: &[f64], features: &[f64]) -> f64 {
        let Some((bias, weights)) = row.split_last() else {
            return 0.0;
        };
        weights.iter().zip(features).map(|(w, x)| w * x).sum::<f64>() + bias
    }

    #[must_use]
    pub fn logits(&self, features: &[f64]) -> Vec<f64> {
        self.params[..self.actor_len()]
            .chunks_exact(self.row_len())
            .map(|row| Self::dot(row, features))
            .collect()
    }

    #[must_use]
    pub fn probabilities(&self, features: &[f64]) -> Vec<f64> {
        softmax(&self.logits(features))
    }

    #[must_use]
    pub fn value(&self, features: &[f64]) -> f64 {
        Self::dot(&self.params[self.actor_len()..], features)
    }

    /// Picks the most likely action, or samples one.
    pub fn act<R>(&self, features: &[f64], deterministic: bool, rng: &mut R) -> usize
    where
        R: Rng + ?Sized,
    {
        let probabilities = self.probabilities(features);
        if deterministic {
            argmax(&probabilities)
        } else {
            sample(&probabilities, rng)
        }
    }

    /// Adds `d_logits[a] * x` to the gradient of each actor row `a`, with `x` the
    /// features extended by the bias input.
    pub(crate) fn accumulate_actor(&self, grad: &mut [f64], features: &[f64], d_logits: &[f64]) {
        let row_len = self.row_len();
        for (row, &d) in grad[..self.actor_len()].chunks_exact_mut(row_len).zip(d_logits) {
            accumulate_row(row, features, d);
        }
    }

    pub(crate) fn accumulate_critic(&self, grad: &mut [f64], features: &[f64], d_value: f64) {
        let actor_len = self.actor_len();
        accumulate_row(&mut grad[actor_len..], features, d_value);
    }
}

fn accumulate_row(row: &mut [f64], features: &[f64], d: f64) {
    if let Some((bias, weights)) = row.split_last_mut() {
        for (w, x) in weights.iter_mut().zip(features) {
            *w += d * x;
        }
        *bias += d;
    }
}

#[must_use]
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp = logits.iter().map(|&z| (z - max).exp()).collect::<Vec<_>>();
    let sum = exp.iter().sum::<f64>();
    exp.into_iter().map(|e| e / sum).collect()
}

#[must_use]
pub fn entropy(probabilities: &[f64]) -> f64 {
    -probabilities
        .iter()
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum::<f64>()
}

/// `KL(p || q)` between two categorical distributions.
#[must_use]
pub fn kl_divergence(p: &[f64], q: &[f64]) -> f64 {
    p.iter()
        .zip(q)
        .filter(|&(&p, _)| p > 0.0)
        .map(|(&p, &q)| p * (p.ln() - q.max(f64::MIN_POSITIVE).ln()))
        .sum()
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 { (i, v) } else { best }
        })
        .0
}

pub(crate) fn sample<R>(probabilities: &[f64], rng: &mut R) -> usize
where
    R: Rng + ?Sized,
{
    let mut u = rng.random::<f64>();
    for (i, &p) in probabilities.iter().enumerate() {
        if u < p {
            return i;
        }
        u -= p;
    }
    probabilities.len() - 1
}
