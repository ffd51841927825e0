//! Transitions collected between two updates.

/// One transition of one replica.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Transition {
    pub(crate) features: Vec<f64>,
    pub(crate) action: usize,
    pub(crate) reward: f64,
    /// The step ended the episode.
    pub(crate) done: bool,
    pub(crate) value: f64,
    /// Action probabilities of the policy that collected the transition.
    pub(crate) probabilities: Vec<f64>,
}

impl Transition {
    pub(crate) fn log_prob(&self) -> f64 {
        self.probabilities[self.action].max(f64::MIN_POSITIVE).ln()
    }
}

/// Time-major buffer: transition `(t, e)` is stored at `t * n_envs + e`.
#[derive(Debug, Clone)]
pub(crate) struct RolloutBuffer {
    n_envs: usize,
    transitions: Vec<Transition>,
    advantages: Vec<f64>,
    returns: Vec<f64>,
}

impl RolloutBuffer {
    pub(crate) fn new(n_steps: usize, n_envs: usize) -> Self {
        Self {
            n_envs,
            transitions: Vec::with_capacity(n_steps * n_envs),
            advantages: vec![],
            returns: vec![],
        }
    }

    pub(crate) fn clear(&mut self) {
        self.transitions.clear();
        self.advantages.clear();
        self.returns.clear();
    }

    pub(crate) fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub(crate) fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub(crate) fn advantages(&self) -> &[f64] {
        &self.advantages
    }

    pub(crate) fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Generalized advantage estimation; `last_values` holds the value estimates of the
    /// observations following the last stored step.
    ///
    /// Finished episodes are not bootstrapped.
    pub(crate) fn compute_gae(&mut self, last_values: &[f64], gamma: f64, gae_lambda: f64) {
        debug_assert_eq!(last_values.len(), self.n_envs);
        debug_assert_eq!(self.transitions.len() % self.n_envs, 0);
        let n_steps = self.transitions.len() / self.n_envs;
        self.advantages = vec![0.0; self.transitions.len()];

        for env in 0..self.n_envs {
            let mut gae = 0.0;
            for t in (0..n_steps).rev() {
                let transition = &self.transitions[t * self.n_envs + env];
                let next_value = if t + 1 == n_steps {
                    last_values[env]
                } else {
                    self.transitions[(t + 1) * self.n_envs + env].value
                };
                let non_terminal = if transition.done { 0.0 } else { 1.0 };
                let delta =
                    transition.reward + gamma * next_value * non_terminal - transition.value;
                gae = delta + gamma * gae_lambda * non_terminal * gae;
                self.advantages[t * self.n_envs + env] = gae;
            }
        }

        self.returns = self
            .advantages
            .iter()
            .zip(&self.transitions)
            .map(|(advantage, transition)| advantage + transition.value)
            .collect();
    }
}

/// Rescales `advantages` to zero mean and unit variance.
pub(crate) fn normalize(advantages: &mut [f64]) {
    if advantages.len() < 2 {
        return;
    }
    #[expect(clippy::cast_precision_loss)]
    let n = advantages.len() as f64;
    let mean = advantages.iter().sum::<f64>() / n;
    let variance = advantages.iter().map(|a| (a - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt() + 1e-8;
    for advantage in advantages {
        *advantage = (*advantage - mean) / std;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transition(reward: f64, done: bool, value: f64) -> Transition {
        Transition {
            features: vec![],
            action: 0,
            reward,
            done,
            value,
            probabilities: vec![1.0],
        }
    }

    #[test]
    fn test_monte_carlo_returns_with_unit_lambda() {
        let mut buffer = RolloutBuffer::new(3, 1);
        buffer.push(transition(1.0, false, 0.0));
        buffer.push(transition(2.0, false, 0.0));
        buffer.push(transition(3.0, false, 0.0));
        buffer.compute_gae(&[10.0], 0.5, 1.0);
        // 1 + 0.5 * 6, 2 + 0.5 * 8, 3 + 0.5 * 10
        assert_eq!(buffer.returns(), &[4.0, 6.0, 8.0]);
        assert_eq!(buffer.advantages(), buffer.returns());
    }

    #[test]
    fn test_done_stops_bootstrapping() {
        let mut buffer = RolloutBuffer::new(2, 1);
        buffer.push(transition(1.0, true, 0.5));
        buffer.push(transition(1.0, false, 0.5));
        buffer.compute_gae(&[100.0], 1.0, 1.0);
        assert_eq!(buffer.returns()[0], 1.0);
        assert_eq!(buffer.advantages()[0], 0.5);
        assert_eq!(buffer.returns()[1], 101.0);
    }

    #[test]
    fn test_replicas_are_independent() {
        let mut buffer = RolloutBuffer::new(2, 2);
        // t = 0
        buffer.push(transition(1.0, false, 0.0));
        buffer.push(transition(0.0, false, 0.0));
        // t = 1
        buffer.push(transition(1.0, false, 0.0));
        buffer.push(transition(5.0, false, 0.0));
        buffer.compute_gae(&[0.0, 0.0], 1.0, 1.0);
        assert_eq!(buffer.returns(), &[2.0, 5.0, 1.0, 5.0]);
    }

    #[test]
    fn test_zero_lambda_is_td_error() {
        let mut buffer = RolloutBuffer::new(2, 1);
        buffer.push(transition(1.0, false, 2.0));
        buffer.push(transition(0.0, false, 3.0));
        buffer.compute_gae(&[0.0], 0.9, 0.0);
        assert!((buffer.advantages()[0] - (1.0 + 0.9 * 3.0 - 2.0)).abs() < 1e-12);
        assert!((buffer.advantages()[1] + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize() {
        let mut advantages = vec![1.0, 2.0, 3.0, 4.0];
        normalize(&mut advantages);
        let mean = advantages.iter().sum::<f64>() / 4.0;
        let variance = advantages.iter().map(|a| a * a).sum::<f64>() / 4.0;
        assert!(mean.abs() < 1e-12);
        assert!((variance - 1.0).abs() < 1e-6);

        let mut single = vec![3.0];
        normalize(&mut single);
        assert_eq!(single, vec![3.0]);
    }
}
