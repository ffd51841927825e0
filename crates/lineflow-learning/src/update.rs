//! Parameter updates of the supported algorithms.
//!
//! All three work on the linear actor-critic of [`Policy`] and share the per-sample
//! derivatives below. Gradients are taken with respect to the logits and mapped onto
//! the parameters through [`Policy::accumulate_actor`].

use rand::{Rng, seq::SliceRandom as _};

use crate::{
    Policy, ScalarLogger,
    optimizer::{Adam, clip_grad_norm},
    policy::{entropy, kl_divergence},
    rollout::{RolloutBuffer, normalize},
};

/// Weight of the value loss in the combined PPO/A2C loss.
const VF_COEF: f64 = 0.5;

/// Metrics of one update.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub(crate) struct TrainStats {
    pub(crate) entropy: f64,
    pub(crate) policy_loss: f64,
    pub(crate) value_loss: f64,
    pub(crate) approx_kl: Option<f64>,
    pub(crate) clip_fraction: Option<f64>,
    pub(crate) line_search_success: Option<bool>,
}

impl TrainStats {
    pub(crate) fn record(&self, step: u64, logger: &mut dyn ScalarLogger) {
        logger.record(step, "train/entropy", self.entropy);
        logger.record(step, "train/policy_loss", self.policy_loss);
        logger.record(step, "train/value_loss", self.value_loss);
        if let Some(approx_kl) = self.approx_kl {
            logger.record(step, "train/approx_kl", approx_kl);
        }
        if let Some(clip_fraction) = self.clip_fraction {
            logger.record(step, "train/clip_fraction", clip_fraction);
        }
        if let Some(success) = self.line_search_success {
            logger.record(step, "train/is_line_search_success", f64::from(u8::from(success)));
        }
    }
}

#[derive(Debug, Default)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    #[expect(clippy::cast_precision_loss)]
    fn get(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Derivative of `-coef * ln p[action] - ent_coef * H(p)` with respect to the logits.
fn logit_gradient(probabilities: &[f64], action: usize, coef: f64, ent_coef: f64) -> Vec<f64> {
    let h = entropy(probabilities);
    probabilities
        .iter()
        .enumerate()
        .map(|(k, &p)| {
            let one_hot = if k == action { 1.0 } else { 0.0 };
            -coef * (one_hot - p) + ent_coef * p * (p.max(f64::MIN_POSITIVE).ln() + h)
        })
        .collect()
}

#[expect(clippy::cast_precision_loss)]
fn len_f64(len: usize) -> f64 {
    len as f64
}

fn batch_advantages(
    buffer: &RolloutBuffer,
    indices: &[usize],
    normalize_advantage: bool,
) -> Vec<f64> {
    let mut advantages = indices
        .iter()
        .map(|&i| buffer.advantages()[i])
        .collect::<Vec<_>>();
    if normalize_advantage {
        normalize(&mut advantages);
    }
    advantages
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PpoUpdate {
    pub(crate) batch_size: usize,
    pub(crate) n_epochs: usize,
    pub(crate) clip_range: f64,
    pub(crate) max_grad_norm: f64,
    pub(crate) ent_coef: f64,
    pub(crate) normalize_advantage: bool,
}

impl PpoUpdate {
    /// Clipped-surrogate epochs over shuffled minibatches.
    pub(crate) fn apply<R>(
        &self,
        policy: &mut Policy,
        optimizer: &mut Adam,
        buffer: &RolloutBuffer,
        rng: &mut R,
    ) -> TrainStats
    where
        R: Rng + ?Sized,
    {
        let transitions = buffer.transitions();
        let mut indices = (0..transitions.len()).collect::<Vec<_>>();
        let (mut entropy_mean, mut policy_loss, mut value_loss) =
            (Mean::default(), Mean::default(), Mean::default());
        let (mut approx_kl, mut clip_fraction) = (Mean::default(), Mean::default());

        for _ in 0..self.n_epochs {
            indices.shuffle(rng);
            for batch in indices.chunks(self.batch_size.max(1)) {
                let advantages = batch_advantages(buffer, batch, self.normalize_advantage);
                let n = len_f64(batch.len());
                let mut grad = vec![0.0; policy.params().len()];

                for (&i, &advantage) in batch.iter().zip(&advantages) {
                    let transition = &transitions[i];
                    let probabilities = policy.probabilities(&transition.features);
                    let log_prob = probabilities[transition.action]
                        .max(f64::MIN_POSITIVE)
                        .ln();
                    let log_ratio = log_prob - transition.log_prob();
                    let ratio = log_ratio.exp();
                    let clipped = ratio.clamp(1.0 - self.clip_range, 1.0 + self.clip_range);
                    let surrogate = ratio * advantage;
                    let clipped_surrogate = clipped * advantage;

                    // the clipped branch is constant in the parameters
                    let coef = if surrogate <= clipped_surrogate {
                        advantage * ratio
                    } else {
                        0.0
                    };
                    let d_logits = logit_gradient(
                        &probabilities,
                        transition.action,
                        coef,
                        self.ent_coef,
                    )
                    .into_iter()
                    .map(|d| d / n)
                    .collect::<Vec<_>>();
                    policy.accumulate_actor(&mut grad, &transition.features, &d_logits);

                    let value = policy.value(&transition.features);
                    let ret = buffer.returns()[i];
                    policy.accumulate_critic(
                        &mut grad,
                        &transition.features,
                        VF_COEF * 2.0 * (value - ret) / n,
                    );

                    entropy_mean.push(entropy(&probabilities));
                    policy_loss.push(-surrogate.min(clipped_surrogate));
                    value_loss.push((ret - value).powi(2));
                    approx_kl.push((ratio - 1.0) - log_ratio);
                    clip_fraction.push(f64::from(u8::from(
                        (ratio - 1.0).abs() > self.clip_range,
                    )));
                }

                clip_grad_norm(&mut grad, self.max_grad_norm);
                optimizer.step(policy.params_mut(), &grad);
            }
        }

        TrainStats {
            entropy: entropy_mean.get(),
            policy_loss: policy_loss.get(),
            value_loss: value_loss.get(),
            approx_kl: Some(approx_kl.get()),
            clip_fraction: Some(clip_fraction.get()),
            line_search_success: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct A2cUpdate {
    pub(crate) max_grad_norm: f64,
    pub(crate) ent_coef: f64,
    pub(crate) normalize_advantage: bool,
}

impl A2cUpdate {
    /// One gradient step on the whole rollout.
    pub(crate) fn apply(
        &self,
        policy: &mut Policy,
        optimizer: &mut Adam,
        buffer: &RolloutBuffer,
    ) -> TrainStats {
        let transitions = buffer.transitions();
        let indices = (0..transitions.len()).collect::<Vec<_>>();
        let advantages = batch_advantages(buffer, &indices, self.normalize_advantage);
        let n = len_f64(transitions.len());
        let mut grad = vec![0.0; policy.params().len()];
        let (mut entropy_mean, mut policy_loss, mut value_loss) =
            (Mean::default(), Mean::default(), Mean::default());

        for ((transition, &advantage), &ret) in
            transitions.iter().zip(&advantages).zip(buffer.returns())
        {
            let probabilities = policy.probabilities(&transition.features);
            let d_logits =
                logit_gradient(&probabilities, transition.action, advantage, self.ent_coef)
                    .into_iter()
                    .map(|d| d / n)
                    .collect::<Vec<_>>();
            policy.accumulate_actor(&mut grad, &transition.features, &d_logits);

            let value = policy.value(&transition.features);
            policy.accumulate_critic(
                &mut grad,
                &transition.features,
                VF_COEF * 2.0 * (value - ret) / n,
            );

            let log_prob = probabilities[transition.action]
                .max(f64::MIN_POSITIVE)
                .ln();
            entropy_mean.push(entropy(&probabilities));
            policy_loss.push(-advantage * log_prob);
            value_loss.push((ret - value).powi(2));
        }

        clip_grad_norm(&mut grad, self.max_grad_norm);
        optimizer.step(policy.params_mut(), &grad);

        TrainStats {
            entropy: entropy_mean.get(),
            policy_loss: policy_loss.get(),
            value_loss: value_loss.get(),
            ..TrainStats::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TrpoUpdate {
    pub(crate) batch_size: usize,
    pub(crate) target_kl: f64,
    pub(crate) cg_max_steps: usize,
    pub(crate) cg_damping: f64,
    pub(crate) line_search_max_iter: usize,
    pub(crate) line_search_shrinking_factor: f64,
    pub(crate) n_critic_updates: usize,
    pub(crate) normalize_advantage: bool,
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Logit changes caused by moving the actor parameters along `direction`.
fn logit_direction(direction: &[f64], row_len: usize, features: &[f64]) -> Vec<f64> {
    direction
        .chunks_exact(row_len)
        .map(|row| match row.split_last() {
            Some((bias, weights)) => dot(weights, features) + bias,
            None => 0.0,
        })
        .collect()
}

/// Solves `A x = b` for a symmetric positive definite `A` given as a product.
fn conjugate_gradient<F>(mut product: F, b: &[f64], max_steps: usize) -> Vec<f64>
where
    F: FnMut(&[f64]) -> Vec<f64>,
{
    let mut x = vec![0.0; b.len()];
    let mut r = b.to_vec();
    let mut p = b.to_vec();
    let mut rs = dot(&r, &r);
    for _ in 0..max_steps {
        if rs < 1e-10 {
            break;
        }
        let ap = product(&p);
        let p_ap = dot(&p, &ap);
        if p_ap <= 0.0 {
            break;
        }
        let alpha = rs / p_ap;
        for ((x, r), (p, ap)) in x.iter_mut().zip(&mut r).zip(p.iter().zip(&ap)) {
            *x += alpha * p;
            *r -= alpha * ap;
        }
        let rs_next = dot(&r, &r);
        let beta = rs_next / rs;
        for (p, r) in p.iter_mut().zip(&r) {
            *p = r + beta * *p;
        }
        rs = rs_next;
    }
    x
}

impl TrpoUpdate {
    /// Natural-gradient actor step with a KL-constrained backtracking line search,
    /// followed by critic regression.
    pub(crate) fn apply<R>(
        &self,
        policy: &mut Policy,
        critic_optimizer: &mut Adam,
        buffer: &RolloutBuffer,
        rng: &mut R,
    ) -> TrainStats
    where
        R: Rng + ?Sized,
    {
        let transitions = buffer.transitions();
        let mut indices = (0..transitions.len()).collect::<Vec<_>>();
        let advantages = batch_advantages(buffer, &indices, self.normalize_advantage);
        let n = len_f64(transitions.len());
        let actor_len = policy.actor_len();
        let row_len = policy.feature_len() + 1;

        // objective gradient, ascent direction
        let mut grad = vec![0.0; policy.params().len()];
        for (transition, &advantage) in transitions.iter().zip(&advantages) {
            let d_logits =
                logit_gradient(&transition.probabilities, transition.action, advantage, 0.0)
                    .into_iter()
                    .map(|d| -d / n)
                    .collect::<Vec<_>>();
            policy.accumulate_actor(&mut grad, &transition.features, &d_logits);
        }
        let objective_grad = &grad[..actor_len];

        let fisher_product = |v: &[f64]| {
            let mut out = vec![0.0; actor_len];
            for transition in transitions {
                let p = &transition.probabilities;
                let u = logit_direction(v, row_len, &transition.features);
                let pu = dot(p, &u);
                let d = p
                    .iter()
                    .zip(&u)
                    .map(|(p, u)| p * (u - pu) / n)
                    .collect::<Vec<_>>();
                policy.accumulate_actor(&mut out, &transition.features, &d);
            }
            for (out, v) in out.iter_mut().zip(v) {
                *out += self.cg_damping * v;
            }
            out
        };

        let search_dir = conjugate_gradient(&fisher_product, objective_grad, self.cg_max_steps);
        let shs = dot(&search_dir, &fisher_product(&search_dir));

        let old_actor = policy.params()[..actor_len].to_vec();
        let surrogate = |policy: &Policy| {
            let mut objective = Mean::default();
            let mut kl = Mean::default();
            for (transition, &advantage) in transitions.iter().zip(&advantages) {
                let probabilities = policy.probabilities(&transition.features);
                let ratio = probabilities[transition.action]
                    / transition.probabilities[transition.action].max(f64::MIN_POSITIVE);
                objective.push(ratio * advantage);
                kl.push(kl_divergence(&transition.probabilities, &probabilities));
            }
            (objective.get(), kl.get())
        };
        let (original_objective, _) = surrogate(&*policy);

        let mut success = false;
        let mut objective = original_objective;
        let mut approx_kl = 0.0;
        if shs.is_finite() && shs > 0.0 {
            let step_size = (2.0 * self.target_kl / shs).sqrt();
            let mut coef = step_size;
            for _ in 0..self.line_search_max_iter {
                for ((param, old), dir) in policy.params_mut()[..actor_len]
                    .iter_mut()
                    .zip(&old_actor)
                    .zip(&search_dir)
                {
                    *param = old + coef * dir;
                }
                let (new_objective, kl) = surrogate(&*policy);
                if kl < self.target_kl && new_objective > original_objective {
                    success = true;
                    objective = new_objective;
                    approx_kl = kl;
                    break;
                }
                coef *= self.line_search_shrinking_factor;
            }
        }
        if !success {
            policy.params_mut()[..actor_len].copy_from_slice(&old_actor);
        }

        let mut value_loss = Mean::default();
        for _ in 0..self.n_critic_updates {
            indices.shuffle(rng);
            for batch in indices.chunks(self.batch_size.max(1)) {
                let m = len_f64(batch.len());
                let mut grad = vec![0.0; policy.params().len()];
                for &i in batch {
                    let transition = &transitions[i];
                    let value = policy.value(&transition.features);
                    let ret = buffer.returns()[i];
                    policy.accumulate_critic(
                        &mut grad,
                        &transition.features,
                        2.0 * (value - ret) / m,
                    );
                    value_loss.push((ret - value).powi(2));
                }
                critic_optimizer.step(&mut policy.params_mut()[actor_len..], &grad[actor_len..]);
            }
        }

        let mut entropy_mean = Mean::default();
        for transition in transitions {
            entropy_mean.push(entropy(&policy.probabilities(&transition.features)));
        }

        TrainStats {
            entropy: entropy_mean.get(),
            policy_loss: -objective,
            value_loss: value_loss.get(),
            approx_kl: Some(approx_kl),
            clip_fraction: None,
            line_search_success: Some(success),
        }
    }
}
