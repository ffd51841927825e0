use std::path::PathBuf;

use anyhow::Context as _;
use lineflow_env::{RewardKind, make_stacked_vec_env};
use lineflow_learning::{
    Algorithm, AlgorithmArgs, Callback, CallbackContext, CallbackList, CommonConfig,
    CurriculumConfig, CurriculumController, EvalCallback, EvalObserver, EvalSettings, Model,
    ModelConfig, NoCurriculum, TrainingError,
};
use lineflow_line::{InfoSpec, LineConfig, LineKind, make_line};
use log::{info, warn};
use serde::Serialize;

use crate::tracker::RunTracker;

const PROJECT: &str = "lineflow";

#[derive(Debug, Clone, clap::Args)]
#[expect(clippy::struct_excessive_bools)]
pub(crate) struct TrainArg {
    /// Line variant to train on
    #[arg(long, default_value = "worker_assignment")]
    env: LineKind,
    /// Number of cells of the line
    #[arg(long, default_value_t = 3)]
    n_cells: usize,
    /// Learning algorithm: PPO, A2C or TRPO
    #[arg(long, default_value = "PPO")]
    model: Algorithm,
    #[arg(long, default_value_t = 0.0003)]
    learning_rate: f64,
    /// Entropy coefficient (PPO, A2C)
    #[arg(long, default_value_t = 0.1)]
    ent_coef: f64,
    /// Observations stacked into one agent input; forced to 1 with --recurrent
    #[arg(long, default_value_t = 1)]
    n_stack: usize,
    /// Steps per environment between two updates
    #[arg(long, default_value_t = 500)]
    n_steps: usize,
    /// Number of training environment replicas
    #[arg(long, default_value_t = 5)]
    n_envs: usize,
    /// Random seed; 0 draws a random one
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Total environment steps to train for
    #[arg(long, default_value_t = 500_000)]
    total_steps: u64,
    /// Directory that receives the run directories
    #[arg(long, default_value = "./logs")]
    log_dir: PathBuf,
    /// Simulation time at which an episode ends
    #[arg(long, default_value_t = 4000)]
    simulation_end: u32,
    #[arg(long, default_value_t = 0.99)]
    gamma: f64,
    /// Clip range (PPO)
    #[arg(long, default_value_t = 0.2)]
    clip_range: f64,
    /// Gradient norm limit (PPO, A2C)
    #[arg(long, default_value_t = 0.5)]
    max_grad_norm: f64,
    #[arg(long)]
    normalize_advantage: bool,
    /// Use a recurrent policy (PPO only)
    #[arg(long)]
    recurrent: bool,
    /// Evaluate with the most likely action instead of sampling
    #[arg(long)]
    deterministic: bool,
    /// Raise the scrap factor as evaluations improve (complex_line only)
    #[arg(long)]
    curriculum: bool,
    /// Station values reported per episode, e.g. "[('A1', 'n_workers')]"
    #[arg(long, default_value = "[]")]
    info: InfoSpec,
    #[arg(long, default_value = "parts")]
    eval_reward: RewardKind,
    #[arg(long, default_value = "parts")]
    rollout_reward: RewardKind,
    /// Rollouts between two evaluations
    #[arg(long, default_value_t = 10)]
    eval_multiplier: u64,
    #[arg(long, default_value_t = 1)]
    n_eval_episodes: usize,
    /// Evaluation reward every sample of the look-back window has to exceed
    #[arg(long, default_value_t = 100.0)]
    curriculum_threshold: f64,
    /// Consecutive evaluations considered by the curriculum
    #[arg(long, default_value_t = 3)]
    curriculum_look_back: usize,
}

/// Effective configuration of a run, written to the tracker.
#[derive(Debug, Clone, Serialize)]
struct RunConfig {
    env: LineKind,
    n_cells: usize,
    info: InfoSpec,
    simulation_end: u32,
    n_envs: usize,
    n_stack: usize,
    total_steps: u64,
    eval_reward: RewardKind,
    rollout_reward: RewardKind,
    eval_freq: u64,
    n_eval_episodes: usize,
    deterministic: bool,
    curriculum: Option<CurriculumConfig>,
    model: ModelConfig,
}

/// Logs training progress in steps of ten percent.
#[derive(Debug, Default)]
struct ProgressCallback {
    total_timesteps: u64,
    next_percent: u64,
}

impl Callback for ProgressCallback {
    fn on_training_start(&mut self, total_timesteps: u64) {
        self.total_timesteps = total_timesteps.max(1);
        self.next_percent = 10;
    }

    fn on_step(&mut self, ctx: &mut CallbackContext<'_>) -> Result<bool, TrainingError> {
        let percent = ctx.num_timesteps.saturating_mul(100) / self.total_timesteps;
        if percent >= self.next_percent {
            info!(
                "progress {percent}% ({}/{} timesteps)",
                ctx.num_timesteps, self.total_timesteps
            );
            self.next_percent = (percent / 10 + 1) * 10;
        }
        Ok(true)
    }

    fn on_training_end(&mut self, num_timesteps: u64) {
        info!("training finished after {num_timesteps} timesteps");
    }
}

impl TrainArg {
    fn seed(&self) -> Option<u64> {
        (self.seed != 0).then_some(self.seed)
    }

    fn n_stack(&self) -> usize {
        if self.recurrent { 1 } else { self.n_stack }
    }

    fn curriculum_config(&self) -> Option<CurriculumConfig> {
        (self.curriculum && self.env.supports_curriculum()).then(|| {
            CurriculumConfig::for_cells(
                self.n_cells,
                self.curriculum_threshold,
                self.curriculum_look_back,
            )
        })
    }

    fn model_config(&self) -> anyhow::Result<ModelConfig> {
        let common = CommonConfig {
            n_steps: self.n_steps,
            gamma: self.gamma,
            learning_rate: self.learning_rate,
            normalize_advantage: self.normalize_advantage,
            seed: self.seed(),
            ..CommonConfig::default()
        };
        let args = AlgorithmArgs {
            clip_range: self.clip_range,
            max_grad_norm: self.max_grad_norm,
            ent_coef: self.ent_coef,
        };
        ModelConfig::new(self.model, self.recurrent, common, args)
            .context("Invalid model configuration")
    }

    fn eval_freq(&self) -> u64 {
        (self.n_steps as u64)
            .saturating_mul(self.n_envs as u64)
            .saturating_mul(self.eval_multiplier)
    }

    fn run_config(&self) -> anyhow::Result<RunConfig> {
        Ok(RunConfig {
            env: self.env,
            n_cells: self.n_cells,
            info: self.info.clone(),
            simulation_end: self.simulation_end,
            n_envs: self.n_envs,
            n_stack: self.n_stack(),
            total_steps: self.total_steps,
            eval_reward: self.eval_reward,
            rollout_reward: self.rollout_reward,
            eval_freq: self.eval_freq(),
            n_eval_episodes: self.n_eval_episodes,
            deterministic: self.deterministic,
            curriculum: self.curriculum_config(),
            model: self.model_config()?,
        })
    }
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let config = arg.run_config()?;
    if arg.recurrent && arg.n_stack > 1 {
        warn!("--recurrent ignores --n-stack {}, stacking 1 observation", arg.n_stack);
    }
    if arg.curriculum && !arg.env.supports_curriculum() {
        warn!("--curriculum has no effect on {}", arg.env);
    }

    let line_config = LineConfig {
        n_cells: arg.n_cells,
        info: arg.info.clone(),
        curriculum: arg.curriculum,
        ..LineConfig::default()
    };
    let train_line = make_line(arg.env, &line_config).context("Failed to build training line")?;
    let eval_line = make_line(arg.env, &line_config).context("Failed to build evaluation line")?;

    // episodes include the tick at `simulation_end`
    let simulation_end = arg.simulation_end.saturating_add(1);
    let seed = arg.seed();
    let mut train_env = make_stacked_vec_env(
        &train_line,
        simulation_end,
        arg.rollout_reward,
        arg.n_envs,
        config.n_stack,
        seed,
    )
    .context("Failed to build training environments")?;
    let eval_env = make_stacked_vec_env(
        &eval_line,
        simulation_end,
        arg.eval_reward,
        1,
        config.n_stack,
        seed.map(|seed| seed.wrapping_add(1)),
    )
    .context("Failed to build evaluation environment")?;

    let mut tracker = RunTracker::start(&arg.log_dir, PROJECT, &config)?;

    let observer: Box<dyn EvalObserver> = match config.curriculum {
        Some(curriculum) => Box::new(
            CurriculumController::new(curriculum).context("Invalid curriculum configuration")?,
        ),
        None => Box::new(NoCurriculum),
    };
    let eval_callback = EvalCallback::new(
        eval_env,
        observer,
        EvalSettings {
            eval_freq: config.eval_freq,
            n_eval_episodes: arg.n_eval_episodes,
            deterministic: arg.deterministic,
            seed: seed.map(|seed| seed.wrapping_add(2)),
        },
    )
    .context("Invalid evaluation settings")?;
    let mut callbacks = CallbackList::new(vec![
        Box::new(eval_callback) as Box<dyn Callback>,
        Box::new(ProgressCallback::default()),
    ]);

    let mut model = Model::new(config.model, &train_env);
    model
        .learn(&mut train_env, arg.total_steps, &mut callbacks, &mut tracker)
        .context("Training failed")?;
    info!("run files written to {}", tracker.dir().display());
    tracker.finish();
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use lineflow_learning::Hyperparameters;

    use super::*;

    #[derive(Debug, Parser)]
    struct Cli {
        #[command(flatten)]
        arg: TrainArg,
    }

    fn parse(args: &[&str]) -> Result<TrainArg, clap::Error> {
        Cli::try_parse_from(std::iter::once("train").chain(args.iter().copied())).map(|cli| cli.arg)
    }

    #[test]
    fn test_defaults() {
        let arg = parse(&[]).unwrap();
        assert_eq!(arg.env, LineKind::WorkerAssignment);
        assert_eq!(arg.model, Algorithm::Ppo);
        assert_eq!(arg.n_cells, 3);
        assert_eq!(arg.n_envs, 5);
        assert_eq!(arg.n_steps, 500);
        assert_eq!(arg.total_steps, 500_000);
        assert_eq!(arg.simulation_end, 4000);
        assert_eq!(arg.eval_reward, RewardKind::Parts);
        assert!(arg.info.is_empty());
        assert_eq!(arg.seed(), None);
        assert_eq!(arg.eval_freq(), 25_000);
        assert!(arg.curriculum_config().is_none());
    }

    #[test]
    fn test_flags() {
        let arg = parse(&[
            "--env",
            "complex_line",
            "--model",
            "trpo",
            "--curriculum",
            "--n-cells",
            "4",
            "--info",
            "[('A0', 'n_workers')]",
            "--rollout-reward",
            "uptime",
            "--seed",
            "7",
        ])
        .unwrap();
        assert_eq!(arg.env, LineKind::ComplexLine);
        assert_eq!(arg.model, Algorithm::Trpo);
        assert_eq!(arg.info.entries().len(), 1);
        assert_eq!(arg.rollout_reward, RewardKind::Uptime);
        assert_eq!(arg.seed(), Some(7));

        let curriculum = arg.curriculum_config().unwrap();
        assert_eq!(curriculum.factor_max, 0.25);
        assert_eq!(curriculum.look_back, 3);
        assert_eq!(curriculum.threshold, 100.0);
    }

    #[test]
    fn test_invalid_values_fail_parsing() {
        assert!(parse(&["--env", "conveyor"]).is_err());
        assert!(parse(&["--model", "DQN"]).is_err());
        assert!(parse(&["--info", "[('A0', 'colour')]"]).is_err());
        assert!(parse(&["--info", "[('A0'"]).is_err());
        assert!(parse(&["--eval-reward", "profit"]).is_err());
    }

    #[test]
    fn test_recurrent_forces_single_frame() {
        let arg = parse(&["--recurrent", "--n-stack", "4"]).unwrap();
        assert_eq!(arg.n_stack(), 1);
        let config = arg.run_config().unwrap();
        assert!(matches!(
            config.model.hyperparameters,
            Hyperparameters::Ppo {
                recurrent: true,
                ..
            }
        ));

        let arg = parse(&["--recurrent", "--model", "A2C"]).unwrap();
        assert!(arg.run_config().is_err());
    }

    #[test]
    fn test_short_training_run() {
        let log_dir = std::env::temp_dir().join(format!(
            "lineflow-train-{}-{:08x}",
            std::process::id(),
            rand::random::<u32>()
        ));
        let log_dir_arg = log_dir.to_str().unwrap();
        let arg = parse(&[
            "--env",
            "complex_line",
            "--curriculum",
            "--n-steps",
            "10",
            "--n-envs",
            "2",
            "--total-steps",
            "40",
            "--simulation-end",
            "15",
            "--eval-multiplier",
            "1",
            "--seed",
            "3",
            "--log-dir",
            log_dir_arg,
        ])
        .unwrap();
        run(&arg).unwrap();

        let runs = std::fs::read_dir(&log_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect::<Vec<_>>();
        assert_eq!(runs.len(), 1);
        for file in ["config.json", "metrics.jsonl", "summary.json"] {
            assert!(runs[0].join(file).is_file(), "{file}");
        }
        let summary: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(runs[0].join("summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary["metrics"]["time/total_timesteps"], 40.0);
        assert!(summary["metrics"]["eval/mean_reward"].is_number());
        assert!(summary["metrics"]["curriculum/scrap_factor"].is_number());

        std::fs::remove_dir_all(&log_dir).unwrap();
    }
}
