//! File-based run tracking.
//!
//! A run lives in `<log_dir>/<run_id>/`:
//!
//! - `config.json`: project, run id, start time and the effective configuration
//! - `metrics.jsonl`: one `{"step", "key", "value"}` object per recorded scalar
//! - `summary.json`: last value of every key and the finish time
//!
//! Write failures after the run has started are reported once and then disable the
//! tracker; training goes on.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use lineflow_learning::ScalarLogger;
use log::{info, warn};
use serde::Serialize;

use crate::util::JsonSink;

#[derive(Debug, Serialize)]
struct RunHeader<'a, C> {
    project: &'a str,
    run_id: &'a str,
    started_at: DateTime<Utc>,
    config: &'a C,
}

#[derive(Debug, Serialize)]
struct MetricRecord<'a> {
    step: u64,
    key: &'a str,
    value: f64,
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    project: &'a str,
    run_id: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    metrics: &'a BTreeMap<String, f64>,
}

#[derive(Debug)]
pub struct RunTracker {
    project: String,
    run_id: String,
    dir: PathBuf,
    started_at: DateTime<Utc>,
    /// `None` once a write has failed.
    metrics: Option<JsonSink>,
    last_values: BTreeMap<String, f64>,
}

impl RunTracker {
    /// Creates the run directory and writes `config.json`.
    pub fn start<C>(log_dir: &Path, project: &str, config: &C) -> anyhow::Result<Self>
    where
        C: Serialize,
    {
        let started_at = Utc::now();
        let run_id = format!(
            "{}-{:06x}",
            started_at.format("%Y%m%dT%H%M%SZ"),
            rand::random::<u32>() & 0x00ff_ffff
        );
        let dir = log_dir.join(&run_id);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create run directory: {}", dir.display()))?;

        JsonSink::create(&dir.join("config.json"))?.write_document(&RunHeader {
            project,
            run_id: &run_id,
            started_at,
            config,
        })?;
        let metrics = JsonSink::create(&dir.join("metrics.jsonl"))?;

        info!("tracking run {run_id} in {}", dir.display());
        Ok(Self {
            project: project.to_owned(),
            run_id,
            dir,
            started_at,
            metrics: Some(metrics),
            last_values: BTreeMap::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Flushes the metrics and writes `summary.json`.
    pub fn finish(mut self) {
        if let Some(mut metrics) = self.metrics.take()
            && let Err(err) = metrics.flush()
        {
            warn!("failed to flush metrics of run {}: {err}", self.run_id);
        }

        let summary = RunSummary {
            project: &self.project,
            run_id: &self.run_id,
            started_at: self.started_at,
            finished_at: Utc::now(),
            metrics: &self.last_values,
        };
        let path = self.dir.join("summary.json");
        match JsonSink::create(&path).and_then(|mut sink| sink.write_document(&summary)) {
            Ok(()) => info!("run {} finished", self.run_id),
            Err(err) => warn!("failed to write summary of run {}: {err:#}", self.run_id),
        }
    }
}

impl ScalarLogger for RunTracker {
    fn record(&mut self, step: u64, key: &str, value: f64) {
        self.last_values.insert(key.to_owned(), value);
        let Some(metrics) = &mut self.metrics else {
            return;
        };
        if let Err(err) = metrics.write_record(&MetricRecord { step, key, value }) {
            warn!(
                "failed to record metrics of run {}, disabling tracking: {err}",
                self.run_id
            );
            self.metrics = None;
        }
    }
}
