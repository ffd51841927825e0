use std::path::PathBuf;

use lineflow_line::{LineConfig, LineKind, make_line};
use serde::Serialize;

use crate::util::JsonSink;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct LinesArg {
    /// Number of cells of the configurable lines
    #[arg(long, default_value_t = 3)]
    n_cells: usize,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct LineDescription {
    name: LineKind,
    observation_len: usize,
    action_count: usize,
    step_size: u32,
    stations: Vec<String>,
    supports_curriculum: bool,
    scrap_factor: Option<f64>,
}

fn describe(n_cells: usize) -> anyhow::Result<Vec<LineDescription>> {
    let config = LineConfig {
        n_cells,
        ..LineConfig::default()
    };
    LineKind::ALL
        .into_iter()
        .map(|kind| -> anyhow::Result<LineDescription> {
            let line = make_line(kind, &config)?;
            Ok(LineDescription {
                name: kind,
                observation_len: line.observation_len(),
                action_count: line.action_count(),
                step_size: line.step_size(),
                stations: line.station_names(),
                supports_curriculum: kind.supports_curriculum(),
                scrap_factor: line.scrap_factor().map(|factor| factor.get()),
            })
        })
        .collect()
}

pub(crate) fn run(arg: &LinesArg) -> anyhow::Result<()> {
    let LinesArg { n_cells, output } = arg;
    let descriptions = describe(*n_cells)?;
    JsonSink::save(&descriptions, output.as_deref())?;
    Ok(())
}
