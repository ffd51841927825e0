use crate::{
    AssemblyLine, BoxedLine, InfoSpec, LineKind, MultiProcess, ScrapFactor, ScrapFactorError,
    StationAttribute, UnknownSimulationError, WaitingTime,
};

const PROCESSING_TIME_SOURCE: u32 = 5;
const T_JUMP_MAX: u32 = 2000;

/// Parameters shared by all line variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub n_cells: usize,
    /// Station attributes attached to finished episodes.
    pub info: InfoSpec,
    /// Ticks per agent step. Ignored by `complex_line`, which always steps one tick.
    pub step_size: u32,
    /// Start scrap-capable lines at zero difficulty so a curriculum can raise it.
    pub curriculum: bool,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            n_cells: 3,
            info: InfoSpec::default(),
            step_size: 1,
            curriculum: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum MakeLineError {
    #[display("{_0}")]
    #[from]
    UnknownSimulation(UnknownSimulationError),
    #[display("a line needs at least one cell")]
    NoCells,
    #[display("{n_cells} cells requested, worker count overflows")]
    TooManyCells { n_cells: usize },
    #[display("step size must be positive")]
    ZeroStepSize,
    #[display("line has no station `{station}` reporting `{attribute}`")]
    UnknownStation {
        station: String,
        attribute: StationAttribute,
    },
    #[display("{_0}")]
    #[from]
    ScrapFactor(ScrapFactorError),
}

/// Builds the line variant `kind` from `config`.
///
/// # Examples
///
/// ```
/// use lineflow_line::{LineConfig, LineKind, MakeLineError, make_line};
///
/// let line = make_line(LineKind::PartDistribution, &LineConfig::default()).unwrap();
/// assert_eq!(line.action_count(), 3);
///
/// let config = LineConfig { n_cells: 0, ..LineConfig::default() };
/// assert_eq!(
///     make_line(LineKind::WorkerAssignment, &config).unwrap_err(),
///     MakeLineError::NoCells,
/// );
/// ```
pub fn make_line(kind: LineKind, config: &LineConfig) -> Result<BoxedLine, MakeLineError> {
    let LineConfig {
        n_cells,
        ref info,
        step_size,
        curriculum,
    } = *config;
    if n_cells == 0 {
        return Err(MakeLineError::NoCells);
    }
    if step_size == 0 {
        return Err(MakeLineError::ZeroStepSize);
    }
    let n_workers = u32::try_from(n_cells)
        .ok()
        .and_then(|n| n.checked_mul(3))
        .ok_or(MakeLineError::TooManyCells { n_cells })?;

    let line: BoxedLine = match kind {
        LineKind::PartDistribution => {
            Box::new(MultiProcess::new(n_cells, false, step_size, info.clone()))
        }
        LineKind::WorkerAssignment => Box::new(AssemblyLine::worker_assignment(
            n_cells,
            n_workers,
            false,
            step_size,
            info.clone(),
        )),
        LineKind::ComplexLine => {
            #[expect(clippy::cast_precision_loss)]
            let scrap_factor = if curriculum {
                ScrapFactor::ZERO
            } else {
                ScrapFactor::new(1.0 / n_cells as f64)?
            };
            Box::new(AssemblyLine::complex_line(
                n_cells,
                n_workers,
                false,
                scrap_factor,
                1,
                info.clone(),
            ))
        }
        LineKind::WaitingTime => Box::new(WaitingTime::new(
            PROCESSING_TIME_SOURCE,
            ScrapFactor::ZERO,
            step_size,
            info.clone(),
        )),
        LineKind::WaitingTimeJump => Box::new(WaitingTime::with_jump(
            PROCESSING_TIME_SOURCE,
            T_JUMP_MAX,
            ScrapFactor::new(1.0)?,
            step_size,
            info.clone(),
        )),
    };

    if let Some(entry) = info
        .entries()
        .iter()
        .find(|entry| line.station_value(&entry.station, entry.attribute).is_none())
    {
        return Err(MakeLineError::UnknownStation {
            station: entry.station.clone(),
            attribute: entry.attribute,
        });
    }

    Ok(line)
}

/// Parses `name` as a [`LineKind`] and builds it; fails before building anything if the
/// name is unknown.
pub fn make_line_by_name(name: &str, config: &LineConfig) -> Result<BoxedLine, MakeLineError> {
    let kind = name.parse::<LineKind>()?;
    make_line(kind, config)
}
