//! Discrete-time production line simulations.
//!
//! Every line moves parts from a source through processing stations into a sink.
//! Time advances in integer ticks; an agent acts once per [`Line::step`], which
//! applies one discrete action and then advances the line by its step size.
//!
//! # Variants
//!
//! | Name                 | Model                                                         | Action                          |
//! |----------------------|---------------------------------------------------------------|---------------------------------|
//! | `part_distribution`  | [`MultiProcess`]: one source feeding parallel processes       | process receiving the next part |
//! | `worker_assignment`  | [`AssemblyLine`]: serial assemblies sharing a worker pool     | move one worker between cells   |
//! | `complex_line`       | [`AssemblyLine`] with staffing-dependent scrap                | move one worker between cells   |
//! | `waiting_time`       | [`WaitingTime`]: source, buffer and one process               | waiting time of the source      |
//! | `waiting_time_jump`  | [`WaitingTime`] with a processing-time jump and waiting scrap | waiting time of the source      |
//!
//! Lines are built through [`make_line`] (or [`make_line_by_name`]), which applies the
//! per-variant parameters and validates the station [`InfoSpec`].
//!
//! # Scrap factor
//!
//! Lines that scrap parts carry a [`ScrapFactor`], the difficulty knob of the task.
//! It is validated at the line boundary (`0 <= value <= MAX_SCRAP_FACTOR`) and survives
//! [`Line::reset`], so a value raised between episodes stays in effect.
//!
//! # Example
//!
//! ```
//! use lineflow_line::{LineConfig, LineKind, make_line};
//!
//! let config = LineConfig {
//!     n_cells: 3,
//!     curriculum: true,
//!     ..LineConfig::default()
//! };
//! let mut line = make_line(LineKind::ComplexLine, &config).unwrap();
//! assert_eq!(line.scrap_factor().map(|f| f.get()), Some(0.0));
//!
//! line.reset(7);
//! let report = line.step(0);
//! assert_eq!(report.ticks, 1);
//! ```

pub use self::{factory::*, info::*, line::*, scrap::*};

mod factory;
mod info;
mod line;
mod scrap;
mod station;
