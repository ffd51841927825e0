use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{
    InfoSpec, ScrapFactor, ScrapFactorError, StationAttribute,
    station::{Buffer, Completion, Part, Processor, ScrapRisk, Sink, Source},
};

use super::{ALTERNATE_PERIOD, BoxedLine, Line, LineKind, StepReport, station_index};

const SOURCE_INTERVAL: u32 = 3;
const BUFFER_CAPACITY: usize = 4;
const REWORK_PROBABILITY: f64 = 0.1;

fn base_time(i: usize) -> u32 {
    5 + u32::try_from(i % 3).unwrap_or(0)
}

/// Serial line of assembly stations sharing a pool of workers.
///
/// Each action moves one worker from one station to another: action `a` encodes the
/// pair `(a / n, a % n)`, and pairs with equal stations or an unstaffed origin are
/// no-ops. Stations divide their base processing time among their workers and stall
/// while unstaffed.
///
/// Two variants share this model:
///
/// - worker assignment, optionally reworking a share of the parts finished by the last
///   station, which then occupies that station again;
/// - the complex line, where every completion risks scrap with probability
///   `scrap_factor / workers` and processing times may alternate over time.
#[derive(Debug, Clone)]
pub struct AssemblyLine {
    kind: LineKind,
    n_assemblies: usize,
    n_workers: u32,
    with_rework: bool,
    alternate: bool,
    scrap_factor: Option<ScrapFactor>,
    step_size: u32,
    info: InfoSpec,
    now: u32,
    rng: Pcg32,
    source: Source,
    buffers: Vec<Buffer>,
    stations: Vec<Processor>,
    sink: Sink,
}

impl AssemblyLine {
    /// # Panics
    ///
    /// Panics if `n_assemblies` is zero.
    #[must_use]
    pub fn worker_assignment(
        n_assemblies: usize,
        n_workers: u32,
        with_rework: bool,
        step_size: u32,
        info: InfoSpec,
    ) -> Self {
        Self::new(
            LineKind::WorkerAssignment,
            n_assemblies,
            n_workers,
            with_rework,
            false,
            None,
            step_size,
            info,
        )
    }

    /// # Panics
    ///
    /// Panics if `n_assemblies` is zero.
    #[must_use]
    pub fn complex_line(
        n_assemblies: usize,
        n_workers: u32,
        alternate: bool,
        scrap_factor: ScrapFactor,
        step_size: u32,
        info: InfoSpec,
    ) -> Self {
        Self::new(
            LineKind::ComplexLine,
            n_assemblies,
            n_workers,
            false,
            alternate,
            Some(scrap_factor),
            step_size,
            info,
        )
    }

    #[expect(clippy::too_many_arguments)]
    fn new(
        kind: LineKind,
        n_assemblies: usize,
        n_workers: u32,
        with_rework: bool,
        alternate: bool,
        scrap_factor: Option<ScrapFactor>,
        step_size: u32,
        info: InfoSpec,
    ) -> Self {
        assert!(n_assemblies > 0);
        let mut line = Self {
            kind,
            n_assemblies,
            n_workers,
            with_rework,
            alternate,
            scrap_factor,
            step_size,
            info,
            now: 0,
            rng: Pcg32::seed_from_u64(0),
            source: Source::new(SOURCE_INTERVAL),
            buffers: (0..n_assemblies)
                .map(|_| Buffer::new(BUFFER_CAPACITY))
                .collect(),
            stations: (0..n_assemblies)
                .map(|i| Processor::with_workers(base_time(i), 0))
                .collect(),
            sink: Sink::default(),
        };
        line.distribute_workers();
        line
    }

    /// Spreads the worker pool round-robin over the stations.
    fn distribute_workers(&mut self) {
        let n = u32::try_from(self.n_assemblies).unwrap_or(u32::MAX);
        for (i, station) in (0..).zip(&mut self.stations) {
            let extra = u32::from(i < self.n_workers % n);
            station.set_workers(self.n_workers / n + extra);
        }
    }

    fn apply_alternation(&mut self) {
        let reversed = (self.now / ALTERNATE_PERIOD) % 2 == 1;
        let n = self.n_assemblies;
        for (i, station) in self.stations.iter_mut().enumerate() {
            let slot = if reversed { n - 1 - i } else { i };
            station.set_base_time(base_time(slot));
        }
    }

    fn scrap_risk(&self) -> ScrapRisk {
        match self.scrap_factor {
            Some(factor) if factor.get() > 0.0 => ScrapRisk::Staffing {
                factor: factor.get(),
            },
            _ => ScrapRisk::None,
        }
    }

    /// Moves the finished part of station `i` downstream, or leaves the station blocked.
    fn forward(&mut self, i: usize, report: &mut StepReport) {
        let Some(part) = self.stations[i].take_finished() else {
            return;
        };
        let now = self.now;
        if i + 1 < self.n_assemblies {
            if let Err(part) = self.buffers[i + 1].push(part, now) {
                self.stations[i].put_back(part);
            }
            return;
        }

        if self.with_rework && self.rng.random_bool(REWORK_PROBABILITY) {
            self.stations[i].rework(part, &mut self.rng);
            return;
        }
        self.sink.accept(part);
        report.produced += 1;
    }

    #[cfg(test)]
    fn workers(&self) -> Vec<u32> {
        self.stations.iter().map(Processor::workers).collect()
    }
}

impl Line for AssemblyLine {
    fn kind(&self) -> LineKind {
        self.kind
    }

    fn step_size(&self) -> u32 {
        self.step_size
    }

    fn now(&self) -> u32 {
        self.now
    }

    fn reset(&mut self, seed: u64) {
        self.rng = Pcg32::seed_from_u64(seed);
        self.now = 0;
        self.source.reset();
        self.buffers.iter_mut().for_each(Buffer::clear);
        self.stations.iter_mut().for_each(Processor::reset);
        self.sink.reset();
        self.distribute_workers();
        self.apply_alternation();
    }

    fn observation_len(&self) -> usize {
        3 * self.n_assemblies + 1
    }

    fn observe(&self, observation: &mut Vec<f64>) {
        let pool = f64::from(self.n_workers.max(1));
        for (buffer, station) in self.buffers.iter().zip(&self.stations) {
            observation.push(f64::from(station.workers()) / pool);
            observation.push(buffer.fill());
            observation.push(if station.is_busy() { 1.0 } else { 0.0 });
        }
        observation.push(self.scrap_factor.map_or(0.0, ScrapFactor::get));
    }

    fn action_count(&self) -> usize {
        self.n_assemblies * self.n_assemblies
    }

    fn apply_action(&mut self, action: usize) {
        let from = action / self.n_assemblies;
        let to = action % self.n_assemblies;
        if from == to || self.stations[from].workers() == 0 {
            return;
        }
        let moved = self.stations[from].workers() - 1;
        self.stations[from].set_workers(moved);
        let joined = self.stations[to].workers() + 1;
        self.stations[to].set_workers(joined);
    }

    fn tick(&mut self) -> StepReport {
        let now = self.now;
        let risk = self.scrap_risk();
        let mut report = StepReport {
            ticks: 1,
            station_ticks: u32::try_from(self.n_assemblies).unwrap_or(u32::MAX),
            ..StepReport::default()
        };

        // downstream first so parts advance at most one station per tick
        for i in (0..self.n_assemblies).rev() {
            self.forward(i, &mut report);
            let tick = self.stations[i].work(now, &mut self.buffers[i], risk, &mut self.rng);
            if tick.busy {
                report.busy_station_ticks += 1;
            }
            if tick.completion == Completion::Scrapped {
                report.scrapped += 1;
            }
        }
        if self.source.tick() && self.buffers[0].push(Part::new(now), now).is_ok() {
            self.source.emitted();
        }

        self.now += 1;
        if self.alternate && self.now % ALTERNATE_PERIOD == 0 {
            self.apply_alternation();
        }
        report
    }

    fn station_names(&self) -> Vec<String> {
        std::iter::once("Source".to_owned())
            .chain((0..self.n_assemblies).map(|i| format!("A{i}")))
            .chain(std::iter::once("Sink".to_owned()))
            .collect()
    }

    fn station_value(&self, station: &str, attribute: StationAttribute) -> Option<f64> {
        match station {
            "Source" => {
                let waiting = self.buffers[0].oldest_wait(self.now);
                return self.source.value(attribute, waiting);
            }
            "Sink" => return self.sink.value(attribute),
            _ => {}
        }
        let i = station_index(station, 'A', self.n_assemblies)?;
        self.stations[i].value(attribute, &self.buffers[i])
    }

    fn info(&self) -> &InfoSpec {
        &self.info
    }

    fn scrap_factor(&self) -> Option<ScrapFactor> {
        self.scrap_factor
    }

    fn set_scrap_factor(&mut self, value: ScrapFactor) -> Result<(), ScrapFactorError> {
        match &mut self.scrap_factor {
            Some(factor) => {
                *factor = value;
                Ok(())
            }
            None => Err(ScrapFactorError::Unsupported { kind: self.kind }),
        }
    }

    fn clone_boxed(&self) -> BoxedLine {
        Box::new(self.clone())
    }
}
