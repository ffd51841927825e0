use rand::SeedableRng as _;
use rand_pcg::Pcg32;

use crate::{
    InfoSpec, ScrapFactor, ScrapFactorError, StationAttribute,
    station::{Buffer, Completion, Part, Processor, ScrapRisk, Sink, Source},
};

use super::{ALTERNATE_PERIOD, BoxedLine, Line, LineKind, StepReport, station_index};

const SOURCE_INTERVAL: u32 = 2;
const BUFFER_CAPACITY: usize = 5;

/// Processing time of process `i` before any alternation.
fn base_time(i: usize) -> u32 {
    3 + 2 * u32::try_from(i).unwrap_or(u32::MAX / 4)
}

/// A source distributing parts over parallel processes of different speeds.
///
/// The action selects the process whose buffer receives the next parts. When
/// `alternate` is set, the processing times are reversed every [`ALTERNATE_PERIOD`]
/// ticks, so a fixed distribution stops being optimal.
#[derive(Debug, Clone)]
pub struct MultiProcess {
    n_processes: usize,
    alternate: bool,
    step_size: u32,
    info: InfoSpec,
    now: u32,
    rng: Pcg32,
    source: Source,
    target: usize,
    buffers: Vec<Buffer>,
    processes: Vec<Processor>,
    sink: Sink,
}

impl MultiProcess {
    /// # Panics
    ///
    /// Panics if `n_processes` is zero.
    #[must_use]
    pub fn new(n_processes: usize, alternate: bool, step_size: u32, info: InfoSpec) -> Self {
        assert!(n_processes > 0);
        Self {
            n_processes,
            alternate,
            step_size,
            info,
            now: 0,
            rng: Pcg32::seed_from_u64(0),
            source: Source::new(SOURCE_INTERVAL),
            target: 0,
            buffers: (0..n_processes)
                .map(|_| Buffer::new(BUFFER_CAPACITY))
                .collect(),
            processes: (0..n_processes)
                .map(|i| Processor::new(base_time(i)))
                .collect(),
            sink: Sink::default(),
        }
    }

    fn max_base_time(&self) -> u32 {
        base_time(self.n_processes - 1)
    }

    fn apply_alternation(&mut self) {
        let reversed = (self.now / ALTERNATE_PERIOD) % 2 == 1;
        let n = self.n_processes;
        for (i, process) in self.processes.iter_mut().enumerate() {
            let slot = if reversed { n - 1 - i } else { i };
            process.set_base_time(base_time(slot));
        }
    }
}

impl Line for MultiProcess {
    fn kind(&self) -> LineKind {
        LineKind::PartDistribution
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
        self.target = 0;
        self.source.reset();
        self.buffers.iter_mut().for_each(Buffer::clear);
        self.processes.iter_mut().for_each(Processor::reset);
        self.sink.reset();
        self.apply_alternation();
    }

    fn observation_len(&self) -> usize {
        3 * self.n_processes + 1
    }

    #[expect(clippy::cast_precision_loss)]
    fn observe(&self, observation: &mut Vec<f64>) {
        let max_time = f64::from(self.max_base_time());
        for (buffer, process) in self.buffers.iter().zip(&self.processes) {
            observation.push(buffer.fill());
            observation.push(if process.is_busy() { 1.0 } else { 0.0 });
            observation.push(f64::from(process.base_time()) / max_time);
        }
        observation.push(self.target as f64 / self.n_processes as f64);
    }

    fn action_count(&self) -> usize {
        self.n_processes
    }

    fn apply_action(&mut self, action: usize) {
        self.target = action;
    }

    fn tick(&mut self) -> StepReport {
        let now = self.now;
        let mut report = StepReport {
            ticks: 1,
            station_ticks: u32::try_from(self.n_processes).unwrap_or(u32::MAX),
            ..StepReport::default()
        };

        for process in &mut self.processes {
            if let Some(part) = process.take_finished() {
                self.sink.accept(part);
                report.produced += 1;
            }
        }
        for (process, buffer) in self.processes.iter_mut().zip(&mut self.buffers) {
            let tick = process.work(now, buffer, ScrapRisk::None, &mut self.rng);
            if tick.busy {
                report.busy_station_ticks += 1;
            }
            debug_assert_ne!(tick.completion, Completion::Scrapped);
        }
        if self.source.tick() && self.buffers[self.target].push(Part::new(now), now).is_ok() {
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
            .chain((0..self.n_processes).map(|i| format!("P{i}")))
            .chain(std::iter::once("Sink".to_owned()))
            .collect()
    }

    fn station_value(&self, station: &str, attribute: StationAttribute) -> Option<f64> {
        match station {
            "Source" => return self.source.value(attribute, 0),
            "Sink" => return self.sink.value(attribute),
            _ => {}
        }
        let i = station_index(station, 'P', self.n_processes)?;
        self.processes[i].value(attribute, &self.buffers[i])
    }

    fn info(&self) -> &InfoSpec {
        &self.info
    }

    fn scrap_factor(&self) -> Option<ScrapFactor> {
        None
    }

    fn set_scrap_factor(&mut self, _value: ScrapFactor) -> Result<(), ScrapFactorError> {
        Err(ScrapFactorError::Unsupported { kind: self.kind() })
    }

    fn clone_boxed(&self) -> BoxedLine {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(line: &mut MultiProcess, policy: impl Fn(u32) -> usize, steps: u32) -> StepReport {
        let mut total = StepReport::default();
        for _ in 0..steps {
            let action = policy(line.now());
            total.merge(line.step(action));
        }
        total
    }

    #[test]
    fn test_observation_shape() {
        let mut line = MultiProcess::new(3, false, 1, InfoSpec::default());
        line.reset(1);
        assert_eq!(line.observation().len(), line.observation_len());
        assert_eq!(line.action_count(), 3);
        assert_eq!(line.station_names(), vec!["Source", "P0", "P1", "P2", "Sink"]);
    }

    #[test]
    fn test_spreading_parts_beats_single_process() {
        let mut single_line = MultiProcess::new(3, false, 1, InfoSpec::default());
        single_line.reset(3);
        let single = run(&mut single_line, |_| 2, 2000);

        let mut spread_line = MultiProcess::new(3, false, 1, InfoSpec::default());
        spread_line.reset(3);
        let spread = run(&mut spread_line, |now| (now % 3) as usize, 2000);

        assert!(spread.produced > single.produced);
        assert_eq!(single.scrapped, 0);
        assert_eq!(spread.scrapped, 0);
        assert_eq!(
            spread_line.station_value("Sink", StationAttribute::NParts),
            Some(f64::from(spread.produced))
        );
    }

    #[test]
    fn test_reset_is_deterministic() {
        let mut a = MultiProcess::new(2, true, 2, InfoSpec::default());
        let mut b = a.clone();
        a.reset(11);
        b.reset(11);
        let ra = run(&mut a, |now| (now % 2) as usize, 1500);
        let rb = run(&mut b, |now| (now % 2) as usize, 1500);
        assert_eq!(ra, rb);
        assert_eq!(a.now(), 3000);
    }

    #[test]
    fn test_alternation_reverses_times() {
        let mut line = MultiProcess::new(2, true, 1, InfoSpec::default());
        line.reset(0);
        assert_eq!(line.station_value("P0", StationAttribute::ProcessingTime), Some(3.0));
        run(&mut line, |_| 0, ALTERNATE_PERIOD);
        assert_eq!(line.station_value("P0", StationAttribute::ProcessingTime), Some(5.0));
        assert_eq!(line.station_value("P1", StationAttribute::ProcessingTime), Some(3.0));
    }

    #[test]
    fn test_no_scrap_factor() {
        let mut line = MultiProcess::new(2, false, 1, InfoSpec::default());
        assert_eq!(line.scrap_factor(), None);
        assert_eq!(
            line.set_scrap_factor(ScrapFactor::ZERO),
            Err(ScrapFactorError::Unsupported {
                kind: LineKind::PartDistribution
            })
        );
    }
}
