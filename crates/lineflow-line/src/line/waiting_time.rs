use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;

use crate::{
    InfoSpec, ScrapFactor, ScrapFactorError, StationAttribute,
    station::{Buffer, Completion, Part, Processor, ScrapRisk, Sink, Source},
};

use super::{BoxedLine, Line, LineKind, StepReport};

const BUFFER_CAPACITY: usize = 10;
const MAX_WAITING_TIME: u32 = 10;
const PROCESSING_TIME: u32 = 4;
const JUMP_PROCESSING_TIME: u32 = 9;
const JUMP_DURATION: u32 = 1000;
/// Buffer wait after which a part is scrapped with the full scrap factor.
const MAX_WAIT: u32 = 40;

/// A source, one buffer and one process `P0`.
///
/// The action sets the extra waiting time (`0..=10` ticks) the source inserts between
/// parts. Parts that wait in the buffer risk scrap in proportion to how long they
/// waited, so the agent has to pace the source to the process. With `with_jump`, the
/// processing time rises for a while at a random moment in `0..=t_jump_max`.
#[derive(Debug, Clone)]
pub struct WaitingTime {
    kind: LineKind,
    processing_time_source: u32,
    t_jump_max: Option<u32>,
    scrap_factor: ScrapFactor,
    step_size: u32,
    info: InfoSpec,
    now: u32,
    rng: Pcg32,
    waiting_time: u32,
    jump_start: Option<u32>,
    source: Source,
    buffer: Buffer,
    process: Processor,
    sink: Sink,
}

impl WaitingTime {
    #[must_use]
    pub fn new(
        processing_time_source: u32,
        scrap_factor: ScrapFactor,
        step_size: u32,
        info: InfoSpec,
    ) -> Self {
        Self::build(
            LineKind::WaitingTime,
            processing_time_source,
            None,
            scrap_factor,
            step_size,
            info,
        )
    }

    #[must_use]
    pub fn with_jump(
        processing_time_source: u32,
        t_jump_max: u32,
        scrap_factor: ScrapFactor,
        step_size: u32,
        info: InfoSpec,
    ) -> Self {
        Self::build(
            LineKind::WaitingTimeJump,
            processing_time_source,
            Some(t_jump_max),
            scrap_factor,
            step_size,
            info,
        )
    }

    fn build(
        kind: LineKind,
        processing_time_source: u32,
        t_jump_max: Option<u32>,
        scrap_factor: ScrapFactor,
        step_size: u32,
        info: InfoSpec,
    ) -> Self {
        Self {
            kind,
            processing_time_source,
            t_jump_max,
            scrap_factor,
            step_size,
            info,
            now: 0,
            rng: Pcg32::seed_from_u64(0),
            waiting_time: 0,
            jump_start: None,
            source: Source::new(processing_time_source),
            buffer: Buffer::new(BUFFER_CAPACITY),
            process: Processor::new(PROCESSING_TIME),
            sink: Sink::default(),
        }
    }

    fn in_jump(&self) -> bool {
        self.jump_start
            .is_some_and(|start| (start..start + JUMP_DURATION).contains(&self.now))
    }

    fn scrap_risk(&self) -> ScrapRisk {
        let factor = self.scrap_factor.get();
        if factor > 0.0 {
            ScrapRisk::Waiting {
                factor,
                max_wait: MAX_WAIT,
            }
        } else {
            ScrapRisk::None
        }
    }
}

impl Line for WaitingTime {
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
        self.waiting_time = 0;
        self.jump_start = self
            .t_jump_max
            .map(|t_jump_max| self.rng.random_range(0..=t_jump_max));
        self.source = Source::new(self.processing_time_source);
        self.buffer.clear();
        self.process.reset();
        self.sink.reset();
        let base = if self.in_jump() {
            JUMP_PROCESSING_TIME
        } else {
            PROCESSING_TIME
        };
        self.process.set_base_time(base);
    }

    fn observation_len(&self) -> usize {
        6
    }

    fn observe(&self, observation: &mut Vec<f64>) {
        let oldest = f64::from(self.buffer.oldest_wait(self.now)) / f64::from(MAX_WAIT);
        observation.extend([
            self.buffer.fill(),
            if self.process.is_busy() { 1.0 } else { 0.0 },
            f64::from(self.process.base_time()) / f64::from(JUMP_PROCESSING_TIME),
            f64::from(self.waiting_time) / f64::from(MAX_WAITING_TIME),
            oldest.min(1.0),
            self.scrap_factor.get(),
        ]);
    }

    fn action_count(&self) -> usize {
        MAX_WAITING_TIME as usize + 1
    }

    fn apply_action(&mut self, action: usize) {
        self.waiting_time = u32::try_from(action)
            .map_or(MAX_WAITING_TIME, |waiting| waiting.min(MAX_WAITING_TIME));
        self.source
            .set_interval(self.processing_time_source + self.waiting_time);
    }

    fn tick(&mut self) -> StepReport {
        let now = self.now;
        let mut report = StepReport {
            ticks: 1,
            station_ticks: 1,
            ..StepReport::default()
        };

        let base = if self.in_jump() {
            JUMP_PROCESSING_TIME
        } else {
            PROCESSING_TIME
        };
        self.process.set_base_time(base);

        if let Some(part) = self.process.take_finished() {
            self.sink.accept(part);
            report.produced += 1;
        }
        let risk = self.scrap_risk();
        let tick = self.process.work(now, &mut self.buffer, risk, &mut self.rng);
        if tick.busy {
            report.busy_station_ticks += 1;
        }
        if tick.completion == Completion::Scrapped {
            report.scrapped += 1;
        }
        if self.source.tick() && self.buffer.push(Part::new(now), now).is_ok() {
            self.source.emitted();
        }

        self.now += 1;
        report
    }

    fn station_names(&self) -> Vec<String> {
        ["Source", "P0", "Sink"].map(str::to_owned).to_vec()
    }

    fn station_value(&self, station: &str, attribute: StationAttribute) -> Option<f64> {
        match station {
            "Source" => self.source.value(attribute, self.waiting_time),
            "P0" => self.process.value(attribute, &self.buffer),
            "Sink" => self.sink.value(attribute),
            _ => None,
        }
    }

    fn info(&self) -> &InfoSpec {
        &self.info
    }

    fn scrap_factor(&self) -> Option<ScrapFactor> {
        Some(self.scrap_factor)
    }

    fn set_scrap_factor(&mut self, value: ScrapFactor) -> Result<(), ScrapFactorError> {
        self.scrap_factor = value;
        Ok(())
    }

    fn clone_boxed(&self) -> BoxedLine {
        Box::new(self.clone())
    }
}
