//! Building blocks shared by the line models: parts, buffers, sources and processors.

use std::collections::VecDeque;

use rand::Rng;

use crate::StationAttribute;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Part {
    entered_buffer_at: u32,
}

impl Part {
    pub(crate) const fn new(now: u32) -> Self {
        Self {
            entered_buffer_at: now,
        }
    }
}

/// Bounded FIFO queue in front of a station.
#[derive(Debug, Clone)]
pub(crate) struct Buffer {
    capacity: usize,
    parts: VecDeque<Part>,
}

impl Buffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            parts: VecDeque::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, mut part: Part, now: u32) -> Result<(), Part> {
        if self.parts.len() >= self.capacity {
            return Err(part);
        }
        part.entered_buffer_at = now;
        self.parts.push_back(part);
        Ok(())
    }

    fn pop(&mut self) -> Option<Part> {
        self.parts.pop_front()
    }

    pub(crate) fn clear(&mut self) {
        self.parts.clear();
    }

    #[expect(clippy::cast_precision_loss)]
    pub(crate) fn fill(&self) -> f64 {
        self.parts.len() as f64 / self.capacity as f64
    }

    /// Ticks the oldest queued part has been waiting.
    pub(crate) fn oldest_wait(&self, now: u32) -> u32 {
        self.parts
            .front()
            .map_or(0, |part| now.saturating_sub(part.entered_buffer_at))
    }
}

/// Emits a new part every `interval` ticks, holding it while the output is full.
#[derive(Debug, Clone)]
pub(crate) struct Source {
    interval: u32,
    countdown: u32,
    n_parts: u32,
}

impl Source {
    pub(crate) fn new(interval: u32) -> Self {
        Self {
            interval,
            countdown: interval,
            n_parts: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.countdown = self.interval;
        self.n_parts = 0;
    }

    /// Changes the emission interval; takes effect after the next emission.
    pub(crate) fn set_interval(&mut self, interval: u32) {
        self.interval = interval.max(1);
    }

    /// Advances one tick and returns `true` if a part is ready to leave.
    pub(crate) fn tick(&mut self) -> bool {
        self.countdown = self.countdown.saturating_sub(1);
        self.countdown == 0
    }

    /// Marks the ready part as delivered downstream.
    pub(crate) fn emitted(&mut self) {
        self.countdown = self.interval;
        self.n_parts += 1;
    }

    pub(crate) fn value(&self, attribute: StationAttribute, waiting_time: u32) -> Option<f64> {
        match attribute {
            StationAttribute::WaitingTime => Some(f64::from(waiting_time)),
            StationAttribute::NParts => Some(f64::from(self.n_parts)),
            StationAttribute::ProcessingTime => Some(f64::from(self.interval)),
            StationAttribute::NWorkers
            | StationAttribute::Utilization
            | StationAttribute::BufferFill
            | StationAttribute::NScrap => None,
        }
    }
}

/// End of the line, counting good parts.
#[derive(Debug, Default, Clone)]
pub(crate) struct Sink {
    n_parts: u32,
}

impl Sink {
    pub(crate) fn reset(&mut self) {
        self.n_parts = 0;
    }

    pub(crate) fn accept(&mut self, _part: Part) {
        self.n_parts += 1;
    }

    pub(crate) fn value(&self, attribute: StationAttribute) -> Option<f64> {
        match attribute {
            StationAttribute::NParts => Some(f64::from(self.n_parts)),
            _ => None,
        }
    }
}

/// How likely a part is to be scrapped when a processor completes it.
#[derive(Debug, Clone, Copy)]
pub(crate) enum ScrapRisk {
    None,
    /// `factor / workers`: understaffed stations scrap more.
    Staffing { factor: f64 },
    /// `factor * waited / max_wait`: parts left too long in the buffer degrade.
    Waiting { factor: f64, max_wait: u32 },
}

impl ScrapRisk {
    fn probability(self, workers: u32, waited: u32) -> f64 {
        let p = match self {
            Self::None => 0.0,
            Self::Staffing { factor } => factor / f64::from(workers.max(1)),
            Self::Waiting { factor, max_wait } => {
                factor * (f64::from(waited) / f64::from(max_wait.max(1))).min(1.0)
            }
        };
        p.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Job {
    remaining: u32,
    waited: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Completion {
    None,
    Finished,
    Scrapped,
}

/// Result of one [`Processor::work`] tick.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkTick {
    pub(crate) busy: bool,
    pub(crate) completion: Completion,
}

/// Station processing one part at a time.
///
/// Worker-driven stations divide their base time among the assigned workers and stall
/// without any; other stations always behave as if staffed by one worker.
#[derive(Debug, Clone)]
pub(crate) struct Processor {
    base_time: u32,
    worker_driven: bool,
    workers: u32,
    job: Option<Job>,
    finished: Option<Part>,
    busy_ticks: u32,
    ticks: u32,
    n_parts: u32,
    n_scrap: u32,
    last_waiting_time: u32,
}

impl Processor {
    pub(crate) fn new(base_time: u32) -> Self {
        Self {
            base_time,
            worker_driven: false,
            workers: 1,
            job: None,
            finished: None,
            busy_ticks: 0,
            ticks: 0,
            n_parts: 0,
            n_scrap: 0,
            last_waiting_time: 0,
        }
    }

    pub(crate) fn with_workers(base_time: u32, workers: u32) -> Self {
        Self {
            worker_driven: true,
            workers,
            ..Self::new(base_time)
        }
    }

    pub(crate) fn reset(&mut self) {
        self.job = None;
        self.finished = None;
        self.busy_ticks = 0;
        self.ticks = 0;
        self.n_parts = 0;
        self.n_scrap = 0;
        self.last_waiting_time = 0;
    }

    pub(crate) fn base_time(&self) -> u32 {
        self.base_time
    }

    pub(crate) fn set_base_time(&mut self, base_time: u32) {
        self.base_time = base_time.max(1);
    }

    pub(crate) fn workers(&self) -> u32 {
        self.workers
    }

    pub(crate) fn set_workers(&mut self, workers: u32) {
        self.workers = workers;
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.job.is_some()
    }

    /// Takes the completed part waiting to move downstream.
    pub(crate) fn take_finished(&mut self) -> Option<Part> {
        self.finished.take()
    }

    /// Returns a part the downstream station could not accept; the station stays blocked.
    pub(crate) fn put_back(&mut self, part: Part) {
        debug_assert!(self.finished.is_none());
        self.finished = Some(part);
    }

    fn processing_time<R>(&self, rng: &mut R) -> u32
    where
        R: Rng + ?Sized,
    {
        let staffed = self.base_time.div_ceil(self.workers.max(1));
        staffed + rng.random_range(0..=1)
    }

    /// Starts processing `part` again, as if it had just been taken from the input.
    pub(crate) fn rework<R>(&mut self, _part: Part, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        debug_assert!(self.job.is_none() && self.finished.is_none());
        self.job = Some(Job {
            remaining: self.processing_time(rng),
            waited: 0,
        });
    }

    /// Advances one tick: starts the next queued part when idle and unblocked, then
    /// works on the current job.
    pub(crate) fn work<R>(
        &mut self,
        now: u32,
        input: &mut Buffer,
        risk: ScrapRisk,
        rng: &mut R,
    ) -> WorkTick
    where
        R: Rng + ?Sized,
    {
        self.ticks += 1;

        let staffed = !self.worker_driven || self.workers > 0;
        if self.job.is_none() && self.finished.is_none() && staffed {
            if let Some(part) = input.pop() {
                let waited = now.saturating_sub(part.entered_buffer_at);
                self.last_waiting_time = waited;
                self.job = Some(Job {
                    remaining: self.processing_time(rng),
                    waited,
                });
            }
        }

        let Some(job) = &mut self.job else {
            return WorkTick {
                busy: false,
                completion: Completion::None,
            };
        };
        self.busy_ticks += 1;
        job.remaining = job.remaining.saturating_sub(1);
        if job.remaining > 0 {
            return WorkTick {
                busy: true,
                completion: Completion::None,
            };
        }

        let waited = job.waited;
        self.job = None;
        let completion = if rng.random_bool(risk.probability(self.workers, waited)) {
            self.n_scrap += 1;
            Completion::Scrapped
        } else {
            self.n_parts += 1;
            self.finished = Some(Part::new(now));
            Completion::Finished
        };
        WorkTick {
            busy: true,
            completion,
        }
    }

    pub(crate) fn value(&self, attribute: StationAttribute, input: &Buffer) -> Option<f64> {
        match attribute {
            StationAttribute::WaitingTime => Some(f64::from(self.last_waiting_time)),
            StationAttribute::NWorkers => self.worker_driven.then(|| f64::from(self.workers)),
            StationAttribute::Utilization => Some(if self.ticks == 0 {
                0.0
            } else {
                f64::from(self.busy_ticks) / f64::from(self.ticks)
            }),
            StationAttribute::BufferFill => Some(input.fill()),
            StationAttribute::NParts => Some(f64::from(self.n_parts)),
            StationAttribute::NScrap => Some(f64::from(self.n_scrap)),
            StationAttribute::ProcessingTime => Some(f64::from(self.base_time)),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg32;

    use super::*;

    #[test]
    fn test_buffer_rejects_when_full() {
        let mut buffer = Buffer::new(2);
        assert!(buffer.push(Part::new(0), 0).is_ok());
        assert!(buffer.push(Part::new(0), 1).is_ok());
        assert!(buffer.push(Part::new(0), 2).is_err());
        assert_eq!(buffer.fill(), 1.0);
        assert_eq!(buffer.oldest_wait(10), 10);
    }

    #[test]
    fn test_source_emits_every_interval() {
        let mut source = Source::new(3);
        let ready = (0..6)
            .map(|_| {
                let ready = source.tick();
                if ready {
                    source.emitted();
                }
                ready
            })
            .collect::<Vec<_>>();
        assert_eq!(ready, vec![false, false, true, false, false, true]);
        assert_eq!(source.value(StationAttribute::NParts, 0), Some(2.0));
    }

    #[test]
    fn test_source_holds_blocked_part() {
        let mut source = Source::new(2);
        assert!(!source.tick());
        assert!(source.tick());
        // not emitted: still ready on the next tick
        assert!(source.tick());
    }

    #[test]
    fn test_processor_completes_parts() {
        let mut rng = Pcg32::seed_from_u64(0);
        let mut input = Buffer::new(4);
        let mut processor = Processor::new(2);
        input.push(Part::new(0), 0).unwrap();

        let mut finished = 0;
        for now in 0..10 {
            let tick = processor.work(now, &mut input, ScrapRisk::None, &mut rng);
            if tick.completion == Completion::Finished {
                finished += 1;
                assert!(processor.take_finished().is_some());
            }
        }
        assert_eq!(finished, 1);
        assert!(!processor.is_busy());
        assert_eq!(processor.value(StationAttribute::NParts, &input), Some(1.0));
    }

    #[test]
    fn test_unstaffed_station_stalls() {
        let mut rng = Pcg32::seed_from_u64(0);
        let mut input = Buffer::new(4);
        let mut processor = Processor::with_workers(4, 0);
        input.push(Part::new(0), 0).unwrap();
        for now in 0..20 {
            let tick = processor.work(now, &mut input, ScrapRisk::None, &mut rng);
            assert!(!tick.busy);
        }
        assert_eq!(input.fill(), 0.25);
        assert_eq!(processor.value(StationAttribute::NWorkers, &input), Some(0.0));
    }

    #[test]
    fn test_blocked_station_does_not_start() {
        let mut rng = Pcg32::seed_from_u64(0);
        let mut input = Buffer::new(4);
        let mut processor = Processor::new(1);
        input.push(Part::new(0), 0).unwrap();
        input.push(Part::new(0), 0).unwrap();

        let mut now = 0;
        while processor
            .work(now, &mut input, ScrapRisk::None, &mut rng)
            .completion
            != Completion::Finished
        {
            now += 1;
        }
        let part = processor.take_finished().unwrap();
        processor.put_back(part);

        let tick = processor.work(now + 1, &mut input, ScrapRisk::None, &mut rng);
        assert!(!tick.busy);
        assert_eq!(input.fill(), 0.25);
    }

    #[test]
    fn test_certain_scrap() {
        let mut rng = Pcg32::seed_from_u64(0);
        let mut input = Buffer::new(1);
        let mut processor = Processor::with_workers(1, 1);
        input.push(Part::new(0), 0).unwrap();

        let risk = ScrapRisk::Staffing { factor: 1.0 };
        let mut completion = Completion::None;
        for now in 0..5 {
            let tick = processor.work(now, &mut input, risk, &mut rng);
            if tick.completion != Completion::None {
                completion = tick.completion;
            }
        }
        assert_eq!(completion, Completion::Scrapped);
        assert!(processor.take_finished().is_none());
        assert_eq!(processor.value(StationAttribute::NScrap, &input), Some(1.0));
    }

    #[test]
    fn test_scrap_risk_probabilities() {
        assert_eq!(ScrapRisk::None.probability(3, 100), 0.0);
        assert_eq!(ScrapRisk::Staffing { factor: 0.75 }.probability(3, 0), 0.25);
        assert_eq!(ScrapRisk::Staffing { factor: 0.75 }.probability(0, 0), 0.75);
        let waiting = ScrapRisk::Waiting {
            factor: 1.0,
            max_wait: 40,
        };
        assert_eq!(waiting.probability(1, 20), 0.5);
        assert_eq!(waiting.probability(1, 400), 1.0);
    }
}
