//! Memory aware admission control for simulation processes.
//!
//! The scheduler runs a single threaded reap/admit loop. Concurrency only comes
//! from the launched processes, each of which reserves the estimated memory of
//! its run until it terminates.

use super::{
    process::{Launcher, Process, Termination},
    ExecutorError,
};
use crate::template::ConfigDocument;
use std::{collections::VecDeque, path::PathBuf, thread, time::Duration};
use tracing::{debug, error, info, warn};

/// Delays of the admission loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// pause between two polling sweeps without a finished process
    pub poll_delay: Duration,
    /// pause after every launch
    pub stagger_delay: Duration,
}

#[cfg(test)]
impl Timing {
    pub const ZERO: Self = Self {
        poll_delay: Duration::ZERO,
        stagger_delay: Duration::ZERO,
    };
}

/// A running simulation and the memory reserved for it
#[derive(Debug)]
pub struct ProcessSlot<P> {
    pub process: P,
    pub memory: f64,
    pub input: PathBuf,
}

pub struct Scheduler<L: Launcher> {
    launcher: L,
    slots: usize,
    budget: f64,
    timing: Timing,
    base: Option<PathBuf>,
    queue: VecDeque<ConfigDocument>,
    active: Vec<ProcessSlot<L::Process>>,
    launched: usize,
}

impl<L: Launcher> Scheduler<L> {
    /// `budget` is the memory in GB that may be reserved at once
    pub fn new(launcher: L, slots: usize, budget: f64, timing: Timing) -> Self {
        Self {
            launcher,
            slots,
            budget,
            timing,
            base: None,
            queue: VecDeque::new(),
            active: Vec::new(),
            launched: 0,
        }
    }

    /// write input files below `base` instead of the working directory
    #[cfg(test)]
    pub fn with_base(mut self, base: PathBuf) -> Self {
        self.base = Some(base);
        self
    }

    pub fn enqueue<I: IntoIterator<Item = ConfigDocument>>(&mut self, documents: I) {
        self.queue.extend(documents);
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    pub fn reserved_memory(&self) -> f64 {
        self.active.iter().map(|slot| slot.memory).sum()
    }

    pub fn free_memory(&self) -> f64 {
        self.budget - self.reserved_memory()
    }

    /// launch every queued run, returns once the queue is empty
    ///
    /// Processes that are still running at that point are not waited for.
    pub fn run(&mut self) -> Result<usize, ExecutorError> {
        while self.pending() > 0 {
            self.reap();

            if self.admit()? == 0 && self.active() == 0 {
                // nothing is running that could free memory or a slot
                error!(
                    pending = self.pending(),
                    slots = self.slots,
                    budget = self.budget,
                    "No queued run can ever be admitted"
                );

                return Err(ExecutorError::Stalled {
                    pending: self.pending(),
                });
            }
        }

        info!(
            launched = self.launched,
            running = self.active(),
            "All simulations launched"
        );

        Ok(self.launched)
    }

    /// block until one active process has terminated and release its slot
    pub fn reap(&mut self) {
        if self.active.is_empty() {
            return;
        }

        loop {
            if let Some(index) = self.find_finished() {
                let slot = self.active.remove(index);

                debug!(
                    input = ?slot.input,
                    memory = slot.memory,
                    running = self.active.len(),
                    "Released process slot"
                );

                return;
            }

            thread::sleep(self.timing.poll_delay);
        }
    }

    fn find_finished(&mut self) -> Option<usize> {
        for (index, slot) in self.active.iter_mut().enumerate() {
            match slot.process.try_finish() {
                Ok(None) => {}
                Ok(Some(Termination::Success)) => {
                    info!(pid = slot.process.id(), input = ?slot.input, "Simulation finished");

                    return Some(index);
                }
                Ok(Some(Termination::Failure(code))) => {
                    // the exit status is reported but does not change scheduling
                    warn!(
                        pid = slot.process.id(),
                        input = ?slot.input,
                        code = ?code,
                        "Simulation exited unsuccessfully"
                    );

                    return Some(index);
                }
                Err(error) => {
                    error!(
                        pid = slot.process.id(),
                        error = ?error,
                        "Failed to poll simulation, killing it"
                    );

                    // the memory is only released once the process is gone
                    match slot.process.kill() {
                        Ok(()) => return Some(index),
                        Err(error) => error!(
                            pid = slot.process.id(),
                            error = ?error,
                            "Failed to kill simulation, keeping its slot"
                        ),
                    }
                }
            }
        }

        None
    }

    /// start queued runs while a slot is free and some run fits into the free memory
    ///
    /// The first queued run that fits is taken, so smaller runs may overtake
    /// larger ones while memory is scarce. Returns the number of launches.
    pub fn admit(&mut self) -> Result<usize, ExecutorError> {
        let mut admitted = 0;

        while self.active.len() < self.slots {
            let free = self.free_memory();

            let index = match self
                .queue
                .iter()
                .position(|document| document.memory_required <= free)
            {
                Some(index) => index,
                None => {
                    debug!(free, pending = self.queue.len(), "No queued run fits");
                    break;
                }
            };

            let mut document = match self.queue.remove(index) {
                Some(document) => document,
                None => break,
            };

            let input = document.write_to_disk(self.base.as_deref())?;
            let process = self.launcher.launch(document.executable(), &input)?;

            info!(
                pid = process.id(),
                input = ?input,
                memory = document.memory_required,
                pending = self.queue.len(),
                "Launched simulation"
            );

            self.active.push(ProcessSlot {
                process,
                memory: document.memory_required,
                input,
            });
            self.launched += 1;
            admitted += 1;

            thread::sleep(self.timing.stagger_delay);
        }

        Ok(admitted)
    }
}
