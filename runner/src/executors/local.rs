use super::{
    prepare,
    process::CommandLauncher,
    scheduler::Scheduler,
    ExecutorError,
};
use crate::config::BulkConfig;
use std::thread;
use tracing::{info, instrument};

/// Executor that launches the simulations as local processes
#[derive(Debug)]
pub struct LocalExecutor {
    config: BulkConfig,
}

impl LocalExecutor {
    /// create a new LocalExecutor instance
    pub fn load(config: BulkConfig) -> Self {
        Self { config }
    }

    /// launch all runs, bounded by the process slots and the memory budget
    #[instrument(skip(self), level = "info")]
    pub fn execute(&mut self) -> Result<(), ExecutorError> {
        let documents = prepare(&self.config)?;
        let executor = &self.config.executor;
        let start_delay = executor.start_delay();

        info!(
            "Simulations will begin in {} seconds, hit ctrl+c to cancel at anytime",
            start_delay.as_secs_f64()
        );
        thread::sleep(start_delay);

        let mut scheduler = Scheduler::new(
            CommandLauncher,
            executor.slots,
            executor.memory_budget(),
            executor.timing(),
        );
        scheduler.enqueue(documents);

        let launched = scheduler.run()?;

        info!("Done with launching {launched} simulations");

        Ok(())
    }
}
