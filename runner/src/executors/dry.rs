use super::{prepare, ExecutorError};
use crate::config::BulkConfig;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Executor that writes every input file without starting any simulation
#[derive(Debug)]
pub struct DryExecutor {
    config: BulkConfig,
}

impl DryExecutor {
    pub fn load(config: BulkConfig) -> Self {
        Self { config }
    }

    #[instrument(skip(self), level = "info")]
    pub fn execute(&mut self) -> Result<(), ExecutorError> {
        info!("Beginning dry run, use `run` with the same configuration to start the simulations");

        self.write_all().map(|_| ())
    }

    /// write all input files, returns their paths in run order
    pub fn write_all(&self) -> Result<Vec<PathBuf>, ExecutorError> {
        let mut documents = prepare(&self.config)?;
        let mut written = Vec::with_capacity(documents.len());

        for document in documents.iter_mut() {
            let path = document.write_to_disk(None)?;

            info!(
                path = ?path,
                "Estimated RAM required for this run: {:.6} GB",
                document.memory_required
            );
            written.push(path);
        }

        Ok(written)
    }
}
