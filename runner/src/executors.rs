mod dry;
mod local;
pub mod process;
pub mod scheduler;


use crate::{
    config::{BulkConfig, ConfigErrors},
    estimate::{self, EstimateError},
    expansion::expand_runs,
    grid::{self, GridError},
    template::{ConfigDocument, NameFormats, TemplateError},
};
use itertools::Itertools;
use std::{collections::BTreeMap, path::PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Invalid batch configuration")]
    Config(#[from] ConfigErrors),
    #[error("Template error")]
    Template(#[from] TemplateError),
    #[error("Failed to load map {map:?}")]
    Grid {
        map: PathBuf,
        #[source]
        error: GridError,
    },
    #[error("Memory estimation failed")]
    Estimate(#[from] EstimateError),
    #[error("Failed to launch {executable}")]
    Launch {
        executable: String,
        #[source]
        error: std::io::Error,
    },
    #[error("{pending} queued simulation(s) can never be admitted")]
    Stalled { pending: usize },
}

#[derive(Debug)]
pub enum Executors {
    Local(local::LocalExecutor),
    Dry(dry::DryExecutor),
}

impl Executors {
    pub fn load(config: BulkConfig, dry_run: bool) -> Self {
        if dry_run {
            Self::Dry(dry::DryExecutor::load(config))
        } else {
            Self::Local(local::LocalExecutor::load(config))
        }
    }

    pub fn execute(&mut self) -> Result<(), ExecutorError> {
        match self {
            Self::Local(executor) => executor.execute(),
            Self::Dry(executor) => executor.execute(),
        }
    }
}

/// estimate the memory of every map and expand the batch into run documents
///
/// Fails before any file is written if a map does not fit into the budget.
#[instrument(skip(config), level = "info")]
pub fn prepare(config: &BulkConfig) -> Result<Vec<ConfigDocument>, ExecutorError> {
    let available = config.executor.memory_budget();
    let mut requests = config.run_requests()?;

    // every distinct map is loaded and estimated once
    let maps = requests
        .iter()
        .map(|request| request.map.clone())
        .unique()
        .collect_vec();
    let shapes = maps
        .iter()
        .map(|map| {
            grid::load_shape(map, &config.delimiter).map_err(|error| ExecutorError::Grid {
                map: map.clone(),
                error,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let requirements: BTreeMap<_, _> = maps
        .iter()
        .zip(estimate::estimate_all(maps.iter().zip(shapes), available)?)
        .collect();

    for request in requests.iter_mut() {
        request.memory_required = requirements.get(&request.map).copied().unwrap_or_default();
    }

    let template = ConfigDocument::from_file(&config.template, NameFormats::new())?;
    let documents = expand_runs(&requests, &template, &config.map_keyword);

    info!(
        maps = maps.len(),
        available,
        "Total number of simulations: {}",
        documents.len()
    );

    Ok(documents)
}
