//! Expansion of per-map parameter sweeps into individual run documents.

use crate::template::{ConfigDocument, NameFormats};
use itertools::Itertools;
use std::path::PathBuf;

/// Ordered parameter axes, name -> candidate values
pub type ParameterAxes = Vec<(String, Vec<String>)>;

/// Parameter sweep for a single input map prior to expansion
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub map: PathBuf,
    pub params: ParameterAxes,
    pub formats: NameFormats,
    /// estimated memory requirement in GB, shared by all runs of the map
    pub memory_required: f64,
}

impl RunRequest {
    pub fn new(map: PathBuf, params: ParameterAxes, formats: NameFormats) -> Self {
        Self {
            map,
            params,
            formats,
            memory_required: 0.0,
        }
    }

    /// number of runs this request expands to
    pub fn run_count(&self) -> usize {
        self.params.iter().map(|(_, values)| values.len()).product()
    }

    /// cartesian product of all axes, first declared axis varies slowest
    pub fn combinations(&self) -> Vec<Vec<(&str, &str)>> {
        if self.params.is_empty() {
            return vec![Vec::new()];
        }

        self.params
            .iter()
            .map(|(name, values)| {
                values
                    .iter()
                    .map(move |value| (name.as_str(), value.as_str()))
            })
            .multi_cartesian_product()
            .collect()
    }
}

/// clone `template` once per parameter combination of every request
///
/// Runs are ordered by request first and combination second. `map_keyword`
/// receives the path of the request's map.
pub fn expand_runs(
    requests: &[RunRequest],
    template: &ConfigDocument,
    map_keyword: &str,
) -> Vec<ConfigDocument> {
    let mut documents = Vec::with_capacity(requests.iter().map(RunRequest::run_count).sum());

    for request in requests {
        let formats = Some(&request.formats).filter(|formats| !formats.is_empty());
        let map = request.map.to_string_lossy();

        for combination in request.combinations() {
            let mut document = template.clone_with_formats(formats);

            document.memory_required = request.memory_required;
            document.update(combination);
            document.update([(map_keyword, &*map)]);

            documents.push(document);
        }
    }

    documents
}
