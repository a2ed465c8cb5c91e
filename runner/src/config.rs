use crate::{
    executors::scheduler::Timing,
    expansion::{ParameterAxes, RunRequest},
    grid::Delimiter,
    template::{ConfigDocument, NameFormats},
};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::{
    fs::{self, File},
    io::Error,
    os::unix::fs::MetadataExt,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::{error, info, warn};

/// share of the system memory that may be reserved by simulations
pub const MEMORY_MARGIN: f64 = 0.90;

// check if a file is executable
pub fn check_executable(path: &Path) -> Result<bool, ConfigErrors> {
    if !path.is_file() {
        Err(ConfigErrors::FileNotFound(path.to_path_buf()))
    } else {
        match File::open(path).map(|file| file.metadata()) {
            Ok(Ok(metadata)) => Ok((metadata.mode() & 0o111) != 0),
            Ok(Err(e)) | Err(e) => Err(ConfigErrors::MetadataNotFound(e)),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigErrors {
    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),
    #[error("Metadata not found")]
    MetadataNotFound(#[source] Error),
    #[error("Failed to read {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        error: Error,
    },
    #[error("Failed to parse batch configuration")]
    Parse(#[from] serde_yaml::Error),
    #[error("Parameter {key} is invalid: {reason}")]
    InvalidParameter { key: String, reason: String },
    #[error("Preflight checks failed")]
    Preflight,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct BulkConfig {
    // template every run document is cloned from
    #[serde(default = "default_template")]
    pub template: PathBuf,
    // delimiter hint for reading the input maps
    #[serde(default)]
    pub delimiter: Delimiter,
    // template field that receives the path of the input map
    #[serde(default = "default_map_keyword")]
    pub map_keyword: String,
    #[serde(default)]
    pub executor: ExecutorConfig,
    // parameters and name formats applied to all runs
    #[serde(default)]
    pub defaults: ParameterSet,
    pub runs: Vec<RunConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    // maximum number of simulations running at once
    #[serde(default = "default_slots")]
    pub slots: usize,
    // total memory of the machine in GB
    #[serde(default = "default_system_memory")]
    pub system_memory: f64,
    // all delays are in seconds
    #[serde(default = "default_start_delay")]
    pub start_delay: f64,
    #[serde(default = "default_poll_delay")]
    pub poll_delay: f64,
    #[serde(default = "default_stagger_delay")]
    pub stagger_delay: f64,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ParameterSet {
    // parameter name -> value or list of values, in declaration order
    #[serde(default)]
    pub params: Mapping,
    #[serde(default)]
    pub formats: NameFormats,
}

#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    // maps sharing the parameters below, each one becomes its own request
    pub maps: Vec<PathBuf>,
    // replaces same-named default parameters
    #[serde(default)]
    pub params: Mapping,
    // merged over the default name formats
    #[serde(default)]
    pub formats: NameFormats,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            slots: default_slots(),
            system_memory: default_system_memory(),
            start_delay: default_start_delay(),
            poll_delay: default_poll_delay(),
            stagger_delay: default_stagger_delay(),
        }
    }
}

fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

impl ExecutorConfig {
    /// memory available to simulations in GB
    pub fn memory_budget(&self) -> f64 {
        self.system_memory * MEMORY_MARGIN
    }

    pub fn start_delay(&self) -> Duration {
        seconds(self.start_delay)
    }

    pub fn timing(&self) -> Timing {
        Timing {
            poll_delay: seconds(self.poll_delay),
            stagger_delay: seconds(self.stagger_delay),
        }
    }
}

/// textual form of a scalar parameter value
fn scalar_to_string(key: &str, value: &Value) -> Result<String, ConfigErrors> {
    match value {
        Value::String(string) => Ok(string.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(ConfigErrors::InvalidParameter {
            key: key.to_owned(),
            reason: format!("expected a string, number or boolean, found {other:?}"),
        }),
    }
}

/// convert a YAML mapping into ordered parameter axes, scalars become single values
pub fn parameter_axes(params: &Mapping) -> Result<ParameterAxes, ConfigErrors> {
    params
        .iter()
        .map(|(key, value)| {
            let key = scalar_to_string("<key>", key)?;
            let values = match value {
                Value::Sequence(values) => values
                    .iter()
                    .map(|value| scalar_to_string(&key, value))
                    .collect::<Result<Vec<_>, _>>()?,
                scalar => vec![scalar_to_string(&key, scalar)?],
            };

            Ok((key, values))
        })
        .collect()
}

/// apply `overrides` on top of `axes`, replacing same-named axes in place
fn merge_axes(mut axes: ParameterAxes, overrides: ParameterAxes) -> ParameterAxes {
    for (key, values) in overrides {
        match axes.iter_mut().find(|(name, _)| *name == key) {
            Some((_, existing)) => *existing = values,
            None => axes.push((key, values)),
        }
    }

    axes
}

impl BulkConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigErrors> {
        let content = fs::read_to_string(path).map_err(|error| ConfigErrors::Read {
            path: path.to_path_buf(),
            error,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// one request per map, default parameters and formats overridden per run
    pub fn run_requests(&self) -> Result<Vec<RunRequest>, ConfigErrors> {
        let defaults = parameter_axes(&self.defaults.params)?;
        let mut requests = Vec::new();

        for run in self.runs.iter() {
            let params = merge_axes(defaults.clone(), parameter_axes(&run.params)?);
            let mut formats = self.defaults.formats.clone();
            formats.extend(run.formats.clone());

            for map in run.maps.iter() {
                requests.push(RunRequest::new(map.clone(), params.clone(), formats.clone()));
            }
        }

        Ok(requests)
    }

    /// log every problem of the configuration, returns true if any was found
    pub fn preflight_checks(&self) -> bool {
        // attempt to catch all errors instead of piece-by-piece to make debugging easier for users
        let mut contains_error = false;

        if self.executor.slots == 0 {
            error!("executor.slots must be at least 1, no simulation could ever start");
            contains_error = true;
        }

        if !(self.executor.system_memory > 0.0) {
            error!(
                "executor.system_memory must be a positive number of GB, found {}",
                self.executor.system_memory
            );
            contains_error = true;
        }

        for (name, delay) in [
            ("start_delay", self.executor.start_delay),
            ("poll_delay", self.executor.poll_delay),
            ("stagger_delay", self.executor.stagger_delay),
        ] {
            if !(delay >= 0.0) || !delay.is_finite() {
                error!("executor.{name} must be a non-negative number of seconds, found {delay}");
                contains_error = true;
            }
        }

        match ConfigDocument::from_file(&self.template, NameFormats::new()) {
            Ok(template) => {
                let executable = PathBuf::from(template.executable());

                match check_executable(&executable) {
                    Ok(true) => {}
                    Ok(false) => warn!(
                        "EXE-FILE {} is not executable, this might cause problems",
                        executable.to_string_lossy()
                    ),
                    Err(e) => warn!(
                        "Failed to determine if EXE-FILE ({}) is an executable: {e}",
                        executable.to_string_lossy()
                    ),
                }

                if template.field(&self.map_keyword).is_none() {
                    warn!(
                        "Template has no {} field, map paths are only usable as placeholders",
                        self.map_keyword
                    );
                }
            }
            Err(e) => {
                error!(
                    "Failed to load template {}: {e}",
                    self.template.to_string_lossy()
                );
                contains_error = true;
            }
        }

        if self.runs.is_empty() {
            error!("No runs were defined, unable to build a queue of simulations");
            contains_error = true;
        }

        if let Err(e) = parameter_axes(&self.defaults.params) {
            error!("defaults.params: {e}");
            contains_error = true;
        }

        for (index, run) in self.runs.iter().enumerate() {
            if run.maps.is_empty() {
                error!("runs.{index} contains no maps, a run can't be a NOP");
                contains_error = true;
            }

            for map in run.maps.iter().filter(|map| !map.is_file()) {
                error!("runs.{index}: map {} not found", map.to_string_lossy());
                contains_error = true;
            }

            match parameter_axes(&run.params) {
                Ok(axes) => {
                    for (key, _) in axes.iter().filter(|(_, values)| values.is_empty()) {
                        error!("runs.{index}.params.{key} is empty, the run would not produce any simulation");
                        contains_error = true;
                    }
                }
                Err(e) => {
                    error!("runs.{index}.params: {e}");
                    contains_error = true;
                }
            }
        }

        if !contains_error {
            info!("Preflight checks passed");
        }

        contains_error
    }
}

fn default_template() -> PathBuf {
    PathBuf::from("FRACTURE_INITIALIZATION.INP")
}

fn default_map_keyword() -> String {
    "APER-MAP".to_owned()
}

fn default_slots() -> usize {
    4
}

fn default_system_memory() -> f64 {
    8.0
}

fn default_start_delay() -> f64 {
    20.0
}

fn default_poll_delay() -> f64 {
    5.0
}

fn default_stagger_delay() -> f64 {
    5.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const CONFIG: &str = "
template: base.INP
executor:
  slots: 2
  system_memory: 10
defaults:
  params:
    OUTLET-PRESS: 0.0
    INLET-PRESS: [100, 200]
  formats:
    input_file: inp/%APER-MAP%.INP
    STAT-FILE: stats/default.csv
runs:
  - maps: [a.txt, b.txt]
    params:
      INLET-PRESS: [300]
      MODE: [fast, slow]
    formats:
      STAT-FILE: stats/%INLET-PRESS%.csv
  - maps: [c.txt]
";

    fn axes(requests: &[RunRequest], index: usize) -> Vec<(&str, Vec<&str>)> {
        requests[index]
            .params
            .iter()
            .map(|(key, values)| (key.as_str(), values.iter().map(String::as_str).collect()))
            .collect()
    }

    #[test]
    fn parse_with_defaults() {
        let config: BulkConfig = serde_yaml::from_str("runs: []").unwrap();

        assert_eq!(config.template, PathBuf::from("FRACTURE_INITIALIZATION.INP"));
        assert_eq!(config.delimiter, Delimiter::Auto);
        assert_eq!(config.map_keyword, "APER-MAP");
        assert_eq!(config.executor.slots, 4);
        assert!((config.executor.memory_budget() - 7.2).abs() < 1e-9);
        assert_eq!(config.executor.start_delay(), Duration::from_secs(20));
        assert_eq!(config.executor.timing().poll_delay, Duration::from_secs(5));
    }

    #[test]
    fn parse_rejects_unknown_fields() {
        assert!(serde_yaml::from_str::<BulkConfig>("runs: []\nthreads: 3").is_err());
    }

    #[test]
    fn run_requests_override_defaults() {
        let config: BulkConfig = serde_yaml::from_str(CONFIG).unwrap();
        let requests = config.run_requests().unwrap();

        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].map, PathBuf::from("a.txt"));
        assert_eq!(requests[1].map, PathBuf::from("b.txt"));
        assert_eq!(
            axes(&requests, 0),
            vec![
                ("OUTLET-PRESS", vec!["0.0"]),
                ("INLET-PRESS", vec!["300"]),
                ("MODE", vec!["fast", "slow"]),
            ]
        );
        assert_eq!(
            requests[0].formats.get("STAT-FILE").map(String::as_str),
            Some("stats/%INLET-PRESS%.csv")
        );
        assert_eq!(
            requests[0].formats.get("input_file").map(String::as_str),
            Some("inp/%APER-MAP%.INP")
        );

        assert_eq!(
            axes(&requests, 2),
            vec![
                ("OUTLET-PRESS", vec!["0.0"]),
                ("INLET-PRESS", vec!["100", "200"]),
            ]
        );
        assert_eq!(
            requests[2].formats.get("STAT-FILE").map(String::as_str),
            Some("stats/default.csv")
        );
    }

    #[test]
    fn parameter_axes_rejects_nested_values() {
        let config: BulkConfig =
            serde_yaml::from_str("runs:\n  - maps: [a.txt]\n    params: {P: {x: 1}}").unwrap();

        assert!(matches!(
            config.run_requests(),
            Err(ConfigErrors::InvalidParameter { .. })
        ));
    }

    #[test]
    fn preflight_reports_errors() {
        let config: BulkConfig = serde_yaml::from_str(
            "template: /nonexistent/template.INP\nexecutor: {slots: 0, system_memory: -1}\nruns: []",
        )
        .unwrap();

        assert!(config.preflight_checks());
    }

    #[test]
    fn preflight_accepts_valid_config() {
        let dir = tempfile::tempdir().unwrap();
        let executable = dir.path().join("sim");
        let template = dir.path().join("base.INP");
        let map = dir.path().join("map.txt");

        fs::write(&executable, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&executable, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(
            &template,
            format!("EXE-FILE: {}\nAPER-MAP: none\n", executable.display()),
        )
        .unwrap();
        fs::write(&map, "1 2\n3 4\n").unwrap();

        let config: BulkConfig = serde_yaml::from_str(&format!(
            "template: {}\nruns:\n  - maps: [{}]\n    params: {{P: [1, 2]}}",
            template.display(),
            map.display()
        ))
        .unwrap();

        assert!(check_executable(&executable).unwrap());
        assert!(!config.preflight_checks());
    }
}
