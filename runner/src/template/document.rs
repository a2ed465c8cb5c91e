use super::{line::ConfigLine, TemplateError};
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex, RegexBuilder};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// keyword of the line holding the path of the simulation executable
pub const EXECUTABLE_KEYWORD: &str = "EXE-FILE";
/// reserved name format for the written input file, it has no line of its own
pub const INPUT_FILE: &str = "input_file";
pub const DEFAULT_INPUT_FILE: &str = "FRACTURE_INITIALIZATION.INP";

/// output name -> path template with `%keyword%` placeholders
pub type NameFormats = BTreeMap<String, String>;

static LEADING_COMMENT: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"^(;+)\s+"));

/// Values that are only used to fill `%name%` placeholders of output paths
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Placeholders(BTreeMap<String, String>);

impl Placeholders {
    pub fn insert(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_owned(), value.to_owned());
    }

    #[cfg(test)]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

/// Where a parameter passed to `ConfigDocument::update` ends up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterTarget {
    /// the keyword is declared by a line of the document
    Field,
    /// unknown keyword, only usable as a file name placeholder
    Placeholder,
}

/// An ordered set of configuration lines for a single simulation run
#[derive(Debug, Clone)]
pub struct ConfigDocument {
    // upper case keyword -> line, later duplicates replace earlier ones
    fields: BTreeMap<String, ConfigLine>,
    // keyword per source line, duplicates included
    order: Vec<String>,
    formats: NameFormats,
    placeholders: Placeholders,
    /// estimated memory requirement in GB
    pub memory_required: f64,
    input_path: PathBuf,
}

fn field_key(keyword: &str) -> String {
    keyword.to_ascii_uppercase()
}

fn with_default_input(mut formats: NameFormats) -> NameFormats {
    if !formats
        .keys()
        .any(|name| name.eq_ignore_ascii_case(INPUT_FILE))
    {
        formats.insert(INPUT_FILE.to_owned(), DEFAULT_INPUT_FILE.to_owned());
    }

    formats
}

fn placeholder_pattern(name: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("%{}%", regex::escape(name)))
        .case_insensitive(true)
        .build()
}

impl ConfigDocument {
    /// parse a template, fails if no `EXE-FILE` line is present
    pub fn parse(source: &str, formats: NameFormats) -> Result<Self, TemplateError> {
        let leading_comment = LEADING_COMMENT.as_ref().map_err(Clone::clone)?;
        let mut fields = BTreeMap::new();
        let mut order = Vec::new();

        for raw in source.lines() {
            let normalized = leading_comment.replace(raw, "$1");
            let line = ConfigLine::parse(&normalized);
            let key = field_key(line.keyword());

            order.push(key.clone());
            fields.insert(key, line);
        }

        match fields.get(EXECUTABLE_KEYWORD) {
            Some(line) => info!(
                executable = line.value(),
                "Using executable defined in template header"
            ),
            None => return Err(TemplateError::MissingExecutable),
        }

        Ok(Self {
            fields,
            order,
            formats: with_default_input(formats),
            placeholders: Placeholders::default(),
            memory_required: 0.0,
            input_path: PathBuf::from(DEFAULT_INPUT_FILE),
        })
    }

    pub fn from_file(path: &Path, formats: NameFormats) -> Result<Self, TemplateError> {
        let source = fs::read_to_string(path).map_err(|error| TemplateError::Io {
            path: path.to_path_buf(),
            error,
        })?;

        Self::parse(&source, formats)
    }

    /// deep copy of all lines, inheriting the name formats unless `formats` is given
    pub fn clone_with_formats(&self, formats: Option<&NameFormats>) -> Self {
        let formats = formats.unwrap_or(&self.formats).clone();

        Self {
            fields: self.fields.clone(),
            order: self.order.clone(),
            formats: with_default_input(formats),
            placeholders: Placeholders::default(),
            memory_required: 0.0,
            input_path: PathBuf::from(DEFAULT_INPUT_FILE),
        }
    }

    pub fn target(&self, key: &str) -> ParameterTarget {
        if self.fields.contains_key(&field_key(key)) {
            ParameterTarget::Field
        } else {
            ParameterTarget::Placeholder
        }
    }

    /// set field values, unknown keys are kept as file name placeholders
    pub fn update<I, K, V>(&mut self, params: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in params {
            let (key, value) = (key.as_ref(), value.as_ref());

            match self.target(key) {
                ParameterTarget::Field => {
                    if let Some(line) = self.fields.get_mut(&field_key(key)) {
                        line.update(value, true);
                    }
                }
                ParameterTarget::Placeholder => {
                    debug!(key, value, "Storing undeclared parameter as placeholder");
                    self.placeholders.insert(key, value);
                }
            }
        }
    }

    /// substitute placeholders in all name formats, create the output directories
    /// and point the matching lines at the resolved paths
    ///
    /// The directory of the input file itself is created by `write_to_disk`.
    pub fn resolve_output_paths(&mut self) -> Result<&Path, TemplateError> {
        let mut outputs = self.formats.clone();

        let substitutions = self
            .fields
            .iter()
            .filter(|(key, _)| !key.is_empty())
            .map(|(key, line)| (key.as_str(), line.value()))
            .chain(self.placeholders.iter());

        for (name, value) in substitutions {
            let pattern = placeholder_pattern(name)?;

            for path in outputs.values_mut() {
                let replaced = pattern.replace_all(path.as_str(), NoExpand(value)).into_owned();
                *path = replaced;
            }
        }

        let mut input_path = None;

        for (name, path) in outputs {
            if name.eq_ignore_ascii_case(INPUT_FILE) {
                input_path = Some(PathBuf::from(&path));
            } else {
                match self.fields.get_mut(&field_key(&name)) {
                    Some(line) => line.update(&path, true),
                    None => return Err(TemplateError::UndefinedOutput(name)),
                }

                ensure_parent(Path::new(&path))?;
            }
        }

        if let Some(path) = input_path {
            self.input_path = path;
        }

        Ok(&self.input_path)
    }

    /// resolve the output paths and serialize all lines in source order
    pub fn render(&mut self) -> Result<String, TemplateError> {
        self.resolve_output_paths()?;

        Ok(self.render_lines())
    }

    fn render_lines(&self) -> String {
        self.order
            .iter()
            .filter_map(|key| self.fields.get(key))
            .fold(String::new(), |mut content, line| {
                content.push_str(&line.render());
                content.push('\n');
                content
            })
    }

    /// write the rendered document to its input file path, below `base` if given
    pub fn write_to_disk(&mut self, base: Option<&Path>) -> Result<PathBuf, TemplateError> {
        let content = self.render()?;
        let path = match base {
            Some(base) => base.join(&self.input_path),
            None => self.input_path.clone(),
        };

        ensure_parent(&path)?;
        fs::write(&path, content).map_err(|error| TemplateError::Io {
            path: path.clone(),
            error,
        })?;

        info!(path = ?path, "Input file saved");

        Ok(path)
    }

    pub fn executable(&self) -> &str {
        self.fields
            .get(EXECUTABLE_KEYWORD)
            .map_or("", ConfigLine::value)
    }

    pub fn field(&self, keyword: &str) -> Option<&ConfigLine> {
        self.fields.get(&field_key(keyword))
    }

}

#[cfg(test)]
impl ConfigDocument {
    pub fn placeholders(&self) -> &Placeholders {
        &self.placeholders
    }

    pub fn formats(&self) -> &NameFormats {
        &self.formats
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// source lines, duplicates included
    pub fn line_count(&self) -> usize {
        self.order.len()
    }
}

fn ensure_parent(path: &Path) -> Result<(), TemplateError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() && !parent.is_dir() => {
            debug!(directory = ?parent, "Creating output directory");

            fs::create_dir_all(parent).map_err(|error| TemplateError::Io {
                path: parent.to_path_buf(),
                error,
            })
        }
        _ => Ok(()),
    }
}
