use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path, str::FromStr};
use thiserror::Error;
use tracing::debug;

static SEPARATOR: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r"[-0-9.+eE]+([^-0-9.+eE]+)[-0-9.+eE]+"));

/// start of a comment, the rest of the line is ignored
const COMMENT: char = '#';

#[derive(Debug, Error)]
pub enum GridError {
    #[error("Failed to read grid")]
    Io(#[from] std::io::Error),
    #[error("Grid contains no data")]
    Empty,
    #[error("Unable to detect a delimiter in the first line")]
    UnknownDelimiter,
    #[error("Invalid delimiter pattern")]
    Pattern(#[from] regex::Error),
    #[error("Row {row} has {found} columns, expected {expected}")]
    Ragged {
        row: usize,
        expected: usize,
        found: usize,
    },
}

/// Column separator of a grid file
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Delimiter {
    /// detect from the first data line
    #[default]
    Auto,
    /// any run of whitespace
    Whitespace,
    Separator(String),
}

impl FromStr for Delimiter {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value {
            "auto" => Self::Auto,
            "" | "whitespace" => Self::Whitespace,
            separator => match separator.trim() {
                "" => Self::Whitespace,
                trimmed => Self::Separator(trimmed.to_owned()),
            },
        })
    }
}

impl TryFrom<String> for Delimiter {
    type Error = std::convert::Infallible;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Delimiter> for String {
    fn from(value: Delimiter) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Delimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Whitespace => write!(f, "whitespace"),
            Self::Separator(separator) => write!(f, "{separator}"),
        }
    }
}

impl Delimiter {
    /// resolve `Auto` against the first data line of a grid
    pub fn sniff(&self, line: &str) -> Result<Self, GridError> {
        match self {
            Self::Auto => {
                let captures = SEPARATOR
                    .as_ref()
                    .map_err(Clone::clone)?
                    .captures(line)
                    .ok_or(GridError::UnknownDelimiter)?;

                Ok(captures[1].parse().unwrap_or(Self::Whitespace))
            }
            resolved => Ok(resolved.clone()),
        }
    }

    fn count_columns(&self, line: &str) -> usize {
        match self {
            Self::Separator(separator) => line.trim().split(separator.as_str()).count(),
            Self::Auto | Self::Whitespace => line.split_whitespace().count(),
        }
    }
}

/// Dimensions of a 2-D grid, `width` columns by `height` rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub width: usize,
    pub height: usize,
}

impl GridShape {
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}

/// read the dimensions of a delimited text grid
pub fn load_shape(path: &Path, delimiter: &Delimiter) -> Result<GridShape, GridError> {
    let content = fs::read_to_string(path)?;
    let shape = parse_shape(&content, delimiter)?;

    debug!(path = ?path, width = shape.width, height = shape.height, "Loaded grid shape");

    Ok(shape)
}

pub fn parse_shape(content: &str, delimiter: &Delimiter) -> Result<GridShape, GridError> {
    let mut rows = content
        .lines()
        .map(|line| line.split(COMMENT).next().unwrap_or_default())
        .filter(|line| !line.trim().is_empty());
    let first = rows.next().ok_or(GridError::Empty)?;
    let delimiter = delimiter.sniff(first)?;
    let width = delimiter.count_columns(first);
    let mut height = 1;

    for row in rows {
        let found = delimiter.count_columns(row);

        if found != width {
            return Err(GridError::Ragged {
                row: height,
                expected: width,
                found,
            });
        }

        height += 1;
    }

    Ok(GridShape { width, height })
}
