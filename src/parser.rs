//! Parsing of the tool's per-object summary text into coverage rows.
//!
//! One invocation with function summaries enabled prints a block per
//! function, then a block per source file touched by the object:
//!
//! ```text
//! Function 'my_add'
//! Lines executed:100.00% of 5
//!
//! File 'src/add.c'
//! Lines executed:100.00% of 5
//! ```

use crate::error::{Error, Result};
use crate::record::{CoverageRecord, RecordKind};

const FILE_PREFIX: &str = "File '";
const FUNCTION_PREFIX: &str = "Function '";
const DATA_PREFIX: &str = "Lines executed:";
const PERCENT_SUFFIX: &str = "% of ";
const NO_EXECUTABLE_LINES: &str = "No executable lines";
const NAME_QUOTE: char = '\'';

/// Every row produced by one object, already stamped with the object's name.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ObjectCoverage {
    pub files: Vec<CoverageRecord>,
    pub functions: Vec<CoverageRecord>,
}

impl ObjectCoverage {
    pub fn record_count(&self) -> usize {
        self.files.len() + self.functions.len()
    }
}

/// Parses one object's raw output and tags each row with `object`.
///
/// Returns `Ok(None)` when the object declared no files, which is what the
/// tool prints for a translation unit without executable lines.
pub fn parse_object_output<S: AsRef<str>>(
    object: &str,
    lines: &[S],
) -> Result<Option<ObjectCoverage>> {
    let lines = drop_no_executable_blocks(lines);

    let mut file_names = Vec::new();
    let mut function_names = Vec::new();
    let mut data = Vec::new();
    for line in lines {
        if line.starts_with(FILE_PREFIX) {
            file_names.push(quoted_name(object, line)?);
        } else if line.starts_with(FUNCTION_PREFIX) {
            function_names.push(quoted_name(object, line)?);
        } else if line.starts_with(DATA_PREFIX) {
            data.push(line);
        }
    }

    let declarations = file_names.len() + function_names.len();
    if declarations != data.len() {
        return Err(Error::parse_format(
            object,
            format!(
                "{} declarations ({} files, {} functions) but {} data blocks",
                declarations,
                file_names.len(),
                function_names.len(),
                data.len()
            ),
        ));
    }

    if file_names.is_empty() {
        return Ok(None);
    }

    let mut measurements = data
        .into_iter()
        .map(|line| parse_lines_executed(object, line))
        .collect::<Result<Vec<_>>>()?
        .into_iter();

    let functions = function_names
        .into_iter()
        .zip(measurements.by_ref())
        .map(|(name, (percent, loc))| {
            CoverageRecord::new(RecordKind::Function, name, object, loc, percent)
        })
        .collect();
    let files = file_names
        .into_iter()
        .zip(measurements)
        .map(|(name, (percent, loc))| {
            CoverageRecord::new(RecordKind::File, name, object, loc, percent)
        })
        .collect();

    Ok(Some(ObjectCoverage { files, functions }))
}

/// Removes each "No executable lines" marker together with the declaration
/// line printed just before it.
fn drop_no_executable_blocks<S: AsRef<str>>(lines: &[S]) -> Vec<&str> {
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line.as_ref().trim_end_matches(['\r', '\n']);
        if line.trim() == NO_EXECUTABLE_LINES {
            kept.pop();
        } else {
            kept.push(line);
        }
    }
    kept
}

/// Text between the first and the last quote, so names may contain quotes themselves.
fn quoted_name(object: &str, line: &str) -> Result<String> {
    let name = line
        .split_once(NAME_QUOTE)
        .and_then(|(_, rest)| rest.rsplit_once(NAME_QUOTE))
        .map(|(name, _)| name);
    match name {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(Error::parse_format(
            object,
            format!("cannot read quoted name from '{}'", line),
        )),
    }
}

/// Extracts `(percent, lines_of_code)` from `Lines executed:NN.NN% of M`.
fn parse_lines_executed(object: &str, line: &str) -> Result<(f64, u64)> {
    let bad = |what: &str| {
        Error::parse_format(object, format!("{} in data line '{}'", what, line))
    };

    let rest = line
        .strip_prefix(DATA_PREFIX)
        .ok_or_else(|| bad("missing prefix"))?;
    let (percent, loc) = rest
        .split_once(PERCENT_SUFFIX)
        .ok_or_else(|| bad("missing percentage marker"))?;

    let percent: f64 = percent
        .trim()
        .parse()
        .map_err(|_| bad("unreadable percentage"))?;
    if !(0.0..=100.0).contains(&percent) {
        return Err(bad("percentage out of range"));
    }
    let loc: u64 = loc
        .trim()
        .parse()
        .map_err(|_| bad("unreadable line count"))?;

    Ok((percent, loc))
}
