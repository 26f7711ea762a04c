/// Which kind of entity a coverage row describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    File,
    Function,
}

impl RecordKind {
    pub fn label(self) -> &'static str {
        match self {
            RecordKind::File => "File",
            RecordKind::Function => "Function",
        }
    }
}

/// One row of coverage for a file or function, as seen from one compilation object.
///
/// Rows with the same `name` under different objects are distinct: a header
/// inlined into two translation units yields two rows.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRecord {
    pub kind: RecordKind,
    pub name: String,
    pub object: String,
    pub lines_of_code: u64,
    pub covered_percent: f64,
    pub covered_lines: u64,
}

impl CoverageRecord {
    /// Builds a row from the tool's percentage and line count.
    /// `covered_lines` is always back-derived, never taken from the tool.
    pub fn new(
        kind: RecordKind,
        name: impl Into<String>,
        object: impl Into<String>,
        lines_of_code: u64,
        covered_percent: f64,
    ) -> Self {
        CoverageRecord {
            kind,
            name: name.into(),
            object: object.into(),
            lines_of_code,
            covered_percent,
            covered_lines: covered_lines(covered_percent, lines_of_code),
        }
    }

    pub fn is_covered(&self) -> bool {
        self.covered_lines > 0
    }
}

/// `round(percent / 100 * loc)`, clamped to `[0, loc]`.
pub fn covered_lines(covered_percent: f64, lines_of_code: u64) -> u64 {
    let percent = covered_percent.clamp(0.0, 100.0);
    let covered = (percent / 100.0 * lines_of_code as f64).round() as u64;
    covered.min(lines_of_code)
}
