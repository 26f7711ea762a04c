use unicode_normalization::UnicodeNormalization;

use crate::parser::ObjectCoverage;
use crate::record::{CoverageRecord, RecordKind};

/// Extension of the files handed to the coverage tool; everything else is a header.
pub const SOURCE_SUFFIX: &str = ".c";

/// Rows of a single kind. Names may repeat across objects.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageTable {
    kind: RecordKind,
    rows: Vec<CoverageRecord>,
}

impl CoverageTable {
    pub fn new(kind: RecordKind) -> Self {
        CoverageTable {
            kind,
            rows: Vec::new(),
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn rows(&self) -> &[CoverageRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extend(&mut self, rows: impl IntoIterator<Item = CoverageRecord>) {
        let kind = self.kind;
        self.rows.extend(rows.into_iter().inspect(|row| {
            debug_assert_eq!(row.kind, kind, "row kind must match table kind");
        }));
    }

    /// New table holding the rows that satisfy `keep`.
    pub fn retain_to(&self, mut keep: impl FnMut(&CoverageRecord) -> bool) -> Self {
        CoverageTable {
            kind: self.kind,
            rows: self.rows.iter().filter(|row| keep(*row)).cloned().collect(),
        }
    }

    pub fn total_lines(&self) -> u64 {
        self.rows.iter().map(|row| row.lines_of_code).sum()
    }

    pub fn covered_lines(&self) -> u64 {
        self.rows.iter().map(|row| row.covered_lines).sum()
    }

    pub fn covered_rows(&self) -> u64 {
        self.rows.iter().filter(|row| row.is_covered()).count() as u64
    }
}

/// The FileTable/FuncTable pair accumulated over one report run.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageTables {
    pub files: CoverageTable,
    pub functions: CoverageTable,
}

impl Default for CoverageTables {
    fn default() -> Self {
        CoverageTables {
            files: CoverageTable::new(RecordKind::File),
            functions: CoverageTable::new(RecordKind::Function),
        }
    }
}

impl CoverageTables {
    /// Appends one object's rows. Duplicate names are kept as separate rows.
    pub fn merge_object(&mut self, coverage: ObjectCoverage) {
        self.files.extend(coverage.files);
        self.functions.extend(coverage.functions);
    }

    pub fn filter(&self, options: &FilterOptions) -> CoverageTables {
        let object_matcher = KeywordMatcher::new(&options.file_keyword, options.ignore_case);
        let name_matcher = KeywordMatcher::new(&options.func_keyword, options.ignore_case);

        let files = self.files.retain_to(|row| {
            object_matcher.matches(&row.object)
                && (!options.exclude_header || is_compiled_source(&row.name))
        });
        let functions = self
            .functions
            .retain_to(|row| object_matcher.matches(&row.object) && name_matcher.matches(&row.name));

        CoverageTables { files, functions }
    }
}

impl FromIterator<ObjectCoverage> for CoverageTables {
    fn from_iter<I: IntoIterator<Item = ObjectCoverage>>(iter: I) -> Self {
        let mut tables = CoverageTables::default();
        for coverage in iter {
            tables.merge_object(coverage);
        }
        tables
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOptions {
    /// Substring the row's object must contain.
    pub file_keyword: String,
    /// Substring a function name must contain.
    pub func_keyword: String,
    pub ignore_case: bool,
    /// Drop file rows that are not compiled sources (headers).
    pub exclude_header: bool,
}

impl Default for FilterOptions {
    fn default() -> Self {
        FilterOptions {
            file_keyword: String::new(),
            func_keyword: String::new(),
            ignore_case: true,
            exclude_header: true,
        }
    }
}

pub fn is_compiled_source(name: &str) -> bool {
    name.ends_with(SOURCE_SUFFIX)
}

struct KeywordMatcher {
    needle: String,
    ignore_case: bool,
}

impl KeywordMatcher {
    fn new(keyword: &str, ignore_case: bool) -> Self {
        KeywordMatcher {
            needle: fold(keyword, ignore_case),
            ignore_case,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        // An empty keyword is a substring of everything.
        self.needle.is_empty() || fold(haystack, self.ignore_case).contains(&self.needle)
    }
}

fn fold(s: &str, ignore_case: bool) -> String {
    let normalized: String = s.nfc().collect();
    if ignore_case {
        normalized.to_lowercase()
    } else {
        normalized
    }
}
