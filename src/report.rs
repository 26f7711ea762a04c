//! Summary ratios and the fixed-layout text report.

use std::fmt::{self, Write as FmtWrite};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, Instant};

use colored::*;

use crate::error::Error;
use crate::table::{CoverageTable, CoverageTables, FilterOptions};

const OBJECT_WIDTH: usize = 28;
const MIN_NAME_WIDTH: usize = 24;
const DEFAULT_TERMINAL_WIDTH: usize = 112;
// Separators plus the CoveredLines, LOC and CoveredPercent columns.
const NUMERIC_COLUMNS_WIDTH: usize = 1 + 12 + 1 + 8 + 1 + 14;

/// `covered / total`, with an undefined percentage when `total` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ratio {
    pub covered: u64,
    pub total: u64,
}

impl Ratio {
    pub fn new(covered: u64, total: u64) -> Self {
        Ratio { covered, total }
    }

    /// Percentage rounded to two decimals, `None` when undefined.
    pub fn percent(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        let raw = self.covered as f64 / self.total as f64 * 100.0;
        Some((raw * 100.0).round() / 100.0)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.percent() {
            Some(percent) => write!(f, "{} / {} ({:.2}%)", self.covered, self.total, percent),
            None => write!(f, "{} / {} (undefined)", self.covered, self.total),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub line_coverage_by_file: Ratio,
    pub line_coverage_by_func: Ratio,
    pub file_coverage: Ratio,
    pub func_coverage: Ratio,
}

impl Summary {
    pub fn from_tables(tables: &CoverageTables) -> Self {
        Summary {
            line_coverage_by_file: line_ratio(&tables.files),
            line_coverage_by_func: line_ratio(&tables.functions),
            file_coverage: count_ratio(&tables.files),
            func_coverage: count_ratio(&tables.functions),
        }
    }
}

fn line_ratio(table: &CoverageTable) -> Ratio {
    Ratio::new(table.covered_lines(), table.total_lines())
}

fn count_ratio(table: &CoverageTable) -> Ratio {
    Ratio::new(table.covered_rows(), table.len() as u64)
}

/// An object that contributed no rows because its tool run or output failed.
#[derive(Debug)]
pub struct ObjectFailure {
    pub object: String,
    pub error: Error,
}

/// Everything needed to render one report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportOptions {
    pub filter: FilterOptions,
    pub file_detail: bool,
    pub func_detail: bool,
}

/// Progress and throughput counters for one run.
pub struct RunMetrics {
    pub objects_processed: u64,
    pub objects_failed: u64,
    pub records_collected: u64,
    start_time: Instant,
    last_update: Instant,
    writer: Box<dyn Write + Send>,
    progress_enabled: bool,
}

impl RunMetrics {
    pub fn new() -> Self {
        RunMetrics::with_writer(Box::new(std::io::stderr()), true)
    }

    pub fn with_writer(writer: Box<dyn Write + Send>, progress_enabled: bool) -> Self {
        RunMetrics {
            objects_processed: 0,
            objects_failed: 0,
            records_collected: 0,
            start_time: Instant::now(),
            last_update: Instant::now(),
            writer,
            progress_enabled,
        }
    }

    pub fn record_object(&mut self, records: usize) {
        self.objects_processed += 1;
        self.records_collected += records as u64;
        self.maybe_print_progress();
    }

    pub fn record_failure(&mut self) {
        self.objects_processed += 1;
        self.objects_failed += 1;
        self.maybe_print_progress();
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    fn maybe_print_progress(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.last_update) >= Duration::from_secs(1) {
            self.print_progress();
            self.last_update = now;
        }
    }

    fn print_progress(&mut self) {
        if !self.progress_enabled {
            return;
        }
        let elapsed = self.elapsed().as_secs_f64();
        let _ = write!(
            self.writer,
            "\rProcessed {} objects ({:.1} objects/sec), {} skipped...",
            self.objects_processed,
            safe_rate(self.objects_processed, elapsed),
            self.objects_failed
        );
        let _ = self.writer.flush();
    }

    /// Ends the progress line so the report starts on a fresh one.
    pub fn finish(&mut self) {
        if self.progress_enabled && self.objects_processed > 0 {
            let _ = writeln!(self.writer);
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        RunMetrics::new()
    }
}

fn safe_rate(value: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= f64::EPSILON {
        0.0
    } else {
        value as f64 / elapsed_secs
    }
}

/// Widest cell among `values`, never below `floor`. Cells are never cut.
fn column_width<'a>(values: impl Iterator<Item = &'a str>, floor: usize) -> usize {
    values
        .map(|value| value.chars().count())
        .max()
        .unwrap_or(0)
        .max(floor)
}

/// Room left for the Name column once the other columns are laid out.
fn name_column_floor(terminal_width: usize, object_width: usize) -> usize {
    terminal_width
        .saturating_sub(object_width + 1 + NUMERIC_COLUMNS_WIDTH)
        .max(MIN_NAME_WIDTH)
}

pub fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(terminal_size::Width(w), _)| w as usize)
        .unwrap_or(DEFAULT_TERMINAL_WIDTH)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DetailLayout {
    object_width: usize,
    name_width: usize,
}

impl DetailLayout {
    fn for_table(table: &CoverageTable, terminal_width: usize) -> Self {
        let object_width = column_width(
            table.rows().iter().map(|row| row.object.as_str()),
            OBJECT_WIDTH,
        );
        let name_width = column_width(
            table.rows().iter().map(|row| row.name.as_str()),
            name_column_floor(terminal_width, object_width),
        );
        DetailLayout {
            object_width,
            name_width,
        }
    }

    fn rule_width(&self) -> usize {
        self.object_width + 1 + self.name_width + NUMERIC_COLUMNS_WIDTH
    }

    fn format_row(&self, object: &str, name: &str, covered: &str, loc: &str, percent: &str) -> String {
        format!(
            "{:<ow$} {:<nw$} {:>12} {:>8} {:>14}",
            object,
            name,
            covered,
            loc,
            percent,
            ow = self.object_width,
            nw = self.name_width
        )
    }
}

fn write_detail_table(output: &mut String, table: &CoverageTable, terminal_width: usize) {
    let layout = DetailLayout::for_table(table, terminal_width);
    let rule_width = layout.rule_width();
    let title = format!("{} details:", table.kind().label());

    let _ = writeln!(output, "\n{}", title.blue().bold());
    let _ = writeln!(output, "{}", "-".repeat(rule_width));
    let _ = writeln!(
        output,
        "{}",
        layout.format_row("Object", "Name", "CoveredLines", "LOC", "CoveredPercent")
    );
    let _ = writeln!(output, "{}", "-".repeat(rule_width));
    for row in table.rows() {
        let _ = writeln!(
            output,
            "{}",
            layout.format_row(
                &row.object,
                &row.name,
                &row.covered_lines.to_string(),
                &row.lines_of_code.to_string(),
                &format!("{:.2}", row.covered_percent),
            )
        );
    }
    let _ = writeln!(output, "{:-<width$}", "", width = rule_width);
}

fn format_ratio(ratio: &Ratio) -> ColoredString {
    match ratio.percent() {
        Some(_) => ratio.to_string().bright_yellow(),
        None => ratio.to_string().red(),
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

pub fn build_report(
    root: &Path,
    options: &ReportOptions,
    tables: &CoverageTables,
    summary: &Summary,
    failures: &[ObjectFailure],
    metrics: &RunMetrics,
    terminal_width: usize,
) -> String {
    let mut output = String::new();
    let filter = &options.filter;

    let _ = writeln!(output, "{}", "Configuration:".blue().bold());
    let _ = writeln!(output, "  Root:             {}", root.display());
    let _ = writeln!(output, "  Exclude headers:  {}", on_off(filter.exclude_header));
    let _ = writeln!(output, "  File keyword:     '{}'", filter.file_keyword);
    let _ = writeln!(output, "  Function keyword: '{}'", filter.func_keyword);
    let _ = writeln!(output, "  Ignore case:      {}", on_off(filter.ignore_case));

    let _ = writeln!(output, "\n{}", "Coverage Summary:".blue().bold());
    let _ = writeln!(
        output,
        "Line coverage (by file):     {}",
        format_ratio(&summary.line_coverage_by_file)
    );
    let _ = writeln!(
        output,
        "Line coverage (by function): {}",
        format_ratio(&summary.line_coverage_by_func)
    );
    let _ = writeln!(
        output,
        "File coverage:               {}",
        format_ratio(&summary.file_coverage)
    );
    let _ = writeln!(
        output,
        "Function coverage:           {}",
        format_ratio(&summary.func_coverage)
    );

    if options.file_detail {
        write_detail_table(&mut output, &tables.files, terminal_width);
    }
    if options.func_detail {
        write_detail_table(&mut output, &tables.functions, terminal_width);
    }

    if !failures.is_empty() {
        let _ = writeln!(
            output,
            "\n{}: {} object(s) contributed no coverage",
            "Warning".red().bold(),
            failures.len().to_string().bright_yellow()
        );
        for failure in failures {
            let _ = writeln!(output, "  {}", failure.error);
        }
    }

    let elapsed = metrics.elapsed().as_secs_f64();
    let _ = writeln!(output, "\n{}", "Run Summary:".blue().bold());
    let _ = writeln!(
        output,
        "Objects processed: {} ({})",
        metrics.objects_processed.to_string().bright_yellow(),
        format!("{:.1} objects/sec", safe_rate(metrics.objects_processed, elapsed)).bright_yellow()
    );
    let _ = writeln!(
        output,
        "Records collected: {}",
        metrics.records_collected.to_string().bright_yellow()
    );
    let _ = writeln!(
        output,
        "Total time: {} seconds",
        format!("{:.2}", elapsed).bright_yellow()
    );

    output
}
