//! gcov Coverage Tally
//!
//! Runs gcov once per C source file in a tree, collects the per-object file
//! and function summaries into two tables, and prints a filtered report.
//!
//! Header files compiled into several translation units are reported once per
//! including object. Those rows are kept as-is, so totals describe the build,
//! not a deduplicated source tree; compare runs against each other to track
//! coverage gains.

mod error;
mod parser;
mod record;
mod report;
mod table;
mod tool;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use colored::*;

use error::{Error, Result};
use parser::parse_object_output;
use report::{build_report, ObjectFailure, ReportOptions, RunMetrics, Summary};
use table::{CoverageTables, FilterOptions};
use tool::{discover_sources, object_label, reset_accumulated_coverage, run_coverage_tool, ToolConfig};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Per-object gcov coverage tally",
    long_about = "Runs gcov on every .c file under a root and reports line, file and function coverage. Header rows are counted once per including object."
)]
struct Cli {
    /// Log per-object progress (RUST_LOG overrides).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Collect coverage for every source under ROOT and print the report.
    Report(ReportArgs),
    /// Delete the accumulated .gcda counters under ROOT before a fresh test run.
    Reset {
        root: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Source tree, or a single .c file.
    root: PathBuf,

    /// Keep header rows in the file table.
    #[arg(long)]
    include_headers: bool,

    /// Print the per-row file table.
    #[arg(long)]
    file_detail: bool,

    /// Print the per-row function table.
    #[arg(long)]
    func_detail: bool,

    /// Only keep rows whose object contains this text.
    #[arg(long, default_value = "")]
    file_keyword: String,

    /// Only keep functions whose name contains this text.
    #[arg(long, default_value = "")]
    func_keyword: String,

    #[arg(long)]
    case_sensitive: bool,

    /// Abort on the first object with unreadable gcov output instead of skipping it.
    #[arg(long)]
    strict: bool,

    /// Seconds to wait for each gcov run.
    #[arg(long, default_value = "60", value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Directory containing the .gcno/.gcda files (default: next to each source).
    #[arg(long)]
    object_dir: Option<PathBuf>,

    #[arg(long, env = "GCOVTALLY_GCOV", default_value = "gcov")]
    gcov: PathBuf,
}

impl ReportArgs {
    fn report_options(&self) -> ReportOptions {
        ReportOptions {
            filter: FilterOptions {
                file_keyword: self.file_keyword.clone(),
                func_keyword: self.func_keyword.clone(),
                ignore_case: !self.case_sensitive,
                exclude_header: !self.include_headers,
            },
            file_detail: self.file_detail,
            func_detail: self.func_detail,
        }
    }

    fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            program: self.gcov.clone().into_os_string(),
            object_dir: self.object_dir.clone(),
            timeout: Duration::from_secs(self.timeout),
        }
    }
}

/// Filtered tables plus everything printed about them.
#[derive(Debug)]
struct Report {
    tables: CoverageTables,
    summary: Summary,
    failures: Vec<ObjectFailure>,
    rendered: String,
}

/// Runs the tool over `objects` in order and accumulates their rows.
///
/// Tool failures always skip the object. Malformed output skips it too,
/// unless `strict` is set, in which case the whole run fails.
fn collect_tables<F>(
    objects: &[PathBuf],
    strict: bool,
    metrics: &mut RunMetrics,
    mut run_tool: F,
) -> Result<(CoverageTables, Vec<ObjectFailure>)>
where
    F: FnMut(&Path) -> Result<Vec<String>>,
{
    let mut tables = CoverageTables::default();
    let mut failures = Vec::new();

    for object in objects {
        let label = object_label(object);
        let outcome = run_tool(object).and_then(|lines| parse_object_output(&label, &lines));
        match outcome {
            Ok(Some(coverage)) => {
                log::debug!("{}: {} records", label, coverage.record_count());
                metrics.record_object(coverage.record_count());
                tables.merge_object(coverage);
            }
            Ok(None) => {
                log::debug!("{}: no executable lines", label);
                metrics.record_object(0);
            }
            Err(err @ Error::ParseFormat { .. }) if strict => return Err(err),
            Err(err) if err.is_per_object() => {
                log::warn!("Skipping {}: {}", label, err);
                metrics.record_failure();
                failures.push(ObjectFailure { object: label, error: err });
            }
            Err(err) => return Err(err),
        }
    }

    Ok((tables, failures))
}

fn generate_report_with<F>(
    root: &Path,
    options: &ReportOptions,
    strict: bool,
    metrics: &mut RunMetrics,
    terminal_width: usize,
    mut run_tool: F,
) -> Result<Report>
where
    F: FnMut(&Path, &Path) -> Result<Vec<String>>,
{
    if !root.exists() {
        return Err(Error::Usage(format!("Path does not exist: {}", root.display())));
    }

    let tree = discover_sources(root)?;
    log::info!(
        "Found {} source file(s) under {}",
        tree.objects.len(),
        root.display()
    );

    let (tables, failures) = collect_tables(&tree.objects, strict, metrics, |object| {
        run_tool(&tree.work_dir, object)
    })?;
    metrics.finish();

    let tables = tables.filter(&options.filter);
    let summary = Summary::from_tables(&tables);
    log::info!(
        "{} file rows and {} function rows after filtering",
        tables.files.len(),
        tables.functions.len()
    );
    if tables.files.is_empty() {
        log::warn!("No file rows left after filtering; file ratios are undefined");
    }

    let rendered = build_report(
        root,
        options,
        &tables,
        &summary,
        &failures,
        metrics,
        terminal_width,
    );

    Ok(Report {
        tables,
        summary,
        failures,
        rendered,
    })
}

fn generate_report(
    root: &Path,
    options: &ReportOptions,
    config: &ToolConfig,
    strict: bool,
    metrics: &mut RunMetrics,
) -> Result<Report> {
    generate_report_with(
        root,
        options,
        strict,
        metrics,
        report::terminal_width(),
        |work_dir, object| run_coverage_tool(config, work_dir, object),
    )
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Report(args) => {
            println!(
                "{} {}",
                env!("CARGO_PKG_NAME").bright_cyan().bold(),
                format!("v{}", env!("CARGO_PKG_VERSION")).bright_yellow()
            );
            let mut metrics = RunMetrics::new();
            let report = generate_report(
                &args.root,
                &args.report_options(),
                &args.tool_config(),
                args.strict,
                &mut metrics,
            )?;
            print!("{}", report.rendered);
            log::debug!(
                "Returned {} file rows, {} function rows, {} failed objects; {:?}",
                report.tables.files.len(),
                report.tables.functions.len(),
                report.failures.len(),
                report.summary
            );
            Ok(())
        }
        Commands::Reset { root } => {
            let removed = reset_accumulated_coverage(&root)?;
            println!(
                "Removed {} coverage counter file(s) under {}",
                removed.to_string().bright_yellow(),
                root.display()
            );
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colored::control;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::io;
    use tempfile::TempDir;

    const ADD_OUTPUT: &str = "\
Function 'static_add'
Lines executed:100.00% of 2
Function 'my_add'
Lines executed:100.00% of 5
File 'src/static.h'
Lines executed:50.00% of 4
File 'src/add.c'
Lines executed:100.00% of 5
";

    const MINUS_OUTPUT: &str = "\
Function 'static_minus'
Lines executed:0.00% of 2
Function 'my_minus'
Lines executed:0.00% of 5
File 'src/static.h'
Lines executed:50.00% of 4
File 'src/minus.c'
Lines executed:0.00% of 5
";

    fn quiet_metrics() -> RunMetrics {
        RunMetrics::with_writer(Box::new(io::sink()), false)
    }

    fn source_tree(names: &[&str]) -> TempDir {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        for name in names {
            let path = temp_dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "int main(void) { return 0; }\n").unwrap();
        }
        temp_dir
    }

    fn canned(object: &Path) -> Result<Vec<String>> {
        let text = match object.to_str() {
            Some("src/add.c") => ADD_OUTPUT,
            Some("src/minus.c") => MINUS_OUTPUT,
            Some("src/broken.c") => "File 'src/broken.c'\n",
            Some("src/empty.c") => "File 'src/empty.c'\nNo executable lines\n",
            Some(other) => return Err(Error::tool(other, "exited with exit status: 1")),
            None => unreachable!(),
        };
        Ok(text.lines().map(str::to_string).collect())
    }

    fn include_headers() -> ReportOptions {
        ReportOptions {
            filter: FilterOptions {
                exclude_header: false,
                ..FilterOptions::default()
            },
            ..ReportOptions::default()
        }
    }

    #[test]
    fn test_report_keeps_header_row_per_object() {
        control::set_override(false);
        let tree = source_tree(&["src/add.c", "src/minus.c"]);
        let mut metrics = quiet_metrics();
        let report = generate_report_with(
            tree.path(),
            &include_headers(),
            false,
            &mut metrics,
            100,
            |_, object| canned(object),
        )
        .unwrap();

        let headers: Vec<_> = report
            .tables
            .files
            .rows()
            .iter()
            .filter(|row| row.name == "src/static.h")
            .map(|row| (row.object.as_str(), row.covered_lines, row.lines_of_code))
            .collect();
        assert_eq!(headers, vec![("src/add.c", 2, 4), ("src/minus.c", 2, 4)]);
        assert_eq!(report.summary.line_coverage_by_file.to_string(), "9 / 18 (50.00%)");
        assert_eq!(report.summary.func_coverage.to_string(), "2 / 4 (50.00%)");
        assert!(report.failures.is_empty());
        assert_eq!(metrics.objects_processed, 2);
        assert_eq!(metrics.records_collected, 8);
    }

    #[test]
    fn test_report_excludes_headers_by_default() {
        control::set_override(false);
        let tree = source_tree(&["src/add.c", "src/minus.c"]);
        let report = generate_report_with(
            tree.path(),
            &ReportOptions::default(),
            false,
            &mut quiet_metrics(),
            100,
            |_, object| canned(object),
        )
        .unwrap();
        let names: Vec<_> = report.tables.files.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["src/add.c", "src/minus.c"]);
        assert_eq!(report.summary.line_coverage_by_file.to_string(), "5 / 10 (50.00%)");
        assert_eq!(report.summary.file_coverage.to_string(), "1 / 2 (50.00%)");
    }

    #[test]
    fn test_failed_objects_are_isolated() {
        control::set_override(false);
        let tree = source_tree(&["src/add.c", "src/broken.c", "src/empty.c", "src/zap.c"]);
        let mut metrics = quiet_metrics();
        let report = generate_report_with(
            tree.path(),
            &ReportOptions::default(),
            false,
            &mut metrics,
            100,
            |_, object| canned(object),
        )
        .unwrap();

        let failed: Vec<_> = report.failures.iter().map(|f| f.object.as_str()).collect();
        assert_eq!(failed, vec!["src/broken.c", "src/zap.c"]);
        assert!(matches!(report.failures[0].error, Error::ParseFormat { .. }));
        assert!(matches!(report.failures[1].error, Error::ToolInvocation { .. }));
        assert!(report
            .tables
            .files
            .rows()
            .iter()
            .all(|row| row.object == "src/add.c"));
        assert_eq!(metrics.objects_processed, 4);
        assert_eq!(metrics.objects_failed, 2);
        assert!(report.rendered.contains("2 object(s) contributed no coverage"));
    }

    #[test]
    fn test_strict_mode_aborts_on_format_error() {
        let tree = source_tree(&["src/add.c", "src/broken.c"]);
        let err = generate_report_with(
            tree.path(),
            &ReportOptions::default(),
            true,
            &mut quiet_metrics(),
            100,
            |_, object| canned(object),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ParseFormat { ref object, .. } if object == "src/broken.c"));
    }

    #[test]
    fn test_strict_mode_still_isolates_tool_failures() {
        let tree = source_tree(&["src/add.c", "src/zap.c"]);
        let report = generate_report_with(
            tree.path(),
            &ReportOptions::default(),
            true,
            &mut quiet_metrics(),
            100,
            |_, object| canned(object),
        )
        .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.tables.files.len(), 1);
    }

    #[test]
    fn test_missing_root_is_usage_error() {
        let tree = source_tree(&[]);
        let mut called = false;
        let err = generate_report_with(
            &tree.path().join("missing"),
            &ReportOptions::default(),
            false,
            &mut quiet_metrics(),
            100,
            |_, _| {
                called = true;
                Ok(Vec::new())
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::Usage(_)));
        assert!(!called, "no object should be processed");
    }

    #[test]
    fn test_empty_filter_result_reports_undefined() {
        control::set_override(false);
        let tree = source_tree(&["src/add.c"]);
        let options = ReportOptions {
            filter: FilterOptions {
                file_keyword: "nothing".into(),
                ..FilterOptions::default()
            },
            ..ReportOptions::default()
        };
        let report = generate_report_with(
            tree.path(),
            &options,
            false,
            &mut quiet_metrics(),
            100,
            |_, object| canned(object),
        )
        .unwrap();
        assert!(report.tables.files.is_empty());
        assert_eq!(report.summary.line_coverage_by_file.percent(), None);
        assert!(report
            .rendered
            .contains("Line coverage (by file):     0 / 0 (undefined)"));
    }

    #[test]
    fn test_tool_runs_from_the_root_directory() {
        let tree = source_tree(&["src/add.c"]);
        let mut seen = Vec::new();
        generate_report_with(
            tree.path(),
            &ReportOptions::default(),
            false,
            &mut quiet_metrics(),
            100,
            |work_dir, object| {
                seen.push((work_dir.to_path_buf(), object.to_path_buf()));
                canned(object)
            },
        )
        .unwrap();
        assert_eq!(
            seen,
            vec![(tree.path().to_path_buf(), PathBuf::from("src/add.c"))]
        );
    }

    #[test]
    fn test_cli_flags_map_to_options() {
        let cli = Cli::parse_from([
            "gcovtally",
            "report",
            "proj",
            "--include-headers",
            "--func-detail",
            "--func-keyword",
            "add",
            "--case-sensitive",
            "--timeout",
            "5",
            "--gcov",
            "gcov-13",
            "--object-dir",
            "build/objs",
        ]);
        let Commands::Report(args) = cli.command else {
            panic!("expected report subcommand");
        };
        let options = args.report_options();
        assert!(!options.filter.exclude_header);
        assert!(!options.filter.ignore_case);
        assert_eq!(options.filter.func_keyword, "add");
        assert_eq!(options.filter.file_keyword, "");
        assert!(options.func_detail);
        assert!(!options.file_detail);
        let config = args.tool_config();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.program, "gcov-13");
        assert_eq!(config.object_dir, Some(PathBuf::from("build/objs")));

        let Commands::Report(args) = Cli::parse_from(["gcovtally", "report", "proj"]).command else {
            panic!("expected report subcommand");
        };
        assert_eq!(args.tool_config().object_dir, None);
        assert_eq!(args.tool_config().timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_cli_rejects_zero_timeout() {
        let err = Cli::try_parse_from(["gcovtally", "report", "proj", "--timeout", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_requires_root() {
        let err = Cli::try_parse_from(["gcovtally", "report"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}
