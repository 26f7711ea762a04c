//! Thin wrappers around the filesystem and the external coverage tool.

use std::ffi::OsString;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use glob::{glob, Pattern};

use crate::error::{Error, Result};
use crate::table::SOURCE_SUFFIX;

/// Suffix of the tool's accumulated per-run counter files.
pub const COUNTER_SUFFIX: &str = ".gcda";

/// Long file names, no `.gcov` output, function summaries, object directory.
const TOOL_FLAGS: [&str; 4] = ["-l", "-n", "-f", "-o"];
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const SUPPORTED_PLATFORMS: [&str; 7] = [
    "linux",
    "macos",
    "freebsd",
    "netbsd",
    "openbsd",
    "dragonfly",
    "windows",
];

#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub program: OsString,
    /// Directory holding the `.gcno`/`.gcda` files; defaults to the source's own directory.
    pub object_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            program: OsString::from("gcov"),
            object_dir: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Sources found under a root, relative to `work_dir`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub work_dir: PathBuf,
    pub objects: Vec<PathBuf>,
}

/// Slash-separated display name used as the object identifier.
pub fn object_label(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn utf8_root(root: &Path) -> Result<&str> {
    root.to_str()
        .ok_or_else(|| Error::Usage(format!("root is not valid UTF-8: {}", root.display())))
}

fn glob_files(root: &Path, suffix: &str) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/**/*{}", Pattern::escape(utf8_root(root)?), suffix);
    let entries = glob(&pattern).map_err(|source| Error::Pattern {
        pattern: pattern.clone(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if path.is_file() => files.push(path),
            Ok(_) => {}
            Err(err) => log::warn!("Skipping unreadable entry {}: {}", err.path().display(), err),
        }
    }
    Ok(files)
}

/// Lists every compiled source under `root` in lexicographic order.
/// A root naming a single source file yields just that file.
pub fn discover_sources(root: &Path) -> Result<SourceTree> {
    let metadata = fs::metadata(root).map_err(|err| Error::io(root, err))?;

    if metadata.is_file() {
        let work_dir = match root.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let objects = match root.file_name() {
            Some(name) if name.to_string_lossy().ends_with(SOURCE_SUFFIX) => {
                vec![PathBuf::from(name)]
            }
            _ => {
                log::warn!("{} is not a {} source", root.display(), SOURCE_SUFFIX);
                Vec::new()
            }
        };
        return Ok(SourceTree { work_dir, objects });
    }

    let mut objects: Vec<PathBuf> = glob_files(root, SOURCE_SUFFIX)?
        .into_iter()
        .filter_map(|path| path.strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    objects.sort();

    Ok(SourceTree {
        work_dir: root.to_path_buf(),
        objects,
    })
}

fn default_output_dir(object: &Path) -> PathBuf {
    match object.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Waits for the child until `deadline`. `Ok(None)` means it is still running.
fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn kill_and_reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Runs the coverage tool on one object from `work_dir` and returns its stdout lines.
/// Standard error is discarded.
pub fn run_coverage_tool(config: &ToolConfig, work_dir: &Path, object: &Path) -> Result<Vec<String>> {
    let label = object_label(object);
    let output_dir = config
        .object_dir
        .clone()
        .unwrap_or_else(|| default_output_dir(object));

    let mut child = Command::new(&config.program)
        .args(TOOL_FLAGS)
        .arg(&output_dir)
        .arg(object)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|err| {
            Error::tool(
                &label,
                format!("cannot start '{}': {}", config.program.to_string_lossy(), err),
            )
        })?;

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::tool(&label, "standard output was not captured"))?;
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = sender.send(stdout.read_to_end(&mut buffer).map(|_| buffer));
    });

    let timed_out = || {
        Error::tool(
            &label,
            format!("timed out after {:.1}s", config.timeout.as_secs_f64()),
        )
    };
    let deadline = Instant::now() + config.timeout;
    let status = match wait_until(&mut child, deadline) {
        Ok(Some(status)) => status,
        Ok(None) => {
            kill_and_reap(&mut child);
            return Err(timed_out());
        }
        Err(err) => {
            kill_and_reap(&mut child);
            return Err(Error::tool(&label, format!("failed waiting for tool: {}", err)));
        }
    };

    if !status.success() {
        return Err(Error::tool(&label, format!("exited with {}", status)));
    }

    // A process the tool left behind may keep stdout open past the tool's own exit.
    let remaining = deadline
        .saturating_duration_since(Instant::now())
        .max(POLL_INTERVAL);
    let buffer = match receiver.recv_timeout(remaining) {
        Ok(read) => {
            read.map_err(|err| Error::tool(&label, format!("failed reading output: {}", err)))?
        }
        Err(RecvTimeoutError::Timeout) => return Err(timed_out()),
        Err(RecvTimeoutError::Disconnected) => {
            return Err(Error::tool(&label, "output reader stopped unexpectedly"))
        }
    };

    Ok(String::from_utf8_lossy(&buffer)
        .lines()
        .map(str::to_string)
        .collect())
}

pub fn ensure_supported_platform(os: &str) -> Result<()> {
    if SUPPORTED_PLATFORMS.contains(&os) {
        Ok(())
    } else {
        Err(Error::PlatformUnsupported(format!(
            "cannot reset coverage counters on '{}'",
            os
        )))
    }
}

/// Deletes every accumulated counter file under `root` and returns how many were removed.
pub fn reset_accumulated_coverage(root: &Path) -> Result<usize> {
    ensure_supported_platform(std::env::consts::OS)?;
    if !root.is_dir() {
        return Err(Error::Usage(format!(
            "Root is not a directory: {}",
            root.display()
        )));
    }

    let mut removed = 0;
    for path in glob_files(root, COUNTER_SUFFIX)? {
        fs::remove_file(&path).map_err(|err| Error::io(&path, err))?;
        log::debug!("Removed {}", path.display());
        removed += 1;
    }
    Ok(removed)
}
