// logscope - main.rs
//
// Command-line front end. Handles:
// 1. CLI argument parsing
// 2. Configuration loading and logging initialisation
// 3. Dispatch to the engine through a FileSession or the TaskManager
// 4. Text or JSON output on stdout (diagnostics go to stderr)

use clap::{Args, Parser, Subcommand};
use logscope::app::session::FileSession;
use logscope::app::task::{TaskManager, TaskProgress};
use logscope::core::detect::guess_format;
use logscope::core::merge::merge_lines;
use logscope::core::model::{
    DateFormat, Encoding, FilterSpec, ParsedLine, Progress, ScanControl,
};
use logscope::core::scanner::{scan_file, ScanConfig};
use logscope::platform::config::{self, AppConfig, FormatKind, PlatformPaths};
use logscope::util::constants;
use logscope::util::error::{LogScopeError, Result};
use serde::Serialize;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

/// logscope - random access to very large log files.
///
/// Scans a file once to build a sparse line index, then loads any window of
/// lines or search matches without rereading the whole file.
#[derive(Parser, Debug)]
#[command(name = "logscope", version, about)]
struct Cli {
    /// Enable debug logging (equivalent to RUST_LOG=debug).
    #[arg(short = 'd', long = "debug", global = true)]
    debug: bool,

    /// Read configuration from this file instead of the platform default.
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long = "json", global = true)]
    json: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Per-run overrides of config.toml values.
#[derive(Args, Debug)]
struct Overrides {
    /// Line encoding: utf-8 or latin1.
    #[arg(long, global = true)]
    encoding: Option<Encoding>,

    /// Read chunk size in bytes.
    #[arg(long = "chunk-size", global = true, value_parser = parse_chunk_size)]
    chunk_size: Option<usize>,

    /// Checkpoints recorded per full scan.
    #[arg(long = "checkpoints", global = true, value_parser = parse_checkpoints)]
    checkpoints: Option<usize>,

    /// Line format: plain, text or json.
    #[arg(long, global = true)]
    format: Option<FormatKind>,

    /// Regex locating the timestamp in text lines.
    #[arg(long = "timestamp-pattern", global = true)]
    timestamp_pattern: Option<String>,

    /// Date format: ISO, RFC822, Unix, Millis or a pattern like "yyyy-MM-dd HH:mm:ss".
    #[arg(long = "date-format", global = true)]
    date_format: Option<DateFormat>,

    /// Extract key=value tokens from text lines.
    #[arg(long = "kv", global = true)]
    kv: bool,

    /// JSON key holding the message.
    #[arg(long = "message-field", global = true)]
    message_field: Option<String>,

    /// JSON key holding the timestamp.
    #[arg(long = "timestamp-field", global = true)]
    timestamp_field: Option<String>,

    /// Neither read nor write the line index cache.
    #[arg(long = "no-cache", global = true)]
    no_cache: bool,
}

impl Overrides {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(encoding) = self.encoding {
            config.encoding = encoding;
        }
        if let Some(size) = self.chunk_size {
            config.chunk_size = size;
        }
        if let Some(n) = self.checkpoints {
            config.num_checkpoints = n;
        }
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(ref pattern) = self.timestamp_pattern {
            config.timestamp_pattern = Some(pattern.clone());
        }
        if let Some(ref date_format) = self.date_format {
            config.date_format = date_format.clone();
        }
        if self.kv {
            config.extract_key_value = true;
        }
        if let Some(ref field) = self.message_field {
            config.message_field = Some(field.clone());
        }
        if let Some(ref field) = self.timestamp_field {
            config.timestamp_field = Some(field.clone());
        }
        if self.no_cache {
            config.index_cache = false;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream every line with its ordinal and byte offset.
    Scan {
        path: PathBuf,

        /// Stop after this many lines.
        #[arg(long)]
        limit: Option<u64>,
    },

    /// Build the line index and show the first lines.
    Open {
        path: PathBuf,

        #[arg(short = 'n', long, value_parser = parse_window)]
        window: Option<usize>,
    },

    /// Show a window of lines.
    View {
        path: PathBuf,

        /// Start line: N, +N or -N.
        #[arg(short = 's', long, default_value = "0", allow_hyphen_values = true)]
        start: String,

        #[arg(short = 'n', long, value_parser = parse_window)]
        window: Option<usize>,
    },

    /// Count matches of a regex and show a window of them.
    Search {
        path: PathBuf,

        pattern: String,

        /// Case-insensitive matching.
        #[arg(short = 'i', long = "ignore-case")]
        ignore_case: bool,

        /// First match ordinal to show.
        #[arg(short = 's', long, default_value_t = 0)]
        start: u64,

        #[arg(short = 'n', long, value_parser = parse_window)]
        window: Option<usize>,

        /// Line ordinals to interleave with the matches (repeatable).
        #[arg(short = 'm', long = "mark")]
        marks: Vec<u64>,
    },

    /// Approximate line counts over equal time slices.
    Histogram {
        path: PathBuf,

        #[arg(short = 'b', long, value_parser = parse_buckets)]
        buckets: Option<usize>,
    },

    /// Suggest a line format from the first lines of a file.
    Guess {
        path: PathBuf,

        #[arg(long, default_value_t = constants::DEFAULT_DETECTION_LINES)]
        lines: usize,
    },
}

fn bounded(s: &str, min: usize, max: usize) -> std::result::Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("'{s}' is not a number: {e}"))?;
    if (min..=max).contains(&n) {
        Ok(n)
    } else {
        Err(format!("{n} is out of range ({min}-{max})"))
    }
}

fn parse_chunk_size(s: &str) -> std::result::Result<usize, String> {
    bounded(s, constants::MIN_CHUNK_SIZE, constants::MAX_CHUNK_SIZE)
}

fn parse_checkpoints(s: &str) -> std::result::Result<usize, String> {
    bounded(s, constants::MIN_NUM_CHECKPOINTS, constants::MAX_NUM_CHECKPOINTS)
}

fn parse_window(s: &str) -> std::result::Result<usize, String> {
    bounded(s, 1, constants::MAX_WINDOW_LINES)
}

fn parse_buckets(s: &str) -> std::result::Result<usize, String> {
    bounded(s, 1, constants::MAX_HISTOGRAM_BUCKETS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let paths = PlatformPaths::resolve();

    let (mut app_config, warnings) = match &cli.config {
        Some(path) => match config::load_config_file(path) {
            Ok(loaded) => loaded,
            Err(e) => {
                eprintln!("Error: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => config::load_config(&paths.config_dir),
    };
    cli.overrides.apply(&mut app_config);

    logscope::util::logging::init(
        cli.debug,
        app_config.log_level.as_deref(),
        app_config.log_file.as_deref().map(Path::new),
    );
    for warning in &warnings {
        tracing::warn!("{}", warning);
    }

    tracing::info!(
        version = constants::APP_VERSION,
        debug = cli.debug,
        command = ?cli.command,
        "logscope starting"
    );

    let cli_run = CliRun {
        config: app_config,
        json: cli.json,
        index_cache_dir: paths.index_cache_dir,
    };
    match cli_run.run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Settings shared by every subcommand.
struct CliRun {
    config: AppConfig,
    json: bool,
    index_cache_dir: PathBuf,
}

#[derive(Serialize)]
struct ScannedLine<'a> {
    line_ordinal: u64,
    byte_offset: u64,
    truncated: bool,
    text: &'a str,
}

#[derive(Serialize)]
struct OpenReport<'a> {
    path: &'a Path,
    line_count: u64,
    file_size: u64,
    checkpoints: usize,
    lines: &'a [ParsedLine],
}

#[derive(Serialize)]
struct SearchReport<'a> {
    filter: &'a FilterSpec,
    match_count: u64,
    start: u64,
    lines: &'a [ParsedLine],
}

impl CliRun {
    fn run(&self, command: Command) -> Result<ExitCode> {
        match command {
            Command::Scan { path, limit } => self.scan(&path, limit),
            Command::Open { path, window } => self.open(path, self.window(window)),
            Command::View {
                path,
                start,
                window,
            } => self.view(path, &start, self.window(window)),
            Command::Search {
                path,
                pattern,
                ignore_case,
                start,
                window,
                marks,
            } => self.search(
                path,
                FilterSpec::new(pattern, !ignore_case),
                start,
                self.window(window),
                &marks,
            ),
            Command::Histogram { path, buckets } => {
                self.histogram(path, buckets.unwrap_or(self.config.histogram_buckets))
            }
            Command::Guess { path, lines } => self.guess(&path, lines),
        }
    }

    fn window(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.config.window_lines)
    }

    fn session(&self, path: PathBuf) -> FileSession {
        FileSession::new(path, self.config.file_options())
    }

    /// Restore the cached line index or run a fresh open scan.
    fn ensure_open(&self, session: &mut FileSession) -> Result<()> {
        if self.config.index_cache && session.restore_index(&self.index_cache_dir) {
            return Ok(());
        }
        let mut reporter = ProgressLine::new("indexing", self.json);
        session.open(0, |p| reporter.update(p))?;
        reporter.finish();
        if self.config.index_cache {
            session.save_index(&self.index_cache_dir);
        }
        Ok(())
    }

    fn scan(&self, path: &Path, limit: Option<u64>) -> Result<ExitCode> {
        if limit == Some(0) {
            return Ok(ExitCode::SUCCESS);
        }
        let scan_config = ScanConfig::from(&self.config.file_options());
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let mut write_error = None;

        let outcome = scan_file(path, None, &scan_config, |line, flags| {
            let written = if self.json {
                let record = ScannedLine {
                    line_ordinal: line.line_ordinal,
                    byte_offset: line.byte_offset,
                    truncated: flags.truncated,
                    text: &line.text,
                };
                serde_json::to_writer(&mut out, &record)
                    .map_err(std::io::Error::from)
                    .and_then(|()| writeln!(out))
            } else {
                writeln!(out, "{:>8} {:>12}  {}", line.line_ordinal, line.byte_offset, line.text)
            };
            if let Err(e) = written {
                // Closed pipe (e.g. `| head`) ends the scan quietly.
                write_error = Some(e);
                return ScanControl::Stop;
            }
            if limit.is_some_and(|n| line.line_ordinal + 1 >= n) {
                return ScanControl::Stop;
            }
            ScanControl::Continue
        })?;

        if let Some(e) = write_error {
            tracing::debug!(error = %e, "Output closed");
        }
        tracing::debug!(
            lines = outcome.lines_emitted,
            bytes = outcome.bytes_read,
            stopped = outcome.stopped,
            "Scan finished"
        );
        Ok(ExitCode::SUCCESS)
    }

    /// Run the open scan on a worker thread, reporting progress on stderr.
    fn open(&self, path: PathBuf, window: usize) -> Result<ExitCode> {
        let mut manager = TaskManager::new();
        manager.start_open(path.clone(), window, self.config.file_options());

        let mut reporter = ProgressLine::new("indexing", self.json);
        let last = manager.wait(|msg| {
            if let TaskProgress::Progress(p) = msg {
                let _ = reporter.update(*p);
            }
        });
        reporter.finish();

        let result = match last {
            Some(TaskProgress::Opened(result)) => result,
            Some(TaskProgress::Failed { error }) => {
                eprintln!("Error: {error}");
                return Ok(ExitCode::FAILURE);
            }
            other => {
                eprintln!("Error: open did not complete ({other:?})");
                return Ok(ExitCode::FAILURE);
            }
        };

        let mut session = self.session(path);
        session.adopt_open(&result);
        if self.config.index_cache {
            session.save_index(&self.index_cache_dir);
        }

        let report = OpenReport {
            path: session.path(),
            line_count: result.line_count,
            file_size: result.file_size,
            checkpoints: result.index.len(),
            lines: &result.lines,
        };
        if self.json {
            emit_json(&report)?;
        } else {
            println!(
                "{}: {} lines, {} bytes, {} checkpoints",
                report.path.display(),
                report.line_count,
                report.file_size,
                report.checkpoints
            );
            print_lines(report.lines);
        }
        Ok(ExitCode::SUCCESS)
    }

    fn view(&self, path: PathBuf, start: &str, window: usize) -> Result<ExitCode> {
        let mut session = self.session(path);
        self.ensure_open(&mut session)?;

        let Some(start_line) = session.goto(start) else {
            eprintln!("Error: '{start}' is not a line number (use N, +N or -N)");
            return Ok(ExitCode::FAILURE);
        };
        let buffer = session.load_buffer(start_line, window, |_| ScanControl::Continue)?;

        if self.json {
            emit_json(&buffer)?;
        } else {
            print_lines(&buffer.lines);
        }
        Ok(ExitCode::SUCCESS)
    }

    fn search(
        &self,
        path: PathBuf,
        filter: FilterSpec,
        start: u64,
        window: usize,
        marks: &[u64],
    ) -> Result<ExitCode> {
        let mut session = self.session(path);

        let mut reporter = ProgressLine::new("searching", self.json);
        let index = session.search_scan(&filter, |p| reporter.update(p))?;
        reporter.finish();

        let buffer = session.search_buffer(&filter, start, window, |_| ScanControl::Continue)?;
        let lines = if marks.is_empty() {
            buffer.lines
        } else {
            let marked = self.marked_lines(&mut session, marks)?;
            merge_lines(&buffer.lines, &marked, index.match_count)
        };

        let report = SearchReport {
            filter: &filter,
            match_count: index.match_count,
            start,
            lines: &lines,
        };
        if self.json {
            emit_json(&report)?;
        } else {
            println!("{} matches for '{}'", report.match_count, filter.pattern);
            print_lines(report.lines);
        }
        Ok(ExitCode::SUCCESS)
    }

    /// Load each marked line; ordinals past the end are skipped.
    fn marked_lines(&self, session: &mut FileSession, marks: &[u64]) -> Result<Vec<ParsedLine>> {
        self.ensure_open(session)?;
        let mut lines = Vec::with_capacity(marks.len());
        for &ordinal in marks {
            let buffer = session.load_buffer(ordinal, 1, |_| ScanControl::Continue)?;
            lines.extend(buffer.lines);
        }
        Ok(lines)
    }

    fn histogram(&self, path: PathBuf, buckets: usize) -> Result<ExitCode> {
        let mut session = self.session(path);
        self.ensure_open(&mut session)?;
        let histogram = session.histogram(buckets)?;

        if self.json {
            emit_json(&histogram)?;
            return Ok(ExitCode::SUCCESS);
        }
        match histogram {
            Some(buckets) => {
                for bucket in &buckets {
                    println!(
                        "{}  {}  {:>12.1}",
                        bucket.start_time.to_rfc3339(),
                        bucket.end_time.to_rfc3339(),
                        bucket.approximate_line_count
                    );
                }
            }
            None => println!("No histogram: timestamps missing, unordered or too sparse"),
        }
        Ok(ExitCode::SUCCESS)
    }

    fn guess(&self, path: &Path, max_lines: usize) -> Result<ExitCode> {
        let scan_config = ScanConfig::from(&self.config.file_options());
        let mut sample: Vec<String> = Vec::with_capacity(max_lines);
        if max_lines > 0 {
            scan_file(path, None, &scan_config, |line, _| {
                sample.push(line.text);
                if sample.len() >= max_lines {
                    ScanControl::Stop
                } else {
                    ScanControl::Continue
                }
            })?;
        }

        let suggestion = guess_format(&sample);
        if self.json {
            emit_json(&suggestion)?;
        } else {
            println!(
                "{:?} ({} lines sampled, {} not JSON)",
                suggestion.format, suggestion.sampled, suggestion.json_failures
            );
        }
        Ok(ExitCode::SUCCESS)
    }
}

fn print_lines(lines: &[ParsedLine]) {
    for line in lines {
        let marker = match line.match_ordinal {
            Some(n) => format!("#{n}"),
            None => String::new(),
        };
        match &line.timestamp {
            Some(ts) => println!("{:>8} {:>7}  [{ts}] {}", line.line_ordinal(), marker, line.message),
            None => println!("{:>8} {:>7}  {}", line.line_ordinal(), marker, line.message),
        }
    }
}

fn emit_json<T: Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)
        .map_err(std::io::Error::from)
        .and_then(|()| writeln!(out))
        .map_err(|e| LogScopeError::io("<stdout>", "write", e))
}

/// Single-line progress indicator on stderr, shown only on a terminal.
struct ProgressLine {
    label: &'static str,
    enabled: bool,
}

impl ProgressLine {
    fn new(label: &'static str, json: bool) -> Self {
        Self {
            label,
            enabled: !json && std::io::stderr().is_terminal(),
        }
    }

    fn update(&mut self, progress: Progress) -> ScanControl {
        if self.enabled {
            eprint!("\r{}: {:5.1}% ({})", self.label, progress.percent, progress.count);
        }
        ScanControl::Continue
    }

    fn finish(&self) {
        if self.enabled {
            eprintln!();
        }
    }
}
