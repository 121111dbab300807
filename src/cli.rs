// Command-line front end.
//
// One command: read a diff stream from stdin (or --input) and apply it to
// the device given by --output. Exit status 0 only when the end record was
// reached.

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, ValueHint};

use crate::apply::ApplyStats;
use crate::diff::record::ExtentPolicy;
use crate::io::{ApplyFileOptions, DiffInput, DiffTarget, apply_file};
use crate::observer::LogObserver;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Apply an `rbd export-diff` stream to a block device.
#[derive(Parser, Debug)]
#[command(name = "rbd-diff-apply", version, about = "Apply RBD diffs to a block device")]
struct Cli {
    /// Path to the output block device (or image file).
    #[arg(
        short = 'o',
        long,
        value_hint = ValueHint::FilePath,
        required_unless_present = "check_only"
    )]
    output: Option<PathBuf>,

    /// Read the diff from a file instead of stdin.
    #[arg(short = 'i', long, value_hint = ValueHint::FilePath)]
    input: Option<PathBuf>,

    /// Decode and validate the stream without writing to any device.
    #[arg(long = "check-only")]
    check_only: bool,

    /// Accept records that extend past the image size declared in the stream.
    #[arg(long = "allow-out-of-bounds")]
    allow_out_of_bounds: bool,

    /// fsync the device after the end record.
    #[arg(long)]
    sync: bool,

    /// Quiet mode (errors only).
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose mode (use twice for trace output).
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,

    /// Output stats as JSON to stderr.
    #[arg(long = "json")]
    json_output: bool,
}

// ---------------------------------------------------------------------------
// Resolved options
// ---------------------------------------------------------------------------

struct Options {
    apply: ApplyFileOptions,
    quiet: bool,
    verbose: u8,
    json_output: bool,
    /// --output was given together with --check-only.
    ignored_output: Option<PathBuf>,
}

fn resolve_options(cli: Cli) -> Options {
    let input = match cli.input {
        Some(path) => DiffInput::File(path),
        None => DiffInput::Stdin,
    };
    let (target, ignored_output) = match (cli.check_only, cli.output) {
        (true, output) => (DiffTarget::Discard, output),
        (false, Some(path)) => (DiffTarget::Device(path), None),
        // clap enforces --output unless --check-only.
        (false, None) => (DiffTarget::Discard, None),
    };
    let extent_policy = if cli.allow_out_of_bounds {
        ExtentPolicy::Allow
    } else {
        ExtentPolicy::Reject
    };

    Options {
        apply: ApplyFileOptions {
            input,
            target,
            extent_policy,
            sync: cli.sync,
        },
        quiet: cli.quiet,
        verbose: cli.verbose.min(2),
        json_output: cli.json_output,
        ignored_output,
    }
}

fn log_filter(opts: &Options) -> &'static str {
    match (opts.quiet, opts.verbose) {
        (true, _) => "error",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    }
}

#[cfg(any(test, feature = "fuzzing"))]
pub fn fuzz_try_parse_args(args: &[String]) {
    let argv: Vec<String> = std::iter::once("rbd-diff-apply".to_string())
        .chain(args.iter().cloned())
        .collect();
    if let Ok(cli) = Cli::try_parse_from(argv) {
        let _ = resolve_options(cli);
    }
}

// ---------------------------------------------------------------------------
// Apply command
// ---------------------------------------------------------------------------

fn stats_json(stats: &ApplyStats, check_only: bool) -> serde_json::Value {
    serde_json::json!({
        "command": if check_only { "check" } else { "apply" },
        "image_size": stats.image_size,
        "from_snap": stats.from_snap,
        "to_snap": stats.to_snap,
        "write_records": stats.write_records,
        "zero_records": stats.zero_records,
        "bytes_written": stats.bytes_written,
        "bytes_zeroed": stats.bytes_zeroed,
        "stream_bytes": stats.stream_bytes,
    })
}

fn cmd_apply(opts: &Options) -> i32 {
    let stats = match apply_file(&opts.apply, LogObserver) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("rbd-diff-apply: {e}");
            if let DiffTarget::Device(path) = &opts.apply.target {
                eprintln!(
                    "rbd-diff-apply: {} may be partially written",
                    path.display()
                );
            }
            return 1;
        }
    };

    if opts.json_output {
        let check_only = opts.apply.target == DiffTarget::Discard;
        eprintln!("{:#}", stats_json(&stats, check_only));
    }
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap and applies the diff.
pub fn run() -> ! {
    let cli = Cli::parse();
    let opts = resolve_options(cli);

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(log_filter(&opts)),
    )
    .format_timestamp(None)
    .format_target(false)
    .init();

    if let Some(path) = &opts.ignored_output {
        log::warn!(
            "--check-only: not writing to output device {}",
            path.display()
        );
    }

    process::exit(cmd_apply(&opts));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
