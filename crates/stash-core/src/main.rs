//! stash - secret capture hooks for configuration archivers
//!
//! Each lifecycle hook is its own subcommand so shell-driven archivers and
//! separate worker processes can share one staging area:
//!
//! ```text
//! stash run-start
//! printf '%s\n' "$secret" | stash capture --label core-sw1   # per device
//! stash run-end
//! ```

use clap::{Args, Parser, Subcommand};
use serde_json::json;
use stash_core::logging::{init_logging, LogConfig, LogFormat, LogLevel};
use stash_core::{load_config, ConfigOverrides, ExitCode, Hook, LoadedConfig, RunController, Severity};
use stash_redact::{Identifier, KeyFile};
use stash_store::MalformedLinePolicy;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Capture device secrets into a deduplicated, content-addressed store
#[derive(Parser)]
#[command(name = "stash")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Config file (default: $XDG_CONFIG_HOME/secret_stash/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Staging directory override
    #[arg(long, global = true, env = "STASH_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Durable store file override
    #[arg(long, global = true, env = "STASH_STORE")]
    store: Option<PathBuf>,

    /// Emit JSON payloads on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Log format on stderr (human, jsonl)
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a run: wipe leftovers and create an empty staging area
    RunStart,

    /// Capture secrets from stdin (one per line), print one identifier per line
    Capture(CaptureArgs),

    /// Finish a run: merge all staged captures into the store
    RunEnd,

    /// Print the secret stored for an identifier
    Lookup(LookupArgs),

    /// Show staging and store state
    Status,

    /// Generate an identifier key file
    Keygen(KeygenArgs),
}

#[derive(Args, Debug)]
struct CaptureArgs {
    /// Device name, for logs only
    #[arg(long)]
    label: Option<String>,
}

#[derive(Args, Debug)]
struct LookupArgs {
    /// Identifier to resolve
    id: String,
}

#[derive(Args, Debug)]
struct KeygenArgs {
    /// Where to write the key file (must not exist)
    #[arg(long)]
    out: PathBuf,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let cli_level = if cli.global.quiet {
        Some(LogLevel::Error)
    } else {
        match cli.global.verbose {
            0 => None,
            1 => Some(LogLevel::Debug),
            _ => Some(LogLevel::Trace),
        }
    };
    init_logging(&LogConfig::from_env(cli_level, cli.global.log_format));

    let exit_code = match cli.command {
        Commands::Keygen(ref args) => run_keygen(args),
        ref command => match resolve_config(&cli.global) {
            Ok(loaded) => dispatch(command, &cli.global, &loaded),
            Err(code) => code,
        },
    };

    exit_code.into()
}

fn resolve_config(global: &GlobalOpts) -> Result<LoadedConfig, ExitCode> {
    let overrides = ConfigOverrides {
        config_file: global.config.clone(),
        staging_dir: global.staging_dir.clone(),
        store_path: global.store.clone(),
    };
    load_config(&overrides).map_err(|e| {
        eprintln!("error: {}", e);
        ExitCode::for_error(&e)
    })
}

fn dispatch(command: &Commands, global: &GlobalOpts, loaded: &LoadedConfig) -> ExitCode {
    let mut controller = match RunController::new(&loaded.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::for_error(&e);
        }
    };

    match command {
        Commands::RunStart => run_start(&mut controller),
        Commands::Capture(args) => run_capture(&mut controller, args),
        Commands::RunEnd => run_end(&mut controller, global),
        Commands::Lookup(args) => run_lookup(&controller, args),
        Commands::Status => run_status(&controller, global, loaded),
        Commands::Keygen(args) => run_keygen(args),
    }
}

fn run_start(controller: &mut RunController) -> ExitCode {
    match controller.on_run_start() {
        Ok(()) => ExitCode::Clean,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::for_hook_error(&e, Hook::RunStart)
        }
    }
}

fn run_capture(controller: &mut RunController, args: &CaptureArgs) -> ExitCode {
    let label = args.label.as_deref().unwrap_or("-");

    if let Err(e) = controller.on_session_start() {
        eprintln!("session aborted: {}", e);
        return ExitCode::for_hook_error(&e, Hook::SessionStart);
    }
    tracing::info!(device = label, "Capturing secrets");

    let mut input = io::stdin().lock();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut line = Vec::new();
    let mut line_no = 0usize;
    let mut rejected = 0usize;

    loop {
        line.clear();
        match input.read_until(b'\n', &mut line) {
            Ok(0) => break,
            Ok(_) => line_no += 1,
            Err(e) => {
                eprintln!("session aborted: cannot read stdin: {}", e);
                let _ = controller.on_session_end();
                return ExitCode::SessionError;
            }
        }

        match controller.on_save(strip_line_end(&line)) {
            Ok(id) => {
                if writeln!(out, "{}", id).and_then(|()| out.flush()).is_err() {
                    let _ = controller.on_session_end();
                    return ExitCode::IoError;
                }
            }
            Err(e) if e.severity(Hook::Save) == Severity::Local => {
                rejected += 1;
                eprintln!("rejected line {}: {}", line_no, e);
                if writeln!(out).and_then(|()| out.flush()).is_err() {
                    let _ = controller.on_session_end();
                    return ExitCode::IoError;
                }
            }
            Err(e) => {
                eprintln!("session aborted: {}", e);
                let _ = controller.on_session_end();
                return ExitCode::for_hook_error(&e, Hook::Save);
            }
        }
    }

    if let Err(e) = controller.on_session_end() {
        eprintln!("session aborted: {}", e);
        return ExitCode::for_hook_error(&e, Hook::SessionEnd);
    }

    if rejected > 0 {
        ExitCode::Rejected
    } else {
        ExitCode::Clean
    }
}

/// Drop the trailing `\n` and an optional `\r` before it.
fn strip_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn run_end(controller: &mut RunController, global: &GlobalOpts) -> ExitCode {
    match controller.on_run_end() {
        Ok(report) => {
            if global.json {
                match serde_json::to_string_pretty(&report) {
                    Ok(s) => println!("{}", s),
                    Err(e) => {
                        eprintln!("error: {}", e);
                        return ExitCode::IoError;
                    }
                }
            } else {
                println!(
                    "merged {} staging file(s), {} record(s): {} entries in {}",
                    report.files_scanned,
                    report.records_read,
                    report.entries_written,
                    report.store_path.display()
                );
            }
            ExitCode::Clean
        }
        Err(e) => {
            let code = ExitCode::for_hook_error(&e, Hook::RunEnd);
            if code == ExitCode::CleanupError {
                eprintln!("warning: {}", e);
            } else {
                eprintln!("error: {}", e);
            }
            code
        }
    }
}

fn run_lookup(controller: &RunController, args: &LookupArgs) -> ExitCode {
    let id: Identifier = match args.id.parse() {
        Ok(id) => id,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::ArgsError;
        }
    };
    match controller.store().lookup(id.as_str()) {
        Ok(Some(value)) => match write_payload(&value) {
            Ok(()) => ExitCode::Clean,
            Err(e) => {
                eprintln!("error: cannot write stdout: {}", e);
                ExitCode::IoError
            }
        },
        Ok(None) => {
            eprintln!("error: identifier not found: {}", args.id);
            ExitCode::ArgsError
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::IoError
        }
    }
}

/// Secrets may be arbitrary bytes; write them back unchanged.
fn write_payload(value: &[u8]) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(value)?;
    out.write_all(b"\n")?;
    out.flush()
}

fn run_status(controller: &RunController, global: &GlobalOpts, loaded: &LoadedConfig) -> ExitCode {
    let staging_files = match controller.staging_area().staging_files() {
        Ok(files) => files.len(),
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::IoError;
        }
    };
    let store_entries = match controller.store().load(MalformedLinePolicy::Skip) {
        Ok((entries, _)) => entries.len(),
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::IoError;
        }
    };

    let config = &loaded.config;
    if global.json {
        let payload = json!({
            "config_source": loaded.resolution.to_string(),
            "config_path": loaded.path,
            "staging_dir": config.staging_dir,
            "staging_present": controller.staging_area().exists(),
            "staging_files": staging_files,
            "store_path": config.store_path,
            "store_entries": store_entries,
            "identifier_scheme": controller.scheme().name(),
        });
        println!("{}", payload);
    } else {
        println!("config:      {}", loaded.resolution);
        println!(
            "staging:     {} ({} file(s){})",
            config.staging_dir.display(),
            staging_files,
            if controller.staging_area().exists() { "" } else { ", absent" }
        );
        println!(
            "store:       {} ({} entries)",
            config.store_path.display(),
            store_entries
        );
        println!("identifiers: {}", controller.scheme().name());
    }
    ExitCode::Clean
}

fn run_keygen(args: &KeygenArgs) -> ExitCode {
    let result = KeyFile::generate().and_then(|file| file.save(&args.out));
    match result {
        Ok(()) => {
            println!("{}", args.out.display());
            ExitCode::Clean
        }
        Err(e) => {
            eprintln!("error: cannot write key {}: {}", args.out.display(), e);
            ExitCode::IoError
        }
    }
}
