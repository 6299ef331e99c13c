//! Drive a program's console from the command line.
//!
//! Spawns a program with piped stdin/stdout (a shell, or QEMU with
//! `-serial stdio`), wraps it in a `PipeConsole` and runs commands or
//! expectations against it.
//!
//! Usage:
//!   cargo run --bin pipe-console -- exec "uname -a" "ls /"
//!   cargo run --bin pipe-console -- --program qemu-system-x86_64 --program-arg=-nographic \
//!       expect --pattern "login:" --timeout 120
//!   cargo run --bin pipe-console -- --json mark --send "reboot" --pattern "boot" --pattern "#"

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::{Command as Process, Stdio};
use std::time::Duration;

use itest_console::logging::init_logging;
use itest_console::{
    run_all, timeout_from_secs, Command, CommandResult, ConsoleConfig, PipeConsole,
};

#[derive(Parser)]
#[command(name = "pipe-console")]
#[command(about = "Run shell commands and expectations against a piped console")]
struct Cli {
    /// TOML console configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Console name (overrides config)
    #[arg(long)]
    name: Option<String>,

    /// Shared log file (overrides config)
    #[arg(long)]
    logfile: Option<PathBuf>,

    /// Program to spawn
    #[arg(long, default_value = "sh")]
    program: String,

    /// Argument passed to the program (repeatable)
    #[arg(long = "program-arg", allow_hyphen_values = true)]
    program_args: Vec<String>,

    /// Don't echo console output to the log
    #[arg(long)]
    quiet: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run shell commands and report exit codes
    Exec {
        /// Commands to run, in order
        #[arg(required = true)]
        commands: Vec<String>,

        /// Per-command timeout in seconds (default: from config)
        #[arg(long)]
        timeout: Option<f64>,

        /// Continue after a failing command
        #[arg(long)]
        keep_going: bool,
    },

    /// Send a command and wait for output patterns
    Expect {
        /// Text to send first (nothing if omitted)
        #[arg(long)]
        send: Option<String>,

        /// Pattern to wait for (repeatable)
        #[arg(long = "pattern", required = true)]
        patterns: Vec<String>,

        /// Require every pattern instead of any
        #[arg(long)]
        all: bool,

        /// Treat patterns as regular expressions
        #[arg(long)]
        regex: bool,

        /// Timeout in seconds (default: from config)
        #[arg(long)]
        timeout: Option<f64>,
    },

    /// Send a command and record when each pattern appears
    Mark {
        #[arg(long)]
        send: Option<String>,

        #[arg(long = "pattern", required = true)]
        patterns: Vec<String>,

        /// Timeout per pattern in seconds (default: from config)
        #[arg(long)]
        timeout: Option<f64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = ConsoleConfig::load_or_default(cli.config.as_deref())?;
    if let Some(name) = &cli.name {
        config.name = name.clone();
    }
    if cli.logfile.is_some() {
        config.logfile = cli.logfile.clone();
    }
    if cli.quiet {
        config.print_logger = false;
    }

    let child = Process::new(&cli.program)
        .args(&cli.program_args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("Failed to spawn {}", cli.program))?;
    let mut console = PipeConsole::spawn(&config.name, child, config.reader_options())?;

    let outcome = match cli.command {
        Commands::Exec {
            commands,
            timeout,
            keep_going,
        } => {
            let timeout = resolve_timeout(timeout, config.command_timeout()?)?;
            run_exec(&mut console, &commands, timeout, keep_going, cli.json)
        }
        Commands::Expect {
            send,
            patterns,
            all,
            regex,
            timeout,
        } => {
            let timeout = resolve_timeout(timeout, config.expect_timeout()?)?;
            let cmd = Command::from(send);
            let result = if all {
                console.expect_all(cmd, &patterns, timeout, regex, true)
            } else {
                console.expect_any(cmd, &patterns, timeout, regex, true)
            };
            result.map_err(anyhow::Error::from).map(|()| {
                println!("{} {:?}", "matched".green().bold(), patterns);
            })
        }
        Commands::Mark {
            send,
            patterns,
            timeout,
        } => {
            let timeout = resolve_timeout(timeout, config.expect_timeout()?)?;
            run_mark(&mut console, send, &patterns, timeout, cli.json)
        }
    };

    let status = console.terminate()?;
    tracing::debug!(%status, "console program stopped");
    outcome
}

fn resolve_timeout(secs: Option<f64>, default: Duration) -> Result<Duration> {
    match secs {
        Some(secs) => Ok(timeout_from_secs(secs)?),
        None => Ok(default),
    }
}

fn run_exec(
    console: &mut PipeConsole,
    commands: &[String],
    timeout: Duration,
    keep_going: bool,
    json: bool,
) -> Result<()> {
    let results = run_all(console, commands, timeout, keep_going)?;

    if json {
        let report: Vec<_> = results
            .iter()
            .map(|(cmd, r)| serde_json::json!({ "command": cmd, "result": r }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for (cmd, result) in &results {
            print_result(cmd, result);
        }
    }

    let failed = results.iter().filter(|(_, r)| !r.success()).count();
    if failed > 0 {
        bail!("{} of {} command(s) failed", failed, results.len());
    }
    Ok(())
}

fn print_result(cmd: &str, result: &CommandResult) {
    let status = if result.success() {
        format!("[exit {}]", result.exit_code).green().bold()
    } else {
        format!("[exit {}]", result.exit_code).red().bold()
    };
    println!("{} {}", status, cmd.bold());
    for line in result.output.lines() {
        println!("    {}", line);
    }
}

fn run_mark(
    console: &mut PipeConsole,
    send: Option<String>,
    patterns: &[String],
    timeout: Duration,
    json: bool,
) -> Result<()> {
    let marks = console.mark(send, patterns, timeout, true)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&marks)?);
        return Ok(());
    }

    for mark in &marks {
        match mark.at {
            Some(at) => println!(
                "  {} {} at {}",
                "✓".green(),
                mark.pattern,
                at.format("%H:%M:%S%.3f")
            ),
            None => println!("  {} {} not seen", "✗".red(), mark.pattern),
        }
    }
    Ok(())
}
