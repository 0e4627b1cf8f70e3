//! Bitflux CLI entrypoint.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use std::io::BufRead as _;
use std::path::PathBuf;
use std::process::ExitCode;

use bitflux::{
    AuditOptions, Config, ExecutionStatus, MetricRegistry, OpRegistry, ReplayStrategy, Reporter,
    RunOptions, RunSummary, Session, SessionOptions, TolerancePolicy, VerifyOptions,
};

#[derive(Debug, Parser)]
#[command(name = "bitflux")]
#[command(about = "deterministic bit-transformation strategies: execute, record, replay, verify")]
struct Cli {
    /// Path to config file. Missing configs are treated as "defaults".
    #[arg(long, global = true, default_value = "bitflux.toml")]
    config: PathBuf,

    /// Log level.
    #[arg(long, global = true, default_value = "info")]
    log: String,

    /// Machine-readable output to stdout (JSON).
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Initialize a bitflux project (config + example strategy)
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Execute a strategy script against an input buffer
    Run {
        script: PathBuf,

        /// Input buffer as a literal bit string.
        #[arg(long)]
        bits: Option<String>,

        /// Input buffer read from a file (whitespace trimmed).
        #[arg(long, conflicts_with = "bits")]
        input: Option<PathBuf>,

        /// Record the execution result (.bfx) to path.
        #[arg(long)]
        record: Option<PathBuf>,

        /// Default seed for operations whose seed is left implicit.
        #[arg(long)]
        seed: Option<u64>,

        /// Strategy id stored in the result (defaults to the script stem).
        #[arg(long)]
        strategy_id: Option<String>,

        #[arg(long, default_value = "pretty")]
        reporter: Reporter,
    },

    /// Execute a single command line
    Exec {
        command: String,

        #[arg(long)]
        bits: Option<String>,

        #[arg(long, conflicts_with = "bits")]
        input: Option<PathBuf>,

        #[arg(long)]
        record: Option<PathBuf>,

        #[arg(long)]
        seed: Option<u64>,

        #[arg(long, default_value = "pretty")]
        reporter: Reporter,
    },

    /// Interactive console (one command per line; typos never hard-fail)
    Repl {
        /// Starting buffer.
        #[arg(long, default_value = "00000000")]
        bits: String,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Verify a recorded result file
    Verify {
        result: PathBuf,

        #[arg(long)]
        strategy: Option<ReplayStrategy>,

        /// Tolerated mismatch percentage (trust-stored only).
        #[arg(long)]
        tolerance: Option<f64>,
    },

    /// Verify every result file matching the given globs
    VerifyBatch {
        /// Glob patterns (default: **/*.bfx).
        globs: Vec<String>,

        #[arg(long)]
        strategy: Option<ReplayStrategy>,

        #[arg(long)]
        tolerance: Option<f64>,

        /// Worker threads (results are independent).
        #[arg(long)]
        jobs: Option<usize>,
    },

    /// Re-run a script N times and compare run signatures
    Audit {
        script: PathBuf,

        #[arg(long)]
        bits: Option<String>,

        #[arg(long, conflicts_with = "bits")]
        input: Option<PathBuf>,

        #[arg(long, default_value_t = 3)]
        runs: u32,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// List registered operations
    Ops,

    /// List registered metrics
    Metrics,

    /// Print engine version info
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(&cli.log) {
        eprintln!("warning: failed to init tracing: {err:#}");
    }

    let config = Config::load_optional(&cli.config);
    match run_command(&cli, &config) {
        Ok(code) => code,
        Err(err) => print_error_and_exit(&cli, err),
    }
}

fn init_tracing(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn run_command(cli: &Cli, config: &Config) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Init { force } => {
            init_project(config, *force)?;
            println!("initialized bitflux project (config + strategies/example.bft)");
            Ok(ExitCode::SUCCESS)
        }

        Command::Run {
            script,
            bits,
            input,
            record,
            seed,
            strategy_id,
            reporter,
        } => {
            let initial = load_bits(bits.as_deref(), input.as_deref())?;
            let out = bitflux::run_script(
                config,
                script,
                &initial,
                &RunOptions {
                    seed: *seed,
                    record_to: record.clone(),
                    strategy_id: strategy_id.clone(),
                },
            )?;
            print_run_summary(cli, *reporter, &out.summary)?;
            Ok(exit_code_for_status(out.summary.status))
        }

        Command::Exec {
            command,
            bits,
            input,
            record,
            seed,
            reporter,
        } => {
            let initial = load_bits(bits.as_deref(), input.as_deref())?;
            let out = bitflux::exec_command(
                config,
                command,
                &initial,
                &RunOptions {
                    seed: *seed,
                    record_to: record.clone(),
                    strategy_id: None,
                },
            )?;
            print_run_summary(cli, *reporter, &out.summary)?;
            Ok(exit_code_for_status(out.summary.status))
        }

        Command::Repl { bits, seed } => {
            run_repl(config, bits, *seed)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify {
            result,
            strategy,
            tolerance,
        } => {
            let opt = verify_options(config, *strategy, *tolerance);
            let v = bitflux::verify_result_file(result, &opt)?;
            print_json_or_text(cli, &v)?;
            Ok(if v.report.verified {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::VerifyBatch {
            globs,
            strategy,
            tolerance,
            jobs,
        } => {
            let opt = verify_options(config, *strategy, *tolerance);
            let report = bitflux::verify_batch(globs, &opt, *jobs)?;
            print_json_or_text(cli, &report)?;
            Ok(if report.failed == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::Audit {
            script,
            bits,
            input,
            runs,
            seed,
        } => {
            let initial = load_bits(bits.as_deref(), input.as_deref())?;
            let report = bitflux::audit(
                config,
                script,
                &initial,
                &AuditOptions {
                    runs: *runs,
                    seed: *seed,
                },
            )?;
            print_json_or_text(cli, &report)?;
            Ok(if report.consistent {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }

        Command::Ops => {
            let catalog = OpRegistry::standard().catalog();
            print_json_or_text(cli, &catalog)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Metrics => {
            let ids: Vec<String> = MetricRegistry::standard()
                .ids()
                .map(|s| s.to_string())
                .collect();
            print_json_or_text(cli, &ids)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Version => {
            print_json_or_text(cli, &bitflux::version_info())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_project(config: &Config, force: bool) -> anyhow::Result<()> {
    std::fs::create_dir_all(config.results_dir())?;

    let config_path = PathBuf::from("bitflux.toml");
    if force || !config_path.exists() {
        std::fs::write(&config_path, toml::to_string_pretty(config)?)?;
    }

    std::fs::create_dir_all("strategies")?;
    let example = PathBuf::from("strategies").join("example.bft");
    if force || !example.exists() {
        std::fs::write(
            &example,
            "# example strategy: whiten, then conditionally re-balance\n\
             diff | scramble\n\
             IF entropy < 0.9 THEN shuffle ELSE rol 3\n",
        )?;
    }
    Ok(())
}

fn load_bits(bits: Option<&str>, input: Option<&std::path::Path>) -> anyhow::Result<String> {
    match (bits, input) {
        (Some(b), None) => Ok(b.to_string()),
        (None, Some(path)) => Ok(std::fs::read_to_string(path)?.trim().to_string()),
        (None, None) => anyhow::bail!("provide an input buffer via --bits or --input"),
        (Some(_), Some(_)) => unreachable!("clap conflicts_with prevents this"),
    }
}

fn verify_options(
    config: &Config,
    strategy: Option<ReplayStrategy>,
    tolerance: Option<f64>,
) -> VerifyOptions {
    let tolerance = tolerance.or(config.tolerance_percent);
    VerifyOptions {
        strategy: strategy.unwrap_or(config.strategy),
        tolerance: match tolerance {
            Some(p) => TolerancePolicy::ToleratePercent(p),
            None => TolerancePolicy::Exact,
        },
    }
}

fn run_repl(config: &Config, initial_bits: &str, seed: Option<u64>) -> anyhow::Result<()> {
    let ops = OpRegistry::standard();
    let metrics = MetricRegistry::standard();
    let mut session = Session::new(
        &ops,
        &metrics,
        SessionOptions {
            default_seed: seed,
            cost_ceiling: config.cost_ceiling,
            script_step_budget: config.script_step_budget,
        },
    );

    let mut bits = initial_bits.to_string();
    println!("bitflux repl; HELP for commands, quit to exit");
    println!("bits: {bits}");

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("quit") || trimmed.eq_ignore_ascii_case("exit") {
            break;
        }
        let outcome = session.execute_line(trimmed, &bits);
        if let Some(message) = &outcome.message {
            println!("{message}");
        }
        if let Some(error) = &outcome.error {
            println!(
                "error: {error} ({} operation(s) completed)",
                outcome.operations_executed
            );
        }
        bits = outcome.bits;
        println!("bits: {bits}");
    }
    Ok(())
}

fn print_run_summary(cli: &Cli, reporter: Reporter, summary: &RunSummary) -> anyhow::Result<()> {
    if cli.json || matches!(reporter, Reporter::Json) {
        println!("{}", serde_json::to_string(summary)?);
    } else {
        println!("{}", summary.pretty());
    }
    Ok(())
}

fn print_json_or_text<T: serde::Serialize>(cli: &Cli, value: &T) -> anyhow::Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string(value)?);
    } else {
        println!("{}", serde_json::to_string_pretty(value)?);
    }
    Ok(())
}

fn print_error_and_exit(cli: &Cli, err: anyhow::Error) -> ExitCode {
    let msg = format!("{err:#}");
    if cli.json {
        let out = serde_json::json!({
            "status": "error",
            "message": msg,
        });
        println!("{out}");
    } else {
        eprintln!("{msg}");
    }
    ExitCode::from(2)
}

fn exit_code_for_status(status: ExecutionStatus) -> ExitCode {
    match status {
        ExecutionStatus::Completed => ExitCode::SUCCESS,
        ExecutionStatus::Failed => ExitCode::from(1),
        ExecutionStatus::Cancelled => ExitCode::from(3),
    }
}
