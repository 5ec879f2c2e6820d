mod commands;

use clap::{Parser, Subcommand};
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_STORE_ERROR};
use shoal_core::{install_signal_handler, Controller};
use shoal_schema::parse_config_file;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_CONFIG: &str = "/etc/shoal/shoal.toml";

#[derive(Debug, Parser)]
#[command(
    name = "shoal",
    version,
    about = "Converge this node into a docker swarm cluster"
)]
struct Cli {
    /// Path to the node configuration (default: $SHOAL_CONFIG, then /etc/shoal/shoal.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Deliver one event and run one evaluation pass.
    Deliver {
        /// Event JSON, or @FILE to read it from a file.
        event: String,
    },
    /// Deliver JSON-lines events from stdin until EOF or Ctrl-C.
    Serve,
    /// Show the node's status and lifecycle stage.
    Status,
    /// List every fact with its owner, and the latched rules.
    Facts,
    /// Show the engine flags and launch description this node converges to.
    RenderConfig,
    /// Re-package the client bundle from the placed client material.
    Bundle,
    /// Run diagnostic checks on the host and the state directory.
    Doctor,
    /// Parse the output of a swarm benchmark run.
    BenchReport {
        /// Benchmark log file, or - for stdin.
        file: String,
    },
    /// Validate the node configuration.
    CheckConfig,
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SHOAL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    install_signal_handler();

    let config_path = cli
        .config
        .or_else(|| std::env::var_os("SHOAL_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let json_output = cli.json;

    let needs_runtime = matches!(cli.command, Commands::Deliver { .. } | Commands::Serve);

    let result = match cli.command {
        Commands::Deliver { event } => with_controller(&config_path, needs_runtime, |ctl| {
            commands::deliver::run(ctl, &event, json_output)
        }),
        Commands::Serve => with_controller(&config_path, needs_runtime, |ctl| {
            commands::serve::run(ctl, json_output)
        }),
        Commands::Status => with_controller(&config_path, needs_runtime, |ctl| {
            commands::status::run(ctl, json_output)
        }),
        Commands::Facts => with_controller(&config_path, needs_runtime, |ctl| {
            commands::facts::run(ctl, json_output)
        }),
        Commands::RenderConfig => with_controller(&config_path, needs_runtime, |ctl| {
            commands::render_config::run(ctl, json_output)
        }),
        Commands::Bundle => with_controller(&config_path, needs_runtime, |ctl| {
            commands::bundle::run(ctl, json_output)
        }),
        Commands::Doctor => commands::doctor::run(&config_path, json_output),
        Commands::BenchReport { file } => commands::bench_report::run(&file, json_output),
        Commands::CheckConfig => commands::check_config::run(&config_path, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("store error:") {
                EXIT_STORE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

/// Load the config, check host tools when the command touches the host, and
/// open the controller.
fn with_controller(
    config_path: &Path,
    needs_runtime: bool,
    f: impl FnOnce(&Controller) -> Result<u8, String>,
) -> Result<u8, String> {
    let config = parse_config_file(config_path).map_err(|e| format!("config error: {e}"))?;
    if needs_runtime && std::env::var("SHOAL_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = shoal_runtime::check_host_prereqs(&config);
        if !missing.is_empty() {
            return Err(shoal_runtime::format_missing(&missing));
        }
    }
    let ctl = Controller::open(config).map_err(|e| e.to_string())?;
    f(&ctl)
}
