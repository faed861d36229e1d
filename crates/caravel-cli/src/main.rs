mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::EXIT_FAILURE;
use caravel_core::{install_signal_handler, Engine, UpOptions};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "caravel",
    version,
    about = "Declarative provisioning orchestrator for virtual machine environments"
)]
struct Cli {
    /// Path to the Caravel cache/state directory.
    #[arg(long, default_value = "~/.local/share/caravel")]
    cache_dir: String,

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
    /// Bring an environment up: resolve, fetch, provision.
    Up {
        /// Path to the environment descriptor.
        #[arg(default_value = "caravel.toml")]
        descriptor: PathBuf,
        /// Forbid network traffic; every artifact must already be cached.
        #[arg(long, default_value_t = false)]
        offline: bool,
    },
    /// Open a session to a ready environment (use -- to run a command).
    Ssh {
        /// Path to the environment descriptor.
        #[arg(default_value = "caravel.toml")]
        descriptor: PathBuf,
        /// Command to run instead of an interactive shell (after --).
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Show the recorded state of an environment.
    Status {
        /// Path to the environment descriptor.
        #[arg(default_value = "caravel.toml")]
        descriptor: PathBuf,
    },
    /// List all known environments.
    List,
    /// Forget an environment (cached artifacts are kept).
    Destroy {
        /// Environment id, short id, or name.
        env: String,
    },
    /// List resolvable image identifiers.
    Images,
    /// Artifact cache maintenance.
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
    /// Write a starter descriptor.
    New {
        /// Destination path.
        #[arg(default_value = "caravel.toml")]
        path: PathBuf,
        /// Overwrite an existing file without asking.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Run diagnostic checks on the system and store.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum CacheCommands {
    /// List cached artifacts with sizes.
    List,
    /// Recompute every cached artifact digest and status checksum.
    Verify,
    /// Remove one cached artifact by checksum.
    Remove { checksum: String },
    /// Remove every cached artifact.
    Clear,
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
            tracing_subscriber::EnvFilter::try_from_env("CARAVEL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    install_signal_handler();

    let cache_dir = expand_tilde(&cli.cache_dir);
    let engine = build_engine(&cache_dir);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Up {
            descriptor,
            offline,
        } => commands::up::run(&engine, &descriptor, UpOptions { offline }, json_output),
        Commands::Ssh {
            descriptor,
            command,
        } => commands::ssh::run(&engine, &descriptor, &command),
        Commands::Status { descriptor } => {
            commands::status::run(&engine, &descriptor, json_output)
        }
        Commands::List => commands::list::run(&engine, json_output),
        Commands::Destroy { env } => commands::destroy::run(&engine, &env),
        Commands::Images => commands::images::run(json_output),
        Commands::Cache { action } => match action {
            CacheCommands::List => commands::cache::list(&engine, json_output),
            CacheCommands::Verify => commands::cache::verify(&engine, json_output),
            CacheCommands::Remove { checksum } => commands::cache::remove(&engine, &checksum),
            CacheCommands::Clear => commands::cache::clear(&engine),
        },
        Commands::New { path, force } => commands::new::run(&path, force),
        Commands::Doctor => commands::doctor::run(&cache_dir, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

/// Readiness polling is tunable through the environment so scripted runs can
/// fail fast: `CARAVEL_READINESS_ATTEMPTS` and `CARAVEL_READINESS_DELAY_MS`.
fn build_engine(cache_dir: &std::path::Path) -> Engine {
    let mut engine = Engine::new(cache_dir);
    let mut policy = caravel_gateway::ReadinessPolicy::default();
    let mut overridden = false;
    if let Ok(attempts) = std::env::var("CARAVEL_READINESS_ATTEMPTS") {
        if let Ok(attempts) = attempts.parse() {
            policy.max_attempts = attempts;
            overridden = true;
        }
    }
    if let Ok(delay_ms) = std::env::var("CARAVEL_READINESS_DELAY_MS") {
        if let Ok(delay_ms) = delay_ms.parse() {
            policy.delay = std::time::Duration::from_millis(delay_ms);
            overridden = true;
        }
    }
    if overridden {
        engine = engine.with_readiness_policy(policy);
    }
    engine
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
