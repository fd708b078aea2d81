//! Point Tracker: entry point.

use std::path::Path;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use point_tracker::{parse_date, ModelReader, RosterReader};
use point_tracker_cli::config::TrackerConfig;
use point_tracker_cli::output::{format_projection, render_estimate, render_overlay, render_table};
use point_tracker_cli::repl::parse_target;
use point_tracker_cli::session::TrackerSession;
use point_tracker_cli::types::{exit_codes, CliError, CliResult};

#[derive(Parser)]
#[command(
    name = "point-tracker",
    about = "Track channel points per streamer and estimate when each target will be reached",
    version
)]
struct Cli {
    /// Path to the roster CSV.
    #[arg(long, global = true)]
    roster: Option<String>,

    /// Path to the .ptm model file.
    #[arg(long, global = true)]
    models: Option<String>,

    /// Window policy: last-days[:N], per-day or rolling[:N].
    #[arg(short, long, global = true)]
    window: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a point value, creating the streamer if it is new.
    Add {
        name: String,

        #[arg(allow_negative_numbers = true)]
        points: f64,

        /// Set or replace the target.
        #[arg(long)]
        target: Option<f64>,

        /// Observation time (RFC 3339); defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Set a streamer's target, or `none` to clear it.
    Target { name: String, value: String },

    /// Rename a streamer.
    Rename { old: String, new: String },

    /// Remove a streamer and its model.
    Remove { name: String },

    /// Show every streamer with its estimated completion date (default).
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Show the fitted trend and projection for one streamer.
    Estimate {
        name: String,

        /// Also evaluate the trend at this time (RFC 3339).
        #[arg(long)]
        at: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Print the series used for fitting with the fitted line alongside.
    Series {
        name: String,

        /// Use the full history instead of the fitting window.
        #[arg(long)]
        raw: bool,

        #[arg(long)]
        json: bool,
    },

    /// Refit every model from the full history.
    Rebuild,

    /// Validate the roster and model files without modifying them.
    Validate,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   point-tracker completions bash > ~/.local/share/bash-completion/completions/point-tracker
    ///   point-tracker completions zsh > ~/.zfunc/_point-tracker
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        let code = e
            .downcast_ref::<CliError>()
            .map(CliError::exit_code)
            .unwrap_or(exit_codes::FAILURE);
        std::process::exit(code);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = TrackerConfig::resolve(
        cli.roster.as_deref(),
        cli.models.as_deref(),
        cli.window.as_deref(),
    )?;

    match cli.command.unwrap_or(Commands::List { json: false }) {
        Commands::Add {
            name,
            points,
            target,
            at,
        } => {
            let at = at.as_deref().map(parse_instant).transpose()?;
            let mut session = open(&config)?;
            let projection = session.record(&name, points, at, target)?;
            session.save()?;
            println!("Recorded {name}: est. {}", format_projection(&projection));
        }

        Commands::Target { name, value } => {
            let target = parse_target(&value)?;
            let mut session = open(&config)?;
            let projection = session.set_target(&name, target)?;
            session.save()?;
            println!("Target updated for {name}: est. {}", format_projection(&projection));
        }

        Commands::Rename { old, new } => {
            let mut session = open(&config)?;
            session.rename(&old, &new)?;
            session.save()?;
            println!("Renamed {old} -> {new}");
        }

        Commands::Remove { name } => {
            let mut session = open(&config)?;
            session.remove(&name)?;
            session.save()?;
            println!("Removed {name}");
        }

        Commands::List { json } => {
            let mut session = open(&config)?;
            let rows = session.summaries();
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if rows.is_empty() {
                println!("No streamers in {}", config.roster_path);
            } else {
                for line in render_table(&rows) {
                    println!("{line}");
                }
            }
            session.save()?;
        }

        Commands::Estimate { name, at, json } => {
            let at = at.as_deref().map(parse_instant).transpose()?;
            let mut session = open(&config)?;
            let report = session.estimate(&name, at)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for line in render_estimate(&report) {
                    println!("{line}");
                }
            }
            session.save()?;
        }

        Commands::Series { name, raw, json } => {
            let mut session = open(&config)?;
            let overlay = session.overlay(&name, raw)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overlay)?);
            } else {
                for line in render_overlay(&overlay) {
                    println!("{line}");
                }
            }
            session.save()?;
        }

        Commands::Rebuild => {
            let mut session = open(&config)?;
            let built = session.rebuild_all();
            session.save()?;
            println!(
                "Rebuilt {built} models for {} streamers ({})",
                session.roster().count(),
                session.policy()
            );
        }

        Commands::Validate => validate(&config)?,

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "point-tracker", &mut std::io::stdout());
        }

        Commands::Repl => point_tracker_cli::repl::run(config)?,
    }

    Ok(())
}

fn open(config: &TrackerConfig) -> CliResult<TrackerSession> {
    TrackerSession::open(&config.roster_path, &config.models_path, config.policy)
}

fn parse_instant(raw: &str) -> CliResult<chrono::DateTime<chrono::Utc>> {
    parse_date(raw).ok_or_else(|| {
        CliError::InvalidArgs(format!(
            "bad time '{raw}', expected RFC 3339 (e.g. 2024-05-01T18:00:00Z)"
        ))
    })
}

fn validate(config: &TrackerConfig) -> CliResult<()> {
    let roster_path = Path::new(&config.roster_path);
    let models_path = Path::new(&config.models_path);

    let roster = if roster_path.exists() {
        let roster = RosterReader::read_from_file(roster_path)?;
        println!("Valid roster: {}", config.roster_path);
        println!("  Streamers:    {}", roster.count());
        println!("  Observations: {}", roster.observation_count());
        Some(roster)
    } else {
        println!("No roster at {}", config.roster_path);
        None
    };

    if models_path.exists() {
        let models = ModelReader::read_from_file(models_path)?;
        println!("Valid model file: {}", config.models_path);
        println!("  Models:       {}", models.len());
        println!("  Window:       {}", models.policy());
        if models.policy() != config.policy {
            println!("  Note: configured window is {}; models will be refit", config.policy);
        }
        if let Some(roster) = &roster {
            let mut orphans: Vec<&String> = models
                .iter()
                .map(|(name, _)| name)
                .filter(|name| roster.get(name).is_none())
                .collect();
            orphans.sort();
            for name in orphans {
                println!("  Orphaned model: {name}");
            }
        }
    } else {
        println!("No model file at {}", config.models_path);
    }
    Ok(())
}
