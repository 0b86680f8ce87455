mod display;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use keyreach_core::analyzers::{
    Analysis, Analyzer, Credential, FigmaAnalyzer, LaunchDarklyAnalyzer, MysqlAnalyzer,
    CONNECTION_STRING,
};
use keyreach_core::config::{load_config, AnalyzerConfig};
use keyreach_core::model::AnalyzerResult;
use keyreach_core::mysql::SnapshotFile;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "keyreach",
    version,
    about = "keyreach — find out what a leaked credential can reach",
    long_about = "Analyze a credential found by a secret scanner and report every resource it can reach and the permissions it holds on each."
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze an API token against the vendor's live API
    Analyze {
        /// Vendor the token belongs to
        #[arg(value_enum)]
        vendor: Vendor,

        /// The API token to analyze
        #[arg(long)]
        token: String,

        /// Path to a TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Analyze MySQL grants from an exported schema and SHOW GRANTS snapshot
    Grants {
        /// Path to the JSON snapshot
        snapshot: PathBuf,

        /// Connection string the snapshot was taken with
        #[arg(long, default_value = "mysql://root@localhost:3306")]
        dsn: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Vendor {
    Figma,
    Launchdarkly,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
    Yaml,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Analyze {
            vendor,
            token,
            config,
            format,
        } => cmd_analyze(vendor, &token, config.as_deref(), format).await,
        Commands::Grants {
            snapshot,
            dsn,
            format,
        } => cmd_grants(&snapshot, &dsn, format).await,
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "keyreach=info,keyreach_core=info",
        _ => "keyreach=debug,keyreach_core=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

async fn cmd_analyze(
    vendor: Vendor,
    token: &str,
    config_path: Option<&Path>,
    format: Format,
) -> Result<()> {
    let config = match config_path {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            load_config(path)?
        }
        None => AnalyzerConfig::default(),
    };

    let analyzer = match vendor {
        Vendor::Figma => Analyzer::Figma(FigmaAnalyzer::new(config)),
        Vendor::Launchdarkly => Analyzer::LaunchDarkly(LaunchDarklyAnalyzer::new(config)),
    };

    let analysis = analyzer
        .analyze(&Credential::token(token))
        .await
        .with_context(|| format!("{} analysis failed", analyzer.kind()))?;
    report(analysis, format)
}

async fn cmd_grants(snapshot: &Path, dsn: &str, format: Format) -> Result<()> {
    let analyzer = Analyzer::Mysql(MysqlAnalyzer::new(Arc::new(SnapshotFile::new(snapshot))));
    let credential = Credential::new().with(CONNECTION_STRING, dsn);

    let analysis = analyzer
        .analyze(&credential)
        .await
        .with_context(|| format!("Failed to analyze grants in {}", snapshot.display()))?;
    report(analysis, format)
}

/// Print whatever was found, then fail if the walk was incomplete.
fn report(analysis: Analysis, format: Format) -> Result<()> {
    print_result(&analysis.result, format)?;

    match analysis.partial_error {
        Some(err) => {
            if matches!(format, Format::Text) {
                display::print_partial_error(&err);
            }
            Err(anyhow::Error::new(err).context("results are incomplete"))
        }
        None => Ok(()),
    }
}

fn print_result(result: &AnalyzerResult, format: Format) -> Result<()> {
    match format {
        Format::Json => {
            let json = serde_json::to_string_pretty(result)?;
            println!("{}", json);
        }
        Format::Yaml => {
            let yaml = serde_yaml::to_string(result)?;
            print!("{}", yaml);
        }
        Format::Text => display::print_result(result),
    }
    Ok(())
}
