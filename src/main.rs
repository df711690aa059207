use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use sockscan::{
    config::Config,
    credentials::resolve_api_key,
    input::read_lockfile,
    model::{Advisory, AdvisoryLevel},
    output::{format_result_to_string, print_result, OutputFormat},
    Scanner,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::time::Duration;

/// Exit codes for CI integration
mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const FATAL_ADVISORY: u8 = 2;
    pub const WARN_ADVISORY: u8 = 3;
}

#[derive(Parser)]
#[command(name = "sockscan")]
#[command(
    author,
    version,
    about = "Scan npm dependencies for known security issues"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the dependencies of a package-lock.json
    Scan {
        /// Path to the lockfile
        #[arg(short, long, default_value = "package-lock.json")]
        lockfile: PathBuf,

        /// Output format (table, json)
        #[arg(short, long)]
        format: Option<String>,

        /// Write output to file
        #[arg(short, long)]
        output: Option<String>,

        /// Exit with error if advisories at or above this level are found
        #[arg(long, value_enum)]
        fail_on: Option<FailLevel>,
    },

    /// Show or create config file
    Config {
        /// Generate default config file
        #[arg(long)]
        init: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum FailLevel {
    Fatal,
    Warn,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(exit_codes::ERROR)
        }
    }
}

async fn run() -> Result<u8> {
    let cli = Cli::parse();
    let config = Config::load().unwrap_or_default();

    match cli.command {
        Commands::Scan {
            lockfile,
            format,
            output,
            fail_on,
        } => {
            let format_str = format.unwrap_or(config.default_format.clone());
            run_scan(&config, &lockfile, format_str, output, fail_on).await
        }
        Commands::Config { init, path } => {
            handle_config(init, path)?;
            Ok(exit_codes::SUCCESS)
        }
    }
}

async fn run_scan(
    config: &Config,
    lockfile: &std::path::Path,
    format: String,
    output_file: Option<String>,
    fail_on: Option<FailLevel>,
) -> Result<u8> {
    let format = OutputFormat::from_str(&format).map_err(|e| anyhow::anyhow!(e))?;
    let is_interactive = format == OutputFormat::Table && output_file.is_none();

    let mut packages = read_lockfile(lockfile)?;
    packages.retain(|p| !config.ignore.should_ignore(&p.name));

    if packages.is_empty() {
        if is_interactive {
            println!("Nothing to scan.");
        }
        return Ok(exit_codes::SUCCESS);
    }

    let scanner = build_scanner(config)?;

    let progress = if is_interactive {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(format!("Checking {} packages...", packages.len()));
        Some(pb)
    } else {
        None
    };

    let advisories = scanner.scan(packages).await?;

    if let Some(pb) = progress {
        pb.finish_with_message(format!("Found {} advisories", advisories.len()));
    }

    if let Some(path) = output_file {
        let content = format_result_to_string(&advisories, format)?;
        std::fs::write(&path, content)?;
        println!("Results written to: {}", path);
    } else {
        print_result(&advisories, format)?;
    }

    Ok(determine_exit_code(&advisories, fail_on))
}

/// Builds the scanner from resolved credentials and config overrides.
fn build_scanner(config: &Config) -> Result<Scanner> {
    Ok(match resolve_api_key()? {
        Some(key) => match &config.api_base_url {
            Some(base) => Scanner::authenticated_at(key, base),
            None => Scanner::authenticated(key),
        },
        None => match &config.firewall_base_url {
            Some(base) => Scanner::unauthenticated_at(base),
            None => Scanner::unauthenticated(),
        },
    })
}

/// Determine the exit code based on advisories found and --fail-on setting
fn determine_exit_code(advisories: &[Advisory], fail_on: Option<FailLevel>) -> u8 {
    let fail_on = match fail_on {
        Some(level) => level,
        None => return exit_codes::SUCCESS,
    };

    let has_fatal = advisories.iter().any(|a| a.level == AdvisoryLevel::Fatal);
    let has_warn = advisories.iter().any(|a| a.level == AdvisoryLevel::Warn);

    match fail_on {
        FailLevel::Fatal => {
            if has_fatal {
                exit_codes::FATAL_ADVISORY
            } else {
                exit_codes::SUCCESS
            }
        }
        FailLevel::Warn => {
            if has_fatal {
                exit_codes::FATAL_ADVISORY
            } else if has_warn {
                exit_codes::WARN_ADVISORY
            } else {
                exit_codes::SUCCESS
            }
        }
    }
}

fn handle_config(init: bool, show_path: bool) -> Result<()> {
    let config_path = Config::config_path();

    if show_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if init {
        if config_path.exists() {
            println!("Config file already exists at: {}", config_path.display());
            return Ok(());
        }

        let config = Config::default();
        config.save()?;
        println!("Created config file at: {}", config_path.display());
        println!();
        println!("Default configuration:");
        println!("{}", Config::generate_default_config());
        return Ok(());
    }

    // Show current config
    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)?;
        println!("Config file: {}", config_path.display());
        println!();
        println!("{}", content);
    } else {
        println!("No config file found.");
        println!("Run 'sockscan config --init' to create one.");
        println!();
        println!("Config path: {}", config_path.display());
    }

    Ok(())
}
