use anyhow::{bail, Context, Result};
use chainkit_tools::{logging, Config, Environment, Network, DEFAULT_SECRETS_FILE};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chainkit")]
#[command(about = "Resolve compiler, network and verification settings for contract deployment")]
#[command(version)]
struct Cli {
    /// Secrets file with KEY=VALUE defaults (optional)
    #[arg(long, global = true, default_value = DEFAULT_SECRETS_FILE)]
    env_file: PathBuf,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Summary,
    Json,
    Toml,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the resolved configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "summary")]
        format: Format,
        /// Print signing keys and API key unmasked (json/toml only)
        #[arg(long)]
        reveal: bool,
    },
    /// Check that networks are ready for deployment
    Check {
        /// Network to check (testnet/mainnet); all networks when omitted
        #[arg(short, long)]
        network: Option<Network>,
    },
    /// List configured networks
    Networks,
    /// Print the compiler version
    Compiler,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose).context("failed to initialize logging")?;

    let env = Environment::load(&cli.env_file);
    let config = Config::from_env(&env);
    info!(env_file = %cli.env_file.display(), "configuration loaded");

    match cli.command {
        Commands::Show { format, reveal } => {
            if reveal && matches!(format, Format::Summary) {
                bail!("--reveal only applies to --format json or toml");
            }
            let shown = if reveal { config } else { config.redacted() };
            match format {
                Format::Summary => shown.print_summary(),
                Format::Json => println!("{}", shown.to_json()?),
                Format::Toml => print!("{}", shown.to_toml()?),
            }
            Ok(())
        }
        Commands::Check { network } => {
            let failures = match network {
                Some(network) => config
                    .check_network(network)
                    .err()
                    .map(|e| vec![(network, e)])
                    .unwrap_or_default(),
                None => config.check_all(),
            };

            if failures.is_empty() {
                println!("Configuration OK");
                return Ok(());
            }
            for (network, e) in &failures {
                error!(%network, "{}", e);
                println!("✗ {}: {}", network, e);
            }
            bail!("{} network(s) not ready for deployment", failures.len())
        }
        Commands::Networks => {
            for (network, profile) in &config.networks {
                let url = match profile.url.as_deref() {
                    Some(url) if !url.is_empty() => url,
                    _ => "(not configured)",
                };
                println!(
                    "{:<8} {}  [{} signing key(s)]",
                    network,
                    url,
                    profile.signing_keys().count()
                );
            }
            Ok(())
        }
        Commands::Compiler => {
            println!("{}", config.compiler_version);
            Ok(())
        }
    }
}
