//forge/cli/src/main.rs

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use forge_orchestrator::{ConfigError, EXIT_CONFIG, EXIT_LEDGER_UNAVAILABLE, EXIT_LEDGER_WRITE_FAILED};
use forge_primitives::Address;
use forge_registry::RegistryError;
use forge_wallet::WalletError;
use std::path::PathBuf;

mod commands;
mod logging;

use commands::GlobalArgs;
use logging::{init_logging, LogConfig};

#[derive(Parser)]
#[command(name = "forge")]
#[command(about = "Federated research rounds gated and attested on chain", version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE", env = "FORGE_CONFIG")]
    config: Option<PathBuf>,

    /// Use a throwaway in-memory ledger with fixed development keys
    #[arg(long, global = true)]
    devnet: bool,

    /// Increase log verbosity (-v debug, -vv trace with span events)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one research round and attest the result
    Run {
        /// Mint and grant first if the ledger does not reflect it yet
        #[arg(long)]
        provision: bool,

        /// Print the outcome as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Mint the identity token and grant the agent access
    Provision,

    /// Check whether an address holds the research grant
    CheckAccess {
        /// Address to check (defaults to the agent key)
        #[arg(long)]
        grantee: Option<Address>,
    },

    /// Write a seeded synthetic patient dataset
    GenerateData {
        /// Output CSV (defaults to dataset.path from the config)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, default_value = "1000")]
        rows: usize,

        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_env().with_verbosity(cli.verbose);
    if let Err(e) = init_logging(&log_config) {
        eprintln!("{} {:#}", "warning:".yellow().bold(), e);
    }

    let code = match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

async fn execute(cli: Cli) -> Result<i32> {
    let args = GlobalArgs {
        config: cli.config,
        devnet: cli.devnet,
    };

    match cli.command {
        Commands::Run { provision, json } => commands::run::execute(&args, provision, json).await,
        Commands::Provision => {
            commands::provision::execute(&args).await?;
            Ok(0)
        }
        Commands::CheckAccess { grantee } => commands::access::execute(&args, grantee).await,
        Commands::GenerateData { output, rows, seed } => {
            commands::data::execute(args.config.as_deref(), output.as_deref(), rows, seed)?;
            Ok(0)
        }
    }
}

/// Map a failure that escaped a command to its exit code
fn exit_code_for(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<RegistryError>() {
            return match e {
                RegistryError::LedgerWriteFailed { .. } => EXIT_LEDGER_WRITE_FAILED,
                RegistryError::LedgerRead(_) => EXIT_LEDGER_UNAVAILABLE,
                RegistryError::Decode(_) => EXIT_CONFIG,
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG;
        }
        if let Some(WalletError::Rpc(_) | WalletError::ChainIdMismatch { .. }) = cause.downcast_ref::<WalletError>() {
            return EXIT_LEDGER_UNAVAILABLE;
        }
    }
    EXIT_CONFIG
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::try_parse_from(["forge", "run", "--provision", "--devnet", "-vv"]).unwrap();
        assert!(cli.devnet);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Run { provision: true, json: false }));
    }

    #[test]
    fn test_parse_grantee_address() {
        let cli = Cli::try_parse_from([
            "forge",
            "check-access",
            "--grantee",
            "0x00000000000000000000000000000000000000ab",
        ])
        .unwrap();
        let mut expected = [0u8; 20];
        expected[19] = 0xab;
        match cli.command {
            Commands::CheckAccess { grantee: Some(address) } => assert_eq!(address, Address(expected)),
            _ => panic!("expected check-access"),
        }
    }

    #[test]
    fn test_exit_code_mapping() {
        let err = anyhow::Error::new(ConfigError::Invalid("x".into()));
        assert_eq!(exit_code_for(&err), EXIT_CONFIG);

        let err = anyhow::Error::new(WalletError::Rpc("connection refused".into())).context("connecting");
        assert_eq!(exit_code_for(&err), EXIT_LEDGER_UNAVAILABLE);
    }
}
