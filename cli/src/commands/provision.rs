//forge/cli/src/commands/provision.rs

use anyhow::Result;
use colored::Colorize;
use forge_orchestrator::ProvisionReport;
use forge_registry::TxResult;

use super::{GlobalArgs, Session};

/// Mint the identity token and grant the agent access
pub async fn execute(args: &GlobalArgs) -> Result<()> {
    let session = Session::open(args).await?;
    let orchestrator = session.orchestrator()?;
    let owner = session.infra_credentials()?;

    let report = orchestrator.provision(&owner).await?;
    print_report(&report);
    Ok(())
}

pub fn print_report(report: &ProvisionReport) {
    for (step, result) in [("Mint", &report.mint), ("Grant", &report.grant)] {
        match result {
            TxResult::Skipped => println!("{:<6} {}", step, "already on chain".dimmed()),
            TxResult::Committed(receipt) => println!(
                "{:<6} {} {} (block {})",
                step,
                "✓".green(),
                receipt.hash.to_string().cyan(),
                receipt.block_number
            ),
        }
    }
}
