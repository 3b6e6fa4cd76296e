//forge/cli/src/commands/run.rs

use anyhow::Result;
use colored::Colorize;
use forge_orchestrator::{RoundOutcome, RoundState};
use tracing::warn;

use super::provision::print_report;
use super::{GlobalArgs, Session};

/// Run one research round; returns the process exit code
pub async fn execute(args: &GlobalArgs, provision: bool, json: bool) -> Result<i32> {
    let session = Session::open(args).await?;
    let orchestrator = session.orchestrator()?;

    if provision {
        let owner = session.infra_credentials()?;
        let report = orchestrator.provision(&owner).await?;
        if !json {
            print_report(&report);
        }
    }

    let flag = orchestrator.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling round");
            flag.cancel();
        }
    });

    let outcome = orchestrator.run().await;
    if json {
        print_json(&outcome)?;
    } else {
        print_outcome(&outcome);
    }
    Ok(outcome.exit_code())
}

fn print_json(outcome: &RoundOutcome) -> Result<()> {
    let value = match outcome {
        RoundOutcome::Done(record) => serde_json::json!({
            "outcome": outcome.name(),
            "result": record,
        }),
        RoundOutcome::Aborted { stage, reason } => serde_json::json!({
            "outcome": outcome.name(),
            "stage": stage,
            "detail": reason.to_string(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_outcome(outcome: &RoundOutcome) {
    match outcome {
        RoundOutcome::Done(record) => {
            println!("{}", "✓ Result attested".green());
            println!("Topic:        {}", record.topic);
            println!("Content hash: {}", record.content_hash.to_string().cyan());
            println!("Accuracy:     {}%", record.accuracy);
            println!("Participants: {} ({} viable)", record.participants, record.viable);
            println!("Transaction:  {}", record.tx_hash.to_string().dimmed());
            println!("Block:        {}", record.block_number);
        }
        RoundOutcome::Aborted { stage, reason } => {
            let stage = match stage {
                RoundState::Idle => "before start".to_string(),
                other => format!("while {}", other),
            };
            println!("{} {} {}", "✗".red(), outcome.name().red().bold(), stage);
            println!("{}", reason);
        }
    }
}
