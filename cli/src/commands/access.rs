//forge/cli/src/commands/access.rs

use anyhow::Result;
use colored::Colorize;
use forge_orchestrator::{AbortReason, RoundOutcome, RoundState};
use forge_primitives::Address;
use forge_registry::resource_hash;

use super::{GlobalArgs, Session};

/// Read the grant for `grantee` (default: the agent key); exit code 2 when absent
pub async fn execute(args: &GlobalArgs, grantee: Option<Address>) -> Result<i32> {
    let session = Session::open(args).await?;
    let grantee = match grantee {
        Some(address) => address,
        None => session.agent_credentials()?.address(),
    };
    let token_id = session.config.research.token_id;
    let resource = resource_hash(&session.config.research.resource);

    let registry = session.ctx.capability_registry();
    if registry.has_access(token_id, grantee, resource).await? {
        println!(
            "{} {} may access '{}' via token {}",
            "✓".green(),
            grantee.to_string().cyan(),
            session.config.research.resource,
            token_id
        );
        return Ok(0);
    }

    let denied = RoundOutcome::Aborted {
        stage: RoundState::Verifying,
        reason: AbortReason::PermissionDenied {
            token_id,
            grantee,
            resource,
        },
    };
    if let Some(reason) = denied.abort_reason() {
        println!("{} {}", "✗".red(), reason);
    }
    Ok(denied.exit_code())
}
