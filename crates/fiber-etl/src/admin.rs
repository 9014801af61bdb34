//! Drains operator-originated `AdminCommand`s (spec §9B), keeping the ETL the
//! sole writer to the node table even for privileged actions.

use fiber_core::AdminCommand;
use fiber_queue::QueueBackend;
use fiber_storage::WriteBackend;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn run(queue: Arc<dyn QueueBackend>, storage: Arc<dyn WriteBackend>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("admin command drain shutting down");
                break;
            }
            _ = ticker.tick() => {
                while let Ok(Some(cmd)) = queue.pop_admin().await {
                    handle(&storage, cmd).await;
                }
            }
        }
    }
}

async fn handle(storage: &Arc<dyn WriteBackend>, cmd: AdminCommand) {
    match cmd {
        AdminCommand::DeleteNode { node_id, actor } => {
            if let Err(err) = storage.delete_node(&node_id).await {
                tracing::error!(error = %err, %node_id, "failed to delete node");
                return;
            }
            match storage.append_audit_entry(&format!("delete_node:{node_id}"), &actor).await {
                Ok(entry) => tracing::info!(%node_id, %actor, hash = %entry.hash, "node deleted"),
                Err(err) => tracing::error!(error = %err, "failed to append audit entry for node deletion"),
            }
        }
    }
}
