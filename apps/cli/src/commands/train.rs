//! Format and train command implementations.

use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use tensorlink_core::{Connection, TrainJob, TrainingClient};

fn client(connection: Arc<Connection>) -> TrainingClient {
    let deadline = connection.config().default_deadline();
    TrainingClient::new(connection, deadline)
}

/// Execute the format command.
pub async fn format(connection: Arc<Connection>, job: &str) -> Result<()> {
    let status = client(connection)
        .format_files(job)
        .await
        .with_context(|| format!("Format request for job '{job}' failed"))?;

    println!("{} {}", "Formatted:".bold(), status);
    Ok(())
}

/// Execute the train command.
pub async fn execute(connection: Arc<Connection>, job: &TrainJob) -> Result<()> {
    let status = client(connection)
        .train(job)
        .await
        .with_context(|| format!("Training request for '{}' failed", job.id))?;

    println!("{} {}", "Key:".bold(), status.key.green());
    println!("{} {}", "Message:".bold(), status.message);
    Ok(())
}
