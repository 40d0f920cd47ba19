mod background_service;
mod config;
mod infrastructure;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use colored::Colorize;
use futures::future::join_all;
use service::prelude::JobsEngine;

use self::background_service::prelude::*;
use self::config::{build_config, AgentConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = build_config().with_context(|| "Failed to build config".red())?;
    let agent_config: AgentConfig = config
        .try_deserialize()
        .with_context(|| "Invalid agent config".red())?;

    infrastructure::telemetry::init(&agent_config.log_level)
        .with_context(|| "Failed to initialize logger".red())?;

    infrastructure::service::registry()
        .and_then(|registry| registry.install())
        .with_context(|| "Cannot build adaptor registry".red())?;
    let engine = JobsEngine::global().with_context(|| "Adaptor registry missing".red())?;
    for adaptor in engine.adaptors() {
        tracing::debug!(adaptor = %adaptor.name, schemes = ?adaptor.schemes, "{}", adaptor.description);
    }

    let mut schedulers = HashMap::new();
    for (name, entry) in &agent_config.schedulers {
        let scheduler = engine
            .new_scheduler(
                &entry.scheme,
                &entry.location,
                entry.credential.clone(),
                entry.properties.clone(),
            )
            .await
            .with_context(|| format!("Cannot open scheduler {name}").red())?;
        tracing::info!(%name, %scheduler, queues = ?engine.queue_names(&scheduler).unwrap_or_default(), "Scheduler ready");
        schedulers.insert(name.clone(), scheduler);
    }

    let mut jobs = Vec::with_capacity(agent_config.jobs.len());
    for entry in &agent_config.jobs {
        let scheduler = schedulers
            .get(&entry.scheduler)
            .with_context(|| format!("No scheduler named {}", entry.scheduler).red())?;
        let description = entry.job_description()?;
        let job = engine
            .submit_job(scheduler, &description)
            .await
            .with_context(|| format!("Cannot submit {}", description.executable).red())?;
        jobs.push(job);
    }
    tracing::info!(jobs = jobs.len(), "Jobs Agent Started");

    let interval = Duration::from_secs(agent_config.refresh_interval.max(1));
    tokio::select! {
        _ = refresh_jobs(engine.clone(), jobs.clone(), interval) => {
            tracing::info!("All jobs finished");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.with_context(|| "Cannot listen for ctrl-c".red())?;
            tracing::info!("Cancelling jobs (ctrl-c handling).");
            let cancelled = join_all(jobs.iter().map(|job| engine.cancel_job(job))).await;
            for (job, result) in jobs.iter().zip(cancelled) {
                if let Err(e) = result {
                    tracing::error!(job_id = %job.id(), "Cannot cancel job: {e}");
                }
            }
        }
    }

    for scheduler in schedulers.values() {
        if let Err(e) = engine.close(scheduler).await {
            tracing::error!(%scheduler, "Cannot close scheduler: {e}");
        }
    }
    Ok(())
}
