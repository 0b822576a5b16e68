use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info};

use grader::jobs::process_job;
use grader::redis_manager::RedisManager;
use grader::{Catalog, Grader, SandboxConfig};

const DEFAULT_CONCURRENCY: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("grader=info".parse()?),
        )
        .init();

    info!("Starting Grading Worker...");

    // Sandbox limits: TOML file if given, GRADER_* env vars on top
    let config = match std::env::var("GRADER_CONFIG") {
        Ok(path) => {
            let config = SandboxConfig::load(&path)?;
            info!("Loaded sandbox configuration from {}", path);
            config
        }
        Err(_) => SandboxConfig::from_env()?,
    };
    info!(
        "Sandbox config: python={}, time_limit={}ms, memory_limit={}MB, isolate_network={}",
        config.python, config.time_limit_ms, config.memory_limit_mb, config.isolate_network
    );

    let catalog = match std::env::var("GRADER_CATALOG") {
        Ok(path) => Catalog::load(&path)?,
        Err(_) => Catalog::builtin()?,
    };
    info!("Loaded {} challenges", catalog.len());

    let concurrency = match std::env::var("GRADER_CONCURRENCY") {
        Ok(raw) => raw
            .trim()
            .parse::<usize>()
            .with_context(|| format!("Invalid GRADER_CONCURRENCY: {:?}", raw))?
            .max(1),
        Err(_) => DEFAULT_CONCURRENCY,
    };

    let grader = Arc::new(Grader::new(config));
    let catalog = Arc::new(catalog);
    let mut redis = RedisManager::from_env().await?;
    let publisher = redis.publisher().await?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, finishing in-flight jobs");
                shutdown.store(true, Ordering::SeqCst);
            }
        });
    }

    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    info!("Waiting for jobs (concurrency {})...", concurrency);

    while !shutdown.load(Ordering::SeqCst) {
        let job = match redis.pop_job().await? {
            Some(job) => job,
            None => continue,
        };

        let permit = permits.clone().acquire_owned().await?;
        let grader = grader.clone();
        let catalog = catalog.clone();
        let publisher = publisher.clone();

        tasks.spawn(async move {
            let _permit = permit;
            let result = process_job(&job, &grader, &catalog).await;
            if let Err(e) = publisher.store_grade_result(&result).await {
                error!(
                    "Failed to store grade result for submission {}: {:#}",
                    result.submission_id, e
                );
            }
        });

        // Reap finished tasks
        while tasks.try_join_next().is_some() {}
    }

    while tasks.join_next().await.is_some() {}
    info!("Grading Worker stopped");

    Ok(())
}
