#![doc = include_str!("../README.md")]

mod config;
mod negate;
mod telemetry;

use clap::Parser;
use config::{CliArgs, RunConfig};
use flexpool::{Pool, channel};
use negate::Negator;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{signal, task::spawn_blocking};
use tokio_util::sync::CancellationToken;

type NegatePool = Pool<Negator, i64, i64>;

static NEXT_WORKER_ID: AtomicUsize = AtomicUsize::new(0);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = RunConfig::try_from(args)?;

    telemetry::init_telemetry()?;

    let token = CancellationToken::new();
    let pool: Arc<NegatePool> = Arc::new(Pool::new(
        token.clone(),
        channel::bounded(config.task_buffer_size),
        channel::bounded(config.result_buffer_size),
        negate::factory(config.work_delay),
    )?);
    resize(&pool, config.num_workers)?;
    log_startup_info(&config);

    let consumer = {
        let output = pool.output();
        spawn_blocking(move || {
            output
                .iter()
                .fold((0_u64, 0_i64), |(count, sum), result| (count + 1, sum + result))
        })
    };

    let mut producer = {
        let pool = Arc::clone(&pool);
        let config = config.clone();
        spawn_blocking(move || produce(&pool, &config))
    };

    let finished = tokio::select! {
        res = &mut producer => Some(res??),
        () = shutdown_signal() => None,
    };

    // Either way the queued tasks are drained before the output closes.
    tracing::info!("Shutting down, draining queued tasks");
    token.cancel();
    let submitted = match finished {
        Some(submitted) => submitted,
        None => producer.await??,
    };

    let (received, sum) = consumer.await?;
    let joined = Arc::clone(&pool);
    spawn_blocking(move || joined.join()).await?;

    tracing::info!(
        "Pool closed: {submitted} task(s) submitted, {received} result(s) received, sum = {sum}"
    );
    if received != submitted {
        tracing::warn!("{} task(s) were left unprocessed", submitted - received);
    }

    Ok(())
}

/// Submits `1..=num_tasks`, resizing the pool halfway through if asked to.
///
/// Returns how many tasks were accepted before the pool closed.
fn produce(pool: &NegatePool, config: &RunConfig) -> anyhow::Result<u64> {
    let halfway = config.num_tasks / 2;

    for submitted in 0..config.num_tasks {
        if let Some(target) = config.resize_to.filter(|_| submitted == halfway) {
            match resize(pool, target) {
                Ok(()) => {}
                Err(flexpool::Error::Closed) => return Ok(submitted),
                Err(err) => return Err(err.into()),
            }
        }

        let task = i64::try_from(submitted + 1)?;
        if let Err(rejected) = pool.add_task(task) {
            tracing::warn!(
                "Pool closed before task {} was submitted; {} task(s) skipped",
                rejected.into_inner(),
                config.num_tasks - submitted
            );
            return Ok(submitted);
        }
    }

    Ok(config.num_tasks)
}

/// Adds or removes workers one at a time until the pool has `target`.
fn resize(pool: &NegatePool, target: usize) -> flexpool::Result<(), usize> {
    let before = pool.len();

    while pool.len() < target {
        pool.add_worker(NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed))?;
    }
    while pool.len() > target {
        if pool.remove_worker().is_none() {
            break;
        }
    }

    tracing::info!("Resized pool from {before} to {} worker(s)", pool.len());
    Ok(())
}

fn log_startup_info(config: &RunConfig) {
    if cfg!(debug_assertions) {
        tracing::info!("Starting pool with full config: {:#?}", config);
    } else {
        tracing::info!(
            "Starting pool with {} workers for {} tasks",
            config.num_workers,
            config.num_tasks
        );
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }
}
