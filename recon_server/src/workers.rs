//! Background workers
//!
//! * Queue consumers, which run the jobs queued by the listener.
//! * The requeue worker, which moves damaged messages whose retry date has passed back onto their queues.
//! * The pending expiry worker, which deletes pending records nobody ever came back for.
//!
//! None of these handles should be awaited, since they run indefinitely.
use std::time::Duration;

use log::*;
use recon_engine::{
    helpers::now_ms,
    worker::{expire_pending, requeue_due_messages, QueueConsumer},
    ProcessorDirectory,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::{config::ServerConfig, errors::ServerError, integrations::HttpProcessorClient};

const REQUEUE_INTERVAL: Duration = Duration::from_secs(60);
const REQUEUE_BATCH_SIZE: u32 = 100;
const PENDING_EXPIRY_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// The API client and runtime context for every configured processor.
pub fn processor_directory(config: &ServerConfig) -> Result<ProcessorDirectory<HttpProcessorClient>, ServerError> {
    let mut directory = ProcessorDirectory::new();
    for processor in &config.processors {
        let client = HttpProcessorClient::from_config(processor)?;
        directory.add(config.processor_context(processor), client);
    }
    Ok(directory)
}

/// Starts `config.workers.workers` queue consumers, each consuming every processor's jobs queues.
pub fn start_queue_consumers(db: SqliteDatabase, config: &ServerConfig) -> Result<Vec<JoinHandle<()>>, ServerError> {
    let count = config.workers.workers;
    if count == 0 {
        info!("📦️ RECON_WORKERS is 0. No queue consumers will run in this process.");
        return Ok(Vec::new());
    }
    let mut handles = Vec::with_capacity(count);
    for i in 0..count {
        let consumer = QueueConsumer::new(db.clone(), processor_directory(config)?)
            .with_settings(config.workers.consumer_settings());
        if consumer.queues().is_empty() {
            warn!("📦️ No processors are configured, so there are no queues to consume");
            break;
        }
        debug!("📦️ Starting queue consumer #{i}");
        handles.push(tokio::spawn(async move { consumer.run().await }));
    }
    Ok(handles)
}

/// Starts the damaged message requeue worker.
pub fn start_requeue_worker(db: SqliteDatabase) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(REQUEUE_INTERVAL);
        info!("🕰️ Damaged message requeue worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running damaged message requeue job");
            loop {
                match requeue_due_messages(&db, now_ms(), REQUEUE_BATCH_SIZE).await {
                    Ok(0) => break,
                    Ok(n) => {
                        info!("🕰️ {n} damaged messages requeued");
                        if n < u64::from(REQUEUE_BATCH_SIZE) {
                            break;
                        }
                    },
                    Err(e) => {
                        error!("🕰️ Error running damaged message requeue job: {e}");
                        break;
                    },
                }
            }
        }
    })
}

/// Starts the pending record expiry worker.
pub fn start_pending_expiry_worker(db: SqliteDatabase, max_age: chrono::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(PENDING_EXPIRY_INTERVAL);
        info!("🕰️ Pending record expiry worker started. Records older than {} days are deleted", max_age.num_days());
        loop {
            timer.tick().await;
            info!("🕰️ Running pending record expiry job");
            match expire_pending(&db, None, max_age).await {
                Ok(count) => debug!("🕰️ {count} pending records expired"),
                Err(e) => error!("🕰️ Error running pending record expiry job: {e}"),
            }
        }
    })
}
