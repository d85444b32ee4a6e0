use std::time::{Duration, Instant};

use log::*;

use crate::{
    context::ProcessorDirectory,
    db_types::{NewDamagedMessage, QueuedMessage},
    helpers::{duration_ms, now_ms},
    jobs::{JobContext, JobError, JobRegistry},
    traits::{PaymentProcessor, ReconciliationDatabase, StoreError},
};

pub const DEFAULT_LEASE: Duration = Duration::from_secs(300);
pub const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(20 * 60);
pub const DEFAULT_REQUEUE_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// How long a popped message stays invisible to other consumers.
    pub lease: Duration,
    /// How long a transiently failed message waits in the damaged store before it is retried.
    pub requeue_delay: Duration,
    /// Messages first enqueued longer ago than this are not retried any more.
    pub requeue_max_age: Duration,
    /// How long [`QueueConsumer::run`] sleeps when the queues are empty.
    pub poll_interval: Duration,
    pub message_limit: Option<u64>,
    pub time_limit: Option<Duration>,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            lease: DEFAULT_LEASE,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            requeue_max_age: DEFAULT_REQUEUE_MAX_AGE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            message_limit: None,
            time_limit: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Completed,
    /// Parked in the damaged store (id) with a retry date.
    Retrying(i64),
    /// Parked in the damaged store (id) for an operator.
    Damaged(i64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: u64,
    pub retrying: u64,
    pub damaged: u64,
}

impl BatchSummary {
    pub fn processed(&self) -> u64 {
        self.completed + self.retrying + self.damaged
    }

    fn add(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::Completed => self.completed += 1,
            MessageOutcome::Retrying(_) => self.retrying += 1,
            MessageOutcome::Damaged(_) => self.damaged += 1,
        }
    }
}

pub struct QueueConsumer<B, P> {
    db: B,
    processors: ProcessorDirectory<P>,
    registry: JobRegistry,
    queues: Vec<String>,
    settings: ConsumerSettings,
}

impl<B, P> QueueConsumer<B, P>
where
    B: ReconciliationDatabase,
    P: PaymentProcessor,
{
    /// A consumer for the jobs queues of every processor in `processors`.
    pub fn new(db: B, processors: ProcessorDirectory<P>) -> Self {
        let queues = processors.all_jobs_queues();
        Self { db, processors, registry: JobRegistry::with_defaults(), queues, settings: ConsumerSettings::default() }
    }

    pub fn with_settings(mut self, settings: ConsumerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_registry(mut self, registry: JobRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_queues(mut self, queues: Vec<String>) -> Self {
        self.queues = queues;
        self
    }

    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    /// Takes one message from the first non-empty queue and deals with it. Returns `None` if all queues are empty.
    pub async fn run_once(&self) -> Result<Option<MessageOutcome>, StoreError> {
        for queue in &self.queues {
            if let Some(message) = self.db.pop(queue, self.settings.lease).await? {
                let outcome = self.process(message).await?;
                return Ok(Some(outcome));
            }
        }
        Ok(None)
    }

    /// Consumes messages until the queues are empty, or until the message or time limit is reached.
    pub async fn run_batch(&self) -> Result<BatchSummary, StoreError> {
        let start = Instant::now();
        let mut summary = BatchSummary::default();
        loop {
            if self.settings.message_limit.is_some_and(|limit| summary.processed() >= limit) {
                debug!("📦️ Message limit reached after {} messages", summary.processed());
                break;
            }
            if self.settings.time_limit.is_some_and(|limit| start.elapsed() >= limit) {
                debug!("📦️ Time limit reached after {} messages", summary.processed());
                break;
            }
            match self.run_once().await? {
                Some(outcome) => summary.add(outcome),
                None => break,
            }
        }
        Ok(summary)
    }

    /// Consumes forever, sleeping for the poll interval whenever the queues are empty.
    pub async fn run(&self) {
        info!("📦️ Queue consumer started on {}", self.queues.join(", "));
        loop {
            match self.run_batch().await {
                Ok(summary) if summary.processed() > 0 => {
                    debug!(
                        "📦️ Batch done. {} completed, {} to retry, {} damaged",
                        summary.completed, summary.retrying, summary.damaged
                    );
                },
                Ok(_) => tokio::time::sleep(self.settings.poll_interval).await,
                Err(e) => {
                    error!("📦️ Queue backend error. {e}");
                    tokio::time::sleep(self.settings.poll_interval).await;
                },
            }
        }
    }

    async fn process(&self, message: QueuedMessage) -> Result<MessageOutcome, StoreError> {
        trace!("📦️ Message #{} from {} (attempt {})", message.id, message.queue, message.attempts);
        match self.execute(&message).await {
            Ok(()) => {
                self.db.ack(message.id).await?;
                Ok(MessageOutcome::Completed)
            },
            Err(e) => self.fail(&message, e).await,
        }
    }

    async fn execute(&self, message: &QueuedMessage) -> Result<(), JobError> {
        let job = self.registry.hydrate(&message.body)?;
        let (context, processor) = self
            .processors
            .get(job.gateway())
            .ok_or_else(|| JobError::Permanent(format!("No processor is configured for '{}'", job.gateway())))?;
        debug!("📦️ Running {job}");
        let ctx = JobContext::new(&self.db, context, processor);
        job.execute(&ctx).await
    }

    async fn fail(&self, message: &QueuedMessage, error: JobError) -> Result<MessageOutcome, StoreError> {
        let now = now_ms();
        let damaged =
            NewDamagedMessage::new(message.queue.clone(), message.body.clone(), error.to_string(), message.enqueued_at_ms);
        let retry_until = message.enqueued_at_ms.saturating_add(duration_ms(self.settings.requeue_max_age));
        let (damaged, retry) = match &error {
            JobError::Transient(_) if now < retry_until => {
                let retry_at = now.saturating_add(duration_ms(self.settings.requeue_delay));
                (damaged.retry_at(retry_at), true)
            },
            _ => (damaged, false),
        };
        let id = self.db.move_to_damaged(message, damaged).await?;
        match error {
            JobError::Transient(e) if retry => {
                warn!("📦️ Message #{} from {} will be retried as damaged message #{id}. {e}", message.id, message.queue)
            },
            JobError::Transient(e) => error!(
                "🚑️ Message #{} from {} has been failing for too long. Giving up, see damaged message #{id}. {e}",
                message.id, message.queue
            ),
            JobError::Permanent(e) => {
                error!("🚑️ Message #{} from {} failed. See damaged message #{id}. {e}", message.id, message.queue)
            },
            JobError::Ambiguous(e) => error!(
                "🚑️ Message #{} from {} needs manual reconciliation. See damaged message #{id}. {e}",
                message.id, message.queue
            ),
        }
        Ok(if retry { MessageOutcome::Retrying(id) } else { MessageOutcome::Damaged(id) })
    }
}
