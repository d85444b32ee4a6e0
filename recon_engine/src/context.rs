//! Per-processor runtime configuration.
//!
//! Every component receives the [`ProcessorContext`] for the processor it is working on explicitly. Nothing reads
//! configuration from global state, so workers with different settings can share a process.
use std::{collections::HashMap, time::Duration};

use rand::Rng;

use crate::risk::RiskScorer;

pub const DEFAULT_REVIEW_THRESHOLD: f64 = 50.0;
pub const DEFAULT_REJECT_THRESHOLD: f64 = 75.0;
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskThresholds {
    pub review: f64,
    pub reject: f64,
}

impl RiskThresholds {
    pub fn new(review: f64, reject: f64) -> Self {
        Self { review, reject }
    }
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self::new(DEFAULT_REVIEW_THRESHOLD, DEFAULT_REJECT_THRESHOLD)
    }
}

#[derive(Debug, Clone)]
pub struct ProcessorContext {
    pub processor: String,
    pub thresholds: RiskThresholds,
    pub scorer: RiskScorer,
    /// When false, successful authorizations are logged but no capture job is queued from the listener.
    pub capture_from_listener: bool,
    /// Capture jobs are spread randomly over this many job queues.
    pub capture_job_queue_count: u32,
    /// Upper bound for any single call to the processor's API.
    pub call_timeout: Duration,
}

impl ProcessorContext {
    pub fn new<S: Into<String>>(processor: S) -> Self {
        Self {
            processor: processor.into(),
            thresholds: RiskThresholds::default(),
            scorer: RiskScorer::default(),
            capture_from_listener: true,
            capture_job_queue_count: 1,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_scorer(mut self, scorer: RiskScorer) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_capture_from_listener(mut self, enabled: bool) -> Self {
        self.capture_from_listener = enabled;
        self
    }

    pub fn with_capture_job_queue_count(mut self, count: u32) -> Self {
        self.capture_job_queue_count = count.max(1);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// The queue a new job for this processor should be pushed onto.
    pub fn jobs_queue(&self) -> String {
        if self.capture_job_queue_count <= 1 {
            return format!("jobs-{}", self.processor);
        }
        let shard = rand::thread_rng().gen_range(1..=self.capture_job_queue_count);
        format!("jobs-{}-{shard}", self.processor)
    }

    /// Every queue that [`Self::jobs_queue`] can return. Workers consume from all of them.
    pub fn all_jobs_queues(&self) -> Vec<String> {
        if self.capture_job_queue_count <= 1 {
            vec![format!("jobs-{}", self.processor)]
        } else {
            (1..=self.capture_job_queue_count).map(|n| format!("jobs-{}-{n}", self.processor)).collect()
        }
    }
}

//--------------------------------------     ProcessorDirectory       -------------------------------------------------
/// The contexts, and API clients, for every processor a worker handles, keyed by processor name.
pub struct ProcessorDirectory<P> {
    entries: HashMap<String, (ProcessorContext, P)>,
}

impl<P> Default for ProcessorDirectory<P> {
    fn default() -> Self {
        Self { entries: HashMap::new() }
    }
}

impl<P> ProcessorDirectory<P> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_processor(mut self, context: ProcessorContext, client: P) -> Self {
        self.add(context, client);
        self
    }

    pub fn add(&mut self, context: ProcessorContext, client: P) {
        self.entries.insert(context.processor.clone(), (context, client));
    }

    pub fn get(&self, processor: &str) -> Option<(&ProcessorContext, &P)> {
        self.entries.get(processor).map(|(c, p)| (c, p))
    }

    pub fn context(&self, processor: &str) -> Option<&ProcessorContext> {
        self.entries.get(processor).map(|(c, _)| c)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &ProcessorContext> {
        self.entries.values().map(|(c, _)| c)
    }

    pub fn all_jobs_queues(&self) -> Vec<String> {
        let mut queues = self.contexts().flat_map(ProcessorContext::all_jobs_queues).collect::<Vec<_>>();
        queues.sort();
        queues
    }
}
