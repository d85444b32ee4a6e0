//! Server configuration
//!
//! Everything is read from `RECON_` environment variables (a `.env` file is loaded first, if present). Invalid values
//! are logged and replaced by their defaults, so the server always starts. The one exception is an invalid IP
//! allowlist, which shuts the affected processor out entirely rather than silently opening it up.
//!
//! Each processor named in `RECON_PROCESSORS` is configured with `RECON_<NAME>_*` variables, where `<NAME>` is the
//! upper-cased processor name.
use std::{collections::HashMap, env, fmt::Display, str::FromStr, time::Duration};

use log::*;
use recon_common::{
    helpers::{parse_boolean_flag, parse_key_value_list},
    Secret,
};
use recon_engine::{risk::RiskScorer, worker::ConsumerSettings, ProcessorContext, RiskThresholds};

use crate::ip_allowlist::IpAllowlist;

const DEFAULT_RECON_HOST: &str = "127.0.0.1";
const DEFAULT_RECON_PORT: u16 = 8370;
pub const DEFAULT_HMAC_HEADER: &str = "X-Hmac-SHA256";
const DEFAULT_PROCESSOR_TIMEOUT: Duration = Duration::from_millis(10_000);
const DEFAULT_REQUEUE_DELAY: Duration = Duration::from_secs(1200);
const DEFAULT_REQUEUE_MAX_AGE: Duration = Duration::from_secs(86_400);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_PENDING_MAX_AGE_DAYS: i64 = 30;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address, rather than the connection's
    /// remote address.
    pub use_forwarded: bool,
    /// Default thresholds for processors that don't override them.
    pub thresholds: RiskThresholds,
    pub cvv_scores: HashMap<String, f64>,
    pub avs_scores: HashMap<String, f64>,
    /// When false, the listener does not queue capture jobs for successful authorizations.
    pub capture_from_listener: bool,
    pub capture_job_queue_count: u32,
    pub workers: WorkerConfig,
    pub processors: Vec<ProcessorConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RECON_HOST.to_string(),
            port: DEFAULT_RECON_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            thresholds: RiskThresholds::default(),
            cvv_scores: HashMap::new(),
            avs_scores: HashMap::new(),
            capture_from_listener: true,
            capture_job_queue_count: 1,
            workers: WorkerConfig::default(),
            processors: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// The number of queue consumers to run. Zero runs none (e.g. on a listener-only host).
    pub workers: usize,
    pub requeue_delay: Duration,
    pub requeue_max_age: Duration,
    pub poll_interval: Duration,
    /// Pending records older than this are deleted by the expiry worker.
    pub pending_max_age: chrono::Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            requeue_delay: DEFAULT_REQUEUE_DELAY,
            requeue_max_age: DEFAULT_REQUEUE_MAX_AGE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            pending_max_age: chrono::Duration::days(DEFAULT_PENDING_MAX_AGE_DAYS),
        }
    }
}

impl WorkerConfig {
    pub fn consumer_settings(&self) -> ConsumerSettings {
        ConsumerSettings {
            requeue_delay: self.requeue_delay,
            requeue_max_age: self.requeue_max_age,
            poll_interval: self.poll_interval,
            ..ConsumerSettings::default()
        }
    }
}

#[derive(Clone, Debug)]
pub struct ProcessorConfig {
    pub name: String,
    /// The name of the decoder in the decoder registry that understands this processor's payloads.
    pub decoder: String,
    pub hmac_secret: Secret<String>,
    pub hmac_header: String,
    /// If false, HMAC signatures are not checked. **DANGER**
    pub hmac_checks: bool,
    pub ip_allowlist: IpAllowlist,
    pub api_url: String,
    pub api_key: Secret<String>,
    pub timeout: Duration,
    /// Overrides the server-wide thresholds when set.
    pub thresholds: Option<RiskThresholds>,
}

impl ProcessorConfig {
    pub fn new<S: Into<String>>(name: S) -> Self {
        let name = name.into();
        Self {
            decoder: name.clone(),
            name,
            hmac_secret: Secret::default(),
            hmac_header: DEFAULT_HMAC_HEADER.to_string(),
            hmac_checks: true,
            ip_allowlist: IpAllowlist::Open,
            api_url: String::default(),
            api_key: Secret::default(),
            timeout: DEFAULT_PROCESSOR_TIMEOUT,
            thresholds: None,
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source. [`Self::from_env_or_default`] uses the process
    /// environment.
    pub fn from_lookup<F>(var: F) -> Self
    where F: Fn(&str) -> Option<String> {
        let host = var("RECON_HOST").unwrap_or_else(|| DEFAULT_RECON_HOST.into());
        let port = parse_or_default(&var, "RECON_PORT", DEFAULT_RECON_PORT);
        let database_url = var("RECON_DATABASE_URL").unwrap_or_else(|| {
            error!("🪛️ RECON_DATABASE_URL is not set. Please set it to the URL for the reconciliation database.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(var("RECON_USE_X_FORWARDED_FOR"), false);
        let use_forwarded = parse_boolean_flag(var("RECON_USE_FORWARDED"), false);
        let defaults = RiskThresholds::default();
        let thresholds = RiskThresholds::new(
            parse_or_default(&var, "RECON_REVIEW_THRESHOLD", defaults.review),
            parse_or_default(&var, "RECON_REJECT_THRESHOLD", defaults.reject),
        );
        let cvv_scores = score_map(&var, "RECON_CVV_SCORES");
        let avs_scores = score_map(&var, "RECON_AVS_SCORES");
        let capture_from_listener = parse_boolean_flag(var("RECON_CAPTURE_FROM_LISTENER"), true);
        let capture_job_queue_count = parse_or_default(&var, "RECON_CAPTURE_JOB_QUEUE_COUNT", 1u32).max(1);
        let workers = WorkerConfig {
            workers: parse_or_default(&var, "RECON_WORKERS", 1usize),
            requeue_delay: Duration::from_secs(parse_or_default(
                &var,
                "RECON_REQUEUE_DELAY_SECS",
                DEFAULT_REQUEUE_DELAY.as_secs(),
            )),
            requeue_max_age: Duration::from_secs(parse_or_default(
                &var,
                "RECON_REQUEUE_MAX_AGE_SECS",
                DEFAULT_REQUEUE_MAX_AGE.as_secs(),
            )),
            poll_interval: Duration::from_millis(parse_or_default(
                &var,
                "RECON_WORKER_POLL_MS",
                DEFAULT_POLL_INTERVAL.as_millis() as u64,
            )),
            pending_max_age: chrono::Duration::days(parse_or_default(
                &var,
                "RECON_PENDING_MAX_AGE_DAYS",
                DEFAULT_PENDING_MAX_AGE_DAYS,
            )),
        };
        let processors = var("RECON_PROCESSORS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|name| ProcessorConfig::from_lookup(&var, name))
            .collect::<Vec<_>>();
        if processors.is_empty() {
            warn!("🪛️ RECON_PROCESSORS is empty. The server will not accept any webhooks.");
        }
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            thresholds,
            cvv_scores,
            avs_scores,
            capture_from_listener,
            capture_job_queue_count,
            workers,
            processors,
        }
    }

    pub fn processor(&self, name: &str) -> Option<&ProcessorConfig> {
        self.processors.iter().find(|p| p.name == name)
    }

    /// The runtime context handed to the engine for the given processor.
    pub fn processor_context(&self, processor: &ProcessorConfig) -> ProcessorContext {
        let scorer = RiskScorer::new(self.cvv_scores.clone(), self.avs_scores.clone());
        ProcessorContext::new(processor.name.as_str())
            .with_thresholds(processor.thresholds.unwrap_or(self.thresholds))
            .with_scorer(scorer)
            .with_capture_from_listener(self.capture_from_listener)
            .with_capture_job_queue_count(self.capture_job_queue_count)
            .with_call_timeout(processor.timeout)
    }
}

impl ProcessorConfig {
    pub fn from_lookup<F>(var: &F, name: &str) -> Self
    where F: Fn(&str) -> Option<String> {
        let prefix = format!("RECON_{}", name.to_uppercase());
        let key = |suffix: &str| format!("{prefix}_{suffix}");
        let defaults = Self::new(name);
        let decoder = var(key("DECODER").as_str()).unwrap_or_else(|| name.to_string());
        let hmac_secret = Secret::new(var(key("HMAC_SECRET").as_str()).unwrap_or_default());
        let hmac_header = var(key("HMAC_HEADER").as_str()).unwrap_or(defaults.hmac_header);
        let hmac_checks = parse_boolean_flag(var(key("HMAC_CHECKS").as_str()), true);
        if !hmac_checks {
            warn!("🚨️ HMAC checks are disabled for {name}. Anyone who can reach the server can post webhooks.");
        } else if hmac_secret.is_empty() {
            error!(
                "🪛️ {} is not set. Every webhook from {name} will be refused until it is configured.",
                key("HMAC_SECRET")
            );
        }
        let ip_allowlist = allowlist(var(key("IP_ALLOWLIST").as_str()), &key("IP_ALLOWLIST"));
        let api_url = var(key("API_URL").as_str()).unwrap_or_else(|| {
            warn!("🪛️ {} is not set. Capture and cancel calls to {name} will fail.", key("API_URL"));
            String::default()
        });
        let api_key = Secret::new(var(key("API_KEY").as_str()).unwrap_or_default());
        let timeout = Duration::from_millis(parse_or_default(
            var,
            &key("TIMEOUT_MS"),
            DEFAULT_PROCESSOR_TIMEOUT.as_millis() as u64,
        ));
        let review = parse_optional::<f64, _>(var, &key("REVIEW_THRESHOLD"));
        let reject = parse_optional::<f64, _>(var, &key("REJECT_THRESHOLD"));
        let thresholds = match (review, reject) {
            (None, None) => None,
            (review, reject) => {
                let global = RiskThresholds::new(
                    parse_or_default(var, "RECON_REVIEW_THRESHOLD", RiskThresholds::default().review),
                    parse_or_default(var, "RECON_REJECT_THRESHOLD", RiskThresholds::default().reject),
                );
                Some(RiskThresholds::new(review.unwrap_or(global.review), reject.unwrap_or(global.reject)))
            },
        };
        info!("🪛️ Processor {name}: decoder {decoder}, IP allowlist: {ip_allowlist}");
        Self {
            name: name.to_string(),
            decoder,
            hmac_secret,
            hmac_header,
            hmac_checks,
            ip_allowlist,
            api_url,
            api_key,
            timeout,
            thresholds,
        }
    }
}

fn allowlist(value: Option<String>, var_name: &str) -> IpAllowlist {
    let value = match value {
        None => {
            info!("🪛️ {var_name} is not set. Only HMAC validation will be used.");
            return IpAllowlist::Open;
        },
        Some(v) => v,
    };
    if ["none", "false", "0"].contains(&value.trim().to_lowercase().as_str()) {
        info!("🪛️ {var_name} is disabled. Only HMAC validation will be used.");
        return IpAllowlist::Open;
    }
    match IpAllowlist::parse(&value) {
        Ok(list) => {
            if matches!(&list, IpAllowlist::Ranges(r) if r.is_empty()) {
                warn!("🚨️ {var_name} was configured, but is empty. No webhooks will be authorised.");
            }
            list
        },
        Err(e) => {
            error!("🚨️ {var_name} is invalid. {e}. No webhooks will be authorised until it is fixed.");
            IpAllowlist::DenyAll
        },
    }
}

fn score_map<F>(var: &F, name: &str) -> HashMap<String, f64>
where F: Fn(&str) -> Option<String> {
    let value = match var(name) {
        Some(v) => v,
        None => {
            info!("🪛️ {name} is not set. Every result code will score 0.");
            return HashMap::new();
        },
    };
    let (map, rejected) = parse_key_value_list::<f64>(&value);
    if !rejected.is_empty() {
        warn!("🪛️ Ignoring invalid entries in {name}: {}", rejected.join(", "));
    }
    map
}

fn parse_optional<T, F>(var: &F, name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    var(name).and_then(|s| {
        s.trim().parse::<T>().map_err(|e| warn!("🪛️ Invalid configuration value for {name} ({s}). {e}")).ok()
    })
}

fn parse_or_default<T, F>(var: &F, name: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match var(name) {
        None => default,
        Some(s) => s.trim().parse::<T>().unwrap_or_else(|e| {
            warn!("🪛️ {s} is not a valid value for {name}. {e} Using the default, {default}, instead.");
            default
        }),
    }
}
