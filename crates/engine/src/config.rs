use std::time::Duration;

/// How provisioning is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployerMode {
    /// Dispatch pipelines to the external executor; outcomes arrive later.
    Pipeline,
    /// Provision synchronously through an infrastructure provider.
    Direct,
}

/// Where the store lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub deployer_mode: DeployerMode,
    pub store_backend: StoreBackend,
    /// Maximum concurrently running background jobs.
    pub pool_workers: usize,
    /// Jobs that may wait for a worker before submissions are refused.
    pub pool_queue: usize,
    pub ledger_capacity: usize,
    /// Root of default manifest locators.
    pub manifest_root: String,
    /// `None` disables the status poller.
    pub poll_interval: Option<Duration>,
    /// Default per-command timeout for direct validation.
    pub validation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deployer_mode: DeployerMode::Pipeline,
            store_backend: StoreBackend::Postgres,
            pool_workers: 8,
            pool_queue: 64,
            ledger_capacity: 1024,
            manifest_root: "challenges".to_string(),
            poll_interval: None,
            validation_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env var                     | Default      |
    /// |-----------------------------|--------------|
    /// | `DEPLOYER_MODE`             | `pipeline`   |
    /// | `STORE_BACKEND`             | `postgres`   |
    /// | `JOB_POOL_WORKERS`          | `8`          |
    /// | `JOB_POOL_QUEUE`            | `64`         |
    /// | `JOB_LEDGER_CAPACITY`       | `1024`       |
    /// | `MANIFEST_ROOT`             | `challenges` |
    /// | `STATUS_POLL_INTERVAL_SECS` | `default_poll_secs`; `0` disables |
    /// | `VALIDATION_TIMEOUT_SECS`   | `30`         |
    ///
    /// Panics on unparseable values so misconfiguration fails at startup.
    pub fn from_env(default_poll_secs: u64) -> Self {
        let deployer_mode = match std::env::var("DEPLOYER_MODE")
            .unwrap_or_else(|_| "pipeline".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "pipeline" => DeployerMode::Pipeline,
            "direct" => DeployerMode::Direct,
            other => panic!("DEPLOYER_MODE must be 'pipeline' or 'direct', got '{other}'"),
        };

        let store_backend = match std::env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => panic!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };

        let poll_secs = env_number("STATUS_POLL_INTERVAL_SECS", default_poll_secs);

        Self {
            deployer_mode,
            store_backend,
            pool_workers: env_number("JOB_POOL_WORKERS", 8u64).max(1) as usize,
            pool_queue: env_number("JOB_POOL_QUEUE", 64u64).max(1) as usize,
            ledger_capacity: env_number("JOB_LEDGER_CAPACITY", 1024u64).max(1) as usize,
            manifest_root: std::env::var("MANIFEST_ROOT").unwrap_or_else(|_| "challenges".into()),
            poll_interval: (poll_secs > 0).then(|| Duration::from_secs(poll_secs)),
            validation_timeout: Duration::from_secs(env_number("VALIDATION_TIMEOUT_SECS", 30)),
        }
    }
}

fn env_number(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid u64, got '{raw}'")),
        Err(_) => default,
    }
}
