//! Configuration management

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/docprep";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default chunk batch size for the embedding/ingestion loop.
pub const DEFAULT_EMBEDDING_BATCH_SIZE: usize = 32;

/// Default worker count for the job queue.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default bounded attempt count per job.
pub const DEFAULT_MAX_JOB_ATTEMPTS: u32 = 3;

/// Default retry backoff base delay in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;

/// Default retry backoff cap in milliseconds.
pub const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 30_000;

/// Stage timeout for fast transformation services, in seconds.
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;

/// Stage timeout for model-backed services (extraction, embedding), in
/// seconds.
pub const DEFAULT_MODEL_STAGE_TIMEOUT_SECS: u64 = 600;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub services: ServicesConfig,
    pub pipeline: PipelineConfig,
    pub cors: CorsConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Address and request timeout of one downstream service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    pub url: String,
    pub timeout_secs: u64,
}

impl ServiceEndpoint {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        let url: String = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Downstream stage services.
///
/// Extraction and embedding default to long timeouts; model servers are slow
/// on large inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub extractor: ServiceEndpoint,
    pub compressor: ServiceEndpoint,
    pub splitter: ServiceEndpoint,
    pub guard: ServiceEndpoint,
    pub fingerprint: ServiceEndpoint,
    pub embedder: ServiceEndpoint,
    pub ingestor: ServiceEndpoint,
}

/// Pipeline and job-queue tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub embedding_batch_size: usize,
    pub hierarchical_extraction: bool,
    pub guard_enabled: bool,
    pub worker_count: usize,
    pub max_job_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Period of the background reconciliation pass; 0 disables it.
    pub sync_interval_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_endpoint(prefix: &str, default_url: &str, default_timeout_secs: u64) -> ServiceEndpoint {
    ServiceEndpoint::new(
        env_string(&format!("{}_URL", prefix), default_url),
        env_parse(&format!("{}_TIMEOUT_SECS", prefix), default_timeout_secs),
    )
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env_string("DOCPREP_HOST", DEFAULT_SERVER_HOST),
                port: env_parse("DOCPREP_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: env_parse(
                    "DOCPREP_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                ),
            },
            database: DatabaseConfig {
                url: env_string("DATABASE_URL", DEFAULT_DATABASE_URL),
                max_connections: env_parse("DB_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_parse("DB_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_parse(
                    "DB_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_parse("DB_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            services: ServicesConfig {
                extractor: env_endpoint(
                    "EXTRACTOR",
                    "http://localhost:8081",
                    DEFAULT_MODEL_STAGE_TIMEOUT_SECS,
                ),
                compressor: env_endpoint(
                    "COMPRESSOR",
                    "http://localhost:8082",
                    DEFAULT_STAGE_TIMEOUT_SECS,
                ),
                splitter: env_endpoint(
                    "SPLITTER",
                    "http://localhost:8083",
                    DEFAULT_STAGE_TIMEOUT_SECS,
                ),
                guard: env_endpoint("GUARD", "http://localhost:8084", DEFAULT_STAGE_TIMEOUT_SECS),
                fingerprint: env_endpoint("FINGERPRINT", "http://localhost:8085", 30),
                embedder: env_endpoint(
                    "EMBEDDER",
                    "http://localhost:8086",
                    DEFAULT_MODEL_STAGE_TIMEOUT_SECS,
                ),
                ingestor: env_endpoint(
                    "INGESTOR",
                    "http://localhost:8087",
                    DEFAULT_STAGE_TIMEOUT_SECS,
                ),
            },
            pipeline: PipelineConfig {
                embedding_batch_size: env_parse(
                    "PIPELINE_EMBEDDING_BATCH_SIZE",
                    DEFAULT_EMBEDDING_BATCH_SIZE,
                ),
                hierarchical_extraction: env_parse("PIPELINE_HIERARCHICAL_EXTRACTION", false),
                guard_enabled: env_parse("PIPELINE_GUARD_ENABLED", false),
                worker_count: env_parse("QUEUE_WORKER_COUNT", DEFAULT_WORKER_COUNT),
                max_job_attempts: env_parse("QUEUE_MAX_JOB_ATTEMPTS", DEFAULT_MAX_JOB_ATTEMPTS),
                retry_base_delay_ms: env_parse(
                    "QUEUE_RETRY_BASE_DELAY_MS",
                    DEFAULT_RETRY_BASE_DELAY_MS,
                ),
                retry_max_delay_ms: env_parse(
                    "QUEUE_RETRY_MAX_DELAY_MS",
                    DEFAULT_RETRY_MAX_DELAY_MS,
                ),
                sync_interval_secs: env_parse("SYNC_INTERVAL_SECS", 0),
            },
            cors: CorsConfig {
                allowed_origins: env_string("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                allow_credentials: env_parse("CORS_ALLOW_CREDENTIALS", true),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        for (name, endpoint) in [
            ("extractor", &self.services.extractor),
            ("compressor", &self.services.compressor),
            ("splitter", &self.services.splitter),
            ("guard", &self.services.guard),
            ("fingerprint", &self.services.fingerprint),
            ("embedder", &self.services.embedder),
            ("ingestor", &self.services.ingestor),
        ] {
            if endpoint.url.is_empty() {
                anyhow::bail!("Service URL for '{}' cannot be empty", name);
            }
        }

        if self.pipeline.embedding_batch_size == 0 {
            anyhow::bail!("Embedding batch size must be greater than 0");
        }

        if self.pipeline.worker_count == 0 {
            anyhow::bail!("Queue worker count must be greater than 0");
        }

        if self.pipeline.max_job_attempts == 0 {
            anyhow::bail!("Max job attempts must be at least 1");
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            services: ServicesConfig::default(),
            pipeline: PipelineConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
        }
    }
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            extractor: ServiceEndpoint::new(
                "http://localhost:8081",
                DEFAULT_MODEL_STAGE_TIMEOUT_SECS,
            ),
            compressor: ServiceEndpoint::new("http://localhost:8082", DEFAULT_STAGE_TIMEOUT_SECS),
            splitter: ServiceEndpoint::new("http://localhost:8083", DEFAULT_STAGE_TIMEOUT_SECS),
            guard: ServiceEndpoint::new("http://localhost:8084", DEFAULT_STAGE_TIMEOUT_SECS),
            fingerprint: ServiceEndpoint::new("http://localhost:8085", 30),
            embedder: ServiceEndpoint::new(
                "http://localhost:8086",
                DEFAULT_MODEL_STAGE_TIMEOUT_SECS,
            ),
            ingestor: ServiceEndpoint::new("http://localhost:8087", DEFAULT_STAGE_TIMEOUT_SECS),
        }
    }
}

impl ServicesConfig {
    /// Point every service at one base URL, used by the integration tests to
    /// front all stages with a single mock server.
    pub fn all_at(base_url: &str) -> Self {
        Self {
            extractor: ServiceEndpoint::new(base_url, 10),
            compressor: ServiceEndpoint::new(base_url, 10),
            splitter: ServiceEndpoint::new(base_url, 10),
            guard: ServiceEndpoint::new(base_url, 10),
            fingerprint: ServiceEndpoint::new(base_url, 10),
            embedder: ServiceEndpoint::new(base_url, 10),
            ingestor: ServiceEndpoint::new(base_url, 10),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_batch_size: DEFAULT_EMBEDDING_BATCH_SIZE,
            hierarchical_extraction: false,
            guard_enabled: false,
            worker_count: DEFAULT_WORKER_COUNT,
            max_job_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            retry_max_delay_ms: DEFAULT_RETRY_MAX_DELAY_MS,
            sync_interval_secs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_pool_bounds() {
        let mut config = Config::default();
        config.database.min_connections = 20;
        config.database.max_connections = 10;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let mut config = Config::default();
        config.pipeline.embedding_batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let endpoint = ServiceEndpoint::new("http://svc:9000/", 5);
        assert_eq!(endpoint.url, "http://svc:9000");
        assert_eq!(endpoint.timeout(), Duration::from_secs(5));
    }
}
