//! Pipeline configuration with tunable thresholds.

use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::IngestError;
use crate::ingest::normalizer::DEFAULT_OBJECT_TYPE;

/// Configuration for the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Upstream change stream (ws:// or wss://)
    pub stream_url: String,
    /// Object type whose changes are indexed (default: "ConceptScheme")
    pub object_type: String,
    /// Buffered ids that trigger an immediate flush (default: 50)
    pub batch_size: usize,
    /// Periodic flush interval (default: 1000ms)
    pub batch_timeout: Duration,
    /// Interval between liveness probes (default: 30s)
    pub heartbeat_interval: Duration,
    /// Fixed delay before each reconnect attempt (default: 5s)
    pub reconnect_delay: Duration,
    /// Capacity of the frame channel between socket and ingestion loop (default: 100)
    pub frame_channel_capacity: usize,
    /// Bulk-enqueue endpoint for [`crate::queue::HttpJobQueue`]
    pub queue_url: Option<String>,
    /// Per-request timeout for the queue endpoint (default: 10s)
    pub queue_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stream_url: "ws://127.0.0.1:8080/changes".to_string(),
            object_type: DEFAULT_OBJECT_TYPE.to_string(),
            batch_size: 50,
            batch_timeout: Duration::from_millis(1000),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_delay: Duration::from_secs(5),
            frame_channel_capacity: 100,
            queue_url: None,
            queue_timeout: Duration::from_secs(10),
        }
    }
}

/// Environment variables read by [`PipelineConfig::from_env`].
pub mod env {
    pub const STREAM_URL: &str = "FEED_STREAM_URL";
    pub const OBJECT_TYPE: &str = "FEED_OBJECT_TYPE";
    pub const BATCH_SIZE: &str = "FEED_BATCH_SIZE";
    pub const BATCH_TIMEOUT_MS: &str = "FEED_BATCH_TIMEOUT_MS";
    pub const HEARTBEAT_INTERVAL_MS: &str = "FEED_HEARTBEAT_INTERVAL_MS";
    pub const RECONNECT_DELAY_MS: &str = "FEED_RECONNECT_DELAY_MS";
    pub const QUEUE_URL: &str = "FEED_QUEUE_URL";
}

impl PipelineConfig {
    /// Create a new config builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Load from process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IngestError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup(env::STREAM_URL) {
            config.stream_url = url;
        }
        if let Some(object_type) = lookup(env::OBJECT_TYPE) {
            config.object_type = object_type;
        }
        if let Some(size) = lookup(env::BATCH_SIZE) {
            config.batch_size = parse_number(env::BATCH_SIZE, &size)?;
        }
        if let Some(ms) = lookup(env::BATCH_TIMEOUT_MS) {
            config.batch_timeout = Duration::from_millis(parse_number(env::BATCH_TIMEOUT_MS, &ms)?);
        }
        if let Some(ms) = lookup(env::HEARTBEAT_INTERVAL_MS) {
            config.heartbeat_interval =
                Duration::from_millis(parse_number(env::HEARTBEAT_INTERVAL_MS, &ms)?);
        }
        if let Some(ms) = lookup(env::RECONNECT_DELAY_MS) {
            config.reconnect_delay =
                Duration::from_millis(parse_number(env::RECONNECT_DELAY_MS, &ms)?);
        }
        if let Some(url) = lookup(env::QUEUE_URL) {
            config.queue_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), IngestError> {
        let url = Url::parse(&self.stream_url)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(IngestError::ConfigError(format!(
                "stream url must be ws:// or wss://, got {}",
                url.scheme()
            )));
        }
        if let Some(queue_url) = &self.queue_url {
            Url::parse(queue_url)?;
        }
        if self.object_type.is_empty() {
            return Err(IngestError::ConfigError("object type is empty".to_string()));
        }
        if self.batch_size == 0 {
            return Err(IngestError::ConfigError("batch size must be > 0".to_string()));
        }
        if self.frame_channel_capacity == 0 {
            return Err(IngestError::ConfigError(
                "frame channel capacity must be > 0".to_string(),
            ));
        }
        for (name, value) in [
            ("batch timeout", self.batch_timeout),
            ("heartbeat interval", self.heartbeat_interval),
            ("reconnect delay", self.reconnect_delay),
        ] {
            if value.is_zero() {
                return Err(IngestError::ConfigError(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T, IngestError> {
    raw.trim()
        .parse()
        .map_err(|_| IngestError::ConfigError(format!("{key}: expected a number, got {raw:?}")))
}

/// Builder pattern for PipelineConfig.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn stream_url(mut self, url: impl Into<String>) -> Self {
        self.config.stream_url = url.into();
        self
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.config.object_type = object_type.into();
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.config.batch_timeout = timeout;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn frame_channel_capacity(mut self, capacity: usize) -> Self {
        self.config.frame_channel_capacity = capacity;
        self
    }

    pub fn queue_url(mut self, url: impl Into<String>) -> Self {
        self.config.queue_url = Some(url.into());
        self
    }

    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_timeout = timeout;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> PipelineConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 50);
        assert_eq!(config.batch_timeout, Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.object_type, "ConceptScheme");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = PipelineConfig::builder()
            .stream_url("wss://feed.example.org/changes")
            .batch_size(10)
            .batch_timeout(Duration::from_millis(250))
            .queue_url("http://queue:3000/jobs")
            .build();

        assert_eq!(config.batch_size, 10);
        assert_eq!(config.batch_timeout, Duration::from_millis(250));
        assert_eq!(config.queue_url.as_deref(), Some("http://queue:3000/jobs"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (env::STREAM_URL, "ws://feed:9000/stream"),
            (env::BATCH_SIZE, "20"),
            (env::RECONNECT_DELAY_MS, " 750 "),
        ]);
        let config =
            PipelineConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.stream_url, "ws://feed:9000/stream");
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.reconnect_delay, Duration::from_millis(750));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let result = PipelineConfig::from_lookup(|key| {
            (key == env::BATCH_SIZE).then(|| "fifty".to_string())
        });
        assert!(matches!(result, Err(IngestError::ConfigError(_))));
    }

    #[test]
    fn test_from_lookup_rejects_out_of_range_batch_size() {
        let result = PipelineConfig::from_lookup(|key| {
            (key == env::BATCH_SIZE).then(|| "340282366920938463463374607431768211456".to_string())
        });
        assert!(matches!(result, Err(IngestError::ConfigError(_))));

        let negative = PipelineConfig::from_lookup(|key| {
            (key == env::BATCH_SIZE).then(|| "-1".to_string())
        });
        assert!(matches!(negative, Err(IngestError::ConfigError(_))));
    }

    #[test]
    fn test_validate() {
        let http = PipelineConfig::builder().stream_url("http://feed/changes").build();
        assert!(http.validate().is_err());

        let zero = PipelineConfig::builder().batch_size(0).build();
        assert!(zero.validate().is_err());

        let no_delay = PipelineConfig::builder()
            .reconnect_delay(Duration::ZERO)
            .build();
        assert!(no_delay.validate().is_err());

        let bad_queue = PipelineConfig::builder().queue_url("::").build();
        assert!(matches!(
            bad_queue.validate(),
            Err(IngestError::UrlParseError(_))
        ));
    }
}
