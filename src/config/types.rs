use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Hard ceiling on concurrent page fetches, whatever the configured value.
pub const MAX_CONCURRENCY: usize = 8;

/// Upper bound for the per-call timeout derived from the poll interval.
pub const MAX_DERIVED_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub account_id: String,
    /// Static headers attached to every request (credentials are supplied here).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// HTTP/S proxy as `host:port`, without scheme.
    #[serde(default)]
    pub proxy: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_retry_interval", with = "humantime_serde")]
    pub retry_interval: Duration,
    /// Overrides the timeout derived from the poll interval.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_interval() -> Duration {
    Duration::from_secs(1)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(default = "default_collection_delay", with = "humantime_serde")]
    pub collection_delay: Duration,
    #[serde(default = "default_span_duration", with = "humantime_serde")]
    pub span_duration: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            concurrency: default_concurrency(),
            poll_interval: default_poll_interval(),
            collection_delay: default_collection_delay(),
            span_duration: default_span_duration(),
        }
    }
}

fn default_page_size() -> u32 {
    5000
}

fn default_concurrency() -> usize {
    1
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_collection_delay() -> Duration {
    Duration::from_secs(180)
}

fn default_span_duration() -> Duration {
    Duration::from_secs(27 * 60)
}

impl FetchConfig {
    /// Concurrency actually used by the worker pool.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl ApiConfig {
    /// Per-call timeout: explicit value, or twice the poll interval capped at five minutes.
    pub fn call_timeout(&self, poll_interval: Duration) -> Duration {
        self.request_timeout
            .unwrap_or_else(|| std::cmp::min(poll_interval * 2, MAX_DERIVED_TIMEOUT))
    }
}

/// Kind of security event to retrieve. Each maps to one fixed report endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Threat,
    Aup,
    Dns,
    Proxy,
    Netcon,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::Threat,
        EventType::Aup,
        EventType::Dns,
        EventType::Proxy,
        EventType::Netcon,
    ];

    pub fn endpoint_suffix(self) -> &'static str {
        match self {
            EventType::Threat => "threat-events/details",
            EventType::Aup => "aup-events/details",
            EventType::Dns => "dns-activities/details",
            EventType::Proxy => "proxy-traffic/transactions",
            EventType::Netcon => "network-traffic/connections",
        }
    }

    /// Report path for this event type under the given account.
    pub fn report_path(self, account_id: &str) -> String {
        format!(
            "/etp-report/v3/configs/{}/{}",
            account_id,
            self.endpoint_suffix()
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventType::Threat => "threat",
            EventType::Aup => "aup",
            EventType::Dns => "dns",
            EventType::Proxy => "proxy",
            EventType::Netcon => "netcon",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_paths_are_distinct() {
        let mut paths: Vec<String> = EventType::ALL
            .iter()
            .map(|t| t.report_path("1234"))
            .collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), EventType::ALL.len());
        assert_eq!(
            EventType::Dns.report_path("1234"),
            "/etp-report/v3/configs/1234/dns-activities/details"
        );
    }

    #[test]
    fn test_effective_concurrency_is_clamped() {
        let mut fetch = FetchConfig::default();
        assert_eq!(fetch.effective_concurrency(), 1);

        fetch.concurrency = 0;
        assert_eq!(fetch.effective_concurrency(), 1);

        fetch.concurrency = 64;
        assert_eq!(fetch.effective_concurrency(), MAX_CONCURRENCY);
    }

    #[test]
    fn test_call_timeout_derived_from_poll_interval() {
        let api = ApiConfig {
            base_url: "https://api.example.net".to_string(),
            account_id: "1".to_string(),
            headers: BTreeMap::new(),
            proxy: None,
            max_retries: 3,
            retry_interval: Duration::from_secs(1),
            request_timeout: None,
        };

        assert_eq!(api.call_timeout(Duration::from_secs(60)), Duration::from_secs(120));
        assert_eq!(api.call_timeout(Duration::from_secs(600)), MAX_DERIVED_TIMEOUT);

        let api = ApiConfig {
            request_timeout: Some(Duration::from_secs(15)),
            ..api
        };
        assert_eq!(api.call_timeout(Duration::from_secs(60)), Duration::from_secs(15));
    }

    #[test]
    fn test_event_type_deserializes_lowercase() {
        let parsed: EventType = serde_yaml::from_str("netcon").unwrap();
        assert_eq!(parsed, EventType::Netcon);
        assert!(serde_yaml::from_str::<EventType>("firewall").is_err());
    }
}
