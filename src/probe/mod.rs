pub mod net;

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Classification of a completed probe. `NotFound` means the operation
/// completed and determined absence (HTTP 404, empty DNS answer), which is
/// distinct from `Error` (the operation itself failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Found,
    NotFound,
    Error,
}

/// Result of one bounded network operation. Probes never raise across this
/// boundary; every failure mode is captured as `classification = Error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub succeeded: bool,
    pub classification: Classification,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
    pub error_detail: Option<String>,
}

impl ProbeOutcome {
    pub fn found(payload: HashMap<String, Value>) -> Self {
        Self {
            succeeded: true,
            classification: Classification::Found,
            payload,
            error_detail: None,
        }
    }

    pub fn not_found(payload: HashMap<String, Value>) -> Self {
        Self {
            succeeded: true,
            classification: Classification::NotFound,
            payload,
            error_detail: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            classification: Classification::Error,
            payload: HashMap::new(),
            error_detail: Some(detail.into()),
        }
    }

    /// A unit the worker pool never started because cancellation was
    /// requested before it ran.
    pub fn skipped() -> Self {
        Self {
            succeeded: false,
            classification: Classification::Error,
            payload: HashMap::new(),
            error_detail: Some("not attempted: cancellation requested".to_string()),
        }
    }

    pub fn is_found(&self) -> bool {
        self.classification == Classification::Found
    }

    pub fn status(&self) -> Option<u16> {
        self.payload
            .get("status")
            .and_then(|v| v.as_u64())
            .map(|s| s as u16)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    pub fn string_list(&self, key: &str) -> Vec<String> {
        self.payload
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// DNS answer strings, empty on failure or absence.
    pub fn records(&self) -> Vec<String> {
        self.string_list("records")
    }

    pub fn headers(&self) -> HashMap<String, String> {
        self.payload
            .get("headers")
            .and_then(|v| v.as_object())
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// DNS record types the domain analyzer walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordType {
    A,
    Aaaa,
    Mx,
    Ns,
    Txt,
    Cname,
    Soa,
}

pub const DNS_RECORD_TYPES: [RecordType; 7] = [
    RecordType::A,
    RecordType::Aaaa,
    RecordType::Mx,
    RecordType::Ns,
    RecordType::Txt,
    RecordType::Cname,
    RecordType::Soa,
];

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RecordType::A => "A",
            RecordType::Aaaa => "AAAA",
            RecordType::Mx => "MX",
            RecordType::Ns => "NS",
            RecordType::Txt => "TXT",
            RecordType::Cname => "CNAME",
            RecordType::Soa => "SOA",
        };
        write!(f, "{}", s)
    }
}

/// Seam for all outbound network operations. Each call issues exactly one
/// operation, bounded by its own timeout, and never returns an error: all
/// failures are classified into the returned outcome.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Prober: Send + Sync {
    /// HTTP GET with TLS verification disabled. Payload on success:
    /// `status`, `headers`, `body`.
    async fn http_get(&self, url: &str, follow_redirects: bool) -> ProbeOutcome;

    /// DNS resolution. Payload: `records` (display strings per record type,
    /// MX as `"<preference> <exchange>"`). Empty answers are `NotFound`.
    async fn resolve(&self, name: &str, record_type: RecordType) -> ProbeOutcome;

    /// Reverse DNS. Payload: `hostname`.
    async fn reverse_dns(&self, ip: Ipv4Addr) -> ProbeOutcome;

    /// WHOIS over TCP port 43. Payload: `registrar`, `created`, `expires`,
    /// `updated`, `name_servers`, `emails`; any field may be absent.
    async fn whois(&self, domain: &str) -> ProbeOutcome;

    /// TCP connect bounded at 2 seconds. `Found` when the port accepts.
    async fn tcp_connect(&self, host: &str, port: u16) -> ProbeOutcome;
}
