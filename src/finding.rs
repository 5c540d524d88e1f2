use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::target::TargetKind;

/// Category tag of a finding, derived from the target kind. Selects the
/// active `FindingData` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    SocialMedia,
    DomainInfo,
    IpInfo,
    EmailInfo,
}

impl From<TargetKind> for FindingKind {
    fn from(kind: TargetKind) -> Self {
        match kind {
            TargetKind::Username => FindingKind::SocialMedia,
            TargetKind::Domain => FindingKind::DomainInfo,
            TargetKind::Host => FindingKind::IpInfo,
            TargetKind::Email => FindingKind::EmailInfo,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Success,
    PartialFailure,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlatformHit {
    pub platform: String,
    pub url: String,
    pub status_code: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsernamePayload {
    pub username: String,
    pub platforms_checked: usize,
    pub platforms_found: Vec<PlatformHit>,
    /// found / catalog size, in [0, 1].
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WhoisInfo {
    pub registrar: Option<String>,
    pub created: Option<String>,
    pub expires: Option<String>,
    pub updated: Option<String>,
    #[serde(default)]
    pub name_servers: Vec<String>,
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Technology {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpInfo {
    pub protocol: String,
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub detected_technologies: Vec<Technology>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainPayload {
    pub domain: String,
    /// One entry per queried record type; empty list when resolution
    /// failed or answered nothing.
    pub dns_records: BTreeMap<String, Vec<String>>,
    pub whois: Option<WhoisInfo>,
    pub http_info: Option<HttpInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoInfo {
    pub country: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub isp: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostPayload {
    pub ip: String,
    pub hostname: Option<String>,
    pub geolocation: Option<GeoInfo>,
    /// Sorted ascending, no duplicates. Only present after a deep scan.
    pub open_ports: Option<Vec<u16>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MxRecord {
    pub preference: u16,
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub email: String,
    pub domain: String,
    pub mx_records: Vec<MxRecord>,
    pub spf_records: Vec<String>,
    pub dmarc_records: Vec<String>,
}

/// Per-kind payload. The shape is fully determined by the finding kind;
/// variants never mix. Untagged works because each variant carries a
/// required field the others lack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FindingData {
    Username(UsernamePayload),
    Email(EmailPayload),
    Host(HostPayload),
    Domain(DomainPayload),
}

/// One immutable entry per processed target. Appended exactly once, even
/// when every probe behind it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub source: String,
    #[serde(rename = "data_type")]
    pub kind: FindingKind,
    pub timestamp: DateTime<Utc>,
    pub status: FindingStatus,
    pub data: FindingData,
}

impl Finding {
    pub fn new(
        source: impl Into<String>,
        kind: FindingKind,
        status: FindingStatus,
        data: FindingData,
    ) -> Self {
        Self {
            source: source.into(),
            kind,
            timestamp: Utc::now(),
            status,
            data,
        }
    }
}

/// Append-only, ordered collection of findings for one run. Ordering
/// reflects target submission order, never probe completion order.
#[derive(Default)]
pub struct ResultStore {
    findings: RwLock<Vec<Finding>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, finding: Finding) {
        self.findings.write().push(finding);
    }

    pub fn len(&self) -> usize {
        self.findings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.read().is_empty()
    }

    /// Consistent copy of the findings collected so far. Safe to call
    /// mid-run for a partial view.
    pub fn snapshot(&self) -> Vec<Finding> {
        self.findings.read().clone()
    }

    pub fn clear(&self) {
        self.findings.write().clear();
    }
}
