// Email security posture: MX presence plus SPF/DMARC policy records.
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use super::Analyzer;
use crate::engine::RunContext;
use crate::finding::{EmailPayload, Finding, FindingData, FindingKind, FindingStatus, MxRecord};
use crate::probe::RecordType;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").unwrap());

const SPF_MARKER: &str = "v=spf1";
const DMARC_MARKER: &str = "v=DMARC1";

pub struct EmailAnalyzer;

impl EmailAnalyzer {
    /// MX answers arrive as `"<preference> <exchange>"` display strings.
    fn parse_mx(records: &[String]) -> Vec<MxRecord> {
        records
            .iter()
            .filter_map(|record| {
                let (preference, exchange) = record.split_once(' ')?;
                Some(MxRecord {
                    preference: preference.parse().ok()?,
                    exchange: exchange.trim().to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl Analyzer for EmailAnalyzer {
    fn source_label(&self) -> &'static str {
        "Email Analysis"
    }

    async fn analyze(&self, value: &str, cx: &RunContext) -> Finding {
        info!("Analyzing email: {}", value);

        if !EMAIL_RE.is_match(value) {
            warn!("Invalid email format: {}", value);
            return Finding::new(
                self.source_label(),
                FindingKind::EmailInfo,
                FindingStatus::Failure,
                FindingData::Email(EmailPayload {
                    email: value.to_string(),
                    domain: String::new(),
                    mx_records: Vec::new(),
                    spf_records: Vec::new(),
                    dmarc_records: Vec::new(),
                }),
            );
        }

        // The regex guarantees exactly the shape local@domain.
        let domain = value.split('@').nth(1).unwrap_or_default().to_string();

        let mx_outcome = cx.prober.resolve(&domain, RecordType::Mx).await;
        let mx_records = Self::parse_mx(&mx_outcome.records());
        info!("Found {} MX records", mx_records.len());

        // A failed TXT lookup means absence here, not an error: domains
        // without SPF/DMARC are a legitimate (and interesting) answer.
        let mut spf_records = Vec::new();
        let mut dmarc_records = Vec::new();
        for record in cx.prober.resolve(&domain, RecordType::Txt).await.records() {
            if record.contains(SPF_MARKER) {
                spf_records.push(record);
            } else if record.contains(DMARC_MARKER) {
                dmarc_records.push(record);
            }
        }

        let dmarc_name = format!("_dmarc.{}", domain);
        for record in cx
            .prober
            .resolve(&dmarc_name, RecordType::Txt)
            .await
            .records()
        {
            dmarc_records.push(record);
        }

        debug!(
            "SPF records: {}, DMARC records: {}",
            spf_records.len(),
            dmarc_records.len()
        );

        Finding::new(
            self.source_label(),
            FindingKind::EmailInfo,
            FindingStatus::Success,
            FindingData::Email(EmailPayload {
                email: value.to_string(),
                domain,
                mx_records,
                spf_records,
                dmarc_records,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::run::NullObserver;
    use crate::engine::{RunContext, RunState};
    use crate::probe::testing::StubProber;
    use crate::probe::{MockProber, ProbeOutcome};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn context(prober: Arc<dyn crate::probe::Prober>) -> RunContext {
        RunContext {
            prober,
            config: Config::default(),
            state: Arc::new(RunState::new(1)),
            observer: Arc::new(NullObserver),
        }
    }

    fn records(values: &[&str]) -> ProbeOutcome {
        let mut payload = HashMap::new();
        payload.insert("records".to_string(), json!(values));
        if values.is_empty() {
            ProbeOutcome::not_found(payload)
        } else {
            ProbeOutcome::found(payload)
        }
    }

    #[tokio::test]
    async fn test_malformed_email_issues_no_probes() {
        // An unconfigured mock panics on any call, proving zero network
        // operations happen for a malformed address.
        let mock = MockProber::new();
        let cx = context(Arc::new(mock));

        let finding = EmailAnalyzer.analyze("missing-at-sign.com", &cx).await;

        assert_eq!(finding.status, FindingStatus::Failure);
        let FindingData::Email(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert!(payload.domain.is_empty());
        assert!(payload.mx_records.is_empty());
    }

    #[tokio::test]
    async fn test_classifies_spf_and_merges_dmarc_subdomain() {
        let mut stub = StubProber::default();
        stub.on_resolve = Some(Box::new(|name, rt| match (name, rt) {
            ("example.com", RecordType::Mx) => {
                records(&["10 mail.example.com.", "20 backup.example.com."])
            }
            ("example.com", RecordType::Txt) => records(&[
                "v=spf1 include:_spf.example.com ~all",
                "google-site-verification=abc123",
            ]),
            ("_dmarc.example.com", RecordType::Txt) => {
                records(&["v=DMARC1; p=reject; rua=mailto:dmarc@example.com"])
            }
            _ => records(&[]),
        }));

        let cx = context(Arc::new(stub));
        let finding = EmailAnalyzer.analyze("user@example.com", &cx).await;

        let FindingData::Email(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert_eq!(payload.domain, "example.com");
        assert_eq!(payload.mx_records.len(), 2);
        assert_eq!(payload.mx_records[0].preference, 10);
        assert_eq!(payload.mx_records[0].exchange, "mail.example.com.");
        assert_eq!(payload.spf_records.len(), 1);
        assert_eq!(payload.dmarc_records.len(), 1);
        assert!(payload.dmarc_records[0].contains("p=reject"));
        assert_eq!(finding.status, FindingStatus::Success);
    }

    #[tokio::test]
    async fn test_absent_records_are_not_an_error() {
        let mut stub = StubProber::default();
        stub.on_resolve = Some(Box::new(|_, _| ProbeOutcome::error("no nameservers")));

        let cx = context(Arc::new(stub));
        let finding = EmailAnalyzer.analyze("user@nomx.example", &cx).await;

        let FindingData::Email(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert!(payload.mx_records.is_empty());
        assert!(payload.spf_records.is_empty());
        assert!(payload.dmarc_records.is_empty());
        assert_eq!(finding.status, FindingStatus::Success);
    }
}
