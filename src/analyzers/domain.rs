// Domain intelligence: DNS walk, WHOIS, and web technology detection. The
// steps are heterogeneous and individually cheap, so this pipeline runs
// sequentially with cancellation checks between DNS record types.
use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Analyzer;
use crate::engine::RunContext;
use crate::finding::{
    DomainPayload, Finding, FindingData, FindingKind, FindingStatus, HttpInfo, Technology,
    WhoisInfo,
};
use crate::probe::{ProbeOutcome, DNS_RECORD_TYPES};

/// Best-effort CMS fingerprints: any substring match in the lower-cased
/// body adds one entry.
static CMS_SIGNATURES: &[(&str, &[&str])] = &[
    ("Wordpress", &["wp-content", "wp-includes"]),
    ("Drupal", &["drupal", "sites/default"]),
    ("Joomla", &["joomla", "administrator"]),
    ("Magento", &["magento", "mage/"]),
];

pub struct DomainAnalyzer;

impl DomainAnalyzer {
    fn whois_info(outcome: &ProbeOutcome) -> Option<WhoisInfo> {
        if !outcome.is_found() {
            if let Some(detail) = &outcome.error_detail {
                warn!("WHOIS lookup failed: {}", detail);
            }
            return None;
        }

        Some(WhoisInfo {
            registrar: outcome.str_field("registrar").map(str::to_string),
            created: outcome.str_field("created").map(str::to_string),
            expires: outcome.str_field("expires").map(str::to_string),
            updated: outcome.str_field("updated").map(str::to_string),
            name_servers: outcome.string_list("name_servers"),
            emails: outcome.string_list("emails"),
        })
    }

    fn detect_technologies(
        headers: &std::collections::HashMap<String, String>,
        body: &str,
    ) -> Vec<Technology> {
        let mut technologies = Vec::new();

        if let Some(server) = header_value(headers, "server") {
            technologies.push(Technology {
                kind: "Server".to_string(),
                name: server.to_string(),
            });
        }

        if let Some(powered_by) = header_value(headers, "x-powered-by") {
            technologies.push(Technology {
                kind: "Framework".to_string(),
                name: powered_by.to_string(),
            });
        }

        let body_lower = body.to_lowercase();
        for (cms, signatures) in CMS_SIGNATURES {
            if signatures.iter().any(|sig| body_lower.contains(sig)) {
                technologies.push(Technology {
                    kind: "CMS".to_string(),
                    name: cms.to_string(),
                });
            }
        }

        technologies
    }

    async fn http_info(&self, domain: &str, cx: &RunContext) -> Option<HttpInfo> {
        // HTTPS first, plain HTTP as the fallback.
        for protocol in ["https", "http"] {
            if cx.state.is_cancelled() {
                return None;
            }

            let url = format!("{}://{}", protocol, domain);
            let outcome = cx.prober.http_get(&url, true).await;
            if outcome.error_detail.is_some() {
                debug!("Web request to {} failed, trying next protocol", url);
                continue;
            }
            let Some(status) = outcome.status() else {
                continue;
            };

            let headers = outcome.headers();
            let body = outcome.str_field("body").unwrap_or_default();
            let detected_technologies = Self::detect_technologies(&headers, body);

            info!("Web analysis completed ({})", protocol.to_uppercase());
            return Some(HttpInfo {
                protocol: protocol.to_string(),
                status_code: status,
                headers,
                detected_technologies,
            });
        }

        warn!("Web analysis failed for {} on both protocols", domain);
        None
    }
}

#[async_trait]
impl Analyzer for DomainAnalyzer {
    fn source_label(&self) -> &'static str {
        "Domain Analysis"
    }

    async fn analyze(&self, value: &str, cx: &RunContext) -> Finding {
        info!("Analyzing domain: {}", value);

        let mut dns_records: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut cancelled = false;

        for record_type in DNS_RECORD_TYPES {
            if cx.state.is_cancelled() {
                cancelled = true;
                break;
            }

            // Absence and resolution errors both yield an empty list; the
            // pipeline never aborts on a single record type.
            let outcome = cx.prober.resolve(value, record_type).await;
            let records = outcome.records();
            debug!("{}: {} records", record_type, records.len());
            dns_records.insert(record_type.to_string(), records);
        }

        let whois = if cancelled {
            None
        } else {
            Self::whois_info(&cx.prober.whois(value).await)
        };

        let http_info = if cancelled {
            None
        } else {
            self.http_info(value, cx).await
        };

        let has_dns = dns_records.values().any(|records| !records.is_empty());
        let status = if cancelled || cx.state.is_cancelled() {
            FindingStatus::PartialFailure
        } else if whois.is_some() && http_info.is_some() {
            FindingStatus::Success
        } else if has_dns || whois.is_some() || http_info.is_some() {
            FindingStatus::PartialFailure
        } else {
            FindingStatus::Failure
        };

        Finding::new(
            self.source_label(),
            FindingKind::DomainInfo,
            status,
            FindingData::Domain(DomainPayload {
                domain: value.to_string(),
                dns_records,
                whois,
                http_info,
            }),
        )
    }
}

fn header_value<'a>(
    headers: &'a std::collections::HashMap<String, String>,
    name: &str,
) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::run::NullObserver;
    use crate::engine::{RunContext, RunState};
    use crate::probe::testing::StubProber;
    use crate::probe::RecordType;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn context(stub: StubProber) -> RunContext {
        RunContext {
            prober: Arc::new(stub),
            config: Config::default(),
            state: Arc::new(RunState::new(1)),
            observer: Arc::new(NullObserver),
        }
    }

    #[tokio::test]
    async fn test_all_dns_failures_yield_empty_lists() {
        let mut stub = StubProber::default();
        stub.on_resolve = Some(Box::new(|_, _| ProbeOutcome::error("server failure")));
        stub.on_whois = Some(Box::new(|_| ProbeOutcome::error("timed out")));
        stub.on_http = Some(Box::new(|_| ProbeOutcome::error("connection refused")));

        let cx = context(stub);
        let finding = DomainAnalyzer.analyze("example.com", &cx).await;

        let FindingData::Domain(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert_eq!(payload.dns_records.len(), 7);
        for (record_type, records) in &payload.dns_records {
            assert!(records.is_empty(), "{} should be empty", record_type);
        }
        assert!(payload.whois.is_none());
        assert!(payload.http_info.is_none());
        // Degraded, but recorded; never a fatal.
        assert_eq!(finding.status, FindingStatus::Failure);
    }

    #[tokio::test]
    async fn test_https_falls_back_to_http() {
        let mut stub = StubProber::default();
        stub.on_resolve = Some(Box::new(|_, rt| {
            let records = if rt == RecordType::A {
                vec!["192.0.2.1".to_string()]
            } else {
                Vec::new()
            };
            let mut payload = HashMap::new();
            payload.insert("records".to_string(), json!(records));
            ProbeOutcome::found(payload)
        }));
        stub.on_whois = Some(Box::new(|_| {
            let mut payload = HashMap::new();
            payload.insert("registrar".to_string(), json!("Example Registrar"));
            ProbeOutcome::found(payload)
        }));
        stub.on_http = Some(Box::new(|url| {
            if url.starts_with("https://") {
                ProbeOutcome::error("TLS handshake failed")
            } else {
                let mut payload = HashMap::new();
                payload.insert("status".to_string(), json!(200));
                payload.insert(
                    "headers".to_string(),
                    json!({"Server": "nginx/1.18.0", "X-Powered-By": "PHP/8.1"}),
                );
                payload.insert(
                    "body".to_string(),
                    json!("<link href='/wp-content/theme.css'>"),
                );
                ProbeOutcome::found(payload)
            }
        }));

        let cx = context(stub);
        let finding = DomainAnalyzer.analyze("example.com", &cx).await;

        let FindingData::Domain(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        let http = payload.http_info.as_ref().unwrap();
        assert_eq!(http.protocol, "http");
        assert_eq!(http.status_code, 200);

        let names: Vec<&str> = http
            .detected_technologies
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert!(names.contains(&"nginx/1.18.0"));
        assert!(names.contains(&"PHP/8.1"));
        assert!(names.contains(&"Wordpress"));

        assert_eq!(payload.dns_records["A"], vec!["192.0.2.1"]);
        assert_eq!(finding.status, FindingStatus::Success);
    }

    #[tokio::test]
    async fn test_missing_whois_degrades_to_partial() {
        let mut stub = StubProber::default();
        stub.on_resolve = Some(Box::new(|_, _| {
            let mut payload = HashMap::new();
            payload.insert("records".to_string(), json!(["192.0.2.1"]));
            ProbeOutcome::found(payload)
        }));
        stub.on_whois = Some(Box::new(|_| ProbeOutcome::not_found(HashMap::new())));
        stub.on_http = Some(Box::new(|_| ProbeOutcome::error("refused")));

        let cx = context(stub);
        let finding = DomainAnalyzer.analyze("example.com", &cx).await;

        assert_eq!(finding.status, FindingStatus::PartialFailure);
    }

    #[tokio::test]
    async fn test_cancelled_mid_sequence_keeps_partial_data() {
        let state = Arc::new(RunState::new(1));
        let cancel_after = state.clone();

        let mut stub = StubProber::default();
        stub.on_resolve = Some(Box::new(move |_, rt| {
            // Cancel while the record walk is underway.
            if rt == RecordType::Mx {
                cancel_after.request_cancel();
            }
            let mut payload = HashMap::new();
            payload.insert("records".to_string(), json!(["value"]));
            ProbeOutcome::found(payload)
        }));

        let cx = RunContext {
            prober: Arc::new(stub),
            config: Config::default(),
            state,
            observer: Arc::new(NullObserver),
        };
        let finding = DomainAnalyzer.analyze("example.com", &cx).await;

        let FindingData::Domain(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        // A, AAAA and MX ran before the flag was observed.
        assert_eq!(payload.dns_records.len(), 3);
        assert!(payload.whois.is_none());
        assert!(payload.http_info.is_none());
        assert_eq!(finding.status, FindingStatus::PartialFailure);
    }
}
