// IPv4 host intelligence: reverse DNS, geolocation, and an optional
// well-known-port sweep.
use std::net::Ipv4Addr;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::Analyzer;
use crate::engine::{RunContext, WorkerPool};
use crate::finding::{Finding, FindingData, FindingKind, FindingStatus, GeoInfo, HostPayload};

pub const WELL_KNOWN_PORTS: [u16; 14] = [
    21, 22, 23, 25, 53, 80, 110, 143, 443, 993, 995, 3389, 5900, 8080,
];

/// An independent geolocation service. Each provider speaks its own field
/// names, so it carries its own mapping into the common shape.
struct GeoProvider {
    name: &'static str,
    url_template: &'static str,
    map: fn(&Value) -> GeoInfo,
}

static GEO_PROVIDERS: &[GeoProvider] = &[
    GeoProvider {
        name: "ipapi.co",
        url_template: "https://ipapi.co/{}/json/",
        map: map_ipapi_co,
    },
    GeoProvider {
        name: "ip-api.com",
        url_template: "http://ip-api.com/json/{}",
        map: map_ip_api_com,
    },
];

fn opt_string(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn map_ipapi_co(value: &Value) -> GeoInfo {
    GeoInfo {
        country: opt_string(value, "country_name"),
        city: opt_string(value, "city"),
        region: opt_string(value, "region"),
        isp: opt_string(value, "org"),
        latitude: value.get("latitude").and_then(|v| v.as_f64()),
        longitude: value.get("longitude").and_then(|v| v.as_f64()),
        timezone: opt_string(value, "timezone"),
    }
}

fn map_ip_api_com(value: &Value) -> GeoInfo {
    GeoInfo {
        country: opt_string(value, "country"),
        city: opt_string(value, "city"),
        region: opt_string(value, "regionName"),
        isp: opt_string(value, "isp"),
        latitude: value.get("lat").and_then(|v| v.as_f64()),
        longitude: value.get("lon").and_then(|v| v.as_f64()),
        timezone: opt_string(value, "timezone"),
    }
}

pub struct HostAnalyzer;

impl HostAnalyzer {
    async fn geolocate(&self, ip: &str, cx: &RunContext) -> Option<GeoInfo> {
        for provider in GEO_PROVIDERS {
            if cx.state.is_cancelled() {
                return None;
            }

            let url = provider.url_template.replace("{}", ip);
            let outcome = cx.prober.http_get(&url, true).await;
            if outcome.status() != Some(200) {
                debug!("Geolocation via {} unavailable", provider.name);
                continue;
            }

            let body = outcome.str_field("body").unwrap_or_default();
            let Ok(parsed) = serde_json::from_str::<Value>(body) else {
                warn!("Geolocation response from {} was not JSON", provider.name);
                continue;
            };

            let geo = (provider.map)(&parsed);
            info!(
                "Location: {}, {}",
                geo.city.as_deref().unwrap_or("Unknown"),
                geo.country.as_deref().unwrap_or("Unknown")
            );
            return Some(geo);
        }

        warn!("All geolocation providers failed for {}", ip);
        None
    }

    async fn scan_ports(&self, ip: &str, cx: &RunContext) -> Vec<u16> {
        info!("Scanning {} common ports on {}", WELL_KNOWN_PORTS.len(), ip);

        let units = WELL_KNOWN_PORTS
            .iter()
            .map(|&port| {
                let prober = cx.prober.clone();
                let host = ip.to_string();
                WorkerPool::unit(async move { prober.tcp_connect(&host, port).await })
            })
            .collect();

        // Connects are cheap, so this batch runs wider than the default
        // fan-out.
        let outcomes =
            WorkerPool::run_batch(units, cx.config.port_scan_concurrency, cx.state.clone()).await;

        let mut open: Vec<u16> = outcomes
            .into_iter()
            .filter(|(_, outcome)| outcome.is_found())
            .map(|(index, _)| WELL_KNOWN_PORTS[index])
            .collect();
        open.sort_unstable();
        open.dedup();

        info!("Found {} open ports", open.len());
        open
    }
}

#[async_trait]
impl Analyzer for HostAnalyzer {
    fn source_label(&self) -> &'static str {
        "IP Analysis"
    }

    async fn analyze(&self, value: &str, cx: &RunContext) -> Finding {
        info!("Analyzing IP: {}", value);

        let Ok(ip) = value.parse::<Ipv4Addr>() else {
            warn!("Invalid IPv4 address: {}", value);
            return Finding::new(
                self.source_label(),
                FindingKind::IpInfo,
                FindingStatus::Failure,
                FindingData::Host(HostPayload {
                    ip: value.to_string(),
                    hostname: None,
                    geolocation: None,
                    open_ports: None,
                }),
            );
        };

        let reverse = cx.prober.reverse_dns(ip).await;
        let hostname = reverse.str_field("hostname").map(str::to_string);
        match &hostname {
            Some(name) => info!("Hostname: {}", name),
            None => debug!("Reverse DNS yielded nothing for {}", ip),
        }

        let geolocation = self.geolocate(value, cx).await;

        let open_ports = if cx.config.deep_scan && !cx.state.is_cancelled() {
            Some(self.scan_ports(value, cx).await)
        } else {
            None
        };

        let wanted = 2 + usize::from(cx.config.deep_scan);
        let got = usize::from(hostname.is_some())
            + usize::from(geolocation.is_some())
            + usize::from(open_ports.is_some());
        let status = if got == wanted {
            FindingStatus::Success
        } else if got > 0 {
            FindingStatus::PartialFailure
        } else {
            FindingStatus::Failure
        };

        Finding::new(
            self.source_label(),
            FindingKind::IpInfo,
            status,
            FindingData::Host(HostPayload {
                ip: value.to_string(),
                hostname,
                geolocation,
                open_ports,
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
    use crate::probe::ProbeOutcome;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn context(stub: StubProber, deep_scan: bool) -> RunContext {
        let mut config = Config::default();
        config.deep_scan = deep_scan;
        RunContext {
            prober: Arc::new(stub),
            config,
            state: Arc::new(RunState::new(1)),
            observer: Arc::new(NullObserver),
        }
    }

    fn http_json(status: u16, body: Value) -> ProbeOutcome {
        let mut payload = HashMap::new();
        payload.insert("status".to_string(), json!(status));
        payload.insert("body".to_string(), json!(body.to_string()));
        ProbeOutcome::found(payload)
    }

    #[tokio::test]
    async fn test_invalid_ip_fails_without_probing() {
        let stub = StubProber::default();
        let cx = context(stub, false);

        let finding = HostAnalyzer.analyze("not.an.ip.addr", &cx).await;

        assert_eq!(finding.status, FindingStatus::Failure);
        let FindingData::Host(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert!(payload.hostname.is_none());
        assert!(payload.geolocation.is_none());
        assert!(payload.open_ports.is_none());
    }

    #[tokio::test]
    async fn test_invalid_ip_makes_zero_network_calls() {
        let stub = Arc::new(StubProber::default());
        let cx = RunContext {
            prober: stub.clone(),
            config: Config::default(),
            state: Arc::new(RunState::new(1)),
            observer: Arc::new(NullObserver),
        };

        let _ = HostAnalyzer.analyze("999.1.2.3", &cx).await;
        assert_eq!(stub.call_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_fallback_uses_second_mapping() {
        let mut stub = StubProber::default();
        stub.on_reverse_dns = Some(Box::new(|_| {
            let mut payload = HashMap::new();
            payload.insert("hostname".to_string(), json!("dns.google"));
            ProbeOutcome::found(payload)
        }));
        stub.on_http = Some(Box::new(|url| {
            if url.contains("ipapi.co") {
                ProbeOutcome::error("rate limited")
            } else {
                http_json(
                    200,
                    json!({
                        "country": "United States",
                        "city": "Mountain View",
                        "regionName": "California",
                        "isp": "Google LLC",
                        "lat": 37.4056,
                        "lon": -122.0775,
                        "timezone": "America/Los_Angeles"
                    }),
                )
            }
        }));

        let cx = context(stub, false);
        let finding = HostAnalyzer.analyze("8.8.8.8", &cx).await;

        let FindingData::Host(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert_eq!(payload.hostname.as_deref(), Some("dns.google"));
        let geo = payload.geolocation.as_ref().unwrap();
        assert_eq!(geo.country.as_deref(), Some("United States"));
        assert_eq!(geo.region.as_deref(), Some("California"));
        assert_eq!(geo.latitude, Some(37.4056));
        assert_eq!(finding.status, FindingStatus::Success);
    }

    #[tokio::test]
    async fn test_open_ports_sorted_ascending_no_duplicates() {
        let mut stub = StubProber::default();
        stub.on_reverse_dns = Some(Box::new(|_| ProbeOutcome::not_found(HashMap::new())));
        stub.on_http = Some(Box::new(|_| ProbeOutcome::error("unreachable")));
        stub.on_tcp_connect = Some(Box::new(|_, port| {
            let mut payload = HashMap::new();
            let open = matches!(port, 8080 | 22 | 443 | 80);
            payload.insert("open".to_string(), json!(open));
            if open {
                ProbeOutcome::found(payload)
            } else {
                ProbeOutcome::not_found(payload)
            }
        }));

        let cx = context(stub, true);
        let finding = HostAnalyzer.analyze("192.0.2.10", &cx).await;

        let FindingData::Host(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        let ports = payload.open_ports.as_ref().unwrap();
        assert_eq!(ports, &vec![22, 80, 443, 8080]);
        assert!(ports.windows(2).all(|w| w[0] < w[1]));
        // Hostname and geolocation failed, ports succeeded.
        assert_eq!(finding.status, FindingStatus::PartialFailure);
    }
}
