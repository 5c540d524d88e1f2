// Network-backed prober: HTTP via reqwest, DNS via hickory, WHOIS and port
// checks over raw TCP. TLS verification is disabled on purpose: OSINT
// targets routinely present self-signed or misconfigured certificates.
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{ProbeOutcome, Prober, RecordType};

const WHOIS_ROOT: &str = "whois.iana.org";
const WHOIS_PORT: u16 = 43;
const PORT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct NetProber {
    client: reqwest::Client,
    client_no_redirect: reqwest::Client,
    resolver: TokioAsyncResolver,
    timeout: Duration,
}

impl NetProber {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let builder = || {
            reqwest::Client::builder()
                .timeout(timeout)
                .user_agent(user_agent)
                .danger_accept_invalid_certs(true)
        };

        let client = builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to create HTTP client")?;

        let client_no_redirect = builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to create HTTP client")?;

        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        let resolver = TokioAsyncResolver::tokio(ResolverConfig::default(), opts);

        Ok(Self {
            client,
            client_no_redirect,
            resolver,
            timeout,
        })
    }

    async fn whois_query(&self, server: &str, query: &str) -> Result<String> {
        let addr = format!("{}:{}", server, WHOIS_PORT);
        let fut = async {
            let mut stream = TcpStream::connect(&addr).await?;
            stream.write_all(format!("{}\r\n", query).as_bytes()).await?;
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await?;
            Ok::<_, std::io::Error>(String::from_utf8_lossy(&response).into_owned())
        };

        tokio::time::timeout(self.timeout, fut)
            .await
            .context(format!("WHOIS query to {} timed out", server))?
            .context(format!("WHOIS query to {} failed", server))
    }
}

#[async_trait]
impl Prober for NetProber {
    async fn http_get(&self, url: &str, follow_redirects: bool) -> ProbeOutcome {
        debug!("GET {}", url);

        let client = if follow_redirects {
            &self.client
        } else {
            &self.client_no_redirect
        };

        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ProbeOutcome::error(format!("GET {} failed: {}", url, e)),
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.to_string(),
                    String::from_utf8_lossy(v.as_bytes()).into_owned(),
                )
            })
            .collect();

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ProbeOutcome::error(format!("Reading body of {} failed: {}", url, e)),
        };

        let mut payload = HashMap::new();
        payload.insert("status".to_string(), json!(status));
        payload.insert("headers".to_string(), json!(headers));
        payload.insert("body".to_string(), Value::String(body));

        if status == 404 {
            ProbeOutcome::not_found(payload)
        } else {
            ProbeOutcome::found(payload)
        }
    }

    async fn resolve(&self, name: &str, record_type: RecordType) -> ProbeOutcome {
        debug!("resolve {} {}", name, record_type);

        let rt = match record_type {
            RecordType::A => hickory_resolver::proto::rr::RecordType::A,
            RecordType::Aaaa => hickory_resolver::proto::rr::RecordType::AAAA,
            RecordType::Mx => hickory_resolver::proto::rr::RecordType::MX,
            RecordType::Ns => hickory_resolver::proto::rr::RecordType::NS,
            RecordType::Txt => hickory_resolver::proto::rr::RecordType::TXT,
            RecordType::Cname => hickory_resolver::proto::rr::RecordType::CNAME,
            RecordType::Soa => hickory_resolver::proto::rr::RecordType::SOA,
        };

        match self.resolver.lookup(name, rt).await {
            Ok(lookup) => {
                let records: Vec<String> = lookup.iter().map(|rdata| rdata.to_string()).collect();
                let mut payload = HashMap::new();
                payload.insert("records".to_string(), json!(records));
                if records.is_empty() {
                    ProbeOutcome::not_found(payload)
                } else {
                    ProbeOutcome::found(payload)
                }
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => {
                    let mut payload = HashMap::new();
                    payload.insert("records".to_string(), json!([] as [String; 0]));
                    ProbeOutcome::not_found(payload)
                }
                _ => ProbeOutcome::error(format!("DNS lookup {} {} failed: {}", name, record_type, e)),
            },
        }
    }

    async fn reverse_dns(&self, ip: Ipv4Addr) -> ProbeOutcome {
        debug!("reverse lookup {}", ip);

        match self.resolver.reverse_lookup(IpAddr::V4(ip)).await {
            Ok(lookup) => match lookup.iter().next() {
                Some(name) => {
                    let hostname = name.to_string().trim_end_matches('.').to_string();
                    let mut payload = HashMap::new();
                    payload.insert("hostname".to_string(), Value::String(hostname));
                    ProbeOutcome::found(payload)
                }
                None => ProbeOutcome::not_found(HashMap::new()),
            },
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => ProbeOutcome::not_found(HashMap::new()),
                _ => ProbeOutcome::error(format!("Reverse DNS for {} failed: {}", ip, e)),
            },
        }
    }

    async fn whois(&self, domain: &str) -> ProbeOutcome {
        debug!("whois {}", domain);

        // IANA tells us the registry server for the TLD; one referral hop.
        let root = match self.whois_query(WHOIS_ROOT, domain).await {
            Ok(r) => r,
            Err(e) => return ProbeOutcome::error(e.to_string()),
        };

        let response = match referral_server(&root) {
            Some(server) => match self.whois_query(&server, domain).await {
                Ok(r) => r,
                Err(e) => return ProbeOutcome::error(e.to_string()),
            },
            None => root,
        };

        let payload = parse_whois(&response);
        if payload.is_empty() {
            ProbeOutcome::not_found(HashMap::new())
        } else {
            ProbeOutcome::found(payload)
        }
    }

    async fn tcp_connect(&self, host: &str, port: u16) -> ProbeOutcome {
        let addr = format!("{}:{}", host, port);

        match tokio::time::timeout(PORT_CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(Ok(_stream)) => {
                let mut payload = HashMap::new();
                payload.insert("open".to_string(), Value::Bool(true));
                ProbeOutcome::found(payload)
            }
            Ok(Err(_)) | Err(_) => {
                let mut payload = HashMap::new();
                payload.insert("open".to_string(), Value::Bool(false));
                ProbeOutcome::not_found(payload)
            }
        }
    }
}

fn referral_server(response: &str) -> Option<String> {
    response.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim().eq_ignore_ascii_case("refer") {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

static WHOIS_EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());

/// Pull the common registry fields out of a raw WHOIS response. Registries
/// disagree on key names, so each field matches a small set of variants.
fn parse_whois(response: &str) -> HashMap<String, Value> {
    let mut fields: HashMap<&str, String> = HashMap::new();
    let mut name_servers: Vec<String> = Vec::new();

    for line in response.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }

        match key.as_str() {
            "registrar" => {
                fields.entry("registrar").or_insert_with(|| value.to_string());
            }
            "creation date" | "created" | "registered on" => {
                fields.entry("created").or_insert_with(|| value.to_string());
            }
            "registry expiry date" | "expiration date" | "expiry date" | "paid-till" => {
                fields.entry("expires").or_insert_with(|| value.to_string());
            }
            "updated date" | "last-updated" | "changed" => {
                fields.entry("updated").or_insert_with(|| value.to_string());
            }
            "name server" | "nserver" => {
                let ns = value.to_lowercase();
                if !name_servers.contains(&ns) {
                    name_servers.push(ns);
                }
            }
            _ => {}
        }
    }

    let mut emails: Vec<String> = Vec::new();
    for m in WHOIS_EMAIL_RE.find_iter(response) {
        let email = m.as_str().to_lowercase();
        if !emails.contains(&email) {
            emails.push(email);
        }
    }

    let mut payload = HashMap::new();
    for (key, value) in fields {
        payload.insert(key.to_string(), Value::String(value));
    }
    if !name_servers.is_empty() {
        payload.insert("name_servers".to_string(), json!(name_servers));
    }
    if !emails.is_empty() {
        payload.insert("emails".to_string(), json!(emails));
    }
    payload
}
