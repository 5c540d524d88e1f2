// Social-platform presence checks, fanned out through the worker pool.
use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::Analyzer;
use crate::engine::{RunContext, WorkerPool};
use crate::finding::{Finding, FindingData, FindingKind, FindingStatus, PlatformHit, UsernamePayload};
use crate::probe::ProbeOutcome;

/// One social platform to check. The negative markers are body substrings
/// that mean "no such profile" even though the platform answered 200 with an
/// embedded error page; keeping them declarative means adding a platform
/// never touches control flow.
pub struct PlatformDescriptor {
    pub key: &'static str,
    pub name: &'static str,
    pub url_template: &'static str,
    pub icon: &'static str,
    pub negative_markers: &'static [&'static str],
}

pub static PLATFORM_CATALOG: &[PlatformDescriptor] = &[
    PlatformDescriptor {
        key: "github",
        name: "GitHub",
        url_template: "https://github.com/{}",
        icon: "\u{1F468}\u{200D}\u{1F4BB}",
        negative_markers: &["not found"],
    },
    PlatformDescriptor {
        key: "twitter",
        name: "Twitter/X",
        url_template: "https://twitter.com/{}",
        icon: "\u{1F426}",
        negative_markers: &["suspended"],
    },
    PlatformDescriptor {
        key: "instagram",
        name: "Instagram",
        url_template: "https://instagram.com/{}",
        icon: "\u{1F4F7}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "linkedin",
        name: "LinkedIn",
        url_template: "https://linkedin.com/in/{}",
        icon: "\u{1F4BC}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "reddit",
        name: "Reddit",
        url_template: "https://reddit.com/user/{}",
        icon: "\u{1F916}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "pinterest",
        name: "Pinterest",
        url_template: "https://pinterest.com/{}",
        icon: "\u{1F4CC}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "youtube",
        name: "YouTube",
        url_template: "https://youtube.com/@{}",
        icon: "\u{1F4FA}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "tiktok",
        name: "TikTok",
        url_template: "https://tiktok.com/@{}",
        icon: "\u{1F3B5}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "facebook",
        name: "Facebook",
        url_template: "https://facebook.com/{}",
        icon: "\u{1F465}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "telegram",
        name: "Telegram",
        url_template: "https://t.me/{}",
        icon: "\u{2708}\u{FE0F}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "discord",
        name: "Discord",
        url_template: "https://discord.com/users/{}",
        icon: "\u{1F3AE}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "twitch",
        name: "Twitch",
        url_template: "https://twitch.tv/{}",
        icon: "\u{1F3AE}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "medium",
        name: "Medium",
        url_template: "https://medium.com/@{}",
        icon: "\u{1F4DD}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "behance",
        name: "Behance",
        url_template: "https://behance.net/{}",
        icon: "\u{1F3A8}",
        negative_markers: &[],
    },
    PlatformDescriptor {
        key: "dribbble",
        name: "Dribbble",
        url_template: "https://dribbble.com/{}",
        icon: "\u{1F3C0}",
        negative_markers: &[],
    },
];

pub struct UsernameAnalyzer;

impl UsernameAnalyzer {
    /// A profile counts as present only on a clean 200: any other status,
    /// any probe error, and any configured negative marker in the body all
    /// fold into "not found". Absence and inability-to-determine are
    /// deliberately indistinguishable here; that precision limit is part of
    /// the contract.
    fn classify(
        platform: &PlatformDescriptor,
        url: &str,
        outcome: &ProbeOutcome,
    ) -> Option<PlatformHit> {
        if let Some(detail) = &outcome.error_detail {
            warn!("{} check failed: {}", platform.name, detail);
            return None;
        }

        let status = outcome.status()?;
        if status != 200 {
            debug!("Not found on {} ({})", platform.name, status);
            return None;
        }

        let body = outcome.str_field("body").unwrap_or_default().to_lowercase();
        if platform
            .negative_markers
            .iter()
            .any(|marker| body.contains(marker))
        {
            debug!("Not found on {} (negative marker in 200 body)", platform.name);
            return None;
        }

        Some(PlatformHit {
            platform: platform.name.to_string(),
            url: url.to_string(),
            status_code: status,
        })
    }
}

#[async_trait]
impl Analyzer for UsernameAnalyzer {
    fn source_label(&self) -> &'static str {
        "Username Search"
    }

    async fn analyze(&self, value: &str, cx: &RunContext) -> Finding {
        info!("Searching username: {}", value);

        let urls: Vec<String> = PLATFORM_CATALOG
            .iter()
            .map(|p| p.url_template.replace("{}", value))
            .collect();

        let units = urls
            .iter()
            .map(|url| {
                let prober = cx.prober.clone();
                let url = url.clone();
                WorkerPool::unit(async move { prober.http_get(&url, true).await })
            })
            .collect();

        let mut outcomes =
            WorkerPool::run_batch(units, cx.config.concurrency, cx.state.clone()).await;
        outcomes.sort_by_key(|(index, _)| *index);

        let mut found = Vec::new();
        for (index, outcome) in &outcomes {
            let platform = &PLATFORM_CATALOG[*index];
            if let Some(hit) = Self::classify(platform, &urls[*index], outcome) {
                info!("{} Found on {}: {}", platform.icon, platform.name, hit.url);
                found.push(hit);
            }
        }

        let total = PLATFORM_CATALOG.len();
        info!("Found {} profiles out of {} platforms", found.len(), total);

        let status = if cx.state.is_cancelled() {
            FindingStatus::PartialFailure
        } else {
            FindingStatus::Success
        };

        Finding::new(
            self.source_label(),
            FindingKind::SocialMedia,
            status,
            FindingData::Username(UsernamePayload {
                username: value.to_string(),
                platforms_checked: total,
                success_rate: found.len() as f64 / total as f64,
                platforms_found: found,
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::engine::{RunContext, RunState};
    use crate::probe::testing::StubProber;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn context(stub: StubProber) -> RunContext {
        RunContext {
            prober: Arc::new(stub),
            config: Config::default(),
            state: Arc::new(RunState::new(1)),
            observer: Arc::new(crate::engine::run::NullObserver),
        }
    }

    fn http_ok(body: &str) -> ProbeOutcome {
        let mut payload = HashMap::new();
        payload.insert("status".to_string(), json!(200));
        payload.insert("headers".to_string(), json!({}));
        payload.insert("body".to_string(), json!(body));
        ProbeOutcome::found(payload)
    }

    #[test]
    fn test_catalog_shape() {
        assert_eq!(PLATFORM_CATALOG.len(), 15);
        let github = PLATFORM_CATALOG.iter().find(|p| p.key == "github").unwrap();
        assert_eq!(github.negative_markers, ["not found"]);
        let twitter = PLATFORM_CATALOG.iter().find(|p| p.key == "twitter").unwrap();
        assert_eq!(twitter.negative_markers, ["suspended"]);
    }

    #[tokio::test]
    async fn test_negative_marker_overrides_200() {
        let mut stub = StubProber::default();
        stub.on_http = Some(Box::new(|url| {
            if url.contains("github.com") {
                http_ok("<html>This profile was Not Found</html>")
            } else if url.contains("twitter.com") {
                http_ok("<html>Account suspended</html>")
            } else {
                http_ok("<html>profile page</html>")
            }
        }));

        let cx = context(stub);
        let finding = UsernameAnalyzer.analyze("alice", &cx).await;

        let FindingData::Username(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert_eq!(payload.platforms_checked, 15);
        assert_eq!(payload.platforms_found.len(), 13);
        assert!(!payload
            .platforms_found
            .iter()
            .any(|h| h.platform == "GitHub" || h.platform == "Twitter/X"));
        assert!((payload.success_rate - 13.0 / 15.0).abs() < f64::EPSILON);
        assert_eq!(finding.status, FindingStatus::Success);
    }

    #[tokio::test]
    async fn test_probe_errors_fold_into_not_found() {
        let mut stub = StubProber::default();
        stub.on_http = Some(Box::new(|url| {
            if url.contains("reddit.com") {
                http_ok("profile")
            } else {
                ProbeOutcome::error("connection reset")
            }
        }));

        let cx = context(stub);
        let finding = UsernameAnalyzer.analyze("bob", &cx).await;

        let FindingData::Username(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert_eq!(payload.platforms_found.len(), 1);
        assert_eq!(payload.platforms_found[0].platform, "Reddit");
        // Errors degrade individual checks, never the batch.
        assert_eq!(finding.status, FindingStatus::Success);
        assert!((payload.success_rate - 1.0 / 15.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_non_200_is_not_found() {
        let mut stub = StubProber::default();
        stub.on_http = Some(Box::new(|_| {
            let mut payload = HashMap::new();
            payload.insert("status".to_string(), json!(301));
            payload.insert("body".to_string(), json!(""));
            ProbeOutcome::found(payload)
        }));

        let cx = context(stub);
        let finding = UsernameAnalyzer.analyze("carol", &cx).await;

        let FindingData::Username(payload) = &finding.data else {
            panic!("wrong payload variant");
        };
        assert!(payload.platforms_found.is_empty());
        assert_eq!(payload.success_rate, 0.0);
    }
}
