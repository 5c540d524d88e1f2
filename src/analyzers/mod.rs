pub mod domain;
pub mod email;
pub mod host;
pub mod username;

use async_trait::async_trait;

use crate::engine::RunContext;
use crate::finding::Finding;
use crate::target::TargetKind;

/// Translates one target into a set of probes and a single aggregated
/// finding. Analyzers are total: they always return a finding, degrading
/// its status instead of erroring.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn source_label(&self) -> &'static str;

    async fn analyze(&self, value: &str, cx: &RunContext) -> Finding;
}

pub fn for_kind(kind: TargetKind) -> Box<dyn Analyzer> {
    match kind {
        TargetKind::Username => Box::new(username::UsernameAnalyzer),
        TargetKind::Domain => Box::new(domain::DomainAnalyzer),
        TargetKind::Host => Box::new(host::HostAnalyzer),
        TargetKind::Email => Box::new(email::EmailAnalyzer),
    }
}
