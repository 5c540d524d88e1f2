use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a submitted target. Determines which analyzer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Username,
    Domain,
    Host,
    Email,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetKind::Username => "username",
            TargetKind::Domain => "domain",
            TargetKind::Host => "host",
            TargetKind::Email => "email",
        };
        write!(f, "{}", s)
    }
}

/// One target to investigate. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub kind: TargetKind,
    pub value: String,
}

impl Target {
    pub fn new(kind: TargetKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn username(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Username, value)
    }

    pub fn domain(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Domain, value)
    }

    pub fn host(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Host, value)
    }

    pub fn email(value: impl Into<String>) -> Self {
        Self::new(TargetKind::Email, value)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.value)
    }
}
