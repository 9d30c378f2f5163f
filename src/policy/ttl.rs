//! TTL Policy Table
//!
//! Ordered `(pattern, ttl)` rules matched against a request's path and query.
//! The first matching rule wins; otherwise the table's default applies.

use std::str::FromStr;
use std::time::Duration;

use regex::Regex;

use crate::error::AgentError;

/// TTL used when no rule matches.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

// == URL Pattern ==
#[derive(Debug, Clone)]
pub enum UrlPattern {
    Exact(String),
    Prefix(String),
    Contains(String),
    Regex(Regex),
}

impl UrlPattern {
    pub fn regex(pattern: &str) -> Result<Self, AgentError> {
        Regex::new(pattern)
            .map(UrlPattern::Regex)
            .map_err(|e| AgentError::InvalidRequest(format!("bad TTL pattern '{}': {}", pattern, e)))
    }

    /// Matches against a path-and-query string such as `/api/product/all?page=2`.
    pub fn matches(&self, target: &str) -> bool {
        match self {
            UrlPattern::Exact(s) => {
                target == s || target.split('?').next() == Some(s.as_str())
            }
            UrlPattern::Prefix(s) => target.starts_with(s.as_str()),
            UrlPattern::Contains(s) => target.contains(s.as_str()),
            UrlPattern::Regex(re) => re.is_match(target),
        }
    }
}

// == TTL Rule ==
#[derive(Debug, Clone)]
pub struct TtlRule {
    pub pattern: UrlPattern,
    pub ttl: Duration,
}

impl TtlRule {
    pub fn new(pattern: UrlPattern, ttl: Duration) -> Self {
        Self { pattern, ttl }
    }
}

/// Parses `<pattern>=<ttl_ms>`.
///
/// The pattern is a prefix by default; `=` selects an exact match, `*` a
/// substring match and `~` a regular expression, e.g. `=/api/product/all=600000`
/// or `~^/api/user/\d+$=60000`.
impl FromStr for TtlRule {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AgentError::InvalidRequest(format!("bad TTL rule '{}'", s));

        let (pattern, ttl) = s.trim().rsplit_once('=').ok_or_else(invalid)?;
        let ttl_ms: u64 = ttl.trim().parse().map_err(|_| invalid())?;
        if ttl_ms == 0 || pattern.is_empty() {
            return Err(invalid());
        }

        let pattern = if let Some(p) = pattern.strip_prefix('~') {
            UrlPattern::regex(p)?
        } else if let Some(p) = pattern.strip_prefix('=') {
            UrlPattern::Exact(p.to_string())
        } else if let Some(p) = pattern.strip_prefix('*') {
            UrlPattern::Contains(p.to_string())
        } else {
            UrlPattern::Prefix(pattern.to_string())
        };

        Ok(TtlRule::new(pattern, Duration::from_millis(ttl_ms)))
    }
}

// == Policy Table ==
#[derive(Debug, Clone)]
pub struct TtlPolicyTable {
    rules: Vec<TtlRule>,
    default_ttl: Duration,
}

impl Default for TtlPolicyTable {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl TtlPolicyTable {
    /// Empty table falling back to `default_ttl`.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            rules: Vec::new(),
            default_ttl,
        }
    }

    pub fn from_rules(rules: Vec<TtlRule>, default_ttl: Duration) -> Self {
        Self { rules, default_ttl }
    }

    /// Rules for the storefront API.
    pub fn storefront() -> Self {
        Self::default()
            .with_rule(
                UrlPattern::Exact("/api/product/all".into()),
                Duration::from_secs(10 * 60),
            )
            .with_rule(
                UrlPattern::Contains("best-sellers".into()),
                Duration::from_secs(15 * 60),
            )
            .with_rule(
                UrlPattern::Prefix("/api/category".into()),
                Duration::from_secs(30 * 60),
            )
            .with_rule(
                UrlPattern::Prefix("/api/product/".into()),
                Duration::from_secs(5 * 60),
            )
            .with_rule(
                UrlPattern::Prefix("/api/user/".into()),
                Duration::from_secs(60),
            )
            .with_rule(UrlPattern::Prefix("/api/cart".into()), Duration::from_secs(30))
    }

    /// Appends a rule after the existing ones.
    pub fn with_rule(mut self, pattern: UrlPattern, ttl: Duration) -> Self {
        self.rules.push(TtlRule::new(pattern, ttl));
        self
    }

    // == Resolve ==
    /// TTL of the first matching rule, else the default.
    pub fn resolve(&self, target: &str) -> Duration {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(target))
            .map(|rule| rule.ttl)
            .unwrap_or(self.default_ttl)
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn rules(&self) -> &[TtlRule] {
        &self.rules
    }
}
