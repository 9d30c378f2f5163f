//! Caching policy: request classification and TTL rules.

mod classifier;
mod ttl;

pub use classifier::{classify_path, CacheStrategy, RequestClassifier, ResourceClass, Route};
pub use ttl::{TtlPolicyTable, TtlRule, UrlPattern, DEFAULT_TTL};
