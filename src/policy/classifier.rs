//! Request Classifier
//!
//! Decides, from method and URL alone, whether a request is cached at all and
//! which resource class (and therefore partition and strategy) it belongs to.

use std::fmt;

use axum::http::Method;

use crate::fetch::FetchRequest;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "webp", "gif", "ico"];
const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "woff", "woff2", "ttf", "eot", "map", "webmanifest",
];
const STATIC_PREFIXES: &[&str] = &["/static/", "/assets/", "/_next/static/"];
const API_PREFIX: &str = "/api/";

// == Cache Strategy ==
/// The closed set of caching policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Serve a valid cached entry at once and refresh it in the background.
    CacheFirstRefresh,
    /// Try the network, fall back to whatever is cached.
    NetworkFirstFallback,
    /// Serve anything cached without revalidating; fetch only to fill a miss.
    CacheFirst,
}

impl fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheStrategy::CacheFirstRefresh => write!(f, "cache-first-refresh"),
            CacheStrategy::NetworkFirstFallback => write!(f, "network-first-fallback"),
            CacheStrategy::CacheFirst => write!(f, "cache-first"),
        }
    }
}

// == Resource Class ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceClass {
    Static,
    Image,
    Api,
    Navigation,
}

impl ResourceClass {
    pub const ALL: [ResourceClass; 4] = [
        ResourceClass::Static,
        ResourceClass::Image,
        ResourceClass::Api,
        ResourceClass::Navigation,
    ];

    /// Position in [`ResourceClass::ALL`].
    pub fn index(&self) -> usize {
        match self {
            ResourceClass::Static => 0,
            ResourceClass::Image => 1,
            ResourceClass::Api => 2,
            ResourceClass::Navigation => 3,
        }
    }

    /// Partition base name, before the generation tag.
    pub fn partition_kind(&self) -> &'static str {
        match self {
            ResourceClass::Static => "static",
            ResourceClass::Image => "images",
            ResourceClass::Api => "api",
            ResourceClass::Navigation => "pages",
        }
    }

    /// Full partition name for a cache generation, e.g. `api-v1.4.0`.
    pub fn partition_name(&self, version: &str) -> String {
        format!("{}-{}", self.partition_kind(), version)
    }

    pub fn strategy(&self) -> CacheStrategy {
        match self {
            ResourceClass::Api | ResourceClass::Image => CacheStrategy::CacheFirstRefresh,
            ResourceClass::Static => CacheStrategy::CacheFirst,
            ResourceClass::Navigation => CacheStrategy::NetworkFirstFallback,
        }
    }
}

impl fmt::Display for ResourceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.partition_kind())
    }
}

// == Route ==
/// Classification outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Not a read; goes straight to the network and is never cached.
    Bypass,
    Cached {
        class: ResourceClass,
        partition: String,
    },
}

// == Classifier ==
#[derive(Debug, Clone)]
pub struct RequestClassifier {
    version: String,
}

impl RequestClassifier {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    pub fn classify(&self, request: &FetchRequest) -> Route {
        if request.method != Method::GET {
            return Route::Bypass;
        }
        let class = classify_path(request.path());
        Route::Cached {
            class,
            partition: class.partition_name(&self.version),
        }
    }
}

/// Resource class of a URL path, checked in priority order.
pub fn classify_path(path: &str) -> ResourceClass {
    if path.starts_with(API_PREFIX) {
        return ResourceClass::Api;
    }

    let extension = extension_of(path);
    let has_ext = |list: &[&str]| {
        extension
            .as_deref()
            .is_some_and(|ext| list.contains(&ext))
    };

    if has_ext(IMAGE_EXTENSIONS) || path.split('/').any(|segment| segment == "images") {
        return ResourceClass::Image;
    }
    if STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) || has_ext(STATIC_EXTENSIONS) {
        return ResourceClass::Static;
    }
    ResourceClass::Navigation
}

fn extension_of(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (_, ext) = last.rsplit_once('.')?;
    Some(ext.to_ascii_lowercase())
}
