//! Route cache policies — which request paths may be served from the render cache.
//!
//! Policies match on the exact request path (no patterns, no trailing-slash
//! normalization) and are evaluated in registration order; the first policy
//! whose path equals the request path wins.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Request;

/// Predicate deciding, after a render, whether its markup may be stored.
///
/// Receives the resolved absolute URL and the request.
pub type CacheablePredicate = Arc<dyn Fn(&str, &Request) -> bool + Send + Sync + 'static>;

/// Errors found while resolving a policy for a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("route cache policy for `{path}` has a zero ttl")]
    ZeroTtl { path: String },

    #[error("route cache policy for `{path}` has a ttl of {ttl}s, above the {max}s limit")]
    TtlTooLong { path: String, ttl: u64, max: u64 },

    #[error("route cache policy path `{path}` must start with `/`")]
    RelativePath { path: String },

    #[error("request has an empty path")]
    EmptyRequestPath,
}

/// Caching parameters for one route.
///
/// # Examples
///
/// ```
/// use rttp_ssr::ssr::RoutePolicy;
/// use rttp_ssr::http::request::Request;
///
/// let policy = RoutePolicy::new("/home").use_query_params(true).ttl(30);
///
/// let (req, _) = Request::parse(b"GET /home?x=1 HTTP/1.1\r\nHost: a\r\n\r\n").unwrap();
/// assert_eq!(policy.cache_key(&req), "/home?x=1");
/// assert_eq!(policy.ttl_duration().as_secs(), 30);
/// ```
#[derive(Clone)]
pub struct RoutePolicy {
    path: String,
    use_query_params: bool,
    ttl_secs: u64,
    is_cacheable_value: Option<CacheablePredicate>,
}

impl RoutePolicy {
    /// TTL applied when none is configured.
    pub const DEFAULT_TTL_SECS: u64 = 60;

    /// Longest accepted TTL: one year.
    pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

    /// Creates a policy for `path` with a 60 second TTL, keyed by path only.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            use_query_params: false,
            ttl_secs: Self::DEFAULT_TTL_SECS,
            is_cacheable_value: None,
        }
    }

    /// When `true`, the cache key includes the query string.
    #[must_use]
    pub fn use_query_params(mut self, enabled: bool) -> Self {
        self.use_query_params = enabled;
        self
    }

    /// Sets the entry lifetime in seconds.
    #[must_use]
    pub fn ttl(mut self, secs: u64) -> Self {
        self.ttl_secs = secs;
        self
    }

    /// Only store rendered markup when `predicate(resolved_url, request)` returns `true`.
    #[must_use]
    pub fn cacheable_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str, &Request) -> bool + Send + Sync + 'static,
    {
        self.is_cacheable_value = Some(Arc::new(predicate));
        self
    }

    /// The exact request path this policy applies to.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether the query string is part of the cache key.
    pub fn uses_query_params(&self) -> bool {
        self.use_query_params
    }

    /// The configured entry lifetime.
    pub fn ttl_duration(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Derives the cache key for `req`: `original_url` when query params are
    /// part of the key, the bare path otherwise.
    pub fn cache_key(&self, req: &Request) -> String {
        if self.use_query_params {
            req.original_url()
        } else {
            req.path().to_owned()
        }
    }

    /// Runs the cacheability predicate; absent means always cacheable.
    pub fn is_cacheable(&self, resolved_url: &str, req: &Request) -> bool {
        self.is_cacheable_value
            .as_ref()
            .is_none_or(|predicate| predicate(resolved_url, req))
    }

    /// Checks the policy is usable.
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.path.starts_with('/') {
            return Err(PolicyError::RelativePath {
                path: self.path.clone(),
            });
        }
        if self.ttl_secs == 0 {
            return Err(PolicyError::ZeroTtl {
                path: self.path.clone(),
            });
        }
        if self.ttl_secs > Self::MAX_TTL_SECS {
            return Err(PolicyError::TtlTooLong {
                path: self.path.clone(),
                ttl: self.ttl_secs,
                max: Self::MAX_TTL_SECS,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for RoutePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutePolicy")
            .field("path", &self.path)
            .field("use_query_params", &self.use_query_params)
            .field("ttl_secs", &self.ttl_secs)
            .field("is_cacheable_value", &self.is_cacheable_value.is_some())
            .finish()
    }
}

/// Serializable form of a [`RoutePolicy`], as written in the JSON config.
///
/// Predicates cannot be expressed in config; attach them in code with
/// [`RoutePolicy::cacheable_when`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoutePolicyConfig {
    pub path: String,

    #[serde(default)]
    pub use_query_params: bool,

    #[serde(default = "default_ttl")]
    pub ttl: u64,
}

fn default_ttl() -> u64 {
    RoutePolicy::DEFAULT_TTL_SECS
}

impl From<RoutePolicyConfig> for RoutePolicy {
    fn from(config: RoutePolicyConfig) -> Self {
        RoutePolicy::new(config.path)
            .use_query_params(config.use_query_params)
            .ttl(config.ttl)
    }
}

/// Outcome of resolving a request path against the registry.
#[derive(Debug)]
pub enum PolicyLookup<'a> {
    /// A valid policy applies.
    Matched(&'a RoutePolicy),
    /// No policy names this path; render without the cache.
    NoPolicy,
    /// Resolution failed; callers fall back to uncached rendering.
    Failed(PolicyError),
}

/// Ordered, immutable list of [`RoutePolicy`] entries.
#[derive(Debug, Clone, Default)]
pub struct RouteCacheRegistry {
    policies: Vec<RoutePolicy>,
}

impl RouteCacheRegistry {
    /// Creates a registry from policies in priority order.
    pub fn new(policies: Vec<RoutePolicy>) -> Self {
        Self { policies }
    }

    /// Number of registered policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// `true` when no policy is registered.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Iterates policies in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &RoutePolicy> {
        self.policies.iter()
    }

    /// Finds the first policy whose path equals `path`.
    ///
    /// A matched but invalid policy yields [`PolicyLookup::Failed`] rather
    /// than a policy the cache would reject.
    pub fn lookup(&self, path: &str) -> PolicyLookup<'_> {
        if path.is_empty() {
            return PolicyLookup::Failed(PolicyError::EmptyRequestPath);
        }

        match self.policies.iter().find(|policy| policy.path == path) {
            Some(policy) => match policy.validate() {
                Ok(()) => PolicyLookup::Matched(policy),
                Err(err) => PolicyLookup::Failed(err),
            },
            None => PolicyLookup::NoPolicy,
        }
    }
}

impl FromIterator<RoutePolicy> for RouteCacheRegistry {
    fn from_iter<I: IntoIterator<Item = RoutePolicy>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_request(target: &str) -> Request {
        let raw = format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n");
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req
    }

    #[test]
    fn defaults() {
        let policy = RoutePolicy::new("/home");
        assert_eq!(policy.path(), "/home");
        assert!(!policy.uses_query_params());
        assert_eq!(policy.ttl_duration(), Duration::from_secs(60));
        assert!(policy.is_cacheable("http://localhost/home", &make_request("/home")));
    }

    #[test]
    fn cache_key_without_query_params() {
        let policy = RoutePolicy::new("/home");
        assert_eq!(policy.cache_key(&make_request("/home?x=1")), "/home");
    }

    #[test]
    fn cache_key_with_query_params() {
        let policy = RoutePolicy::new("/home").use_query_params(true);
        assert_eq!(policy.cache_key(&make_request("/home?x=1")), "/home?x=1");
        assert_eq!(policy.cache_key(&make_request("/home")), "/home");
    }

    #[test]
    fn predicate_is_consulted() {
        let policy = RoutePolicy::new("/home")
            .cacheable_when(|url, req| !url.contains("draft") && req.path() == "/home");
        let req = make_request("/home");
        assert!(policy.is_cacheable("http://localhost/home", &req));
        assert!(!policy.is_cacheable("http://localhost/home?draft=1", &req));
    }

    #[test]
    fn first_match_wins() {
        let registry = RouteCacheRegistry::new(vec![
            RoutePolicy::new("/home").ttl(10),
            RoutePolicy::new("/home").ttl(20),
        ]);
        match registry.lookup("/home") {
            PolicyLookup::Matched(policy) => assert_eq!(policy.ttl_duration().as_secs(), 10),
            other => panic!("expected a match, got {other:?}"),
        }
    }

    #[test]
    fn exact_match_only() {
        let registry: RouteCacheRegistry = [RoutePolicy::new("/home")].into_iter().collect();
        assert!(matches!(registry.lookup("/home/"), PolicyLookup::NoPolicy));
        assert!(matches!(registry.lookup("/homepage"), PolicyLookup::NoPolicy));
        assert!(matches!(registry.lookup("/"), PolicyLookup::NoPolicy));
    }

    #[test]
    fn zero_ttl_fails_lookup() {
        let registry = RouteCacheRegistry::new(vec![RoutePolicy::new("/home").ttl(0)]);
        assert!(matches!(
            registry.lookup("/home"),
            PolicyLookup::Failed(PolicyError::ZeroTtl { .. })
        ));
    }

    #[test]
    fn oversized_ttl_fails_lookup() {
        let registry = RouteCacheRegistry::new(vec![RoutePolicy::new("/home").ttl(u64::MAX)]);
        assert!(matches!(
            registry.lookup("/home"),
            PolicyLookup::Failed(PolicyError::TtlTooLong { .. })
        ));
        assert!(RoutePolicy::new("/home").ttl(RoutePolicy::MAX_TTL_SECS).validate().is_ok());
    }

    #[test]
    fn empty_request_path_fails_lookup() {
        let registry = RouteCacheRegistry::new(vec![RoutePolicy::new("/home")]);
        assert!(matches!(
            registry.lookup(""),
            PolicyLookup::Failed(PolicyError::EmptyRequestPath)
        ));
    }

    #[test]
    fn relative_path_is_invalid() {
        assert_eq!(
            RoutePolicy::new("home").validate(),
            Err(PolicyError::RelativePath {
                path: "home".to_owned()
            })
        );
    }

    #[test]
    fn config_defaults() {
        let config: RoutePolicyConfig = serde_json::from_str(r#"{"path": "/home"}"#).unwrap();
        assert!(!config.use_query_params);
        assert_eq!(config.ttl, 60);

        let policy = RoutePolicy::from(
            serde_json::from_str::<RoutePolicyConfig>(
                r#"{"path": "/search", "useQueryParams": true, "ttl": 5}"#,
            )
            .unwrap(),
        );
        assert!(policy.uses_query_params());
        assert_eq!(policy.ttl_duration(), Duration::from_secs(5));
    }
}
