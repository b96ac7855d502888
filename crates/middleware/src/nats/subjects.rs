use std::sync::Arc;

use dashmap::DashMap;

/// Replace characters NATS treats specially inside a subject token.
///
/// `.` separates tokens, `*` and `>` are wildcards, and whitespace is not
/// allowed at all. An empty token becomes `_` so the subject stays valid.
pub fn sanitize_subject_token(token: &str) -> String {
    if token.is_empty() {
        return "_".to_string();
    }
    token
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

/// Helper for NATS subject formatting under a fixed prefix.
/// Caches formatted subjects to avoid repeated allocations per publish.
pub struct SubjectBuilder {
    /// Pre-computed prefix: "{prefix}.trade."
    trade_prefix: Arc<str>,
    /// Pre-computed wildcard subject
    wildcard: Arc<str>,
    /// Pre-computed stream name
    stream_name: Arc<str>,
    /// Cache of security id -> full trade subject
    trade_cache: DashMap<Arc<str>, Arc<str>>,
}

impl SubjectBuilder {
    /// Create a builder whose stream name is the prefix uppercased
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let stream_name = prefix.to_uppercase().replace(['.', '-'], "_");
        Self::with_prefix(prefix, stream_name)
    }

    /// Create a builder with a custom prefix and stream name.
    pub fn with_prefix(prefix: impl Into<String>, stream_name: impl Into<String>) -> Self {
        let prefix = prefix.into();

        let trade_prefix: Arc<str> = format!("{}.trade.", prefix).into();
        let wildcard: Arc<str> = format!("{}.>", prefix).into();
        let stream_name: Arc<str> = stream_name.into().into();

        Self {
            trade_prefix,
            wildcard,
            stream_name,
            trade_cache: DashMap::new(),
        }
    }

    /// Build subject for trade messages: {prefix}.trade.{secid}
    /// Cached - first call allocates, subsequent calls return Arc clone.
    #[inline]
    pub fn trade(&self, security_id: &str) -> Arc<str> {
        if let Some(cached) = self.trade_cache.get(security_id) {
            return Arc::clone(cached.value());
        }

        let key: Arc<str> = security_id.into();
        let subject: Arc<str> =
            format!("{}{}", self.trade_prefix, sanitize_subject_token(security_id)).into();
        self.trade_cache.insert(key, Arc::clone(&subject));
        subject
    }

    /// Wildcard subject for everything under the prefix: {prefix}.>
    #[inline]
    pub fn all(&self) -> &str {
        &self.wildcard
    }

    #[inline]
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}
