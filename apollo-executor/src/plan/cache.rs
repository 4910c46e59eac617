//! Memoization of compiled plans.

use std::fmt;
use std::sync::Arc;

use apollo_compiler::ast;
use sha2::Digest;
use sha2::Sha256;

use super::ExecutionPlan;
use crate::cache::storage::CacheMetrics;
use crate::cache::DeduplicatingCache;
use crate::cache::EntryError;
use crate::configuration::PlanCache as PlanCacheConfig;
use crate::error::CompileError;

/// The outcome of compiling an operation. Errors are cached too.
pub type CachedPlan = Result<Arc<ExecutionPlan>, Vec<CompileError>>;

/// Identifies an operation shape: the SHA-256 of the normalized query text,
/// the operation name and the operation's variable definitions.
///
/// Executors key their plans with [`PlanCacheKey::scoped`] so that a cache
/// shared between executors over different schemas never mixes their plans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanCacheKey(String);

impl PlanCacheKey {
    pub fn new(query: &str, operation_name: Option<&str>) -> Self {
        Self::scoped("", query, operation_name)
    }

    /// Keys an operation compiled against `scope`, which identifies
    /// everything besides the query the plan depends on.
    pub fn scoped(scope: &str, query: &str, operation_name: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(scope.as_bytes());
        hasher.update([0xFF]);
        match ast::Document::parse(query, "query.graphql") {
            Ok(document) => {
                // reprinting drops whitespace, comments and commas
                hasher.update(document.to_string().as_bytes());
                hasher.update([0xFF]);
                hasher.update(variable_signature(&document, operation_name).as_bytes());
            }
            Err(_) => hasher.update(query.as_bytes()),
        }
        hasher.update([0xFF]);
        if let Some(name) = operation_name {
            hasher.update(name.as_bytes());
        }
        PlanCacheKey(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlanCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn variable_signature(document: &ast::Document, operation_name: Option<&str>) -> String {
    document
        .definitions
        .iter()
        .filter_map(|definition| match definition {
            ast::Definition::OperationDefinition(operation) => Some(operation),
            _ => None,
        })
        .find(|operation| match operation_name {
            Some(name) => operation.name.as_deref() == Some(name),
            None => true,
        })
        .map(|operation| {
            operation
                .variables
                .iter()
                .map(|variable| format!("${}:{}", variable.name, variable.ty))
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

/// A cache of compiled plans, shared by cloning.
///
/// Only one caller compiles a given key at a time; the others wait for its
/// result.
#[derive(Clone)]
pub struct PlanCache {
    cache: DeduplicatingCache<PlanCacheKey, CachedPlan>,
}

impl PlanCache {
    pub fn new(config: &PlanCacheConfig) -> Self {
        Self {
            cache: DeduplicatingCache::new(config.limit, config.ttl),
        }
    }

    /// Returns the cached plan for `key`, running `compile` on a miss.
    pub async fn get_or_compile<F>(&self, key: &PlanCacheKey, compile: F) -> CachedPlan
    where
        F: FnOnce() -> Result<ExecutionPlan, Vec<CompileError>>,
    {
        loop {
            let entry = self.cache.get(key).await;
            if entry.is_first() {
                tracing::info!(monotonic_counter.apollo.executor.plan_cache.miss = 1u64);
                tracing::debug!("plan cache miss for {key}");
                let plan = compile().map(Arc::new);
                entry.insert(plan.clone()).await;
                return plan;
            }

            let waiting = entry.is_waiting();
            match entry.get().await {
                Ok(plan) => {
                    if waiting {
                        self.cache.record_hit();
                    }
                    tracing::info!(monotonic_counter.apollo.executor.plan_cache.hit = 1u64);
                    tracing::debug!("plan cache hit for {key}");
                    return plan;
                }
                // the compiling caller went away: try again, possibly as the first caller
                Err(EntryError::Closed) => continue,
                Err(EntryError::IsFirst) => {
                    failfast_debug!("plan cache entry is first but was not handled as such");
                    continue;
                }
            }
        }
    }

    /// Drops every cached plan. Plans already handed out stay valid.
    pub async fn clear(&self) {
        self.cache.clear().await
    }

    pub async fn len(&self) -> usize {
        self.cache.len().await
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn metrics(&self) -> CacheMetrics {
        self.cache.metrics().await
    }
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::new(&PlanCacheConfig::default())
    }
}
