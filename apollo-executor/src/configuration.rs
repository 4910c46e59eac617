//! Executor configuration.
use std::num::NonZeroUsize;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

const DEFAULT_PLAN_CACHE_LIMIT: NonZeroUsize = match NonZeroUsize::new(512) {
    Some(limit) => limit,
    None => unreachable!(),
};

/// Default maximum selection nesting depth.
pub const DEFAULT_RECURSION_LIMIT: usize = 512;

fn default_plan_cache_limit() -> NonZeroUsize {
    DEFAULT_PLAN_CACHE_LIMIT
}

fn default_recursion_limit() -> usize {
    DEFAULT_RECURSION_LIMIT
}

/// The configuration of an [`Executor`](crate::Executor).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Configuration {
    /// Cache of compiled execution plans
    pub plan_cache: PlanCache,

    /// Execution limits
    pub execution: Execution,
}

#[buildstructor::buildstructor]
impl Configuration {
    #[builder(visibility = "pub")]
    fn new(plan_cache: Option<PlanCache>, execution: Option<Execution>) -> Self {
        Self {
            plan_cache: plan_cache.unwrap_or_default(),
            execution: execution.unwrap_or_default(),
        }
    }
}

/// Configuration of the plan cache
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct PlanCache {
    /// Number of compiled plans kept in memory; defaults to 512
    #[serde(default = "default_plan_cache_limit")]
    #[schemars(with = "usize", default = "default_plan_cache_limit")]
    pub limit: NonZeroUsize,

    /// Time to live of a cached plan in human-readable format (e.g. `10m`).
    /// Plans never expire when omitted.
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>", default)]
    pub ttl: Option<Duration>,
}

impl Default for PlanCache {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[buildstructor::buildstructor]
impl PlanCache {
    #[builder(visibility = "pub")]
    fn new(limit: Option<NonZeroUsize>, ttl: Option<Duration>) -> Self {
        Self {
            limit: limit.unwrap_or_else(default_plan_cache_limit),
            ttl,
        }
    }
}

/// Configuration of operation execution
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields, default)]
pub struct Execution {
    /// Maximum depth of nested selection sets; defaults to 512
    #[serde(default = "default_recursion_limit")]
    #[schemars(default = "default_recursion_limit")]
    pub recursion_limit: usize,

    /// Deadline for a whole operation in human-readable format (e.g. `30s`).
    /// When it elapses the operation is cancelled and partial data is returned.
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>", default)]
    pub timeout: Option<Duration>,
}

impl Default for Execution {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[buildstructor::buildstructor]
impl Execution {
    #[builder(visibility = "pub")]
    fn new(recursion_limit: Option<usize>, timeout: Option<Duration>) -> Self {
        Self {
            recursion_limit: recursion_limit.unwrap_or_else(default_recursion_limit),
            timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn it_builds_default_configuration() {
        let config = Configuration::builder().build();
        assert_eq!(config.plan_cache.limit.get(), 512);
        assert_eq!(config.plan_cache.ttl, None);
        assert_eq!(config.execution.recursion_limit, 512);
        assert_eq!(config.execution.timeout, None);
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn it_json_parses_defaults_when_omitted() {
        let config: Configuration = serde_json::from_value(json!({ "plan_cache": {} })).unwrap();
        assert_eq!(config, Configuration::default());
    }

    #[test]
    fn it_json_parses_human_readable_durations() {
        let config: Configuration = serde_json::from_value(json!({
            "plan_cache": { "limit": 10, "ttl": "5m" },
            "execution": { "recursion_limit": 32, "timeout": "250ms" }
        }))
        .unwrap();
        assert_eq!(config.plan_cache.limit.get(), 10);
        assert_eq!(config.plan_cache.ttl, Some(Duration::from_secs(300)));
        assert_eq!(config.execution.recursion_limit, 32);
        assert_eq!(config.execution.timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_zero_limit_is_rejected() {
        let result: Result<Configuration, _> =
            serde_json::from_value(json!({ "plan_cache": { "limit": 0 } }));
        assert!(result.is_err());
    }

    #[test]
    fn test_deny_unknown_fields() {
        let result: Result<Configuration, _> =
            serde_json::from_value(json!({ "execution": { "max_depth": 3 } }));
        assert!(result.unwrap_err().to_string().contains("unknown field"));
    }
}
