//! A GraphQL execution engine.
//!
//! Operations are compiled once into an [`ExecutionPlan`](plan::ExecutionPlan)
//! and cached by query shape. Executing a plan invokes the registered
//! [resolvers](Resolvers), completes their values against the schema and
//! assembles a [`Response`] with GraphQL null propagation.
//!
//! ```ignore
//! let schema = Schema::parse("type Query { hello: String }")?;
//! let resolvers = Resolvers::new().with(
//!     "Query",
//!     "hello",
//!     FieldResolver::sync(|_, _| Ok(json!("world").into())),
//! );
//! let executor = Executor::new(schema, resolvers);
//! let response = executor
//!     .execute(ExecutionRequest::builder().query("{ hello }").build())
//!     .await;
//! ```

#![cfg_attr(feature = "failfast", allow(unreachable_code))]

macro_rules! failfast_debug {
    ($($tokens:tt)+) => {{
        tracing::debug!($($tokens)+);
        #[cfg(feature = "failfast")]
        panic!(
            "failfast triggered. \
            Please remove the feature failfast if you don't want to see these panics"
        );
    }};
}

#[macro_use]
pub mod json_ext;

pub(crate) mod cache;
mod configuration;
mod context;
pub mod error;
pub mod execution;
pub mod graphql;
pub mod plan;
pub mod spec;

pub use cache::storage::CacheMetrics;
pub use configuration::Configuration;
pub use configuration::Execution as ExecutionConfiguration;
pub use configuration::PlanCache as PlanCacheConfiguration;
pub use configuration::DEFAULT_RECURSION_LIMIT;
pub use context::Context;
pub use context::Extensions;
pub use context::ExtensionsGuard;
pub use execution::DefaultDiscriminator;
pub use execution::ErrorMask;
pub use execution::ExecutionRequest;
pub use execution::Executor;
pub use execution::FieldError;
pub use execution::FieldResolver;
pub use execution::FieldResult;
pub use execution::FieldValue;
pub use execution::MaskErrors;
pub use execution::ObjectRef;
pub use execution::Resolution;
pub use execution::Resolve;
pub use execution::ResolveInfo;
pub use execution::Resolvers;
pub use execution::TypeDiscriminator;
pub use graphql::Request;
pub use graphql::Response;
pub use plan::PlanCache;
pub use spec::Schema;

