//! Execution of operations against resolvers.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use self::complete::execute_operation;
use self::complete::ExecutionParameters;
use crate::configuration::Configuration;
use crate::error::CompileError;
use crate::error::ExecutionError;
use crate::graphql;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::plan::cache::CachedPlan;
use crate::plan::compile;
use crate::plan::ExecutionPlan;
use crate::plan::PlanCache;
use crate::plan::PlanCacheKey;
use crate::spec::input::coerce_variables;
use crate::spec::Schema;
use crate::Context;

mod complete;
pub(crate) mod introspection;
mod resolver;

pub use resolver::DefaultDiscriminator;
pub use resolver::ErrorMask;
pub use resolver::FieldError;
pub use resolver::FieldResolver;
pub use resolver::FieldResult;
pub use resolver::FieldValue;
pub use resolver::MaskErrors;
pub use resolver::ObjectRef;
pub use resolver::Resolution;
pub use resolver::Resolve;
pub use resolver::ResolveInfo;
pub use resolver::Resolvers;
pub use resolver::TypeDiscriminator;

pub(crate) const EXECUTE_SPAN_NAME: &str = "execute";
pub(crate) const COMPILE_SPAN_NAME: &str = "compile";
pub(crate) const EXECUTE_PLAN_SPAN_NAME: &str = "execute_plan";

/// One operation to execute.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub query: String,
    pub operation_name: Option<String>,
    /// Raw variable values, coerced against the operation before execution.
    pub variables: Object,
    /// The parent value of the root fields.
    pub root_value: ObjectRef,
    pub context: Context,
    /// Cancels the operation: fields not yet settled are nulled.
    pub cancellation: CancellationToken,
}

#[buildstructor::buildstructor]
impl ExecutionRequest {
    #[builder(visibility = "pub")]
    fn new(
        query: String,
        operation_name: Option<String>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        variables: JsonMap<ByteString, Value>,
        root_value: Option<ObjectRef>,
        context: Option<Context>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            query,
            operation_name,
            variables,
            root_value: root_value.unwrap_or_default(),
            context: context.unwrap_or_default(),
            cancellation: cancellation.unwrap_or_default(),
        }
    }
}

impl From<graphql::Request> for ExecutionRequest {
    fn from(request: graphql::Request) -> Self {
        Self {
            query: request.query.unwrap_or_default(),
            operation_name: request.operation_name,
            variables: request.variables,
            root_value: ObjectRef::default(),
            context: Context::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

/// Executes operations against a schema and its resolvers.
///
/// Compiled plans are kept in a [`PlanCache`]. Cloning an executor shares
/// the cache; so does [`Executor::with_plan_cache`] for executors built
/// over the same schema and resolvers.
#[derive(Clone)]
pub struct Executor {
    schema: Schema,
    resolvers: Arc<Resolvers>,
    configuration: Arc<Configuration>,
    discriminator: Arc<dyn TypeDiscriminator>,
    error_mask: Option<Arc<dyn ErrorMask>>,
    plan_cache: PlanCache,
}

impl Executor {
    pub fn new(schema: Schema, resolvers: Resolvers) -> Self {
        let configuration = Configuration::default();
        Self {
            schema,
            resolvers: Arc::new(resolvers),
            plan_cache: PlanCache::new(&configuration.plan_cache),
            configuration: Arc::new(configuration),
            discriminator: Arc::new(DefaultDiscriminator),
            error_mask: None,
        }
    }

    /// Replaces the configuration. This also replaces the plan cache.
    pub fn with_configuration(mut self, configuration: Configuration) -> Self {
        self.plan_cache = PlanCache::new(&configuration.plan_cache);
        self.configuration = Arc::new(configuration);
        self
    }

    pub fn with_discriminator(mut self, discriminator: impl TypeDiscriminator) -> Self {
        self.discriminator = Arc::new(discriminator);
        self
    }

    /// Masks the messages of resolver errors.
    pub fn with_error_mask(mut self, error_mask: impl ErrorMask) -> Self {
        self.error_mask = Some(Arc::new(error_mask));
        self
    }

    pub fn with_plan_cache(mut self, plan_cache: PlanCache) -> Self {
        self.plan_cache = plan_cache;
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub fn plan_cache(&self) -> &PlanCache {
        &self.plan_cache
    }

    /// What plans compiled by this executor depend on besides the query.
    fn plan_scope(&self) -> String {
        format!(
            "{}:{}:{}",
            self.schema.hash(),
            self.resolvers.generation(),
            self.configuration.execution.recursion_limit
        )
    }

    /// Returns the plan of an operation, compiling it on a cache miss.
    pub async fn plan(&self, query: &str, operation_name: Option<&str>) -> CachedPlan {
        let key = PlanCacheKey::scoped(&self.plan_scope(), query, operation_name);
        self.plan_cache
            .get_or_compile(&key, || {
                let _span = tracing::info_span!(COMPILE_SPAN_NAME, "otel.kind" = "INTERNAL").entered();
                compile(
                    &self.schema,
                    &self.resolvers,
                    query,
                    operation_name,
                    self.configuration.execution.recursion_limit,
                )
            })
            .await
    }

    /// Compiles (or fetches from the cache) and executes an operation.
    ///
    /// Compilation errors produce a response without `data`.
    pub async fn execute(&self, request: impl Into<ExecutionRequest>) -> Response {
        let request = request.into();
        let span = tracing::info_span!(
            EXECUTE_SPAN_NAME,
            "graphql.operation.name" = request.operation_name.as_deref().unwrap_or_default(),
            "otel.kind" = "INTERNAL"
        );
        async move {
            let plan = match self
                .plan(&request.query, request.operation_name.as_deref())
                .await
            {
                Ok(plan) => plan,
                Err(errors) => {
                    tracing::debug!("operation failed to compile: {} error(s)", errors.len());
                    return Response::from_resolved(
                        None,
                        errors.iter().map(CompileError::to_graphql_error).collect(),
                    );
                }
            };
            self.execute_plan(
                &plan,
                &request.root_value,
                &request.variables,
                &request.context,
                &request.cancellation,
            )
            .await
        }
        .instrument(span)
        .await
    }

    /// Executes a compiled plan.
    ///
    /// Variables are coerced against the plan's definitions first; a variable
    /// that fails coercion is reported on every field that uses it.
    pub async fn execute_plan(
        &self,
        plan: &ExecutionPlan,
        root_value: &ObjectRef,
        variables: &Object,
        context: &Context,
        cancellation: &CancellationToken,
    ) -> Response {
        let variables = coerce_variables(&self.schema, plan.variables(), variables);
        // the timeout only cancels this operation, never the caller's token
        let cancellation = cancellation.child_token();
        let params = ExecutionParameters {
            schema: &self.schema,
            variables: &variables,
            context,
            cancellation: &cancellation,
            discriminator: self.discriminator.as_ref(),
            error_mask: self.error_mask.as_deref(),
            errors: Mutex::new(Vec::new()),
            interrupted: AtomicBool::new(false),
        };

        let execution = execute_operation(&params, plan, root_value)
            .instrument(tracing::info_span!(EXECUTE_PLAN_SPAN_NAME, "otel.kind" = "INTERNAL"));
        let mut timed_out = false;
        let data = match self.configuration.execution.timeout {
            Some(timeout) => {
                tokio::pin!(execution);
                tokio::select! {
                    data = &mut execution => data,
                    _ = tokio::time::sleep(timeout) => {
                        tracing::warn!("operation timed out after {}ms", timeout.as_millis());
                        timed_out = true;
                        cancellation.cancel();
                        execution.await
                    }
                }
            }
            None => execution.await,
        };

        let mut errors = params.errors.into_inner();
        if params.interrupted.load(Ordering::Relaxed) {
            let error = if timed_out {
                ExecutionError::TimedOut
            } else {
                ExecutionError::Cancelled
            };
            errors.push(error.to_graphql_error(Vec::new(), None));
        }
        Response::from_resolved(Some(data), errors)
    }
}
