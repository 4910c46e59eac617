//! Walking a plan: resolving fields and completing their values.
//!
//! Every function returns a [`Completion`]. `Err(Propagate)` is a null that
//! must reach the nearest nullable position; its error is already recorded.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use futures::future::join_all;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json_bytes::Value;
use tokio_util::sync::CancellationToken;

use super::resolver::ErrorMask;
use super::resolver::FieldError;
use super::resolver::FieldValue;
use super::resolver::ObjectRef;
use super::resolver::Resolution;
use super::resolver::ResolveInfo;
use super::resolver::TypeDiscriminator;
use crate::error::ExecutionError;
use crate::graphql::Error;
use crate::graphql::ResolvedValue;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::PathElement;
use crate::json_ext::ValueExt;
use crate::plan::ExecutionNode;
use crate::plan::ExecutionPlan;
use crate::plan::SelectionPlan;
use crate::plan::Subselection;
use crate::spec::input::serialize_leaf;
use crate::spec::input::Variables;
use crate::spec::Schema;
use crate::spec::TypeKind;
use crate::spec::TypeRef;
use crate::Context;

/// A null propagating to the nearest nullable ancestor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Propagate;

pub(crate) type Completion = Result<ResolvedValue, Propagate>;

/// The state of one request, shared by all the fields it executes.
pub(crate) struct ExecutionParameters<'a> {
    pub(crate) schema: &'a Schema,
    pub(crate) variables: &'a Variables,
    pub(crate) context: &'a Context,
    pub(crate) cancellation: &'a CancellationToken,
    pub(crate) discriminator: &'a dyn TypeDiscriminator,
    pub(crate) error_mask: Option<&'a dyn ErrorMask>,
    pub(crate) errors: Mutex<Vec<Error>>,
    /// Set when a field was abandoned because the operation was cancelled.
    pub(crate) interrupted: AtomicBool,
}

impl ExecutionParameters<'_> {
    /// Records `error` at `path` and nulls the position of type `ty`.
    fn fail(
        &self,
        node: &ExecutionNode,
        path: &PathFrame<'_>,
        ty: &TypeRef,
        error: ExecutionError,
    ) -> Completion {
        self.errors
            .lock()
            .push(error.to_graphql_error(node.locations.clone(), Some(path.to_path())));
        if ty.is_non_null() {
            Err(Propagate)
        } else {
            Ok(ResolvedValue::Error)
        }
    }

    /// Abandons a position that will not be settled because of cancellation.
    ///
    /// No error is recorded for it: the operation reports the cancellation
    /// once. A non-null position still propagates to its parent.
    fn interrupt(&self, ty: &TypeRef) -> Completion {
        self.interrupted.store(true, Ordering::Relaxed);
        if ty.is_non_null() {
            Err(Propagate)
        } else {
            Ok(ResolvedValue::Null)
        }
    }

    fn resolver_error(&self, error: FieldError) -> ExecutionError {
        let message = self
            .error_mask
            .and_then(|mask| mask.mask(&error))
            .unwrap_or(error.message);
        ExecutionError::Resolver {
            message,
            extensions: error.extensions,
        }
    }
}

/// A response path, built on the stack as the plan is walked and only
/// materialized when an error needs it.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathFrame<'a> {
    parent: Option<&'a PathFrame<'a>>,
    element: Option<Step<'a>>,
}

#[derive(Debug, Clone, Copy)]
enum Step<'a> {
    Key(&'a str),
    Index(usize),
}

impl<'a> PathFrame<'a> {
    pub(crate) fn root() -> Self {
        PathFrame {
            parent: None,
            element: None,
        }
    }

    fn key(&'a self, key: &'a str) -> Self {
        PathFrame {
            parent: Some(self),
            element: Some(Step::Key(key)),
        }
    }

    fn index(&'a self, index: usize) -> Self {
        PathFrame {
            parent: Some(self),
            element: Some(Step::Index(index)),
        }
    }

    pub(crate) fn to_path(&self) -> Path {
        let mut elements = Vec::new();
        let mut frame = Some(self);
        while let Some(current) = frame {
            match current.element {
                Some(Step::Key(key)) => elements.push(PathElement::Key(key.to_string())),
                Some(Step::Index(index)) => elements.push(PathElement::Index(index)),
                None => {}
            }
            frame = current.parent;
        }
        elements.reverse();
        Path(elements)
    }
}

/// Executes the root selection of an operation.
///
/// A null propagating past the root fields nulls the whole `data`.
pub(crate) async fn execute_operation<'a>(
    params: &'a ExecutionParameters<'a>,
    plan: &'a ExecutionPlan,
    root_value: &'a ObjectRef,
) -> ResolvedValue {
    let root = PathFrame::root();
    let result = if plan.is_mutation() {
        execute_serially(params, &plan.root, root_value, &root).await
    } else {
        execute_selection(params, &plan.root, root_value, &root).await
    };
    result.unwrap_or(ResolvedValue::Null)
}

/// Mutation root fields run one after the other, each fully completed
/// before the next starts.
async fn execute_serially<'a>(
    params: &'a ExecutionParameters<'a>,
    plan: &'a SelectionPlan,
    parent: &'a ObjectRef,
    path: &'a PathFrame<'a>,
) -> Completion {
    let mut fields = Vec::with_capacity(plan.nodes.len());
    for node in &plan.nodes {
        if !node.condition.eval(params.variables) {
            continue;
        }
        let value = execute_field(params, node, parent, path).await?;
        fields.push((node.response_key.clone(), value));
    }
    Ok(ResolvedValue::Object(fields))
}

/// Sibling fields run concurrently; the result keeps plan order.
fn execute_selection<'a>(
    params: &'a ExecutionParameters<'a>,
    plan: &'a SelectionPlan,
    parent: &'a ObjectRef,
    path: &'a PathFrame<'a>,
) -> BoxFuture<'a, Completion> {
    Box::pin(async move {
        let nodes: Vec<&ExecutionNode> = plan
            .nodes
            .iter()
            .filter(|node| node.condition.eval(params.variables))
            .collect();
        let values = join_all(
            nodes
                .iter()
                .map(|&node| execute_field(params, node, parent, path)),
        )
        .await;

        let mut fields = Vec::with_capacity(nodes.len());
        for (node, value) in nodes.into_iter().zip(values) {
            fields.push((node.response_key.clone(), value?));
        }
        Ok(ResolvedValue::Object(fields))
    })
}

fn execute_field<'a>(
    params: &'a ExecutionParameters<'a>,
    node: &'a ExecutionNode,
    parent: &'a ObjectRef,
    path: &'a PathFrame<'a>,
) -> BoxFuture<'a, Completion> {
    Box::pin(async move {
        let path = path.key(node.response_key.as_str());
        if params.cancellation.is_cancelled() {
            return params.interrupt(&node.ty);
        }

        let arguments = match resolve_arguments(node, params.variables) {
            Ok(arguments) => arguments,
            Err(error) => return params.fail(node, &path, &node.ty, error),
        };

        let resolution = {
            let path_fn = || path.to_path();
            let info = ResolveInfo {
                field_name: node.field_name.as_str(),
                parent_type: node.parent_type.as_str(),
                return_type: &node.ty,
                arguments: &arguments,
                variables: &params.variables.values,
                context: params.context,
                path: &path_fn,
            };
            std::panic::catch_unwind(AssertUnwindSafe(|| node.resolver.invoke(parent, &info)))
        };

        let result = match resolution {
            Ok(Resolution::Ready(result)) => result,
            Ok(Resolution::Pending(future)) => {
                tokio::select! {
                    biased;
                    _ = params.cancellation.cancelled() => return params.interrupt(&node.ty),
                    result = AssertUnwindSafe(future).catch_unwind() => match result {
                        Ok(result) => result,
                        Err(panic) => return params.fail(node, &path, &node.ty, panicked(node, panic)),
                    },
                }
            }
            Err(panic) => return params.fail(node, &path, &node.ty, panicked(node, panic)),
        };

        match result {
            Ok(value) => complete_value(params, node, &node.ty, value, &path).await,
            Err(error) => {
                tracing::debug!(
                    "resolver for {}.{} failed: {error}",
                    node.parent_type,
                    node.field_name
                );
                let error = params.resolver_error(error);
                params.fail(node, &path, &node.ty, error)
            }
        }
    })
}

fn resolve_arguments(node: &ExecutionNode, variables: &Variables) -> Result<Object, ExecutionError> {
    let mut arguments = Object::with_capacity(node.arguments.len());
    for (name, value) in &node.arguments {
        if let Some(value) = value.resolve(variables)? {
            arguments.insert(name.as_str(), value);
        }
    }
    Ok(arguments)
}

fn panicked(node: &ExecutionNode, panic: Box<dyn Any + Send>) -> ExecutionError {
    let reason = panic
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string());
    tracing::error!(
        "resolver for {}.{} panicked: {reason}",
        node.parent_type,
        node.field_name
    );
    ExecutionError::Internal {
        reason: format!("resolver panicked: {reason}"),
    }
}

// Spec: https://spec.graphql.org/October2021/#CompleteValue()
fn complete_value<'a>(
    params: &'a ExecutionParameters<'a>,
    node: &'a ExecutionNode,
    ty: &'a TypeRef,
    value: FieldValue,
    path: &'a PathFrame<'a>,
) -> BoxFuture<'a, Completion> {
    Box::pin(async move {
        match ty {
            TypeRef::NonNull(inner) => {
                match complete_value(params, node, inner, value, path).await? {
                    ResolvedValue::Error => Err(Propagate),
                    ResolvedValue::Null => params.fail(
                        node,
                        path,
                        ty,
                        ExecutionError::NonNullViolation {
                            parent_type: node.parent_type.to_string(),
                            field_name: node.field_name.to_string(),
                        },
                    ),
                    completed => Ok(completed),
                }
            }
            _ if value.is_null() => Ok(ResolvedValue::Null),
            TypeRef::List(item) => complete_list(params, node, ty, item, value, path).await,
            TypeRef::Named(type_name) => {
                let Some(kind) = params.schema.kind_of(type_name) else {
                    failfast_debug!("type {type_name} of a compiled field is not in the schema");
                    return params.fail(
                        node,
                        path,
                        ty,
                        ExecutionError::Internal {
                            reason: format!("unknown type \"{type_name}\""),
                        },
                    );
                };
                match kind {
                    TypeKind::Scalar | TypeKind::Enum => complete_leaf(params, node, ty, value, path),
                    TypeKind::Object | TypeKind::Interface | TypeKind::Union => {
                        complete_object(params, node, ty, value, path).await
                    }
                    TypeKind::InputObject => {
                        failfast_debug!("input type {type_name} used as an output type");
                        params.fail(
                            node,
                            path,
                            ty,
                            ExecutionError::Internal {
                                reason: format!("\"{type_name}\" is not an output type"),
                            },
                        )
                    }
                }
            }
        }
    })
}

async fn complete_list<'a>(
    params: &'a ExecutionParameters<'a>,
    node: &'a ExecutionNode,
    ty: &'a TypeRef,
    item_type: &'a TypeRef,
    value: FieldValue,
    path: &'a PathFrame<'a>,
) -> Completion {
    let items = match value {
        FieldValue::List(items) => items,
        FieldValue::Leaf(Value::Array(items)) => items.into_iter().map(FieldValue::from).collect(),
        _ => {
            return params.fail(
                node,
                path,
                ty,
                ExecutionError::ListExpected {
                    parent_type: node.parent_type.to_string(),
                    field_name: node.field_name.to_string(),
                },
            )
        }
    };

    let completed = join_all(items.into_iter().enumerate().map(|(index, item)| async move {
        let path = path.index(index);
        complete_value(params, node, item_type, item, &path).await
    }))
    .await;

    let mut values = Vec::with_capacity(completed.len());
    for item in completed {
        match item {
            Ok(value) => values.push(value),
            // a non-null item was nulled: the list itself is null
            Err(Propagate) => return Ok(ResolvedValue::Error),
        }
    }
    Ok(ResolvedValue::List(values))
}

fn complete_leaf(
    params: &ExecutionParameters<'_>,
    node: &ExecutionNode,
    ty: &TypeRef,
    value: FieldValue,
    path: &PathFrame<'_>,
) -> Completion {
    let type_name = ty.inner_named_type();
    let invalid = |value: String| ExecutionError::InvalidLeafValue {
        type_name: type_name.to_string(),
        value,
    };
    let Some(json) = value.into_json() else {
        return params.fail(node, path, ty, invalid("an opaque object".to_string()));
    };
    match serialize_leaf(params.schema, type_name, &json) {
        Some(serialized) => Ok(ResolvedValue::Leaf(serialized)),
        None => params.fail(node, path, ty, invalid(json.describe())),
    }
}

async fn complete_object<'a>(
    params: &'a ExecutionParameters<'a>,
    node: &'a ExecutionNode,
    ty: &'a TypeRef,
    value: FieldValue,
    path: &'a PathFrame<'a>,
) -> Completion {
    let type_name = ty.inner_named_type();
    let object = match value {
        FieldValue::Object(object) => object,
        FieldValue::Leaf(json @ Value::Object(_)) => ObjectRef::from_json(json),
        _ => {
            return params.fail(
                node,
                path,
                ty,
                ExecutionError::ObjectExpected {
                    parent_type: node.parent_type.to_string(),
                    field_name: node.field_name.to_string(),
                    type_name: type_name.to_string(),
                },
            )
        }
    };

    let plan = match &node.subselection {
        Some(Subselection::Object(plan)) => plan,
        Some(Subselection::Abstract(plans)) => {
            let concrete = params.discriminator.discriminate(&object, type_name);
            let plan = concrete
                .as_deref()
                .and_then(|concrete| plans.get(concrete));
            match plan {
                Some(plan) => plan,
                None => {
                    let reason = match concrete {
                        Some(concrete) => format!(
                            "\"{concrete}\" is not a possible type of \"{type_name}\"."
                        ),
                        None => "Either the value should provide a typename or a type discriminator should be configured.".to_string(),
                    };
                    return params.fail(
                        node,
                        path,
                        ty,
                        ExecutionError::AbstractResolution {
                            abstract_type: type_name.to_string(),
                            parent_type: node.parent_type.to_string(),
                            field_name: node.field_name.to_string(),
                            reason,
                        },
                    );
                }
            }
        }
        None => {
            failfast_debug!("composite field {} has no subselection", node.field_name);
            return params.fail(
                node,
                path,
                ty,
                ExecutionError::Internal {
                    reason: format!("no selection for field \"{}\"", node.field_name),
                },
            );
        }
    };

    match execute_selection(params, plan, &object, path).await {
        Ok(value) => Ok(value),
        // a non-null field was nulled: this object is null
        Err(Propagate) => Ok(ResolvedValue::Error),
    }
}
