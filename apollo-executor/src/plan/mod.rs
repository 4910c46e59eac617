//! Compiled execution plans.
//!
//! A plan is built once per operation shape by the [compiler](compiler) and
//! shared, read only, by every request executing that operation.
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]

use std::fmt;

use apollo_compiler::ast::OperationType;
use apollo_compiler::Name;
use indexmap::IndexMap;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

pub(crate) mod cache;
pub(crate) mod compiler;
mod condition;
mod fragments;

pub use cache::CachedPlan;
pub use cache::PlanCache;
pub use cache::PlanCacheKey;
pub use compiler::compile;
pub use compiler::compile_document;
pub use condition::Condition;

use crate::execution::FieldResolver;
use crate::graphql::Location;
pub use crate::spec::input::InputValue;
use crate::spec::TypeRef;

pub(crate) fn operation_kind(kind: OperationType) -> &'static str {
    match kind {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    }
}

/// A variable declared by the operation.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: Name,
    pub ty: TypeRef,
    /// The declared default, already coerced.
    pub default: Option<Value>,
}

/// The compiled form of one operation of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    pub(crate) kind: OperationType,
    pub(crate) operation_name: Option<Name>,
    pub(crate) root_type: Name,
    pub(crate) root: SelectionPlan,
    pub(crate) variables: Vec<VariableDefinition>,
    pub(crate) variable_conditional: bool,
}

impl ExecutionPlan {
    pub fn kind(&self) -> OperationType {
        self.kind
    }

    pub fn operation_name(&self) -> Option<&str> {
        self.operation_name.as_ref().map(|name| name.as_str())
    }

    pub fn root_type(&self) -> &str {
        self.root_type.as_str()
    }

    pub fn root(&self) -> &SelectionPlan {
        &self.root
    }

    pub fn variables(&self) -> &[VariableDefinition] {
        &self.variables
    }

    /// Whether some `@skip`/`@include` must be evaluated per request.
    pub fn is_variable_conditional(&self) -> bool {
        self.variable_conditional
    }

    pub fn is_mutation(&self) -> bool {
        self.kind == OperationType::Mutation
    }
}

/// The fields selected on one concrete object type, in response order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionPlan {
    pub(crate) nodes: Vec<ExecutionNode>,
}

impl SelectionPlan {
    pub fn nodes(&self) -> &[ExecutionNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Finds a node by response key.
    pub fn get(&self, response_key: &str) -> Option<&ExecutionNode> {
        self.nodes
            .iter()
            .find(|node| node.response_key.as_str() == response_key)
    }
}

/// The selection applied to the value of a composite field.
#[derive(Debug, Clone, PartialEq)]
pub enum Subselection {
    Object(SelectionPlan),
    /// One plan per possible concrete type of an interface or union, in schema order.
    Abstract(IndexMap<Name, SelectionPlan>),
}

/// One field of the response, possibly merged from several occurrences in the document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionNode {
    pub(crate) response_key: ByteString,
    pub(crate) field_name: Name,
    pub(crate) parent_type: Name,
    /// Arguments in definition order. Absent optional arguments are omitted.
    pub(crate) arguments: Vec<(Name, InputValue)>,
    pub(crate) ty: TypeRef,
    pub(crate) condition: Condition,
    pub(crate) resolver: FieldResolver,
    pub(crate) locations: Vec<Location>,
    pub(crate) subselection: Option<Subselection>,
}

impl ExecutionNode {
    pub fn response_key(&self) -> &str {
        self.response_key.as_str()
    }

    pub fn field_name(&self) -> &str {
        self.field_name.as_str()
    }

    pub fn parent_type(&self) -> &str {
        self.parent_type.as_str()
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }

    pub fn resolver(&self) -> &FieldResolver {
        &self.resolver
    }

    pub fn arguments(&self) -> &[(Name, InputValue)] {
        &self.arguments
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    pub fn subselection(&self) -> Option<&Subselection> {
        self.subselection.as_ref()
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", operation_kind(self.kind))?;
        if let Some(name) = &self.operation_name {
            write!(f, " {name}")?;
        }
        writeln!(f, " on {}", self.root_type)?;
        self.root.fmt_indented(f, 1)
    }
}

impl SelectionPlan {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        for node in &self.nodes {
            node.fmt_indented(f, depth)?;
        }
        Ok(())
    }
}

impl ExecutionNode {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(f, "{indent}")?;
        if self.response_key.as_str() != self.field_name.as_str() {
            write!(f, "{}: ", self.response_key.as_str())?;
        }
        write!(f, "{}: {}", self.field_name, self.ty)?;
        if self.condition != Condition::Yes {
            write!(f, " if {}", self.condition)?;
        }
        match &self.resolver {
            FieldResolver::Function(_) => write!(f, " [resolver]")?,
            FieldResolver::Constant(_) => write!(f, " [constant]")?,
            FieldResolver::Attribute => {}
        }
        writeln!(f)?;
        match &self.subselection {
            Some(Subselection::Object(plan)) => plan.fmt_indented(f, depth + 1),
            Some(Subselection::Abstract(plans)) => {
                for (type_name, plan) in plans {
                    writeln!(f, "{indent}  ... on {type_name}")?;
                    plan.fmt_indented(f, depth + 2)?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }
}
