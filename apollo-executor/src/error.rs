//! Executor errors.
use apollo_compiler::response::GraphQLError;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use thiserror::Error;

pub use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Location as ErrorLocation;
use crate::graphql::to_graphql_error;
use crate::json_ext::Object;
use crate::json_ext::Path;

pub(crate) const ERROR_CODE_RESPONSE_VALIDATION: &str = "RESPONSE_VALIDATION_FAILED";

/// Error types for schema loading.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum SchemaError {
    /// schema validation failed: {0}
    Validate(String),
}

/// Error types for plan compilation.
///
/// These are structural problems with the operation. They are detected before
/// any resolver runs and abort the whole request.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum PlanError {
    /// must provide a query string
    MissingQuery,

    /// {message}
    Validation {
        /// The diagnostic reported by the document validator.
        message: String,
    },

    /// unknown operation named "{name}"
    UnknownOperation {
        /// The requested operation name.
        name: String,
    },

    /// the document does not contain exactly one anonymous operation; an operation name is required
    OperationNameRequired,

    /// the schema does not define a root type for {operation} operations
    MissingRootType {
        /// `query`, `mutation` or `subscription`.
        operation: String,
    },

    /// cannot spread fragment "{name}" within itself via {path}
    FragmentCycle {
        /// The fragment that closes the cycle.
        name: String,
        /// The spreads forming the cycle, e.g. `A -> B -> A`.
        path: String,
    },

    /// unknown fragment "{name}"
    UnknownFragment {
        /// Name of the fragment.
        name: String,
    },

    /// unknown type "{name}"
    UnknownType {
        /// Name of the type.
        name: String,
    },

    /// fragment cannot be spread here as objects of type "{parent_type}" can never be of type "{type_condition}"
    TypeConditionMismatch {
        /// Static type of the enclosing selection set.
        parent_type: String,
        /// Type condition of the fragment.
        type_condition: String,
    },

    /// fields "{response_key}" conflict because {reason}; use different aliases on the fields to fetch both if this was intentional
    FieldMergeConflict {
        /// The shared response key.
        response_key: String,
        /// What differs between the occurrences.
        reason: String,
    },

    /// cannot query field "{field_name}" on type "{type_name}"
    InvalidField {
        /// The parent type.
        type_name: String,
        /// The requested field.
        field_name: String,
    },

    /// invalid value for {target}: {reason}
    Coercion {
        /// What was being coerced, e.g. `argument "id" of field "Query.user"`.
        target: String,
        /// Why coercion failed.
        reason: String,
    },

    /// selection nesting exceeds the recursion limit of {limit}
    RecursionLimitExceeded {
        /// The configured limit.
        limit: usize,
    },
}

impl ErrorExtension for PlanError {
    fn extension_code(&self) -> String {
        match self {
            PlanError::MissingQuery => "MISSING_QUERY_STRING",
            PlanError::Validation { .. } => "GRAPHQL_VALIDATION_FAILED",
            PlanError::UnknownOperation { .. } => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            PlanError::OperationNameRequired => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            PlanError::MissingRootType { .. } => "MISSING_ROOT_TYPE",
            PlanError::FragmentCycle { .. } => "FRAGMENT_CYCLE",
            PlanError::UnknownFragment { .. } => "UNKNOWN_FRAGMENT",
            PlanError::UnknownType { .. } => "UNKNOWN_TYPE",
            PlanError::TypeConditionMismatch { .. } => "TYPE_CONDITION_MISMATCH",
            PlanError::FieldMergeConflict { .. } => "FIELD_MERGE_CONFLICT",
            PlanError::InvalidField { .. } => "INVALID_FIELD",
            PlanError::Coercion { .. } => "COERCION_FAILED",
            PlanError::RecursionLimitExceeded { .. } => "RECURSION_LIMIT_EXCEEDED",
        }
        .to_string()
    }
}

/// A [`PlanError`] together with the document locations it was found at.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
#[error("{error}")]
pub struct CompileError {
    pub error: PlanError,
    pub locations: Vec<ErrorLocation>,
}

impl CompileError {
    pub(crate) fn new(error: PlanError, locations: Vec<ErrorLocation>) -> Self {
        Self { error, locations }
    }

    /// Convert to a GraphQL error. Compile errors have no path.
    pub fn to_graphql_error(&self) -> Error {
        to_graphql_error(&self.error, self.locations.clone(), None)
    }
}

impl From<PlanError> for CompileError {
    fn from(error: PlanError) -> Self {
        Self {
            error,
            locations: Vec::new(),
        }
    }
}

impl From<GraphQLError> for CompileError {
    fn from(error: GraphQLError) -> Self {
        let locations = error
            .locations
            .iter()
            .map(|location| ErrorLocation {
                line: location.line as u32,
                column: location.column as u32,
            })
            .collect();
        Self {
            error: PlanError::Validation {
                message: error.message,
            },
            locations,
        }
    }
}

/// Collect the diagnostics of a document that failed to parse or validate.
pub(crate) fn from_diagnostics<T>(WithErrors { errors, .. }: WithErrors<T>) -> Vec<CompileError> {
    errors
        .iter()
        .map(|diagnostic| CompileError::from(diagnostic.to_json()))
        .collect()
}

/// Error types for field execution.
///
/// These are recovered by null propagation: they are recorded in the
/// response's `errors` and the affected position is nulled.
#[derive(Error, Display, Debug, Clone, Eq, PartialEq)]
#[non_exhaustive]
pub enum ExecutionError {
    /// {message}
    Resolver {
        /// The (possibly masked) resolver message.
        message: String,
        /// Extensions supplied by the resolver.
        extensions: Object,
    },

    /// Cannot return null for non-nullable field {parent_type}.{field_name}.
    NonNullViolation {
        parent_type: String,
        field_name: String,
    },

    /// Variable "${name}" got invalid value; {reason}
    VariableCoercion { name: String, reason: String },

    /// Abstract type "{abstract_type}" must resolve to an Object type at runtime for field "{parent_type}.{field_name}". {reason}
    AbstractResolution {
        abstract_type: String,
        parent_type: String,
        field_name: String,
        reason: String,
    },

    /// Expected Iterable, but did not find one for field "{parent_type}.{field_name}".
    ListExpected {
        parent_type: String,
        field_name: String,
    },

    /// {type_name} cannot represent value: {value}
    InvalidLeafValue { type_name: String, value: String },

    /// Expected an object value for field "{parent_type}.{field_name}" of type "{type_name}".
    ObjectExpected {
        parent_type: String,
        field_name: String,
        type_name: String,
    },

    /// internal error: {reason}
    Internal { reason: String },

    /// operation cancelled
    Cancelled,

    /// operation timed out
    TimedOut,
}

impl ErrorExtension for ExecutionError {
    fn extension_code(&self) -> String {
        match self {
            ExecutionError::Resolver { .. } => "RESOLVER_ERROR",
            ExecutionError::NonNullViolation { .. } => "NON_NULL_VIOLATION",
            ExecutionError::VariableCoercion { .. } => "VALIDATION_INVALID_TYPE_VARIABLE",
            ExecutionError::AbstractResolution { .. } => "ABSTRACT_RESOLUTION_FAILED",
            ExecutionError::ListExpected { .. }
            | ExecutionError::InvalidLeafValue { .. }
            | ExecutionError::ObjectExpected { .. } => ERROR_CODE_RESPONSE_VALIDATION,
            ExecutionError::Internal { .. } => "INTERNAL_SERVER_ERROR",
            ExecutionError::Cancelled | ExecutionError::TimedOut => "OPERATION_CANCELLED",
        }
        .to_string()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        match self {
            ExecutionError::Resolver { extensions, .. } if !extensions.is_empty() => {
                Some(extensions.clone())
            }
            _ => None,
        }
    }
}

impl ExecutionError {
    /// Convert to a GraphQL error located at a response path.
    pub fn to_graphql_error(&self, locations: Vec<ErrorLocation>, path: Option<Path>) -> Error {
        to_graphql_error(self, locations, path)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn plan_errors_carry_codes_and_locations() {
        let error = CompileError::new(
            PlanError::FragmentCycle {
                name: "A".to_string(),
                path: "A -> B -> A".to_string(),
            },
            vec![ErrorLocation { line: 2, column: 5 }],
        );
        assert_eq!(
            serde_json_bytes::to_value(error.to_graphql_error()).unwrap(),
            json!({
                "message": "cannot spread fragment \"A\" within itself via A -> B -> A",
                "locations": [{ "line": 2, "column": 5 }],
                "extensions": { "code": "FRAGMENT_CYCLE" }
            })
        );
    }

    #[test]
    fn resolver_extensions_take_precedence() {
        let mut extensions = Object::new();
        extensions.insert("code", "NOT_FOUND".into());
        extensions.insert("id", 7.into());
        let error = ExecutionError::Resolver {
            message: "no such user".to_string(),
            extensions,
        }
        .to_graphql_error(vec![], Some(path!["user"]));
        assert_eq!(error.extension_code().as_deref(), Some("NOT_FOUND"));
        assert_eq!(error.extensions.get("id"), Some(&json!(7)));
        assert_eq!(error.path, Some(path!["user"]));
    }

    #[test]
    fn non_null_message() {
        let error = ExecutionError::NonNullViolation {
            parent_type: "User".to_string(),
            field_name: "name".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot return null for non-nullable field User.name."
        );
    }
}
