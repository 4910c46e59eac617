//! Compilation of an operation into an [`ExecutionPlan`].
//!
//! Fragments are inlined, fields sharing a response key are merged and
//! literal arguments are coerced. What cannot be decided before variables
//! are known is kept as a [`Condition`] or an [`InputValue`] placeholder.

use apollo_compiler::ast::OperationType;
use apollo_compiler::executable;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::name;
use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use indexmap::IndexMap;
use serde_json_bytes::ByteString;

use super::fragments;
use super::fragments::SpreadStack;
use super::operation_kind;
use super::Condition;
use super::ExecutionNode;
use super::ExecutionPlan;
use super::SelectionPlan;
use super::Subselection;
use super::VariableDefinition;
use crate::error::from_diagnostics;
use crate::error::CompileError;
use crate::error::PlanError;
use crate::execution::introspection;
use crate::execution::FieldResolver;
use crate::execution::Resolvers;
use crate::graphql::Location;
use crate::spec::input::coerce_const_literal;
use crate::spec::input::coerce_literal;
use crate::spec::input::with_default;
use crate::spec::input::InputValue;
use crate::spec::Schema;
use crate::spec::TypeId;
use crate::spec::TypeKind;
use crate::spec::TypeRef;
use crate::spec::TYPENAME;

/// Parse, validate and compile `query`.
///
/// Parse and validation diagnostics are all reported; compilation stops at
/// the first structural error.
pub fn compile(
    schema: &Schema,
    resolvers: &Resolvers,
    query: &str,
    operation_name: Option<&str>,
    recursion_limit: usize,
) -> Result<ExecutionPlan, Vec<CompileError>> {
    if query.trim().is_empty() {
        return Err(vec![PlanError::MissingQuery.into()]);
    }
    let document =
        ExecutableDocument::parse_and_validate(schema.definitions(), query, "query.graphql")
            .map_err(from_diagnostics)?;
    compile_document(schema, resolvers, &document, operation_name, recursion_limit)
        .map_err(|error| vec![error])
}

/// Compile one operation of an already parsed document.
///
/// The document is not validated again; only the checks needed to build a
/// sound plan are performed.
pub fn compile_document(
    schema: &Schema,
    resolvers: &Resolvers,
    document: &ExecutableDocument,
    operation_name: Option<&str>,
    recursion_limit: usize,
) -> Result<ExecutionPlan, CompileError> {
    let operation = document
        .operations
        .get(operation_name)
        .map_err(|_| match operation_name {
            Some(name) => PlanError::UnknownOperation {
                name: name.to_string(),
            },
            None => PlanError::OperationNameRequired,
        })?;
    let root_type = root_type(schema, operation.operation_type)?;

    let mut compiler = Compiler {
        schema,
        resolvers,
        document,
        recursion_limit,
        spreads: SpreadStack::default(),
        variable_conditional: false,
    };
    let variables = operation
        .variables
        .iter()
        .map(|definition| compiler.variable_definition(definition))
        .collect::<Result<Vec<_>, _>>()?;
    let root = compiler.selection_plan(
        &root_type,
        &[(&operation.selection_set, Condition::Yes, SpreadStack::default())],
        0,
    )?;

    let plan = ExecutionPlan {
        kind: operation.operation_type,
        operation_name: operation.name.clone(),
        root_type,
        root,
        variables,
        variable_conditional: compiler.variable_conditional,
    };
    tracing::trace!("compiled plan:\n{plan}");
    Ok(plan)
}

fn root_type(schema: &Schema, kind: OperationType) -> Result<Name, PlanError> {
    schema
        .root_type(kind)
        .cloned()
        .ok_or_else(|| PlanError::MissingRootType {
            operation: operation_kind(kind).to_string(),
        })
}

/// One occurrence of a response key, with the condition under which it was
/// selected and the fragments it was inlined from.
struct Occurrence<'a> {
    field: &'a Node<executable::Field>,
    condition: Condition,
    spreads: SpreadStack,
}

/// A selection set contributing fields to a selection plan.
type Contribution<'a> = (&'a SelectionSet, Condition, SpreadStack);

struct Compiler<'a> {
    schema: &'a Schema,
    resolvers: &'a Resolvers,
    document: &'a ExecutableDocument,
    recursion_limit: usize,
    spreads: SpreadStack,
    variable_conditional: bool,
}

impl<'a> Compiler<'a> {
    fn locations<T>(&self, node: &Node<T>) -> Vec<Location> {
        node.line_column_range(&self.document.sources)
            .map(|range| Location {
                line: range.start.line as u32,
                column: range.start.column as u32,
            })
            .into_iter()
            .collect()
    }

    fn variable_definition(
        &self,
        definition: &Node<executable::VariableDefinition>,
    ) -> Result<VariableDefinition, CompileError> {
        let ty = TypeRef::from(&*definition.ty);
        let default = definition
            .default_value
            .as_ref()
            .map(|value| coerce_const_literal(self.schema, &ty, value))
            .transpose()
            .map_err(|reason| {
                CompileError::new(
                    PlanError::Coercion {
                        target: format!("default value of variable \"${}\"", definition.name),
                        reason,
                    },
                    self.locations(definition),
                )
            })?;
        Ok(VariableDefinition {
            name: definition.name.clone(),
            ty,
            default,
        })
    }

    /// Builds the plan of the fields selected on `concrete_type` by `sets`.
    ///
    /// Each set comes with the condition under which its fields are selected.
    fn selection_plan(
        &mut self,
        concrete_type: &Name,
        sets: &[Contribution<'a>],
        depth: usize,
    ) -> Result<SelectionPlan, CompileError> {
        let mut fields: IndexMap<Name, Vec<Occurrence<'a>>> = IndexMap::new();
        for (set, condition, spreads) in sets {
            self.spreads = spreads.clone();
            self.collect_fields(concrete_type, set, condition.clone(), depth, &mut fields)?;
        }
        let nodes = fields
            .into_iter()
            .map(|(response_key, occurrences)| {
                self.execution_node(concrete_type, response_key, occurrences, depth)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(SelectionPlan { nodes })
    }

    // Spec: https://spec.graphql.org/October2021/#CollectFields()
    fn collect_fields(
        &mut self,
        concrete_type: &Name,
        set: &'a SelectionSet,
        condition: Condition,
        depth: usize,
        fields: &mut IndexMap<Name, Vec<Occurrence<'a>>>,
    ) -> Result<(), CompileError> {
        if depth > self.recursion_limit {
            tracing::error!(
                "selection nesting exceeds the recursion limit of {}",
                self.recursion_limit
            );
            return Err(PlanError::RecursionLimitExceeded {
                limit: self.recursion_limit,
            }
            .into());
        }

        for selection in &set.selections {
            match selection {
                Selection::Field(field) => {
                    let condition = condition.clone().and(Condition::parse(&field.directives));
                    if condition == Condition::No {
                        continue;
                    }
                    if field.directives.get("stream").is_some() {
                        tracing::warn!(
                            "@stream is not supported, field \"{}\" is delivered in full",
                            field.response_key()
                        );
                    }
                    fields
                        .entry(field.response_key().clone())
                        .or_default()
                        .push(Occurrence {
                            field,
                            condition,
                            spreads: self.spreads.clone(),
                        });
                }
                Selection::InlineFragment(inline) => {
                    let condition = condition.clone().and(Condition::parse(&inline.directives));
                    if condition == Condition::No {
                        continue;
                    }
                    warn_deferred(&inline.directives);
                    if let Some(type_condition) = &inline.type_condition {
                        let type_condition =
                            fragments::type_condition(self.schema, type_condition, &set.ty)
                                .map_err(|error| CompileError::new(error, self.locations(inline)))?;
                        if !self.applies(type_condition, concrete_type) {
                            continue;
                        }
                    }
                    // fragments do not nest the response: same depth
                    self.collect_fields(
                        concrete_type,
                        &inline.selection_set,
                        condition,
                        depth,
                        fields,
                    )?;
                }
                Selection::FragmentSpread(spread) => {
                    let condition = condition.clone().and(Condition::parse(&spread.directives));
                    if condition == Condition::No {
                        continue;
                    }
                    warn_deferred(&spread.directives);
                    let name = &spread.fragment_name;
                    let fragment = self.document.fragments.get(name).ok_or_else(|| {
                        CompileError::new(
                            PlanError::UnknownFragment {
                                name: name.to_string(),
                            },
                            self.locations(spread),
                        )
                    })?;
                    let type_condition =
                        fragments::type_condition(self.schema, &fragment.selection_set.ty, &set.ty)
                            .map_err(|error| CompileError::new(error, self.locations(spread)))?;
                    if !self.applies(type_condition, concrete_type) {
                        continue;
                    }
                    self.spreads
                        .enter(name)
                        .map_err(|error| CompileError::new(error, self.locations(spread)))?;
                    self.collect_fields(
                        concrete_type,
                        &fragment.selection_set,
                        condition,
                        depth,
                        fields,
                    )?;
                    self.spreads.exit();
                }
            }
        }
        Ok(())
    }

    /// Whether a fragment with this type condition selects fields on `concrete_type`.
    fn applies(&self, type_condition: TypeId, concrete_type: &Name) -> bool {
        self.schema
            .type_id(concrete_type)
            .is_some_and(|concrete| self.schema.is_possible_type(type_condition, concrete))
    }

    fn execution_node(
        &mut self,
        concrete_type: &Name,
        response_key: Name,
        occurrences: Vec<Occurrence<'a>>,
        depth: usize,
    ) -> Result<ExecutionNode, CompileError> {
        let locations: Vec<Location> = occurrences
            .iter()
            .flat_map(|occurrence| self.locations(occurrence.field))
            .collect();
        let Some((first, others)) = occurrences.split_first() else {
            failfast_debug!("no occurrence for response key {response_key}");
            return Err(PlanError::InvalidField {
                type_name: concrete_type.to_string(),
                field_name: response_key.to_string(),
            }
            .into());
        };
        for other in others {
            let conflict = if other.field.name != first.field.name {
                Some(format!(
                    "\"{}\" and \"{}\" are different fields",
                    first.field.name, other.field.name
                ))
            } else if !same_arguments(first.field, other.field) {
                Some("they have differing arguments".to_string())
            } else {
                None
            };
            if let Some(reason) = conflict {
                return Err(CompileError::new(
                    PlanError::FieldMergeConflict {
                        response_key: response_key.to_string(),
                        reason,
                    },
                    locations,
                ));
            }
        }

        let condition = occurrences
            .iter()
            .fold(Condition::No, |condition, occurrence| {
                condition.or(occurrence.condition.clone())
            });
        if condition.is_variable() {
            self.variable_conditional = true;
        }

        let field_name = first.field.name.clone();
        if field_name == TYPENAME {
            return Ok(ExecutionNode {
                response_key: ByteString::from(response_key.as_str()),
                field_name,
                parent_type: concrete_type.clone(),
                arguments: Vec::new(),
                ty: TypeRef::non_null(TypeRef::named(name!("String"))),
                condition,
                resolver: FieldResolver::Constant(concrete_type.as_str().into()),
                locations,
                subselection: None,
            });
        }

        let definition = self
            .schema
            .field_definition(concrete_type, &field_name)
            .ok_or_else(|| {
                CompileError::new(
                    PlanError::InvalidField {
                        type_name: concrete_type.to_string(),
                        field_name: field_name.to_string(),
                    },
                    locations.clone(),
                )
            })?;
        let ty = TypeRef::from(&definition.ty);
        let arguments = self
            .arguments(concrete_type, definition, first.field)
            .map_err(|error| CompileError::new(error, locations.clone()))?;

        let subselection = self.subselection(&ty, &occurrences, &condition, depth)?;

        Ok(ExecutionNode {
            response_key: ByteString::from(response_key.as_str()),
            resolver: introspection::resolver(self.schema, concrete_type, &field_name)
                .unwrap_or_else(|| self.resolvers.lookup(concrete_type, &field_name)),
            field_name,
            parent_type: concrete_type.clone(),
            arguments,
            ty,
            condition,
            locations,
            subselection,
        })
    }

    fn subselection(
        &mut self,
        ty: &TypeRef,
        occurrences: &[Occurrence<'a>],
        condition: &Condition,
        depth: usize,
    ) -> Result<Option<Subselection>, CompileError> {
        let type_name = ty.inner_named_type();
        let type_id = self.schema.type_id(type_name).ok_or_else(|| {
            CompileError::from(PlanError::UnknownType {
                name: type_name.to_string(),
            })
        })?;
        if !self.schema.is_composite(type_id) {
            return Ok(None);
        }

        // When every occurrence is selected under the same condition, the
        // node's own condition already covers the children.
        let uniform = occurrences
            .iter()
            .all(|occurrence| &occurrence.condition == condition);
        let sets: Vec<Contribution<'a>> = occurrences
            .iter()
            .map(|occurrence| {
                let condition = if uniform {
                    Condition::Yes
                } else {
                    occurrence.condition.clone()
                };
                (
                    &occurrence.field.selection_set,
                    condition,
                    occurrence.spreads.clone(),
                )
            })
            .collect();

        if self.schema.kind(type_id) == TypeKind::Object {
            return Ok(Some(Subselection::Object(self.selection_plan(
                type_name,
                &sets,
                depth + 1,
            )?)));
        }
        let schema = self.schema;
        let mut plans = IndexMap::new();
        for &possible_type in schema.possible_types(type_id) {
            let possible_type = schema.type_name(possible_type).clone();
            let plan = self.selection_plan(&possible_type, &sets, depth + 1)?;
            plans.insert(possible_type, plan);
        }
        Ok(Some(Subselection::Abstract(plans)))
    }

    fn arguments(
        &self,
        concrete_type: &Name,
        definition: &apollo_compiler::schema::FieldDefinition,
        field: &executable::Field,
    ) -> Result<Vec<(Name, InputValue)>, PlanError> {
        let target = |argument: &Name| {
            format!(
                "argument \"{argument}\" of field \"{concrete_type}.{}\"",
                definition.name
            )
        };
        if let Some(unknown) = field.arguments.iter().find(|argument| {
            !definition
                .arguments
                .iter()
                .any(|defined| defined.name == argument.name)
        }) {
            return Err(PlanError::Coercion {
                target: target(&unknown.name),
                reason: "unknown argument".to_string(),
            });
        }

        let mut arguments = Vec::with_capacity(definition.arguments.len());
        for argument_definition in &definition.arguments {
            let name = &argument_definition.name;
            let ty = TypeRef::from(&*argument_definition.ty);
            let coercion = |reason| PlanError::Coercion {
                target: target(name),
                reason,
            };
            let default = argument_definition
                .default_value
                .as_ref()
                .map(|value| coerce_const_literal(self.schema, &ty, value))
                .transpose()
                .map_err(coercion)?;
            match field
                .arguments
                .iter()
                .find(|argument| &argument.name == name)
            {
                Some(argument) => {
                    let value = coerce_literal(self.schema, &ty, &argument.value).map_err(coercion)?;
                    arguments.push((name.clone(), with_default(value, default)));
                }
                None => match default {
                    Some(default) => arguments.push((name.clone(), InputValue::Const(default))),
                    None if ty.is_non_null() => {
                        return Err(coercion(format!(
                            "argument of required type \"{ty}\" was not provided"
                        )))
                    }
                    None => {}
                },
            }
        }
        Ok(arguments)
    }
}

fn warn_deferred(directives: &executable::DirectiveList) {
    if directives.get("defer").is_some() {
        tracing::warn!("@defer is not supported, deferred fragments are delivered eagerly");
    }
}

/// Whether two occurrences pass the same arguments, in any order.
fn same_arguments(left: &executable::Field, right: &executable::Field) -> bool {
    if left.arguments.len() != right.arguments.len() {
        return false;
    }
    left.arguments.iter().all(|argument| {
        right
            .arguments
            .iter()
            .any(|other| other.name == argument.name && other.value == argument.value)
    })
}
