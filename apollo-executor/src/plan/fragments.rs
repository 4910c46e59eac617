use apollo_compiler::Name;

use crate::error::PlanError;
use crate::spec::Schema;
use crate::spec::TypeId;

/// The named fragments being inlined, outermost first.
///
/// Fields keep the stack they were collected under, so a fragment spread
/// inside the subselection of its own field is a cycle too.
#[derive(Debug, Clone, Default)]
pub(super) struct SpreadStack {
    names: Vec<Name>,
}

impl SpreadStack {
    /// Enters a fragment spread, failing if it is already being inlined.
    pub(super) fn enter(&mut self, name: &Name) -> Result<(), PlanError> {
        if let Some(start) = self.names.iter().position(|entered| entered == name) {
            let path = self.names[start..]
                .iter()
                .chain(std::iter::once(name))
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(PlanError::FragmentCycle {
                name: name.to_string(),
                path,
            });
        }
        self.names.push(name.clone());
        Ok(())
    }

    pub(super) fn exit(&mut self) {
        self.names.pop();
    }
}

/// Resolves the type condition of a fragment spread in a selection set of
/// type `parent_type`.
///
/// The condition must name a composite type that shares at least one
/// possible type with the parent.
pub(super) fn type_condition(
    schema: &Schema,
    type_condition: &Name,
    parent_type: &Name,
) -> Result<TypeId, PlanError> {
    let condition = schema
        .type_id(type_condition)
        .ok_or_else(|| PlanError::UnknownType {
            name: type_condition.to_string(),
        })?;
    let parent = schema
        .type_id(parent_type)
        .ok_or_else(|| PlanError::UnknownType {
            name: parent_type.to_string(),
        })?;
    if !schema.is_composite(condition) || !schema.overlaps(condition, parent) {
        return Err(PlanError::TypeConditionMismatch {
            parent_type: parent_type.to_string(),
            type_condition: type_condition.to_string(),
        });
    }
    Ok(condition)
}
