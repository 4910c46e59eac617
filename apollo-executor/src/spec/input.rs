//! Input coercion for literals and variables, and serialization of leaf outputs.
//!
//! Literal values are coerced once, when the plan is compiled. Parts of a
//! literal that reference variables are kept as [`InputValue`] placeholders
//! and resolved against the coerced variables of each request.

use std::collections::HashMap;

use apollo_compiler::ast;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Name;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use super::Schema;
use super::TypeRef;
use crate::error::ExecutionError;
use crate::json_ext::Object;
use crate::json_ext::ValueExt;
use crate::plan::VariableDefinition;

/// An input value coerced at compile time, possibly referencing variables.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// A fully coerced constant.
    Const(Value),
    /// A variable reference, with the default to use when the variable is absent.
    Variable { name: Name, default: Option<Value> },
    List(Vec<InputValue>),
    /// Members in input object definition order.
    Object(Vec<(Name, InputValue)>),
}

impl InputValue {
    fn collapse_list(items: Vec<InputValue>) -> InputValue {
        if items.iter().all(|item| matches!(item, InputValue::Const(_))) {
            InputValue::Const(Value::Array(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        InputValue::Const(value) => Some(value),
                        _ => None,
                    })
                    .collect(),
            ))
        } else {
            InputValue::List(items)
        }
    }

    fn collapse_object(fields: Vec<(Name, InputValue)>) -> InputValue {
        if fields
            .iter()
            .all(|(_, value)| matches!(value, InputValue::Const(_)))
        {
            let mut object = Object::with_capacity(fields.len());
            for (name, value) in fields {
                if let InputValue::Const(value) = value {
                    object.insert(ByteString::from(name.as_str()), value);
                }
            }
            InputValue::Const(Value::Object(object))
        } else {
            InputValue::Object(fields)
        }
    }

    /// Whether the value references at least one variable.
    pub fn has_variables(&self) -> bool {
        !matches!(self, InputValue::Const(_))
    }

    /// Substitute coerced variables.
    ///
    /// Returns `Ok(None)` when the value is absent: a variable that was not
    /// provided and has no default.
    pub(crate) fn resolve(&self, variables: &Variables) -> Result<Option<Value>, ExecutionError> {
        match self {
            InputValue::Const(value) => Ok(Some(value.clone())),
            InputValue::Variable { name, default } => {
                if let Some(error) = variables.failures.get(name.as_str()) {
                    return Err(error.clone());
                }
                Ok(variables
                    .values
                    .get(name.as_str())
                    .cloned()
                    .or_else(|| default.clone()))
            }
            InputValue::List(items) => items
                .iter()
                .map(|item| Ok(item.resolve(variables)?.unwrap_or(Value::Null)))
                .collect::<Result<Vec<_>, _>>()
                .map(|items| Some(Value::Array(items))),
            InputValue::Object(fields) => {
                let mut object = Object::with_capacity(fields.len());
                for (name, value) in fields {
                    if let Some(value) = value.resolve(variables)? {
                        object.insert(ByteString::from(name.as_str()), value);
                    }
                }
                Ok(Some(Value::Object(object)))
            }
        }
    }
}

/// Variables of one request, coerced against the operation's definitions.
#[derive(Debug, Default, Clone)]
pub(crate) struct Variables {
    pub(crate) values: Object,
    /// Variables that failed coercion. The error surfaces on every field using them.
    pub(crate) failures: HashMap<String, ExecutionError>,
}

impl Variables {
    pub(crate) fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }
}

/// Coerce the raw variables of a request.
///
/// Failures do not abort the request: they are recorded per variable.
pub(crate) fn coerce_variables(
    schema: &Schema,
    definitions: &[VariableDefinition],
    raw: &Object,
) -> Variables {
    let mut variables = Variables::default();
    for definition in definitions {
        let name = definition.name.as_str();
        let coerced = match raw.get(name) {
            Some(value) => coerce_variable_value(schema, &definition.ty, value).map(Some),
            None => match &definition.default {
                Some(default) => Ok(Some(default.clone())),
                None if definition.ty.is_non_null() => Err(format!(
                    "Variable \"${name}\" of required type \"{}\" was not provided.",
                    definition.ty
                )),
                None => Ok(None),
            },
        };
        match coerced {
            Ok(Some(value)) => {
                variables.values.insert(name, value);
            }
            Ok(None) => {}
            Err(reason) => {
                tracing::debug!("variable ${name} failed coercion: {reason}");
                variables.failures.insert(
                    name.to_string(),
                    ExecutionError::VariableCoercion {
                        name: name.to_string(),
                        reason,
                    },
                );
            }
        }
    }
    variables
}

// Spec: https://spec.graphql.org/October2021/#sec-Coercing-Variable-Values
pub(crate) fn coerce_variable_value(
    schema: &Schema,
    ty: &TypeRef,
    value: &Value,
) -> Result<Value, String> {
    match (ty, value) {
        (TypeRef::NonNull(_), Value::Null) => Err(format!(
            "Expected non-nullable type \"{ty}\" not to be null."
        )),
        (TypeRef::NonNull(inner), value) => coerce_variable_value(schema, inner, value),
        (_, Value::Null) => Ok(Value::Null),
        (TypeRef::List(item), Value::Array(values)) => values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                coerce_variable_value(schema, item, value)
                    .map_err(|reason| format!("{reason} At index {index}."))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        // For coercion from single value to list
        (TypeRef::List(item), value) => {
            coerce_variable_value(schema, item, value).map(|value| Value::Array(vec![value]))
        }
        (TypeRef::Named(name), value) => coerce_named_variable(schema, name, value),
    }
}

fn coerce_named_variable(schema: &Schema, name: &Name, value: &Value) -> Result<Value, String> {
    let invalid = || {
        format!(
            "{} cannot represent value: {}",
            name.as_str(),
            value.describe()
        )
    };
    match schema.definitions().types.get(name) {
        Some(ExtendedType::Scalar(_)) => match name.as_str() {
            // Spec: https://spec.graphql.org/October2021/#sec-Int.Input-Coercion
            "Int" if value.is_valid_int_input() => Ok(value.clone()),
            // Spec: https://spec.graphql.org/October2021/#sec-Float.Input-Coercion
            "Float" if value.is_valid_float_input() => value
                .as_f64()
                .map(Value::from)
                .ok_or_else(invalid),
            "String" if value.is_string() => Ok(value.clone()),
            "Boolean" if value.is_boolean() => Ok(value.clone()),
            "ID" if value.is_string() => Ok(value.clone()),
            "ID" if value.is_i64() || value.is_u64() => Ok(Value::String(
                serde_json::to_string(value).map_err(|_| invalid())?.into(),
            )),
            "Int" | "Float" | "String" | "Boolean" | "ID" => Err(invalid()),
            _ => Ok(value.clone()),
        },
        Some(ExtendedType::Enum(enum_)) => match value.as_str() {
            Some(variant) if enum_.values.contains_key(variant) => Ok(value.clone()),
            _ => Err(invalid()),
        },
        Some(ExtendedType::InputObject(input)) => {
            let Some(fields) = value.as_object() else {
                return Err(format!(
                    "Expected type \"{}\" to be an object.",
                    name.as_str()
                ));
            };
            if let Some(unknown) = fields
                .keys()
                .find(|key| !input.fields.contains_key(key.as_str()))
            {
                return Err(format!(
                    "Field \"{}\" is not defined by type \"{}\".",
                    unknown.as_str(),
                    name.as_str()
                ));
            }
            let mut object = Object::with_capacity(input.fields.len());
            for (field_name, definition) in &input.fields {
                let field_ty = TypeRef::from(&*definition.ty);
                match fields.get(field_name.as_str()) {
                    Some(field_value) => {
                        let coerced = coerce_variable_value(schema, &field_ty, field_value)
                            .map_err(|reason| {
                                format!("{reason} At field \"{}\".", field_name.as_str())
                            })?;
                        object.insert(ByteString::from(field_name.as_str()), coerced);
                    }
                    None => match &definition.default_value {
                        Some(default) => {
                            object.insert(
                                ByteString::from(field_name.as_str()),
                                coerce_const_literal(schema, &field_ty, default)?,
                            );
                        }
                        None if field_ty.is_non_null() => {
                            return Err(format!(
                                "Field \"{}\" of required type \"{field_ty}\" was not provided.",
                                field_name.as_str()
                            ))
                        }
                        None => {}
                    },
                }
            }
            Ok(Value::Object(object))
        }
        _ => Err(format!(
            "\"{}\" is not an input type.",
            name.as_str()
        )),
    }
}

/// Coerce a literal that cannot contain variables, such as a schema default.
pub(crate) fn coerce_const_literal(
    schema: &Schema,
    ty: &TypeRef,
    value: &ast::Value,
) -> Result<Value, String> {
    match coerce_literal(schema, ty, value)? {
        InputValue::Const(value) => Ok(value),
        _ => Err("Unexpected variable in constant value.".to_string()),
    }
}

// Spec: https://spec.graphql.org/October2021/#sec-Input-Values
pub(crate) fn coerce_literal(
    schema: &Schema,
    ty: &TypeRef,
    value: &ast::Value,
) -> Result<InputValue, String> {
    match (ty, value) {
        (_, ast::Value::Variable(name)) => Ok(InputValue::Variable {
            name: name.clone(),
            default: None,
        }),
        (TypeRef::NonNull(_), ast::Value::Null) => Err(format!(
            "Expected value of non-null type \"{ty}\" not to be null."
        )),
        (TypeRef::NonNull(inner), value) => coerce_literal(schema, inner, value),
        (_, ast::Value::Null) => Ok(InputValue::Const(Value::Null)),
        (TypeRef::List(item), ast::Value::List(values)) => values
            .iter()
            .enumerate()
            .map(|(index, value)| {
                coerce_literal(schema, item, value)
                    .map_err(|reason| format!("{reason} At index {index}."))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(InputValue::collapse_list),
        (TypeRef::List(item), value) => coerce_literal(schema, item, value)
            .map(|value| InputValue::collapse_list(vec![value])),
        (TypeRef::Named(name), value) => coerce_named_literal(schema, name, value),
    }
}

fn coerce_named_literal(
    schema: &Schema,
    name: &Name,
    value: &ast::Value,
) -> Result<InputValue, String> {
    let invalid = || format!("{} cannot represent value: {value}", name.as_str());
    match schema.definitions().types.get(name) {
        Some(ExtendedType::Scalar(_)) => {
            let coerced = match (name.as_str(), value) {
                ("Int", ast::Value::Int(int)) => {
                    Value::from(int.try_to_i32().map_err(|_| invalid())?)
                }
                ("Float", ast::Value::Int(int)) => {
                    Value::from(int.try_to_f64().map_err(|_| invalid())?)
                }
                ("Float", ast::Value::Float(float)) => {
                    Value::from(float.try_to_f64().map_err(|_| invalid())?)
                }
                ("String" | "ID", ast::Value::String(string)) => Value::from(string.as_str()),
                ("ID", ast::Value::Int(int)) => Value::from(int.as_str()),
                ("Boolean", ast::Value::Boolean(boolean)) => Value::Bool(*boolean),
                ("Int" | "Float" | "String" | "Boolean" | "ID", _) => return Err(invalid()),
                _ => return Ok(custom_scalar_literal(value)),
            };
            Ok(InputValue::Const(coerced))
        }
        Some(ExtendedType::Enum(enum_)) => match value {
            ast::Value::Enum(variant) if enum_.values.contains_key(variant) => {
                Ok(InputValue::Const(Value::from(variant.as_str())))
            }
            _ => Err(invalid()),
        },
        Some(ExtendedType::InputObject(input)) => {
            let ast::Value::Object(provided) = value else {
                return Err(format!(
                    "Expected type \"{}\" to be an object.",
                    name.as_str()
                ));
            };
            if let Some((unknown, _)) = provided
                .iter()
                .find(|(key, _)| !input.fields.contains_key(key))
            {
                return Err(format!(
                    "Field \"{}\" is not defined by type \"{}\".",
                    unknown.as_str(),
                    name.as_str()
                ));
            }
            let mut fields = Vec::with_capacity(input.fields.len());
            for (field_name, definition) in &input.fields {
                let field_ty = TypeRef::from(&*definition.ty);
                let default = definition
                    .default_value
                    .as_ref()
                    .map(|default| coerce_const_literal(schema, &field_ty, default))
                    .transpose()?;
                match provided.iter().find(|(key, _)| key == field_name) {
                    Some((_, field_value)) => {
                        let coerced = coerce_literal(schema, &field_ty, field_value)
                            .map_err(|reason| {
                                format!("{reason} At field \"{}\".", field_name.as_str())
                            })?;
                        fields.push((field_name.clone(), with_default(coerced, default)));
                    }
                    None => match default {
                        Some(default) => {
                            fields.push((field_name.clone(), InputValue::Const(default)))
                        }
                        None if field_ty.is_non_null() => {
                            return Err(format!(
                                "Field \"{}\" of required type \"{field_ty}\" was not provided.",
                                field_name.as_str()
                            ))
                        }
                        None => {}
                    },
                }
            }
            Ok(InputValue::collapse_object(fields))
        }
        _ => Err(format!("\"{}\" is not an input type.", name.as_str())),
    }
}

/// Attach the default used when a variable in this position is absent.
pub(crate) fn with_default(value: InputValue, default: Option<Value>) -> InputValue {
    match value {
        InputValue::Variable { name, .. } => InputValue::Variable { name, default },
        other => other,
    }
}

/// Custom scalars accept any literal; it is passed to resolvers as JSON.
fn custom_scalar_literal(value: &ast::Value) -> InputValue {
    match value {
        ast::Value::Null => InputValue::Const(Value::Null),
        ast::Value::Variable(name) => InputValue::Variable {
            name: name.clone(),
            default: None,
        },
        ast::Value::Enum(name) => InputValue::Const(Value::from(name.as_str())),
        ast::Value::String(string) => InputValue::Const(Value::from(string.as_str())),
        ast::Value::Boolean(boolean) => InputValue::Const(Value::Bool(*boolean)),
        ast::Value::Int(int) => InputValue::Const(
            int.as_str()
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| int.try_to_f64().map(Value::from))
                .unwrap_or(Value::Null),
        ),
        ast::Value::Float(float) => {
            InputValue::Const(float.try_to_f64().map(Value::from).unwrap_or(Value::Null))
        }
        ast::Value::List(items) => InputValue::collapse_list(
            items.iter().map(|item| custom_scalar_literal(item)).collect(),
        ),
        ast::Value::Object(fields) => InputValue::collapse_object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), custom_scalar_literal(value)))
                .collect(),
        ),
    }
}

/// Serialize a value returned by a resolver for a leaf type.
// Spec: https://spec.graphql.org/October2021/#sec-Scalars.Result-Coercion-and-Serialization
pub(crate) fn serialize_leaf(schema: &Schema, type_name: &Name, value: &Value) -> Option<Value> {
    match schema.definitions().types.get(type_name)? {
        ExtendedType::Scalar(_) => match (type_name.as_str(), value) {
            ("Int", Value::Number(number)) => {
                if let Some(int) = number.as_i64() {
                    i32::try_from(int).ok().map(Value::from)
                } else {
                    number
                        .as_f64()
                        .filter(|float| {
                            float.fract() == 0.0
                                && *float >= f64::from(i32::MIN)
                                && *float <= f64::from(i32::MAX)
                        })
                        .map(|float| Value::from(float as i32))
                }
            }
            ("Int", Value::Bool(boolean)) => Some(Value::from(i32::from(*boolean))),
            ("Float", Value::Number(number)) => number.as_f64().map(Value::from),
            ("Float", Value::Bool(boolean)) => Some(Value::from(if *boolean { 1.0 } else { 0.0 })),
            ("String", Value::String(_)) => Some(value.clone()),
            ("String", Value::Number(_) | Value::Bool(_)) => serde_json::to_string(value)
                .ok()
                .map(Value::from),
            ("Boolean", Value::Bool(_)) => Some(value.clone()),
            ("ID", Value::String(_)) => Some(value.clone()),
            ("ID", Value::Number(number)) if number.is_i64() || number.is_u64() => {
                Some(Value::from(number.to_string()))
            }
            ("Int" | "Float" | "String" | "Boolean" | "ID", _) => None,
            _ => Some(value.clone()),
        },
        ExtendedType::Enum(enum_) => match value.as_str() {
            Some(variant) if enum_.values.contains_key(variant) => Some(value.clone()),
            _ => None,
        },
        _ => None,
    }
}
