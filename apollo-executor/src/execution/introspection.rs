//! Schema introspection.
//!
//! The `__schema` and `__type` meta-fields of the query root, and every field
//! of the introspection types, are answered from the [`Schema`] itself. The
//! introspection types are part of the schema's built-in definitions, so
//! plans select them like any other object type; only their values come from
//! here.

use std::any::Any;

use apollo_compiler::ast;
use apollo_compiler::ast::OperationType;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::Node;
use serde_json_bytes::Value;

use super::resolver::FieldError;
use super::resolver::FieldResolver;
use super::resolver::FieldResult;
use super::resolver::FieldValue;
use super::resolver::ObjectRef;
use super::resolver::Resolution;
use super::resolver::Resolve;
use super::resolver::ResolveInfo;
use crate::spec::Schema;
use crate::spec::TypeRef;

const SCHEMA_FIELD: &str = "__schema";
const TYPE_FIELD: &str = "__type";
const DEFAULT_DEPRECATION_REASON: &str = "No longer supported";

const SCHEMA_TYPE: &str = "__Schema";
const TYPE_TYPE: &str = "__Type";
const FIELD_TYPE: &str = "__Field";
const INPUT_VALUE_TYPE: &str = "__InputValue";
const ENUM_VALUE_TYPE: &str = "__EnumValue";
const DIRECTIVE_TYPE: &str = "__Directive";

/// The resolver of `parent_type.field_name` when the field belongs to
/// introspection.
pub(crate) fn resolver(
    schema: &Schema,
    parent_type: &str,
    field_name: &str,
) -> Option<FieldResolver> {
    let meta_field = matches!(field_name, SCHEMA_FIELD | TYPE_FIELD)
        && schema
            .root_type(OperationType::Query)
            .is_some_and(|root| root.as_str() == parent_type);
    let introspection_type = matches!(
        parent_type,
        SCHEMA_TYPE | TYPE_TYPE | FIELD_TYPE | INPUT_VALUE_TYPE | ENUM_VALUE_TYPE | DIRECTIVE_TYPE
    );
    (meta_field || introspection_type).then(|| {
        FieldResolver::new(Introspection {
            schema: schema.clone(),
        })
    })
}

struct SchemaHandle;

struct TypeHandle(TypeRef);

struct FieldHandle(Node<ast::FieldDefinition>);

struct InputValueHandle(Node<ast::InputValueDefinition>);

struct EnumValueHandle(Node<ast::EnumValueDefinition>);

struct DirectiveHandle(Node<ast::DirectiveDefinition>);

struct Introspection {
    schema: Schema,
}

impl Resolve for Introspection {
    fn resolve(&self, parent: &ObjectRef, info: &ResolveInfo<'_>) -> Resolution {
        Resolution::Ready(self.field(parent, info))
    }
}

impl Introspection {
    fn field(&self, parent: &ObjectRef, info: &ResolveInfo<'_>) -> FieldResult {
        let include_deprecated = info
            .argument("includeDeprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let value = match info.parent_type {
            SCHEMA_TYPE => self.schema_field(info.field_name),
            TYPE_TYPE => {
                let TypeHandle(ty) = handle::<TypeHandle>(parent, TYPE_TYPE)?;
                self.type_field(ty, info.field_name, include_deprecated)?
            }
            FIELD_TYPE => {
                let FieldHandle(field) = handle::<FieldHandle>(parent, FIELD_TYPE)?;
                field_field(field, info.field_name, include_deprecated)
            }
            INPUT_VALUE_TYPE => {
                let InputValueHandle(value) = handle::<InputValueHandle>(parent, INPUT_VALUE_TYPE)?;
                input_value_field(value, info.field_name)
            }
            ENUM_VALUE_TYPE => {
                let EnumValueHandle(value) = handle::<EnumValueHandle>(parent, ENUM_VALUE_TYPE)?;
                match info.field_name {
                    "name" => leaf(value.value.as_str()),
                    "description" => string(value.description.as_ref()),
                    "isDeprecated" => leaf(deprecation(&value.directives).is_some()),
                    "deprecationReason" => optional_string(deprecation(&value.directives)),
                    _ => None,
                }
            }
            DIRECTIVE_TYPE => {
                let DirectiveHandle(directive) = handle::<DirectiveHandle>(parent, DIRECTIVE_TYPE)?;
                match info.field_name {
                    "name" => leaf(directive.name.as_str()),
                    "description" => string(directive.description.as_ref()),
                    "locations" => Some(FieldValue::List(
                        directive
                            .locations
                            .iter()
                            .map(|location| FieldValue::Leaf(location.name().into()))
                            .collect(),
                    )),
                    "args" => Some(input_values(directive.arguments.iter(), include_deprecated)),
                    "isRepeatable" => leaf(directive.repeatable),
                    _ => None,
                }
            }
            _ => match info.field_name {
                SCHEMA_FIELD => Some(FieldValue::object(SchemaHandle)),
                TYPE_FIELD => Some(
                    info.argument("name")
                        .and_then(Value::as_str)
                        .and_then(|name| self.named_type(name))
                        .into(),
                ),
                _ => None,
            },
        };
        value.ok_or_else(|| {
            FieldError::new(format!(
                "{}.{} is not an introspection field",
                info.parent_type, info.field_name
            ))
        })
    }

    fn named_type(&self, name: &str) -> Option<FieldValue> {
        let (name, _) = self.schema.definitions().types.get_key_value(name)?;
        Some(type_value(TypeRef::named(name.clone())))
    }

    fn root_type(&self, kind: OperationType) -> FieldValue {
        self.schema
            .root_type(kind)
            .map(|name| type_value(TypeRef::named(name.clone())))
            .into()
    }

    fn schema_field(&self, field_name: &str) -> Option<FieldValue> {
        let definitions = self.schema.definitions();
        Some(match field_name {
            "description" => string(definitions.schema_definition.description.as_ref())?,
            "types" => FieldValue::List(
                definitions
                    .types
                    .keys()
                    .map(|name| type_value(TypeRef::named(name.clone())))
                    .collect(),
            ),
            "queryType" => self.root_type(OperationType::Query),
            "mutationType" => self.root_type(OperationType::Mutation),
            "subscriptionType" => self.root_type(OperationType::Subscription),
            "directives" => FieldValue::List(
                definitions
                    .directive_definitions
                    .values()
                    .map(|directive| FieldValue::object(DirectiveHandle(directive.clone())))
                    .collect(),
            ),
            _ => return None,
        })
    }

    fn type_field(
        &self,
        ty: &TypeRef,
        field_name: &str,
        include_deprecated: bool,
    ) -> Result<Option<FieldValue>, FieldError> {
        let name = match ty {
            TypeRef::NonNull(inner) | TypeRef::List(inner) => {
                let kind = if ty.is_non_null() { "NON_NULL" } else { "LIST" };
                return Ok(Some(match field_name {
                    "kind" => FieldValue::Leaf(kind.into()),
                    "ofType" => type_value((**inner).clone()),
                    _ => FieldValue::Null,
                }));
            }
            TypeRef::Named(name) => name,
        };
        let definition = self
            .schema
            .definitions()
            .types
            .get(name)
            .ok_or_else(|| FieldError::new(format!("unknown type \"{name}\"")))?;

        let value = match (field_name, definition) {
            ("kind", _) => FieldValue::Leaf(kind(definition).into()),
            ("name", _) => FieldValue::Leaf(name.as_str().into()),
            ("description", _) => string(definition.description()).unwrap_or(FieldValue::Null),
            ("fields", ExtendedType::Object(object)) => {
                fields(object.fields.values(), include_deprecated)
            }
            ("fields", ExtendedType::Interface(interface)) => {
                fields(interface.fields.values(), include_deprecated)
            }
            ("interfaces", ExtendedType::Object(object)) => type_list(
                object
                    .implements_interfaces
                    .iter()
                    .map(|interface| &interface.name),
            ),
            ("interfaces", ExtendedType::Interface(interface)) => type_list(
                interface
                    .implements_interfaces
                    .iter()
                    .map(|interface| &interface.name),
            ),
            ("possibleTypes", ExtendedType::Interface(_) | ExtendedType::Union(_)) => {
                let possible_types = self
                    .schema
                    .type_id(name)
                    .map(|id| self.schema.possible_types(id))
                    .unwrap_or_default();
                type_list(
                    possible_types
                        .iter()
                        .map(|&possible_type| self.schema.type_name(possible_type)),
                )
            }
            ("enumValues", ExtendedType::Enum(enum_)) => FieldValue::List(
                enum_
                    .values
                    .values()
                    .filter(|value| include_deprecated || deprecation(&value.directives).is_none())
                    .map(|value| FieldValue::object(EnumValueHandle(value.node.clone())))
                    .collect(),
            ),
            ("inputFields", ExtendedType::InputObject(input)) => input_values(
                input.fields.values().map(|field| &field.node),
                include_deprecated,
            ),
            ("specifiedByURL", ExtendedType::Scalar(scalar)) => scalar
                .directives
                .get("specifiedBy")
                .and_then(|directive| directive.specified_argument_by_name("url"))
                .and_then(|url| url.as_str())
                .map(|url| FieldValue::Leaf(url.into()))
                .unwrap_or(FieldValue::Null),
            ("isOneOf", ExtendedType::InputObject(input)) => {
                FieldValue::Leaf(input.directives.get("oneOf").is_some().into())
            }
            (
                "fields" | "interfaces" | "possibleTypes" | "enumValues" | "inputFields"
                | "specifiedByURL" | "isOneOf" | "ofType",
                _,
            ) => FieldValue::Null,
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

fn handle<'a, T: Any>(parent: &'a ObjectRef, type_name: &str) -> Result<&'a T, FieldError> {
    parent.downcast_ref::<T>().ok_or_else(|| {
        FieldError::new(format!(
            "the parent value is not a {type_name} introspection object"
        ))
    })
}

fn field_field(
    field: &Node<ast::FieldDefinition>,
    field_name: &str,
    include_deprecated: bool,
) -> Option<FieldValue> {
    match field_name {
        "name" => leaf(field.name.as_str()),
        "description" => string(field.description.as_ref()),
        "args" => Some(input_values(field.arguments.iter(), include_deprecated)),
        "type" => Some(type_value(TypeRef::from(&field.ty))),
        "isDeprecated" => leaf(deprecation(&field.directives).is_some()),
        "deprecationReason" => optional_string(deprecation(&field.directives)),
        _ => None,
    }
}

fn input_value_field(
    value: &Node<ast::InputValueDefinition>,
    field_name: &str,
) -> Option<FieldValue> {
    match field_name {
        "name" => leaf(value.name.as_str()),
        "description" => string(value.description.as_ref()),
        "type" => Some(type_value(TypeRef::from(&*value.ty))),
        "defaultValue" => Some(
            value
                .default_value
                .as_ref()
                .map(|default| FieldValue::Leaf(default.to_string().into()))
                .unwrap_or(FieldValue::Null),
        ),
        "isDeprecated" => leaf(deprecation(&value.directives).is_some()),
        "deprecationReason" => optional_string(deprecation(&value.directives)),
        _ => None,
    }
}

fn kind(definition: &ExtendedType) -> &'static str {
    match definition {
        ExtendedType::Scalar(_) => "SCALAR",
        ExtendedType::Object(_) => "OBJECT",
        ExtendedType::Interface(_) => "INTERFACE",
        ExtendedType::Union(_) => "UNION",
        ExtendedType::Enum(_) => "ENUM",
        ExtendedType::InputObject(_) => "INPUT_OBJECT",
    }
}

fn type_value(ty: TypeRef) -> FieldValue {
    FieldValue::object(TypeHandle(ty))
}

fn type_list<'a>(names: impl Iterator<Item = &'a apollo_compiler::Name>) -> FieldValue {
    FieldValue::List(
        names
            .map(|name| type_value(TypeRef::named(name.clone())))
            .collect(),
    )
}

fn fields<'a>(
    definitions: impl Iterator<Item = &'a Component<ast::FieldDefinition>>,
    include_deprecated: bool,
) -> FieldValue {
    FieldValue::List(
        definitions
            .filter(|field| include_deprecated || deprecation(&field.directives).is_none())
            .map(|field| FieldValue::object(FieldHandle(field.node.clone())))
            .collect(),
    )
}

fn input_values<'a>(
    definitions: impl Iterator<Item = &'a Node<ast::InputValueDefinition>>,
    include_deprecated: bool,
) -> FieldValue {
    FieldValue::List(
        definitions
            .filter(|value| include_deprecated || deprecation(&value.directives).is_none())
            .map(|value| FieldValue::object(InputValueHandle(value.clone())))
            .collect(),
    )
}

fn deprecation(directives: &ast::DirectiveList) -> Option<String> {
    directives.get("deprecated").map(|directive| {
        directive
            .specified_argument_by_name("reason")
            .and_then(|reason| reason.as_str())
            .unwrap_or(DEFAULT_DEPRECATION_REASON)
            .to_string()
    })
}

fn leaf(value: impl Into<Value>) -> Option<FieldValue> {
    Some(FieldValue::Leaf(value.into()))
}

fn optional_string(value: Option<String>) -> Option<FieldValue> {
    Some(
        value
            .map(|value| FieldValue::Leaf(value.into()))
            .unwrap_or(FieldValue::Null),
    )
}

fn string(value: Option<&Node<str>>) -> Option<FieldValue> {
    Some(
        value
            .map(|value| FieldValue::Leaf(Value::from(&**value)))
            .unwrap_or(FieldValue::Null),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use crate::execution::ExecutionRequest;
    use crate::execution::Executor;
    use crate::execution::Resolvers;
    use crate::spec::Schema;

    const SDL: &str = r#"
        type Query {
          a(limit: Int = 10): Int @deprecated(reason: "use b")
          b: Color
          node: Node
        }
        interface Node { id: ID! }
        type User implements Node { id: ID! }
        enum Color { RED GREEN @deprecated }
        input Filter { color: Color = RED }
        scalar Url @specifiedBy(url: "https://example.com/url")
    "#;

    async fn introspect(query: &str) -> crate::Response {
        let executor = Executor::new(Schema::parse(SDL).unwrap(), Resolvers::new());
        executor
            .execute(ExecutionRequest::builder().query(query).build())
            .await
    }

    #[tokio::test]
    async fn deprecated_members_are_hidden_by_default() {
        let response = introspect(
            r#"{
              __type(name: "Query") {
                fields { name }
                all: fields(includeDeprecated: true) {
                  name
                  isDeprecated
                  deprecationReason
                  args { name defaultValue type { name } }
                }
              }
              color: __type(name: "Color") {
                enumValues { name }
                all: enumValues(includeDeprecated: true) { name isDeprecated deprecationReason }
              }
            }"#,
        )
        .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data,
            Some(json!({
                "__type": {
                    "fields": [{ "name": "b" }, { "name": "node" }],
                    "all": [
                        {
                            "name": "a",
                            "isDeprecated": true,
                            "deprecationReason": "use b",
                            "args": [{ "name": "limit", "defaultValue": "10", "type": { "name": "Int" } }]
                        },
                        { "name": "b", "isDeprecated": false, "deprecationReason": null, "args": [] },
                        { "name": "node", "isDeprecated": false, "deprecationReason": null, "args": [] }
                    ]
                },
                "color": {
                    "enumValues": [{ "name": "RED" }],
                    "all": [
                        { "name": "RED", "isDeprecated": false, "deprecationReason": null },
                        { "name": "GREEN", "isDeprecated": true, "deprecationReason": "No longer supported" }
                    ]
                }
            }))
        );
    }

    #[tokio::test]
    async fn types_by_kind() {
        let response = introspect(
            r#"{
              node: __type(name: "Node") { kind interfaces { name } possibleTypes { name } }
              user: __type(name: "User") {
                kind
                interfaces { name }
                possibleTypes { name }
                fields { type { kind name ofType { kind name ofType { name } } } }
              }
              filter: __type(name: "Filter") { kind fields { name } inputFields { name defaultValue } }
              url: __type(name: "Url") { kind specifiedByURL }
              missing: __type(name: "Missing") { name }
            }"#,
        )
        .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(
            response.data,
            Some(json!({
                "node": { "kind": "INTERFACE", "interfaces": [], "possibleTypes": [{ "name": "User" }] },
                "user": {
                    "kind": "OBJECT",
                    "interfaces": [{ "name": "Node" }],
                    "possibleTypes": null,
                    "fields": [{
                        "type": {
                            "kind": "NON_NULL",
                            "name": null,
                            "ofType": { "kind": "SCALAR", "name": "ID", "ofType": null }
                        }
                    }]
                },
                "filter": {
                    "kind": "INPUT_OBJECT",
                    "fields": null,
                    "inputFields": [{ "name": "color", "defaultValue": "RED" }]
                },
                "url": { "kind": "SCALAR", "specifiedByURL": "https://example.com/url" },
                "missing": null
            }))
        );
    }

    #[tokio::test]
    async fn schema_lists_types_and_directives() {
        let response = introspect(
            "{ __schema { queryType { name } mutationType { name } types { name } directives { name locations args { name } } } }",
        )
        .await;

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        let data = response.data.unwrap();
        let schema = &data["__schema"];
        assert_eq!(schema["queryType"], json!({ "name": "Query" }));
        assert_eq!(schema["mutationType"], json!(null));

        let names = |list: &serde_json_bytes::Value| -> Vec<String> {
            list.as_array()
                .unwrap()
                .iter()
                .map(|item| item["name"].as_str().unwrap().to_string())
                .collect()
        };
        let types = names(&schema["types"]);
        for expected in ["Query", "Color", "Filter", "String", "__Schema", "__Type"] {
            assert!(types.contains(&expected.to_string()), "missing type {expected}");
        }
        let directives = names(&schema["directives"]);
        for expected in ["skip", "include", "deprecated", "specifiedBy"] {
            assert!(
                directives.contains(&expected.to_string()),
                "missing directive {expected}"
            );
        }
        let skip = schema["directives"]
            .as_array()
            .unwrap()
            .iter()
            .find(|directive| directive["name"] == json!("skip"))
            .unwrap();
        assert_eq!(skip["args"], json!([{ "name": "if" }]));
        assert_eq!(
            skip["locations"],
            json!(["FIELD", "FRAGMENT_SPREAD", "INLINE_FRAGMENT"])
        );
    }
}
