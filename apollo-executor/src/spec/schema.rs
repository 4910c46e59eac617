//! GraphQL schema.

use std::collections::HashMap;
use std::sync::Arc;

use apollo_compiler::ast::OperationType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::validation::Valid;
use apollo_compiler::Name;
use sha2::Digest;
use sha2::Sha256;

use crate::error::SchemaError;

/// Index of a named type in the schema's type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Enum,
    Scalar,
    InputObject,
}

#[derive(Debug)]
struct TypeEntry {
    name: Name,
    kind: TypeKind,
    /// Concrete object types this type may resolve to, in schema order.
    possible_types: Vec<TypeId>,
}

/// A GraphQL schema, indexed for execution.
///
/// Types are stored in an arena addressed by [`TypeId`]; abstract types know
/// their possible concrete types. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Schema {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    definitions: Valid<apollo_compiler::Schema>,
    types: Vec<TypeEntry>,
    ids: HashMap<Name, TypeId>,
    /// SHA-256 of the printed schema.
    hash: String,
}

impl Schema {
    /// Parse and validate a schema from SDL.
    pub fn parse(sdl: &str) -> Result<Self, SchemaError> {
        let definitions = apollo_compiler::Schema::parse_and_validate(sdl, "schema.graphql")
            .map_err(|err| SchemaError::Validate(err.errors.to_string()))?;
        Ok(Self::new(definitions))
    }

    /// Index an already validated schema.
    pub fn new(definitions: Valid<apollo_compiler::Schema>) -> Self {
        let ids: HashMap<Name, TypeId> = definitions
            .types
            .keys()
            .enumerate()
            .map(|(index, name)| (name.clone(), TypeId(index as u32)))
            .collect();

        let types = definitions
            .types
            .iter()
            .enumerate()
            .map(|(index, (name, ty))| {
                let (kind, possible_types) = match ty {
                    ExtendedType::Object(_) => (TypeKind::Object, vec![TypeId(index as u32)]),
                    ExtendedType::Interface(_) => (
                        TypeKind::Interface,
                        definitions
                            .types
                            .iter()
                            .filter_map(|(candidate, def)| match def {
                                ExtendedType::Object(object)
                                    if object
                                        .implements_interfaces
                                        .iter()
                                        .any(|interface| interface.name == *name) =>
                                {
                                    ids.get(candidate).copied()
                                }
                                _ => None,
                            })
                            .collect(),
                    ),
                    ExtendedType::Union(union_) => (
                        TypeKind::Union,
                        union_
                            .members
                            .iter()
                            .filter_map(|member| ids.get(&member.name).copied())
                            .collect(),
                    ),
                    ExtendedType::Enum(_) => (TypeKind::Enum, Vec::new()),
                    ExtendedType::Scalar(_) => (TypeKind::Scalar, Vec::new()),
                    ExtendedType::InputObject(_) => (TypeKind::InputObject, Vec::new()),
                };
                TypeEntry {
                    name: name.clone(),
                    kind,
                    possible_types,
                }
            })
            .collect();

        let hash = hex::encode(Sha256::digest(definitions.to_string().as_bytes()));
        Self {
            inner: Arc::new(Inner {
                definitions,
                types,
                ids,
                hash,
            }),
        }
    }

    /// The underlying apollo-compiler schema.
    pub fn definitions(&self) -> &Valid<apollo_compiler::Schema> {
        &self.inner.definitions
    }

    /// A digest of the schema document, identical for equivalent SDL.
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.inner.ids.get(name).copied()
    }

    pub fn type_name(&self, id: TypeId) -> &Name {
        &self.entry(id).name
    }

    pub fn kind(&self, id: TypeId) -> TypeKind {
        self.entry(id).kind
    }

    /// Kind of a type looked up by name.
    pub fn kind_of(&self, name: &str) -> Option<TypeKind> {
        self.type_id(name).map(|id| self.kind(id))
    }

    pub fn is_abstract(&self, id: TypeId) -> bool {
        matches!(self.kind(id), TypeKind::Interface | TypeKind::Union)
    }

    pub fn is_composite(&self, id: TypeId) -> bool {
        matches!(
            self.kind(id),
            TypeKind::Object | TypeKind::Interface | TypeKind::Union
        )
    }

    /// Concrete object types that `id` may resolve to, in schema order.
    ///
    /// An object type's only possible type is itself.
    pub fn possible_types(&self, id: TypeId) -> &[TypeId] {
        &self.entry(id).possible_types
    }

    /// Whether a value of type `object` is also of type `abstract_or_object`.
    pub fn is_possible_type(&self, abstract_or_object: TypeId, object: TypeId) -> bool {
        self.possible_types(abstract_or_object).contains(&object)
    }

    /// Whether two composite types share at least one possible concrete type.
    pub fn overlaps(&self, left: TypeId, right: TypeId) -> bool {
        let right = self.possible_types(right);
        self.possible_types(left)
            .iter()
            .any(|candidate| right.contains(candidate))
    }

    /// Name of the root type of an operation kind, if the schema defines one.
    pub fn root_type(&self, operation: OperationType) -> Option<&Name> {
        self.inner.definitions.root_operation(operation)
    }

    /// The definition of `field` on the object or interface type `type_name`.
    ///
    /// The `__schema` and `__type` meta-fields are found on the query root.
    pub fn field_definition(&self, type_name: &str, field: &str) -> Option<&FieldDefinition> {
        if !matches!(
            self.inner.definitions.types.get(type_name)?,
            ExtendedType::Object(_) | ExtendedType::Interface(_)
        ) {
            return None;
        }
        self.inner
            .definitions
            .type_field(type_name, field)
            .ok()
            .map(|definition| &*definition.node)
    }

    fn entry(&self, id: TypeId) -> &TypeEntry {
        &self.inner.types[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SDL: &str = r#"
        type Query { node: Node search: [SearchResult] }
        interface Node { id: ID! }
        type User implements Node { id: ID! name: String }
        type Post implements Node { id: ID! title: String }
        type Comment { body: String }
        union SearchResult = Post | Comment
    "#;

    fn ids(schema: &Schema, names: &[&str]) -> Vec<TypeId> {
        names
            .iter()
            .map(|name| schema.type_id(name).unwrap())
            .collect()
    }

    #[test]
    fn indexes_possible_types_in_schema_order() {
        let schema = Schema::parse(SDL).unwrap();
        let node = schema.type_id("Node").unwrap();
        let search = schema.type_id("SearchResult").unwrap();
        let user = schema.type_id("User").unwrap();

        assert_eq!(schema.possible_types(node), ids(&schema, &["User", "Post"]));
        assert_eq!(
            schema.possible_types(search),
            ids(&schema, &["Post", "Comment"])
        );
        assert_eq!(schema.possible_types(user), &[user]);
        assert!(schema.is_abstract(node));
        assert!(!schema.is_abstract(user));
        assert_eq!(schema.kind_of("ID"), Some(TypeKind::Scalar));
    }

    #[test]
    fn overlapping_types() {
        let schema = Schema::parse(SDL).unwrap();
        let [node, search, user, comment] = [
            schema.type_id("Node").unwrap(),
            schema.type_id("SearchResult").unwrap(),
            schema.type_id("User").unwrap(),
            schema.type_id("Comment").unwrap(),
        ];
        assert!(schema.overlaps(node, search));
        assert!(schema.overlaps(node, user));
        assert!(!schema.overlaps(user, comment));
        assert!(!schema.overlaps(node, comment));
    }

    #[test]
    fn invalid_schemas_are_rejected() {
        assert!(matches!(
            Schema::parse("type Query { a: Missing }"),
            Err(SchemaError::Validate(_))
        ));
    }

    #[test]
    fn root_types_and_fields() {
        let schema = Schema::parse(SDL).unwrap();
        assert_eq!(
            schema.root_type(OperationType::Query).map(|n| n.as_str()),
            Some("Query")
        );
        assert!(schema.root_type(OperationType::Mutation).is_none());
        assert_eq!(
            schema
                .field_definition("Node", "id")
                .map(|f| f.ty.to_string()),
            Some("ID!".to_string())
        );
        assert!(schema.field_definition("SearchResult", "id").is_none());
        assert_eq!(
            schema
                .field_definition("Query", "__type")
                .map(|f| f.ty.to_string()),
            Some("__Type".to_string())
        );
        assert!(schema.field_definition("User", "__schema").is_none());
    }

    #[test]
    fn hash_follows_the_schema_document() {
        let schema = Schema::parse(SDL).unwrap();
        assert_eq!(schema.hash().len(), 64);
        assert_eq!(schema.hash(), Schema::parse(SDL).unwrap().hash());
        assert_ne!(
            schema.hash(),
            Schema::parse("type Query { a: Int }").unwrap().hash()
        );
    }
}
