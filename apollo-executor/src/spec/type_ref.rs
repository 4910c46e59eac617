use std::fmt;

use apollo_compiler::ast;
use apollo_compiler::Name;

/// A reference to a type, with its list and non-null wrappers.
///
/// `NonNull` never directly wraps another `NonNull`: [`TypeRef::non_null`]
/// collapses it and the conversion from [`ast::Type`] cannot produce it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A named type such as `User` or `String`.
    Named(Name),
    /// A list of the inner type.
    List(Box<TypeRef>),
    /// The inner type, which may not be null.
    NonNull(Box<TypeRef>),
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::List(ty) => write!(f, "[{ty}]"),
            TypeRef::NonNull(ty) => write!(f, "{ty}!"),
        }
    }
}

impl TypeRef {
    pub fn named(name: Name) -> Self {
        TypeRef::Named(name)
    }

    pub fn list(item: TypeRef) -> Self {
        TypeRef::List(Box::new(item))
    }

    pub fn non_null(inner: TypeRef) -> Self {
        match inner {
            TypeRef::NonNull(_) => inner,
            other => TypeRef::NonNull(Box::new(other)),
        }
    }

    /// return the name of the type on which selections happen
    ///
    /// Example if we get the field `list: [User!]!`, it will return "User"
    pub fn inner_named_type(&self) -> &Name {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.inner_named_type(),
        }
    }

    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    /// The type without its outer non-null wrapper.
    pub fn nullable(&self) -> &TypeRef {
        match self {
            TypeRef::NonNull(inner) => inner,
            other => other,
        }
    }

    /// The item type if this is a (possibly non-null) list.
    pub fn list_item(&self) -> Option<&TypeRef> {
        match self.nullable() {
            TypeRef::List(item) => Some(item),
            _ => None,
        }
    }
}

impl From<&ast::Type> for TypeRef {
    fn from(ty: &ast::Type) -> Self {
        match ty {
            ast::Type::Named(name) => TypeRef::Named(name.clone()),
            ast::Type::NonNullNamed(name) => {
                TypeRef::NonNull(Box::new(TypeRef::Named(name.clone())))
            }
            ast::Type::List(item) => TypeRef::List(Box::new(item.as_ref().into())),
            ast::Type::NonNullList(item) => {
                TypeRef::NonNull(Box::new(TypeRef::List(Box::new(item.as_ref().into()))))
            }
        }
    }
}
