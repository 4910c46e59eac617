//! The resolver contract: how field values are produced.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::spec::TypeRef;
use crate::spec::TYPENAME;
use crate::Context;

/// An opaque handle on a parent value.
///
/// Resolvers receive the handle of the object they resolve a field of. JSON
/// values are valid handles: the default resolver reads fields from them.
#[derive(Clone)]
pub struct ObjectRef {
    value: Arc<dyn Any + Send + Sync>,
    typename: Option<Arc<str>>,
}

impl ObjectRef {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            typename: None,
        }
    }

    pub fn from_json(value: Value) -> Self {
        Self::new(value)
    }

    /// Declares the concrete object type of this value.
    pub fn with_typename(mut self, typename: impl Into<Arc<str>>) -> Self {
        self.typename = Some(typename.into());
        self
    }

    /// The explicitly declared concrete type, if any.
    pub fn typename(&self) -> Option<&str> {
        self.typename.as_deref()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn as_json(&self) -> Option<&Value> {
        self.downcast_ref::<Value>()
    }

    /// Reads a member of a JSON object handle.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_json()?.as_object()?.get(key)
    }
}

impl Default for ObjectRef {
    fn default() -> Self {
        Self::from_json(Value::Object(Object::new()))
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ObjectRef");
        if let Some(json) = self.as_json() {
            debug.field("value", json);
        }
        debug.field("typename", &self.typename).finish()
    }
}

impl From<Value> for ObjectRef {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

/// A value returned by a resolver.
#[derive(Clone, Debug)]
pub enum FieldValue {
    /// A scalar or enum value, serialized according to the field type.
    Leaf(Value),
    /// An object, whose fields are resolved by the sub-selection.
    Object(ObjectRef),
    List(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        FieldValue::Object(ObjectRef::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null) || matches!(self, FieldValue::Leaf(Value::Null))
    }

    /// The JSON content of the value, for leaf positions.
    ///
    /// Objects that are not JSON handles have no JSON representation.
    pub(crate) fn into_json(self) -> Option<Value> {
        match self {
            FieldValue::Leaf(value) => Some(value),
            FieldValue::Null => Some(Value::Null),
            FieldValue::Object(object) => object.as_json().cloned(),
            FieldValue::List(items) => items
                .into_iter()
                .map(FieldValue::into_json)
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }
}

/// JSON objects become object handles, arrays become lists.
impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Array(items) => FieldValue::List(items.into_iter().map(Into::into).collect()),
            object @ Value::Object(_) => FieldValue::Object(ObjectRef::from_json(object)),
            leaf => FieldValue::Leaf(leaf),
        }
    }
}

impl From<ObjectRef> for FieldValue {
    fn from(object: ObjectRef) -> Self {
        FieldValue::Object(object)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(items: Vec<T>) -> Self {
        FieldValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// An error raised by a resolver.
#[derive(Clone)]
pub struct FieldError {
    pub message: String,
    pub extensions: Object,
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Object::new(),
            source: None,
        }
    }

    /// Wraps an error, using its display as message.
    pub fn from_error(error: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self {
            message: error.to_string(),
            extensions: Object::new(),
            source: Some(Arc::new(error)),
        }
    }

    pub fn with_extension(mut self, key: impl Into<ByteString>, value: impl Into<Value>) -> Self {
        self.extensions.insert(key, value.into());
        self
    }
}

impl fmt::Debug for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldError")
            .field("message", &self.message)
            .field("extensions", &self.extensions)
            .field("source", &self.source.as_ref().map(|s| s.to_string()))
            .finish()
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        FieldError::new(message)
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        FieldError::new(message)
    }
}

pub type FieldResult = Result<FieldValue, FieldError>;

/// The outcome of invoking a resolver.
pub enum Resolution {
    /// The value was computed inline.
    Ready(FieldResult),
    /// The value will be available later. It is awaited at the parent boundary.
    Pending(BoxFuture<'static, FieldResult>),
}

/// Information about the field being resolved.
pub struct ResolveInfo<'a> {
    pub field_name: &'a str,
    pub parent_type: &'a str,
    pub return_type: &'a TypeRef,
    /// Coerced arguments, with defaults applied.
    pub arguments: &'a Object,
    pub variables: &'a Object,
    pub context: &'a Context,
    pub(crate) path: &'a dyn Fn() -> Path,
}

impl ResolveInfo<'_> {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// The response path of the field.
    pub fn path(&self) -> Path {
        (self.path)()
    }
}

/// A field resolver.
pub trait Resolve: Send + Sync + 'static {
    fn resolve(&self, parent: &ObjectRef, info: &ResolveInfo<'_>) -> Resolution;
}

struct SyncFn<F>(F);

impl<F> Resolve for SyncFn<F>
where
    F: Fn(&ObjectRef, &ResolveInfo<'_>) -> FieldResult + Send + Sync + 'static,
{
    fn resolve(&self, parent: &ObjectRef, info: &ResolveInfo<'_>) -> Resolution {
        Resolution::Ready((self.0)(parent, info))
    }
}

struct AsyncFn<F>(F);

impl<F, Fut> Resolve for AsyncFn<F>
where
    F: Fn(&ObjectRef, &ResolveInfo<'_>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FieldResult> + Send + 'static,
{
    fn resolve(&self, parent: &ObjectRef, info: &ResolveInfo<'_>) -> Resolution {
        Resolution::Pending((self.0)(parent, info).boxed())
    }
}

/// How the value of a field is produced. Chosen once, when the plan is compiled.
#[derive(Clone)]
pub enum FieldResolver {
    /// A registered resolver.
    Function(Arc<dyn Resolve>),
    /// Read the member named like the field from a JSON parent.
    Attribute,
    /// Always the same value, e.g. `__typename` of a concrete type.
    Constant(Value),
}

impl FieldResolver {
    pub fn new(resolver: impl Resolve) -> Self {
        FieldResolver::Function(Arc::new(resolver))
    }

    /// A resolver computing its value inline.
    pub fn sync<F>(resolve: F) -> Self
    where
        F: Fn(&ObjectRef, &ResolveInfo<'_>) -> FieldResult + Send + Sync + 'static,
    {
        Self::new(SyncFn(resolve))
    }

    /// A resolver returning a future.
    ///
    /// The future must own what it needs: clone it out of the parent and
    /// the info before the `async` block.
    pub fn future<F, Fut>(resolve: F) -> Self
    where
        F: Fn(&ObjectRef, &ResolveInfo<'_>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FieldResult> + Send + 'static,
    {
        Self::new(AsyncFn(resolve))
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        FieldResolver::Constant(value.into())
    }

    pub(crate) fn invoke(&self, parent: &ObjectRef, info: &ResolveInfo<'_>) -> Resolution {
        match self {
            FieldResolver::Function(resolver) => resolver.resolve(parent, info),
            FieldResolver::Constant(value) => Resolution::Ready(Ok(FieldValue::Leaf(value.clone()))),
            FieldResolver::Attribute => Resolution::Ready(read_attribute(parent, info)),
        }
    }
}

fn read_attribute(parent: &ObjectRef, info: &ResolveInfo<'_>) -> FieldResult {
    match parent.as_json() {
        Some(Value::Object(object)) => Ok(object
            .get(info.field_name)
            .cloned()
            .map(FieldValue::from)
            .unwrap_or(FieldValue::Null)),
        _ => Err(FieldError::new(format!(
            "no resolver is registered for {}.{} and the parent value is not a JSON object",
            info.parent_type, info.field_name
        ))),
    }
}

impl PartialEq for FieldResolver {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldResolver::Function(left), FieldResolver::Function(right)) => {
                Arc::ptr_eq(left, right)
            }
            (FieldResolver::Attribute, FieldResolver::Attribute) => true,
            (FieldResolver::Constant(left), FieldResolver::Constant(right)) => left == right,
            _ => false,
        }
    }
}

impl fmt::Debug for FieldResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldResolver::Function(resolver) => {
                write!(f, "Function({:p})", Arc::as_ptr(resolver) as *const ())
            }
            FieldResolver::Attribute => write!(f, "Attribute"),
            FieldResolver::Constant(value) => write!(f, "Constant({value:?})"),
        }
    }
}

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(0);

fn next_generation() -> u64 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Resolvers registered per `(type, field)`.
///
/// Fields without a registered resolver read the same-named member of their
/// JSON parent.
#[derive(Clone)]
pub struct Resolvers {
    resolvers: HashMap<(String, String), FieldResolver>,
    generation: u64,
}

impl Default for Resolvers {
    fn default() -> Self {
        Self {
            resolvers: HashMap::new(),
            generation: next_generation(),
        }
    }
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifies this registry. Clones share it until one of them changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Registers a resolver, builder style.
    pub fn with(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: FieldResolver,
    ) -> Self {
        self.insert(type_name, field_name, resolver);
        self
    }

    pub fn insert(
        &mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: FieldResolver,
    ) -> Option<FieldResolver> {
        self.generation = next_generation();
        self.resolvers
            .insert((type_name.into(), field_name.into()), resolver)
    }

    pub fn len(&self) -> usize {
        self.resolvers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolvers.is_empty()
    }

    pub(crate) fn lookup(&self, type_name: &str, field_name: &str) -> FieldResolver {
        if field_name == TYPENAME {
            return FieldResolver::Constant(Value::from(type_name));
        }
        self.resolvers
            .get(&(type_name.to_string(), field_name.to_string()))
            .cloned()
            .unwrap_or(FieldResolver::Attribute)
    }
}

impl fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self
            .resolvers
            .keys()
            .map(|(ty, field)| format!("{ty}.{field}"))
            .collect();
        keys.sort();
        f.debug_struct("Resolvers").field("fields", &keys).finish()
    }
}

/// Decides the concrete object type of a value in an abstract position.
pub trait TypeDiscriminator: Send + Sync + 'static {
    /// Returns the name of the concrete type, or `None` when it is unknown.
    fn discriminate(&self, value: &ObjectRef, abstract_type: &str) -> Option<String>;
}

impl<F> TypeDiscriminator for F
where
    F: Fn(&ObjectRef, &str) -> Option<String> + Send + Sync + 'static,
{
    fn discriminate(&self, value: &ObjectRef, abstract_type: &str) -> Option<String> {
        self(value, abstract_type)
    }
}

/// Uses the explicit type of the handle, then the `__typename` member of a
/// JSON handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultDiscriminator;

impl TypeDiscriminator for DefaultDiscriminator {
    fn discriminate(&self, value: &ObjectRef, _abstract_type: &str) -> Option<String> {
        value.typename().map(str::to_string).or_else(|| {
            value
                .get(TYPENAME)
                .and_then(|typename| typename.as_str())
                .map(str::to_string)
        })
    }
}

/// Rewrites the message of resolver errors before they reach the response.
///
/// Only resolver errors are masked; paths and locations are kept.
pub trait ErrorMask: Send + Sync + 'static {
    /// Returns the replacement message, or `None` to keep the error as is.
    fn mask(&self, error: &FieldError) -> Option<String>;
}

type MaskPredicate = Arc<dyn Fn(&FieldError) -> bool + Send + Sync>;

/// Replaces resolver error messages with a generic one.
#[derive(Clone)]
pub struct MaskErrors {
    message: String,
    should_mask: Option<MaskPredicate>,
}

impl Default for MaskErrors {
    fn default() -> Self {
        Self {
            message: "Unexpected error.".to_string(),
            should_mask: None,
        }
    }
}

impl MaskErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Only mask the errors for which `predicate` returns true.
    pub fn with_predicate(
        mut self,
        predicate: impl Fn(&FieldError) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_mask = Some(Arc::new(predicate));
        self
    }
}

impl ErrorMask for MaskErrors {
    fn mask(&self, error: &FieldError) -> Option<String> {
        match &self.should_mask {
            Some(should_mask) if !should_mask(error) => None,
            _ => Some(self.message.clone()),
        }
    }
}
