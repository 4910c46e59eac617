use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::graphql::Error;
use crate::json_ext::Object;

/// A graphql primary response.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// The response data.
    ///
    /// Absent only when a fatal error prevented execution from starting.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(
        data: Option<Value>,
        errors: Vec<Error>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            data,
            errors,
            extensions,
        }
    }

    /// Assembles the final response from the executor's result tree.
    ///
    /// `data` is `None` only when execution never started (the errors are
    /// then request or planning errors). A root that was nulled by error
    /// propagation renders as `"data": null`.
    pub fn from_resolved(data: Option<ResolvedValue>, errors: Vec<Error>) -> Self {
        Self {
            data: data.map(ResolvedValue::into_value),
            errors,
            extensions: Object::new(),
        }
    }

    /// A response carrying a single error and no data.
    pub fn from_error(error: Error) -> Self {
        Self {
            data: None,
            errors: vec![error],
            extensions: Object::new(),
        }
    }

    /// Serialize the response as JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// The value tree produced by executing a selection.
///
/// Object members keep the order in which the plan lists them, lists keep
/// the order of the values the resolver returned.
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedValue {
    /// A serialized scalar or enum value.
    Leaf(Value),
    /// An object, in plan order.
    Object(Vec<(ByteString, ResolvedValue)>),
    List(Vec<ResolvedValue>),
    /// The resolver returned null for a nullable position.
    Null,
    /// The position was nulled because an error was recorded at or below it.
    Error,
}

impl ResolvedValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null | ResolvedValue::Error)
    }

    /// Render as JSON. Errored positions become `null`.
    pub fn into_value(self) -> Value {
        match self {
            ResolvedValue::Leaf(value) => value,
            ResolvedValue::Object(fields) => {
                let mut object = Map::with_capacity(fields.len());
                for (key, value) in fields {
                    object.insert(key, value.into_value());
                }
                Value::Object(object)
            }
            ResolvedValue::List(items) => {
                Value::Array(items.into_iter().map(ResolvedValue::into_value).collect())
            }
            ResolvedValue::Null | ResolvedValue::Error => Value::Null,
        }
    }
}

impl From<ResolvedValue> for Value {
    fn from(value: ResolvedValue) -> Self {
        value.into_value()
    }
}
