use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use apollo_executor::graphql;
use apollo_executor::path;
use apollo_executor::Configuration;
use apollo_executor::Context;
use apollo_executor::ExecutionConfiguration;
use apollo_executor::ExecutionRequest;
use apollo_executor::Executor;
use apollo_executor::FieldError;
use apollo_executor::FieldResolver;
use apollo_executor::FieldResult;
use apollo_executor::FieldValue;
use apollo_executor::MaskErrors;
use apollo_executor::ObjectRef;
use apollo_executor::Resolvers;
use apollo_executor::Response;
use apollo_executor::Schema;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use serde_json_bytes::Value;
use tokio_util::sync::CancellationToken;

const SCHEMA: &str = r#"
    type Query {
      user: User!
      maybeUser: User
      items: [Item!]
      sparseItems: [Item]
      strictItems: [Item!]!
      orderedItems: [Item!]!
      search(term: String!): [SearchResult!]!
      firstResult: SearchResult
      slowA: Int
      slowB: Int
      fast: Int
      forever: String
      stalled: String!
      profile: Profile
      boom: String
      secret: String
      viewer: String
      greeting(name: String = "world", times: Int): String
    }

    type Mutation {
      append(value: String!): [String!]!
    }

    type User {
      id: ID!
      name: String!
    }

    type Profile {
      handle: String!
      bio: String
    }

    type Item {
      id: ID!
      label: String
    }

    type Tag {
      id: ID!
      label: String!
    }

    union SearchResult = User | Tag
"#;

fn resolvers(log: Arc<Mutex<Vec<String>>>) -> Resolvers {
    let half_user = json!({ "id": "1", "name": null });
    Resolvers::new()
        .with("Query", "user", FieldResolver::constant(half_user.clone()))
        .with("Query", "maybeUser", FieldResolver::constant(half_user))
        .with(
            "Query",
            "items",
            FieldResolver::constant(json!([{ "id": "1" }, null, { "id": "3" }])),
        )
        .with(
            "Query",
            "sparseItems",
            FieldResolver::constant(json!([{ "id": "1" }, null, { "id": "3" }])),
        )
        .with(
            "Query",
            "strictItems",
            FieldResolver::constant(json!([{ "id": "1" }, null])),
        )
        .with(
            "Query",
            "orderedItems",
            FieldResolver::constant(json!([{ "id": "1" }, { "id": "2" }, { "id": "3" }])),
        )
        .with(
            "Item",
            "label",
            // the first item settles last
            FieldResolver::future(|parent, _| {
                let id = parent
                    .get("id")
                    .and_then(|id| id.as_str())
                    .unwrap_or_default()
                    .to_string();
                async move {
                    let delay = 40 - 10 * id.parse::<u64>().unwrap_or_default();
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    leaf(json!(format!("item {id}")))
                }
            }),
        )
        .with(
            "Query",
            "search",
            FieldResolver::sync(|_, _| {
                Ok(json!([
                    { "__typename": "User", "id": "1", "name": "Ada" },
                    { "__typename": "Tag", "id": "t1", "label": "math" },
                ])
                .into())
            }),
        )
        .with(
            "Query",
            "firstResult",
            FieldResolver::constant(json!({ "id": "1", "name": "Ada" })),
        )
        .with("Query", "slowA", sleeping(100, 1))
        .with("Query", "slowB", sleeping(100, 2))
        .with(
            "Query",
            "forever",
            FieldResolver::future(|_, _| futures::future::pending::<FieldResult>()),
        )
        .with(
            "Query",
            "stalled",
            FieldResolver::future(|_, _| futures::future::pending::<FieldResult>()),
        )
        .with(
            "Query",
            "profile",
            FieldResolver::constant(json!({ "bio": "mathematician" })),
        )
        .with(
            "Profile",
            "handle",
            FieldResolver::future(|_, _| futures::future::pending::<FieldResult>()),
        )
        .with(
            "Query",
            "boom",
            FieldResolver::sync(|_, _| panic!("resolver exploded")),
        )
        .with(
            "Query",
            "secret",
            FieldResolver::sync(|_, _| {
                Err(FieldError::new("connection refused by db-internal:5432"))
            }),
        )
        .with(
            "Query",
            "viewer",
            FieldResolver::sync(|_, info| Ok(info.context.get::<String>().map(Value::from).into())),
        )
        .with(
            "Query",
            "greeting",
            FieldResolver::sync(|_, info| {
                let name = info
                    .argument("name")
                    .and_then(|name| name.as_str())
                    .unwrap_or_default();
                let times = info
                    .argument("times")
                    .and_then(|times| times.as_i64())
                    .unwrap_or(1);
                let greeting = vec![format!("hello {name}"); times as usize].join(", ");
                Ok(FieldValue::from(json!(greeting)))
            }),
        )
        .with(
            "Mutation",
            "append",
            FieldResolver::future(move |_, info| {
                let value = info
                    .argument("value")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string();
                let log = log.clone();
                async move {
                    // later mutations are faster: only serial execution keeps them in order
                    let delay = match value.as_str() {
                        "a" => 30,
                        "b" => 20,
                        _ => 10,
                    };
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    let mut log = log.lock().unwrap();
                    log.push(value);
                    leaf(json!(log.clone()))
                }
            }),
        )
}

fn leaf(value: Value) -> FieldResult {
    Ok(FieldValue::from(value))
}

fn sleeping(millis: u64, value: i64) -> FieldResolver {
    FieldResolver::future(move |_, _| async move {
        tokio::time::sleep(Duration::from_millis(millis)).await;
        leaf(json!(value))
    })
}

fn executor() -> Executor {
    Executor::new(
        Schema::parse(SCHEMA).unwrap(),
        resolvers(Arc::new(Mutex::new(Vec::new()))),
    )
}

fn request(query: &str, variables: Value) -> ExecutionRequest {
    let mut request = ExecutionRequest::builder().query(query).build();
    if let Value::Object(variables) = variables {
        request.variables = variables;
    }
    request
}

async fn execute(executor: &Executor, query: &str) -> Response {
    executor.execute(request(query, json!({}))).await
}

fn codes(response: &Response) -> Vec<String> {
    response
        .errors
        .iter()
        .filter_map(|error| error.extension_code())
        .collect()
}

#[test_log::test(tokio::test)]
async fn null_in_non_null_field_nulls_the_nearest_nullable_ancestor() {
    let executor = executor();

    let response = execute(&executor, "{ user { name } }").await;
    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(
        response.errors[0].message,
        "Cannot return null for non-nullable field User.name."
    );
    assert_eq!(response.errors[0].path, Some(path!["user", "name"]));

    let response = execute(&executor, "{ maybeUser { id name } fast }").await;
    assert_eq!(response.data, Some(json!({ "maybeUser": null, "fast": null })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, Some(path!["maybeUser", "name"]));
    assert_eq!(codes(&response), vec!["NON_NULL_VIOLATION"]);
}

#[test_log::test(tokio::test)]
async fn list_items_follow_their_nullability() {
    let executor = executor();

    let response = execute(&executor, "{ items { id } }").await;
    assert_eq!(response.data, Some(json!({ "items": null })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, Some(path!["items", 1usize]));

    let response = execute(&executor, "{ sparseItems { id } }").await;
    assert_eq!(
        response.data,
        Some(json!({ "sparseItems": [{ "id": "1" }, null, { "id": "3" }] }))
    );
    assert!(response.errors.is_empty());

    let response = execute(&executor, "{ strictItems { id } fast }").await;
    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].path, Some(path!["strictItems", 1usize]));
}

#[tokio::test(start_paused = true)]
async fn lists_keep_their_order_regardless_of_timing() {
    let executor = executor();
    let response = execute(&executor, "{ orderedItems { id label } }").await;
    assert_eq!(
        response.data,
        Some(json!({
            "orderedItems": [
                { "id": "1", "label": "item 1" },
                { "id": "2", "label": "item 2" },
                { "id": "3", "label": "item 3" },
            ]
        }))
    );
}

#[tokio::test(start_paused = true)]
async fn sibling_fields_resolve_concurrently() {
    let executor = executor();
    let started = tokio::time::Instant::now();
    let response = execute(&executor, "{ slowA slowB }").await;
    let elapsed = started.elapsed();

    assert_eq!(response.data, Some(json!({ "slowA": 1, "slowB": 2 })));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(150), "took {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn mutation_root_fields_run_serially() {
    let executor = executor();
    let response = execute(
        &executor,
        r#"mutation { a: append(value: "a") b: append(value: "b") c: append(value: "c") }"#,
    )
    .await;
    assert_eq!(
        response.data,
        Some(json!({
            "a": ["a"],
            "b": ["a", "b"],
            "c": ["a", "b", "c"],
        }))
    );
}

#[test_log::test(tokio::test)]
async fn skipped_fields_leave_no_trace() {
    let executor = executor();

    let response = execute(&executor, "{ fast @skip(if: true) user @skip(if: true) { name } }").await;
    assert_eq!(response.data, Some(json!({})));
    assert!(response.errors.is_empty());

    let query = "query($skip: Boolean!) { user @skip(if: $skip) { name } viewer }";
    let response = executor
        .execute(request(query, json!({ "skip": true })))
        .await;
    assert_eq!(response.data, Some(json!({ "viewer": null })));
    assert!(response.errors.is_empty());

    // the same cached plan, evaluated against other variables
    let response = executor
        .execute(request(query, json!({ "skip": false })))
        .await;
    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(executor.plan_cache().metrics().await.misses, 2);
}

#[test_log::test(tokio::test)]
async fn unions_only_select_the_matching_fragment() {
    let executor = executor();
    let response = execute(
        &executor,
        r#"{
          search(term: "a") {
            __typename
            ... on User { name }
            ... on Tag { label }
          }
        }"#,
    )
    .await;
    assert_eq!(
        response.data,
        Some(json!({
            "search": [
                { "__typename": "User", "name": "Ada" },
                { "__typename": "Tag", "label": "math" },
            ]
        }))
    );
    assert!(response.errors.is_empty());
}

#[test_log::test(tokio::test)]
async fn unresolvable_abstract_values_are_field_errors() {
    let executor = executor();
    let response = execute(&executor, "{ firstResult { ... on User { name } } fast }").await;
    assert_eq!(response.data, Some(json!({ "firstResult": null, "fast": null })));
    assert_eq!(codes(&response), vec!["ABSTRACT_RESOLUTION_FAILED"]);
    assert_eq!(response.errors[0].path, Some(path!["firstResult"]));

    // a discriminator can decide from the value itself
    let executor = executor.with_discriminator(|value: &ObjectRef, _: &str| {
        value.get("name").map(|_| "User".to_string())
    });
    let response = execute(&executor, "{ firstResult { ... on User { name } } }").await;
    assert_eq!(response.data, Some(json!({ "firstResult": { "name": "Ada" } })));
}

#[test_log::test(tokio::test)]
async fn root_values_and_context_reach_resolvers() {
    let executor = executor();
    let mut request = request("{ fast viewer }", json!({}));
    request.root_value = ObjectRef::from_json(json!({ "fast": 7 }));
    request.context = Context::with_value("ada".to_string());
    let response = executor.execute(request).await;
    assert_eq!(response.data, Some(json!({ "fast": 7, "viewer": "ada" })));
}

#[test_log::test(tokio::test)]
async fn arguments_get_defaults_and_variables() {
    let executor = executor();

    let response = execute(&executor, "{ greeting }").await;
    assert_eq!(response.data, Some(json!({ "greeting": "hello world" })));

    let query = "query($name: String, $times: Int) { greeting(name: $name, times: $times) }";
    let response = executor
        .execute(request(query, json!({ "name": "ada", "times": 2 })))
        .await;
    assert_eq!(
        response.data,
        Some(json!({ "greeting": "hello ada, hello ada" }))
    );

    // an absent variable falls back to the argument default
    let response = executor.execute(request(query, json!({}))).await;
    assert_eq!(response.data, Some(json!({ "greeting": "hello world" })));
}

#[test_log::test(tokio::test)]
async fn invalid_variables_fail_the_fields_using_them() {
    let executor = executor();
    let query = "query($times: Int) { greeting(times: $times) fast }";
    let response = executor
        .execute(request(query, json!({ "times": "twice" })))
        .await;
    assert_eq!(response.data, Some(json!({ "greeting": null, "fast": null })));
    assert_eq!(codes(&response), vec!["VALIDATION_INVALID_TYPE_VARIABLE"]);
    assert_eq!(response.errors[0].path, Some(path!["greeting"]));
    assert!(response.errors[0].message.starts_with("Variable \"$times\""));
}

#[test_log::test(tokio::test)]
async fn compile_errors_produce_no_data() {
    let executor = executor();
    let response = execute(&executor, "{ nope }").await;
    assert_eq!(response.data, None);
    assert_eq!(codes(&response), vec!["GRAPHQL_VALIDATION_FAILED"]);
    let serialized = serde_json_bytes::to_value(&response).unwrap();
    assert!(serialized.get("data").is_none());

    let response = executor.execute(graphql::Request::builder().build()).await;
    assert_eq!(codes(&response), vec!["MISSING_QUERY_STRING"]);

    let response = executor
        .execute(
            ExecutionRequest::builder()
                .query("query A { fast } query B { fast }")
                .operation_name("C")
                .build(),
        )
        .await;
    assert_eq!(codes(&response), vec!["GRAPHQL_UNKNOWN_OPERATION_NAME"]);
}

#[test_log::test(tokio::test)]
async fn graphql_requests_can_be_executed() {
    let executor = executor();
    let request = graphql::Request::builder()
        .query("query Greet($name: String) { greeting(name: $name) }")
        .operation_name("Greet")
        .variable("name", "bob")
        .build();
    let response = executor.execute(request).await;
    assert_eq!(response.data, Some(json!({ "greeting": "hello bob" })));
}

#[test_log::test(tokio::test)]
async fn panicking_resolvers_become_internal_errors() {
    let executor = executor();
    let response = execute(&executor, "{ boom greeting }").await;
    assert_eq!(
        response.data,
        Some(json!({ "boom": null, "greeting": "hello world" }))
    );
    assert_eq!(codes(&response), vec!["INTERNAL_SERVER_ERROR"]);
    assert_eq!(response.errors[0].path, Some(path!["boom"]));
}

#[test_log::test(tokio::test)]
async fn resolver_errors_can_be_masked() {
    let response = execute(&executor(), "{ secret }").await;
    assert_eq!(
        response.errors[0].message,
        "connection refused by db-internal:5432"
    );
    assert_eq!(codes(&response), vec!["RESOLVER_ERROR"]);

    let executor = executor().with_error_mask(MaskErrors::default());
    let response = execute(&executor, "{ secret user { name } }").await;
    let messages: Vec<_> = response
        .errors
        .iter()
        .map(|error| error.message.as_str())
        .collect();
    // only resolver errors are masked
    assert!(messages.contains(&"Unexpected error."));
    assert!(messages.contains(&"Cannot return null for non-nullable field User.name."));
    let secret = response
        .errors
        .iter()
        .find(|error| error.path == Some(path!["secret"]))
        .unwrap();
    assert_eq!(secret.message, "Unexpected error.");
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_partial_data_and_one_error() {
    let executor = executor();
    let token = CancellationToken::new();
    let mut request = request("{ fast forever slowA }", json!({}));
    request.root_value = ObjectRef::from_json(json!({ "fast": 1 }));
    request.cancellation = token.clone();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });
    let response = executor.execute(request).await;

    assert_eq!(
        response.data,
        Some(json!({ "fast": 1, "forever": null, "slowA": null }))
    );
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "operation cancelled");
    assert_eq!(codes(&response), vec!["OPERATION_CANCELLED"]);
}

#[tokio::test(start_paused = true)]
async fn cancelled_non_null_fields_propagate_without_field_errors() {
    let executor = executor();
    let cancel_after = |token: CancellationToken| {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        })
    };

    // the nullable parent absorbs its interrupted non-null field
    let token = CancellationToken::new();
    let mut nested = request("{ fast profile { bio handle } }", json!({}));
    nested.root_value = ObjectRef::from_json(json!({ "fast": 1 }));
    nested.cancellation = token.clone();
    cancel_after(token);
    let response = executor.execute(nested).await;
    assert_eq!(response.data, Some(json!({ "fast": 1, "profile": null })));
    assert_eq!(codes(&response), vec!["OPERATION_CANCELLED"]);

    // a non-null root field nulls the whole data
    let token = CancellationToken::new();
    let mut root = request("{ fast stalled }", json!({}));
    root.root_value = ObjectRef::from_json(json!({ "fast": 1 }));
    root.cancellation = token.clone();
    cancel_after(token);
    let response = executor.execute(root).await;
    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(codes(&response), vec!["OPERATION_CANCELLED"]);
}

#[tokio::test(start_paused = true)]
async fn timeouts_cancel_the_operation() {
    let executor = executor().with_configuration(
        Configuration::builder()
            .execution(
                ExecutionConfiguration::builder()
                    .timeout(Duration::from_millis(200))
                    .build(),
            )
            .build(),
    );
    let response = execute(&executor, "{ slowA forever }").await;
    assert_eq!(response.data, Some(json!({ "slowA": 1, "forever": null })));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "operation timed out");
    assert_eq!(codes(&response), vec!["OPERATION_CANCELLED"]);
}

#[test_log::test(tokio::test)]
async fn plans_are_cached_and_deterministic() {
    let executor = executor();
    let query = "query Q($skip: Boolean!) { user { id name @skip(if: $skip) } items { id } }";

    let first = executor.plan(query, Some("Q")).await.unwrap();
    let second = executor.plan(query, Some("Q")).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    let metrics = executor.plan_cache().metrics().await;
    assert_eq!((metrics.misses, metrics.hits, metrics.size), (1, 1, 1));
    assert_eq!(metrics.hit_rate, 0.5);

    // an independent compilation yields the same plan
    let other = executor.clone().with_plan_cache(Default::default());
    let third = other.plan(query, Some("Q")).await.unwrap();
    assert_eq!(*first, *third);
    assert!(first.is_variable_conditional());

    executor.plan_cache().clear().await;
    assert!(executor.plan_cache().is_empty().await);
}

#[tokio::test]
async fn introspection_queries_are_answered_from_the_schema() {
    let executor = executor();
    let response = execute(
        &executor,
        r#"{
          __schema { queryType { name } mutationType { name } subscriptionType { name } }
          user: __type(name: "User") {
            kind
            name
            fields { name type { kind name ofType { kind name } } }
          }
          search: __type(name: "SearchResult") { kind possibleTypes { name } }
          missing: __type(name: "Nope") { name }
        }"#,
    )
    .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        Some(json!({
            "__schema": {
                "queryType": { "name": "Query" },
                "mutationType": { "name": "Mutation" },
                "subscriptionType": null
            },
            "user": {
                "kind": "OBJECT",
                "name": "User",
                "fields": [
                    { "name": "id", "type": { "kind": "NON_NULL", "name": null, "ofType": { "kind": "SCALAR", "name": "ID" } } },
                    { "name": "name", "type": { "kind": "NON_NULL", "name": null, "ofType": { "kind": "SCALAR", "name": "String" } } }
                ]
            },
            "search": { "kind": "UNION", "possibleTypes": [{ "name": "User" }, { "name": "Tag" }] },
            "missing": null
        }))
    );
}

#[tokio::test]
async fn introspection_arguments_accept_variables() {
    let executor = executor();
    let response = executor
        .execute(request(
            "query ($name: String!) { __type(name: $name) { name kind } }",
            json!({ "name": "Item" }),
        ))
        .await;
    assert_eq!(
        response.data,
        Some(json!({ "__type": { "name": "Item", "kind": "OBJECT" } }))
    );
}

#[tokio::test]
async fn shared_plan_caches_keep_schemas_apart() {
    let cache = apollo_executor::PlanCache::default();
    let resolvers = Resolvers::new();
    let ints = Executor::new(
        Schema::parse("type Query { a: Int }").unwrap(),
        resolvers.clone(),
    )
    .with_plan_cache(cache.clone());
    let strings = Executor::new(
        Schema::parse("type Query { a: String }").unwrap(),
        resolvers,
    )
    .with_plan_cache(cache.clone());

    let mut int_request = request("{ a }", json!({}));
    int_request.root_value = ObjectRef::from_json(json!({ "a": 1 }));
    let response = ints.execute(int_request).await;
    assert_eq!(response.data, Some(json!({ "a": 1 })));

    let mut string_request = request("{ a }", json!({}));
    string_request.root_value = ObjectRef::from_json(json!({ "a": "one" }));
    let response = strings.execute(string_request).await;
    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(response.data, Some(json!({ "a": "one" })));

    assert_eq!(cache.len().await, 2);
    // the same executor still hits its own plans
    assert!(Arc::ptr_eq(
        &ints.plan("{ a }", None).await.unwrap(),
        &ints.plan("{ a }", None).await.unwrap()
    ));
}
