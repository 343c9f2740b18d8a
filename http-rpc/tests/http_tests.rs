//! HTTP-level tests: the axum router produced by `RpcServer`, driven with
//! `tower::ServiceExt::oneshot`.

use axum::body::Body;
use http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use http_rpc::prelude::*;
use http_rpc::{BoxError, PROBLEM_CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::ServiceExt;

#[derive(Default)]
struct AppState {
    handler_calls: AtomicUsize,
}

#[derive(Deserialize)]
struct CreateUser {
    name: String,
}

#[derive(Deserialize)]
struct Countdown {
    from: u32,
}

async fn require_token(ctx: Context<Arc<AppState>>) -> RpcResult<Value> {
    let token = ctx
        .header("authorization")
        .ok_or_else(|| RpcError::unauthorized("Missing token"))?;
    Ok(json!({ "userToken": token }))
}

async fn create_user(ctx: Context<Arc<AppState>>, input: CreateUser) -> RpcResult<Value> {
    ctx.handler_calls.fetch_add(1, Ordering::SeqCst);
    Ok(json!({ "id": 1, "name": input.name, "password": "123456" }))
}

async fn list_users(ctx: Context<Arc<AppState>>) -> RpcResult<Value> {
    ctx.handler_calls.fetch_add(1, Ordering::SeqCst);
    ctx.response().set_header("x-total-count", "2")?;
    Ok(json!([{ "id": 1 }, { "id": 2 }]))
}

async fn update_user(_ctx: Context<Arc<AppState>>) -> RpcResult<Value> {
    Err(RpcError::not_implemented("Not implemented"))
}

fn countdown(
    _ctx: Context<Arc<AppState>>,
    input: Countdown,
) -> impl futures::Stream<Item = RpcResult<u32>> + Send {
    futures::stream::iter((1..=input.from).rev().map(Ok))
}

fn app(state: Arc<AppState>) -> axum::Router {
    let public = route::<Arc<AppState>>();
    let protected = public.middleware(require_token);

    let router = Router::new()
        .route(
            "users",
            Router::new()
                .route(
                    "create",
                    protected
                        .input(ObjectSchema::new().field("name", Field::string()))
                        .output(
                            ObjectSchema::new()
                                .field("id", Field::integer())
                                .field("name", Field::string()),
                        )
                        .post(create_user),
                )
                .route("list", protected.get(list_users))
                .route("update", public.get(update_user)),
        )
        .route(
            "countdown",
            public
                .input(ObjectSchema::new().field("from", Field::integer().min(0.0)))
                .sse(countdown),
        );

    RpcServer::new(router, state)
        .config(
            RpcConfig::new()
                .with_prefix("/rpc")
                .with_max_input_size(1024)
                .with_development_mode(true),
        )
        .on_error(
            |mut body: ProblemDetails, _err: &DispatchError| -> Result<Option<ProblemDetails>, BoxError> {
                body.extensions.insert("service".into(), json!("users"));
                Ok(Some(body))
            },
        )
        .into_router()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer abc")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_post_strips_output_and_wraps_in_data() {
    let state = Arc::new(AppState::default());
    let response = app(state.clone())
        .oneshot(post("/rpc/users/create", r#"{"name":"x","role":"admin"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({ "data": { "id": 1, "name": "x" } }));
    assert_eq!(state.handler_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_token_is_401_and_handler_not_run() {
    let state = Arc::new(AppState::default());
    let response = app(state.clone())
        .oneshot(get("/rpc/users/list"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        PROBLEM_CONTENT_TYPE
    );
    let body = body_json(response).await;
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["status"], 401);
    assert_eq!(body["instance"], "/rpc/users/list");
    assert_eq!(body["service"], "users");
    assert_eq!(state.handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_handler_response_headers() {
    let request = Request::builder()
        .uri("/rpc/users/list")
        .header(header::AUTHORIZATION, "Bearer abc")
        .body(Body::empty())
        .unwrap();
    let response = app(Arc::default()).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-total-count"], "2");
}

#[tokio::test]
async fn test_not_implemented_is_501() {
    let response = app(Arc::default())
        .oneshot(get("/rpc/users/update"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body_json(response).await["code"], "NOT_IMPLEMENTED");
}

#[tokio::test]
async fn test_invalid_input_is_400_with_issues() {
    let response = app(Arc::default())
        .oneshot(post("/rpc/users/create", r#"{"name":7}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert_eq!(body["errors"][0]["path"], json!(["name"]));
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let big = format!(r#"{{"name":"{}"}}"#, "a".repeat(4096));
    let response = app(Arc::default())
        .oneshot(post("/rpc/users/create", &big))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_json(response).await["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_unknown_route_is_404_problem() {
    let response = app(Arc::default())
        .oneshot(get("/rpc/users/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_wrong_method_is_405_problem() {
    let response = app(Arc::default())
        .oneshot(post("/rpc/users/update", "{}"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_json(response).await["code"], "METHOD_NOT_SUPPORTED");
}

#[tokio::test]
async fn test_sse_frames_each_item() {
    let input = url_encode(r#"{"from":3}"#);
    let response = app(Arc::default())
        .oneshot(get(&format!("/rpc/countdown?input={}", input)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");

    let text = body_text(response).await;
    let data: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).unwrap())
        .collect();
    assert_eq!(
        data,
        vec![json!({ "data": 3 }), json!({ "data": 2 }), json!({ "data": 1 })]
    );
}

fn url_encode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

// =============================================================================
// Failure containment
// =============================================================================

async fn explode(_ctx: Context<()>) -> RpcResult<Value> {
    let empty: Vec<Value> = Vec::new();
    Ok(empty[3].clone())
}

async fn explode_in_middleware(_ctx: Context<()>) -> RpcResult<()> {
    panic!("middleware exploded")
}

async fn ok(_ctx: Context<()>) -> RpcResult<Value> {
    Ok(json!("ok"))
}

async fn plain_text_then_forbid(ctx: Context<()>) -> RpcResult<()> {
    ctx.response().set_header("content-type", "text/plain")?;
    ctx.response().set_header("x-request-tag", "t1")?;
    Err(RpcError::forbidden("Not allowed"))
}

fn exploding_ticks(_ctx: Context<()>) -> impl futures::Stream<Item = RpcResult<u32>> + Send {
    futures::stream::iter((0..3u32).map(|n| {
        if n == 1 {
            panic!("stream exploded");
        }
        Ok(n)
    }))
}

fn fragile_app(development_mode: bool) -> axum::Router {
    let base = route::<()>();
    let router = Router::new()
        .route("explode", base.get(explode))
        .route("guarded", base.middleware(explode_in_middleware).get(ok))
        .route("forbidden", base.middleware(plain_text_then_forbid).get(ok))
        .route("ticks", base.sse(exploding_ticks));

    RpcServer::new(router, ())
        .config(
            RpcConfig::new()
                .with_prefix("/rpc")
                .with_development_mode(development_mode),
        )
        .into_router()
}

#[tokio::test]
async fn test_panicking_handler_is_500_problem() {
    let response = fragile_app(true)
        .oneshot(get("/rpc/explode"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_CONTENT_TYPE);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(body["instance"], "/rpc/explode");
    assert!(body["cause"].as_str().unwrap().starts_with("panic:"));
}

#[tokio::test]
async fn test_panicking_handler_is_redacted_in_production() {
    let response = fragile_app(false)
        .oneshot(get("/rpc/explode"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "INTERNAL_SERVER_ERROR");
    assert!(body.get("cause").is_none());
    assert!(body.get("detail").is_none());
}

#[tokio::test]
async fn test_panicking_middleware_is_500_problem() {
    let response = fragile_app(true)
        .oneshot(get("/rpc/guarded"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "INTERNAL_SERVER_ERROR");
}

#[tokio::test]
async fn test_panicking_stream_closes_after_delivered_items() {
    let response = fragile_app(true)
        .oneshot(get("/rpc/ticks"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let text = body_text(response).await;
    let data: Vec<Value> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data: "))
        .map(|payload| serde_json::from_str(payload).unwrap())
        .collect();
    assert_eq!(data, vec![json!({ "data": 0 })]);
}

#[tokio::test]
async fn test_error_content_type_survives_middleware_headers() {
    let response = fragile_app(true)
        .oneshot(get("/rpc/forbidden"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_CONTENT_TYPE);
    assert_eq!(response.headers()["x-request-tag"], "t1");
}

#[tokio::test]
async fn test_head_is_served_like_get() {
    let request = Request::builder()
        .method("HEAD")
        .uri("/rpc/users/update")
        .body(Body::empty())
        .unwrap();
    let response = app(Arc::default()).oneshot(request).await.unwrap();

    // Same status as GET, without a body.
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    assert!(body_text(response).await.is_empty());
}

#[test]
fn test_invalid_config_rejected_at_startup() {
    for config in [
        RpcConfig::new().with_prefix("rpc"),
        RpcConfig::new().with_prefix("/rpc/"),
        RpcConfig::new().with_max_input_size(0),
    ] {
        let result = RpcServer::new(Router::<()>::new(), ())
            .config(config.clone())
            .try_into_router();
        assert!(result.is_err(), "{:?} was accepted", config);
    }
}

#[test]
#[should_panic(expected = "Invalid RPC configuration")]
fn test_into_router_panics_on_invalid_config() {
    let _ = RpcServer::new(Router::<()>::new(), ())
        .config(RpcConfig::new().with_prefix("rpc/"))
        .into_router();
}
