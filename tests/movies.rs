//! Movie routes through the full middleware stack, in process.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use marquee_api::ApiServer;
use serde_json::{json, Value};
use tower::ServiceExt;

mod common;

fn app() -> Router {
    let mut config = common::test_config();
    // In-process requests have no peer address and would share one bucket.
    config.rate_limit.enabled = false;
    ApiServer::new(config).router()
}

fn json_request(method: &str, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn patch(uri: &str, version: Option<&str>, body: &Value) -> Request<Body> {
    let mut request = json_request("PATCH", uri, body);
    if let Some(version) = version {
        request
            .headers_mut()
            .insert("x-expected-version", version.parse().unwrap());
    }
    request
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn create(app: &Router) -> i64 {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/movies",
            &json!({
                "title": "Black Panther",
                "year": 2018,
                "runtime": "134 mins",
                "genres": ["action", "adventure"]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let location = response.headers()["location"].to_str().unwrap().to_owned();
    let body = body_json(response).await;
    assert_eq!(body["movie"]["version"], 1);
    let id = body["movie"]["id"].as_i64().unwrap();
    assert_eq!(location, format!("/v1/movies/{id}"));
    id
}

#[tokio::test]
async fn create_and_show() {
    let app = app();
    let id = create(&app).await;

    let response = app
        .oneshot(
            Request::get(format!("/v1/movies/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["movie"]["title"], "Black Panther");
    assert_eq!(body["movie"]["runtime"], "134 mins");
}

#[tokio::test]
async fn unknown_and_malformed_ids_are_not_found() {
    let app = app();
    for uri in ["/v1/movies/999", "/v1/movies/abc", "/v1/movies/-3"] {
        let response = app
            .clone()
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn stale_expected_version_conflicts() {
    let app = app();
    let id = create(&app).await;
    let uri = format!("/v1/movies/{id}");

    let response = app
        .clone()
        .oneshot(patch(&uri, Some("1"), &json!({"year": 2019})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["movie"]["version"], 2);
    assert_eq!(body["movie"]["year"], 2019);
    assert_eq!(body["movie"]["title"], "Black Panther");

    // A second client still holding version 1.
    let response = app
        .clone()
        .oneshot(patch(&uri, Some("1"), &json!({"title": "Other"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("edit conflict"));

    let response = app
        .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["movie"]["title"], "Black Panther");
    assert_eq!(body["movie"]["version"], 2);
}

#[tokio::test]
async fn malformed_input_is_a_bad_request() {
    let app = app();
    let id = create(&app).await;
    let uri = format!("/v1/movies/{id}");

    let response = app
        .clone()
        .oneshot(patch(&uri, Some("not-a-number"), &json!({"year": 2019})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(patch(&uri, None, &json!({"director": "Coogler"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(
            Request::post("/v1/movies")
                .header("content-type", "application/json")
                .body(Body::from("{\"title\": "))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_fields_are_unprocessable() {
    let app = app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/v1/movies",
            &json!({
                "title": "",
                "year": 1700,
                "runtime": "0 mins",
                "genres": []
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    for field in ["title", "year", "runtime", "genres"] {
        assert!(body["error"][field].is_string(), "{field}");
    }

    let id = create(&app).await;
    let response = app
        .oneshot(patch(
            &format!("/v1/movies/{id}"),
            None,
            &json!({"genres": ["a", "a"]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_patches_never_lose_an_update() {
    let app = app();
    let id = create(&app).await;
    let uri = format!("/v1/movies/{id}");

    let mut handles = Vec::new();
    for year in 2000..2016 {
        let app = app.clone();
        let uri = uri.clone();
        handles.push(tokio::spawn(async move {
            app.oneshot(patch(&uri, None, &json!({ "year": year })))
                .await
                .unwrap()
                .status()
        }));
    }

    let mut applied = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => applied += 1,
            StatusCode::CONFLICT => {}
            other => panic!("unexpected status {other}"),
        }
    }
    assert!(applied >= 1);

    let response = app
        .oneshot(Request::get(&uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["movie"]["version"], 1 + applied);
}
