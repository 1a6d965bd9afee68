use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use barnivore_adapters::{ApiConfig, BarnivoreApi, CatalogSource, SourceError};
use barnivore_core::Category;
use serde_json::json;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct Seen {
    user_agents: Arc<Mutex<Vec<String>>>,
}

async fn beer(State(seen): State<Seen>, headers: HeaderMap) -> Json<serde_json::Value> {
    if let Some(ua) = headers.get(header::USER_AGENT).and_then(|v| v.to_str().ok()) {
        seen.user_agents.lock().unwrap().push(ua.to_string());
    }
    Json(json!([
        {"company": {"id": 1, "company_name": "X", "city": "from-beer"}}
    ]))
}

async fn wine() -> StatusCode {
    StatusCode::INTERNAL_SERVER_ERROR
}

async fn liquor() -> Json<serde_json::Value> {
    Json(json!([
        {"company": {"id": 1, "company_name": "X", "city": "from-liquor"}},
        {"company": {"id": 2, "company_name": "Y"}}
    ]))
}

async fn detail(Path(file): Path<String>) -> Response {
    match file.as_str() {
        "1.json" => Json(json!({"company": {
            "id": 1,
            "company_name": "X",
            "country": "USA",
            "products": [
                {"id": 10, "booze_type": "Beer", "product_name": "Pale Ale",
                 "red_yellow_green": "Green"}
            ]
        }}))
        .into_response(),
        "3.json" => Json(json!({"message": "no such company"})).into_response(),
        "4.json" => (StatusCode::OK, "<html>maintenance</html>").into_response(),
        "5.json" => Json(json!({"company": {
            "id": 5,
            "company_name": "Z",
            "products": [{"product_name": "nameless"}, {"id": 50, "product_name": "Mead"}]
        }}))
        .into_response(),
        "6.json" => Json(json!({"company": {"id": 6, "company_name": "W", "products": null}}))
            .into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn spawn_catalog() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/beer.json", get(beer))
        .route("/wine.json", get(wine))
        .route("/liquor.json", get(liquor))
        .route("/company/{file}", get(detail))
        .with_state(seen.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}"), seen)
}

fn api(base_url: String) -> BarnivoreApi {
    BarnivoreApi::new(ApiConfig {
        base_url,
        user_agent: "barnivore-test/1.0".into(),
        timeout: Duration::from_secs(5),
        detail_delay: Duration::ZERO,
    })
    .expect("client")
}

#[tokio::test]
async fn lists_dedupe_across_categories_and_skip_failures() {
    let (base_url, seen) = spawn_catalog().await;
    let api = api(base_url);

    assert!(api.fetch_category(Category::Wine).await.is_err());

    let companies = api.list_companies().await;
    let ids = companies.iter().map(|c| c.id).collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(companies[0].city.as_deref(), Some("from-beer"));
    assert_eq!(companies[1].company_name.as_deref(), Some("Y"));

    let agents = seen.user_agents.lock().unwrap().clone();
    assert_eq!(agents, vec!["barnivore-test/1.0".to_string()]);
}

#[tokio::test]
async fn detail_embeds_products() {
    let (base_url, _) = spawn_catalog().await;
    let api = api(base_url);

    let company = api.company_detail(1).await.expect("detail");
    assert_eq!(company.country.as_deref(), Some("USA"));
    assert_eq!(company.products.len(), 1);
    assert_eq!(company.products[0].product_name.as_deref(), Some("Pale Ale"));
}

#[tokio::test]
async fn malformed_products_do_not_discard_the_detail_record() {
    let (base_url, _) = spawn_catalog().await;
    let api = api(base_url);

    let company = api.company_detail(5).await.expect("detail");
    assert_eq!(company.company_name.as_deref(), Some("Z"));
    assert_eq!(company.products.len(), 1);
    assert_eq!(company.products[0].id, 50);
    assert_eq!(company.skipped_products, 1);

    let company = api.company_detail(6).await.expect("detail with null products");
    assert!(company.products.is_empty());
}

#[tokio::test]
async fn detail_failures_become_absence() {
    let (base_url, _) = spawn_catalog().await;
    let api = api(base_url);

    assert!(matches!(
        api.fetch_detail(2).await,
        Err(SourceError::Fetch(_))
    ));
    assert!(matches!(
        api.fetch_detail(3).await,
        Err(SourceError::MissingCompany { .. })
    ));
    match api.fetch_detail(4).await {
        Err(SourceError::Decode { url, .. }) => assert!(url.ends_with("/company/4.json")),
        other => panic!("expected decode error, got {other:?}"),
    }

    for id in [2, 3, 4] {
        assert_eq!(api.company_detail(id).await, None);
    }
}

#[tokio::test]
async fn detail_requests_wait_for_the_fixed_delay() {
    let (base_url, _) = spawn_catalog().await;
    let api = BarnivoreApi::new(ApiConfig {
        base_url,
        detail_delay: Duration::from_millis(150),
        ..Default::default()
    })
    .expect("client");

    let started = std::time::Instant::now();
    api.company_detail(1).await.expect("detail");
    assert!(started.elapsed() >= Duration::from_millis(150));
}
