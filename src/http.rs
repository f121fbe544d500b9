use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::access;
use crate::conversion::{self, AnnotatedRecord};
use crate::error::{QueryError, QueryResult};
use crate::filter::{filter_records, RecordFilter};
use crate::models::{TransactionRecord, UserCredential};
use crate::rank::{self, LATEST_FIRST};
use crate::report;
use crate::store::Snapshot;

type AppState = Arc<Snapshot>;

pub fn router(snapshot: Arc<Snapshot>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/get-data", get(get_data))
        .route("/get-data-by-user", get(get_data_by_user))
        .route("/calculate-kpi", get(calculate_kpi).post(calculate_kpi))
        .route("/get-evolution", get(get_evolution).post(get_evolution))
        .route("/msisdn-user", get(msisdn_user))
        .with_state(snapshot)
}

pub async fn serve(addr: SocketAddr, snapshot: Snapshot) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, router(Arc::new(snapshot)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server terminated unexpectedly")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    tracing::info!("shutting down");
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct Credentials {
    msisdn: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct DirectoryQuery {
    msisdn: String,
    password: String,
    entity_type_name: Option<String>,
}

#[derive(Serialize)]
struct DataResponse<'a> {
    data: Vec<AnnotatedRecord<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    msisdn: Option<&'a UserCredential>,
}

/// Malformed query strings get the same JSON error body as every other failure.
fn parse_query<T>(query: Result<Query<T>, QueryRejection>) -> QueryResult<T> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| QueryError::Computation(rejection.body_text()))
}

fn ensure_loaded(snapshot: &Snapshot) -> QueryResult<()> {
    if snapshot.is_empty() {
        return Err(QueryError::no_data());
    }
    Ok(())
}

fn matching<'a>(snapshot: &'a Snapshot, filter: &RecordFilter) -> QueryResult<Vec<&'a TransactionRecord>> {
    ensure_loaded(snapshot)?;
    let records = filter_records(snapshot.records(), &filter.predicates()?);
    if records.is_empty() {
        return Err(QueryError::no_match());
    }
    Ok(records)
}

fn latest_first_annotated(records: Vec<&TransactionRecord>) -> Vec<AnnotatedRecord<'_>> {
    rank::sort_by_keys(records, &LATEST_FIRST)
        .into_iter()
        .map(conversion::annotate)
        .collect()
}

async fn get_data(
    State(snapshot): State<AppState>,
    filter: Result<Query<RecordFilter>, QueryRejection>,
) -> QueryResult<Response> {
    let records = matching(&snapshot, &parse_query(filter)?)?;
    tracing::debug!(rows = records.len(), "get-data");

    let body = DataResponse {
        data: latest_first_annotated(records),
        msisdn: None,
    };
    Ok(Json(body).into_response())
}

async fn get_data_by_user(
    State(snapshot): State<AppState>,
    credentials: Result<Query<Credentials>, QueryRejection>,
) -> QueryResult<Response> {
    let credentials = parse_query(credentials)?;
    let user = snapshot
        .directory()
        .authenticate(&credentials.msisdn, &credentials.password)?;
    ensure_loaded(&snapshot)?;

    let records = access::scope(snapshot.records(), user);
    if records.is_empty() {
        return Err(QueryError::no_match());
    }
    tracing::debug!(msisdn = %user.msisdn, rows = records.len(), "get-data-by-user");

    let body = DataResponse {
        data: latest_first_annotated(records),
        msisdn: Some(user),
    };
    Ok(Json(body).into_response())
}

async fn calculate_kpi(
    State(snapshot): State<AppState>,
    filter: Result<Query<RecordFilter>, QueryRejection>,
) -> QueryResult<Json<report::KpiReport>> {
    let records = matching(&snapshot, &parse_query(filter)?)?;
    let kpi = report::kpi_report(&records)?;
    tracing::debug!(
        days = kpi.transactions_per_day.len(),
        sellers = kpi.best_sellers.len(),
        "calculate-kpi"
    );
    Ok(Json(kpi))
}

async fn get_evolution(
    State(snapshot): State<AppState>,
    filter: Result<Query<RecordFilter>, QueryRejection>,
) -> QueryResult<Json<report::EvolutionReport>> {
    let records = matching(&snapshot, &parse_query(filter)?)?;
    let evolution = report::evolution_report(&records)?;
    tracing::debug!(groups = evolution.evolution.len(), "get-evolution");
    Ok(Json(evolution))
}

async fn msisdn_user(
    State(snapshot): State<AppState>,
    query: Result<Query<DirectoryQuery>, QueryRejection>,
) -> QueryResult<Response> {
    let query = parse_query(query)?;
    let directory = snapshot.directory();
    let user = directory.authenticate(&query.msisdn, &query.password)?;
    let entries = directory.entries_for(user, query.entity_type_name.as_deref());
    Ok(Json(entries).into_response())
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::NaiveDate;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::access::Directory;
    use crate::models::EntityScope;

    fn record(
        seller: &str,
        entity: &str,
        entity_type: &str,
        day: u32,
        transactions: u64,
        activations: u64,
    ) -> TransactionRecord {
        TransactionRecord {
            seller_id: seller.to_string(),
            entity_name: entity.to_string(),
            entity_type_name: entity_type.to_string(),
            offer_name: Some("Pass".to_string()),
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            activation_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            transaction_count: transactions,
            activation_count: activations,
            tmcode: Some(7),
        }
    }

    fn user(msisdn: &str, entity_type: &str, entities: &[&str]) -> UserCredential {
        UserCredential {
            msisdn: msisdn.to_string(),
            password: "pw".to_string(),
            entity_type_name: entity_type.to_string(),
            allowed_entity_names: EntityScope::from_names(entities.iter().copied()),
            refill: None,
        }
    }

    fn app() -> Router {
        let records = vec![
            record("A", "Plateau", "BOUTIQUE", 1, 10, 5),
            record("B", "Cocody", "FRANCHISE", 2, 4, 0),
            record("A", "Plateau", "BOUTIQUE", 3, 5, 5),
        ];
        let directory = Directory::new(vec![
            user("000", "all", &["all"]),
            user("111", "BOUTIQUE", &["Plateau"]),
            user("222", "FRANCHISE", &["Yopougon"]),
        ]);
        router(Arc::new(Snapshot::new(records, directory)))
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn get_data_sorts_latest_first_with_rates() {
        let (status, body) = call(app(), Method::GET, "/get-data?seller_id=A").await;
        assert_eq!(status, StatusCode::OK);

        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["transaction_date"], "2024-03-03");
        assert_eq!(rows[0]["conversion_rate"], 1.0);
        assert_eq!(rows[1]["conversion_rate"], 0.5);
        assert_eq!(rows[1]["non_conversion_rate"], 0.5);
        assert!(body.get("msisdn").is_none());
    }

    #[tokio::test]
    async fn get_data_without_match_is_not_found() {
        let (status, body) = call(app(), Method::GET, "/get-data?entity_name=Nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "ERR_NOT_FOUND");
    }

    #[tokio::test]
    async fn empty_store_is_not_found() {
        let app = router(Arc::new(Snapshot::default()));
        let (status, body) = call(app, Method::GET, "/get-data").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "no data available");
    }

    #[tokio::test]
    async fn bad_date_filter_is_bad_request() {
        let (status, body) = call(app(), Method::GET, "/get-data?transaction_date=tomorrow").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ERR_COMPUTATION");
    }

    #[tokio::test]
    async fn malformed_query_is_json_computation_error() {
        let (status, body) = call(app(), Method::GET, "/get-data?tmcode=abc").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ERR_COMPUTATION");

        let (status, body) = call(app(), Method::GET, "/get-data-by-user?msisdn=000").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ERR_COMPUTATION");
        assert!(body["message"].as_str().unwrap().contains("password"));

        let (status, body) = call(app(), Method::POST, "/calculate-kpi?tmcode=x").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ERR_COMPUTATION");
    }

    #[tokio::test]
    async fn data_by_user_is_scoped_and_hides_password() {
        let (status, body) = call(
            app(),
            Method::GET,
            "/get-data-by-user?msisdn=111&password=pw",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);
        assert_eq!(body["msisdn"]["msisdn"], "111");
        assert!(body["msisdn"].get("password").is_none());
    }

    #[tokio::test]
    async fn data_by_user_distinguishes_auth_failures() {
        let (status, _) = call(app(), Method::GET, "/get-data-by-user?msisdn=000&password=wrong").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(app(), Method::GET, "/get-data-by-user?msisdn=999&password=pw").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn data_by_user_with_nothing_visible_is_not_found() {
        let (status, _) = call(app(), Method::GET, "/get-data-by-user?msisdn=222&password=pw").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn kpi_reports_daily_totals_and_leaderboard() {
        let (status, body) = call(app(), Method::POST, "/calculate-kpi").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transactions_per_day"].as_array().unwrap().len(), 3);
        assert_eq!(
            body["best_sellers"][0],
            json!({
                "seller_id": "A",
                "entity_name": "Plateau",
                "transaction_count": 15,
                "activation_count": 10,
                "conversion_rate": 0.667,
                "non_conversion_rate": 0.333
            })
        );
    }

    #[tokio::test]
    async fn evolution_groups_by_date_offer_seller_entity() {
        let (status, body) = call(app(), Method::GET, "/get-evolution?entity_type_name=BOUTIQUE").await;
        assert_eq!(status, StatusCode::OK);
        let evolution = body["evolution"].as_array().unwrap();
        assert_eq!(evolution.len(), 2);
        assert_eq!(evolution[0]["offer_name"], "Pass");
        assert_eq!(evolution[0]["transaction_date"], "2024-03-01");
    }

    #[tokio::test]
    async fn msisdn_user_returns_directory_entries() {
        let (status, body) = call(app(), Method::GET, "/msisdn-user?msisdn=111&password=pw").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["entity_name"], json!(["Plateau"]));

        let (_, body) = call(
            app(),
            Method::GET,
            "/msisdn-user?msisdn=111&password=pw&entity_type_name=FRANCHISE",
        )
        .await;
        assert_eq!(body, json!([]));
    }
}
