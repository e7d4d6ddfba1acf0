use crate::consts::DEFAULT_RISK_FREE_RATE;
use crate::evolution::{EvolutionConfig, EvolutionError};
use crate::island::{Island, IslandStatus};
use crate::portfolio::PortfolioModel;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::error;
use utoipa::{IntoParams, ToSchema};

/// Shared handle to the one island this worker hosts.
///
/// The mutex serializes evolution and migration on the island.
#[derive(Clone)]
pub struct AppState {
    island: Arc<Mutex<Island>>,
    emigrant_count: usize,
}

impl AppState {
    pub fn new(config: EvolutionConfig) -> Self {
        AppState {
            emigrant_count: config.emigrant_count,
            island: Arc::new(Mutex::new(Island::new(config))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
}

#[derive(Debug)]
pub enum ApiError {
    Evolution(EvolutionError),
    Internal(String),
}

impl From<EvolutionError> for ApiError {
    fn from(err: EvolutionError) -> Self {
        ApiError::Evolution(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::Evolution(err) => {
                let status = match err {
                    EvolutionError::NotInitialized => StatusCode::BAD_REQUEST,
                    EvolutionError::AlreadyInitialized => StatusCode::CONFLICT,
                    EvolutionError::Configuration(_) | EvolutionError::InvalidGenome(_) => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                };
                let kind = serde_json::to_value(err.kind())
                    .ok()
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_default();
                (status, kind, err.to_string())
            }
            ApiError::Internal(message) => {
                error!(%message, "Internal error while serving island request");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal".into(), message)
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: message,
                kind,
            }),
        )
            .into_response()
    }
}

/// Runs `op` against the island on a blocking thread, holding the island lock.
async fn with_island<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    F: FnOnce(&mut Island) -> Result<T, EvolutionError> + Send + 'static,
    T: Send + 'static,
{
    let island = Arc::clone(&state.island);
    tokio::task::spawn_blocking(move || {
        let mut guard = island
            .lock()
            .map_err(|_| ApiError::Internal("Island lock poisoned".into()))?;
        op(&mut guard).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("Island task failed: {e}")))?
}

/// Either precomputed moments or a price history to derive them from.
#[derive(Deserialize, Debug, ToSchema)]
#[serde(untagged)]
pub enum InitRequest {
    Moments {
        mu: Vec<f64>,
        cov: Vec<Vec<f64>>,
        risk_free_rate: Option<f64>,
    },
    Prices {
        prices: Vec<Vec<f64>>,
        risk_free_rate: Option<f64>,
    },
}

impl InitRequest {
    pub fn into_model(self) -> Result<PortfolioModel, EvolutionError> {
        match self {
            InitRequest::Moments {
                mu,
                cov,
                risk_free_rate,
            } => PortfolioModel::new(mu, cov, risk_free_rate.unwrap_or(DEFAULT_RISK_FREE_RATE)),
            InitRequest::Prices {
                prices,
                risk_free_rate,
            } => PortfolioModel::from_prices(
                &prices,
                risk_free_rate.unwrap_or(DEFAULT_RISK_FREE_RATE),
            ),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct InitResponse {
    pub status: String,
    pub assets: usize,
}

#[utoipa::path(
    post,
    path = "/init",
    request_body = InitRequest,
    responses(
        (status = 200, description = "Island initialized", body = InitResponse),
        (status = 409, description = "Island already initialized", body = ErrorResponse),
        (status = 422, description = "Malformed portfolio model", body = ErrorResponse)
    ),
    tag = "Island"
)]
pub async fn handle_init(
    State(state): State<AppState>,
    Json(payload): Json<InitRequest>,
) -> Result<Json<InitResponse>, ApiError> {
    let model = payload.into_model()?;
    let summary = with_island(&state, move |island| island.initialize(model)).await?;
    Ok(Json(InitResponse {
        status: "initialized".into(),
        assets: summary.asset_count,
    }))
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EvolveParams {
    /// Generations to run, defaults to 1.
    pub generations: Option<usize>,
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct EvolveResponse {
    pub status: String,
    pub current_best_sharpe: f64,
    pub generations_run: usize,
    pub terminated: bool,
}

#[utoipa::path(
    post,
    path = "/evolve",
    params(EvolveParams),
    responses(
        (status = 200, description = "Generations run", body = EvolveResponse),
        (status = 400, description = "Island not initialized", body = ErrorResponse),
        (status = 422, description = "Invalid generation count", body = ErrorResponse)
    ),
    tag = "Island"
)]
pub async fn handle_evolve(
    State(state): State<AppState>,
    Query(params): Query<EvolveParams>,
) -> Result<Json<EvolveResponse>, ApiError> {
    let generations = params.generations.unwrap_or(1);
    let summary = with_island(&state, move |island| island.evolve(generations)).await?;
    Ok(Json(EvolveResponse {
        status: "evolved".into(),
        current_best_sharpe: summary.best_sharpe,
        generations_run: summary.generations_run,
        terminated: summary.terminated,
    }))
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct MigrantsParams {
    /// Number of emigrants, defaults to the configured emigrant count.
    pub count: Option<usize>,
}

/// A migration batch: raw genomes, best first when sent by an island.
#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct MigrantData {
    pub genes: Vec<Vec<f64>>,
}

#[utoipa::path(
    get,
    path = "/migrants",
    params(MigrantsParams),
    responses(
        (status = 200, description = "Best genomes, best first", body = MigrantData),
        (status = 400, description = "Island not initialized", body = ErrorResponse)
    ),
    tag = "Island"
)]
pub async fn handle_get_migrants(
    State(state): State<AppState>,
    Query(params): Query<MigrantsParams>,
) -> Result<Json<MigrantData>, ApiError> {
    let count = params.count.unwrap_or(state.emigrant_count);
    let genes = with_island(&state, move |island| island.select_emigrants(count)).await?;
    Ok(Json(MigrantData { genes }))
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct MigrantsIntegratedResponse {
    pub status: String,
    pub count: usize,
}

#[utoipa::path(
    post,
    path = "/migrants",
    request_body = MigrantData,
    responses(
        (status = 200, description = "Immigrants integrated", body = MigrantsIntegratedResponse),
        (status = 400, description = "Island not initialized", body = ErrorResponse),
        (status = 422, description = "Invalid genome in batch", body = ErrorResponse)
    ),
    tag = "Island"
)]
pub async fn handle_receive_migrants(
    State(state): State<AppState>,
    Json(payload): Json<MigrantData>,
) -> Result<Json<MigrantsIntegratedResponse>, ApiError> {
    let count = with_island(&state, move |island| island.integrate_immigrants(payload.genes)).await?;
    Ok(Json(MigrantsIntegratedResponse {
        status: "migrants_integrated".into(),
        count,
    }))
}

#[derive(Serialize, Deserialize, Debug, ToSchema)]
pub struct StatusResponse {
    /// Best Sharpe ratio so far, `null` until the island has been evaluated.
    pub sharpe: Option<f64>,
    pub state: String,
    pub generation: Option<usize>,
}

impl From<IslandStatus> for StatusResponse {
    fn from(status: IslandStatus) -> Self {
        match status {
            IslandStatus::NoResultYet => StatusResponse {
                sharpe: None,
                state: "no_result_yet".into(),
                generation: None,
            },
            IslandStatus::Evaluated {
                best_sharpe,
                generation,
            } => StatusResponse {
                sharpe: Some(best_sharpe),
                state: "evaluated".into(),
                generation: Some(generation),
            },
        }
    }
}

#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Best known result", body = StatusResponse)),
    tag = "Island"
)]
pub async fn handle_status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    let status = with_island(&state, |island| Ok(island.status())).await?;
    Ok(Json(status.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web_app::build_app;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> axum::Router {
        build_app(AppState::new(EvolutionConfig {
            population_size: 10,
            global_seed: Some(42),
            emigrant_count: 2,
            ..EvolutionConfig::default()
        }))
    }

    async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(match body {
                Some(value) => Body::from(value.to_string()),
                None => Body::empty(),
            })
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn scenario_model() -> Value {
        json!({
            "mu": [0.08, 0.12, 0.05],
            "cov": [[0.04, 0.0, 0.0], [0.0, 0.04, 0.0], [0.0, 0.0, 0.04]],
            "risk_free_rate": 0.02
        })
    }

    #[tokio::test]
    async fn test_status_before_init_is_distinguishable() {
        let app = app();
        let (status, body) = send(&app, "GET", "/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sharpe"], Value::Null);
        assert_eq!(body["state"], "no_result_yet");
    }

    #[tokio::test]
    async fn test_operations_before_init_are_rejected() {
        let app = app();
        let (status, body) = send(&app, "POST", "/evolve?generations=2", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "configuration");

        let (status, _) = send(&app, "GET", "/migrants", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_full_worker_cycle() {
        let app = app();
        let (status, body) = send(&app, "POST", "/init", Some(scenario_model())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assets"], 3);

        let (status, _) = send(&app, "POST", "/init", Some(scenario_model())).await;
        assert_eq!(status, StatusCode::CONFLICT, "Second init must be refused");

        let (status, body) = send(&app, "POST", "/evolve?generations=3", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["generations_run"], 3);
        let best = body["current_best_sharpe"].as_f64().unwrap();

        let (status, body) = send(&app, "GET", "/migrants", None).await;
        assert_eq!(status, StatusCode::OK);
        let genes = body["genes"].as_array().unwrap();
        assert_eq!(genes.len(), 2, "Defaults to the configured emigrant count");

        let (status, body) = send(
            &app,
            "POST",
            "/migrants",
            Some(json!({ "genes": [[0.2, 0.7, 0.1]] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 1);

        let (_, body) = send(&app, "GET", "/status", None).await;
        assert_eq!(body["state"], "evaluated");
        assert!(body["sharpe"].as_f64().unwrap() >= best);
    }

    #[tokio::test]
    async fn test_invalid_immigrants_are_unprocessable() {
        let app = app();
        send(&app, "POST", "/init", Some(scenario_model())).await;
        let (status, body) = send(
            &app,
            "POST",
            "/migrants",
            Some(json!({ "genes": [[0.5, 0.5]] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "invalid_genome");
    }

    #[tokio::test]
    async fn test_init_from_prices_and_malformed_model() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/init",
            Some(json!({ "mu": [0.1, 0.2], "cov": [[0.04]] })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "configuration");

        let prices = json!({
            "prices": [[100.0, 50.0], [101.0, 49.5], [100.5, 50.5], [102.0, 50.2], [103.0, 49.8]]
        });
        let (status, body) = send(&app, "POST", "/init", Some(prices)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["assets"], 2);
    }
}
