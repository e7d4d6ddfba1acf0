use crate::docs::openapi_json;
use crate::handlers::{
    handle_evolve, handle_get_migrants, handle_init, handle_receive_migrants, handle_status,
    AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use http::header::HeaderName;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, request_id::MakeRequestUuid,
    request_id::SetRequestIdLayer, trace::TraceLayer,
};

pub fn build_app(state: AppState) -> Router {
    let x_request_id = HeaderName::from_static("x-request-id");
    Router::new()
        .route("/init", post(handle_init))
        .route("/evolve", post(handle_evolve))
        .route(
            "/migrants",
            get(handle_get_migrants).post(handle_receive_migrants),
        )
        .route("/status", get(handle_status))
        .route("/api-docs/openapi.json", get(openapi_json))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
}
