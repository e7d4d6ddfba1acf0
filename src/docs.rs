use crate::handlers::{
    ErrorResponse, EvolveResponse, InitRequest, InitResponse, MigrantData,
    MigrantsIntegratedResponse, StatusResponse,
};
use axum::Json;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::handle_init,
        crate::handlers::handle_evolve,
        crate::handlers::handle_get_migrants,
        crate::handlers::handle_receive_migrants,
        crate::handlers::handle_status
    ),
    components(
        schemas(
            InitRequest,
            InitResponse,
            EvolveResponse,
            MigrantData,
            MigrantsIntegratedResponse,
            StatusResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "Island", description = "Evolution and migration endpoints of one island")
    )
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_island_endpoints() {
        let doc = ApiDoc::openapi();
        for path in ["/init", "/evolve", "/migrants", "/status"] {
            assert!(
                doc.paths.paths.contains_key(path),
                "OpenAPI document is missing {}",
                path
            );
        }
    }
}
