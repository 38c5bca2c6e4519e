use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use shared::{
    domain::{Place, PlaceId},
    error::{ApiError, ErrorCode},
    protocol::{CatalogResponse, UpdateUserPlacesRequest, UserPlacesResponse},
};
use storage::Storage;
use tracing::{error, info, warn};

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    seed_catalog(&storage, &settings.catalog_path).await?;

    let state = AppState { storage };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Loads the catalog file (a JSON array of places) into storage. A missing
/// file is not fatal: the previously stored catalog keeps being served.
async fn seed_catalog(storage: &Storage, catalog_path: &str) -> anyhow::Result<()> {
    let raw = match std::fs::read_to_string(catalog_path) {
        Ok(raw) => raw,
        Err(err) => {
            warn!(%catalog_path, %err, "catalog file not readable; serving the stored catalog");
            return Ok(());
        }
    };

    let places: Vec<Place> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse catalog file '{catalog_path}'"))?;
    for place in &places {
        storage.upsert_place(place).await?;
    }
    info!(count = places.len(), %catalog_path, "catalog seeded");
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/places", get(http_list_places))
        .route(
            "/user-places",
            get(http_get_user_places).put(http_put_user_places),
        )
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_places(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CatalogResponse>, (StatusCode, Json<ApiError>)> {
    let places = state.storage.list_catalog().await.map_err(internal)?;
    Ok(Json(CatalogResponse { places }))
}

async fn http_get_user_places(
    State(state): State<Arc<AppState>>,
) -> Result<Json<UserPlacesResponse>, (StatusCode, Json<ApiError>)> {
    let places = state.storage.selected_places().await.map_err(internal)?;
    Ok(Json(UserPlacesResponse { places }))
}

async fn http_put_user_places(
    State(state): State<Arc<AppState>>,
    Json(request): Json<UpdateUserPlacesRequest>,
) -> Result<StatusCode, (StatusCode, Json<ApiError>)> {
    let mut ids: Vec<PlaceId> = Vec::with_capacity(request.places.len());
    for place in &request.places {
        if ids.contains(&place.id) {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiError::new(
                    ErrorCode::Validation,
                    format!("duplicate place id '{}'", place.id),
                )),
            ));
        }
        if state
            .storage
            .catalog_place(&place.id)
            .await
            .map_err(internal)?
            .is_none()
        {
            return Err((
                StatusCode::NOT_FOUND,
                Json(ApiError::new(
                    ErrorCode::NotFound,
                    format!("unknown place id '{}'", place.id),
                )),
            ));
        }
        ids.push(place.id.clone());
    }

    state
        .storage
        .replace_selected_places(&ids)
        .await
        .map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

fn internal(err: anyhow::Error) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(ErrorCode::Internal, err.to_string())),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
