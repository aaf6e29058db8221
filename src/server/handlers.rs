use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use crate::location::{builtin_city_list, CityInfo};
use crate::session::entries::EntryId;
use crate::store::MapViewport;
use crate::{SessionError, SessionView};

use super::state::AppState;

// ─── Error response ──────────────────────────────────────────────

#[derive(Serialize)]
struct ApiErrorBody {
    error: String,
    code: u16,
}

#[derive(Debug)]
pub(super) struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.1,
            code: self.0.as_u16(),
        };
        (self.0, Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::EmptyName => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }
}

fn api_error(status: StatusCode, msg: impl Into<String>) -> ApiError {
    ApiError(status, msg.into())
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

// ─── GET /api/state ──────────────────────────────────────────────

pub async fn session_state(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    Json(state.session.view())
}

// ─── POST /api/cities ────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddCityBody {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct AddCityResponse {
    pub id: EntryId,
    pub state: SessionView,
}

/// Queues the city and answers at once; the entry is still pending.
pub async fn add_city(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AddCityBody>,
) -> Result<(StatusCode, Json<AddCityResponse>), ApiError> {
    let start = Instant::now();
    let id = state.session.add_city(&body.name)?;

    info!(name = %body.name.trim(), %id, ms = elapsed_ms(start), "POST /api/cities");

    Ok((
        StatusCode::ACCEPTED,
        Json(AddCityResponse {
            id,
            state: state.session.view(),
        }),
    ))
}

// ─── DELETE /api/cities/{name} ───────────────────────────────────

pub async fn remove_city(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<SessionView>, ApiError> {
    let removed = state.session.remove_city(&name).ok_or_else(|| {
        api_error(StatusCode::NOT_FOUND, format!("City '{}' is not in the list", name))
    })?;

    info!(name = %removed.name, id = %removed.id, "DELETE /api/cities/{{name}}");
    Ok(Json(state.session.view()))
}

// ─── DELETE /api/cities ──────────────────────────────────────────

pub async fn clear_cities(State(state): State<Arc<AppState>>) -> Json<SessionView> {
    state.session.clear();
    info!("DELETE /api/cities");
    Json(state.session.view())
}

// ─── PUT /api/viewport ───────────────────────────────────────────

pub async fn set_viewport(
    State(state): State<Arc<AppState>>,
    Json(viewport): Json<MapViewport>,
) -> Result<Json<SessionView>, ApiError> {
    if !viewport.center.is_valid() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Invalid coordinates. Lat: -90..90, Lon: -180..180",
        ));
    }
    state.session.set_viewport(viewport);
    Ok(Json(state.session.view()))
}

// ─── GET /api/builtin-cities ─────────────────────────────────────

pub async fn builtin_cities() -> Json<Vec<CityInfo>> {
    Json(builtin_city_list())
}
