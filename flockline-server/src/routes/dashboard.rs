use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use flockline::dashboard::{dashboard_stats, DashboardStats};

pub fn routes() -> Router<AppState> {
    Router::new().route("/dashboard", get(stats))
}

async fn stats(
    State(state): State<AppState>,
    AdminUser(actor): AdminUser,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(dashboard_stats(state.store(), &actor).await?))
}
