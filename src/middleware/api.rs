use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::error::LtiError;
use super::extractor::AuthUser;
use super::state::AppState;
use super::traits::{ProgressGateway, SessionStore};
use super::types::AuthenticatedSession;
use crate::progress::{
    ProgressReceipt, ProgressRecord, ProgressUpdate, UnitContent, UnitView, unlock_sequence,
};

pub(super) fn routes<S: SessionStore, G: ProgressGateway>() -> Router<AppState<S, G>> {
    Router::new()
        .route("/api/user", get(current_user::<S, G>))
        .route("/api/student/units", get(student_units::<S, G>))
        .route("/api/progress/update", post(update_progress::<S, G>))
        .route("/api/unit/{unit_id}/content", get(unit_content::<S, G>))
}

async fn current_user<S: SessionStore, G: ProgressGateway>(
    user: AuthUser,
) -> Json<AuthenticatedSession> {
    Json(user.user)
}

async fn student_units<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
    user: AuthUser,
) -> Result<Json<Vec<UnitView>>, LtiError> {
    Ok(Json(course_view(&state, &user.user).await?))
}

/// Content of one unit, served only once the student has unlocked it.
async fn unit_content<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
    user: AuthUser,
    Path(unit_id): Path<String>,
) -> Result<Json<UnitContent>, LtiError> {
    let views = course_view(&state, &user.user).await?;
    let view = views
        .iter()
        .find(|v| v.unit.id == unit_id)
        .ok_or_else(|| LtiError::NotFound(format!("unit {unit_id}")))?;
    if !view.unlocked {
        tracing::warn!(subject = %user.user.subject, unit_id = %unit_id, "Locked unit requested");
        return Err(LtiError::Forbidden);
    }

    let content = state.gateway.unit_content(&unit_id).await.map_err(|e| {
        tracing::error!(unit_id = %unit_id, error = %e, "Fetching unit content failed");
        LtiError::GatewayUnavailable(e.to_string())
    })?;
    content
        .map(Json)
        .ok_or_else(|| LtiError::NotFound(format!("unit {unit_id}")))
}

/// The session's course units in order, with unlock state and progress.
async fn course_view<S: SessionStore, G: ProgressGateway>(
    state: &AppState<S, G>,
    user: &AuthenticatedSession,
) -> Result<Vec<UnitView>, LtiError> {
    let course_id = user
        .course_context
        .as_ref()
        .map(|c| c.id.as_str())
        .ok_or(LtiError::MissingParameter("course context"))?;

    let (units, progress) = tokio::join!(
        state.gateway.course_units(course_id),
        state.gateway.student_progress(&user.subject, course_id),
    );
    let units = units.map_err(|e| {
        tracing::error!(course_id = %course_id, error = %e, "Fetching course units failed");
        LtiError::GatewayUnavailable(e.to_string())
    })?;
    let progress = progress.map_err(|e| {
        tracing::error!(subject = %user.subject, error = %e, "Fetching student progress failed");
        LtiError::GatewayUnavailable(e.to_string())
    })?;

    Ok(unlock_sequence(units, &progress))
}

async fn update_progress<S: SessionStore, G: ProgressGateway>(
    State(state): State<AppState<S, G>>,
    user: AuthUser,
    body: Result<Json<ProgressUpdate>, JsonRejection>,
) -> Result<Json<ProgressReceipt>, LtiError> {
    let Json(update) = body.map_err(|e| LtiError::InvalidBody(e.body_text()))?;
    update.validate().map_err(|e| {
        tracing::warn!(subject = %user.user.subject, error = %e, "Progress update rejected");
        LtiError::InvalidBody(e.to_string())
    })?;

    let course_id = user.user.course_context.as_ref().map(|c| c.id.as_str());
    let record = ProgressRecord::new(&user.user.subject, course_id, update);
    let receipt = state.gateway.record_progress(record).await.map_err(|e| {
        tracing::error!(subject = %user.user.subject, error = %e, "Recording progress failed");
        LtiError::GatewayUnavailable(e.to_string())
    })?;

    Ok(Json(receipt))
}
