use axum::{
    extract::{Path, State},
    routing::get,
    Json,
};
use jam_collab::{PlaybackState, SessionId};

use crate::{
    context::ServerContext,
    errors::ServerResult,
    requester::Requester,
    schemas::PlaybackActionSchema,
    Router,
};

async fn state(
    State(context): State<ServerContext>,
    Path(session_id): Path<SessionId>,
) -> ServerResult<Json<PlaybackState>> {
    let state = context.collab.playback.state(session_id)?;

    Ok(Json(state))
}

async fn update(
    State(context): State<ServerContext>,
    requester: Requester,
    Path(session_id): Path<SessionId>,
    Json(body): Json<PlaybackActionSchema>,
) -> ServerResult<Json<PlaybackState>> {
    let state = context
        .collab
        .playback
        .update(session_id, requester.id(), body.into())?;

    Ok(Json(state))
}

pub fn router() -> Router {
    Router::new().route("/sessions/:id/playback", get(state).post(update))
}
