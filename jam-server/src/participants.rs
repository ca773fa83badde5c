use axum::{extract::State, routing::post, Json};
use jam_collab::Presence;
use serde::Serialize;

use crate::{context::ServerContext, errors::ServerResult, requester::Requester, Router};

#[derive(Debug, Serialize)]
pub struct HeartbeatResponse {
    pub presence: Presence,
}

async fn heartbeat(
    State(context): State<ServerContext>,
    requester: Requester,
) -> ServerResult<Json<HeartbeatResponse>> {
    let presence = context.collab.presence.heartbeat(requester.id())?;

    Ok(Json(HeartbeatResponse { presence }))
}

async fn leave(State(context): State<ServerContext>, requester: Requester) -> ServerResult<()> {
    context.collab.sessions.leave_session(requester.id())?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/participants/heartbeat", post(heartbeat))
        .route("/participants/leave", post(leave))
}
