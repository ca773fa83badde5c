use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json,
};
use jam_collab::{PlaybackState, QueueItem, QueueItemId, SessionId, VoteOutcome};
use log::debug;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    requester::Requester,
    schemas::{AddTrackSchema, ValidatedJson, VoteSchema},
    Router,
};

async fn list(
    State(context): State<ServerContext>,
    Path(session_id): Path<SessionId>,
) -> ServerResult<Json<Vec<QueueItem>>> {
    let items = context.collab.queue.list(session_id)?;

    Ok(Json(items))
}

async fn add_track(
    State(context): State<ServerContext>,
    requester: Requester,
    Path(session_id): Path<SessionId>,
    ValidatedJson(body): ValidatedJson<AddTrackSchema>,
) -> ServerResult<Json<QueueItem>> {
    let item = context
        .collab
        .queue
        .add_track(session_id, requester.id(), &body.track_ref)?;

    Ok(Json(item))
}

async fn vote(
    State(context): State<ServerContext>,
    requester: Requester,
    Path(item_id): Path<QueueItemId>,
    ValidatedJson(body): ValidatedJson<VoteSchema>,
) -> ServerResult<Json<VoteOutcome>> {
    let outcome = context
        .collab
        .queue
        .vote(requester.id(), item_id, body.direction)?;

    debug!(
        "{} voted {:?} on {}, score is now {}",
        requester.id(),
        body.direction,
        item_id,
        outcome.vote_score
    );

    Ok(Json(outcome))
}

async fn remove_track(
    State(context): State<ServerContext>,
    requester: Requester,
    Path(item_id): Path<QueueItemId>,
) -> ServerResult<Json<QueueItem>> {
    let item = context.collab.queue.remove_item(item_id, requester.id())?;

    Ok(Json(item))
}

async fn advance(
    State(context): State<ServerContext>,
    requester: Requester,
    Path(session_id): Path<SessionId>,
) -> ServerResult<Json<PlaybackState>> {
    let playback = context
        .collab
        .queue
        .advance_queue(session_id, requester.id())?;

    Ok(Json(playback))
}

pub fn router() -> Router {
    Router::new()
        .route("/sessions/:id/queue", get(list).post(add_track))
        .route("/sessions/:id/advance", post(advance))
        .route("/queue/:item_id", delete(remove_track))
        .route("/queue/:item_id/votes", post(vote))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{http::StatusCode, response::IntoResponse};
    use jam_collab::{Collab, Config, NewSession, Privacy, VoteDirection};

    use super::*;

    #[tokio::test]
    async fn votes_and_removals_go_through_the_requester() {
        let collab = Arc::new(Collab::new(Config::default()));
        let context = ServerContext::new(collab.clone());

        let created = collab
            .sessions
            .create_session(NewSession {
                name: "Jam".into(),
                host_nickname: "kat".into(),
                privacy: Privacy::Public,
                access_code: None,
            })
            .unwrap();
        let guest = collab
            .sessions
            .join_session(&created.session.code, "ola", None)
            .unwrap();
        let session = created.session.id;

        let Json(item) = add_track(
            State(context.clone()),
            Requester(created.host.id),
            Path(session),
            ValidatedJson(AddTrackSchema {
                track_ref: "spotify:track:4uLU6hMCjMI75M1A2tKUQC".into(),
            }),
        )
        .await
        .unwrap();

        let Json(outcome) = vote(
            State(context.clone()),
            Requester(guest.id),
            Path(item.id),
            ValidatedJson(VoteSchema {
                direction: VoteDirection::Up,
            }),
        )
        .await
        .unwrap();
        assert_eq!(outcome.vote_score, 1);

        let forbidden = remove_track(State(context.clone()), Requester(guest.id), Path(item.id))
            .await
            .into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let Json(playback) = advance(
            State(context.clone()),
            Requester(created.host.id),
            Path(session),
        )
        .await
        .unwrap();
        assert_eq!(playback.current_queue_item_id, Some(item.id));

        let Json(items) = list(State(context), Path(session)).await.unwrap();
        assert!(items.is_empty());
    }
}
