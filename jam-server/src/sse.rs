use axum::{
    extract::{Path, State},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
    routing::{get, post},
    Json,
};
use futures_util::{Stream, StreamExt};
use jam_collab::{Reaction, SessionEvent, SessionId};
use log::debug;

use crate::{
    context::ServerContext,
    errors::{ServerError, ServerResult},
    requester::Requester,
    schemas::{ReactionSchema, ValidatedJson},
    Router,
};

/// Each event is named after its kind and carries the session sequence number as its id
fn to_server_sent(event: SessionEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event(event.kind.name())
        .id(event.seq.to_string())
        .json_data(&event)
}

/// Streams a snapshot of the session, followed by every change to it
async fn event_stream(
    State(context): State<ServerContext>,
    Path(session_id): Path<SessionId>,
) -> ServerResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let subscription = context.collab.broadcast.subscribe(session_id)?;

    debug!(
        "Subscriber {} connected to session {}",
        subscription.id(),
        session_id
    );

    Ok(Sse::new(subscription.map(to_server_sent)).keep_alive(KeepAlive::default()))
}

async fn send_reaction(
    State(context): State<ServerContext>,
    requester: Requester,
    Path(session_id): Path<SessionId>,
    ValidatedJson(body): ValidatedJson<ReactionSchema>,
) -> ServerResult<Json<Reaction>> {
    let participant = context.collab.sessions.participant(requester.id())?;

    if participant.session_id != session_id {
        return Err(ServerError::Forbidden {
            action: "react in this session",
        });
    }

    let reaction = context
        .collab
        .broadcast
        .send_reaction(requester.id(), &body.emoji)?;

    Ok(Json(reaction))
}

pub fn router() -> Router {
    Router::new()
        .route("/sessions/:id/events", get(event_stream))
        .route("/sessions/:id/reactions", post(send_reaction))
}

#[cfg(test)]
mod tests {
    use jam_collab::{Collab, Config, NewSession, Privacy};

    use super::*;

    #[tokio::test]
    async fn names_events_by_kind() {
        let collab = Collab::new(Config::default());
        let created = collab
            .sessions
            .create_session(NewSession {
                name: "Jam".into(),
                host_nickname: "kat".into(),
                privacy: Privacy::Public,
                access_code: None,
            })
            .unwrap();

        let mut subscription = collab.broadcast.subscribe(created.session.id).unwrap();
        let snapshot = subscription.next().await.unwrap();

        assert_eq!(snapshot.kind.name(), "session_snapshot");
        assert!(to_server_sent(snapshot).is_ok());
    }
}
