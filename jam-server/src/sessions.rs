use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json,
};
use jam_collab::{NewSession, Participant, SessionId, SessionInfo, SessionSnapshot};
use serde::Serialize;

use crate::{
    context::ServerContext,
    errors::ServerResult,
    requester::Requester,
    schemas::{JoinSessionSchema, NewSessionSchema, ValidatedJson},
    Router,
};

/// Returned to whoever creates or joins a session. The participant id identifies them from now on.
#[derive(Debug, Serialize)]
pub struct Membership {
    pub session: SessionInfo,
    pub participant: Participant,
}

async fn create_session(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewSessionSchema>,
) -> ServerResult<Json<Membership>> {
    let created = context.collab.sessions.create_session(NewSession {
        name: body.name,
        host_nickname: body.nickname,
        privacy: body.privacy,
        access_code: body.access_code,
    })?;

    Ok(Json(Membership {
        session: created.session,
        participant: created.host,
    }))
}

async fn lookup(
    State(context): State<ServerContext>,
    Path(code): Path<String>,
) -> ServerResult<Json<SessionInfo>> {
    let info = context.collab.sessions.lookup(&code)?;

    Ok(Json(info))
}

async fn join_session(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<JoinSessionSchema>,
) -> ServerResult<Json<Membership>> {
    let sessions = &context.collab.sessions;

    let participant =
        sessions.join_session(&body.code, &body.nickname, body.access_code.as_deref())?;
    let session = sessions.session(participant.session_id)?.info();

    Ok(Json(Membership {
        session,
        participant,
    }))
}

async fn snapshot(
    State(context): State<ServerContext>,
    Path(session_id): Path<SessionId>,
) -> ServerResult<Json<SessionSnapshot>> {
    let snapshot = context.collab.sessions.snapshot(session_id)?;

    Ok(Json(snapshot))
}

async fn close_session(
    State(context): State<ServerContext>,
    requester: Requester,
    Path(session_id): Path<SessionId>,
) -> ServerResult<()> {
    context
        .collab
        .sessions
        .close_session(session_id, requester.id())?;

    Ok(())
}

pub fn router() -> Router {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/join", post(join_session))
        .route("/sessions/code/:code", get(lookup))
        .route("/sessions/:id", get(snapshot).delete(close_session))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{http::StatusCode, response::IntoResponse};
    use jam_collab::{Collab, Config, Privacy, Role};

    use super::*;

    fn context() -> ServerContext {
        ServerContext::new(Arc::new(Collab::new(Config::default())))
    }

    #[tokio::test]
    async fn create_then_join_by_code() {
        let context = context();

        let Json(created) = create_session(
            State(context.clone()),
            ValidatedJson(NewSessionSchema {
                name: "Friday Jam".into(),
                nickname: "kat".into(),
                privacy: Privacy::Public,
                access_code: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(created.participant.role, Role::Host);

        let Json(joined) = join_session(
            State(context.clone()),
            ValidatedJson(JoinSessionSchema {
                code: created.session.code.to_lowercase(),
                nickname: "ola".into(),
                access_code: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(joined.session.id, created.session.id);
        assert_eq!(joined.participant.role, Role::Member);

        let Json(current) = snapshot(State(context), Path(created.session.id))
            .await
            .unwrap();
        assert_eq!(current.participants.len(), 2);
    }

    #[tokio::test]
    async fn unknown_codes_are_not_found() {
        let response = lookup(State(context()), Path("ZZZZZZ".into()))
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
