use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::{
    queues::advance, CollabContext, CollabError, CollabResult, EventKind, ParticipantId,
    QueueItemId, SessionId, SessionState,
};

/// What the session is playing. Only the host changes it, everyone else follows it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub current_queue_item_id: Option<QueueItemId>,
    pub position_ms: u64,
    pub is_playing: bool,
    pub updated_by: Option<ParticipantId>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A playback change requested by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek { position_ms: u64 },
    /// Moves on to the top ranked item in the queue
    Skip,
}

impl PlaybackCommand {
    fn action(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seek { .. } => "seek",
            Self::Skip => "skip",
        }
    }
}

/// Applies host playback changes to the session's playback state
pub struct PlaybackCoordinator {
    context: CollabContext,
}

impl PlaybackCoordinator {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Applies a playback command.
    ///
    /// Whether the requester is host is checked when the command is applied, so a
    /// host replaced by failover in the meantime gets [CollabError::Stale].
    pub fn update(
        &self,
        session_id: SessionId,
        requester: ParticipantId,
        command: PlaybackCommand,
    ) -> CollabResult<PlaybackState> {
        let session = self.context.session(session_id)?;
        let now = self.context.now();
        let mut state = session.lock_active()?;

        if let Err(error) = state.authorize_host(requester, "control playback") {
            if matches!(error, CollabError::Stale { .. }) {
                warn!(
                    "Rejected {} from former host {} in session {}",
                    command.action(),
                    requester,
                    session.code
                );
            }

            return Err(error);
        }

        apply(&mut state, requester, command, now)?;
        debug!("Session {} playback: {}", session.code, command.action());

        Ok(state.playback.clone())
    }

    pub fn state(&self, session_id: SessionId) -> CollabResult<PlaybackState> {
        let session = self.context.session(session_id)?;
        let state = session.lock();

        Ok(state.playback.clone())
    }
}

fn apply(
    state: &mut SessionState,
    requester: ParticipantId,
    command: PlaybackCommand,
    now: DateTime<Utc>,
) -> CollabResult<()> {
    if command == PlaybackCommand::Skip {
        advance(state, requester, now);
        return Ok(());
    }

    let loaded = state.playback.current_queue_item_id.is_some();
    let playback = &mut state.playback;

    match command {
        PlaybackCommand::Play if !loaded => {
            return Err(CollabError::Validation("nothing is loaded to play".into()))
        }
        PlaybackCommand::Seek { .. } if !loaded => {
            return Err(CollabError::Validation("nothing is loaded to seek in".into()))
        }
        PlaybackCommand::Play => playback.is_playing = true,
        PlaybackCommand::Pause => playback.is_playing = false,
        PlaybackCommand::Seek { position_ms } => playback.position_ms = position_ms,
        PlaybackCommand::Skip => {}
    }

    playback.updated_by = Some(requester);
    playback.updated_at = Some(now);

    let new_state = playback.clone();
    state.emit(EventKind::PlaybackStateChanged { state: new_state }, now);

    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::{Collab, Config, NewSession, Privacy};

    use super::*;

    fn session_with_guest() -> (Collab, SessionId, ParticipantId, ParticipantId) {
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
        let guest = collab
            .sessions
            .join_session(&created.session.code, "ola", None)
            .unwrap();

        (collab, created.session.id, created.host.id, guest.id)
    }

    #[test]
    fn host_controls_playback() {
        let (collab, session, host, guest) = session_with_guest();

        collab
            .queue
            .add_track(session, guest, "track:1")
            .unwrap();

        let skipped = collab
            .playback
            .update(session, host, PlaybackCommand::Skip)
            .unwrap();
        assert!(skipped.is_playing);
        assert!(skipped.current_queue_item_id.is_some());

        let seeked = collab
            .playback
            .update(session, host, PlaybackCommand::Seek { position_ms: 30_000 })
            .unwrap();
        assert_eq!(seeked.position_ms, 30_000);

        let paused = collab
            .playback
            .update(session, host, PlaybackCommand::Pause)
            .unwrap();
        assert!(!paused.is_playing);
        assert_eq!(paused.updated_by, Some(host));
        assert_eq!(collab.playback.state(session).unwrap(), paused);
    }

    #[test]
    fn members_are_forbidden() {
        let (collab, session, _, guest) = session_with_guest();

        assert_eq!(
            collab
                .playback
                .update(session, guest, PlaybackCommand::Pause)
                .unwrap_err(),
            CollabError::Forbidden {
                action: "control playback"
            }
        );
    }

    #[test]
    fn cannot_play_or_seek_without_a_track() {
        let (collab, session, host, _) = session_with_guest();

        assert!(matches!(
            collab.playback.update(session, host, PlaybackCommand::Play),
            Err(CollabError::Validation(_))
        ));
        assert!(matches!(
            collab
                .playback
                .update(session, host, PlaybackCommand::Seek { position_ms: 1 }),
            Err(CollabError::Validation(_))
        ));

        // Pausing nothing is harmless
        assert!(collab
            .playback
            .update(session, host, PlaybackCommand::Pause)
            .is_ok());
    }
}
