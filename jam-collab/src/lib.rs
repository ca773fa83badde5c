mod broadcast;
mod clock;
mod config;
mod error;
mod events;
mod playback;
mod presence;
mod queues;
mod sessions;
mod util;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, info};

pub use broadcast::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use events::*;
pub use playback::*;
pub use presence::*;
pub use queues::*;
pub use sessions::*;
pub use util::{normalize_code, CodeGenerator, Id, RandomCodes};

use sessions::SessionState;

// Reduces verbosity
type Store<Id, T> = Arc<DashMap<Id, Arc<T>>>;

/// The jam session system: membership, presence, queueing, playback authority, and broadcasting.
pub struct Collab {
    pub sessions: SessionRegistry,
    pub presence: PresenceTracker,
    pub queue: QueueEngine,
    pub playback: PlaybackCoordinator,
    pub broadcast: BroadcastChannel,

    context: CollabContext,
}

/// A type passed to the components of the collab system, to access shared state and indexes.
#[derive(Clone)]
pub struct CollabContext {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub code_generator: Arc<dyn CodeGenerator>,

    /// Every session, including ended ones which are kept read-only until evicted
    pub sessions: Store<SessionId, Session>,
    /// Codes of active sessions
    active_codes: Arc<DashMap<String, SessionId>>,
    /// Which session a participant belongs to, for participants that haven't been removed
    participants: Arc<DashMap<ParticipantId, SessionId>>,
}

impl Collab {
    pub fn new(config: Config) -> Self {
        Self::with_context(CollabContext::new(config))
    }

    pub fn with_context(context: CollabContext) -> Self {
        Self {
            sessions: SessionRegistry::new(&context),
            presence: PresenceTracker::new(&context),
            queue: QueueEngine::new(&context),
            playback: PlaybackCoordinator::new(&context),
            broadcast: BroadcastChannel::new(&context),
            context,
        }
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }
}

impl CollabContext {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            code_generator: Arc::new(RandomCodes),
            sessions: Default::default(),
            active_codes: Default::default(),
            participants: Default::default(),
        }
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        Self { clock, ..self }
    }

    pub fn with_code_generator(self, code_generator: Arc<dyn CodeGenerator>) -> Self {
        Self {
            code_generator,
            ..self
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn session(&self, session_id: SessionId) -> CollabResult<Arc<Session>> {
        self.sessions
            .get(&session_id)
            .map(|s| s.value().clone())
            .ok_or_else(|| CollabError::not_found("session", session_id))
    }

    /// Returns the active session using the code, case insensitive
    pub fn session_by_code(&self, code: &str) -> CollabResult<Arc<Session>> {
        let code = normalize_code(code)?;

        let session_id = self
            .active_codes
            .get(&code)
            .map(|s| *s.value())
            .ok_or_else(|| CollabError::not_found("session", &code))?;

        self.session(session_id)
            .map_err(|_| CollabError::not_found("session", &code))
    }

    /// Returns the session a participant belongs to
    pub fn session_of(&self, participant_id: ParticipantId) -> CollabResult<Arc<Session>> {
        let session_id = self
            .participants
            .get(&participant_id)
            .map(|s| *s.value())
            .ok_or_else(|| CollabError::not_found("participant", participant_id))?;

        self.session(session_id)
    }

    /// Removes a participant from the lookup index once it's gone for good
    pub(crate) fn forget_participant(&self, participant_id: ParticipantId) {
        self.participants.remove(&participant_id);
    }

    /// Drops an ended session and whatever still points to it.
    /// Returns false if it was already gone.
    pub(crate) fn evict_session(&self, session_id: SessionId, participants: &[ParticipantId]) -> bool {
        if self.sessions.remove(&session_id).is_none() {
            return false;
        }

        for participant_id in participants {
            self.participants
                .remove_if(participant_id, |_, id| *id == session_id);
        }

        debug!("Evicted ended session {}", session_id);
        true
    }

    /// Ends the session and frees up its code.
    /// The caller must hold the session's state lock.
    pub(crate) fn end_session(&self, session: &Session, state: &mut SessionState, reason: EndReason) {
        let now = self.now();

        state.end(reason, now);
        self.active_codes
            .remove_if(&session.code, |_, id| *id == session.id);

        info!(
            "Session {} ({}) ended: {:?}",
            session.name, session.code, reason
        );
    }
}
