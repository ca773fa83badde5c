mod participant;
mod session;

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use log::{debug, info};

pub use participant::*;
pub use session::*;

pub(crate) use session::SessionState;

use crate::{
    util::{normalize_code, trimmed_within},
    CollabContext, CollabError, CollabResult, Config, EventKind, LeaveReason,
};

/// The details needed to start a session
#[derive(Debug, Clone)]
pub struct NewSession {
    pub name: String,
    pub host_nickname: String,
    pub privacy: Privacy,
    pub access_code: Option<String>,
}

/// A freshly created session, along with its host
#[derive(Debug, Clone)]
pub struct CreatedSession {
    pub session: SessionInfo,
    pub host: Participant,
}

/// Creates, looks up, joins, and ends sessions
pub struct SessionRegistry {
    context: CollabContext,
}

impl SessionRegistry {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Starts a session, with its creator as the host
    pub fn create_session(&self, new_session: NewSession) -> CollabResult<CreatedSession> {
        let name = trimmed_within(&new_session.name, 1, 64).ok_or_else(|| {
            CollabError::Validation("session name must be between 1 and 64 characters".into())
        })?;
        let nickname = validate_nickname(&new_session.host_nickname)?;
        let access_code = validate_access_code(new_session.privacy, new_session.access_code)?;

        let now = self.context.now();
        let code = self.reserve_code()?;
        let session = Session::new(code.clone(), name, new_session.privacy, access_code, now);

        let host = Participant::new(session.id, nickname, Role::Host, Presence::Active, now);

        {
            let mut state = session.lock();
            state.host = Some(host.id);
            state.participants.push(host.clone());
        }

        // The code was reserved before the session existed
        self.context.active_codes.insert(code, session.id);
        self.context.participants.insert(host.id, session.id);
        self.context.sessions.insert(session.id, session.clone());

        info!(
            "Session {} ({}) created by {}",
            session.name, session.code, host.nickname
        );

        Ok(CreatedSession {
            session: session.info(),
            host,
        })
    }

    /// Joins a session by its code.
    ///
    /// Joining with the nickname of an inactive participant resumes that participant.
    pub fn join_session(
        &self,
        code: &str,
        nickname: &str,
        access_code: Option<&str>,
    ) -> CollabResult<Participant> {
        let session = self.context.session_by_code(code)?;
        let nickname = validate_nickname(nickname)?;

        session.check_access(access_code)?;

        let now = self.context.now();
        let mut state = session
            .lock_active()
            .map_err(|_| CollabError::not_found("session", code))?;

        let holder = state
            .participant_by_nickname(&nickname)
            .map(|p| (p.id, p.presence));

        if let Some((id, presence)) = holder {
            if presence != Presence::Inactive {
                return Err(CollabError::NicknameTaken(nickname));
            }

            let participant = state.participant_mut(id)?;
            let presence = participant.beat(now);
            let resumed = participant.clone();

            if let Some(presence) = presence {
                state.emit(
                    EventKind::ParticipantPresenceChanged {
                        participant_id: id,
                        presence,
                    },
                    now,
                );
            }

            state.vacant_since = None;
            state.fail_over(now);

            info!("{} resumed their place in session {}", resumed.nickname, session.code);
            return Ok(resumed);
        }

        let participant = Participant::new(session.id, nickname, Role::Member, Presence::Joining, now);

        state.participants.push(participant.clone());
        self.context.participants.insert(participant.id, session.id);

        state.emit(
            EventKind::ParticipantJoined {
                participant: participant.clone(),
            },
            now,
        );

        info!("{} joined session {}", participant.nickname, session.code);

        Ok(participant)
    }

    /// Removes a participant from their session.
    ///
    /// A leaving host is replaced right away, and the session ends once nobody is left.
    pub fn leave_session(&self, participant_id: ParticipantId) -> CollabResult<()> {
        let session = self.context.session_of(participant_id)?;
        let now = self.context.now();
        let mut state = session.lock_active()?;

        let participant = state.participant_mut(participant_id)?;
        participant.mark_removed(now);
        let nickname = participant.nickname.clone();

        self.context.forget_participant(participant_id);

        state.emit(
            EventKind::ParticipantLeft {
                participant_id,
                reason: LeaveReason::Left,
            },
            now,
        );

        info!("{} left session {}", nickname, session.code);

        if state.host == Some(participant_id) {
            state.release_host(participant_id);
            state.fail_over(now);
        }

        if !state.has_present_participant() {
            self.context.end_session(&session, &mut state, EndReason::Empty);
        }

        Ok(())
    }

    /// Ends a session. Only the current host may do this.
    pub fn close_session(&self, session_id: SessionId, requester: ParticipantId) -> CollabResult<()> {
        let session = self.context.session(session_id)?;
        let mut state = session.lock_active()?;

        state.authorize_host(requester, "close the session")?;
        self.context.end_session(&session, &mut state, EndReason::Closed);

        Ok(())
    }

    /// Looks up an active session by its code, case insensitive
    pub fn lookup(&self, code: &str) -> CollabResult<SessionInfo> {
        self.context.session_by_code(code).map(|s| s.info())
    }

    pub fn session(&self, session_id: SessionId) -> CollabResult<Arc<Session>> {
        self.context.session(session_id)
    }

    pub fn snapshot(&self, session_id: SessionId) -> CollabResult<SessionSnapshot> {
        self.context.session(session_id).map(|s| s.snapshot())
    }

    /// Returns a participant by id, as long as it hasn't been removed
    pub fn participant(&self, participant_id: ParticipantId) -> CollabResult<Participant> {
        let session = self.context.session_of(participant_id)?;
        let state = session.lock();

        state.participant(participant_id).cloned()
    }

    /// Finds a code no active session is using, and claims it
    fn reserve_code(&self) -> CollabResult<String> {
        let attempts = self.context.config.max_code_attempts;

        for attempt in 1..=attempts {
            let candidate = self.context.code_generator.generate(Config::CODE_LENGTH);
            let code = normalize_code(&candidate)?;

            match self.context.active_codes.entry(code.clone()) {
                Entry::Vacant(entry) => {
                    // Held by a placeholder id until the session is stored
                    entry.insert(SessionId::from_value(0));
                    return Ok(code);
                }
                Entry::Occupied(_) => {
                    debug!("Session code {} collided on attempt {}", code, attempt);
                }
            }
        }

        Err(CollabError::CodeExhausted { attempts })
    }
}

fn validate_access_code(privacy: Privacy, access_code: Option<String>) -> CollabResult<Option<String>> {
    match (privacy, access_code) {
        (Privacy::Public, None) => Ok(None),
        (Privacy::Public, Some(_)) => Err(CollabError::Validation(
            "a public session can't have an access code".into(),
        )),
        (Privacy::Private, None) => Err(CollabError::Validation(
            "a private session needs an access code".into(),
        )),
        (Privacy::Private, Some(code)) => {
            let length = code.chars().count();

            if !(1..=32).contains(&length) {
                return Err(CollabError::Validation(
                    "access code must be between 1 and 32 characters".into(),
                ));
            }

            Ok(Some(code))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::{Collab, CollabContext, CodeGenerator, Config};

    use super::*;

    struct FixedCodes(&'static str);

    impl CodeGenerator for FixedCodes {
        fn generate(&self, _length: usize) -> String {
            self.0.to_string()
        }
    }

    fn collab_with_code(code: &'static str) -> Collab {
        Collab::with_context(
            CollabContext::new(Config::default()).with_code_generator(Arc::new(FixedCodes(code))),
        )
    }

    fn public(name: &str, host: &str) -> NewSession {
        NewSession {
            name: name.to_string(),
            host_nickname: host.to_string(),
            privacy: Privacy::Public,
            access_code: None,
        }
    }

    fn private(name: &str, host: &str, access_code: &str) -> NewSession {
        NewSession {
            privacy: Privacy::Private,
            access_code: Some(access_code.to_string()),
            ..public(name, host)
        }
    }

    #[test]
    fn creator_becomes_active_host() {
        let collab = Collab::new(Config::default());
        let created = collab.sessions.create_session(public("Friday Jam", "kat")).unwrap();

        assert_eq!(created.session.code.len(), 6);
        assert_eq!(created.session.host, Some(created.host.id));
        assert!(created.session.is_active);
        assert_eq!(created.host.role, Role::Host);
        assert_eq!(created.host.presence, Presence::Active);
    }

    #[test]
    fn joins_with_any_case() {
        let collab = collab_with_code("7QK2M1");
        let created = collab.sessions.create_session(public("Friday Jam", "kat")).unwrap();
        assert_eq!(created.session.code, "7QK2M1");

        let guest = collab.sessions.join_session("7qk2m1", "ola", None).unwrap();

        assert_eq!(guest.session_id, created.session.id);
        assert_eq!(guest.role, Role::Member);
        assert_eq!(guest.presence, Presence::Joining);
    }

    #[test]
    fn gives_up_when_codes_keep_colliding() {
        let collab = collab_with_code("AAAAAA");
        collab.sessions.create_session(public("First", "kat")).unwrap();

        let result = collab.sessions.create_session(public("Second", "ola"));

        assert_eq!(
            result.unwrap_err(),
            CollabError::CodeExhausted {
                attempts: Config::default().max_code_attempts
            }
        );
    }

    #[test]
    fn private_sessions_check_access_code_case_sensitively() {
        let collab = collab_with_code("PR1VAT");
        collab
            .sessions
            .create_session(private("Secret", "kat", "Hunter2"))
            .unwrap();

        assert_eq!(
            collab.sessions.join_session("PR1VAT", "ola", None).unwrap_err(),
            CollabError::AccessDenied
        );
        assert_eq!(
            collab
                .sessions
                .join_session("PR1VAT", "ola", Some("hunter2"))
                .unwrap_err(),
            CollabError::AccessDenied
        );
        assert!(collab
            .sessions
            .join_session("PR1VAT", "ola", Some("Hunter2"))
            .is_ok());
    }

    #[test]
    fn rejects_inconsistent_privacy() {
        let collab = Collab::new(Config::default());

        let public_with_code = NewSession {
            access_code: Some("x".into()),
            ..public("Jam", "kat")
        };
        let private_without_code = NewSession {
            privacy: Privacy::Private,
            ..public("Jam", "kat")
        };

        assert!(matches!(
            collab.sessions.create_session(public_with_code),
            Err(CollabError::Validation(_))
        ));
        assert!(matches!(
            collab.sessions.create_session(private_without_code),
            Err(CollabError::Validation(_))
        ));
    }

    #[test]
    fn unknown_and_malformed_codes() {
        let collab = Collab::new(Config::default());

        assert!(matches!(
            collab.sessions.join_session("ZZZZZZ", "kat", None),
            Err(CollabError::NotFound { .. })
        ));
        assert!(matches!(
            collab.sessions.join_session("nope", "kat", None),
            Err(CollabError::Validation(_))
        ));
    }

    #[test]
    fn nicknames_are_unique_per_session() {
        let collab = collab_with_code("NICK01");
        collab.sessions.create_session(public("Jam", "Kat")).unwrap();

        assert_eq!(
            collab.sessions.join_session("NICK01", " kat ", None).unwrap_err(),
            CollabError::NicknameTaken("kat".into())
        );
    }

    #[test]
    fn leaving_host_hands_over_and_last_leaver_ends_session() {
        let collab = collab_with_code("LEAVE1");
        let created = collab.sessions.create_session(public("Jam", "kat")).unwrap();
        let guest = collab.sessions.join_session("LEAVE1", "ola", None).unwrap();
        collab.presence.heartbeat(guest.id).unwrap();

        collab.sessions.leave_session(created.host.id).unwrap();

        let info = collab.sessions.lookup("LEAVE1").unwrap();
        assert_eq!(info.host, Some(guest.id));

        // The old host is gone, and their nickname is free again
        assert!(collab.sessions.participant(created.host.id).is_err());

        collab.sessions.leave_session(guest.id).unwrap();

        let session = collab.sessions.session(created.session.id).unwrap();
        assert!(!session.is_active());
        assert!(matches!(
            collab.sessions.lookup("LEAVE1"),
            Err(CollabError::NotFound { .. })
        ));
    }

    #[test]
    fn only_the_host_closes_a_session() {
        let collab = collab_with_code("CLOSE1");
        let created = collab.sessions.create_session(public("Jam", "kat")).unwrap();
        let guest = collab.sessions.join_session("CLOSE1", "ola", None).unwrap();

        assert!(matches!(
            collab.sessions.close_session(created.session.id, guest.id),
            Err(CollabError::Forbidden { .. })
        ));

        collab
            .sessions
            .close_session(created.session.id, created.host.id)
            .unwrap();

        // Read-only afterwards, and the code can be used again
        assert!(matches!(
            collab.sessions.leave_session(guest.id),
            Err(CollabError::Stale { .. })
        ));
        assert!(collab.sessions.snapshot(created.session.id).is_ok());
        assert!(collab.sessions.create_session(public("Again", "kat")).is_ok());
    }
}
