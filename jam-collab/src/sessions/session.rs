use std::{
    collections::HashSet,
    sync::{Arc, Weak},
};

use chrono::{DateTime, Duration, Utc};
use log::info;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};

use crate::{
    broadcast::{SubscriberId, Subscribers, Subscription},
    CollabError, CollabResult, EventKind, Id, Participant, ParticipantId, PlaybackState,
    QueueItem, Role, SessionEvent, VoteQueue,
};

pub type SessionId = Id<Session>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    /// Joining requires the access code
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum SessionStatus {
    Active,
    Ended {
        reason: EndReason,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The host closed the session
    Closed,
    /// Nobody was active for the whole grace period
    Abandoned,
    /// The last participant left
    Empty,
}

/// Public information about a session. Never includes the access code.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub code: String,
    pub name: String,
    pub privacy: Privacy,
    pub host: Option<ParticipantId>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// The full state of a session at one commit
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session: SessionInfo,
    pub participants: Vec<Participant>,
    pub queue: Vec<QueueItem>,
    pub now_playing: Option<QueueItem>,
    pub playback: PlaybackState,
}

/// A jam session.
///
/// All mutations go through the state lock, which is the single commit path of the session.
#[derive(Debug)]
pub struct Session {
    me: Weak<Session>,

    pub id: SessionId,
    /// Upper-case, unique among active sessions
    pub code: String,
    pub name: String,
    pub privacy: Privacy,
    pub created_at: DateTime<Utc>,
    access_code: Option<String>,

    state: Mutex<SessionState>,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    session_id: SessionId,
    /// Bumped on every committed change
    seq: u64,

    pub status: SessionStatus,
    pub host: Option<ParticipantId>,
    /// Everyone who was host before, so their requests can be told apart as stale
    pub former_hosts: HashSet<ParticipantId>,
    /// In join order, including removed participants until their retention runs out
    pub participants: Vec<Participant>,
    pub queue: VoteQueue,
    pub playback: PlaybackState,
    pub now_playing: Option<QueueItem>,
    /// When the session last ran out of active participants
    pub vacant_since: Option<DateTime<Utc>>,
    pub subscribers: Subscribers,
}

impl Session {
    pub(crate) fn new(
        code: String,
        name: String,
        privacy: Privacy,
        access_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Arc<Self> {
        let id = SessionId::new();

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            id,
            code,
            name,
            privacy,
            created_at: now,
            access_code,
            state: Mutex::new(SessionState {
                session_id: id,
                seq: 0,
                status: SessionStatus::Active,
                host: None,
                former_hosts: Default::default(),
                participants: Default::default(),
                queue: Default::default(),
                playback: Default::default(),
                now_playing: None,
                vacant_since: None,
                subscribers: Default::default(),
            }),
        })
    }

    /// Locks the session state, regardless of whether the session has ended
    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// Locks the session state for a mutation, failing if the session is read-only
    pub(crate) fn lock_active(&self) -> CollabResult<MutexGuard<'_, SessionState>> {
        let state = self.state.lock();

        if !state.is_active() {
            return Err(CollabError::Stale {
                reason: "the session has ended",
            });
        }

        Ok(state)
    }

    /// Checks a supplied access code against a private session. Case sensitive.
    pub(crate) fn check_access(&self, access_code: Option<&str>) -> CollabResult<()> {
        match (self.privacy, &self.access_code) {
            (Privacy::Private, Some(expected)) if access_code != Some(expected.as_str()) => {
                Err(CollabError::AccessDenied)
            }
            _ => Ok(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_active()
    }

    pub fn info(&self) -> SessionInfo {
        self.info_from(&self.state.lock())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_from(&self.state.lock())
    }

    /// Registers a subscriber whose first event is a snapshot of the current commit
    pub(crate) fn subscribe(&self, capacity: usize, now: DateTime<Utc>) -> Subscription {
        let mut state = self.state.lock();

        let snapshot = SessionEvent {
            session_id: self.id,
            seq: state.seq,
            at: now,
            kind: EventKind::SessionSnapshot {
                snapshot: Box::new(self.snapshot_from(&state)),
            },
        };

        let subscription =
            state
                .subscribers
                .register(self.me.clone(), self.id, capacity, snapshot);

        // Nothing more will be committed to an ended session
        if !state.is_active() {
            state.subscribers.unregister(subscription.id());
            subscription.close_after_pending();
        }

        subscription
    }

    pub(crate) fn unsubscribe(&self, id: SubscriberId) {
        self.state.lock().subscribers.unregister(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    pub(crate) fn info_from(&self, state: &SessionState) -> SessionInfo {
        SessionInfo {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            privacy: self.privacy,
            host: state.host,
            is_active: state.is_active(),
            created_at: self.created_at,
        }
    }

    pub(crate) fn snapshot_from(&self, state: &SessionState) -> SessionSnapshot {
        SessionSnapshot {
            session: self.info_from(state),
            participants: state
                .participants
                .iter()
                .filter(|p| !p.is_removed())
                .cloned()
                .collect(),
            queue: state.queue.ordered(),
            now_playing: state.now_playing.clone(),
            playback: state.playback.clone(),
        }
    }
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self.status, SessionStatus::Active)
    }

    /// Publishes a committed change to every subscriber
    pub fn emit(&mut self, kind: EventKind, now: DateTime<Utc>) {
        self.seq += 1;

        let event = SessionEvent {
            session_id: self.session_id,
            seq: self.seq,
            at: now,
            kind,
        };

        self.subscribers.publish(&event);
    }

    /// Returns a participant of this session that has not been removed
    pub fn participant(&self, id: ParticipantId) -> CollabResult<&Participant> {
        self.participants
            .iter()
            .find(|p| p.id == id && !p.is_removed())
            .ok_or_else(|| CollabError::not_found("participant", id))
    }

    pub fn participant_mut(&mut self, id: ParticipantId) -> CollabResult<&mut Participant> {
        self.participants
            .iter_mut()
            .find(|p| p.id == id && !p.is_removed())
            .ok_or_else(|| CollabError::not_found("participant", id))
    }

    /// Finds the participant currently holding a nickname
    pub fn participant_by_nickname(&self, nickname: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.goes_by(nickname))
    }

    /// Checks the requester is the current host, at the time the change is applied
    pub fn authorize_host(&self, requester: ParticipantId, action: &'static str) -> CollabResult<()> {
        if self.host == Some(requester) && self.participant(requester).is_ok() {
            return Ok(());
        }

        if self.former_hosts.contains(&requester) {
            return Err(CollabError::Stale {
                reason: "the requester is no longer the host",
            });
        }

        Err(CollabError::Forbidden { action })
    }

    /// Promotes the candidate if the host is still `expected`.
    ///
    /// Returns false if someone else already changed the host, so each vacancy
    /// leads to at most one promotion.
    pub fn compare_and_swap_host(
        &mut self,
        expected: Option<ParticipantId>,
        candidate: ParticipantId,
        now: DateTime<Utc>,
    ) -> bool {
        if self.host != expected || expected == Some(candidate) {
            return false;
        }

        for participant in self.participants.iter_mut() {
            if Some(participant.id) == expected {
                participant.role = Role::Member;
            }
            if participant.id == candidate {
                participant.role = Role::Host;
            }
        }

        if let Some(previous) = expected {
            self.former_hosts.insert(previous);
        }

        self.host = Some(candidate);

        info!(
            "Host of session {} changed from {:?} to {}",
            self.session_id, expected, candidate
        );

        self.emit(
            EventKind::HostChanged {
                previous: expected,
                host: candidate,
            },
            now,
        );

        true
    }

    /// The earliest joined active participant that isn't already host
    pub fn failover_candidate(&self) -> Option<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| p.is_active() && Some(p.id) != self.host)
            .min_by_key(|p| (p.joined_at, p.id))
            .map(|p| p.id)
    }

    /// Returns true if the host seat is empty or held by someone who isn't active
    pub fn host_is_vacant(&self) -> bool {
        match self.host {
            None => true,
            Some(host) => !self.participant(host).map(|p| p.is_active()).unwrap_or(false),
        }
    }

    /// Hands the host seat to the earliest joined active participant, if the seat is vacant
    pub fn fail_over(&mut self, now: DateTime<Utc>) -> bool {
        if !self.host_is_vacant() {
            return false;
        }

        let expected = self.host;

        self.failover_candidate()
            .map(|candidate| self.compare_and_swap_host(expected, candidate, now))
            .unwrap_or(false)
    }

    /// Clears the host seat when its holder is gone for good
    pub fn release_host(&mut self, id: ParticipantId) {
        if self.host == Some(id) {
            self.host = None;
            self.former_hosts.insert(id);
        }
    }

    pub fn has_active_participant(&self) -> bool {
        self.participants.iter().any(|p| p.is_active())
    }

    pub fn has_present_participant(&self) -> bool {
        self.participants.iter().any(|p| !p.is_removed())
    }

    /// Drops removed participants that have been gone longer than the retention
    pub fn prune_removed(&mut self, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = self.participants.len();
        self.participants.retain(|p| !p.is_expired(now, retention));

        before - self.participants.len()
    }

    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.iter().map(|p| p.id).collect()
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            SessionStatus::Active => None,
            SessionStatus::Ended { at, .. } => Some(at),
        }
    }

    /// Marks the session as ended and closes every subscription after announcing it
    pub fn end(&mut self, reason: EndReason, now: DateTime<Utc>) {
        self.status = SessionStatus::Ended { reason, at: now };
        self.playback.is_playing = false;

        self.emit(EventKind::SessionEnded { reason }, now);
        self.subscribers.close_all();
    }
}
