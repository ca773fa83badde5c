use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    EndReason, Participant, ParticipantId, PlaybackState, Presence, QueueItem, QueueItemId,
    Reaction, SessionId, SessionSnapshot,
};

/// A committed change to a session, in the order it was committed
#[derive(Debug, Clone, Serialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    /// The commit sequence number of the session when the event was produced
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// Events broadcast to the subscribers of a session
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    /// The full state of the session, always the first event of a subscription
    SessionSnapshot { snapshot: Box<SessionSnapshot> },
    ParticipantJoined { participant: Participant },
    ParticipantLeft {
        participant_id: ParticipantId,
        reason: LeaveReason,
    },
    ParticipantPresenceChanged {
        participant_id: ParticipantId,
        presence: Presence,
    },
    HostChanged {
        previous: Option<ParticipantId>,
        host: ParticipantId,
    },
    QueueItemAdded { item: QueueItem },
    QueueItemRemoved {
        item_id: QueueItemId,
        reason: RemovalReason,
    },
    VoteChanged {
        item_id: QueueItemId,
        vote_score: i64,
    },
    PlaybackStateChanged { state: PlaybackState },
    Reaction { reaction: Reaction },
    /// The session is over and read-only from now on
    SessionEnded { reason: EndReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveReason {
    Left,
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// Taken out by its adder or the host
    Removed,
    /// Moved into playback
    Advanced,
}

impl EventKind {
    /// The snake_case name of the event, as used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::SessionSnapshot { .. } => "session_snapshot",
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::ParticipantPresenceChanged { .. } => "participant_presence_changed",
            Self::HostChanged { .. } => "host_changed",
            Self::QueueItemAdded { .. } => "queue_item_added",
            Self::QueueItemRemoved { .. } => "queue_item_removed",
            Self::VoteChanged { .. } => "vote_changed",
            Self::PlaybackStateChanged { .. } => "playback_state_changed",
            Self::Reaction { .. } => "reaction",
            Self::SessionEnded { .. } => "session_ended",
        }
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self, Self::SessionSnapshot { .. })
    }
}
