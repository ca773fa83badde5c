mod vote_queue;

use chrono::{DateTime, Utc};
use log::{debug, info};

pub use vote_queue::*;

use crate::{
    CollabContext, CollabError, CollabResult, EventKind, ParticipantId, PlaybackState,
    RemovalReason, SessionId, SessionState,
};

/// Adds, votes on, removes, and advances the items of session queues
pub struct QueueEngine {
    context: CollabContext,
}

impl QueueEngine {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Appends a track to the session queue. Adding a track does not vote for it.
    pub fn add_track(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        track_ref: &str,
    ) -> CollabResult<QueueItem> {
        let track_ref = TrackRef::parse(track_ref)?;
        let session = self.context.session(session_id)?;

        self.check_membership(session_id, participant_id, "add tracks to this session")?;

        let now = self.context.now();
        let mut state = session.lock_active()?;
        state.participant(participant_id)?;

        let limit = self.context.config.max_queue_len;
        if state.queue.len() >= limit {
            return Err(CollabError::Validation(format!(
                "the queue is full, it holds at most {limit} tracks"
            )));
        }

        let item = state.queue.push(session_id, participant_id, track_ref, now);

        state.emit(EventKind::QueueItemAdded { item: item.clone() }, now);
        debug!(
            "Queued {} in session {} by {}",
            item.track_ref.as_str(),
            session.code,
            participant_id
        );

        Ok(item)
    }

    /// Casts, flips, or retracts the participant's ballot on an item
    pub fn vote(
        &self,
        participant_id: ParticipantId,
        item_id: QueueItemId,
        direction: VoteDirection,
    ) -> CollabResult<VoteOutcome> {
        let session = self.context.session_of(participant_id)?;
        let now = self.context.now();
        let mut state = session.lock_active()?;
        state.participant(participant_id)?;

        let outcome = state.queue.vote(participant_id, item_id, direction)?;

        state.emit(
            EventKind::VoteChanged {
                item_id,
                vote_score: outcome.vote_score,
            },
            now,
        );

        Ok(outcome)
    }

    /// Removes an item. Only the host or whoever added it may do this.
    pub fn remove_item(&self, item_id: QueueItemId, requester: ParticipantId) -> CollabResult<QueueItem> {
        let session = self.context.session_of(requester)?;
        let now = self.context.now();
        let mut state = session.lock_active()?;
        state.participant(requester)?;

        let added_by = state
            .queue
            .get(item_id)
            .map(|i| i.added_by)
            .ok_or_else(|| CollabError::not_found("queue item", item_id))?;

        if added_by != requester {
            state.authorize_host(requester, "remove this queue item")?;
        }

        let item = state
            .queue
            .remove(item_id)
            .ok_or_else(|| CollabError::not_found("queue item", item_id))?;

        state.emit(
            EventKind::QueueItemRemoved {
                item_id,
                reason: RemovalReason::Removed,
            },
            now,
        );

        Ok(item)
    }

    /// Moves the top ranked item into playback. Host only.
    pub fn advance_queue(
        &self,
        session_id: SessionId,
        requester: ParticipantId,
    ) -> CollabResult<PlaybackState> {
        let session = self.context.session(session_id)?;
        let now = self.context.now();
        let mut state = session.lock_active()?;

        state.authorize_host(requester, "advance the queue")?;

        Ok(advance(&mut state, requester, now))
    }

    /// The pending items in their visible order
    pub fn list(&self, session_id: SessionId) -> CollabResult<Vec<QueueItem>> {
        let session = self.context.session(session_id)?;
        let state = session.lock();

        Ok(state.queue.ordered())
    }

    fn check_membership(
        &self,
        session_id: SessionId,
        participant_id: ParticipantId,
        action: &'static str,
    ) -> CollabResult<()> {
        let owner = self.context.session_of(participant_id)?;

        if owner.id != session_id {
            return Err(CollabError::Forbidden { action });
        }

        Ok(())
    }
}

/// Pops the top ranked item and starts playing it from the beginning.
/// With an empty queue, playback is cleared and stopped.
pub(crate) fn advance(
    state: &mut SessionState,
    requester: ParticipantId,
    now: DateTime<Utc>,
) -> PlaybackState {
    let next = state.queue.pop_top();

    if let Some(item) = &next {
        state.emit(
            EventKind::QueueItemRemoved {
                item_id: item.id,
                reason: RemovalReason::Advanced,
            },
            now,
        );

        info!("Now playing {} ({})", item.track_ref.as_str(), item.id);
    }

    state.playback = PlaybackState {
        current_queue_item_id: next.as_ref().map(|i| i.id),
        position_ms: 0,
        is_playing: next.is_some(),
        updated_by: Some(requester),
        updated_at: Some(now),
    };
    state.now_playing = next;

    let playback = state.playback.clone();
    state.emit(
        EventKind::PlaybackStateChanged {
            state: playback.clone(),
        },
        now,
    );

    playback
}
