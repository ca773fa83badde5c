use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{util::trimmed_within, CollabError, CollabResult, Id, ParticipantId, SessionId};

pub type QueueItemId = Id<QueueItem>;

/// A track requested by a participant, waiting to be played
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub session_id: SessionId,
    pub track_ref: TrackRef,
    pub added_by: ParticipantId,
    pub vote_score: i64,
    /// Monotonic per session, the tie breaker between equal scores
    pub inserted_at: u64,
    pub added_at: DateTime<Utc>,
}

/// An opaque reference to a track, resolved by the catalog provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackRef(String);

impl TrackRef {
    pub fn parse(input: &str) -> CollabResult<Self> {
        trimmed_within(input, 1, 512).map(Self).ok_or_else(|| {
            CollabError::Validation("track reference must be between 1 and 512 characters".into())
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteDirection {
    Up,
    Down,
}

impl VoteDirection {
    pub fn unit(&self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteDirection {
    type Error = CollabError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Up),
            -1 => Ok(Self::Down),
            other => Err(CollabError::Validation(format!(
                "vote must be +1 or -1, got {other}"
            ))),
        }
    }
}

/// The result of applying a vote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub item_id: QueueItemId,
    /// The participant's ballot before this vote
    pub previous: Option<VoteDirection>,
    /// The participant's ballot after this vote, [None] if it was retracted
    pub current: Option<VoteDirection>,
    pub vote_score: i64,
}

/// The ordering of a queue: score descending, then insertion, then id.
pub fn rank(a: &QueueItem, b: &QueueItem) -> Ordering {
    b.vote_score
        .cmp(&a.vote_score)
        .then(a.inserted_at.cmp(&b.inserted_at))
        .then(a.id.cmp(&b.id))
}

/// A queue ordered by votes.
///
/// Items carry no position. The visible order is computed from [rank] on every read.
#[derive(Debug, Default)]
pub struct VoteQueue {
    items: HashMap<QueueItemId, QueueItem>,
    /// At most one ballot per participant and item
    ballots: HashMap<(ParticipantId, QueueItemId), VoteDirection>,
    next_insertion: u64,
}

impl VoteQueue {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: QueueItemId) -> Option<&QueueItem> {
        self.items.get(&id)
    }

    /// Adds a track with a score of zero
    pub fn push(
        &mut self,
        session_id: SessionId,
        added_by: ParticipantId,
        track_ref: TrackRef,
        now: DateTime<Utc>,
    ) -> QueueItem {
        self.next_insertion += 1;

        let item = QueueItem {
            id: QueueItemId::new(),
            session_id,
            track_ref,
            added_by,
            vote_score: 0,
            inserted_at: self.next_insertion,
            added_at: now,
        };

        self.items.insert(item.id, item.clone());
        item
    }

    /// Applies a ballot for the participant.
    ///
    /// Voting the same direction twice retracts the ballot, and voting the
    /// opposite direction flips it. Only the delta is applied to the score.
    pub fn vote(
        &mut self,
        participant: ParticipantId,
        item_id: QueueItemId,
        direction: VoteDirection,
    ) -> CollabResult<VoteOutcome> {
        let item = self
            .items
            .get_mut(&item_id)
            .ok_or_else(|| CollabError::not_found("queue item", item_id))?;

        let key = (participant, item_id);
        let previous = self.ballots.get(&key).copied();

        let (current, delta) = match previous {
            None => (Some(direction), direction.unit()),
            Some(p) if p == direction => (None, -direction.unit()),
            Some(_) => (Some(direction), 2 * direction.unit()),
        };

        match current {
            Some(d) => self.ballots.insert(key, d),
            None => self.ballots.remove(&key),
        };

        item.vote_score += delta;

        Ok(VoteOutcome {
            item_id,
            previous,
            current,
            vote_score: item.vote_score,
        })
    }

    /// Returns the participant's current ballot on an item
    pub fn ballot(&self, participant: ParticipantId, item_id: QueueItemId) -> Option<VoteDirection> {
        self.ballots.get(&(participant, item_id)).copied()
    }

    /// Removes an item and every ballot cast on it
    pub fn remove(&mut self, item_id: QueueItemId) -> Option<QueueItem> {
        let item = self.items.remove(&item_id)?;
        self.ballots.retain(|(_, id), _| *id != item_id);

        Some(item)
    }

    /// Removes and returns the top ranked item
    pub fn pop_top(&mut self) -> Option<QueueItem> {
        let top = self.items.values().min_by(|a, b| rank(a, b))?.id;
        self.remove(top)
    }

    /// The items in their visible order
    pub fn ordered(&self) -> Vec<QueueItem> {
        let mut items: Vec<_> = self.items.values().cloned().collect();
        items.sort_by(rank);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str) -> TrackRef {
        TrackRef::parse(name).unwrap()
    }

    fn queue_with(names: &[&str]) -> (VoteQueue, Vec<QueueItem>) {
        let mut queue = VoteQueue::default();
        let session = SessionId::new();
        let adder = ParticipantId::new();

        let items = names
            .iter()
            .map(|n| queue.push(session, adder, track(n), Utc::now()))
            .collect();

        (queue, items)
    }

    #[test]
    fn adding_is_not_a_vote() {
        let (queue, items) = queue_with(&["a"]);

        assert_eq!(items[0].vote_score, 0);
        assert_eq!(queue.ballot(items[0].added_by, items[0].id), None);
    }

    #[test]
    fn toggles_and_flips() {
        let (mut queue, items) = queue_with(&["x"]);
        let x = items[0].id;
        let (p1, p2) = (ParticipantId::new(), ParticipantId::new());

        assert_eq!(queue.vote(p1, x, VoteDirection::Up).unwrap().vote_score, 1);

        let retracted = queue.vote(p1, x, VoteDirection::Up).unwrap();
        assert_eq!(retracted.vote_score, 0);
        assert_eq!(retracted.previous, Some(VoteDirection::Up));
        assert_eq!(retracted.current, None);

        assert_eq!(queue.vote(p2, x, VoteDirection::Up).unwrap().vote_score, 1);

        let flipped = queue.vote(p2, x, VoteDirection::Down).unwrap();
        assert_eq!(flipped.vote_score, -1);
        assert_eq!(flipped.current, Some(VoteDirection::Down));
    }

    #[test]
    fn score_is_the_sum_of_latest_ballots() {
        let (mut queue, items) = queue_with(&["x"]);
        let x = items[0].id;
        let voters: Vec<_> = (0..5).map(|_| ParticipantId::new()).collect();

        let sequence = [
            (0, VoteDirection::Up),
            (1, VoteDirection::Down),
            (0, VoteDirection::Down),
            (2, VoteDirection::Up),
            (3, VoteDirection::Up),
            (3, VoteDirection::Up),
            (4, VoteDirection::Down),
            (1, VoteDirection::Up),
        ];

        for (voter, direction) in sequence {
            queue.vote(voters[voter], x, direction).unwrap();
        }

        let expected: i64 = voters
            .iter()
            .map(|v| queue.ballot(*v, x).map(|d| d.unit()).unwrap_or(0))
            .sum();

        // 0: down, 1: up, 2: up, 3: retracted, 4: down
        assert_eq!(expected, 0);
        assert_eq!(queue.get(x).unwrap().vote_score, expected);
    }

    #[test]
    fn orders_by_score_then_insertion() {
        let (mut queue, items) = queue_with(&["a", "b", "c"]);
        let voter = ParticipantId::new();

        queue.vote(voter, items[2].id, VoteDirection::Up).unwrap();
        queue.vote(ParticipantId::new(), items[0].id, VoteDirection::Down).unwrap();

        let order: Vec<_> = queue.ordered().into_iter().map(|i| i.id).collect();
        assert_eq!(order, vec![items[2].id, items[1].id, items[0].id]);

        // Reading again without changes gives the same order
        let again: Vec<_> = queue.ordered().into_iter().map(|i| i.id).collect();
        assert_eq!(order, again);
    }

    #[test]
    fn pops_the_top_ranked_item_and_forgets_its_ballots() {
        let (mut queue, items) = queue_with(&["a", "b"]);
        let voter = ParticipantId::new();

        queue.vote(voter, items[1].id, VoteDirection::Up).unwrap();

        let popped = queue.pop_top().unwrap();
        assert_eq!(popped.id, items[1].id);
        assert_eq!(queue.ballot(voter, items[1].id), None);
        assert_eq!(queue.len(), 1);

        assert!(matches!(
            queue.vote(voter, items[1].id, VoteDirection::Up),
            Err(CollabError::NotFound { .. })
        ));
    }

    #[test]
    fn parses_track_refs_and_vote_units() {
        assert_eq!(track("  spotify:track:1 ").as_str(), "spotify:track:1");
        assert!(TrackRef::parse(" ").is_err());

        assert_eq!(VoteDirection::try_from(1).unwrap(), VoteDirection::Up);
        assert_eq!(VoteDirection::try_from(-1).unwrap(), VoteDirection::Down);
        assert!(VoteDirection::try_from(2).is_err());
    }
}
