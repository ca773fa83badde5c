use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::{
    CollabContext, CollabResult, EndReason, EventKind, LeaveReason, ParticipantId, Presence,
    Session, SessionState,
};

/// What a presence sweep changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Participants that went inactive
    pub inactive: usize,
    /// Participants removed after the retention window
    pub removed: usize,
    /// Hosts promoted by failover
    pub promotions: usize,
    /// Sessions ended after the grace period
    pub ended: usize,
    /// Ended sessions dropped after the archive retention
    pub evicted: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn merge(&mut self, other: SweepReport) {
        self.inactive += other.inactive;
        self.removed += other.removed;
        self.promotions += other.promotions;
        self.ended += other.ended;
        self.evicted += other.evicted;
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inactive, {} removed, {} promoted, {} ended, {} evicted",
            self.inactive, self.removed, self.promotions, self.ended, self.evicted
        )
    }
}

/// Tracks heartbeats, and times out silent participants
pub struct PresenceTracker {
    context: CollabContext,
}

impl PresenceTracker {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Records a heartbeat, returning the participant's presence afterwards
    pub fn heartbeat(&self, participant_id: ParticipantId) -> CollabResult<Presence> {
        let session = self.context.session_of(participant_id)?;
        let now = self.context.now();
        let mut state = session.lock_active()?;

        let participant = state.participant_mut(participant_id)?;
        let changed = participant.beat(now);
        let presence = participant.presence;

        if let Some(presence) = changed {
            debug!("{} is now {:?}", participant_id, presence);

            state.emit(
                EventKind::ParticipantPresenceChanged {
                    participant_id,
                    presence,
                },
                now,
            );

            state.vacant_since = None;
            state.fail_over(now);
        }

        Ok(presence)
    }

    /// Evaluates every live session against the clock, and evicts ended sessions
    /// once the archive retention has passed.
    ///
    /// Each session is swept under its own lock, so promotions stay at one per vacancy
    /// even when several sweeps run at once.
    pub fn sweep(&self) -> SweepReport {
        let sessions: Vec<Arc<Session>> = self
            .context
            .sessions
            .iter()
            .map(|s| s.value().clone())
            .collect();

        let archive_retention = self.context.config.archive_retention;
        let mut report = SweepReport::default();
        let mut expired = vec![];

        for session in sessions {
            let now = self.context.now();
            let mut state = session.lock();

            match state.ended_at() {
                None => report.merge(self.sweep_session(&session, &mut state, now)),
                Some(at) if now - at >= archive_retention => {
                    expired.push((session.id, state.participant_ids()));
                }
                Some(_) => {}
            }
        }

        // Evicted outside the session locks
        for (session_id, participants) in expired {
            if self.context.evict_session(session_id, &participants) {
                report.evicted += 1;
            }
        }

        if !report.is_empty() {
            info!("Presence sweep: {}", report);
        }

        report
    }

    fn sweep_session(
        &self,
        session: &Session,
        state: &mut SessionState,
        now: DateTime<Utc>,
    ) -> SweepReport {
        let config = &self.context.config;
        let timeout = config.inactivity_timeout();
        let mut report = SweepReport::default();

        let mut went_inactive = vec![];
        let mut timed_out = vec![];

        for participant in state.participants.iter_mut() {
            match participant.presence {
                Presence::Joining | Presence::Active
                    if now - participant.last_heartbeat_at > timeout =>
                {
                    participant.mark_inactive(now);
                    went_inactive.push(participant.id);
                }
                Presence::Inactive => {
                    let since = participant.inactive_since.unwrap_or(now);

                    if now - since >= config.retention {
                        participant.mark_removed(now);
                        timed_out.push((participant.id, participant.nickname.clone()));
                    }
                }
                _ => {}
            }
        }

        for participant_id in went_inactive {
            state.emit(
                EventKind::ParticipantPresenceChanged {
                    participant_id,
                    presence: Presence::Inactive,
                },
                now,
            );
            report.inactive += 1;
        }

        for (participant_id, nickname) in timed_out {
            self.context.forget_participant(participant_id);
            state.release_host(participant_id);
            state.emit(
                EventKind::ParticipantLeft {
                    participant_id,
                    reason: LeaveReason::TimedOut,
                },
                now,
            );

            info!("{} timed out of session {}", nickname, session.code);
            report.removed += 1;
        }

        let pruned = state.prune_removed(now, config.retention);
        if pruned > 0 {
            debug!("Pruned {} removed participants from session {}", pruned, session.code);
        }

        if state.fail_over(now) {
            report.promotions += 1;
        }

        if state.has_active_participant() {
            state.vacant_since = None;
        } else {
            let since = *state.vacant_since.get_or_insert(now);

            if now - since >= config.grace_period {
                self.context
                    .end_session(session, state, EndReason::Abandoned);
                report.ended += 1;
            }
        }

        report
    }
}
