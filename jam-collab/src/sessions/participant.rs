use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{util::trimmed_within, CollabError, CollabResult, Id};

use super::SessionId;

pub type ParticipantId = Id<Participant>;

/// Someone taking part in a session
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub session_id: SessionId,
    pub nickname: String,
    pub role: Role,
    pub presence: Presence,
    pub last_heartbeat_at: DateTime<Utc>,
    pub joined_at: DateTime<Utc>,
    /// When the participant last went inactive, used for the retention window
    #[serde(skip)]
    pub(crate) inactive_since: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) removed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Member,
}

/// Liveness of a participant's connection.
///
/// Joining -> Active <-> Inactive -> Removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    /// Joined, but no heartbeat has arrived yet
    Joining,
    Active,
    /// Missed too many heartbeats, but can still come back
    Inactive,
    /// Left or timed out. Terminal.
    Removed,
}

impl Participant {
    pub(crate) fn new(
        session_id: SessionId,
        nickname: String,
        role: Role,
        presence: Presence,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: ParticipantId::new(),
            session_id,
            nickname,
            role,
            presence,
            last_heartbeat_at: now,
            joined_at: now,
            inactive_since: None,
            removed_at: None,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn is_active(&self) -> bool {
        self.presence == Presence::Active
    }

    pub fn is_removed(&self) -> bool {
        self.presence == Presence::Removed
    }

    /// Returns true if this participant holds the given nickname
    pub(crate) fn goes_by(&self, nickname: &str) -> bool {
        !self.is_removed() && self.nickname.to_lowercase() == nickname.to_lowercase()
    }

    /// Records a heartbeat. Returns the new presence if it changed.
    pub(crate) fn beat(&mut self, now: DateTime<Utc>) -> Option<Presence> {
        self.last_heartbeat_at = now;
        self.inactive_since = None;

        match self.presence {
            Presence::Joining | Presence::Inactive => {
                self.presence = Presence::Active;
                Some(Presence::Active)
            }
            _ => None,
        }
    }

    pub(crate) fn mark_inactive(&mut self, now: DateTime<Utc>) {
        self.presence = Presence::Inactive;
        self.inactive_since = Some(now);
    }

    pub(crate) fn mark_removed(&mut self, now: DateTime<Utc>) {
        self.presence = Presence::Removed;
        self.role = Role::Member;
        self.inactive_since = None;
        self.removed_at = Some(now);
    }

    /// Returns true once a removed participant has been gone for longer than the retention
    pub(crate) fn is_expired(&self, now: DateTime<Utc>, retention: Duration) -> bool {
        self.removed_at
            .map(|at| now - at >= retention)
            .unwrap_or(false)
    }
}

/// Checks a nickname is 1 to 20 characters without control characters, returning it trimmed
pub fn validate_nickname(nickname: &str) -> CollabResult<String> {
    let nickname = trimmed_within(nickname, 1, 20).ok_or_else(|| {
        CollabError::Validation("nickname must be between 1 and 20 characters".to_string())
    })?;

    if nickname.chars().any(char::is_control) {
        return Err(CollabError::Validation(
            "nickname must not contain control characters".to_string(),
        ));
    }

    Ok(nickname)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nicknames_are_trimmed_and_bounded() {
        assert_eq!(validate_nickname("  dj kat ").unwrap(), "dj kat");
        assert_eq!(validate_nickname(&"ü".repeat(20)).unwrap().chars().count(), 20);

        assert!(validate_nickname("   ").is_err());
        assert!(validate_nickname(&"a".repeat(21)).is_err());
        assert!(validate_nickname("tab\there").is_err());
    }

    #[test]
    fn heartbeat_reactivates_until_removed() {
        let now = Utc::now();
        let mut participant = Participant::new(
            SessionId::new(),
            "kat".to_string(),
            Role::Member,
            Presence::Joining,
            now,
        );

        assert_eq!(participant.beat(now), Some(Presence::Active));
        assert_eq!(participant.beat(now), None);

        participant.mark_inactive(now);
        assert!(participant.goes_by("KAT"));
        assert_eq!(participant.beat(now), Some(Presence::Active));

        participant.mark_removed(now);
        assert!(!participant.goes_by("kat"));
        assert!(!participant.is_expired(now, Duration::minutes(2)));
        assert!(participant.is_expired(now + Duration::minutes(2), Duration::minutes(2)));
    }
}
