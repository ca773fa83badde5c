mod subscription;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use subscription::{SubscriberId, Subscription};

pub(crate) use subscription::Subscribers;

use crate::{CollabContext, CollabError, CollabResult, EventKind, ParticipantId, SessionId};

/// An emoji sent by a participant. Broadcast once and never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reaction {
    pub emoji: String,
    pub participant_id: ParticipantId,
    pub ts: DateTime<Utc>,
}

/// Hands out subscriptions to session events, and broadcasts reactions
pub struct BroadcastChannel {
    context: CollabContext,
}

impl BroadcastChannel {
    pub fn new(context: &CollabContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Subscribes to a session. The first event is always a snapshot.
    ///
    /// Subscribing to an ended session yields the final snapshot, then the stream ends.
    pub fn subscribe(&self, session_id: SessionId) -> CollabResult<Subscription> {
        let session = self.context.session(session_id)?;
        let now = self.context.now();

        Ok(session.subscribe(self.context.config.subscriber_buffer, now))
    }

    pub fn subscriber_count(&self, session_id: SessionId) -> CollabResult<usize> {
        self.context
            .session(session_id)
            .map(|s| s.subscriber_count())
    }

    pub fn send_reaction(&self, participant_id: ParticipantId, emoji: &str) -> CollabResult<Reaction> {
        let emoji = validate_emoji(emoji)?;
        let session = self.context.session_of(participant_id)?;
        let now = self.context.now();
        let mut state = session.lock_active()?;
        state.participant(participant_id)?;

        let reaction = Reaction {
            emoji,
            participant_id,
            ts: now,
        };

        state.emit(
            EventKind::Reaction {
                reaction: reaction.clone(),
            },
            now,
        );

        Ok(reaction)
    }
}

fn validate_emoji(emoji: &str) -> CollabResult<String> {
    let emoji = emoji.trim();
    let length = emoji.chars().count();

    if !(1..=16).contains(&length) || emoji.chars().any(char::is_whitespace) {
        return Err(CollabError::Validation(
            "a reaction must be a single emoji of at most 16 characters".into(),
        ));
    }

    Ok(emoji.to_string())
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use crate::{Collab, Config, NewSession, Privacy, SessionEvent};

    use super::*;

    fn jam(config: Config) -> (Collab, SessionId, ParticipantId, String) {
        let collab = Collab::new(config);
        let created = collab
            .sessions
            .create_session(NewSession {
                name: "Jam".into(),
                host_nickname: "kat".into(),
                privacy: Privacy::Public,
                access_code: None,
            })
            .unwrap();

        (
            collab,
            created.session.id,
            created.host.id,
            created.session.code,
        )
    }

    fn names(events: &[SessionEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.kind.name()).collect()
    }

    #[test]
    fn snapshot_comes_before_deltas() {
        let (collab, session, host, code) = jam(Config::default());
        collab.queue.add_track(session, host, "track:a").unwrap();

        let subscription = collab.broadcast.subscribe(session).unwrap();
        let guest = collab.sessions.join_session(&code, "ola", None).unwrap();
        collab.presence.heartbeat(guest.id).unwrap();

        let events = subscription.drain();
        assert_eq!(
            names(&events),
            vec![
                "session_snapshot",
                "participant_joined",
                "participant_presence_changed"
            ]
        );

        // The snapshot already holds the queued track, and deltas follow in commit order
        match &events[0].kind {
            EventKind::SessionSnapshot { snapshot } => assert_eq!(snapshot.queue.len(), 1),
            other => panic!("expected a snapshot, got {}", other.name()),
        }
        assert!(events.windows(2).all(|w| w[1].seq == w[0].seq + 1));
    }

    #[test]
    fn dropping_unsubscribes() {
        let (collab, session, _, _) = jam(Config::default());

        let first = collab.broadcast.subscribe(session).unwrap();
        let second = collab.broadcast.subscribe(session).unwrap();
        assert_eq!(collab.broadcast.subscriber_count(session).unwrap(), 2);

        drop(first);
        assert_eq!(collab.broadcast.subscriber_count(session).unwrap(), 1);
        assert!(!second.is_closed());
    }

    #[test]
    fn lagging_subscribers_are_dropped() {
        let (collab, session, host, _) = jam(Config {
            subscriber_buffer: 3,
            ..Config::default()
        });

        let lagging = collab.broadcast.subscribe(session).unwrap();
        for n in 0..5 {
            collab.broadcast.send_reaction(host, &format!("{n}")).unwrap();
        }

        assert!(lagging.is_closed());
        assert_eq!(collab.broadcast.subscriber_count(session).unwrap(), 0);

        // What made it in can still be read
        assert_eq!(lagging.drain().len(), 3);
    }

    #[test]
    fn reactions_are_validated() {
        let (collab, _, host, _) = jam(Config::default());

        let reaction = collab.broadcast.send_reaction(host, " 🔥 ").unwrap();
        assert_eq!(reaction.emoji, "🔥");
        assert_eq!(reaction.participant_id, host);

        assert!(collab.broadcast.send_reaction(host, "").is_err());
        assert!(collab.broadcast.send_reaction(host, "a b").is_err());
        assert!(collab.broadcast.send_reaction(host, &"x".repeat(17)).is_err());
    }

    #[tokio::test]
    async fn stream_ends_with_the_session() {
        let (collab, session, host, _) = jam(Config::default());
        let mut subscription = collab.broadcast.subscribe(session).unwrap();

        collab.broadcast.send_reaction(host, "🎉").unwrap();
        collab.sessions.close_session(session, host).unwrap();

        let events: Vec<_> = (&mut subscription).collect().await;
        assert_eq!(
            names(&events),
            vec!["session_snapshot", "reaction", "session_ended"]
        );

        // Late subscribers get the final state and nothing else
        let late: Vec<_> = collab.broadcast.subscribe(session).unwrap().collect().await;
        assert_eq!(names(&late), vec!["session_snapshot"]);
    }

    #[test]
    fn events_serialize_flat() {
        let (collab, session, host, _) = jam(Config::default());
        let subscription = collab.broadcast.subscribe(session).unwrap();
        collab.broadcast.send_reaction(host, "👋").unwrap();

        let events = subscription.drain();
        let json = serde_json::to_value(&events[1]).unwrap();

        assert_eq!(json["type"], "reaction");
        assert_eq!(json["seq"], events[0].seq + 1);
        assert_eq!(json["reaction"]["emoji"], "👋");
        assert_eq!(json["session_id"], session.value());
    }
}
