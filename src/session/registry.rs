//! # Session registry: identity → live session record.
//!
//! The single source of truth for which sessions exist. Every mutation takes the
//! write lock, so an insert racing a lookup or a removal resolves deterministically.
//!
//! ## Rules
//! - **At most one** record per identity; a second insert fails with `DuplicateSession`
//! - Lookups of unknown identities never create records
//! - A record is removed only by the monitor that finalized it (`Stopped`/`Failed`)
//! - `drain_all` is a snapshot for shutdown; it removes nothing
//!
//! ## Events
//! `SessionAdded` on insert, `SessionExtended` / `SessionStopRequested` on window and stop
//! changes, `SessionRemoved` on removal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::NodeError;
use crate::events::{Bus, Event, EventKind};
use crate::session::{SessionDraft, SessionId, SessionRecord};

/// Result of [`SessionRegistry::validate_and_extend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidateOutcome {
    /// The identity is registered.
    pub found: bool,
    /// The stop time was applied.
    pub updated: bool,
}

impl ValidateOutcome {
    pub const NOT_FOUND: Self = Self {
        found: false,
        updated: false,
    };
}

/// Concurrent map of live recording sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionRecord>>>,
    bus: Bus,
}

impl SessionRegistry {
    pub fn new(bus: Bus) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            bus,
        })
    }

    /// Read-only lookup.
    pub async fn try_get(&self, id: &SessionId) -> Option<Arc<SessionRecord>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Registers a new session in `Starting`.
    pub async fn insert_if_absent(
        &self,
        draft: SessionDraft,
    ) -> Result<Arc<SessionRecord>, NodeError> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&draft.id) {
            return Err(NodeError::DuplicateSession { id: draft.id });
        }
        let record = Arc::new(SessionRecord::new(draft));
        sessions.insert(record.id().clone(), Arc::clone(&record));
        drop(sessions);

        self.bus.publish(
            Event::new(EventKind::SessionAdded)
                .with_session(record.id())
                .with_card(record.card_id()),
        );
        Ok(record)
    }

    /// Moves the stop time of a live session.
    ///
    /// A stop time that is already in the past is applied and ends the session: the
    /// capture unit is asked to stop right away.
    pub async fn validate_and_extend(
        &self,
        id: &SessionId,
        new_stop: DateTime<Utc>,
    ) -> ValidateOutcome {
        let sessions = self.sessions.write().await;
        let Some(record) = sessions.get(id) else {
            return ValidateOutcome::NOT_FOUND;
        };
        let rejected = ValidateOutcome {
            found: true,
            updated: false,
        };
        if !record.state().accepts_updates() || !record.set_stop(new_stop) {
            return rejected;
        }

        self.bus.publish(
            Event::new(EventKind::SessionExtended)
                .with_session(id)
                .with_reason(new_stop.to_rfc3339()),
        );
        if record.window().has_ended(Utc::now()) && record.request_stop() {
            self.bus.publish(
                Event::new(EventKind::SessionStopRequested)
                    .with_session(id)
                    .with_reason("stop time already passed"),
            );
        }
        ValidateOutcome {
            found: true,
            updated: true,
        }
    }

    /// Requests a cooperative stop. `None` if the identity is unknown.
    pub async fn request_stop(&self, id: &SessionId) -> Option<Arc<SessionRecord>> {
        let sessions = self.sessions.write().await;
        let record = sessions.get(id).cloned()?;
        let changed = record.request_stop();
        drop(sessions);

        if changed {
            self.bus.publish(
                Event::new(EventKind::SessionStopRequested)
                    .with_session(id)
                    .with_reason("abort"),
            );
        }
        Some(record)
    }

    /// Removes `record` if it is still the one registered under its identity.
    pub async fn remove(&self, record: &Arc<SessionRecord>) -> bool {
        debug_assert!(record.state().is_terminal());

        let mut sessions = self.sessions.write().await;
        let owned = sessions
            .get(record.id())
            .is_some_and(|cur| Arc::ptr_eq(cur, record));
        if owned {
            sessions.remove(record.id());
        }
        drop(sessions);

        if owned {
            self.bus.publish(
                Event::new(EventKind::SessionRemoved)
                    .with_session(record.id())
                    .with_reason(record.state().as_str()),
            );
        }
        owned
    }

    /// Point-in-time snapshot of every registered session, sorted by identity.
    pub async fn drain_all(&self) -> Vec<Arc<SessionRecord>> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<_> = sessions.values().cloned().collect();
        drop(sessions);
        all.sort_unstable_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// Returns sorted list of registered identities.
    pub async fn list(&self) -> Vec<SessionId> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<SessionId> = sessions.keys().cloned().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
