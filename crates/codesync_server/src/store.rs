//! Authoritative in-memory session store.

use crate::config::ParticipantPolicy;
use codesync_protocol::{Clock, SessionView};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// State of one shared document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id.
    pub id: String,
    /// Authoritative document body.
    pub code: String,
    /// Time of the last accepted write, or of creation (Unix millis).
    pub last_modified: u64,
    /// Participant count under the store's policy.
    pub participant_count: u64,
    /// Editor of the last accepted write.
    pub last_editor_id: Option<String>,
    /// Distinct devices that joined and have not been reaped. Tracked
    /// under [`ParticipantPolicy::Connected`] only.
    members: BTreeSet<String>,
}

impl Session {
    fn new(id: &str, created_at: u64) -> Self {
        Self {
            id: id.to_string(),
            code: String::new(),
            last_modified: created_at,
            participant_count: 0,
            last_editor_id: None,
            members: BTreeSet::new(),
        }
    }

    /// Returns the devices currently counted as members.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    /// Converts into the wire representation.
    pub fn to_view(&self) -> SessionView {
        SessionView {
            code: self.code.clone(),
            last_modified: self.last_modified,
            participants: self.participant_count,
            last_updated_by: self.last_editor_id.clone(),
        }
    }
}

/// Map from session id to session state.
///
/// The registry lock is held only to look up or insert an entry. Each
/// session has its own mutex, so writers to one session never interleave
/// while writers to different sessions never wait on each other.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    policy: ParticipantPolicy,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new(policy: ParticipantPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
            clock,
        }
    }

    /// Returns the participant counting policy.
    pub fn policy(&self) -> ParticipantPolicy {
        self.policy
    }

    fn entry(&self, session_id: &str) -> Arc<Mutex<Session>> {
        if let Some(entry) = self.sessions.read().get(session_id) {
            return Arc::clone(entry);
        }

        let mut sessions = self.sessions.write();
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            debug!(session_id, "creating session");
            Arc::new(Mutex::new(Session::new(
                session_id,
                self.clock.now_millis(),
            )))
        });
        Arc::clone(entry)
    }

    /// Returns the session, creating an empty one on first reference.
    pub fn get_or_create(&self, session_id: &str) -> Session {
        self.entry(session_id).lock().clone()
    }

    /// Replaces the session body. Last write wins: no content merge.
    ///
    /// `last_modified` strictly increases on every accepted write, even if
    /// the clock has not moved since the previous one.
    pub fn apply_update(
        &self,
        session_id: &str,
        new_code: String,
        editor_id: Option<String>,
    ) -> Session {
        let entry = self.entry(session_id);
        let mut session = entry.lock();

        let now = self.clock.now_millis();
        session.last_modified = now.max(session.last_modified.saturating_add(1));
        session.code = new_code;
        session.last_editor_id = editor_id;

        debug!(
            session_id,
            last_modified = session.last_modified,
            bytes = session.code.len(),
            "accepted update"
        );
        session.clone()
    }

    /// Records a join and returns the current state.
    pub fn join(&self, session_id: &str, device_id: &str) -> Session {
        let entry = self.entry(session_id);
        let mut session = entry.lock();

        // Membership only matters when reaping can shrink the count.
        session.participant_count = match self.policy {
            ParticipantPolicy::Cumulative => session.participant_count.saturating_add(1),
            ParticipantPolicy::Connected => {
                session.members.insert(device_id.to_string());
                session.members.len() as u64
            }
        };

        debug!(
            session_id,
            device_id,
            participants = session.participant_count,
            "device joined"
        );
        session.clone()
    }

    /// Drops reaped devices from every session they joined, decaying the
    /// participant counts. A no-op under `Cumulative`, which keeps no
    /// membership. Returns the number of sessions whose membership changed.
    pub fn forget_devices(&self, device_ids: &[String]) -> usize {
        if device_ids.is_empty() || self.policy == ParticipantPolicy::Cumulative {
            return 0;
        }

        let entries: Vec<_> = self.sessions.read().values().cloned().collect();
        let mut changed = 0;

        for entry in entries {
            let mut session = entry.lock();
            let before = session.members.len();
            for device_id in device_ids {
                session.members.remove(device_id);
            }
            if session.members.len() != before {
                changed += 1;
                session.participant_count = session.members.len() as u64;
            }
        }
        changed
    }

    /// Returns the ids of all known sessions.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if no session has been referenced yet.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}
