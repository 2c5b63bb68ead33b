//! The authoritative list of live connections for one channel.
//!
//! # Concurrency
//!
//! The list is copy-on-write behind an [`ArcSwap`]. A broadcast takes a
//! snapshot (one atomic load) and iterates it with no lock held, while
//! connects and disconnects publish a new list. Sends therefore never wait
//! on a mutation, and a mutation never waits on a broadcast's I/O.
//! Mutations are rare (once per connect and disconnect) and lists are
//! small, so cloning the vector on write is the cheap side.

use std::sync::Arc;

use arc_swap::ArcSwap;
use lobbywire_transport::ConnectionId;

use crate::{Session, UserId};

/// Copy-on-write set of live sessions, in connection order.
pub struct ConnectionRegistry {
    sessions: ArcSwap<Vec<Session>>,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Adds a session. Lookups see it as soon as this returns.
    pub fn add(&self, session: Session) {
        self.sessions.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(session.clone());
            next
        });
    }

    /// Removes the session with `id` and marks it `Closed`.
    ///
    /// Returns `None` if it was already gone.
    pub fn remove(&self, id: ConnectionId) -> Option<Session> {
        let mut removed = None;
        self.sessions.rcu(|current| {
            removed = None;
            let mut next = Vec::with_capacity(current.len());
            for session in current.iter() {
                if session.id() == id {
                    removed = Some(session.clone());
                } else {
                    next.push(session.clone());
                }
            }
            next
        });
        if let Some(session) = &removed {
            session.mark_closed();
        }
        removed
    }

    /// A point-in-time view of every session, safe to iterate while
    /// connections come and go.
    pub fn snapshot(&self) -> Arc<Vec<Session>> {
        self.sessions.load_full()
    }

    /// Looks up a session by connection id.
    pub fn get(&self, id: ConnectionId) -> Option<Session> {
        self.sessions.load().iter().find(|s| s.id() == id).cloned()
    }

    /// All sessions opened by `user`.
    pub fn sessions_for_user(&self, user: UserId) -> Vec<Session> {
        self.sessions
            .load()
            .iter()
            .filter(|s| s.user() == user)
            .cloned()
            .collect()
    }

    /// How many connections `user` currently holds.
    pub fn count_for_user(&self, user: UserId) -> usize {
        self.sessions
            .load()
            .iter()
            .filter(|s| s.user() == user)
            .count()
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.sessions.load().len()
    }

    /// Returns `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConnectionState;
    use lobbywire_transport::{outbound_queue, OutboundQueue, UpgradeRequest};

    fn session(id: u64, user: u64) -> (Session, OutboundQueue) {
        let (sender, queue) = outbound_queue(ConnectionId::new(id), 4);
        (Session::new(UserId(user), UpgradeRequest::new("/"), sender), queue)
    }

    #[test]
    fn test_add_and_count_for_user() {
        let registry = ConnectionRegistry::new();
        let (a, _qa) = session(1, 10);
        let (b, _qb) = session(2, 10);
        let (c, _qc) = session(3, 20);
        registry.add(a);
        registry.add(b);
        registry.add(c);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.count_for_user(UserId(10)), 2);
        assert_eq!(registry.count_for_user(UserId(20)), 1);
        assert_eq!(registry.count_for_user(UserId(30)), 0);
    }

    #[test]
    fn test_remove_marks_closed() {
        let registry = ConnectionRegistry::new();
        let (a, _qa) = session(1, 10);
        registry.add(a.clone());

        let removed = registry.remove(ConnectionId::new(1)).unwrap();
        assert_eq!(removed.id(), a.id());
        assert_eq!(a.state(), ConnectionState::Closed);
        assert!(registry.is_empty());
        assert!(registry.remove(ConnectionId::new(1)).is_none());
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_changes() {
        let registry = ConnectionRegistry::new();
        let (a, _qa) = session(1, 10);
        let (b, _qb) = session(2, 20);
        registry.add(a);

        let snapshot = registry.snapshot();
        registry.add(b);
        registry.remove(ConnectionId::new(1));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id(), ConnectionId::new(1));
        assert_eq!(registry.len(), 1);
        assert!(registry.get(ConnectionId::new(2)).is_some());
    }

    #[test]
    fn test_concurrent_adds_are_not_lost() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut queues = Vec::new();
        let mut sessions = Vec::new();
        for id in 0..64 {
            let (s, q) = session(id, id % 4);
            sessions.push(s);
            queues.push(q);
        }

        std::thread::scope(|scope| {
            for chunk in sessions.chunks(16) {
                let registry = Arc::clone(&registry);
                scope.spawn(move || {
                    for s in chunk {
                        registry.add(s.clone());
                    }
                });
            }
        });

        assert_eq!(registry.len(), 64);
        assert_eq!(registry.count_for_user(UserId(0)), 16);
    }
}
