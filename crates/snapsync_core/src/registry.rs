//! Session registry with TTL expiry and single-borrower checkout.
//!
//! ## Slot states
//!
//! ```text
//!   create ──► Idle ──checkout/renew──► CheckedOut ──guard drop──► Idle
//!               │                           │
//!         expired + reap                  remove ──► slot gone, session
//!               ▼                           │        dropped with the guard
//!             (gone) ◄──────────────────────┘
//! ```
//!
//! The expiry check and the transition to `CheckedOut` happen under one
//! lock, so a session observed as live can not be reaped before its caller
//! gets it.

use crate::config::ReplicationConfig;
use crate::error::{ReplicationError, ReplicationResult};
use crate::session::{SessionId, SnapshotSession};
use parking_lot::Mutex;
use snapsync_storage::{StorageEngine, Tick};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

enum SlotState {
    Idle(Box<SnapshotSession>),
    CheckedOut,
}

struct Slot {
    state: SlotState,
    ttl: Duration,
    expires: Instant,
}

/// Result of a successful `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedSession {
    /// New session id.
    pub id: SessionId,
    /// Latest log tick when the snapshot was taken.
    pub last_tick: Tick,
}

/// Owner of all replication sessions.
///
/// The registry is the only component that creates or destroys sessions.
/// It is shared by reference (usually inside an `Arc`) by every request
/// handler and by the background [`Reaper`].
pub struct SessionRegistry {
    engine: Arc<dyn StorageEngine>,
    config: ReplicationConfig,
    slots: Mutex<HashMap<SessionId, Slot>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry over an engine.
    pub fn new(engine: Arc<dyn StorageEngine>, config: ReplicationConfig) -> Self {
        Self {
            engine,
            config,
            slots: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The engine sessions are created on.
    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// The registry configuration.
    pub fn config(&self) -> &ReplicationConfig {
        &self.config
    }

    /// Opens a session on a fresh snapshot of `database`.
    ///
    /// The new session is stored idle with expiry `now + ttl`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown databases and `Engine` if the engine
    /// can not provide a snapshot.
    pub fn create(
        &self,
        database: &str,
        ttl: Option<Duration>,
    ) -> ReplicationResult<CreatedSession> {
        self.engine.collections(database)?;
        let snapshot = self.engine.snapshot()?;
        let ttl = self.config.effective_ttl(ttl);
        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = SnapshotSession::new(id, database.to_string(), ttl, snapshot);
        let last_tick = session.last_tick();

        self.slots.lock().insert(
            id,
            Slot {
                state: SlotState::Idle(Box::new(session)),
                ttl,
                expires: Instant::now() + ttl,
            },
        );
        tracing::info!(session = %id, database, %last_tick, ttl_secs = ttl.as_secs(), "session created");
        Ok(CreatedSession { id, last_tick })
    }

    /// Borrows a session exclusively.
    ///
    /// The returned guard gives the session back when dropped, on every
    /// exit path. While checked out the session's deadline is pushed to
    /// `now + ttl`.
    ///
    /// # Errors
    ///
    /// `Busy` if another caller holds it, `NotFound` if it is absent or expired.
    pub fn checkout(&self, id: SessionId) -> ReplicationResult<SessionGuard<'_>> {
        self.acquire(id, None)
    }

    /// Like [`checkout`](Self::checkout), and also replaces the session's TTL.
    ///
    /// # Errors
    ///
    /// Same as `checkout`.
    pub fn renew(&self, id: SessionId, ttl: Option<Duration>) -> ReplicationResult<SessionGuard<'_>> {
        let ttl = self.config.effective_ttl(ttl);
        let guard = self.acquire(id, Some(ttl))?;
        tracing::debug!(session = %id, ttl_secs = ttl.as_secs(), "session renewed");
        Ok(guard)
    }

    fn acquire(&self, id: SessionId, new_ttl: Option<Duration>) -> ReplicationResult<SessionGuard<'_>> {
        let now = Instant::now();
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&id) else {
            return Err(ReplicationError::session_not_found(id));
        };
        if matches!(slot.state, SlotState::CheckedOut) {
            return Err(ReplicationError::Busy(id));
        }
        if slot.expires <= now {
            let expired = slots.remove(&id);
            drop(slots);
            drop(expired);
            tracing::warn!(session = %id, "session expired before checkout");
            return Err(ReplicationError::session_not_found(id));
        }

        if let Some(ttl) = new_ttl {
            slot.ttl = ttl;
        }
        slot.expires = now + slot.ttl;
        let ttl = slot.ttl;
        let SlotState::Idle(mut session) = std::mem::replace(&mut slot.state, SlotState::CheckedOut)
        else {
            return Err(ReplicationError::Busy(id));
        };
        drop(slots);

        session.touch(now);
        session.set_ttl(ttl);
        Ok(SessionGuard {
            registry: self,
            session: Some(session),
            discard: false,
        })
    }

    /// Gives a checked-out session back.
    fn release(&self, session: Box<SnapshotSession>, discard: bool) {
        let id = session.id();
        let mut slots = self.slots.lock();
        if !discard {
            if let Some(slot) = slots.get_mut(&id) {
                slot.expires = Instant::now() + slot.ttl;
                slot.state = SlotState::Idle(session);
                return;
            }
        }
        let removed = slots.remove(&id);
        drop(slots);
        drop(session);
        if removed.is_some() {
            tracing::warn!(session = %id, "session discarded after snapshot failure");
        } else {
            // removed while checked out
            tracing::debug!(session = %id, "released session was already removed");
        }
    }

    /// Destroys a session whatever its state.
    ///
    /// A checked-out session disappears from the registry at once; its
    /// holder keeps a valid session until the guard drops, which then
    /// releases the snapshot.
    ///
    /// Returns whether the session existed.
    pub fn remove(&self, id: SessionId) -> bool {
        let removed = self.slots.lock().remove(&id);
        match removed {
            Some(Slot {
                state: SlotState::CheckedOut,
                ..
            }) => {
                tracing::warn!(session = %id, "checked-out session removed");
                true
            }
            Some(slot) => {
                drop(slot);
                tracing::info!(session = %id, "session removed");
                true
            }
            None => false,
        }
    }

    /// Destroys every idle session whose deadline has passed.
    ///
    /// Returns the number of sessions destroyed.
    pub fn reap_expired(&self) -> usize {
        self.reap_expired_at(Instant::now())
    }

    /// Same as [`reap_expired`](Self::reap_expired) against a given clock.
    /// Checked-out sessions are never reaped.
    pub fn reap_expired_at(&self, now: Instant) -> usize {
        let expired: Vec<(SessionId, Slot)> = {
            let mut slots = self.slots.lock();
            let ids: Vec<SessionId> = slots
                .iter()
                .filter(|(_, slot)| {
                    matches!(slot.state, SlotState::Idle(_)) && slot.expires <= now
                })
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| slots.remove(&id).map(|slot| (id, slot)))
                .collect()
        };
        for (id, _) in &expired {
            tracing::warn!(session = %id, "session expired");
        }
        expired.len()
    }

    /// Borrows a session for the duration of `f`.
    ///
    /// If `f` fails with an error that invalidates the session, the session
    /// is removed instead of being given back.
    ///
    /// # Errors
    ///
    /// Checkout errors, or whatever `f` returns.
    pub fn with_session<T>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut SnapshotSession) -> ReplicationResult<T>,
    ) -> ReplicationResult<T> {
        let mut guard = self.checkout(id)?;
        let result = f(&mut *guard);
        if let Err(err) = &result {
            if err.invalidates_session() {
                guard.discard();
            }
        }
        result
    }

    /// Number of sessions, idle or checked out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Returns true if no sessions exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Returns true if the session exists (idle or checked out).
    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.slots.lock().contains_key(&id)
    }

    /// Returns true if the session exists and is checked out.
    #[must_use]
    pub fn is_checked_out(&self, id: SessionId) -> bool {
        self.slots
            .lock()
            .get(&id)
            .is_some_and(|slot| matches!(slot.state, SlotState::CheckedOut))
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Exclusive access to a checked-out session.
///
/// Dropping the guard releases the checkout.
#[derive(Debug)]
pub struct SessionGuard<'a> {
    registry: &'a SessionRegistry,
    session: Option<Box<SnapshotSession>>,
    discard: bool,
}

impl SessionGuard<'_> {
    /// Marks the session for destruction instead of release.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Deref for SessionGuard<'_> {
    type Target = SnapshotSession;

    #[allow(clippy::expect_used)]
    fn deref(&self) -> &SnapshotSession {
        // only taken in drop
        self.session.as_deref().expect("session present until drop")
    }
}

impl DerefMut for SessionGuard<'_> {
    #[allow(clippy::expect_used)]
    fn deref_mut(&mut self) -> &mut SnapshotSession {
        self.session.as_deref_mut().expect("session present until drop")
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.registry.release(session, self.discard);
        }
    }
}

/// Background thread that periodically reaps expired sessions.
///
/// Stops when dropped.
#[derive(Debug)]
pub struct Reaper {
    stop: Option<mpsc::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Starts reaping `registry` every `interval`.
    pub fn spawn(registry: Arc<SessionRegistry>, interval: Duration) -> Self {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("snapsync-reaper".into())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let reaped = registry.reap_expired();
                        if reaped > 0 {
                            tracing::debug!(reaped, "reaper pass");
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            });
        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(err) => {
                tracing::warn!(error = %err, "failed to start session reaper");
                None
            }
        };
        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Returns true if the reaper thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("session reaper panicked");
            }
        }
    }
}
