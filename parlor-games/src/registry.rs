//! One live session per room and game kind.

use crate::error::Result;
use crate::events::GameKind;
use crate::supervisor::TaskSupervisor;
use parking_lot::Mutex;
use parlor_core::RoomId;
use std::collections::HashMap;
use std::sync::Arc;

pub trait Session: Send + Sync + Sized + 'static {
    const KIND: GameKind;

    fn room(&self) -> RoomId;

    fn supervisor(&self) -> &TaskSupervisor;

    /// Runs once for the instance that won creation, after it was stored.
    fn on_created(self: &Arc<Self>, registry: &Arc<SessionRegistry<Self>>);
}

pub struct SessionRegistry<S: Session> {
    slots: Mutex<HashMap<RoomId, Arc<S>>>,
}

impl<S: Session> SessionRegistry<S> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: Mutex::new(HashMap::new()),
        })
    }

    pub fn get(&self, room: RoomId) -> Option<Arc<S>> {
        self.slots.lock().get(&room).cloned()
    }

    /// Return the running session for `room`, or build one with `factory`.
    /// The boolean is true only for the caller whose factory ran.
    pub fn get_or_create<F>(self: &Arc<Self>, room: RoomId, factory: F) -> Result<(Arc<S>, bool)>
    where
        F: FnOnce() -> Result<S>,
    {
        let session = {
            let mut slots = self.slots.lock();
            if let Some(existing) = slots.get(&room) {
                return Ok((existing.clone(), false));
            }
            let session = Arc::new(factory()?);
            slots.insert(room, session.clone());
            session
        };

        tracing::info!("Created {:?} session in room {}", S::KIND, room);
        session.on_created(self);
        Ok((session, true))
    }

    /// Remove `session` if it still owns its room's slot.
    pub fn release(&self, room: RoomId, session: &Arc<S>) -> bool {
        let mut slots = self.slots.lock();
        match slots.get(&room) {
            Some(current) if Arc::ptr_eq(current, session) => {
                slots.remove(&room);
                tracing::debug!("Released {:?} session in room {}", S::KIND, room);
                true
            }
            _ => false,
        }
    }

    pub fn active_rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self.slots.lock().keys().copied().collect();
        rooms.sort();
        rooms
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancel the room's session and wait for its task to wind down.
    pub async fn cancel_room(&self, room: RoomId) -> bool {
        let session = self.slots.lock().remove(&room);
        match session {
            Some(session) => {
                session.supervisor().cancel();
                session.supervisor().join().await;
                tracing::info!("Cancelled {:?} session in room {}", S::KIND, room);
                true
            }
            None => false,
        }
    }

    /// Cancel every session and wait for all of their tasks.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<S>> = self.slots.lock().drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.supervisor().cancel();
        }
        futures::future::join_all(sessions.iter().map(|s| s.supervisor().join())).await;
        if !sessions.is_empty() {
            tracing::info!("Shut down {} {:?} sessions", sessions.len(), S::KIND);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeSession {
        room: RoomId,
        supervisor: TaskSupervisor,
        launched: Arc<AtomicUsize>,
    }

    impl Session for FakeSession {
        const KIND: GameKind = GameKind::Dice;

        fn room(&self) -> RoomId {
            self.room
        }

        fn supervisor(&self) -> &TaskSupervisor {
            &self.supervisor
        }

        fn on_created(self: &Arc<Self>, _registry: &Arc<SessionRegistry<Self>>) {
            self.launched.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fake_session(room: RoomId, launched: &Arc<AtomicUsize>) -> Result<FakeSession> {
        Ok(FakeSession {
            room,
            supervisor: TaskSupervisor::new(),
            launched: launched.clone(),
        })
    }

    #[test]
    fn test_concurrent_get_or_create_single_winner() {
        let registry = SessionRegistry::<FakeSession>::new();
        let room = RoomId(-100);
        let launched = Arc::new(AtomicUsize::new(0));

        let winners: usize = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let launched = launched.clone();
                std::thread::spawn(move || {
                    registry
                        .get_or_create(room, || fake_session(room, &launched))
                        .unwrap()
                        .1
                })
            })
            .collect::<Vec<_>>()
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();

        assert_eq!(winners, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(launched.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_ignores_stale_instance() {
        let registry = SessionRegistry::<FakeSession>::new();
        let room = RoomId(5);
        let launched = Arc::new(AtomicUsize::new(0));

        let stale = Arc::new(fake_session(room, &launched).unwrap());
        let (current, created) = registry
            .get_or_create(room, || fake_session(room, &launched))
            .unwrap();
        assert!(created);

        assert!(!registry.release(room, &stale));
        assert_eq!(registry.active_rooms(), vec![room]);
        assert!(registry.release(room, &current));
        assert!(registry.is_empty());
    }
}
