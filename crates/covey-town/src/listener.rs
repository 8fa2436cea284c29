//! Listener notification fan-out.
//!
//! Every state change in a town is broadcast to the town's subscribed
//! [`TownListener`]s in registration order. The transport adapter
//! registers one listener per connected client; tests register recorders.
//!
//! Listeners must not block: they run while the town is locked. The
//! adapter's listener only pushes onto an unbounded channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use covey_protocol::{ChatMessage, ConversationArea, PlayerInfo, VehicleInfo};

/// Receives town events. Every method defaults to doing nothing, so an
/// implementation only overrides what it cares about.
pub trait TownListener: Send + Sync {
    fn on_player_joined(&self, _player: &PlayerInfo) {}
    fn on_player_moved(&self, _player: &PlayerInfo) {}
    fn on_player_disconnected(&self, _player: &PlayerInfo) {}
    fn on_player_invisible(&self, _player: &PlayerInfo) {}
    fn on_player_visible(&self, _player: &PlayerInfo) {}

    /// The town is shutting down; the subscriber should disconnect.
    fn on_town_destroyed(&self) {}

    fn on_conversation_area_updated(&self, _area: &ConversationArea) {}
    fn on_conversation_area_destroyed(&self, _area: &ConversationArea) {}

    fn on_vehicle_created(&self, _vehicle: &VehicleInfo) {}
    fn on_vehicle_moved(&self, _vehicle: &VehicleInfo) {}
    fn on_vehicle_change_lock_situation(&self, _vehicle: &VehicleInfo) {}
    fn on_vehicle_update_passengers(
        &self,
        _vehicle: &VehicleInfo,
        _passenger: &PlayerInfo,
    ) {
    }
    fn on_vehicle_get_off_passenger(
        &self,
        _vehicle: &VehicleInfo,
        _passenger: &PlayerInfo,
    ) {
    }
    /// `passengers` are the players freed from the vehicle.
    fn on_vehicle_destroyed(
        &self,
        _vehicle: &VehicleInfo,
        _passengers: &[PlayerInfo],
    ) {
    }

    fn on_chat_message(&self, _message: &ChatMessage) {}
}

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned by [`Listeners::add`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Entry = (ListenerId, Arc<dyn TownListener>);

/// The ordered set of listeners subscribed to one town.
///
/// Cloning yields another handle to the same set, so a listener may hold
/// one and unsubscribe itself (or others) while being notified. Each
/// notification pass works on a snapshot taken when the pass starts:
/// removals take effect from the next pass.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<Mutex<Vec<Entry>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` and returns its handle.
    pub fn add(&self, listener: Arc<dyn TownListener>) -> ListenerId {
        let id = ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed));
        self.entries().push((id, listener));
        id
    }

    /// Unsubscribes a listener. Returns `false` if it was not subscribed.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Calls `f` once per listener, in registration order.
    pub fn notify(&self, f: impl Fn(&dyn TownListener)) {
        let snapshot: Vec<Arc<dyn TownListener>> = self
            .entries()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &snapshot {
            f(listener.as_ref());
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, Vec<Entry>> {
        // A panicking listener never runs under this lock, so the data
        // is still consistent after poisoning.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("len", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;

    /// Counts `on_town_destroyed` calls, optionally unsubscribing a
    /// target on first call.
    #[derive(Default)]
    struct Counter {
        calls: Mutex<usize>,
        remove_on_notify: OnceLock<(Listeners, ListenerId)>,
    }

    impl Counter {
        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    impl TownListener for Counter {
        fn on_town_destroyed(&self) {
            *self.calls.lock().unwrap() += 1;
            if let Some((listeners, id)) = self.remove_on_notify.get() {
                listeners.remove(*id);
            }
        }
    }

    #[test]
    fn test_notify_reaches_every_listener_once() {
        let listeners = Listeners::new();
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        listeners.add(a.clone());
        listeners.add(b.clone());

        listeners.notify(|l| l.on_town_destroyed());

        assert_eq!(a.calls(), 1);
        assert_eq!(b.calls(), 1);
    }

    #[test]
    fn test_remove_unknown_returns_false() {
        let listeners = Listeners::new();
        let id = listeners.add(Arc::new(Counter::default()));
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert!(listeners.is_empty());
    }

    #[test]
    fn test_notify_listener_removes_itself_mid_pass() {
        let listeners = Listeners::new();
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());
        let first_id = listeners.add(first.clone());
        listeners.add(second.clone());
        first
            .remove_on_notify
            .set((listeners.clone(), first_id))
            .ok()
            .unwrap();

        listeners.notify(|l| l.on_town_destroyed());
        assert_eq!(first.calls(), 1);
        assert_eq!(second.calls(), 1, "rest of the pass still runs");
        assert_eq!(listeners.len(), 1);

        listeners.notify(|l| l.on_town_destroyed());
        assert_eq!(first.calls(), 1, "removed listener is not called again");
        assert_eq!(second.calls(), 2);
    }

    #[test]
    fn test_notify_listener_removes_later_listener_mid_pass() {
        let listeners = Listeners::new();
        let first = Arc::new(Counter::default());
        let second = Arc::new(Counter::default());
        listeners.add(first.clone());
        let second_id = listeners.add(second.clone());
        first
            .remove_on_notify
            .set((listeners.clone(), second_id))
            .ok()
            .unwrap();

        listeners.notify(|l| l.on_town_destroyed());
        assert_eq!(second.calls(), 1, "snapshot includes removed listener");

        listeners.notify(|l| l.on_town_destroyed());
        assert_eq!(second.calls(), 1);
        assert_eq!(first.calls(), 2);
    }
}
