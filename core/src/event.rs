//! Lightweight notification channel between the project store and its
//! consumers. The UI layer subscribes here instead of co-owning the tree.
//!
//! Listeners are held behind `Weak` pointers inside a `SkipSet` ordered by
//! registration sequence, so dropping the [`Listener`] guard deregisters the
//! callback; stale entries are swept on the next dispatch.

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};

use crossbeam_skiplist::SkipSet;

/// Marker for payload types that can be dispatched to listeners.
pub trait Event: fmt::Debug + Send + Sync {}

struct ListenerEntry<E: Event> {
    callback: Weak<dyn Fn(&E) + Send + Sync>,
    order: usize,
}

impl<E: Event> Eq for ListenerEntry<E> {}

impl<E: Event> PartialEq for ListenerEntry<E> {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl<E: Event> Ord for ListenerEntry<E> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order.cmp(&other.order)
    }
}

impl<E: Event> PartialOrd for ListenerEntry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

static LISTENER_ID_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Registered callbacks for one event type, invoked in registration order.
pub struct ListenerList<E: Event> {
    inner: SkipSet<ListenerEntry<E>>,
}

impl<E: Event + 'static> ListenerList<E> {
    pub fn new() -> Self {
        ListenerList { inner: SkipSet::new() }
    }

    /// Dispatches `event` to every live listener, sweeping entries whose
    /// guard has been dropped. Crate-private so only the store emits.
    pub(crate) fn dispatch(&self, event: &E) {
        let mut stale = Vec::new();
        for entry in self.inner.iter() {
            match entry.callback.upgrade() {
                Some(callback) => callback(event),
                None => stale.push(entry.order),
            }
        }

        // SkipSet removal needs a comparable key; only `order` matters.
        let dummy: Arc<dyn Fn(&E) + Send + Sync> = Arc::new(|_| {});
        for order in stale {
            self.inner.remove(&ListenerEntry { callback: Arc::downgrade(&dummy), order });
        }
    }
}

impl<E: Event + 'static> Default for ListenerList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for ListenerList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerList")
            .field("listener_count", &self.inner.len())
            .finish()
    }
}

/// Guard for an active registration. Dropping it deregisters the listener.
pub struct Listener<E: Event> {
    // The list holds only a Weak reference; this Arc keeps the callback alive.
    #[allow(dead_code)]
    arc: Arc<dyn Fn(&E) + Send + Sync>,
    order: usize,
}

impl<E: Event + 'static> Listener<E> {
    pub fn new<F>(listeners: &ListenerList<E>, callback: F) -> Self
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let order = LISTENER_ID_COUNTER.fetch_add(1, Ordering::SeqCst);
        let arc: Arc<dyn Fn(&E) + Send + Sync> = Arc::new(callback);
        listeners.inner.insert(ListenerEntry { callback: Arc::downgrade(&arc), order });
        Listener { arc, order }
    }
}

impl<E: Event> fmt::Debug for Listener<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener").field("order", &self.order).finish()
    }
}

/// Defines a struct holding named [`ListenerList`] fields for several event
/// types.
macro_rules! define_event_listeners {
    ($struct_name:ident { $($field_name:ident: $event_type:ty),* $(,)? }) => {
        /// Holds listener lists for various events.
        #[derive(Debug, Default)]
        pub struct $struct_name {
            $(
                pub $field_name: $crate::event::ListenerList<$event_type>,
            )*
        }

        impl $struct_name {
            pub fn new() -> Self {
                Self {
                    $(
                        $field_name: $crate::event::ListenerList::new(),
                    )*
                }
            }
        }
    };
}

pub(crate) use define_event_listeners;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct Ping(u32);
    impl Event for Ping {}

    define_event_listeners!(TestEvents {
        on_ping: Ping,
    });

    #[test]
    fn listeners_fire_in_registration_order() {
        let events = TestEvents::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (seen.clone(), seen.clone());

        let _first = Listener::new(&events.on_ping, move |e: &Ping| a.lock().unwrap().push(("a", e.0)));
        let _second = Listener::new(&events.on_ping, move |e: &Ping| b.lock().unwrap().push(("b", e.0)));

        events.on_ping.dispatch(&Ping(7));
        assert_eq!(*seen.lock().unwrap(), vec![("a", 7), ("b", 7)]);
    }

    #[test]
    fn dropped_listeners_are_swept_on_dispatch() {
        let events = TestEvents::new();
        {
            let _temp = Listener::new(&events.on_ping, |_| {});
            assert_eq!(events.on_ping.inner.len(), 1);
        }
        events.on_ping.dispatch(&Ping(0));
        assert_eq!(events.on_ping.inner.len(), 0);
    }
}
