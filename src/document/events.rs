//! Typed change notifications emitted after successful edits.
//!
//! Subscribers are plain callbacks invoked synchronously on the editing thread, after the
//! buffer and all wrappers are consistent again. A panicking subscriber is isolated with
//! `catch_unwind`: the edit that triggered the event has already succeeded and must not
//! be failed retroactively by an observer.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::pe::DirEntry;

/// A change that happened to the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocEvent {
    /// Bytes were overwritten in place.
    Modified {
        /// Start of the overwritten range.
        offset: u64,
        /// Length of the overwritten range.
        size: u64,
    },
    /// The buffer length changed.
    Resized {
        /// Length before the edit.
        old_size: u64,
        /// Length after the edit.
        new_size: u64,
    },
    /// The section table changed (section added or headers rewritten).
    SectionsChanged,
    /// A data directory's content and table entry moved.
    DirectoryMoved(DirEntry),
    /// The top undo step was reverted.
    Undone,
    /// The buffer was flushed to disk.
    Saved,
}

type Callback = Box<dyn Fn(&DocEvent) + Send + Sync>;

/// Subscriber registry with panic-isolated dispatch.
#[derive(Default)]
pub struct EventHub {
    subscribers: Vec<Callback>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl EventHub {
    /// Registers a callback for all future events.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: Fn(&DocEvent) + Send + Sync + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    /// Delivers an event to every subscriber, swallowing subscriber panics.
    pub fn emit(&self, event: &DocEvent) {
        for subscriber in &self.subscribers {
            let _ = catch_unwind(AssertUnwindSafe(|| subscriber(event)));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::*;

    #[test]
    fn delivers_to_all_subscribers() {
        let mut hub = EventHub::default();
        let seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
            });
        }

        hub.emit(&DocEvent::Saved);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let mut hub = EventHub::default();
        let seen = Arc::new(AtomicUsize::new(0));

        hub.subscribe(|_| panic!("observer bug"));
        {
            let seen = Arc::clone(&seen);
            hub.subscribe(move |event| {
                if matches!(event, DocEvent::Undone) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
            });
        }

        hub.emit(&DocEvent::Undone);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
