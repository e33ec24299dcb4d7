//! Hooks and extensions, lifecycle half (spec.md §4.8). The plugin-loading
//! half (`fd_ext_entry`/`fd_ext_fini`) lives in `extension`; this module is
//! the registration/dispatch surface a loaded extension (or in-process
//! code) uses to observe lifecycle events, plus the per-message opaque
//! data slot model.

use crate::diameter::DiameterMessage;
use crate::peer::Peer;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// The hookable event types spec.md §4.8 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookType {
    MessageReceived,
    MessageSent,
    MessageRoutedLocally,
    MessageRoutedForward,
    MessageDropped,
    PeerConnected,
    PeerDisconnected,
}

/// A hook callback's view of the event: the message involved (if any), the
/// peer involved (if any), and a free-form "other" string for context that
/// doesn't warrant its own field (e.g. a drop reason).
pub struct HookEvent<'a> {
    pub hook_type: HookType,
    pub msg: Option<&'a DiameterMessage>,
    pub peer: Option<&'a Arc<Peer>>,
    pub other: Option<&'a str>,
}

pub type HookCallback = Box<dyn Fn(&HookEvent) + Send + Sync>;

struct Registration {
    mask: Vec<HookType>,
    callback: HookCallback,
}

/// Per-hook-type priority-ordered callback lists, one rwlock per type
/// (spec.md §5 "Hook registration uses a rwlock per hook type; held read
/// on every hook call").
#[derive(Default)]
pub struct HookRegistry {
    registrations: RwLock<Vec<Registration>>,
    pmd: RwLock<HashMap<MessageId, PerMessageData>>,
}

/// Stand-in identity for a message's opaque-data slot set. Messages don't
/// carry a stable identity of their own (they move by value between
/// components), so callers that need per-message data obtain one via
/// [`HookRegistry::pmd_handle`] and thread it alongside the message.
pub type MessageId = u64;

pub type HandleId = u32;

#[derive(Default)]
struct PerMessageData {
    slots: HashMap<HandleId, Box<dyn Any + Send>>,
}

impl HookRegistry {
    pub fn new() -> HookRegistry {
        HookRegistry::default()
    }

    /// Registers `callback` for every `HookType` in `mask`.
    pub async fn register(&self, mask: Vec<HookType>, callback: HookCallback) {
        self.registrations
            .write()
            .await
            .push(Registration { mask, callback });
    }

    /// Invokes every registered callback whose mask matches `event.hook_type`.
    pub async fn fire(&self, event: HookEvent<'_>) {
        let regs = self.registrations.read().await;
        for reg in regs.iter() {
            if reg.mask.contains(&event.hook_type) {
                (reg.callback)(&event);
            }
        }
    }

    /// Lazily allocates (via `init`) the slot `handle` on message `id`, or
    /// returns the existing one. Fini is invoked by [`HookRegistry::free_message`]
    /// when the message is destroyed, matching spec.md §4.8's lazy-init /
    /// free-on-destroy lifecycle.
    pub async fn pmd_handle<T, F>(&self, id: MessageId, handle: HandleId, init: F) -> ()
    where
        T: Any + Send + 'static,
        F: FnOnce() -> T,
    {
        let mut pmd = self.pmd.write().await;
        let entry = pmd.entry(id).or_default();
        entry.slots.entry(handle).or_insert_with(|| Box::new(init()));
    }

    pub async fn free_message(&self, id: MessageId) {
        self.pmd.write().await.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fire_invokes_matching_mask_only() {
        let registry = HookRegistry::new();
        let received = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&received);
        registry
            .register(
                vec![HookType::MessageReceived],
                Box::new(move |_| {
                    r.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;
        let d = Arc::clone(&dropped);
        registry
            .register(
                vec![HookType::MessageDropped],
                Box::new(move |_| {
                    d.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;

        registry
            .fire(HookEvent {
                hook_type: HookType::MessageReceived,
                msg: None,
                peer: None,
                other: None,
            })
            .await;

        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_pmd_lazy_init_and_free() {
        let registry = HookRegistry::new();
        registry.pmd_handle::<u32, _>(1, 7, || 42).await;
        registry.pmd_handle::<u32, _>(1, 7, || 99).await; // second touch keeps first value
        {
            let pmd = registry.pmd.read().await;
            let slot = pmd.get(&1).unwrap().slots.get(&7).unwrap();
            assert_eq!(*slot.downcast_ref::<u32>().unwrap(), 42);
        }
        registry.free_message(1).await;
        assert!(registry.pmd.read().await.get(&1).is_none());
    }
}
