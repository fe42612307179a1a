//! Change notification hub.
//!
//! Surfaces that derive state from the email collection (folder badges, list
//! views) register a callback here; the repository calls [`ChangeHub::notify`]
//! after every successful mutation so they can re-query.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

pub type Listener = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    key: u64,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<Vec<Registration>>,
    next_key: AtomicU64,
}

/// Ordered observer registry. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct ChangeHub {
    registry: Arc<Registry>,
}

static GLOBAL_HUB: OnceLock<ChangeHub> = OnceLock::new();

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide hub, created on first use.
    pub fn global() -> &'static ChangeHub {
        GLOBAL_HUB.get_or_init(ChangeHub::new)
    }

    /// Register `listener`. Registering the same closure twice yields two
    /// independent registrations, each invoked on every notify.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let key = self.registry.next_key.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Registration {
            key,
            listener: Arc::new(listener),
        });
        tracing::debug!("Change listener {} subscribed", key);

        Subscription {
            key,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every registered listener in registration order.
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may subscribe or unsubscribe from inside their callback. A listener that
    /// panics is logged and skipped; the rest still run.
    pub fn notify(&self) {
        let snapshot: Vec<(u64, Listener)> = self
            .lock()
            .iter()
            .map(|r| (r.key, r.listener.clone()))
            .collect();

        for (key, listener) in snapshot {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| (*listener)())) {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!("Error in change listener {}: {}", key, reason);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Registration>> {
        // A poisoned registry only means a subscribe/unsubscribe panicked
        // mid-push; the Vec itself is still consistent.
        self.registry
            .entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Handle returned by [`ChangeHub::subscribe`].
///
/// Dropping it does not unsubscribe; call [`Subscription::unsubscribe`].
pub struct Subscription {
    key: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Remove exactly this registration. Calling it again is a no-op.
    pub fn unsubscribe(&self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut entries = registry
                .entries
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            entries.retain(|r| r.key != self.key);
            tracing::debug!("Change listener {} unsubscribed", self.key);
        }
    }
}
