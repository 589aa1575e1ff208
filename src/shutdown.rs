//! Cleanup hook run when the tool is told to terminate.
//!
//! The supervisor re-registers its hook whenever the set of live children changes;
//! the signal listener (and the quit path) call `run_once`, which runs the latest
//! hook at most once no matter how many signals arrive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

type Hook = Box<dyn Fn() + Send + Sync>;

#[derive(Clone, Default)]
pub struct ShutdownHooks {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    hook: Mutex<Option<Hook>>,
    fired: AtomicBool,
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the current hook.
    pub fn register(&self, hook: impl Fn() + Send + Sync + 'static) {
        let mut slot = match self.inner.hook.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(Box::new(hook));
    }

    /// Runs the latest hook if no earlier call did. Returns whether it ran.
    pub fn run_once(&self) -> bool {
        if self.inner.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        let hook = match self.inner.hook.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(hook) = hook {
            hook();
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ShutdownHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHooks")
            .field("fired", &self.has_fired())
            .finish()
    }
}
