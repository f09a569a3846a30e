//! Cooperative cancellation passed explicitly through every build step.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

type Handler = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct HandlerTable {
    next_id: u64,
    handlers: Vec<(u64, Handler)>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    handlers: Mutex<HandlerTable>,
}

impl Inner {
    fn table(&self) -> MutexGuard<'_, HandlerTable> {
        match self.handlers.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Shared cancellation flag with one-shot handlers.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Requests cancellation. Registered handlers run once, on the calling thread.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let handlers = std::mem::take(&mut self.inner.table().handlers);
        for (_, handler) in handlers {
            handler();
        }
    }

    /// Registers `handler` to run when cancellation is requested.
    ///
    /// If the token is already cancelled the handler runs immediately. Dropping
    /// the returned registration unregisters a handler that has not run yet.
    pub fn on_cancel<F>(&self, handler: F) -> CancelRegistration
    where
        F: FnOnce() + Send + 'static,
    {
        let mut table = self.inner.table();
        if self.is_cancelled() {
            drop(table);
            handler();
            return CancelRegistration {
                token: Weak::new(),
                id: 0,
            };
        }
        table.next_id += 1;
        let id = table.next_id;
        table.handlers.push((id, Box::new(handler)));
        CancelRegistration {
            token: Arc::downgrade(&self.inner),
            id,
        }
    }
}

#[must_use = "dropping the registration unregisters the handler"]
pub struct CancelRegistration {
    token: Weak<Inner>,
    id: u64,
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let Some(inner) = self.token.upgrade() {
            inner.table().handlers.retain(|(id, _)| *id != self.id);
        }
    }
}
