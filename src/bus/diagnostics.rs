//! Isolation and reporting of listener failures.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::ListenerResult;
use crate::types::ListenerHandle;

/// A listener that returned an error or panicked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerFailure {
    /// Event name, or the DOM event type for delegated bindings.
    pub event: String,
    pub handle: ListenerHandle,
    pub message: String,
    pub panicked: bool,
}

/// Callback receiving every [`ListenerFailure`].
pub type ErrorHook = Rc<dyn Fn(&ListenerFailure)>;

/// Runs listeners so that a failing one never reaches the emitter.
#[derive(Default)]
pub(crate) struct Diagnostics {
    hook: Option<ErrorHook>,
    failures: Cell<u64>,
}

impl Diagnostics {
    pub(crate) fn new(hook: Option<ErrorHook>) -> Self {
        Self {
            hook,
            failures: Cell::new(0),
        }
    }

    pub(crate) fn failures(&self) -> u64 {
        self.failures.get()
    }

    /// Run one listener, catching both returned errors and panics.
    pub(crate) fn invoke(
        &self,
        event: &str,
        handle: ListenerHandle,
        listener: impl FnOnce() -> ListenerResult,
    ) {
        let (message, panicked) = match panic::catch_unwind(AssertUnwindSafe(listener)) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => (e.to_string(), false),
            Err(payload) => (panic_message(payload.as_ref()), true),
        };

        self.report(ListenerFailure {
            event: event.to_string(),
            handle,
            message,
            panicked,
        });
    }

    fn report(&self, failure: ListenerFailure) {
        self.failures.set(self.failures.get() + 1);
        tracing::warn!(
            event = %failure.event,
            handle = %failure.handle,
            panicked = failure.panicked,
            error = %failure.message,
            "listener failed"
        );
        if let Some(hook) = &self.hook {
            hook(&failure);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "listener panicked".to_string()
    }
}
