//! Panic boundary around reconciliation passes.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::error;

/// Run one reconciliation pass, turning a panic into `None` so the calling
/// thread keeps serving.  The reconciler gate does not poison, so later
/// passes still run.
pub(crate) fn isolate_pass<T>(pass: &str, run: impl FnOnce() -> Option<T>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(result) => result,
        Err(payload) => {
            error!(pass, message = %panic_message(payload.as_ref()), "reconciliation pass panicked");
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
