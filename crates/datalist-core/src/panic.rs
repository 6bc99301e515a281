#![forbid(unsafe_code)]

//! Panic containment for user callbacks.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Render a panic payload as text.
#[must_use]
pub fn describe(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

/// Run `f`, converting a panic into its description.
pub fn contain<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| describe(payload.as_ref()))
}
