//! Callback and promise forms of every async operation.
//!
//! Each operation is implemented once as `async fn op(..) -> Outcome<T, Error>`.
//! Two thin adapters sit on top:
//!
//! - `op_async(..)` returns a [`Promise`], a boxed future resolving to
//!   `Result<T, Error>`.
//! - `op_cb(.., callback)` drives the operation and hands the same
//!   `Result<T, Error>` to `callback` exactly once through a [`Completion`].
//!
//! Cancellation and panics surface as [`Error::Cancelled`] and
//! [`Error::Panicked`] in both forms, so a caller sees the same value whichever
//! form it picks.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use ormlink_core::{Error, Outcome, Result, into_result};

/// A pending operation resolving to `Result<T, Error>`.
pub type Promise<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a>>;

/// Box an operation into a [`Promise`].
pub fn promise<'a, T: 'a>(operation: impl Future<Output = Outcome<T, Error>> + 'a) -> Promise<'a, T> {
    Box::pin(async move { into_result(operation.await) })
}

/// Run an operation and deliver its result to `callback`.
pub async fn complete<T>(
    operation: impl Future<Output = Outcome<T, Error>>,
    callback: impl FnOnce(Result<T>),
) {
    let mut completion = Completion::new(callback);
    completion.signal(into_result(operation.await));
}

/// A single-use completion signal.
///
/// The first [`signal`](Completion::signal) invokes the callback; later ones
/// are dropped with a warning.
pub struct Completion<'a, T> {
    callback: Option<Box<dyn FnOnce(Result<T>) + 'a>>,
}

impl<T> fmt::Debug for Completion<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.callback.is_some())
            .finish()
    }
}

impl<'a, T> Completion<'a, T> {
    /// Wrap a callback.
    pub fn new(callback: impl FnOnce(Result<T>) + 'a) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }

    /// Deliver `result`. Returns `false` if the completion already fired.
    pub fn signal(&mut self, result: Result<T>) -> bool {
        match self.callback.take() {
            Some(callback) => {
                callback(result);
                true
            }
            None => {
                tracing::warn!(
                    ok = result.is_ok(),
                    "Completion signalled more than once; ignoring"
                );
                false
            }
        }
    }

    /// Whether the completion has not fired yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.callback.is_some()
    }
}

impl<T> Drop for Completion<'_, T> {
    fn drop(&mut self) {
        if self.callback.is_some() {
            tracing::debug!("Completion dropped before the operation finished");
        }
    }
}

/// Generate the `_async` and `_cb` forms for methods taking `&self, cx` plus
/// owned arguments.
macro_rules! promise_and_callback {
    ($(
        $core:ident => $promise:ident, $callback:ident ( $($arg:ident : $ty:ty),* ) -> $ret:ty;
    )+) => {
        $(
            #[doc = concat!("Promise form of [`", stringify!($core), "`](Self::", stringify!($core), ").")]
            pub fn $promise<'a>(
                &'a self,
                cx: &'a $crate::Cx
                $(, $arg: $ty)*
            ) -> $crate::facade::Promise<'a, $ret> {
                $crate::facade::promise(self.$core(cx $(, $arg)*))
            }

            #[doc = concat!("Callback form of [`", stringify!($core), "`](Self::", stringify!($core), ").")]
            pub async fn $callback(
                &self,
                cx: &$crate::Cx
                $(, $arg: $ty)*,
                callback: impl FnOnce($crate::Result<$ret>),
            ) {
                $crate::facade::complete(self.$core(cx $(, $arg)*), callback).await;
            }
        )+
    };
}

pub(crate) use promise_and_callback;
