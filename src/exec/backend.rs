// src/exec/backend.rs

//! Pluggable dispatch backend abstraction.
//!
//! The launch controller and both runtime feeders talk to a [`Dispatcher`]
//! instead of spawning processes themselves. Production uses
//! [`CommandDispatcher`](super::CommandDispatcher); tests provide a fake that
//! records calls and simulates failures without process spawning.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::convoy::StrandedConvoy;
use crate::errors::Result;

pub type DispatchFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Trait abstracting how work is handed off and how stranded convoys are
/// discovered.
///
/// Every call is bound to `cancel`; implementations must give up promptly
/// once it fires.
pub trait Dispatcher: Send + Sync + Debug {
    /// Hand `item` to an agent in `target`. Failure is non-fatal to callers.
    fn dispatch<'a>(
        &'a self,
        item: &'a str,
        target: &'a str,
        cancel: &'a CancellationToken,
    ) -> DispatchFuture<'a, ()>;

    /// Open convoys with ready but undispatched work.
    fn query_stranded<'a>(&'a self, cancel: &'a CancellationToken) -> DispatchFuture<'a, Vec<StrandedConvoy>>;

    /// Ask for an auto-close check of `convoy`.
    fn check_convoy<'a>(&'a self, convoy: &'a str, cancel: &'a CancellationToken) -> DispatchFuture<'a, ()>;
}
