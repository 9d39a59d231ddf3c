//! Dispatch middleware
//!
//! Middlewares run in registration order before every dispatch and may
//! veto it, fail it, or remove themselves from the chain.

use async_trait::async_trait;
use std::sync::Arc;

use crate::action::Action;
use crate::error::RxError;
use crate::store::StoreModel;

#[derive(Debug)]
pub enum MiddlewareOutcome {
    /// Pass the action on to the next middleware
    Continue,
    /// Abandon the dispatch silently
    Cancel,
    /// Remove this middleware from the chain, then continue
    Deactivate,
    /// Fail the dispatch with this error
    Error(RxError),
}

#[async_trait]
pub trait Middleware<M: StoreModel>: Send + Sync {
    async fn handle(&self, action: Option<&Action<M::Action>>) -> MiddlewareOutcome;
}

#[async_trait]
impl<M, F> Middleware<M> for F
where
    M: StoreModel,
    F: Fn(Option<&Action<M::Action>>) -> MiddlewareOutcome + Send + Sync,
{
    async fn handle(&self, action: Option<&Action<M::Action>>) -> MiddlewareOutcome {
        (self)(action)
    }
}

/// Identity comparison that ignores vtable addresses
pub(crate) fn same_middleware<M: StoreModel>(a: &Arc<dyn Middleware<M>>, b: &Arc<dyn Middleware<M>>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}
