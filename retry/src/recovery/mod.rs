//! Failure recovery
//!
//! - [`RecoveryRouter`] picks retry or dead-letter from the `x-death` count
//! - [`RepublishRecoverer`] does the republishing for each destination
//! - [`RetryInterceptor`] applies the router to a consumer's handler

mod interceptor;
mod republish;
mod router;

pub use interceptor::{Disposition, MessageHandler, RetryInterceptor};
pub use republish::{
    Cause, MessageRecoverer, RepublishRecoverer, Route, RouteFn, dead_letter_route,
    prefixed_route, retry_route,
};
pub use router::{RecoveryOutcome, RecoveryRouter};
