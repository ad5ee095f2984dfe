//! Forwarding Dispatcher (spec.md §4.6): decides, per incoming actor call,
//! whether the destination's local handler is authoritative yet or the
//! request still needs to go to the source's partition primary.

mod error;
mod predicate;
mod router;

pub use error::ForwardError;
pub use predicate::{ForwardingPredicate, MetadataForwardingPredicate};
pub use router::{forward_or_handle, ActorCallRouter};
