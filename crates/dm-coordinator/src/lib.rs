//! State-tracking coordinator for the domain mapper
//!
//! One [`StateTrackingCoordinator`] exists per mapping. It subscribes to the
//! upstream entity, keeps its latest [`Snapshot`](dm_core::Snapshot) and
//! fans every change out to the registered listeners, synchronously and in
//! registration order. Listener failures are logged and isolated.

mod coordinator;
mod error;
mod listener;

pub use coordinator::StateTrackingCoordinator;
pub use error::{CoordinatorError, ListenerError};
pub use listener::{ListenerId, UpdateCallback};
