//! Handles the dispatching of alerts to notification channels.
//!
//! Channels are value objects resolved at publish time; the `Dispatcher`
//! turns an alert into one publish call against a `Publisher` capability.
pub mod channel;
pub mod dispatcher;
pub mod sns;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use channel::{ChannelError, ChannelSet, NotificationChannel, Severity};
pub use dispatcher::{DispatchError, Dispatcher};
