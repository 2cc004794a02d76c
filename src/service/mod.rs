//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate database and federation operations.

mod account;
mod notification;
mod outbound;

pub use account::AccountService;
pub use notification::{NotificationEvent, NotificationService, NotificationSink};
pub use outbound::OutboundService;

#[cfg(test)]
pub use notification::MockNotificationSink;
