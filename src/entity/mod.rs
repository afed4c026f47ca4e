pub mod authorization_log;
pub mod authorized_user;
pub mod channel;
pub mod invite_link;
pub mod subscriber;

pub use authorization_log::LogAction;
pub use subscriber::{Origin, SubscriberStatus};
