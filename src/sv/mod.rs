pub mod access;
pub mod authorization;
pub mod channel;
pub mod invite;
pub mod revoker;
pub mod subscriber;
#[cfg(test)]
pub mod test_utils;
pub mod verification;

pub use access::Access;
pub use authorization::Authorizations;
pub use channel::Channels;
pub use invite::Invites;
pub use revoker::{RevokeScope, Revoker};
pub use subscriber::Subscribers;
pub use verification::Verification;
