//! Request body plumbing.
//!
//! [`ReqBody`] is what handlers see; [`body_channel`] is the demand-driven
//! bridge that keeps the connection task from reading ahead of them.

mod body_channel;
mod req_body;

pub(crate) use body_channel::BodySender;
pub use req_body::ReqBody;
