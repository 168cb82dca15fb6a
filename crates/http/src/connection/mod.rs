//! Connection driving.
//!
//! [`HttpConnection`] is the top-level driver; [`upgrade`] is the public
//! surface of the `101 Switching Protocols` handoff. The reader and writer
//! halves and the per-request [`Exchange`] are internal.

mod channel;
mod http_connection;
mod reader;
pub mod upgrade;
mod writer;

pub use http_connection::HttpConnection;

pub(crate) use channel::Exchange;
pub(crate) use reader::RequestReader;
pub(crate) use writer::ResponseWriter;
