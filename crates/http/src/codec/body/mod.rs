//! Body framing codecs.
//!
//! Decoding side: [`PayloadDecoder`] picks between fixed-length, chunked and
//! empty framings. Encoding side: [`ChunkedEncoder`] writes chunk framing
//! into a dedicated framing buffer (the data itself is scatter-written, not
//! copied) and [`LengthEncoder`] accounts declared-versus-written bytes.

pub(crate) mod chunked_decoder;
pub(crate) mod chunked_encoder;
pub(crate) mod length_decoder;
pub(crate) mod length_encoder;
mod payload_decoder;

pub use chunked_encoder::ChunkedEncoder;
pub use length_encoder::LengthEncoder;
pub use payload_decoder::PayloadDecoder;
