//! Transport layer: message framing over stdio (C5).

pub mod framing;
