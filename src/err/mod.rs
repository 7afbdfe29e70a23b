//! Error types for the wire codecs.
//!
//! Codec errors carry exactly the context needed to point at the
//! offending element; service level errors (resolver, transport,
//! daemons) live next to their modules.

mod layer;
pub use layer::*;

mod len_error;
pub use len_error::*;
