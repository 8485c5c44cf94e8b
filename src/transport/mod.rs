//! Byte-stream framing and request/response correlation.
//!
//! Two small pieces sit between the raw subprocess pipes and the session:
//!
//! - [`FrameBuffer`] turns arbitrarily chunked stdout bytes into complete
//!   newline-terminated messages.
//! - [`PendingCalls`] maps request ids to in-flight completion handles so a
//!   response arriving in any order settles exactly the call that produced
//!   its id.

mod framing;
mod pending;

pub use framing::FrameBuffer;
pub use pending::PendingCalls;
