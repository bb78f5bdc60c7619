//! Push-style updates from the backend.

mod backoff;
mod channel;
mod transport;

pub use backoff::{Backoff, BackoffConfig};
pub use channel::{Handlers, RealtimeChannel};
pub use transport::{ndjson_frames, Frame, FrameStream, HttpStreamTransport, Topic, Transport};
