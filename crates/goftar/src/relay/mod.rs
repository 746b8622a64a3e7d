mod classify;
mod frames;
mod machine;
pub mod messages;
mod sse;
mod upstream;

pub use classify::{UpstreamEvent, classify};
pub use frames::ClientFrame;
pub use machine::{Relay, RelayState, StreamSession};
pub use sse::{JsonAccumulator, LineBuffer, SseLine, parse_line};
pub use upstream::{
    ByteStream, ConnectOutcome, FaultKind, HttpUpstream, StreamFault, StreamRequest,
    UpstreamClient,
};
