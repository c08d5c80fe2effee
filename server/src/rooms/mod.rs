//! Room membership and playback fan-out.

pub mod registry;
pub mod relay;

pub use registry::{RoomError, RoomId, RoomRegistry};
pub use relay::CommandRelay;
