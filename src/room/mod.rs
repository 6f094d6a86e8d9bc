pub mod actor;
pub mod registry;
pub mod state;

pub use actor::{Command, JoinResult, RoomHandle};
pub use registry::RoomRegistry;
