pub mod gateway;
pub mod sync;

pub use gateway::{NoopHints, PeerHints, RoomGateway};
pub use sync::{SyncCoordinator, SyncEvent};
