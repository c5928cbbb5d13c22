pub mod prelude;
pub mod rooms;
