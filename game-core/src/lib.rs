pub mod dice;
pub mod engine;
pub mod scoring;

// Re-export main components
pub use dice::*;
pub use engine::*;
pub use scoring::*;
