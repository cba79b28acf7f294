pub mod outcome;
pub mod patch;
pub mod scene;

pub use outcome::*;
pub use patch::*;
pub use scene::*;
