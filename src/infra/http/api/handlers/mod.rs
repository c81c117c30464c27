//! API handlers organized by resource type.

mod applications;
mod flags;
mod tags;

pub use applications::*;
pub use flags::*;
pub use tags::*;
