//! Memory-mapped files and the guards that make remapping safe.

mod accessor;
mod allocator;
mod map;

pub use accessor::Accessor;
pub use allocator::Allocator;
pub use map::MemoryMap;
