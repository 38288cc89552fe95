//! Media models, title parsing and the in-memory library indexes.

pub mod index;
pub mod media;
pub mod parser;
pub mod search;

pub use index::{LibraryIndex, LibraryStats, LibraryView};
pub use media::{MediaItem, MediaKind, Series};
pub use parser::ParsedTitle;
pub use search::{SearchHit, SearchIndex};
