mod arena;
mod cell;
mod handle;
mod raw_cbtree;

pub use raw_cbtree::Cursor;
pub(crate) use raw_cbtree::RawCbTree;
