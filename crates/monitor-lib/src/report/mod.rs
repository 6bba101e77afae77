//! Resource reporting: size resolution, per-resource aggregation and
//! name filtering

mod aggregator;
mod filter;
mod lookup;

pub use aggregator::aggregate;
pub use filter::NameFilter;
pub use lookup::{InventoryFile, NoLookup, ResourceKind, ResourceRef, SizeCache, SizeLookup};
