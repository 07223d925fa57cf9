//! Key set cache keyed by source URI.

pub mod entry;
pub mod store;
