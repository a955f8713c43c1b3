#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod slot_group;

/// Key and hash capabilities the table is generic over, plus the bundled
/// hash functions.
pub mod table_trait;

/// The two-way table itself.
///
/// This module provides [`TwoWayTable`], a fixed-bucket open-addressing
/// table that places every key in the less full of two candidate groups.
pub mod two_way_table;

#[cfg(feature = "stats")]
pub mod stats;

pub use slot_group::CACHE_LINE;
#[cfg(feature = "stats")]
pub use stats::DebugStats;
#[cfg(feature = "stats")]
pub use stats::GroupHistogram;
#[cfg(feature = "foldhash")]
pub use table_trait::FoldHash;
#[cfg(feature = "squirrel3")]
pub use table_trait::Squirrel3;
pub use table_trait::TableKey;
pub use table_trait::TableTrait;
pub use table_trait::squirrel3;
pub use two_way_table::MIN_CAPACITY;
pub use two_way_table::TwoWayTable;
