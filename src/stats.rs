//! Low-level occupancy and probe statistics.
//!
//! Only compiled with the `stats` feature.

use alloc::vec;
use alloc::vec::Vec;

use crate::table_trait::TableTrait;
use crate::two_way_table::TwoWayTable;

/// Number of slot groups at each fill level.
///
/// `counts()[n]` is the number of groups holding exactly `n` entries, for `n`
/// in `0..=BUCKET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupHistogram {
    counts: Vec<usize>,
}

impl GroupHistogram {
    /// Groups per fill level.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Number of completely full groups.
    pub fn full_groups(&self) -> usize {
        self.counts.last().copied().unwrap_or(0)
    }

    /// Pretty-prints the histogram as a horizontal bar chart on stdout.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("group histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!(
            "group histogram ({} groups):",
            self.counts.iter().sum::<usize>()
        );

        let make_bar = |count: usize| -> String {
            if count == 0 {
                return String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let full = units / 8;
            let rem = units % 8;
            let mut bar = "█".repeat(full);
            if rem > 0 {
                bar.push(['▏', '▎', '▍', '▌', '▋', '▊', '▉'][rem - 1]);
            }
            bar
        };

        for (fill, &count) in self.counts.iter().enumerate() {
            println!("{:>2} | {} ({})", fill, make_bar(count), count);
        }
    }
}

/// Snapshot of a table's utilization and lookup cost.
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of entries in the table
    pub populated: usize,
    /// Number of slot groups
    pub groups: usize,
    /// Slots per group
    pub bucket: usize,
    /// Total number of slots allocated
    pub total_slots: usize,
    /// Number of groups with no free slot
    pub full_groups: usize,
    /// Slot utilization (populated / total_slots)
    pub slot_utilization: f64,
    /// Average comparisons needed to find each stored key
    pub mean_probes: f64,
    /// Worst-case comparisons needed to find a stored key
    pub max_probes: u64,
    /// Bytes reported by `memory_usage`
    pub total_bytes: usize,
    /// Bytes spent on empty slots
    pub wasted_bytes: usize,
}

impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Two-Way Table Debug Statistics ===");
        println!(
            "Population: {} entries in {} groups of {}",
            self.populated, self.groups, self.bucket
        );
        println!(
            "Slot Usage: {}/{} ({:.2}% utilization), {} full groups",
            self.populated,
            self.total_slots,
            self.slot_utilization * 100.0,
            self.full_groups
        );
        println!(
            "Probes: {:.3} mean, {} max",
            self.mean_probes, self.max_probes
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

impl<T: TableTrait, const BUCKET: usize> TwoWayTable<T, BUCKET> {
    /// Counts the groups at each fill level.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// for key in 0..20u64 {
    ///     table.insert(key, key);
    /// }
    ///
    /// let histogram = table.group_histogram();
    /// assert_eq!(histogram.counts().len(), 5);
    /// assert_eq!(histogram.counts().iter().sum::<usize>(), table.capacity());
    /// ```
    pub fn group_histogram(&self) -> GroupHistogram {
        let mut counts = vec![0usize; BUCKET + 1];
        for group in self.groups() {
            counts[group.fill_count()] += 1;
        }
        GroupHistogram { counts }
    }

    /// Returns utilization and probe statistics.
    ///
    /// Looks up every stored key once, so this costs a full pass over the
    /// table.
    pub fn debug_stats(&self) -> DebugStats {
        let total_slots = self.capacity() * BUCKET;
        let mut full_groups = 0;
        let mut total_probes = 0u64;
        let mut max_probes = 0u64;

        for group in self.groups() {
            let n = group.fill_count();
            if n == BUCKET {
                full_groups += 1;
            }
            for &key in &group.keys[..n] {
                let mut probes = 0;
                self.contains(key, &mut probes);
                total_probes += probes;
                max_probes = max_probes.max(probes);
            }
        }

        DebugStats {
            populated: self.size(),
            groups: self.capacity(),
            bucket: BUCKET,
            total_slots,
            full_groups,
            slot_utilization: if total_slots == 0 {
                0.0
            } else {
                self.size() as f64 / total_slots as f64
            },
            mean_probes: if self.is_empty() {
                0.0
            } else {
                total_probes as f64 / self.size() as f64
            },
            max_probes,
            total_bytes: self.memory_usage(),
            wasted_bytes: (total_slots - self.size())
                * (core::mem::size_of::<T::Key>() + core::mem::size_of::<T::Value>()),
        }
    }
}
