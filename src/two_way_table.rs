use core::fmt::Debug;
use core::marker::PhantomData;
use core::ops::AddAssign;

use crate::slot_group::GroupBuffer;
use crate::slot_group::SlotGroup;
use crate::slot_group::prefetch;
use crate::table_trait::TableKey;
use crate::table_trait::TableTrait;

/// Number of slot groups a new table starts with. Growth never goes below it.
pub const MIN_CAPACITY: usize = 8;

type Group<T, const BUCKET: usize> =
    SlotGroup<<T as TableTrait>::Key, <T as TableTrait>::Value, BUCKET>;

#[inline(always)]
fn group_indexes(hash: u64, mask: usize) -> (usize, usize) {
    (hash as usize & mask, (hash >> 32) as usize & mask)
}

/// Place an entry into the less full of its two candidate groups.
///
/// Returns `false`, leaving `groups` untouched, when both candidates are full.
#[inline(always)]
fn place<K: TableKey, V: Copy, const BUCKET: usize>(
    groups: &mut [SlotGroup<K, V, BUCKET>],
    hash: u64,
    key: K,
    value: V,
) -> bool {
    debug_assert!(groups.len().is_power_of_two());
    let (index_1, index_2) = group_indexes(hash, groups.len() - 1);

    // SAFETY: Both indexes are masked by `len - 1` and `len` is a power of two.
    let n_1 = unsafe { groups.get_unchecked(index_1) }.fill_count();
    // SAFETY: As above.
    let n_2 = unsafe { groups.get_unchecked(index_2) }.fill_count();
    if n_1 == BUCKET && n_2 == BUCKET {
        return false;
    }

    // Ties go to the first group.
    let (index, n) = if n_1 <= n_2 {
        (index_1, n_1)
    } else {
        (index_2, n_2)
    };
    // SAFETY: `index` is one of the two masked indexes above.
    unsafe { groups.get_unchecked_mut(index) }.push_at(n, key, value);
    true
}

/// A fixed-bucket, two-choice open-addressing hash table.
///
/// Every key hashes to two candidate slot groups: the low 32 bits of its hash
/// select one, the high 32 bits the other. An insert goes into whichever of
/// the two is less full. A lookup scans both groups in lockstep, slot 0 of the
/// first group, then slot 0 of the second, then slot 1 of each, and so on.
/// When both candidates of a new key are full the table doubles and rehashes
/// everything; there is no load-factor trigger.
///
/// Each group keeps its `BUCKET` keys and `BUCKET` values in two separate
/// arrays, and the whole group array is one cache-line aligned allocation.
///
/// ## Contracts
///
/// - `T::Key::EMPTY` marks unused slots and can never be inserted.
/// - [`insert`] does not check for duplicates. Inserting a key that is already
///   present stores a second, shadowed entry.
/// - The `_unchecked` operations trust that the key is present and scan
///   without bounds. Use [`get`], [`contains`], [`find`], or [`erase`] when
///   presence is not guaranteed.
///
/// ## Probe counting
///
/// Every lookup takes a `&mut u64` probe counter and increments it once per
/// key comparison, matched or not.
///
/// # Examples
///
/// ```rust
/// use two_way_hash::Squirrel3;
/// use two_way_hash::TwoWayTable;
///
/// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
/// for key in 1..=200u64 {
///     table.insert(key, key + 9);
/// }
///
/// let mut probes = 0;
/// assert_eq!(table.find(42, &mut probes), 51);
/// assert!(probes >= 1);
/// assert_eq!(table.size(), 200);
/// assert_eq!(table.sum_all_values(), (10..=209).sum::<u64>());
/// ```
///
/// [`insert`]: TwoWayTable::insert
/// [`get`]: TwoWayTable::get
/// [`contains`]: TwoWayTable::contains
/// [`find`]: TwoWayTable::find
/// [`erase`]: TwoWayTable::erase
pub struct TwoWayTable<T: TableTrait, const BUCKET: usize = 4> {
    groups: GroupBuffer<T::Key, T::Value, BUCKET>,
    mask: usize,
    size: usize,

    _phantom: PhantomData<fn() -> T>,
}

impl<T: TableTrait, const BUCKET: usize> Debug for TwoWayTable<T, BUCKET> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::string::String;
        use alloc::vec::Vec;

        f.debug_struct("TwoWayTable")
            .field(
                "groups",
                &self
                    .groups
                    .as_slice()
                    .iter()
                    .map(|group| {
                        let n = group.fill_count();
                        let mut row = String::with_capacity(BUCKET);
                        for slot in 0..BUCKET {
                            row.push(if slot < n { '#' } else { '.' });
                        }
                        row
                    })
                    .collect::<Vec<_>>(),
            )
            .field("size", &self.size)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<T: TableTrait, const BUCKET: usize> Clone for TwoWayTable<T, BUCKET> {
    fn clone(&self) -> Self {
        Self {
            groups: self.groups.clone(),
            mask: self.mask,
            size: self.size,
            _phantom: PhantomData,
        }
    }
}

impl<T: TableTrait, const BUCKET: usize> Default for TwoWayTable<T, BUCKET> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TableTrait, const BUCKET: usize> TwoWayTable<T, BUCKET> {
    /// Creates an empty table with [`MIN_CAPACITY`] slot groups.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let table = TwoWayTable::<Squirrel3<u32, u32>>::new();
    /// assert_eq!(table.capacity(), 8);
    /// assert!(table.is_empty());
    /// ```
    pub fn new() -> Self {
        Self::with_groups(MIN_CAPACITY)
    }

    /// Creates an empty table with at least `groups` slot groups.
    ///
    /// The count is rounded up to a power of two, and never below
    /// [`MIN_CAPACITY`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let table = TwoWayTable::<Squirrel3<u64, u64>>::with_groups(100);
    /// assert_eq!(table.capacity(), 128);
    /// ```
    pub fn with_groups(groups: usize) -> Self {
        let capacity = groups
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .expect("capacity overflow");

        Self {
            groups: GroupBuffer::new(capacity),
            mask: capacity - 1,
            size: 0,
            _phantom: PhantomData,
        }
    }

    /// Returns the number of slot groups. Always a power of two.
    pub fn capacity(&self) -> usize {
        self.groups.len()
    }

    /// Returns the number of entries in the table.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the number of entries in the table. Same as [`size`].
    ///
    /// [`size`]: TwoWayTable::size
    pub fn len(&self) -> usize {
        self.size
    }

    /// Returns `true` if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Estimated bytes owned by the table: the group array plus the table
    /// header itself.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// // 8 groups of 4 u64 keys and 4 u64 values.
    /// assert!(table.memory_usage() >= 8 * 64);
    /// ```
    pub fn memory_usage(&self) -> usize {
        self.capacity() * core::mem::size_of::<Group<T, BUCKET>>() + core::mem::size_of::<Self>()
    }

    #[cfg(any(test, feature = "stats"))]
    pub(crate) fn groups(&self) -> &[Group<T, BUCKET>] {
        self.groups.as_slice()
    }

    #[inline(always)]
    fn group(&self, index: usize) -> &Group<T, BUCKET> {
        debug_assert!(index <= self.mask);
        // SAFETY: Every index handed in is masked by `mask`, which is one less
        // than the power-of-two group count.
        unsafe { self.groups.as_slice().get_unchecked(index) }
    }

    #[inline(always)]
    fn group_mut(&mut self, index: usize) -> &mut Group<T, BUCKET> {
        debug_assert!(index <= self.mask);
        // SAFETY: See `group`.
        unsafe { self.groups.as_mut_slice().get_unchecked_mut(index) }
    }

    /// Hashes `key` with the table's hash function.
    #[inline(always)]
    pub fn hash_of(&self, key: T::Key) -> u64 {
        T::hash(key)
    }

    /// Inserts a new entry.
    ///
    /// The entry goes into the less full of the key's two candidate groups.
    /// If both are full, the table doubles first via [`grow`].
    ///
    /// The key must not already be present: no duplicate check is made, and a
    /// second insert of the same key leaves a shadowed entry behind. The key
    /// must not be `T::Key::EMPTY`; debug builds assert this.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<i32, u32>>::new();
    /// table.insert(-2, 20);
    /// assert_eq!(table.get(-2, &mut 0), Some(20));
    /// ```
    ///
    /// [`grow`]: TwoWayTable::grow
    #[inline]
    pub fn insert(&mut self, key: T::Key, value: T::Value) {
        debug_assert!(
            key != T::Key::EMPTY,
            "the empty sentinel cannot be used as a key"
        );

        let hash = T::hash(key);
        while !place(self.groups.as_mut_slice(), hash, key, value) {
            self.grow();
        }
        self.size += 1;
    }

    /// Doubles the number of groups and rehashes every entry into the new
    /// allocation.
    ///
    /// If an entry still finds both of its candidates full, the rehash starts
    /// over at double the size again. The old allocation is released only
    /// once the new one holds every entry.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// table.insert(1, 10);
    /// table.grow();
    /// assert_eq!(table.capacity(), 16);
    /// assert_eq!(table.find(1, &mut 0), 10);
    /// ```
    #[cold]
    pub fn grow(&mut self) {
        let mut capacity = self.capacity().checked_mul(2).expect("capacity overflow");

        loop {
            let mut groups = GroupBuffer::new(capacity);
            if let Some(size) = Self::rehash_into(self.groups.as_slice(), groups.as_mut_slice()) {
                debug_assert_eq!(size, self.size);
                self.groups = groups;
                self.mask = capacity - 1;
                self.size = size;
                return;
            }

            capacity = capacity.checked_mul(2).expect("capacity overflow");
        }
    }

    /// Reinsert every entry of `old` into `new`. Returns the number of entries
    /// moved, or `None` if some entry found both candidates full.
    fn rehash_into(old: &[Group<T, BUCKET>], new: &mut [Group<T, BUCKET>]) -> Option<usize> {
        let mut moved = 0;
        for group in old {
            for slot in 0..group.fill_count() {
                let key = group.keys[slot];
                // SAFETY: `slot` is below the group's fill count.
                let value = unsafe { group.value(slot) };
                if !place(new, T::hash(key), key, value) {
                    return None;
                }
                moved += 1;
            }
        }
        Some(moved)
    }

    /// Removes every entry, keeping the current capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// table.insert(10, 100);
    /// table.clear();
    /// assert!(!table.contains(10, &mut 0));
    /// assert_eq!(table.size(), 0);
    /// ```
    pub fn clear(&mut self) {
        for group in self.groups.as_mut_slice() {
            group.reset();
        }
        self.size = 0;
    }

    /// Alternating bounded scan. Stops after `BUCKET` slot pairs or at the
    /// first offset where both groups are empty.
    #[inline(always)]
    fn locate(&self, key: T::Key, hash: u64, probes: &mut u64) -> Option<(usize, usize)> {
        if key == T::Key::EMPTY {
            return None;
        }

        let (index_1, index_2) = group_indexes(hash, self.mask);
        let group_1 = self.group(index_1);
        let group_2 = self.group(index_2);
        for slot in 0..BUCKET {
            let key_1 = group_1.keys[slot];
            let key_2 = group_2.keys[slot];
            if key_1 == T::Key::EMPTY && key_2 == T::Key::EMPTY {
                break;
            }

            *probes += 1;
            if key_1 == key {
                return Some((index_1, slot));
            }
            *probes += 1;
            if key_2 == key {
                return Some((index_2, slot));
            }
        }

        None
    }

    /// Alternating scan with no bound and no sentinel check.
    ///
    /// # Safety
    ///
    /// `key` must be present in the table.
    #[inline(always)]
    unsafe fn locate_unchecked(&self, key: T::Key, hash: u64, probes: &mut u64) -> (usize, usize) {
        let (index_1, index_2) = group_indexes(hash, self.mask);
        let group_1 = self.group(index_1);
        let group_2 = self.group(index_2);
        let mut slot = 0;
        loop {
            debug_assert!(slot < BUCKET, "key not present in table");

            *probes += 1;
            // SAFETY: Caller ensures the key is present, so it sits at some
            // `slot < BUCKET` of one of the two groups and the scan stops there.
            if unsafe { *group_1.keys.get_unchecked(slot) } == key {
                return (index_1, slot);
            }
            *probes += 1;
            // SAFETY: As above.
            if unsafe { *group_2.keys.get_unchecked(slot) } == key {
                return (index_2, slot);
            }
            slot += 1;
        }
    }

    #[inline(always)]
    fn value_at(&self, (index, slot): (usize, usize)) -> T::Value {
        // SAFETY: `(index, slot)` came from a scan that matched a live key.
        unsafe { self.group(index).value(slot) }
    }

    /// Looks up `key`, returning its value if present.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// table.insert(7, 70);
    ///
    /// let mut probes = 0;
    /// assert_eq!(table.get(7, &mut probes), Some(70));
    /// assert_eq!(table.get(8, &mut probes), None);
    /// ```
    #[inline]
    pub fn get(&self, key: T::Key, probes: &mut u64) -> Option<T::Value> {
        self.get_indexed(key, T::hash(key), probes)
    }

    /// Returns `true` if `key` is present.
    ///
    /// The scan is bounded by the group width and stops early at the first
    /// offset where both candidate groups are empty.
    #[inline]
    pub fn contains(&self, key: T::Key, probes: &mut u64) -> bool {
        self.locate(key, T::hash(key), probes).is_some()
    }

    /// Returns the value stored under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` is not present. Use [`get`] for a fallible lookup, or
    /// [`find_unchecked`] to skip the bound entirely.
    ///
    /// [`get`]: TwoWayTable::get
    /// [`find_unchecked`]: TwoWayTable::find_unchecked
    #[inline]
    #[track_caller]
    pub fn find(&self, key: T::Key, probes: &mut u64) -> T::Value {
        self.find_indexed(key, T::hash(key), probes)
    }

    /// Returns the value stored under `key`, scanning without any bound.
    ///
    /// This is the raw lookup fast path: no sentinel check and no group-width
    /// limit, so its probe behavior is exactly that of the two-choice layout.
    ///
    /// # Safety
    ///
    /// `key` must be present in the table. An absent key makes the scan read
    /// past the end of its groups.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// table.insert(3, 30);
    ///
    /// let mut probes = 0;
    /// // SAFETY: 3 was inserted above.
    /// assert_eq!(unsafe { table.find_unchecked(3, &mut probes) }, 30);
    /// ```
    #[inline]
    pub unsafe fn find_unchecked(&self, key: T::Key, probes: &mut u64) -> T::Value {
        // SAFETY: Caller ensures `key` is present.
        unsafe { self.find_indexed_unchecked(key, T::hash(key), probes) }
    }

    /// Hashes `key` and prefetches both of its candidate groups, keys and
    /// values. Returns the hash for a later [`find_indexed`] or
    /// [`get_indexed`].
    ///
    /// Splitting a lookup this way lets a batch loop issue the memory requests
    /// for several keys before scanning any of them.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// for key in 0..32u64 {
    ///     table.insert(key, key * 2);
    /// }
    ///
    /// let keys = [4u64, 9, 17, 31];
    /// let hashes = keys.map(|key| table.prefetch(key));
    ///
    /// let mut probes = 0;
    /// let mut sum = 0;
    /// for (key, hash) in keys.into_iter().zip(hashes) {
    ///     sum += table.find_indexed(key, hash, &mut probes);
    /// }
    /// assert_eq!(sum, 2 * (4 + 9 + 17 + 31));
    /// ```
    ///
    /// [`find_indexed`]: TwoWayTable::find_indexed
    /// [`get_indexed`]: TwoWayTable::get_indexed
    #[inline]
    pub fn prefetch(&self, key: T::Key) -> u64 {
        let hash = T::hash(key);
        let (index_1, index_2) = group_indexes(hash, self.mask);
        let group_1 = self.group(index_1);
        let group_2 = self.group(index_2);
        prefetch(group_1.keys.as_ptr());
        prefetch(group_1.values.as_ptr());
        prefetch(group_2.keys.as_ptr());
        prefetch(group_2.values.as_ptr());
        hash
    }

    /// [`get`] with a precomputed hash, as returned by [`prefetch`].
    ///
    /// `hash` must be the table hash of `key`; any other value simply makes
    /// the lookup miss.
    ///
    /// [`get`]: TwoWayTable::get
    /// [`prefetch`]: TwoWayTable::prefetch
    #[inline]
    pub fn get_indexed(&self, key: T::Key, hash: u64, probes: &mut u64) -> Option<T::Value> {
        self.locate(key, hash, probes)
            .map(|position| self.value_at(position))
    }

    /// [`find`] with a precomputed hash, as returned by [`prefetch`].
    ///
    /// # Panics
    ///
    /// Panics if `key` is not found through `hash`.
    ///
    /// [`find`]: TwoWayTable::find
    /// [`prefetch`]: TwoWayTable::prefetch
    #[inline]
    #[track_caller]
    pub fn find_indexed(&self, key: T::Key, hash: u64, probes: &mut u64) -> T::Value {
        match self.locate(key, hash, probes) {
            Some(position) => self.value_at(position),
            None => missing_key(),
        }
    }

    /// [`find_unchecked`] with a precomputed hash, as returned by
    /// [`prefetch`].
    ///
    /// # Safety
    ///
    /// `key` must be present in the table and `hash` must be its table hash.
    ///
    /// [`find_unchecked`]: TwoWayTable::find_unchecked
    /// [`prefetch`]: TwoWayTable::prefetch
    #[inline]
    pub unsafe fn find_indexed_unchecked(
        &self,
        key: T::Key,
        hash: u64,
        probes: &mut u64,
    ) -> T::Value {
        // SAFETY: Caller ensures `key` is present under `hash`.
        let position = unsafe { self.locate_unchecked(key, hash, probes) };
        self.value_at(position)
    }

    /// Removes `key`, returning whether it was present.
    ///
    /// The rest of its group shifts left by one slot, so occupied slots stay
    /// packed at the front.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use two_way_hash::Squirrel3;
    /// # use two_way_hash::TwoWayTable;
    /// #
    /// let mut table = TwoWayTable::<Squirrel3<u64, u64>>::new();
    /// table.insert(1, 100);
    /// table.insert(2, 200);
    /// table.insert(3, 300);
    ///
    /// assert!(table.erase(2));
    /// assert!(!table.erase(2));
    /// assert!(!table.contains(2, &mut 0));
    /// assert_eq!(table.find(1, &mut 0), 100);
    /// assert_eq!(table.find(3, &mut 0), 300);
    /// assert_eq!(table.size(), 2);
    /// ```
    pub fn erase(&mut self, key: T::Key) -> bool {
        let mut probes = 0;
        match self.locate(key, T::hash(key), &mut probes) {
            Some((index, slot)) => {
                self.group_mut(index).remove_at(slot);
                self.size -= 1;
                true
            }
            None => false,
        }
    }

    /// Removes `key` without bounding the scan that finds it.
    ///
    /// # Safety
    ///
    /// `key` must be present in the table.
    pub unsafe fn erase_unchecked(&mut self, key: T::Key) {
        let mut probes = 0;
        // SAFETY: Caller ensures `key` is present.
        let (index, slot) = unsafe { self.locate_unchecked(key, T::hash(key), &mut probes) };
        self.group_mut(index).remove_at(slot);
        self.size -= 1;
    }
}

impl<T: TableTrait, const BUCKET: usize> TwoWayTable<T, BUCKET>
where
    T::Value: Default + AddAssign,
{
    /// Sums every stored value.
    ///
    /// Meant as a self-check: after a known workload the caller can compare
    /// the sum against an independently computed total.
    pub fn sum_all_values(&self) -> T::Value {
        let mut sum = T::Value::default();
        for group in self.groups.as_slice() {
            for slot in 0..group.fill_count() {
                // SAFETY: `slot` is below the group's fill count.
                sum += unsafe { group.value(slot) };
            }
        }
        sum
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn missing_key() -> ! {
    panic!("key not present in table")
}

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;
    use crate::table_trait::squirrel3;

    struct U64ToU64;

    impl TableTrait for U64ToU64 {
        type Key = u64;
        type Value = u64;

        fn hash(key: u64) -> u64 {
            squirrel3(key)
        }
    }

    struct I32ToU32;

    impl TableTrait for I32ToU32 {
        type Key = i32;
        type Value = u32;

        fn hash(key: i32) -> u64 {
            squirrel3(key as u64)
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct PairValue {
        a: u32,
        b: u32,
    }

    struct I64ToPair;

    impl TableTrait for I64ToPair {
        type Key = i64;
        type Value = PairValue;

        fn hash(key: i64) -> u64 {
            squirrel3(key as u64)
        }
    }

    struct SipU64;

    impl TableTrait for SipU64 {
        type Key = u64;
        type Value = u64;

        fn hash(key: u64) -> u64 {
            let mut h = SipHasher::new_with_keys(0x0123_4567, 0x89ab_cdef);
            h.write_u64(key);
            h.finish()
        }
    }

    /// Sends every key to groups 2 and 5.
    struct ConstantHash;

    impl TableTrait for ConstantHash {
        type Key = u64;
        type Value = u64;

        fn hash(_key: u64) -> u64 {
            (5 << 32) | 2
        }
    }

    fn check_invariants<T: TableTrait, const BUCKET: usize>(table: &TwoWayTable<T, BUCKET>) {
        assert!(table.capacity().is_power_of_two());
        assert!(table.capacity() >= MIN_CAPACITY);

        let mut live = 0;
        for (index, group) in table.groups().iter().enumerate() {
            let n = group.fill_count();
            assert!(
                group.keys[n..].iter().all(|&k| k == T::Key::EMPTY),
                "group {index} is not packed: {table:#?}"
            );
            for &key in &group.keys[..n] {
                let (index_1, index_2) = group_indexes(T::hash(key), table.capacity() - 1);
                assert!(index == index_1 || index == index_2);
            }
            live += n;
        }
        assert_eq!(live, table.size());
    }

    #[test]
    fn insert_find_contains() {
        let mut table = TwoWayTable::<I32ToU32>::new();
        let mut probes = 0;

        table.insert(1, 10);
        table.insert(-2, 20);
        table.insert(7, 30);

        assert!(table.contains(1, &mut probes));
        assert!(table.contains(-2, &mut probes));
        assert!(table.contains(7, &mut probes));

        assert_eq!(table.find(1, &mut probes), 10);
        assert_eq!(table.find(-2, &mut probes), 20);
        assert_eq!(table.find(7, &mut probes), 30);

        assert!(!table.contains(3, &mut probes));
        assert_eq!(table.get(3, &mut probes), None);
        check_invariants(&table);
    }

    #[test]
    fn erase_removes_key() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        let mut probes = 0;

        table.insert(1, 100);
        table.insert(2, 200);
        table.insert(3, 300);

        assert!(table.erase(2));

        assert!(!table.contains(2, &mut probes));
        assert!(table.contains(1, &mut probes));
        assert!(table.contains(3, &mut probes));
        assert_eq!(table.find(1, &mut probes), 100);
        assert_eq!(table.find(3, &mut probes), 300);
        assert_eq!(table.size(), 2);
        check_invariants(&table);
    }

    #[test]
    fn erase_missing_is_noop() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        table.insert(1, 100);

        assert!(!table.erase(2));
        assert_eq!(table.size(), 1);
        assert_eq!(table.find(1, &mut 0), 100);
    }

    #[test]
    fn grows_and_sums_values() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        let mut expected_sum = 0;

        for i in 0..200u64 {
            table.insert(i + 1, i + 10);
            expected_sum += i + 10;
        }

        assert_eq!(table.size(), 200);
        assert_eq!(table.sum_all_values(), expected_sum);
        // 200 entries need more than 200 / 4 groups.
        assert!(table.capacity() >= 64, "{table:#?}");

        let mut probes = 0;
        assert_eq!(table.find(42, &mut probes), 51);
        for i in 0..200u64 {
            assert_eq!(table.find(i + 1, &mut probes), i + 10);
        }
        check_invariants(&table);
    }

    #[test]
    fn signed_keys_and_struct_values() {
        let mut table = TwoWayTable::<I64ToPair>::new();
        let mut probes = 0;

        table.insert(-100, PairValue { a: 1, b: 2 });
        table.insert(5000, PairValue { a: 3, b: 4 });

        assert!(table.contains(-100, &mut probes));
        assert!(table.contains(5000, &mut probes));

        assert_eq!(table.find(-100, &mut probes), PairValue { a: 1, b: 2 });
        assert_eq!(table.find(5000, &mut probes), PairValue { a: 3, b: 4 });
    }

    #[test]
    fn negative_keys_survive_growth() {
        let mut table = TwoWayTable::<I32ToU32>::new();
        for k in -500..500i32 {
            table.insert(k, (k + 500) as u32);
        }

        assert_eq!(table.size(), 1000);
        for k in -500..500i32 {
            assert_eq!(table.find(k, &mut 0), (k + 500) as u32);
        }
        assert_eq!(table.sum_all_values(), (0..1000u32).sum());
        check_invariants(&table);
    }

    #[test]
    fn clear_and_reuse() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        let mut probes = 0;

        for k in 0..100u64 {
            table.insert(k, k);
        }
        let capacity = table.capacity();

        table.clear();
        assert_eq!(table.size(), 0);
        assert_eq!(table.capacity(), capacity);
        for k in 0..100u64 {
            assert!(!table.contains(k, &mut probes));
        }

        table.insert(30, 300);
        assert!(table.contains(30, &mut probes));
        assert_eq!(table.find(30, &mut probes), 300);
        assert_eq!(table.size(), 1);
        check_invariants(&table);
    }

    #[test]
    fn probes_count_every_comparison() {
        let mut table = TwoWayTable::<ConstantHash>::new();
        for k in 0..8u64 {
            table.insert(k, k * 10);
        }
        // Ties go to the first candidate, so the groups fill alternately.
        let group_2 = &table.groups()[2];
        let group_5 = &table.groups()[5];
        assert_eq!(group_2.keys, [0, 2, 4, 6]);
        assert_eq!(group_5.keys, [1, 3, 5, 7]);

        let mut probes = 0;
        assert_eq!(table.find(0, &mut probes), 0);
        assert_eq!(probes, 1);

        let mut probes = 0;
        assert_eq!(table.find(1, &mut probes), 10);
        assert_eq!(probes, 2);

        let mut probes = 0;
        assert_eq!(table.find(7, &mut probes), 70);
        assert_eq!(probes, 8);

        let mut probes = 0;
        // SAFETY: 5 is present.
        assert_eq!(unsafe { table.find_unchecked(5, &mut probes) }, 50);
        assert_eq!(probes, 6);

        let mut probes = 0;
        assert!(!table.contains(100, &mut probes));
        assert_eq!(probes, 8);
    }

    #[test]
    fn miss_stops_at_empty_offset() {
        let mut table = TwoWayTable::<ConstantHash>::new();
        table.insert(1, 1);

        let mut probes = 0;
        assert!(!table.contains(2, &mut probes));
        assert_eq!(probes, 2);

        table.clear();
        let mut probes = 0;
        assert!(!table.contains(2, &mut probes));
        assert_eq!(probes, 0);
    }

    #[test]
    fn grow_rehashes_shared_candidates() {
        let mut table = TwoWayTable::<ConstantHash>::new();
        for k in 0..8u64 {
            table.insert(k, k);
        }
        assert_eq!(table.capacity(), 8);

        // Both candidates are full and every key shares them, so growth cannot
        // make room; the entries it rehashes must all survive.
        let mut copy = table.clone();
        copy.grow();
        assert_eq!(copy.capacity(), 16);
        assert_eq!(copy.size(), 8);
        for k in 0..8u64 {
            assert_eq!(copy.find(k, &mut 0), k);
        }
        check_invariants(&copy);
    }

    #[test]
    fn erase_compacts_group() {
        let mut table = TwoWayTable::<ConstantHash>::new();
        for k in 0..8u64 {
            table.insert(k, k * 10);
        }

        assert!(table.erase(2));
        assert_eq!(table.groups()[2].keys, [0, 4, 6, u64::MAX]);
        assert_eq!(table.find(4, &mut 0), 40);
        assert_eq!(table.find(6, &mut 0), 60);

        // SAFETY: 7 is present.
        unsafe { table.erase_unchecked(7) };
        assert_eq!(table.groups()[5].keys, [1, 3, 5, u64::MAX]);
        assert_eq!(table.size(), 6);
        check_invariants(&table);

        // The freed slots are reused before growing.
        table.insert(100, 1000);
        table.insert(101, 1010);
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.find(101, &mut 0), 1010);
    }

    #[test]
    fn sentinel_is_never_found() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        table.insert(1, 1);

        let mut probes = 0;
        assert!(!table.contains(u64::MAX, &mut probes));
        assert_eq!(table.get(u64::MAX, &mut probes), None);
        assert!(!table.erase(u64::MAX));
        assert_eq!(probes, 0);
    }

    #[test]
    #[should_panic(expected = "key not present in table")]
    fn find_missing_panics() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        table.insert(1, 1);
        table.find(2, &mut 0);
    }

    #[test]
    fn prefetch_then_find_indexed() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        for k in 0..1000u64 {
            table.insert(k, k + 1);
        }

        let keys: Vec<u64> = (0..1000u64).rev().collect();
        let hashes: Vec<u64> = keys.iter().map(|&k| table.prefetch(k)).collect();

        let mut probes = 0;
        let mut sum = 0;
        for (&key, &hash) in keys.iter().zip(&hashes) {
            assert_eq!(hash, table.hash_of(key));
            sum += table.find_indexed(key, hash, &mut probes);
            assert_eq!(table.get_indexed(key, hash, &mut probes), Some(key + 1));
            // SAFETY: Every key in `keys` was inserted.
            assert_eq!(
                unsafe { table.find_indexed_unchecked(key, hash, &mut probes) },
                key + 1
            );
        }
        assert_eq!(sum, table.sum_all_values());
        assert_eq!(table.get_indexed(5000, table.hash_of(5000), &mut probes), None);
    }

    #[test]
    fn find_and_find_unchecked_agree_on_probes() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        for k in 1..=5000u64 {
            table.insert(k, k);
        }

        let mut checked = 0;
        let mut unchecked = 0;
        for k in 1..=5000u64 {
            assert_eq!(table.find(k, &mut checked), k);
            // SAFETY: Every key in range was inserted.
            assert_eq!(unsafe { table.find_unchecked(k, &mut unchecked) }, k);
        }
        assert_eq!(checked, unchecked);
        // One to `2 * BUCKET` comparisons per hit.
        assert!(checked >= 5000 && checked <= 5000 * 8);
    }

    #[test]
    fn wider_groups() {
        let mut table = TwoWayTable::<U64ToU64, 8>::new();
        for k in 0..10_000u64 {
            table.insert(k, k * 3);
        }

        assert_eq!(table.size(), 10_000);
        for k in 0..10_000u64 {
            assert_eq!(table.find(k, &mut 0), k * 3);
        }
        check_invariants(&table);
    }

    #[test]
    fn single_slot_groups() {
        let mut table = TwoWayTable::<U64ToU64, 1>::new();
        for k in 0..500u64 {
            table.insert(k, k);
        }

        assert_eq!(table.size(), 500);
        assert!(table.capacity() >= 500 / 2);
        for k in 0..500u64 {
            assert_eq!(table.find(k, &mut 0), k);
        }
        check_invariants(&table);
    }

    #[test]
    fn user_defined_sip_hash() {
        let mut table = TwoWayTable::<SipU64>::with_groups(1);
        assert_eq!(table.capacity(), MIN_CAPACITY);

        for k in 0..2000u64 {
            table.insert(k * 7919, k);
        }
        for k in 0..2000u64 {
            assert_eq!(table.get(k * 7919, &mut 0), Some(k));
        }
        check_invariants(&table);
    }

    #[test]
    fn clone_is_independent() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        for k in 0..50u64 {
            table.insert(k, k);
        }

        let copy = table.clone();
        table.clear();

        assert_eq!(copy.size(), 50);
        for k in 0..50u64 {
            assert_eq!(copy.find(k, &mut 0), k);
        }
        assert!(table.is_empty());
    }

    #[test]
    fn memory_usage_tracks_capacity() {
        let mut table = TwoWayTable::<U64ToU64>::new();
        let before = table.memory_usage();
        table.grow();
        let after = table.memory_usage();

        assert_eq!(after - before, 8 * core::mem::size_of::<Group<U64ToU64, 4>>());
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn random_ops_match_model() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);
        let mut table = TwoWayTable::<U64ToU64>::new();
        let mut model = hashbrown::HashMap::new();
        let mut inserted = 0usize;
        let mut erased = 0usize;

        for _ in 0..50_000 {
            let key = rng.random_range(0..20_000u64);
            let mut probes = 0;
            match rng.random_range(0..4u8) {
                0 | 1 => {
                    if !model.contains_key(&key) {
                        let value = rng.random::<u32>() as u64;
                        table.insert(key, value);
                        model.insert(key, value);
                        inserted += 1;
                    }
                }
                2 => {
                    let removed = model.remove(&key).is_some();
                    assert_eq!(table.erase(key), removed);
                    erased += removed as usize;
                }
                _ => {
                    assert_eq!(table.get(key, &mut probes), model.get(&key).copied());
                    assert_eq!(table.contains(key, &mut probes), model.contains_key(&key));
                }
            }
        }

        assert_eq!(table.size(), inserted - erased);
        assert_eq!(table.size(), model.len());
        assert_eq!(table.sum_all_values(), model.values().sum::<u64>());
        for (&key, &value) in &model {
            assert_eq!(table.find(key, &mut 0), value);
        }
        check_invariants(&table);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many_random() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut table = TwoWayTable::<U64ToU64>::new();
        let mut keys = hashbrown::HashSet::new();

        while keys.len() < 200_000 {
            let key = rng.random::<u64>();
            if key != u64::MAX && keys.insert(key) {
                table.insert(key, key >> 40);
            }
        }

        assert_eq!(table.size(), keys.len());
        for &key in &keys {
            assert_eq!(table.find(key, &mut 0), key >> 40);
        }
        // Two-choice placement keeps growth rare, well under one entry per
        // two groups.
        assert!(table.capacity() <= keys.len() * 2, "{}", table.capacity());
    }
}
