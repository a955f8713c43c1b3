use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::table_trait::TableKey;

cfg_if::cfg_if! {
    if #[cfg(target_vendor = "apple")] {
        /// Cache-line size the group array is aligned to.
        pub const CACHE_LINE: usize = 128;
    } else {
        /// Cache-line size the group array is aligned to.
        pub const CACHE_LINE: usize = 64;
    }
}

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "x86_64", target_feature = "sse"))] {
        /// Issue a read prefetch for the cache line holding `ptr`.
        #[inline(always)]
        pub(crate) fn prefetch<T>(ptr: *const T) {
            // SAFETY: Prefetching is a hint and never faults, even for invalid
            // addresses.
            unsafe {
                use core::arch::x86_64::*;
                _mm_prefetch(ptr as *const i8, _MM_HINT_T0);
            }
        }
    } else if #[cfg(target_arch = "aarch64")] {
        /// Issue a read prefetch for the cache line holding `ptr`.
        #[inline(always)]
        pub(crate) fn prefetch<T>(ptr: *const T) {
            // SAFETY: `prfm` is a hint and never faults, even for invalid
            // addresses.
            unsafe {
                core::arch::asm!(
                    "prfm pldl1keep, [{ptr}]",
                    ptr = in(reg) ptr,
                    options(nostack, readonly, preserves_flags)
                );
            }
        }
    } else {
        /// Prefetching is unavailable on this target.
        #[inline(always)]
        pub(crate) fn prefetch<T>(_ptr: *const T) {}
    }
}

/// One hash target: `BUCKET` keys and `BUCKET` values, stored as two parallel
/// arrays so a key scan never touches the values.
///
/// Occupied slots are always packed at the front. Every slot past the last
/// occupied one holds `K::EMPTY`, and its value is uninitialized.
#[repr(C)]
pub(crate) struct SlotGroup<K, V, const BUCKET: usize> {
    pub(crate) keys: [K; BUCKET],
    pub(crate) values: [MaybeUninit<V>; BUCKET],
}

impl<K: Copy, V: Copy, const BUCKET: usize> Clone for SlotGroup<K, V, BUCKET> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: Copy, V: Copy, const BUCKET: usize> Copy for SlotGroup<K, V, BUCKET> {}

impl<K: TableKey, V: Copy, const BUCKET: usize> SlotGroup<K, V, BUCKET> {
    pub(crate) const EMPTY: Self = Self {
        keys: [K::EMPTY; BUCKET],
        values: [MaybeUninit::uninit(); BUCKET],
    };

    /// Number of occupied slots, counted up to the first sentinel.
    #[inline(always)]
    pub(crate) fn fill_count(&self) -> usize {
        let mut n = 0;
        while n < BUCKET && self.keys[n] != K::EMPTY {
            n += 1;
        }
        n
    }

    /// Write an entry into slot `n`.
    ///
    /// `n` must be the group's current fill count, so the packing is kept.
    #[inline(always)]
    pub(crate) fn push_at(&mut self, n: usize, key: K, value: V) {
        debug_assert!(n < BUCKET);
        debug_assert!(n == 0 || self.keys[n - 1] != K::EMPTY);
        self.keys[n] = key;
        self.values[n] = MaybeUninit::new(value);
    }

    /// Read the value stored in `slot`.
    ///
    /// # Safety
    ///
    /// `slot` must be less than `BUCKET` and hold a non-sentinel key.
    #[inline(always)]
    pub(crate) unsafe fn value(&self, slot: usize) -> V {
        debug_assert!(slot < BUCKET && self.keys[slot] != K::EMPTY);
        // SAFETY: Caller ensures the slot is in bounds and occupied, and every
        // occupied slot had its value written by `push_at`.
        unsafe { self.values.get_unchecked(slot).assume_init_read() }
    }

    /// Remove the entry in `slot`, shifting every later slot one position
    /// left and writing the sentinel into the last slot.
    #[inline]
    pub(crate) fn remove_at(&mut self, slot: usize) {
        debug_assert!(slot < BUCKET);
        for j in slot..BUCKET - 1 {
            self.keys[j] = self.keys[j + 1];
            self.values[j] = self.values[j + 1];
        }
        self.keys[BUCKET - 1] = K::EMPTY;
    }

    /// Mark every slot empty.
    #[inline]
    pub(crate) fn reset(&mut self) {
        self.keys = [K::EMPTY; BUCKET];
    }
}

/// A single cache-line aligned allocation of `len` slot groups.
///
/// `len` is a power of two. Every group starts out empty.
pub(crate) struct GroupBuffer<K, V, const BUCKET: usize> {
    alloc: NonNull<SlotGroup<K, V, BUCKET>>,
    len: usize,
}

// SAFETY: The buffer uniquely owns its groups, which are plain copyable data.
unsafe impl<K: Send, V: Send, const BUCKET: usize> Send for GroupBuffer<K, V, BUCKET> {}
// SAFETY: Shared access only hands out shared slices.
unsafe impl<K: Sync, V: Sync, const BUCKET: usize> Sync for GroupBuffer<K, V, BUCKET> {}

impl<K, V, const BUCKET: usize> GroupBuffer<K, V, BUCKET> {
    fn layout(len: usize) -> Layout {
        Layout::array::<SlotGroup<K, V, BUCKET>>(len)
            .and_then(|layout| layout.align_to(CACHE_LINE))
            .expect("allocation size overflow")
            .pad_to_align()
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub(crate) fn as_slice(&self) -> &[SlotGroup<K, V, BUCKET>] {
        // SAFETY: `alloc` points to `len` initialized groups (or is dangling with
        // a zero-sized layout), and we hold a shared borrow of the owner.
        unsafe { core::slice::from_raw_parts(self.alloc.as_ptr(), self.len) }
    }

    #[inline(always)]
    pub(crate) fn as_mut_slice(&mut self) -> &mut [SlotGroup<K, V, BUCKET>] {
        // SAFETY: `alloc` points to `len` initialized groups (or is dangling with
        // a zero-sized layout), and we hold a unique borrow of the owner.
        unsafe { core::slice::from_raw_parts_mut(self.alloc.as_ptr(), self.len) }
    }
}

impl<K: TableKey, V: Copy, const BUCKET: usize> GroupBuffer<K, V, BUCKET> {
    /// Allocate `len` empty groups. Allocation failure aborts through
    /// `handle_alloc_error`.
    pub(crate) fn new(len: usize) -> Self {
        const { assert!(BUCKET > 0, "groups need at least one slot") };
        debug_assert!(len.is_power_of_two());

        let layout = Self::layout(len);
        let alloc = if layout.size() == 0 {
            NonNull::dangling()
        } else {
            // SAFETY: We have validated that the layout size is non-zero. Null
            // returns are routed to `handle_alloc_error`, and every group is
            // written before the pointer escapes.
            unsafe {
                let raw_alloc = alloc::alloc::alloc(layout);
                if raw_alloc.is_null() {
                    handle_alloc_error(layout);
                }

                let groups = raw_alloc.cast::<SlotGroup<K, V, BUCKET>>();
                for idx in 0..len {
                    groups.add(idx).write(SlotGroup::EMPTY);
                }

                NonNull::new_unchecked(groups)
            }
        };

        Self { alloc, len }
    }
}

impl<K: TableKey, V: Copy, const BUCKET: usize> Clone for GroupBuffer<K, V, BUCKET> {
    fn clone(&self) -> Self {
        let mut buffer = Self::new(self.len);
        buffer.as_mut_slice().copy_from_slice(self.as_slice());
        buffer
    }
}

impl<K, V, const BUCKET: usize> Drop for GroupBuffer<K, V, BUCKET> {
    fn drop(&mut self) {
        let layout = Self::layout(self.len);
        if layout.size() != 0 {
            // SAFETY: The allocation was made in `new` with this exact layout.
            // Groups hold `Copy` data, so there is nothing to drop first.
            unsafe {
                alloc::alloc::dealloc(self.alloc.as_ptr().cast(), layout);
            }
        }
    }
}
