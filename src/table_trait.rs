#[cfg(any(feature = "squirrel3", feature = "foldhash"))]
use core::marker::PhantomData;

/// A key type that can live in a [`TwoWayTable`].
///
/// Keys are plain, bit-copyable data. One value of the key domain is reserved
/// as the [`EMPTY`] sentinel that marks unused slots; it can never be inserted.
/// For every primitive integer the sentinel is the type's `MAX`.
///
/// [`TwoWayTable`]: crate::TwoWayTable
/// [`EMPTY`]: TableKey::EMPTY
pub trait TableKey: Copy + Eq {
    /// Reserved key marking an empty slot.
    const EMPTY: Self;

    /// Widens the key's bit pattern to 64 bits for hashing.
    ///
    /// Signed keys are sign-extended, so `-1i32` and `-1i64` produce the same
    /// bits.
    fn to_bits(self) -> u64;
}

macro_rules! impl_table_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl TableKey for $ty {
                const EMPTY: Self = <$ty>::MAX;

                #[inline(always)]
                fn to_bits(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

impl_table_key!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// Instantiation parameters of a [`TwoWayTable`]: the key type, the value
/// type, and the hash function mapping one to a 64-bit hash.
///
/// The hash must be deterministic and well mixed across all 64 bits: the low
/// 32 bits pick one candidate group and the high 32 bits pick the other.
///
/// # Examples
///
/// ```rust
/// use two_way_hash::TableTrait;
/// use two_way_hash::TwoWayTable;
/// use two_way_hash::squirrel3;
///
/// struct Ids;
///
/// impl TableTrait for Ids {
///     type Key = u32;
///     type Value = (u16, u16);
///
///     fn hash(key: u32) -> u64 {
///         squirrel3(key as u64)
///     }
/// }
///
/// let mut table = TwoWayTable::<Ids>::new();
/// table.insert(7, (1, 2));
/// assert_eq!(table.get(7, &mut 0), Some((1, 2)));
/// ```
///
/// [`TwoWayTable`]: crate::TwoWayTable
pub trait TableTrait {
    /// The key type.
    type Key: TableKey;
    /// The value type.
    type Value: Copy;

    /// Hashes a key to 64 bits.
    fn hash(key: Self::Key) -> u64;
}

/// Stateless 64-bit avalanche mixer.
///
/// Cheap enough to sit on the lookup path, and mixes both halves of the
/// output well enough to drive the two candidate group indexes.
///
/// ```rust
/// # use two_way_hash::squirrel3;
/// assert_eq!(squirrel3(42), squirrel3(42));
/// assert_ne!(squirrel3(1), squirrel3(2));
/// ```
#[inline(always)]
pub const fn squirrel3(mut at: u64) -> u64 {
    // These constants are all large primes.
    const BIT_NOISE1: u64 = 0x9E37_79B1_85EB_CA87;
    const BIT_NOISE2: u64 = 0xC2B2_AE3D_27D4_EB4F;
    const BIT_NOISE3: u64 = 0x27D4_EB2F_1656_67C5;

    at = at.wrapping_mul(BIT_NOISE1);
    at ^= at >> 8;
    at = at.wrapping_add(BIT_NOISE2);
    at ^= at << 8;
    at = at.wrapping_mul(BIT_NOISE3);
    at ^= at >> 8;
    at
}

/// A [`TableTrait`] hashing any [`TableKey`] with [`squirrel3`].
#[cfg(feature = "squirrel3")]
pub struct Squirrel3<K, V> {
    _phantom: PhantomData<fn() -> (K, V)>,
}

#[cfg(feature = "squirrel3")]
impl<K: TableKey, V: Copy> TableTrait for Squirrel3<K, V> {
    type Key = K;
    type Value = V;

    #[inline(always)]
    fn hash(key: K) -> u64 {
        squirrel3(key.to_bits())
    }
}

/// A [`TableTrait`] hashing any [`TableKey`] with foldhash's fast hasher under
/// a fixed seed.
#[cfg(feature = "foldhash")]
pub struct FoldHash<K, V> {
    _phantom: PhantomData<fn() -> (K, V)>,
}

#[cfg(feature = "foldhash")]
const FOLDHASH_SEED: u64 = 0x243F_6A88_85A3_08D3;

#[cfg(feature = "foldhash")]
impl<K: TableKey, V: Copy> TableTrait for FoldHash<K, V> {
    type Key = K;
    type Value = V;

    #[inline(always)]
    fn hash(key: K) -> u64 {
        use core::hash::BuildHasher;

        foldhash::fast::FixedState::with_seed(FOLDHASH_SEED).hash_one(key.to_bits())
    }
}
