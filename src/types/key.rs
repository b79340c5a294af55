use std::cmp::Ordering;
use std::fmt;

use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, Serializer};
use zerocopy::{NetworkEndian, U64};

//------------ Key256 --------------------------------------------------------

// The fixed-width key of the trie: 256 bits, stored as four big-endian
// 64-bit lanes, lane 0 most significant. Keys order lexicographically over
// the lane sequence, which is the same order the trie yields during an
// ascending traversal. The lanes are byte-order wrapped so that
// `as_bytes()` of a key is its big-endian wire form.
#[derive(
    Copy,
    Clone,
    Eq,
    PartialEq,
    Hash,
    zerocopy::FromBytes,
    zerocopy::IntoBytes,
    zerocopy::KnownLayout,
    zerocopy::Immutable,
    zerocopy::Unaligned,
)]
#[repr(transparent)]
pub struct Key256([U64<NetworkEndian>; 4]);

/// Number of bits consumed per trie level.
pub(crate) const SEGMENT_BITS: usize = 6;

/// Segments per 64-bit lane. 11 * 6 = 66 > 64, so the first segment of
/// every lane carries only the lane's top 4 bits, zero-extended.
pub(crate) const SEGMENTS_PER_LANE: usize = 11;

/// Total depth of the trie: the full segment path of a key.
pub(crate) const PATH_LEN: usize = 4 * SEGMENTS_PER_LANE;

impl Key256 {
    pub fn from_words(w0: u64, w1: u64, w2: u64, w3: u64) -> Self {
        Key256([U64::new(w0), U64::new(w1), U64::new(w2), U64::new(w3)])
    }

    pub fn zero() -> Self {
        Key256([U64::new(0); 4])
    }

    pub fn to_words(self) -> [u64; 4] {
        [
            self.0[0].get(),
            self.0[1].get(),
            self.0[2].get(),
            self.0[3].get(),
        ]
    }

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        let lane = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            U64::new(u64::from_be_bytes(w))
        };
        Key256([lane(0), lane(1), lane(2), lane(3)])
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        let w = self.to_words();
        [
            w[0].to_be_bytes(),
            w[1].to_be_bytes(),
            w[2].to_be_bytes(),
            w[3].to_be_bytes(),
        ]
        .concat()
        .try_into()
        .expect("Key256 with incorrect length.")
    }

    // The radix path of this key: 44 six-bit segments, most significant
    // segment first. Per lane the first segment holds the lane's top 4
    // bits (zero-extended to 6), the remaining ten segments the lower 60
    // bits in 6-bit groups. Insert, lookup, delete and split all descend
    // by exactly this derivation; two implementations disagreeing here
    // would desynchronize the whole store.
    pub(crate) fn segments(&self) -> [u8; PATH_LEN] {
        let mut segs = [0u8; PATH_LEN];
        for (l, lane) in self.0.iter().enumerate() {
            let w = lane.get();
            let base = l * SEGMENTS_PER_LANE;
            segs[base] = (w >> 60) as u8;
            for j in 1..SEGMENTS_PER_LANE {
                let shift = SEGMENT_BITS * (SEGMENTS_PER_LANE - 1 - j);
                segs[base + j] = ((w >> shift) & 0x3f) as u8;
            }
        }
        segs
    }
}

impl PartialOrd for Key256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key256 {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0[0]
            .get()
            .cmp(&other.0[0].get())
            .then_with(|| self.0[1].get().cmp(&other.0[1].get()))
            .then_with(|| self.0[2].get().cmp(&other.0[2].get()))
            .then_with(|| self.0[3].get().cmp(&other.0[3].get()))
    }
}

impl fmt::Debug for Key256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.to_words();
        write!(
            f,
            "Key256(0x{:016x}_{:016x}_{:016x}_{:016x})",
            w[0], w[1], w[2], w[3]
        )
    }
}

impl fmt::Display for Key256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let w = self.to_words();
        write!(f, "{:016x}{:016x}{:016x}{:016x}", w[0], w[1], w[2], w[3])
    }
}

impl From<[u64; 4]> for Key256 {
    fn from(w: [u64; 4]) -> Self {
        Key256::from_words(w[0], w[1], w[2], w[3])
    }
}

impl From<[u8; 32]> for Key256 {
    fn from(bytes: [u8; 32]) -> Self {
        Key256::from_be_bytes(bytes)
    }
}

// The byte-order lanes have no serde impls of their own, so keys travel
// as their word form.
impl Serialize for Key256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_words().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Key256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        <[u64; 4]>::deserialize(deserializer).map(Key256::from)
    }
}

//------------ Tests ---------------------------------------------------------
