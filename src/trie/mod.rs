pub(crate) mod bitmap;
mod iterators;
pub(crate) mod node;
mod ordered;
mod set_algebra;
pub(crate) mod sparse_vec;

pub use iterators::Iter;

use std::fmt::Debug;
use std::sync::Arc;

use log::trace;

use crate::types::errors::KeyMapError;
use crate::types::key::{Key256, PATH_LEN};
use crate::types::stats::TrieStats;

use bitmap::{bit_pos, sparse_index};
use node::{build_node, check_at, stats_at, Node};

//------------ KeyMap --------------------------------------------------------

/// A compact persistent map from fixed-width 256-bit keys to shared
/// values.
///
/// The map is a radix trie over the raw bits of the key, descended in
/// 6-bit segments, so its traversal order is the lexicographic order of
/// the keys themselves. Every update returns a new map that shares all
/// untouched subtrees with its input; clones of a map are reference-count
/// bumps. Values live behind `Arc`s, so they are shared between versions
/// as well, never cloned.
///
/// All operations are read-only on their inputs and the map is `Send` and
/// `Sync` whenever the value type is; readers on any number of threads
/// can walk any number of versions concurrently.
pub struct KeyMap<V> {
    pub(crate) root: Arc<Node<V>>,
}

impl<V> Clone for KeyMap<V> {
    fn clone(&self) -> Self {
        KeyMap {
            root: Arc::clone(&self.root),
        }
    }
}

impl<V> Default for KeyMap<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> KeyMap<V> {
    /// The empty map.
    pub fn new() -> Self {
        KeyMap {
            root: Arc::new(Node::Empty),
        }
    }

    /// The map holding exactly one entry.
    pub fn singleton(key: Key256, value: V) -> Self {
        KeyMap {
            root: Arc::new(Node::Leaf(key, Arc::new(value))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Number of entries. Computed by a fold over the trie.
    pub fn len(&self) -> usize {
        self.fold_asc(0, |n, _, _| n + 1)
    }

    pub fn contains_key(&self, key: &Key256) -> bool {
        self.get(key).is_some()
    }

    /// Looks up the value stored for `key`.
    pub fn get(&self, key: &Key256) -> Option<&V> {
        self.get_shared(key).map(|v| &**v)
    }

    /// Looks up the shared handle stored for `key`, allowing the caller
    /// to keep the value alive independently of the map.
    pub fn get_shared(&self, key: &Key256) -> Option<&Arc<V>> {
        get_at(&self.root, key, &key.segments())
    }

    /// Returns the map with `key` bound to `value`. An existing binding
    /// is replaced.
    pub fn insert(&self, key: Key256, value: V) -> Self {
        self.insert_shared(key, Arc::new(value))
    }

    /// `insert` for a value that is already shared. Inserting the very
    /// `Arc` a lookup returned makes the whole operation a no-op that
    /// hands back the input root.
    pub fn insert_shared(&self, key: Key256, value: Arc<V>) -> Self {
        self.insert_with_key(|_, new, _| Arc::clone(new), key, value)
    }

    /// Inserts `value` for `key`, resolving a collision with an existing
    /// binding through `combine(new, old)`.
    pub fn insert_with<F>(&self, mut combine: F, key: Key256, value: Arc<V>) -> Self
    where
        F: FnMut(&Arc<V>, &Arc<V>) -> Arc<V>,
    {
        self.insert_with_key(|_, new, old| combine(new, old), key, value)
    }

    /// Like [`insert_with`][Self::insert_with], with the key passed to
    /// the combining closure. If the closure resolves to the stored
    /// `Arc` (pointer equality), the original root is returned and the
    /// new map shares everything with `self`.
    pub fn insert_with_key<F>(&self, mut combine: F, key: Key256, value: Arc<V>) -> Self
    where
        F: FnMut(&Key256, &Arc<V>, &Arc<V>) -> Arc<V>,
    {
        KeyMap {
            root: insert_at(
                &self.root,
                key,
                value,
                &key.segments(),
                &mut combine,
            ),
        }
    }

    /// Returns the map without any binding for `key`. Removing an absent
    /// key returns the input root unchanged.
    pub fn remove(&self, key: &Key256) -> Self {
        KeyMap {
            root: remove_at(&self.root, key, &key.segments()),
        }
    }

    /// Whether `self` and `other` are the same version of a map. Never a
    /// false positive; distinct but equal maps compare as different
    /// versions.
    pub fn same_version(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.root, &other.root)
    }

    /// Verifies the structural invariants of the whole trie.
    pub fn check_valid(&self) -> Result<(), KeyMapError> {
        let mut prefix = [0u8; PATH_LEN];
        check_at(&self.root, 0, &mut prefix, true)
    }

    /// Walks the trie and gathers occupancy statistics.
    pub fn stats(&self) -> TrieStats {
        let mut stats = TrieStats::new(std::mem::size_of::<Node<V>>());
        stats_at(&self.root, 0, &mut stats);
        stats
    }
}

//------------ Lookup --------------------------------------------------------

pub(crate) fn get_at<'a, V>(
    node: &'a Node<V>,
    key: &Key256,
    path: &[u8],
) -> Option<&'a Arc<V>> {
    match node {
        Node::Empty => None,
        Node::Leaf(stored, value) => (stored == key).then_some(value),
        _ => {
            let (bm, kids) = node.parts().expect("interior variant");
            // Running out of path before a leaf only happens on a
            // malformed tree; report absence rather than descend further.
            let (&seg, rest) = path.split_first()?;
            let mask = bit_pos(seg);
            if bm & mask == 0 {
                return None;
            }
            get_at(&kids[sparse_index(bm, mask)], key, rest)
        }
    }
}

//------------ Insert --------------------------------------------------------

pub(crate) fn insert_at<V, F>(
    node: &Arc<Node<V>>,
    key: Key256,
    value: Arc<V>,
    path: &[u8],
    combine: &mut F,
) -> Arc<Node<V>>
where
    F: FnMut(&Key256, &Arc<V>, &Arc<V>) -> Arc<V>,
{
    match &**node {
        Node::Empty => Arc::new(Node::Leaf(key, value)),
        Node::Leaf(stored, old) => {
            if *stored == key {
                let merged = combine(&key, &value, old);
                if Arc::ptr_eq(&merged, old) {
                    // Nothing changed; hand the caller the node it gave
                    // us so the whole spine stays shared.
                    Arc::clone(node)
                } else {
                    Arc::new(Node::Leaf(key, merged))
                }
            } else {
                join_leaves(node, stored, key, value, path)
            }
        }
        _ => {
            let (bm, kids) = node.parts().expect("interior variant");
            let Some((&seg, rest)) = path.split_first() else {
                panic!(
                    "insert: key path exhausted below depth {}; the trie \
                    is deeper than any key",
                    PATH_LEN
                );
            };
            let mask = bit_pos(seg);
            let idx = sparse_index(bm, mask);
            if bm & mask == 0 {
                let arr =
                    sparse_vec::insert_at(kids, idx, Arc::new(Node::Leaf(key, value)));
                build_node(bm | mask, arr)
            } else {
                let new_child = insert_at(&kids[idx], key, value, rest, combine);
                if Arc::ptr_eq(&new_child, &kids[idx]) {
                    Arc::clone(node)
                } else {
                    build_node(bm, sparse_vec::update_at(kids, idx, new_child))
                }
            }
        }
    }
}

// Two distinct keys collided on a leaf: grow the minimal chain that
// separates their remaining paths. The shared prefix becomes single-slot
// nodes; the first diverging segment a two-slot node over both leaves.
fn join_leaves<V>(
    node: &Arc<Node<V>>,
    stored: &Key256,
    key: Key256,
    value: Arc<V>,
    path: &[u8],
) -> Arc<Node<V>> {
    let depth = PATH_LEN - path.len();
    let stored_path = stored.segments();
    let stored_tail = &stored_path[depth..];

    let split = path
        .iter()
        .zip(stored_tail)
        .position(|(a, b)| a != b)
        .unwrap_or_else(|| {
            panic!(
                "insert: distinct keys {} and {} share a full segment path",
                key, stored
            )
        });
    trace!(
        "leaf split at depth {} after {} shared segments",
        depth,
        split
    );

    let new_seg = path[split];
    let old_seg = stored_tail[split];
    let new_leaf = Arc::new(Node::Leaf(key, value));
    let kids = if new_seg < old_seg {
        vec![new_leaf, Arc::clone(node)]
    } else {
        vec![Arc::clone(node), new_leaf]
    };
    let mut grown = build_node(bit_pos(new_seg) | bit_pos(old_seg), kids);
    for &seg in path[..split].iter().rev() {
        grown = Arc::new(Node::One(seg, grown));
    }
    grown
}

//------------ Delete --------------------------------------------------------

// The reconstruction work is carried by the recursion unwind: each frame
// holds the bitmap, the slot and the siblings of the child it descended
// into, and rebuilds through the smart constructors on the way out. An
// emptied child clears its bit and drops its slot, so empties float all
// the way up.
pub(crate) fn remove_at<V>(
    node: &Arc<Node<V>>,
    key: &Key256,
    path: &[u8],
) -> Arc<Node<V>> {
    match &**node {
        Node::Empty => Arc::clone(node),
        Node::Leaf(stored, _) => {
            if stored == key {
                Arc::new(Node::Empty)
            } else {
                Arc::clone(node)
            }
        }
        _ => {
            let (bm, kids) = node.parts().expect("interior variant");
            let Some((&seg, rest)) = path.split_first() else {
                return Arc::clone(node);
            };
            let mask = bit_pos(seg);
            if bm & mask == 0 {
                return Arc::clone(node);
            }
            let idx = sparse_index(bm, mask);
            let new_child = remove_at(&kids[idx], key, rest);
            if Arc::ptr_eq(&new_child, &kids[idx]) {
                Arc::clone(node)
            } else if new_child.is_empty() {
                trace!("delete empties segment {}, dropping its slot", seg);
                build_node(bm & !mask, sparse_vec::remove_at(kids, idx))
            } else {
                build_node(bm, sparse_vec::update_at(kids, idx, new_child))
            }
        }
    }
}

//------------ Trait impls ---------------------------------------------------

impl<V: PartialEq> PartialEq for KeyMap<V> {
    fn eq(&self, other: &Self) -> bool {
        if self.same_version(other) {
            return true;
        }
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some((ka, va)), Some((kb, vb))) => {
                    if ka != kb || va != vb {
                        return false;
                    }
                }
                _ => return false,
            }
        }
    }
}

impl<V: Eq> Eq for KeyMap<V> {}

impl<V: PartialOrd> PartialOrd for KeyMap<V> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.iter().partial_cmp(other.iter())
    }
}

impl<V: Ord> Ord for KeyMap<V> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.iter().cmp(other.iter())
    }
}

impl<V: Debug> Debug for KeyMap<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<V: serde::Serialize> serde::Serialize for KeyMap<V> {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de, V: serde::Deserialize<'de>> serde::Deserialize<'de> for KeyMap<V> {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let entries = Vec::<(Key256, V)>::deserialize(deserializer)?;
        Ok(entries.into_iter().collect())
    }
}
