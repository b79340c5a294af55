use std::fmt::Debug;
use std::sync::Arc;

use log::trace;

use crate::types::errors::KeyMapError;
use crate::types::key::{Key256, PATH_LEN};
use crate::types::stats::TrieStats;

use super::bitmap::{bit_pos, SetBits, FULL_MASK};

//------------ Node ----------------------------------------------------------

// One node of the trie. A map is an `Arc<Node<V>>`; children are again
// `Arc`s, so versions of a map share every subtree an operation did not
// touch. The variants are sized to the number of populated slots so that
// a node never pays for the 64-way branching factor it does not use:
//
// - `One` stores its single slot's segment inline, no bitmap word needed;
// - `Two` and `Sparse` pair a bitmap with a dense child array whose
//   length equals the bitmap's population count;
// - `Full` drops the bitmap, it is implicitly all ones.
//
// Only the root of a map may be `Empty`. Everything that can produce an
// empty subtree (delete, intersection) goes through `build_node` or
// `drop_empty` below, which float empties upward instead of storing them.
pub(crate) enum Node<V> {
    Empty,
    Leaf(Key256, Arc<V>),
    One(u8, Arc<Node<V>>),
    Two(u64, Box<[Arc<Node<V>>]>),
    Sparse(u64, Box<[Arc<Node<V>>]>),
    Full(Box<[Arc<Node<V>>]>),
}

impl<V> Node<V> {
    pub(crate) fn is_empty(&self) -> bool {
        matches!(self, Node::Empty)
    }

    // The uniform `(bitmap, children)` view of the interior variants.
    // `One` borrows its single child as a one-element slice, `Full`
    // reports the all-ones bitmap. `Empty` and `Leaf` have no view.
    pub(crate) fn parts(&self) -> Option<(u64, &[Arc<Node<V>>])> {
        match self {
            Node::Empty | Node::Leaf(..) => None,
            Node::One(seg, child) => {
                Some((bit_pos(*seg), std::slice::from_ref(child)))
            }
            Node::Two(bm, kids) | Node::Sparse(bm, kids) => Some((*bm, kids)),
            Node::Full(kids) => Some((FULL_MASK, kids)),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Node::Empty => "Empty",
            Node::Leaf(..) => "Leaf",
            Node::One(..) => "One",
            Node::Two(..) => "Two",
            Node::Sparse(..) => "Sparse",
            Node::Full(..) => "Full",
        }
    }
}

impl<V: Debug> Debug for Node<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Empty => f.write_str("Empty"),
            Node::Leaf(k, v) => {
                f.debug_tuple("Leaf").field(k).field(v).finish()
            }
            Node::One(seg, child) => {
                f.debug_tuple("One").field(seg).field(child).finish()
            }
            Node::Two(bm, kids) | Node::Sparse(bm, kids) => f
                .debug_struct(self.variant_name())
                .field("bitmap", &format_args!("{:#018x}", bm))
                .field("children", kids)
                .finish(),
            Node::Full(kids) => {
                f.debug_tuple("Full").field(kids).finish()
            }
        }
    }
}

//------------ Smart constructors --------------------------------------------

/// Builds the minimal node variant for a bitmap and its children.
///
/// A single leaf child is returned as-is: a leaf carries its full key, so
/// nothing above it needs to remember the position it was found at. A
/// single interior child keeps a `One` wrapper, its position is exactly
/// what the wrapper records. Callers must not pass Empty children; use
/// [`drop_empty`] when the children may contain empties.
pub(crate) fn build_node<V>(
    bitmap: u64,
    children: Vec<Arc<Node<V>>>,
) -> Arc<Node<V>> {
    if bitmap.count_ones() as usize != children.len() {
        panic!(
            "build_node: bitmap population {} does not match {} children",
            bitmap.count_ones(),
            children.len()
        );
    }
    debug_assert!(children.iter().all(|c| !c.is_empty()));
    match children.len() {
        0 => Arc::new(Node::Empty),
        1 => {
            let child = children.into_iter().next().expect("length checked");
            if matches!(&*child, Node::Leaf(..)) {
                child
            } else {
                Arc::new(Node::One(bitmap.trailing_zeros() as u8, child))
            }
        }
        2 => Arc::new(Node::Two(bitmap, children.into_boxed_slice())),
        64 => Arc::new(Node::Full(children.into_boxed_slice())),
        _ => Arc::new(Node::Sparse(bitmap, children.into_boxed_slice())),
    }
}

/// The delete-side constructor: filters out Empty children, clearing
/// their bitmap bits, then builds the minimal variant. This is where
/// empties float upward.
pub(crate) fn drop_empty<V>(
    bitmap: u64,
    children: Vec<Arc<Node<V>>>,
) -> Arc<Node<V>> {
    if bitmap.count_ones() as usize != children.len() {
        panic!(
            "drop_empty: bitmap population {} does not match {} children",
            bitmap.count_ones(),
            children.len()
        );
    }
    if children.iter().any(|c| c.is_empty()) {
        let mut bm = bitmap;
        let mut kept = Vec::with_capacity(children.len());
        for (seg, child) in SetBits(bitmap).zip(children) {
            if child.is_empty() {
                trace!("floating empty child out of segment {}", seg);
                bm &= !bit_pos(seg);
            } else {
                kept.push(child);
            }
        }
        build_node(bm, kept)
    } else {
        build_node(bitmap, children)
    }
}

//------------ Structural walks ----------------------------------------------

// Validity check: bitmap-size invariant, per-variant arity, no Empty
// below the root, and every leaf's key agreeing with the segments that
// were descended to reach it.
pub(crate) fn check_at<V>(
    node: &Node<V>,
    depth: usize,
    prefix: &mut [u8; PATH_LEN],
    is_root: bool,
) -> Result<(), KeyMapError> {
    match node {
        Node::Empty => {
            if is_root {
                Ok(())
            } else {
                Err(KeyMapError::EmptyChild { depth })
            }
        }
        Node::Leaf(key, _) => {
            if key.segments()[..depth] == prefix[..depth] {
                Ok(())
            } else {
                Err(KeyMapError::MisplacedLeaf { depth })
            }
        }
        _ => {
            if depth >= PATH_LEN {
                return Err(KeyMapError::TrieTooDeep { depth });
            }
            if let Node::One(seg, _) = node {
                if *seg > 63 {
                    return Err(KeyMapError::SegmentOutOfRange {
                        segment: *seg,
                    });
                }
            }
            let (bm, kids) = node.parts().expect("interior variant");
            if bm.count_ones() as usize != kids.len() {
                return Err(KeyMapError::BitmapLengthMismatch {
                    populated: bm.count_ones(),
                    children: kids.len(),
                });
            }
            let arity_ok = match node {
                Node::One(..) => kids.len() == 1,
                Node::Two(..) => kids.len() == 2,
                Node::Sparse(..) => (3..=63).contains(&kids.len()),
                Node::Full(..) => kids.len() == 64,
                _ => unreachable!(),
            };
            if !arity_ok {
                return Err(KeyMapError::ArityOutOfRange {
                    arity: kids.len(),
                });
            }
            for (seg, child) in SetBits(bm).zip(kids) {
                prefix[depth] = seg;
                check_at(child, depth + 1, prefix, false)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn stats_at<V>(node: &Node<V>, depth: usize, stats: &mut TrieStats) {
    match node {
        Node::Empty => {}
        Node::Leaf(..) => {
            stats.leaf_count += 1;
            stats.inc(depth);
        }
        _ => {
            let (_, kids) = node.parts().expect("interior variant");
            stats.inc(depth);
            stats.inc_arity(kids.len());
            for child in kids {
                stats_at(child, depth + 1, stats);
            }
        }
    }
}

//------------ Tests ---------------------------------------------------------
