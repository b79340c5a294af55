use std::sync::Arc;

use crate::types::key::Key256;

use super::bitmap::{bit_pos, index_from_segment, split_bitmap};
use super::node::{build_node, Node};
use super::{sparse_vec, KeyMap};

//------------ Split ---------------------------------------------------------

impl<V> KeyMap<V> {
    /// Splits the map around `key` into the entries below it, the value
    /// stored at it (if any), and the entries above it.
    pub fn split_lookup(&self, key: &Key256) -> (Self, Option<Arc<V>>, Self) {
        let (less, exact, greater) =
            split_at(&self.root, key, &key.segments());
        (KeyMap { root: less }, exact, KeyMap { root: greater })
    }
}

// Each frame splits the node's bitmap around the current segment and
// splices the recursive split of the selected child back into the sliced
// siblings as the recursion unwinds. Both sides re-normalize through the
// smart constructors, so a side that lost everything collapses.
fn split_at<V>(
    node: &Arc<Node<V>>,
    key: &Key256,
    path: &[u8],
) -> (Arc<Node<V>>, Option<Arc<V>>, Arc<Node<V>>) {
    match &**node {
        Node::Empty => (Arc::new(Node::Empty), None, Arc::new(Node::Empty)),
        Node::Leaf(stored, value) => match stored.cmp(key) {
            std::cmp::Ordering::Less => {
                (Arc::clone(node), None, Arc::new(Node::Empty))
            }
            std::cmp::Ordering::Equal => (
                Arc::new(Node::Empty),
                Some(Arc::clone(value)),
                Arc::new(Node::Empty),
            ),
            std::cmp::Ordering::Greater => {
                (Arc::new(Node::Empty), None, Arc::clone(node))
            }
        },
        _ => {
            let (bm, kids) = node.parts().expect("interior variant");
            let Some((&seg, rest)) = path.split_first() else {
                panic!(
                    "split_lookup: key path exhausted on an interior node"
                );
            };
            let (low_bm, present, high_bm) = split_bitmap(bm, seg);
            let idx = index_from_segment(bm, seg);
            if !present {
                let less =
                    build_node(low_bm, sparse_vec::slice(kids, 0, idx));
                let greater = build_node(
                    high_bm,
                    sparse_vec::slice(kids, idx, kids.len()),
                );
                (less, None, greater)
            } else {
                let (child_less, exact, child_greater) =
                    split_at(&kids[idx], key, rest);
                let less = if child_less.is_empty() {
                    build_node(low_bm, sparse_vec::slice(kids, 0, idx))
                } else {
                    build_node(
                        low_bm | bit_pos(seg),
                        sparse_vec::low_slice(kids, idx, child_less),
                    )
                };
                let greater = if child_greater.is_empty() {
                    build_node(
                        high_bm,
                        sparse_vec::slice(kids, idx + 1, kids.len()),
                    )
                } else {
                    build_node(
                        high_bm | bit_pos(seg),
                        sparse_vec::high_slice(kids, idx, child_greater),
                    )
                };
                (less, exact, greater)
            }
        }
    }
}

//------------ Min/Max views -------------------------------------------------

impl<V> KeyMap<V> {
    /// The smallest entry without removing it.
    pub fn lookup_min(&self) -> Option<(Key256, &V)> {
        let mut node = &*self.root;
        loop {
            match node {
                Node::Empty => return None,
                Node::Leaf(key, value) => return Some((*key, &**value)),
                _ => {
                    let (_, kids) = node.parts().expect("interior variant");
                    node = &*kids[0];
                }
            }
        }
    }

    /// The largest entry without removing it.
    pub fn lookup_max(&self) -> Option<(Key256, &V)> {
        let mut node = &*self.root;
        loop {
            match node {
                Node::Empty => return None,
                Node::Leaf(key, value) => return Some((*key, &**value)),
                _ => {
                    let (_, kids) = node.parts().expect("interior variant");
                    node = &*kids[kids.len() - 1];
                }
            }
        }
    }

    /// The smallest entry together with the map it leaves behind.
    pub fn min_view(&self) -> Option<((Key256, Arc<V>), Self)> {
        min_view_at(&self.root)
            .map(|(entry, rest)| (entry, KeyMap { root: rest }))
    }

    /// The largest entry together with the map it leaves behind.
    pub fn max_view(&self) -> Option<((Key256, Arc<V>), Self)> {
        max_view_at(&self.root)
            .map(|(entry, rest)| (entry, KeyMap { root: rest }))
    }
}

fn min_view_at<V>(
    node: &Arc<Node<V>>,
) -> Option<((Key256, Arc<V>), Arc<Node<V>>)> {
    match &**node {
        Node::Empty => None,
        Node::Leaf(key, value) => {
            Some(((*key, Arc::clone(value)), Arc::new(Node::Empty)))
        }
        _ => {
            let (bm, kids) = node.parts().expect("interior variant");
            let (entry, rest) = min_view_at(&kids[0])?;
            let low_bit = bm & bm.wrapping_neg();
            let out = if rest.is_empty() {
                build_node(bm & !low_bit, sparse_vec::remove_at(kids, 0))
            } else {
                build_node(bm, sparse_vec::update_at(kids, 0, rest))
            };
            Some((entry, out))
        }
    }
}

fn max_view_at<V>(
    node: &Arc<Node<V>>,
) -> Option<((Key256, Arc<V>), Arc<Node<V>>)> {
    match &**node {
        Node::Empty => None,
        Node::Leaf(key, value) => {
            Some(((*key, Arc::clone(value)), Arc::new(Node::Empty)))
        }
        _ => {
            let (bm, kids) = node.parts().expect("interior variant");
            let last = kids.len() - 1;
            let (entry, rest) = max_view_at(&kids[last])?;
            let high_bit = 1u64 << (63 - bm.leading_zeros());
            let out = if rest.is_empty() {
                build_node(bm & !high_bit, sparse_vec::remove_at(kids, last))
            } else {
                build_node(bm, sparse_vec::update_at(kids, last, rest))
            };
            Some((entry, out))
        }
    }
}

//------------ Folds and transforms ------------------------------------------

impl<V> KeyMap<V> {
    /// Folds over all entries in ascending key order.
    pub fn fold_asc<A, F>(&self, seed: A, mut f: F) -> A
    where
        F: FnMut(A, &Key256, &V) -> A,
    {
        fold_asc_at(&self.root, seed, &mut f)
    }

    /// Folds over all entries in descending key order.
    pub fn fold_desc<A, F>(&self, seed: A, mut f: F) -> A
    where
        F: FnMut(A, &Key256, &V) -> A,
    {
        fold_desc_at(&self.root, seed, &mut f)
    }

    /// Maps every value through `f`, preserving the trie shape.
    pub fn map_with_key<W, F>(&self, mut f: F) -> KeyMap<W>
    where
        F: FnMut(&Key256, &V) -> W,
    {
        KeyMap {
            root: map_at(&self.root, &mut f),
        }
    }

    /// Effectful [`map_with_key`][Self::map_with_key]: the first error
    /// aborts the walk, which visits entries in ascending key order.
    pub fn traverse_with_key<W, E, F>(&self, mut f: F) -> Result<KeyMap<W>, E>
    where
        F: FnMut(&Key256, &V) -> Result<W, E>,
    {
        Ok(KeyMap {
            root: traverse_at(&self.root, &mut f)?,
        })
    }
}

fn fold_asc_at<V, A, F>(node: &Node<V>, mut acc: A, f: &mut F) -> A
where
    F: FnMut(A, &Key256, &V) -> A,
{
    match node {
        Node::Empty => acc,
        Node::Leaf(key, value) => f(acc, key, &**value),
        _ => {
            let (_, kids) = node.parts().expect("interior variant");
            for child in kids {
                acc = fold_asc_at(child, acc, f);
            }
            acc
        }
    }
}

fn fold_desc_at<V, A, F>(node: &Node<V>, mut acc: A, f: &mut F) -> A
where
    F: FnMut(A, &Key256, &V) -> A,
{
    match node {
        Node::Empty => acc,
        Node::Leaf(key, value) => f(acc, key, &**value),
        _ => {
            let (_, kids) = node.parts().expect("interior variant");
            for child in kids.iter().rev() {
                acc = fold_desc_at(child, acc, f);
            }
            acc
        }
    }
}

fn map_at<V, W, F>(node: &Node<V>, f: &mut F) -> Arc<Node<W>>
where
    F: FnMut(&Key256, &V) -> W,
{
    match node {
        Node::Empty => Arc::new(Node::Empty),
        Node::Leaf(key, value) => {
            Arc::new(Node::Leaf(*key, Arc::new(f(key, &**value))))
        }
        Node::One(seg, child) => Arc::new(Node::One(*seg, map_at(child, f))),
        Node::Two(bm, kids) => Arc::new(Node::Two(
            *bm,
            kids.iter().map(|c| map_at(c, f)).collect(),
        )),
        Node::Sparse(bm, kids) => Arc::new(Node::Sparse(
            *bm,
            kids.iter().map(|c| map_at(c, f)).collect(),
        )),
        Node::Full(kids) => Arc::new(Node::Full(
            kids.iter().map(|c| map_at(c, f)).collect(),
        )),
    }
}

fn traverse_at<V, W, E, F>(node: &Node<V>, f: &mut F) -> Result<Arc<Node<W>>, E>
where
    F: FnMut(&Key256, &V) -> Result<W, E>,
{
    match node {
        Node::Empty => Ok(Arc::new(Node::Empty)),
        Node::Leaf(key, value) => {
            Ok(Arc::new(Node::Leaf(*key, Arc::new(f(key, &**value)?))))
        }
        Node::One(seg, child) => {
            Ok(Arc::new(Node::One(*seg, traverse_at(child, f)?)))
        }
        Node::Two(bm, kids) => {
            let kids = kids
                .iter()
                .map(|c| traverse_at(c, f))
                .collect::<Result<_, E>>()?;
            Ok(Arc::new(Node::Two(*bm, kids)))
        }
        Node::Sparse(bm, kids) => {
            let kids = kids
                .iter()
                .map(|c| traverse_at(c, f))
                .collect::<Result<_, E>>()?;
            Ok(Arc::new(Node::Sparse(*bm, kids)))
        }
        Node::Full(kids) => {
            let kids = kids
                .iter()
                .map(|c| traverse_at(c, f))
                .collect::<Result<_, E>>()?;
            Ok(Arc::new(Node::Full(kids)))
        }
    }
}
