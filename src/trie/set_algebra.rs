use std::sync::Arc;

use log::trace;

use crate::types::key::Key256;

use super::bitmap::{bit_pos, sparse_index, SetBits};
use super::node::{build_node, drop_empty, Node};
use super::{get_at, insert_at, KeyMap};

//------------ Union ---------------------------------------------------------

impl<V> KeyMap<V> {
    /// Left-biased union: on a common key the entry of `self` wins.
    pub fn union(&self, other: &Self) -> Self {
        self.union_with_key(|_, left, _| Arc::clone(left), other)
    }

    /// Union resolving common keys through `combine(left, right)`.
    pub fn union_with<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&Arc<V>, &Arc<V>) -> Arc<V>,
    {
        self.union_with_key(|_, left, right| combine(left, right), other)
    }

    /// Union resolving common keys through `combine(key, left, right)`,
    /// where `left` is always the value out of `self` and `right` the
    /// value out of `other`, regardless of which side the recursion
    /// reached a leaf on first.
    pub fn union_with_key<F>(&self, mut combine: F, other: &Self) -> Self
    where
        F: FnMut(&Key256, &Arc<V>, &Arc<V>) -> Arc<V>,
    {
        KeyMap {
            root: union_at(&self.root, &other.root, 0, &mut combine),
        }
    }
}

fn union_at<V, F>(
    a: &Arc<Node<V>>,
    b: &Arc<Node<V>>,
    depth: usize,
    combine: &mut F,
) -> Arc<Node<V>>
where
    F: FnMut(&Key256, &Arc<V>, &Arc<V>) -> Arc<V>,
{
    match (&**a, &**b) {
        (Node::Empty, _) => Arc::clone(b),
        (_, Node::Empty) => Arc::clone(a),
        (Node::Leaf(key, value), _) => {
            // The left entry sinks into the right map. Insert hands the
            // combiner (new, old) = (left value, right value), which is
            // already the order the caller was promised.
            let path = key.segments();
            insert_at(b, *key, Arc::clone(value), &path[depth..], combine)
        }
        (_, Node::Leaf(key, value)) => {
            // Mirrored: what insert calls `new` is the right value now,
            // so flip the arguments to keep the (left, right) contract.
            let path = key.segments();
            let mut flipped =
                |k: &Key256, new: &Arc<V>, old: &Arc<V>| combine(k, old, new);
            insert_at(a, *key, Arc::clone(value), &path[depth..], &mut flipped)
        }
        _ => {
            let (bm_a, kids_a) = a.parts().expect("interior variant");
            let (bm_b, kids_b) = b.parts().expect("interior variant");
            let bm = bm_a | bm_b;
            let mut kids = Vec::with_capacity(bm.count_ones() as usize);
            let mut all_a = bm == bm_a;
            let mut all_b = bm == bm_b;
            for seg in SetBits(bm) {
                let mask = bit_pos(seg);
                let child = match (bm_a & mask != 0, bm_b & mask != 0) {
                    (true, false) => {
                        all_b = false;
                        Arc::clone(&kids_a[sparse_index(bm_a, mask)])
                    }
                    (false, true) => {
                        all_a = false;
                        Arc::clone(&kids_b[sparse_index(bm_b, mask)])
                    }
                    (true, true) => {
                        let left = &kids_a[sparse_index(bm_a, mask)];
                        let right = &kids_b[sparse_index(bm_b, mask)];
                        let merged = union_at(left, right, depth + 1, combine);
                        all_a &= Arc::ptr_eq(&merged, left);
                        all_b &= Arc::ptr_eq(&merged, right);
                        merged
                    }
                    (false, false) => unreachable!(),
                };
                kids.push(child);
            }
            // Union produced an unchanged side: reuse its node wholesale.
            if all_a {
                trace!("union reuses left subtree at depth {}", depth);
                return Arc::clone(a);
            }
            if all_b {
                trace!("union reuses right subtree at depth {}", depth);
                return Arc::clone(b);
            }
            build_node(bm, kids)
        }
    }
}

//------------ Intersection --------------------------------------------------

impl<V> KeyMap<V> {
    /// Left-biased intersection: the entries of `self` whose keys also
    /// appear in `other`.
    pub fn intersection<U>(&self, other: &KeyMap<U>) -> Self {
        self.intersection_with_key(|_, left, _| Arc::clone(left), other)
    }

    /// Intersection combining both values for every common key.
    pub fn intersection_with<U, W, F>(
        &self,
        mut combine: F,
        other: &KeyMap<U>,
    ) -> KeyMap<W>
    where
        F: FnMut(&Arc<V>, &Arc<U>) -> Arc<W>,
    {
        self.intersection_with_key(|_, left, right| combine(left, right), other)
    }

    /// Intersection combining key and both values for every common key.
    pub fn intersection_with_key<U, W, F>(
        &self,
        mut combine: F,
        other: &KeyMap<U>,
    ) -> KeyMap<W>
    where
        F: FnMut(&Key256, &Arc<V>, &Arc<U>) -> Arc<W>,
    {
        self.intersection_when(
            |key, left, right| Some(combine(key, left, right)),
            other,
        )
    }

    /// Intersection in which the combiner may suppress a common key by
    /// returning `None`.
    pub fn intersection_when<U, W, F>(
        &self,
        mut combine: F,
        other: &KeyMap<U>,
    ) -> KeyMap<W>
    where
        F: FnMut(&Key256, &Arc<V>, &Arc<U>) -> Option<Arc<W>>,
    {
        KeyMap {
            root: intersect_at(&self.root, &other.root, 0, &mut combine),
        }
    }

    /// Folds `accum` over the common keys of both maps in ascending key
    /// order, without building a result map. Disjoint subtrees are
    /// skipped wholesale.
    pub fn fold_over_intersection<U, A, F>(
        &self,
        other: &KeyMap<U>,
        seed: A,
        mut accum: F,
    ) -> A
    where
        F: FnMut(A, &Key256, &Arc<V>, &Arc<U>) -> A,
    {
        fold_intersection_at(&self.root, &other.root, 0, seed, &mut accum)
    }

    /// The entries of `self` whose keys appear in `keys` (the values of
    /// `keys` are ignored).
    pub fn restrict_keys<U>(&self, keys: &KeyMap<U>) -> Self {
        self.intersection(keys)
    }

    /// The entries of `self` whose keys do not appear in `keys`.
    pub fn without_keys<U>(&self, keys: &KeyMap<U>) -> Self {
        self.fold_over_intersection(keys, self.clone(), |acc, key, _, _| {
            acc.remove(key)
        })
    }
}

fn intersect_at<U, V, W, F>(
    a: &Arc<Node<U>>,
    b: &Arc<Node<V>>,
    depth: usize,
    combine: &mut F,
) -> Arc<Node<W>>
where
    F: FnMut(&Key256, &Arc<U>, &Arc<V>) -> Option<Arc<W>>,
{
    match (&**a, &**b) {
        (Node::Empty, _) | (_, Node::Empty) => Arc::new(Node::Empty),
        (Node::Leaf(key, left), _) => {
            // A lone leaf degenerates to a probe of the other side.
            match get_at(b, key, &key.segments()[depth..]) {
                Some(right) => match combine(key, left, right) {
                    Some(merged) => Arc::new(Node::Leaf(*key, merged)),
                    None => Arc::new(Node::Empty),
                },
                None => Arc::new(Node::Empty),
            }
        }
        (_, Node::Leaf(key, right)) => {
            match get_at(a, key, &key.segments()[depth..]) {
                Some(left) => match combine(key, left, right) {
                    Some(merged) => Arc::new(Node::Leaf(*key, merged)),
                    None => Arc::new(Node::Empty),
                },
                None => Arc::new(Node::Empty),
            }
        }
        _ => {
            let (bm_a, kids_a) = a.parts().expect("interior variant");
            let (bm_b, kids_b) = b.parts().expect("interior variant");
            let bm = bm_a & bm_b;
            let mut kids = Vec::with_capacity(bm.count_ones() as usize);
            for seg in SetBits(bm) {
                let mask = bit_pos(seg);
                kids.push(intersect_at(
                    &kids_a[sparse_index(bm_a, mask)],
                    &kids_b[sparse_index(bm_b, mask)],
                    depth + 1,
                    combine,
                ));
            }
            // Subtrees with no common key came back Empty; float them.
            drop_empty(bm, kids)
        }
    }
}

fn fold_intersection_at<U, V, A, F>(
    a: &Arc<Node<U>>,
    b: &Arc<Node<V>>,
    depth: usize,
    mut acc: A,
    accum: &mut F,
) -> A
where
    F: FnMut(A, &Key256, &Arc<U>, &Arc<V>) -> A,
{
    match (&**a, &**b) {
        (Node::Empty, _) | (_, Node::Empty) => acc,
        (Node::Leaf(key, left), _) => {
            match get_at(b, key, &key.segments()[depth..]) {
                Some(right) => accum(acc, key, left, right),
                None => acc,
            }
        }
        (_, Node::Leaf(key, right)) => {
            match get_at(a, key, &key.segments()[depth..]) {
                Some(left) => accum(acc, key, left, right),
                None => acc,
            }
        }
        _ => {
            let (bm_a, kids_a) = a.parts().expect("interior variant");
            let (bm_b, kids_b) = b.parts().expect("interior variant");
            for seg in SetBits(bm_a & bm_b) {
                let mask = bit_pos(seg);
                acc = fold_intersection_at(
                    &kids_a[sparse_index(bm_a, mask)],
                    &kids_b[sparse_index(bm_b, mask)],
                    depth + 1,
                    acc,
                    accum,
                );
            }
            acc
        }
    }
}

//------------ Leapfrog intersection -----------------------------------------

impl<V> KeyMap<V> {
    /// The smallest entry with a key at or above `key`, together with the
    /// map of everything strictly greater than that entry.
    pub fn lub(&self, key: &Key256) -> Option<((Key256, Arc<V>), Self)> {
        let (_, exact, greater) = self.split_lookup(key);
        match exact {
            Some(value) => Some(((*key, value), greater)),
            None => greater.min_view(),
        }
    }

    /// The larger of the two minimum keys, or `None` when either map is
    /// empty.
    pub fn max_min_of<U>(x: &Self, y: &KeyMap<U>) -> Option<Key256> {
        let (kx, _) = x.lookup_min()?;
        let (ky, _) = y.lookup_min()?;
        Some(kx.max(ky))
    }

    /// One leapfrog run starting at `key`: alternately advances a cursor
    /// through either map to the other's current minimum, collecting the
    /// keys both maps contain into `acc`. Values are taken from `x`.
    pub fn leapfrog<U>(
        key: Key256,
        x: &Self,
        y: &KeyMap<U>,
        acc: Self,
    ) -> Self {
        let mut probe = key;
        let mut x = x.clone();
        let mut y = y.clone();
        let mut acc = acc;
        loop {
            let Some(((kx, value), x_rest)) = x.lub(&probe) else {
                return acc;
            };
            let Some(((ky, _), y_rest)) = y.lub(&probe) else {
                return acc;
            };
            if kx == ky {
                acc = acc.insert_shared(kx, value);
            }
            x = x_rest;
            y = y_rest;
            // Each lub consumed everything at or below its own minimum,
            // so at least one cursor advanced strictly past `probe`.
            match Self::max_min_of(&x, &y) {
                Some(next) => probe = next,
                None => return acc,
            }
        }
    }

    /// Ordered intersection of two maps by leapfrogging between their
    /// minima; worthwhile when the sizes differ widely. Values are taken
    /// from `self`. Agrees with [`intersection`][Self::intersection].
    pub fn leapfrog_intersect<U>(&self, other: &KeyMap<U>) -> Self {
        match Self::max_min_of(self, other) {
            Some(start) => {
                Self::leapfrog(start, self, other, KeyMap::new())
            }
            None => KeyMap::new(),
        }
    }
}
