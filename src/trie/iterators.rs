use std::sync::Arc;

use crate::types::key::Key256;

use super::node::Node;
use super::KeyMap;

//------------ Iter ----------------------------------------------------------

/// Iterates all entries in ascending key order.
///
/// Keeps an explicit stack of the nodes still to visit; children are
/// pushed in reverse so the lowest segment pops first.
pub struct Iter<'a, V> {
    stack: Vec<&'a Node<V>>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (&'a Key256, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(node) = self.stack.pop() {
            match node {
                Node::Empty => {}
                Node::Leaf(key, value) => return Some((key, &**value)),
                _ => {
                    let (_, kids) = node.parts().expect("interior variant");
                    for child in kids.iter().rev() {
                        self.stack.push(&**child);
                    }
                }
            }
        }
        None
    }
}

impl<V> KeyMap<V> {
    /// All entries in ascending key order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            stack: vec![&*self.root],
        }
    }

    /// All keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &Key256> {
        self.iter().map(|(key, _)| key)
    }

    /// The entries in ascending key order, values as shared handles.
    pub fn to_list(&self) -> Vec<(Key256, Arc<V>)> {
        let mut out = Vec::new();
        entries_at(&self.root, &mut out);
        out
    }

    /// Builds a map from key/value pairs; on duplicate keys the last
    /// pair wins.
    pub fn from_list<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Key256, V)>,
    {
        entries.into_iter().collect()
    }

    /// [`from_list`][Self::from_list] for values that are already
    /// shared; re-inserting the entries of [`to_list`][Self::to_list]
    /// reproduces a map equal to the original, sharing all its values.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Key256, Arc<V>)>,
    {
        entries.into_iter().collect()
    }
}

fn entries_at<V>(node: &Node<V>, out: &mut Vec<(Key256, Arc<V>)>) {
    match node {
        Node::Empty => {}
        Node::Leaf(key, value) => out.push((*key, Arc::clone(value))),
        _ => {
            let (_, kids) = node.parts().expect("interior variant");
            for child in kids {
                entries_at(child, out);
            }
        }
    }
}

//------------ Conversion traits ---------------------------------------------

impl<V> FromIterator<(Key256, V)> for KeyMap<V> {
    fn from_iter<I: IntoIterator<Item = (Key256, V)>>(iter: I) -> Self {
        let mut map = KeyMap::new();
        map.extend(iter);
        map
    }
}

impl<V> FromIterator<(Key256, Arc<V>)> for KeyMap<V> {
    fn from_iter<I: IntoIterator<Item = (Key256, Arc<V>)>>(iter: I) -> Self {
        let mut map = KeyMap::new();
        map.extend(iter);
        map
    }
}

impl<V> Extend<(Key256, V)> for KeyMap<V> {
    fn extend<I: IntoIterator<Item = (Key256, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.root = self.insert(key, value).root;
        }
    }
}

impl<V> Extend<(Key256, Arc<V>)> for KeyMap<V> {
    fn extend<I: IntoIterator<Item = (Key256, Arc<V>)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.root = self.insert_shared(key, value).root;
        }
    }
}

impl<'a, V> IntoIterator for &'a KeyMap<V> {
    type Item = (&'a Key256, &'a V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
