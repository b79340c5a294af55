//------------ Types for Statistics -----------------------------------------

use std::fmt::{Debug, Display};

use crate::types::key::PATH_LEN;

/// Structural statistics of a map, gathered by a full walk of the trie.
///
/// `child_histogram` buckets interior nodes by how many of their 64 slots
/// are populated: bucket `i` counts nodes with `i + 1` populated slots.
/// Leaves and the (possibly empty) root are reported separately.
pub struct TrieStats {
    pub node_size: usize,
    pub nodes_per_depth: Vec<NodeCount>,
    pub leaf_count: usize,
    pub child_histogram: [usize; 64],
}

impl TrieStats {
    pub(crate) fn new(node_size: usize) -> Self {
        // Leaves below a full-length shared prefix sit one level under
        // the last segment, hence the extra slot.
        let mut nodes_per_depth = Vec::with_capacity(PATH_LEN + 1);
        for n in 0..=PATH_LEN {
            nodes_per_depth.push(NodeCount {
                depth_level: n as u8,
                count: 0,
            });
        }
        Self {
            node_size,
            nodes_per_depth,
            leaf_count: 0,
            child_histogram: [0; 64],
        }
    }

    pub fn interior_count(&self) -> usize {
        self.child_histogram.iter().sum()
    }

    pub fn mem_usage(&self) -> usize {
        self.node_size * (self.interior_count() + self.leaf_count)
    }

    pub(crate) fn inc(&mut self, depth_level: usize) {
        self.nodes_per_depth[depth_level].count += 1;
    }

    pub(crate) fn inc_arity(&mut self, populated: usize) {
        self.child_histogram[populated - 1] += 1;
    }
}

impl Debug for TrieStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nodes:{:>8?} leaves:{:>8?} {:?} ({}k)",
            self.interior_count(),
            self.leaf_count,
            &self
                .nodes_per_depth
                .iter()
                .filter(|c| c.count > 0)
                .collect::<Vec<_>>(),
            self.mem_usage() / 1024
        )
    }
}

impl Display for TrieStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nodes:{:>8?} leaves:{:>8?} ({}k)",
            self.interior_count(),
            self.leaf_count,
            self.mem_usage() / 1024
        )
    }
}

#[derive(Copy, Clone)]
pub struct NodeCount {
    pub depth_level: u8,
    pub count: usize,
}

impl Debug for NodeCount {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_fmt(format_args!("/{}: {}", &self.depth_level, &self.count))
    }
}
