// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-order traversal with an explicit stack.

use std::cmp::Ordering;

use slotmap::SlotMap;

use crate::tree::{NodeKey, RbTree, TreeNode};

/// Ascending iterator over a tree's records.
///
/// Holds at most one stack entry per level of the tree, so memory stays
/// logarithmic in the tree size.
pub struct Iter<'a, T> {
    nodes: &'a SlotMap<NodeKey, TreeNode<T>>,
    root: Option<NodeKey>,
    stack: Vec<NodeKey>,
}

impl<'a, T> Iter<'a, T> {
    pub(crate) fn new(nodes: &'a SlotMap<NodeKey, TreeNode<T>>, root: Option<NodeKey>) -> Self {
        let mut iter = Self {
            nodes,
            root,
            stack: Vec::with_capacity(32),
        };
        iter.push_left(root);
        iter
    }

    /// Restarts the traversal at the smallest record.
    pub fn rewind(&mut self) {
        self.stack.clear();
        self.push_left(self.root);
    }

    fn push_left(&mut self, mut cur: Option<NodeKey>) {
        while let Some(k) = cur {
            self.stack.push(k);
            cur = self.nodes[k].link[0];
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.stack.pop()?;
        let node = &self.nodes[k];
        self.push_left(node.link[1]);
        Some(&node.data)
    }
}

impl<T, F> RbTree<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Iterates all records in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(&self.nodes, self.root)
    }

    /// Iterates records in ascending order, starting at the first record
    /// that does not compare less than `key`.
    pub fn iter_from(&self, key: &T) -> Iter<'_, T> {
        let mut iter = Iter {
            nodes: &self.nodes,
            root: self.root,
            stack: Vec::with_capacity(32),
        };
        let mut cur = self.root;
        while let Some(k) = cur {
            let node = &self.nodes[k];
            if self.compare(&node.data, key) == Ordering::Less {
                cur = node.link[1];
            } else {
                iter.stack.push(k);
                cur = node.link[0];
            }
        }
        iter
    }
}

impl<'a, T, F> IntoIterator for &'a RbTree<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
