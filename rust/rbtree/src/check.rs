// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Structural validation of a red-black tree.

use std::cmp::Ordering;

use thiserror::Error;

use crate::tree::{NodeKey, RbTree};

/// A broken red-black tree property.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    #[error("root node is red")]
    RedRoot,

    #[error("red node has a red child")]
    RedChild,

    #[error("black height differs between subtrees ({left} vs {right})")]
    BlackHeight { left: usize, right: usize },

    #[error("child is on the wrong side of its parent")]
    Order,

    #[error("reachable node count {reachable} differs from arena size {stored}")]
    Count { reachable: usize, stored: usize },
}

impl<T, F> RbTree<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Validates every red-black property and returns the black height.
    ///
    /// An empty tree is valid with black height 0.
    pub fn check(&self) -> Result<usize, Violation> {
        if self.root.is_some_and(|r| self.nodes[r].red) {
            return Err(Violation::RedRoot);
        }
        let mut reachable = 0;
        let height = self.check_subtree(self.root, &mut reachable)?;
        if reachable != self.nodes.len() {
            return Err(Violation::Count {
                reachable,
                stored: self.nodes.len(),
            });
        }
        Ok(height)
    }

    fn check_subtree(&self, key: Option<NodeKey>, count: &mut usize) -> Result<usize, Violation> {
        let Some(k) = key else {
            return Ok(1);
        };
        *count += 1;
        let node = &self.nodes[k];
        let [l, r] = node.link;

        if node.red && (l.is_some_and(|c| self.nodes[c].red) || r.is_some_and(|c| self.nodes[c].red)) {
            return Err(Violation::RedChild);
        }
        if let Some(c) = l {
            if self.compare(&self.nodes[c].data, &node.data) != Ordering::Less {
                return Err(Violation::Order);
            }
        }
        if let Some(c) = r {
            if self.compare(&self.nodes[c].data, &node.data) != Ordering::Greater {
                return Err(Violation::Order);
            }
        }

        let left = self.check_subtree(l, count)?;
        let right = self.check_subtree(r, count)?;
        if left != right {
            return Err(Violation::BlackHeight { left, right });
        }
        Ok(left + usize::from(!node.red))
    }
}
