// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Red-black tree storage, insertion, deletion and exact lookup.
//!
//! Nodes live in a `SlotMap` arena and link to their children by key. There
//! are no parent links: insertion and deletion are single top-down passes
//! that carry the few ancestors they need (great-grandparent, grandparent,
//! parent) in local variables, so tree depth never turns into call depth.

use std::cmp::Ordering;

use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Key of a node inside the tree arena.
    pub(crate) struct NodeKey;
}

const LEFT: usize = 0;
const RIGHT: usize = 1;

/// A tree node. `link[0]` is the left child, `link[1]` the right child.
#[derive(Debug, Clone)]
pub(crate) struct TreeNode<T> {
    pub(crate) data: T,
    pub(crate) red: bool,
    pub(crate) link: [Option<NodeKey>; 2],
}

/// Either the false root above the real root, or a real node.
///
/// The false root only ever has a right child (the real root), which lets
/// rotations at the top of the tree go through the same code as everywhere
/// else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Head,
    Node(NodeKey),
}

/// An ordered set of records keyed by a caller-supplied comparator.
///
/// Records comparing equal are considered the same key: [`RbTree::insert`]
/// keeps the first one and rejects the rest.
///
/// # Example
///
/// ```
/// use vtopo_rbtree::RbTree;
///
/// let mut tree = RbTree::new();
/// assert!(tree.insert(5));
/// assert!(tree.insert(1));
/// assert!(!tree.insert(5));
///
/// assert_eq!(tree.find(&1), Some(&1));
/// assert_eq!(tree.iter().copied().collect::<Vec<_>>(), vec![1, 5]);
/// ```
pub struct RbTree<T, F = fn(&T, &T) -> Ordering> {
    pub(crate) nodes: SlotMap<NodeKey, TreeNode<T>>,
    pub(crate) root: Option<NodeKey>,
    cmp: F,
}

impl<T: Ord> RbTree<T> {
    /// Creates an empty tree ordered by `T`'s own `Ord` implementation.
    pub fn new() -> Self {
        Self::with_comparator(T::cmp)
    }
}

impl<T: Ord> Default for RbTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, F> RbTree<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    /// Creates an empty tree ordered by `cmp`.
    pub fn with_comparator(cmp: F) -> Self {
        Self {
            nodes: SlotMap::with_key(),
            root: None,
            cmp,
        }
    }

    /// Number of records in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    /// Returns the stored record comparing equal to `key`, if any.
    pub fn find(&self, key: &T) -> Option<&T> {
        let mut cur = self.root;
        while let Some(k) = cur {
            let node = &self.nodes[k];
            match (self.cmp)(&node.data, key) {
                Ordering::Equal => return Some(&node.data),
                Ordering::Less => cur = node.link[RIGHT],
                Ordering::Greater => cur = node.link[LEFT],
            }
        }
        None
    }

    pub fn contains(&self, key: &T) -> bool {
        self.find(key).is_some()
    }

    /// Inserts `data` unless an equal record is already present.
    ///
    /// Returns `true` if the record was inserted. A rejected record is
    /// dropped; the tree may still have been recoloured or rotated on the
    /// way down, which keeps it valid.
    pub fn insert(&mut self, data: T) -> bool {
        let Some(root) = self.root else {
            let key = self.nodes.insert(TreeNode {
                data,
                red: false,
                link: [None, None],
            });
            self.root = Some(key);
            return true;
        };

        // t: great-grandparent, g: grandparent, p: parent, q: iterator
        let mut t = Slot::Head;
        let mut g: Option<NodeKey> = None;
        let mut p: Option<NodeKey> = None;
        let mut q = Some(root);
        let mut dir = LEFT;
        let mut last = LEFT;

        let inserted = loop {
            match q {
                None => {
                    let new = self.nodes.insert(TreeNode {
                        data,
                        red: true,
                        link: [None, None],
                    });
                    self.set_link(p.map_or(Slot::Head, Slot::Node), dir, Some(new));
                    self.fix_red_violation(t, g, p, new, last);
                    break true;
                }
                Some(qk) => {
                    let [l, r] = self.nodes[qk].link;
                    if self.is_red(l) && self.is_red(r) {
                        self.nodes[qk].red = true;
                        self.paint_black(l);
                        self.paint_black(r);
                    }
                    self.fix_red_violation(t, g, p, qk, last);

                    let ord = (self.cmp)(&self.nodes[qk].data, &data);
                    if ord == Ordering::Equal {
                        break false;
                    }

                    last = dir;
                    dir = usize::from(ord == Ordering::Less);
                    if let Some(gk) = g {
                        t = Slot::Node(gk);
                    }
                    g = p;
                    p = Some(qk);
                    q = self.nodes[qk].link[dir];
                }
            }
        };

        self.paint_black(self.root);
        inserted
    }

    /// Removes the record comparing equal to `key` and returns it.
    ///
    /// A missing key is a normal outcome and returns `None`.
    pub fn remove(&mut self, key: &T) -> Option<T> {
        self.root?;

        let mut q = Slot::Head;
        let mut p = Slot::Head;
        let mut found: Option<NodeKey> = None;
        let mut dir = RIGHT;

        while let Some(next) = self.link(q, dir) {
            let last = dir;
            let g = p;
            p = q;
            q = Slot::Node(next);

            let ord = (self.cmp)(&self.nodes[next].data, key);
            dir = usize::from(ord == Ordering::Less);
            if ord == Ordering::Equal {
                found = Some(next);
            }

            // Push a red node down the search path.
            if self.is_red(Some(next)) || self.is_red(self.nodes[next].link[dir]) {
                continue;
            }
            if self.is_red(self.nodes[next].link[1 - dir]) {
                let sub = self.rotate_single(next, dir);
                self.set_link(p, last, Some(sub));
                p = Slot::Node(sub);
            } else if let Some(s) = self.link(p, 1 - last) {
                let [sl, sr] = self.nodes[s].link;
                let (s_near, s_far) = if last == LEFT { (sl, sr) } else { (sr, sl) };
                if !self.is_red(s_far) && !self.is_red(s_near) {
                    if let Slot::Node(pk) = p {
                        self.nodes[pk].red = false;
                    }
                    self.nodes[s].red = true;
                    self.nodes[next].red = true;
                } else if let Slot::Node(pk) = p {
                    let dir2 = usize::from(self.link(g, RIGHT) == Some(pk));
                    let sub = if self.is_red(s_near) {
                        self.rotate_double(pk, last)
                    } else {
                        self.rotate_single(pk, last)
                    };
                    self.set_link(g, dir2, Some(sub));

                    self.nodes[next].red = true;
                    self.nodes[sub].red = true;
                    let [a, b] = self.nodes[sub].link;
                    self.paint_black(a);
                    self.paint_black(b);
                }
            }
        }

        let removed = match (found, q) {
            (Some(f), Slot::Node(qk)) => {
                let [l, r] = self.nodes[qk].link;
                let child = if l.is_none() { r } else { l };
                let pdir = usize::from(self.link(p, RIGHT) == Some(qk));
                self.set_link(p, pdir, child);

                let q_node = self.nodes.remove(qk)?;
                if f == qk {
                    Some(q_node.data)
                } else {
                    Some(std::mem::replace(&mut self.nodes[f].data, q_node.data))
                }
            }
            _ => None,
        };

        self.paint_black(self.root);
        removed
    }

    pub(crate) fn compare(&self, a: &T, b: &T) -> Ordering {
        (self.cmp)(a, b)
    }

    fn fix_red_violation(
        &mut self,
        t: Slot,
        g: Option<NodeKey>,
        p: Option<NodeKey>,
        q: NodeKey,
        last: usize,
    ) {
        if !(self.is_red(Some(q)) && self.is_red(p)) {
            return;
        }
        // A red parent is never the root, so the grandparent exists.
        let (Some(gk), Some(pk)) = (g, p) else {
            return;
        };
        let dir2 = usize::from(self.link(t, RIGHT) == Some(gk));
        let sub = if self.nodes[pk].link[last] == Some(q) {
            self.rotate_single(gk, 1 - last)
        } else {
            self.rotate_double(gk, 1 - last)
        };
        self.set_link(t, dir2, Some(sub));
    }

    fn rotate_single(&mut self, root: NodeKey, dir: usize) -> NodeKey {
        let Some(save) = self.nodes[root].link[1 - dir] else {
            return root;
        };
        self.nodes[root].link[1 - dir] = self.nodes[save].link[dir];
        self.nodes[save].link[dir] = Some(root);
        self.nodes[root].red = true;
        self.nodes[save].red = false;
        save
    }

    fn rotate_double(&mut self, root: NodeKey, dir: usize) -> NodeKey {
        if let Some(child) = self.nodes[root].link[1 - dir] {
            let sub = self.rotate_single(child, 1 - dir);
            self.nodes[root].link[1 - dir] = Some(sub);
        }
        self.rotate_single(root, dir)
    }

    fn link(&self, slot: Slot, dir: usize) -> Option<NodeKey> {
        match slot {
            Slot::Head if dir == RIGHT => self.root,
            Slot::Head => None,
            Slot::Node(k) => self.nodes[k].link[dir],
        }
    }

    fn set_link(&mut self, slot: Slot, dir: usize, value: Option<NodeKey>) {
        match slot {
            Slot::Head => {
                debug_assert_eq!(dir, RIGHT, "false root has no left child");
                self.root = value;
            }
            Slot::Node(k) => self.nodes[k].link[dir] = value,
        }
    }

    fn is_red(&self, key: Option<NodeKey>) -> bool {
        key.is_some_and(|k| self.nodes[k].red)
    }

    fn paint_black(&mut self, key: Option<NodeKey>) {
        if let Some(k) = key {
            self.nodes[k].red = false;
        }
    }
}

impl<T: std::fmt::Debug, F> std::fmt::Debug for RbTree<T, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(crate::iter::Iter::new(&self.nodes, self.root))
            .finish()
    }
}

impl<T: Ord> FromIterator<T> for RbTree<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut tree = Self::new();
        tree.extend(iter);
        tree
    }
}

impl<T, F> Extend<T> for RbTree<T, F>
where
    F: Fn(&T, &T) -> Ordering,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.insert(item);
        }
    }
}
