// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! # vtopo red-black tree
//!
//! A generic ordered set used by the vector topology engine for its
//! category index. Records are ordered by a caller-supplied comparator;
//! records that compare equal are the same key, so the tree never holds
//! duplicates.
//!
//! Insertion and deletion are single top-down passes with no parent links
//! and no recursion. Traversal uses an explicit stack and can start at an
//! arbitrary key. [`RbTree::check`] validates the structure and is meant
//! for tests.

pub mod check;
pub mod iter;
pub mod tree;

pub use check::Violation;
pub use iter::Iter;
pub use tree::RbTree;
