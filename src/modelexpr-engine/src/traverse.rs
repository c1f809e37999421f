// Copyright 2026 The Modelexpr Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Generic walks over operator trees.

use crate::common::Result;
use crate::op::{ExprTree, NodeId};

/// Read-only pre-order walk.  Returning false skips the node's children.
pub trait Visitor {
    fn visit(&mut self, tree: &ExprTree, id: NodeId) -> bool;
}

impl<F: FnMut(&ExprTree, NodeId) -> bool> Visitor for F {
    fn visit(&mut self, tree: &ExprTree, id: NodeId) -> bool {
        self(tree, id)
    }
}

/// Rewriting walk.  A transformer returns the node to substitute for `id`,
/// or None to leave it in place.  It may also edit `id` in place.
pub trait Transformer {
    fn transform(&mut self, tree: &mut ExprTree, id: NodeId) -> Result<Option<NodeId>>;
}

/// Intercepts rendering.  Returning true means the renderer wrote the node
/// to `out` itself; false falls back to the default infix form.
pub trait Renderer {
    fn render(&mut self, tree: &ExprTree, id: NodeId, out: &mut String) -> bool;
}

impl ExprTree {
    pub fn visit(&self, visitor: &mut impl Visitor) {
        self.visit_from(self.root(), visitor);
    }

    pub fn visit_from(&self, id: NodeId, visitor: &mut impl Visitor) {
        if visitor.visit(self, id) {
            for &child in self.children(id) {
                self.visit_from(child, visitor);
            }
        }
    }

    /// Offer each node to `transformer`, parents first.  A node that is
    /// replaced is not descended into; otherwise its children are offered
    /// in turn.
    pub fn transform(&mut self, transformer: &mut impl Transformer) -> Result<()> {
        let root = self.root();
        self.transform_from(root, transformer)?;
        Ok(())
    }

    /// Returns the id now occupying the position of `id`.
    pub fn transform_from(&mut self, id: NodeId, transformer: &mut impl Transformer) -> Result<NodeId> {
        if let Some(new) = transformer.transform(self, id)? {
            if new != id {
                self.replace(id, new);
            }
            return Ok(new);
        }
        let mut i = 0;
        while i < self.children(id).len() {
            let child = self.child(id, i);
            self.transform_from(child, transformer)?;
            i += 1;
        }
        Ok(id)
    }

    /// Offer each node to `transformer` after its children have been
    /// offered, so a node sees its already-rewritten operands.
    pub fn transform_post_order(&mut self, transformer: &mut impl Transformer) -> Result<()> {
        let root = self.root();
        self.transform_post_order_from(root, transformer)?;
        Ok(())
    }

    pub fn transform_post_order_from(
        &mut self,
        id: NodeId,
        transformer: &mut impl Transformer,
    ) -> Result<NodeId> {
        let mut i = 0;
        while i < self.children(id).len() {
            let child = self.child(id, i);
            self.transform_post_order_from(child, transformer)?;
            i += 1;
        }
        match transformer.transform(self, id)? {
            Some(new) if new != id => {
                self.replace(id, new);
                Ok(new)
            }
            _ => Ok(id),
        }
    }
}
