//! Projection of the live fiber tree into a serialisable display tree.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::fiber::{FiberProvider, FiberRef, FiberTag};
use crate::identity::FiberIdRegistry;

const TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::tree");

/// One node of the projected display tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTreeNode {
    /// Durable identifier, stable across rebuilds while the node stays
    /// mounted.
    pub id: String,
    /// Display name shown in the panel.
    pub name: String,
    /// Node classification.
    pub tag: FiberTag,
    /// Reconciliation key, when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Child nodes in tree order.
    pub children: Vec<DisplayTreeNode>,
}

/// Controls for the projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeOptions {
    /// Keep host element nodes in the projection instead of splicing their
    /// children up to the nearest kept ancestor.
    pub include_host_elements: bool,
}

/// Projects the current fiber tree into a display tree.
///
/// The projection is resilient by construction: a node that cannot be
/// observed is logged and skipped together with its subtree, and a cyclic
/// child or sibling chain terminates the affected branch instead of hanging
/// the rebuild. Returns `None` when no tree is mounted or the root itself
/// is unobservable.
///
/// Host text nodes are never projected. Host element nodes are projected
/// only when [`TreeOptions::include_host_elements`] is set; otherwise their
/// children are reparented onto the nearest kept ancestor, preserving
/// order.
pub fn build_display_tree(
    provider: &dyn FiberProvider,
    ids: &mut FiberIdRegistry,
    options: TreeOptions,
) -> Option<DisplayTreeNode> {
    let root = match provider.root() {
        Ok(Some(root)) => root,
        Ok(None) => return None,
        Err(error) => {
            tracing::warn!(target: TARGET, %error, "root unobservable, skipping rebuild");
            return None;
        }
    };

    let mut walker = Walker {
        provider,
        ids,
        options,
        visited: HashSet::new(),
    };
    let mut path = Vec::new();
    let children = walker.collect_children(root, &mut path);

    Some(DisplayTreeNode {
        id: walker.ids.id_for(&path),
        name: FiberTag::HostRoot.default_name().to_owned(),
        tag: FiberTag::HostRoot,
        key: None,
        children,
    })
}

struct Walker<'a> {
    provider: &'a dyn FiberProvider,
    ids: &'a mut FiberIdRegistry,
    options: TreeOptions,
    visited: HashSet<FiberRef>,
}

impl Walker<'_> {
    /// Walks the sibling chain under `parent`, appending projected nodes.
    fn collect_children(&mut self, parent: FiberRef, path: &mut Vec<u32>) -> Vec<DisplayTreeNode> {
        let mut out = Vec::new();
        let mut cursor = match self.provider.child(parent) {
            Ok(first) => first,
            Err(error) => {
                tracing::warn!(target: TARGET, %error, "children unobservable, truncating branch");
                return out;
            }
        };
        let mut index = 0_u32;
        while let Some(fiber) = cursor {
            if !self.visited.insert(fiber) {
                tracing::warn!(target: TARGET, ?fiber, "cycle in fiber tree, truncating branch");
                break;
            }
            path.push(index);
            self.project(fiber, path, &mut out);
            path.pop();
            index = index.saturating_add(1);
            cursor = match self.provider.sibling(fiber) {
                Ok(next) => next,
                Err(error) => {
                    tracing::warn!(target: TARGET, %error, "sibling unobservable, truncating branch");
                    None
                }
            };
        }
        out
    }

    /// Projects a single fiber, appending zero or more nodes to `out`.
    fn project(&mut self, fiber: FiberRef, path: &mut Vec<u32>, out: &mut Vec<DisplayTreeNode>) {
        let tag = match self.provider.tag(fiber) {
            Ok(tag) => tag,
            Err(error) => {
                tracing::warn!(target: TARGET, %error, "node unobservable, skipping subtree");
                return;
            }
        };

        if tag == FiberTag::HostText {
            return;
        }
        if tag.is_host() && !self.options.include_host_elements {
            // Splice the host element's children onto the kept ancestor.
            out.extend(self.collect_children(fiber, path));
            return;
        }

        let name = self.resolve_name(fiber, tag);
        let key = self.provider.key(fiber).ok().flatten();
        let id = self.ids.id_for(path);
        let children = self.collect_children(fiber, path);
        out.push(DisplayTreeNode {
            id,
            name,
            tag,
            key,
            children,
        });
    }

    fn resolve_name(&self, fiber: FiberRef, tag: FiberTag) -> String {
        match self.provider.display_name(fiber) {
            Ok(Some(name)) if !name.is_empty() => name,
            Ok(_) => tag.default_name().to_owned(),
            Err(error) => {
                tracing::debug!(target: TARGET, %error, "name unobservable, using fallback");
                tag.default_name().to_owned()
            }
        }
    }
}
