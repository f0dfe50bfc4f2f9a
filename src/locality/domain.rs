//! Locality domains and tag lookup.
//!
//! The locality hierarchy is a tree of nested domains: the whole job at
//! the root, then one domain per node, module, NUMA node, and finally one
//! core-scope leaf per unit. A domain is addressed by its dot-path tag:
//! `.` for the root, `.1.0` for the first module on the second node.

use core::fmt;

use crate::error::{Error, ErrorKind, Result};
use crate::types::UnitId;

use super::hwinfo::HwInfo;

/// Nesting level of a locality domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DomainScope {
    /// The whole job.
    Global,
    /// One physical node.
    Node,
    /// One processing module within a node.
    Module,
    /// One NUMA node within a module.
    Numa,
    /// One core; the leaf scope, owning exactly one unit.
    Core,
}

impl DomainScope {
    /// The scope one level below, if any.
    #[must_use]
    pub const fn child_scope(self) -> Option<Self> {
        match self {
            Self::Global => Some(Self::Node),
            Self::Node => Some(Self::Module),
            Self::Module => Some(Self::Numa),
            Self::Numa => Some(Self::Core),
            Self::Core => None,
        }
    }
}

impl fmt::Display for DomainScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Global => "global",
            Self::Node => "node",
            Self::Module => "module",
            Self::Numa => "numa",
            Self::Core => "core",
        };
        f.write_str(name)
    }
}

/// One domain in the locality tree.
///
/// Children are owned by their parent; the parent relationship is the
/// tree structure itself and lookups always descend from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocalityDomain {
    /// Nesting level kind.
    pub scope: DomainScope,
    /// Dot-path tag from the root (`.` for the root itself).
    pub tag: String,
    /// Host this domain lives on (the first node's host at global scope).
    pub host: String,
    /// Depth in the tree; the root is level 0.
    pub level: usize,
    /// Index of this domain in its parent's child array.
    pub relative_index: usize,
    /// Node this domain belongs to (its own index at node scope).
    pub node_id: usize,
    /// Units owned by this domain, in ascending order.
    pub unit_ids: Vec<UnitId>,
    /// Hardware description, inherited from the parent with per-scope
    /// counts overridden.
    pub hwinfo: HwInfo,
    /// Child domains, one scope further down.
    pub children: Vec<LocalityDomain>,
}

impl LocalityDomain {
    /// Returns `true` for core-scope leaves.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Resolves a dot-path tag relative to this domain.
    ///
    /// Fails with an invalid-argument error when a tag part is not a
    /// number, indexes past a child array, or descends below a leaf.
    pub fn find(&self, tag: &str) -> Result<&LocalityDomain> {
        let rest = tag.strip_prefix('.').ok_or_else(|| bad_tag(tag))?;
        let mut domain = self;
        if rest.is_empty() {
            return Ok(domain);
        }
        for part in rest.split('.') {
            let index: usize = part.parse().map_err(|_| bad_tag(tag))?;
            domain = domain.children.get(index).ok_or_else(|| {
                Error::with_detail(
                    ErrorKind::UnknownDomainTag,
                    format!(
                        "{tag}: index {index} out of bounds ({} subdomains at {})",
                        domain.children.len(),
                        domain.tag
                    ),
                )
            })?;
        }
        Ok(domain)
    }

    /// Visits this domain and all descendants depth-first.
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a LocalityDomain)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}

fn bad_tag(tag: &str) -> Error {
    Error::with_detail(ErrorKind::UnknownDomainTag, tag.to_string())
}

impl fmt::Display for LocalityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} domain {} ({} units, {} subdomains)",
            self.scope,
            self.tag,
            self.unit_ids.len(),
            self.children.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(tag: &str, relative_index: usize) -> LocalityDomain {
        LocalityDomain {
            scope: DomainScope::Core,
            tag: tag.to_string(),
            host: "h0".to_string(),
            level: 1,
            relative_index,
            node_id: 0,
            unit_ids: vec![UnitId::new(relative_index as u16)],
            hwinfo: HwInfo::single_core(),
            children: Vec::new(),
        }
    }

    fn small_tree() -> LocalityDomain {
        LocalityDomain {
            scope: DomainScope::Global,
            tag: ".".to_string(),
            host: "h0".to_string(),
            level: 0,
            relative_index: 0,
            node_id: 0,
            unit_ids: vec![UnitId::new(0), UnitId::new(1)],
            hwinfo: HwInfo::single_core(),
            children: vec![leaf(".0", 0), leaf(".1", 1)],
        }
    }

    #[test]
    fn root_tag_resolves_to_root() {
        let tree = small_tree();
        assert_eq!(tree.find(".").unwrap().tag, ".");
    }

    #[test]
    fn descent_by_index() {
        let tree = small_tree();
        assert_eq!(tree.find(".1").unwrap().tag, ".1");
    }

    #[test]
    fn out_of_range_index_is_invalid() {
        let tree = small_tree();
        let err = tree.find(".9").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownDomainTag);
    }

    #[test]
    fn descending_below_a_leaf_is_invalid() {
        let tree = small_tree();
        assert!(tree.find(".0.0").is_err());
    }

    #[test]
    fn garbage_tags_are_invalid() {
        let tree = small_tree();
        assert!(tree.find("").is_err());
        assert!(tree.find("1").is_err());
        assert!(tree.find(".x").is_err());
    }

    #[test]
    fn scope_ladder() {
        assert_eq!(DomainScope::Global.child_scope(), Some(DomainScope::Node));
        assert_eq!(DomainScope::Numa.child_scope(), Some(DomainScope::Core));
        assert_eq!(DomainScope::Core.child_scope(), None);
    }
}
