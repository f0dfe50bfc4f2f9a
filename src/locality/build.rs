//! Locality tree construction.
//!
//! The builder consumes one seed record per unit (host name plus
//! hardware description) and grows the tree scope by scope:
//!
//! - global → one node per distinct host, in order of first appearance
//! - node → one module per sub-host (one, with no accelerator hosts)
//! - module → one NUMA domain per distinct observed `numa_id`
//! - NUMA → one core leaf per unit, by even division
//!
//! Each child inherits its parent's hardware description with the counts
//! of its own scope overridden. Core leaves write their final tag back
//! into the unit records, so "which domain is unit u in?" is answered
//! without walking the tree.
//!
//! NUMA children are indexed by the *rank* of their observed `numa_id`
//! rather than the raw id, so hosts with non-contiguous NUMA numbering
//! still build a complete tree.

use crate::error::{Error, ErrorKind, Result};
use crate::tracing_compat::{debug, trace};
use crate::types::UnitId;

use super::domain::{DomainScope, LocalityDomain};
use super::hwinfo::{HwInfo, UnitLocality};

/// The built locality hierarchy plus the per-unit records it annotated.
#[derive(Debug, Clone)]
pub struct LocalityMap {
    root: LocalityDomain,
    units: Vec<UnitLocality>,
}

impl LocalityMap {
    /// Builds the tree from one seed record per unit.
    ///
    /// Seeds must cover unit ids `0..n` exactly once. Construction fails
    /// outright on any inconsistency; downstream consumers rely on the
    /// tree being complete.
    pub fn build(seeds: Vec<UnitLocality>) -> Result<Self> {
        if seeds.is_empty() {
            return Err(Error::with_detail(
                ErrorKind::InvalidArgument,
                "cannot build a locality tree without units",
            ));
        }
        let mut units = seeds;
        units.sort_by_key(|record| record.unit);
        for (expected, record) in units.iter().enumerate() {
            if usize::from(record.unit.raw()) != expected {
                return Err(Error::with_detail(
                    ErrorKind::InvalidArgument,
                    format!("unit ids must cover 0..{} exactly once", units.len()),
                ));
            }
        }
        for record in &mut units {
            record.hwinfo = record.hwinfo.clamped();
            record.domain_tag = ".".to_string();
        }

        // Distinct hosts in order of first appearance become the nodes.
        let mut hosts: Vec<String> = Vec::new();
        for record in &units {
            if !hosts.iter().any(|host| host == &record.host) {
                hosts.push(record.host.clone());
            }
        }
        debug!(units = units.len(), nodes = hosts.len(), "building locality tree");

        let mut root_hwinfo = units[0].hwinfo;
        root_hwinfo.num_modules = i32::try_from(hosts.len()).unwrap_or(i32::MAX);
        let mut root = LocalityDomain {
            scope: DomainScope::Global,
            tag: ".".to_string(),
            host: hosts[0].clone(),
            level: 0,
            relative_index: 0,
            node_id: 0,
            unit_ids: units.iter().map(|record| record.unit).collect(),
            hwinfo: root_hwinfo,
            children: Vec::new(),
        };

        build_subdomains(&mut root, &mut units, &hosts)?;
        Ok(Self { root, units })
    }

    /// The global-scope root domain.
    #[must_use]
    pub fn root(&self) -> &LocalityDomain {
        &self.root
    }

    /// Resolves a dot-path tag from the root.
    pub fn domain(&self, tag: &str) -> Result<&LocalityDomain> {
        self.root.find(tag)
    }

    /// The locality record of one unit.
    pub fn unit(&self, unit: UnitId) -> Result<&UnitLocality> {
        self.units
            .get(usize::from(unit.raw()))
            .ok_or_else(|| Error::with_detail(ErrorKind::UnknownUnit, format!("{unit}")))
    }

    /// All unit records, ascending by unit id.
    #[must_use]
    pub fn units(&self) -> &[UnitLocality] {
        &self.units
    }
}

/// One planned child during a split.
struct Split {
    host: String,
    node_id: usize,
    unit_ids: Vec<UnitId>,
    hwinfo: HwInfo,
}

fn build_subdomains(
    domain: &mut LocalityDomain,
    units: &mut [UnitLocality],
    hosts: &[String],
) -> Result<()> {
    let Some(child_scope) = domain.scope.child_scope() else {
        return Ok(());
    };

    let splits = match domain.scope {
        DomainScope::Global => split_global(domain, units, hosts),
        DomainScope::Node => split_node(domain, units),
        DomainScope::Module => split_module(domain, units),
        DomainScope::Numa => split_numa(domain),
        DomainScope::Core => Vec::new(),
    };

    let covered: usize = splits.iter().map(|split| split.unit_ids.len()).sum();
    if covered != domain.unit_ids.len() || splits.is_empty() {
        return Err(Error::with_detail(
            ErrorKind::Internal,
            format!(
                "{} domain {} split {covered} of {} units into {} children",
                domain.scope,
                domain.tag,
                domain.unit_ids.len(),
                splits.len()
            ),
        ));
    }

    for (relative_index, split) in splits.into_iter().enumerate() {
        let tag = if domain.level == 0 {
            format!(".{relative_index}")
        } else {
            format!("{}.{relative_index}", domain.tag)
        };
        trace!(scope = %child_scope, %tag, units = split.unit_ids.len(), "subdomain");
        let mut child = LocalityDomain {
            scope: child_scope,
            tag,
            host: split.host,
            level: domain.level + 1,
            relative_index,
            node_id: split.node_id,
            unit_ids: split.unit_ids,
            hwinfo: split.hwinfo,
            children: Vec::new(),
        };

        if child_scope == DomainScope::Core {
            // The leaf owns exactly one unit; annotate its record.
            let unit = child.unit_ids[0];
            let record = &mut units[usize::from(unit.raw())];
            record.domain_tag = child.tag.clone();
            record.host = child.host.clone();
        }

        build_subdomains(&mut child, units, hosts)?;
        domain.children.push(child);
    }
    Ok(())
}

/// Global scope: one node per distinct host.
fn split_global(
    domain: &LocalityDomain,
    units: &[UnitLocality],
    hosts: &[String],
) -> Vec<Split> {
    hosts
        .iter()
        .enumerate()
        .map(|(node_id, host)| {
            let unit_ids = domain
                .unit_ids
                .iter()
                .copied()
                .filter(|unit| &units[usize::from(unit.raw())].host == host)
                .collect::<Vec<_>>();
            let mut hwinfo = domain.hwinfo;
            hwinfo.num_modules = 1;
            hwinfo.num_numa = distinct_numa_ids(&unit_ids, units).len() as i32;
            Split {
                host: host.clone(),
                node_id,
                unit_ids,
                hwinfo,
            }
        })
        .collect()
}

/// Node scope: one module per sub-host; without accelerator hosts that is
/// the node itself.
fn split_node(domain: &LocalityDomain, units: &[UnitLocality]) -> Vec<Split> {
    let mut hwinfo = domain.hwinfo;
    hwinfo.num_modules = 1;
    hwinfo.num_numa = distinct_numa_ids(&domain.unit_ids, units).len() as i32;
    vec![Split {
        host: domain.host.clone(),
        node_id: domain.node_id,
        unit_ids: domain.unit_ids.clone(),
        hwinfo,
    }]
}

/// Module scope: one NUMA domain per distinct observed numa id, two-pass
/// (collect ids, then assign units by id).
fn split_module(domain: &LocalityDomain, units: &[UnitLocality]) -> Vec<Split> {
    let numa_ids = distinct_numa_ids(&domain.unit_ids, units);
    numa_ids
        .iter()
        .map(|numa_id| {
            let unit_ids = domain
                .unit_ids
                .iter()
                .copied()
                .filter(|unit| units[usize::from(unit.raw())].hwinfo.numa_id == *numa_id)
                .collect::<Vec<_>>();
            let mut hwinfo = domain.hwinfo;
            hwinfo.num_modules = 1;
            hwinfo.num_numa = 1;
            hwinfo.num_cores = unit_ids.len() as i32;
            Split {
                host: domain.host.clone(),
                node_id: domain.node_id,
                unit_ids,
                hwinfo,
            }
        })
        .collect()
}

/// NUMA scope: even division of the domain's units into core leaves.
/// The child count equals the unit count, so each leaf owns one unit.
fn split_numa(domain: &LocalityDomain) -> Vec<Split> {
    domain
        .unit_ids
        .chunks(1)
        .map(|chunk| {
            let mut hwinfo = domain.hwinfo;
            hwinfo.num_modules = 1;
            hwinfo.num_numa = 1;
            hwinfo.num_cores = 1;
            Split {
                host: domain.host.clone(),
                node_id: domain.node_id,
                unit_ids: chunk.to_vec(),
                hwinfo,
            }
        })
        .collect()
}

/// Sorted distinct numa ids observed across `unit_ids`.
fn distinct_numa_ids(unit_ids: &[UnitId], units: &[UnitLocality]) -> Vec<i32> {
    let mut ids: Vec<i32> = unit_ids
        .iter()
        .map(|unit| units[usize::from(unit.raw())].hwinfo.numa_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}
