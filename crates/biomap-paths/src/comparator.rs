//! Path ordering policies
//!
//! Which of two equally cheap paths wins is a policy decision, so it is
//! pluggable. Every comparator ends on the per-hop priority sequence, which is
//! unique per path, so the choice never depends on search order.

use biomap_core::MappingPath;
use std::cmp::Ordering;
use std::fmt;

/// Total order over candidate paths; `Less` is preferred
pub trait PathComparator: Send + Sync + fmt::Debug {
    /// Order `a` relative to `b`
    fn compare(&self, a: &MappingPath, b: &MappingPath) -> Ordering;

    /// Name for logs
    fn name(&self) -> &'static str;
}

/// Lowest total cost, then lowest aggregate registration priority
#[derive(Debug, Clone, Copy, Default)]
pub struct CostThenPriority;

impl PathComparator for CostThenPriority {
    fn compare(&self, a: &MappingPath, b: &MappingPath) -> Ordering {
        a.total_cost()
            .cmp(&b.total_cost())
            .then_with(|| a.aggregate_priority().cmp(&b.aggregate_priority()))
            .then_with(|| priority_sequence(a, b))
    }

    fn name(&self) -> &'static str {
        "cost_then_priority"
    }
}

/// Fewest hops, then cost, then priority
#[derive(Debug, Clone, Copy, Default)]
pub struct FewestHops;

impl PathComparator for FewestHops {
    fn compare(&self, a: &MappingPath, b: &MappingPath) -> Ordering {
        a.hops()
            .cmp(&b.hops())
            .then_with(|| CostThenPriority.compare(a, b))
    }

    fn name(&self) -> &'static str {
        "fewest_hops"
    }
}

fn priority_sequence(a: &MappingPath, b: &MappingPath) -> Ordering {
    let pa = a.resources().iter().map(|r| r.priority);
    let pb = b.resources().iter().map(|r| r.priority);
    pa.cmp(pb)
        .then_with(|| a.resource_ids().cmp(&b.resource_ids()))
}
