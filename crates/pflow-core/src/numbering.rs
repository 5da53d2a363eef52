//! Global numbering of the Newton unknowns.
//!
//! Each energized bus contributes its free variables: an angle unless it is an
//! island reference, and a magnitude if it is PQ. Partitions take contiguous
//! blocks of the global vector in partition order; inside a block the owned
//! buses follow their local (ascending id) order and each bus lists its angle
//! before its magnitude. Residual rows use the same numbering, so the
//! Jacobian is square.
//!
//! Offsets are reassigned on every connectivity pass because bus types and
//! island membership can change.

use std::ops::Range;

use crate::partition::PartitionLayout;
use crate::topology::NetworkTopology;
use crate::{BusType, PartitionId};

/// Global indices of the free variables of one bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusVariables {
    pub angle: Option<usize>,
    pub magnitude: Option<usize>,
}

impl BusVariables {
    pub fn count(&self) -> usize {
        usize::from(self.angle.is_some()) + usize::from(self.magnitude.is_some())
    }

    /// First global index held by the bus.
    pub fn offset(&self) -> Option<usize> {
        self.angle.or(self.magnitude)
    }
}

#[derive(Debug, Clone, Default)]
pub struct VariableNumbering {
    vars: Vec<BusVariables>,
    ranges: Vec<Range<usize>>,
    total: usize,
}

impl VariableNumbering {
    pub fn assign(topology: &NetworkTopology, layout: &PartitionLayout) -> Self {
        let mut vars = vec![BusVariables::default(); topology.buses().len()];
        let mut ranges = Vec::with_capacity(layout.len());
        let mut next = 0;

        for part in layout.parts() {
            let start = next;
            for &pos in part.owned() {
                let bus = topology.bus_at(pos);
                if !bus.energized {
                    continue;
                }
                let entry = &mut vars[pos];
                if bus.kind != BusType::Reference {
                    entry.angle = Some(next);
                    next += 1;
                }
                if bus.kind == BusType::Pq {
                    entry.magnitude = Some(next);
                    next += 1;
                }
            }
            ranges.push(start..next);
        }

        Self {
            vars,
            ranges,
            total: next,
        }
    }

    /// Variables of the bus at arena position `pos`.
    pub fn bus(&self, pos: usize) -> BusVariables {
        self.vars.get(pos).copied().unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Global index range owned by a partition; empty for unknown ids.
    pub fn partition_range(&self, partition: PartitionId) -> Range<usize> {
        self.ranges
            .get(partition.value())
            .cloned()
            .unwrap_or(0..0)
    }
}
