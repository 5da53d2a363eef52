//! Partitioning of the bus set for distributed assembly.
//!
//! Every bus is owned by exactly one partition. A line whose endpoints are
//! owned by different partitions is a tie-line; each side holds a GHOST copy of
//! the remote endpoint so it can evaluate its own half of the line flow.
//!
//! ```text
//!   partition 0                     partition 1
//!   ┌────────────────────┐          ┌────────────────────┐
//!   │ owned: 1 4 5 6     │  4 ─ 9   │ owned: 2 3 7 8 9   │
//!   │ ghost: 7 9         │ ──────── │ ghost: 4 5         │
//!   └────────────────────┘  5 ─ 7   └────────────────────┘
//! ```
//!
//! The balanced strategy orders buses breadth-first from the smallest bus id
//! (over all lines, regardless of status, so the layout never depends on
//! mutations) and cuts that order into contiguous blocks of near-equal size.
//! Breadth-first order keeps neighbors together and limits the tie-line count.

use std::collections::{HashMap, VecDeque};

use crate::topology::NetworkTopology;
use crate::{BusId, LineId, Ownership, PartitionId, PflowError, PflowResult};

/// A line crossing a partition boundary, seen from one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieLine {
    pub line: LineId,
    /// Endpoint owned by this partition
    pub local_bus: BusId,
    /// Endpoint mirrored here as a ghost
    pub remote_bus: BusId,
    /// Owner of the remote endpoint
    pub neighbor: PartitionId,
}

/// One partition: owned buses, ghost buses and the lines it evaluates.
///
/// Local slots number owned buses first, then ghosts; the halo exchange and
/// the assembler index local state by slot.
#[derive(Debug, Clone)]
pub struct Partition {
    pub id: PartitionId,
    owned: Vec<usize>,
    ghosts: Vec<usize>,
    lines: Vec<LineId>,
    tie_lines: Vec<TieLine>,
    slots: HashMap<usize, usize>,
}

impl Partition {
    /// Owned bus positions in local order.
    pub fn owned(&self) -> &[usize] {
        &self.owned
    }

    /// Ghost bus positions in local order (after the owned ones).
    pub fn ghosts(&self) -> &[usize] {
        &self.ghosts
    }

    /// Lines with at least one owned endpoint.
    pub fn lines(&self) -> &[LineId] {
        &self.lines
    }

    pub fn tie_lines(&self) -> &[TieLine] {
        &self.tie_lines
    }

    pub fn num_slots(&self) -> usize {
        self.owned.len() + self.ghosts.len()
    }

    pub fn slot(&self, pos: usize) -> Option<usize> {
        self.slots.get(&pos).copied()
    }

    /// Bus position stored in a local slot.
    pub fn position_of_slot(&self, slot: usize) -> Option<usize> {
        if slot < self.owned.len() {
            Some(self.owned[slot])
        } else {
            self.ghosts.get(slot - self.owned.len()).copied()
        }
    }

    pub fn ownership(&self, pos: usize) -> Option<Ownership> {
        self.slot(pos).map(|slot| {
            if slot < self.owned.len() {
                Ownership::Owned
            } else {
                Ownership::Ghost
            }
        })
    }

    /// An owned bus with at least one tie-line.
    pub fn is_boundary(&self, bus: BusId) -> bool {
        self.tie_lines.iter().any(|t| t.local_bus == bus)
    }
}

#[derive(Debug, Clone)]
pub struct PartitionLayout {
    parts: Vec<Partition>,
    owner: Vec<PartitionId>,
}

impl PartitionLayout {
    /// Breadth-first ordering cut into `num_parts` balanced blocks.
    pub fn balanced(topology: &NetworkTopology, num_parts: usize) -> PflowResult<Self> {
        let n = topology.buses().len();
        if num_parts == 0 {
            return Err(PflowError::configuration("partition count must be positive"));
        }
        if num_parts > n {
            return Err(PflowError::configuration(format!(
                "network has only {n} buses, cannot form {num_parts} partitions"
            )));
        }

        let order = breadth_first_order(topology);
        let base = n / num_parts;
        let extra = n % num_parts;
        let mut assignment = vec![PartitionId::new(0); n];
        let mut cursor = 0;
        for part in 0..num_parts {
            let size = base + usize::from(part < extra);
            for &pos in &order[cursor..cursor + size] {
                assignment[pos] = PartitionId::new(part);
            }
            cursor += size;
        }

        Self::from_assignment(topology, assignment, num_parts)
    }

    /// Builds ghosts and tie-lines for an explicit owner per bus position.
    pub fn from_assignment(
        topology: &NetworkTopology,
        assignment: Vec<PartitionId>,
        num_parts: usize,
    ) -> PflowResult<Self> {
        let buses = topology.buses();
        if assignment.len() != buses.len() {
            return Err(PflowError::configuration(format!(
                "partition assignment covers {} of {} buses",
                assignment.len(),
                buses.len()
            )));
        }
        if let Some(bad) = assignment.iter().find(|p| p.value() >= num_parts) {
            return Err(PflowError::configuration(format!(
                "partition {bad} is out of range for {num_parts} partitions"
            )));
        }

        let mut parts: Vec<Partition> = (0..num_parts)
            .map(|id| Partition {
                id: PartitionId::new(id),
                owned: Vec::new(),
                ghosts: Vec::new(),
                lines: Vec::new(),
                tie_lines: Vec::new(),
                slots: HashMap::new(),
            })
            .collect();

        for &pos in topology.positions_by_id() {
            parts[assignment[pos].value()].owned.push(pos);
        }

        for line in topology.lines() {
            let (Some(f), Some(t)) = (topology.position(line.from), topology.position(line.to))
            else {
                return Err(PflowError::configuration(format!(
                    "line {} references a bus that does not exist",
                    line.id
                )));
            };
            let (pf, pt) = (assignment[f], assignment[t]);
            parts[pf.value()].lines.push(line.id);
            if pf != pt {
                parts[pt.value()].lines.push(line.id);
                parts[pf.value()].ghosts.push(t);
                parts[pt.value()].ghosts.push(f);
                parts[pf.value()].tie_lines.push(TieLine {
                    line: line.id,
                    local_bus: line.from,
                    remote_bus: line.to,
                    neighbor: pt,
                });
                parts[pt.value()].tie_lines.push(TieLine {
                    line: line.id,
                    local_bus: line.to,
                    remote_bus: line.from,
                    neighbor: pf,
                });
            }
        }

        for part in &mut parts {
            part.ghosts.sort_by_key(|&pos| buses[pos].id);
            part.ghosts.dedup();
            for (slot, &pos) in part.owned.iter().chain(part.ghosts.iter()).enumerate() {
                part.slots.insert(pos, slot);
            }
        }

        Ok(Self {
            parts,
            owner: assignment,
        })
    }

    pub fn parts(&self) -> &[Partition] {
        &self.parts
    }

    pub fn part(&self, id: PartitionId) -> Option<&Partition> {
        self.parts.get(id.value())
    }

    pub fn owner_of(&self, pos: usize) -> PartitionId {
        self.owner[pos]
    }

    pub fn len(&self) -> usize {
        self.parts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Number of distinct lines crossing a boundary.
    pub fn tie_line_count(&self) -> usize {
        self.parts.iter().map(|p| p.tie_lines.len()).sum::<usize>() / 2
    }
}

/// Bus positions in breadth-first order, restarting from the smallest
/// unvisited bus id; neighbors are visited in ascending id order.
fn breadth_first_order(topology: &NetworkTopology) -> Vec<usize> {
    let n = topology.buses().len();
    let mut visited = vec![false; n];
    let mut order = Vec::with_capacity(n);
    let mut queue = VecDeque::new();

    for &start in topology.positions_by_id() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        queue.push_back(start);
        while let Some(pos) = queue.pop_front() {
            order.push(pos);
            let here = topology.bus_at(pos).id;
            let mut neighbors: Vec<usize> = topology
                .incident_at(pos)
                .iter()
                .filter_map(|&id| topology.line(id).ok())
                .filter_map(|line| topology.position(line.other_end(here)))
                .filter(|&next| !visited[next])
                .collect();
            neighbors.sort_by_key(|&next| topology.bus_at(next).id);
            neighbors.dedup();
            for next in neighbors {
                visited[next] = true;
                queue.push_back(next);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Bus, BusType, Generator, Line};

    /// Ring 1-2-3-4-1 plus a spur 4-5.
    fn ring() -> NetworkTopology {
        let mut t = NetworkTopology::new(100.0);
        for id in 1..=5 {
            let kind = if id == 1 { BusType::Reference } else { BusType::Pq };
            t.add_bus(Bus::new(BusId::new(id), kind)).unwrap();
        }
        for (f, to) in [(1, 2), (2, 3), (3, 4), (4, 1), (4, 5)] {
            t.add_line(Line::new(BusId::new(f), BusId::new(to), 0.01, 0.1))
                .unwrap();
        }
        t.add_generator(Generator::new(BusId::new(1))).unwrap();
        t
    }

    #[test]
    fn test_single_partition_has_no_ghosts() {
        let mut t = ring();
        let layout = t.partition(1).unwrap();
        assert_eq!(layout.len(), 1);
        assert!(layout.parts()[0].ghosts().is_empty());
        assert_eq!(layout.tie_line_count(), 0);
        assert_eq!(layout.parts()[0].lines().len(), 5);
    }

    #[test]
    fn test_balanced_partition_blocks() {
        let mut t = ring();
        let layout = t.partition(2).unwrap().clone();
        // BFS order from bus 1: 1, 2, 4, 3, 5 -> blocks {1,2,4} and {3,5}
        let owned: Vec<Vec<usize>> = layout
            .parts()
            .iter()
            .map(|p| p.owned().iter().map(|&pos| t.bus_at(pos).id.value()).collect())
            .collect();
        assert_eq!(owned, vec![vec![1, 2, 4], vec![3, 5]]);
        assert_eq!(layout.tie_line_count(), 3);
    }

    #[test]
    fn test_ghosts_mirror_remote_endpoints() {
        let mut t = ring();
        t.partition(2).unwrap();
        t.finalize().unwrap();
        let p0 = PartitionId::new(0);
        let p1 = PartitionId::new(1);
        assert!(t.is_ghost(p0, BusId::new(3)).unwrap());
        assert!(t.is_ghost(p0, BusId::new(5)).unwrap());
        assert!(!t.is_ghost(p0, BusId::new(1)).unwrap());
        assert!(t.is_ghost(p1, BusId::new(2)).unwrap());
        assert!(t.is_ghost(p1, BusId::new(4)).unwrap());
        // Bus 1 does not appear on partition 1 at all
        assert!(!t.is_ghost(p1, BusId::new(1)).unwrap());

        let layout = t.layout().unwrap();
        let part = layout.part(p0).unwrap();
        assert!(part.is_boundary(BusId::new(4)));
        assert!(!part.is_boundary(BusId::new(1)));
        assert_eq!(part.num_slots(), 5);
    }

    #[test]
    fn test_line_owner_is_from_bus_owner() {
        let mut t = ring();
        t.partition(2).unwrap();
        let line = t.find_line(BusId::new(3), BusId::new(4), "1").unwrap();
        assert_eq!(t.line(line).unwrap().owner, Some(PartitionId::new(1)));
    }

    #[test]
    fn test_partition_too_small() {
        let mut t = ring();
        assert!(matches!(t.partition(6), Err(PflowError::Configuration(_))));
        assert!(matches!(t.partition(0), Err(PflowError::Configuration(_))));
    }

    #[test]
    fn test_explicit_assignment() {
        let mut t = ring();
        let owners: HashMap<BusId, PartitionId> = (1..=5)
            .map(|id| (BusId::new(id), PartitionId::new(usize::from(id > 3))))
            .collect();
        let layout = t.partition_with(&owners, 2).unwrap();
        // 3-4 and 4-1 cross the boundary
        assert_eq!(layout.tie_line_count(), 2);
    }
}
