//! Island detection and reference-bus selection.
//!
//! Islands are the connected components of the graph formed by active buses
//! and active lines (breadth-first search, O(buses + lines)). Each island
//! needs exactly one angle reference:
//!
//! 1. a declared REFERENCE bus that still has an in-service generator keeps
//!    the role (smallest id wins if several qualify);
//! 2. otherwise the [`ReferencePolicy`] promotes one of the buses with an
//!    in-service generator;
//! 3. otherwise the island is BLACKED_OUT. Its buses leave the solve and
//!    report zero voltage; the rest of the network is unaffected.
//!
//! The analysis is a pure function of the topology state, so rerunning it on
//! an unchanged network reproduces the same islands and references.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::diagnostics::Diagnostics;
use crate::topology::NetworkTopology;
use crate::{BusId, BusType, IslandId};

/// Rule for promoting a replacement reference bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferencePolicy {
    /// Smallest bus id among buses with an in-service generator
    #[default]
    SmallestId,
    /// Largest in-service Pmax, ties broken by smallest bus id
    LargestGeneration,
}

impl ReferencePolicy {
    pub fn from_str(input: &str) -> Option<Self> {
        match input.to_ascii_lowercase().as_str() {
            "smallest-id" | "default" => Some(ReferencePolicy::SmallestId),
            "largest-generation" => Some(ReferencePolicy::LargestGeneration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IslandStatus {
    Energized,
    BlackedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct Island {
    pub id: IslandId,
    /// Members in ascending id order
    pub buses: Vec<BusId>,
    pub reference: Option<BusId>,
    pub status: IslandStatus,
}

impl Island {
    pub fn is_energized(&self) -> bool {
        self.status == IslandStatus::Energized
    }

    pub fn contains(&self, bus: BusId) -> bool {
        self.buses.binary_search(&bus).is_ok()
    }
}

/// Result of one connectivity pass.
#[derive(Debug, Clone)]
pub struct ConnectivityReport {
    /// Islands ordered by their smallest member id
    pub islands: Vec<Island>,
    /// Island per bus position; `None` for inactive buses
    pub bus_island: Vec<Option<IslandId>>,
    /// Reconciled bus type per position
    pub bus_types: Vec<BusType>,
    pub diagnostics: Diagnostics,
}

impl ConnectivityReport {
    pub fn island(&self, id: IslandId) -> Option<&Island> {
        self.islands.get(id.value())
    }

    pub fn island_of_position(&self, pos: usize) -> Option<&Island> {
        self.bus_island
            .get(pos)
            .copied()
            .flatten()
            .and_then(|id| self.island(id))
    }

    pub fn is_energized_position(&self, pos: usize) -> bool {
        self.island_of_position(pos)
            .is_some_and(|island| island.is_energized())
    }

    pub fn island_containing(&self, bus: BusId) -> Option<&Island> {
        self.islands.iter().find(|island| island.contains(bus))
    }

    pub fn energized(&self) -> impl Iterator<Item = &Island> {
        self.islands.iter().filter(|i| i.is_energized())
    }

    pub fn blacked_out(&self) -> impl Iterator<Item = &Island> {
        self.islands.iter().filter(|i| !i.is_energized())
    }

    pub fn references(&self) -> Vec<BusId> {
        self.islands.iter().filter_map(|i| i.reference).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectivityAnalyzer {
    policy: ReferencePolicy,
}

impl ConnectivityAnalyzer {
    pub fn new(policy: ReferencePolicy) -> Self {
        Self { policy }
    }

    pub fn analyze(&self, topology: &NetworkTopology) -> ConnectivityReport {
        let n = topology.buses().len();
        let mut bus_island = vec![None; n];
        let mut bus_types: Vec<BusType> = topology.buses().iter().map(|b| b.kind).collect();
        let mut islands = Vec::new();
        let mut diagnostics = Diagnostics::new();

        // Generator-driven types first: no in-service unit means PQ, an
        // in-service unit on a PQ bus makes it voltage controlled.
        for (pos, kind) in bus_types.iter_mut().enumerate() {
            let has_gen = topology.has_generation_at(pos);
            if !has_gen {
                *kind = BusType::Pq;
            } else if *kind == BusType::Pq {
                *kind = BusType::Pv;
            }
        }

        let mut visited = vec![false; n];
        let mut queue = VecDeque::new();
        for &start in topology.positions_by_id() {
            if visited[start] || !topology.bus_at(start).active {
                continue;
            }
            let island_id = IslandId::new(islands.len());
            let mut members = Vec::new();
            visited[start] = true;
            queue.push_back(start);
            while let Some(pos) = queue.pop_front() {
                members.push(pos);
                bus_island[pos] = Some(island_id);
                let here = topology.bus_at(pos).id;
                for &line_id in topology.incident_at(pos) {
                    let Ok(line) = topology.line(line_id) else {
                        continue;
                    };
                    if !line.status.is_active() {
                        continue;
                    }
                    let Some(next) = topology.position(line.other_end(here)) else {
                        continue;
                    };
                    if !visited[next] && topology.bus_at(next).active {
                        visited[next] = true;
                        queue.push_back(next);
                    }
                }
            }
            members.sort_by_key(|&pos| topology.bus_at(pos).id);

            let reference = self.select_reference(topology, &members, &bus_types);
            let buses: Vec<BusId> = members.iter().map(|&pos| topology.bus_at(pos).id).collect();
            let status = match reference {
                Some(chosen) => {
                    for &pos in &members {
                        if pos == chosen {
                            if bus_types[pos] != BusType::Reference {
                                let msg = format!(
                                    "bus {} promoted to reference of island {}",
                                    topology.bus_at(pos).id,
                                    island_id
                                );
                                info!("{msg}");
                                diagnostics.add_info("reference", &msg);
                            }
                            bus_types[pos] = BusType::Reference;
                        } else if bus_types[pos] == BusType::Reference {
                            bus_types[pos] = BusType::Pv;
                        }
                    }
                    IslandStatus::Energized
                }
                None => {
                    let msg = format!(
                        "island {} has no in-service generation and is blacked out",
                        island_id
                    );
                    warn!(buses = ?buses, "{msg}");
                    diagnostics.add_island_warning(
                        "blackout",
                        &msg,
                        island_id.value(),
                        buses.clone(),
                    );
                    IslandStatus::BlackedOut
                }
            };

            if members.len() == 1 && topology.incident_at(members[0]).is_empty() {
                diagnostics.add_info("isolated", &format!("bus {} has no lines", buses[0]));
            }

            islands.push(Island {
                id: island_id,
                buses,
                reference: reference.map(|pos| topology.bus_at(pos).id),
                status,
            });
        }

        ConnectivityReport {
            islands,
            bus_island,
            bus_types,
            diagnostics,
        }
    }

    /// Position of the island's reference bus, if any bus can serve.
    fn select_reference(
        &self,
        topology: &NetworkTopology,
        members: &[usize],
        bus_types: &[BusType],
    ) -> Option<usize> {
        // members are sorted by id, so the first hit is the smallest id
        if let Some(&declared) = members
            .iter()
            .find(|&&pos| bus_types[pos] == BusType::Reference)
        {
            return Some(declared);
        }

        let mut candidates = members
            .iter()
            .copied()
            .filter(|&pos| topology.has_generation_at(pos));
        match self.policy {
            ReferencePolicy::SmallestId => candidates.next(),
            ReferencePolicy::LargestGeneration => {
                let capacity = |pos: usize| -> f64 {
                    topology
                        .generators_at(pos)
                        .iter()
                        .filter_map(|&g| topology.generator(g).ok())
                        .filter(|g| g.status.is_on())
                        .map(|g| g.pmax)
                        .sum()
                };
                let mut best: Option<(usize, f64)> = None;
                for pos in candidates {
                    let cap = capacity(pos);
                    if best.map_or(true, |(_, best_cap)| cap > best_cap) {
                        best = Some((pos, cap));
                    }
                }
                best.map(|(pos, _)| pos)
            }
        }
    }
}
