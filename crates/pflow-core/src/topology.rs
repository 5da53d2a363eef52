//! The entity arena and its setup lifecycle.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::connectivity::{ConnectivityAnalyzer, ConnectivityReport, ReferencePolicy};
use crate::numbering::VariableNumbering;
use crate::partition::PartitionLayout;
use crate::{
    Bus, BusId, BusType, GenId, Generator, Line, LineId, Load, LoadId, Ownership, PartitionId,
    PflowError, PflowResult,
};

/// Owns every bus, line, generator and load of one network, together with the
/// derived partition layout, variable numbering and island analysis.
///
/// Entities can only be added before [`finalize`](Self::finalize); afterwards
/// the structure is frozen and only statuses and values change (see the
/// mutation methods). [`reopen`](Self::reopen) discards the derived state and
/// allows structural edits again.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    base_mva: f64,
    buses: Vec<Bus>,
    lines: Vec<Line>,
    generators: Vec<Generator>,
    loads: Vec<Load>,
    bus_index: HashMap<BusId, usize>,
    line_circuits: HashMap<(BusId, BusId), usize>,
    gen_circuits: HashMap<BusId, usize>,
    load_circuits: HashMap<BusId, usize>,
    // Built by `index_entities`, keyed by bus position
    incident: Vec<Vec<LineId>>,
    gens_at: Vec<Vec<GenId>>,
    loads_at: Vec<Vec<LoadId>>,
    by_id: Vec<usize>,
    indexed: bool,
    layout: Option<PartitionLayout>,
    // Partition count finalize rebuilds with after a structural edit
    requested_parts: usize,
    numbering: Option<VariableNumbering>,
    connectivity: Option<ConnectivityReport>,
    connectivity_stale: bool,
    finalized: bool,
    policy: ReferencePolicy,
}

impl NetworkTopology {
    /// Empty topology on the given system MVA base.
    pub fn new(base_mva: f64) -> Self {
        Self {
            base_mva,
            buses: Vec::new(),
            lines: Vec::new(),
            generators: Vec::new(),
            loads: Vec::new(),
            bus_index: HashMap::new(),
            line_circuits: HashMap::new(),
            gen_circuits: HashMap::new(),
            load_circuits: HashMap::new(),
            incident: Vec::new(),
            gens_at: Vec::new(),
            loads_at: Vec::new(),
            by_id: Vec::new(),
            indexed: false,
            layout: None,
            requested_parts: 1,
            numbering: None,
            connectivity: None,
            connectivity_stale: true,
            finalized: false,
            policy: ReferencePolicy::default(),
        }
    }

    pub fn with_reference_policy(mut self, policy: ReferencePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Changing the policy marks connectivity stale.
    pub fn set_reference_policy(&mut self, policy: ReferencePolicy) {
        self.policy = policy;
        self.connectivity_stale = true;
    }

    pub fn reference_policy(&self) -> ReferencePolicy {
        self.policy
    }

    pub fn base_mva(&self) -> f64 {
        self.base_mva
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    // =========================================================================
    // Construction (pre-finalize)
    // =========================================================================

    pub fn add_bus(&mut self, bus: Bus) -> PflowResult<BusId> {
        self.ensure_building("bus")?;
        if self.bus_index.contains_key(&bus.id) {
            return Err(PflowError::configuration(format!(
                "duplicate bus id {}",
                bus.id
            )));
        }
        let id = bus.id;
        self.bus_index.insert(id, self.buses.len());
        self.buses.push(bus);
        self.structure_changed();
        Ok(id)
    }

    /// Adds a line and returns its stable id. An empty circuit id is replaced
    /// by the ordinal of the line among those joining the same bus pair.
    pub fn add_line(&mut self, mut line: Line) -> PflowResult<LineId> {
        self.ensure_building("line")?;
        let id = LineId::new(self.lines.len());
        let key = if line.from <= line.to {
            (line.from, line.to)
        } else {
            (line.to, line.from)
        };
        let count = self.line_circuits.entry(key).or_insert(0);
        *count += 1;
        if line.circuit.is_empty() {
            line.circuit = count.to_string();
        }
        line.id = id;
        line.owner = None;
        self.lines.push(line);
        self.structure_changed();
        Ok(id)
    }

    pub fn add_generator(&mut self, mut generator: Generator) -> PflowResult<GenId> {
        self.ensure_building("generator")?;
        let id = GenId::new(self.generators.len());
        let count = self.gen_circuits.entry(generator.bus).or_insert(0);
        *count += 1;
        if generator.circuit.is_empty() {
            generator.circuit = count.to_string();
        }
        generator.id = id;
        self.generators.push(generator);
        self.structure_changed();
        Ok(id)
    }

    pub fn add_load(&mut self, mut load: Load) -> PflowResult<LoadId> {
        self.ensure_building("load")?;
        let id = LoadId::new(self.loads.len());
        let count = self.load_circuits.entry(load.bus).or_insert(0);
        *count += 1;
        if load.circuit.is_empty() {
            load.circuit = count.to_string();
        }
        load.id = id;
        self.loads.push(load);
        self.structure_changed();
        Ok(id)
    }

    /// A layout installed before this edit no longer covers every bus, so it
    /// is dropped and rebuilt by `finalize` with the same partition count.
    fn structure_changed(&mut self) {
        self.indexed = false;
        if let Some(layout) = self.layout.take() {
            debug!(
                partitions = layout.len(),
                "structure changed; partition layout will be rebuilt"
            );
            for line in &mut self.lines {
                line.owner = None;
            }
        }
    }

    fn ensure_building(&self, what: &str) -> PflowResult<()> {
        if self.finalized {
            return Err(PflowError::invalid_state(format!(
                "cannot add a {what} after finalize; call reopen() first"
            )));
        }
        Ok(())
    }

    /// Validates references and rebuilds the per-bus index lists.
    fn index_entities(&mut self) -> PflowResult<()> {
        if self.indexed {
            return Ok(());
        }
        let n = self.buses.len();
        let mut incident = vec![Vec::new(); n];
        let mut gens_at = vec![Vec::new(); n];
        let mut loads_at = vec![Vec::new(); n];

        for line in &self.lines {
            let from = self.bus_index.get(&line.from).copied();
            let to = self.bus_index.get(&line.to).copied();
            match (from, to) {
                (Some(f), Some(t)) if f != t => {
                    incident[f].push(line.id);
                    incident[t].push(line.id);
                }
                (Some(_), Some(_)) => {
                    return Err(PflowError::configuration(format!(
                        "line {} connects bus {} to itself",
                        line.id, line.from
                    )));
                }
                _ => {
                    return Err(PflowError::configuration(format!(
                        "line {} ({}-{}) references a bus that does not exist",
                        line.id, line.from, line.to
                    )));
                }
            }
            if line.x == 0.0 && line.r == 0.0 {
                return Err(PflowError::configuration(format!(
                    "line {}-{} has zero series impedance",
                    line.from, line.to
                )));
            }
        }
        for generator in &self.generators {
            let pos = self.bus_index.get(&generator.bus).copied().ok_or_else(|| {
                PflowError::configuration(format!(
                    "generator {} references missing bus {}",
                    generator.id, generator.bus
                ))
            })?;
            gens_at[pos].push(generator.id);
        }
        for load in &self.loads {
            let pos = self.bus_index.get(&load.bus).copied().ok_or_else(|| {
                PflowError::configuration(format!(
                    "load {} references missing bus {}",
                    load.id, load.bus
                ))
            })?;
            loads_at[pos].push(load.id);
        }

        let mut by_id: Vec<usize> = (0..n).collect();
        by_id.sort_by_key(|&pos| self.buses[pos].id);

        self.incident = incident;
        self.gens_at = gens_at;
        self.loads_at = loads_at;
        self.by_id = by_id;
        self.indexed = true;
        Ok(())
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Splits the buses into `num_parts` owning partitions and builds the
    /// ghost copies needed by lines that cross a boundary.
    pub fn partition(&mut self, num_parts: usize) -> PflowResult<&PartitionLayout> {
        if self.finalized {
            return Err(PflowError::invalid_state(
                "partition must be called before finalize",
            ));
        }
        self.index_entities()?;
        let layout = PartitionLayout::balanced(self, num_parts)?;
        Ok(self.install_layout(layout))
    }

    /// Like [`partition`](Self::partition) with an explicit owner per bus.
    pub fn partition_with(
        &mut self,
        owners: &HashMap<BusId, PartitionId>,
        num_parts: usize,
    ) -> PflowResult<&PartitionLayout> {
        if self.finalized {
            return Err(PflowError::invalid_state(
                "partition must be called before finalize",
            ));
        }
        self.index_entities()?;
        let mut assignment = Vec::with_capacity(self.buses.len());
        for bus in &self.buses {
            let owner = owners.get(&bus.id).copied().ok_or_else(|| {
                PflowError::configuration(format!("no partition assigned to bus {}", bus.id))
            })?;
            assignment.push(owner);
        }
        let layout = PartitionLayout::from_assignment(self, assignment, num_parts)?;
        Ok(self.install_layout(layout))
    }

    fn install_layout(&mut self, layout: PartitionLayout) -> &PartitionLayout {
        for line in &mut self.lines {
            line.owner = self
                .bus_index
                .get(&line.from)
                .map(|&pos| layout.owner_of(pos));
        }
        debug!(
            partitions = layout.len(),
            tie_lines = layout.tie_line_count(),
            "partition layout installed"
        );
        self.requested_parts = layout.len();
        self.layout.insert(layout)
    }

    /// Freezes the structure: validates references, installs a balanced
    /// layout if none is current (one partition unless `partition` asked for
    /// more), runs the connectivity pass and numbers
    /// the unknowns.
    pub fn finalize(&mut self) -> PflowResult<()> {
        if self.finalized {
            return Err(PflowError::invalid_state("topology is already finalized"));
        }
        if self.buses.is_empty() {
            return Err(PflowError::configuration("network has no buses"));
        }
        self.index_entities()?;

        let declared_reference = self
            .buses
            .iter()
            .any(|b| b.active && b.kind == BusType::Reference);
        let any_generation = self.generators.iter().any(|g| g.status.is_on());
        if !declared_reference && !any_generation {
            return Err(PflowError::configuration(
                "no reference bus declared and no generator is in service",
            ));
        }

        if self.layout.is_none() {
            let layout = PartitionLayout::balanced(self, self.requested_parts)?;
            self.install_layout(layout);
        }
        self.finalized = true;
        self.recompute_connectivity()?;

        info!(
            buses = self.buses.len(),
            lines = self.lines.len(),
            generators = self.generators.len(),
            loads = self.loads.len(),
            "topology finalized"
        );
        Ok(())
    }

    /// Drops the derived state so entities can be added again.
    pub fn reopen(&mut self) {
        self.finalized = false;
        self.layout = None;
        self.numbering = None;
        self.connectivity = None;
        self.connectivity_stale = true;
        for line in &mut self.lines {
            line.owner = None;
        }
    }

    /// Reruns island detection, reference selection and variable numbering.
    pub fn recompute_connectivity(&mut self) -> PflowResult<&ConnectivityReport> {
        if !self.finalized {
            return Err(PflowError::invalid_state(
                "connectivity requires a finalized topology",
            ));
        }
        let report = ConnectivityAnalyzer::new(self.policy).analyze(self);
        for (pos, bus) in self.buses.iter_mut().enumerate() {
            bus.kind = report.bus_types[pos];
            bus.island = report.bus_island[pos];
            bus.energized = report.is_energized_position(pos);
        }
        let layout = self
            .layout
            .as_ref()
            .ok_or_else(|| PflowError::invalid_state("no partition layout installed"))?;
        let numbering = VariableNumbering::assign(self, layout);
        debug!(
            islands = report.islands.len(),
            unknowns = numbering.total(),
            "connectivity recomputed"
        );
        self.numbering = Some(numbering);
        self.connectivity_stale = false;
        let report = self.connectivity.insert(report);
        Ok(&*report)
    }

    /// Recomputes only when a mutation has invalidated the current analysis.
    pub fn ensure_connectivity(&mut self) -> PflowResult<()> {
        if self.connectivity_stale {
            self.recompute_connectivity()?;
        }
        Ok(())
    }

    pub fn is_connectivity_stale(&self) -> bool {
        self.connectivity_stale
    }

    pub(crate) fn mark_stale(&mut self) {
        self.connectivity_stale = true;
    }

    /// Current island analysis; fails if a mutation has made it stale.
    pub fn connectivity(&self) -> PflowResult<&ConnectivityReport> {
        self.fresh()?;
        self.connectivity
            .as_ref()
            .ok_or_else(|| PflowError::invalid_state("connectivity has not been computed"))
    }

    pub fn numbering(&self) -> PflowResult<&VariableNumbering> {
        self.fresh()?;
        self.numbering
            .as_ref()
            .ok_or_else(|| PflowError::invalid_state("variables have not been numbered"))
    }

    pub fn layout(&self) -> PflowResult<&PartitionLayout> {
        self.layout
            .as_ref()
            .ok_or_else(|| PflowError::invalid_state("topology has not been partitioned"))
    }

    pub fn num_variables(&self) -> PflowResult<usize> {
        Ok(self.numbering()?.total())
    }

    fn fresh(&self) -> PflowResult<()> {
        if !self.finalized {
            return Err(PflowError::invalid_state("topology is not finalized"));
        }
        if self.connectivity_stale {
            return Err(PflowError::invalid_state(
                "topology was mutated; recompute connectivity first",
            ));
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn lines_incident(&self, bus: BusId) -> PflowResult<&[LineId]> {
        self.require_index()?;
        let pos = self.require_position(bus)?;
        Ok(&self.incident[pos])
    }

    pub fn connected_buses(&self, line: LineId) -> PflowResult<(BusId, BusId)> {
        let line = self.line(line)?;
        Ok((line.from, line.to))
    }

    /// Whether `bus` is a read-only copy on `partition`. Buses that do not
    /// appear on the partition at all are not ghosts.
    pub fn is_ghost(&self, partition: PartitionId, bus: BusId) -> PflowResult<bool> {
        let pos = self.require_position(bus)?;
        let part = self
            .layout()?
            .part(partition)
            .ok_or_else(|| PflowError::not_found(format!("partition {partition}")))?;
        Ok(part.ownership(pos) == Some(Ownership::Ghost))
    }

    pub fn buses(&self) -> &[Bus] {
        &self.buses
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn generators(&self) -> &[Generator] {
        &self.generators
    }

    pub fn loads(&self) -> &[Load] {
        &self.loads
    }

    pub fn bus(&self, id: BusId) -> PflowResult<&Bus> {
        let pos = self.require_position(id)?;
        Ok(&self.buses[pos])
    }

    pub fn line(&self, id: LineId) -> PflowResult<&Line> {
        self.lines
            .get(id.value())
            .ok_or_else(|| PflowError::not_found(format!("line {id}")))
    }

    pub fn generator(&self, id: GenId) -> PflowResult<&Generator> {
        self.generators
            .get(id.value())
            .ok_or_else(|| PflowError::not_found(format!("generator {id}")))
    }

    pub fn load(&self, id: LoadId) -> PflowResult<&Load> {
        self.loads
            .get(id.value())
            .ok_or_else(|| PflowError::not_found(format!("load {id}")))
    }

    /// Arena position of a bus; positions index the per-bus lists below.
    pub fn position(&self, id: BusId) -> Option<usize> {
        self.bus_index.get(&id).copied()
    }

    pub fn bus_at(&self, pos: usize) -> &Bus {
        &self.buses[pos]
    }

    pub fn incident_at(&self, pos: usize) -> &[LineId] {
        self.incident.get(pos).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn generators_at(&self, pos: usize) -> &[GenId] {
        self.gens_at.get(pos).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn loads_at(&self, pos: usize) -> &[LoadId] {
        self.loads_at.get(pos).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Bus positions sorted by ascending bus id.
    pub fn positions_by_id(&self) -> &[usize] {
        &self.by_id
    }

    pub fn has_generation_at(&self, pos: usize) -> bool {
        self.generators_at(pos)
            .iter()
            .any(|g| self.generators[g.value()].status.is_on())
    }

    /// Line between `from` and `to` (either orientation) with the given circuit.
    pub fn find_line(&self, from: BusId, to: BusId, circuit: &str) -> PflowResult<LineId> {
        let circuit = circuit.trim();
        self.lines
            .iter()
            .find(|l| l.joins(from, to) && l.circuit == circuit)
            .map(|l| l.id)
            .ok_or_else(|| {
                PflowError::not_found(format!("line {from}-{to} circuit '{circuit}'"))
            })
    }

    pub fn find_generator(&self, bus: BusId, circuit: &str) -> PflowResult<GenId> {
        let circuit = circuit.trim();
        self.generators
            .iter()
            .find(|g| g.bus == bus && g.circuit == circuit)
            .map(|g| g.id)
            .ok_or_else(|| {
                PflowError::not_found(format!("generator at bus {bus} circuit '{circuit}'"))
            })
    }

    pub fn find_load(&self, bus: BusId, circuit: &str) -> PflowResult<LoadId> {
        let circuit = circuit.trim();
        self.loads
            .iter()
            .find(|l| l.bus == bus && l.circuit == circuit)
            .map(|l| l.id)
            .ok_or_else(|| PflowError::not_found(format!("load at bus {bus} circuit '{circuit}'")))
    }

    pub(crate) fn require_position(&self, id: BusId) -> PflowResult<usize> {
        self.position(id)
            .ok_or_else(|| PflowError::not_found(format!("bus {id}")))
    }

    fn require_index(&self) -> PflowResult<()> {
        if !self.indexed {
            return Err(PflowError::invalid_state(
                "adjacency is built by partition or finalize",
            ));
        }
        Ok(())
    }

    pub(crate) fn bus_mut(&mut self, id: BusId) -> PflowResult<&mut Bus> {
        let pos = self.require_position(id)?;
        Ok(&mut self.buses[pos])
    }

    pub(crate) fn line_mut(&mut self, id: LineId) -> PflowResult<&mut Line> {
        self.lines
            .get_mut(id.value())
            .ok_or_else(|| PflowError::not_found(format!("line {id}")))
    }

    pub(crate) fn generator_mut(&mut self, id: GenId) -> PflowResult<&mut Generator> {
        self.generators
            .get_mut(id.value())
            .ok_or_else(|| PflowError::not_found(format!("generator {id}")))
    }

    pub(crate) fn load_mut(&mut self, id: LoadId) -> PflowResult<&mut Load> {
        self.loads
            .get_mut(id.value())
            .ok_or_else(|| PflowError::not_found(format!("load {id}")))
    }

    /// Writes solved voltages back into the bus state. Used by the solver
    /// after each solve so that the next solve starts warm.
    pub fn store_voltage(&mut self, pos: usize, vm: f64, va: f64) {
        if let Some(bus) = self.buses.get_mut(pos) {
            bus.vm = vm;
            bus.va = va;
        }
    }

    /// Writes post-solve dispatch back into a generator.
    pub fn store_dispatch(&mut self, id: GenId, pg: f64, qg: f64) -> PflowResult<()> {
        let generator = self.generator_mut(id)?;
        generator.pg = pg;
        generator.qg = qg;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GenStatus, LineStatus};

    fn two_bus() -> NetworkTopology {
        let mut t = NetworkTopology::new(100.0);
        t.add_bus(Bus::new(BusId::new(1), BusType::Reference)).unwrap();
        t.add_bus(Bus::new(BusId::new(2), BusType::Pq)).unwrap();
        t.add_line(Line::new(BusId::new(1), BusId::new(2), 0.01, 0.1))
            .unwrap();
        t.add_generator(Generator::new(BusId::new(1))).unwrap();
        t.add_load(Load::new(BusId::new(2), 0.5, 0.2)).unwrap();
        t
    }

    #[test]
    fn adding_after_finalize_is_invalid_state() {
        let mut t = two_bus();
        t.finalize().unwrap();
        let err = t.add_bus(Bus::new(BusId::new(3), BusType::Pq)).unwrap_err();
        assert!(matches!(err, PflowError::InvalidState(_)));
        let err = t
            .add_line(Line::new(BusId::new(1), BusId::new(2), 0.0, 0.2))
            .unwrap_err();
        assert!(matches!(err, PflowError::InvalidState(_)));
    }

    #[test]
    fn reopen_allows_structural_edits_again() {
        let mut t = two_bus();
        t.finalize().unwrap();
        t.reopen();
        t.add_bus(Bus::new(BusId::new(3), BusType::Pq)).unwrap();
        t.add_line(Line::new(BusId::new(2), BusId::new(3), 0.0, 0.2))
            .unwrap();
        t.finalize().unwrap();
        assert_eq!(t.num_variables().unwrap(), 4);
    }

    #[test]
    fn buses_added_after_partition_join_the_rebuilt_layout() {
        let mut t = two_bus();
        t.partition(2).unwrap();
        t.add_bus(Bus::new(BusId::new(3), BusType::Pq)).unwrap();
        t.add_line(Line::new(BusId::new(2), BusId::new(3), 0.0, 0.2))
            .unwrap();
        t.add_load(Load::new(BusId::new(3), 0.1, 0.05)).unwrap();
        t.finalize().unwrap();

        assert_eq!(t.num_variables().unwrap(), 4);
        let layout = t.layout().unwrap();
        assert_eq!(layout.len(), 2);
        let owned: usize = layout.parts().iter().map(|p| p.owned().len()).sum();
        assert_eq!(owned, 3);
        assert!(t.lines().iter().all(|l| l.owner.is_some()));
    }

    #[test]
    fn dangling_endpoint_fails_finalize() {
        let mut t = two_bus();
        t.add_line(Line::new(BusId::new(2), BusId::new(7), 0.0, 0.1))
            .unwrap();
        assert!(matches!(t.finalize(), Err(PflowError::Configuration(_))));
    }

    #[test]
    fn duplicate_bus_rejected() {
        let mut t = two_bus();
        let err = t.add_bus(Bus::new(BusId::new(2), BusType::Pq)).unwrap_err();
        assert!(matches!(err, PflowError::Configuration(_)));
    }

    #[test]
    fn no_reference_and_no_generation_fails_finalize() {
        let mut t = NetworkTopology::new(100.0);
        t.add_bus(Bus::new(BusId::new(1), BusType::Pv)).unwrap();
        t.add_bus(Bus::new(BusId::new(2), BusType::Pq)).unwrap();
        t.add_line(Line::new(BusId::new(1), BusId::new(2), 0.0, 0.1))
            .unwrap();
        t.add_generator(Generator::new(BusId::new(1)).with_status(GenStatus::Off))
            .unwrap();
        assert!(matches!(t.finalize(), Err(PflowError::Configuration(_))));
    }

    #[test]
    fn parallel_circuits_are_numbered_per_pair() {
        let mut t = two_bus();
        let second = t
            .add_line(Line::new(BusId::new(2), BusId::new(1), 0.02, 0.2))
            .unwrap();
        assert_eq!(t.line(second).unwrap().circuit, "2");
        t.finalize().unwrap();
        assert_eq!(t.find_line(BusId::new(1), BusId::new(2), "2").unwrap(), second);
        assert!(matches!(
            t.find_line(BusId::new(1), BusId::new(2), "3"),
            Err(PflowError::NotFound(_))
        ));
    }

    #[test]
    fn queries_follow_adjacency() {
        let mut t = two_bus();
        t.finalize().unwrap();
        let lines = t.lines_incident(BusId::new(2)).unwrap();
        assert_eq!(lines, &[LineId::new(0)]);
        assert_eq!(
            t.connected_buses(LineId::new(0)).unwrap(),
            (BusId::new(1), BusId::new(2))
        );
        assert!(!t.is_ghost(PartitionId::new(0), BusId::new(1)).unwrap());
        assert!(matches!(
            t.connected_buses(LineId::new(5)),
            Err(PflowError::NotFound(_))
        ));
    }

    #[test]
    fn stale_connectivity_is_reported_until_recomputed() {
        let mut t = two_bus();
        t.finalize().unwrap();
        t.set_line_status(LineId::new(0), LineStatus::Tripped)
            .unwrap();
        assert!(matches!(t.numbering(), Err(PflowError::InvalidState(_))));
        t.recompute_connectivity().unwrap();
        assert_eq!(t.connectivity().unwrap().islands.len(), 2);
    }
}
