//! Status and value edits applied between solves.
//!
//! Every edit validates its target, updates the field and marks connectivity
//! stale. Nothing is recomputed eagerly: the next solve (or an explicit
//! [`NetworkTopology::recompute_connectivity`]) reruns island detection and
//! renumbering. Voltages from the previous solve are left in place and serve
//! as the next warm start.

use tracing::debug;

use crate::topology::NetworkTopology;
use crate::{BusId, BusType, GenId, GenStatus, LineId, LineStatus, LoadId, LoadStatus, PflowResult};

impl NetworkTopology {
    pub fn set_line_status(&mut self, id: LineId, status: LineStatus) -> PflowResult<()> {
        let line = self.line_mut(id)?;
        let changed = line.status != status;
        line.status = status;
        debug!(line = %id, ?status, changed, "line status set");
        self.mark_stale();
        Ok(())
    }

    /// Switching a unit on makes a PQ bus voltage controlled; switching the
    /// last unit at a bus off makes it PQ. An OFF unit carries no dispatch.
    pub fn set_generator_status(&mut self, id: GenId, status: GenStatus) -> PflowResult<()> {
        let generator = self.generator_mut(id)?;
        generator.status = status;
        if !status.is_on() {
            generator.pg = 0.0;
            generator.qg = 0.0;
        }
        let bus_id = generator.bus;

        let pos = self.require_position(bus_id)?;
        let has_generation = self.has_generation_at(pos);
        let bus = self.bus_mut(bus_id)?;
        match (status, bus.kind) {
            (GenStatus::On, BusType::Pq) => bus.kind = BusType::Pv,
            (GenStatus::Off, _) if !has_generation => bus.kind = BusType::Pq,
            _ => {}
        }
        debug!(generator = %id, bus = %bus_id, ?status, kind = bus.kind.as_str(), "generator status set");
        self.mark_stale();
        Ok(())
    }

    pub fn set_load_status(&mut self, id: LoadId, status: LoadStatus) -> PflowResult<()> {
        self.load_mut(id)?.status = status;
        self.mark_stale();
        Ok(())
    }

    /// Active and reactive dispatch in per-unit.
    pub fn set_generator_dispatch(&mut self, id: GenId, pg: f64, qg: f64) -> PflowResult<()> {
        let generator = self.generator_mut(id)?;
        generator.pg = pg;
        generator.qg = qg;
        self.mark_stale();
        Ok(())
    }

    /// Active and reactive demand in per-unit.
    pub fn set_load_demand(&mut self, id: LoadId, pd: f64, qd: f64) -> PflowResult<()> {
        let load = self.load_mut(id)?;
        load.pd = pd;
        load.qd = qd;
        self.mark_stale();
        Ok(())
    }

    /// Adds to the existing bus shunt (per-unit at 1.0 pu voltage).
    pub fn add_bus_shunt(&mut self, id: BusId, gs: f64, bs: f64) -> PflowResult<()> {
        let bus = self.bus_mut(id)?;
        bus.gs += gs;
        bus.bs += bs;
        self.mark_stale();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    fn three_bus() -> NetworkTopology {
        let mut t = NetworkTopology::new(100.0);
        t.add_bus(Bus::new(BusId::new(1), BusType::Reference)).unwrap();
        t.add_bus(Bus::new(BusId::new(2), BusType::Pq)).unwrap();
        t.add_bus(Bus::new(BusId::new(3), BusType::Pv)).unwrap();
        t.add_line(Line::new(BusId::new(1), BusId::new(2), 0.01, 0.1))
            .unwrap();
        t.add_line(Line::new(BusId::new(2), BusId::new(3), 0.01, 0.1))
            .unwrap();
        t.add_generator(Generator::new(BusId::new(1))).unwrap();
        t.add_generator(Generator::new(BusId::new(3)).with_dispatch(0.4, 0.1))
            .unwrap();
        t.add_generator(Generator::new(BusId::new(3)).with_dispatch(0.2, 0.0))
            .unwrap();
        t.add_load(Load::new(BusId::new(2), 0.5, 0.2)).unwrap();
        t.finalize().unwrap();
        t
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let mut t = three_bus();
        assert!(matches!(
            t.set_line_status(LineId::new(9), LineStatus::Tripped),
            Err(PflowError::NotFound(_))
        ));
        assert!(matches!(
            t.set_generator_status(GenId::new(9), GenStatus::Off),
            Err(PflowError::NotFound(_))
        ));
        assert!(matches!(
            t.add_bus_shunt(BusId::new(42), 0.0, 0.1),
            Err(PflowError::NotFound(_))
        ));
        assert!(!t.is_connectivity_stale());
    }

    #[test]
    fn test_last_generator_off_makes_bus_pq() {
        let mut t = three_bus();
        let first = t.find_generator(BusId::new(3), "1").unwrap();
        let second = t.find_generator(BusId::new(3), "2").unwrap();

        t.set_generator_status(first, GenStatus::Off).unwrap();
        assert_eq!(t.bus(BusId::new(3)).unwrap().kind, BusType::Pv);
        assert_eq!(t.generator(first).unwrap().pg, 0.0);

        t.set_generator_status(second, GenStatus::Off).unwrap();
        assert_eq!(t.bus(BusId::new(3)).unwrap().kind, BusType::Pq);
        assert!(t.is_connectivity_stale());

        t.set_generator_status(second, GenStatus::On).unwrap();
        assert_eq!(t.bus(BusId::new(3)).unwrap().kind, BusType::Pv);
    }

    #[test]
    fn test_repeated_status_is_idempotent() {
        let mut t = three_bus();
        let before = t.num_variables().unwrap();
        let line = LineId::new(0);
        t.set_line_status(line, LineStatus::Active).unwrap();
        t.set_line_status(line, LineStatus::Active).unwrap();
        t.recompute_connectivity().unwrap();
        assert_eq!(t.num_variables().unwrap(), before);
        assert_eq!(t.connectivity().unwrap().islands.len(), 1);
    }

    #[test]
    fn test_value_edits() {
        let mut t = three_bus();
        let load = t.find_load(BusId::new(2), "1").unwrap();
        t.set_load_demand(load, 0.7, 0.3).unwrap();
        t.set_load_status(load, LoadStatus::Off).unwrap();
        t.add_bus_shunt(BusId::new(2), 0.0, 0.19).unwrap();
        t.add_bus_shunt(BusId::new(2), 0.01, 0.0).unwrap();

        let stored = t.load(load).unwrap();
        assert_eq!((stored.pd, stored.qd), (0.7, 0.3));
        assert!(!stored.status.is_on());
        let bus = t.bus(BusId::new(2)).unwrap();
        assert_eq!((bus.gs, bus.bs), (0.01, 0.19));
    }
}
