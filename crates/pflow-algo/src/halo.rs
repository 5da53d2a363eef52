//! Per-partition voltage state and the ghost (halo) exchange.
//!
//! Each partition keeps `(va, vm)` for its local slots: owned buses first,
//! then ghosts. The Newton vector only touches owned slots; ghosts are
//! refreshed from their owners by [`HaloStates::exchange`], which is the only
//! path by which one partition sees another's values.

use pflow_core::{PartitionId, PartitionLayout, VariableNumbering};
use tracing::trace;

#[derive(Debug, Clone)]
pub struct LocalState {
    pub partition: PartitionId,
    pub va: Vec<f64>,
    pub vm: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct HaloStates {
    states: Vec<LocalState>,
}

impl HaloStates {
    /// Fills every local slot (owned and ghost) from `voltage(pos)`.
    pub fn new(layout: &PartitionLayout, voltage: impl Fn(usize) -> (f64, f64)) -> Self {
        let states = layout
            .parts()
            .iter()
            .map(|part| {
                let n = part.num_slots();
                let mut va = Vec::with_capacity(n);
                let mut vm = Vec::with_capacity(n);
                for slot in 0..n {
                    let (m, a) = part.position_of_slot(slot).map_or((0.0, 0.0), &voltage);
                    vm.push(m);
                    va.push(a);
                }
                LocalState {
                    partition: part.id,
                    va,
                    vm,
                }
            })
            .collect();
        Self { states }
    }

    pub fn state(&self, partition: PartitionId) -> Option<&LocalState> {
        self.states.get(partition.value())
    }

    pub fn states(&self) -> &[LocalState] {
        &self.states
    }

    /// Writes the free variables in `x` into the owned slots.
    pub fn scatter(&mut self, layout: &PartitionLayout, numbering: &VariableNumbering, x: &[f64]) {
        for (part, state) in layout.parts().iter().zip(self.states.iter_mut()) {
            for (slot, &pos) in part.owned().iter().enumerate() {
                let vars = numbering.bus(pos);
                if let Some(i) = vars.angle {
                    state.va[slot] = x[i];
                }
                if let Some(i) = vars.magnitude {
                    state.vm[slot] = x[i];
                }
            }
        }
    }

    /// Reads the free variables of the owned slots into a global vector.
    pub fn gather(&self, layout: &PartitionLayout, numbering: &VariableNumbering) -> Vec<f64> {
        let mut x = vec![0.0; numbering.total()];
        for (part, state) in layout.parts().iter().zip(self.states.iter()) {
            for (slot, &pos) in part.owned().iter().enumerate() {
                let vars = numbering.bus(pos);
                if let Some(i) = vars.angle {
                    x[i] = state.va[slot];
                }
                if let Some(i) = vars.magnitude {
                    x[i] = state.vm[slot];
                }
            }
        }
        x
    }

    /// Copies owner values into every ghost slot. Returns the number of
    /// ghost slots refreshed.
    pub fn exchange(&mut self, layout: &PartitionLayout) -> usize {
        let mut updates = Vec::new();
        for part in layout.parts() {
            for &pos in part.ghosts() {
                let owner = layout.owner_of(pos);
                let (Some(src), Some(dst)) = (
                    layout.part(owner).and_then(|p| p.slot(pos)),
                    part.slot(pos),
                ) else {
                    continue;
                };
                let from = &self.states[owner.value()];
                updates.push((part.id.value(), dst, from.va[src], from.vm[src]));
            }
        }
        let refreshed = updates.len();
        for (part, slot, va, vm) in updates {
            self.states[part].va[slot] = va;
            self.states[part].vm[slot] = vm;
        }
        trace!(refreshed, "halo exchange");
        refreshed
    }

    /// `(vm, va)` of a bus as held by its owner.
    pub fn voltage(&self, layout: &PartitionLayout, pos: usize) -> (f64, f64) {
        let owner = layout.owner_of(pos);
        layout
            .part(owner)
            .and_then(|p| p.slot(pos))
            .map_or((0.0, 0.0), |slot| {
                let state = &self.states[owner.value()];
                (state.vm[slot], state.va[slot])
            })
    }
}
