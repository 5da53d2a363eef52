//! # pflow-core: network model for the AC power-flow engine
//!
//! Holds the arena of buses, lines, generators and loads, the partition layout
//! used for distributed assembly, the variable numbering of the Newton unknowns,
//! and the island / reference-bus analysis that must be rerun after every
//! topology edit.
//!
//! ## Design
//!
//! Entities live in flat vectors and refer to each other by stable integer ids:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │  NetworkTopology                                                     │
//! │    buses[]      Bus { id: BusId, kind, vm, va, shunt, island, .. }   │
//! │    lines[]      Line { id: LineId, from: BusId, to: BusId, .. }      │
//! │    generators[] Generator { id: GenId, bus: BusId, status, .. }      │
//! │    loads[]      Load { id: LoadId, bus: BusId, status, .. }          │
//! │                                                                      │
//! │    incident[bus position] -> [LineId]     (index lists, no pointers) │
//! │    layout    -> partitions with OWNED and GHOST bus slots            │
//! │    numbering -> global offsets of the free angle / magnitude vars    │
//! │    connectivity -> islands, reference bus per island, blackouts      │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lifecycle: `add_*` → optional `partition(n)` → `finalize()` → status
//! mutations (which mark connectivity stale) → `recompute_connectivity()`.
//!
//! ## Quick Start
//!
//! ```rust
//! use pflow_core::*;
//!
//! let mut topology = NetworkTopology::new(100.0);
//! topology.add_bus(Bus::new(BusId::new(1), BusType::Reference).with_voltage(1.02, 0.0)).unwrap();
//! topology.add_bus(Bus::new(BusId::new(2), BusType::Pq)).unwrap();
//! topology.add_line(Line::new(BusId::new(1), BusId::new(2), 0.01, 0.1)).unwrap();
//! topology.add_generator(Generator::new(BusId::new(1)).with_setpoint(1.02)).unwrap();
//! topology.add_load(Load::new(BusId::new(2), 0.5, 0.1)).unwrap();
//!
//! topology.finalize().unwrap();
//! assert_eq!(topology.num_variables().unwrap(), 2);
//! ```

use serde::{Deserialize, Serialize};

pub mod case;
pub mod connectivity;
pub mod diagnostics;
pub mod error;
pub mod mutation;
pub mod numbering;
pub mod partition;
pub mod shared;
pub mod topology;
pub mod units;

pub use case::CaseData;
pub use connectivity::{
    ConnectivityAnalyzer, ConnectivityReport, Island, IslandStatus, ReferencePolicy,
};
pub use diagnostics::{DiagnosticIssue, Diagnostics, Severity};
pub use error::{PflowError, PflowResult};
pub use numbering::{BusVariables, VariableNumbering};
pub use partition::{Partition, PartitionLayout, TieLine};
pub use shared::SharedTopology;
pub use topology::NetworkTopology;

// Newtype wrappers for IDs for type safety
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionId(usize);
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IslandId(usize);

macro_rules! impl_id {
    ($($type:ident),*) => {
        $(
            impl $type {
                #[inline]
                pub fn new(value: usize) -> Self {
                    $type(value)
                }
                #[inline]
                pub fn value(&self) -> usize {
                    self.0
                }
            }

            impl std::fmt::Display for $type {
                fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

impl_id!(BusId, LineId, GenId, LoadId, PartitionId, IslandId);

/// Bus classification used by the Newton formulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusType {
    /// P and Q specified; angle and magnitude are unknowns
    Pq,
    /// P and |V| specified; angle is the only unknown
    Pv,
    /// Angle reference of its island; no unknowns
    Reference,
}

impl BusType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BusType::Pq => "PQ",
            BusType::Pv => "PV",
            BusType::Reference => "REF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineStatus {
    Active,
    Tripped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenStatus {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadStatus {
    On,
    Off,
}

impl LineStatus {
    /// Accepts the textual forms used by callers: `1`/`0`, `on`/`off`,
    /// `active`/`tripped`, `closed`/`open`.
    pub fn parse(input: &str) -> PflowResult<Self> {
        match parse_switch(input) {
            Some(true) => Ok(LineStatus::Active),
            Some(false) => Ok(LineStatus::Tripped),
            None => Err(PflowError::Parse(format!(
                "unknown line status '{input}'; expected active/tripped, on/off or 1/0"
            ))),
        }
    }

    pub fn is_active(self) -> bool {
        self == LineStatus::Active
    }
}

impl GenStatus {
    pub fn parse(input: &str) -> PflowResult<Self> {
        match parse_switch(input) {
            Some(true) => Ok(GenStatus::On),
            Some(false) => Ok(GenStatus::Off),
            None => Err(PflowError::Parse(format!(
                "unknown generator status '{input}'; expected on/off or 1/0"
            ))),
        }
    }

    pub fn is_on(self) -> bool {
        self == GenStatus::On
    }
}

impl LoadStatus {
    pub fn is_on(self) -> bool {
        self == LoadStatus::On
    }
}

impl From<bool> for LineStatus {
    fn from(active: bool) -> Self {
        if active {
            LineStatus::Active
        } else {
            LineStatus::Tripped
        }
    }
}

impl From<bool> for GenStatus {
    fn from(on: bool) -> Self {
        if on {
            GenStatus::On
        } else {
            GenStatus::Off
        }
    }
}

impl From<bool> for LoadStatus {
    fn from(on: bool) -> Self {
        if on {
            LoadStatus::On
        } else {
            LoadStatus::Off
        }
    }
}

fn parse_switch(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "active" | "closed" | "in" => Some(true),
        "0" | "off" | "tripped" | "open" | "out" => Some(false),
        _ => None,
    }
}

/// Whether a bus is owned by a partition or mirrored there read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ownership {
    Owned,
    Ghost,
}

#[derive(Debug, Clone)]
pub struct Bus {
    pub id: BusId,
    pub name: String,
    pub kind: BusType,
    /// Voltage magnitude in per-unit
    pub vm: f64,
    /// Voltage angle in radians
    pub va: f64,
    /// Shunt conductance in per-unit (consumption at 1.0 pu)
    pub gs: f64,
    /// Shunt susceptance in per-unit (injection at 1.0 pu)
    pub bs: f64,
    pub vmin: f64,
    pub vmax: f64,
    /// Out-of-service buses take no part in traversal or assembly
    pub active: bool,
    /// Assigned by the connectivity pass
    pub island: Option<IslandId>,
    /// False for inactive buses and for members of blacked-out islands
    pub energized: bool,
}

impl Bus {
    pub fn new(id: BusId, kind: BusType) -> Self {
        Self {
            id,
            name: String::new(),
            kind,
            vm: 1.0,
            va: 0.0,
            gs: 0.0,
            bs: 0.0,
            vmin: 0.9,
            vmax: 1.1,
            active: true,
            island: None,
            energized: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Initial magnitude (pu) and angle (radians).
    pub fn with_voltage(mut self, vm: f64, va: f64) -> Self {
        self.vm = vm;
        self.va = va;
        self
    }

    pub fn with_shunt(mut self, gs: f64, bs: f64) -> Self {
        self.gs = gs;
        self.bs = bs;
        self
    }

    pub fn with_limits(mut self, vmin: f64, vmax: f64) -> Self {
        self.vmin = vmin;
        self.vmax = vmax;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Line {
    /// Assigned by `NetworkTopology::add_line`
    pub id: LineId,
    pub from: BusId,
    pub to: BusId,
    /// Circuit identifier distinguishing parallel lines ("1", "2", ...)
    pub circuit: String,
    /// Series resistance (per-unit)
    pub r: f64,
    /// Series reactance (per-unit)
    pub x: f64,
    /// Total line charging susceptance (per-unit, split half/half)
    pub b: f64,
    /// Off-nominal tap ratio; 0.0 means nominal (1.0)
    pub tap: f64,
    /// Phase shift in radians
    pub shift: f64,
    /// Long-term rating in MVA; 0.0 means unlimited
    pub rate_a: f64,
    pub status: LineStatus,
    /// Partition owning the from bus, set by the partition step
    pub owner: Option<PartitionId>,
}

impl Line {
    pub fn new(from: BusId, to: BusId, r: f64, x: f64) -> Self {
        Self {
            id: LineId(0),
            from,
            to,
            circuit: String::new(),
            r,
            x,
            b: 0.0,
            tap: 0.0,
            shift: 0.0,
            rate_a: 0.0,
            status: LineStatus::Active,
            owner: None,
        }
    }

    pub fn with_charging(mut self, b: f64) -> Self {
        self.b = b;
        self
    }

    /// Tap ratio and phase shift (radians).
    pub fn with_tap(mut self, tap: f64, shift: f64) -> Self {
        self.tap = tap;
        self.shift = shift;
        self
    }

    pub fn with_circuit(mut self, circuit: impl Into<String>) -> Self {
        self.circuit = circuit.into();
        self
    }

    pub fn with_rating(mut self, rate_a: f64) -> Self {
        self.rate_a = rate_a;
        self
    }

    pub fn with_status(mut self, status: LineStatus) -> Self {
        self.status = status;
        self
    }

    /// Effective tap magnitude.
    pub fn tap_ratio(&self) -> f64 {
        if self.tap == 0.0 {
            1.0
        } else {
            self.tap
        }
    }

    /// True when the line connects `a` and `b` in either orientation.
    pub fn joins(&self, a: BusId, b: BusId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    /// The endpoint opposite to `bus`.
    pub fn other_end(&self, bus: BusId) -> BusId {
        if self.from == bus {
            self.to
        } else {
            self.from
        }
    }
}

#[derive(Debug, Clone)]
pub struct Generator {
    pub id: GenId,
    pub bus: BusId,
    pub circuit: String,
    /// Active dispatch (per-unit)
    pub pg: f64,
    /// Reactive dispatch (per-unit)
    pub qg: f64,
    pub pmin: f64,
    pub pmax: f64,
    pub qmin: f64,
    pub qmax: f64,
    /// Voltage magnitude setpoint (per-unit)
    pub vs: f64,
    /// Machine base in MVA, used to split reactive output when Pg is zero
    pub mbase: f64,
    pub status: GenStatus,
}

impl Generator {
    pub fn new(bus: BusId) -> Self {
        Self {
            id: GenId(0),
            bus,
            circuit: String::new(),
            pg: 0.0,
            qg: 0.0,
            pmin: 0.0,
            pmax: 99.99,
            qmin: -99.99,
            qmax: 99.99,
            vs: 1.0,
            mbase: 100.0,
            status: GenStatus::On,
        }
    }

    pub fn with_dispatch(mut self, pg: f64, qg: f64) -> Self {
        self.pg = pg;
        self.qg = qg;
        self
    }

    pub fn with_p_limits(mut self, pmin: f64, pmax: f64) -> Self {
        self.pmin = pmin;
        self.pmax = pmax;
        self
    }

    pub fn with_q_limits(mut self, qmin: f64, qmax: f64) -> Self {
        self.qmin = qmin;
        self.qmax = qmax;
        self
    }

    pub fn with_setpoint(mut self, vs: f64) -> Self {
        self.vs = vs;
        self
    }

    pub fn with_mbase(mut self, mbase: f64) -> Self {
        self.mbase = mbase;
        self
    }

    pub fn with_circuit(mut self, circuit: impl Into<String>) -> Self {
        self.circuit = circuit.into();
        self
    }

    pub fn with_status(mut self, status: GenStatus) -> Self {
        self.status = status;
        self
    }

    /// Fixed-VAR units have coincident reactive limits.
    pub fn is_fixed_var(&self) -> bool {
        (self.qmax - self.qmin).abs() < 1e-8
    }
}

#[derive(Debug, Clone)]
pub struct Load {
    pub id: LoadId,
    pub bus: BusId,
    pub circuit: String,
    /// Active demand (per-unit)
    pub pd: f64,
    /// Reactive demand (per-unit)
    pub qd: f64,
    pub status: LoadStatus,
}

impl Load {
    pub fn new(bus: BusId, pd: f64, qd: f64) -> Self {
        Self {
            id: LoadId(0),
            bus,
            circuit: String::new(),
            pd,
            qd,
            status: LoadStatus::On,
        }
    }

    pub fn with_circuit(mut self, circuit: impl Into<String>) -> Self {
        self.circuit = circuit.into();
        self
    }

    pub fn with_status(mut self, status: LoadStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_parse() {
        assert_eq!(LineStatus::parse("0").unwrap(), LineStatus::Tripped);
        assert_eq!(LineStatus::parse(" Active ").unwrap(), LineStatus::Active);
        assert_eq!(GenStatus::parse("off").unwrap(), GenStatus::Off);
        assert!(matches!(GenStatus::parse("maybe"), Err(PflowError::Parse(_))));
    }

    #[test]
    fn zero_tap_means_nominal() {
        let line = Line::new(BusId::new(1), BusId::new(2), 0.0, 0.1);
        assert_eq!(line.tap_ratio(), 1.0);
        assert_eq!(line.clone().with_tap(0.95, 0.0).tap_ratio(), 0.95);
        assert!(line.joins(BusId::new(2), BusId::new(1)));
        assert_eq!(line.other_end(BusId::new(2)), BusId::new(1));
    }

    #[test]
    fn ids_display_raw_value() {
        assert_eq!(BusId::new(9).to_string(), "9");
        assert_eq!(LineId::new(3).value(), 3);
    }
}
