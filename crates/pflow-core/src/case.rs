//! Serialized network cases.
//!
//! A case lists buses, lines, generators and loads in engineering units (MW,
//! MVAr, degrees) on a system MVA base. `into_topology` converts everything
//! to per-unit / radians and populates a [`NetworkTopology`].
//!
//! ```json
//! {
//!   "base_mva": 100.0,
//!   "buses": [{ "id": 1, "kind": "REF", "vm": 1.04 }, { "id": 2 }],
//!   "lines": [{ "from": 1, "to": 2, "r": 0.01, "x": 0.085, "b": 0.176 }],
//!   "generators": [{ "bus": 1, "pg": 50.0, "vs": 1.04 }],
//!   "loads": [{ "bus": 2, "pd": 50.0, "qd": 10.0 }]
//! }
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::topology::NetworkTopology;
use crate::units::{Degrees, Megavars, MegavoltAmperes, Megawatts};
use crate::{
    Bus, BusId, BusType, GenStatus, Generator, Line, LineStatus, Load, LoadStatus, PflowError,
    PflowResult,
};

const CASE9: &str = include_str!("../data/case9.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseData {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_base_mva")]
    pub base_mva: f64,
    pub buses: Vec<BusRecord>,
    #[serde(default)]
    pub lines: Vec<LineRecord>,
    #[serde(default)]
    pub generators: Vec<GeneratorRecord>,
    #[serde(default)]
    pub loads: Vec<LoadRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusRecord {
    pub id: usize,
    /// PQ, PV, REF (or REFERENCE), ISOLATED
    #[serde(default = "default_bus_kind", alias = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_vm")]
    pub vm: f64,
    /// Degrees
    #[serde(default)]
    pub va: f64,
    /// MW consumed at 1.0 pu
    #[serde(default)]
    pub gs: f64,
    /// MVAr injected at 1.0 pu
    #[serde(default)]
    pub bs: f64,
    #[serde(default = "default_vmin")]
    pub vmin: f64,
    #[serde(default = "default_vmax")]
    pub vmax: f64,
    #[serde(default = "default_status")]
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineRecord {
    pub from: usize,
    pub to: usize,
    #[serde(default, alias = "ckt")]
    pub circuit: Option<String>,
    #[serde(default)]
    pub r: f64,
    pub x: f64,
    #[serde(default)]
    pub b: f64,
    #[serde(default)]
    pub tap: f64,
    /// Degrees
    #[serde(default)]
    pub shift: f64,
    /// MVA
    #[serde(default)]
    pub rate_a: f64,
    #[serde(default = "default_status")]
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorRecord {
    pub bus: usize,
    #[serde(default, alias = "ckt")]
    pub circuit: Option<String>,
    #[serde(default)]
    pub pg: f64,
    #[serde(default)]
    pub qg: f64,
    #[serde(default)]
    pub pmin: f64,
    #[serde(default = "default_gen_limit")]
    pub pmax: f64,
    #[serde(default = "default_gen_qmin")]
    pub qmin: f64,
    #[serde(default = "default_gen_limit")]
    pub qmax: f64,
    #[serde(default = "default_vm")]
    pub vs: f64,
    #[serde(default = "default_base_mva")]
    pub mbase: f64,
    #[serde(default = "default_status")]
    pub status: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadRecord {
    pub bus: usize,
    #[serde(default, alias = "ckt")]
    pub circuit: Option<String>,
    #[serde(default)]
    pub pd: f64,
    #[serde(default)]
    pub qd: f64,
    #[serde(default = "default_status")]
    pub status: i64,
}

fn default_base_mva() -> f64 {
    100.0
}

fn default_bus_kind() -> String {
    "PQ".to_string()
}

fn default_vm() -> f64 {
    1.0
}

fn default_vmin() -> f64 {
    0.9
}

fn default_vmax() -> f64 {
    1.1
}

fn default_status() -> i64 {
    1
}

fn default_gen_limit() -> f64 {
    9999.0
}

fn default_gen_qmin() -> f64 {
    -9999.0
}

impl CaseData {
    pub fn from_json_str(input: &str) -> PflowResult<Self> {
        Ok(serde_json::from_str(input)?)
    }

    pub fn from_toml_str(input: &str) -> PflowResult<Self> {
        Ok(toml::from_str(input)?)
    }

    /// Reads a `.json` or `.toml` case file.
    pub fn from_path(path: &Path) -> PflowResult<Self> {
        let text = fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let case = match ext.as_deref() {
            Some("json") => Self::from_json_str(&text)?,
            Some("toml") => Self::from_toml_str(&text)?,
            _ => {
                return Err(PflowError::Parse(format!(
                    "unsupported case format for {}; expected .json or .toml",
                    path.display()
                )))
            }
        };
        debug!(path = %path.display(), buses = case.buses.len(), "case loaded");
        Ok(case)
    }

    /// The WSCC 9-bus, 3-generator system.
    pub fn builtin_case9() -> PflowResult<Self> {
        Self::from_json_str(CASE9)
    }

    pub fn into_topology(self) -> PflowResult<NetworkTopology> {
        let base = MegavoltAmperes(self.base_mva);
        if self.base_mva <= 0.0 {
            return Err(PflowError::configuration("base_mva must be positive"));
        }
        let mw = |value: f64| Megawatts(value).to_per_unit(base).0;
        let mvar = |value: f64| Megavars(value).to_per_unit(base).0;
        let rad = |value: f64| Degrees(value).to_radians().0;

        let mut topology = NetworkTopology::new(self.base_mva);

        for record in self.buses {
            let (kind, isolated) = parse_bus_kind(&record.kind)?;
            let mut bus = Bus::new(BusId::new(record.id), kind)
                .with_name(record.name)
                .with_voltage(record.vm, rad(record.va))
                .with_shunt(mw(record.gs), mvar(record.bs))
                .with_limits(record.vmin, record.vmax);
            if isolated || record.status == 0 {
                bus = bus.inactive();
            }
            topology.add_bus(bus)?;
        }

        for record in self.lines {
            let line = Line::new(BusId::new(record.from), BusId::new(record.to), record.r, record.x)
                .with_charging(record.b)
                .with_tap(record.tap, rad(record.shift))
                .with_rating(record.rate_a)
                .with_circuit(record.circuit.unwrap_or_default())
                .with_status(LineStatus::from(record.status != 0));
            topology.add_line(line)?;
        }

        for record in self.generators {
            let generator = Generator::new(BusId::new(record.bus))
                .with_dispatch(mw(record.pg), mvar(record.qg))
                .with_p_limits(mw(record.pmin), mw(record.pmax))
                .with_q_limits(mvar(record.qmin), mvar(record.qmax))
                .with_setpoint(record.vs)
                .with_mbase(record.mbase)
                .with_circuit(record.circuit.unwrap_or_default())
                .with_status(GenStatus::from(record.status != 0));
            topology.add_generator(generator)?;
        }

        for record in self.loads {
            let load = Load::new(BusId::new(record.bus), mw(record.pd), mvar(record.qd))
                .with_circuit(record.circuit.unwrap_or_default())
                .with_status(LoadStatus::from(record.status != 0));
            topology.add_load(load)?;
        }

        Ok(topology)
    }
}

fn parse_bus_kind(kind: &str) -> PflowResult<(BusType, bool)> {
    match kind.trim().to_ascii_uppercase().as_str() {
        "PQ" | "1" => Ok((BusType::Pq, false)),
        "PV" | "2" => Ok((BusType::Pv, false)),
        "REF" | "REFERENCE" | "SLACK" | "3" => Ok((BusType::Reference, false)),
        "ISOLATED" | "4" => Ok((BusType::Pq, true)),
        other => Err(PflowError::Parse(format!("unknown bus kind '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_builtin_case9_shape() {
        let case = CaseData::builtin_case9().unwrap();
        assert_eq!(case.buses.len(), 9);
        assert_eq!(case.lines.len(), 9);
        assert_eq!(case.generators.len(), 3);
        assert_eq!(case.loads.len(), 3);

        let t = case.into_topology().unwrap();
        let load = t.load(t.find_load(BusId::new(5), "1").unwrap()).unwrap();
        assert!((load.pd - 1.25).abs() < 1e-12);
        assert_eq!(t.bus(BusId::new(1)).unwrap().kind, BusType::Reference);
    }

    #[test]
    fn test_toml_case_with_defaults() {
        let input = r#"
            base_mva = 100.0

            [[buses]]
            id = 1
            kind = "REF"

            [[buses]]
            id = 2
            kind = "isolated"

            [[lines]]
            from = 1
            to = 2
            x = 0.1
            shift = 30.0

            [[generators]]
            bus = 1
            pg = 20.0
        "#;
        let t = CaseData::from_toml_str(input)
            .unwrap()
            .into_topology()
            .unwrap();
        assert!(!t.bus(BusId::new(2)).unwrap().active);
        let line = &t.lines()[0];
        assert_eq!(line.circuit, "1");
        assert!((line.shift - std::f64::consts::PI / 6.0).abs() < 1e-12);
        assert!((t.generators()[0].pg - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_kind_is_parse_error() {
        let input = r#"{ "buses": [{ "id": 1, "kind": "SWING" }] }"#;
        let err = CaseData::from_json_str(input)
            .unwrap()
            .into_topology()
            .unwrap_err();
        assert!(matches!(err, PflowError::Parse(_)));
    }

    #[test]
    fn test_from_path_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two.json");
        let mut file = fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{ "buses": [{{ "id": 1, "kind": "REF" }}, {{ "id": 2 }}],
                 "lines": [{{ "from": 1, "to": 2, "x": 0.2 }}] }}"#
        )
        .unwrap();
        let case = CaseData::from_path(&path).unwrap();
        assert_eq!(case.buses.len(), 2);

        let bad = dir.path().join("two.raw");
        fs::write(&bad, "").unwrap();
        assert!(matches!(
            CaseData::from_path(&bad),
            Err(PflowError::Parse(_))
        ));
        assert!(matches!(
            CaseData::from_path(&dir.path().join("missing.json")),
            Err(PflowError::Io(_))
        ));
    }
}
