use pflow_core::*;

fn case9(parts: usize) -> NetworkTopology {
    let mut topology = CaseData::builtin_case9()
        .unwrap()
        .into_topology()
        .unwrap();
    topology.partition(parts).unwrap();
    topology.finalize().unwrap();
    topology
}

fn ids(values: &[usize]) -> Vec<BusId> {
    values.iter().map(|&v| BusId::new(v)).collect()
}

fn trip(topology: &mut NetworkTopology, from: usize, to: usize) {
    let line = topology
        .find_line(BusId::new(from), BusId::new(to), "1")
        .unwrap();
    topology.set_line_status(line, LineStatus::Tripped).unwrap();
}

#[test]
fn base_case_is_one_energized_island() {
    let t = case9(1);
    let report = t.connectivity().unwrap();
    assert_eq!(report.islands.len(), 1);
    assert_eq!(report.references(), ids(&[1]));
    // 6 PQ buses * 2 + 2 PV buses
    assert_eq!(t.num_variables().unwrap(), 14);
}

#[test]
fn two_trips_split_the_network() {
    let mut t = case9(1);
    trip(&mut t, 8, 9);
    assert_eq!(t.recompute_connectivity().unwrap().islands.len(), 1);
    trip(&mut t, 4, 6);

    let report = t.recompute_connectivity().unwrap();
    assert_eq!(report.islands.len(), 2);
    assert_eq!(report.islands[0].buses, ids(&[1, 2, 4, 5, 7, 8]));
    assert_eq!(report.islands[1].buses, ids(&[3, 6, 9]));
    assert_eq!(report.references(), ids(&[1, 3]));
    assert_eq!(t.bus(BusId::new(3)).unwrap().kind, BusType::Reference);
}

#[test]
fn generator_off_blacks_out_the_small_island() {
    let mut t = case9(3);
    trip(&mut t, 8, 9);
    trip(&mut t, 4, 6);
    let gen = t.find_generator(BusId::new(3), "1").unwrap();
    t.set_generator_status(gen, GenStatus::Off).unwrap();

    let report = t.recompute_connectivity().unwrap().clone();
    let dark: Vec<&Island> = report.blacked_out().collect();
    assert_eq!(dark.len(), 1);
    assert_eq!(dark[0].buses, ids(&[3, 6, 9]));
    let warnings: Vec<_> = report.diagnostics.by_category("blackout").collect();
    assert_eq!(warnings[0].buses, ids(&[3, 6, 9]));

    // 4 PQ buses * 2 + bus 2 (PV)
    assert_eq!(t.num_variables().unwrap(), 9);
}

#[test]
fn partition_count_does_not_change_the_unknown_count() {
    let totals: Vec<usize> = (1..=4)
        .map(|parts| case9(parts).num_variables().unwrap())
        .collect();
    assert!(totals.iter().all(|&n| n == totals[0]));

    let t = case9(3);
    let layout = t.layout().unwrap();
    let owned: usize = layout.parts().iter().map(|p| p.owned().len()).sum();
    assert_eq!(owned, 9);
    assert!(layout.tie_line_count() > 0);
}

#[test]
fn shared_handle_sees_mutations() {
    let shared = SharedTopology::new(case9(2));
    let other = shared.retain().unwrap();
    shared
        .with_mut(|t| {
            trip(t, 8, 9);
            trip(t, 4, 6);
            t.recompute_connectivity().map(|r| r.islands.len())
        })
        .unwrap()
        .unwrap();
    let islands = other
        .with(|t| t.connectivity().map(|r| r.islands.len()))
        .unwrap()
        .unwrap();
    assert_eq!(islands, 2);
    other.release().unwrap();
    shared.release().unwrap();
    assert!(shared.with(|t| t.buses().len()).is_err());
}
