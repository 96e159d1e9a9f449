use super::*;
use crate::compartment::Compartment;
use crate::config::SimConfig;
use crate::molecule::{MolecState, PanelRef};
use crate::reaction::{Product, Reactant, Reaction};
use crate::surface::{Face, PanelGeometry};
use crate::utils::Vec3;
use crate::walls::WallType;

const SOLN: MolecState = MolecState::Soln;

fn v(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

fn builder(seed: u64, high: f64, kind: WallType) -> SimBuilder {
    builder_with(SimConfig { seed, dt: 0.01, time_stop: 10.0, ..Default::default() }, high, kind)
}

fn builder_with(config: SimConfig, high: f64, kind: WallType) -> SimBuilder {
    let mut b = SimBuilder::new(config).unwrap();
    b.set_boundaries(Vec3::zero(), v(high, high, high), [[kind; 2]; 3]).unwrap();
    b
}

fn species(b: &mut SimBuilder, name: &str, difc: f64) -> usize {
    let id = b.add_species(name).unwrap();
    b.species_mut().unwrap().set_difc(id, MolecState::All, difc).unwrap();
    id
}

fn soln(ident: usize) -> Reactant {
    Reactant { ident, state: SOLN }
}

#[test]
fn reflective_box_conserves_molecules() {
    let mut b = builder(1, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 1.0);
    b.add_molecules(a, SOLN, 300, Placement::Uniform).unwrap();
    let mut sim = b.build().unwrap();
    sim.run(50).unwrap();
    assert_eq!(sim.count(a, SOLN), 300);
    assert_eq!(sim.iteration, 50);
    assert!((sim.time - 0.5).abs() < 1e-12);
    assert!(sim.mols.iter_live().all(|(_, m)| sim.walls.contains(m.pos)));
    assert!(sim.events.get(EventType::Wall) > 0);
    sim.validate_boxes().unwrap();
}

#[test]
fn periodic_box_keeps_molecules_inside() {
    let mut b = builder(2, 4.0, WallType::Periodic);
    let a = species(&mut b, "A", 2.0);
    b.add_molecules(a, SOLN, 100, Placement::Uniform).unwrap();
    let mut sim = b.build().unwrap();
    sim.run(100).unwrap();
    assert_eq!(sim.count(a, SOLN), 100);
    assert!(sim.mols.iter_live().all(|(_, m)| sim.walls.contains(m.pos)));
    sim.validate_boxes().unwrap();
}

#[test]
fn first_order_decay_follows_exponential() {
    let mut b = builder(3, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 0.0);
    let mut decay = Reaction::new("decay", &[soln(a)], &[]).unwrap();
    decay.rate = Some(1.0);
    b.add_reaction(decay).unwrap();
    let n = 4000;
    b.add_molecules(a, SOLN, n, Placement::Uniform).unwrap();
    let mut sim = b.build().unwrap();
    sim.run_until(1.0).unwrap();
    assert_eq!(sim.iteration, 100);
    let left = sim.count(a, SOLN);
    let frac = left as f64 / n as f64;
    assert!((frac - (-1.0f64).exp()).abs() < 0.04, "fraction {frac}");
    assert_eq!(sim.events.get(EventType::Rxn1), (n - left) as u64);
}

#[test]
fn zero_order_production_matches_mean() {
    let mut b = builder(4, 1.0, WallType::Reflect);
    let a = species(&mut b, "A", 0.0);
    let mut make = Reaction::new("make", &[], &[Product::new(a, SOLN)]).unwrap();
    make.rate = Some(1000.0);
    b.add_reaction(make).unwrap();
    let mut sim = b.build().unwrap();
    // volume 1, so 10 per step on average
    sim.run(100).unwrap();
    let made = sim.count(a, SOLN);
    assert!((850..1150).contains(&made), "made {made}");
    assert_eq!(sim.events.get(EventType::Rxn0), made as u64);
    sim.validate_boxes().unwrap();
}

fn binding_pair(separation: f64) -> (Simulation, [usize; 3]) {
    let mut b = builder(5, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 0.0);
    let bb = species(&mut b, "B", 0.0);
    let c = species(&mut b, "C", 0.0);
    let mut bind = Reaction::new("bind", &[soln(a), soln(bb)], &[Product::new(c, SOLN)]).unwrap();
    bind.bindrad_fixed = Some(1.0);
    b.add_reaction(bind).unwrap();
    b.add_molecules(a, SOLN, 1, Placement::Point(v(5.0, 5.0, 5.0))).unwrap();
    b.add_molecules(bb, SOLN, 1, Placement::Point(v(5.0 + separation, 5.0, 5.0))).unwrap();
    (b.build().unwrap(), [a, bb, c])
}

#[test]
fn pairs_within_binding_radius_react() {
    let (mut sim, [a, b, c]) = binding_pair(0.5);
    sim.step().unwrap();
    assert_eq!(sim.count(a, SOLN), 0);
    assert_eq!(sim.count(b, SOLN), 0);
    assert_eq!(sim.count(c, SOLN), 1);
    let (_, prod) = sim.mols.iter_live().next().unwrap();
    // immobile reactants meet halfway
    assert!((prod.pos - v(5.25, 5.0, 5.0)).mag() < 1e-12);
}

#[test]
fn pairs_beyond_binding_radius_never_react() {
    let (mut sim, [a, b, c]) = binding_pair(1.5);
    sim.run(20).unwrap();
    assert_eq!(sim.count(a, SOLN), 1);
    assert_eq!(sim.count(b, SOLN), 1);
    assert_eq!(sim.count(c, SOLN), 0);
}

#[test]
fn reaction_probability_thins_close_pairs() {
    let mut fired = 0;
    let mut trials = 0;
    for seed in 0..4 {
        let mut b = builder(100 + seed, 10.0, WallType::Reflect);
        let a = species(&mut b, "A", 0.0);
        let bb = species(&mut b, "B", 0.0);
        let c = species(&mut b, "C", 0.0);
        let mut bind = Reaction::new("bind", &[soln(a), soln(bb)], &[Product::new(c, SOLN)]).unwrap();
        bind.bindrad_fixed = Some(1.0);
        bind.prob_fixed = Some(0.3);
        b.add_reaction(bind).unwrap();
        // pairs 0.5 apart on a lattice of spacing 2, so only partners are in range
        for i in 0..5 {
            for j in 0..5 {
                for k in 0..5 {
                    let p = v(1.0 + 2.0 * i as f64, 1.0 + 2.0 * j as f64, 1.0 + 2.0 * k as f64);
                    b.add_molecules(a, SOLN, 1, Placement::Point(p)).unwrap();
                    b.add_molecules(bb, SOLN, 1, Placement::Point(p + v(0.5, 0.0, 0.0))).unwrap();
                }
            }
        }
        let mut sim = b.build().unwrap();
        sim.step().unwrap();
        let made = sim.count(c, SOLN);
        assert_eq!(sim.count(a, SOLN), 125 - made);
        let pair_events = sim.events.get(EventType::Rxn2Intra) + sim.events.get(EventType::Rxn2Inter);
        assert_eq!(pair_events, made as u64);
        fired += made;
        trials += 125;
    }
    let fraction = fired as f64 / trials as f64;
    assert!((fraction - 0.3).abs() < 0.06, "fraction {fraction}");
}

#[test]
fn disabled_reactions_do_not_fire() {
    let (mut sim, [a, _, c]) = binding_pair(0.5);
    sim.set_reaction_enabled("bind", false).unwrap();
    sim.run(5).unwrap();
    assert_eq!(sim.count(a, SOLN), 1);
    assert_eq!(sim.count(c, SOLN), 0);
    assert!(sim.set_reaction_enabled("unbind", true).is_err());
    sim.set_reaction_enabled("bind", true).unwrap();
    sim.step().unwrap();
    assert_eq!(sim.count(c, SOLN), 1);
}

#[test]
fn same_seed_gives_same_trajectory() {
    let run = || {
        let mut b = builder(42, 5.0, WallType::Reflect);
        let a = species(&mut b, "A", 1.0);
        let bb = species(&mut b, "B", 0.5);
        let mut decay = Reaction::new("decay", &[soln(a)], &[Product::new(bb, SOLN)]).unwrap();
        decay.rate = Some(2.0);
        b.add_reaction(decay).unwrap();
        b.add_molecules(a, SOLN, 200, Placement::Uniform).unwrap();
        let mut sim = b.build().unwrap();
        sim.run(30).unwrap();
        sim.snapshot()
    };
    let (s1, s2) = (run(), run());
    assert_eq!(s1.counts, s2.counts);
    assert_eq!(s1.molecules.len(), s2.molecules.len());
    for (m1, m2) in s1.molecules.iter().zip(&s2.molecules) {
        assert_eq!(m1.serno, m2.serno);
        assert_eq!(m1.pos, m2.pos);
    }
}

#[test]
fn misplaced_molecules_fail_validation() {
    let config = SimConfig { seed: 6, boxsize: Some(1.0), ..Default::default() };
    let mut b = builder_with(config, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 0.0);
    b.add_molecules(a, SOLN, 1, Placement::Point(v(1.0, 1.0, 1.0))).unwrap();
    let mut sim = b.build().unwrap();
    sim.validate_boxes().unwrap();
    let id = sim.mols.iter_live().next().unwrap().0;
    sim.mols.get_mut(id).pos = v(9.0, 9.0, 9.0);
    assert!(sim.validate_boxes().is_err());
    sim.sort_molecules();
    sim.validate_boxes().unwrap();
}

#[test]
fn builder_enforces_stage_order() {
    let mut b = builder(7, 10.0, WallType::Reflect);
    assert_eq!(b.stage(), BuildStage::Uninit);
    assert!(b.compute_params().is_err());
    assert!(b.finish().is_err());
    species(&mut b, "A", 1.0);
    b.build_lists().unwrap();
    assert_eq!(b.stage(), BuildStage::ListsBuilt);
    assert!(b.add_species("B").is_err());
    assert!(b.build_lists().is_err());
    b.compute_params().unwrap();
    let _sim = b.finish().unwrap();
    assert_eq!(b.stage(), BuildStage::Ready);
    assert!(b.finish().is_err());
}

#[test]
fn builder_rejects_bad_definitions() {
    let config = SimConfig::default();
    let mut b = SimBuilder::new(config).unwrap();
    assert!(b.build_lists().is_err(), "boundaries are required");

    let mut b = builder(8, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 1.0);
    assert!(b.add_molecules(a, MolecState::All, 1, Placement::Uniform).is_err());
    assert!(b.add_molecules(9, SOLN, 1, Placement::Uniform).is_err());
    let mut r = Reaction::new("r", &[soln(a)], &[]).unwrap();
    r.rate = Some(1.0);
    b.add_reaction(r.clone()).unwrap();
    assert!(b.add_reaction(r).is_err());
    // bound products need a surface to land on
    let stick = Reaction::new("stick", &[soln(a)], &[Product::new(a, MolecState::Front)]).unwrap();
    b.add_reaction(stick).unwrap();
    assert!(b.build_lists().is_err());

    let config = SimConfig { dim: 4, ..Default::default() };
    assert!(SimBuilder::new(config).is_err());
}

fn port_system(n: usize) -> (Simulation, usize) {
    let mut b = builder(9, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 1.0);
    let s = b.add_surface("membrane").unwrap();
    b.add_panel(s, "x5", PanelGeometry::axis_rect(0, -1.0, v(5.0, 0.0, 0.0), [10.0, 10.0])).unwrap();
    b.add_port("out", s, Face::Front).unwrap();
    b.add_molecules(a, SOLN, n, Placement::Region { low: v(4.0, 0.0, 0.0), high: v(5.0, 10.0, 10.0) })
        .unwrap();
    (b.build().unwrap(), a)
}

#[test]
fn port_exports_and_imports() {
    let n = 200;
    let (mut sim, a) = port_system(n);
    sim.run(100).unwrap();
    let port = sim.port_index("out").unwrap();
    let exported = sim.take_exported(port);
    assert!(!exported.is_empty());
    assert_eq!(sim.count(a, SOLN) + exported.len(), n);
    assert_eq!(sim.events.get(EventType::Export), exported.len() as u64);
    assert!(exported.iter().all(|m| m.ident == a));
    assert!(sim.take_exported(port).is_empty());

    let before = sim.count(a, SOLN);
    let ids = sim.import_molecules(port, &exported).unwrap();
    assert_eq!(ids.len(), exported.len());
    assert_eq!(sim.count(a, SOLN), before + exported.len());
    assert_eq!(sim.events.get(EventType::Import), exported.len() as u64);
    for id in ids {
        let x = sim.mols.get(id).pos.x;
        assert!(x < 5.0 && x > 5.0 - 1e-6, "imported at x = {x}");
    }
    sim.validate_boxes().unwrap();
    assert!(sim.port_index("in").is_err());
}

#[test]
fn bound_molecules_follow_a_moved_panel() {
    let mut b = builder(10, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 0.0);
    let s = b.add_surface("membrane").unwrap();
    b.add_panel(s, "x5", PanelGeometry::axis_rect(0, -1.0, v(5.0, 0.0, 0.0), [10.0, 10.0])).unwrap();
    b.add_molecules(a, MolecState::Front, 20, Placement::Surface { surface: s, face: Face::Front }).unwrap();
    let mut sim = b.build().unwrap();
    assert_eq!(sim.count(a, MolecState::Front), 20);

    let pref = PanelRef { surface: s, panel: 0 };
    sim.translate_panel(pref, v(1.5, 0.0, 0.0)).unwrap();
    for (_, m) in sim.mols.iter_live() {
        assert_eq!(m.pnl, Some(pref));
        assert!((m.pos.x - 6.5).abs() < 1e-12, "{:?}", m.pos);
    }
    sim.validate_boxes().unwrap();
    sim.run(5).unwrap();
    assert_eq!(sim.count(a, MolecState::Front), 20);
    assert!(sim.translate_panel(PanelRef { surface: s, panel: 3 }, Vec3::zero()).is_err());
}

#[test]
fn compartment_placement_stays_inside() {
    let config = SimConfig { seed: 11, boxsize: Some(1.0), ..Default::default() };
    let mut b = builder_with(config, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 0.0);
    let s = b.add_surface("cell").unwrap();
    b.add_panel(s, "ball", PanelGeometry::Sph { center: v(5.0, 5.0, 5.0), radius: 2.0, outward: true })
        .unwrap();
    let mut cell = Compartment::new("inside");
    cell.surfaces.push(s);
    cell.points.push(v(5.0, 5.0, 5.0));
    let c = b.add_compartment(cell).unwrap();
    b.add_molecules(a, SOLN, 100, Placement::Compartment(c)).unwrap();
    let sim = b.build().unwrap();
    assert_eq!(sim.count(a, SOLN), 100);
    for (_, m) in sim.mols.iter_live() {
        assert!((m.pos - v(5.0, 5.0, 5.0)).mag() < 2.0);
        assert!(sim.point_in_compartment(c, m.pos));
    }
    assert!(!sim.point_in_compartment(c, v(1.0, 1.0, 1.0)));
    let exact = 4.0 / 3.0 * std::f64::consts::PI * 8.0;
    let vol = sim.compartments[c].volume;
    assert!((vol - exact).abs() / exact < 0.15, "volume {vol}");
}

#[test]
fn snapshot_reports_counts_and_colors() {
    let mut b = builder(12, 10.0, WallType::Reflect);
    let a = species(&mut b, "A", 0.0);
    species(&mut b, "B", 0.0);
    b.species_mut().unwrap().set_color(a, MolecState::All, palette::Srgb::new(1.0, 0.0, 0.0)).unwrap();
    b.add_molecules(a, SOLN, 3, Placement::Uniform).unwrap();
    let sim = b.build().unwrap();
    let snap = sim.snapshot();
    assert_eq!(snap.counts["A"], 3);
    assert_eq!(snap.counts["B"], 0);
    assert_eq!(snap.molecules[0].color, [1.0, 0.0, 0.0]);
    assert_eq!(sim.count_by_name("A").unwrap(), 3);
    assert!(sim.count_by_name("Z").is_err());
    let json = snap.to_json().unwrap();
    assert!(json.contains("\"rxn1\": 0"));
}
