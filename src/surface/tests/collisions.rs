use super::collide::{BoundOutcome, CollisionParams, Resolution, Resolver};
use super::*;
use crate::boxes::{BoxGrid, BoxGridParams, BoxSizing};
use crate::molecule::Molecule;
use crate::simulation::{EventCounters, EventType};
use crate::walls::{WallType, Walls};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

const EPS: f64 = 1e-9;

fn v(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

/// Plane `x = at` spanning the domain, front facing -x when `front_neg` is set.
fn plane_x(name: &str, surface: usize, at: f64, front_neg: bool) -> Panel {
    let sign = if front_neg { -1.0 } else { 1.0 };
    Panel::new(name, surface, PanelGeometry::axis_rect(0, sign, v(at, 0.0, 0.0), [10.0, 10.0])).unwrap()
}

struct World {
    walls: Walls,
    surfaces: Vec<Surface>,
    boxes: BoxGrid,
    params: CollisionParams,
}

impl World {
    fn new(surfaces: Vec<Surface>) -> Self {
        let walls = Walls::new(3, Vec3::zero(), v(10.0, 10.0, 10.0), [[WallType::Reflect; 2]; 3]).unwrap();
        let mut boxes = BoxGrid::new(&BoxGridParams {
            dim: 3,
            low: Vec3::zero(),
            high: v(10.0, 10.0, 10.0),
            periodic: [false; 3],
            sizing: BoxSizing::Width(1.0),
            accuracy: 10.0,
            max_reach: 0.1,
            nlists: 1,
        })
        .unwrap();
        boxes.rebuild_panels(&surfaces);
        Self { walls, surfaces, boxes, params: CollisionParams { epsilon: EPS, max_iterations: 50 } }
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver { walls: &self.walls, surfaces: &self.surfaces, boxes: &self.boxes, params: self.params }
    }

    fn run(&self, m: &mut Molecule, events: &mut EventCounters) -> Resolution {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut scratch = Vec::new();
        self.resolver().resolve(m, &mut scratch, &mut rng, events)
    }
}

fn moving(from: Vec3, to: Vec3) -> Molecule {
    Molecule { ident: 1, mstate: MolecState::Soln, posx: from, pos: to, ..Default::default() }
}

fn single_plane(action: SurfaceAction) -> World {
    let mut s = Surface::new("wall", 2);
    s.add_panel(plane_x("x5", 0, 5.0, true)).unwrap();
    s.set_action(1, MolecState::Soln, &[Face::Front, Face::Back], action).unwrap();
    World::new(vec![s])
}

#[test]
fn reflect_mirrors_remaining_step() {
    let world = single_plane(SurfaceAction::Reflect);
    let mut m = moving(v(4.0, 5.0, 5.0), v(6.0, 5.5, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Free);
    assert!((m.pos.x - 4.0).abs() < 1e-9);
    assert!((m.pos.y - 5.5).abs() < 1e-9);
    assert!((m.via.x - 5.0).abs() < 1e-9);
}

#[test]
fn nearest_panel_is_handled_first() {
    // absorbing plane behind a reflecting one, listed first
    let mut far = Surface::new("far", 2);
    far.add_panel(plane_x("x55", 0, 5.5, true)).unwrap();
    far.set_action(1, MolecState::Soln, &[Face::Front, Face::Back], SurfaceAction::Absorb).unwrap();
    let mut near = Surface::new("near", 2);
    near.add_panel(plane_x("x5", 1, 5.0, true)).unwrap();
    let world = World::new(vec![far, near]);

    let mut m = moving(v(4.0, 5.0, 5.0), v(6.0, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Free);
    assert!((m.pos.x - 4.0).abs() < 1e-9);
    assert_eq!(events.get(EventType::Surf), 0);
}

#[test]
fn transmit_passes_through() {
    let world = single_plane(SurfaceAction::Transmit);
    let mut m = moving(v(4.0, 5.0, 5.0), v(6.0, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Free);
    assert!((m.pos.x - 6.0).abs() < 1e-12);
}

#[test]
fn absorb_counts_a_surface_event() {
    let world = single_plane(SurfaceAction::Absorb);
    let mut m = moving(v(4.0, 5.0, 5.0), v(6.0, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Absorbed);
    assert_eq!(events.get(EventType::Surf), 1);
}

#[test]
fn jump_moves_to_linked_panel() {
    let mut s = Surface::new("teleport", 2);
    let a = s.add_panel(plane_x("a", 0, 5.0, true)).unwrap();
    let b = s.add_panel(plane_x("b", 0, 8.0, false)).unwrap();
    s.panels[a].jump[Face::Front.index()] = Some((b, Face::Front));
    s.set_action(1, MolecState::Soln, &[Face::Front], SurfaceAction::Jump).unwrap();
    let world = World::new(vec![s]);

    let mut m = moving(v(4.0, 5.0, 5.0), v(6.0, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Free);
    assert!((m.pos - v(9.0, 5.0, 5.0)).mag() < 1e-9, "{:?}", m.pos);
    assert!((m.posoffset.x - 3.0).abs() < 1e-9);
}

#[test]
fn adsorb_binds_at_crossing() {
    let world = single_plane(SurfaceAction::Adsorb(MolecState::Front));
    let mut m = moving(v(4.0, 5.0, 5.0), v(6.0, 5.0, 5.0));
    let mut events = EventCounters::default();
    let pref = PanelRef { surface: 0, panel: 0 };
    assert_eq!(world.run(&mut m, &mut events), Resolution::Adsorbed(pref));
    assert_eq!(m.mstate, MolecState::Front);
    assert_eq!(m.pnl, Some(pref));
    assert!((m.pos.x - 5.0).abs() < 1e-9);
}

#[test]
fn port_exports_with_arrival_face() {
    let world = single_plane(SurfaceAction::Port);
    let mut m = moving(v(6.0, 5.0, 5.0), v(4.0, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Exported { surface: 0, face: Face::Back });
}

#[test]
fn rate_driven_collisions_pick_destinations() {
    let mut s = Surface::new("membrane", 2);
    s.add_panel(plane_x("x5", 0, 5.0, true)).unwrap();
    s.set_rate(1, RateSource::Solution(Face::Front), MolecState::Up, 1e6, None).unwrap();
    s.set_rate(1, RateSource::Solution(Face::Back), MolecState::Soln, 1e6, None).unwrap();
    s.compute_probabilities(0.01, |_| 1.0);
    let world = World::new(vec![s]);
    let mut events = EventCounters::default();

    let mut m = moving(v(4.0, 5.0, 5.0), v(6.0, 5.0, 5.0));
    assert!(matches!(world.run(&mut m, &mut events), Resolution::Adsorbed(_)));
    assert_eq!(m.mstate, MolecState::Up);

    // from the back, a solution destination on the front side transmits
    let mut m = moving(v(6.0, 5.0, 5.0), v(4.0, 5.0, 5.0));
    assert_eq!(world.run(&mut m, &mut events), Resolution::Free);
    assert!((m.pos.x - 4.0).abs() < 1e-12);
}

#[test]
fn bound_molecules_desorb_to_the_front() {
    let mut s = Surface::new("membrane", 2);
    s.add_panel(plane_x("x5", 0, 5.0, true)).unwrap();
    s.set_rate(1, RateSource::Bound(MolecState::Front), MolecState::Soln, 1e6, None).unwrap();
    s.compute_probabilities(0.01, |_| 1.0);
    let world = World::new(vec![s]);

    let pref = PanelRef { surface: 0, panel: 0 };
    let mut m = Molecule {
        ident: 1,
        mstate: MolecState::Front,
        pos: v(5.0, 5.0, 5.0),
        posx: v(5.0, 5.0, 5.0),
        pnl: Some(pref),
        ..Default::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(2);
    let mut events = EventCounters::default();
    assert_eq!(world.resolver().bound_transition(&mut m, &mut rng, &mut events), BoundOutcome::Desorbed);
    assert_eq!(m.mstate, MolecState::Soln);
    assert_eq!(m.pnl, None);
    assert_eq!(m.pnlx, Some(pref));
    // the front of this panel faces -x
    assert!(m.pos.x < 5.0);
    assert_eq!(events.get(EventType::Desorb), 1);
}

#[test]
fn iteration_limit_returns_to_last_safe_point() {
    let mut s = Surface::new("slab", 2);
    s.add_panel(plane_x("lo", 0, 5.0, true)).unwrap();
    s.add_panel(plane_x("hi", 0, 5.001, true)).unwrap();
    let mut world = World::new(vec![s]);
    world.params.max_iterations = 3;

    let mut m = moving(v(5.0005, 5.0, 5.0), v(6.0005, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Stuck);
    assert!(m.pos.x > 5.0 && m.pos.x < 5.001, "{:?}", m.pos);
}

#[test]
fn walls_are_checked_without_surfaces() {
    let world = World::new(Vec::new());
    let mut m = moving(v(9.5, 5.0, 5.0), v(10.5, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Free);
    assert!((m.pos.x - 9.5).abs() < 1e-12);
    assert_eq!(events.get(EventType::Wall), 1);
}

#[test]
fn panel_before_a_wall_is_hit_before_the_reflection() {
    let mut s = Surface::new("skin", 2);
    s.add_panel(plane_x("near_wall", 0, 9.95, true)).unwrap();
    s.set_action(1, MolecState::Soln, &[Face::Front, Face::Back], SurfaceAction::Absorb).unwrap();
    let world = World::new(vec![s]);

    let mut m = moving(v(9.9, 5.0, 5.0), v(10.1, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Absorbed);
    assert_eq!(events.get(EventType::Surf), 1);
    assert_eq!(events.get(EventType::Wall), 0);
}

#[test]
fn wall_reflection_folds_the_path_back_onto_a_panel() {
    let mut s = Surface::new("skin", 2);
    s.add_panel(plane_x("near_wall", 0, 9.8, true)).unwrap();
    s.set_action(1, MolecState::Soln, &[Face::Front, Face::Back], SurfaceAction::Transmit).unwrap();
    let world = World::new(vec![s]);

    // crosses x = 9.8 outward, reflects at 10, crosses 9.8 again inward
    let mut m = moving(v(9.7, 5.0, 5.0), v(10.5, 5.0, 5.0));
    let mut events = EventCounters::default();
    assert_eq!(world.run(&mut m, &mut events), Resolution::Free);
    assert!((m.pos.x - 9.5).abs() < 1e-9, "{:?}", m.pos);
    assert!((m.via.x - 9.8).abs() < 1e-9);
    assert_eq!(events.get(EventType::Wall), 1);
}
