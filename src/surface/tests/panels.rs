use super::*;
use crate::error::SimError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::f64::consts::PI;

fn v(x: f64, y: f64, z: f64) -> Vec3 {
    Vec3::new(x, y, z)
}

fn panel(geom: PanelGeometry) -> Panel {
    Panel::new("p", 0, geom).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn rect_crossing_reports_face() {
    let p = panel(PanelGeometry::axis_rect(2, 1.0, v(0.0, 0.0, 1.0), [2.0, 2.0]));
    assert!(close(p.front().z, 1.0));
    assert!(close(p.area(), 4.0));

    let hit = p.crossing(v(0.5, 0.5, 2.0), v(0.5, 0.5, 0.0)).unwrap();
    assert!(close(hit.t, 0.5));
    assert!(close(hit.point.z, 1.0));
    assert_eq!(hit.face, Face::Front);

    let back = p.crossing(v(0.5, 0.5, 0.0), v(0.5, 0.5, 2.0)).unwrap();
    assert_eq!(back.face, Face::Back);

    assert!(p.crossing(v(3.0, 3.0, 2.0), v(3.0, 3.0, 0.0)).is_none());
    assert!(p.crossing(v(0.5, 0.5, 2.0), v(0.5, 0.5, 1.5)).is_none());
}

#[test]
fn triangle_front_follows_vertex_order() {
    let p = panel(PanelGeometry::Tri { points: [v(0.0, 0.0, 0.0), v(1.0, 0.0, 0.0), v(0.0, 1.0, 0.0)] });
    assert!(close(p.area(), 0.5));
    assert!(close(p.front().z, 1.0));
    let hit = p.crossing(v(0.2, 0.2, 1.0), v(0.2, 0.2, -1.0)).unwrap();
    assert_eq!(hit.face, Face::Front);
    assert!(close(hit.t, 0.5));
    assert!(p.crossing(v(0.8, 0.8, 1.0), v(0.8, 0.8, -1.0)).is_none());
}

#[test]
fn sphere_crossing_from_inside_hits_back() {
    let p = panel(PanelGeometry::Sph { center: Vec3::zero(), radius: 1.0, outward: true });
    assert!(close(p.area(), 4.0 * PI));
    let hit = p.crossing(Vec3::zero(), v(2.0, 0.0, 0.0)).unwrap();
    assert!(close(hit.t, 0.5));
    assert!(close(hit.point.x, 1.0));
    assert_eq!(hit.face, Face::Back);

    let inward = panel(PanelGeometry::Sph { center: Vec3::zero(), radius: 1.0, outward: false });
    let hit = inward.crossing(Vec3::zero(), v(2.0, 0.0, 0.0)).unwrap();
    assert_eq!(hit.face, Face::Front);
    assert!(close(inward.normal_at(v(1.0, 0.0, 0.0)).x, -1.0));
}

#[test]
fn cylinder_crossing_respects_length() {
    let p = panel(PanelGeometry::Cyl { start: Vec3::zero(), end: v(0.0, 0.0, 2.0), radius: 1.0, outward: true });
    assert!(close(p.area(), 2.0 * PI * 2.0));
    let hit = p.crossing(v(3.0, 0.0, 1.0), v(0.0, 0.0, 1.0)).unwrap();
    assert!((hit.t - 2.0 / 3.0).abs() < 1e-9);
    assert!(close(hit.point.x, 1.0));
    assert_eq!(hit.face, Face::Front);
    assert!(p.crossing(v(3.0, 0.0, 3.0), v(0.0, 0.0, 3.0)).is_none());
    // moving along the axis never crosses the wall
    assert!(p.crossing(v(0.0, 0.0, 0.5), v(0.0, 0.0, 1.5)).is_none());
}

#[test]
fn hemisphere_only_covers_its_dome() {
    let p = panel(PanelGeometry::Hemi { center: Vec3::zero(), radius: 1.0, axis: v(0.0, 0.0, 1.0), outward: true });
    assert!(close(p.area(), 2.0 * PI));
    let hit = p.crossing(Vec3::zero(), v(0.0, 0.0, 2.0)).unwrap();
    assert!(close(hit.point.z, 1.0));
    assert_eq!(hit.face, Face::Back);
    assert!(p.crossing(Vec3::zero(), v(0.0, 0.0, -2.0)).is_none());
}

#[test]
fn disk_crossing_respects_radius() {
    let p = panel(PanelGeometry::Disk { center: Vec3::zero(), radius: 1.0, normal: v(0.0, 0.0, 1.0) });
    assert!(close(p.area(), PI));
    let hit = p.crossing(v(0.5, 0.0, 1.0), v(0.5, 0.0, -1.0)).unwrap();
    assert_eq!(hit.face, Face::Front);
    assert!(p.crossing(v(1.5, 0.0, 1.0), v(1.5, 0.0, -1.0)).is_none());
}

#[test]
fn degenerate_geometry_is_rejected() {
    let parallel = PanelGeometry::Rect {
        corner: Vec3::zero(),
        edge1: v(1.0, 0.0, 0.0),
        edge2: v(2.0, 0.0, 0.0),
        front_sign: 1.0,
    };
    assert!(matches!(Panel::new("r", 0, parallel), Err(SimError::GeometryDegenerate { .. })));
    let collinear = PanelGeometry::Tri { points: [Vec3::zero(), v(1.0, 1.0, 1.0), v(2.0, 2.0, 2.0)] };
    assert!(matches!(Panel::new("t", 0, collinear), Err(SimError::GeometryDegenerate { .. })));
    let flat = PanelGeometry::Sph { center: Vec3::zero(), radius: 0.0, outward: true };
    assert!(matches!(Panel::new("s", 0, flat), Err(SimError::GeometryDegenerate { .. })));
}

#[test]
fn set_geometry_keeps_previous_points() {
    let mut p = panel(PanelGeometry::axis_rect(0, 1.0, Vec3::zero(), [1.0, 1.0]));
    let before = p.geometry().clone();
    p.translate(v(0.5, 0.0, 0.0)).unwrap();
    assert_eq!(p.old_geometry(), &before);
    assert!(close(p.front().x, 1.0));
    let hit = p.crossing(v(1.0, 0.5, 0.5), v(0.0, 0.5, 0.5)).unwrap();
    assert!(close(hit.point.x, 0.5));

    let moved = p.geometry().clone();
    let err = p.set_geometry(PanelGeometry::Sph { center: Vec3::zero(), radius: 1.0, outward: true });
    assert!(err.is_err());
    assert_eq!(p.geometry(), &moved);

    let bad = PanelGeometry::Rect { corner: Vec3::zero(), edge1: Vec3::zero(), edge2: v(0.0, 1.0, 0.0), front_sign: 1.0 };
    assert!(p.set_geometry(bad).is_err());
    assert_eq!(p.geometry(), &moved);
    assert!(close(p.area(), 1.0));
}

#[test]
fn random_points_lie_on_the_panel() {
    let shapes = [
        PanelGeometry::axis_rect(1, -1.0, v(1.0, 2.0, 3.0), [2.0, 0.5]),
        PanelGeometry::Tri { points: [v(0.0, 0.0, 1.0), v(2.0, 0.0, 1.0), v(0.0, 3.0, 2.0)] },
        PanelGeometry::Sph { center: v(1.0, 1.0, 1.0), radius: 2.0, outward: true },
        PanelGeometry::Cyl { start: Vec3::zero(), end: v(1.0, 1.0, 0.0), radius: 0.5, outward: false },
        PanelGeometry::Hemi { center: Vec3::zero(), radius: 1.5, axis: v(1.0, 0.0, 0.0), outward: true },
        PanelGeometry::Disk { center: v(0.0, 0.0, 5.0), radius: 2.0, normal: v(0.0, 1.0, 1.0) },
    ];
    let mut rng = ChaCha8Rng::seed_from_u64(11);
    for geom in shapes {
        let p = panel(geom);
        for _ in 0..200 {
            let x = p.random_point(&mut rng);
            let proj = p.project(x);
            assert!((proj - x).mag() < 1e-9, "{:?}: {:?} off surface", p.shape(), x);
            assert!(p.contains_projected(x), "{:?}: {:?} outside bounds", p.shape(), x);
        }
    }
}

#[test]
fn face_of_point_matches_normal() {
    let p = panel(PanelGeometry::Cyl { start: Vec3::zero(), end: v(0.0, 0.0, 1.0), radius: 1.0, outward: true });
    assert_eq!(p.face_of_point(v(2.0, 0.0, 0.5)), Face::Front);
    assert_eq!(p.face_of_point(v(0.5, 0.0, 0.5)), Face::Back);
    let r = panel(PanelGeometry::axis_rect(2, -1.0, Vec3::zero(), [1.0, 1.0]));
    assert_eq!(r.face_of_point(v(0.5, 0.5, -1.0)), Face::Front);
}

#[test]
fn surface_samples_panels_by_area() {
    let mut s = Surface::new("s", 2);
    s.add_panel(panel_named("small", PanelGeometry::axis_rect(2, 1.0, Vec3::zero(), [1.0, 1.0]))).unwrap();
    s.add_panel(panel_named("big", PanelGeometry::axis_rect(2, 1.0, v(5.0, 0.0, 0.0), [3.0, 1.0]))).unwrap();
    assert!(close(s.total_area(), 4.0));
    assert!(s.add_panel(panel_named("big", PanelGeometry::axis_rect(2, 1.0, Vec3::zero(), [1.0, 1.0]))).is_err());

    let mut rng = ChaCha8Rng::seed_from_u64(3);
    let n = 4000;
    let big = (0..n).filter(|_| s.random_point(&mut rng).unwrap().0 == 1).count();
    let frac = big as f64 / n as f64;
    assert!((frac - 0.75).abs() < 0.04, "fraction {frac}");
}

fn panel_named(name: &str, geom: PanelGeometry) -> Panel {
    Panel::new(name, 0, geom).unwrap()
}

#[test]
fn rates_become_probabilities() {
    assert_eq!(collision_probability(0.0, 1.0, 0.01), 0.0);
    assert_eq!(collision_probability(1.0, 0.0, 0.01), 1.0);
    let p = collision_probability(0.5, 2.0, 0.01);
    assert!(close(p, 0.5 * (PI * 0.01 / 2.0).sqrt()));
    assert_eq!(collision_probability(1e6, 1.0, 1.0), 1.0);

    let mut s = Surface::new("s", 2);
    s.set_rate(1, RateSource::Solution(Face::Front), MolecState::Front, 0.5, None).unwrap();
    assert_eq!(s.action(1, MolecState::Soln, Face::Front), SurfaceAction::Multiple);
    assert_eq!(s.action(1, MolecState::Soln, Face::Back), SurfaceAction::Reflect);
    s.set_rate(1, RateSource::Bound(MolecState::Front), MolecState::Soln, 10.0, None).unwrap();
    assert!(s.set_rate(1, RateSource::Bound(MolecState::Soln), MolecState::Front, 1.0, None).is_err());
    assert!(s.set_rate(1, RateSource::Bound(MolecState::Front), MolecState::Soln, -1.0, None).is_err());

    assert_eq!(s.compute_probabilities(0.01, |_| 2.0), 0);
    let coll = s.collision_details(1, Face::Front).unwrap();
    assert!(close(coll.prob[MolecState::Front.index()], p));
    let bound = s.bound_details(1, MolecState::Front).unwrap();
    assert!(close(bound.prob[MolecState::Soln.index()], 1.0 - (-0.1f64).exp()));
    assert_eq!(bound.choose(0.0), Some(MolecState::Soln));
    assert_eq!(bound.choose(0.5), None);
}

#[test]
fn action_parsing() {
    assert_eq!(SurfaceAction::parse("Reflect").unwrap(), SurfaceAction::Reflect);
    assert_eq!(SurfaceAction::parse("adsorb:up").unwrap(), SurfaceAction::Adsorb(MolecState::Up));
    assert!(SurfaceAction::parse("adsorb:soln").is_err());
    assert!(SurfaceAction::parse("bounce").is_err());
    assert_eq!(Face::parse_many("both").unwrap().len(), 2);
}
