// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! End-to-end interpreter scenarios, one bullet and one document at a time.

use std::rc::Rc;

use bulletml::doc::Document;
use bulletml::runtime::{Bullet, Target};

struct Point {
    x: f32,
    y: f32,
}

impl Target for Point {
    fn x(&self) -> f32 {
        self.x
    }

    fn y(&self) -> f32 {
        self.y
    }
}

fn bullet_at(xml: &str, x: f32, y: f32, target: Option<Rc<dyn Target>>) -> Bullet {
    let doc = Document::from_xml(xml).unwrap();
    Bullet::new(&doc, x, y, 0., 0., target, &[], 0.5, rand::thread_rng())
}

#[test]
fn s1_constant_aim() {
    let xml = r#"<bulletml><action label="top1">
        <fire><direction type="aim">0</direction><speed>1</speed><bullet/></fire>
    </action></bulletml>"#;
    let target: Rc<dyn Target> = Rc::new(Point { x: 3., y: 4. });
    let mut owner = bullet_at(xml, 0., 0., Some(target));

    let spawned = owner.step().unwrap();
    assert_eq!(spawned.len(), 1);

    let expected = 3_f32.atan2(4.);
    assert!((spawned[0].direction() - expected).abs() < 1e-5);
    assert!((spawned[0].speed() - 1.).abs() < 1e-5);
}

#[test]
fn s2_sequence_fan() {
    let xml = r#"<bulletml><action label="top1">
        <repeat><times>4</times><action>
            <fire><direction type="sequence">10</direction><speed>1</speed><bullet/></fire>
            <wait>1</wait>
        </action></repeat>
    </action></bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    // `wait(1)` costs two real frames (one to arm the counter, one to
    // drain it), so fires land every third step, not every step.
    let mut directions = Vec::new();
    for _ in 0..20 {
        if directions.len() == 4 {
            break;
        }
        let spawned = owner.step().unwrap();
        for bullet in &spawned {
            directions.push(bullet.direction().to_degrees());
        }
    }
    assert_eq!(directions.len(), 4);

    for i in 0..4 {
        let expected = 10. * (i as f32 + 1.);
        assert!(
            (directions[i] - expected).abs() < 1e-3,
            "direction[{i}] = {}, expected {expected}",
            directions[i]
        );
    }
}

#[test]
fn s3_accel_ramp() {
    // Direction and speed stay 0 throughout, so per-step X displacement is
    // driven entirely by `mx`; once the ramp finishes, each step's
    // displacement should hold steady at the configured horizontal accel.
    let xml = r#"<bulletml><action label="top1">
        <accel><horizontal type="absolute">4</horizontal><vertical>0</vertical><term>4</term></accel>
        <wait>10</wait>
    </action></bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    // Step 1 configures the ramp; each interpolation delta is applied at
    // the *start* of the following step, so the 4 deltas land over steps
    // 2-5.
    for _ in 0..5 {
        owner.step().unwrap();
    }
    let settled_x = owner.x();

    owner.step().unwrap();
    let delta = owner.x() - settled_x;
    assert!((delta - 4.0).abs() < 1e-4, "delta = {delta}");

    let before = owner.x();
    owner.step().unwrap();
    let delta_again = owner.x() - before;
    assert!((delta_again - 4.0).abs() < 1e-4);
}

#[test]
fn s3b_orientation_does_not_affect_accel_axes() {
    // Orientation is informational only: a `horizontal`-oriented document's
    // `accel` still maps `horizontal` to `mx` and `vertical` to `my`, same
    // as any other document. A `term` of 0 applies the delta immediately.
    let xml = r#"<bulletml type="horizontal"><action label="top1">
        <accel><horizontal type="absolute">3</horizontal><vertical type="absolute">0</vertical><term>0</term></accel>
        <wait>10</wait>
    </action></bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    let (x0, y0) = (owner.x(), owner.y());
    owner.step().unwrap();
    assert!((owner.x() - x0 - 3.).abs() < 1e-4);
    assert!((owner.y() - y0).abs() < 1e-4);
}

#[test]
fn s4_vanish_propagation() {
    let xml = r#"<bulletml><action label="top1">
        <action><action><vanish/></action></action>
    </action></bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    owner.step().unwrap();
    assert!(owner.is_vanished());
    assert!(owner.is_finished());
}

#[test]
fn s4b_vanish_freezes_not_yet_processed_sibling_top_actions() {
    // `top1` vanishes the owner before `top2` gets its turn in the same
    // tick. `top2` must not run its `fire` once `top1` has vanished the
    // owner, even though `top2` was still waiting in line.
    let xml = r#"<bulletml>
        <action label="top1"><vanish/></action>
        <action label="top2"><fire><bullet/></fire></action>
    </bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    let spawned = owner.step().unwrap();
    assert!(spawned.is_empty());
    assert!(owner.is_vanished());
}

#[test]
fn s5_parameterized_ref() {
    let xml = r#"<bulletml>
        <action label="top1"><actionRef label="sub"><param>30</param></actionRef></action>
        <action label="sub"><fire><direction type="absolute">$1</direction><speed>1</speed><bullet/></fire></action>
    </bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    let spawned = owner.step().unwrap();
    assert_eq!(spawned.len(), 1);
    assert!((spawned[0].direction() - 30_f32.to_radians()).abs() < 1e-5);
}

#[test]
fn s6_immediate_change() {
    let xml = r#"<bulletml><action label="top1">
        <changeDirection><direction type="absolute">0</direction><term>0</term></changeDirection>
    </action></bulletml>"#;
    let doc = Document::from_xml(xml).unwrap();
    let mut owner = Bullet::new(
        &doc,
        0.,
        0.,
        std::f32::consts::PI,
        0.,
        None,
        &[],
        0.5,
        rand::thread_rng(),
    );

    owner.step().unwrap();
    assert!(owner.direction().abs() < 1e-5);
}

#[test]
fn invariant_step_records_previous_position() {
    let xml = r#"<bulletml><action label="top1"><wait>100</wait></action></bulletml>"#;
    let mut owner = Bullet::new(
        &Document::from_xml(xml).unwrap(),
        5.,
        7.,
        0.,
        2.,
        None,
        &[],
        0.5,
        rand::thread_rng(),
    );

    let (px_before, py_before) = (owner.x(), owner.y());
    owner.step().unwrap();
    // px/py are exposed through the Circle trait as prev_x/prev_y.
    use bulletml::runtime::Circle;
    assert_eq!(Circle::prev_x(&owner), px_before);
    assert_eq!(Circle::prev_y(&owner), py_before);
}

#[test]
fn invariant_vanished_bullet_spawns_nothing_more() {
    let xml = r#"<bulletml><action label="top1">
        <vanish/>
        <fire><bullet/></fire>
    </action></bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    let spawned = owner.step().unwrap();
    assert!(spawned.is_empty());
    assert!(owner.is_vanished());

    let spawned_again = owner.step().unwrap();
    assert!(spawned_again.is_empty());
}

#[test]
fn invariant_repeat_count_matches_fire_count() {
    let xml = r#"<bulletml><action label="top1">
        <repeat><times>6</times><action><fire><bullet/></fire><wait>1</wait></action></repeat>
    </action></bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    // Each `fire, wait(1)` cycle costs 3 real steps (fire, arm, drain).
    let mut total = 0;
    for _ in 0..20 {
        total += owner.step().unwrap().len();
    }
    assert_eq!(total, 6);
}

#[test]
fn invariant_top_actions_filtered_and_ordered() {
    let xml = r#"<bulletml>
        <action label="top2"><vanish/></action>
        <action label="nottop"><vanish/></action>
        <action label="top1"><vanish/></action>
    </bulletml>"#;
    let doc = Document::from_xml(xml).unwrap();
    assert_eq!(doc.top_actions.len(), 2);
}

#[test]
fn invariant_offset_relative_places_along_direction() {
    let xml = r#"<bulletml><action label="top1">
        <fire><direction type="absolute">0</direction><speed>1</speed>
        <offset type="relative"><x>7</x><y>0</y></offset><bullet/></fire>
    </action></bulletml>"#;
    let mut owner = bullet_at(xml, 0., 0., None);

    let spawned = owner.step().unwrap();
    assert_eq!(spawned.len(), 1);
    assert!((spawned[0].x() - 7.).abs() < 1e-4);
    assert!((spawned[0].y() - 0.).abs() < 1e-4);
}

#[test]
fn collision_overlaps_boundary_inclusive() {
    use bulletml::runtime::{overlaps, Circle};

    struct P(f32, f32);
    impl Circle for P {
        fn x(&self) -> f32 {
            self.0
        }

        fn y(&self) -> f32 {
            self.1
        }

        fn radius(&self) -> f32 {
            1.
        }
    }

    assert!(overlaps(&P(0., 0.), &P(2., 0.)));
    assert!(!overlaps(&P(0., 0.), &P(2.001, 0.)));
}

#[test]
fn collision_crossing_diagonals_collide() {
    use bulletml::runtime::{collides, Circle};

    struct Moving {
        x: f32,
        y: f32,
        px: f32,
        py: f32,
    }
    impl Circle for Moving {
        fn x(&self) -> f32 {
            self.x
        }

        fn y(&self) -> f32 {
            self.y
        }

        fn radius(&self) -> f32 {
            1.
        }

        fn prev_x(&self) -> f32 {
            self.px
        }

        fn prev_y(&self) -> f32 {
            self.py
        }
    }

    let a = Moving {
        x: 0.,
        y: 0.,
        px: 100.,
        py: 100.,
    };
    let b = Moving {
        x: 0.,
        y: 100.,
        px: 100.,
        py: 0.,
    };
    assert!(collides(&a, &b));
}
