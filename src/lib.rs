// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! BulletML
//!
//! A BulletML parser and interpreter.
//!
//! BulletML ("Bullet Markup Language") describes the bullet patterns of
//! 2D shoot-'em-up games. This crate loads a BulletML document, lets a
//! host spawn one or more bullets from it, and advances the simulation
//! a frame at a time. Rendering, input, and collision response are left
//! to the host; this crate only produces positions, velocities, and a
//! handful of renderer-agnostic labels (tags, appearance).
//!
//! ```no_run
//! use bulletml::doc::Document;
//! use bulletml::runtime::Bullet;
//!
//! let source = r#"<bulletml><action label="top1"><fire><bullet/></fire></action></bulletml>"#;
//! let document = Document::from_xml(source).unwrap();
//! let mut bullet = Bullet::new(&document, 0., 0., 0., 0., None, &[], 0.5, rand::thread_rng());
//! let _spawned = bullet.step().unwrap();
//! ```

#![warn(missing_docs)]

pub mod doc;
pub mod expr;
pub mod runtime;
