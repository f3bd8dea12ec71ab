// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! The bullet simulation: loading a [`crate::doc::Document`] produces no
//! bullets by itself. A host builds one with [`Bullet::new`], calls
//! [`Bullet::step`] once per frame, and does whatever it likes with the
//! newly-fired bullets each step returns.

mod action;
mod bullet;
mod collide;

pub use self::bullet::{Bullet, Target};
pub use self::collide::{collides, overlaps, Circle};
