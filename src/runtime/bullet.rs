// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use std::cell::RefCell;
use std::rc::Rc;

use rand::{Rng, RngCore};

use crate::doc::Document;
use crate::expr::{ExprError, ExpressionContext, Value};
use crate::runtime::action::{step_frame, RunningAction};
use crate::runtime::collide::Circle;

/// Something a bullet can aim at.
///
/// Implemented by whatever a host's player/boss entity is; `bulletml`
/// only ever reads the two coordinates.
pub trait Target {
    /// The target's X position.
    fn x(&self) -> Value;
    /// The target's Y position.
    fn y(&self) -> Value;
}

/// A single bullet: a position, a heading, and a set of concurrently
/// running actions driving it.
///
/// Built by [`Bullet::new`] from a [`Document`]'s top-level actions, or
/// returned by a parent bullet's [`Bullet::step`] when a `fire` spawns a
/// child. Advancing the simulation is entirely up to the caller: call
/// `step` once per frame and do whatever the host likes with the
/// returned newly-fired bullets.
pub struct Bullet {
    pub(crate) x: Value,
    pub(crate) y: Value,
    pub(crate) px: Value,
    pub(crate) py: Value,
    pub(crate) mx: Value,
    pub(crate) my: Value,
    pub(crate) direction: Value,
    pub(crate) speed: Value,
    pub(crate) rank: Value,
    pub(crate) radius: Value,
    pub(crate) target: Option<Rc<dyn Target>>,
    pub(crate) params: Vec<Value>,
    pub(crate) tags: Vec<String>,
    pub(crate) appearance: Option<String>,
    pub(crate) vanished: bool,
    pub(crate) finished: bool,
    pub(crate) actions: Vec<RunningAction>,
    rng: Rc<RefCell<dyn RngCore>>,
}

impl Bullet {
    /// Build a bullet running every one of `doc`'s top-level actions,
    /// starting at `(x, y)` heading `direction` (radians, clockwise from
    /// straight down) at `speed`.
    ///
    /// `rng` supplies the `$rand` draw for every expression this bullet
    /// (and anything it fires) evaluates; inject a seeded generator for
    /// reproducible runs.
    pub fn new<R>(
        doc: &Document,
        x: Value,
        y: Value,
        direction: Value,
        speed: Value,
        target: Option<Rc<dyn Target>>,
        params: &[Value],
        rank: Value,
        rng: R,
    ) -> Self
    where
        R: RngCore + 'static,
    {
        let rng: Rc<RefCell<dyn RngCore>> = Rc::new(RefCell::new(rng));
        let actions = doc
            .top_actions
            .iter()
            .map(|action| RunningAction::new(Rc::clone(action), params.to_vec()))
            .collect();
        Bullet::with_shared_rng(x, y, direction, speed, target, params, rank, rng, actions)
    }

    /// Build a bullet spawned by a `fire`, sharing `owner`'s random
    /// generator rather than drawing a fresh one.
    ///
    /// Mirrors the original interpreter's single process-wide random
    /// source: every bullet in a tree draws from the same stream, so
    /// reseeding the top-level bullet's generator reproduces the whole
    /// tree's behavior. `actions` are the running actions `BulletDef`
    /// already built for it; unlike a root bullet, a fired bullet's
    /// frames never come from the document's top actions.
    pub(crate) fn spawn(
        owner: &Bullet,
        x: Value,
        y: Value,
        direction: Value,
        speed: Value,
        params: &[Value],
        actions: Vec<RunningAction>,
    ) -> Self {
        Bullet::with_shared_rng(
            x,
            y,
            direction,
            speed,
            owner.target.clone(),
            params,
            owner.rank,
            Rc::clone(&owner.rng),
            actions,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn with_shared_rng(
        x: Value,
        y: Value,
        direction: Value,
        speed: Value,
        target: Option<Rc<dyn Target>>,
        params: &[Value],
        rank: Value,
        rng: Rc<RefCell<dyn RngCore>>,
        actions: Vec<RunningAction>,
    ) -> Self {
        Bullet {
            x,
            y,
            px: x,
            py: y,
            mx: 0.,
            my: 0.,
            direction,
            speed,
            rank,
            radius: 0.5,
            target,
            params: params.to_vec(),
            tags: Vec::new(),
            appearance: None,
            vanished: false,
            finished: false,
            actions,
            rng,
        }
    }

    /// The running direction (radians) that points at [`Bullet::target`],
    /// or `0` if this bullet has none.
    pub fn aim(&self) -> Value {
        match &self.target {
            Some(target) => (target.x() - self.x).atan2(target.y() - self.y),
            None => 0.,
        }
    }

    /// Current X position.
    pub fn x(&self) -> Value {
        self.x
    }

    /// Current Y position.
    pub fn y(&self) -> Value {
        self.y
    }

    /// Current heading, in radians clockwise from straight down.
    pub fn direction(&self) -> Value {
        self.direction
    }

    /// Current speed, in distance units per frame.
    pub fn speed(&self) -> Value {
        self.speed
    }

    /// Whether this bullet has tag `name`.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.iter().any(|t| t == name)
    }

    /// This bullet's current appearance label, if any was set.
    pub fn appearance(&self) -> Option<&str> {
        self.appearance.as_deref()
    }

    /// Whether `vanish` has run for this bullet.
    ///
    /// A vanished bullet should stop being drawn immediately, even
    /// though it may not be [`Bullet::is_finished`] until the tick
    /// completes.
    pub fn is_vanished(&self) -> bool {
        self.vanished
    }

    /// Whether this bullet is done: vanished, with every one of its
    /// actions having run to completion.
    ///
    /// A host should drop a bullet once this is true. Note that a
    /// bullet whose actions all finish without ever calling `vanish`
    /// (e.g. a bullet with no `action` at all) never reports finished;
    /// fire-and-forget bullets are expected to outlive their scripts.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Mark this bullet vanished: every currently running action (and
    /// its whole parent chain) stops dead, and `actions` is emptied.
    pub fn vanish(&mut self) {
        self.vanished = true;
        for action in &mut self.actions {
            action.vanish();
        }
        self.actions.clear();
    }

    /// Advance this bullet by one frame.
    ///
    /// Runs every action slot once, applies any pending speed/direction
    /// interpolation, integrates position, and returns any bullets newly
    /// spawned by `fire`. A bullet's own position update always happens,
    /// even on a frame where it vanishes.
    pub fn step(&mut self) -> Result<Vec<Bullet>, ExprError> {
        let mut created = Vec::new();
        let frames = std::mem::take(&mut self.actions);
        let mut stepped = Vec::with_capacity(frames.len());
        for mut frame in frames {
            // A `vanish` earlier in this same loop already killed `self`;
            // kill every not-yet-processed sibling too before stepping it,
            // so it still applies this frame's pending interpolation but
            // runs no further opcodes (`step_frame` bails out on a dead
            // frame before reaching its next one) — matching `vanish`'s
            // own sweep over every then-active frame.
            if self.vanished {
                frame.vanish();
            }
            stepped.push(step_frame(frame, self, &mut created)?);
        }
        if !self.vanished {
            self.actions = stepped;
        }

        self.finished = self.vanished && self.actions.iter().all(|a| a.finished);

        self.px = self.x;
        self.py = self.y;
        self.x += self.mx + self.direction.sin() * self.speed;
        self.y += -self.my + self.direction.cos() * self.speed;

        Ok(created)
    }
}

impl ExpressionContext for Bullet {
    fn get_param(&self, idx: usize) -> Option<Value> {
        self.params.get(idx).copied()
    }

    fn rand(&self) -> Value {
        self.rng.borrow_mut().gen_range(0.0..1.0)
    }

    fn rank(&self) -> Value {
        self.rank
    }
}

impl Circle for Bullet {
    fn x(&self) -> Value {
        self.x
    }

    fn y(&self) -> Value {
        self.y
    }

    fn radius(&self) -> Value {
        self.radius
    }

    fn prev_x(&self) -> Value {
        self.px
    }

    fn prev_y(&self) -> Value {
        self.py
    }
}
