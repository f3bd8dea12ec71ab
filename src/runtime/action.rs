// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! The running-action interpreter: [`RunningAction`] and its per-frame
//! [`step_frame`].

use std::rc::Rc;

use crate::doc::{
    Accel, ActionDef, BulletDef, ChangeDirection, ChangeSpeed, DirectionKind, FireInvocation, If,
    Node, OffsetKind, Repeat, SpeedKind,
};
use crate::expr::{ExprError, ExpressionContext, Value};
use crate::runtime::bullet::Bullet;

/// A live instance of an [`ActionDef`], one per concurrently-running
/// branch of a bullet's action tree.
///
/// `direction`, `speed`, `mx`, `my` hold per-frame interpolation deltas
/// (not absolute values) while their matching `*_frames` counters are
/// positive; [`step_frame`] applies them to the owning bullet before
/// doing anything else.
pub(crate) struct RunningAction {
    action: Rc<ActionDef>,
    parent: Option<Box<RunningAction>>,
    repeat_remaining: i32,
    /// `None` is the dead sentinel; otherwise the index of the last
    /// opcode run (starts at `-1`, pre-incremented before each opcode).
    pc: Option<i32>,
    wait_frames: i32,
    speed: Value,
    speed_frames: i32,
    direction: Value,
    direction_frames: i32,
    /// Latched by an `aim`-mode `changeDirection`: on the final frame of
    /// the interpolation, snap to a freshly recomputed `owner.aim()`
    /// rather than applying the (now stale) stored delta.
    aiming: bool,
    mx: Value,
    my: Value,
    accel_frames: i32,
    params: Vec<Value>,
    previous_fire_direction: Value,
    previous_fire_speed: Value,
    pub(crate) finished: bool,
}

impl RunningAction {
    pub(crate) fn new(action: Rc<ActionDef>, params: Vec<Value>) -> Self {
        RunningAction {
            action,
            parent: None,
            repeat_remaining: 1,
            pc: Some(-1),
            wait_frames: 0,
            speed: 0.,
            speed_frames: 0,
            direction: 0.,
            direction_frames: 0,
            aiming: false,
            mx: 0.,
            my: 0.,
            accel_frames: 0,
            params,
            previous_fire_direction: 0.,
            previous_fire_speed: 0.,
            finished: false,
        }
    }

    /// Push a child frame on top of `parent`: the child inherits
    /// `parent`'s in-progress motion state and becomes its replacement
    /// in the owner's active list until it finishes.
    fn child(parent: RunningAction, action: Rc<ActionDef>, params: Vec<Value>, repeat: i32) -> Self {
        let mut child = RunningAction::new(action, params);
        child.repeat_remaining = repeat;
        child.copy_state(&parent);
        child.parent = Some(Box::new(parent));
        child
    }

    /// Copy in-progress motion and fire-history state from `other` onto
    /// `self`. Used both when pushing a child (it starts where its
    /// parent left off) and when a finished child hands its accumulated
    /// state back up to its parent.
    fn copy_state(&mut self, other: &RunningAction) {
        self.direction_frames = other.direction_frames;
        self.direction = other.direction;
        self.aiming = other.aiming;
        self.speed_frames = other.speed_frames;
        self.speed = other.speed;
        self.accel_frames = other.accel_frames;
        self.mx = other.mx;
        self.my = other.my;
        self.previous_fire_direction = other.previous_fire_direction;
        self.previous_fire_speed = other.previous_fire_speed;
    }

    /// Kill this frame and its whole parent chain.
    pub(crate) fn vanish(&mut self) {
        if let Some(parent) = &mut self.parent {
            parent.vanish();
        }
        self.pc = None;
        self.finished = true;
    }
}

/// An expression-evaluation context over a fixed parameter vector and
/// rank, with `$rand` delegated to the owning bullet's shared generator.
struct ParamCtx<'a> {
    params: &'a [Value],
    rank: Value,
    owner: &'a Bullet,
}

impl ExpressionContext for ParamCtx<'_> {
    fn get_param(&self, idx: usize) -> Option<Value> {
        self.params.get(idx).copied()
    }

    fn rand(&self) -> Value {
        self.owner.rand()
    }

    fn rank(&self) -> Value {
        self.rank
    }
}

/// Resolve an invocation's parameter vector against the caller's
/// current `params`: an inline definition passes them straight through,
/// while a `*Ref` evaluates its own `<param>` expressions against them
/// to build a brand-new vector (even when it supplies none at all).
fn resolve_params<T>(
    inv: &crate::doc::Invocation<T>,
    params: &[Value],
    rank: Value,
    owner: &Bullet,
) -> Result<Vec<Value>, ExprError> {
    if inv.is_reference {
        let ctx = ParamCtx {
            params,
            rank,
            owner,
        };
        inv.params.iter().map(|e| e.eval(&ctx)).collect()
    } else {
        Ok(params.to_vec())
    }
}

/// Normalize an angle into `[-π, π)`.
fn normalize_angle(a: Value) -> Value {
    use std::f32::consts::PI;

    let two_pi = 2. * PI;
    let wrapped = (a + PI).rem_euclid(two_pi);
    wrapped - PI
}

/// Resolve a `speed`/`accel`-shaped interpolation: mutates `*owner`
/// immediately for an absolute/relative value with `frames <= 0`,
/// otherwise returns the per-frame delta to store on the running frame.
/// The returned value is meaningless (and never read) when `frames <= 0`,
/// since the matching `*_frames` counter is left non-positive too.
fn speed_delta(kind: SpeedKind, value: Value, frames: i32, owner: &mut Value) -> Value {
    match kind {
        SpeedKind::Sequence => value,
        SpeedKind::Relative if frames <= 0 => {
            *owner += value;
            value
        },
        SpeedKind::Relative => value / frames as Value,
        SpeedKind::Absolute if frames <= 0 => {
            *owner = value;
            value
        },
        SpeedKind::Absolute => (value - *owner) / frames as Value,
    }
}

fn exec_change_direction(
    cd: &ChangeDirection,
    owner: &mut Bullet,
    frame: &mut RunningAction,
) -> Result<(), ExprError> {
    let (value, frames) = {
        let ctx = ParamCtx {
            params: &frame.params,
            rank: owner.rank(),
            owner: &*owner,
        };
        (
            cd.direction.value.eval(&ctx)?.to_radians(),
            cd.term.eval_int(&ctx)?,
        )
    };
    frame.direction_frames = frames;
    frame.aiming = false;

    let delta = match cd.direction.kind {
        DirectionKind::Sequence => {
            frame.direction = value;
            None
        },
        DirectionKind::Absolute => Some(value - owner.direction),
        DirectionKind::Relative => Some(value),
        DirectionKind::Aim => {
            frame.aiming = true;
            Some(value + owner.aim() - owner.direction)
        },
    };
    if let Some(d) = delta {
        let d = normalize_angle(d);
        if frames <= 0 {
            owner.direction += d;
        } else {
            frame.direction = d / frames as Value;
        }
    }
    Ok(())
}

fn exec_change_speed(
    cs: &ChangeSpeed,
    owner: &mut Bullet,
    frame: &mut RunningAction,
) -> Result<(), ExprError> {
    let (value, frames) = {
        let ctx = ParamCtx {
            params: &frame.params,
            rank: owner.rank(),
            owner: &*owner,
        };
        (cs.speed.value.eval(&ctx)?, cs.term.eval_int(&ctx)?)
    };
    frame.speed_frames = frames;
    frame.speed = speed_delta(cs.speed.kind, value, frames, &mut owner.speed);
    Ok(())
}

fn exec_accel(a: &Accel, owner: &mut Bullet, frame: &mut RunningAction) -> Result<(), ExprError> {
    let frames = {
        let ctx = ParamCtx {
            params: &frame.params,
            rank: owner.rank(),
            owner: &*owner,
        };
        a.term.eval_int(&ctx)?
    };
    frame.accel_frames = frames;
    if let Some(h) = &a.horizontal {
        let value = {
            let ctx = ParamCtx {
                params: &frame.params,
                rank: owner.rank(),
                owner: &*owner,
            };
            h.value.eval(&ctx)?
        };
        frame.mx = speed_delta(h.kind, value, frames, &mut owner.mx);
    }
    if let Some(v) = &a.vertical {
        let value = {
            let ctx = ParamCtx {
                params: &frame.params,
                rank: owner.rank(),
                owner: &*owner,
            };
            v.value.eval(&ctx)?
        };
        frame.my = speed_delta(v.kind, value, frames, &mut owner.my);
    }
    Ok(())
}

/// What a fired bullet's definition contributes before `fire`'s own
/// overrides (if any) are layered on top.
struct BulletSpec {
    direction: Option<(Value, DirectionKind)>,
    speed: Option<(Value, SpeedKind)>,
    tags: Vec<String>,
    appearance: Option<String>,
    actions: Vec<RunningAction>,
}

fn eval_bullet_def(
    def: &BulletDef,
    params: &[Value],
    rank: Value,
    owner: &Bullet,
) -> Result<BulletSpec, ExprError> {
    let (direction, speed) = {
        let ctx = ParamCtx {
            params,
            rank,
            owner,
        };
        let direction = def
            .direction
            .as_ref()
            .map(|d| Ok::<_, ExprError>((d.value.eval(&ctx)?.to_radians(), d.kind)))
            .transpose()?;
        let speed = def
            .speed
            .as_ref()
            .map(|s| Ok::<_, ExprError>((s.value.eval(&ctx)?, s.kind)))
            .transpose()?;
        (direction, speed)
    };

    // A spawned bullet's running actions start fresh (no parent): a
    // `vanish` from inside them must never walk up into the firing
    // bullet's own frame.
    let mut actions = Vec::with_capacity(def.actions.len());
    for inv in &def.actions {
        let child_params = resolve_params(inv, params, rank, owner)?;
        actions.push(RunningAction::new(inv.target(), child_params));
    }

    Ok(BulletSpec {
        direction,
        speed,
        tags: def.tags.clone(),
        appearance: def.appearance.clone(),
        actions,
    })
}

fn exec_fire(
    inv: &FireInvocation,
    owner: &Bullet,
    frame: &mut RunningAction,
    created: &mut Vec<Bullet>,
) -> Result<(), ExprError> {
    let rank = owner.rank();
    let fire_params = resolve_params(inv, &frame.params, rank, owner)?;
    let fire_def = inv.target();

    let bullet_params = resolve_params(&fire_def.bullet, &fire_params, rank, owner)?;
    let bullet_def = fire_def.bullet.target();
    let bullet_spec = eval_bullet_def(&bullet_def, &bullet_params, rank, owner)?;

    let fire_ctx = ParamCtx {
        params: &fire_params,
        rank,
        owner,
    };
    let fire_direction = fire_def
        .direction
        .as_ref()
        .map(|d| Ok::<_, ExprError>((d.value.eval(&fire_ctx)?.to_radians(), d.kind)))
        .transpose()?;
    let fire_speed = fire_def
        .speed
        .as_ref()
        .map(|s| Ok::<_, ExprError>((s.value.eval(&fire_ctx)?, s.kind)))
        .transpose()?;

    let direction = match fire_direction.or(bullet_spec.direction) {
        None => owner.aim(),
        Some((dval, DirectionKind::Aim)) => dval + owner.aim(),
        Some((dval, DirectionKind::Sequence)) => dval + frame.previous_fire_direction,
        Some((dval, DirectionKind::Relative)) => dval + owner.direction(),
        Some((dval, DirectionKind::Absolute)) => dval,
    };
    frame.previous_fire_direction = direction;

    let speed = match fire_speed.or(bullet_spec.speed) {
        None => 1.,
        Some((sval, SpeedKind::Sequence)) => sval + frame.previous_fire_speed,
        // Deliberate: uses the owner's *current* speed, not the running
        // action's previous-fire speed, for relative-mode fire speed.
        Some((sval, SpeedKind::Relative)) => sval + owner.speed(),
        Some((sval, SpeedKind::Absolute)) => sval,
    };
    frame.previous_fire_speed = speed;

    let (ox, oy, okind) = match &fire_def.offset {
        Some(off) => {
            let x = off.x.as_ref().map(|e| e.eval(&fire_ctx)).transpose()?.unwrap_or(0.);
            let y = off.y.as_ref().map(|e| e.eval(&fire_ctx)).transpose()?.unwrap_or(0.);
            (x, y, off.kind)
        },
        None => (0., 0., OffsetKind::Absolute),
    };
    let (fx, fy) = match okind {
        OffsetKind::Relative => {
            (
                owner.x() + direction.cos() * ox + direction.sin() * oy,
                owner.y() + direction.sin() * ox - direction.cos() * oy,
            )
        },
        OffsetKind::Absolute => (owner.x() + ox, owner.y() + oy),
    };

    let appearance = fire_def
        .appearance
        .clone()
        .or_else(|| bullet_spec.appearance.clone())
        .or_else(|| owner.appearance().map(str::to_owned));

    let mut tags = bullet_spec.tags;
    tags.extend(fire_def.tags.iter().cloned());

    let mut bullet = Bullet::spawn(owner, fx, fy, direction, speed, &bullet_params, bullet_spec.actions);
    bullet.tags = tags;
    bullet.appearance = appearance;
    created.push(bullet);

    Ok(())
}

/// Advance one [`RunningAction`] by a single frame, returning the frame
/// that now occupies its slot in the owner's active list (itself,
/// unless a child was pushed or the frame just finished and handed
/// control back to its parent).
pub(crate) fn step_frame(
    mut frame: RunningAction,
    owner: &mut Bullet,
    created: &mut Vec<Bullet>,
) -> Result<RunningAction, ExprError> {
    if frame.speed_frames > 0 {
        frame.speed_frames -= 1;
        owner.speed += frame.speed;
    }
    if frame.direction_frames > 0 {
        frame.direction_frames -= 1;
        if frame.aiming && frame.direction_frames == 0 {
            owner.direction += owner.aim();
        } else {
            owner.direction += frame.direction;
        }
    }
    if frame.accel_frames > 0 {
        frame.accel_frames -= 1;
        owner.mx += frame.mx;
        owner.my += frame.my;
    }

    if frame.pc.is_none() {
        return Ok(frame);
    }
    if frame.wait_frames > 0 {
        frame.wait_frames -= 1;
        return Ok(frame);
    }

    loop {
        let candidate = frame.pc.expect("checked dead sentinel above") + 1;
        let idx = if candidate as usize >= frame.action.nodes.len() {
            frame.repeat_remaining -= 1;
            if frame.repeat_remaining <= 0 {
                frame.pc = None;
                frame.finished = true;
                return match frame.parent.take() {
                    Some(parent) => {
                        let mut parent = *parent;
                        parent.copy_state(&frame);
                        Ok(parent)
                    },
                    None => Ok(frame),
                };
            }
            0
        } else {
            candidate
        };
        frame.pc = Some(idx);

        let action = Rc::clone(&frame.action);
        match &action.nodes[idx as usize] {
            Node::ChangeDirection(cd) => exec_change_direction(cd, owner, &mut frame)?,
            Node::ChangeSpeed(cs) => exec_change_speed(cs, owner, &mut frame)?,
            Node::Accel(a) => exec_accel(a, owner, &mut frame)?,
            Node::Tag(name) => owner.tags.push(name.clone()),
            Node::Untag(name) => owner.tags.retain(|t| t != name),
            Node::Appearance(name) => owner.appearance = Some(name.clone()),
            Node::Wait(expr) => {
                let w = {
                    let ctx = ParamCtx {
                        params: &frame.params,
                        rank: owner.rank(),
                        owner: &*owner,
                    };
                    expr.eval_int(&ctx)?
                };
                frame.wait_frames = w;
                return Ok(frame);
            },
            Node::Vanish => {
                owner.vanish();
                frame.vanish();
                return Ok(frame);
            },
            Node::Fire(inv) => {
                exec_fire(inv, &*owner, &mut frame, created)?;
                return Ok(frame);
            },
            Node::Repeat(r) => return exec_repeat(r, owner, frame, created),
            Node::If(i) => {
                match exec_if(i, owner, frame, created)? {
                    Ok2::Continue(f) => frame = f,
                    Ok2::Done(f) => return Ok(f),
                }
            },
            Node::Action(inv) => {
                let params = resolve_params(inv, &frame.params, owner.rank(), owner)?;
                let def = inv.target();
                let child = RunningAction::child(frame, def, params, 1);
                return step_frame(child, owner, created);
            },
        }
    }
}

fn exec_repeat(
    r: &Repeat,
    owner: &mut Bullet,
    frame: RunningAction,
    created: &mut Vec<Bullet>,
) -> Result<RunningAction, ExprError> {
    let times = {
        let ctx = ParamCtx {
            params: &frame.params,
            rank: owner.rank(),
            owner: &*owner,
        };
        r.times.eval_int(&ctx)?
    };
    let params = resolve_params(&r.action, &frame.params, owner.rank(), owner)?;
    let def = r.action.target();
    let child = RunningAction::child(frame, def, params, times);
    step_frame(child, owner, created)
}

enum Ok2 {
    Continue(RunningAction),
    Done(RunningAction),
}

fn exec_if(
    i: &If,
    owner: &mut Bullet,
    frame: RunningAction,
    created: &mut Vec<Bullet>,
) -> Result<Ok2, ExprError> {
    let cond = {
        let ctx = ParamCtx {
            params: &frame.params,
            rank: owner.rank(),
            owner: &*owner,
        };
        i.cond.eval_int(&ctx)?
    };
    let branch = if cond != 0 {
        Some(&i.then)
    } else {
        i.else_.as_ref()
    };
    match branch {
        Some(inv) => {
            let params = resolve_params(inv, &frame.params, owner.rank(), owner)?;
            let def = inv.target();
            let child = RunningAction::child(frame, def, params, 1);
            Ok(Ok2::Done(step_frame(child, owner, created)?))
        },
        None => Ok(Ok2::Continue(frame)),
    }
}
