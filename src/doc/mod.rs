// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! The BulletML document model.
//!
//! A [`Document`] is an immutable library of bullet, action, and fire
//! definitions assembled from parsed XML. Every `*Ref` node in the tree
//! has been resolved to point directly at its definition by the time a
//! `Document` is returned from [`Document::from_xml`].

mod loader;

pub use self::loader::ParseError;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::expr::Expression;

/// The orientation a document was authored for.
///
/// This is informational only and affects no interpreter math; a host may
/// use it to orient its own rendering, or ignore it entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// No particular orientation (e.g. a toroidal playfield).
    None,
    /// The playfield scrolls vertically; bullets travel top-to-bottom.
    Vertical,
    /// The playfield scrolls horizontally; bullets travel left-to-right.
    Horizontal,
}

impl Default for Orientation {
    fn default() -> Self {
        Orientation::None
    }
}

/// A resolvable pointer to a named definition.
///
/// Filled in by the loader's second pass; every slot reachable from a
/// [`Document`] returned by [`Document::from_xml`] is guaranteed to be
/// `Some`.
pub(crate) struct RefSlot<T>(Rc<RefCell<Option<Rc<T>>>>);

impl<T> RefSlot<T> {
    /// A slot awaiting resolution against the labeled definition pool.
    ///
    /// Cloning the slot (as the loader does to keep a handle in its flat
    /// resolve-list alongside the `Invocation` that owns the original) shares
    /// the same cell, so resolving through either handle is visible through
    /// both -- this is what lets a self-referential definition (e.g. an
    /// `action` whose body contains an `actionRef` back to itself) form a
    /// genuine `Rc` cycle without unsafe code.
    pub(crate) fn pending() -> Self {
        RefSlot(Rc::new(RefCell::new(None)))
    }

    /// A slot that already points at its definition (an inline, unlabeled
    /// definition needs no second-pass resolution).
    pub(crate) fn resolved(target: Rc<T>) -> Self {
        RefSlot(Rc::new(RefCell::new(Some(target))))
    }

    pub(crate) fn resolve(&self, target: Rc<T>) {
        *self.0.borrow_mut() = Some(target);
    }

    /// The definition this slot points at.
    ///
    /// Panics if called before the loader's resolution pass has run; this
    /// cannot happen through the public API since `Document::from_xml`
    /// only returns a document after resolution succeeds.
    pub(crate) fn get(&self) -> Rc<T> {
        self.0
            .borrow()
            .clone()
            .expect("unresolved reference slot escaped the loader")
    }
}

impl<T> fmt::Debug for RefSlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefSlot")
            .field("resolved", &self.0.borrow().is_some())
            .finish()
    }
}

impl<T> Clone for RefSlot<T> {
    fn clone(&self) -> Self {
        RefSlot(Rc::clone(&self.0))
    }
}

/// How a `direction`, `speed`, or `offset` value should be combined with
/// the running context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectionKind {
    /// Aimed at the target, adjusted by the given value.
    Aim,
    /// An absolute angle.
    Absolute,
    /// Relative to the owner's current direction.
    Relative,
    /// Relative to the previous value in the same sequence.
    Sequence,
}

/// See [`DirectionKind`]; speed has no `Aim` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedKind {
    /// An absolute speed.
    Absolute,
    /// Relative to the owner's current speed.
    Relative,
    /// Relative to the previous value in the same sequence.
    Sequence,
}

/// See [`DirectionKind`]; offsets have no `Aim` or `Sequence` mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetKind {
    /// An absolute offset from the owner's position.
    Absolute,
    /// An offset rotated into the firing direction.
    Relative,
}

/// A raw `<direction>` value.
#[derive(Debug, Clone)]
pub struct Direction {
    pub(crate) kind: DirectionKind,
    pub(crate) value: Expression,
}

/// A raw `<speed>` value.
#[derive(Debug, Clone)]
pub struct Speed {
    pub(crate) kind: SpeedKind,
    pub(crate) value: Expression,
}

/// A raw `<offset>` value.
#[derive(Debug, Clone)]
pub struct Offset {
    pub(crate) kind: OffsetKind,
    pub(crate) x: Option<Expression>,
    pub(crate) y: Option<Expression>,
}

/// `<changeDirection>`.
#[derive(Debug, Clone)]
pub struct ChangeDirection {
    pub(crate) term: Expression,
    pub(crate) direction: Direction,
}

/// `<changeSpeed>`.
#[derive(Debug, Clone)]
pub struct ChangeSpeed {
    pub(crate) term: Expression,
    pub(crate) speed: Speed,
}

/// `<accel>`.
#[derive(Debug, Clone)]
pub struct Accel {
    pub(crate) term: Expression,
    pub(crate) horizontal: Option<Speed>,
    pub(crate) vertical: Option<Speed>,
}

/// `<repeat>`.
#[derive(Debug, Clone)]
pub struct Repeat {
    pub(crate) times: Expression,
    pub(crate) action: ActionInvocation,
}

/// `<if>`.
#[derive(Debug, Clone)]
pub struct If {
    pub(crate) cond: Expression,
    pub(crate) then: ActionInvocation,
    pub(crate) else_: Option<ActionInvocation>,
}

/// A single target-plus-parameters invocation: either an inline
/// definition (already resolved) or a `*Ref` with its own parameter list
/// (resolved by the loader's second pass).
///
/// The distinction matters at runtime, not just at parse time: an inline
/// definition runs with its caller's parameters passed straight through,
/// while a `*Ref`'s own `<param>` expressions are evaluated against the
/// caller's parameters to produce a *new* list (replacing the caller's
/// entirely, even when the `*Ref` supplies no `<param>` at all).
#[derive(Debug, Clone)]
pub(crate) struct Invocation<T> {
    pub(crate) target: RefSlot<T>,
    pub(crate) params: Vec<Expression>,
    pub(crate) is_reference: bool,
}

impl<T> Invocation<T> {
    pub(crate) fn inline(target: Rc<T>) -> Self {
        Invocation {
            target: RefSlot::resolved(target),
            params: Vec::new(),
            is_reference: false,
        }
    }

    pub(crate) fn reference(target: RefSlot<T>, params: Vec<Expression>) -> Self {
        Invocation {
            target,
            params,
            is_reference: true,
        }
    }

    /// The resolved target of this invocation.
    pub(crate) fn target(&self) -> Rc<T> {
        self.target.get()
    }
}

pub(crate) type ActionInvocation = Invocation<ActionDef>;
pub(crate) type FireInvocation = Invocation<FireDef>;
pub(crate) type BulletInvocation = Invocation<BulletDef>;

/// One opcode in an action's body.
#[derive(Debug, Clone)]
pub enum Node {
    /// See [`ChangeDirection`].
    ChangeDirection(ChangeDirection),
    /// See [`ChangeSpeed`].
    ChangeSpeed(ChangeSpeed),
    /// See [`Accel`].
    Accel(Accel),
    /// Pause for the given number of frames.
    Wait(Expression),
    /// Add a tag to the owning bullet.
    Tag(String),
    /// Remove a tag from the owning bullet.
    Untag(String),
    /// Set the owning bullet's appearance label.
    Appearance(String),
    /// Vanish the owning bullet.
    Vanish,
    /// See [`Repeat`].
    Repeat(Repeat),
    /// See [`If`].
    If(If),
    /// Fire a bullet, described inline.
    Fire(FireInvocation),
    /// Run a nested action, described inline.
    Action(ActionInvocation),
}

/// A named or anonymous action definition: an ordered list of opcodes.
#[derive(Debug, Clone)]
pub struct ActionDef {
    pub(crate) nodes: Vec<Node>,
}

/// A named or anonymous bullet definition.
///
/// Firing one does not itself create a [`crate::runtime::Bullet`]; it
/// supplies the direction/speed overrides, tags, appearance, and running
/// actions that `fire` combines with its own overrides to build one.
#[derive(Debug, Clone)]
pub struct BulletDef {
    pub(crate) direction: Option<Direction>,
    pub(crate) speed: Option<Speed>,
    pub(crate) actions: Vec<ActionInvocation>,
    pub(crate) tags: Vec<String>,
    pub(crate) appearance: Option<String>,
}

/// A named or anonymous fire definition.
#[derive(Debug, Clone)]
pub struct FireDef {
    pub(crate) bullet: BulletInvocation,
    pub(crate) direction: Option<Direction>,
    pub(crate) speed: Option<Speed>,
    pub(crate) offset: Option<Offset>,
    pub(crate) tags: Vec<String>,
    pub(crate) appearance: Option<String>,
}

/// A fully loaded, immutable BulletML document.
#[derive(Debug)]
pub struct Document {
    /// The orientation the document was authored for.
    pub orientation: Orientation,
    /// The entry-point actions: every `action` whose label starts with
    /// `top`, in document order.
    pub top_actions: Vec<Rc<ActionDef>>,
}

impl Document {
    /// Parse a BulletML XML document.
    ///
    /// Every `*Ref` element is resolved against a same-named definition
    /// elsewhere in the document; an unresolved label is a
    /// [`ParseError::UnresolvedReference`].
    pub fn from_xml(source: &str) -> Result<Self, ParseError> {
        loader::load(source)
    }
}
