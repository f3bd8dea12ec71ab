// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! The XML-to-`Document` loader.
//!
//! Definitions are built in one forward walk of the tree (`roxmltree`
//! already strips namespace prefixes from [`roxmltree::Node::tag_name`],
//! so no namespace handling is needed here). Every `*Ref` element creates
//! a [`RefSlot`] and is pushed onto a flat list; a second pass walks that
//! list and resolves each slot against the label it names. Because the
//! slot is an `Rc`-shared cell rather than a value embedded in the tree,
//! this works even when the label names the very definition the ref sits
//! inside of.

use std::collections::HashMap;
use std::rc::Rc;

use roxmltree::Node as XmlNode;
use thiserror::Error;

use super::{
    Accel, ActionDef, ActionInvocation, BulletDef, BulletInvocation, ChangeDirection,
    ChangeSpeed, Direction, DirectionKind, Document, FireDef, FireInvocation, If, Invocation,
    Node, Offset, OffsetKind, Orientation, RefSlot, Repeat, Speed, SpeedKind,
};
use crate::expr::{ExprError, Expression};

/// An error encountered while loading a document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The source was not well-formed XML.
    #[error("malformed XML")]
    Xml(#[from] roxmltree::Error),
    /// An expression embedded in the document failed to parse.
    #[error(transparent)]
    Expr(#[from] ExprError),
    /// A required child element was missing.
    #[error("<{tag}> is missing its required <{child}>")]
    MissingChild {
        /// The element that was missing a child.
        tag: &'static str,
        /// The missing child's tag name.
        child: &'static str,
    },
    /// A `type` attribute held a value outside the element's vocabulary.
    #[error("<{tag} type=\"{value}\"> is not a recognized type")]
    InvalidType {
        /// The element whose `type` attribute was invalid.
        tag: &'static str,
        /// The offending value.
        value: String,
    },
    /// A `*Ref` element named a label with no matching definition.
    #[error("{kind}Ref label `{label}` has no matching definition")]
    UnresolvedReference {
        /// `"bullet"`, `"action"`, or `"fire"`.
        kind: &'static str,
        /// The unresolved label.
        label: String,
    },
    /// Two definitions of the same kind shared a label.
    #[error("duplicate {kind} label `{label}`")]
    DuplicateLabel {
        /// `"bullet"`, `"action"`, or `"fire"`.
        kind: &'static str,
        /// The repeated label.
        label: String,
    },
}

/// A pending `*Ref`, tracked so the second pass can resolve it by label.
struct PendingRef<T> {
    label: String,
    slot: RefSlot<T>,
}

#[derive(Default)]
struct Pools {
    bullets: HashMap<String, Rc<BulletDef>>,
    actions: HashMap<String, Rc<ActionDef>>,
    fires: HashMap<String, Rc<FireDef>>,
    action_order: Vec<String>,

    bullet_refs: Vec<PendingRef<BulletDef>>,
    action_refs: Vec<PendingRef<ActionDef>>,
    fire_refs: Vec<PendingRef<FireDef>>,
}

impl Pools {
    fn insert_bullet(&mut self, label: &str, def: Rc<BulletDef>) -> Result<(), ParseError> {
        if self.bullets.insert(label.to_owned(), def).is_some() {
            return Err(ParseError::DuplicateLabel {
                kind: "bullet",
                label: label.to_owned(),
            });
        }
        Ok(())
    }

    fn insert_action(&mut self, label: &str, def: Rc<ActionDef>) -> Result<(), ParseError> {
        if self.actions.insert(label.to_owned(), def).is_some() {
            return Err(ParseError::DuplicateLabel {
                kind: "action",
                label: label.to_owned(),
            });
        }
        self.action_order.push(label.to_owned());
        Ok(())
    }

    fn insert_fire(&mut self, label: &str, def: Rc<FireDef>) -> Result<(), ParseError> {
        if self.fires.insert(label.to_owned(), def).is_some() {
            return Err(ParseError::DuplicateLabel {
                kind: "fire",
                label: label.to_owned(),
            });
        }
        Ok(())
    }
}

fn elements<'a, 'input>(node: XmlNode<'a, 'input>) -> impl Iterator<Item = XmlNode<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn text<'a>(node: XmlNode<'a, 'a>) -> &'a str {
    node.text().unwrap_or("").trim()
}

fn expr(node: XmlNode) -> Result<Expression, ParseError> {
    Expression::parse(text(node)).map_err(ParseError::from)
}

fn direction_kind(value: &str) -> Result<DirectionKind, ParseError> {
    match value {
        "aim" => Ok(DirectionKind::Aim),
        "absolute" => Ok(DirectionKind::Absolute),
        "relative" => Ok(DirectionKind::Relative),
        "sequence" => Ok(DirectionKind::Sequence),
        _ => {
            Err(ParseError::InvalidType {
                tag: "direction",
                value: value.to_owned(),
            })
        },
    }
}

fn speed_kind(value: &str) -> Result<SpeedKind, ParseError> {
    match value {
        "absolute" => Ok(SpeedKind::Absolute),
        "relative" => Ok(SpeedKind::Relative),
        "sequence" => Ok(SpeedKind::Sequence),
        _ => {
            Err(ParseError::InvalidType {
                tag: "speed",
                value: value.to_owned(),
            })
        },
    }
}

fn offset_kind(value: &str) -> Result<OffsetKind, ParseError> {
    match value {
        "absolute" => Ok(OffsetKind::Absolute),
        "relative" => Ok(OffsetKind::Relative),
        _ => {
            Err(ParseError::InvalidType {
                tag: "offset",
                value: value.to_owned(),
            })
        },
    }
}

fn parse_direction(node: XmlNode, default: &str) -> Result<Direction, ParseError> {
    let kind = direction_kind(node.attribute("type").unwrap_or(default))?;
    Ok(Direction {
        kind,
        value: expr(node)?,
    })
}

fn parse_speed(node: XmlNode, default: &str) -> Result<Speed, ParseError> {
    let kind = speed_kind(node.attribute("type").unwrap_or(default))?;
    Ok(Speed {
        kind,
        value: expr(node)?,
    })
}

fn parse_offset(node: XmlNode) -> Result<Offset, ParseError> {
    let kind = offset_kind(node.attribute("type").unwrap_or("relative"))?;
    let mut x = None;
    let mut y = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "x" => x = Some(expr(child)?),
            "y" => y = Some(expr(child)?),
            _ => {},
        }
    }
    Ok(Offset {
        kind,
        x,
        y,
    })
}

fn parse_params(node: XmlNode) -> Result<Vec<Expression>, ParseError> {
    elements(node)
        .filter(|child| child.tag_name().name() == "param")
        .map(expr)
        .collect()
}

fn parse_action_invocation(
    node: XmlNode,
    pools: &mut Pools,
) -> Result<Option<ActionInvocation>, ParseError> {
    match node.tag_name().name() {
        "action" => Ok(Some(Invocation::inline(parse_action_def(node, pools)?))),
        "actionRef" => {
            let label = node.attribute("label").unwrap_or("").to_owned();
            let slot = RefSlot::pending();
            pools.action_refs.push(PendingRef {
                label: label.clone(),
                slot: slot.clone(),
            });
            Ok(Some(Invocation::reference(slot, parse_params(node)?)))
        },
        _ => Ok(None),
    }
}

fn parse_fire_invocation(
    node: XmlNode,
    pools: &mut Pools,
) -> Result<Option<FireInvocation>, ParseError> {
    match node.tag_name().name() {
        "fire" => Ok(Some(Invocation::inline(parse_fire_def(node, pools)?))),
        "fireRef" => {
            let label = node.attribute("label").unwrap_or("").to_owned();
            let slot = RefSlot::pending();
            pools.fire_refs.push(PendingRef {
                label: label.clone(),
                slot: slot.clone(),
            });
            Ok(Some(Invocation::reference(slot, parse_params(node)?)))
        },
        _ => Ok(None),
    }
}

/// Parse a `<bullet>` or `<bulletRef>` child. Callers only invoke this
/// already knowing `node`'s tag is one of the two.
fn parse_bullet_invocation(node: XmlNode, pools: &mut Pools) -> Result<BulletInvocation, ParseError> {
    if node.tag_name().name() == "bulletRef" {
        let label = node.attribute("label").unwrap_or("").to_owned();
        let slot = RefSlot::pending();
        pools.bullet_refs.push(PendingRef {
            label: label.clone(),
            slot: slot.clone(),
        });
        Ok(Invocation::reference(slot, parse_params(node)?))
    } else {
        Ok(Invocation::inline(parse_bullet_def(node, pools)?))
    }
}

fn parse_repeat(node: XmlNode, pools: &mut Pools) -> Result<Repeat, ParseError> {
    let mut times = None;
    let mut action = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "times" => times = Some(expr(child)?),
            "action" | "actionRef" => action = parse_action_invocation(child, pools)?,
            _ => {},
        }
    }
    Ok(Repeat {
        times: times.ok_or(ParseError::MissingChild {
            tag: "repeat",
            child: "times",
        })?,
        action: action.ok_or(ParseError::MissingChild {
            tag: "repeat",
            child: "action",
        })?,
    })
}

fn parse_if(node: XmlNode, pools: &mut Pools) -> Result<If, ParseError> {
    let mut cond = None;
    let mut then = None;
    let mut else_ = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "cond" => cond = Some(expr(child)?),
            "then" => then = Some(Invocation::inline(parse_action_def(child, pools)?)),
            "else" => else_ = Some(Invocation::inline(parse_action_def(child, pools)?)),
            _ => {},
        }
    }
    Ok(If {
        cond: cond.ok_or(ParseError::MissingChild {
            tag: "if",
            child: "cond",
        })?,
        then: then.ok_or(ParseError::MissingChild {
            tag: "if",
            child: "then",
        })?,
        else_,
    })
}

fn parse_change_direction(node: XmlNode) -> Result<ChangeDirection, ParseError> {
    let mut term = None;
    let mut direction = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "term" => term = Some(expr(child)?),
            "direction" => direction = Some(parse_direction(child, "absolute")?),
            _ => {},
        }
    }
    Ok(ChangeDirection {
        term: term.ok_or(ParseError::MissingChild {
            tag: "changeDirection",
            child: "term",
        })?,
        direction: direction.ok_or(ParseError::MissingChild {
            tag: "changeDirection",
            child: "direction",
        })?,
    })
}

fn parse_change_speed(node: XmlNode) -> Result<ChangeSpeed, ParseError> {
    let mut term = None;
    let mut speed = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "term" => term = Some(expr(child)?),
            "speed" => speed = Some(parse_speed(child, "absolute")?),
            _ => {},
        }
    }
    Ok(ChangeSpeed {
        term: term.ok_or(ParseError::MissingChild {
            tag: "changeSpeed",
            child: "term",
        })?,
        speed: speed.ok_or(ParseError::MissingChild {
            tag: "changeSpeed",
            child: "speed",
        })?,
    })
}

fn parse_accel(node: XmlNode) -> Result<Accel, ParseError> {
    let mut term = None;
    let mut horizontal = None;
    let mut vertical = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "term" => term = Some(expr(child)?),
            "horizontal" => horizontal = Some(parse_speed(child, "absolute")?),
            "vertical" => vertical = Some(parse_speed(child, "absolute")?),
            _ => {},
        }
    }
    if horizontal.is_none() && vertical.is_none() {
        return Err(ParseError::MissingChild {
            tag: "accel",
            child: "horizontal-or-vertical",
        });
    }
    Ok(Accel {
        term: term.ok_or(ParseError::MissingChild {
            tag: "accel",
            child: "term",
        })?,
        horizontal,
        vertical,
    })
}

fn parse_node(node: XmlNode, pools: &mut Pools) -> Result<Option<Node>, ParseError> {
    let parsed = match node.tag_name().name() {
        "changeDirection" => Node::ChangeDirection(parse_change_direction(node)?),
        "changeSpeed" => Node::ChangeSpeed(parse_change_speed(node)?),
        "accel" => Node::Accel(parse_accel(node)?),
        "wait" => Node::Wait(expr(node)?),
        "tag" => Node::Tag(text(node).to_owned()),
        "untag" => Node::Untag(text(node).to_owned()),
        "appearance" => Node::Appearance(text(node).to_owned()),
        "vanish" => Node::Vanish,
        "repeat" => Node::Repeat(parse_repeat(node, pools)?),
        "if" => Node::If(parse_if(node, pools)?),
        "fire" | "fireRef" => {
            match parse_fire_invocation(node, pools)? {
                Some(inv) => Node::Fire(inv),
                None => return Ok(None),
            }
        },
        "action" | "actionRef" => {
            match parse_action_invocation(node, pools)? {
                Some(inv) => Node::Action(inv),
                None => return Ok(None),
            }
        },
        _ => return Ok(None),
    };
    Ok(Some(parsed))
}

fn parse_node_list(node: XmlNode, pools: &mut Pools) -> Result<Vec<Node>, ParseError> {
    elements(node)
        .filter_map(|child| parse_node(child, pools).transpose())
        .collect()
}

fn parse_action_def(node: XmlNode, pools: &mut Pools) -> Result<Rc<ActionDef>, ParseError> {
    let nodes = parse_node_list(node, pools)?;
    let def = Rc::new(ActionDef {
        nodes,
    });
    if let Some(label) = node.attribute("label") {
        pools.insert_action(label, Rc::clone(&def))?;
    }
    Ok(def)
}

fn parse_bullet_def(node: XmlNode, pools: &mut Pools) -> Result<Rc<BulletDef>, ParseError> {
    let mut direction = None;
    let mut speed = None;
    let mut actions = Vec::new();
    let mut tags = Vec::new();
    let mut appearance = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "direction" => direction = Some(parse_direction(child, "absolute")?),
            "speed" => speed = Some(parse_speed(child, "absolute")?),
            "action" | "actionRef" => {
                if let Some(inv) = parse_action_invocation(child, pools)? {
                    actions.push(inv);
                }
            },
            "tag" => tags.push(text(child).to_owned()),
            "appearance" => appearance = Some(text(child).to_owned()),
            _ => {},
        }
    }
    let def = Rc::new(BulletDef {
        direction,
        speed,
        actions,
        tags,
        appearance,
    });
    if let Some(label) = node.attribute("label") {
        pools.insert_bullet(label, Rc::clone(&def))?;
    }
    Ok(def)
}

fn parse_fire_def(node: XmlNode, pools: &mut Pools) -> Result<Rc<FireDef>, ParseError> {
    let mut direction = None;
    let mut speed = None;
    let mut offset = None;
    let mut tags = Vec::new();
    let mut appearance = None;
    let mut bullet = None;
    for child in elements(node) {
        match child.tag_name().name() {
            "direction" => direction = Some(parse_direction(child, "aim")?),
            "speed" => speed = Some(parse_speed(child, "absolute")?),
            "offset" => offset = Some(parse_offset(child)?),
            "tag" => tags.push(text(child).to_owned()),
            "appearance" => appearance = Some(text(child).to_owned()),
            "bullet" | "bulletRef" => bullet = Some(parse_bullet_invocation(child, pools)?),
            _ => {},
        }
    }
    let def = Rc::new(FireDef {
        bullet: bullet.ok_or(ParseError::MissingChild {
            tag: "fire",
            child: "bullet",
        })?,
        direction,
        speed,
        offset,
        tags,
        appearance,
    });
    if let Some(label) = node.attribute("label") {
        pools.insert_fire(label, Rc::clone(&def))?;
    }
    Ok(def)
}

fn resolve_refs(pools: &Pools) -> Result<(), ParseError> {
    for pending in &pools.bullet_refs {
        let target = pools.bullets.get(&pending.label).ok_or_else(|| {
            ParseError::UnresolvedReference {
                kind: "bullet",
                label: pending.label.clone(),
            }
        })?;
        pending.slot.resolve(Rc::clone(target));
    }
    for pending in &pools.action_refs {
        let target = pools.actions.get(&pending.label).ok_or_else(|| {
            ParseError::UnresolvedReference {
                kind: "action",
                label: pending.label.clone(),
            }
        })?;
        pending.slot.resolve(Rc::clone(target));
    }
    for pending in &pools.fire_refs {
        let target = pools.fires.get(&pending.label).ok_or_else(|| {
            ParseError::UnresolvedReference {
                kind: "fire",
                label: pending.label.clone(),
            }
        })?;
        pending.slot.resolve(Rc::clone(target));
    }
    Ok(())
}

pub(crate) fn load(source: &str) -> Result<Document, ParseError> {
    let xml = roxmltree::Document::parse(source)?;
    let root = xml.root_element();

    let orientation = match root.attribute("type") {
        Some("vertical") => Orientation::Vertical,
        Some("horizontal") => Orientation::Horizontal,
        _ => Orientation::None,
    };

    let mut pools = Pools::default();
    for child in elements(root) {
        match child.tag_name().name() {
            "bullet" => {
                parse_bullet_def(child, &mut pools)?;
            },
            "action" => {
                parse_action_def(child, &mut pools)?;
            },
            "fire" => {
                parse_fire_def(child, &mut pools)?;
            },
            _ => {},
        }
    }

    resolve_refs(&pools)?;

    let top_actions = pools
        .action_order
        .iter()
        .filter(|label| label.starts_with("top"))
        .map(|label| Rc::clone(&pools.actions[label]))
        .collect();

    Ok(Document {
        orientation,
        top_actions,
    })
}

#[cfg(test)]
mod test {
    use std::ffi::OsStr;
    use std::fs;

    use walkdir::WalkDir;

    use super::*;

    #[test]
    fn test_parse_fixture_corpus() {
        let ext = OsStr::new("xml");
        let mut seen = 0;

        WalkDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data"))
            .sort_by(|e1, e2| e1.path().cmp(e2.path()))
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().extension() == Some(ext))
            .for_each(|entry| {
                let source = fs::read_to_string(entry.path()).unwrap();
                load(&source).unwrap_or_else(|err| {
                    panic!("failed to parse {}: {}", entry.path().display(), err)
                });
                seen += 1;
            });

        assert!(seen > 0, "no fixtures found under tests/data");
    }

    #[test]
    fn test_namespace_stripped() {
        let xml = r#"<bulletml xmlns="http://example.com/bulletml"><action label="top1"><vanish/></action></bulletml>"#;
        let doc = load(xml).unwrap();
        assert_eq!(doc.top_actions.len(), 1);
    }

    #[test]
    fn test_top_action_ordering_and_filtering() {
        let xml = r#"<bulletml>
            <action label="top2"><vanish/></action>
            <action label="nottop"><vanish/></action>
            <action label="top1"><vanish/></action>
        </bulletml>"#;
        let doc = load(xml).unwrap();
        assert_eq!(doc.top_actions.len(), 2);
    }

    #[test]
    fn test_missing_required_child_fails() {
        let xml = r#"<bulletml><action label="top1"><changeDirection><term>1</term></changeDirection></action></bulletml>"#;
        assert!(load(xml).is_err());
    }

    #[test]
    fn test_unresolved_reference_fails() {
        let xml = r#"<bulletml><action label="top1"><actionRef label="missing"/></action></bulletml>"#;
        assert!(matches!(
            load(xml),
            Err(ParseError::UnresolvedReference {
                ..
            })
        ));
    }

    #[test]
    fn test_self_referential_action() {
        let xml = r#"<bulletml><action label="top1"><wait>1</wait><actionRef label="top1"/></action></bulletml>"#;
        let doc = load(xml).unwrap();
        assert_eq!(doc.top_actions.len(), 1);
    }

    #[test]
    fn test_duplicate_label_fails() {
        let xml = r#"<bulletml><action label="top1"><vanish/></action><action label="top1"><vanish/></action></bulletml>"#;
        assert!(matches!(
            load(xml),
            Err(ParseError::DuplicateLabel {
                ..
            })
        ));
    }
}
