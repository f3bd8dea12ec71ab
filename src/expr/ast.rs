// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use crate::expr::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprVar {
    Rank,
    Rand,
    /// A `$N` parameter reference, already converted to a 0-based index.
    Param(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
}

impl UnaryOp {
    pub fn eval(self, v: Value) -> Value {
        match self {
            UnaryOp::Negate => -v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn eval(self, l: Value, r: Value) -> Value {
        match self {
            BinaryOp::Add => l + r,
            BinaryOp::Sub => l - r,
            BinaryOp::Mul => l * r,
            BinaryOp::Div => l / r,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Float(Value),
    Var(ExprVar),
}

impl Expr {
    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn constant_value(&self) -> Option<Value> {
        if let Expr::Float(v) = *self {
            Some(v)
        } else {
            None
        }
    }

    /// Fold away any subtree that references neither a parameter, `$rand`, nor `$rank`.
    pub fn constant_fold(self) -> Self {
        match self {
            Expr::Unary {
                op: o,
                expr: e,
            } => {
                let ne = e.constant_fold();
                if let Some(v) = ne.constant_value() {
                    Expr::Float(o.eval(v))
                } else {
                    Self::unary(o, ne)
                }
            },
            Expr::Binary {
                op: o,
                lhs: l,
                rhs: r,
            } => {
                let nl = l.constant_fold();
                let nr = r.constant_fold();
                if let (Some(l), Some(r)) = (nl.constant_value(), nr.constant_value()) {
                    Expr::Float(o.eval(l, r))
                } else {
                    Self::binary(o, nl, nr)
                }
            },
            e => e,
        }
    }
}
