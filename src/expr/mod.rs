// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

//! The BulletML numeric expression language.
//!
//! Expressions are small arithmetic formulas over action parameters
//! (`$1`..`$N`), a per-evaluation random draw (`$rand`, uniform in
//! `[0, 1)`), and a difficulty scalar (`$rank`, in `[0, 1]`).

mod ast;
pub(crate) mod grammar;

use self::ast::{Expr, ExprVar};

/// An error while parsing or evaluating an expression.
#[derive(Debug, Error)]
pub enum ExprError {
    /// The expression text could not be parsed.
    #[error("failed to parse expression `{}`", text)]
    ParseFailure {
        /// The original expression text.
        text: String,
        /// The underlying parser error.
        #[source]
        source: peg::error::ParseError<peg::str::LineCol>,
    },
    /// The expression referenced a parameter past the end of the supplied vector.
    #[error("missing parameter `${}`", idx + 1)]
    MissingParameter {
        /// The (0-based) parameter index.
        idx: usize,
    },
}

use thiserror::Error;

/// The value of an expression.
pub type Value = f32;

/// The context in which to evaluate an expression: the parameters in scope and the
/// difficulty rank of the entity running it. `$rand` is drawn fresh on every reference.
pub trait ExpressionContext {
    /// Get the value of the `idx`-th (0-based) parameter, if any was supplied.
    fn get_param(&self, idx: usize) -> Option<Value>;
    /// Draw a fresh uniform random value in `[0, 1)`.
    fn rand(&self) -> Value;
    /// The difficulty rank in scope, in `[0, 1]`.
    fn rank(&self) -> Value;
}

/// A compiled numeric expression.
///
/// Expressions that reference no parameter, `$rand`, or `$rank` are folded to a
/// constant at parse time and evaluate without touching the context at all.
#[derive(Debug, Clone)]
pub struct Expression {
    expr: Expr,
}

impl Expression {
    /// Parse an expression from its BulletML text form.
    pub fn parse<E>(text: E) -> Result<Self, ExprError>
    where
        E: AsRef<str>,
    {
        let text = text.as_ref();
        grammar::expr_parser::expression(text.trim())
            .map(|expr| {
                Expression {
                    expr: expr.constant_fold(),
                }
            })
            .map_err(|source| {
                ExprError::ParseFailure {
                    text: text.to_owned(),
                    source,
                }
            })
    }

    /// Evaluate the expression against the given context.
    pub fn eval(&self, ctx: &dyn ExpressionContext) -> Result<Value, ExprError> {
        Self::eval_expr(&self.expr, ctx)
    }

    /// Evaluate the expression and round the result to the nearest integer,
    /// ties rounding away from zero.
    pub fn eval_int(&self, ctx: &dyn ExpressionContext) -> Result<i32, ExprError> {
        self.eval(ctx).map(round_ties_away)
    }

    fn eval_expr(expr: &Expr, ctx: &dyn ExpressionContext) -> Result<Value, ExprError> {
        match *expr {
            Expr::Unary {
                op: o,
                expr: ref e,
            } => Self::eval_expr(e.as_ref(), ctx).map(|r| o.eval(r)),
            Expr::Binary {
                op: o,
                lhs: ref l,
                rhs: ref r,
            } => {
                Self::eval_expr(l.as_ref(), ctx)
                    .and_then(|lr| Self::eval_expr(r.as_ref(), ctx).map(|rr| o.eval(lr, rr)))
            },
            Expr::Float(f) => Ok(f),
            Expr::Var(v) => {
                match v {
                    ExprVar::Rank => Ok(ctx.rank()),
                    ExprVar::Rand => Ok(ctx.rand()),
                    ExprVar::Param(idx) => {
                        ctx.get_param(idx)
                            .ok_or(ExprError::MissingParameter {
                                idx,
                            })
                    },
                }
            },
        }
    }
}

/// Round to the nearest integer, ties away from zero (e.g. `2.5 -> 3`, `-2.5 -> -3`).
pub fn round_ties_away(v: Value) -> i32 {
    if v >= 0. {
        (v + 0.5).floor() as i32
    } else {
        (v - 0.5).ceil() as i32
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Ctx {
        params: Vec<Value>,
        rank: Value,
    }

    impl ExpressionContext for Ctx {
        fn get_param(&self, idx: usize) -> Option<Value> {
            self.params.get(idx).copied()
        }

        fn rand(&self) -> Value {
            0.5
        }

        fn rank(&self) -> Value {
            self.rank
        }
    }

    fn ctx(params: &[Value], rank: Value) -> Ctx {
        Ctx {
            params: params.to_vec(),
            rank,
        }
    }

    #[test]
    fn test_eval_constant() {
        let expr = Expression::parse("1+2*3").unwrap();
        assert_eq!(expr.eval(&ctx(&[], 0.)).unwrap(), 7.);
    }

    #[test]
    fn test_eval_param() {
        let expr = Expression::parse("$1 + $2").unwrap();
        assert_eq!(expr.eval(&ctx(&[10., 20.], 0.)).unwrap(), 30.);
    }

    #[test]
    fn test_eval_missing_param() {
        let expr = Expression::parse("$1").unwrap();
        let err = expr.eval(&ctx(&[], 0.)).unwrap_err();
        assert!(matches!(err, ExprError::MissingParameter {
            idx: 0
        }));
    }

    #[test]
    fn test_eval_rank() {
        let expr = Expression::parse("$rank * 2").unwrap();
        assert_eq!(expr.eval(&ctx(&[], 0.25)).unwrap(), 0.5);
    }

    #[test]
    fn test_eval_rand() {
        let expr = Expression::parse("$rand").unwrap();
        assert_eq!(expr.eval(&ctx(&[], 0.)).unwrap(), 0.5);
    }

    #[test]
    fn test_parse_trailing_garbage_fails() {
        assert!(Expression::parse("1 1").is_err());
        assert!(Expression::parse("$randx").is_err());
    }

    #[test]
    fn test_whitespace_trimmed() {
        let expr = Expression::parse("  1 + 1  ").unwrap();
        assert_eq!(expr.eval(&ctx(&[], 0.)).unwrap(), 2.);
    }

    #[test]
    fn test_round_ties_away() {
        assert_eq!(round_ties_away(2.5), 3);
        assert_eq!(round_ties_away(-2.5), -3);
        assert_eq!(round_ties_away(2.4), 2);
        assert_eq!(round_ties_away(-2.4), -2);
    }
}
