// Distributed under the OSI-approved BSD 2-Clause License.
// See accompanying LICENSE file for details.

use crate::expr::ast::{BinaryOp, Expr, ExprVar, UnaryOp};

peg::parser! {
    /// The BulletML numeric expression grammar: `+ - * /`, parentheses, unary minus,
    /// and `$1`..`$N`/`$rand`/`$rank` variables.
    pub grammar expr_parser() for str {
        rule ws() = quiet!{[' ' | '\t' | '\n' | '\r']*}

        rule digits() -> &'input str = $(['0'..='9']+)

        rule float() -> f32
            = n:$(['0'..='9']+ "." ['0'..='9']*) {? n.parse().or(Err("float")) }
            / n:$("." ['0'..='9']+) {? n.parse().or(Err("float")) }
            / n:digits() {? n.parse().or(Err("float")) }

        rule variable() -> ExprVar
            = "$rand" { ExprVar::Rand }
            / "$rank" { ExprVar::Rank }
            / "$" n:digits() {?
                n.parse::<usize>()
                    .ok()
                    .filter(|&n| n >= 1)
                    .map(|n| ExprVar::Param(n - 1))
                    .ok_or("parameter index")
            }

        rule term() -> Expr = precedence! {
            x:(@) ws() "+" ws() y:@ { Expr::binary(BinaryOp::Add, x, y) }
            x:(@) ws() "-" ws() y:@ { Expr::binary(BinaryOp::Sub, x, y) }
            --
            x:(@) ws() "*" ws() y:@ { Expr::binary(BinaryOp::Mul, x, y) }
            x:(@) ws() "/" ws() y:@ { Expr::binary(BinaryOp::Div, x, y) }
            --
            "-" ws() x:@ { Expr::unary(UnaryOp::Negate, x) }
            --
            "(" ws() e:term() ws() ")" { e }
            v:variable() { Expr::Var(v) }
            f:float() { Expr::Float(f) }
        }

        /// The full expression grammar, requiring the whole input to be consumed.
        pub rule expression() -> Expr = ws() e:term() ws() ![_] { e }
    }
}
