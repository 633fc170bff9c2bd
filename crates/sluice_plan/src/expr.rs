//! Scheduling expressions.
//!
//! A small boolean language over rule primitives:
//!
//! ```text
//! or      := and ('|' and)*
//! and     := unary ('&' unary)*
//! unary   := '!' unary | primary
//! primary := '(' or ')' | ident '(' [number] ')'
//! ```
//!
//! Primitives are `always()`, `unsynced()`, `missing()`,
//! `any_parent_updated()`, `all_parents_updated()` and `latest(n)`.
//! An expression evaluates against one asset's candidate slice and
//! yields a subset of it.

use crate::error::PlanResult;
use crate::rules::RulesLogic;
use crate::view::AssetGraphView;
use serde::{Deserialize, Serialize};
use sluice_partition::PartitionSpace;
use std::fmt;
use std::str::FromStr;

/// Expression parse failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid scheduling expression at {position}: {message}")]
pub struct ExprParseError {
    /// Byte offset of the failure
    pub position: usize,
    /// What was expected
    pub message: String,
}

/// Scheduling expression tree
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Expr {
    /// The candidate itself
    Always,
    /// Partitions out of sync with their parents
    Unsynced,
    /// Partitions never materialized
    Missing,
    /// Partitions with some parent updated since their last materialization
    AnyParentUpdated,
    /// Partitions with every parent updated since their last materialization
    AllParentsUpdated,
    /// The `n` most recent time windows
    Latest(usize),
    /// Both hold
    And(Box<Expr>, Box<Expr>),
    /// Either holds
    Or(Box<Expr>, Box<Expr>),
    /// The candidate minus the inner result
    Not(Box<Expr>),
}

/// `always()`
#[must_use]
pub fn always() -> Expr {
    Expr::Always
}

/// `unsynced()`
#[must_use]
pub fn unsynced() -> Expr {
    Expr::Unsynced
}

/// `missing()`
#[must_use]
pub fn missing() -> Expr {
    Expr::Missing
}

/// `any_parent_updated()`
#[must_use]
pub fn any_parent_updated() -> Expr {
    Expr::AnyParentUpdated
}

/// `all_parents_updated()`
#[must_use]
pub fn all_parents_updated() -> Expr {
    Expr::AllParentsUpdated
}

/// `latest(n)`
#[must_use]
pub fn latest(n: usize) -> Expr {
    Expr::Latest(n)
}

impl Expr {
    /// Parse an expression
    ///
    /// # Errors
    ///
    /// Returns error with the offending byte offset if `source` is not a
    /// well-formed expression
    pub fn parse(source: &str) -> Result<Self, ExprParseError> {
        let mut parser = Parser::new(source);
        let expr = parser.parse_or()?;
        parser.skip_ws();
        if parser.pos < parser.src.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    /// Evaluate against one asset's candidate slice
    ///
    /// The result is always a subset of `candidate`.
    ///
    /// # Errors
    ///
    /// Returns error if a primitive fails to evaluate
    pub fn evaluate(&self, view: &AssetGraphView<'_>, candidate: &PartitionSpace) -> PlanResult<PartitionSpace> {
        if candidate.is_empty() {
            return Ok(candidate.clone());
        }
        match self {
            Self::Always => Ok(candidate.clone()),
            Self::Unsynced => RulesLogic::unsynced(view, candidate),
            Self::Missing => RulesLogic::missing(view, candidate),
            Self::AnyParentUpdated => RulesLogic::any_parent_updated(view, candidate),
            Self::AllParentsUpdated => RulesLogic::all_parents_updated(view, candidate),
            Self::Latest(n) => RulesLogic::latest(view, candidate, *n),
            Self::And(a, b) => {
                let left = a.evaluate(view, candidate)?;
                b.evaluate(view, &left)
            }
            Self::Or(a, b) => Ok(a.evaluate(view, candidate)?.union(&b.evaluate(view, candidate)?)),
            Self::Not(inner) => Ok(candidate.difference(&inner.evaluate(view, candidate)?)),
        }
    }

    const fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 1,
            Self::And(..) => 2,
            Self::Not(_) => 3,
            _ => 4,
        }
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({self})")
        } else {
            write!(f, "{self}")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("always()"),
            Self::Unsynced => f.write_str("unsynced()"),
            Self::Missing => f.write_str("missing()"),
            Self::AnyParentUpdated => f.write_str("any_parent_updated()"),
            Self::AllParentsUpdated => f.write_str("all_parents_updated()"),
            Self::Latest(n) => write!(f, "latest({n})"),
            Self::And(a, b) => {
                a.fmt_operand(f, 2)?;
                f.write_str(" & ")?;
                b.fmt_operand(f, 3)
            }
            Self::Or(a, b) => {
                a.fmt_operand(f, 1)?;
                f.write_str(" | ")?;
                b.fmt_operand(f, 2)
            }
            Self::Not(inner) => {
                f.write_str("!")?;
                inner.fmt_operand(f, 3)
            }
        }
    }
}

impl FromStr for Expr {
    type Err = ExprParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Expr {
    type Error = ExprParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Expr> for String {
    fn from(expr: Expr) -> Self {
        expr.to_string()
    }
}

impl std::ops::BitAnd for Expr {
    type Output = Expr;

    fn bitand(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::BitOr for Expr {
    type Output = Expr;

    fn bitor(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }
}

impl std::ops::Not for Expr {
    type Output = Expr;

    fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }
}

/// Deepest nesting of `!` and parentheses the parser accepts
pub const MAX_NESTING: usize = 256;

struct Parser<'s> {
    src: &'s str,
    pos: usize,
    depth: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0, depth: 0 }
    }

    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Result<T, ExprParseError>) -> Result<T, ExprParseError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error(&format!("nesting deeper than {MAX_NESTING}")));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn error(&self, message: &str) -> ExprParseError {
        ExprParseError {
            position: self.pos,
            message: message.to_string(),
        }
    }

    fn skip_ws(&mut self) {
        let rest = &self.src[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.src[self.pos..].chars().next()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ExprParseError> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("expected `{c}`")))
        }
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'s str {
        let start = self.pos;
        let len = self.src[start..]
            .char_indices()
            .find(|&(_, c)| !pred(c))
            .map_or(self.src.len() - start, |(i, _)| i);
        self.pos += len;
        &self.src[start..start + len]
    }

    fn parse_or(&mut self) -> Result<Expr, ExprParseError> {
        let mut expr = self.parse_and()?;
        while self.eat('|') {
            expr = expr | self.parse_and()?;
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprParseError> {
        let mut expr = self.parse_unary()?;
        while self.eat('&') {
            expr = expr & self.parse_unary()?;
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprParseError> {
        if self.eat('!') {
            return Ok(!self.nested(Self::parse_unary)?);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprParseError> {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let expr = self.nested(Self::parse_or)?;
                self.expect(')')?;
                Ok(expr)
            }
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                let start = self.pos;
                let ident = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                self.expect('(')?;
                let argument = self.parse_argument()?;
                self.expect(')')?;
                self.primitive(ident, argument, start)
            }
            Some(_) => Err(self.error("expected a primitive, `!` or `(`")),
            None => Err(self.error("unexpected end of input")),
        }
    }

    fn parse_argument(&mut self) -> Result<Option<usize>, ExprParseError> {
        self.skip_ws();
        let digits = self.take_while(|c| c.is_ascii_digit());
        if digits.is_empty() {
            return Ok(None);
        }
        digits
            .parse()
            .map(Some)
            .map_err(|_| self.error("number out of range"))
    }

    fn primitive(&self, ident: &str, argument: Option<usize>, start: usize) -> Result<Expr, ExprParseError> {
        let at = |message: String| ExprParseError {
            position: start,
            message,
        };
        let expr = match ident {
            "always" => Expr::Always,
            "unsynced" => Expr::Unsynced,
            "missing" => Expr::Missing,
            "any_parent_updated" => Expr::AnyParentUpdated,
            "all_parents_updated" => Expr::AllParentsUpdated,
            "latest" => {
                return argument
                    .map(Expr::Latest)
                    .ok_or_else(|| at("`latest` takes a window count".to_string()));
            }
            other => return Err(at(format!("unknown primitive `{other}`"))),
        };
        match argument {
            Some(_) => Err(at(format!("`{ident}` takes no argument"))),
            None => Ok(expr),
        }
    }
}
