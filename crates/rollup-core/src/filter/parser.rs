//! Filter parser built on the pest grammar in `grammar.pest`

use pest::iterators::Pair;
use pest::Parser as PestParser;
use pest_derive::Parser;

use crate::errors::{Result, RollupError};
use crate::model::value::{parse_decimal, parse_temporal};
use crate::model::FieldValue;

#[derive(Parser)]
#[grammar = "filter/grammar.pest"]
struct FilterParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Filter expression over field references of type `F`
///
/// Parsing yields `Expr<String>`; binding against a schema turns the field
/// names into resolved accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr<F> {
    And(Box<Expr<F>>, Box<Expr<F>>),
    Or(Box<Expr<F>>, Box<Expr<F>>),
    Not(Box<Expr<F>>),
    Compare {
        field: F,
        op: CompareOp,
        value: FieldValue,
    },
    Like {
        field: F,
        pattern: String,
        negated: bool,
    },
    In {
        field: F,
        values: Vec<FieldValue>,
        negated: bool,
    },
}

impl<F> Expr<F> {
    /// Replace every field reference, failing on the first error
    ///
    /// The callback receives the field and the literals compared against it
    /// and returns the new field plus the (possibly coerced) literals.
    pub fn try_map<G, E>(
        self,
        f: &mut impl FnMut(F, &[&FieldValue]) -> std::result::Result<(G, Vec<FieldValue>), E>,
    ) -> std::result::Result<Expr<G>, E> {
        Ok(match self {
            Expr::And(a, b) => Expr::And(Box::new(a.try_map(f)?), Box::new(b.try_map(f)?)),
            Expr::Or(a, b) => Expr::Or(Box::new(a.try_map(f)?), Box::new(b.try_map(f)?)),
            Expr::Not(e) => Expr::Not(Box::new(e.try_map(f)?)),
            Expr::Compare { field, op, value } => {
                let (field, mut values) = f(field, &[&value])?;
                Expr::Compare {
                    field,
                    op,
                    value: values.pop().unwrap_or(FieldValue::Null),
                }
            }
            Expr::Like {
                field,
                pattern,
                negated,
            } => {
                let (field, _) = f(field, &[])?;
                Expr::Like {
                    field,
                    pattern,
                    negated,
                }
            }
            Expr::In {
                field,
                values,
                negated,
            } => {
                let refs: Vec<&FieldValue> = values.iter().collect();
                let (field, values) = f(field, &refs)?;
                Expr::In {
                    field,
                    values,
                    negated,
                }
            }
        })
    }

    /// Every field reference in evaluation order
    pub fn fields(&self) -> Vec<&F> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a F>) {
        match self {
            Expr::And(a, b) | Expr::Or(a, b) => {
                a.collect_fields(out);
                b.collect_fields(out);
            }
            Expr::Not(e) => e.collect_fields(out),
            Expr::Compare { field, .. } | Expr::Like { field, .. } | Expr::In { field, .. } => {
                out.push(field)
            }
        }
    }
}

/// Clause separator; separated clauses are ANDed
pub const CLAUSE_SEPARATOR: &str = "|||";

pub(crate) fn filter_error(source: &str, position: usize, reason: impl Into<String>) -> RollupError {
    RollupError::InvalidFilter {
        filter: source.to_string(),
        position,
        reason: reason.into(),
    }
}

/// Walks the pairs of one clause; positions are shifted by the clause offset
struct ClauseBuilder<'s> {
    source: &'s str,
    offset: usize,
}

impl ClauseBuilder<'_> {
    fn error(&self, pair: &Pair<'_, Rule>, reason: impl Into<String>) -> RollupError {
        filter_error(self.source, self.offset + pair.as_span().start(), reason)
    }

    fn parse_or_expr(&self, pair: Pair<'_, Rule>) -> Result<Expr<String>> {
        let mut left: Option<Expr<String>> = None;
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::and_expr {
                let right = self.parse_and_expr(inner)?;
                left = Some(match left {
                    Some(l) => Expr::Or(Box::new(l), Box::new(right)),
                    None => right,
                });
            }
        }
        left.ok_or_else(|| filter_error(self.source, self.offset, "empty expression"))
    }

    fn parse_and_expr(&self, pair: Pair<'_, Rule>) -> Result<Expr<String>> {
        let mut left: Option<Expr<String>> = None;
        for inner in pair.into_inner() {
            if inner.as_rule() == Rule::unary_expr {
                let right = self.parse_unary_expr(inner)?;
                left = Some(match left {
                    Some(l) => Expr::And(Box::new(l), Box::new(right)),
                    None => right,
                });
            }
        }
        left.ok_or_else(|| filter_error(self.source, self.offset, "empty expression"))
    }

    fn parse_unary_expr(&self, pair: Pair<'_, Rule>) -> Result<Expr<String>> {
        let span_start = pair.as_span().start();
        let inner = pair
            .into_inner()
            .next()
            .ok_or_else(|| filter_error(self.source, self.offset + span_start, "expected a predicate"))?;
        match inner.as_rule() {
            Rule::not_expr => {
                let operand = inner
                    .into_inner()
                    .find(|p| p.as_rule() == Rule::unary_expr)
                    .ok_or_else(|| filter_error(self.source, self.offset + span_start, "expected an operand after NOT"))?;
                Ok(Expr::Not(Box::new(self.parse_unary_expr(operand)?)))
            }
            Rule::or_expr => self.parse_or_expr(inner),
            Rule::like_expr => self.parse_like_expr(inner),
            Rule::in_expr => self.parse_in_expr(inner),
            Rule::compare_expr => self.parse_compare_expr(inner),
            _ => Err(self.error(&inner, "expected a predicate")),
        }
    }

    fn parse_like_expr(&self, pair: Pair<'_, Rule>) -> Result<Expr<String>> {
        let mut field = String::new();
        let mut pattern = String::new();
        let mut negated = false;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::field => field = inner.as_str().to_string(),
                Rule::not_kw => negated = true,
                Rule::string => pattern = unescape(inner),
                _ => {}
            }
        }
        Ok(Expr::Like {
            field,
            pattern,
            negated,
        })
    }

    fn parse_in_expr(&self, pair: Pair<'_, Rule>) -> Result<Expr<String>> {
        let mut field = String::new();
        let mut values = Vec::new();
        let mut negated = false;
        for inner in pair.into_inner() {
            match inner.as_rule() {
                Rule::field => field = inner.as_str().to_string(),
                Rule::not_kw => negated = true,
                Rule::in_kw => {}
                _ => values.push(self.parse_value(inner)?),
            }
        }
        Ok(Expr::In {
            field,
            values,
            negated,
        })
    }

    fn parse_compare_expr(&self, pair: Pair<'_, Rule>) -> Result<Expr<String>> {
        let mut inner = pair.into_inner();
        let (Some(field_pair), Some(op_pair), Some(value_pair)) = (inner.next(), inner.next(), inner.next()) else {
            return Err(filter_error(self.source, self.offset, "incomplete comparison"));
        };
        let op = match op_pair.as_str() {
            "=" => CompareOp::Eq,
            "!=" | "<>" => CompareOp::Ne,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::Le,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::Ge,
            other => return Err(self.error(&op_pair, format!("unknown operator '{other}'"))),
        };
        Ok(Expr::Compare {
            field: field_pair.as_str().to_string(),
            op,
            value: self.parse_value(value_pair)?,
        })
    }

    fn parse_value(&self, pair: Pair<'_, Rule>) -> Result<FieldValue> {
        match pair.as_rule() {
            Rule::string => Ok(FieldValue::Text(unescape(pair))),
            Rule::boolean => Ok(FieldValue::Boolean(pair.as_str().eq_ignore_ascii_case("true"))),
            Rule::null => Ok(FieldValue::Null),
            Rule::number => parse_decimal(pair.as_str())
                .map(FieldValue::Number)
                .ok_or_else(|| self.error(&pair, format!("malformed number '{}'", pair.as_str()))),
            Rule::date | Rule::datetime => match parse_temporal(pair.as_str()) {
                FieldValue::Null => Err(self.error(&pair, format!("malformed date '{}'", pair.as_str()))),
                temporal => Ok(temporal),
            },
            _ => Err(self.error(&pair, "expected a literal")),
        }
    }
}

/// Text of a quoted literal with `\x` and doubled-quote escapes resolved
fn unescape(pair: Pair<'_, Rule>) -> String {
    let Some(inner) = pair.into_inner().next() else {
        return String::new();
    };
    let quote = if inner.as_rule() == Rule::double_inner { '"' } else { '\'' };
    let mut text = String::new();
    let mut chars = inner.as_str().chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => text.extend(chars.next()),
            c if c == quote && chars.peek() == Some(&quote) => {
                chars.next();
                text.push(quote);
            }
            c => text.push(c),
        }
    }
    text
}

fn parse_clause(source: &str, clause: &str, offset: usize) -> Result<Expr<String>> {
    let mut pairs = FilterParser::parse(Rule::clause, clause).map_err(|e| {
        let position = match e.location {
            pest::error::InputLocation::Pos(p) => p,
            pest::error::InputLocation::Span((s, _)) => s,
        };
        filter_error(source, offset + position, e.variant.message())
    })?;
    let root = pairs
        .next()
        .and_then(|clause| clause.into_inner().find(|p| p.as_rule() == Rule::or_expr))
        .ok_or_else(|| filter_error(source, offset, "empty clause"))?;
    ClauseBuilder { source, offset }.parse_or_expr(root)
}

/// Parse a filter string; returns `None` when it is blank
///
/// # Errors
///
/// Returns `RollupError::InvalidFilter` with the byte offset of the problem.
pub fn parse(source: &str) -> Result<Option<Expr<String>>> {
    let mut combined: Option<Expr<String>> = None;
    let mut offset = 0;
    for clause in source.split(CLAUSE_SEPARATOR) {
        if !clause.trim().is_empty() {
            let expr = parse_clause(source, clause, offset)?;
            combined = Some(match combined {
                Some(prev) => Expr::And(Box::new(prev), Box::new(expr)),
                None => expr,
            });
        }
        offset += clause.len() + CLAUSE_SEPARATOR.len();
    }
    Ok(combined)
}
