//! Evaluation of bound filter expressions against one calculation item

use std::cmp::Ordering;

use super::parser::{CompareOp, Expr};
use crate::model::FieldValue;
use crate::relationship::FieldRef;

fn ordering(a: &FieldValue, b: &FieldValue) -> Option<Ordering> {
    match (a, b) {
        (FieldValue::Text(x), FieldValue::Text(y)) => Some(x.to_lowercase().cmp(&y.to_lowercase())),
        (x, y) if x.same_family(y) => Some(x.total_cmp(y)),
        _ => None,
    }
}

fn compare(value: &FieldValue, op: CompareOp, literal: &FieldValue) -> bool {
    // blank reads as null; null only ever matches `= null` / `!= null`
    if literal.is_null() {
        return match op {
            CompareOp::Eq => value.is_blank(),
            CompareOp::Ne => !value.is_blank(),
            _ => false,
        };
    }
    if value.is_blank() {
        return false;
    }
    let Some(ord) = ordering(value, literal) else {
        return false;
    };
    match op {
        CompareOp::Eq => ord == Ordering::Equal,
        CompareOp::Ne => ord != Ordering::Equal,
        CompareOp::Lt => ord == Ordering::Less,
        CompareOp::Le => ord != Ordering::Greater,
        CompareOp::Gt => ord == Ordering::Greater,
        CompareOp::Ge => ord != Ordering::Less,
    }
}

/// SQL LIKE with `%` and `_`, case-insensitive
pub fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // matched[j]: pattern[..j] matches text[..i] for the current i
    let mut matched = vec![false; pattern.len() + 1];
    matched[0] = true;
    for j in 1..=pattern.len() {
        matched[j] = matched[j - 1] && pattern[j - 1] == '%';
    }

    for &c in &text {
        let mut next = vec![false; pattern.len() + 1];
        for j in 1..=pattern.len() {
            next[j] = match pattern[j - 1] {
                '%' => next[j - 1] || matched[j],
                '_' => matched[j - 1],
                p => matched[j - 1] && p == c,
            };
        }
        matched = next;
    }
    matched[pattern.len()]
}

/// Evaluate `expr`, reading field values through `lookup`
pub fn evaluate<L>(expr: &Expr<FieldRef>, lookup: &mut L) -> bool
where
    L: FnMut(&FieldRef) -> FieldValue,
{
    match expr {
        Expr::And(a, b) => evaluate(a, lookup) && evaluate(b, lookup),
        Expr::Or(a, b) => evaluate(a, lookup) || evaluate(b, lookup),
        Expr::Not(e) => !evaluate(e, lookup),
        Expr::Compare { field, op, value } => compare(&lookup(field), *op, value),
        Expr::Like {
            field,
            pattern,
            negated,
        } => match lookup(field).as_text() {
            Some(text) if !text.is_empty() => like_match(&text, pattern) != *negated,
            _ => false,
        },
        Expr::In {
            field,
            values,
            negated,
        } => {
            let value = lookup(field);
            if value.is_blank() {
                // `IN (null)` is the only way a blank value is in a list
                return !*negated && values.iter().any(FieldValue::is_null);
            }
            let found = values
                .iter()
                .any(|lit| !lit.is_null() && ordering(&value, lit) == Some(Ordering::Equal));
            found != *negated
        }
    }
}
