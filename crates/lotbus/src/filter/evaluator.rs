// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Predicate binding and evaluation.
//!
//! A parsed [`Expression`] is bound once against a topic schema: field names
//! become schema positions and literals become [`FieldValue`]s. Parameters
//! stay symbolic and are resolved on every evaluation.

use super::parser::{Expression, Operand, Operator};
use super::FilterError;
use crate::schema::{FieldValue, Sample, Schema};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Term {
    Const(FieldValue),
    Param(usize),
    Field(usize),
}

/// Expression bound to a schema, ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Compare { left: Term, op: Operator, right: Term },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    /// Resolve field names against `schema`.
    pub(crate) fn bind(expr: &Expression, schema: &Schema) -> Result<Self, FilterError> {
        Ok(match expr {
            // `30 < degrees` is stored as `degrees > 30`.
            Expression::Comparison { left, op, right }
                if !matches!(left, Operand::Field(_)) && matches!(right, Operand::Field(_)) =>
            {
                Predicate::Compare {
                    left: bind_operand(right, schema)?,
                    op: op.flipped(),
                    right: bind_operand(left, schema)?,
                }
            }
            Expression::Comparison { left, op, right } => Predicate::Compare {
                left: bind_operand(left, schema)?,
                op: *op,
                right: bind_operand(right, schema)?,
            },
            Expression::And(a, b) => Predicate::And(
                Box::new(Self::bind(a, schema)?),
                Box::new(Self::bind(b, schema)?),
            ),
            Expression::Or(a, b) => Predicate::Or(
                Box::new(Self::bind(a, schema)?),
                Box::new(Self::bind(b, schema)?),
            ),
            Expression::Not(inner) => Predicate::Not(Box::new(Self::bind(inner, schema)?)),
        })
    }

    /// Evaluate against a sample; AND/OR short-circuit left to right.
    pub(crate) fn evaluate(&self, sample: &Sample, params: &[String]) -> Result<bool, FilterError> {
        match self {
            Predicate::Compare { left, op, right } => {
                let l = resolve(left, sample, params)?;
                let r = resolve(right, sample, params)?;
                compare(&l, *op, &r)
            }
            Predicate::And(a, b) => Ok(a.evaluate(sample, params)? && b.evaluate(sample, params)?),
            Predicate::Or(a, b) => Ok(a.evaluate(sample, params)? || b.evaluate(sample, params)?),
            Predicate::Not(inner) => Ok(!inner.evaluate(sample, params)?),
        }
    }
}

fn bind_operand(operand: &Operand, schema: &Schema) -> Result<Term, FilterError> {
    Ok(match operand {
        Operand::Integer(n) => Term::Const(FieldValue::Integer(*n)),
        Operand::Float(f) => Term::Const(FieldValue::Float(*f)),
        Operand::String(s) => Term::Const(FieldValue::String(s.clone())),
        Operand::Boolean(b) => Term::Const(FieldValue::Boolean(*b)),
        Operand::Parameter(idx) => Term::Param(*idx),
        Operand::Field(name) => Term::Field(
            schema
                .field_index(name)
                .ok_or_else(|| FilterError::UnknownField(name.clone()))?,
        ),
    })
}

/// Interpret a parameter string.
///
/// `'quoted'` is always a string; otherwise integer, float, `TRUE`/`FALSE`,
/// then plain string are tried in that order.
pub(crate) fn parse_parameter(raw: &str) -> FieldValue {
    let text = raw.trim();
    if text.len() >= 2 && text.starts_with('\'') && text.ends_with('\'') {
        return FieldValue::String(text[1..text.len() - 1].to_string());
    }
    if let Ok(n) = text.parse::<i64>() {
        FieldValue::Integer(n)
    } else if let Ok(f) = text.parse::<f64>() {
        FieldValue::Float(f)
    } else if text.eq_ignore_ascii_case("true") {
        FieldValue::Boolean(true)
    } else if text.eq_ignore_ascii_case("false") {
        FieldValue::Boolean(false)
    } else {
        FieldValue::String(text.to_string())
    }
}

fn resolve(term: &Term, sample: &Sample, params: &[String]) -> Result<FieldValue, FilterError> {
    match term {
        Term::Const(v) => Ok(v.clone()),
        Term::Param(idx) => params
            .get(*idx)
            .map(|p| parse_parameter(p))
            .ok_or(FilterError::ParameterOutOfRange(*idx)),
        Term::Field(idx) => sample
            .get(*idx)
            .cloned()
            .ok_or_else(|| FilterError::TypeMismatch(format!("sample has no field #{}", idx))),
    }
}

fn order(left: &FieldValue, right: &FieldValue) -> Result<Ordering, FilterError> {
    use FieldValue as V;

    let ord = match (left, right) {
        (V::Integer(a), V::Integer(b)) => a.cmp(b),
        (V::Unsigned(a), V::Unsigned(b)) => a.cmp(b),
        (V::Integer(a), V::Unsigned(b)) => i128::from(*a).cmp(&i128::from(*b)),
        (V::Unsigned(a), V::Integer(b)) => i128::from(*a).cmp(&i128::from(*b)),
        (V::Float(_), V::Integer(_) | V::Unsigned(_) | V::Float(_))
        | (V::Integer(_) | V::Unsigned(_), V::Float(_)) => as_f64(left)
            .partial_cmp(&as_f64(right))
            .ok_or_else(|| FilterError::TypeMismatch("NaN in comparison".to_string()))?,
        (V::String(a), V::String(b)) => a.as_str().cmp(b.as_str()),
        (V::Boolean(a), V::Boolean(b)) => a.cmp(b),
        _ => {
            return Err(FilterError::TypeMismatch(format!(
                "cannot compare {:?} with {:?}",
                left, right
            )))
        }
    };
    Ok(ord)
}

fn as_f64(v: &FieldValue) -> f64 {
    match v {
        FieldValue::Integer(n) => *n as f64,
        FieldValue::Unsigned(n) => *n as f64,
        FieldValue::Float(f) => *f,
        _ => f64::NAN,
    }
}

fn compare(left: &FieldValue, op: Operator, right: &FieldValue) -> Result<bool, FilterError> {
    let ord = order(left, right)?;
    Ok(match op {
        Operator::Eq => ord == Ordering::Equal,
        Operator::Ne => ord != Ordering::Equal,
        Operator::Gt => ord == Ordering::Greater,
        Operator::Lt => ord == Ordering::Less,
        Operator::Ge => ord != Ordering::Less,
        Operator::Le => ord != Ordering::Greater,
    })
}
