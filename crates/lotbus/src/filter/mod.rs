// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Content filters.
//!
//! SQL-like predicates over the fields of a topic schema.
//!
//! # Supported Syntax
//!
//! ```text
//! expression ::= term { OR term }
//! term       ::= factor { AND factor }
//! factor     ::= NOT factor | '(' expression ')' | comparison
//! comparison ::= operand operator operand
//! operator   ::= '=' | '==' | '<>' | '!=' | '>' | '<' | '>=' | '<='
//! operand    ::= field | parameter | literal
//! parameter  ::= '%' digit+
//! literal    ::= integer | float | 'string' | "string" | TRUE | FALSE
//! ```
//!
//! Keywords are case-insensitive.
//!
//! # Example
//!
//! ```ignore
//! let filter = ContentFilter::compile(&topic, "degrees > %0 or degrees < %1", vec!["32".into(), "30".into()])?;
//! assert!(filter.matches(&sample));
//! ```

mod evaluator;
mod parser;

pub use parser::{parse_expression, Expression, Operand, Operator};

use crate::error::Result;
use crate::schema::Sample;
use crate::topic::Topic;
use evaluator::Predicate;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Compiled predicate bound to a topic, with rebindable parameters.
///
/// Clones share their parameter table: [`ContentFilter::set_parameters`] on
/// one clone is seen by every reader using any clone.
#[derive(Clone)]
pub struct ContentFilter {
    topic: Arc<str>,
    expression: Arc<str>,
    predicate: Arc<Predicate>,
    parameters: Arc<RwLock<Vec<String>>>,
    name: Option<String>,
}

impl ContentFilter {
    /// Parse `expression` and bind its field references to `topic`'s schema.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFilterSyntax`](crate::Error::InvalidFilterSyntax) on a
    /// malformed expression or a field the schema does not declare.
    pub fn compile(topic: &Topic, expression: &str, parameters: Vec<String>) -> Result<Self> {
        let parsed = parse_expression(expression)?;
        let predicate = Predicate::bind(&parsed, topic.schema())?;

        let mut max_parameter: Option<usize> = None;
        parsed.for_each_operand(&mut |operand| {
            if let Operand::Parameter(idx) = operand {
                max_parameter = max_parameter.max(Some(*idx));
            }
        });
        if let Some(max) = max_parameter {
            if max >= parameters.len() {
                log::debug!(
                    "[filter] '{}' references %{} but only {} parameter(s) bound",
                    expression,
                    max,
                    parameters.len()
                );
            }
        }

        Ok(Self {
            topic: topic.name_arc(),
            expression: Arc::from(expression),
            predicate: Arc::new(predicate),
            parameters: Arc::new(RwLock::new(parameters)),
            name: None,
        })
    }

    /// Attach a name, used in log lines.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Filter name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Topic this filter was compiled against.
    pub fn topic_name(&self) -> &str {
        &self.topic
    }

    /// Source expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Current parameter values.
    pub fn parameters(&self) -> Vec<String> {
        self.parameters.read().clone()
    }

    /// Rebind the positional parameters; applies from the next evaluation.
    pub fn set_parameters(&self, params: Vec<String>) {
        *self.parameters.write() = params;
    }

    /// Evaluate against `sample`, reporting evaluation failures.
    pub fn try_matches(&self, sample: &Sample) -> core::result::Result<bool, FilterError> {
        let params = self.parameters.read();
        self.predicate.evaluate(sample, &params)
    }

    /// Evaluate against `sample`; a failed evaluation counts as no match.
    pub fn matches(&self, sample: &Sample) -> bool {
        match self.try_matches(sample) {
            Ok(hit) => hit,
            Err(e) => {
                log::debug!(
                    "[filter] '{}' on {} failed: {}",
                    self.name.as_deref().unwrap_or(&self.expression),
                    self.topic,
                    e
                );
                false
            }
        }
    }
}

impl fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentFilter")
            .field("topic", &self.topic)
            .field("expression", &self.expression)
            .field("parameters", &*self.parameters.read())
            .field("name", &self.name)
            .finish()
    }
}

/// Errors raised while parsing or evaluating a filter.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Malformed expression.
    #[error("Parse error: {0}")]
    ParseError(String),
    /// Field name not declared in the topic schema.
    #[error("Unknown field: {0}")]
    UnknownField(String),
    /// `%N` with no bound parameter N.
    #[error("Parameter index out of range: %{0}")]
    ParameterOutOfRange(usize),
    /// Operands cannot be compared.
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    /// Blank expression.
    #[error("Empty filter expression")]
    EmptyExpression,
}
