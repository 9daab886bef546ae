//! Metadata predicate tree and its backend-independent compiler.
//!
//! Generalizes a flat filter struct into a recursive `And`/`Or`/`Cmp` tree
//! over dotted JSON paths. The compiled form never inlines user-supplied
//! values into a query string; values are retained as bound parameters and
//! only ever compared against in memory or handed to a backend's own
//! parameter-binding API (`docsearch-sqlite`'s `vector_index::scan`
//! evaluates it in-process against each scanned row's metadata).

use serde_json::Value;

use crate::error::{StoreError, StoreResult};

/// Comparison operator for a `Cmp` leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    In,
    NotIn,
    Contains,
    StartsWith,
}

/// The predicate tree as supplied by a caller.
#[derive(Debug, Clone)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Cmp {
        path: String,
        op: CompareOp,
        value: Value,
    },
}

/// A validated, evaluatable predicate. The only way to obtain one is
/// [`compile`]; an `Expr` that fails validation never becomes a
/// `CompiledPredicate`.
#[derive(Debug, Clone)]
pub enum CompiledPredicate {
    And(Vec<CompiledPredicate>),
    Or(Vec<CompiledPredicate>),
    Cmp {
        path: Vec<String>,
        op: CompareOp,
        value: Value,
    },
    /// Reduction of an empty `And`/`Or` to a constant.
    Const(bool),
}

/// Compile a predicate tree, validating every leaf.
///
/// Fails with `InvalidPredicate` on: an empty `in`/`not_in` list, a dotted
/// path deeper than `max_depth`, or (structurally impossible via the `Expr`
/// enum, but checked defensively) an unrecognised operator.
pub fn compile(expr: &Expr, max_depth: usize) -> StoreResult<CompiledPredicate> {
    match expr {
        Expr::And(children) => {
            if children.is_empty() {
                return Ok(CompiledPredicate::Const(true));
            }
            let compiled = children
                .iter()
                .map(|c| compile(c, max_depth))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(CompiledPredicate::And(compiled))
        }
        Expr::Or(children) => {
            if children.is_empty() {
                return Ok(CompiledPredicate::Const(false));
            }
            let compiled = children
                .iter()
                .map(|c| compile(c, max_depth))
                .collect::<StoreResult<Vec<_>>>()?;
            Ok(CompiledPredicate::Or(compiled))
        }
        Expr::Cmp { path, op, value } => {
            let segments: Vec<String> = path.split('.').map(str::to_owned).collect();
            if segments.is_empty() || segments.iter().any(String::is_empty) {
                return Err(StoreError::invalid_predicate(format!(
                    "malformed path: {path:?}"
                )));
            }
            if segments.len() > max_depth {
                return Err(StoreError::invalid_predicate(format!(
                    "path {path:?} exceeds max depth {max_depth}"
                )));
            }
            match op {
                CompareOp::In | CompareOp::NotIn => {
                    let len = value.as_array().map(Vec::len).unwrap_or(0);
                    if len == 0 {
                        return Err(StoreError::invalid_predicate(format!(
                            "{path:?}: in/not_in requires a non-empty array"
                        )));
                    }
                }
                _ => {}
            }
            Ok(CompiledPredicate::Cmp {
                path: segments,
                op: *op,
                value: value.clone(),
            })
        }
    }
}

/// Number of `Cmp` leaves in a compiled predicate; used for diagnostics and
/// to mirror the teacher's `active_filter_count` helper.
#[must_use]
pub fn active_filter_count(predicate: &CompiledPredicate) -> usize {
    match predicate {
        CompiledPredicate::Const(_) => 0,
        CompiledPredicate::Cmp { .. } => 1,
        CompiledPredicate::And(children) | CompiledPredicate::Or(children) => {
            children.iter().map(active_filter_count).sum()
        }
    }
}

#[must_use]
pub fn has_active_filters(predicate: &CompiledPredicate) -> bool {
    active_filter_count(predicate) > 0
}

fn lookup<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match op {
        CompareOp::Eq => actual == expected,
        CompareOp::Ne => actual != expected,
        CompareOp::Gt | CompareOp::Ge | CompareOp::Lt | CompareOp::Le => {
            match (actual.as_f64(), expected.as_f64()) {
                (Some(a), Some(b)) => match op {
                    CompareOp::Gt => a > b,
                    CompareOp::Ge => a >= b,
                    CompareOp::Lt => a < b,
                    CompareOp::Le => a <= b,
                    _ => unreachable!(),
                },
                _ => false,
            }
        }
        CompareOp::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|v| v == actual)),
        CompareOp::NotIn => expected
            .as_array()
            .is_none_or(|items| !items.iter().any(|v| v == actual)),
        CompareOp::Contains => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => a.contains(b),
            _ => false,
        },
        CompareOp::StartsWith => match (actual.as_str(), expected.as_str()) {
            (Some(a), Some(b)) => a.starts_with(b),
            _ => false,
        },
    }
}

/// Evaluate a compiled predicate in memory against a document's metadata map.
#[must_use]
pub fn evaluate(predicate: &CompiledPredicate, metadata: &Value) -> bool {
    match predicate {
        CompiledPredicate::Const(b) => *b,
        CompiledPredicate::And(children) => children.iter().all(|c| evaluate(c, metadata)),
        CompiledPredicate::Or(children) => children.iter().any(|c| evaluate(c, metadata)),
        CompiledPredicate::Cmp { path, op, value } => match lookup(metadata, path) {
            Some(actual) => compare(actual, *op, value),
            None => false,
        },
    }
}
