// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Request matching: paths to URI patterns and predicates to `vars`.
//!
//! The data plane matches `uris` with exact strings or a trailing `*` wildcard,
//! and evaluates `vars` as `[subject, op, value]` arrays (optionally negated
//! with `"!"` before the operator).

use crate::cache::ObjectKey;
use crate::crd::{
    ApisixRouteExpr, ExprOperator, ExprScope, HTTPPathMatch, HTTPValueMatch, PathMatchType,
    ValueMatchType,
};
use crate::errors::{TranslationError, TranslationReason};
use serde_json::{json, Value};

/// URIs and optional regex predicate for one path match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathMatch {
    pub uris: Vec<String>,
    pub var: Option<Value>,
}

/// `/p` matches `/p` and `/p/...` but never `/pxxx`; `/` matches everything.
#[must_use]
pub fn prefix_uris(prefix: &str) -> Vec<String> {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        vec!["/*".to_string()]
    } else {
        vec![trimmed.to_string(), format!("{trimmed}/*")]
    }
}

/// URIs of a Gateway API path match. Absent matches default to prefix `/`.
#[must_use]
pub fn http_path(path: Option<&HTTPPathMatch>) -> PathMatch {
    let (kind, value) = match path {
        Some(path) => (path.r#type, path.value.as_deref().unwrap_or("/")),
        None => (PathMatchType::PathPrefix, "/"),
    };
    match kind {
        PathMatchType::Exact => PathMatch {
            uris: vec![value.to_string()],
            var: None,
        },
        PathMatchType::PathPrefix => PathMatch {
            uris: prefix_uris(value),
            var: None,
        },
        PathMatchType::RegularExpression => regex_path(value),
    }
}

/// Match any URI and filter by regular expression.
#[must_use]
pub fn regex_path(pattern: &str) -> PathMatch {
    PathMatch {
        uris: vec!["/*".to_string()],
        var: Some(json!(["uri", "~~", pattern])),
    }
}

/// Variable holding a request header.
#[must_use]
pub fn header_var(name: &str) -> String {
    format!("http_{}", name.to_lowercase().replace('-', "_"))
}

fn value_match(subject: String, matcher: &HTTPValueMatch) -> Value {
    let op = match matcher.r#type {
        ValueMatchType::Exact => "==",
        ValueMatchType::RegularExpression => "~~",
    };
    json!([subject, op, matcher.value])
}

#[must_use]
pub fn header_match(matcher: &HTTPValueMatch) -> Value {
    value_match(header_var(&matcher.name), matcher)
}

#[must_use]
pub fn query_match(matcher: &HTTPValueMatch) -> Value {
    value_match(format!("arg_{}", matcher.name), matcher)
}

fn expr_subject(expr: &ApisixRouteExpr) -> String {
    let name = &expr.subject.name;
    match expr.subject.scope {
        ExprScope::Header => header_var(name),
        ExprScope::Query => format!("arg_{name}"),
        ExprScope::Cookie => format!("cookie_{name}"),
        ExprScope::Path => "uri".to_string(),
        ExprScope::Variable => name.clone(),
        ExprScope::PostArg => format!("post_arg_{name}"),
    }
}

/// Compile an `ApisixRoute` expression into a `vars` entry.
///
/// # Errors
///
/// Returns [`TranslationReason::InvalidField`] when the operand is missing.
pub fn expr_var(root: &ObjectKey, expr: &ApisixRouteExpr) -> Result<Value, TranslationError> {
    let subject = expr_subject(expr);
    let invalid = |message: &str| {
        TranslationError::new(
            root,
            TranslationReason::InvalidField {
                field: format!("exprs[{subject}]"),
                message: message.to_string(),
            },
        )
    };

    let (negated, op) = match expr.op {
        ExprOperator::Equal => (false, "=="),
        ExprOperator::NotEqual => (false, "~="),
        ExprOperator::GreaterThan => (false, ">"),
        ExprOperator::LessThan => (false, "<"),
        ExprOperator::In => (false, "in"),
        ExprOperator::NotIn => (true, "in"),
        ExprOperator::RegexMatch => (false, "~~"),
        ExprOperator::RegexMatchCaseInsensitive => (false, "~*"),
        ExprOperator::RegexNotMatch => (true, "~~"),
        ExprOperator::RegexNotMatchCaseInsensitive => (true, "~*"),
    };

    let operand = if op == "in" {
        if expr.set.is_empty() {
            return Err(invalid("set operators need a non-empty set"));
        }
        json!(expr.set)
    } else {
        match &expr.value {
            Some(value) => json!(value),
            None => return Err(invalid("value is required")),
        }
    };

    Ok(if negated {
        json!([subject, "!", op, operand])
    } else {
        json!([subject, op, operand])
    })
}

/// Escape regular expression metacharacters.
#[must_use]
pub fn escape_regex(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(
            c,
            '\\' | '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$'
        ) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
#[path = "matching_tests.rs"]
mod matching_tests;
