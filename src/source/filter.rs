//! Row filter for table sources.
//!
//! A filter is a conjunction of `column <op> literal` predicates joined by
//! `AND` (any case), e.g. `country = 'IT' AND revenue >= 1000`. Literals may
//! be bare or quoted with `'` or `"`. Values that both parse as numbers are
//! compared numerically, everything else compares as text.

use std::cmp::Ordering;

use crate::error::{Result, SimSearchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn holds(self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: CompareOp,
    pub literal: String,
}

/// A parsed filter. An empty filter matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    pub predicates: Vec<Predicate>,
}

impl RowFilter {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }
        let predicates = split_conjunction(raw)
            .into_iter()
            .map(parse_predicate)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { predicates })
    }

    /// Columns the filter reads.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().map(|p| p.column.as_str())
    }

    /// Evaluate against a row; `value_of` resolves a column to its value.
    pub fn matches<'a>(&self, value_of: impl Fn(&str) -> Option<&'a str>) -> bool {
        self.predicates.iter().all(|p| match value_of(&p.column) {
            Some(v) => p.op.holds(compare(v, &p.literal)),
            None => false,
        })
    }
}

fn compare(value: &str, literal: &str) -> Ordering {
    let value = value.trim();
    match (value.parse::<f64>(), literal.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.total_cmp(&b),
        _ => value.cmp(literal),
    }
}

/// Split on `AND` keywords outside quotes.
fn split_conjunction(raw: &str) -> Vec<&str> {
    let bytes = raw.as_bytes();
    let mut parts = Vec::new();
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None => {
                let boundary_before = i == 0 || bytes[i - 1].is_ascii_whitespace();
                let is_and = i + 3 <= bytes.len() && bytes[i..i + 3].eq_ignore_ascii_case(b"and");
                let boundary_after = i + 3 == bytes.len() || bytes[i + 3].is_ascii_whitespace();
                if boundary_before && is_and && boundary_after {
                    parts.push(raw[start..i].trim());
                    start = i + 3;
                    i += 3;
                    continue;
                }
            }
        }
        i += 1;
    }
    parts.push(raw[start..].trim());
    parts
}

fn parse_predicate(raw: &str) -> Result<Predicate> {
    const OPS: &[(&str, CompareOp)] = &[
        ("!=", CompareOp::Ne),
        ("<>", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("=", CompareOp::Eq),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    let invalid = || SimSearchError::Validation(format!("invalid filter predicate: '{raw}'"));

    let (pos, token, op) = OPS
        .iter()
        .filter_map(|(token, op)| raw.find(token).map(|pos| (pos, *token, *op)))
        .min_by_key(|(pos, token, _)| (*pos, std::cmp::Reverse(token.len())))
        .ok_or_else(invalid)?;

    let column = raw[..pos].trim();
    let literal = unquote(raw[pos + token.len()..].trim());
    if column.is_empty() || column.contains(char::is_whitespace) {
        return Err(invalid());
    }
    let literal = literal.ok_or_else(invalid)?;
    Ok(Predicate {
        column: column.to_string(),
        op,
        literal,
    })
}

fn unquote(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    for q in ['\'', '"'] {
        if let Some(rest) = raw.strip_prefix(q) {
            return rest.strip_suffix(q).map(str::to_string);
        }
    }
    Some(raw.to_string())
}
