use std::cmp::Ordering;

use crate::{
    data::{Cell, parse_number},
    error::{ReconError, ReconResult},
    table::Table,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOperator {
    Eq,
    NotEq,
    Gt,
    Ge,
    Lt,
    Le,
    Contains,
    StartsWith,
    EndsWith,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterCondition {
    pub column: String,
    pub operator: ComparisonOperator,
    pub raw_value: String,
}

pub fn parse_filters(filters: &[String]) -> ReconResult<Vec<FilterCondition>> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

fn parse_filter(filter: &str) -> ReconResult<FilterCondition> {
    let trimmed = filter.trim();
    let invalid = || ReconError::InvalidFilterExpression {
        expression: trimmed.to_string(),
    };
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let lowered = trimmed.to_ascii_lowercase();
    for (needle, op) in [
        (" contains ", ComparisonOperator::Contains),
        (" startswith ", ComparisonOperator::StartsWith),
        (" endswith ", ComparisonOperator::EndsWith),
    ] {
        if let Some(idx) = lowered.find(needle) {
            let (left, right_with_space) = trimmed.split_at(idx);
            let right = right_with_space[needle.len()..].trim();
            return build(left, op, right).ok_or_else(invalid);
        }
    }

    for (needle, op) in [
        ("!=", ComparisonOperator::NotEq),
        (">=", ComparisonOperator::Ge),
        ("<=", ComparisonOperator::Le),
        ("=", ComparisonOperator::Eq),
        (">", ComparisonOperator::Gt),
        ("<", ComparisonOperator::Lt),
    ] {
        if let Some(idx) = trimmed.find(needle) {
            let left = &trimmed[..idx];
            let right = &trimmed[idx + needle.len()..];
            return build(left, op, right.trim()).ok_or_else(invalid);
        }
    }

    Err(invalid())
}

fn build(column: &str, operator: ComparisonOperator, value: &str) -> Option<FilterCondition> {
    let column = column.trim();
    if column.is_empty() {
        return None;
    }
    Some(FilterCondition {
        column: column.to_string(),
        operator,
        raw_value: unquote(value).to_string(),
    })
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}

pub fn bind_conditions<'a>(
    conditions: &'a [FilterCondition],
    table: &Table,
) -> ReconResult<Vec<(usize, &'a FilterCondition)>> {
    conditions
        .iter()
        .map(|condition| {
            table
                .column_index(&condition.column)
                .map(|idx| (idx, condition))
                .ok_or_else(|| ReconError::UnknownFilterColumn {
                    column: condition.column.clone(),
                })
        })
        .collect()
}

pub fn evaluate_condition(condition: &FilterCondition, cell: &Cell) -> bool {
    use ComparisonOperator::*;
    let needle = condition.raw_value.as_str();
    match condition.operator {
        Contains | StartsWith | EndsWith => {
            let raw = cell.as_display();
            match condition.operator {
                Contains => raw.contains(needle),
                StartsWith => raw.starts_with(needle),
                _ => raw.ends_with(needle),
            }
        }
        Eq | NotEq | Gt | Ge | Lt | Le => {
            let ordering = match cell.key_text() {
                None if needle.is_empty() => Some(Ordering::Equal),
                None => None,
                Some(text) => Some(compare_values(&text, needle)),
            };
            match ordering {
                Some(ord) => match condition.operator {
                    Eq => ord == Ordering::Equal,
                    NotEq => ord != Ordering::Equal,
                    Gt => ord == Ordering::Greater,
                    Ge => ord != Ordering::Less,
                    Lt => ord == Ordering::Less,
                    _ => ord != Ordering::Greater,
                },
                None => matches!(condition.operator, NotEq),
            }
        }
    }
}

fn compare_values(left: &str, right: &str) -> Ordering {
    match (parse_number(left), parse_number(right)) {
        (Some(l), Some(r)) => l.total_cmp(&r),
        _ => left.cmp(right),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(expr: &str) -> FilterCondition {
        parse_filter(expr).expect("parse filter")
    }

    #[test]
    fn parses_operators_and_quotes() {
        let parsed = cond("工站 != '包裝'");
        assert_eq!(parsed.column, "工站");
        assert_eq!(parsed.operator, ComparisonOperator::NotEq);
        assert_eq!(parsed.raw_value, "包裝");

        let parsed = cond("姓名 startswith 王");
        assert_eq!(parsed.operator, ComparisonOperator::StartsWith);
        assert!(parse_filter("   ").is_err());
        assert!(parse_filter("=5").is_err());
    }

    #[test]
    fn numeric_values_compare_numerically() {
        let ge = cond("實際產出 >= 100");
        assert!(evaluate_condition(&ge, &Cell::text("250")));
        assert!(!evaluate_condition(&ge, &Cell::text("99.5")));
        assert!(evaluate_condition(&ge, &Cell::Number(100.0)));
    }

    #[test]
    fn missing_cells_only_satisfy_not_equal() {
        assert!(evaluate_condition(&cond("工站 != A"), &Cell::Missing));
        assert!(!evaluate_condition(&cond("工站 = A"), &Cell::Missing));
        assert!(!evaluate_condition(&cond("實際產出 > 1"), &Cell::Missing));
    }

    #[test]
    fn binding_rejects_unknown_columns() {
        let table = Table::with_columns(&["工站"]);
        let conditions = vec![cond("姓名 = 王")];
        assert!(matches!(
            bind_conditions(&conditions, &table),
            Err(ReconError::UnknownFilterColumn { .. })
        ));
    }
}
