use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    columns,
    error::{ReconError, ReconResult},
    table::Table,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMapping {
    renames: Vec<Rename>,
}

impl SchemaMapping {
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        Self {
            renames: pairs
                .into_iter()
                .map(|(from, to)| Rename {
                    from: from.into(),
                    to: to.into(),
                })
                .collect(),
        }
    }

    pub fn labor_default() -> Self {
        Self::new([("作業時間", columns::STANDARD_WORK), ("工作內容", columns::STATION)])
    }

    pub fn output_default() -> Self {
        Self::new([
            ("產出", columns::ACTUAL_OUTPUT),
            ("RUN總時數", columns::OPERATING_HOURS),
        ])
    }

    pub fn merged_default() -> Self {
        Self::new([(columns::STANDARD_WORK, columns::STANDARD_CT)])
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.renames
            .iter()
            .map(|r| (r.from.as_str(), r.to.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

pub fn normalize(table: &Table, mapping: &SchemaMapping) -> ReconResult<Table> {
    let mut renamed = table.clone();
    for (from, to) in mapping.pairs() {
        let Some(idx) = renamed.column_index(from) else {
            continue;
        };
        if from == to {
            continue;
        }
        if renamed.has_column(to) {
            return Err(ReconError::NamingConflict {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        debug!("Renaming column '{from}' -> '{to}'");
        renamed.rename_column(idx, to);
    }
    Ok(renamed.map_cells(|cell| cell.cleaned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;

    fn labor_table() -> Table {
        Table::from_rows(
            vec!["料號".into(), "作業時間".into(), "工作內容".into()],
            vec![vec![Cell::text(" P1 "), Cell::text("30"), Cell::text("  ")]],
        )
    }

    #[test]
    fn renames_present_columns_only() {
        let normalized = normalize(&labor_table(), &SchemaMapping::labor_default()).unwrap();
        assert_eq!(
            normalized.headers(),
            &["料號".to_string(), "標工".to_string(), "工站".to_string()]
        );
        let untouched = normalize(&labor_table(), &SchemaMapping::output_default()).unwrap();
        assert_eq!(untouched.headers(), labor_table().headers());
    }

    #[test]
    fn cleans_text_cells() {
        let normalized = normalize(&labor_table(), &SchemaMapping::labor_default()).unwrap();
        assert_eq!(normalized.cell(0, 0), &Cell::text("P1"));
        assert_eq!(normalized.cell(0, 2), &Cell::Missing);
    }

    #[test]
    fn conflicting_target_is_rejected() {
        let table = Table::from_rows(vec!["作業時間".into(), "標工".into()], vec![]);
        let err = normalize(&table, &SchemaMapping::labor_default()).unwrap_err();
        assert!(matches!(err, ReconError::NamingConflict { ref to, .. } if to == "標工"));
    }

    #[test]
    fn input_is_left_untouched() {
        let table = labor_table();
        let before = table.clone();
        let _ = normalize(&table, &SchemaMapping::labor_default()).unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn normalizing_twice_is_a_fixed_point() {
        let mapping = SchemaMapping::labor_default();
        let once = normalize(&labor_table(), &mapping).unwrap();
        let twice = normalize(&once, &mapping).unwrap();
        assert_eq!(once, twice);
    }
}
