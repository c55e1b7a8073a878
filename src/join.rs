use std::{
    collections::{HashMap, HashSet},
    fmt,
    str::FromStr,
};

use clap::ValueEnum;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    data::Cell,
    error::{ReconError, ReconResult, Side},
    table::Table,
};

const KEY_SEPARATOR: &str = "\u{1f}";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum JoinMode {
    #[default]
    Inner,
    Left,
    Right,
    Outer,
}

impl JoinMode {
    fn keeps_unmatched_left(self) -> bool {
        matches!(self, JoinMode::Left | JoinMode::Outer)
    }

    fn keeps_unmatched_right(self) -> bool {
        matches!(self, JoinMode::Right | JoinMode::Outer)
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            JoinMode::Inner => "inner",
            JoinMode::Left => "left",
            JoinMode::Right => "right",
            JoinMode::Outer => "outer",
        };
        f.write_str(label)
    }
}

impl FromStr for JoinMode {
    type Err = ReconError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinMode::Inner),
            "left" => Ok(JoinMode::Left),
            "right" => Ok(JoinMode::Right),
            "outer" | "full" => Ok(JoinMode::Outer),
            other => Err(ReconError::invalid(
                "join.mode",
                format!("'{other}' is not one of inner, left, right, outer"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Suffixes {
    pub left: String,
    pub right: String,
}

impl Default for Suffixes {
    fn default() -> Self {
        Self {
            left: "_檔案1".to_string(),
            right: "_檔案2".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinOptions<'a> {
    pub keys: &'a [String],
    pub mode: JoinMode,
    pub suffixes: &'a Suffixes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinOutcome {
    pub table: Table,
    pub dropped_left: usize,
    pub dropped_right: usize,
    pub matched_pairs: usize,
    pub unmatched_left: usize,
    pub unmatched_right: usize,
}

impl JoinOutcome {
    pub fn dropped_rows(&self) -> usize {
        self.dropped_left + self.dropped_right
    }
}

// Output order: left rows in input order, each followed by its matches, then
// unmatched right rows.
pub fn join(left: &Table, right: &Table, options: &JoinOptions<'_>) -> ReconResult<JoinOutcome> {
    let keys = validate_keys(left, right, options.keys)?;
    let left_key_idx = key_indices(left, &keys);
    let right_key_idx = key_indices(right, &keys);

    let (left_rows, dropped_left) = keyed_rows(left, &left_key_idx);
    let (right_rows, dropped_right) = keyed_rows(right, &right_key_idx);
    if dropped_left > 0 || dropped_right > 0 {
        warn!(
            "Excluded {} left and {} right row(s) with missing key values",
            dropped_left, dropped_right
        );
    }

    let layout = OutputLayout::build(left, right, &left_key_idx, &right_key_idx, options.suffixes)?;
    let mut output = Table::new(layout.headers.clone());

    let mut right_lookup: HashMap<&str, Vec<usize>> = HashMap::new();
    for (pos, (key, _)) in right_rows.iter().enumerate() {
        right_lookup.entry(key.as_str()).or_default().push(pos);
    }
    let mut right_matched = vec![false; right_rows.len()];

    let mut matched_pairs = 0usize;
    let mut unmatched_left = 0usize;
    for (key, left_idx) in &left_rows {
        match right_lookup.get(key.as_str()) {
            Some(bucket) => {
                for &pos in bucket {
                    right_matched[pos] = true;
                    matched_pairs += 1;
                    output.push_row(layout.combine(
                        left,
                        Some(*left_idx),
                        right,
                        Some(right_rows[pos].1),
                    ));
                }
            }
            None => {
                unmatched_left += 1;
                if options.mode.keeps_unmatched_left() {
                    output.push_row(layout.combine(left, Some(*left_idx), right, None));
                }
            }
        }
    }

    let mut unmatched_right = 0usize;
    for (pos, (_, right_idx)) in right_rows.iter().enumerate() {
        if right_matched[pos] {
            continue;
        }
        unmatched_right += 1;
        if options.mode.keeps_unmatched_right() {
            output.push_row(layout.combine(left, None, right, Some(*right_idx)));
        }
    }

    info!(
        "Join ({}) on [{}]: {} output row(s), {} matched pair(s)",
        options.mode,
        keys.join(", "),
        output.len(),
        matched_pairs
    );
    debug!(
        "Unmatched rows: {} left, {} right",
        unmatched_left, unmatched_right
    );

    Ok(JoinOutcome {
        table: output,
        dropped_left,
        dropped_right,
        matched_pairs,
        unmatched_left,
        unmatched_right,
    })
}

fn validate_keys(left: &Table, right: &Table, keys: &[String]) -> ReconResult<Vec<String>> {
    let mut cleaned: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys.iter().map(|k| k.trim()).filter(|k| !k.is_empty()) {
        if !cleaned.iter().any(|existing| existing == key) {
            cleaned.push(key.to_string());
        }
    }
    if cleaned.is_empty() {
        return Err(ReconError::EmptyJoinKeys);
    }
    for key in &cleaned {
        if !left.has_column(key) {
            return Err(ReconError::MissingKeyColumn {
                column: key.clone(),
                side: Side::Left,
            });
        }
        if !right.has_column(key) {
            return Err(ReconError::MissingKeyColumn {
                column: key.clone(),
                side: Side::Right,
            });
        }
    }
    Ok(cleaned)
}

fn key_indices(table: &Table, keys: &[String]) -> Vec<usize> {
    keys.iter()
        .filter_map(|key| table.column_index(key))
        .collect()
}

fn keyed_rows(table: &Table, key_idx: &[usize]) -> (Vec<(String, usize)>, usize) {
    let mut keyed = Vec::with_capacity(table.len());
    let mut dropped = 0usize;
    'rows: for row in 0..table.len() {
        let mut parts = Vec::with_capacity(key_idx.len());
        for &col in key_idx {
            match table.cell(row, col).key_text() {
                Some(text) => parts.push(text),
                None => {
                    dropped += 1;
                    continue 'rows;
                }
            }
        }
        keyed.push((parts.join(KEY_SEPARATOR), row));
    }
    (keyed, dropped)
}

enum Source {
    Key { left: usize, right: usize },
    Left(usize),
    Right(usize),
}

struct OutputLayout {
    headers: Vec<String>,
    sources: Vec<Source>,
}

impl OutputLayout {
    fn build(
        left: &Table,
        right: &Table,
        left_key_idx: &[usize],
        right_key_idx: &[usize],
        suffixes: &Suffixes,
    ) -> ReconResult<Self> {
        let left_non_keys: Vec<&String> = left
            .headers()
            .iter()
            .enumerate()
            .filter(|(idx, _)| !left_key_idx.contains(idx))
            .map(|(_, name)| name)
            .collect();
        let right_non_keys: Vec<&String> = right
            .headers()
            .iter()
            .enumerate()
            .filter(|(idx, _)| !right_key_idx.contains(idx))
            .map(|(_, name)| name)
            .collect();

        let mut headers = Vec::with_capacity(left.width() + right.width());
        let mut sources = Vec::with_capacity(left.width() + right.width());

        for (idx, name) in left.headers().iter().enumerate() {
            if let Some(pos) = left_key_idx.iter().position(|k| *k == idx) {
                headers.push(name.clone());
                sources.push(Source::Key {
                    left: idx,
                    right: right_key_idx[pos],
                });
            } else if right_non_keys.contains(&name) {
                headers.push(format!("{name}{}", suffixes.left));
                sources.push(Source::Left(idx));
            } else {
                headers.push(name.clone());
                sources.push(Source::Left(idx));
            }
        }
        for (idx, name) in right.headers().iter().enumerate() {
            if right_key_idx.contains(&idx) {
                continue;
            }
            if left_non_keys.contains(&name) {
                headers.push(format!("{name}{}", suffixes.right));
            } else {
                headers.push(name.clone());
            }
            sources.push(Source::Right(idx));
        }

        let mut seen = HashSet::with_capacity(headers.len());
        if let Some(duplicate) = headers.iter().find(|name| !seen.insert(name.as_str())) {
            return Err(ReconError::DuplicateJoinColumn {
                column: duplicate.clone(),
            });
        }

        Ok(Self { headers, sources })
    }

    fn combine(
        &self,
        left: &Table,
        left_row: Option<usize>,
        right: &Table,
        right_row: Option<usize>,
    ) -> Vec<Cell> {
        self.sources
            .iter()
            .map(|source| match source {
                Source::Key { left: l, right: r } => {
                    let cell = match (left_row, right_row) {
                        (Some(row), _) => Some(left.cell(row, *l)),
                        (None, Some(row)) => Some(right.cell(row, *r)),
                        (None, None) => None,
                    };
                    cell.and_then(Cell::key_text)
                        .map(Cell::Text)
                        .unwrap_or(Cell::Missing)
                }
                Source::Left(col) => left_row
                    .map(|row| left.cell(row, *col).clone())
                    .unwrap_or_default(),
                Source::Right(col) => right_row
                    .map(|row| right.cell(row, *col).clone())
                    .unwrap_or_default(),
            })
            .collect()
    }
}
