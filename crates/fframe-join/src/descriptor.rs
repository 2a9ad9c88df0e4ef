//! Join configuration as handed over by the planner.

use serde::{Deserialize, Serialize};

use crate::condition::CondExpr;

/// Join variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    /// Emit matching pairs only.
    Inner,
    /// Every left row at least once; right columns null on a miss.
    Left,
    /// Every right row at least once; left columns null on a miss.
    Right,
    /// Union of left and right.
    Outer,
    /// Ordered nearest-preceding match, one output row per left row.
    Asof,
}

impl JoinKind {
    /// Unmatched left rows are emitted.
    #[must_use]
    pub const fn left_preserved(self) -> bool {
        matches!(self, Self::Left | Self::Outer | Self::Asof)
    }

    /// Unmatched right rows are emitted.
    #[must_use]
    pub const fn right_preserved(self) -> bool {
        matches!(self, Self::Right | Self::Outer)
    }

    /// Left-origin columns may hold padding nulls.
    #[must_use]
    pub const fn left_may_be_missing(self) -> bool {
        self.right_preserved()
    }

    /// Right-origin columns may hold padding nulls.
    #[must_use]
    pub const fn right_may_be_missing(self) -> bool {
        self.left_preserved()
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "inner",
            Self::Left => "left",
            Self::Right => "right",
            Self::Outer => "outer",
            Self::Asof => "asof",
        }
    }
}

/// How null keys compare during probe.
///
/// Only missing values are affected. Float NaN is an ordinary key value:
/// every NaN matches every other NaN under both policies, as `-0.0` matches
/// `0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NaEquality {
    /// Null never equals anything, itself included.
    #[default]
    Strict,
    /// Null equals null.
    Lenient,
}

/// Side whose row positions replace the index in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexColumn {
    Left,
    Right,
}

/// Name of the index replacement column.
pub const INDEX_COLUMN_NAME: &str = "$index";

/// Name of the provenance column.
pub const INDICATOR_COLUMN_NAME: &str = "_merge";

/// Default suffixes for colliding non-key names.
pub const DEFAULT_SUFFIXES: (&str, &str) = ("_x", "_y");

/// Everything the engine needs to know about one join.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinDescriptor {
    pub kind: JoinKind,
    pub left_keys: Vec<String>,
    pub right_keys: Vec<String>,
    /// `None` falls back to the executor configuration.
    pub suffixes: Option<(String, String)>,
    pub na_equality: NaEquality,
    pub indicator: bool,
    pub condition: Option<CondExpr>,
    pub index: Option<IndexColumn>,
    pub left_parallel: bool,
    pub right_parallel: bool,
}

impl JoinDescriptor {
    #[must_use]
    pub fn new(kind: JoinKind) -> Self {
        Self {
            kind,
            left_keys: Vec::new(),
            right_keys: Vec::new(),
            suffixes: None,
            na_equality: NaEquality::Strict,
            indicator: false,
            condition: None,
            index: None,
            left_parallel: false,
            right_parallel: false,
        }
    }

    /// Join on columns named the same on both sides.
    #[must_use]
    pub fn on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        self.left_keys.clone_from(&keys);
        self.right_keys = keys;
        self
    }

    #[must_use]
    pub fn left_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.left_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn right_on<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.right_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.suffixes = Some((left.into(), right.into()));
        self
    }

    #[must_use]
    pub const fn na_equality(mut self, policy: NaEquality) -> Self {
        self.na_equality = policy;
        self
    }

    #[must_use]
    pub const fn indicator(mut self, enabled: bool) -> Self {
        self.indicator = enabled;
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: CondExpr) -> Self {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub const fn index_column(mut self, side: IndexColumn) -> Self {
        self.index = Some(side);
        self
    }

    /// Distribution flags from the planner.
    #[must_use]
    pub const fn parallel(mut self, left: bool, right: bool) -> Self {
        self.left_parallel = left;
        self.right_parallel = right;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserved_sides_by_kind() {
        assert!(!JoinKind::Inner.left_preserved() && !JoinKind::Inner.right_preserved());
        assert!(JoinKind::Left.right_may_be_missing());
        assert!(!JoinKind::Left.left_may_be_missing());
        assert!(JoinKind::Right.left_may_be_missing());
        assert!(JoinKind::Outer.left_may_be_missing() && JoinKind::Outer.right_may_be_missing());
        assert!(JoinKind::Asof.right_may_be_missing());
    }

    #[test]
    fn builder_sets_both_key_lists() {
        let desc = JoinDescriptor::new(JoinKind::Left)
            .on(["k"])
            .suffixes("_l", "_r")
            .indicator(true)
            .parallel(true, false);
        assert_eq!(desc.left_keys, vec!["k".to_owned()]);
        assert_eq!(desc.right_keys, desc.left_keys);
        assert_eq!(desc.suffixes, Some(("_l".to_owned(), "_r".to_owned())));
        assert!(desc.indicator && desc.left_parallel && !desc.right_parallel);
    }
}
