use thiserror::Error;

use crate::partition::{ColumnMapping, PartitionKey, PartitionSpec, PartitionValue};

/// Predicate validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PredicateError {
    /// The predicate references columns the table is not partitioned by.
    #[error(
        "predicate references non-partition columns {columns:?}; \
         only the partition columns may be referenced: {partition_columns:?}"
    )]
    NonPartitionColumn {
        /// Logical names of the offending columns.
        columns: Vec<String>,
        /// The table's legal partition columns.
        partition_columns: Vec<String>,
    },
}

/// A predicate over partition columns, written against logical column names.
///
/// Resolution maps logical names to physical ones and rejects any column
/// that is not a partition column of the table before a single file is
/// looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionPredicate {
    /// `column = value`. Equality against the explicit null marker matches
    /// files carrying the null partition value.
    Eq {
        /// Logical column name.
        column: String,
        /// Value to compare against.
        value: PartitionValue,
    },
    /// `column IN (values...)`.
    In {
        /// Logical column name.
        column: String,
        /// Candidate values.
        set: Vec<PartitionValue>,
    },
    /// `column IS NULL`.
    IsNull {
        /// Logical column name.
        column: String,
    },
    /// `column IS NOT NULL`.
    IsNotNull {
        /// Logical column name.
        column: String,
    },
    /// Both sides must match.
    And(Box<PartitionPredicate>, Box<PartitionPredicate>),
    /// Either side may match.
    Or(Box<PartitionPredicate>, Box<PartitionPredicate>),
    /// Negation, with unknown staying unknown.
    Not(Box<PartitionPredicate>),
}

impl PartitionPredicate {
    /// `column = value`.
    pub fn eq(column: impl Into<String>, value: impl Into<PartitionValue>) -> Self {
        PartitionPredicate::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    /// `column IN (values...)`.
    pub fn in_set<I, V>(column: impl Into<String>, set: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PartitionValue>,
    {
        PartitionPredicate::In {
            column: column.into(),
            set: set.into_iter().map(Into::into).collect(),
        }
    }

    /// `column IS NULL`.
    pub fn is_null(column: impl Into<String>) -> Self {
        PartitionPredicate::IsNull {
            column: column.into(),
        }
    }

    /// `column IS NOT NULL`.
    pub fn is_not_null(column: impl Into<String>) -> Self {
        PartitionPredicate::IsNotNull {
            column: column.into(),
        }
    }

    /// `self AND other`.
    pub fn and(self, other: PartitionPredicate) -> Self {
        PartitionPredicate::And(Box::new(self), Box::new(other))
    }

    /// `self OR other`.
    pub fn or(self, other: PartitionPredicate) -> Self {
        PartitionPredicate::Or(Box::new(self), Box::new(other))
    }

    /// `NOT self`.
    pub fn not(self) -> Self {
        PartitionPredicate::Not(Box::new(self))
    }

    /// Resolve logical column names through `mapping` and validate that every
    /// referenced column is a partition column of `spec`.
    pub fn resolve(
        &self,
        spec: &PartitionSpec,
        mapping: &ColumnMapping,
    ) -> Result<ResolvedPredicate, PredicateError> {
        let mut invalid = Vec::new();
        let node = self.resolve_node(spec, mapping, &mut invalid);
        if invalid.is_empty() {
            Ok(ResolvedPredicate { node })
        } else {
            invalid.sort();
            invalid.dedup();
            Err(PredicateError::NonPartitionColumn {
                columns: invalid,
                partition_columns: spec.columns().to_vec(),
            })
        }
    }

    fn resolve_node(
        &self,
        spec: &PartitionSpec,
        mapping: &ColumnMapping,
        invalid: &mut Vec<String>,
    ) -> Node {
        fn resolve_column(
            logical: &str,
            spec: &PartitionSpec,
            mapping: &ColumnMapping,
            invalid: &mut Vec<String>,
        ) -> String {
            let physical = mapping.physical(logical);
            if !spec.is_partition_column(physical) {
                invalid.push(logical.to_string());
            }
            physical.to_string()
        }
        match self {
            PartitionPredicate::Eq { column, value } => Node::Eq {
                column: resolve_column(column, spec, mapping, invalid),
                value: value.clone(),
            },
            PartitionPredicate::In { column, set } => Node::In {
                column: resolve_column(column, spec, mapping, invalid),
                set: set.clone(),
            },
            PartitionPredicate::IsNull { column } => Node::IsNull {
                column: resolve_column(column, spec, mapping, invalid),
            },
            PartitionPredicate::IsNotNull { column } => Node::IsNotNull {
                column: resolve_column(column, spec, mapping, invalid),
            },
            PartitionPredicate::And(lhs, rhs) => Node::And(
                Box::new(lhs.resolve_node(spec, mapping, invalid)),
                Box::new(rhs.resolve_node(spec, mapping, invalid)),
            ),
            PartitionPredicate::Or(lhs, rhs) => Node::Or(
                Box::new(lhs.resolve_node(spec, mapping, invalid)),
                Box::new(rhs.resolve_node(spec, mapping, invalid)),
            ),
            PartitionPredicate::Not(inner) => {
                Node::Not(Box::new(inner.resolve_node(spec, mapping, invalid)))
            }
        }
    }
}

/// A validated predicate over physical partition columns.
#[derive(Debug, Clone)]
pub struct ResolvedPredicate {
    node: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Eq { column: String, value: PartitionValue },
    In { column: String, set: Vec<PartitionValue> },
    IsNull { column: String },
    IsNotNull { column: String },
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Not(Box<Node>),
}

impl ResolvedPredicate {
    /// Whether the partition identified by `key` matches.
    ///
    /// Comparisons follow ternary semantics: a null partition value compares
    /// unknown, and unknown never matches. Equality against the explicit
    /// null marker and `IS NULL` are the exceptions and match null-valued
    /// partitions directly.
    pub fn matches(&self, key: &PartitionKey) -> bool {
        self.node.eval(key) == Some(true)
    }
}

impl Node {
    /// Three-valued evaluation; `None` is unknown.
    fn eval(&self, key: &PartitionKey) -> Option<bool> {
        match self {
            Node::Eq { column, value } => match (key.column(column)?, value) {
                (PartitionValue::Null, PartitionValue::Null) => Some(true),
                (PartitionValue::Null, PartitionValue::Value(_)) => None,
                (PartitionValue::Value(_), PartitionValue::Null) => Some(false),
                (PartitionValue::Value(actual), PartitionValue::Value(expected)) => {
                    Some(actual == expected)
                }
            },
            Node::In { column, set } => match key.column(column)? {
                PartitionValue::Null => {
                    if set.iter().any(PartitionValue::is_null) {
                        Some(true)
                    } else {
                        None
                    }
                }
                actual @ PartitionValue::Value(_) => {
                    if set.contains(actual) {
                        Some(true)
                    } else if set.iter().any(PartitionValue::is_null) {
                        // `x IN (.., NULL)` is unknown when x misses the rest.
                        None
                    } else {
                        Some(false)
                    }
                }
            },
            Node::IsNull { column } => Some(key.column(column)?.is_null()),
            Node::IsNotNull { column } => Some(!key.column(column)?.is_null()),
            Node::And(lhs, rhs) => match (lhs.eval(key), rhs.eval(key)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Node::Or(lhs, rhs) => match (lhs.eval(key), rhs.eval(key)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Node::Not(inner) => inner.eval(key).map(|matched| !matched),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PartitionSpec {
        PartitionSpec::partitioned_by(["id", "region"])
    }

    fn key(id: PartitionValue, region: PartitionValue) -> PartitionKey {
        PartitionKey::new(vec![("id".into(), id), ("region".into(), region)])
    }

    #[test]
    fn non_partition_column_is_rejected() {
        let predicate = PartitionPredicate::eq("id", "0")
            .and(PartitionPredicate::eq("payload", "x").or(PartitionPredicate::is_null("other")));
        let err = predicate
            .resolve(&spec(), &ColumnMapping::identity())
            .unwrap_err();
        assert_eq!(
            err,
            PredicateError::NonPartitionColumn {
                columns: vec!["other".into(), "payload".into()],
                partition_columns: vec!["id".into(), "region".into()],
            }
        );
    }

    #[test]
    fn any_predicate_fails_on_unpartitioned_tables() {
        let err = PartitionPredicate::eq("id", "0")
            .resolve(&PartitionSpec::Unpartitioned, &ColumnMapping::identity())
            .unwrap_err();
        assert_eq!(
            err,
            PredicateError::NonPartitionColumn {
                columns: vec!["id".into()],
                partition_columns: vec![],
            }
        );
    }

    #[test]
    fn logical_names_resolve_through_the_mapping() {
        let spec = PartitionSpec::partitioned_by(["col-7f3a"]);
        let mapping = ColumnMapping::identity().with("region", "col-7f3a");
        let resolved = PartitionPredicate::eq("region", "emea")
            .resolve(&spec, &mapping)
            .unwrap();
        let key = PartitionKey::new(vec![("col-7f3a".into(), "emea".into())]);
        assert!(resolved.matches(&key));
    }

    #[test]
    fn equality_and_ternary_null_semantics() {
        let mapping = ColumnMapping::identity();
        let eq = PartitionPredicate::eq("id", "0")
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(eq.matches(&key("0".into(), "emea".into())));
        assert!(!eq.matches(&key("1".into(), "emea".into())));
        // Null compares unknown, so neither the predicate nor its negation
        // matches a null-valued partition.
        assert!(!eq.matches(&key(PartitionValue::Null, "emea".into())));
        let not_eq = PartitionPredicate::eq("id", "0")
            .not()
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(!not_eq.matches(&key(PartitionValue::Null, "emea".into())));
        assert!(not_eq.matches(&key("1".into(), "emea".into())));
    }

    #[test]
    fn explicit_null_equality_targets_null_partitions() {
        let mapping = ColumnMapping::identity();
        let eq_null = PartitionPredicate::eq("id", PartitionValue::Null)
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(eq_null.matches(&key(PartitionValue::Null, "emea".into())));
        assert!(!eq_null.matches(&key("".into(), "emea".into())));
        assert!(!eq_null.matches(&key("0".into(), "emea".into())));

        let is_null = PartitionPredicate::is_null("id")
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(is_null.matches(&key(PartitionValue::Null, "emea".into())));
        assert!(!is_null.matches(&key("".into(), "emea".into())));
    }

    #[test]
    fn null_distinct_from_empty_string() {
        let mapping = ColumnMapping::identity();
        let eq_empty = PartitionPredicate::eq("id", "")
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(eq_empty.matches(&key("".into(), "emea".into())));
        assert!(!eq_empty.matches(&key(PartitionValue::Null, "emea".into())));
    }

    #[test]
    fn in_set_and_connectives() {
        let mapping = ColumnMapping::identity();
        let in_set = PartitionPredicate::in_set("id", ["0", "2"])
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(in_set.matches(&key("2".into(), "emea".into())));
        assert!(!in_set.matches(&key("1".into(), "emea".into())));
        assert!(!in_set.matches(&key(PartitionValue::Null, "emea".into())));

        let both = PartitionPredicate::eq("id", "0")
            .and(PartitionPredicate::eq("region", "emea"))
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(both.matches(&key("0".into(), "emea".into())));
        assert!(!both.matches(&key("0".into(), "apac".into())));

        let either = PartitionPredicate::eq("id", "0")
            .or(PartitionPredicate::eq("region", "emea"))
            .resolve(&spec(), &mapping)
            .unwrap();
        assert!(either.matches(&key("9".into(), "emea".into())));
        assert!(!either.matches(&key("9".into(), "apac".into())));
    }
}
