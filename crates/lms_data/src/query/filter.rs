//! Filter predicates and ordering terms rendered to parameterized SQL.

use crate::entity::{has_column, Entity};
use crate::repo::error::{RepoError, RepoResult};
use rusqlite::types::Value;

/// Binary comparison operators supported by [`Filter::Compare`].
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
    fn as_sql(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

/// Predicate over one entity's columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    /// SQL `LIKE` with `%`/`_` wildcards.
    Like { column: String, pattern: String },
    In { column: String, values: Vec<Value> },
    IsNull(String),
    IsNotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Self::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ne, value)
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Lt, value)
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Le, value)
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Gt, value)
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Ge, value)
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn one_of<V: Into<Value>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_null(column: impl Into<String>) -> Self {
        Self::IsNull(column.into())
    }

    pub fn is_not_null(column: impl Into<String>) -> Self {
        Self::IsNotNull(column.into())
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Self::And(mut terms) => {
                terms.push(other);
                Self::And(terms)
            }
            first => Self::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Self::Or(mut terms) => {
                terms.push(other);
                Self::Or(terms)
            }
            first => Self::Or(vec![first, other]),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Appends this predicate to `sql`, pushing bound values onto `params`.
    pub(crate) fn render<T: Entity>(
        &self,
        sql: &mut String,
        params: &mut Vec<Value>,
    ) -> RepoResult<()> {
        match self {
            Self::Compare { column, op, value } => {
                let column = checked_column::<T>(column)?;
                sql.push_str(&format!("{column} {} ?", op.as_sql()));
                params.push(value.clone());
            }
            Self::Like { column, pattern } => {
                let column = checked_column::<T>(column)?;
                sql.push_str(&format!("{column} LIKE ?"));
                params.push(Value::Text(pattern.clone()));
            }
            Self::In { column, values } => {
                let column = checked_column::<T>(column)?;
                if values.is_empty() {
                    sql.push_str("1 = 0");
                } else {
                    let slots = vec!["?"; values.len()].join(", ");
                    sql.push_str(&format!("{column} IN ({slots})"));
                    params.extend(values.iter().cloned());
                }
            }
            Self::IsNull(column) => {
                let column = checked_column::<T>(column)?;
                sql.push_str(&format!("{column} IS NULL"));
            }
            Self::IsNotNull(column) => {
                let column = checked_column::<T>(column)?;
                sql.push_str(&format!("{column} IS NOT NULL"));
            }
            Self::And(terms) => render_group::<T>(terms, " AND ", "1 = 1", sql, params)?,
            Self::Or(terms) => render_group::<T>(terms, " OR ", "1 = 0", sql, params)?,
            Self::Not(inner) => {
                sql.push_str("NOT (");
                inner.render::<T>(sql, params)?;
                sql.push(')');
            }
        }
        Ok(())
    }
}

fn render_group<T: Entity>(
    terms: &[Filter],
    joiner: &str,
    empty: &str,
    sql: &mut String,
    params: &mut Vec<Value>,
) -> RepoResult<()> {
    if terms.is_empty() {
        sql.push_str(empty);
        return Ok(());
    }

    sql.push('(');
    for (index, term) in terms.iter().enumerate() {
        if index > 0 {
            sql.push_str(joiner);
        }
        term.render::<T>(sql, params)?;
    }
    sql.push(')');
    Ok(())
}

fn checked_column<'a, T: Entity>(column: &'a str) -> RepoResult<&'a str> {
    if has_column::<T>(column) {
        Ok(column)
    } else {
        Err(RepoError::UnknownColumn {
            table: T::TABLE,
            column: column.to_string(),
        })
    }
}

/// Sort direction of an [`OrderBy`] term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: Direction::Desc,
        }
    }

    pub(crate) fn render<T: Entity>(&self) -> RepoResult<String> {
        let column = checked_column::<T>(&self.column)?;
        let direction = match self.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        Ok(format!("{column} {direction}"))
    }
}
