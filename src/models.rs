use serde::{Deserialize, Serialize};

/// Column name fragments that mark a column as numeric.
pub const NUMERIC_COLUMN_HINTS: [&str; 4] = ["bytes", "count", "ports", "attempts"];

/// One query submission: the SQL text plus where it runs and where the
/// service writes its raw output. Also the memoization key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub database: String,
    pub output_location: String,
}

impl QueryRequest {
    pub fn new(
        query: impl Into<String>,
        database: impl Into<String>,
        output_location: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            database: database.into(),
            output_location: output_location.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    /// Any non-terminal state (queued, running, or something new).
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutionState::Running)
    }
}

impl std::fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionState::Running => write!(f, "RUNNING"),
            ExecutionState::Succeeded => write!(f, "SUCCEEDED"),
            ExecutionState::Failed => write!(f, "FAILED"),
            ExecutionState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionStatus {
    pub state: ExecutionState,
    /// Human-readable reason reported by the service, if any.
    pub reason: Option<String>,
}

impl ExecutionStatus {
    pub fn new(state: ExecutionState) -> Self {
        Self { state, reason: None }
    }

    pub fn with_reason(state: ExecutionState, reason: impl Into<String>) -> Self {
        Self {
            state,
            reason: Some(reason.into()),
        }
    }
}

/// A single page of results as the service returns it. The first row of
/// every page is a header row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    /// Column names from the result set metadata, possibly empty.
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
    pub next_token: Option<String>,
}

/// A single cell of a [`ResultTable`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    fn to_numeric(&self) -> Value {
        match self {
            Value::Text(raw) => {
                let raw = raw.trim();
                if let Ok(i) = raw.parse::<i64>() {
                    Value::Integer(i)
                } else {
                    match raw.parse::<f64>() {
                        Ok(f) if f.is_finite() => Value::Float(f),
                        _ => Value::Null,
                    }
                }
            }
            other => other.clone(),
        }
    }
}

impl From<Option<String>> for Value {
    fn from(raw: Option<String>) -> Self {
        raw.map(Value::Text).unwrap_or(Value::Null)
    }
}

/// Whether values of `column` are coerced to numbers.
pub fn is_numeric_column(column: &str) -> bool {
    NUMERIC_COLUMN_HINTS.iter().any(|hint| column.contains(hint))
}

/// Ordered columns and rows of a finished query. Every row holds exactly
/// one value per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl ResultTable {
    /// A table with no columns and no rows.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table from raw string cells, padding or truncating rows to
    /// the column count and coercing numeric columns. Cells that fail
    /// numeric coercion become null.
    pub fn from_raw(columns: Vec<String>, raw_rows: Vec<Vec<Option<String>>>) -> Self {
        let numeric: Vec<bool> = columns.iter().map(|c| is_numeric_column(c)).collect();
        let rows = raw_rows
            .into_iter()
            .map(|raw| {
                let mut cells = raw.into_iter();
                numeric
                    .iter()
                    .map(|&is_numeric| {
                        let value = Value::from(cells.next().flatten());
                        if is_numeric {
                            value.to_numeric()
                        } else {
                            value
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no rows, regardless of columns.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| &row[idx]).collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// A new table with `f` applied to every value of `name`. Returns a
    /// plain copy when the column is absent.
    pub fn map_column<F>(&self, name: &str, f: F) -> ResultTable
    where
        F: Fn(&Value) -> Value,
    {
        let Some(idx) = self.column_index(name) else {
            return self.clone();
        };

        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                row[idx] = f(&row[idx]);
                row
            })
            .collect();

        ResultTable {
            columns: self.columns.clone(),
            rows,
        }
    }
}
