//! Derived metrics computed from collected columns
//!
//! A calculations file holds one `NAME = expression` per line. Expressions
//! combine column references and numeric literals with `+ - * /` and
//! parentheses, with the usual precedence. `#` and `;` start a comment.
//!
//! ```text
//! # busy ratio
//! Busy % = (CPU busy + CPU wait) / CPU total * 100
//! Busy x2 = Busy % * 2        ; earlier results may be reused
//! ```

mod parser;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::dataset::{Column, ColumnValues, Dataset};

pub use parser::{BinaryOp, Expr, parse_expression};

/// Errors raised while loading a calculations file
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CalculationError {
    /// The file could not be read
    #[error("Cannot read calculations file {path}: {reason}")]
    Read {
        /// File path
        path: PathBuf,
        /// OS error
        reason: String,
    },

    /// A line is not a valid definition
    #[error("Calculations line {line}: {reason}")]
    Syntax {
        /// 1-based line number
        line: usize,
        /// What is wrong
        reason: String,
    },
}

/// Result type for calculation loading
pub type CalculationResult<T> = Result<T, CalculationError>;

/// One `NAME = expression` definition
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation {
    /// Name of the column produced
    pub name: String,
    /// Parsed right-hand side
    pub expr: Expr,
    /// Line the definition came from
    pub line: usize,
}

/// Ordered list of definitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Calculations {
    entries: Vec<Calculation>,
}

impl Calculations {
    /// Reads and parses a calculations file
    ///
    /// # Errors
    ///
    /// Returns [`CalculationError::Read`] or [`CalculationError::Syntax`].
    pub fn load(path: &Path) -> CalculationResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CalculationError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let calculations = Self::parse(&text)?;
        tracing::debug!(file = %path.display(), count = calculations.len(), "Calculations loaded");
        Ok(calculations)
    }

    /// Parses definitions from text
    ///
    /// # Errors
    ///
    /// Returns [`CalculationError::Syntax`] for the first bad line.
    pub fn parse(text: &str) -> CalculationResult<Self> {
        let mut entries = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let content = strip_comment(raw).trim();
            if content.is_empty() {
                continue;
            }
            let syntax = |reason: String| CalculationError::Syntax { line, reason };
            let Some((name, rhs)) = content.split_once('=') else {
                return Err(syntax(format!("expected NAME = expression, got '{content}'")));
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(syntax("missing result name".to_string()));
            }
            let expr = parse_expression(rhs).map_err(syntax)?;
            entries.push(Calculation {
                name: name.to_string(),
                expr,
                line,
            });
        }
        Ok(Self { entries })
    }

    /// Definitions in file order
    #[must_use]
    pub fn entries(&self) -> &[Calculation] {
        &self.entries
    }

    /// Number of definitions
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no definitions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds one numeric column per definition, in order
    ///
    /// A reference to a column that does not exist, or is not numeric,
    /// yields a column of missing values and a warning. Empty datasets are
    /// left alone.
    pub fn apply(&self, dataset: &mut Dataset) {
        if dataset.is_empty() {
            return;
        }
        let system = dataset.metadata().system.clone().unwrap_or_default();
        for calc in &self.entries {
            let values = match evaluate(&calc.expr, dataset) {
                Ok(values) => values,
                Err(missing) => {
                    tracing::warn!(
                        system = %system,
                        column = %calc.name,
                        operand = %missing,
                        "Operand not found in dataset, result left empty"
                    );
                    vec![None; dataset.len()]
                }
            };
            if let Err(e) = dataset.upsert_column(Column {
                name: calc.name.clone(),
                values: ColumnValues::Numeric(values),
            }) {
                tracing::warn!(system = %system, error = %e, "Calculation result rejected");
            }
        }
        tracing::debug!(system = %system, shape = ?dataset.shape(), "Calculations applied");
    }
}

fn strip_comment(line: &str) -> &str {
    line.find(['#', ';']).map_or(line, |pos| &line[..pos])
}

/// Evaluates `expr` row by row; `Err` names the first unknown operand
fn evaluate(expr: &Expr, dataset: &Dataset) -> Result<Vec<Option<f64>>, String> {
    let rows = dataset.len();
    match expr {
        Expr::Number(value) => Ok(vec![Some(*value); rows]),
        Expr::Column(name) => dataset
            .column(name)
            .and_then(|c| c.values.as_numeric())
            .map(<[Option<f64>]>::to_vec)
            .ok_or_else(|| name.clone()),
        Expr::Neg(inner) => Ok(evaluate(inner, dataset)?
            .into_iter()
            .map(|v| v.map(|x| -x))
            .collect()),
        Expr::Binary { op, lhs, rhs } => {
            let lhs = evaluate(lhs, dataset)?;
            let rhs = evaluate(rhs, dataset)?;
            Ok(lhs
                .into_iter()
                .zip(rhs)
                .map(|(a, b)| op.apply(a?, b?))
                .collect())
        }
    }
}
