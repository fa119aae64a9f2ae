//! Error types for the portfolio engine.

use thiserror::Error;

/// Main error type for the portfolio engine.
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("Input error: {0}")]
    Input(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Date parsing error: {0}")]
    DateParse(#[from] chrono::ParseError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Numerical error in {operation}: {detail}")]
    Numerical { operation: String, detail: String },

    #[error("Degenerate metric {metric}: {detail}")]
    DegenerateMetric { metric: String, detail: String },

    #[error("Degenerate frontier: {0}")]
    DegenerateFrontier(String),

    #[error("Shape mismatch in {operation}: {detail}")]
    Shape { operation: String, detail: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Constraints unsatisfiable after {iterations} iterations: {}", violations.join("; "))]
    ConstraintsUnsatisfiable {
        iterations: usize,
        violations: Vec<String>,
    },

    #[error("No sector assignment for asset index {0}")]
    InvalidSectorMap(usize),
}

impl PortfolioError {
    /// Build a numerical error with operation context.
    pub fn numerical(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Numerical {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Build a shape error with operation context.
    pub fn shape(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Shape {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Build a degenerate-metric error for a named ratio.
    pub fn degenerate(metric: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::DegenerateMetric {
            metric: metric.into(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for portfolio operations.
pub type Result<T> = std::result::Result<T, PortfolioError>;
