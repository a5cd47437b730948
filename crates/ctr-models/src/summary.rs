//! Parameter listing for a built model.

use std::fmt;

use serde::Serialize;

/// One named parameter tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSummary {
    /// Qualified name, e.g. `fm/V`
    pub name: String,
    /// Tensor shape
    pub shape: Vec<usize>,
    /// Element count
    pub count: usize,
}

/// Trainable parameters of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSummary {
    /// Model name
    pub model: String,
    /// Parameters in update order
    pub parameters: Vec<ParameterSummary>,
}

impl ModelSummary {
    /// Builds a summary from `(name, shape)` pairs.
    pub fn new(model: impl Into<String>, named_shapes: Vec<(String, Vec<usize>)>) -> Self {
        let parameters = named_shapes
            .into_iter()
            .map(|(name, shape)| ParameterSummary {
                count: shape.iter().product(),
                name,
                shape,
            })
            .collect();
        Self {
            model: model.into(),
            parameters,
        }
    }

    /// Total number of trainable scalars.
    pub fn total_params(&self) -> usize {
        self.parameters.iter().map(|p| p.count).sum()
    }
}

impl fmt::Display for ModelSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name_width = self
            .parameters
            .iter()
            .map(|p| p.name.len())
            .max()
            .unwrap_or(0)
            .max("Parameter".len());
        writeln!(f, "Model: \"{}\"", self.model)?;
        writeln!(f, "{:<name_width$}  {:<18}  {:>12}", "Parameter", "Shape", "Count")?;
        for p in &self.parameters {
            let shape = format!("{:?}", p.shape);
            writeln!(f, "{:<name_width$}  {:<18}  {:>12}", p.name, shape, p.count)?;
        }
        write!(f, "Total params: {}", self.total_params())
    }
}
