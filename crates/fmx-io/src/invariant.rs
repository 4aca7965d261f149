//! Scalar selection for tensor fields.

use std::fmt::{self, Debug, Display, Formatter};
use std::sync::Arc;

use crate::archive::FieldSample;

type Accessor = dyn Fn(&FieldSample) -> Option<f64> + Send + Sync;

/// Caller-supplied extraction for invariants outside the built-in set.
#[derive(Clone)]
pub struct CustomInvariant {
    name: String,
    extract: Arc<Accessor>,
}

impl CustomInvariant {
    pub fn new<F>(name: impl Into<String>, extract: F) -> Self
    where
        F: Fn(&FieldSample) -> Option<f64> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            extract: Arc::new(extract),
        }
    }

    /// Reads the sample component called `name`.
    pub fn named_component(name: impl Into<String>) -> Self {
        let name = name.into();
        let key = name.clone();
        Self::new(name, move |sample| sample.component(&key))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Debug for CustomInvariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomInvariant")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub enum Invariant {
    Mises,
    MaxPrincipal,
    MinPrincipal,
    Tresca,
    Pressure,
    Custom(CustomInvariant),
}

impl Invariant {
    /// Resolves a user-facing invariant name. Case, whitespace, dots and
    /// underscores are ignored (`"Max. Principal"` is `MaxPrincipal`); any
    /// other name reads the sample component of that exact name.
    pub fn from_name(name: &str) -> Self {
        let key: String = name
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '.' && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "mises" => Invariant::Mises,
            "maxprincipal" => Invariant::MaxPrincipal,
            "minprincipal" => Invariant::MinPrincipal,
            "tresca" => Invariant::Tresca,
            "pressure" | "press" => Invariant::Pressure,
            _ => Invariant::Custom(CustomInvariant::named_component(name.trim())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Invariant::Mises => "Mises",
            Invariant::MaxPrincipal => "MaxPrincipal",
            Invariant::MinPrincipal => "MinPrincipal",
            Invariant::Tresca => "Tresca",
            Invariant::Pressure => "Pressure",
            Invariant::Custom(custom) => custom.name(),
        }
    }

    pub fn evaluate(&self, sample: &FieldSample) -> Option<f64> {
        match self {
            Invariant::Mises => sample.mises(),
            Invariant::MaxPrincipal => sample.max_principal(),
            Invariant::MinPrincipal => sample.min_principal(),
            Invariant::Tresca => sample.tresca(),
            Invariant::Pressure => sample.press(),
            Invariant::Custom(custom) => (custom.extract)(sample),
        }
    }
}

impl Display for Invariant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value of `sample` under `invariant`, or its native scalar when no
/// invariant is selected.
pub fn sample_value(sample: &FieldSample, invariant: Option<&Invariant>) -> Option<f64> {
    match invariant {
        Some(invariant) => invariant.evaluate(sample),
        None => sample.scalar_value(),
    }
}
