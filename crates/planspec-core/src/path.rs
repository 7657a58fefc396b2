use std::fmt;

use crate::value::Value;

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathStep {
    /// A named attribute of an object, or a key of a map.
    Attribute(String),
    /// A positional index into a list or set.
    Index(Value),
}

/// An address inside a value tree.
///
/// Paths are never mutated in place: `attr` and `index` return an extended
/// copy, so a parent path can be reused for every child.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    steps: Vec<PathStep>,
}

impl Path {
    /// Returns the empty path.
    pub fn root() -> Self {
        Self { steps: Vec::new() }
    }

    /// Starts a path at a single attribute.
    pub fn attr_path(name: impl Into<String>) -> Self {
        Self::root().attr(name)
    }

    /// Returns a copy of this path extended with an attribute step.
    pub fn attr(&self, name: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep::Attribute(name.into()));
        Self { steps }
    }

    /// Returns a copy of this path extended with a positional step.
    pub fn index(&self, i: usize) -> Self {
        self.index_value(Value::Number(i as f64))
    }

    /// Returns a copy of this path extended with an arbitrary index key.
    pub fn index_value(&self, key: Value) -> Self {
        let mut steps = self.steps.clone();
        steps.push(PathStep::Index(key));
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Resolves this path against a value, returning `None` when a step
    /// does not exist.
    pub fn apply<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for step in &self.steps {
            current = match step {
                PathStep::Attribute(name) => current.get_attr(name)?,
                PathStep::Index(key) => match key {
                    Value::Number(n) if *n >= 0.0 => current.elements().get(*n as usize)?,
                    Value::String(s) => current.get_attr(s)?,
                    _ => return None,
                },
            };
        }
        Some(current)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                PathStep::Attribute(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                PathStep::Index(Value::String(key)) => write!(f, "[{:?}]", key)?,
                PathStep::Index(key) => write!(f, "[{}]", key)?,
            }
        }
        Ok(())
    }
}
