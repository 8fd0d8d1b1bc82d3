//! Call arguments carried by a relay request.

use serde_json::{Map, Value};

/// Positional and keyword arguments of one call, in either direction.
///
/// # Example
///
/// ```rust
/// use terminal_relay::domain::CallArgs;
///
/// let args = CallArgs::new().kwarg("simulated", true);
/// assert_eq!(args.kwargs["simulated"], serde_json::json!(true));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    /// Positional arguments, in call order.
    pub args: Vec<Value>,
    /// Keyword arguments.
    pub kwargs: Map<String, Value>,
}

impl CallArgs {
    /// No arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds arguments from already-decoded parts.
    pub fn from_parts(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self { args, kwargs }
    }

    /// Appends a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Sets a keyword argument, replacing any previous value.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Positional argument `index`, if present.
    pub fn positional(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Keyword argument `name`, if present.
    pub fn keyword(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}
