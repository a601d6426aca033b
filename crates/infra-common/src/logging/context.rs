use std::collections::BTreeMap;
use std::fmt;
use tracing::{Level, Span};

/// Component/operation context for a unit of work
///
/// Used to open a span around handler execution so that every log line a
/// handler emits carries the component, the operation and the invoke id.
#[derive(Debug, Clone)]
pub struct LogContext {
    /// Component that is generating the log
    pub component: String,
    /// Operation or action being performed
    pub operation: Option<String>,
    /// Additional contextual fields, rendered in key order
    pub fields: BTreeMap<String, String>,
}

impl LogContext {
    pub fn new<S: Into<String>>(component: S) -> Self {
        LogContext {
            component: component.into(),
            operation: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_operation<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        LogContext {
            component: component.into(),
            operation: Some(operation.into()),
            fields: BTreeMap::new(),
        }
    }

    /// Add a field to the context
    pub fn with_field<S: Into<String>, T: ToString>(mut self, key: S, value: T) -> Self {
        self.fields.insert(key.into(), value.to_string());
        self
    }

    /// Create a span carrying this context
    ///
    /// `tracing` needs the level at compile time, so each level gets its own
    /// macro arm. Extra fields are folded into a single `fields` value.
    pub fn span(&self, level: Level) -> Span {
        let operation = self.operation.as_deref().unwrap_or("-");
        let fields = self.render_fields();
        match level {
            Level::TRACE => {
                tracing::trace_span!("npac", component = %self.component, operation = %operation, fields = %fields)
            }
            Level::DEBUG => {
                tracing::debug_span!("npac", component = %self.component, operation = %operation, fields = %fields)
            }
            Level::INFO => {
                tracing::info_span!("npac", component = %self.component, operation = %operation, fields = %fields)
            }
            Level::WARN => {
                tracing::warn_span!("npac", component = %self.component, operation = %operation, fields = %fields)
            }
            Level::ERROR => {
                tracing::error_span!("npac", component = %self.component, operation = %operation, fields = %fields)
            }
        }
    }

    fn render_fields(&self) -> String {
        self.fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.component)?;

        if let Some(op) = &self.operation {
            write!(f, "[{}]", op)?;
        }

        for (key, value) in &self.fields {
            write!(f, "[{}={}]", key, value)?;
        }

        Ok(())
    }
}
