use crate::errors::types::Error;
use std::fmt;

/// Where an error happened: component, operation and optional details
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    pub details: Option<String>,
}

impl ErrorContext {
    pub fn new<S: Into<String>, T: Into<String>>(component: S, operation: T) -> Self {
        ErrorContext {
            component: component.into(),
            operation: operation.into(),
            details: None,
        }
    }

    /// Attach free-form details, e.g. the invoke id or region
    pub fn with_details<S: Into<String>>(mut self, details: S) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.component, self.operation)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Extension trait for attaching an [`ErrorContext`] to errors and results
pub trait ErrorExt<T> {
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error>;

    fn with_context<S: Into<String>, U: Into<String>>(
        self,
        component: S,
        operation: U,
    ) -> std::result::Result<T, Error>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: fmt::Display,
{
    fn context(self, ctx: ErrorContext) -> std::result::Result<T, Error> {
        self.map_err(|e| Error::Custom(format!("{} [{}]", e, ctx)))
    }

    fn with_context<S: Into<String>, U: Into<String>>(
        self,
        component: S,
        operation: U,
    ) -> std::result::Result<T, Error> {
        self.context(ErrorContext::new(component, operation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_is_appended_to_message() {
        let result: std::result::Result<(), String> = Err("store unavailable".to_string());
        let err = result
            .context(ErrorContext::new("time-store", "set").with_details("region 3"))
            .unwrap_err();

        assert_eq!(err.to_string(), "store unavailable [time-store::set (region 3)]");
    }

    #[test]
    fn test_ok_passes_through() {
        let result: std::result::Result<u32, Error> = Ok(7);
        assert_eq!(result.with_context("gateway", "send").unwrap(), 7);
    }
}
