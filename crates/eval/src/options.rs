//! Runtime options for [`crate::code`].

use std::fmt;
use std::sync::Arc;

/// Which pipeline step failed for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Derive,
    Code,
}

impl fmt::Display for FailureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureStage::Derive => write!(f, "derive"),
            FailureStage::Code => write!(f, "code"),
        }
    }
}

/// A failure caught while processing one response.
///
/// The response itself ends up as `DERIVE_ERROR` or `CODING_ERROR`; this
/// is what is reported to [`CodingOptions::on_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodingFailure {
    pub variable_id: String,
    pub subform: Option<String>,
    pub stage: FailureStage,
    pub message: String,
}

pub type ErrorCallback = Arc<dyn Fn(&CodingFailure) + Send + Sync>;

#[derive(Clone, Default)]
pub struct CodingOptions {
    pub on_error: Option<ErrorCallback>,
}

impl CodingOptions {
    pub fn with_on_error(mut self, f: impl Fn(&CodingFailure) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn report(&self, failure: &CodingFailure) {
        tracing::warn!(
            variable = %failure.variable_id,
            subform = ?failure.subform,
            stage = %failure.stage,
            "{}",
            failure.message
        );
        if let Some(on_error) = &self.on_error {
            on_error(failure);
        }
    }
}

impl fmt::Debug for CodingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodingOptions")
            .field("on_error", &self.on_error.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
