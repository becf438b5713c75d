use serde::{Deserialize, Serialize};

/// Outcome of checking a parsed file set against structural policy.
///
/// Errors are blocking (they drive the repair loop); warnings are advisory.
/// A job may complete carrying a report that still has errors: exhausting
/// the repair ceiling downgrades them to review material, it does not fail
/// the job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Blocking problems (missing required files, residual fences, ...)
    pub errors: Vec<String>,
    /// Non-blocking observations
    pub warnings: Vec<String>,
    /// Attempt count at which this report was produced (1-based)
    pub attempts: u32,
}

impl ValidationReport {
    pub fn clean(attempts: u32) -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            attempts,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// One-line-per-issue rendering used in repair prompts and logs.
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for e in &self.errors {
            lines.push(format!("ERROR: {}", e));
        }
        for w in &self.warnings {
            lines.push(format!("WARNING: {}", w));
        }
        lines.join("\n")
    }
}
