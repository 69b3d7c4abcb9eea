//! Declarative pipeline executor.

mod assert;
mod exec;
mod plan;
mod template;

pub use assert::{AssertOutcome, AssertSpec, evaluate, first_failure};
pub use exec::{RunOptions, doctor, run};
pub use plan::{LintIssue, Plan, SUPPORTED_STEPS, Step, lint};
pub use template::{TemplateScope, resolve};
