//! Fetch plans and the compiler producing them.

mod compiler;
mod plan;

pub use compiler::FetchGraphCompiler;
pub use plan::{FetchPlan, Modifier, Predicate};
