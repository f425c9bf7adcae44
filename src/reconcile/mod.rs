pub mod diff;
pub mod engine;
pub mod resolver;

pub use diff::{compute_change_set, ChangeSet};
pub use engine::Reconciler;
pub use resolver::resolve;
