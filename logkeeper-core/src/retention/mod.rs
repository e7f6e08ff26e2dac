pub mod classifier;
pub mod enforcer;

pub use classifier::{classify, RetentionDecision};
pub use enforcer::{EnforcementOutcome, GroupError, RetentionEnforcer, SkipReason};
