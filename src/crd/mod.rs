//! Custom Resource Definitions for the nginx operator

mod nginx;
mod types;

pub use nginx::{NginxOperator, NginxOperatorSpec, NginxOperatorStatus};
pub use types::{find_condition, set_condition, Condition, ConditionStatus};
