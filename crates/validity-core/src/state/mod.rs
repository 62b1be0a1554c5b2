//! State machine module.

pub mod handlers;
pub mod machine;
pub mod phases;

pub use handlers::{capture_machine, init_machine, next_machine, read_machine};
pub use machine::{MachineContext, Ssm, StateHandler, Transition};
pub use phases::Phase;
