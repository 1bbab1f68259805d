//! Behaviors shipped with the framework.
//!
//! - [`TracingBehavior`]: a span around the rest of the chain, with the
//!   outcome and elapsed time logged on the way out
//! - [`TimeoutBehavior`]: a deadline for everything inside it

mod timeout;
mod trace;

pub use self::timeout::{DispatchTimeout, TimeoutBehavior};
pub use self::trace::TracingBehavior;
