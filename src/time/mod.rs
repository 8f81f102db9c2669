// Public API
mod sleep;
pub use sleep::{Sleep, sleep};

mod yield_now;
pub use yield_now::{YieldNow, yield_now};
