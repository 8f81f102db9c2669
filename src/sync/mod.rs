// Public API
pub mod queue;
pub use self::queue::Queue;

pub mod wait;
pub use self::wait::WaitHandler;
