#![doc = "Real-time scan driver: periodic tick timer, tick dispatch, and debug sync bridge."]

pub mod atomic;
pub mod clock;
pub mod debug_bridge;
pub mod driver;
pub mod engine;
pub mod interrupt;
pub mod realtime;
pub mod tick;
pub mod timer;

pub use atomic::compare_and_swap;
pub use clock::*;
pub use debug_bridge::*;
pub use driver::*;
pub use engine::*;
pub use interrupt::{Interrupt, InterruptGuard, HANDLED_SIGNALS};
pub use realtime::*;
pub use tick::*;
pub use timer::*;
