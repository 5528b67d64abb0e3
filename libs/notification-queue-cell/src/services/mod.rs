pub mod queue;
pub mod redis_queue;
pub mod producer;
pub mod mail;
pub mod worker;
pub mod inbox;

pub use queue::*;
pub use redis_queue::*;
pub use producer::*;
pub use mail::*;
pub use worker::*;
pub use inbox::*;
