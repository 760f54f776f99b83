pub mod backpressure;
pub mod channel;

pub use backpressure::{BackpressureSendState, recv_or_cancel, recv_shared, send_with_backpressure};
pub use channel::Channel;
