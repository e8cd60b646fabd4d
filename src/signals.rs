pub use crate::models::{signal_channel, Signal, SignalReceiver, SignalSender};
