pub mod market;
pub mod position;
pub mod signal;
pub mod tpsl;

pub use market::{
    EventDescriptor, MarketRow, MarketStatus, MarketWsRow, NormalizedMarket, RawEvent, RawMarket,
    ResolutionStatus, TokenDescriptor, WsFieldUpdate,
};
pub use position::{OnChainPosition, UserPosition, WatchedMarket};
pub use signal::{signal_channel, Signal, SignalReceiver, SignalSender};
pub use tpsl::{TpslOrder, TpslStatus};
