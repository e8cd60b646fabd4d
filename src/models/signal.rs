use rust_decimal::Decimal;
use uuid::Uuid;

/// Internal signals emitted to the external trade-execution layer over a
/// plain mpsc channel. The core never consumes its own signals.
#[derive(Debug, Clone)]
pub enum Signal {
    TpTriggered {
        order_id: Uuid,
        execution_price: Decimal,
    },
    SlTriggered {
        order_id: Uuid,
        execution_price: Decimal,
    },
    MarketResolved {
        market_id: String,
        winning_outcome: i32,
    },
    RedeemableAvailable {
        user_id: String,
        condition_ids: Vec<String>,
    },
}

pub type SignalSender = tokio::sync::mpsc::Sender<Signal>;
pub type SignalReceiver = tokio::sync::mpsc::Receiver<Signal>;

pub fn signal_channel(capacity: usize) -> (SignalSender, SignalReceiver) {
    tokio::sync::mpsc::channel(capacity)
}
