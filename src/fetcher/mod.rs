pub mod clob_client;
pub mod gamma_client;

pub use clob_client::{ClobPricesClient, ClobPricesError, PriceQuote};
pub use gamma_client::{GammaClient, GammaClientError};
