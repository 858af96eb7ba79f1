mod quote;
mod stock;

pub use quote::{Currency, PriceQuote};
pub use stock::{EnrichedStock, Market, Sentiment, StockRecord};
