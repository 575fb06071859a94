//! Market data models
//!
//! This module contains the core data types for market data operations:
//! - `symbol` - Validated ticker symbol (Symbol)
//! - `quote` - Quote data structures (Quote, QuoteBuilder, ResolvedQuote)
//! - `search` - Search result data (SearchResult)

mod quote;
mod search;
mod symbol;

pub use quote::{derive_change, BatchQuotes, Quote, QuoteBuilder, ResolvedQuote};
pub use search::{SearchOutcome, SearchResult};
pub use symbol::{is_valid_symbol, Symbol, MAX_SYMBOL_LEN};
