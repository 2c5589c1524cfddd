pub mod memory_store;
pub mod quote_cache;
pub mod yahoo_oracle;
