//! Integration suite: drives the ledger end to end over an in-memory store.

mod memory_store;
mod month_close;
