//! Core engine: settlement arithmetic and the household ledger service.

pub mod settlement;
pub mod ledger;
