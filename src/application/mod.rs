//! Application layer: the money-affecting operations of the core.
//!
//! `PromotionLedger` owns atomic redemption over the storage port;
//! `PaymentGateway` builds signed checkout redirects and verifies signed
//! callbacks. Both are pure over their ports/config and carry no HTTP
//! concerns.

pub mod gateway;
pub mod ledger;
