pub mod checkin;
pub mod config;
pub mod gym;
pub mod ledger;
pub mod member;
pub mod multiplier;
pub mod progress;
