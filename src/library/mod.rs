pub mod catalog;
pub mod filter;
pub mod manager;
pub mod persistence;
pub mod record;
pub mod sync;
