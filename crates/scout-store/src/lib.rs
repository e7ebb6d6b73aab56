//! # scout-store
//!
//! Persistence for paperscout's category-match records.
//!
//! The matching pipeline appends one record per submission; users may later
//! edit or delete records by index. See [`CategoryStore`].

pub mod category_store;

pub use category_store::CategoryStore;
