pub mod catalog;
pub mod fetcher;
pub mod listing;
pub mod registry;
