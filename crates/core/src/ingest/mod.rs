pub mod fetcher;
pub mod google_sheets;
pub mod provider;
pub mod sheet;
pub mod types;
pub mod yahoo;
