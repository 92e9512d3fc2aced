pub mod extract;
pub mod scoring;
