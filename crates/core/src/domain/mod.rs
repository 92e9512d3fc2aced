pub mod indicators;
pub mod portfolio;
pub mod recommendation;
pub mod report;
