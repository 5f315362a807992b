pub mod audit;
pub mod report;
