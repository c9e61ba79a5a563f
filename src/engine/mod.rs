pub mod assignment;
pub mod eta;
pub mod finder;
pub mod orchestrator;
pub mod scoring;
