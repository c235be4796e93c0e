pub mod runner;
pub mod state;
