pub mod config;
pub mod recovery;
pub mod run;
pub mod stats;
