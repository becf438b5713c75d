pub mod billing;
pub mod config;
pub mod fileset;
pub mod job;
pub mod report;

pub use billing::*;
pub use config::*;
pub use fileset::*;
pub use job::*;
pub use report::*;
