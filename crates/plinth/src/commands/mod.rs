pub mod build;
pub mod deploy;
pub mod serve;
pub mod task;
pub mod watch;
