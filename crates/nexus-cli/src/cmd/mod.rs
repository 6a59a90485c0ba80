pub mod connections;
pub mod reset;
pub mod review;
pub mod runs;
pub mod status;
pub mod trigger;
pub mod watch;
