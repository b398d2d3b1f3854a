pub mod auth;
pub mod domain;
pub mod repair;
pub mod status;
pub mod sync;
pub mod watch;
