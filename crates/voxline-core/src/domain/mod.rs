pub mod frame;
pub mod history;
pub mod identity;
pub mod session;
pub mod signal;
