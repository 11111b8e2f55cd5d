pub mod check;
pub mod forwarder;
pub mod queue;
pub mod stdin_handler;
