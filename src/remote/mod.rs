#[cfg(feature = "mdns")]
pub mod discovery;
pub mod osc_sender;
