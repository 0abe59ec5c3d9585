/// Delivery flow and expiry timers
pub mod delivery;
/// Inbound event handlers
pub mod handlers;
/// Chat-platform transport seam
pub mod transport;
