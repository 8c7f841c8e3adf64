use std::time::Duration;

/// Tuning knobs for the realtime core.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long a broadcast waits on one connection's full queue before
    /// treating it as a failed consumer.
    pub send_timeout: Duration,
    /// Outbound frames buffered per connection.
    pub outbound_capacity: usize,
    /// Inactivity after which a user counts as offline.
    pub presence_threshold: Duration,
    /// Period of the background offline sweep.
    pub sweep_interval: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            send_timeout: Duration::from_secs(5),
            outbound_capacity: 64,
            presence_threshold: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}
