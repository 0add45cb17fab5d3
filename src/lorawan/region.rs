//! Regional frequency parameters
//!
//! Only the EU868 plan is implemented. Channel selection is uniformly
//! random per transmission; join requests draw from a dedicated subset of
//! the uplink channels.

use rand::Rng;

/// EU868 uplink channels in MHz
pub const EU868_UPLINK_MHZ: [f64; 8] = [868.1, 868.3, 868.5, 867.1, 867.3, 867.5, 867.7, 867.9];

/// Number of leading uplink channels usable for join requests
pub const EU868_JOIN_CHANNELS: usize = 3;

/// LoRa sync word for public networks
pub const PUBLIC_SYNC_WORD: u8 = 0x34;

/// A regional frequency plan: the uplink channel list plus the subset
/// used for join transmissions
#[derive(Debug, Clone)]
pub struct FrequencyPlan {
    uplink: Vec<f64>,
    join: Vec<f64>,
}

impl FrequencyPlan {
    /// The EU868 plan: eight uplink channels, the first three for joins
    pub fn eu868() -> Self {
        Self {
            uplink: EU868_UPLINK_MHZ.to_vec(),
            join: EU868_UPLINK_MHZ[..EU868_JOIN_CHANNELS].to_vec(),
        }
    }

    /// A custom plan; an empty join list falls back to the uplink list
    pub fn new(uplink: Vec<f64>, join: Vec<f64>) -> Self {
        let join = if join.is_empty() {
            uplink.clone()
        } else {
            join
        };
        Self { uplink, join }
    }

    /// Pick a channel uniformly at random
    pub fn random_channel(&self, join: bool) -> f64 {
        let channels = if join { &self.join } else { &self.uplink };
        channels[rand::thread_rng().gen_range(0..channels.len())]
    }

    /// Uplink channels in MHz
    pub fn uplink_channels(&self) -> &[f64] {
        &self.uplink
    }

    /// Join channels in MHz
    pub fn join_channels(&self) -> &[f64] {
        &self.join
    }
}

impl Default for FrequencyPlan {
    fn default() -> Self {
        Self::eu868()
    }
}
