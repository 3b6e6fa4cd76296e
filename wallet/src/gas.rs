use serde::{Deserialize, Serialize};

pub const GWEI: u128 = 1_000_000_000;

/// Fee caps attached to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeParams {
    pub max_fee_per_gas: u128,
    pub max_priority_fee_per_gas: u128,
}

/// Strategy for turning the current base fee into fee caps
pub trait GasPolicy: Send + Sync {
    fn fees(&self, base_fee: u128) -> FeeParams;

    fn name(&self) -> &'static str;
}

/// `max_fee = base_fee * multiplier + priority_fee`
#[derive(Debug, Clone, Copy)]
pub struct MultiplierPolicy {
    pub priority_fee: u128,
    pub base_fee_multiplier: u32,
}

impl Default for MultiplierPolicy {
    fn default() -> Self {
        Self {
            priority_fee: GWEI,
            base_fee_multiplier: 2,
        }
    }
}

impl GasPolicy for MultiplierPolicy {
    fn fees(&self, base_fee: u128) -> FeeParams {
        let max_fee = base_fee
            .saturating_mul(u128::from(self.base_fee_multiplier))
            .saturating_add(self.priority_fee);
        FeeParams {
            max_fee_per_gas: max_fee,
            max_priority_fee_per_gas: self.priority_fee,
        }
    }

    fn name(&self) -> &'static str {
        "multiplier"
    }
}

/// Ignores network conditions; useful against private devnets
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub FeeParams);

impl GasPolicy for FixedPolicy {
    fn fees(&self, _base_fee: u128) -> FeeParams {
        self.0
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Gas limit derived from the node's estimate plus headroom, capped
#[derive(Debug, Clone, Copy)]
pub struct GasLimitPolicy {
    pub headroom_percent: u32,
    pub cap: u64,
}

impl GasLimitPolicy {
    /// Without an estimate the cap is used
    pub fn limit(&self, estimate: Option<u64>) -> u64 {
        match estimate {
            Some(gas) => {
                let padded = u128::from(gas) * (100 + u128::from(self.headroom_percent)) / 100;
                padded.min(u128::from(self.cap)) as u64
            }
            None => self.cap,
        }
    }
}

/// Gas configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Tip paid to the block producer, in gwei
    pub priority_fee_gwei: u64,

    /// Multiplier applied to the current base fee
    pub base_fee_multiplier: u32,

    /// Upper bound for any transaction's gas limit
    pub gas_limit_cap: u64,

    /// Extra gas added on top of the node's estimate, in percent
    pub estimate_headroom_percent: u32,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            priority_fee_gwei: 1,
            base_fee_multiplier: 2,
            gas_limit_cap: 2_000_000,
            estimate_headroom_percent: 20,
        }
    }
}

impl GasConfig {
    pub fn policy(&self) -> MultiplierPolicy {
        MultiplierPolicy {
            priority_fee: u128::from(self.priority_fee_gwei) * GWEI,
            base_fee_multiplier: self.base_fee_multiplier,
        }
    }

    pub fn limit_policy(&self) -> GasLimitPolicy {
        GasLimitPolicy {
            headroom_percent: self.estimate_headroom_percent,
            cap: self.gas_limit_cap,
        }
    }
}
