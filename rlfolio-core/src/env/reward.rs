use crate::record::{Record, RecordValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of the policy that produced a step, used to name the metrics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum PolicyTag {
    /// Deep Q-network.
    Dqn,

    /// Proximal policy optimization.
    Ppo,

    /// Tabular Q-learning.
    Q,

    /// Optimal-tracking benchmark.
    Gp,

    /// Markowitz benchmark.
    Mv,

    /// Any other learned policy.
    Custom(String),
}

impl PolicyTag {
    /// Benchmarks name their metrics `<tag>Reward`, learned policies `Reward_<tag>`.
    pub fn is_benchmark(&self) -> bool {
        matches!(self, Self::Gp | Self::Mv)
    }

    /// Key of the reward metric.
    pub fn reward_key(&self) -> String {
        if self.is_benchmark() {
            format!("{}Reward", self)
        } else {
            format!("Reward_{}", self)
        }
    }
}

impl fmt::Display for PolicyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dqn => write!(f, "DQN"),
            Self::Ppo => write!(f, "PPO"),
            Self::Q => write!(f, "Q"),
            Self::Gp => write!(f, "GP"),
            Self::Mv => write!(f, "MV"),
            Self::Custom(s) => write!(f, "{}", s),
        }
    }
}

/// Components of the reward of one step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RewardBreakdown {
    /// Holding before the trade.
    pub curr_holding: f64,

    /// Holding after the trade.
    pub next_holding: f64,

    /// Shares traded, `next_holding - curr_holding`.
    pub action: f64,

    /// `next_holding * next_return`.
    pub gross_pnl: f64,

    /// `gross_pnl - cost`.
    pub net_pnl: f64,

    /// `0.5 * kappa * next_holding^2 * sigma^2`.
    pub risk: f64,

    /// `0.5 * action^2 * cost_multiplier * sigma^2`.
    pub cost: f64,

    /// `gross_pnl - risk - cost`.
    pub reward: f64,
}

/// Reward of one step tagged by the policy that took it.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackResult {
    tag: PolicyTag,
    breakdown: RewardBreakdown,
}

impl TrackResult {
    pub(crate) fn new(tag: PolicyTag, breakdown: RewardBreakdown) -> Self {
        Self { tag, breakdown }
    }

    /// Tag of the policy.
    pub fn tag(&self) -> &PolicyTag {
        &self.tag
    }

    /// Components of the reward.
    pub fn breakdown(&self) -> &RewardBreakdown {
        &self.breakdown
    }

    /// Reward of the step.
    pub fn reward(&self) -> f64 {
        self.breakdown.reward
    }

    /// Net P&L of the step.
    pub fn net_pnl(&self) -> f64 {
        self.breakdown.net_pnl
    }

    /// Named metrics in column order.
    ///
    /// Learned policies report `CurrHolding_<tag>`, `NextHolding_<tag>`,
    /// `Action_<tag>`, `GrossPNL_<tag>`, `NetPNL_<tag>`, `Risk_<tag>`,
    /// `Cost_<tag>` and `Reward_<tag>`; benchmarks report `<tag>NextAction`,
    /// `<tag>NextHolding`, `<tag>GrossPNL`, `<tag>NetPNL`, `<tag>Risk`,
    /// `<tag>Cost` and `<tag>Reward`.
    pub fn entries(&self) -> Vec<(String, f64)> {
        let b = &self.breakdown;
        let t = &self.tag;
        if t.is_benchmark() {
            vec![
                (format!("{}NextAction", t), b.action),
                (format!("{}NextHolding", t), b.next_holding),
                (format!("{}GrossPNL", t), b.gross_pnl),
                (format!("{}NetPNL", t), b.net_pnl),
                (format!("{}Risk", t), b.risk),
                (format!("{}Cost", t), b.cost),
                (format!("{}Reward", t), b.reward),
            ]
        } else {
            vec![
                (format!("CurrHolding_{}", t), b.curr_holding),
                (format!("NextHolding_{}", t), b.next_holding),
                (format!("Action_{}", t), b.action),
                (format!("GrossPNL_{}", t), b.gross_pnl),
                (format!("NetPNL_{}", t), b.net_pnl),
                (format!("Risk_{}", t), b.risk),
                (format!("Cost_{}", t), b.cost),
                (format!("Reward_{}", t), b.reward),
            ]
        }
    }

    /// Value of a named metric.
    pub fn get(&self, key: &str) -> Option<f64> {
        self.entries()
            .into_iter()
            .find_map(|(k, v)| if k == key { Some(v) } else { None })
    }

    /// Converts the metrics into a [`Record`].
    pub fn to_record(&self) -> Record {
        let mut record = Record::empty();
        for (k, v) in self.entries() {
            record.insert(k, RecordValue::Scalar(v as f32));
        }
        record
    }
}
