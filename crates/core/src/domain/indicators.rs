use serde::{Deserialize, Serialize};

/// Normalized per-ticker indicators. `None` means unknown, which is never the same as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub peg_ratio: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub current_price: Option<f64>,
    pub return_1m: Option<f64>,
    pub return_6m: Option<f64>,
    pub volatility: Option<f64>,
}
