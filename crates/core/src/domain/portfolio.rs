use serde::{Deserialize, Serialize};

/// One holding as read from the portfolio sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioEntry {
    pub ticker: String,
    pub shares: f64,
    pub avg_cost: f64,
}

impl PortfolioEntry {
    /// Unrealized gain of the position at `price`, as a fraction of the average cost.
    pub fn unrealized_return(&self, price: Option<f64>) -> Option<f64> {
        let price = price?;
        if self.avg_cost == 0.0 || !self.avg_cost.is_finite() {
            return None;
        }
        Some((price - self.avg_cost) / self.avg_cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(avg_cost: f64) -> PortfolioEntry {
        PortfolioEntry {
            ticker: "INFY.NS".to_string(),
            shares: 10.0,
            avg_cost,
        }
    }

    #[test]
    fn unrealized_return_against_avg_cost() {
        let r = entry(100.0).unrealized_return(Some(110.0)).unwrap();
        assert!((r - 0.10).abs() < 1e-12);
    }

    #[test]
    fn unrealized_return_unknown_without_price_or_cost() {
        assert_eq!(entry(100.0).unrealized_return(None), None);
        assert_eq!(entry(0.0).unrealized_return(Some(5.0)), None);
    }
}
