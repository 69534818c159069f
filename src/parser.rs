//! Portfolio request parsing and validation.
//!
//! Weighted requests are a flat token list `SYM1 W1 SYM2 W2 ... WINDOW`.
//! Equal-weight requests are a symbol list plus an optional window.

use crate::error::{BacktestError, Result};
use crate::types::{PortfolioConfig, WeightedAsset};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Largest absolute weight a single asset may carry.
pub const MAX_ABS_WEIGHT: f64 = 1.0;

/// Ceiling on the sum of absolute weights (300% leverage).
pub const MAX_GROSS_EXPOSURE: f64 = 3.0;

/// A validated weighted portfolio request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPortfolioSpec {
    pub assets: Vec<WeightedAsset>,
    /// Raw window token, resolved later.
    pub window: String,
    /// `1.0 - sum(weights)`. Negative means margin.
    pub cash_weight: f64,
}

impl WeightedPortfolioSpec {
    pub fn symbols(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.symbol.clone()).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.assets.iter().map(|a| a.weight).collect()
    }

    pub fn gross_exposure(&self) -> f64 {
        self.assets.iter().map(|a| a.weight.abs()).sum()
    }

    pub fn to_config(&self, initial_value: f64) -> PortfolioConfig {
        PortfolioConfig::new(self.assets.clone(), initial_value)
    }
}

/// Parse `SYM1 W1 SYM2 W2 ... WINDOW`.
///
/// Checks run in order: token count, symbol/weight pairing, each pair's
/// symbol and weight range, duplicate symbols, then gross exposure. The first failure is
/// returned.
///
/// # Example
/// ```
/// use chartfolio::parser::parse_weighted_portfolio;
///
/// let spec = parse_weighted_portfolio("spy 0.6 tlt 0.3 1y").unwrap();
/// assert_eq!(spec.symbols(), vec!["SPY", "TLT"]);
/// assert!((spec.cash_weight - 0.1).abs() < 1e-9);
/// ```
pub fn parse_weighted_portfolio(input: &str) -> Result<WeightedPortfolioSpec> {
    let tokens: Vec<&str> = input.split_whitespace().collect();
    parse_weighted_tokens(&tokens)
}

/// Token-slice form of [`parse_weighted_portfolio`].
pub fn parse_weighted_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<WeightedPortfolioSpec> {
    if tokens.len() < 3 {
        return Err(BacktestError::InvalidInput(
            "insufficient arguments: need at least symbol weight window".to_string(),
        ));
    }

    let (pairs, window) = tokens.split_at(tokens.len() - 1);
    if pairs.len() % 2 != 0 {
        return Err(BacktestError::InvalidInput(
            "invalid format: each symbol must have a weight".to_string(),
        ));
    }

    let mut assets = Vec::with_capacity(pairs.len() / 2);
    for (idx, pair) in pairs.chunks_exact(2).enumerate() {
        let symbol = pair[0].as_ref().trim().to_uppercase();
        if symbol.is_empty() {
            return Err(BacktestError::InvalidInput(format!(
                "empty symbol at position {}",
                idx + 1
            )));
        }
        let raw = pair[1].as_ref().trim();
        assets.push(WeightedAsset::new(symbol.clone(), parse_weight(&symbol, raw)?));
    }

    let mut seen = HashSet::with_capacity(assets.len());
    for asset in &assets {
        if !seen.insert(asset.symbol.as_str()) {
            return Err(BacktestError::InvalidInput(format!(
                "duplicate symbol: {}",
                asset.symbol
            )));
        }
    }

    let gross: f64 = assets.iter().map(|a| a.weight.abs()).sum();
    if gross > MAX_GROSS_EXPOSURE {
        return Err(BacktestError::InvalidInput(format!(
            "total gross exposure {:.3} exceeds {:.1} (300% leverage limit)",
            gross, MAX_GROSS_EXPOSURE
        )));
    }

    let net: f64 = assets.iter().map(|a| a.weight).sum();
    Ok(WeightedPortfolioSpec {
        assets,
        window: window[0].as_ref().to_string(),
        cash_weight: 1.0 - net,
    })
}

fn parse_weight(symbol: &str, raw: &str) -> Result<f64> {
    let weight: f64 = raw
        .parse()
        .ok()
        .filter(|w: &f64| w.is_finite())
        .ok_or_else(|| {
            BacktestError::InvalidInput(format!("invalid weight '{}' for symbol {}", raw, symbol))
        })?;

    if weight > MAX_ABS_WEIGHT {
        return Err(BacktestError::InvalidInput(format!(
            "long weight {} for symbol {} exceeds 1.0",
            weight, symbol
        )));
    }
    if weight < -MAX_ABS_WEIGHT {
        return Err(BacktestError::InvalidInput(format!(
            "short weight {} for symbol {} exceeds -1.0 (max 100% short)",
            weight, symbol
        )));
    }

    Ok(weight)
}

/// A validated equal-weight request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EqualWeightRequest {
    pub symbols: Vec<String>,
    pub window: String,
}

impl EqualWeightRequest {
    /// Upper-case the symbols and reject empty or duplicate lists.
    pub fn new<S: AsRef<str>>(symbols: &[S], window: impl Into<String>) -> Result<Self> {
        Ok(Self {
            symbols: normalize_symbols(symbols)?,
            window: window.into(),
        })
    }

    pub fn to_config(&self, initial_value: f64) -> PortfolioConfig {
        PortfolioConfig::equal_weight(&self.symbols, initial_value)
    }
}

/// Trim and upper-case a symbol list, skipping blanks.
///
/// Fails when nothing is left or a symbol repeats.
pub fn normalize_symbols<S: AsRef<str>>(symbols: &[S]) -> Result<Vec<String>> {
    let symbols: Vec<String> = symbols
        .iter()
        .map(|s| s.as_ref().trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect();

    if symbols.is_empty() {
        return Err(BacktestError::InvalidInput(
            "at least one symbol is required".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(symbols.len());
    for symbol in &symbols {
        if !seen.insert(symbol.as_str()) {
            return Err(BacktestError::InvalidInput(format!(
                "duplicate symbol: {}",
                symbol
            )));
        }
    }

    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err_msg(input: &str) -> String {
        parse_weighted_portfolio(input).unwrap_err().to_string()
    }

    #[test]
    fn test_parse_long_with_cash() {
        let spec = parse_weighted_portfolio("SPY 0.6 AAPL 0.3 1y").unwrap();
        assert_eq!(spec.symbols(), vec!["SPY", "AAPL"]);
        assert_eq!(spec.weights(), vec![0.6, 0.3]);
        assert_eq!(spec.window, "1y");
        assert!((spec.cash_weight - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_parse_short_and_margin() {
        let spec = parse_weighted_portfolio("TSLA -0.5 AAPL 0.3 6m").unwrap();
        assert!((spec.cash_weight - 1.2).abs() < 1e-12);

        let spec = parse_weighted_portfolio("SPY 1 QQQ 1 TLT 0.5 1y").unwrap();
        assert!((spec.cash_weight + 1.5).abs() < 1e-12);
        assert!((spec.gross_exposure() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_and_unpaired() {
        assert!(err_msg("SPY 1y").contains("insufficient arguments"));
        assert!(err_msg("").contains("insufficient arguments"));
        assert!(err_msg("SPY 0.5 AAPL 1y").contains("each symbol must have a weight"));
    }

    #[test]
    fn test_bad_weights() {
        assert!(err_msg("SPY abc 1y").contains("invalid weight 'abc' for symbol SPY"));
        assert!(err_msg("SPY NaN 1y").contains("invalid weight"));
        assert!(err_msg("SPY inf 1y").contains("invalid weight"));
        assert!(err_msg("SPY 1.5 1y").contains("long weight"));
        assert!(err_msg("SPY -1.01 1y").contains("short weight"));
    }

    #[test]
    fn test_duplicates_checked_before_gross() {
        let msg = err_msg("SPY 1 spy 1 QQQ 1 TLT 1 1y");
        assert!(msg.contains("duplicate symbol: SPY"), "{}", msg);
    }

    #[test]
    fn test_gross_exposure_limit() {
        let msg = err_msg("A 1 B 1 C 1 D 0.5 1y");
        assert!(msg.contains("total gross exposure 3.500 exceeds 3.0"), "{}", msg);
        assert!(parse_weighted_portfolio("A 1 B -1 C 1 1y").is_ok());
    }

    #[test]
    fn test_mixed_long_short_within_limit() {
        let spec = parse_weighted_portfolio("SPY 0.8 QQQ -0.3 VTI 0.4 1y").unwrap();
        assert_eq!(spec.symbols(), vec!["SPY", "QQQ", "VTI"]);
        assert!((spec.gross_exposure() - 1.5).abs() < 1e-12);
        assert!((spec.cash_weight - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_gross_just_over_limit() {
        let msg = err_msg("SPY 1 QQQ -1 VTI 1 TLT 0.1 1y");
        assert!(msg.contains("total gross exposure 3.100 exceeds 3.0"), "{}", msg);
    }

    #[test]
    fn test_empty_symbol_rejected() {
        let err = parse_weighted_tokens(&["", "0.5", "1y"]).unwrap_err();
        assert!(matches!(err, BacktestError::InvalidInput(_)));
        assert!(err.to_string().ends_with("empty symbol at position 1"), "{}", err);

        let msg = parse_weighted_tokens(&["SPY", "0.5", "  ", "0.2", "1y"])
            .unwrap_err()
            .to_string();
        assert!(msg.contains("empty symbol at position 2"), "{}", msg);
    }

    #[test]
    fn test_normalize_symbols_skips_blanks() {
        assert_eq!(normalize_symbols(&[" spy", "", "qqq "]).unwrap(), vec!["SPY", "QQQ"]);
        assert!(normalize_symbols(&["", "  "]).is_err());
        assert!(normalize_symbols(&["SPY", "spy"]).is_err());
    }

    #[test]
    fn test_equal_weight_request() {
        let req = EqualWeightRequest::new(&["spy", "aapl"], "3m").unwrap();
        assert_eq!(req.symbols, vec!["SPY", "AAPL"]);
        let config = req.to_config(100.0);
        assert_eq!(config.cash_weight, 0.0);
        assert_eq!(config.assets[0].weight, 0.5);

        let empty: [&str; 0] = [];
        assert!(EqualWeightRequest::new(&empty, "1y").is_err());
        assert!(EqualWeightRequest::new(&["SPY", "spy"], "1y").is_err());
    }
}
