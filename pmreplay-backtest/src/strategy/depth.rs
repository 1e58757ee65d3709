//! Order book depth scanner over the tick's recorded depth summary.
//!
//! The summary is expected to carry a YES book as `{"bids": [...], "asks": [...]}`
//! with `{"price", "size"}` levels (decimal strings or numbers). Ticks without
//! one are skipped.

use super::{Signal, StrategyEvaluator};
use crate::error::EvaluatorError;
use derive_more::Display;
use itertools::Itertools;
use pmreplay_data::{MarketId, Tick};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Thresholds for [`DepthScannerEvaluator`]. All comparisons are strict.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct DepthScannerConfig {
    /// Combined YES + NO depth below which a book is thin
    pub min_depth: Decimal,
    /// Widest acceptable top-of-book gap on either side
    pub max_gap: Decimal,
    /// Absolute YES - NO depth difference above which a book is imbalanced
    #[serde(alias = "imbalance_ratio")]
    pub max_imbalance: Decimal,
    /// Markets to scan; empty scans every market
    pub markets_to_watch: Vec<MarketId>,
}

impl Default for DepthScannerConfig {
    fn default() -> Self {
        Self {
            min_depth: Decimal::new(500, 0),
            max_gap: Decimal::new(10, 2), // 0.10
            max_imbalance: Decimal::new(300, 0),
            markets_to_watch: Vec::new(),
        }
    }
}

/// One price level of a recorded book.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DepthLevel {
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub size: Decimal,
}

/// YES order book snapshot from a tick's depth summary.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DepthBook {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

impl DepthBook {
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.iter().map(|level| level.price).max()
    }

    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.iter().map(|level| level.price).min()
    }
}

/// Depth metrics of a binary market book.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub struct DepthMetrics {
    pub total_yes_depth: Decimal,
    pub total_no_depth: Decimal,
    pub top_gap_yes: Decimal,
    pub top_gap_no: Decimal,
    /// `total_yes_depth - total_no_depth`
    pub imbalance: Decimal,
}

impl DepthMetrics {
    /// Derive metrics from a YES book.
    ///
    /// Buying YES is selling NO, so the NO book mirrors the YES book around
    /// 1.00: same total depth, same top-of-book gap.
    pub fn from_book(book: &DepthBook) -> Self {
        let total_yes_depth = book
            .bids
            .iter()
            .chain(&book.asks)
            .map(|level| level.size)
            .sum::<Decimal>();
        let top_gap = match (book.best_bid(), book.best_ask()) {
            (Some(bid), Some(ask)) => ask - bid,
            _ => Decimal::ZERO,
        };

        Self {
            total_yes_depth,
            total_no_depth: total_yes_depth,
            top_gap_yes: top_gap,
            top_gap_no: top_gap,
            imbalance: Decimal::ZERO,
        }
    }

    pub fn total_depth(&self) -> Decimal {
        self.total_yes_depth + self.total_no_depth
    }

    pub fn max_gap(&self) -> Decimal {
        self.top_gap_yes.max(self.top_gap_no)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthSignalKind {
    #[display("thin_depth")]
    ThinDepth,
    #[display("large_gap")]
    LargeGap,
    #[display("strong_imbalance")]
    StrongImbalance,
}

/// A single threshold breach.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DepthFinding {
    pub signal_type: DepthSignalKind,
    pub reason: String,
    pub metrics: serde_json::Value,
}

/// Threshold breaches for `metrics`, in thin / gap / imbalance order.
pub fn detect_depth_signals(
    metrics: &DepthMetrics,
    config: &DepthScannerConfig,
) -> Vec<DepthFinding> {
    let mut findings = Vec::new();

    let total_depth = metrics.total_depth();
    if total_depth < config.min_depth {
        findings.push(DepthFinding {
            signal_type: DepthSignalKind::ThinDepth,
            reason: format!("Thin orderbook depth: {total_depth} < {}", config.min_depth),
            metrics: json!({ "total_depth": total_depth, "threshold": config.min_depth }),
        });
    }

    let max_gap = metrics.max_gap();
    if max_gap > config.max_gap {
        findings.push(DepthFinding {
            signal_type: DepthSignalKind::LargeGap,
            reason: format!("Large bid-ask gap: {max_gap} > {}", config.max_gap),
            metrics: json!({ "max_gap": max_gap, "threshold": config.max_gap }),
        });
    }

    if metrics.imbalance.abs() > config.max_imbalance {
        let deeper_side = if metrics.imbalance.is_sign_positive() { "YES" } else { "NO" };
        findings.push(DepthFinding {
            signal_type: DepthSignalKind::StrongImbalance,
            reason: format!(
                "Strong depth imbalance: {deeper_side} deeper by {}",
                metrics.imbalance.abs()
            ),
            metrics: json!({
                "imbalance": metrics.imbalance,
                "threshold": config.max_imbalance,
                "deeper_side": deeper_side,
            }),
        });
    }

    findings
}

#[derive(Serialize)]
struct DepthPayload<'a> {
    signals: &'a [DepthFinding],
    metrics: &'a DepthMetrics,
}

/// Signals when a tick's recorded book is thin, wide or one-sided.
///
/// Every breach found on one tick is folded into a single signal.
#[derive(Debug, Clone, Default)]
pub struct DepthScannerEvaluator {
    config: DepthScannerConfig,
}

impl DepthScannerEvaluator {
    pub fn new(config: DepthScannerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DepthScannerConfig {
        &self.config
    }

    fn watches(&self, market_id: &MarketId) -> bool {
        self.config.markets_to_watch.is_empty() || self.config.markets_to_watch.contains(market_id)
    }
}

impl StrategyEvaluator for DepthScannerEvaluator {
    fn evaluate(&mut self, tick: &Tick) -> Result<Option<Signal>, EvaluatorError> {
        if !self.watches(&tick.market_id) {
            return Ok(None);
        }
        let Some(summary) = tick.depth_summary.as_ref() else {
            return Ok(None);
        };
        if summary.get("bids").is_none() || summary.get("asks").is_none() {
            return Ok(None);
        }

        let book = DepthBook::deserialize(summary).map_err(|error| EvaluatorError::MalformedTick {
            market_id: tick.market_id.clone(),
            reason: format!("unreadable depth summary: {error}"),
        })?;
        let metrics = DepthMetrics::from_book(&book);
        let findings = detect_depth_signals(&metrics, &self.config);
        if findings.is_empty() {
            return Ok(None);
        }

        let notes = findings.iter().map(|finding| finding.reason.as_str()).join("; ");
        let payload = DepthPayload {
            signals: &findings,
            metrics: &metrics,
        };
        Ok(Some(Signal::from_payload(&payload)?.with_notes(notes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn tick(market: &str, depth: Option<serde_json::Value>) -> Tick {
        let tick = Tick::new(market, Utc::now(), dec!(0.5), dec!(0.5), dec!(10));
        match depth {
            Some(depth) => tick.with_depth_summary(depth),
            None => tick,
        }
    }

    fn metrics(yes: Decimal, no: Decimal, gap_yes: Decimal, gap_no: Decimal) -> DepthMetrics {
        DepthMetrics {
            total_yes_depth: yes,
            total_no_depth: no,
            top_gap_yes: gap_yes,
            top_gap_no: gap_no,
            imbalance: yes - no,
        }
    }

    fn kinds(findings: &[DepthFinding]) -> Vec<DepthSignalKind> {
        findings.iter().map(|finding| finding.signal_type).collect()
    }

    #[test]
    fn test_metrics_from_book() {
        let book: DepthBook = serde_json::from_value(json!({
            "bids": [{"price": "0.45", "size": "100"}, {"price": "0.44", "size": "200"}],
            "asks": [{"price": "0.56", "size": 250}, {"price": "0.55", "size": "150"}],
        }))
        .unwrap();

        let metrics = DepthMetrics::from_book(&book);
        assert_eq!(metrics.total_yes_depth, dec!(700));
        assert_eq!(metrics.total_depth(), dec!(1400));
        assert_eq!(metrics.top_gap_yes, dec!(0.10));
        assert_eq!(metrics.top_gap_no, dec!(0.10));
        assert_eq!(metrics.imbalance, Decimal::ZERO);

        let one_sided = DepthBook {
            bids: book.bids.clone(),
            asks: Vec::new(),
        };
        assert_eq!(DepthMetrics::from_book(&one_sided).max_gap(), Decimal::ZERO);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let config = DepthScannerConfig::default();

        let at_thresholds = DepthMetrics {
            imbalance: dec!(300),
            ..metrics(dec!(250), dec!(250), dec!(0.10), dec!(0.08))
        };
        assert!(detect_depth_signals(&at_thresholds, &config).is_empty());

        let healthy = metrics(dec!(5000), dec!(5000), dec!(0.02), dec!(0.02));
        assert!(detect_depth_signals(&healthy, &config).is_empty());

        let breached = metrics(dec!(150), dec!(100), dec!(0.20), dec!(0.18));
        let findings = detect_depth_signals(&breached, &config);
        assert_eq!(
            kinds(&findings),
            vec![DepthSignalKind::ThinDepth, DepthSignalKind::LargeGap]
        );
        assert_eq!(findings[1].metrics["max_gap"], json!("0.20"));
    }

    #[test]
    fn test_imbalance_reports_deeper_side() {
        let config = DepthScannerConfig::default();

        let yes_heavy = metrics(dec!(1500), dec!(1000), dec!(0.05), dec!(0.05));
        let findings = detect_depth_signals(&yes_heavy, &config);
        assert_eq!(kinds(&findings), vec![DepthSignalKind::StrongImbalance]);
        assert_eq!(findings[0].metrics["deeper_side"], "YES");

        let no_heavy = metrics(dec!(800), dec!(1500), dec!(0.05), dec!(0.05));
        let findings = detect_depth_signals(&no_heavy, &config);
        assert_eq!(findings[0].metrics["deeper_side"], "NO");
        assert!(findings[0].reason.contains("NO deeper by 700"));
    }

    #[test]
    fn test_evaluator_folds_findings_into_one_signal() {
        let mut evaluator = DepthScannerEvaluator::default();
        let thin_and_wide = json!({
            "bids": [{"price": "0.45", "size": "50"}],
            "asks": [{"price": "0.65", "size": "50"}],
        });

        let signal = evaluator
            .evaluate(&tick("m1", Some(thin_and_wide)))
            .unwrap()
            .unwrap();
        assert_eq!(signal.payload["signals"][0]["signal_type"], "thin_depth");
        assert_eq!(signal.payload["signals"][1]["signal_type"], "large_gap");
        assert_eq!(signal.payload["metrics"]["total_yes_depth"], "100");
        assert!(signal.notes.contains("Thin orderbook depth"));
        assert!(signal.notes.contains("Large bid-ask gap"));
    }

    #[test]
    fn test_evaluator_skips_ticks_without_book() {
        let mut evaluator = DepthScannerEvaluator::default();
        assert!(evaluator.evaluate(&tick("m1", None)).unwrap().is_none());
        assert!(evaluator
            .evaluate(&tick("m1", Some(json!({"bid_depth": 10}))))
            .unwrap()
            .is_none());
        assert!(evaluator
            .evaluate(&tick("m1", Some(json!({"bids": []}))))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_evaluator_respects_watch_list_and_rejects_bad_levels() {
        let config: DepthScannerConfig = serde_json::from_value(json!({
            "min_depth": "1000",
            "imbalance_ratio": "500",
            "markets_to_watch": ["m1"],
        }))
        .unwrap();
        assert_eq!(config.max_imbalance, dec!(500));
        assert_eq!(config.max_gap, dec!(0.10));

        let mut evaluator = DepthScannerEvaluator::new(config);
        let thin = json!({
            "bids": [{"price": "0.49", "size": "10"}],
            "asks": [{"price": "0.51", "size": "10"}],
        });
        assert!(evaluator
            .evaluate(&tick("m2", Some(thin.clone())))
            .unwrap()
            .is_none());
        assert!(evaluator.evaluate(&tick("m1", Some(thin))).unwrap().is_some());

        let garbled = json!({"bids": [{"price": "0.49", "size": "lots"}], "asks": []});
        assert!(matches!(
            evaluator.evaluate(&tick("m1", Some(garbled))),
            Err(EvaluatorError::MalformedTick { .. })
        ));
    }
}
