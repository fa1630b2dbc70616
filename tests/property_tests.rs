//! Property-based tests for the search machinery.
//!
//! These tests verify invariants that should hold for all valid inputs:
//! split layouts, score ordering and transformation round trips.

use anofox_autoforecast::models::SeriesForecast;
use anofox_autoforecast::search::{
    generate_splits, EvaluationMetrics, EvaluationResult, MetricWeighting, Scorer,
    ValidationMethod,
};
use anofox_autoforecast::transform::{
    FillNa, TransformationParameters, Transformer, TransformerKind,
};
use anofox_autoforecast::utils::SeriesMetrics;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;

/// Strategy for split layouts that always leave room for one training point.
fn layout_strategy() -> impl Strategy<Value = (usize, usize, usize)> {
    (1usize..15, 0usize..5).prop_flat_map(|(fl, k)| {
        let min_n = (k + 1) * fl + 1;
        (min_n..min_n + 60).prop_map(move |n| (n, fl, k))
    })
}

/// Strategy for plausible metric values.
fn metrics_strategy() -> impl Strategy<Value = SeriesMetrics> {
    (
        0.0..200.0_f64,
        0.0..100.0_f64,
        0.0..150.0_f64,
        0.0..50.0_f64,
        0.0..=1.0_f64,
        0.0..=1.0_f64,
    )
        .prop_map(|(smape, mae, rmse, spl, contour, containment)| SeriesMetrics {
            smape,
            mae,
            rmse,
            spl,
            contour,
            containment,
        })
}

/// Strategy for weightings with at least one positive weight.
fn weighting_strategy() -> impl Strategy<Value = MetricWeighting> {
    (prop::collection::vec(0.0..10.0_f64, 7), 0usize..7).prop_map(|(mut w, forced)| {
        w[forced] += 1.0;
        MetricWeighting {
            smape_weighting: w[0],
            mae_weighting: w[1],
            rmse_weighting: w[2],
            spl_weighting: w[3],
            contour_weighting: w[4],
            containment_weighting: w[5],
            runtime_weighting: w[6],
        }
    })
}

fn success(id: usize, metrics: SeriesMetrics, millis: u64) -> EvaluationResult {
    EvaluationResult::success(
        format!("t{id}"),
        0,
        0,
        EvaluationMetrics {
            aggregate: metrics,
            per_series: BTreeMap::new(),
        },
        Duration::from_millis(millis),
    )
}

// ============================================================================
// Validation splits
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn backwards_splits_are_disjoint_and_ordered((n, fl, k) in layout_strategy()) {
        let splits = generate_splits(n, fl, k, ValidationMethod::Backwards).unwrap();
        prop_assert_eq!(splits.len(), k + 1);
        prop_assert_eq!(splits[0].test.clone(), n - fl..n);

        for (i, split) in splits.iter().enumerate() {
            prop_assert_eq!(split.index, i);
            prop_assert_eq!(split.test.len(), fl);
            prop_assert_eq!(split.train.start, 0);
            prop_assert_eq!(split.train.end, split.test.start);
            prop_assert!(!split.train.is_empty());
        }
        for pair in splits.windows(2) {
            prop_assert!(pair[1].test.end <= pair[0].test.start);
        }
    }

    #[test]
    fn even_splits_fit_the_history((n, fl, k) in layout_strategy()) {
        let splits = generate_splits(n, fl, k, ValidationMethod::Even).unwrap();
        prop_assert!(!splits.is_empty() && splits.len() <= k + 1);
        for split in &splits {
            prop_assert!(split.test.end <= n);
            prop_assert!(!split.train.is_empty());
            prop_assert_eq!(split.train.end, split.test.start);
        }
    }

    #[test]
    fn too_short_history_shrinks_validations(fl in 1usize..10, k in 1usize..5) {
        let n = k * fl + 1;
        let splits = generate_splits(n, fl, k, ValidationMethod::Backwards).unwrap();
        prop_assert_eq!(splits.len(), k);
    }
}

// ============================================================================
// Scoring
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn failures_never_outrank_successes(
        weighting in weighting_strategy(),
        population in prop::collection::vec((metrics_strategy(), 0u64..500), 1..8),
    ) {
        let scorer = Scorer::new(weighting, 0.9);
        let mut rows: Vec<EvaluationResult> = population
            .into_iter()
            .enumerate()
            .map(|(i, (m, ms))| success(i, m, ms))
            .collect();
        rows.push(EvaluationResult::failure(
            "broken".to_string(),
            0,
            0,
            "fit failed".to_string(),
            Duration::from_millis(1),
        ));

        let refs: Vec<&EvaluationResult> = rows.iter().collect();
        let scores = scorer.score_rows(&refs);
        let failed = scores[scores.len() - 1];
        prop_assert!(failed.is_infinite() && failed > 0.0);
        for s in &scores[..scores.len() - 1] {
            prop_assert!(s.is_finite());
            prop_assert!(*s >= 0.0);
            prop_assert!(*s < failed);
        }
    }

    #[test]
    fn dominating_metrics_score_no_worse(
        weighting in weighting_strategy(),
        base in metrics_strategy(),
        worse_by in 0.0..10.0_f64,
    ) {
        let mut scorer_weighting = weighting;
        scorer_weighting.runtime_weighting = 0.0;
        if scorer_weighting.validate().is_err() {
            scorer_weighting.mae_weighting = 1.0;
        }
        let scorer = Scorer::new(scorer_weighting, 0.9);
        let worse = SeriesMetrics {
            smape: base.smape + worse_by,
            mae: base.mae + worse_by,
            rmse: base.rmse + worse_by,
            spl: base.spl + worse_by,
            contour: base.contour,
            containment: base.containment,
        };
        let rows = [success(0, base, 10), success(1, worse, 10)];
        let refs: Vec<&EvaluationResult> = rows.iter().collect();
        let scores = scorer.score_rows(&refs);
        prop_assert!(scores[0] <= scores[1] + 1e-12);
    }
}

// ============================================================================
// Transformations
// ============================================================================

/// Strategy for strictly positive series with some structure.
fn positive_values_strategy(min_len: usize, max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1000.0_f64, min_len..max_len).prop_map(|mut v| {
        for (i, val) in v.iter_mut().enumerate() {
            *val += (i as f64) * 0.01;
        }
        v
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn scaler_chains_invert_pointwise(
        values in positive_values_strategy(10, 80),
        picks in prop::collection::vec(0usize..4, 1..4),
    ) {
        let scalers = [
            TransformerKind::MinMaxScaler,
            TransformerKind::StandardScaler,
            TransformerKind::RobustScaler,
            TransformerKind::PositiveShift,
        ];
        let chain: Vec<Transformer> = picks
            .iter()
            .filter_map(|&p| Transformer::parameterless(scalers[p]))
            .collect();
        let params = TransformationParameters::new(FillNa::default(), chain);

        let (transformed, fitted) = params.fit_transform(&values).unwrap();
        prop_assert_eq!(transformed.len(), values.len());
        let restored = fitted.inverse(SeriesForecast::new(
            transformed.clone(),
            transformed.clone(),
            transformed,
        ));
        for (a, b) in values.iter().zip(&restored.point) {
            prop_assert!((a - b).abs() <= 1e-6 * a.abs().max(1.0), "{} vs {}", a, b);
        }
    }
}
