use rand::rngs::StdRng;
use rand::SeedableRng;
use test_log::test;

use ticker_pipeline::models::StockMetrics;
use ticker_pipeline::screener::scoring::{base_score, composite_score, pe_sub_score, SCORE_JITTER};

#[test]
fn test_pe_sub_score_upper_bounds_are_inclusive() {
    assert_eq!(pe_sub_score(30.0), 4.0);
    assert_eq!(pe_sub_score(30.01), 3.0);
    assert_eq!(pe_sub_score(70.01), 0.5);
    assert_eq!(pe_sub_score(5.0), 0.5);
}

#[test]
fn test_score_within_jitter_of_base_for_many_inputs() {
    let mut rng = StdRng::seed_from_u64(42);
    for pe in [0.0, 9.9, 15.0, 30.0, 49.0, 65.0, 120.0] {
        for sentiment in [0.0, 0.4, 0.95, 1.0] {
            for filings in [0, 1, 4, 12] {
                let metrics = StockMetrics {
                    pe,
                    sentiment,
                    volume_surge_factor: 3.3,
                    sec_filings_count: filings,
                };
                let base = base_score(&metrics);
                assert_eq!(base, base_score(&metrics));

                let score = composite_score(&metrics, &mut rng);
                assert!((score - base).abs() <= SCORE_JITTER + 0.0005);
            }
        }
    }
}
