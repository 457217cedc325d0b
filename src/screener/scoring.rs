use rand::Rng;

use crate::models::StockMetrics;

/// Half-width of the ranking jitter added to every score
pub const SCORE_JITTER: f64 = 0.1;

/// Lower is better inside a plausible band; single-digit P/E is not rewarded
pub fn pe_sub_score(pe: f64) -> f64 {
    if pe > 10.0 && pe <= 30.0 {
        4.0
    } else if pe > 30.0 && pe <= 50.0 {
        3.0
    } else if pe > 50.0 && pe <= 70.0 {
        1.5
    } else {
        0.5
    }
}

pub fn sentiment_sub_score(sentiment: f64) -> f64 {
    sentiment * 3.0
}

pub fn volume_sub_score(volume_surge: f64) -> f64 {
    (volume_surge / 2.5).min(2.0)
}

pub fn filing_sub_score(filings: u32) -> f64 {
    (filings as f64 * 0.25).min(1.0)
}

/// Sum of the four sub-scores, without jitter
pub fn base_score(metrics: &StockMetrics) -> f64 {
    pe_sub_score(metrics.pe)
        + sentiment_sub_score(metrics.sentiment)
        + volume_sub_score(metrics.volume_surge_factor)
        + filing_sub_score(metrics.sec_filings_count)
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Base score plus uniform jitter in `[-0.1, 0.1]`, rounded to 3 decimals
pub fn composite_score<R: Rng + ?Sized>(metrics: &StockMetrics, rng: &mut R) -> f64 {
    let jitter = rng.random_range(-SCORE_JITTER..=SCORE_JITTER);
    round_to(base_score(metrics) + jitter, 3)
}
