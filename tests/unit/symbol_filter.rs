use pretty_assertions::assert_eq;
use test_log::test;

use ticker_pipeline::importer::SymbolFilter;

#[test]
fn test_long_symbols_never_survive() {
    let filter = SymbolFilter::default();
    let raw: Vec<String> = (10..20).map(|n| "X".repeat(n)).collect();
    let cleaned = filter.clean(&raw);
    assert_eq!(cleaned.len(), 3);
    assert!(cleaned.iter().all(|s| s.len() <= 12));
}

#[test]
fn test_fund_keywords_excluded_regardless_of_case() {
    let filter = SymbolFilter::default();
    let cleaned = filter.clean(["qqq etf", "ark fund", "gld trust", "spx index", "xyz etn", "KO"]);
    assert_eq!(cleaned, vec!["KO"]);
}

#[test]
fn test_each_symbol_kept_once() {
    let filter = SymbolFilter::default();
    let cleaned = filter.clean(["t", "T", " t ", "VZ", "t"]);
    assert_eq!(cleaned, vec!["T", "VZ"]);
}
