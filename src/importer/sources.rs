use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a source's body is turned into symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFormat {
    /// nasdaqtrader symbol directory files
    PipeDelimited,
    /// CSV with the symbol in the first present column of `columns`
    Csv { columns: Vec<String> },
    /// Symbol column of the first matching table on a reference page
    HtmlTable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEndpoint {
    pub url: String,
    pub format: SourceFormat,
}

/// Endpoints tried in order until one yields symbols
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceChain {
    pub label: String,
    pub endpoints: Vec<SourceEndpoint>,
}

/// A named group of chains whose results are concatenated.
/// The category counts as failed when every chain comes back empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCategory {
    pub name: String,
    pub chains: Vec<SourceChain>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCatalog {
    pub categories: Vec<SourceCategory>,
}

const NASDAQ_TRADER: &str = "ftp.nasdaqtrader.com/dynamic/SymbolDirectory";
const US_INDICES: &str = "https://raw.githubusercontent.com/shadmansaleh/us-indices/main/data";
const WIKIPEDIA: &str = "https://en.wikipedia.org/wiki";

fn csv(url: impl Into<String>, columns: &[&str]) -> SourceEndpoint {
    SourceEndpoint {
        url: url.into(),
        format: SourceFormat::Csv {
            columns: columns.iter().map(|c| c.to_string()).collect(),
        },
    }
}

fn pipe(url: impl Into<String>) -> SourceEndpoint {
    SourceEndpoint {
        url: url.into(),
        format: SourceFormat::PipeDelimited,
    }
}

fn html(url: impl Into<String>) -> SourceEndpoint {
    SourceEndpoint {
        url: url.into(),
        format: SourceFormat::HtmlTable,
    }
}

fn chain(label: &str, endpoints: Vec<SourceEndpoint>) -> SourceChain {
    SourceChain {
        label: label.to_string(),
        endpoints,
    }
}

fn category(name: &str, chains: Vec<SourceChain>) -> SourceCategory {
    SourceCategory {
        name: name.to_string(),
        chains,
    }
}

impl SourceCatalog {
    /// Load a catalog from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read source catalog {}", path.display()))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str::<Self>(text).context("Invalid source catalog JSON")
    }

    pub fn category_names(&self) -> Vec<&str> {
        self.categories.iter().map(|c| c.name.as_str()).collect()
    }
}

impl Default for SourceCatalog {
    /// Exchanges, OTC, Russell, S&P 1500 and DJIA, in that order
    fn default() -> Self {
        let generic = ["Symbol", "symbol", "Ticker", "ticker", "code"];
        let sp = ["Symbol", "symbol", "Ticker"];
        let russell = ["symbol", "Symbol", "Ticker", "ticker"];
        let russell_mirror = "https://raw.githubusercontent.com/alexander-ponomaroff/russell-index-data/main";

        SourceCatalog {
            categories: vec![
                category(
                    "exchanges",
                    vec![
                        chain(
                            "nasdaq-listed",
                            vec![
                                pipe(format!("http://{}/nasdaqlisted.txt", NASDAQ_TRADER)),
                                pipe(format!("https://{}/nasdaqlisted.txt", NASDAQ_TRADER)),
                                csv(format!("{}/nasdaq.csv", US_INDICES), &generic),
                            ],
                        ),
                        chain(
                            "other-listed",
                            vec![
                                pipe(format!("http://{}/otherlisted.txt", NASDAQ_TRADER)),
                                pipe(format!("https://{}/otherlisted.txt", NASDAQ_TRADER)),
                                csv(format!("{}/nyse.csv", US_INDICES), &generic),
                            ],
                        ),
                    ],
                ),
                category(
                    "otc",
                    vec![chain(
                        "otc",
                        vec![
                            csv(
                                "https://raw.githubusercontent.com/codebox/otc-markets-symbols/master/otc_symbols.csv",
                                &["Symbol", "symbol", "Ticker", "code"],
                            ),
                            csv(format!("{}/otc.csv", US_INDICES), &["Symbol", "symbol", "Ticker", "code"]),
                        ],
                    )],
                ),
                category(
                    "russell",
                    vec![
                        chain(
                            "russell-1000",
                            vec![
                                csv(format!("{}/r1000.csv", US_INDICES), &russell),
                                csv(format!("{}/russell1000.csv", russell_mirror), &russell),
                            ],
                        ),
                        chain(
                            "russell-2000",
                            vec![
                                csv(format!("{}/r2000.csv", US_INDICES), &russell),
                                csv(format!("{}/russell2000.csv", russell_mirror), &russell),
                            ],
                        ),
                        chain(
                            "russell-3000",
                            vec![
                                csv(format!("{}/r3000.csv", US_INDICES), &russell),
                                csv(format!("{}/russell3000.csv", russell_mirror), &russell),
                            ],
                        ),
                    ],
                ),
                category(
                    "sp1500",
                    vec![
                        chain(
                            "sp500",
                            vec![
                                csv(format!("{}/sp500.csv", US_INDICES), &sp),
                                csv(
                                    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/master/data/constituents.csv",
                                    &sp,
                                ),
                                html(format!("{}/List_of_S%26P_500_companies", WIKIPEDIA)),
                            ],
                        ),
                        chain(
                            "sp400",
                            vec![
                                csv(format!("{}/sp400.csv", US_INDICES), &sp),
                                csv(
                                    "https://raw.githubusercontent.com/angeloashmore/sandp400/master/data/sandp400.csv",
                                    &sp,
                                ),
                                html(format!("{}/List_of_S%26P_400_companies", WIKIPEDIA)),
                            ],
                        ),
                        chain(
                            "sp600",
                            vec![
                                csv(format!("{}/sp600.csv", US_INDICES), &sp),
                                html(format!("{}/List_of_S%26P_600_companies", WIKIPEDIA)),
                            ],
                        ),
                    ],
                ),
                category(
                    "djia",
                    vec![chain(
                        "djia",
                        vec![
                            csv(format!("{}/djia.csv", US_INDICES), &sp),
                            csv(
                                "https://raw.githubusercontent.com/datasets/dow-jones-industrial-average/master/data/djia.csv",
                                &sp,
                            ),
                            html(format!("{}/Dow_Jones_Industrial_Average", WIKIPEDIA)),
                        ],
                    )],
                ),
            ],
        }
    }
}
