//! Chart-ready aggregates computed straight from the uploaded rows.
//!
//! Every aggregate is independent: a row that lacks a field one aggregate needs is
//! skipped for that aggregate only. Key order is first-encountered order, sums are
//! plain `f64` accumulation, and colours come from a fixed palette, so the same
//! rows always serialize to the same bytes.

use crate::schema::{columns, Row};
use crate::utils::calendar_date_label;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// RGB triples cycled by series position.
const SERIES_PALETTE: [(u8, u8, u8); 10] = [
    (54, 162, 235),
    (255, 99, 132),
    (75, 192, 192),
    (255, 159, 64),
    (153, 102, 255),
    (255, 205, 86),
    (201, 203, 207),
    (46, 139, 87),
    (220, 20, 60),
    (0, 128, 128),
];

const SCATTER_ALPHA: f64 = 0.5;
const LINE_ALPHA: f64 = 1.0;

/// Divisor turning a sales amount into a bubble radius hint.
pub const BUBBLE_SIZE_DIVISOR: f64 = 1000.0;

fn series_color(index: usize, alpha: f64) -> String {
    let (r, g, b) = SERIES_PALETTE[index % SERIES_PALETTE.len()];
    format!("rgba({}, {}, {}, {})", r, g, b, alpha)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LabeledTotals {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl LabeledTotals {
    /// Pairs of (label, total) in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.iter().find(|(l, _)| *l == label).map(|(_, v)| v)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: String,
    pub y: f64,
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterDataset {
    pub label: String,
    pub data: Vec<ScatterPoint>,
    pub background_color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScatterData {
    pub datasets: Vec<ScatterDataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesDataset {
    pub label: String,
    pub data: Vec<f64>,
    pub border_color: String,
    pub fill: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub labels: Vec<String>,
    pub datasets: Vec<TimeSeriesDataset>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub region_sales: LabeledTotals,
    pub product_sales: LabeledTotals,
    pub scatter_data: ScatterData,
    pub time_series: TimeSeries,
}

impl ChartData {
    pub fn from_rows(rows: &[Row]) -> Self {
        aggregate_rows(rows)
    }
}

/// Sum in first-seen key order.
#[derive(Default)]
struct OrderedTotals {
    index: HashMap<String, usize>,
    totals: Vec<(String, f64)>,
}

impl OrderedTotals {
    fn add(&mut self, key: String, amount: f64) {
        match self.index.get(&key) {
            Some(&idx) => self.totals[idx].1 += amount,
            None => {
                self.index.insert(key.clone(), self.totals.len());
                self.totals.push((key, amount));
            }
        }
    }

    fn into_labeled(self) -> LabeledTotals {
        let (labels, values) = self.totals.into_iter().unzip();
        LabeledTotals { labels, values }
    }
}

pub fn aggregate_rows(rows: &[Row]) -> ChartData {
    let mut region_totals = OrderedTotals::default();
    let mut product_totals = OrderedTotals::default();
    let mut scatter_index: HashMap<String, usize> = HashMap::new();
    let mut scatter_series: Vec<(String, Vec<ScatterPoint>)> = Vec::new();
    let mut daily: BTreeMap<String, HashMap<String, f64>> = BTreeMap::new();

    for row in rows {
        let Some(amount) = row.amount() else {
            continue;
        };
        let region = row.text(columns::REGION);
        let product = row.text(columns::PRODUCT);

        if let Some(region) = &region {
            region_totals.add(region.clone(), amount);
        }

        if let Some(product) = &product {
            product_totals.add(product.clone(), amount);
        }

        if let (Some(region), Some(product)) = (&region, &product) {
            let point = ScatterPoint {
                x: product.clone(),
                y: amount,
                size: amount / BUBBLE_SIZE_DIVISOR,
            };
            match scatter_index.get(region) {
                Some(&idx) => scatter_series[idx].1.push(point),
                None => {
                    scatter_index.insert(region.clone(), scatter_series.len());
                    scatter_series.push((region.clone(), vec![point]));
                }
            }
        }

        if let (Some(date), Some(product)) = (row.get(columns::DATE), &product) {
            if row.text(columns::DATE).is_some() {
                *daily
                    .entry(calendar_date_label(date))
                    .or_default()
                    .entry(product.clone())
                    .or_insert(0.0) += amount;
            }
        }
    }

    let region_sales = region_totals.into_labeled();
    let product_sales = product_totals.into_labeled();

    let scatter_data = ScatterData {
        datasets: scatter_series
            .into_iter()
            .enumerate()
            .map(|(idx, (label, data))| ScatterDataset {
                label,
                data,
                background_color: series_color(idx, SCATTER_ALPHA),
            })
            .collect(),
    };

    // BTreeMap keys are already in ascending lexicographic order.
    let labels: Vec<String> = daily.keys().cloned().collect();
    let datasets = product_sales
        .labels
        .iter()
        .enumerate()
        .map(|(idx, product)| TimeSeriesDataset {
            label: product.clone(),
            data: daily
                .values()
                .map(|by_product| by_product.get(product).copied().unwrap_or(0.0))
                .collect(),
            border_color: series_color(idx, LINE_ALPHA),
            fill: false,
        })
        .collect();

    debug!(
        "Aggregated {} rows into {} regions, {} products, {} dates",
        rows.len(),
        region_sales.labels.len(),
        product_sales.labels.len(),
        labels.len()
    );

    ChartData {
        region_sales,
        product_sales,
        scatter_data,
        time_series: TimeSeries { labels, datasets },
    }
}
