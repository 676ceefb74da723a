use sales_insight_pipeline::utils::{calendar_date_label, UNKNOWN_DATE_LABEL};
use sales_insight_pipeline::*;
use serde_json::Value;

fn load_fixture_rows() -> Vec<Row> {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/sales.csv");
    let mut reader = csv::Reader::from_path(path).expect("fixture should open");
    let headers = reader.headers().expect("fixture has headers").clone();

    reader
        .records()
        .map(|record| {
            let record = record.expect("fixture record");
            headers
                .iter()
                .zip(record.iter())
                .filter(|(_, cell)| !cell.is_empty())
                .map(|(h, cell)| (h.to_string(), Value::String(cell.to_string())))
                .collect()
        })
        .collect()
}

fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-6, "{} != {}", a, b);
}

#[test]
fn test_aggregation_is_deterministic() {
    let rows = load_fixture_rows();
    let first = serde_json::to_string(&aggregate_rows(&rows)).unwrap();
    for _ in 0..5 {
        assert_eq!(serde_json::to_string(&aggregate_rows(&rows)).unwrap(), first);
    }
}

#[test]
fn test_region_and_product_totals_cross_check() {
    // Restrict to rows carrying both keys so the two groupings cover the same sales.
    let rows: Vec<Row> = load_fixture_rows()
        .into_iter()
        .filter(|r| r.text(columns::REGION).is_some() && r.text(columns::PRODUCT).is_some())
        .collect();

    let charts = aggregate_rows(&rows);
    let expected: f64 = rows.iter().filter_map(Row::amount).sum();

    assert_close(charts.region_sales.total(), expected);
    assert_close(charts.product_sales.total(), expected);
    assert_close(charts.region_sales.total(), charts.product_sales.total());
}

#[test]
fn test_partial_rows_only_drop_out_where_needed() {
    let rows = load_fixture_rows();
    let charts = aggregate_rows(&rows);

    // The row without a product still counts towards 北區.
    let north_expected: f64 = rows
        .iter()
        .filter(|r| r.text(columns::REGION).as_deref() == Some("北區"))
        .filter_map(Row::amount)
        .sum();
    assert_close(charts.region_sales.get("北區").unwrap(), north_expected);

    // The row without an amount contributes nowhere.
    let scatter_points: usize = charts
        .scatter_data
        .datasets
        .iter()
        .map(|d| d.data.len())
        .sum();
    let complete = rows
        .iter()
        .filter(|r| {
            r.text(columns::REGION).is_some()
                && r.text(columns::PRODUCT).is_some()
                && r.amount().is_some()
        })
        .count();
    assert_eq!(scatter_points, complete);
}

#[test]
fn test_time_series_values_match_source_rows() {
    let rows = load_fixture_rows();
    let charts = aggregate_rows(&rows);
    let series = &charts.time_series;

    let mut sorted = series.labels.clone();
    sorted.sort();
    assert_eq!(series.labels, sorted);
    assert_eq!(series.labels.last().map(String::as_str), Some(UNKNOWN_DATE_LABEL));

    for dataset in &series.datasets {
        assert_eq!(dataset.data.len(), series.labels.len());
        for (date, value) in series.labels.iter().zip(&dataset.data) {
            let expected: f64 = rows
                .iter()
                .filter(|r| r.text(columns::PRODUCT).as_deref() == Some(dataset.label.as_str()))
                .filter(|r| {
                    r.get(columns::DATE)
                        .map(|d| calendar_date_label(d) == *date)
                        .unwrap_or(false)
                })
                .filter_map(Row::amount)
                .sum();
            assert_close(*value, expected);
        }
    }
}

#[test]
fn test_fixture_specifics() {
    let charts = aggregate_rows(&load_fixture_rows());

    assert_eq!(charts.region_sales.labels, vec!["北區", "南區", "東區", "西區"]);
    assert_eq!(
        charts.product_sales.labels,
        vec!["筆記型電腦", "智慧型手機", "平板電腦"]
    );

    // "2024/01/10" and "2024-01-10" share a bucket.
    let idx = charts
        .time_series
        .labels
        .iter()
        .position(|l| l == "2024-01-10")
        .unwrap();
    assert_close(charts.time_series.datasets[0].data[idx], 52000.0);
    assert_close(charts.time_series.datasets[1].data[idx], 17300.0);

    // Thousands separators are understood.
    assert_close(charts.product_sales.get("平板電腦").unwrap(), 12500.5 + 13200.0 + 11000.0 + 9800.0 + 12000.0 + 10500.0);
}
