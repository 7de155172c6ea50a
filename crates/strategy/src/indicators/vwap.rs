use common::CandleSeries;

/// Volume-weighted average price, cumulative from the start of the series.
///
/// Price is the typical price `(high + low + close) / 3`. Undefined while the
/// cumulative volume is still zero.
pub fn vwap(highs: &[f64], lows: &[f64], closes: &[f64], volumes: &[f64]) -> Vec<Option<f64>> {
    let mut cum_pv = 0.0;
    let mut cum_v = 0.0;
    highs
        .iter()
        .zip(lows)
        .zip(closes)
        .zip(volumes)
        .map(|(((h, l), c), v)| {
            let typical = (h + l + c) / 3.0;
            cum_pv += typical * v;
            cum_v += v;
            (cum_v != 0.0).then(|| cum_pv / cum_v)
        })
        .collect()
}

pub fn add_vwap(series: &CandleSeries) -> CandleSeries {
    add_vwap_as(series, "vwap")
}

pub fn add_vwap_as(series: &CandleSeries, name: &str) -> CandleSeries {
    let values = vwap(&series.highs(), &series.lows(), &series.closes(), &series.volumes());
    series.with_column(name, values)
}
