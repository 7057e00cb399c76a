// src/bulk/pricing.rs — Price suggestion from comparable listings

/// Median of the comparable asking prices, rounded to whole units.
///
/// Returns `None` with fewer than `min_comparables` usable prices (zero,
/// negative and non-finite prices are ignored), or when the median rounds
/// down to zero.
pub fn estimate_price(prices: &[f64], min_comparables: usize) -> Option<f64> {
    let mut usable: Vec<f64> = prices
        .iter()
        .copied()
        .filter(|p| p.is_finite() && *p > 0.0)
        .collect();
    if usable.is_empty() || usable.len() < min_comparables {
        return None;
    }
    usable.sort_by(f64::total_cmp);

    let mid = usable.len() / 2;
    let median = if usable.len() % 2 == 0 {
        (usable[mid - 1] + usable[mid]) / 2.0
    } else {
        usable[mid]
    };
    Some(median.round()).filter(|p| *p > 0.0)
}
