/// A binned view of a scalar series, used by plotting consumers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Histogram {
    pub bins: Vec<f32>,
    /// The value interval covered by the bins.
    pub value_range: (f32, f32),
    pub num_samples: usize,
}

/// Bins `data` over its own min/max range.
pub fn compute_histogram(num_bins: usize, data: &[f32]) -> Histogram {
    if data.is_empty() {
        return Histogram::default();
    }
    let mut min_val = f32::MAX;
    let mut max_val = f32::MIN;
    for &v in data {
        min_val = min_val.min(v);
        max_val = max_val.max(v);
    }
    compute_histogram_with_range(num_bins, data, min_val, max_val)
}

/// Bins `data` over an explicit value range. Values outside the range are
/// clamped into the edge bins; periodic quantities should be binned over
/// their full period so the wrap boundary maps to the histogram edges.
pub fn compute_histogram_with_range(
    num_bins: usize,
    data: &[f32],
    min_val: f32,
    max_val: f32,
) -> Histogram {
    if num_bins == 0 || data.is_empty() {
        return Histogram::default();
    }

    let mut bins = vec![0.0f32; num_bins];
    let span = max_val - min_val;
    let scale = if span > 0.0 {
        num_bins as f32 / span
    } else {
        0.0
    };
    for &v in data {
        let bin = (((v - min_val) * scale) as isize).clamp(0, num_bins as isize - 1) as usize;
        bins[bin] += 1.0;
    }

    Histogram {
        bins,
        value_range: (min_val, max_val),
        num_samples: data.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_cover_the_value_range() {
        let data = [0.0, 0.1, 0.9, 1.0, 0.5];
        let hist = compute_histogram(2, &data);

        assert_eq!(hist.value_range, (0.0, 1.0));
        assert_eq!(hist.num_samples, 5);
        assert_eq!(hist.bins[0], 2.0);
        assert_eq!(hist.bins[1], 3.0);
        assert_eq!(hist.bins.iter().sum::<f32>(), 5.0);
    }

    #[test]
    fn out_of_range_values_clamp_to_edge_bins() {
        let hist = compute_histogram_with_range(4, &[-10.0, 10.0], 0.0, 1.0);
        assert_eq!(hist.bins[0], 1.0);
        assert_eq!(hist.bins[3], 1.0);
    }

    #[test]
    fn constant_data_lands_in_the_first_bin() {
        let hist = compute_histogram(4, &[2.5, 2.5, 2.5]);
        assert_eq!(hist.bins[0], 3.0);
        assert_eq!(hist.num_samples, 3);
    }

    #[test]
    fn empty_input_yields_empty_histogram() {
        assert_eq!(compute_histogram(8, &[]), Histogram::default());
    }
}
