pub struct StatsHelper;

impl StatsHelper {
    /// RMS over finite samples; zero when there are none.
    pub fn rms<'a>(samples: impl IntoIterator<Item = &'a f64>) -> f64 {
        let (sum_sq, count) = samples
            .into_iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(sum, n), v| (sum + v * v, n + 1));
        if count == 0 {
            return 0.0;
        }
        (sum_sq / count as f64).sqrt()
    }

    /// Arithmetic mean that does not depend on the order of `values`.
    pub fn ordered_mean(values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(sorted.iter().sum::<f64>() / sorted.len() as f64)
    }

    pub fn finite_count<'a>(samples: impl IntoIterator<Item = &'a f64>) -> usize {
        samples.into_iter().filter(|v| v.is_finite()).count()
    }
}
