use ndarray::Array2;

/// Running per-pixel mean.
///
/// Each array is added then dropped by the caller, so only the f64
/// accumulator stays resident.
pub(crate) struct StreamingMean {
    sum: Array2<f64>,
    count: usize,
}

impl StreamingMean {
    pub fn new(shape: (usize, usize)) -> Self {
        Self {
            sum: Array2::<f64>::zeros(shape),
            count: 0,
        }
    }

    pub fn add(&mut self, data: &Array2<f32>) {
        self.sum
            .zip_mut_with(data, |acc, &v| *acc += v as f64);
        self.count += 1;
    }

    /// `None` if nothing was added.
    pub fn finalize(self) -> Option<Array2<f32>> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(self.sum.mapv(|s| (s / n) as f32))
    }
}
