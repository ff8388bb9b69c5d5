use ndarray::{s, Array2, Zip};
use num_complex::Complex64;
use rustfft::{num_traits::Zero, FftDirection, FftPlanner};

/// Helper that wraps the `rustfft` planner for 2-D linear convolution.
pub struct FftHelper {
    planner: FftPlanner<f64>,
}

impl FftHelper {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Convolves `image` with an odd-sized, centred `kernel`, returning an
    /// array of the image's shape. Non-finite input pixels contribute nothing
    /// and stay non-finite in the output. Their neighbours are rescaled by the
    /// share of the kernel that fell on finite pixels, so blanked regions do
    /// not darken their surroundings. Outside the image the input is zero.
    pub fn convolve(&mut self, image: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
        let (rows, cols) = image.dim();
        let (krows, kcols) = kernel.dim();
        let padded = (rows + krows - 1, cols + kcols - 1);

        let mut signal = Array2::<Complex64>::zeros(padded);
        let mut blanked = Array2::<Complex64>::zeros(padded);
        let mut any_blank = false;
        for ((r, c), &v) in image.indexed_iter() {
            if v.is_finite() {
                signal[[r, c]] = Complex64::new(v, 0.0);
            } else {
                blanked[[r, c]] = Complex64::new(1.0, 0.0);
                any_blank = true;
            }
        }
        let mut response = Array2::<Complex64>::zeros(padded);
        for ((r, c), &v) in kernel.indexed_iter() {
            response[[r, c]] = Complex64::new(v, 0.0);
        }

        self.transform(&mut response, FftDirection::Forward);
        let mut out = self.filter(signal, &response, rows, cols, (krows, kcols));
        if any_blank {
            let total: f64 = kernel.sum();
            let lost = self.filter(blanked, &response, rows, cols, (krows, kcols));
            Zip::from(&mut out).and(&lost).for_each(|o, &lost| {
                let kept = total - lost;
                if kept.abs() > 1e-12 * total.abs() {
                    *o *= total / kept;
                }
            });
        }
        out.zip_mut_with(image, |o, &v| {
            if !v.is_finite() {
                *o = v;
            }
        });
        out
    }

    /// Multiplies `data` by the transformed kernel and returns the centred
    /// `rows x cols` window of the result.
    fn filter(
        &mut self,
        mut data: Array2<Complex64>,
        response: &Array2<Complex64>,
        rows: usize,
        cols: usize,
        (krows, kcols): (usize, usize),
    ) -> Array2<f64> {
        self.transform(&mut data, FftDirection::Forward);
        data.zip_mut_with(response, |a, b| *a *= *b);
        self.transform(&mut data, FftDirection::Inverse);

        let norm = data.len() as f64;
        let (r0, c0) = ((krows - 1) / 2, (kcols - 1) / 2);
        data.slice(s![r0..r0 + rows, c0..c0 + cols])
            .mapv(|v| v.re / norm)
    }

    fn transform(&mut self, data: &mut Array2<Complex64>, direction: FftDirection) {
        let (rows, cols) = data.dim();

        let fft = self.planner.plan_fft(cols, direction);
        for mut row in data.rows_mut() {
            let mut buffer: Vec<Complex64> = row.iter().cloned().collect();
            fft.process(&mut buffer);
            row.iter_mut().zip(buffer).for_each(|(dst, src)| *dst = src);
        }

        let fft = self.planner.plan_fft(rows, direction);
        let mut buffer = vec![Complex64::zero(); rows];
        for mut column in data.columns_mut() {
            buffer.iter_mut().zip(column.iter()).for_each(|(dst, src)| *dst = *src);
            fft.process(&mut buffer);
            column.iter_mut().zip(buffer.iter()).for_each(|(dst, src)| *dst = *src);
        }
    }
}

impl Default for FftHelper {
    fn default() -> Self {
        Self::new()
    }
}
