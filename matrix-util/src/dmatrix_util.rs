use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, Gamma};

impl MatOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn scale_columns_inplace(&mut self) {
        for mut xx_j in self.column_iter_mut() {
            let xx: Vec<f64> = xx_j.iter().copied().collect();
            let sd = sample_sd(&xx);
            if sd > 0.0 {
                xx_j /= sd;
            }
        }
    }

    fn scale_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.scale_columns_inplace();
        ret
    }

    fn sum_to_one_columns_inplace(&mut self) {
        for mut xx_j in self.column_iter_mut() {
            let denom = xx_j.sum();
            if denom > 0.0 {
                xx_j /= denom;
            }
        }
    }

    fn sum_to_one_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.sum_to_one_columns_inplace();
        ret
    }

    fn row_variances(&self) -> Vec<f64> {
        self.row_iter()
            .map(|row| {
                let xx: Vec<f64> = row.iter().copied().collect();
                let sd = sample_sd(&xx);
                sd * sd
            })
            .collect()
    }

    fn mean_of_columns(&self, columns: &[usize]) -> Vec<f64> {
        let mut ret = vec![0.0; self.nrows()];
        if columns.is_empty() {
            return ret;
        }
        for &j in columns {
            for (r, x) in ret.iter_mut().zip(self.column(j).iter()) {
                *r += *x;
            }
        }
        let n = columns.len() as f64;
        ret.iter_mut().for_each(|r| *r /= n);
        ret
    }
}

impl SampleOps for DMatrix<f64> {
    type Mat = Self;
    type Scalar = f64;

    fn runif_with<R: Rng + ?Sized>(dd: usize, nn: usize, rng: &mut R) -> Self::Mat {
        // column-major fill keeps the draw order fixed
        DMatrix::<f64>::from_fn(dd, nn, |_, _| rng.random::<f64>())
    }

    fn rgamma_with<R: Rng + ?Sized>(
        dd: usize,
        nn: usize,
        param: (f64, f64),
        rng: &mut R,
    ) -> anyhow::Result<Self::Mat> {
        let (shape, scale) = param;
        let pdf = Gamma::new(shape, scale)
            .map_err(|e| anyhow::anyhow!("invalid gamma parameters: {}", e))?;
        Ok(DMatrix::<f64>::from_fn(dd, nn, |_, _| pdf.sample(rng)))
    }
}

/// Unbiased sample standard deviation (`n - 1` in the denominator).
/// Returns zero for fewer than two elements.
pub fn sample_sd(xx: &[f64]) -> f64 {
    let n = xx.len();
    if n < 2 {
        return 0.0;
    }
    let mu = xx.iter().sum::<f64>() / n as f64;
    let ss = xx.iter().map(|x| (x - mu) * (x - mu)).sum::<f64>();
    (ss / (n as f64 - 1.0)).sqrt()
}

/// Stack column vectors into a matrix
pub fn concatenate_horizontal(columns: &[DVector<f64>]) -> anyhow::Result<DMatrix<f64>> {
    let nrows = columns
        .first()
        .map(|x| x.len())
        .ok_or(anyhow::anyhow!("no columns to concatenate"))?;

    if columns.iter().any(|x| x.len() != nrows) {
        return Err(anyhow::anyhow!("columns have different lengths"));
    }

    Ok(DMatrix::<f64>::from_columns(columns))
}
