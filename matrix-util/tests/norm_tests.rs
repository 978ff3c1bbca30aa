use approx::assert_abs_diff_eq;
use matrix_util::dmatrix_util::sample_sd;
use matrix_util::traits::{MatOps, SampleOps};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn unit_variance_columns() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut xx = nalgebra::DMatrix::<f64>::runif_with(100, 10, &mut rng);
    let means_before: Vec<f64> = xx.column_iter().map(|c| c.mean()).collect();
    let sds_before: Vec<f64> = xx
        .column_iter()
        .map(|c| sample_sd(&c.iter().copied().collect::<Vec<_>>()))
        .collect();

    xx.scale_columns_inplace();

    for j in 0..xx.ncols() {
        let col: Vec<f64> = xx.column(j).iter().copied().collect();
        assert_abs_diff_eq!(sample_sd(&col), 1.0, epsilon = 1e-10);
        // not centred
        assert_abs_diff_eq!(xx.column(j).mean(), means_before[j] / sds_before[j], epsilon = 1e-10);
    }
}

#[test]
fn constant_columns_are_left_alone() {
    let mut xx = nalgebra::DMatrix::<f64>::zeros(5, 2);
    xx.column_mut(1).fill(3.0);
    let yy = xx.scale_columns();
    assert_eq!(xx, yy);
}

#[test]
fn row_variance_and_group_means() {
    let xx = nalgebra::DMatrix::<f64>::from_row_slice(2, 4, &[1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0]);
    let var = xx.row_variances();
    assert_abs_diff_eq!(var[0], 5.0 / 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(var[1], 0.0, epsilon = 1e-12);

    let mu = xx.mean_of_columns(&[0, 3]);
    assert_abs_diff_eq!(mu[0], 2.5, epsilon = 1e-12);
    assert_abs_diff_eq!(mu[1], 5.0, epsilon = 1e-12);
}

#[test]
fn seeded_sampling_is_reproducible() -> anyhow::Result<()> {
    let mut r1 = StdRng::seed_from_u64(11);
    let mut r2 = StdRng::seed_from_u64(11);
    let a = nalgebra::DMatrix::<f64>::rgamma_with(4, 3, (2.0, 1.0), &mut r1)?;
    let b = nalgebra::DMatrix::<f64>::rgamma_with(4, 3, (2.0, 1.0), &mut r2)?;
    assert_eq!(a, b);
    assert!(a.iter().all(|&x| x > 0.0));
    Ok(())
}
