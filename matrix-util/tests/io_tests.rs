use matrix_util::common_io::create_temp_dir_file;
use matrix_util::traits::{IoOps, MatWithNames, SampleOps};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn dmatrix_io_test() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let xx = nalgebra::DMatrix::<f64>::runif_with(50, 50, &mut rng);

    let tsv_file = create_temp_dir_file("txt.gz")?;
    xx.to_tsv(tsv_file.to_str().unwrap())?;

    let yy = nalgebra::DMatrix::<f64>::read_file_delim(tsv_file.to_str().unwrap(), "\t", None)?;

    approx::assert_abs_diff_eq!(xx, yy, epsilon = 1e-12);

    Ok(())
}

#[test]
fn dmatrix_names_io_test() -> anyhow::Result<()> {
    let xx = nalgebra::DMatrix::<f64>::from_row_slice(2, 3, &[1.0, 0.0, 2.5, 3.0, 4.0, 0.0]);
    let rows: Vec<Box<str>> = vec!["g1".into(), "g2".into()];
    let cols: Vec<Box<str>> = vec!["c1".into(), "c2".into(), "c3".into()];

    let tsv_file = create_temp_dir_file("tsv.gz")?;
    xx.to_tsv_with_names(&rows, &cols, tsv_file.to_str().unwrap())?;

    let MatWithNames {
        rows: rows_in,
        cols: cols_in,
        mat,
    } = nalgebra::DMatrix::<f64>::read_names_delim(tsv_file.to_str().unwrap(), "\t")?;

    assert_eq!(rows, rows_in);
    assert_eq!(cols, cols_in);
    assert_eq!(xx, mat);
    Ok(())
}

#[test]
fn mismatched_names_are_rejected() {
    let xx = nalgebra::DMatrix::<f64>::zeros(2, 2);
    let rows: Vec<Box<str>> = vec!["g1".into()];
    let cols: Vec<Box<str>> = vec!["c1".into(), "c2".into()];
    assert!(xx.to_tsv_with_names(&rows, &cols, "stdout").is_err());
}
