use lentil::common::*;
use lentil::config::DeconvConfig;
use lentil::nmf::NmfMethod;
use lentil::reference::MarkerGenes;
use lentil::simulate::{simulate_reference, SimReferenceArgs};
use matrix_util::common_io::{create_temp_dir_file, write_lines};
use matrix_util::traits::MatWithNames;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn config_json_round_trip() -> anyhow::Result<()> {
    let config = DeconvConfig {
        cl_n: 33,
        ntop: Some(5),
        method: NmfMethod::Standard,
        min_cont: 0.08,
        ..Default::default()
    };

    let file = create_temp_dir_file("json")?;
    let file = file.to_str().unwrap();
    config.to_json_file(file)?;

    assert_eq!(DeconvConfig::from_json_file(file)?, config);
    Ok(())
}

#[test]
fn invalid_config_file_is_rejected() -> anyhow::Result<()> {
    let file = create_temp_dir_file("json")?;
    let file = file.to_str().unwrap();
    let lines: Vec<Box<str>> = vec![r#"{"min_cont": 1.5}"#.into()];
    write_lines(&lines, file)?;

    assert!(DeconvConfig::from_json_file(file).is_err());
    Ok(())
}

#[test]
fn marker_file_keeps_rank_order() -> anyhow::Result<()> {
    let file = create_temp_dir_file("tsv.gz")?;
    let file = file.to_str().unwrap();
    let lines: Vec<Box<str>> = vec![
        "T\tCD3E".into(),
        "B\tMS4A1".into(),
        "T\tCD3D".into(),
        "B\tCD79A".into(),
    ];
    write_lines(&lines, file)?;

    let markers = MarkerGenes::from_file(file)?;
    assert_eq!(markers.clusters().collect::<Vec<_>>(), vec!["B", "T"]);
    assert_eq!(
        markers.top_union(Some(1)),
        vec![Box::from("MS4A1"), Box::from("CD3E")]
    );
    Ok(())
}

#[test]
fn simulated_reference_survives_a_file_round_trip() -> anyhow::Result<()> {
    let mut rng = StdRng::seed_from_u64(42);
    let sim = simulate_reference(
        &SimReferenceArgs {
            n_types: 2,
            cells_per_type: 5,
            markers_per_type: 3,
            background_genes: 2,
            ..Default::default()
        },
        &mut rng,
    )?;
    let reference = &sim.reference;

    let file = create_temp_dir_file("tsv.gz")?;
    let file = file.to_str().unwrap();
    reference
        .counts()
        .to_tsv_with_names(reference.genes(), reference.cells(), file)?;

    let MatWithNames { rows, cols, mat } = Mat::read_names_delim(file, "\t")?;
    assert_eq!(rows, reference.genes());
    assert_eq!(cols, reference.cells());
    assert_eq!(&mat, reference.counts());
    Ok(())
}
