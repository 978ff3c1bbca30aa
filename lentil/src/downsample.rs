use crate::common::*;
use crate::reference::{MarkerGenes, ReferenceDataset};
use matrix_util::utils::partition_by_membership;
use rand::Rng;

/// How to shrink the reference before training
#[derive(Debug, Clone)]
pub struct DownsampleArgs<'a> {
    /// annotation field holding the cell-type labels
    pub label_field: &'a str,
    /// maximum number of cells per label
    pub cl_n: usize,
    /// number of highly variable genes to add
    pub hvg: usize,
    /// marker genes to keep per cluster (None = all)
    pub ntop: Option<usize>,
}

/// Balanced training subset of a reference
#[derive(Debug, Clone)]
pub struct DownsampledReference {
    /// selected genes x selected cells
    pub counts: Mat,
    pub genes: Vec<Box<str>>,
    /// one label per selected cell
    pub labels: Vec<Box<str>>,
}

impl DownsampledReference {
    pub fn num_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.counts.ncols()
    }
}

/// Indexes of the `n` most variable rows, ties broken by row order
pub fn top_variable_genes(counts: &Mat, n: usize) -> Vec<usize> {
    let variance = counts.row_variances();
    let mut indexed: Vec<(usize, f64)> = variance.into_iter().enumerate().collect();

    // stable sort keeps the original order among ties
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));

    indexed.into_iter().take(n).map(|(i, _)| i).collect()
}

/// Draw up to `cl_n` cells per label and restrict the genes to the
/// union of marker genes and highly variable genes.
///
/// # Arguments
/// * `reference` - full single-cell reference
/// * `markers` - ranked marker genes per cluster
/// * `args` - label field, `cl_n`, `hvg`, `ntop`
/// * `rng` - random source for cell sampling
///
/// # Returns
/// * `DownsampledReference` - cells in ascending original order, genes
///   in the original row order
pub fn downsample_reference<R>(
    reference: &ReferenceDataset,
    markers: &MarkerGenes,
    args: &DownsampleArgs,
    rng: &mut R,
) -> Result<DownsampledReference>
where
    R: Rng + ?Sized,
{
    if args.cl_n == 0 {
        return Err(DeconvError::invalid_config("cl_n must be positive"));
    }

    if args.ntop == Some(0) {
        return Err(DeconvError::invalid_config("ntop must be positive or unset"));
    }

    let labels = reference.labels(args.label_field)?;

    if labels.is_empty() {
        return Err(DeconvError::invalid_config("reference has no cells"));
    }

    // 1. cells: at most cl_n per label
    let groups = partition_by_membership(labels, Some(args.cl_n), rng);

    for (k, cells) in groups.iter() {
        debug!("cluster {}: {} cells retained", k, cells.len());
    }

    for k in markers.clusters() {
        if !groups.contains_key(k) {
            warn!(
                "marker cluster {} has no cell labelled in '{}'",
                k, args.label_field
            );
        }
    }

    let mut cell_index: Vec<usize> = groups.into_values().flatten().collect();
    cell_index.sort_unstable();

    // 2. genes: marker union and highly variable genes
    let gene_position: fnv::FnvHashMap<&str, usize> = reference
        .genes()
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_ref(), i))
        .collect();

    let mut keep = vec![false; reference.num_genes()];
    let mut n_markers = 0;

    for g in markers.top_union(args.ntop) {
        if let Some(&i) = gene_position.get(g.as_ref()) {
            if !keep[i] {
                keep[i] = true;
                n_markers += 1;
            }
        }
    }

    for i in top_variable_genes(reference.counts(), args.hvg) {
        keep[i] = true;
    }

    let gene_index: Vec<usize> = (0..keep.len()).filter(|&i| keep[i]).collect();

    if gene_index.is_empty() {
        return Err(DeconvError::invalid_config(
            "no marker or highly variable gene found in the reference",
        ));
    }

    info!(
        "downsampled reference: {} genes ({} markers) x {} cells",
        gene_index.len(),
        n_markers,
        cell_index.len()
    );

    let counts = reference
        .counts()
        .select_rows(&gene_index)
        .select_columns(&cell_index);

    Ok(DownsampledReference {
        counts,
        genes: gene_index
            .iter()
            .map(|&i| reference.genes()[i].clone())
            .collect(),
        labels: cell_index.iter().map(|&j| labels[j].clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy_reference() -> ReferenceDataset {
        // 4 genes x 7 cells, labels a (5 cells) and b (2 cells)
        let counts = Mat::from_row_slice(
            4,
            7,
            &[
                5.0, 6.0, 5.0, 7.0, 5.0, 0.0, 0.0, //
                0.0, 0.0, 0.0, 0.0, 0.0, 9.0, 8.0, //
                1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, //
                0.0, 3.0, 0.0, 3.0, 0.0, 3.0, 0.0,
            ],
        );
        let genes = (0..4).map(|i| format!("g{}", i).into()).collect();
        let cells = (0..7).map(|i| format!("c{}", i).into()).collect();
        let labels = ["a", "a", "a", "a", "a", "b", "b"]
            .iter()
            .map(|&x| x.into())
            .collect();
        ReferenceDataset::new(counts, genes, cells)
            .unwrap()
            .with_annotation(DEFAULT_LABEL_FIELD, labels)
            .unwrap()
    }

    #[test]
    fn caps_large_clusters_and_keeps_small_ones() {
        let reference = toy_reference();
        let markers = MarkerGenes::from_pairs(vec![("a", "g0"), ("b", "g1")]);
        let args = DownsampleArgs {
            label_field: DEFAULT_LABEL_FIELD,
            cl_n: 3,
            hvg: 0,
            ntop: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = downsample_reference(&reference, &markers, &args, &mut rng).unwrap();

        let n_a = out.labels.iter().filter(|x| x.as_ref() == "a").count();
        let n_b = out.labels.iter().filter(|x| x.as_ref() == "b").count();
        assert_eq!(n_a, 3);
        assert_eq!(n_b, 2);
        assert_eq!(out.genes, vec![Box::from("g0"), Box::from("g1")]);
        assert_eq!(out.counts.shape(), (2, 5));
        // both b cells survive, last in original order
        assert_eq!(out.counts[(1, 3)], 9.0);
        assert_eq!(out.counts[(1, 4)], 8.0);
    }

    #[test]
    fn hvg_are_added_in_original_order() {
        let reference = toy_reference();
        let markers = MarkerGenes::from_pairs(vec![("a", "g3")]);
        let args = DownsampleArgs {
            label_field: DEFAULT_LABEL_FIELD,
            cl_n: 10,
            hvg: 1,
            ntop: None,
        };
        let mut rng = StdRng::seed_from_u64(1);
        let out = downsample_reference(&reference, &markers, &args, &mut rng).unwrap();
        // g1 has the largest variance
        assert_eq!(out.genes, vec![Box::from("g1"), Box::from("g3")]);
        assert_eq!(out.num_cells(), 7);
    }

    #[test]
    fn configuration_errors() {
        let reference = toy_reference();
        let markers = MarkerGenes::from_pairs(vec![("a", "unknown")]);
        let mut rng = StdRng::seed_from_u64(1);

        let mut args = DownsampleArgs {
            label_field: DEFAULT_LABEL_FIELD,
            cl_n: 0,
            hvg: 0,
            ntop: None,
        };
        assert!(matches!(
            downsample_reference(&reference, &markers, &args, &mut rng),
            Err(DeconvError::InvalidConfig(_))
        ));

        // empty gene set
        args.cl_n = 2;
        assert!(matches!(
            downsample_reference(&reference, &markers, &args, &mut rng),
            Err(DeconvError::InvalidConfig(_))
        ));

        // absent label field
        args.label_field = "cluster";
        args.hvg = 2;
        assert!(matches!(
            downsample_reference(&reference, &markers, &args, &mut rng),
            Err(DeconvError::InvalidConfig(_))
        ));
    }
}
