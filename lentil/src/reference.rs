use crate::common::*;
use fnv::FnvHashSet as HashSet;
use std::collections::BTreeMap;

fn check_unique_names(names: &[Box<str>], what: &str) -> Result<()> {
    let mut seen: HashSet<&str> = HashSet::default();
    for x in names {
        if !seen.insert(x.as_ref()) {
            return Err(DeconvError::invalid_config(format!(
                "duplicate {} name: {}",
                what, x
            )));
        }
    }
    Ok(())
}

fn check_shape(counts: &Mat, rows: &[Box<str>], cols: &[Box<str>], what: &str) -> Result<()> {
    if counts.nrows() != rows.len() || counts.ncols() != cols.len() {
        return Err(DeconvError::dimension_mismatch(format!(
            "{} matrix is {} x {}, but {} row names and {} column names were given",
            what,
            counts.nrows(),
            counts.ncols(),
            rows.len(),
            cols.len()
        )));
    }
    Ok(())
}

/// Single-cell reference: a genes x cells non-negative count matrix
/// with per-cell annotation fields (e.g., `cell_type`)
#[derive(Debug, Clone)]
pub struct ReferenceDataset {
    counts: Mat,
    genes: Vec<Box<str>>,
    cells: Vec<Box<str>>,
    annotations: BTreeMap<Box<str>, Vec<Box<str>>>,
}

impl ReferenceDataset {
    /// * `counts` - genes x cells
    /// * `genes` - row names
    /// * `cells` - column names
    pub fn new(counts: Mat, genes: Vec<Box<str>>, cells: Vec<Box<str>>) -> Result<Self> {
        check_shape(&counts, &genes, &cells, "reference")?;
        check_unique_names(&genes, "gene")?;
        check_non_negative(&counts, "reference counts")?;
        Ok(Self {
            counts,
            genes,
            cells,
            annotations: BTreeMap::new(),
        })
    }

    /// Attach (or replace) a per-cell annotation field
    pub fn with_annotation(mut self, field: &str, labels: Vec<Box<str>>) -> Result<Self> {
        if labels.len() != self.num_cells() {
            return Err(DeconvError::dimension_mismatch(format!(
                "annotation '{}' has {} labels for {} cells",
                field,
                labels.len(),
                self.num_cells()
            )));
        }
        self.annotations.insert(field.into(), labels);
        Ok(self)
    }

    /// Labels of an annotation field; a missing field is a
    /// configuration error
    pub fn labels(&self, field: &str) -> Result<&[Box<str>]> {
        self.annotations
            .get(field)
            .map(|x| x.as_slice())
            .ok_or_else(|| {
                DeconvError::invalid_config(format!(
                    "annotation field '{}' not found (available: {:?})",
                    field,
                    self.fields()
                ))
            })
    }

    pub fn fields(&self) -> Vec<&str> {
        self.annotations.keys().map(|x| x.as_ref()).collect()
    }

    pub fn counts(&self) -> &Mat {
        &self.counts
    }

    pub fn genes(&self) -> &[Box<str>] {
        &self.genes
    }

    pub fn cells(&self) -> &[Box<str>] {
        &self.cells
    }

    pub fn num_genes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn num_cells(&self) -> usize {
        self.counts.ncols()
    }
}

/// Spatial mixtures: a genes x spots non-negative count matrix
#[derive(Debug, Clone)]
pub struct SpotMatrix {
    counts: Mat,
    genes: Vec<Box<str>>,
    spots: Vec<Box<str>>,
}

impl SpotMatrix {
    /// * `counts` - genes x spots
    /// * `genes` - row names
    /// * `spots` - column names
    pub fn new(counts: Mat, genes: Vec<Box<str>>, spots: Vec<Box<str>>) -> Result<Self> {
        check_shape(&counts, &genes, &spots, "spot")?;
        check_unique_names(&genes, "gene")?;
        check_non_negative(&counts, "spot counts")?;
        Ok(Self {
            counts,
            genes,
            spots,
        })
    }

    pub fn counts(&self) -> &Mat {
        &self.counts
    }

    pub fn genes(&self) -> &[Box<str>] {
        &self.genes
    }

    pub fn spots(&self) -> &[Box<str>] {
        &self.spots
    }

    pub fn num_spots(&self) -> usize {
        self.counts.ncols()
    }
}

/// Expression of one spot already laid out on the trained gene set
#[derive(Debug, Clone)]
pub struct SpotMixtureVector {
    pub name: Box<str>,
    pub values: DVec,
}

/// Marker genes per cluster, each list in rank order (best first)
#[derive(Debug, Clone, Default)]
pub struct MarkerGenes {
    lists: BTreeMap<Box<str>, Vec<Box<str>>>,
}

impl MarkerGenes {
    pub fn from_map(lists: BTreeMap<Box<str>, Vec<Box<str>>>) -> Self {
        Self { lists }
    }

    /// Build from `(cluster, gene)` pairs given in rank order
    pub fn from_pairs<I, S, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, T)>,
        S: Into<Box<str>>,
        T: Into<Box<str>>,
    {
        let mut lists: BTreeMap<Box<str>, Vec<Box<str>>> = BTreeMap::new();
        for (cluster, gene) in pairs {
            let genes = lists.entry(cluster.into()).or_default();
            let gene = gene.into();
            if !genes.contains(&gene) {
                genes.push(gene);
            }
        }
        Self { lists }
    }

    /// Read a two-column `cluster <tab> gene` file in rank order
    pub fn from_file(file_path: &str) -> anyhow::Result<Self> {
        Ok(Self::from_map(matrix_util::membership::read_ordered_groups(
            file_path, 0, 1,
        )?))
    }

    pub fn clusters(&self) -> impl Iterator<Item = &str> {
        self.lists.keys().map(|x| x.as_ref())
    }

    pub fn get(&self, k: &str) -> Option<&[Box<str>]> {
        self.lists.get(k).map(|x| x.as_slice())
    }

    pub fn is_empty(&self) -> bool {
        self.lists.values().all(|x| x.is_empty())
    }

    /// Union of the top `ntop` genes of every cluster (all genes if
    /// `ntop` is `None`), in first-seen order
    pub fn top_union(&self, ntop: Option<usize>) -> Vec<Box<str>> {
        let mut seen = HashSet::default();
        let mut ret = vec![];
        for genes in self.lists.values() {
            let take = ntop.unwrap_or(genes.len()).min(genes.len());
            for g in &genes[..take] {
                if seen.insert(g.clone()) {
                    ret.push(g.clone());
                }
            }
        }
        ret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
        (0..n).map(|i| format!("{}{}", prefix, i).into()).collect()
    }

    #[test]
    fn negative_counts_are_rejected() {
        let mut counts = Mat::from_element(3, 2, 1.0);
        counts[(2, 1)] = -1.0;
        let err = ReferenceDataset::new(counts, names("g", 3), names("c", 2)).unwrap_err();
        assert!(matches!(
            err,
            DeconvError::NegativeInput { row: 2, col: 1, .. }
        ));
    }

    #[test]
    fn missing_field_is_invalid_config() {
        let reference =
            ReferenceDataset::new(Mat::zeros(2, 2), names("g", 2), names("c", 2)).unwrap();
        assert!(matches!(
            reference.labels("cell_type"),
            Err(DeconvError::InvalidConfig(_))
        ));

        let reference = reference
            .with_annotation("cell_type", vec!["a".into(), "b".into()])
            .unwrap();
        assert_eq!(reference.labels("cell_type").unwrap().len(), 2);

        // the message names the fields that do exist
        let err = reference.labels("cluster").unwrap_err();
        assert!(err.to_string().contains("cell_type"));
    }

    #[test]
    fn shape_and_duplicates_are_checked() {
        assert!(matches!(
            SpotMatrix::new(Mat::zeros(2, 2), names("g", 3), names("s", 2)),
            Err(DeconvError::DimensionMismatch(_))
        ));
        assert!(matches!(
            SpotMatrix::new(
                Mat::zeros(2, 1),
                vec!["g".into(), "g".into()],
                names("s", 1)
            ),
            Err(DeconvError::InvalidConfig(_))
        ));
    }

    #[test]
    fn marker_union_respects_ntop() {
        let markers = MarkerGenes::from_pairs(vec![
            ("A", "g1"),
            ("A", "g2"),
            ("A", "g3"),
            ("B", "g2"),
            ("B", "g4"),
        ]);
        assert_eq!(
            markers.top_union(Some(1)),
            vec![Box::from("g1"), Box::from("g2")]
        );
        assert_eq!(markers.top_union(None).len(), 4);
    }
}
