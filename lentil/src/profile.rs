use crate::common::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Mean topic usage of every cell type
#[derive(Debug, Clone, Serialize)]
pub struct TopicProfiles {
    /// row names, lexicographic
    pub cell_types: Vec<Box<str>>,
    /// cell types x topics
    #[serde(skip)]
    pub profiles: Mat,
}

impl TopicProfiles {
    pub fn num_types(&self) -> usize {
        self.profiles.nrows()
    }

    pub fn num_topics(&self) -> usize {
        self.profiles.ncols()
    }
}

/// Average the columns of `coef` within each label
///
/// * `coef` - topics x cells
/// * `labels` - one label per cell
///
/// Rows come out in lexicographic label order. No normalization.
pub fn aggregate_topic_profiles(coef: &Mat, labels: &[Box<str>]) -> Result<TopicProfiles> {
    if coef.ncols() != labels.len() {
        return Err(DeconvError::dimension_mismatch(format!(
            "{} cells in the coefficient matrix, {} labels",
            coef.ncols(),
            labels.len()
        )));
    }

    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (j, k) in labels.iter().enumerate() {
        groups.entry(k.as_ref()).or_default().push(j);
    }

    if groups.is_empty() {
        return Err(DeconvError::invalid_config("no labelled cell to aggregate"));
    }

    let kk = coef.nrows();
    let mut profiles = Mat::zeros(groups.len(), kk);

    for (r, cells) in groups.values().enumerate() {
        let mean = coef.mean_of_columns(cells);
        for (t, &x) in mean.iter().enumerate() {
            profiles[(r, t)] = x;
        }
    }

    Ok(TopicProfiles {
        cell_types: groups.keys().map(|&k| k.into()).collect(),
        profiles,
    })
}
