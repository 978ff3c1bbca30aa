use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;

/// partition membership vector into groups of indexes
/// # Arguments
/// * `membership` - a vector of membership (E.g., cluster assignment)
/// * `nelem_per_group` - number of elements per group (if None, no downsampling)
/// * `rng` - random source for downsampling
/// # Returns
/// An ordered map: cluster/group name -> ascending indexes of the
/// elements. Groups are visited in key order, so a seeded `rng`
/// always yields the same partition.
pub fn partition_by_membership<T, R>(
    membership: &[T],
    nelem_per_group: Option<usize>,
    rng: &mut R,
) -> BTreeMap<T, Vec<usize>>
where
    T: Ord + Clone,
    R: Rng + ?Sized,
{
    let mut pb_elems: BTreeMap<T, Vec<usize>> = BTreeMap::new();
    for (cell, k) in membership.iter().enumerate() {
        pb_elems.entry(k.clone()).or_default().push(cell);
    }

    if let Some(ntarget) = nelem_per_group {
        for cells in pb_elems.values_mut() {
            if cells.len() > ntarget {
                cells.shuffle(rng);
                cells.truncate(ntarget);
                cells.sort_unstable();
            }
        }
    }
    pb_elems
}

/// Generate `[lb, ub)` intervals covering `0..ntot`
/// * `ntot` - number of total samples
/// * `block_size` - the size of each block
pub fn create_jobs(ntot: usize, block_size: usize) -> Vec<(usize, usize)> {
    let block_size = block_size.max(1);
    let num_blocks = ntot.div_ceil(block_size);
    (0..num_blocks)
        .map(|b| {
            let lb: usize = b * block_size;
            let ub: usize = ((b + 1) * block_size).min(ntot);
            (lb, ub)
        })
        .collect::<Vec<_>>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn small_groups_are_kept_whole() {
        let membership = vec!["a", "b", "a", "c", "b", "a"];
        let mut rng = StdRng::seed_from_u64(1);
        let groups = partition_by_membership(&membership, Some(5), &mut rng);
        assert_eq!(groups["a"], vec![0, 2, 5]);
        assert_eq!(groups["b"], vec![1, 4]);
        assert_eq!(groups["c"], vec![3]);
    }

    #[test]
    fn large_groups_are_capped_reproducibly() {
        let membership: Vec<usize> = (0..100).map(|i| i % 2).collect();
        let mut rng1 = StdRng::seed_from_u64(7);
        let mut rng2 = StdRng::seed_from_u64(7);
        let g1 = partition_by_membership(&membership, Some(10), &mut rng1);
        let g2 = partition_by_membership(&membership, Some(10), &mut rng2);
        assert_eq!(g1, g2);
        for (k, cells) in g1.iter() {
            assert_eq!(cells.len(), 10);
            assert!(cells.iter().all(|&c| c % 2 == *k));
            assert!(cells.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn jobs_cover_the_range() {
        assert_eq!(create_jobs(7, 3), vec![(0, 3), (3, 6), (6, 7)]);
        assert!(create_jobs(0, 3).is_empty());
    }
}
