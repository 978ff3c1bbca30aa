//! Membership mapping utilities for grouping items by category.
//!
//! Supports reading two-column membership files (TSV/CSV) such as
//! `cell -> cell type` or `cluster -> marker gene`.

use crate::common_io::{read_lines_of_words_delim, ReadLinesOut};
use fnv::FnvHashMap as HashMap;
use log::info;
use std::collections::BTreeMap;

/// A membership mapping from keys to groups/categories
#[derive(Clone)]
pub struct Membership {
    map: HashMap<Box<str>, Box<str>>,
}

/// Statistics about membership matching
#[derive(Debug, Default, Clone)]
pub struct MatchStats {
    pub matched: usize,
    pub unmatched: usize,
}

fn read_two_columns(
    file_path: &str,
    key_col: usize,
    value_col: usize,
) -> anyhow::Result<Vec<(Box<str>, Box<str>)>> {
    let delim = detect_delimiter(file_path);

    let ReadLinesOut { lines, header: _ } = read_lines_of_words_delim(file_path, delim, -1)?;

    if lines.is_empty() {
        anyhow::bail!("Membership file is empty: {}", file_path);
    }

    let max_col = key_col.max(value_col);
    let mut pairs = Vec::with_capacity(lines.len());

    for line in lines {
        if line.len() <= max_col {
            log::warn!("Skipping malformed line with {} columns", line.len());
            continue;
        }
        pairs.push((line[key_col].clone(), line[value_col].clone()));
    }

    if pairs.is_empty() {
        anyhow::bail!(
            "Membership file has no line with column index {}: {}",
            max_col,
            file_path
        );
    }
    Ok(pairs)
}

impl Membership {
    /// Create membership from key-value pairs
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Box<str>, Box<str>)>) -> Self {
        Self {
            map: pairs.into_iter().collect(),
        }
    }

    /// Load membership from file (TSV, CSV, or gzipped variants)
    ///
    /// # Arguments
    /// * `file_path` - Path to membership file
    /// * `key_col` - Column index for keys (0-based)
    /// * `value_col` - Column index for values (0-based)
    pub fn from_file(file_path: &str, key_col: usize, value_col: usize) -> anyhow::Result<Self> {
        let pairs = read_two_columns(file_path, key_col, value_col)?;
        let ret = Self::from_pairs(pairs);
        info!("Loaded {} entries from {}", ret.len(), file_path);
        Ok(ret)
    }

    /// Look up every query key, in order, with match statistics
    pub fn match_keys(&self, query_keys: &[Box<str>]) -> (Vec<Option<Box<str>>>, MatchStats) {
        let mut stats = MatchStats::default();

        let matched = query_keys
            .iter()
            .map(|key| match self.map.get(key) {
                Some(value) => {
                    stats.matched += 1;
                    Some(value.clone())
                }
                None => {
                    stats.unmatched += 1;
                    None
                }
            })
            .collect();

        (matched, stats)
    }

    /// Number of entries in the membership
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// Read a two-column file into `group -> members`, keeping the
/// members in the order they appear in the file. Duplicated members
/// within a group are dropped.
///
/// * `file_path` - Path to the file
/// * `group_col` - Column index of the group (0-based)
/// * `member_col` - Column index of the member (0-based)
pub fn read_ordered_groups(
    file_path: &str,
    group_col: usize,
    member_col: usize,
) -> anyhow::Result<BTreeMap<Box<str>, Vec<Box<str>>>> {
    let pairs = read_two_columns(file_path, group_col, member_col)?;

    let mut groups: BTreeMap<Box<str>, Vec<Box<str>>> = BTreeMap::new();
    for (group, member) in pairs {
        let members = groups.entry(group).or_default();
        if !members.contains(&member) {
            members.push(member);
        }
    }

    info!("Loaded {} groups from {}", groups.len(), file_path);
    Ok(groups)
}

/// Detect delimiter from file extension
pub fn detect_delimiter(file_path: &str) -> &'static str {
    if file_path.ends_with(".csv") || file_path.ends_with(".csv.gz") {
        ","
    } else {
        "\t"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "AAACCT\tgroup_A").unwrap();
        writeln!(file, "BBBCCT\tgroup_B").unwrap();
        writeln!(file, "CCCCCT\tgroup_A").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_match_keys() {
        let file = create_test_file();
        let membership = Membership::from_file(file.path().to_str().unwrap(), 0, 1).unwrap();
        assert_eq!(membership.len(), 3);

        let queries: Vec<Box<str>> = vec!["CCCCCT".into(), "BBBCCT@1".into(), "BBBCCT".into()];
        let (matched, stats) = membership.match_keys(&queries);

        assert_eq!(stats.matched, 2);
        assert_eq!(stats.unmatched, 1);
        assert_eq!(matched[0].as_deref(), Some("group_A"));
        assert!(matched[1].is_none());
        assert_eq!(matched[2].as_deref(), Some("group_B"));
    }

    #[test]
    fn test_ordered_groups() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "T\tCD3E").unwrap();
        writeln!(file, "B\tMS4A1").unwrap();
        writeln!(file, "T\tCD3D").unwrap();
        writeln!(file, "T\tCD3E").unwrap();
        file.flush().unwrap();

        let groups = read_ordered_groups(file.path().to_str().unwrap(), 0, 1).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["T"], vec![Box::from("CD3E"), Box::from("CD3D")]);
        assert_eq!(groups["B"], vec![Box::from("MS4A1")]);
    }
}
