//! Reading subset trees from disk.
//!
//! Each subset is one file whose location carries its metadata:
//!
//! ```text
//! <root>/<migration_id>/metadata/subsets/<label>/<subset_id>/<TIER>/<num_items>/<size_bytes>/subset-<subset_id>
//! ```
//!
//! The file lists the subset's items in processing order, one `id,size` or `id size` per line.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::types::{Subset, Tier, WorkItem};
use crate::utils::prelude::*;

pub const FILE_PREFIX: &str = "subset-";

/// Metadata encoded in a subset file's path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsetPath {
    pub migration_id: String,
    pub label: String,
    pub subset_id: u64,
    pub tier: Tier,
    pub num_items: usize,
    pub size_bytes: u64,
}

fn parse_size(path: &Path, what: &str, s: &str) -> Result<u64> {
    if s.starts_with('-') {
        return Err(Error::invalid_input(path, format!("negative {}: {}", what, s)));
    }
    s.parse()
        .map_err(|_| Error::invalid_input(path, format!("malformed {}: {:?}", what, s)))
}

impl SubsetPath {
    pub fn parse(path: &Path) -> Result<Self> {
        let parts = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_str()),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| Error::invalid_input(path, "path is not valid UTF-8"))?;

        let tail = match parts.len().checked_sub(9) {
            Some(skip) => &parts[skip..],
            None => return Err(Error::invalid_input(path, "path too short for a subset file")),
        };
        let (migration_id, metadata, subsets, label, subset_id, tier, num_items, size_bytes, file) = (
            tail[0], tail[1], tail[2], tail[3], tail[4], tail[5], tail[6], tail[7], tail[8],
        );

        if metadata != "metadata" || subsets != "subsets" {
            return Err(Error::invalid_input(
                path,
                "expected <migration_id>/metadata/subsets/<label>/... above the subset directory",
            ));
        }
        if file.strip_prefix(FILE_PREFIX) != Some(subset_id) {
            return Err(Error::invalid_input(
                path,
                format!("file name {} does not match subset id {}", file, subset_id),
            ));
        }
        let tier = tier
            .parse::<Tier>()
            .map_err(|_| Error::invalid_input(path, format!("unknown tier {:?}", tier)))?;

        Ok(SubsetPath {
            migration_id: migration_id.to_owned(),
            label: label.to_owned(),
            subset_id: parse_size(path, "subset id", subset_id)?,
            tier,
            num_items: parse_size(path, "item count", num_items)? as usize,
            size_bytes: parse_size(path, "subset size", size_bytes)?,
        })
    }
}

/// Parse the item lines of a subset file, skipping blanks and `#` comments
pub fn parse_items(path: &Path, content: &str) -> Result<Vec<WorkItem>> {
    content
        .lines()
        .enumerate()
        .map(|(no, line)| (no + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(no, line)| {
            let parts: Vec<_> = if line.contains(',') {
                line.split(',').map(str::trim).collect()
            } else {
                line.split_whitespace().collect()
            };
            match parts.as_slice() {
                [id, size] if !id.is_empty() => {
                    let size = parse_size(path, &format!("size on line {}", no), size)?;
                    Ok(WorkItem::new(*id, size))
                }
                _ => Err(Error::invalid_input(
                    path,
                    format!("line {}: expected `id,size` or `id size`, got {:?}", no, line),
                )),
            }
        })
        .collect()
}

/// Build a subset from its path metadata and file content
pub fn subset_from(path: &Path, content: &str) -> Result<Subset> {
    let meta = SubsetPath::parse(path)?;
    let mut items = parse_items(path, content)?;
    // producers may leave the file empty and only encode the totals in the path
    if items.is_empty() && meta.num_items > 0 {
        debug!(path = %path.display(), size = meta.size_bytes, "no item lines, using declared size");
        items.push(WorkItem::new("SST0", meta.size_bytes));
    }
    let subset = Subset {
        migration_id: meta.migration_id,
        label: meta.label,
        subset_id: meta.subset_id,
        tier: meta.tier,
        num_items: meta.num_items,
        declared_size_bytes: meta.size_bytes,
        items,
    };
    if subset.checked_total_bytes().is_none() {
        return Err(Error::invalid_input(path, "item sizes add up to more than u64::MAX bytes"));
    }
    Ok(subset)
}

pub fn read_subset(path: &Path) -> Result<Subset> {
    let content = fs::read_to_string(path)?;
    subset_from(path, &content)
}

/// All `subset-*` files below `dir`, sorted by path
pub fn find_subset_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = vec![];
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
            } else if entry.file_name().to_string_lossy().starts_with(FILE_PREFIX) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// Outcome of scanning a directory tree
#[derive(Debug, Default)]
pub struct Scan {
    pub subsets: Vec<Subset>,
    /// files that failed to parse, only filled when skipping invalid files
    pub rejected: Vec<(PathBuf, Error)>,
}

/// Read every subset below `dir`.
///
/// The first bad file fails the scan unless `skip_invalid` is set, in which case it is
/// logged and recorded in [`Scan::rejected`].
pub fn scan_dir(dir: &Path, skip_invalid: bool) -> Result<Scan> {
    let _g = info_span!("scan", dir = %dir.display()).entered();

    let mut scan = Scan::default();
    for path in find_subset_files(dir)? {
        match read_subset(&path) {
            Ok(subset) => scan.subsets.push(subset),
            Err(err) if skip_invalid => {
                warn!(path = %path.display(), %err, "skipping subset file");
                scan.rejected.push((path, err));
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        subsets = scan.subsets.len(),
        rejected = scan.rejected.len(),
        large = scan.subsets.iter().filter(|s| s.tier == Tier::Large).count(),
        medium = scan.subsets.iter().filter(|s| s.tier == Tier::Medium).count(),
        small = scan.subsets.iter().filter(|s| s.tier == Tier::Small).count(),
        "scanned input"
    );
    Ok(scan)
}
