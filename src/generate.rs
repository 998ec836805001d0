use std::fmt::Write as _;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use rand::Rng;
use rand_seeder::{Seeder, SipRng};

use crate::input::FILE_PREFIX;
use crate::types::{Subset, Tier, WorkItem};
use crate::utils::prelude::*;

const MB: u64 = 1024 * 1024;
const GB: u64 = 1024 * MB;

pub const MIGRATION_ID: &str = "mig007";
pub const LABEL: &str = "test_migration";

/// Item count and per-item size ranges of a tier
fn shape(tier: Tier) -> (RangeInclusive<usize>, RangeInclusive<u64>) {
    match tier {
        Tier::Small => (1..=5, 50 * MB..=500 * MB),
        Tier::Medium => (3..=8, 500 * MB..=2 * GB),
        Tier::Large => (5..=15, 2 * GB..=10 * GB),
    }
}

/// How many of `num_files` subsets go to each tier: 60/30/10, rounding leftovers into SMALL
pub fn tier_counts(num_files: usize) -> [(Tier, usize); 3] {
    let medium = num_files * 3 / 10;
    let large = num_files / 10;
    [
        (Tier::Small, num_files - medium - large),
        (Tier::Medium, medium),
        (Tier::Large, large),
    ]
}

pub fn seeded_rng(seed: &str) -> SipRng {
    Seeder::from(seed).make_rng()
}

/// Draw `num_files` subsets with ids `0..num_files`, SMALL ones first
pub fn generate(mut rng: impl Rng, num_files: usize) -> Vec<Subset> {
    let mut next_id = 0;
    let mut subsets = Vec::with_capacity(num_files);
    for (tier, count) in tier_counts(num_files).iter().copied() {
        let (items, sizes) = shape(tier);
        for _ in 0..count {
            let n = rng.gen_range(items.clone());
            let items = (0..n)
                .map(|i| WorkItem::new(format!("SST{}", i), rng.gen_range(sizes.clone())))
                .collect();
            let mut subset = Subset::new(next_id, tier, items);
            subset.migration_id = MIGRATION_ID.to_owned();
            subset.label = LABEL.to_owned();
            subsets.push(subset);
            next_id += 1;
        }
    }
    subsets
}

/// Where `subset` lives below `root`
pub fn subset_path(root: &Path, subset: &Subset) -> PathBuf {
    root.join(&subset.migration_id)
        .join("metadata")
        .join("subsets")
        .join(&subset.label)
        .join(subset.subset_id.to_string())
        .join(subset.tier.to_string())
        .join(subset.num_items.to_string())
        .join(subset.declared_size_bytes.to_string())
        .join(format!("{}{}", FILE_PREFIX, subset.subset_id))
}

fn file_content(subset: &Subset) -> String {
    let mut content = String::new();
    for item in &subset.items {
        // writing to a String never fails
        let _ = writeln!(content, "{},{}", item.id, item.size_bytes);
    }
    content
}

/// Write `subsets` as a directory tree readable by [`crate::input::scan_dir`]
pub fn write_tree(root: &Path, subsets: &[Subset]) -> Result<Vec<PathBuf>> {
    let _g = info_span!("generate", root = %root.display()).entered();
    subsets
        .iter()
        .map(|subset| {
            let path = subset_path(root, subset);
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&path, file_content(subset))?;
            debug!(%subset, path = %path.display(), "wrote subset");
            Ok(path)
        })
        .collect()
}
