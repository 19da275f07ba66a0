//! Union-find agglomeration of adjacent superpixels in LAB space.
//!
//! Distances and the dark cutoff are measured in the 8-bit LAB encoding
//! (L scaled to 0-255), the scale the default thresholds were tuned on.
//!
//! Dark regions get asymmetric treatment: two dark regions merge more
//! easily than two normal ones (outline fragments coalesce), while a dark
//! region next to a normal one needs a much closer colour match (outlines
//! stay separate from the facets they border).

use std::collections::BTreeSet;

use crate::color::{distance3, lab_8bit};
use crate::config::MergeConfig;
use crate::segment::{LabelMap, RegionStats};

/// Array-backed disjoint-set forest with path halving and union by size.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<u32>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n as u32).collect(),
        }
    }

    pub fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            let grand = self.parent[self.parent[x as usize] as usize];
            self.parent[x as usize] = grand;
            x = grand;
        }
        x
    }

    /// Attach root `child` under root `root`.
    fn link(&mut self, root: u32, child: u32) {
        self.parent[child as usize] = root;
    }
}

/// Result of merging: a fresh label map over merged region ids.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub labels: LabelMap,
    pub count: usize,
    /// Frozen statistics per merged id.
    pub regions: Vec<RegionStats>,
    /// Merged id of every input superpixel (`None` if dropped).
    pub origin: Vec<Option<u32>>,
    pub passes: usize,
    pub merges: usize,
}

/// Whether a region counts as dark (outline-like).
pub fn is_dark(stats: &RegionStats, config: &MergeConfig) -> bool {
    lab_8bit(&stats.mean_lab)[0] < config.dark_threshold
}

/// Colour distance between two regions in 8-bit LAB units.
pub fn merge_distance(a: &RegionStats, b: &RegionStats) -> f64 {
    distance3(&lab_8bit(&a.mean_lab), &lab_8bit(&b.mean_lab))
}

/// LAB distance below which `a` and `b` merge.
pub fn merge_threshold(a: &RegionStats, b: &RegionStats, config: &MergeConfig) -> f64 {
    match (is_dark(a, config), is_dark(b, config)) {
        (true, true) => config.color_threshold * config.dark_pair_factor,
        (false, false) => config.color_threshold,
        _ => config.color_threshold * config.mixed_pair_factor,
    }
}

/// Merge adjacent regions until a full pass merges nothing, or
/// `config.max_passes` passes have run.
///
/// Regions whose alpha is below `alpha_floor` (0-255) never merge and are
/// dropped from the output map.
pub fn merge_regions(
    labels: &LabelMap,
    mut stats: Vec<RegionStats>,
    adjacency: &[BTreeSet<u32>],
    config: &MergeConfig,
    alpha_floor: f64,
) -> MergeOutcome {
    let n = stats.len();
    let mut sets = DisjointSet::new(n);
    let live = |s: &RegionStats| s.count > 0 && s.mean_alpha >= alpha_floor;

    let mut passes = 0;
    let mut merges = 0;
    loop {
        passes += 1;
        let mut changed = false;
        for a in 0..n as u32 {
            let mut ra = sets.find(a);
            if !live(&stats[ra as usize]) {
                continue;
            }
            let Some(neighbours) = adjacency.get(a as usize) else {
                continue;
            };
            for &b in neighbours {
                let rb = sets.find(b);
                if ra == rb || !live(&stats[rb as usize]) {
                    continue;
                }
                let (sa, sb) = (&stats[ra as usize], &stats[rb as usize]);
                let threshold = merge_threshold(sa, sb, config);
                if merge_distance(sa, sb) < threshold {
                    ra = union(&mut sets, &mut stats, ra, rb);
                    merges += 1;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
        if passes >= config.max_passes {
            log::warn!("  Merge       stopped after {} passes without converging", passes);
            break;
        }
    }

    // Merged ids follow first appearance in raster order.
    let roots: Vec<u32> = (0..n as u32).map(|i| sets.find(i)).collect();
    let mut root_to_new: Vec<Option<u32>> = vec![None; n];
    let mut regions = Vec::new();
    let (w, h) = labels.dimensions();
    for y in 0..h {
        for x in 0..w {
            let Some(id) = labels.get(x, y) else {
                continue;
            };
            let Some(&root) = roots.get(id as usize) else {
                continue;
            };
            let r = root as usize;
            if root_to_new[r].is_none() && live(&stats[r]) {
                root_to_new[r] = Some(regions.len() as u32);
                regions.push(stats[r].clone());
            }
        }
    }
    let origin: Vec<Option<u32>> = roots.iter().map(|&r| root_to_new[r as usize]).collect();
    let merged = labels.relabel(|id| origin.get(id as usize).copied().flatten());

    log::info!("  Merge       {} \u{2192} {} regions ({} passes)", n, regions.len(), passes);

    MergeOutcome {
        labels: merged,
        count: regions.len(),
        regions,
        origin,
        passes,
        merges,
    }
}

/// Union two roots; the larger region (lower id on ties) becomes the root
/// and takes the weighted statistics. Returns the surviving root.
fn union(sets: &mut DisjointSet, stats: &mut [RegionStats], a: u32, b: u32) -> u32 {
    let (ca, cb) = (stats[a as usize].count, stats[b as usize].count);
    let (root, child) = if ca > cb || (ca == cb && a < b) { (a, b) } else { (b, a) };
    sets.link(root, child);
    let absorbed = stats[child as usize].clone();
    stats[root as usize].absorb(&absorbed);
    root
}
