//! Partitioning sketches into groups of attribute values.
//!
//! Group membership depends only on the dataset and the dimension, not on
//! the attribute being tested, so the indexer memoizes membership (and the
//! duration boundaries) per dimension and reuses it for every attribute.
//! The memo is tagged with a fingerprint of the fields membership depends
//! on; handing the indexer a different dataset drops the memo first.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use rustc_hash::{FxHashMap, FxHashSet, FxHasher};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::attribute::Attribute;
use crate::errors::{AnalysisError, Result};
use crate::models::Sketch;

/// Groups with fewer members than this never leave the indexer.
pub const MIN_GROUP_SIZE: usize = 3;

/// Number of duration boundaries (four equal-width intervals).
pub const DURATION_BOUNDARIES: usize = 5;

/// Group label mapped to the attribute values of its members, in dataset order.
pub type Groups = BTreeMap<String, Vec<f64>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Exact scene type label.
    SceneType,
    /// Every distinct performer in the cast; one sketch can sit in many groups.
    Actor,
    /// Cumulative duration prefixes: bucket i holds every sketch with
    /// duration <= boundary i, so each bucket contains the previous one.
    DurationBucket,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [Dimension::SceneType, Dimension::Actor, Dimension::DurationBucket];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::SceneType => "scene_type",
            Dimension::Actor => "actor",
            Dimension::DurationBucket => "duration_bucket",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Dimension {
    type Err = AnalysisError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "scene_type" => Ok(Dimension::SceneType),
            "actor" | "cast" => Ok(Dimension::Actor),
            "duration_bucket" | "duration" => Ok(Dimension::DurationBucket),
            other => Err(AnalysisError::UnknownDimension(other.to_string())),
        }
    }
}

// ============================================================================
// Duration Boundaries
// ============================================================================

/// Five boundaries splitting [min, max] of the known durations into four
/// equal-width intervals. The last boundary is exactly `max`.
pub fn duration_boundaries(sketches: &[Sketch]) -> Option<[f64; DURATION_BOUNDARIES]> {
    let mut durations = sketches.iter().filter_map(|s| s.duration).map(f64::from);
    let first = durations.next()?;
    let (min, max) = durations.fold((first, first), |(lo, hi), d| (lo.min(d), hi.max(d)));

    let step = (max - min) / (DURATION_BOUNDARIES - 1) as f64;
    let mut bounds = [0.0; DURATION_BOUNDARIES];
    for (i, bound) in bounds.iter_mut().enumerate() {
        *bound = min + i as f64 * step;
    }
    bounds[DURATION_BOUNDARIES - 1] = max;
    Some(bounds)
}

/// Label for duration bucket `index` with upper bound `bound` seconds.
pub fn bucket_label(index: usize, bound: f64) -> String {
    format!("{}: <= {:.1}s", index, bound)
}

// ============================================================================
// Memoized Membership
// ============================================================================

/// Group keys for one dimension and the dataset indices belonging to each.
#[derive(Debug, Clone, Default)]
struct Membership {
    keys: Vec<String>,
    members: Vec<Vec<usize>>,
}

impl Membership {
    fn push(&mut self, key: String, members: Vec<usize>) {
        self.keys.push(key);
        self.members.push(members);
    }
}

fn scene_type_membership(sketches: &[Sketch]) -> Membership {
    let mut index: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
    for (i, sketch) in sketches.iter().enumerate() {
        index.entry(sketch.scene_type.as_str()).or_default().push(i);
    }
    let mut keys: Vec<&str> = index.keys().copied().collect();
    keys.sort_unstable();

    let mut membership = Membership::default();
    for key in keys {
        let members = index.remove(key).unwrap_or_default();
        membership.push(key.to_string(), members);
    }
    membership
}

fn actor_membership(sketches: &[Sketch]) -> Membership {
    let mut index: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
    for (i, sketch) in sketches.iter().enumerate() {
        let mut seen: FxHashSet<&str> = FxHashSet::default();
        for name in &sketch.cast {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name) {
                continue;
            }
            index.entry(name).or_default().push(i);
        }
    }
    let mut keys: Vec<&str> = index.keys().copied().collect();
    keys.sort_unstable();

    let mut membership = Membership::default();
    for key in keys {
        let members = index.remove(key).unwrap_or_default();
        membership.push(key.to_string(), members);
    }
    membership
}

fn duration_membership(sketches: &[Sketch], bounds: &[f64; DURATION_BOUNDARIES]) -> Membership {
    let mut membership = Membership::default();
    for (b, &bound) in bounds.iter().enumerate() {
        let members = sketches
            .iter()
            .enumerate()
            .filter(|(_, s)| s.duration.is_some_and(|d| f64::from(d) <= bound))
            .map(|(i, _)| i)
            .collect();
        membership.push(bucket_label(b, bound), members);
    }
    membership
}

/// Hash of everything membership is derived from: row count, ids,
/// scene types, casts and durations. Attribute values are read fresh on
/// every call and stay out of it.
fn dataset_fingerprint(sketches: &[Sketch]) -> u64 {
    let mut hasher = FxHasher::default();
    sketches.len().hash(&mut hasher);
    for sketch in sketches {
        sketch.id.hash(&mut hasher);
        sketch.scene_type.hash(&mut hasher);
        sketch.cast.hash(&mut hasher);
        sketch.duration.hash(&mut hasher);
    }
    hasher.finish()
}

// ============================================================================
// Indexer
// ============================================================================

/// Builds attribute groups for one dataset, memoizing membership.
#[derive(Debug, Default)]
pub struct GroupIndexer {
    dataset: Option<u64>,
    boundaries: Option<Option<[f64; DURATION_BOUNDARIES]>>,
    memberships: FxHashMap<Dimension, Membership>,
}

impl GroupIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every memoized boundary and key universe.
    pub fn reset(&mut self) {
        self.dataset = None;
        self.boundaries = None;
        self.memberships.clear();
    }

    /// Drop the memo if it was built from a different dataset.
    fn sync(&mut self, sketches: &[Sketch]) {
        let fingerprint = dataset_fingerprint(sketches);
        if self.dataset != Some(fingerprint) {
            if self.dataset.is_some() {
                debug!(sketches = sketches.len(), "dataset changed, dropping group memo");
            }
            self.reset();
            self.dataset = Some(fingerprint);
        }
    }

    /// Memoized duration boundaries; `None` when no sketch has a duration.
    pub fn duration_boundaries(&mut self, sketches: &[Sketch]) -> Option<[f64; DURATION_BOUNDARIES]> {
        self.sync(sketches);
        self.cached_boundaries(sketches)
    }

    fn cached_boundaries(&mut self, sketches: &[Sketch]) -> Option<[f64; DURATION_BOUNDARIES]> {
        *self
            .boundaries
            .get_or_insert_with(|| duration_boundaries(sketches))
    }

    fn membership(&mut self, sketches: &[Sketch], dimension: Dimension) -> &Membership {
        self.sync(sketches);
        if !self.memberships.contains_key(&dimension) {
            let membership = match dimension {
                Dimension::SceneType => scene_type_membership(sketches),
                Dimension::Actor => actor_membership(sketches),
                Dimension::DurationBucket => match self.cached_boundaries(sketches) {
                    Some(bounds) => duration_membership(sketches, &bounds),
                    None => Membership::default(),
                },
            };
            debug!(dimension = %dimension, keys = membership.keys.len(), "computed group universe");
            self.memberships.insert(dimension, membership);
        }
        &self.memberships[&dimension]
    }

    /// Every key of `dimension` in this dataset, before any size filtering.
    pub fn keys(&mut self, sketches: &[Sketch], dimension: Dimension) -> Vec<String> {
        self.membership(sketches, dimension).keys.clone()
    }

    /// Group `attribute` values by `dimension`.
    ///
    /// Sketches without the attribute contribute nothing; groups left with
    /// fewer than [`MIN_GROUP_SIZE`] values are omitted.
    pub fn group_by(&mut self, sketches: &[Sketch], attribute: Attribute, dimension: Dimension) -> Result<Groups> {
        if sketches.is_empty() {
            return Err(AnalysisError::EmptyDataset("no sketches to group".into()));
        }
        let membership = self.membership(sketches, dimension);

        let mut groups = Groups::new();
        for (key, members) in membership.keys.iter().zip(&membership.members) {
            let values: Vec<f64> = members
                .iter()
                .filter_map(|&i| sketches.get(i).and_then(|s| attribute.value(s)))
                .collect();
            if values.len() >= MIN_GROUP_SIZE {
                groups.insert(key.clone(), values);
            }
        }
        Ok(groups)
    }
}

/// Group sizes, for reporting.
pub fn group_sizes(groups: &Groups) -> BTreeMap<String, usize> {
    groups.iter().map(|(k, v)| (k.clone(), v.len())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveScene, PlatformVideo};

    fn sketch(id: &str, scene_type: &str, cast: &[&str], duration: Option<u32>, views: Option<u64>) -> Sketch {
        let scene = ArchiveScene {
            title: Some(id.to_string()),
            scene_type: scene_type.to_string(),
            cast: cast.iter().map(|c| Some(c.to_string())).collect(),
        };
        let mut s = Sketch::from_link(&PlatformVideo::new(id, id), &scene);
        s.duration = duration;
        s.view_count = views;
        s
    }

    fn dataset() -> Vec<Sketch> {
        vec![
            sketch("a", "Game Show", &["A", "B"], Some(100), Some(10)),
            sketch("b", "Game Show", &["A"], Some(200), Some(20)),
            sketch("c", "Game Show", &["A", "B"], Some(300), Some(30)),
            sketch("d", "Digital Short", &["B"], Some(400), Some(40)),
            sketch("e", "Digital Short", &[], Some(500), Some(50)),
            sketch("f", "Digital Short", &["A"], None, Some(60)),
            sketch("g", "Cold Opening", &["A", "A"], Some(150), None),
        ]
    }

    #[test]
    fn test_scene_type_groups_drop_small() {
        let data = dataset();
        let groups = GroupIndexer::new()
            .group_by(&data, Attribute::ViewCount, Dimension::SceneType)
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["Game Show"], vec![10.0, 20.0, 30.0]);
        assert_eq!(groups["Digital Short"], vec![40.0, 50.0, 60.0]);
        assert!(!groups.contains_key("Cold Opening"));
    }

    #[test]
    fn test_actor_membership_once_per_sketch() {
        let data = dataset();
        let mut indexer = GroupIndexer::new();
        let groups = indexer.group_by(&data, Attribute::ViewCount, Dimension::Actor).unwrap();
        // "g" has no view count; "A" appears once per sketch.
        assert_eq!(groups["A"], vec![10.0, 20.0, 30.0, 60.0]);
        assert_eq!(groups["B"], vec![10.0, 30.0, 40.0]);

        let dur = indexer.group_by(&data, Attribute::Duration, Dimension::Actor).unwrap();
        assert_eq!(dur["A"], vec![100.0, 200.0, 300.0, 150.0]);
    }

    #[test]
    fn test_empty_cast_in_no_group() {
        let data = dataset();
        let keys = GroupIndexer::new().keys(&data, Dimension::Actor);
        assert_eq!(keys, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn test_duration_boundaries_linear() {
        let data = dataset();
        let bounds = duration_boundaries(&data).unwrap();
        assert_eq!(bounds, [100.0, 200.0, 300.0, 400.0, 500.0]);
    }

    #[test]
    fn test_duration_buckets_are_nested_prefixes() {
        let data = dataset();
        let mut indexer = GroupIndexer::new();
        let keys = indexer.keys(&data, Dimension::DurationBucket);
        assert_eq!(keys.len(), DURATION_BOUNDARIES);

        let membership = indexer.membership(&data, Dimension::DurationBucket).clone();
        for pair in membership.members.windows(2) {
            assert!(pair[0].iter().all(|i| pair[1].contains(i)));
        }
        let with_duration = data.iter().filter(|s| s.duration.is_some()).count();
        assert_eq!(membership.members[DURATION_BOUNDARIES - 1].len(), with_duration);
    }

    #[test]
    fn test_duration_bucket_groups() {
        let data = dataset();
        let groups = GroupIndexer::new()
            .group_by(&data, Attribute::ViewCount, Dimension::DurationBucket)
            .unwrap();
        // Bucket 0 (<= 100s) has one member and bucket 1 two ("g" lacks views).
        assert!(!groups.contains_key(&bucket_label(0, 100.0)));
        assert!(!groups.contains_key(&bucket_label(1, 200.0)));
        assert_eq!(groups[&bucket_label(2, 300.0)], vec![10.0, 20.0, 30.0]);
        assert_eq!(groups[&bucket_label(4, 500.0)].len(), 5);
    }

    #[test]
    fn test_no_group_at_or_below_two() {
        let data = dataset();
        let mut indexer = GroupIndexer::new();
        for attr in Attribute::ALL {
            for dim in Dimension::ALL {
                let groups = indexer.group_by(&data, attr, dim).unwrap();
                assert!(groups.values().all(|v| v.len() > 2));
            }
        }
    }

    #[test]
    fn test_reset_recomputes_boundaries() {
        let data = dataset();
        let mut indexer = GroupIndexer::new();
        assert_eq!(indexer.duration_boundaries(&data).unwrap()[4], 500.0);

        let shorter: Vec<Sketch> = data.into_iter().filter(|s| s.duration != Some(500)).collect();
        assert_eq!(indexer.duration_boundaries(&shorter).unwrap()[4], 400.0);
    }

    #[test]
    fn test_shorter_dataset_rebuilds_memo() {
        let big: Vec<Sketch> = (0..10)
            .map(|i| sketch(&format!("s{i}"), "Game Show", &["A"], Some(100 + i), Some(u64::from(i))))
            .collect();
        let mut indexer = GroupIndexer::new();
        let groups = indexer.group_by(&big, Attribute::ViewCount, Dimension::SceneType).unwrap();
        assert_eq!(groups["Game Show"].len(), 10);

        let small = dataset()[..4].to_vec();
        let groups = indexer.group_by(&small, Attribute::ViewCount, Dimension::SceneType).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups["Game Show"], vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_same_length_dataset_regroups() {
        let data = dataset();
        let mut indexer = GroupIndexer::new();
        let before = indexer.group_by(&data, Attribute::ViewCount, Dimension::SceneType).unwrap();
        assert!(before.contains_key("Game Show"));

        let mut relabelled = data.clone();
        for sketch in &mut relabelled {
            sketch.scene_type = "Sketch".into();
        }
        let after = indexer.group_by(&relabelled, Attribute::ViewCount, Dimension::SceneType).unwrap();
        assert_eq!(after.keys().collect::<Vec<_>>(), vec!["Sketch"]);
        assert_eq!(after["Sketch"].len(), 6);
    }

    #[test]
    fn test_reset_keeps_results_for_same_dataset() {
        let data = dataset();
        let mut indexer = GroupIndexer::new();
        let first = indexer.group_by(&data, Attribute::Duration, Dimension::Actor).unwrap();
        indexer.reset();
        let second = indexer.group_by(&data, Attribute::Duration, Dimension::Actor).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_dataset_is_fatal() {
        assert!(matches!(
            GroupIndexer::new().group_by(&[], Attribute::ViewCount, Dimension::SceneType),
            Err(AnalysisError::EmptyDataset(_))
        ));
    }

    #[test]
    fn test_parse_dimension() {
        assert_eq!("actor".parse::<Dimension>().unwrap(), Dimension::Actor);
        assert!("episode".parse::<Dimension>().is_err());
    }
}
