//! Joins archive scenes to platform videos by fuzzy title.
//!
//! Linking one video never depends on another, so the work is dispatched to
//! a fixed pool of worker threads over a crossbeam queue. Each job carries
//! the video plus shared read-only handles to the candidate titles and the
//! archive; results come back on a second channel in completion order.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{AnalysisError, Result};
use crate::fuzzy::{CandidateSet, FuzzyMatcher};
use crate::models::{ArchiveScene, LinkStats, PlatformVideo, Sketch};
use crate::progress::{format_duration, Phase, PhaseProgress};

/// Queue depth per worker.
const QUEUE_PER_WORKER: usize = 64;

/// What to do when the matched archive title belongs to several scenes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Drop the video unless every scene with that title carries the same
    /// scene type and cast.
    #[default]
    Reject,
    /// Take the first scene in archive order.
    First,
}

// ============================================================================
// Archive Index
// ============================================================================

/// Archive scenes plus an exact-title lookup, shared read-only by workers.
#[derive(Debug)]
pub struct ArchiveIndex {
    scenes: Vec<ArchiveScene>,
    by_title: FxHashMap<String, Vec<usize>>,
}

/// Result of looking a matched title back up in the archive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SceneLookup<'a> {
    Found(&'a ArchiveScene),
    Ambiguous(usize),
    Missing,
}

impl ArchiveIndex {
    pub fn new(scenes: Vec<ArchiveScene>) -> Self {
        let mut by_title: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (idx, scene) in scenes.iter().enumerate() {
            if let Some(title) = &scene.title {
                by_title.entry(title.clone()).or_default().push(idx);
            }
        }
        Self { scenes, by_title }
    }

    /// Titled scenes in archive order, duplicates included.
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.scenes.iter().filter_map(|s| s.title.as_deref())
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    pub fn lookup(&self, title: &str, policy: DuplicatePolicy) -> SceneLookup<'_> {
        let Some(indices) = self.by_title.get(title) else {
            return SceneLookup::Missing;
        };
        let first = &self.scenes[indices[0]];
        if indices.len() == 1 || policy == DuplicatePolicy::First {
            return SceneLookup::Found(first);
        }
        let consistent = indices[1..].iter().all(|&i| {
            let other = &self.scenes[i];
            other.scene_type == first.scene_type && other.cast_names() == first.cast_names()
        });
        if consistent {
            SceneLookup::Found(first)
        } else {
            SceneLookup::Ambiguous(indices.len())
        }
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// One unit of linking work.
struct LinkJob {
    video: PlatformVideo,
    candidates: Arc<CandidateSet>,
    archive: Arc<ArchiveIndex>,
}

#[derive(Debug)]
enum LinkOutcome {
    Matched(Sketch),
    Unmatched,
    Ambiguous,
    Skipped,
}

/// Linked sketches (in completion order) and run counters.
#[derive(Debug, Clone)]
pub struct LinkResult {
    pub sketches: Vec<Sketch>,
    pub stats: LinkStats,
}

// ============================================================================
// Linker
// ============================================================================

#[derive(Debug, Clone)]
pub struct RecordLinker {
    matcher: FuzzyMatcher,
    workers: usize,
    duplicates: DuplicatePolicy,
}

impl Default for RecordLinker {
    fn default() -> Self {
        Self::new(FuzzyMatcher::default())
    }
}

impl RecordLinker {
    pub fn new(matcher: FuzzyMatcher) -> Self {
        Self {
            matcher,
            workers: 0,
            duplicates: DuplicatePolicy::default(),
        }
    }

    /// Worker thread count; 0 means one per available core.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicates = policy;
        self
    }

    fn worker_count(&self, jobs: usize) -> usize {
        let wanted = if self.workers > 0 {
            self.workers
        } else {
            thread::available_parallelism().map(|n| n.get()).unwrap_or(8)
        };
        wanted.clamp(1, jobs.max(1))
    }

    /// Link a single video. Pure; safe to call from any thread.
    fn link_one(&self, job: &LinkJob) -> LinkOutcome {
        let Some(title) = job.video.usable_title() else {
            return LinkOutcome::Skipped;
        };
        let Some(found) = self.matcher.best_match(title, &job.candidates) else {
            debug!(video_id = %job.video.id, title, "no archive match");
            return LinkOutcome::Unmatched;
        };
        match job.archive.lookup(found.title, self.duplicates) {
            SceneLookup::Found(scene) => {
                debug!(
                    video_id = %job.video.id,
                    title,
                    scene = found.title,
                    score = found.score,
                    "matched video"
                );
                LinkOutcome::Matched(Sketch::from_link(&job.video, scene))
            }
            SceneLookup::Ambiguous(count) => {
                warn!(
                    video_id = %job.video.id,
                    scene = found.title,
                    count,
                    "archive title is shared by conflicting scenes, skipping"
                );
                LinkOutcome::Ambiguous
            }
            SceneLookup::Missing => LinkOutcome::Unmatched,
        }
    }

    fn worker_loop(&self, rx: Receiver<LinkJob>, tx: Sender<LinkOutcome>) {
        while let Ok(job) = rx.recv() {
            let outcome = self.link_one(&job);
            if tx.send(outcome).is_err() {
                break;
            }
        }
    }

    /// Join `scenes` against already-filtered `videos`.
    ///
    /// Videos without a title are skipped and unmatched videos are dropped;
    /// neither aborts the batch. Output order follows completion order.
    pub fn link(&self, scenes: &[ArchiveScene], videos: &[PlatformVideo]) -> Result<LinkResult> {
        if scenes.is_empty() {
            return Err(AnalysisError::EmptyDataset("no archive scenes to link against".into()));
        }
        if videos.is_empty() {
            return Err(AnalysisError::EmptyDataset("no platform videos to link".into()));
        }

        let start = Instant::now();
        let archive = Arc::new(ArchiveIndex::new(scenes.to_vec()));
        let candidates = Arc::new(CandidateSet::new(archive.titles()));
        let workers = self.worker_count(videos.len());
        info!(
            videos = videos.len(),
            candidates = candidates.len(),
            workers,
            threshold = self.matcher.threshold(),
            "linking videos to archive scenes"
        );

        let (job_tx, job_rx) = bounded::<LinkJob>(workers * QUEUE_PER_WORKER);
        let (out_tx, out_rx) = unbounded::<LinkOutcome>();

        let mut handles = Vec::with_capacity(workers + 1);
        for _ in 0..workers {
            let rx = job_rx.clone();
            let tx = out_tx.clone();
            let linker = self.clone();
            handles.push(thread::spawn(move || linker.worker_loop(rx, tx)));
        }
        drop(job_rx);
        drop(out_tx);

        {
            let videos = videos.to_vec();
            let candidates = Arc::clone(&candidates);
            let archive = Arc::clone(&archive);
            handles.push(thread::spawn(move || {
                for video in videos {
                    let job = LinkJob {
                        video,
                        candidates: Arc::clone(&candidates),
                        archive: Arc::clone(&archive),
                    };
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            }));
        }

        let mut progress = PhaseProgress::start(Phase::Link, videos.len() as u64);
        let mut stats = LinkStats {
            videos_in: videos.len(),
            candidate_titles: candidates.len(),
            ..Default::default()
        };
        let sketches = collect_outcomes(&out_rx, &mut stats, || progress.advance());
        progress.finish(format!(
            "Linked {} of {} videos in {}",
            stats.matched,
            stats.videos_in,
            format_duration(start.elapsed())
        ));

        let panicked = handles.into_iter().filter_map(|h| h.join().err()).count();
        if panicked > 0 || stats.lost > 0 {
            warn!(panicked, lost = stats.lost, "linking threads died, some videos have no outcome");
        }

        Ok(LinkResult { sketches, stats })
    }
}

/// Drain worker outcomes into `stats`, returning matched sketches.
/// Anything `videos_in` expected but never received is counted as lost.
fn collect_outcomes(rx: &Receiver<LinkOutcome>, stats: &mut LinkStats, mut on_each: impl FnMut()) -> Vec<Sketch> {
    let mut sketches = Vec::new();
    for outcome in rx.iter() {
        match outcome {
            LinkOutcome::Matched(sketch) => {
                stats.matched += 1;
                sketches.push(sketch);
            }
            LinkOutcome::Unmatched => stats.unmatched += 1,
            LinkOutcome::Ambiguous => stats.ambiguous += 1,
            LinkOutcome::Skipped => stats.skipped_no_title += 1,
        }
        on_each();
    }
    stats.lost = stats.videos_in.saturating_sub(stats.accounted());
    sketches
}
