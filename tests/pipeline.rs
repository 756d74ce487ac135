use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use sketch_analysis::anova::AnovaResult;
use sketch_analysis::models::SceneSnapshot;
use sketch_analysis::normalize::TitleFilter;
use sketch_analysis::posthoc::{FisherLsd, PostHocMethod, PostHocReport, PostHocTest};
use sketch_analysis::snapshot::{load_full_data, load_scenes, save_full_data, write_json};
use sketch_analysis::{
    keep_normal, AnalysisSession, ArchiveScene, Attribute, Dimension, FullDataSnapshot, GroupIndexer,
    GroupStatTester, Groups, PlatformVideo, RecordLinker, Sketch, TestOutcome,
};

fn scene(title: &str, scene_type: &str, cast: &[&str]) -> ArchiveScene {
    ArchiveScene {
        title: Some(title.to_string()),
        scene_type: scene_type.to_string(),
        cast: cast.iter().map(|c| Some(c.to_string())).collect(),
    }
}

fn sketch_with_views(id: &str, scene_type: &str, views: u64) -> Sketch {
    let mut s = Sketch::from_link(&PlatformVideo::new(id, id), &scene(id, scene_type, &["X"]));
    s.view_count = Some(views);
    s
}

#[test]
fn links_single_scene_to_marked_video() {
    let scenes = vec![scene("Angry Birds", "Game Show", &["X"])];
    let videos = TitleFilter::default().apply(&[PlatformVideo::new("v1", "Angry Birds - SNL")]);

    let result = RecordLinker::default().link(&scenes, &videos).unwrap();

    assert_eq!(result.sketches.len(), 1);
    let sketch = &result.sketches[0];
    assert_eq!(sketch.id, "v1");
    assert_eq!(sketch.scene_type, "Game Show");
    assert_eq!(sketch.cast, vec!["X".to_string()]);
}

#[test]
fn behind_the_scenes_video_never_reaches_linker() {
    let scenes = vec![scene("Angry Birds", "Game Show", &["X"])];
    let raw = vec![
        PlatformVideo::new("v1", "Angry Birds - SNL"),
        PlatformVideo::new("v2", "Behind the Scenes of Angry Birds - SNL"),
    ];
    let videos = TitleFilter::default().apply(&raw);
    assert_eq!(videos.len(), 1);

    let result = RecordLinker::default().link(&scenes, &videos).unwrap();
    assert!(result.sketches.iter().all(|s| s.id != "v2"));
    assert_eq!(result.sketches.len(), 1);
}

#[test]
fn five_member_groups_are_never_tested() {
    let data: [(&str, [u64; 5]); 5] = [
        ("A", [100, 102, 98, 101, 99]),
        ("B", [100, 101, 99, 102, 98]),
        ("C", [500, 510, 495, 505, 498]),
        ("D", [99, 101, 100, 98, 102]),
        ("E", [600, 590, 610, 605, 595]),
    ];
    let mut sketches = Vec::new();
    for (scene_type, views) in &data {
        for (i, v) in views.iter().enumerate() {
            sketches.push(sketch_with_views(&format!("{scene_type}{i}"), scene_type, *v));
        }
    }

    let mut session = AnalysisSession::new(sketches).unwrap();
    let report = session.analyze(Attribute::ViewCount, Dimension::SceneType).unwrap();

    assert_eq!(report.groups_formed(), 5);
    assert_eq!(report.groups_retained(), 0);
    assert_eq!(report.test.outcome, TestOutcome::InsufficientGroups { found: 0 });
}

struct CountingLsd {
    calls: Arc<AtomicUsize>,
}

impl PostHocTest for CountingLsd {
    fn method(&self) -> PostHocMethod {
        PostHocMethod::Lsd
    }

    fn compare(&self, groups: &Groups, anova: &AnovaResult) -> sketch_analysis::Result<PostHocReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        FisherLsd::new(0.01).compare(groups, anova)
    }
}

#[test]
fn non_significant_anova_makes_no_posthoc_calls() {
    let calls = Arc::new(AtomicUsize::new(0));
    let tester = GroupStatTester::new(0.01).with_posthoc(Box::new(CountingLsd {
        calls: Arc::clone(&calls),
    }));

    let mut groups = Groups::new();
    groups.insert("a".into(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    groups.insert("b".into(), vec![1.5, 2.5, 3.5, 4.5, 5.5, 6.5]);

    let anova = AnovaResult {
        p_value: 0.50,
        ..sketch_analysis::anova::one_way_anova(&groups).unwrap()
    };
    let outcome = tester.decide(&groups, anova).unwrap();
    assert!(matches!(outcome, TestOutcome::FailToReject { .. }));

    let report = tester.test(&groups).unwrap();
    assert!(report.outcome.anova().unwrap().p_value > 0.01);
    assert!(!report.outcome.is_significant());

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn link_save_load_analyze() {
    let dir = tempfile::tempdir().unwrap();

    let mut scenes = Vec::new();
    let mut videos = Vec::new();
    for i in 0..8 {
        scenes.push(scene(&format!("Quiz Night {i}"), "Game Show", &["A", "B"]));
        videos.push(PlatformVideo::new(format!("g{i}"), format!("Quiz Night {i} - SNL")));
        scenes.push(scene(&format!("Talk Hour {i}"), "Talk Show", &["B"]));
        videos.push(PlatformVideo::new(format!("t{i}"), format!("Talk Hour {i} - SNL")));
    }
    let scene_path = dir.path().join("scenes.json");
    write_json(
        &scene_path,
        &SceneSnapshot {
            last_collected: chrono::Local::now().naive_local(),
            scene_data: scenes.clone(),
            malformed: 0,
        },
    )
    .unwrap();

    let archive = load_scenes(&scene_path).unwrap();
    assert_eq!(archive.scene_data, scenes);

    let filtered = TitleFilter::default().apply(&videos);
    let mut result = RecordLinker::default()
        .with_workers(3)
        .link(&archive.scene_data, &filtered)
        .unwrap();
    assert_eq!(result.sketches.len(), 16);

    let game = [100, 102, 98, 101, 99, 103, 97, 100];
    let talk = [500, 510, 495, 505, 498, 502, 507, 493];
    for sketch in &mut result.sketches {
        let idx: usize = sketch.id[1..].parse().unwrap();
        sketch.view_count = Some(if sketch.scene_type == "Game Show" { game[idx] } else { talk[idx] });
        sketch.duration = Some(120 + idx as u32 * 10);
    }

    let path = dir.path().join("full_data.json");
    save_full_data(&path, &FullDataSnapshot::now(result.sketches)).unwrap();
    let loaded = load_full_data(&path).unwrap();
    assert_eq!(loaded.full_data.len(), 16);

    let mut session = AnalysisSession::new(loaded.full_data).unwrap();
    let report = session.analyze(Attribute::ViewCount, Dimension::SceneType).unwrap();
    assert!(report.is_significant());
    let lsd = report.test.outcome.posthoc_for(PostHocMethod::Lsd).unwrap();
    let rejected: Vec<_> = lsd.rejected().map(|c| c.pair.to_string()).collect();
    assert_eq!(rejected, vec!["Game Show vs Talk Show".to_string()]);

    // Actor "B" is in every sketch, "A" only in game shows.
    let by_actor = session.analyze(Attribute::ViewCount, Dimension::Actor).unwrap();
    let sizes: Vec<(String, usize)> = by_actor.groups.iter().map(|g| (g.key.clone(), g.n)).collect();
    assert_eq!(sizes, vec![("A".to_string(), 8), ("B".to_string(), 16)]);
}

fn arb_sketch() -> impl Strategy<Value = Sketch> {
    (
        "[a-z]{4}",
        prop::sample::select(vec!["Sketch", "Game Show", "Cold Opening"]),
        prop::collection::vec(prop::sample::select(vec!["A", "B", "C", "D"]), 0..3),
        prop::option::of(30u32..600),
        prop::option::of(0u64..10_000),
    )
        .prop_map(|(id, scene_type, cast, duration, views)| {
            let mut s = Sketch::from_link(&PlatformVideo::new(id.clone(), id.clone()), &scene(&id, scene_type, &cast));
            s.duration = duration;
            s.view_count = views;
            s
        })
}

proptest! {
    #[test]
    fn groups_never_have_two_or_fewer(sketches in prop::collection::vec(arb_sketch(), 1..60)) {
        let mut indexer = GroupIndexer::new();
        for dim in Dimension::ALL {
            let groups = indexer.group_by(&sketches, Attribute::ViewCount, dim).unwrap();
            prop_assert!(groups.values().all(|v| v.len() > 2));
            prop_assert!(keep_normal(&groups).values().all(|v| v.len() > 5));
        }
    }

    #[test]
    fn last_duration_bucket_holds_every_duration(sketches in prop::collection::vec(arb_sketch(), 1..60)) {
        let mut indexer = GroupIndexer::new();
        let groups = indexer.group_by(&sketches, Attribute::Duration, Dimension::DurationBucket).unwrap();
        let with_duration = sketches.iter().filter(|s| s.duration.is_some()).count();
        if with_duration > 2 {
            let largest = groups.values().map(Vec::len).max().unwrap_or(0);
            prop_assert_eq!(largest, with_duration);
        }
    }
}
