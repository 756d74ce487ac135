//! Reading and writing JSON snapshots.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::models::{FullDataSnapshot, SceneSnapshot, VideoSnapshot};

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Pretty-printed JSON, replacing any existing file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

// Collection snapshots are parsed entry by entry: one bad record is logged
// and dropped, the rest of the file still loads.

#[derive(Deserialize)]
struct RawScenes {
    last_collected: NaiveDateTime,
    #[serde(default)]
    scene_data: Vec<Value>,
}

#[derive(Deserialize)]
struct RawVideos {
    last_collected: NaiveDateTime,
    #[serde(default)]
    channel_videos: Vec<Value>,
}

/// Parse each entry on its own, returning the good ones and the count of bad ones.
fn parse_entries<T: DeserializeOwned>(entries: Vec<Value>, kind: &str, path: &Path) -> (Vec<T>, usize) {
    let mut parsed = Vec::with_capacity(entries.len());
    let mut malformed = 0;
    for (index, entry) in entries.into_iter().enumerate() {
        match serde_json::from_value(entry) {
            Ok(record) => parsed.push(record),
            Err(err) => {
                malformed += 1;
                warn!(path = %path.display(), kind, index, error = %err, "skipping malformed entry");
            }
        }
    }
    (parsed, malformed)
}

pub fn load_scenes(path: &Path) -> Result<SceneSnapshot> {
    let raw: RawScenes = read_json(path)?;
    let (scene_data, malformed) = parse_entries(raw.scene_data, "scene", path);
    let snap = SceneSnapshot {
        last_collected: raw.last_collected,
        scene_data,
        malformed,
    };
    info!(
        path = %path.display(),
        scenes = snap.scene_data.len(),
        malformed,
        collected = %snap.last_collected,
        "loaded archive scenes"
    );
    Ok(snap)
}

pub fn load_videos(path: &Path) -> Result<VideoSnapshot> {
    let raw: RawVideos = read_json(path)?;
    let (channel_videos, malformed) = parse_entries(raw.channel_videos, "video", path);
    let snap = VideoSnapshot {
        last_collected: raw.last_collected,
        channel_videos,
        malformed,
    };
    info!(
        path = %path.display(),
        videos = snap.channel_videos.len(),
        malformed,
        collected = %snap.last_collected,
        "loaded channel videos"
    );
    Ok(snap)
}

pub fn load_full_data(path: &Path) -> Result<FullDataSnapshot> {
    let snap: FullDataSnapshot = read_json(path)?;
    info!(
        path = %path.display(),
        sketches = snap.full_data.len(),
        collected = %snap.last_collected,
        "loaded sketches"
    );
    Ok(snap)
}

pub fn save_full_data(path: &Path, snapshot: &FullDataSnapshot) -> Result<()> {
    write_json(path, snapshot)?;
    info!(path = %path.display(), sketches = snapshot.full_data.len(), "saved sketches");
    Ok(())
}
