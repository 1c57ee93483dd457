//! Output files of a run.
//!
//! Everything is written under one directory:
//!
//! - `image_list.txt`: `<id>,<name>` per image
//! - `imagecols.json`: the image collection
//! - `finaltracks/track_<k>.json`: one file per track
//! - `alltracks.txt`: text summary, tracks visible in enough images first
//! - `lines_nv<n>.obj`: track lines visible in at least `n` images

use anyhow::{Context, Result};
use linemap_core::{ImageCollection, LineTrack};
use log::info;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

pub const IMAGE_LIST_FILE: &str = "image_list.txt";
pub const IMAGECOLS_FILE: &str = "imagecols.json";
pub const TRACKS_DIR: &str = "finaltracks";
pub const ALLTRACKS_FILE: &str = "alltracks.txt";
pub const SESSION_FILE: &str = "session.json";

pub fn lines_obj_file_name(n_visible_views: usize) -> String {
    format!("lines_nv{n_visible_views}.obj")
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    ensure_parent(path)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

pub fn save_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    write_text(path, &serde_json::to_string_pretty(value)?)
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn save_image_list(path: &Path, imagecols: &ImageCollection) -> Result<()> {
    let mut text = String::new();
    for (id, name) in imagecols.image_name_map() {
        let _ = writeln!(text, "{id},{name}");
    }
    write_text(path, &text)
}

/// Write `image_list.txt` and `imagecols.json` into `dir`.
pub fn save_image_metadata(dir: &Path, imagecols: &ImageCollection) -> Result<()> {
    save_image_list(&dir.join(IMAGE_LIST_FILE), imagecols)?;
    save_json(&dir.join(IMAGECOLS_FILE), imagecols)
}

fn track_file_name(k: usize) -> String {
    format!("track_{k}.json")
}

fn parse_track_index(path: &Path) -> Option<usize> {
    path.file_name()?
        .to_str()?
        .strip_prefix("track_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

/// Write one JSON file per track into `dir`, replacing tracks of earlier runs.
pub fn save_tracks_folder(dir: &Path, tracks: &[LineTrack]) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if parse_track_index(&path).is_some() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove stale {}", path.display()))?;
        }
    }
    for (k, track) in tracks.iter().enumerate() {
        save_json(&dir.join(track_file_name(k)), track)?;
    }
    Ok(())
}

/// Tracks of a folder written by [`save_tracks_folder`], in index order.
pub fn load_tracks_folder(dir: &Path) -> Result<Vec<LineTrack>> {
    let mut indexed: Vec<(usize, PathBuf)> = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| parse_track_index(&path).map(|k| (k, path)))
        .collect();
    indexed.sort_by_key(|(k, _)| *k);
    indexed.iter().map(|(_, path)| load_json(path)).collect()
}

/// Track indices with visible tracks first, each group in track order.
fn visible_first(tracks: &[LineTrack], n_visible_views: usize) -> Vec<usize> {
    let (mut order, rest): (Vec<usize>, Vec<usize>) =
        (0..tracks.len()).partition(|&k| tracks[k].num_images() >= n_visible_views);
    order.extend(rest);
    order
}

/// Text summary of all tracks.
///
/// Header `<num_tracks> <num_visible> <n_visible_views>`, then per track:
/// `<k> <num_lines> <num_images>`, the six endpoint coordinates, the
/// observation image ids and the observation line ids.
pub fn save_tracks_txt(path: &Path, tracks: &[LineTrack], n_visible_views: usize) -> Result<()> {
    let num_visible = tracks
        .iter()
        .filter(|t| t.num_images() >= n_visible_views)
        .count();
    let mut text = String::new();
    let _ = writeln!(text, "{} {} {}", tracks.len(), num_visible, n_visible_views);
    for k in visible_first(tracks, n_visible_views) {
        let track = &tracks[k];
        let (p0, p1) = (track.line.p0, track.line.p1);
        let _ = writeln!(text, "{} {} {}", k, track.num_lines(), track.num_images());
        let _ = writeln!(
            text,
            "{} {} {} {} {} {}",
            p0.x, p0.y, p0.z, p1.x, p1.y, p1.z
        );
        let images: Vec<String> = track
            .observations
            .iter()
            .map(|o| o.image_id.to_string())
            .collect();
        let lines: Vec<String> = track
            .observations
            .iter()
            .map(|o| o.line_id.to_string())
            .collect();
        let _ = writeln!(text, "{}", images.join(" "));
        let _ = writeln!(text, "{}", lines.join(" "));
    }
    write_text(path, &text)
}

/// Wavefront OBJ with two vertices and one `l` element per visible track.
pub fn save_lines_obj(path: &Path, tracks: &[LineTrack], n_visible_views: usize) -> Result<()> {
    let mut text = String::new();
    let mut num_lines = 0usize;
    for track in tracks.iter().filter(|t| t.num_images() >= n_visible_views) {
        let (p0, p1) = (track.line.p0, track.line.p1);
        let _ = writeln!(text, "v {} {} {}", p0.x, p0.y, p0.z);
        let _ = writeln!(text, "v {} {} {}", p1.x, p1.y, p1.z);
        num_lines += 1;
    }
    for k in 0..num_lines {
        let _ = writeln!(text, "l {} {}", 2 * k + 1, 2 * k + 2);
    }
    write_text(path, &text)
}

/// Write the track outputs (folder, text summary, OBJ) into `dir`.
pub fn save_track_outputs(dir: &Path, tracks: &[LineTrack], n_visible_views: usize) -> Result<()> {
    save_tracks_folder(&dir.join(TRACKS_DIR), tracks)?;
    save_tracks_txt(&dir.join(ALLTRACKS_FILE), tracks, n_visible_views)?;
    save_lines_obj(&dir.join(lines_obj_file_name(n_visible_views)), tracks, n_visible_views)
}

/// Textual summary of a track set.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackReport {
    pub num_tracks: usize,
    pub num_observations: usize,
    pub num_visible: usize,
    pub n_visible_views: usize,
    /// Number of tracks per supporting-image count.
    pub by_num_images: BTreeMap<usize, usize>,
    pub mean_length: f64,
}

impl TrackReport {
    pub fn from_tracks(tracks: &[LineTrack], n_visible_views: usize) -> Self {
        let mut by_num_images = BTreeMap::new();
        for track in tracks {
            *by_num_images.entry(track.num_images()).or_insert(0) += 1;
        }
        let total_length: f64 = tracks.iter().map(|t| t.line.length()).sum();
        Self {
            num_tracks: tracks.len(),
            num_observations: tracks.iter().map(LineTrack::num_lines).sum(),
            num_visible: tracks
                .iter()
                .filter(|t| t.num_images() >= n_visible_views)
                .count(),
            n_visible_views,
            by_num_images,
            mean_length: if tracks.is_empty() {
                0.0
            } else {
                total_length / tracks.len() as f64
            },
        }
    }

    pub fn log(&self) {
        info!(
            "{} tracks, {} observations, {} supported by >= {} images, mean length {:.3}",
            self.num_tracks,
            self.num_observations,
            self.num_visible,
            self.n_visible_views,
            self.mean_length
        );
        for (num_images, count) in &self.by_num_images {
            info!("  {:>3} images: {} tracks", num_images, count);
        }
    }
}
