use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

/// A recorded session: the script to run and the report it must produce.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayFixture {
    pub name: String,
    pub script: Value,
    pub expected: Value,
}

pub fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join("replay")
}

pub fn load_replay_fixtures() -> Vec<(PathBuf, ReplayFixture)> {
    let dir = fixtures_dir();
    let mut paths: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap_or_else(|e| panic!("failed to read {:?}: {e}", dir))
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            let text = fs::read_to_string(&path).unwrap_or_else(|e| panic!("failed to read {:?}: {e}", path));
            let fixture: ReplayFixture =
                serde_json::from_str(&text).unwrap_or_else(|e| panic!("failed to parse {:?}: {e}", path));
            (path, fixture)
        })
        .collect()
}
