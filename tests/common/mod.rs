//! Shared setup: a scratch copy of `tests/fixtures` and a pipeline over it.
#![allow(dead_code)]

use chrono::NaiveDate;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;
use wordrush_content::core::pipeline::ContentPipeline;

pub const FIXTURES: &str = "tests/fixtures";

pub fn export_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()
}

/// Copy the fixture tree into a fresh temp dir, since the pipeline writes
/// back into the content tree.
pub fn workspace() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let fixtures = Path::new(FIXTURES);
    for entry in WalkDir::new(fixtures) {
        let entry = entry.unwrap();
        let target = dir.path().join(entry.path().strip_prefix(fixtures).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
    dir
}

pub fn pipeline(root: &Path) -> ContentPipeline {
    ContentPipeline::builder()
        .content_dir(root.join("content"))
        .families_dir(root.join("families"))
        .output_dir(root.join("export"))
        .seed(42)
        .export_date(export_date())
        .build()
        .unwrap()
}

pub fn read(path: impl AsRef<Path>) -> String {
    fs::read_to_string(path).unwrap()
}
