//! Filesystem-backed report cache
//!
//! Slices a structured report into per-section JSON fragments under a
//! content-addressed directory. The cache key binds the source path, its
//! length and its last-write time, so an updated report never aliases stale
//! fragments. Read failures degrade silently to a rebuild.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::pointer::escape_pointer_segment;
use crate::error::Result;

/// Largest fragment written verbatim
pub const MAX_SECTION_BYTES: usize = 200_000;

/// Property names listed in an object split container
const MAX_PROPERTY_LIST: usize = 200;

/// Item samples listed in an array split container
const MAX_ARRAY_SAMPLES: usize = 50;

/// Section-id prefix length kept in fragment file names
const FILE_NAME_ID_CHARS: usize = 120;

/// Hex digits of the name hash suffix
const FILE_NAME_HASH_CHARS: usize = 12;

/// One cached fragment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    pub section_id: String,
    pub json_pointer: String,
    pub file_path: String,
    pub size_bytes: u64,
}

/// The manifest of one sliced report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportManifest {
    pub dump_id: String,
    pub source_path: String,
    pub sections: Vec<SectionRecord>,
    /// Cache directory this manifest was loaded from (not persisted)
    #[serde(skip)]
    pub cache_dir: PathBuf,
}

impl ReportManifest {
    /// Find a section by id
    pub fn section_by_id(&self, section_id: &str) -> Option<&SectionRecord> {
        self.sections.iter().find(|s| s.section_id == section_id)
    }

    /// Find a section by JSON pointer
    pub fn section_by_pointer(&self, pointer: &str) -> Option<&SectionRecord> {
        self.sections.iter().find(|s| s.json_pointer == pointer)
    }

    /// Read one fragment's JSON text
    pub fn read_section(&self, record: &SectionRecord) -> Result<String> {
        Ok(std::fs::read_to_string(self.cache_dir.join(&record.file_path))?)
    }
}

/// Filesystem-backed, content-addressed report cache
pub struct ReportCache {
    root: PathBuf,
    max_section_bytes: usize,
}

impl ReportCache {
    /// Cache rooted at `root` with the default section size cap
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ReportCache { root: root.into(), max_section_bytes: MAX_SECTION_BYTES }
    }

    /// Override the per-section byte cap (tests, small budgets)
    pub fn with_max_section_bytes(mut self, max: usize) -> Self {
        self.max_section_bytes = max;
        self
    }

    /// Cache key: SHA-256 over `absolutePath|fileLength|lastWriteUtcTicks`
    fn cache_key(path: &Path) -> Result<String> {
        let absolute = std::fs::canonicalize(path)?;
        let meta = std::fs::metadata(&absolute)?;
        let ticks = meta
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() / 100)
            .unwrap_or(0);
        let stable = format!("{}|{}|{}", absolute.display(), meta.len(), ticks);
        let mut hasher = Sha256::new();
        hasher.update(stable.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }

    /// Directory holding the fragments for `path`
    pub fn cache_dir_for(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(Self::cache_key(path)?))
    }

    /// Load the manifest for `path`, slicing the report if needed.
    ///
    /// A corrupt or missing manifest is treated as a cache miss.
    pub fn get_or_build(&self, path: &Path, dump_id: &str) -> Result<ReportManifest> {
        let dir = self.cache_dir_for(path)?;
        let manifest_path = dir.join("manifest.json");

        if let Ok(text) = std::fs::read_to_string(&manifest_path) {
            match serde_json::from_str::<ReportManifest>(&text) {
                Ok(mut manifest) => {
                    debug!("Report cache hit: {}", dir.display());
                    manifest.cache_dir = dir;
                    return Ok(manifest);
                }
                Err(e) => warn!("Corrupt report manifest, rebuilding: {}", e),
            }
        }

        self.build(path, dump_id, &dir)
    }

    fn build(&self, path: &Path, dump_id: &str, dir: &Path) -> Result<ReportManifest> {
        debug!("Slicing report {} into {}", path.display(), dir.display());
        std::fs::create_dir_all(dir)?;

        let text = std::fs::read_to_string(path)?;
        let root: Value = serde_json::from_str(&text)?;

        let mut records = Vec::new();
        self.slice_value(dir, "", "", &root, &mut records)?;

        let manifest = ReportManifest {
            dump_id: dump_id.to_string(),
            source_path: path.display().to_string(),
            sections: records,
            cache_dir: dir.to_path_buf(),
        };
        std::fs::write(
            dir.join("manifest.json"),
            serde_json::to_vec_pretty(&manifest)?,
        )?;
        std::fs::write(dir.join("summary.json"), self.build_summary(&manifest, &root)?)?;
        Ok(manifest)
    }

    fn build_summary(&self, manifest: &ReportManifest, root: &Value) -> Result<Vec<u8>> {
        let top_sections: Vec<&String> = root
            .as_object()
            .map(|o| o.keys().collect())
            .unwrap_or_default();
        let summary = json!({
            "dumpId": manifest.dump_id,
            "sourcePath": manifest.source_path,
            "sectionCount": manifest.sections.len(),
            "topLevelSections": top_sections,
            "metadata": root.get("metadata").cloned().unwrap_or(Value::Null),
        });
        Ok(serde_json::to_vec_pretty(&summary)?)
    }

    /// Recursive depth-first slicing.
    ///
    /// Values that fit go out verbatim; oversized containers emit a split
    /// placeholder and recurse; oversized primitives emit a truncation note.
    fn slice_value(
        &self,
        dir: &Path,
        section_id: &str,
        pointer: &str,
        value: &Value,
        records: &mut Vec<SectionRecord>,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        if bytes.len() <= self.max_section_bytes {
            self.write_section(dir, section_id, pointer, &bytes, records)?;
            return Ok(());
        }

        match value {
            Value::Object(map) => {
                let properties: Vec<&String> = map.keys().take(MAX_PROPERTY_LIST).collect();
                let placeholder = json!({
                    "splitContainer": true,
                    "jsonPointer": pointer,
                    "propertyCount": map.len(),
                    "properties": properties,
                });
                self.write_section(
                    dir,
                    section_id,
                    pointer,
                    &serde_json::to_vec(&placeholder)?,
                    records,
                )?;
                for (key, child) in map {
                    let child_id = join_section_id(section_id, key);
                    let child_pointer = format!("{}/{}", pointer, escape_pointer_segment(key));
                    self.slice_value(dir, &child_id, &child_pointer, child, records)?;
                }
            }
            Value::Array(items) => {
                let samples: Vec<Value> = items
                    .iter()
                    .take(MAX_ARRAY_SAMPLES)
                    .enumerate()
                    .map(|(i, _)| json!({"index": i, "jsonPointer": format!("{}/{}", pointer, i)}))
                    .collect();
                let placeholder = json!({
                    "splitContainer": true,
                    "jsonPointer": pointer,
                    "itemCount": items.len(),
                    "items": samples,
                });
                self.write_section(
                    dir,
                    section_id,
                    pointer,
                    &serde_json::to_vec(&placeholder)?,
                    records,
                )?;
                for (index, item) in items.iter().enumerate() {
                    let child_id = join_section_id(section_id, &stable_item_key(item, index));
                    let child_pointer = format!("{}/{}", pointer, index);
                    self.slice_value(dir, &child_id, &child_pointer, item, records)?;
                }
            }
            _ => {
                let placeholder = json!({
                    "truncated": true,
                    "jsonPointer": pointer,
                    "note": "oversize primitive value elided",
                });
                self.write_section(
                    dir,
                    section_id,
                    pointer,
                    &serde_json::to_vec(&placeholder)?,
                    records,
                )?;
            }
        }
        Ok(())
    }

    fn write_section(
        &self,
        dir: &Path,
        section_id: &str,
        pointer: &str,
        bytes: &[u8],
        records: &mut Vec<SectionRecord>,
    ) -> Result<()> {
        let file_name = section_file_name(section_id, pointer);
        std::fs::write(dir.join(&file_name), bytes)?;
        records.push(SectionRecord {
            section_id: display_section_id(section_id),
            json_pointer: pointer.to_string(),
            file_path: file_name,
            size_bytes: bytes.len() as u64,
        });
        Ok(())
    }
}

fn join_section_id(parent: &str, child: &str) -> String {
    if parent.is_empty() {
        child.to_string()
    } else {
        format!("{}.{}", parent, child)
    }
}

fn display_section_id(section_id: &str) -> String {
    if section_id.is_empty() {
        "report".to_string()
    } else {
        section_id.to_string()
    }
}

/// Stable key for an array item: prefer `dumpId`, then `threadId`, then
/// `name`, then the numeric index.
fn stable_item_key(item: &Value, index: usize) -> String {
    if let Some(obj) = item.as_object() {
        if let Some(id) = obj.get("dumpId").and_then(|v| v.as_str()) {
            return id.to_string();
        }
        if let Some(thread) = obj.get("threadId") {
            match thread {
                Value::String(s) => return s.clone(),
                Value::Number(n) => return n.to_string(),
                _ => {}
            }
        }
        if let Some(name) = obj.get("name").and_then(|v| v.as_str()) {
            return name.to_string();
        }
    }
    index.to_string()
}

fn sanitize_section_id(section_id: &str) -> String {
    display_section_id(section_id)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .take(FILE_NAME_ID_CHARS)
        .collect()
}

/// Fragment file name: `sanitize(sectionId)[:120]-<sha12>.json`
fn section_file_name(section_id: &str, pointer: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(section_id.as_bytes());
    hasher.update(b"|");
    hasher.update(pointer.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!(
        "{}-{}.json",
        sanitize_section_id(section_id),
        &digest[..FILE_NAME_HASH_CHARS]
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_report(dir: &Path, value: &Value) -> PathBuf {
        let path = dir.join("report.json");
        std::fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_small_report_is_one_section() {
        let tmp = tempfile::tempdir().unwrap();
        let report = json!({"metadata": {"dumpId": "d1"}, "threads": {"count": 2}});
        let path = write_report(tmp.path(), &report);

        let cache = ReportCache::new(tmp.path().join("cache"));
        let manifest = cache.get_or_build(&path, "d1").unwrap();
        assert_eq!(manifest.sections.len(), 1);
        assert_eq!(manifest.sections[0].section_id, "report");
        assert_eq!(manifest.sections[0].json_pointer, "");
    }

    #[test]
    fn test_oversize_object_splits_per_property() {
        let tmp = tempfile::tempdir().unwrap();
        let big = "x".repeat(600);
        let report = json!({
            "metadata": {"dumpId": "d2"},
            "threads": {"a": big.clone(), "b": big.clone()},
        });
        let path = write_report(tmp.path(), &report);

        let cache = ReportCache::new(tmp.path().join("cache")).with_max_section_bytes(500);
        let manifest = cache.get_or_build(&path, "d2").unwrap();

        // Root placeholder + metadata + threads placeholder + two leaves.
        let root = manifest.section_by_pointer("").unwrap();
        let text = manifest.read_section(root).unwrap();
        assert!(text.contains("splitContainer"));
        assert!(manifest.section_by_id("threads.a").is_some());
        assert!(manifest.section_by_id("threads.b").is_some());
        assert!(manifest.section_by_pointer("/threads/a").is_some());
    }

    #[test]
    fn test_array_items_use_stable_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let filler = "f".repeat(400);
        let report = json!({
            "metadata": {"dumpId": "d3"},
            "threads": [
                {"threadId": 26, "stack": filler.clone()},
                {"name": "finalizer", "stack": filler.clone()},
                {"stack": filler},
            ],
        });
        let path = write_report(tmp.path(), &report);

        let cache = ReportCache::new(tmp.path().join("cache")).with_max_section_bytes(450);
        let manifest = cache.get_or_build(&path, "d3").unwrap();

        assert!(manifest.section_by_id("threads.26").is_some());
        assert!(manifest.section_by_id("threads.finalizer").is_some());
        assert!(manifest.section_by_id("threads.2").is_some());
        // Pointers stay numeric.
        assert!(manifest.section_by_pointer("/threads/0").is_some());
    }

    #[test]
    fn test_oversize_primitive_gets_truncation_note() {
        let tmp = tempfile::tempdir().unwrap();
        let report = json!({
            "metadata": {"dumpId": "d4"},
            "memory": {"blob": "z".repeat(2000)},
        });
        let path = write_report(tmp.path(), &report);

        let cache = ReportCache::new(tmp.path().join("cache")).with_max_section_bytes(300);
        let manifest = cache.get_or_build(&path, "d4").unwrap();
        let blob = manifest.section_by_pointer("/memory/blob").unwrap();
        let text = manifest.read_section(blob).unwrap();
        assert!(text.contains("\"truncated\":true"));
    }

    #[test]
    fn test_cache_hit_and_corrupt_manifest_rebuild() {
        let tmp = tempfile::tempdir().unwrap();
        let report = json!({"metadata": {"dumpId": "d5"}, "async": {}});
        let path = write_report(tmp.path(), &report);

        let cache = ReportCache::new(tmp.path().join("cache"));
        let first = cache.get_or_build(&path, "d5").unwrap();

        // Second call hits the cache.
        let second = cache.get_or_build(&path, "d5").unwrap();
        assert_eq!(first.sections.len(), second.sections.len());

        // Corrupt the manifest: the cache degrades to a rebuild.
        std::fs::write(first.cache_dir.join("manifest.json"), b"{ nope").unwrap();
        let rebuilt = cache.get_or_build(&path, "d5").unwrap();
        assert_eq!(rebuilt.sections.len(), first.sections.len());
    }

    #[test]
    fn test_pointer_escaping_in_keys() {
        let tmp = tempfile::tempdir().unwrap();
        let filler = "p".repeat(600);
        let report = json!({
            "metadata": {"dumpId": "d6"},
            "modules": {"a/b": filler.clone(), "c~d": filler},
        });
        let path = write_report(tmp.path(), &report);

        let cache = ReportCache::new(tmp.path().join("cache")).with_max_section_bytes(500);
        let manifest = cache.get_or_build(&path, "d6").unwrap();
        assert!(manifest.section_by_pointer("/modules/a~1b").is_some());
        assert!(manifest.section_by_pointer("/modules/c~0d").is_some());
    }

    #[test]
    fn test_section_file_name_shape() {
        let name = section_file_name("threads.main worker!", "/threads/0");
        assert!(name.ends_with(".json"));
        assert!(name.contains("threads.main_worker_"));
        // 12 hex chars between the dash and the extension.
        let hash = name.rsplit('-').next().unwrap().trim_end_matches(".json");
        assert_eq!(hash.len(), 12);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
