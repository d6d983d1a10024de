//! Local report navigation tools
//!
//! `find_report_sections` and `get_report_section` answer from the sliced
//! report cache without touching the remote service. Contract errors come
//! back as classified strings, never as exceptions.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::report::ReportManifest;

/// How many matches a section search returns
const MAX_FIND_RESULTS: usize = 20;

/// Navigator over the attached report manifests
#[derive(Default)]
pub struct ReportNavigator {
    /// Manifests keyed by report label (usually the file name)
    manifests: Mutex<HashMap<String, ReportManifest>>,
}

impl ReportNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a sliced report under a label
    pub fn attach(&self, label: impl Into<String>, manifest: ReportManifest) {
        let label = label.into();
        debug!("Attaching report '{}' ({} sections)", label, manifest.sections.len());
        self.manifests.lock().expect("manifests lock").insert(label, manifest);
    }

    /// True when at least one report is attached
    pub fn has_reports(&self) -> bool {
        !self.manifests.lock().expect("manifests lock").is_empty()
    }

    /// `find_report_sections {query}`
    pub fn find_sections(&self, arguments: &Value) -> String {
        let query = match arguments.get("query").and_then(|q| q.as_str()) {
            Some(q) if !q.trim().is_empty() => q.trim().to_lowercase(),
            _ => return "query is required.".to_string(),
        };

        let manifests = self.manifests.lock().expect("manifests lock");
        if manifests.is_empty() {
            return "ERROR: no cached report is attached".to_string();
        }

        let mut matches: Vec<Value> = Vec::new();
        for (label, manifest) in manifests.iter() {
            for section in &manifest.sections {
                if section.section_id.to_lowercase().contains(&query)
                    || section.json_pointer.to_lowercase().contains(&query)
                {
                    matches.push(json!({
                        "report": label,
                        "sectionId": section.section_id,
                        "jsonPointer": section.json_pointer,
                        "sizeBytes": section.size_bytes,
                    }));
                    if matches.len() >= MAX_FIND_RESULTS {
                        break;
                    }
                }
            }
        }

        json!({"query": query, "matches": matches}).to_string()
    }

    /// `get_report_section {sectionId?, jsonPointer?, report?}`
    pub fn get_section(&self, arguments: &Value) -> String {
        let section_id = arguments.get("sectionId").and_then(|s| s.as_str());
        let pointer = arguments.get("jsonPointer").and_then(|s| s.as_str());
        if section_id.is_none() && pointer.is_none() {
            return "sectionId is required.".to_string();
        }

        let manifests = self.manifests.lock().expect("manifests lock");
        if manifests.is_empty() {
            return "ERROR: no cached report is attached".to_string();
        }

        let wanted_report = arguments.get("report").and_then(|r| r.as_str());
        for (label, manifest) in manifests.iter() {
            if let Some(wanted) = wanted_report {
                if wanted != label {
                    continue;
                }
            }
            let record = section_id
                .and_then(|id| manifest.section_by_id(id))
                .or_else(|| pointer.and_then(|p| manifest.section_by_pointer(p)));
            if let Some(record) = record {
                return match manifest.read_section(record) {
                    Ok(text) => text,
                    // A vanished fragment degrades like a cache miss.
                    Err(e) => format!("ERROR: section could not be read: {}", e),
                };
            }
        }

        format!(
            "invalid_path: no section matches {}",
            section_id.or(pointer).unwrap_or_default()
        )
    }
}
