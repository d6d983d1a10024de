//! Report cache and attachment pipeline
//!
//! Large structured crash reports are detected (`detect.rs`), sliced into
//! content-addressed per-section JSON fragments on disk (`cache.rs`), and
//! injected into prompts under a byte budget with untrusted-content fencing
//! (`attach.rs`).

mod attach;
mod cache;
mod detect;
mod pointer;

pub use attach::{compose_attachment, fence_content, AttachmentBudget};
pub use cache::{ReportCache, ReportManifest, SectionRecord, MAX_SECTION_BYTES};
pub use detect::{detect_structured_report, scan_report_prefix, DetectedReport};
pub use pointer::{escape_pointer_segment, unescape_pointer_segment};
