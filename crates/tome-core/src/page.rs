//! Page data model — metadata, snapshots, and the derived usage view.
//!
//! A snapshot describes the whole page state at one point in the generation
//! timeline. Clients render each snapshot as it arrives; only the terminal
//! snapshot (`complete = true`) is authoritative.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Metadata ────────────────────────────────────────────────────────────────

/// A concept related to the page, shown as a "see also" entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedConcept {
  pub term:        String,
  pub description: String,
}

/// One named fact in the page's fact box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFact {
  pub name:  String,
  pub value: String,
}

/// Fixed-shape metadata produced by the structured generation phase.
///
/// `cross_reference_terms` are expected to appear verbatim in the generated
/// prose so the client can turn them into links.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetadata {
  pub categories:            Vec<String>,
  pub cross_reference_terms: Vec<String>,
  pub related_concepts:      Vec<RelatedConcept>,
  pub facts:                 Vec<PageFact>,
}

// ─── Usage view ──────────────────────────────────────────────────────────────

/// The client-facing quota summary — always derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageView {
  pub usage_count: u32,
  pub daily_limit: u32,
  pub remaining:   u32,
}

impl UsageView {
  pub fn new(usage_count: u32, daily_limit: u32) -> Self {
    UsageView {
      usage_count,
      daily_limit,
      remaining: daily_limit.saturating_sub(usage_count),
    }
  }
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One point-in-time view of a page under generation.
///
/// Lifecycle: one initial partial snapshot (empty content, progress 20),
/// zero or more partial snapshots with accumulated prose, exactly one
/// terminal snapshot with `complete = true`. Metadata fields are omitted
/// for section snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
  pub id:      Uuid,
  pub title:   String,
  pub content: String,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub categories: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub cross_reference_terms: Option<Vec<String>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub related_concepts: Option<Vec<RelatedConcept>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub facts: Option<Vec<PageFact>>,

  pub partial:  bool,
  pub complete: bool,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub progress_percent: Option<u8>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub usage: Option<UsageView>,
}

impl PageSnapshot {
  /// A partial (in-flight) snapshot.
  pub fn partial(
    id: Uuid,
    title: &str,
    content: String,
    metadata: Option<&PageMetadata>,
    progress: u8,
  ) -> Self {
    let mut snapshot = PageSnapshot::bare(id, title, content);
    snapshot.partial = true;
    snapshot.progress_percent = Some(progress);
    snapshot.apply_metadata(metadata);
    snapshot
  }

  /// The single terminal snapshot closing a stream.
  pub fn terminal(
    id: Uuid,
    title: &str,
    content: String,
    metadata: Option<&PageMetadata>,
    usage: Option<UsageView>,
  ) -> Self {
    let mut snapshot = PageSnapshot::bare(id, title, content);
    snapshot.complete = true;
    snapshot.progress_percent = Some(100);
    snapshot.usage = usage;
    snapshot.apply_metadata(metadata);
    snapshot
  }

  fn bare(id: Uuid, title: &str, content: String) -> Self {
    PageSnapshot {
      id,
      title: title.to_string(),
      content,
      categories: None,
      cross_reference_terms: None,
      related_concepts: None,
      facts: None,
      partial: false,
      complete: false,
      progress_percent: None,
      usage: None,
    }
  }

  fn apply_metadata(&mut self, metadata: Option<&PageMetadata>) {
    if let Some(m) = metadata {
      self.categories = Some(m.categories.clone());
      self.cross_reference_terms = Some(m.cross_reference_terms.clone());
      self.related_concepts = Some(m.related_concepts.clone());
      self.facts = Some(m.facts.clone());
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn usage_view_remaining_saturates() {
    let view = UsageView::new(7, 5);
    assert_eq!(view.remaining, 0);
  }

  #[test]
  fn section_snapshot_omits_metadata_fields() {
    let snap = PageSnapshot::terminal(
      Uuid::new_v4(),
      "Climate",
      "Storms circle the crystal fields.".into(),
      None,
      None,
    );
    let json = serde_json::to_value(&snap).unwrap();
    assert!(json.get("categories").is_none());
    assert!(json.get("facts").is_none());
    assert_eq!(json["complete"], true);
  }

  #[test]
  fn snapshot_wire_fields_are_camel_case() {
    let meta = PageMetadata {
      categories: vec!["Places".into(), "Skyborne".into()],
      cross_reference_terms: vec!["cloud".into()],
      related_concepts: vec![],
      facts: vec![],
    };
    let snap = PageSnapshot::partial(
      Uuid::new_v4(),
      "Aethros",
      String::new(),
      Some(&meta),
      20,
    );
    let json = serde_json::to_value(&snap).unwrap();
    assert!(json.get("crossReferenceTerms").is_some());
    assert!(json.get("progressPercent").is_some());
  }
}
