//! Metadata extraction — one interface over both producer paths.
//!
//! The structured phase returns a JSON object; the legacy path returns a
//! marker-delimited text blob. Callers extract a [`PageMetadata`] without
//! knowing which path produced it, and always get a usable value: bad or
//! missing fields are filled from the canned fallback.

use crate::{
  page::{PageFact, PageMetadata, RelatedConcept},
  sections::parse_sections,
};

pub const MAX_CATEGORIES: usize = 4;
pub const MAX_CROSS_REFERENCE_TERMS: usize = 8;
pub const MAX_RELATED_CONCEPTS: usize = 4;
pub const MAX_FACTS: usize = 4;

/// Where a page's metadata came from.
#[derive(Debug, Clone)]
pub enum MetadataSource {
  /// The structured-object generation phase.
  Structured(serde_json::Value),
  /// A legacy marker-delimited text buffer.
  MarkerText(String),
}

impl MetadataSource {
  /// Extract metadata, clamping list lengths and substituting fallback
  /// values for unusable fields. Never fails.
  pub fn extract(&self, title: &str) -> PageMetadata {
    let raw = match self {
      MetadataSource::Structured(value) => {
        match serde_json::from_value::<PageMetadata>(value.clone()) {
          Ok(metadata) => metadata,
          Err(e) => {
            tracing::warn!(error = %e, "structured metadata unusable");
            return fallback_metadata(title);
          }
        }
      }
      MetadataSource::MarkerText(buffer) => {
        let extract = parse_sections(buffer);
        PageMetadata {
          categories:            extract.categories,
          cross_reference_terms: extract.clickable_terms,
          related_concepts:      extract.related_concepts,
          facts:                 extract.basic_facts,
        }
      }
    };
    clamp(raw, title)
  }
}

fn clamp(mut metadata: PageMetadata, title: &str) -> PageMetadata {
  let fallback = fallback_metadata(title);
  if metadata.categories.is_empty() {
    metadata.categories = fallback.categories;
  }
  metadata.categories.truncate(MAX_CATEGORIES);
  if metadata.cross_reference_terms.is_empty() {
    metadata.cross_reference_terms = fallback.cross_reference_terms;
  }
  metadata
    .cross_reference_terms
    .truncate(MAX_CROSS_REFERENCE_TERMS);
  if metadata.related_concepts.is_empty() {
    metadata.related_concepts = fallback.related_concepts;
  }
  metadata.related_concepts.truncate(MAX_RELATED_CONCEPTS);
  if metadata.facts.is_empty() {
    metadata.facts = fallback.facts;
  }
  metadata.facts.truncate(MAX_FACTS);
  metadata
}

/// Canned metadata used when generation fails outright. Deliberately
/// generic: it must read sensibly for any subject.
pub fn fallback_metadata(title: &str) -> PageMetadata {
  PageMetadata {
    categories: vec!["General Knowledge".into(), "Unverified Lore".into()],
    cross_reference_terms: vec![
      "history".into(),
      "origin".into(),
      "tradition".into(),
      "legend".into(),
      "culture".into(),
    ],
    related_concepts: vec![
      RelatedConcept {
        term:        "Oral Tradition".into(),
        description: format!("How accounts of {title} were first kept."),
      },
      RelatedConcept {
        term:        "Disputed Records".into(),
        description: "Sources that disagree on the basic facts.".into(),
      },
    ],
    facts: vec![
      PageFact {
        name:  "Classification".into(),
        value: "Uncatalogued".into(),
      },
      PageFact { name: "Status".into(), value: "Partially recorded".into() },
      PageFact { name: "Sources".into(), value: "Disputed".into() },
    ],
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn structured_and_marker_paths_agree() {
    let structured = MetadataSource::Structured(json!({
      "categories": ["Places", "Wonders"],
      "crossReferenceTerms": ["cloud sea", "sky harbor", "windship",
                              "drift", "beacon"],
      "relatedConcepts": [
        { "term": "Sky Harbors", "description": "Moorings for windships" },
        { "term": "Cloud Sea", "description": "The ocean below" }
      ],
      "facts": [
        { "name": "Population", "value": "12,000" },
        { "name": "Founded", "value": "Third Age" },
        { "name": "Status", "value": "Inhabited" }
      ]
    }));
    let marker = MetadataSource::MarkerText(
      "CATEGORIES:\nPlaces\nWonders\n\
       CLICKABLE_TERMS:\ncloud sea\nsky harbor\nwindship\ndrift\nbeacon\n\
       RELATED_CONCEPTS:\nSky Harbors | Moorings for windships\n\
       Cloud Sea | The ocean below\n\
       BASIC_FACTS:\nPopulation | 12,000\nFounded | Third Age\n\
       Status | Inhabited\n"
        .into(),
    );

    assert_eq!(structured.extract("Aethros"), marker.extract("Aethros"));
  }

  #[test]
  fn unusable_structured_payload_falls_back() {
    let source = MetadataSource::Structured(json!({ "categories": 7 }));
    let metadata = source.extract("Aethros");
    assert_eq!(metadata, fallback_metadata("Aethros"));
  }

  #[test]
  fn oversized_lists_are_clamped() {
    let terms: Vec<String> =
      (0..20).map(|n| format!("term-{n}")).collect();
    let source = MetadataSource::Structured(json!({
      "categories": ["a", "b", "c", "d", "e", "f"],
      "crossReferenceTerms": terms,
      "relatedConcepts": [],
      "facts": []
    }));
    let metadata = source.extract("Aethros");
    assert_eq!(metadata.categories.len(), MAX_CATEGORIES);
    assert_eq!(
      metadata.cross_reference_terms.len(),
      MAX_CROSS_REFERENCE_TERMS
    );
    // Empty lists were refilled from the fallback.
    assert!(!metadata.related_concepts.is_empty());
    assert!(!metadata.facts.is_empty());
  }
}
