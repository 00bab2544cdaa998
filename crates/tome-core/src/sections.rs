//! Legacy marker-based section parser.
//!
//! An older generation path returned one free-text blob with uppercase
//! section markers instead of a structured object. This parser extracts
//! each section from an accumulating buffer; a section whose closing marker
//! has not arrived yet yields its best-effort text so far. Re-parsing a
//! longer buffer reproduces every previously extracted value unchanged —
//! the parser is a pure function of the buffer.

use crate::page::{PageFact, RelatedConcept};

/// The markers recognised at line starts, in canonical order.
pub const MARKERS: [&str; 5] = [
  "CONTENT:",
  "CATEGORIES:",
  "CLICKABLE_TERMS:",
  "RELATED_CONCEPTS:",
  "BASIC_FACTS:",
];

/// Everything extracted from a marker-delimited buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionExtract {
  pub content:          String,
  pub categories:       Vec<String>,
  pub clickable_terms:  Vec<String>,
  pub related_concepts: Vec<RelatedConcept>,
  pub basic_facts:      Vec<PageFact>,
}

/// Parse `buffer` into its sections. Missing markers yield empty fields.
pub fn parse_sections(buffer: &str) -> SectionExtract {
  SectionExtract {
    content: section_text(buffer, "CONTENT:")
      .map(|s| s.trim().to_string())
      .unwrap_or_default(),
    categories: list_items(section_text(buffer, "CATEGORIES:")),
    clickable_terms: list_items(section_text(buffer, "CLICKABLE_TERMS:")),
    related_concepts: pair_items(section_text(buffer, "RELATED_CONCEPTS:"))
      .into_iter()
      .map(|(term, description)| RelatedConcept { term, description })
      .collect(),
    basic_facts: pair_items(section_text(buffer, "BASIC_FACTS:"))
      .into_iter()
      .map(|(name, value)| PageFact { name, value })
      .collect(),
  }
}

/// The text between `marker` and the next known marker (or end of buffer).
fn section_text<'a>(buffer: &'a str, marker: &str) -> Option<&'a str> {
  let start = marker_position(buffer, marker)? + marker.len();
  let rest = &buffer[start..];

  let end = MARKERS
    .iter()
    .filter(|&&m| m != marker)
    .filter_map(|m| marker_position(rest, m))
    .min()
    .unwrap_or(rest.len());

  Some(&rest[..end])
}

/// Byte offset of `marker` at a line start, if present.
fn marker_position(buffer: &str, marker: &str) -> Option<usize> {
  let mut from = 0;
  while let Some(at) = buffer[from..].find(marker) {
    let index = from + at;
    if index == 0 || buffer.as_bytes()[index - 1] == b'\n' {
      return Some(index);
    }
    from = index + marker.len();
  }
  None
}

/// Split a list section into trimmed items, dropping blanks and bullets.
fn list_items(text: Option<&str>) -> Vec<String> {
  let Some(text) = text else { return Vec::new() };
  text
    .lines()
    .map(|line| strip_bullet(line.trim()))
    .filter(|line| !line.is_empty())
    .map(str::to_string)
    .collect()
}

/// Split a key/value section into `(name, value)` pairs at the first `|`.
fn pair_items(text: Option<&str>) -> Vec<(String, String)> {
  let Some(text) = text else { return Vec::new() };
  text
    .lines()
    .map(|line| strip_bullet(line.trim()))
    .filter_map(|line| {
      let (name, value) = line.split_once('|')?;
      let (name, value) = (name.trim(), value.trim());
      if name.is_empty() { None } else { Some((name.into(), value.into())) }
    })
    .collect()
}

fn strip_bullet(line: &str) -> &str {
  for prefix in ["- ", "* ", "• "] {
    if let Some(rest) = line.strip_prefix(prefix) {
      return rest.trim_start();
    }
  }
  // Numbered bullets: "3. item"
  let digits = line.bytes().take_while(u8::is_ascii_digit).count();
  if digits > 0
    && let Some(rest) = line[digits..].strip_prefix(". ")
  {
    return rest.trim_start();
  }
  line
}

#[cfg(test)]
mod tests {
  use super::*;

  const FULL: &str = "CONTENT:\nAethros drifts above the clouds.\n\
It is held aloft by song.\nCATEGORIES:\n- Places\n- Wonders\n\n\
CLICKABLE_TERMS:\ncloud sea\nsky harbor\nRELATED_CONCEPTS:\n\
Sky Harbors | Moorings for windships\nCloud Sea | The ocean below\n\
BASIC_FACTS:\nPopulation | 12,000\nFounded | Third Age\n";

  #[test]
  fn full_buffer_extracts_every_section() {
    let extract = parse_sections(FULL);
    assert!(extract.content.starts_with("Aethros drifts"));
    assert_eq!(extract.categories, vec!["Places", "Wonders"]);
    assert_eq!(extract.clickable_terms, vec!["cloud sea", "sky harbor"]);
    assert_eq!(extract.related_concepts.len(), 2);
    assert_eq!(extract.related_concepts[0].term, "Sky Harbors");
    assert_eq!(extract.basic_facts[0].name, "Population");
    assert_eq!(extract.basic_facts[0].value, "12,000");
  }

  #[test]
  fn partial_buffer_yields_best_effort_text() {
    // The CATEGORIES marker hasn't arrived; CONTENT runs to end-of-buffer.
    let partial = "CONTENT:\nAethros drifts above the clo";
    let extract = parse_sections(partial);
    assert_eq!(extract.content, "Aethros drifts above the clo");
    assert!(extract.categories.is_empty());
  }

  #[test]
  fn sections_are_stable_once_their_closing_marker_arrives() {
    // Grow the buffer one whole section at a time. Every section whose
    // closing marker has arrived must already equal its final value.
    let final_extract = parse_sections(FULL);
    let mut cut_points: Vec<usize> = MARKERS
      .iter()
      .filter_map(|m| FULL.find(m))
      .collect();
    cut_points.push(FULL.len());
    cut_points.sort_unstable();

    for (settled, &cut) in cut_points.iter().enumerate().skip(1) {
      let extract = parse_sections(&FULL[..cut]);
      if settled >= 1 {
        assert_eq!(extract.content, final_extract.content);
      }
      if settled >= 2 {
        assert_eq!(extract.categories, final_extract.categories);
      }
      if settled >= 3 {
        assert_eq!(extract.clickable_terms, final_extract.clickable_terms);
      }
      if settled >= 4 {
        assert_eq!(extract.related_concepts, final_extract.related_concepts);
      }
      if settled >= 5 {
        assert_eq!(extract.basic_facts, final_extract.basic_facts);
      }
    }
  }

  #[test]
  fn open_tail_section_extends_monotonically() {
    let grown = [
      "CONTENT:\nAethros drifts",
      "CONTENT:\nAethros drifts above the",
      "CONTENT:\nAethros drifts above the clouds.",
    ];
    let mut last = String::new();
    for buffer in grown {
      let content = parse_sections(buffer).content;
      assert!(content.starts_with(&last), "{content:?} vs {last:?}");
      last = content;
    }
  }

  #[test]
  fn markers_mid_line_are_not_markers() {
    let tricky = "CONTENT:\nThe sign read CATEGORIES: in faded paint.\n";
    let extract = parse_sections(tricky);
    assert!(extract.content.contains("faded paint"));
    assert!(extract.categories.is_empty());
  }

  #[test]
  fn bullets_and_blank_lines_are_dropped() {
    let buffer = "CATEGORIES:\n- Places\n\n* Wonders\n• Myths\n2. Legends\n";
    let extract = parse_sections(buffer);
    assert_eq!(extract.categories, vec![
      "Places", "Wonders", "Myths", "Legends"
    ]);
  }

  #[test]
  fn pair_lines_without_separator_are_skipped() {
    let buffer = "BASIC_FACTS:\nPopulation | 12,000\nno separator here\n";
    let extract = parse_sections(buffer);
    assert_eq!(extract.basic_facts.len(), 1);
  }
}
