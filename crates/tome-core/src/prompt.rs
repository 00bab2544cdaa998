//! Prompt construction for the three upstream calls.
//!
//! Every prompt leads with a `Subject:` line naming what the call is about,
//! followed by instructions and the shared world-context block.

use serde_json::{Value, json};

use crate::{page::PageMetadata, request::PageKind, world::WorldFacts};

/// Prompt for the structured metadata phase.
pub fn metadata_prompt(
  title: &str,
  kind: PageKind,
  context: Option<&str>,
  world: Option<&WorldFacts>,
) -> String {
  let framing = match kind {
    PageKind::Seed => {
      "The subject line above is a seed prompt for a brand-new encyclopedia \
       entry in a fictional world."
    }
    PageKind::Term => {
      "The subject line above is a term cross-referenced from an existing \
       encyclopedia entry in a fictional world."
    }
  };
  let mut prompt = format!(
    "Subject: {title}\n\n{framing}\n\
     Produce this entry's metadata as one JSON object matching the \
     provided schema: 2-4 categories, 5-8 cross-reference terms that the \
     prose will contain verbatim, 2-4 related concepts with one-line \
     descriptions, and 3-4 basic facts as name/value pairs.\n"
  );
  push_context(&mut prompt, context);
  push_world(&mut prompt, world);
  prompt
}

/// Prompt for the free-text content phase, steered by the metadata.
pub fn content_prompt(
  title: &str,
  metadata: &PageMetadata,
  context: Option<&str>,
  world: Option<&WorldFacts>,
) -> String {
  let mut prompt = format!(
    "Subject: {title}\n\n\
     Write the encyclopedia entry for the subject above: three to five \
     paragraphs of in-world prose, factual in tone, no headings.\n\
     Themes to cover: {}.\n\
     Work each of these terms into the prose verbatim: {}.\n",
    metadata.categories.join(", "),
    metadata.cross_reference_terms.join(", "),
  );
  push_context(&mut prompt, context);
  push_world(&mut prompt, world);
  prompt
}

/// Prompt for a single additional section of an existing entry.
pub fn section_prompt(
  section_title: &str,
  page_title: &str,
  page_content: &str,
  world: Option<&WorldFacts>,
) -> String {
  let mut prompt = format!(
    "Subject: {section_title}\n\n\
     Write the \"{section_title}\" section for the existing encyclopedia \
     entry \"{page_title}\". Two to three sentences, consistent with the \
     entry's prose below. Return only the section text.\n\n\
     Entry prose:\n{page_content}\n"
  );
  push_world(&mut prompt, world);
  prompt
}

/// JSON schema handed to the structured generation call.
pub fn metadata_schema() -> Value {
  json!({
    "type": "object",
    "properties": {
      "categories": {
        "type": "array", "items": { "type": "string" },
        "minItems": 2, "maxItems": 4
      },
      "crossReferenceTerms": {
        "type": "array", "items": { "type": "string" },
        "minItems": 5, "maxItems": 8
      },
      "relatedConcepts": {
        "type": "array",
        "items": {
          "type": "object",
          "properties": {
            "term": { "type": "string" },
            "description": { "type": "string" }
          },
          "required": ["term", "description"]
        },
        "minItems": 2, "maxItems": 4
      },
      "facts": {
        "type": "array",
        "items": {
          "type": "object",
          "properties": {
            "name": { "type": "string" },
            "value": { "type": "string" }
          },
          "required": ["name", "value"]
        },
        "minItems": 3, "maxItems": 4
      }
    },
    "required": ["categories", "crossReferenceTerms", "relatedConcepts", "facts"]
  })
}

fn push_context(prompt: &mut String, context: Option<&str>) {
  if let Some(context) = context
    && !context.trim().is_empty()
  {
    prompt.push_str("\nRequest context:\n");
    prompt.push_str(context.trim());
    prompt.push('\n');
  }
}

fn push_world(prompt: &mut String, world: Option<&WorldFacts>) {
  let Some(world) = world else { return };
  if world.is_empty() {
    return;
  }
  prompt.push_str("\nEstablished facts of this world — stay consistent:\n");
  for (group, category, facts) in world.groups() {
    for fact in facts {
      prompt.push_str(&format!("- [{group}/{category}] {fact}\n"));
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn prompts_lead_with_the_subject_line() {
    let p = metadata_prompt("Aethros", PageKind::Seed, None, None);
    assert!(p.starts_with("Subject: Aethros\n"));

    let p = section_prompt("Climate", "Aethros", "Prose.", None);
    assert!(p.starts_with("Subject: Climate\n"));
  }

  #[test]
  fn content_prompt_carries_terms_and_categories() {
    let metadata = crate::generate::mock_metadata("Aethros");
    let p = content_prompt("Aethros", &metadata, None, None);
    assert!(p.contains("crystal currents"));
    assert!(p.contains("Places & Regions"));
  }

  #[test]
  fn world_facts_render_into_the_context_block() {
    let mut world = WorldFacts::default();
    world
      .social
      .insert("factions".into(), vec!["The Cartographers' Guild".into()]);
    let p = metadata_prompt("Aethros", PageKind::Term, None, Some(&world));
    assert!(p.contains("[social/factions] The Cartographers' Guild"));
  }

  #[test]
  fn empty_world_adds_no_block() {
    let world = WorldFacts::default();
    let p = metadata_prompt("Aethros", PageKind::Seed, None, Some(&world));
    assert!(!p.contains("Established facts"));
  }
}
