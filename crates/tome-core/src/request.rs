//! Request types and their validation bounds.
//!
//! Validation always runs before admission checks; a request that is both
//! invalid and credential-less yields the validation error.

use serde::{Deserialize, Serialize};

use crate::{
  error::{Error, Result},
  world::WorldFacts,
};

/// Longest accepted `input` / `context`, in characters.
pub const MAX_INPUT_CHARS: usize = 5000;
pub const MAX_CONTEXT_CHARS: usize = 5000;
/// Bounds for single-section requests.
pub const MAX_SECTION_TITLE_CHARS: usize = 200;
pub const MAX_PAGE_TITLE_CHARS: usize = 300;
pub const MAX_PAGE_CONTENT_CHARS: usize = 50_000;

// ─── Page generation ─────────────────────────────────────────────────────────

/// What the `input` text denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
  /// A free-form seed prompt describing a brand-new concept.
  Seed,
  /// A cross-reference term clicked on an existing page.
  Term,
}

/// A request for a full encyclopedia page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
  pub input: String,
  pub kind:  PageKind,
  #[serde(default)]
  pub context: Option<String>,
  #[serde(default, rename = "worldContext")]
  pub world: Option<WorldFacts>,
}

impl GenerationRequest {
  pub fn validate(&self) -> Result<()> {
    let len = self.input.trim().chars().count();
    if len == 0 {
      return Err(Error::Validation("input must not be empty".into()));
    }
    if len > MAX_INPUT_CHARS {
      return Err(Error::Validation(format!(
        "input exceeds {MAX_INPUT_CHARS} characters"
      )));
    }
    if let Some(context) = &self.context
      && context.chars().count() > MAX_CONTEXT_CHARS
    {
      return Err(Error::Validation(format!(
        "context exceeds {MAX_CONTEXT_CHARS} characters"
      )));
    }
    if let Some(world) = &self.world {
      world.validate()?;
    }
    Ok(())
  }
}

// ─── Section generation ──────────────────────────────────────────────────────

/// A request for one additional section of an existing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRequest {
  pub section_title: String,
  pub page_title:    String,
  pub page_content:  String,
  #[serde(default, rename = "worldContext")]
  pub world:         Option<WorldFacts>,
}

impl SectionRequest {
  pub fn validate(&self) -> Result<()> {
    if self.section_title.trim().is_empty() {
      return Err(Error::Validation("section title must not be empty".into()));
    }
    if self.section_title.chars().count() > MAX_SECTION_TITLE_CHARS {
      return Err(Error::Validation(format!(
        "section title exceeds {MAX_SECTION_TITLE_CHARS} characters"
      )));
    }
    if self.page_title.trim().is_empty() {
      return Err(Error::Validation("page title must not be empty".into()));
    }
    if self.page_title.chars().count() > MAX_PAGE_TITLE_CHARS {
      return Err(Error::Validation(format!(
        "page title exceeds {MAX_PAGE_TITLE_CHARS} characters"
      )));
    }
    if self.page_content.chars().count() > MAX_PAGE_CONTENT_CHARS {
      return Err(Error::Validation(format!(
        "page content exceeds {MAX_PAGE_CONTENT_CHARS} characters"
      )));
    }
    if let Some(world) = &self.world {
      world.validate()?;
    }
    Ok(())
  }
}

// ─── Caller ──────────────────────────────────────────────────────────────────

/// Who is asking. Identity is the opaque subject resolved by the external
/// token-verification collaborator; the IP comes from transport headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
  pub identity: Option<String>,
  pub ip:       String,
}

impl Caller {
  pub fn anonymous(ip: impl Into<String>) -> Self {
    Caller { identity: None, ip: ip.into() }
  }

  pub fn identified(identity: impl Into<String>, ip: impl Into<String>) -> Self {
    Caller {
      identity: Some(identity.into()),
      ip:       ip.into(),
    }
  }

  /// The key usage counts and identity-scoped rate windows are bucketed
  /// under. Anonymous callers are bucketed per network origin.
  pub fn quota_key(&self) -> String {
    match &self.identity {
      Some(id) => id.clone(),
      None => format!("anon:{}", self.ip),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn request(input: &str) -> GenerationRequest {
    GenerationRequest {
      input:   input.to_string(),
      kind:    PageKind::Seed,
      context: None,
      world:   None,
    }
  }

  #[test]
  fn empty_input_is_rejected() {
    assert!(request("   ").validate().is_err());
  }

  #[test]
  fn oversized_input_is_rejected() {
    let long = "x".repeat(MAX_INPUT_CHARS + 1);
    assert!(request(&long).validate().is_err());
  }

  #[test]
  fn input_at_bound_is_accepted() {
    let bound = "x".repeat(MAX_INPUT_CHARS);
    assert!(request(&bound).validate().is_ok());
  }

  #[test]
  fn oversized_context_is_rejected() {
    let mut req = request("A floating city");
    req.context = Some("y".repeat(MAX_CONTEXT_CHARS + 1));
    assert!(req.validate().is_err());
  }

  #[test]
  fn kind_enum_is_closed() {
    let err = serde_json::from_str::<GenerationRequest>(
      r#"{"input":"x","kind":"image"}"#,
    );
    assert!(err.is_err());
  }

  #[test]
  fn section_bounds_are_enforced() {
    let req = SectionRequest {
      section_title: "Climate".into(),
      page_title:    "Aethros".into(),
      page_content:  "A floating city.".into(),
      world:         None,
    };
    assert!(req.validate().is_ok());

    let mut bad = req.clone();
    bad.section_title = "t".repeat(MAX_SECTION_TITLE_CHARS + 1);
    assert!(bad.validate().is_err());

    let mut bad = req;
    bad.page_content = "c".repeat(MAX_PAGE_CONTENT_CHARS + 1);
    assert!(bad.validate().is_err());
  }

  #[test]
  fn anonymous_quota_key_embeds_ip() {
    let caller = Caller::anonymous("203.0.113.9");
    assert_eq!(caller.quota_key(), "anon:203.0.113.9");
  }
}
