//! World facts — accumulated knowledge about the fictional world a page
//! belongs to, passed along with requests to steer generation.
//!
//! Categories are a fixed, closed vocabulary per group. Fact lists are
//! append-only during a session; this layer only reads them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category names accepted in the `mental` group.
pub const MENTAL_CATEGORIES: [&str; 3] = ["beliefs", "myths", "knowledge"];
/// Category names accepted in the `material` group.
pub const MATERIAL_CATEGORIES: [&str; 3] =
  ["geography", "technology", "resources"];
/// Category names accepted in the `social` group.
pub const SOCIAL_CATEGORIES: [&str; 3] = ["customs", "factions", "history"];

/// Three named groups of categorized fact lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldFacts {
  #[serde(default)]
  pub mental:   BTreeMap<String, Vec<String>>,
  #[serde(default)]
  pub material: BTreeMap<String, Vec<String>>,
  #[serde(default)]
  pub social:   BTreeMap<String, Vec<String>>,
}

impl WorldFacts {
  /// Reject category names outside the closed vocabulary.
  pub fn validate(&self) -> Result<()> {
    check_group("mental", &self.mental, &MENTAL_CATEGORIES)?;
    check_group("material", &self.material, &MATERIAL_CATEGORIES)?;
    check_group("social", &self.social, &SOCIAL_CATEGORIES)?;
    Ok(())
  }

  pub fn is_empty(&self) -> bool {
    self.mental.is_empty() && self.material.is_empty() && self.social.is_empty()
  }

  /// Iterate `(group, category, facts)` in a stable order.
  pub fn groups(
    &self,
  ) -> impl Iterator<Item = (&'static str, &String, &Vec<String>)> {
    let mental = self.mental.iter().map(|(c, f)| ("mental", c, f));
    let material = self.material.iter().map(|(c, f)| ("material", c, f));
    let social = self.social.iter().map(|(c, f)| ("social", c, f));
    mental.chain(material).chain(social)
  }
}

fn check_group(
  group: &str,
  facts: &BTreeMap<String, Vec<String>>,
  allowed: &[&str],
) -> Result<()> {
  for category in facts.keys() {
    if !allowed.contains(&category.as_str()) {
      return Err(Error::Validation(format!(
        "unknown {group} category: {category:?}"
      )));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn valid_categories_pass() {
    let mut world = WorldFacts::default();
    world
      .mental
      .insert("beliefs".into(), vec!["The sky is a sea.".into()]);
    world
      .social
      .insert("factions".into(), vec!["The Cartographers' Guild".into()]);
    assert!(world.validate().is_ok());
  }

  #[test]
  fn unknown_category_is_rejected() {
    let mut world = WorldFacts::default();
    world.material.insert("weather".into(), vec![]);
    let err = world.validate().unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(err.to_string().contains("weather"));
  }

  #[test]
  fn groups_iterates_all_three() {
    let mut world = WorldFacts::default();
    world.mental.insert("myths".into(), vec!["a".into()]);
    world.material.insert("geography".into(), vec!["b".into()]);
    world.social.insert("history".into(), vec!["c".into()]);
    let seen: Vec<&str> = world.groups().map(|(g, _, _)| g).collect();
    assert_eq!(seen, vec!["mental", "material", "social"]);
  }
}
