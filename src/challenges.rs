//! Challenge catalog

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::core::TestCase;

/// Difficulty tier, ordered Easy < Medium < Hard
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        };
        write!(f, "{}", s)
    }
}

fn default_time_limit_secs() -> u32 {
    300
}

/// A problem definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub difficulty: Difficulty,
    /// Function every submission must define
    pub function: String,
    /// Shown to players; never executed
    #[serde(default)]
    pub starter_code: String,
    /// Time players get to solve it. Used by matches, not by the grader.
    #[serde(default = "default_time_limit_secs")]
    pub time_limit_secs: u32,
    pub test_cases: Vec<TestCase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_solution: Option<String>,
}

impl Challenge {
    /// First test case, shown to players as the example
    pub fn sample(&self) -> Option<&TestCase> {
        self.test_cases.first()
    }
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    #[serde(default)]
    challenges: Vec<Challenge>,
}

/// Ordered, validated set of challenges
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    challenges: Vec<Challenge>,
}

impl Catalog {
    /// The catalog shipped with the grader
    pub fn builtin() -> anyhow::Result<Self> {
        let content = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/challenges.toml"));
        Self::from_toml_str(content).context("Built-in challenge catalog is invalid")
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read challenge catalog {:?}", path))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate. Test cases without an explicit function get the
    /// challenge's function.
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let raw: RawCatalog = toml::from_str(content)?;

        let mut seen = HashSet::new();
        let mut challenges = Vec::with_capacity(raw.challenges.len());
        for mut challenge in raw.challenges {
            if !seen.insert(challenge.id.clone()) {
                anyhow::bail!("Duplicate challenge id: {}", challenge.id);
            }
            if challenge.test_cases.is_empty() {
                anyhow::bail!("Challenge {} has no test cases", challenge.id);
            }
            if !is_identifier(&challenge.function) {
                anyhow::bail!(
                    "Challenge {} has invalid function name {:?}",
                    challenge.id,
                    challenge.function
                );
            }

            for case in &mut challenge.test_cases {
                if case.function.is_none() {
                    case.function = Some(challenge.function.clone());
                }
            }
            challenges.push(challenge);
        }

        Ok(Self { challenges })
    }

    pub fn get(&self, id: &str) -> Option<&Challenge> {
        self.challenges.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.iter()
    }

    pub fn by_difficulty(&self, difficulty: Difficulty) -> impl Iterator<Item = &Challenge> {
        self.challenges
            .iter()
            .filter(move |c| c.difficulty == difficulty)
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => chars.all(|c| c == '_' || c.is_alphanumeric()),
        _ => false,
    }
}
