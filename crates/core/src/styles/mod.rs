use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const STYLE_CATALOG: &str = include_str!("../../prompts/styles.toml");

/// Display data and persona for one writing style.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported writing style `{given}`; expected one of: {}", WritingStyle::keys().join(", "))]
pub struct StyleParseError {
    pub given: String,
}

macro_rules! writing_styles {
    ($($variant:ident => $key:literal),+ $(,)?) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum WritingStyle {
            $($variant),+
        }

        impl WritingStyle {
            pub const ALL: &'static [WritingStyle] = &[$(WritingStyle::$variant),+];

            /// Catalog identifier, e.g. `martial-arts`.
            pub fn key(&self) -> &'static str {
                match self {
                    $(WritingStyle::$variant => $key),+
                }
            }
        }
    };
}

writing_styles! {
    Children => "children",
    Fantasy => "fantasy",
    MartialArts => "martial-arts",
    Romance => "romance",
    Scifi => "scifi",
    Mystery => "mystery",
    Horror => "horror",
    Historical => "historical",
    Literary => "literary",
    Thriller => "thriller",
    Satire => "satire",
    Adventure => "adventure",
    YoungAdult => "young-adult",
    Biography => "biography",
    Dystopian => "dystopian",
    MagicalRealism => "magical-realism",
    Crime => "crime",
    Western => "western",
    Poetry => "poetry",
    Drama => "drama",
    Essay => "essay",
    FairyTale => "fairy-tale",
    PostApocalyptic => "post-apocalyptic",
    Supernatural => "supernatural",
    Gothic => "gothic",
}

impl WritingStyle {
    pub fn keys() -> Vec<&'static str> {
        Self::ALL.iter().map(WritingStyle::key).collect()
    }

    pub fn profile(&self) -> &'static StyleProfile {
        // The catalog is compiled in and checked by tests, so every key resolves.
        &catalog()[self.key()]
    }

    pub fn name(&self) -> &'static str {
        &self.profile().name
    }

    pub fn system_prompt(&self) -> &'static str {
        &self.profile().system_prompt
    }
}

impl fmt::Display for WritingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for WritingStyle {
    type Err = StyleParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|style| style.key() == normalized)
            .ok_or_else(|| StyleParseError {
                given: value.trim().to_string(),
            })
    }
}

#[derive(Deserialize)]
struct StyleCatalog {
    styles: BTreeMap<String, StyleProfile>,
}

fn catalog() -> &'static BTreeMap<String, StyleProfile> {
    static CATALOG: OnceLock<BTreeMap<String, StyleProfile>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let mut parsed: StyleCatalog =
            toml::from_str(STYLE_CATALOG).expect("invalid built-in style catalog");
        for profile in parsed.styles.values_mut() {
            profile.system_prompt = profile.system_prompt.trim().to_string();
        }
        parsed.styles
    })
}
