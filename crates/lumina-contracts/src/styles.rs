use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleDescriptor {
    pub id: String,
    pub name: String,
    pub prompt: String,
    pub thumbnail: String,
}

/// Read-only style catalog. Iteration order is display order.
#[derive(Debug, Clone)]
pub struct StyleCatalog {
    styles: IndexMap<String, StyleDescriptor>,
}

impl Default for StyleCatalog {
    fn default() -> Self {
        Self {
            styles: default_styles(),
        }
    }
}

impl StyleCatalog {
    pub fn new(styles: Vec<StyleDescriptor>) -> Result<Self> {
        let mut map = IndexMap::new();
        for style in styles {
            if style.id.trim().is_empty() {
                bail!("style entry '{}' has an empty id", style.name);
            }
            if style.prompt.trim().is_empty() {
                bail!("style '{}' has an empty prompt", style.id);
            }
            if map.contains_key(&style.id) {
                bail!("duplicate style id '{}'", style.id);
            }
            map.insert(style.id.clone(), style);
        }
        if map.is_empty() {
            bail!("style catalog is empty");
        }
        Ok(Self { styles: map })
    }

    /// Loads a JSON array of `{id, name, prompt, thumbnail}` entries.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let entries: Vec<StyleDescriptor> = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a style catalog", path.display()))?;
        Self::new(entries)
    }

    pub fn get(&self, id: &str) -> Option<&StyleDescriptor> {
        self.styles.get(id)
    }

    /// Matches an id exactly, then a display name ignoring case.
    pub fn find(&self, key: &str) -> Option<&StyleDescriptor> {
        let key = key.trim();
        if let Some(style) = self.get(key) {
            return Some(style);
        }
        self.styles
            .values()
            .find(|style| style.name.eq_ignore_ascii_case(key) || style.id.eq_ignore_ascii_case(key))
    }

    pub fn list(&self) -> impl Iterator<Item = &StyleDescriptor> {
        self.styles.values()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}

fn default_styles() -> IndexMap<String, StyleDescriptor> {
    let mut map = IndexMap::new();

    let mut insert = |id: &str, name: &str, prompt: &str, picture: u32| {
        map.insert(
            id.to_string(),
            StyleDescriptor {
                id: id.to_string(),
                name: name.to_string(),
                prompt: prompt.to_string(),
                thumbnail: format!("https://picsum.photos/id/{picture}/200/200"),
            },
        );
    };

    insert(
        "modern",
        "Mid-Century Modern",
        "Mid-Century Modern interior design style, teak wood, organic curves, clean lines",
        1,
    );
    insert(
        "scandi",
        "Scandinavian",
        "Scandinavian interior design style, bright, airy, white walls, light wood, minimalist",
        2,
    );
    insert(
        "industrial",
        "Industrial",
        "Industrial loft interior design style, exposed brick, metal accents, leather furniture",
        3,
    );
    insert(
        "boho",
        "Bohemian",
        "Bohemian interior design style, plants, patterns, textures, eclectic, warm colors",
        4,
    );
    insert(
        "minimalist",
        "Minimalist",
        "Ultra minimalist interior design style, monochrome, clutter-free, functional",
        5,
    );
    insert(
        "art_deco",
        "Art Deco",
        "Art Deco interior design style, geometric patterns, gold accents, velvet, luxury",
        6,
    );
    insert(
        "coastal",
        "Coastal Breeze",
        "Coastal interior design style, beach house vibe, light blues, whites, natural textures, airy, nautical accents",
        7,
    );
    insert(
        "farmhouse",
        "Modern Farmhouse",
        "Modern Farmhouse interior design style, rustic wood beams, neutral palette, cozy, shiplap, vintage accents",
        8,
    );
    insert(
        "cyberpunk",
        "Cyberpunk",
        "Cyberpunk interior design style, neon lights, futuristic, high-tech, dark aesthetic, purple and blue glow",
        9,
    );

    map
}
