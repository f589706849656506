//! Clip catalog: named emotion categories holding weighted, duration-tagged
//! video assets.
//!
//! The catalog is validated once at load and never mutated afterwards. Assets
//! with a non-positive duration are dropped with a warning; a category left
//! without assets fails the whole load.
//!
//! Older catalogs list categories under `emotions`, idle clips under
//! `idle_videos` and name the sleep and wake clips `sleep` and `wake`. Those
//! are mapped onto the reserved names at load; a lone `sleep` clip also
//! stands in for the missing loop.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{AvatarError, Result};

pub const IDLE: &str = "idle";
pub const SLEEP_TRANSITION: &str = "sleep-transition";
pub const SLEEP_LOOP: &str = "sleep-loop";
pub const WAKE_TRANSITION: &str = "wake-transition";
pub const RESERVED_CATEGORIES: [&str; 4] = [IDLE, SLEEP_TRANSITION, SLEEP_LOOP, WAKE_TRANSITION];

pub const DEFAULT_WEIGHT: u32 = 10;
pub const MIN_WEIGHT: u32 = 1;
pub const MAX_WEIGHT: u32 = 100;

const IDLE_DESCRIPTION: &str = "Waiting for interaction";

/// Older category names and the reserved names they fill in for.
const LEGACY_NAMES: [(&str, &str); 2] = [("sleep", SLEEP_TRANSITION), ("wake", WAKE_TRANSITION)];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoAsset {
    pub location: String,
    pub duration_seconds: f64,
    pub weight: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionCategory {
    name: String,
    assets: Vec<VideoAsset>,
    description: String,
    use_cases: BTreeSet<String>,
}

impl EmotionCategory {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Never empty.
    pub fn assets(&self) -> &[VideoAsset] {
        &self.assets
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn use_cases(&self) -> &BTreeSet<String> {
        &self.use_cases
    }

    pub fn total_weight(&self) -> u32 {
        self.assets.iter().map(|asset| asset.weight).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingAsset {
    pub category: String,
    pub location: String,
}

#[derive(Debug, Clone)]
pub struct Catalog {
    categories: BTreeMap<String, EmotionCategory>,
    default_emotion: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Source shape
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogSource {
    #[serde(default, alias = "emotions")]
    categories: BTreeMap<String, CategorySource>,
    #[serde(default)]
    idle_videos: Option<CategorySource>,
    #[serde(default)]
    default_emotion: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct CategorySource {
    #[serde(default)]
    videos: Vec<AssetSource>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    use_cases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AssetSource {
    location: String,
    duration: f64,
    #[serde(default)]
    weight: Option<i64>,
}

impl Catalog {
    /// Loads a catalog file. `.toml` files are parsed as TOML, anything else
    /// as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path).map_err(|source| AvatarError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;
        let is_toml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        let source: CatalogSource = if is_toml {
            toml::from_str(&content).map_err(|err| AvatarError::CatalogMalformed {
                path: path.to_path_buf(),
                details: err.to_string(),
            })?
        } else {
            serde_json::from_str(&content).map_err(|err| AvatarError::CatalogMalformed {
                path: path.to_path_buf(),
                details: err.to_string(),
            })?
        };

        let catalog = Self::from_source(source)?;
        info!(
            path = %path.display(),
            categories = catalog.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let source: CatalogSource =
            serde_json::from_str(content).map_err(|err| AvatarError::CatalogMalformed {
                path: PathBuf::from("<inline>"),
                details: err.to_string(),
            })?;
        Self::from_source(source)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let source: CatalogSource =
            toml::from_str(content).map_err(|err| AvatarError::CatalogMalformed {
                path: PathBuf::from("<inline>"),
                details: err.to_string(),
            })?;
        Self::from_source(source)
    }

    fn from_source(source: CatalogSource) -> Result<Self> {
        let CatalogSource {
            mut categories,
            idle_videos,
            default_emotion,
        } = source;

        if let Some(mut idle) = idle_videos {
            if categories.contains_key(IDLE) {
                warn!("Both idle_videos and an idle category are defined; using the category");
            } else {
                if idle.description.is_empty() {
                    idle.description = IDLE_DESCRIPTION.to_string();
                }
                categories.insert(IDLE.to_string(), idle);
            }
        }

        adopt_legacy_names(&mut categories);

        let mut built = BTreeMap::new();
        for (name, category) in categories {
            let category = build_category(&name, category)?;
            built.insert(name, category);
        }

        for reserved in RESERVED_CATEGORIES {
            if !built.contains_key(reserved) {
                return Err(AvatarError::InvalidCatalog(format!(
                    "reserved category {} is missing",
                    reserved
                )));
            }
        }

        if let Some(default) = default_emotion.as_deref() {
            if !built.contains_key(default) {
                warn!(default_emotion = %default, "Default emotion is not in the catalog");
            }
        }

        Ok(Self {
            categories: built,
            default_emotion,
        })
    }

    pub fn get(&self, name: &str) -> Option<&EmotionCategory> {
        self.categories.get(name)
    }

    /// Looks up a category, failing with `CategoryNotFound`.
    pub fn require(&self, name: &str) -> Result<&EmotionCategory> {
        self.categories
            .get(name)
            .ok_or_else(|| AvatarError::CategoryNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn categories(&self) -> impl Iterator<Item = &EmotionCategory> {
        self.categories.values()
    }

    pub fn default_emotion(&self) -> Option<&str> {
        self.default_emotion.as_deref()
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Asset locations that do not resolve to a file under `root`.
    pub fn missing_files(&self, root: &Path) -> Vec<MissingAsset> {
        let mut missing = Vec::new();
        for category in self.categories.values() {
            for asset in &category.assets {
                let location = Path::new(&asset.location);
                let resolved = if location.is_absolute() {
                    location.to_path_buf()
                } else {
                    root.join(location.strip_prefix("./").unwrap_or(location))
                };
                if !resolved.exists() {
                    missing.push(MissingAsset {
                        category: category.name.clone(),
                        location: asset.location.clone(),
                    });
                }
            }
        }
        missing
    }
}

fn adopt_legacy_names(categories: &mut BTreeMap<String, CategorySource>) {
    for (legacy, reserved) in LEGACY_NAMES {
        if categories.contains_key(reserved) {
            continue;
        }
        let Some(category) = categories.remove(legacy) else {
            continue;
        };
        warn!(from = legacy, to = reserved, "Renaming legacy catalog category");
        if reserved == SLEEP_TRANSITION && !categories.contains_key(SLEEP_LOOP) {
            warn!(category = SLEEP_LOOP, "No loop clip defined; looping the sleep clip");
            categories.insert(SLEEP_LOOP.to_string(), category.clone());
        }
        categories.insert(reserved.to_string(), category);
    }
}

fn build_category(name: &str, source: CategorySource) -> Result<EmotionCategory> {
    let mut assets = Vec::with_capacity(source.videos.len());

    for video in source.videos {
        let reason = if video.location.trim().is_empty() {
            Some("location is empty")
        } else if !video.duration.is_finite() || video.duration <= 0.0 {
            Some("duration must be greater than zero")
        } else {
            None
        };
        if let Some(reason) = reason {
            let err = AvatarError::InvalidAsset {
                category: name.to_string(),
                location: video.location,
                reason: reason.to_string(),
            };
            warn!(error = %err, "Dropping asset");
            continue;
        }

        let weight = normalize_weight(name, &video.location, video.weight);
        assets.push(VideoAsset {
            location: video.location,
            duration_seconds: video.duration,
            weight,
        });
    }

    if assets.is_empty() {
        return Err(AvatarError::InvalidCatalog(format!(
            "category {} has no valid assets",
            name
        )));
    }

    Ok(EmotionCategory {
        name: name.to_string(),
        assets,
        description: source.description,
        use_cases: source.use_cases.into_iter().collect(),
    })
}

fn normalize_weight(category: &str, location: &str, weight: Option<i64>) -> u32 {
    match weight {
        None => DEFAULT_WEIGHT,
        Some(value) if (MIN_WEIGHT as i64..=MAX_WEIGHT as i64).contains(&value) => value as u32,
        Some(value) => {
            warn!(
                category = %category,
                location = %location,
                weight = value,
                "Weight out of range; using default"
            );
            DEFAULT_WEIGHT
        }
    }
}
