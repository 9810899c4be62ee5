use anyhow::{Context, Result, bail};
use idleworks_engine::{Catalog, EngineConfig};
use std::fs;
use std::path::Path;
use std::sync::Arc;

pub fn split_csv(s: &str) -> Vec<String> {
    s.split(',')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

/// Parse seed tokens; decimal or `0x` hex, duplicates dropped in order.
pub fn resolve_seeds(tokens: &[String]) -> Result<Vec<u64>> {
    let mut seeds = Vec::new();
    for token in tokens {
        let parsed = match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16).ok(),
            None => token.parse::<u64>().ok(),
        };
        let Some(seed) = parsed else {
            bail!("Unrecognized seed token: {token}");
        };
        if !seeds.contains(&seed) {
            seeds.push(seed);
        }
    }
    if seeds.is_empty() {
        bail!("at least one seed is required");
    }
    Ok(seeds)
}

/// Engine configuration and catalog shared by every scenario run.
#[derive(Debug, Clone)]
pub struct SimAssets {
    pub config: EngineConfig,
    pub catalog: Arc<Catalog>,
}

impl SimAssets {
    #[must_use]
    pub fn load_default() -> Self {
        Self {
            config: EngineConfig::load_from_static(),
            catalog: Arc::new(Catalog::bundled().clone()),
        }
    }

    /// Bundled data, with either file overriding its half. The catalog is
    /// validated for every tier the configuration allows.
    pub fn load(config_path: Option<&Path>, catalog_path: Option<&Path>) -> Result<Self> {
        let mut assets = Self::load_default();
        if let Some(path) = config_path {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading engine config {}", path.display()))?;
            assets.config = EngineConfig::from_json(&json)
                .with_context(|| format!("parsing engine config {}", path.display()))?;
        }
        if let Some(path) = catalog_path {
            let json = fs::read_to_string(path)
                .with_context(|| format!("reading catalog {}", path.display()))?;
            let catalog = Catalog::from_json(&json, assets.config.max_tier)
                .with_context(|| format!("parsing catalog {}", path.display()))?;
            assets.catalog = Arc::new(catalog);
        } else if assets.catalog.max_tier() < assets.config.max_tier {
            let catalog = assets
                .catalog
                .revalidate(assets.config.max_tier)
                .with_context(|| format!("bundled catalog at tier {}", assets.config.max_tier))?;
            assets.catalog = Arc::new(catalog);
        }
        Ok(assets)
    }
}
