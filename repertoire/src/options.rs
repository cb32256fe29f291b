use anyhow::Result;
use common::{Config, ConfigLoader};
use serde::Serialize;

/// How the estimated marginal value of a book's next move is derived from its actual gain.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EstimateOptions {
    /// Applied to the previous estimate when a step gains nothing.
    pub zero_decay: f64,
    pub clamp_low: f64,
    pub clamp_high: f64,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            zero_decay: 0.9,
            clamp_low: 0.8,
            clamp_high: 1.2,
        }
    }
}

impl Config for EstimateOptions {
    fn load(config: &ConfigLoader) -> Result<Self> {
        let default = Self::default();

        Ok(Self {
            zero_decay: config
                .get("estimate_zero_decay")
                .and_then(|v| v.as_f64())
                .unwrap_or(default.zero_decay),
            clamp_low: config
                .get("estimate_clamp_low")
                .and_then(|v| v.as_f64())
                .unwrap_or(default.clamp_low),
            clamp_high: config
                .get("estimate_clamp_high")
                .and_then(|v| v.as_f64())
                .unwrap_or(default.clamp_high),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheOptions {
    /// Only positions observed more often than this are cached.
    pub threshold: u64,
    /// Eviction runs once the budgets of all stored books sum past this.
    pub max_cached_moves: usize,
    /// Share of entries dropped per eviction pass.
    pub eviction_fraction: f64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            threshold: 20,
            max_cached_moves: 1000 * 30_000,
            eviction_fraction: 0.1,
        }
    }
}

impl Config for CacheOptions {
    fn load(config: &ConfigLoader) -> Result<Self> {
        let default = Self::default();

        Ok(Self {
            threshold: config
                .get("cache_threshold")
                .and_then(|v| v.as_u64())
                .unwrap_or(default.threshold),
            max_cached_moves: config
                .get("max_cached_moves")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.max_cached_moves),
            eviction_fraction: config
                .get("eviction_fraction")
                .and_then(|v| v.as_f64())
                .unwrap_or(default.eviction_fraction),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RepertoireOptions {
    /// Largest repertoire size considered.
    pub budget: usize,
    /// Engine optimism at the root. The sign flips at every ply.
    pub optimism: f64,
    /// Whether unexpanded positions offer generic preparation moves.
    pub include_placeholders: bool,
    /// Coefficient of the logarithmic preparation gain.
    pub prep_value: f64,
    /// Rows kept in each section of the book report.
    pub report_limit: usize,
    pub estimate: EstimateOptions,
    pub cache: CacheOptions,
}

impl Default for RepertoireOptions {
    fn default() -> Self {
        Self {
            budget: 1000,
            optimism: 0.0,
            include_placeholders: true,
            prep_value: 0.0036,
            report_limit: 250,
            estimate: EstimateOptions::default(),
            cache: CacheOptions::default(),
        }
    }
}

impl Config for RepertoireOptions {
    fn load(config: &ConfigLoader) -> Result<Self> {
        let default = Self::default();

        Ok(Self {
            budget: config
                .get("budget")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.budget),
            optimism: config
                .get("optimism")
                .and_then(|v| v.as_f64())
                .unwrap_or(default.optimism),
            include_placeholders: config
                .get("include_placeholders")
                .and_then(|v| v.as_bool())
                .unwrap_or(default.include_placeholders),
            prep_value: config
                .get("prep_value")
                .and_then(|v| v.as_f64())
                .unwrap_or(default.prep_value),
            report_limit: config
                .get("report_limit")
                .and_then(|v| v.as_usize())
                .unwrap_or(default.report_limit),
            estimate: config.load()?,
            cache: config.load()?,
        })
    }
}
