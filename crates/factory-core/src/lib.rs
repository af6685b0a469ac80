#![deny(warnings)]

//! Core domain models and invariants for the factory idle economy.
//!
//! This crate defines the goods catalog, the engine configuration and the
//! validation helpers that every catalog passes through before a simulation
//! is allowed to start.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Unique identifier for a good, e.g. "wood" or "plank".
///
/// Source data may use strings or integers; both normalize to a string key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "RawGoodId", into = "String")]
pub struct GoodId(pub String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawGoodId {
    Text(String),
    Number(i64),
}

impl From<RawGoodId> for GoodId {
    fn from(raw: RawGoodId) -> Self {
        match raw {
            RawGoodId::Text(s) => GoodId(s),
            RawGoodId::Number(n) => GoodId(n.to_string()),
        }
    }
}

impl From<GoodId> for String {
    fn from(id: GoodId) -> Self {
        id.0
    }
}

impl From<&str> for GoodId {
    fn from(s: &str) -> Self {
        GoodId(s.to_string())
    }
}

impl fmt::Display for GoodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One required input of a manufactured good.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    /// Good consumed by the recipe.
    pub good_id: GoodId,
    /// Units consumed per unit of output per second (> 0).
    pub quantity: f64,
}

/// A catalog entry: a raw or manufactured good and its factory economics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Good {
    /// Stable key into inventory and catalog lookups.
    pub id: GoodId,
    /// Display label.
    pub name: String,
    /// Display glyph.
    #[serde(default)]
    pub emoji: Option<String>,
    /// True for raw goods produced from nothing.
    pub base_production: bool,
    /// Units per factory per second (>= 0).
    pub production: f64,
    /// Price of one factory (>= 0).
    pub cost: Decimal,
    /// Price paid per unit sold (>= 0).
    pub sell_price: Decimal,
    /// Recipe inputs; empty for raw goods.
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    /// Factories owned when the session starts.
    #[serde(default)]
    pub factories: u64,
}

impl Good {
    /// Emoji if present, otherwise the name.
    pub fn label(&self) -> &str {
        self.emoji.as_deref().unwrap_or(&self.name)
    }
}

/// Validation errors for catalog and configuration invariants.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A catalog needs at least one good.
    #[error("catalog contains no goods")]
    EmptyCatalog,
    /// Ids must be non-blank.
    #[error("good id must not be blank")]
    BlankId,
    /// Ids must be unique.
    #[error("duplicate good id: {0}")]
    DuplicateId(String),
    /// Manufactured goods need a recipe.
    #[error("manufactured good {0} declares no inputs")]
    MissingInputs(String),
    /// Raw goods cannot consume anything.
    #[error("base good {0} must not declare inputs")]
    UnexpectedInputs(String),
    /// Input references a good not in the catalog.
    #[error("good {good} references unknown input {input}")]
    UnknownInput { good: String, input: String },
    /// A recipe may name each input once.
    #[error("good {good} lists input {input} more than once")]
    DuplicateInput { good: String, input: String },
    /// Input quantities must be finite and > 0.
    #[error("good {good} has invalid quantity for input {input}")]
    InvalidInputQuantity { good: String, input: String },
    /// Production rate must be finite and >= 0.
    #[error("good {0} has invalid production rate")]
    InvalidProduction(String),
    /// Price or cost must be non-negative.
    #[error("good {0} has a negative cost or sell price")]
    NegativeMoney(String),
    /// Engine configuration out of range.
    #[error("invalid engine config: {0}")]
    InvalidConfig(&'static str),
}

/// Validate a single good in isolation (cross-references are checked by
/// [`validate_goods`]).
pub fn validate_good(good: &Good) -> Result<(), ValidationError> {
    let id = &good.id.0;
    if id.trim().is_empty() {
        return Err(ValidationError::BlankId);
    }
    if !good.production.is_finite() || good.production < 0.0 {
        return Err(ValidationError::InvalidProduction(id.clone()));
    }
    if good.cost < Decimal::ZERO || good.sell_price < Decimal::ZERO {
        return Err(ValidationError::NegativeMoney(id.clone()));
    }
    if good.base_production && !good.inputs.is_empty() {
        return Err(ValidationError::UnexpectedInputs(id.clone()));
    }
    if !good.base_production && good.inputs.is_empty() {
        return Err(ValidationError::MissingInputs(id.clone()));
    }
    let mut seen: BTreeSet<&GoodId> = BTreeSet::new();
    for input in &good.inputs {
        if !seen.insert(&input.good_id) {
            return Err(ValidationError::DuplicateInput {
                good: id.clone(),
                input: input.good_id.0.clone(),
            });
        }
        if !input.quantity.is_finite() || input.quantity <= 0.0 {
            return Err(ValidationError::InvalidInputQuantity {
                good: id.clone(),
                input: input.good_id.0.clone(),
            });
        }
    }
    Ok(())
}

/// Validate a list of goods, including uniqueness and input references.
pub fn validate_goods(goods: &[Good]) -> Result<(), ValidationError> {
    if goods.is_empty() {
        return Err(ValidationError::EmptyCatalog);
    }
    let mut ids: BTreeSet<&GoodId> = BTreeSet::new();
    for g in goods {
        validate_good(g)?;
        if !ids.insert(&g.id) {
            return Err(ValidationError::DuplicateId(g.id.0.clone()));
        }
    }
    for g in goods {
        for input in &g.inputs {
            if !ids.contains(&input.good_id) {
                return Err(ValidationError::UnknownInput {
                    good: g.id.0.clone(),
                    input: input.good_id.0.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Errors raised while loading a catalog or config from disk or text.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid catalog: {0}")]
    Invalid(#[from] ValidationError),
}

/// The validated, ordered list of goods. Order is the processing order of
/// every tick.
#[derive(Clone, Debug, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    goods: Vec<Good>,
}

impl Catalog {
    /// Build a catalog, rejecting it if any invariant fails.
    pub fn new(goods: Vec<Good>) -> Result<Self, ValidationError> {
        validate_goods(&goods)?;
        Ok(Self { goods })
    }

    pub fn from_json_str(text: &str) -> Result<Self, CatalogError> {
        let goods: Vec<Good> = serde_json::from_str(text)?;
        Ok(Self::new(goods)?)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, CatalogError> {
        let goods: Vec<Good> = serde_yaml::from_str(text)?;
        Ok(Self::new(goods)?)
    }

    pub fn goods(&self) -> &[Good] {
        &self.goods
    }

    pub fn len(&self) -> usize {
        self.goods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goods.is_empty()
    }

    /// Position of a good in catalog order.
    pub fn index_of(&self, id: &GoodId) -> Option<usize> {
        self.goods.iter().position(|g| &g.id == id)
    }

    pub fn get(&self, id: &GoodId) -> Option<&Good> {
        self.goods.iter().find(|g| &g.id == id)
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn read_text(path: &Path) -> Result<String, CatalogError> {
    std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate a catalog. `.yaml`/`.yml` files parse as YAML, anything
/// else as JSON.
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog, CatalogError> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let catalog = if is_yaml(path) {
        Catalog::from_yaml_str(&text)?
    } else {
        Catalog::from_json_str(&text)?
    };
    info!(path = %path.display(), goods = catalog.len(), "catalog loaded");
    Ok(catalog)
}

/// Output rate used by manufactured goods.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManufacturedRate {
    /// Honor the good's declared `production`.
    #[default]
    Declared,
    /// One unit per enabled factory per second.
    Unit,
}

/// How many factories of a manufactured good may run in a step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feasibility {
    /// As many factories as the scarcest input can feed.
    #[default]
    PartialCapacity,
    /// Every factory runs, or none does.
    AllOrNothing,
}

/// Engine configuration parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Starting balance (default: 100).
    pub initial_money: Decimal,
    /// Longest sub-step a tick is split into, in seconds. `None` disables
    /// sub-stepping.
    pub max_step_seconds: Option<f64>,
    /// Output rate policy for manufactured goods.
    pub manufactured_rate: ManufacturedRate,
    /// Enabled-factory policy for manufactured goods.
    pub feasibility: Feasibility,
    /// Fraction of money a buy intent may spend at once. `None` buys one.
    pub bulk_buy_fraction: Option<f64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_money: Decimal::new(100, 0),
            max_step_seconds: Some(1.0),
            manufactured_rate: ManufacturedRate::Declared,
            feasibility: Feasibility::PartialCapacity,
            bulk_buy_fraction: Some(0.05),
        }
    }
}

/// Validate engine configuration values.
pub fn validate_config(cfg: &EngineConfig) -> Result<(), ValidationError> {
    if cfg.initial_money < Decimal::ZERO {
        return Err(ValidationError::InvalidConfig("initial_money must be >= 0"));
    }
    if let Some(step) = cfg.max_step_seconds {
        if !step.is_finite() || step <= 0.0 {
            return Err(ValidationError::InvalidConfig(
                "max_step_seconds must be finite and > 0",
            ));
        }
    }
    if let Some(frac) = cfg.bulk_buy_fraction {
        if !frac.is_finite() || frac <= 0.0 || frac > 1.0 {
            return Err(ValidationError::InvalidConfig(
                "bulk_buy_fraction must be within (0, 1]",
            ));
        }
    }
    Ok(())
}

/// Load and validate an engine config from YAML (JSON is valid YAML).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, CatalogError> {
    let path = path.as_ref();
    let text = read_text(path)?;
    let cfg: EngineConfig = serde_yaml::from_str(&text)?;
    validate_config(&cfg)?;
    debug!(path = %path.display(), ?cfg, "engine config loaded");
    Ok(cfg)
}
