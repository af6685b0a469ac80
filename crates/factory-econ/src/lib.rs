#![deny(warnings)]

//! Economy simulation engine: production ticks and player trades.
//!
//! The [`Economy`] owns money, inventory and factory counts. It provides:
//! - Continuous-time production for raw and manufactured goods
//! - Factory purchases gated by available money
//! - Sales of whole units, keeping fractional remainders in stock
//!
//! Every operation is a silent no-op when its constraint is not met; callers
//! never observe negative money or inventory.

use factory_core::{
    validate_config, Catalog, EngineConfig, Feasibility, Good, GoodId, InputSpec,
    ManufacturedRate, ValidationError,
};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, trace};

/// Upper bound on sub-steps per tick; beyond it steps get longer instead.
pub const MAX_SUBSTEPS: u32 = 100_000;

/// Relative float slack tolerated when an input is drawn down to zero.
const OVERDRAW_EPSILON: f64 = 1e-9;

/// Decimal places kept from `bulk_buy_fraction` so 0.3 means 0.3.
const FRACTION_DP: u32 = 6;

/// Errors produced when constructing an engine.
#[derive(Debug, Error, PartialEq)]
pub enum EconError {
    #[error("invalid engine config: {0}")]
    Config(#[from] ValidationError),
}

/// Result of a successful sale.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SaleReceipt {
    pub good: GoodId,
    pub units: u64,
    pub revenue: Decimal,
}

/// Totals of a sell-all pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SellAllReport {
    pub units: u64,
    pub revenue: Decimal,
    pub receipts: Vec<SaleReceipt>,
}

/// Bookkeeping for one call to [`Economy::tick`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct TickReport {
    /// Seconds actually simulated (after clamping).
    pub elapsed: f64,
    /// Number of production sub-steps applied.
    pub steps: u32,
}

/// Presentation view of one good.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GoodView {
    pub id: GoodId,
    pub name: String,
    pub emoji: Option<String>,
    pub base_production: bool,
    /// Whole units held.
    pub quantity: u64,
    pub factories: u64,
    /// Money covers one factory.
    pub affordable: bool,
    /// At least one whole unit can be sold.
    pub sellable: bool,
    /// Maximum output per second with every factory running.
    pub production_per_sec: f64,
    pub cost: Decimal,
    pub sell_price: Decimal,
    pub inputs: Vec<InputSpec>,
}

/// Read-only view of the economy for rendering.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EconomySnapshot {
    pub money: Decimal,
    pub goods: Vec<GoodView>,
}

impl EconomySnapshot {
    pub fn good(&self, id: &GoodId) -> Option<&GoodView> {
        self.goods.iter().find(|g| &g.id == id)
    }
}

/// The authoritative simulation state and its update rules.
#[derive(Clone, Debug)]
pub struct Economy {
    catalog: Catalog,
    config: EngineConfig,
    money: Decimal,
    /// Indexed by catalog position.
    inventory: Vec<f64>,
    factories: Vec<u64>,
    /// Inputs resolved to catalog positions.
    recipes: Vec<Vec<(usize, f64)>>,
}

impl Economy {
    /// Create an engine over a validated catalog.
    pub fn new(catalog: Catalog, config: EngineConfig) -> Result<Self, EconError> {
        validate_config(&config)?;
        let recipes = catalog
            .goods()
            .iter()
            .map(|g| {
                g.inputs
                    .iter()
                    .filter_map(|input| {
                        catalog
                            .index_of(&input.good_id)
                            .map(|idx| (idx, input.quantity))
                    })
                    .collect()
            })
            .collect();
        let factories = catalog.goods().iter().map(|g| g.factories).collect();
        let inventory = vec![0.0; catalog.len()];
        info!(
            goods = catalog.len(),
            money = %config.initial_money,
            "economy initialized"
        );
        Ok(Self {
            money: config.initial_money,
            catalog,
            config,
            inventory,
            factories,
            recipes,
        })
    }

    /// Engine with [`EngineConfig::default`].
    pub fn with_defaults(catalog: Catalog) -> Result<Self, EconError> {
        Self::new(catalog, EngineConfig::default())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn money(&self) -> Decimal {
        self.money
    }

    /// Current stock of a good, fractional part included.
    pub fn inventory(&self, id: &GoodId) -> Option<f64> {
        self.catalog.index_of(id).map(|i| self.inventory[i])
    }

    pub fn factories(&self, id: &GoodId) -> Option<u64> {
        self.catalog.index_of(id).map(|i| self.factories[i])
    }

    /// Advance production by `delta_seconds` of elapsed time.
    ///
    /// Negative or non-finite deltas count as zero. Long deltas are split
    /// into equal sub-steps no longer than `max_step_seconds`.
    pub fn tick(&mut self, delta_seconds: f64) -> TickReport {
        let elapsed = if delta_seconds.is_finite() && delta_seconds > 0.0 {
            delta_seconds
        } else {
            0.0
        };
        if elapsed == 0.0 {
            return TickReport::default();
        }
        let steps = match self.config.max_step_seconds {
            Some(max) => (elapsed / max).ceil().clamp(1.0, MAX_SUBSTEPS as f64) as u32,
            None => 1,
        };
        let dt = elapsed / steps as f64;
        for _ in 0..steps {
            self.step(dt);
        }
        trace!(elapsed, steps, "tick applied");
        TickReport { elapsed, steps }
    }

    /// One production pass in catalog order over shared, live inventory.
    fn step(&mut self, dt: f64) {
        for i in 0..self.inventory.len() {
            let owned = self.factories[i];
            if owned == 0 {
                continue;
            }
            let good = &self.catalog.goods()[i];
            if good.base_production {
                self.inventory[i] += good.production * owned as f64 * dt;
                continue;
            }
            let enabled = self.enabled_at(i, dt);
            if enabled == 0 {
                continue;
            }
            let n = enabled as f64;
            let output = n * self.output_rate(good) * dt;
            for &(input, qty) in &self.recipes[i] {
                let left = self.inventory[input] - qty * n * dt;
                debug_assert!(
                    left >= -OVERDRAW_EPSILON * (1.0 + self.inventory[input]),
                    "input {input} overdrawn to {left}"
                );
                // max() absorbs float rounding only; gating bounds the draw
                self.inventory[input] = left.max(0.0);
            }
            self.inventory[i] += output;
        }
    }

    fn output_rate(&self, good: &Good) -> f64 {
        if good.base_production {
            return good.production;
        }
        match self.config.manufactured_rate {
            ManufacturedRate::Declared => good.production,
            ManufacturedRate::Unit => 1.0,
        }
    }

    fn enabled_at(&self, i: usize, dt: f64) -> u64 {
        let owned = self.factories[i];
        if self.catalog.goods()[i].base_production {
            return owned;
        }
        if dt <= 0.0 {
            return 0;
        }
        match self.config.feasibility {
            Feasibility::PartialCapacity => {
                let mut enabled = owned;
                for &(input, qty) in &self.recipes[i] {
                    let stock = self.inventory[input];
                    let feedable = if stock <= 0.0 {
                        0
                    } else {
                        let n = (stock / (qty * dt)).floor();
                        if n >= owned as f64 {
                            owned
                        } else {
                            n as u64
                        }
                    };
                    enabled = enabled.min(feedable);
                }
                enabled
            }
            Feasibility::AllOrNothing => {
                let fed = self.recipes[i]
                    .iter()
                    .all(|&(input, qty)| self.inventory[input] >= qty * owned as f64 * dt);
                if fed {
                    owned
                } else {
                    0
                }
            }
        }
    }

    /// Factories of `id` that current stock lets run for a step of `dt`.
    pub fn enabled_factories(&self, id: &GoodId, dt: f64) -> u64 {
        self.catalog
            .index_of(id)
            .map(|i| self.enabled_at(i, dt))
            .unwrap_or(0)
    }

    /// Maximum output per second of `id` with every owned factory running.
    pub fn production_rate(&self, id: &GoodId) -> f64 {
        self.catalog
            .index_of(id)
            .map(|i| self.output_rate(&self.catalog.goods()[i]) * self.factories[i] as f64)
            .unwrap_or(0.0)
    }

    /// Buy `count` factories of `id`. Returns how many were bought (0 when
    /// the good is unknown or money is short).
    pub fn buy_factory(&mut self, id: &GoodId, count: u64) -> u64 {
        let Some(i) = self.catalog.index_of(id) else {
            debug!(good = %id, "buy ignored: unknown good");
            return 0;
        };
        if count == 0 {
            return 0;
        }
        let Some(total) = self.catalog.goods()[i]
            .cost
            .checked_mul(Decimal::from(count))
        else {
            return 0;
        };
        if self.money < total {
            debug!(good = %id, count, money = %self.money, cost = %total, "buy ignored: insufficient money");
            return 0;
        }
        let Some(owned) = self.factories[i].checked_add(count) else {
            debug!(good = %id, count, "buy ignored: factory count overflow");
            return 0;
        };
        self.money -= total;
        self.factories[i] = owned;
        info!(good = %id, count, owned = self.factories[i], money = %self.money, "factories bought");
        count
    }

    /// How many factories a single buy intent purchases:
    /// `max(1, floor(money * bulk_buy_fraction / cost))`.
    pub fn bulk_buy_count(&self, id: &GoodId) -> u64 {
        let Some(good) = self.catalog.get(id) else {
            return 0;
        };
        let Some(frac) = self
            .config
            .bulk_buy_fraction
            .and_then(Decimal::from_f64)
            .map(|f| f.round_dp(FRACTION_DP))
        else {
            return 1;
        };
        if good.cost <= Decimal::ZERO {
            return 1;
        }
        self.money
            .checked_mul(frac)
            .and_then(|budget| budget.checked_div(good.cost))
            .and_then(|n| n.floor().to_u64())
            .unwrap_or(1)
            .max(1)
    }

    /// Sell every whole unit of `id`; the fractional remainder stays.
    pub fn sell_good(&mut self, id: &GoodId) -> Option<SaleReceipt> {
        let i = self.catalog.index_of(id)?;
        let whole = self.inventory[i].floor();
        if whole < 1.0 {
            return None;
        }
        // saturating cast; huge stocks sell in u64-sized batches
        let units = whole as u64;
        let revenue = self.catalog.goods()[i]
            .sell_price
            .checked_mul(Decimal::from(units))?;
        let money = self.money.checked_add(revenue)?;
        self.money = money;
        self.inventory[i] = (self.inventory[i] - units as f64).max(0.0);
        debug!(good = %id, units, revenue = %revenue, "goods sold");
        Some(SaleReceipt {
            good: id.clone(),
            units,
            revenue,
        })
    }

    /// Sell every good in catalog order.
    pub fn sell_all_goods(&mut self) -> SellAllReport {
        let ids: Vec<GoodId> = self.catalog.goods().iter().map(|g| g.id.clone()).collect();
        let mut report = SellAllReport::default();
        for id in &ids {
            if let Some(receipt) = self.sell_good(id) {
                report.units += receipt.units;
                report.revenue += receipt.revenue;
                report.receipts.push(receipt);
            }
        }
        info!(units = report.units, revenue = %report.revenue, money = %self.money, "sold all goods");
        report
    }

    /// Snapshot for the presentation layer.
    pub fn snapshot(&self) -> EconomySnapshot {
        let goods = self
            .catalog
            .goods()
            .iter()
            .enumerate()
            .map(|(i, g)| {
                let whole = self.inventory[i].floor();
                GoodView {
                    id: g.id.clone(),
                    name: g.name.clone(),
                    emoji: g.emoji.clone(),
                    base_production: g.base_production,
                    quantity: whole as u64,
                    factories: self.factories[i],
                    affordable: self.money >= g.cost,
                    sellable: whole >= 1.0,
                    production_per_sec: self.output_rate(g) * self.factories[i] as f64,
                    cost: g.cost,
                    sell_price: g.sell_price,
                    inputs: g.inputs.clone(),
                }
            })
            .collect();
        EconomySnapshot {
            money: self.money,
            goods,
        }
    }
}
