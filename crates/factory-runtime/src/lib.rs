#![deny(warnings)]

//! ECS runtime for the economy: frame scheduling, player intents and the
//! snapshot published to the presentation layer.

use bevy_ecs::prelude::*;
use bevy_ecs::schedule::Schedule;
use factory_core::{Catalog, EngineConfig, GoodId};
use factory_econ::{EconError, Economy, EconomySnapshot, SaleReceipt, SellAllReport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, info};

/// The engine, held as the single source of simulation truth.
#[derive(Resource)]
pub struct EconomyState(pub Economy);

/// Frame bookkeeping and the delta waiting to be simulated.
#[derive(Resource, Default, Debug)]
pub struct FrameClock {
    last: Option<Instant>,
    pending: f64,
    frames: u64,
    elapsed: f64,
}

/// Goods the player has seen. Raw goods start revealed; a manufactured good
/// appears once it is both affordable and producible, and stays.
#[derive(Resource, Default, Debug)]
pub struct Discovery {
    revealed: BTreeSet<GoodId>,
}

impl Discovery {
    /// Reveal newly attainable goods; returns the ones revealed this call.
    pub fn refresh(&mut self, economy: &Economy) -> Vec<GoodId> {
        let mut fresh = Vec::new();
        for good in economy.catalog().goods() {
            if self.revealed.contains(&good.id) {
                continue;
            }
            let owned = economy.factories(&good.id).unwrap_or(0) > 0;
            let attainable = economy.money() >= good.cost
                && good.inputs.iter().all(|input| {
                    economy.inventory(&input.good_id).unwrap_or(0.0) >= input.quantity
                });
            if good.base_production || owned || attainable {
                self.revealed.insert(good.id.clone());
                fresh.push(good.id.clone());
            }
        }
        fresh
    }

    pub fn is_revealed(&self, id: &GoodId) -> bool {
        self.revealed.contains(id)
    }
}

/// Everything the presentation layer needs after a frame or an intent.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub frame: u64,
    pub elapsed_seconds: f64,
    pub economy: EconomySnapshot,
    /// Revealed goods, in catalog order.
    pub revealed: Vec<GoodId>,
}

impl SessionSnapshot {
    pub fn is_revealed(&self, id: &GoodId) -> bool {
        self.revealed.contains(id)
    }
}

#[derive(Resource, Default)]
struct LatestSnapshot(SessionSnapshot);

/// A player action dispatched by the presentation layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    BuyFactory(GoodId),
    Sell(GoodId),
    SellAll,
}

/// What an intent did. `Ignored` covers every rejected action.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum IntentOutcome {
    Bought { good: GoodId, count: u64 },
    Sold(SaleReceipt),
    SoldAll(SellAllReport),
    Ignored,
}

fn produce_goods(mut clock: ResMut<FrameClock>, mut economy: ResMut<EconomyState>) {
    let delta = std::mem::take(&mut clock.pending);
    let report = economy.0.tick(delta);
    clock.frames += 1;
    clock.elapsed += report.elapsed;
}

fn reveal_goods(economy: Res<EconomyState>, mut discovery: ResMut<Discovery>) {
    for id in discovery.refresh(&economy.0) {
        info!(good = %id, "good revealed");
    }
}

fn publish_snapshot(
    economy: Res<EconomyState>,
    discovery: Res<Discovery>,
    clock: Res<FrameClock>,
    mut latest: ResMut<LatestSnapshot>,
) {
    let snapshot = economy.0.snapshot();
    let revealed = snapshot
        .goods
        .iter()
        .filter(|g| discovery.is_revealed(&g.id))
        .map(|g| g.id.clone())
        .collect();
    latest.0 = SessionSnapshot {
        frame: clock.frames,
        elapsed_seconds: clock.elapsed,
        economy: snapshot,
        revealed,
    };
}

/// A running game session: one ECS world and its schedules.
pub struct Session {
    world: World,
    frame: Schedule,
    refresh: Schedule,
}

impl Session {
    pub fn new(catalog: Catalog, config: EngineConfig) -> Result<Self, EconError> {
        Ok(Self::from_economy(Economy::new(catalog, config)?))
    }

    pub fn from_economy(economy: Economy) -> Self {
        let mut world = World::new();
        world.insert_resource(EconomyState(economy));
        world.insert_resource(FrameClock::default());
        world.insert_resource(Discovery::default());
        world.insert_resource(LatestSnapshot::default());

        let mut frame = Schedule::default();
        frame.add_systems((produce_goods, reveal_goods, publish_snapshot).chain());
        let mut refresh = Schedule::default();
        refresh.add_systems((reveal_goods, publish_snapshot).chain());

        let mut session = Self {
            world,
            frame,
            refresh,
        };
        session.refresh.run(&mut session.world);
        session
    }

    /// Run one frame simulating `delta_seconds`.
    pub fn advance(&mut self, delta_seconds: f64) -> &SessionSnapshot {
        self.world.resource_mut::<FrameClock>().pending = delta_seconds.max(0.0);
        self.frame.run(&mut self.world);
        self.snapshot()
    }

    /// Run one frame using wall-clock time since the previous call. The
    /// first call simulates nothing.
    pub fn advance_wall_clock(&mut self) -> &SessionSnapshot {
        let now = Instant::now();
        let delta = {
            let mut clock = self.world.resource_mut::<FrameClock>();
            let delta = clock
                .last
                .map(|last| now.duration_since(last).as_secs_f64())
                .unwrap_or(0.0);
            clock.last = Some(now);
            delta
        };
        self.advance(delta)
    }

    /// Apply a player intent immediately and republish the snapshot.
    pub fn dispatch(&mut self, intent: &Intent) -> IntentOutcome {
        let outcome = {
            let mut state = self.world.resource_mut::<EconomyState>();
            let economy = &mut state.0;
            match intent {
                Intent::BuyFactory(id) => {
                    let count = economy.bulk_buy_count(id);
                    match economy.buy_factory(id, count) {
                        0 => IntentOutcome::Ignored,
                        count => IntentOutcome::Bought {
                            good: id.clone(),
                            count,
                        },
                    }
                }
                Intent::Sell(id) => economy
                    .sell_good(id)
                    .map(IntentOutcome::Sold)
                    .unwrap_or(IntentOutcome::Ignored),
                Intent::SellAll => {
                    let report = economy.sell_all_goods();
                    if report.receipts.is_empty() {
                        IntentOutcome::Ignored
                    } else {
                        IntentOutcome::SoldAll(report)
                    }
                }
            }
        };
        debug!(?intent, ?outcome, "intent dispatched");
        self.refresh.run(&mut self.world);
        outcome
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> &SessionSnapshot {
        &self.world.resource::<LatestSnapshot>().0
    }

    pub fn economy(&self) -> &Economy {
        &self.world.resource::<EconomyState>().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factory_core::{Good, InputSpec};
    use rust_decimal::Decimal;

    fn id(s: &str) -> GoodId {
        GoodId::from(s)
    }

    fn catalog() -> Catalog {
        let wood = Good {
            id: id("wood"),
            name: "Wood".into(),
            emoji: Some("🪵".into()),
            base_production: true,
            production: 1.0,
            cost: Decimal::new(10, 0),
            sell_price: Decimal::new(2, 0),
            inputs: vec![],
            factories: 0,
        };
        let plank = Good {
            id: id("plank"),
            name: "Plank".into(),
            emoji: None,
            base_production: false,
            production: 1.0,
            cost: Decimal::new(20, 0),
            sell_price: Decimal::new(5, 0),
            inputs: vec![InputSpec {
                good_id: id("wood"),
                quantity: 2.0,
            }],
            factories: 0,
        };
        Catalog::new(vec![wood, plank]).unwrap()
    }

    fn session() -> Session {
        Session::new(catalog(), EngineConfig::default()).unwrap()
    }

    #[test]
    fn initial_snapshot_is_published() {
        let s = session();
        let snap = s.snapshot();
        assert_eq!(snap.frame, 0);
        assert_eq!(snap.economy.money, Decimal::new(100, 0));
        assert_eq!(snap.revealed, vec![id("wood")]);
    }

    #[test]
    fn frames_advance_production() {
        let mut s = session();
        assert!(matches!(
            s.dispatch(&Intent::BuyFactory(id("wood"))),
            IntentOutcome::Bought { count: 1, .. }
        ));
        s.advance(2.5);
        let snap = s.advance(2.5);
        assert_eq!(snap.frame, 2);
        assert_eq!(snap.elapsed_seconds, 5.0);
        assert_eq!(snap.economy.good(&id("wood")).unwrap().quantity, 5);
    }

    #[test]
    fn intents_apply_immediately() {
        let mut s = session();
        s.dispatch(&Intent::BuyFactory(id("wood")));
        assert_eq!(s.snapshot().economy.money, Decimal::new(90, 0));
        assert_eq!(s.snapshot().frame, 0);
        s.advance(3.0);
        let outcome = s.dispatch(&Intent::Sell(id("wood")));
        match outcome {
            IntentOutcome::Sold(receipt) => assert_eq!(receipt.units, 3),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(s.snapshot().economy.money, Decimal::new(96, 0));
        assert_eq!(s.dispatch(&Intent::SellAll), IntentOutcome::Ignored);
    }

    #[test]
    fn rejected_intents_are_ignored() {
        let mut s = session();
        assert_eq!(
            s.dispatch(&Intent::BuyFactory(id("ghost"))),
            IntentOutcome::Ignored
        );
        assert_eq!(s.dispatch(&Intent::Sell(id("wood"))), IntentOutcome::Ignored);
        assert_eq!(s.economy().money(), Decimal::new(100, 0));
    }

    #[test]
    fn manufactured_good_revealed_once_attainable() {
        let mut s = session();
        s.dispatch(&Intent::BuyFactory(id("wood")));
        s.advance(1.0);
        assert!(!s.snapshot().is_revealed(&id("plank")));
        let snap = s.advance(1.0);
        assert!(snap.is_revealed(&id("plank")));
        // stays revealed after the inputs are sold off
        s.dispatch(&Intent::SellAll);
        assert!(s.snapshot().is_revealed(&id("plank")));
    }

    #[test]
    fn first_wall_clock_frame_simulates_nothing() {
        let mut s = session();
        s.dispatch(&Intent::BuyFactory(id("wood")));
        let snap = s.advance_wall_clock();
        assert_eq!(snap.elapsed_seconds, 0.0);
        assert_eq!(snap.frame, 1);
        let snap = s.advance_wall_clock();
        assert!(snap.elapsed_seconds >= 0.0);
        assert_eq!(snap.frame, 2);
    }

    #[test]
    fn snapshot_serializes() {
        let s = session();
        let json = serde_json::to_string(s.snapshot()).unwrap();
        assert!(json.contains("\"wood\""));
        assert!(json.contains("\"revealed\""));
    }
}
