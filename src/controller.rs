use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::{Rng, SeedableRng};
use slotmap::SecondaryMap;
use tracing::{debug, info, info_span, warn};

use crate::base::{HashSet, Point, RNG};
use crate::config::AIConfig;
use crate::error::ConfigError;
use crate::evaluate::Env;
use crate::objective::Objective;
use crate::order::{Ctx, Defend, Order, Single};
use crate::rules::Advance;
use crate::world::{Action, Arbiter, City, FactionId, Message, Production, Relation, Unit};
use crate::world::{UnitId, World};

//////////////////////////////////////////////////////////////////////////////

// Auction helpers

// Indices of the applicable scores, best first. Equal scores keep their
// evaluation order.
pub fn rank(scores: &[i32]) -> Vec<usize> {
    let mut heap: BinaryHeap<(i32, Reverse<usize>)> = scores.iter().enumerate()
        .filter(|x| *x.1 >= 0)
        .map(|(i, &score)| (score, Reverse(i))).collect();
    std::iter::from_fn(|| heap.pop().map(|(_, Reverse(i))| i)).collect()
}

// The best production across all objectives. The first objective wins ties.
pub fn best_production<W: World + ?Sized>(
        env: &Env<W>, city: &City) -> Option<(Production, i32, Objective)> {
    let mut best: Option<(Production, i32, Objective)> = None;
    for objective in Objective::ALL {
        let Some((production, score)) = objective.score_city_production(env, city) else { continue };
        if best.is_some_and(|x| x.1 >= score) { continue; }
        best = Some((production, score, objective));
    }
    best
}

//////////////////////////////////////////////////////////////////////////////

// TurnReport

#[derive(Clone, Debug, Default)]
pub struct TurnReport {
    pub turn: i32,
    pub messages: usize,
    pub auctions: usize,
    pub submitted: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub retried: usize,
    // Units whose action failed twice. They sit out the rest of the turn.
    pub dropped: Vec<UnitId>,
    pub productions: usize,
    pub research: Option<&'static Advance>,
}

//////////////////////////////////////////////////////////////////////////////

// AIController

pub struct AIController {
    faction: FactionId,
    config: AIConfig,
    rng: RNG,
    orders: SecondaryMap<UnitId, Order>,
    met: HashSet<FactionId>,
    turn: i32,
}

impl AIController {
    pub fn new(faction: FactionId, config: AIConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = RNG::seed_from_u64(config.seed ^ faction.0 as u64);
        Ok(Self {
            faction,
            config,
            rng,
            orders: SecondaryMap::new(),
            met: HashSet::default(),
            turn: 0,
        })
    }

    pub fn faction(&self) -> FactionId { self.faction }

    pub fn order(&self, unit: UnitId) -> Option<&Order> { self.orders.get(unit) }

    pub fn play_turn<A: Arbiter + ?Sized>(&mut self, game: &mut A) -> TurnReport {
        self.turn += 1;
        let span = info_span!("ai_turn", faction = %self.faction, turn = self.turn);
        let _guard = span.enter();
        let mut report = TurnReport { turn: self.turn, ..Default::default() };

        // Step 1: react to everything that happened since our last turn.
        self.read_messages(game, &mut report);
        self.choose_research(game, &mut report);

        // Step 2: keep every city building something.
        self.choose_production(game, &mut report);

        // Step 3: release orders of lost units, then act with the rest.
        let faction = self.faction;
        self.orders.retain(|id, _| game.unit(id).is_some_and(|x| x.owner == faction));
        let mut units = game.faction_units(faction);
        units.sort();
        for id in units { self.step_unit(game, id, &mut report); }

        // Step 4: hand the turn back.
        game.submit(faction, Action::EndTurn);
        info!(accepted = report.accepted, rejected = report.rejected,
              dropped = report.dropped.len(), "turn done");
        report
    }

    fn debug(&self) -> bool { self.config.log.is_debug(self.faction) }

    fn submit<A: Arbiter + ?Sized>(
            game: &mut A, faction: FactionId, action: Action, report: &mut TurnReport) -> bool {
        report.submitted += 1;
        let accepted = game.submit(faction, action);
        if accepted { report.accepted += 1; } else { report.rejected += 1; }
        accepted
    }

    fn read_messages<A: Arbiter + ?Sized>(&mut self, game: &mut A, report: &mut TurnReport) {
        while let Some(message) = game.pop_message(self.faction) {
            report.messages += 1;
            match message {
                Message::FactionMet(other) => {
                    if !self.met.insert(other) || !game.is_barbarian(other) { continue; }
                    info!(%other, "met barbarians, declaring war");
                    game.set_relation(self.faction, other, Relation::War);
                }
                Message::UnitLost(id) => {
                    debug!(unit = ?id, "unit lost");
                    self.orders.remove(id);
                }
                Message::CityLost(city) => info!(?city, "city lost"),
                Message::UnitBuilt(city, unit) => debug!(?city, ?unit, "unit built"),
                Message::BuildingBuilt(city, x) => debug!(?city, building = x.name, "building built"),
                Message::AdvanceLearned(x) => debug!(advance = x.name, "advance learned"),
            }
        }
    }

    // The cheapest available advance, catalog order on ties.
    fn choose_research<A: Arbiter + ?Sized>(&mut self, game: &mut A, report: &mut TurnReport) {
        if game.researching(self.faction).is_some() { return; }
        let options = game.researchable(self.faction);
        let Some(&advance) = options.iter().min_by_key(|x| x.cost) else { return };
        if Self::submit(game, self.faction, Action::SetResearch { advance }, report) {
            debug!(advance = advance.name, "research");
            report.research = Some(advance);
        }
    }

    fn choose_production<A: Arbiter + ?Sized>(&mut self, game: &mut A, report: &mut TurnReport) {
        let busy = HashSet::default();
        let mut cities = game.faction_cities(self.faction);
        cities.sort();

        for id in cities {
            let choice = {
                let Some(city) = game.city(id) else { continue };
                if city.production.is_some() { continue; }
                let env = Env {
                    world: &*game,
                    config: &self.config,
                    faction: self.faction,
                    reserved: &[],
                    busy: &busy,
                    hold_turns: self.config.defense.hold_turns_min,
                    debug: self.debug(),
                };
                best_production(&env, city)
            };
            let Some((production, score, objective)) = choice else { continue };
            let action = Action::SetProduction { city: id, production };
            if !Self::submit(game, self.faction, action, report) { continue; }
            report.productions += 1;
            if self.debug() {
                debug!(?id, name = production.name(), score, objective = objective.name(), "production");
            }
        }
    }

    // City sites claimed by the faction's other settlers.
    fn reserved(&self, except: UnitId) -> Vec<Point> {
        self.orders.iter().filter(|x| x.0 != except).filter_map(|x| x.1.site()).collect()
    }

    fn busy(&self) -> HashSet<UnitId> {
        self.orders.iter().filter(|x| !x.1.finished()).map(|x| x.0).collect()
    }

    fn step_unit<A: Arbiter + ?Sized>(&mut self, game: &mut A, id: UnitId, report: &mut TurnReport) {
        let Some(unit) = game.unit(id).cloned() else { return };
        if unit.owner != self.faction || !unit.can_act() { return; }

        if self.orders.get(id).map_or(true, |x| x.finished()) {
            let order = self.auction(&*game, &unit, report);
            self.orders.insert(id, order);
        }
        self.execute(game, id, report);
    }

    fn auction<W: World + ?Sized>(&mut self, world: &W, unit: &Unit, report: &mut TurnReport) -> Order {
        report.auctions += 1;
        let defense = &self.config.defense;
        let hold_turns = self.rng.random_range(defense.hold_turns_min..=defense.hold_turns_max);
        let reserved = self.reserved(unit.id);
        let busy = self.busy();
        let env = Env {
            world,
            config: &self.config,
            faction: self.faction,
            reserved: &reserved,
            busy: &busy,
            hold_turns,
            debug: self.debug(),
        };

        let scores: Vec<i32> = Objective::ALL.iter().map(|x| x.score_unit(&env, unit)).collect();
        for i in rank(&scores) {
            let objective = Objective::ALL[i];
            let Some(order) = objective.issue_order(&env, unit) else { continue };
            if env.debug {
                debug!(unit = ?unit.id, kind = unit.kind.name, objective = objective.name(),
                       score = scores[i], order = order.name(), "auction");
            }
            return order;
        }
        if env.debug { debug!(unit = ?unit.id, kind = unit.kind.name, "auction fallback"); }

        // Nobody bid: get off a beached transport, else fall back to defense.
        let ashore = world.tile(unit.pos).is_some_and(|x| x.terrain.is_land());
        if unit.transport.is_some() && ashore {
            return Order::Single(Single::new(Action::Unload { unit: unit.id }));
        }
        Order::Defend(Defend::new(&env.ctx(unit), hold_turns))
    }

    // One action per unit per turn. A rejected action gets one replan and
    // one resubmission; a second rejection drops the unit for this turn.
    fn execute<A: Arbiter + ?Sized>(&mut self, game: &mut A, id: UnitId, report: &mut TurnReport) {
        let Some(mut order) = self.orders.remove(id) else { return };
        let reserved = self.reserved(id);
        let faction = self.faction;
        let debug = self.debug();
        let config = &self.config;

        let next = |game: &A, order: &mut Order, replan: bool| -> Option<Action> {
            let unit = game.unit(id)?;
            let ctx = Ctx::new(game, unit, config, &reserved);
            if replan && !order.replan(&ctx) { return None; }
            order.get_action(&ctx)
        };

        let mut action = next(&*game, &mut order, false);
        if action.is_none() && !order.finished() { action = next(&*game, &mut order, true); }
        let Some(action) = action else {
            if debug { debug!(unit = ?id, order = order.name(), "order has nothing to do"); }
            return;
        };

        let mut accepted = Self::submit(game, faction, action, report);
        if !accepted {
            report.retried += 1;
            if let Some(retry) = next(&*game, &mut order, true) {
                accepted = Self::submit(game, faction, retry, report);
            }
        }
        if !accepted {
            warn!(unit = ?id, ?action, order = order.name(), "action rejected twice, unit dropped");
            report.dropped.push(id);
            return;
        }

        // The unit may have died in combat or been consumed by its action.
        let Some(unit) = game.unit(id) else { return };
        order.drop_action(&Ctx::new(&*game, unit, config, &reserved));
        if debug { debug!(unit = ?id, ?action, order = order.name(), "acted"); }
        self.orders.insert(id, order);
    }
}

//////////////////////////////////////////////////////////////////////////////
