use std::collections::VecDeque;

use crate::base::{Point, dirs};
use crate::config::AIConfig;
use crate::evaluate::{best_site, nearest_frontier, nearest_hostile, nearest_own_city};
use crate::evaluate::{usable_site, yield_value};
use crate::pathing::{Mover, Path};
use crate::rules::{CITY_RADIUS, Improvement};
use crate::world::{Action, CityId, Unit, UnitId, World, hostile_at};

//////////////////////////////////////////////////////////////////////////////

// Ctx: the world as one unit's order sees it this step

pub struct Ctx<'a, W: World + ?Sized> {
    pub world: &'a W,
    pub unit: &'a Unit,
    pub config: &'a AIConfig,
    // City sites claimed by the faction's other settlers.
    pub reserved: &'a [Point],
}

impl<'a, W: World + ?Sized> Ctx<'a, W> {
    pub fn new(world: &'a W, unit: &'a Unit, config: &'a AIConfig, reserved: &'a [Point]) -> Self {
        Self { world, unit, config, reserved }
    }

    pub fn mover(&self) -> Mover<'a, W> { Mover::new(self.world, self.unit) }

    pub fn route(&self, source: Point, target: Point, ignore_enemies: bool) -> Path {
        let mover = self.mover();
        let mover = if ignore_enemies { mover.ignoring_enemies() } else { mover };
        mover.route(source, target, self.config.search.astar_limit)
    }

    fn skip(&self) -> Action { Action::Skip { unit: self.unit.id } }
}

//////////////////////////////////////////////////////////////////////////////

// Single: one fixed action, once

#[derive(Clone, Debug)]
pub struct Single {
    pub action: Action,
    done: bool,
}

impl Single {
    pub fn new(action: Action) -> Self { Self { action, done: false } }

    fn get_action<W: World + ?Sized>(&self, _: &Ctx<W>) -> Option<Action> {
        if self.done { None } else { Some(self.action) }
    }

    fn drop_action<W: World + ?Sized>(&mut self, _: &Ctx<W>) { self.done = true; }

    fn finished(&self) -> bool { self.done }

    fn replan<W: World + ?Sized>(&mut self, _: &Ctx<W>) -> bool { false }

    fn clear(&mut self) { self.done = true; }
}

//////////////////////////////////////////////////////////////////////////////

// Goto: follow a cached route to a fixed target

#[derive(Clone, Debug)]
pub struct Goto {
    pub target: Point,
    ignore_enemies: bool,
    // Remaining steps, with the next step last.
    steps: Vec<Point>,
}

impl Goto {
    pub fn new<W: World + ?Sized>(ctx: &Ctx<W>, target: Point, ignore_enemies: bool) -> Self {
        let mut result = Self { target, ignore_enemies, steps: vec![] };
        result.replan(ctx);
        result
    }

    pub fn idle(pos: Point) -> Self {
        Self { target: pos, ignore_enemies: false, steps: vec![] }
    }

    pub fn path(&self) -> Vec<Point> { self.steps.iter().rev().copied().collect() }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        let &next = self.steps.last()?;
        let delta = ctx.world.shape().delta(ctx.unit.pos, next);
        if !delta.is_adjacent() { return None; }
        Some(Action::Move { unit: ctx.unit.id, delta })
    }

    // A move that ended in combat leaves the unit in place, and the step with it.
    fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        if self.steps.last() == Some(&ctx.unit.pos) { self.steps.pop(); }
        if ctx.unit.pos == self.target { self.steps.clear(); }
    }

    fn finished(&self) -> bool { self.steps.is_empty() }

    fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        self.steps = ctx.route(ctx.unit.pos, self.target, self.ignore_enemies);
        self.steps.reverse();
        self.steps.pop();
        !self.steps.is_empty()
    }

    fn clear(&mut self) { self.steps.clear(); }
}

//////////////////////////////////////////////////////////////////////////////

// Wait: skip a fixed number of turns

#[derive(Clone, Debug)]
pub struct Wait {
    turns: i32,
    left: i32,
}

impl Wait {
    pub fn new(turns: i32) -> Self { Self { turns, left: turns } }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        if self.left > 0 { Some(ctx.skip()) } else { None }
    }

    fn drop_action<W: World + ?Sized>(&mut self, _: &Ctx<W>) { self.left -= 1; }

    fn finished(&self) -> bool { self.left <= 0 }

    fn replan<W: World + ?Sized>(&mut self, _: &Ctx<W>) -> bool {
        self.left = self.turns;
        true
    }

    fn clear(&mut self) { self.left = 0; }
}

//////////////////////////////////////////////////////////////////////////////

// Defend: travel to the nearest own city, fortify, then hold

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DefendPhase { Travel, Fortify, Hold }

#[derive(Clone, Debug)]
pub struct Defend {
    pub city: Option<CityId>,
    goto: Goto,
    phase: DefendPhase,
    hold: Wait,
}

impl Defend {
    pub fn new<W: World + ?Sized>(ctx: &Ctx<W>, hold: i32) -> Self {
        let (city, goto) = match nearest_own_city(ctx) {
            Some(x) => (Some(x.found), Goto::new(ctx, x.target, false)),
            None => (None, Goto::idle(ctx.unit.pos)),
        };
        let mut result = Self { city, goto, phase: DefendPhase::Travel, hold: Wait::new(hold) };
        result.settle(ctx);
        result
    }

    // Ships and passengers can't fortify.
    fn can_fortify(unit: &Unit) -> bool { !unit.kind.is_sea() && unit.transport.is_none() }

    // Without a route, the unit holds where it stands.
    fn settle<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        if self.phase == DefendPhase::Travel && self.goto.finished() {
            self.phase = DefendPhase::Fortify;
        }
        let unit = ctx.unit;
        if self.phase == DefendPhase::Fortify && (unit.fortified || !Self::can_fortify(unit)) {
            self.phase = DefendPhase::Hold;
        }
    }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        match self.phase {
            DefendPhase::Travel => self.goto.get_action(ctx),
            DefendPhase::Fortify => Some(Action::Fortify { unit: ctx.unit.id }),
            DefendPhase::Hold => self.hold.get_action(ctx),
        }
    }

    fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        match self.phase {
            DefendPhase::Travel => { self.goto.drop_action(ctx); self.settle(ctx); }
            DefendPhase::Fortify => self.phase = DefendPhase::Hold,
            DefendPhase::Hold => self.hold.drop_action(ctx),
        }
    }

    fn finished(&self) -> bool { self.phase == DefendPhase::Hold && self.hold.finished() }

    fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        self.hold.replan(ctx);
        if self.phase == DefendPhase::Travel { self.goto.replan(ctx); }
        self.settle(ctx);
        true
    }

    fn clear(&mut self) {
        self.goto.clear();
        self.phase = DefendPhase::Hold;
        self.hold.clear();
    }
}

//////////////////////////////////////////////////////////////////////////////

// Attack: hit adjacent hostiles, otherwise march on the nearest one

#[derive(Clone, Debug)]
pub struct Attack {
    goto: Goto,
    adjacent: bool,
}

impl Attack {
    pub fn new<W: World + ?Sized>(ctx: &Ctx<W>) -> Self {
        let mut result = Self { goto: Goto::idle(ctx.unit.pos), adjacent: false };
        result.replan(ctx);
        result
    }

    fn adjacent_target<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<Point> {
        let shape = ctx.world.shape();
        dirs::ALL.iter().copied().find(|&dir| {
            let Some(p) = shape.step(ctx.unit.pos, dir) else { return false };
            hostile_at(ctx.world, ctx.unit.owner, p)
        })
    }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        if self.finished() { return None; }
        if let Some(delta) = Self::adjacent_target(ctx) {
            return Some(Action::Move { unit: ctx.unit.id, delta });
        }
        self.goto.get_action(ctx)
    }

    fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        self.goto.drop_action(ctx);
        self.adjacent = Self::adjacent_target(ctx).is_some();
        if self.adjacent || self.goto.finished() { return; }
        if !hostile_at(ctx.world, ctx.unit.owner, self.goto.target) { self.replan(ctx); }
    }

    fn finished(&self) -> bool { !self.adjacent && self.goto.finished() }

    fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        self.adjacent = Self::adjacent_target(ctx).is_some();
        self.goto = match nearest_hostile(ctx) {
            Some(x) => Goto::new(ctx, x.target, true),
            None => Goto::idle(ctx.unit.pos),
        };
        !self.finished()
    }

    fn clear(&mut self) {
        self.adjacent = false;
        self.goto.clear();
    }
}

//////////////////////////////////////////////////////////////////////////////

// Improve: work a queue of terrain improvement jobs

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImproveKind {
    Terrain { city: CityId },
    RoadTo { target: Point },
    ConnectCities,
    ConnectResource { resource: Point },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Job {
    pub pos: Point,
    pub improvement: Improvement,
}

#[derive(Clone, Debug)]
pub struct Improve {
    pub kind: ImproveKind,
    jobs: VecDeque<Job>,
    goto: Goto,
}

impl Improve {
    pub fn new<W: World + ?Sized>(ctx: &Ctx<W>, kind: ImproveKind) -> Self {
        let mut result = Self { kind, jobs: VecDeque::new(), goto: Goto::idle(ctx.unit.pos) };
        result.replan(ctx);
        result
    }

    pub fn jobs(&self) -> &VecDeque<Job> { &self.jobs }

    // Does the kind's work still consist of terrain improvements alone?
    pub fn is_terrain(&self) -> bool { matches!(self.kind, ImproveKind::Terrain { .. }) }

    fn valid<W: World + ?Sized>(ctx: &Ctx<W>, job: &Job) -> bool {
        let Some(tile) = ctx.world.tile(job.pos) else { return false };
        if tile.has(job.improvement) { return false; }
        if tile.owner.is_some_and(|x| x != ctx.unit.owner) { return false; }
        ctx.world.can_improve(job.pos, job.improvement)
    }

    // Drops jobs that are done, illegal, or out of reach, and routes to the next.
    fn head<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        self.goto = Goto::idle(ctx.unit.pos);
        while let Some(&job) = self.jobs.front() {
            if Self::valid(ctx, &job) {
                if job.pos == ctx.unit.pos { return; }
                let goto = Goto::new(ctx, job.pos, false);
                if !goto.finished() {
                    self.goto = goto;
                    return;
                }
            }
            self.jobs.pop_front();
        }
    }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        let job = self.jobs.front()?;
        if ctx.unit.pos != job.pos { return self.goto.get_action(ctx); }
        Some(Action::Improve { unit: ctx.unit.id, improvement: job.improvement })
    }

    fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        let Some(&job) = self.jobs.front() else { return };

        if !self.goto.finished() {
            self.goto.drop_action(ctx);
            if ctx.unit.pos != job.pos { return; }
            // Arrived: ownership or terrain may have changed on the way.
            if Self::valid(ctx, &job) { return; }
            self.jobs.pop_front();
            if self.jobs.is_empty() { self.replan(ctx); } else { self.head(ctx); }
            return;
        }

        let done = ctx.world.tile(job.pos).is_some_and(|x| x.has(job.improvement));
        if done {
            self.jobs.pop_front();
            self.head(ctx);
        }
    }

    pub fn finished(&self) -> bool { self.jobs.is_empty() }

    fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        self.jobs = match self.kind {
            ImproveKind::Terrain { city } => terrain_jobs(ctx, city),
            ImproveKind::RoadTo { target } => road_jobs(ctx, ctx.unit.pos, target),
            ImproveKind::ConnectCities => connect_cities_jobs(ctx),
            ImproveKind::ConnectResource { resource } => connect_resource_jobs(ctx, resource),
        };
        self.head(ctx);
        !self.jobs.is_empty()
    }

    fn clear(&mut self) {
        self.jobs.clear();
        self.goto.clear();
    }
}

// The best irrigation or mine in a city's radius, nearest first on ties.
fn terrain_jobs<W: World + ?Sized>(ctx: &Ctx<W>, city: CityId) -> VecDeque<Job> {
    let Ctx { world, unit, config, .. } = *ctx;
    let Some(city) = world.city(city) else { return VecDeque::new() };
    let shape = world.shape();

    let mut best: Option<(i32, i32, Job)> = None;
    for pos in shape.within(city.pos, CITY_RADIUS) {
        if pos == city.pos || !world.is_known(unit.owner, pos) { continue; }
        let Some(tile) = world.tile(pos) else { continue };
        if tile.improvement.is_some() { continue; }

        for improvement in [Improvement::Irrigation, Improvement::Mine] {
            let job = Job { pos, improvement };
            if !Improve::valid(ctx, &job) { continue; }
            let gain = yield_value(&config.expansion, improvement.bonus(tile.terrain));
            if gain <= 0 { continue; }
            let distance = shape.distance(unit.pos, pos);
            if best.is_some_and(|x| (x.0, -x.1) >= (gain, -distance)) { continue; }
            best = Some((gain, distance, job));
        }
    }
    best.map(|x| x.2).into_iter().collect()
}

// Road jobs along the cheapest land route from `a` to `b`, or none if the
// two are already joined by road. The queue starts at the end nearer the unit.
fn road_jobs<W: World + ?Sized>(ctx: &Ctx<W>, a: Point, b: Point) -> VecDeque<Job> {
    let mover = ctx.mover();
    let limit = ctx.config.search.astar_limit;
    if !mover.route_on_roads(a, b, limit).is_empty() { return VecDeque::new(); }
    road_jobs_on(ctx, &mover.route(a, b, limit))
}

fn road_jobs_on<W: World + ?Sized>(ctx: &Ctx<W>, path: &[Point]) -> VecDeque<Job> {
    let mut result: VecDeque<Job> = path.iter()
        .map(|&pos| Job { pos, improvement: Improvement::Road })
        .filter(|x| Improve::valid(ctx, x)).collect();
    let shape = ctx.world.shape();
    let (Some(first), Some(last)) = (result.front(), result.back()) else { return result };
    let pos = ctx.unit.pos;
    if shape.distance(pos, last.pos) < shape.distance(pos, first.pos) {
        result.make_contiguous().reverse();
    }
    result
}

// Of all own city pairs not yet joined by road, the one with the shortest
// land route.
fn connect_cities_jobs<W: World + ?Sized>(ctx: &Ctx<W>) -> VecDeque<Job> {
    let Ctx { world, unit, config, .. } = *ctx;
    let limit = config.search.astar_limit;
    let mover = ctx.mover();

    let mut cities = world.faction_cities(unit.owner);
    cities.sort();
    let cities: Vec<_> = cities.into_iter().filter_map(|x| world.city(x)).map(|x| x.pos).collect();

    let mut best: Option<Path> = None;
    for (i, &a) in cities.iter().enumerate() {
        for &b in &cities[i + 1..] {
            if !mover.route_on_roads(a, b, limit).is_empty() { continue; }
            let path = mover.route(a, b, limit);
            if path.is_empty() { continue; }
            if best.as_ref().is_some_and(|x| x.len() <= path.len()) { continue; }
            best = Some(path);
        }
    }
    best.map(|x| road_jobs_on(ctx, &x)).unwrap_or_default()
}

fn connect_resource_jobs<W: World + ?Sized>(ctx: &Ctx<W>, resource: Point) -> VecDeque<Job> {
    let Ctx { world, unit, .. } = *ctx;
    let shape = world.shape();
    let mut cities = world.faction_cities(unit.owner);
    cities.sort();
    let nearest = cities.into_iter().filter_map(|x| world.city(x))
        .min_by_key(|x| shape.distance(x.pos, resource));
    let Some(city) = nearest else { return VecDeque::new() };
    road_jobs(ctx, resource, city.pos)
}

//////////////////////////////////////////////////////////////////////////////

// Found: travel to a city site and settle it

#[derive(Clone, Debug)]
pub struct Found {
    pub site: Point,
    pub value: i32,
    goto: Goto,
    done: bool,
    failed: bool,
}

impl Found {
    pub fn new<W: World + ?Sized>(ctx: &Ctx<W>, site: Point, value: i32) -> Self {
        let goto = Goto::new(ctx, site, false);
        let failed = goto.finished() && ctx.unit.pos != site;
        Self { site, value, goto, done: false, failed }
    }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        if self.finished() { return None; }
        if ctx.unit.pos == self.site { return Some(Action::FoundCity { unit: ctx.unit.id }); }
        self.goto.get_action(ctx)
    }

    fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        if self.goto.finished() {
            self.done = ctx.unit.pos == self.site;
            self.failed = !self.done;
            return;
        }
        self.goto.drop_action(ctx);
        if !self.goto.finished() || ctx.unit.pos != self.site { return; }

        // Arrived: the site may have been crowded out since it was chosen.
        let Ctx { world, unit, config, reserved } = *ctx;
        let value = usable_site(world, unit.owner, &config.expansion, reserved, self.site);
        if value.is_some_and(|x| x >= self.value) { return; }
        self.replan(ctx);
    }

    fn finished(&self) -> bool { self.done || self.failed }

    fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        let Some(site) = best_site(ctx) else {
            self.failed = true;
            return false;
        };
        *self = Self::new(ctx, site.pos, site.value);
        !self.failed
    }

    fn clear(&mut self) { self.failed = true; }
}

//////////////////////////////////////////////////////////////////////////////

// Escort: shadow another unit for a bounded number of turns

#[derive(Clone, Debug)]
pub struct Escort {
    pub escortee: UnitId,
    goto: Goto,
    left: i32,
    lost: bool,
}

impl Escort {
    pub fn new<W: World + ?Sized>(ctx: &Ctx<W>, escortee: UnitId, turns: i32) -> Self {
        let goto = Goto::idle(ctx.unit.pos);
        let mut result = Self { escortee, goto, left: turns, lost: false };
        result.retarget(ctx);
        result
    }

    fn retarget<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        match ctx.world.unit(self.escortee) {
            Some(x) if x.owner == ctx.unit.owner => {
                self.goto = Goto::new(ctx, x.pos, false);
                true
            }
            _ => {
                self.lost = true;
                self.goto.clear();
                false
            }
        }
    }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        if self.finished() { return None; }
        self.goto.get_action(ctx).or(Some(ctx.skip()))
    }

    fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        self.left -= 1;
        self.retarget(ctx);
    }

    fn finished(&self) -> bool { self.lost || self.left <= 0 }

    fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        self.retarget(ctx) && self.left > 0
    }

    fn clear(&mut self) { self.lost = true; }
}

//////////////////////////////////////////////////////////////////////////////

// Explore: head for the nearest tile on the edge of the unknown

#[derive(Clone, Debug)]
pub struct Explore {
    goto: Goto,
    auto_continue: bool,
}

impl Explore {
    pub fn new<W: World + ?Sized>(ctx: &Ctx<W>, auto_continue: bool) -> Self {
        let mut result = Self { goto: Goto::idle(ctx.unit.pos), auto_continue };
        result.replan(ctx);
        result
    }

    fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        self.goto.get_action(ctx)
    }

    fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        self.goto.drop_action(ctx);
        if self.goto.finished() && self.auto_continue { self.replan(ctx); }
    }

    fn finished(&self) -> bool { self.goto.finished() }

    fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        self.goto = match nearest_frontier(ctx) {
            Some(x) => Goto::new(ctx, x.target, false),
            None => Goto::idle(ctx.unit.pos),
        };
        !self.goto.finished()
    }

    fn clear(&mut self) { self.goto.clear(); }
}

//////////////////////////////////////////////////////////////////////////////

// Order

#[derive(Clone, Debug)]
pub enum Order {
    Single(Single),
    Goto(Goto),
    Wait(Wait),
    Defend(Defend),
    Attack(Attack),
    Improve(Improve),
    Found(Found),
    Escort(Escort),
    Explore(Explore),
}

macro_rules! dispatch {
    ($self:expr, $x:ident => $body:expr) => {
        match $self {
            Order::Single($x) => $body,
            Order::Goto($x) => $body,
            Order::Wait($x) => $body,
            Order::Defend($x) => $body,
            Order::Attack($x) => $body,
            Order::Improve($x) => $body,
            Order::Found($x) => $body,
            Order::Escort($x) => $body,
            Order::Explore($x) => $body,
        }
    };
}

impl Order {
    // The next action for the unit. Reads state only; never replans.
    pub fn get_action<W: World + ?Sized>(&self, ctx: &Ctx<W>) -> Option<Action> {
        dispatch!(self, x => x.get_action(ctx))
    }

    // Called after the arbiter accepted the last action, with the unit as it
    // stands afterwards.
    pub fn drop_action<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) {
        dispatch!(self, x => x.drop_action(ctx))
    }

    pub fn finished(&self) -> bool {
        dispatch!(self, x => x.finished())
    }

    // Rebuilds the plan from the current world. False if nothing usable is left.
    pub fn replan<W: World + ?Sized>(&mut self, ctx: &Ctx<W>) -> bool {
        dispatch!(self, x => x.replan(ctx))
    }

    pub fn clear(&mut self) {
        dispatch!(self, x => x.clear())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Order::Single(_) => "single",
            Order::Goto(_) => "goto",
            Order::Wait(_) => "wait",
            Order::Defend(_) => "defend",
            Order::Attack(_) => "attack",
            Order::Improve(_) => "improve",
            Order::Found(_) => "found",
            Order::Escort(_) => "escort",
            Order::Explore(_) => "explore",
        }
    }

    // The city site this order has claimed, if any.
    pub fn site(&self) -> Option<Point> {
        match self {
            Order::Found(x) if !x.finished() => Some(x.site),
            _ => None,
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::MapShape;
    use crate::rules::{Resource, Terrain, UnitType};
    use crate::sandbox::Sandbox;
    use crate::world::{Arbiter, FactionId, Relation};

    const LIMIT: usize = 400;

    fn setup() -> (Sandbox, FactionId, FactionId) {
        let mut sandbox = Sandbox::new(MapShape::new(Point(12, 10)), Terrain::Grassland, 17);
        let a = sandbox.add_faction(false);
        let b = sandbox.add_faction(false);
        sandbox.reveal_all(a);
        sandbox.reveal_all(b);
        sandbox.set_relation(a, b, Relation::War);
        (sandbox, a, b)
    }

    fn with_ctx<R, F: FnOnce(&Ctx<Sandbox>) -> R>(sandbox: &Sandbox, id: UnitId, f: F) -> R {
        let config = AIConfig::default();
        let unit = sandbox.unit(id).unwrap().clone();
        f(&Ctx::new(sandbox, &unit, &config, &[]))
    }

    // Runs the order on a world nothing else touches. Returns the number of
    // accepted actions, stopping early if the unit is consumed or killed.
    fn drive(sandbox: &mut Sandbox, id: UnitId, order: &mut Order) -> usize {
        let config = AIConfig::default();
        let mut accepted = 0;
        for _ in 0..LIMIT {
            if order.finished() { return accepted; }
            let Some(unit) = sandbox.unit(id).cloned() else { return accepted };
            if !unit.can_act() {
                assert!(sandbox.submit(unit.owner, Action::EndTurn));
                continue;
            }
            let action = order.get_action(&Ctx::new(&*sandbox, &unit, &config, &[]));
            let Some(action) = action else {
                panic!("{} order gave no action before finishing", order.name());
            };
            assert!(sandbox.submit(unit.owner, action), "rejected: {:?}", action);
            accepted += 1;
            let Some(unit) = sandbox.unit(id).cloned() else { return accepted };
            order.drop_action(&Ctx::new(&*sandbox, &unit, &config, &[]));
        }
        panic!("{} order did not finish", order.name());
    }

    fn jobs(order: &Order) -> Vec<Job> {
        let Order::Improve(x) = order else { panic!("not an improve order") };
        x.jobs().iter().copied().collect()
    }

    fn goto_path(order: &Order) -> Vec<Point> {
        let Order::Goto(x) = order else { panic!("not a goto order") };
        x.path()
    }

    #[test]
    fn test_goto_to_own_position_is_finished() {
        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Warriors", Point(3, 3));
        let order = with_ctx(&sandbox, id, |ctx| Order::Goto(Goto::new(ctx, Point(3, 3), false)));
        assert!(order.finished());
        assert!(goto_path(&order).is_empty());
        assert_eq!(with_ctx(&sandbox, id, |ctx| order.get_action(ctx)), None);
    }

    #[test]
    fn test_goto_reaches_target() {
        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Warriors", Point(1, 1));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Goto(Goto::new(ctx, Point(7, 4), false)));
        assert!(!order.finished());
        assert_eq!(drive(&mut sandbox, id, &mut order), 6);
        assert_eq!(sandbox.unit(id).unwrap().pos, Point(7, 4));
    }

    #[test]
    fn test_goto_avoids_foreign_units_unless_told_not_to() {
        let (mut sandbox, a, b) = setup();
        for y in 0..9 { sandbox.add_unit(b, "Warriors", Point(5, y)); }
        let id = sandbox.add_unit(a, "Warriors", Point(2, 0));

        let order = with_ctx(&sandbox, id, |ctx| Order::Goto(Goto::new(ctx, Point(8, 0), false)));
        assert!(goto_path(&order).contains(&Point(5, 9)));

        let order = with_ctx(&sandbox, id, |ctx| Order::Goto(Goto::new(ctx, Point(8, 0), true)));
        assert_eq!(goto_path(&order).len(), 6);
    }

    #[test]
    fn test_wait_counts_down_and_replan_resets() {
        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Warriors", Point(1, 1));
        let mut order = Order::Wait(Wait::new(3));
        assert_eq!(drive(&mut sandbox, id, &mut order), 3);
        assert!(order.finished());

        assert!(with_ctx(&sandbox, id, |ctx| order.replan(ctx)));
        assert!(!order.finished());
        assert_eq!(with_ctx(&sandbox, id, |ctx| order.get_action(ctx)), Some(Action::Skip { unit: id }));
    }

    #[test]
    fn test_defend_travels_fortifies_and_holds() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(2, 2));
        let id = sandbox.add_unit(a, "Phalanx", Point(6, 5));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Defend(Defend::new(ctx, 3)));
        let Order::Defend(defend) = &order else { unreachable!() };
        assert!(defend.city.is_some());

        // Four moves, one fortify, three holds.
        assert_eq!(drive(&mut sandbox, id, &mut order), 8);
        let unit = sandbox.unit(id).unwrap();
        assert_eq!(unit.pos, Point(2, 2));
        assert!(unit.fortified);
    }

    #[test]
    fn test_defend_without_a_city_holds_in_place() {
        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Phalanx", Point(6, 5));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Defend(Defend::new(ctx, 2)));
        assert_eq!(drive(&mut sandbox, id, &mut order), 3);
        assert_eq!(sandbox.unit(id).unwrap().pos, Point(6, 5));
    }

    #[test]
    fn test_defend_skips_fortify_for_ships() {
        let mut sandbox = Sandbox::new(MapShape::new(Point(8, 8)), Terrain::Ocean, 2);
        let a = sandbox.add_faction(false);
        sandbox.reveal_all(a);
        let id = sandbox.add_unit(a, "Trireme", Point(4, 4));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Defend(Defend::new(ctx, 2)));
        assert_eq!(with_ctx(&sandbox, id, |ctx| order.get_action(ctx)), Some(Action::Skip { unit: id }));
        assert_eq!(drive(&mut sandbox, id, &mut order), 2);
        assert!(!sandbox.unit(id).unwrap().fortified);
    }

    #[test]
    fn test_attack_prefers_adjacent_hostiles() {
        let (mut sandbox, a, b) = setup();
        let id = sandbox.add_unit(a, "Legion", Point(4, 4));
        sandbox.add_unit(b, "Warriors", Point(9, 9));
        sandbox.add_unit(b, "Warriors", Point(5, 5));
        let order = with_ctx(&sandbox, id, |ctx| Order::Attack(Attack::new(ctx)));
        assert!(!order.finished());
        let action = with_ctx(&sandbox, id, |ctx| order.get_action(ctx));
        assert_eq!(action, Some(Action::Move { unit: id, delta: dirs::SE }));
    }

    #[test]
    fn test_attack_terminates() {
        let (mut sandbox, a, b) = setup();
        let id = sandbox.add_unit(a, "Catapult", Point(1, 1));
        sandbox.add_unit(b, "Warriors", Point(6, 4));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Attack(Attack::new(ctx)));
        assert!(!order.finished());
        drive(&mut sandbox, id, &mut order);

        // Peace means nothing is hostile.
        let (mut sandbox, a, b) = setup();
        let id = sandbox.add_unit(a, "Legion", Point(1, 1));
        sandbox.add_unit(b, "Warriors", Point(3, 3));
        sandbox.set_relation(a, b, Relation::Peace);
        let order = with_ctx(&sandbox, id, |ctx| Order::Attack(Attack::new(ctx)));
        assert!(order.finished());
    }

    #[test]
    fn test_improve_terrain_irrigates_near_city() {
        let (mut sandbox, a, _) = setup();
        let city = sandbox.add_city(a, Point(3, 3));
        let id = sandbox.add_unit(a, "Workers", Point(3, 3));
        let kind = ImproveKind::Terrain { city };
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Improve(Improve::new(ctx, kind)));
        let job = jobs(&order)[0];
        assert_eq!(job.improvement, Improvement::Irrigation);
        assert_eq!(sandbox.shape().distance(job.pos, Point(3, 3)), 1);

        drive(&mut sandbox, id, &mut order);
        assert!(sandbox.tile(job.pos).unwrap().has(Improvement::Irrigation));
    }

    #[test]
    fn test_improve_gives_up_on_unreachable_jobs() {
        let mut sandbox = Sandbox::new(MapShape::new(Point(10, 10)), Terrain::Forest, 4);
        let a = sandbox.add_faction(false);
        sandbox.reveal_all(a);
        let city = sandbox.add_city(a, Point(3, 3));
        // The only irrigable tile in range sits on an island.
        sandbox.set_terrain(Point(5, 5), Terrain::Grassland);
        let ring: Vec<_> = sandbox.shape().adjacent(Point(5, 5)).collect();
        for p in ring { sandbox.set_terrain(p, Terrain::Ocean); }
        let id = sandbox.add_unit(a, "Workers", Point(3, 3));

        let kind = ImproveKind::Terrain { city };
        let order = with_ctx(&sandbox, id, |ctx| Order::Improve(Improve::new(ctx, kind)));
        assert!(jobs(&order).is_empty());
        assert!(order.finished());
        assert_eq!(with_ctx(&sandbox, id, |ctx| order.get_action(ctx)), None);
    }

    #[test]
    fn test_connect_cities_builds_missing_roads() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(1, 1));
        sandbox.add_city(a, Point(6, 1));
        sandbox.add_city(a, Point(1, 8));
        let id = sandbox.add_unit(a, "Workers", Point(2, 2));
        let kind = ImproveKind::ConnectCities;
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Improve(Improve::new(ctx, kind)));

        // The closest pair wins: four road tiles between the northern cities.
        let pending = jobs(&order);
        assert_eq!(pending.len(), 4);
        assert!(pending.iter().all(|x| x.improvement == Improvement::Road));

        drive(&mut sandbox, id, &mut order);
        let mover = Mover::for_kind(&sandbox, a, UnitType::get("Workers"));
        assert!(!mover.route_on_roads(Point(1, 1), Point(6, 1), 4096).is_empty());
    }

    #[test]
    fn test_connect_cities_with_existing_road_plans_nothing() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(1, 1));
        sandbox.add_city(a, Point(6, 1));
        for x in 2..6 { sandbox.set_road(Point(x, 2)); }
        let id = sandbox.add_unit(a, "Workers", Point(3, 4));
        let kind = ImproveKind::ConnectCities;
        let order = with_ctx(&sandbox, id, |ctx| Order::Improve(Improve::new(ctx, kind)));
        assert!(jobs(&order).is_empty());
        assert!(order.finished());
    }

    #[test]
    fn test_road_to_target() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(1, 1));
        let id = sandbox.add_unit(a, "Workers", Point(1, 1));
        let kind = ImproveKind::RoadTo { target: Point(1, 4) };
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Improve(Improve::new(ctx, kind)));
        assert_eq!(jobs(&order).len(), 3);
        drive(&mut sandbox, id, &mut order);
        assert!(sandbox.tile(Point(1, 4)).unwrap().road);
    }

    #[test]
    fn test_connect_resource_to_nearest_city() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(1, 1));
        sandbox.add_city(a, Point(9, 8));
        sandbox.set_resource(Point(4, 1), Resource::Iron);
        let id = sandbox.add_unit(a, "Workers", Point(1, 1));
        let kind = ImproveKind::ConnectResource { resource: Point(4, 1) };
        let order = with_ctx(&sandbox, id, |ctx| Order::Improve(Improve::new(ctx, kind)));
        let pending = jobs(&order);
        assert_eq!(pending.len(), 3);
        assert_eq!(pending.last().map(|x| x.pos), Some(Point(4, 1)));
    }

    #[test]
    fn test_found_settles_at_site() {
        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Settlers", Point(1, 1));
        let mut order = with_ctx(&sandbox, id, |ctx| {
            let site = best_site(ctx).unwrap();
            Order::Found(Found::new(ctx, site.pos, site.value))
        });
        assert_eq!(order.site(), Some(Point(2, 2)));
        drive(&mut sandbox, id, &mut order);
        assert!(sandbox.unit(id).is_none());
        let cities = sandbox.faction_cities(a);
        assert_eq!(cities.len(), 1);
        assert_eq!(sandbox.city(cities[0]).unwrap().pos, Point(2, 2));
    }

    #[test]
    fn test_found_replans_when_site_is_taken() {
        let (mut sandbox, a, b) = setup();
        let id = sandbox.add_unit(a, "Settlers", Point(1, 1));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Found(Found::new(ctx, Point(4, 1), 0)));
        sandbox.add_city(b, Point(5, 1));
        drive(&mut sandbox, id, &mut order);

        let cities = sandbox.faction_cities(a);
        assert_eq!(cities.len(), 1);
        let pos = sandbox.city(cities[0]).unwrap().pos;
        assert!(sandbox.shape().distance(pos, Point(5, 1)) >= 3);
    }

    #[test]
    fn test_found_fails_without_a_route() {
        let (mut sandbox, a, _) = setup();
        let site = Point(8, 5);
        let ring: Vec<_> = sandbox.shape().adjacent(site).collect();
        for p in ring { sandbox.set_terrain(p, Terrain::Ocean); }
        let id = sandbox.add_unit(a, "Settlers", Point(2, 2));

        let mut order = with_ctx(&sandbox, id, |ctx| Order::Found(Found::new(ctx, site, 0)));
        assert!(order.finished());
        assert_eq!(order.site(), None);
        assert_eq!(with_ctx(&sandbox, id, |ctx| order.get_action(ctx)), None);

        // Replanning picks a reachable site instead.
        assert!(with_ctx(&sandbox, id, |ctx| order.replan(ctx)));
        assert!(order.site().is_some_and(|x| x != site));
    }

    #[test]
    fn test_escort_follows_then_expires() {
        let (mut sandbox, a, _) = setup();
        let settler = sandbox.add_unit(a, "Settlers", Point(5, 5));
        let id = sandbox.add_unit(a, "Warriors", Point(1, 1));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Escort(Escort::new(ctx, settler, 6)));

        // Four moves to catch up, then two turns at the escortee's side.
        assert_eq!(drive(&mut sandbox, id, &mut order), 6);
        assert_eq!(sandbox.unit(id).unwrap().pos, Point(5, 5));
    }

    #[test]
    fn test_escort_fails_when_escortee_is_gone() {
        let (mut sandbox, a, _) = setup();
        let settler = sandbox.add_unit(a, "Settlers", Point(5, 5));
        let id = sandbox.add_unit(a, "Warriors", Point(1, 1));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Escort(Escort::new(ctx, settler, 6)));
        sandbox.remove_unit(settler);
        assert!(!with_ctx(&sandbox, id, |ctx| order.replan(ctx)));
        assert!(order.finished());
    }

    #[test]
    fn test_explore_uncovers_the_map() {
        let mut sandbox = Sandbox::new(MapShape::new(Point(12, 10)), Terrain::Plains, 3);
        let a = sandbox.add_faction(false);
        let id = sandbox.add_unit(a, "Explorer", Point(0, 0));
        let mut order = with_ctx(&sandbox, id, |ctx| Order::Explore(Explore::new(ctx, true)));
        assert!(!order.finished());
        drive(&mut sandbox, id, &mut order);

        let shape = sandbox.shape();
        let unknown = (0..shape.size.1).flat_map(|y| (0..shape.size.0).map(move |x| Point(x, y)))
            .filter(|&p| !sandbox.is_known(a, p)).count();
        assert_eq!(unknown, 0);
    }

    #[test]
    fn test_single_runs_once() {
        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Warriors", Point(1, 1));
        let mut order = Order::Single(Single::new(Action::Fortify { unit: id }));
        assert_eq!(drive(&mut sandbox, id, &mut order), 1);
        assert!(sandbox.unit(id).unwrap().fortified);
    }

    #[test]
    fn test_clear_always_finishes() {
        let (mut sandbox, a, b) = setup();
        let city = sandbox.add_city(a, Point(2, 2));
        sandbox.add_city(a, Point(8, 2));
        sandbox.add_unit(b, "Warriors", Point(9, 9));
        let settler = sandbox.add_unit(a, "Settlers", Point(5, 5));
        let id = sandbox.add_unit(a, "Workers", Point(4, 4));

        let mut orders = with_ctx(&sandbox, id, |ctx| vec![
            Order::Single(Single::new(ctx.skip())),
            Order::Goto(Goto::new(ctx, Point(9, 1), false)),
            Order::Wait(Wait::new(4)),
            Order::Defend(Defend::new(ctx, 4)),
            Order::Attack(Attack::new(ctx)),
            Order::Improve(Improve::new(ctx, ImproveKind::Terrain { city })),
            Order::Improve(Improve::new(ctx, ImproveKind::ConnectCities)),
            Order::Found(Found::new(ctx, Point(5, 8), 0)),
            Order::Escort(Escort::new(ctx, settler, 5)),
            Order::Explore(Explore::new(ctx, true)),
        ]);
        for order in &mut orders {
            order.clear();
            assert!(order.finished(), "{}", order.name());
            assert!(with_ctx(&sandbox, id, |ctx| order.get_action(ctx)).is_none(), "{}", order.name());
        }
    }
}
