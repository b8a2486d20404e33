use std::cmp::Ordering;

use crate::base::{HashSet, Point};
use crate::config::{AIConfig, ExpansionConfig};
use crate::order::Ctx;
use crate::pathing::{BFSResult, Mover};
use crate::rules::{CITY_RADIUS, UnitType, Yield};
use crate::world::{CityId, FactionId, Tile, Unit, UnitId, World, hostile_at, own_city_at};

//////////////////////////////////////////////////////////////////////////////

// Env: everything an objective reads while scoring one faction's candidates

pub struct Env<'a, W: World + ?Sized> {
    pub world: &'a W,
    pub config: &'a AIConfig,
    pub faction: FactionId,
    // City sites already claimed by this faction's settlers.
    pub reserved: &'a [Point],
    // Units that hold an unfinished order.
    pub busy: &'a HashSet<UnitId>,
    pub hold_turns: i32,
    pub debug: bool,
}

impl<'a, W: World + ?Sized> Env<'a, W> {
    pub fn ctx<'b>(&'b self, unit: &'b Unit) -> Ctx<'b, W> {
        Ctx { world: self.world, unit, config: self.config, reserved: self.reserved }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Unit strength and catalog ordering

pub fn attack_strength(kind: &UnitType) -> i32 { kind.attack }

pub fn defense_strength(kind: &UnitType) -> i32 { kind.defense }

fn catalog_index(kind: &'static UnitType) -> usize {
    UnitType::all().iter().position(|x| std::ptr::eq(x, kind)).unwrap_or(usize::MAX)
}

// Stronger first, then cheaper, then earlier in the catalog.
pub fn compare_units<F: Fn(&UnitType) -> i32>(
        a: &'static UnitType, b: &'static UnitType, strength: F) -> Ordering {
    strength(b).cmp(&strength(a))
        .then(a.cost.cmp(&b.cost))
        .then(catalog_index(a).cmp(&catalog_index(b)))
}

pub fn best_unit<F: Fn(&UnitType) -> i32>(
        candidates: &[&'static UnitType], strength: F) -> Option<&'static UnitType> {
    candidates.iter().copied().filter(|&x| strength(x) > 0)
        .min_by(|&a, &b| compare_units(a, b, &strength))
}

//////////////////////////////////////////////////////////////////////////////

// City sites

pub fn tile_yield(tile: &Tile) -> Yield {
    let mut result = tile.terrain.base_yield();
    if let Some(x) = tile.resource { result = result + x.bonus(); }
    if let Some(x) = tile.improvement { result = result + x.bonus(tile.terrain); }
    if tile.road { result = result + crate::rules::Improvement::Road.bonus(tile.terrain); }
    result
}

pub fn yield_value(config: &ExpansionConfig, x: Yield) -> i32 {
    x.food * config.food_weight + x.shields * config.shield_weight + x.trade * config.trade_weight
}

pub fn tile_value(config: &ExpansionConfig, tile: &Tile) -> i32 {
    yield_value(config, tile_yield(tile))
}

pub fn all_cities<W: World + ?Sized>(world: &W) -> Vec<CityId> {
    let mut result: Vec<_> = world.factions().into_iter()
        .flat_map(|x| world.faction_cities(x)).collect();
    result.sort();
    result
}

// Is `p` within `min_city_distance` of a city or of a reserved site?
pub fn too_close<W: World + ?Sized>(
        world: &W, config: &ExpansionConfig, reserved: &[Point], p: Point) -> bool {
    let shape = world.shape();
    let limit = config.min_city_distance;
    let near = |q: Point| shape.distance(p, q) < limit;
    if reserved.iter().any(|&q| near(q)) { return true; }
    all_cities(world).into_iter().filter_map(|x| world.city(x)).any(|x| near(x.pos))
}

// The value of founding a city at `p`, ignoring other cities. None if `p`
// can't hold a city at all.
pub fn site_value<W: World + ?Sized>(
        world: &W, faction: FactionId, config: &ExpansionConfig, p: Point) -> Option<i32> {
    let tile = world.tile(p)?;
    if !world.is_known(faction, p) || !tile.terrain.can_found_city() { return None; }
    if world.city_at(p).is_some() { return None; }
    if tile.owner.is_some_and(|x| x != faction) { return None; }

    let value = world.shape().within(p, CITY_RADIUS).into_iter()
        .filter(|&q| world.is_known(faction, q))
        .filter_map(|q| world.tile(q))
        .filter(|x| x.owner.map_or(true, |o| o == faction))
        .map(|x| tile_value(config, x)).sum();
    Some(value)
}

// A site is usable when it has a value and is clear of other settlements.
pub fn usable_site<W: World + ?Sized>(
        world: &W, faction: FactionId, config: &ExpansionConfig,
        reserved: &[Point], p: Point) -> Option<i32> {
    if too_close(world, config, reserved, p) { return None; }
    site_value(world, faction, config, p)
}

pub struct Site {
    pub pos: Point,
    pub value: i32,
    pub steps: i32,
}

// The best site reachable by `unit`, trading site value against travel.
pub fn best_site<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<Site> {
    let Ctx { world, unit, config, reserved } = *ctx;
    let expansion = &config.expansion;
    let mover = Mover::new(world, unit);

    let mut best: Option<(i32, Site)> = None;
    for (pos, steps) in mover.reachable(unit.pos, config.search.site_range) {
        let Some(value) = usable_site(world, unit.owner, expansion, reserved, pos) else { continue };
        let score = value - steps * expansion.distance_penalty;
        if best.as_ref().is_some_and(|x| x.0 >= score) { continue; }
        best = Some((score, Site { pos, value, steps }));
    }
    best.map(|x| x.1)
}

//////////////////////////////////////////////////////////////////////////////

// Nearest-match searches

pub fn nearest_own_city<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<BFSResult<CityId>> {
    let Ctx { world, unit, config, .. } = *ctx;
    let faction = unit.owner;
    Mover::new(world, unit).nearest(unit.pos, config.search.bfs_range,
                                    |p| own_city_at(world, faction, p))
}

pub fn nearest_hostile<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<BFSResult<()>> {
    let Ctx { world, unit, config, .. } = *ctx;
    let faction = unit.owner;
    let mover = Mover::new(world, unit).ignoring_enemies();
    mover.nearest(unit.pos, config.search.bfs_range,
                  |p| hostile_at(world, faction, p).then_some(()))
}

// A known tile the unit can stand on, next to at least one unknown tile.
pub fn is_frontier<W: World + ?Sized>(world: &W, faction: FactionId, p: Point) -> bool {
    if !world.is_known(faction, p) { return false; }
    world.shape().adjacent(p).any(|q| !world.is_known(faction, q))
}

pub fn nearest_frontier<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<BFSResult<()>> {
    let Ctx { world, unit, config, .. } = *ctx;
    let (faction, source) = (unit.owner, unit.pos);
    Mover::new(world, unit).nearest(source, config.search.bfs_range,
                                    |p| (p != source && is_frontier(world, faction, p)).then_some(()))
}

// Steps along a path, not counting the start.
pub fn steps(path: &[Point]) -> i32 { path.len().saturating_sub(1) as i32 }

//////////////////////////////////////////////////////////////////////////////
