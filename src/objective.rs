use crate::base::{Point, clamp};
use crate::evaluate::{Env, attack_strength, best_site, best_unit, defense_strength};
use crate::evaluate::{nearest_frontier, nearest_hostile, nearest_own_city, steps, usable_site};
use crate::order::{Attack, Ctx, Defend, Escort, Explore, Found, Improve, ImproveKind, Order};
use crate::rules::{BUILDING_COMMERCE, BUILDING_GRANARY, BUILDING_SCIENCE, CITY_RADIUS, UnitType};
use crate::world::{City, Production, Relation, Unit, UnitId, World, defenders_at};

// Any negative score means the objective has nothing to offer.
pub const NOT_APPLICABLE: i32 = -1;

//////////////////////////////////////////////////////////////////////////////

// Objective

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Objective { Commerce, Defense, Expansion, Exploration, Offense }

impl Objective {
    // Evaluation order. Equal scores go to the earlier objective.
    pub const ALL: [Objective; 5] = [
        Objective::Commerce,
        Objective::Defense,
        Objective::Expansion,
        Objective::Exploration,
        Objective::Offense,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Objective::Commerce => "commerce",
            Objective::Defense => "defense",
            Objective::Expansion => "expansion",
            Objective::Exploration => "exploration",
            Objective::Offense => "offense",
        }
    }

    pub fn score_unit<W: World + ?Sized>(&self, env: &Env<W>, unit: &Unit) -> i32 {
        let ctx = env.ctx(unit);
        match self {
            Objective::Commerce => commerce_score(env, &ctx),
            Objective::Defense => defense_score(&ctx),
            Objective::Expansion => expansion_score(&ctx),
            Objective::Exploration => exploration_score(&ctx),
            Objective::Offense => offense_score(&ctx),
        }
    }

    pub fn issue_order<W: World + ?Sized>(&self, env: &Env<W>, unit: &Unit) -> Option<Order> {
        let ctx = env.ctx(unit);
        let order = match self {
            Objective::Commerce => find_work(&ctx).map(Order::Improve),
            Objective::Defense => Some(defense_order(env, &ctx)),
            Objective::Expansion => expansion_order(&ctx),
            Objective::Exploration => {
                let auto = ctx.config.explore.auto_continue && unit.kind.is_explorer();
                Some(Order::Explore(Explore::new(&ctx, auto)))
            }
            Objective::Offense => Some(Order::Attack(Attack::new(&ctx))),
        };
        order.filter(|x| !x.finished())
    }

    pub fn score_city_production<W: World + ?Sized>(
            &self, env: &Env<W>, city: &City) -> Option<(Production, i32)> {
        match self {
            Objective::Commerce => commerce_production(env, city),
            Objective::Defense => defense_production(env, city),
            Objective::Expansion => expansion_production(env, city),
            Objective::Exploration => exploration_production(env, city),
            Objective::Offense => offense_production(env, city),
        }
    }
}

fn own_units<'a, W: World + ?Sized>(env: &Env<'a, W>) -> Vec<&'a Unit> {
    let world = env.world;
    let mut ids = world.faction_units(env.faction);
    ids.sort();
    ids.into_iter().filter_map(|x| world.unit(x)).collect()
}

fn buildable<W: World + ?Sized, F: Fn(&UnitType) -> bool>(
        env: &Env<W>, city: &City, f: F) -> Vec<&'static UnitType> {
    env.world.buildable_units(city.id).into_iter().filter(|&x| f(x)).collect()
}

//////////////////////////////////////////////////////////////////////////////

// Commerce: workers connect resources and cities by road and improve land

fn find_work<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<Improve> {
    let Ctx { world, unit, config, .. } = *ctx;
    let shape = world.shape();
    let mut cities = world.faction_cities(unit.owner);
    cities.sort();
    let centers: Vec<Point> = cities.iter().filter_map(|&x| world.city(x)).map(|x| x.pos).collect();
    if centers.is_empty() { return None; }

    // The predicate runs the nested road search and hands back its order.
    let resource = ctx.mover().nearest(unit.pos, config.search.bfs_range, |p| {
        world.tile(p)?.resource?;
        if !centers.iter().any(|&c| shape.distance(c, p) <= CITY_RADIUS) { return None; }
        let order = Improve::new(ctx, ImproveKind::ConnectResource { resource: p });
        if order.finished() { None } else { Some(order) }
    });
    if let Some(x) = resource { return Some(x.found); }

    let order = Improve::new(ctx, ImproveKind::ConnectCities);
    if !order.finished() { return Some(order); }

    let city = nearest_own_city(ctx)?;
    let order = Improve::new(ctx, ImproveKind::Terrain { city: city.found });
    if order.finished() { None } else { Some(order) }
}

fn free_worker_nearby<W: World + ?Sized>(env: &Env<W>, ctx: &Ctx<W>) -> Option<UnitId> {
    let Ctx { world, unit, .. } = *ctx;
    let shape = world.shape();
    let radius = env.config.commerce.worker_search_range;
    let range = std::cmp::min(env.config.search.bfs_range, (2 * radius + 1) * (2 * radius + 1));
    let free = |p: Point| {
        if shape.distance(unit.pos, p) > radius { return None; }
        world.units_at(p).into_iter().filter_map(|x| world.unit(x)).find(|x| {
            x.id != unit.id && x.owner == unit.owner &&
            x.kind.is_worker() && !env.busy.contains(&x.id)
        }).map(|x| x.id)
    };
    ctx.mover().nearest(unit.pos, range, free).map(|x| x.found)
}

fn commerce_score<W: World + ?Sized>(env: &Env<W>, ctx: &Ctx<W>) -> i32 {
    if !ctx.unit.kind.is_worker() { return NOT_APPLICABLE; }
    let Some(work) = find_work(ctx) else { return NOT_APPLICABLE };
    let base = ctx.config.commerce.worker_priority;
    if free_worker_nearby(env, ctx).is_some() { return base / 4; }
    if work.is_terrain() { base / 2 } else { base }
}

fn commerce_production<W: World + ?Sized>(env: &Env<W>, city: &City) -> Option<(Production, i32)> {
    let config = &env.config.commerce;
    let cities = env.world.faction_cities(env.faction).len();
    let workers = own_units(env).iter().filter(|x| x.kind.is_worker()).count();

    let unit = if workers < cities {
        buildable(env, city, |x| x.is_worker()).into_iter()
            .min_by_key(|x| x.cost).map(|x| (Production::Unit(x), config.production_priority))
    } else {
        None
    };

    let flags = BUILDING_GRANARY | BUILDING_COMMERCE | BUILDING_SCIENCE;
    let building = env.world.buildable_buildings(city.id).into_iter()
        .filter(|x| x.flags & flags != 0 && !city.has(*x))
        .min_by_key(|x| x.cost)
        .map(|x| (Production::Building(x), config.building_priority));

    match (unit, building) {
        (Some(a), Some(b)) => Some(if a.1 >= b.1 { a } else { b }),
        (a, b) => a.or(b),
    }
}

//////////////////////////////////////////////////////////////////////////////

// Defense: garrison the nearest weakly-held city

fn defense_score<W: World + ?Sized>(ctx: &Ctx<W>) -> i32 {
    let Ctx { world, unit, config, .. } = *ctx;
    let s = defense_strength(unit.kind);
    if s <= 0 || !unit.kind.is_military() { return NOT_APPLICABLE; }
    let Some(city) = nearest_own_city(ctx) else { return NOT_APPLICABLE };

    let mut defenders = defenders_at(world, unit.owner, city.target);
    if unit.pos == city.target { defenders -= 1; }
    let config = &config.defense;
    let score = s * s * config.strength_weight -
                defenders * config.defender_penalty -
                steps(&city.path) * config.distance_penalty;
    clamp(score, config.min_score, config.max_score)
}

// A settler out in the open takes precedence over a garrison.
fn unescorted_settler<W: World + ?Sized>(env: &Env<W>, ctx: &Ctx<W>) -> Option<UnitId> {
    let Ctx { world, unit, config, .. } = *ctx;
    let shape = world.shape();
    own_units(env).into_iter().find(|x| {
        if !x.kind.is_settler() || world.city_at(x.pos).is_some() { return false; }
        if shape.distance(unit.pos, x.pos) > config.defense.escort_range { return false; }
        world.units_at(x.pos).into_iter().filter_map(|y| world.unit(y))
            .all(|y| y.id == unit.id || !y.kind.is_military())
    }).map(|x| x.id)
}

fn defense_order<W: World + ?Sized>(env: &Env<W>, ctx: &Ctx<W>) -> Order {
    if let Some(settler) = unescorted_settler(env, ctx) {
        return Order::Escort(Escort::new(ctx, settler, ctx.config.defense.escort_turns));
    }
    Order::Defend(Defend::new(ctx, env.hold_turns))
}

fn defense_production<W: World + ?Sized>(env: &Env<W>, city: &City) -> Option<(Production, i32)> {
    let config = &env.config.defense;
    let candidates = buildable(env, city, |x| x.is_military() && !x.is_sea());
    let best = best_unit(&candidates, defense_strength)?;
    let defenders = defenders_at(env.world, env.faction, city.pos);
    let score = if defenders < config.min_defenders {
        config.production_priority
    } else {
        config.garrison_priority
    };
    Some((Production::Unit(best), score))
}

//////////////////////////////////////////////////////////////////////////////

// Offense: march on the nearest hostile unit or city

fn offense_score<W: World + ?Sized>(ctx: &Ctx<W>) -> i32 {
    let Ctx { unit, config, .. } = *ctx;
    let s = attack_strength(unit.kind);
    if s <= 0 || !unit.kind.is_military() { return NOT_APPLICABLE; }
    let Some(target) = nearest_hostile(ctx) else { return NOT_APPLICABLE };

    let config = &config.offense;
    let score = s * s * config.strength_weight - steps(&target.path) * config.distance_penalty;
    if score < 0 { NOT_APPLICABLE } else { score }
}

fn offense_production<W: World + ?Sized>(env: &Env<W>, city: &City) -> Option<(Production, i32)> {
    let world = env.world;
    let at_war = world.factions().into_iter()
        .any(|x| x != env.faction && world.relation(env.faction, x) == Relation::War);
    if !at_war { return None; }
    let candidates = buildable(env, city, |x| x.is_military() && !x.is_sea());
    let best = best_unit(&candidates, attack_strength)?;
    Some((Production::Unit(best), env.config.offense.production_priority))
}

//////////////////////////////////////////////////////////////////////////////

// Exploration: push back the fog

fn exploration_score<W: World + ?Sized>(ctx: &Ctx<W>) -> i32 {
    let Ctx { unit, config, .. } = *ctx;
    let kind = unit.kind;
    if kind.is_settler() || kind.is_worker() { return NOT_APPLICABLE; }

    let explore = &config.explore;
    let priority = if kind.is_explorer() {
        explore.priority
    } else {
        explore.priority / explore.military_divisor
    };
    let Some(frontier) = nearest_frontier(ctx) else { return 0 };
    let range = config.search.bfs_range;
    priority * range / (range + steps(&frontier.path))
}

fn exploration_production<W: World + ?Sized>(
        env: &Env<W>, city: &City) -> Option<(Production, i32)> {
    let world = env.world;
    if own_units(env).iter().any(|x| x.kind.is_explorer()) { return None; }
    let radius = env.config.explore.production_radius;
    let unknown = world.shape().within(city.pos, radius).into_iter()
        .any(|p| !world.is_known(env.faction, p));
    if !unknown { return None; }
    let best = buildable(env, city, |x| x.is_explorer()).into_iter().min_by_key(|x| x.cost)?;
    Some((Production::Unit(best), env.config.explore.production_priority))
}

//////////////////////////////////////////////////////////////////////////////

// Expansion: settle good sites clear of other cities

fn first_city<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<i32> {
    let Ctx { world, unit, config, reserved } = *ctx;
    if !world.faction_cities(unit.owner).is_empty() { return None; }
    usable_site(world, unit.owner, &config.expansion, reserved, unit.pos)
}

fn expansion_score<W: World + ?Sized>(ctx: &Ctx<W>) -> i32 {
    let Ctx { unit, config, .. } = *ctx;
    if !unit.kind.is_settler() { return NOT_APPLICABLE; }
    let config = &config.expansion;
    if first_city(ctx).is_some() { return config.first_city_priority; }

    let Some(site) = best_site(ctx) else { return NOT_APPLICABLE };
    clamp(site.value - site.steps * config.distance_penalty, 0, config.max_score)
}

fn expansion_order<W: World + ?Sized>(ctx: &Ctx<W>) -> Option<Order> {
    if !ctx.unit.kind.is_settler() { return None; }
    if let Some(value) = first_city(ctx) {
        return Some(Order::Found(Found::new(ctx, ctx.unit.pos, value)));
    }
    let site = best_site(ctx)?;
    Some(Order::Found(Found::new(ctx, site.pos, site.value)))
}

fn expansion_production<W: World + ?Sized>(
        env: &Env<W>, city: &City) -> Option<(Production, i32)> {
    let config = &env.config.expansion;
    if city.size < config.settler_min_size { return None; }
    let cities = env.world.faction_cities(env.faction).len() as i32;
    let settlers = own_units(env).iter().filter(|x| x.kind.is_settler()).count() as i32;
    if cities + settlers >= config.city_target { return None; }
    let best = buildable(env, city, |x| x.is_settler()).into_iter().min_by_key(|x| x.cost)?;
    Some((Production::Unit(best), config.production_priority))
}

//////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{HashSet, MapShape};
    use crate::config::AIConfig;
    use crate::rules::{Building, Resource, Terrain};
    use crate::sandbox::Sandbox;
    use crate::world::{Arbiter, FactionId};

    fn setup() -> (Sandbox, FactionId, FactionId) {
        let mut sandbox = Sandbox::new(MapShape::new(Point(14, 12)), Terrain::Grassland, 5);
        let a = sandbox.add_faction(false);
        let b = sandbox.add_faction(false);
        sandbox.reveal_all(a);
        sandbox.set_relation(a, b, Relation::War);
        (sandbox, a, b)
    }

    fn score(sandbox: &Sandbox, objective: Objective, id: UnitId) -> i32 {
        let config = AIConfig::default();
        let busy = HashSet::default();
        let unit = sandbox.unit(id).unwrap();
        let env = Env {
            world: sandbox, config: &config, faction: unit.owner, reserved: &[],
            busy: &busy, hold_turns: 3, debug: false,
        };
        objective.score_unit(&env, unit)
    }

    fn issue(sandbox: &Sandbox, objective: Objective, id: UnitId) -> Option<Order> {
        let config = AIConfig::default();
        let busy = HashSet::default();
        let unit = sandbox.unit(id).unwrap();
        let env = Env {
            world: sandbox, config: &config, faction: unit.owner, reserved: &[],
            busy: &busy, hold_turns: 3, debug: false,
        };
        objective.issue_order(&env, unit)
    }

    fn production(sandbox: &Sandbox, objective: Objective, city: crate::world::CityId)
            -> Option<(Production, i32)> {
        let config = AIConfig::default();
        let busy = HashSet::default();
        let city = sandbox.city(city).unwrap();
        let env = Env {
            world: sandbox, config: &config, faction: city.owner, reserved: &[],
            busy: &busy, hold_turns: 3, debug: false,
        };
        objective.score_city_production(&env, city)
    }

    #[test]
    fn test_zero_strength_units_cannot_fight() {
        let (mut sandbox, a, b) = setup();
        sandbox.add_city(a, Point(2, 2));
        sandbox.add_unit(b, "Warriors", Point(6, 6));
        for name in ["Workers", "Explorer"] {
            let id = sandbox.add_unit(a, name, Point(4, 4));
            assert_eq!(score(&sandbox, Objective::Offense, id), NOT_APPLICABLE);
            assert_eq!(score(&sandbox, Objective::Defense, id), NOT_APPLICABLE);
        }
        let id = sandbox.add_unit(a, "Warriors", Point(4, 4));
        assert!(score(&sandbox, Objective::Offense, id) >= 0);
        assert!(score(&sandbox, Objective::Defense, id) >= 0);
    }

    #[test]
    fn test_first_city_gets_the_fixed_priority() {
        for terrain in [Terrain::Grassland, Terrain::Desert, Terrain::Tundra] {
            let mut sandbox = Sandbox::new(MapShape::new(Point(10, 10)), terrain, 1);
            let a = sandbox.add_faction(false);
            sandbox.reveal_all(a);
            let id = sandbox.add_unit(a, "Settlers", Point(5, 5));
            assert_eq!(score(&sandbox, Objective::Expansion, id), 1000);

            let order = issue(&sandbox, Objective::Expansion, id).unwrap();
            assert_eq!(order.site(), Some(Point(5, 5)));
        }
    }

    #[test]
    fn test_later_cities_are_scored_by_site() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(2, 2));
        let id = sandbox.add_unit(a, "Settlers", Point(3, 3));
        let value = score(&sandbox, Objective::Expansion, id);
        let config = AIConfig::default();
        assert!(0 <= value && value <= config.expansion.max_score);
        assert!(value < config.expansion.first_city_priority);

        let site = issue(&sandbox, Objective::Expansion, id).unwrap().site().unwrap();
        assert!(sandbox.shape().distance(site, Point(2, 2)) >= config.expansion.min_city_distance);

        let id = sandbox.add_unit(a, "Warriors", Point(3, 3));
        assert_eq!(score(&sandbox, Objective::Expansion, id), NOT_APPLICABLE);
    }

    #[test]
    fn test_worker_with_a_free_neighbor_scores_a_quarter() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(3, 3));
        let id = sandbox.add_unit(a, "Workers", Point(5, 5));
        let base = AIConfig::default().commerce.worker_priority;
        assert_eq!(score(&sandbox, Objective::Commerce, id), base / 2);

        sandbox.add_unit(a, "Workers", Point(7, 6));
        assert_eq!(score(&sandbox, Objective::Commerce, id), base / 4);

        let Some(Order::Improve(order)) = issue(&sandbox, Objective::Commerce, id) else {
            panic!("expected an improve order");
        };
        assert!(order.is_terrain());
    }

    #[test]
    fn test_commerce_prefers_resources_then_cities() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(2, 2));
        sandbox.add_city(a, Point(8, 2));
        let id = sandbox.add_unit(a, "Workers", Point(3, 3));
        let base = AIConfig::default().commerce.worker_priority;
        assert_eq!(score(&sandbox, Objective::Commerce, id), base);
        let Some(Order::Improve(order)) = issue(&sandbox, Objective::Commerce, id) else {
            panic!("expected an improve order");
        };
        assert_eq!(order.kind, ImproveKind::ConnectCities);

        sandbox.set_resource(Point(3, 4), Resource::Gold);
        let Some(Order::Improve(order)) = issue(&sandbox, Objective::Commerce, id) else {
            panic!("expected an improve order");
        };
        assert_eq!(order.kind, ImproveKind::ConnectResource { resource: Point(3, 4) });
    }

    #[test]
    fn test_road_work_with_a_free_neighbor_scores_a_quarter() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(2, 2));
        sandbox.add_city(a, Point(8, 2));
        let id = sandbox.add_unit(a, "Workers", Point(3, 3));
        sandbox.add_unit(a, "Workers", Point(4, 4));
        let base = AIConfig::default().commerce.worker_priority;
        assert_eq!(score(&sandbox, Objective::Commerce, id), base / 4);
        let Some(Order::Improve(order)) = issue(&sandbox, Objective::Commerce, id) else {
            panic!("expected an improve order");
        };
        assert_eq!(order.kind, ImproveKind::ConnectCities);
    }

    #[test]
    fn test_commerce_without_cities_is_not_applicable() {
        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Workers", Point(5, 5));
        assert_eq!(score(&sandbox, Objective::Commerce, id), NOT_APPLICABLE);
        assert!(issue(&sandbox, Objective::Commerce, id).is_none());
    }

    #[test]
    fn test_defense_drops_with_each_defender() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(2, 2));
        let id = sandbox.add_unit(a, "Phalanx", Point(5, 5));
        let mut last = score(&sandbox, Objective::Defense, id);
        for _ in 0..3 {
            sandbox.add_unit(a, "Warriors", Point(2, 2));
            let next = score(&sandbox, Objective::Defense, id);
            assert!(next < last, "{} !< {}", next, last);
            last = next;
        }

        // Weak units keep dropping once the score goes negative.
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(2, 2));
        let id = sandbox.add_unit(a, "Warriors", Point(3, 3));
        let mut scores = vec![score(&sandbox, Objective::Defense, id)];
        for _ in 0..4 {
            sandbox.add_unit(a, "Warriors", Point(2, 2));
            scores.push(score(&sandbox, Objective::Defense, id));
        }
        assert!(scores.windows(2).all(|x| x[1] < x[0]), "{:?}", scores);
        assert!(scores[4] < 0);
    }

    #[test]
    fn test_defense_escorts_settlers_in_the_field() {
        let (mut sandbox, a, _) = setup();
        sandbox.add_city(a, Point(2, 2));
        let settler = sandbox.add_unit(a, "Settlers", Point(6, 6));
        let id = sandbox.add_unit(a, "Phalanx", Point(5, 5));
        let Some(Order::Escort(order)) = issue(&sandbox, Objective::Defense, id) else {
            panic!("expected an escort order");
        };
        assert_eq!(order.escortee, settler);

        sandbox.add_unit(a, "Warriors", Point(6, 6));
        assert!(matches!(issue(&sandbox, Objective::Defense, id), Some(Order::Defend(_))));
    }

    #[test]
    fn test_offense_drops_with_distance() {
        let mut last = i32::MAX;
        for x in [4, 6, 8, 10] {
            let (mut sandbox, a, b) = setup();
            let id = sandbox.add_unit(a, "Legion", Point(2, 5));
            sandbox.add_unit(b, "Warriors", Point(x, 5));
            let next = score(&sandbox, Objective::Offense, id);
            assert!(0 <= next && next < last, "{} !< {}", next, last);
            last = next;
        }

        let (mut sandbox, a, _) = setup();
        let id = sandbox.add_unit(a, "Legion", Point(2, 5));
        assert_eq!(score(&sandbox, Objective::Offense, id), NOT_APPLICABLE);
    }

    #[test]
    fn test_exploration_scores() {
        let mut sandbox = Sandbox::new(MapShape::new(Point(20, 20)), Terrain::Plains, 2);
        let a = sandbox.add_faction(false);
        let explorer = sandbox.add_unit(a, "Explorer", Point(3, 3));
        let warriors = sandbox.add_unit(a, "Warriors", Point(3, 3));
        let workers = sandbox.add_unit(a, "Workers", Point(3, 3));
        let priority = AIConfig::default().explore.priority;

        let best = score(&sandbox, Objective::Exploration, explorer);
        assert!(0 < best && best <= priority);
        assert!(score(&sandbox, Objective::Exploration, warriors) < best);
        assert_eq!(score(&sandbox, Objective::Exploration, workers), NOT_APPLICABLE);

        sandbox.reveal_all(a);
        assert_eq!(score(&sandbox, Objective::Exploration, explorer), 0);
        assert!(issue(&sandbox, Objective::Exploration, explorer).is_none());
    }

    #[test]
    fn test_defense_production_prefers_cheaper_equal_defenders() {
        let (mut sandbox, a, _) = setup();
        for name in ["Bronze Working", "Iron Working"] { sandbox.grant_advance(a, name); }
        let city = sandbox.add_city(a, Point(3, 3));
        let (choice, value) = production(&sandbox, Objective::Defense, city).unwrap();
        assert_eq!(choice, Production::Unit(UnitType::get("Phalanx")));
        assert_eq!(value, AIConfig::default().defense.production_priority);

        sandbox.add_unit(a, "Warriors", Point(3, 3));
        let (_, value) = production(&sandbox, Objective::Defense, city).unwrap();
        assert_eq!(value, AIConfig::default().defense.garrison_priority);
    }

    #[test]
    fn test_other_production_choices() {
        let (mut sandbox, a, _) = setup();
        sandbox.grant_advance(a, "Pottery");
        let city = sandbox.add_city(a, Point(3, 3));

        let (x, _) = production(&sandbox, Objective::Commerce, city).unwrap();
        assert_eq!(x, Production::Unit(UnitType::get("Workers")));
        sandbox.add_unit(a, "Workers", Point(3, 3));
        let (x, _) = production(&sandbox, Objective::Commerce, city).unwrap();
        assert_eq!(x, Production::Building(Building::get("Granary")));

        let (x, _) = production(&sandbox, Objective::Offense, city).unwrap();
        assert_eq!(x, Production::Unit(UnitType::get("Archers")));

        // The city is size one, too small to give up settlers.
        assert!(production(&sandbox, Objective::Expansion, city).is_none());
        sandbox.city_mut(city).unwrap().size = 3;
        let (x, _) = production(&sandbox, Objective::Expansion, city).unwrap();
        assert_eq!(x, Production::Unit(UnitType::get("Settlers")));

        // Everything is known, so there is nothing for an explorer to do.
        assert!(production(&sandbox, Objective::Exploration, city).is_none());
    }
}
