use std::cmp::max;
use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use slotmap::{SecondaryMap, SlotMap};
use tracing::{debug, trace};

use crate::base::{HashMap, MapShape, Matrix, Point, RNG, sample, weighted};
use crate::evaluate::tile_yield;
use crate::rules::{Advance, BUILDING_DEFENSE, Building, CITY_RADIUS, Improvement};
use crate::rules::{Resource, Terrain, UnitType, Yield, move_cost};
use crate::world::{Action, Arbiter, City, CityId, FactionId, Message, Production, Relation};
use crate::world::{Tile, Unit, UnitId, World, foreign_at, hostile_at};

const UNIT_VISION: i32 = 1;
const CITY_VISION: i32 = 2;
const UNIT_HP: i32 = 10;
const FOOD_PER_SIZE: i32 = 2;
const GROWTH_PER_SIZE: i32 = 10;

const TERRAIN_WEIGHTS: [(i32, Terrain); 7] = [
    (30, Terrain::Grassland),
    (25, Terrain::Plains),
    (10, Terrain::Desert),
    (15, Terrain::Forest),
    (10, Terrain::Hills),
    (5, Terrain::Mountains),
    (5, Terrain::Tundra),
];

const RESOURCES: [Resource; 3] = [Resource::Wheat, Resource::Iron, Resource::Gold];

//////////////////////////////////////////////////////////////////////////////

// Per-faction state

struct Faction {
    barbarian: bool,
    known: Matrix<bool>,
    advances: Vec<&'static Advance>,
    researching: Option<&'static Advance>,
    science: i32,
    messages: VecDeque<Message>,
}

#[derive(Default)]
struct Stock {
    food: i32,
    shields: i32,
}

//////////////////////////////////////////////////////////////////////////////

// Sandbox: an in-memory world that applies the AI's actions

pub struct Sandbox {
    shape: MapShape,
    tiles: Matrix<Tile>,
    units: SlotMap<UnitId, Unit>,
    cities: SlotMap<CityId, City>,
    stocks: SecondaryMap<CityId, Stock>,
    factions: Vec<Faction>,
    relations: HashMap<(FactionId, FactionId), Relation>,
    progress: HashMap<(Point, Improvement), i32>,
    rng: RNG,
    failures: usize,
    submissions: usize,
    founded: usize,
}

impl Sandbox {
    pub fn new(shape: MapShape, terrain: Terrain, seed: u64) -> Self {
        Self {
            shape,
            tiles: Matrix::new(shape.size, Tile::new(terrain)),
            units: SlotMap::with_key(),
            cities: SlotMap::with_key(),
            stocks: SecondaryMap::new(),
            factions: vec![],
            relations: HashMap::default(),
            progress: HashMap::default(),
            rng: RNG::seed_from_u64(seed),
            failures: 0,
            submissions: 0,
            founded: 0,
        }
    }

    // A wrapping map of land and ocean with one start per faction and a few
    // barbarians camped away from every start.
    pub fn generate(size: Point, factions: usize, seed: u64) -> Self {
        let mut result = Self::new(MapShape::wrapping(size), Terrain::Ocean, seed);
        let land = result.landmass();

        for y in 0..size.1 {
            for x in 0..size.0 {
                let p = Point(x, y);
                if !land.get(p) { continue; }
                let terrain = *weighted(&TERRAIN_WEIGHTS, &mut result.rng);
                let resource = result.rng.random_range(0..12) == 0;
                let resource = if resource { Some(*sample(&RESOURCES, &mut result.rng)) } else { None };
                if let Some(tile) = result.tiles.entry_mut(p) {
                    tile.terrain = terrain;
                    tile.resource = resource;
                }
            }
        }

        let mut sites: Vec<Point> = (0..size.1)
            .flat_map(|y| (0..size.0).map(move |x| Point(x, y)))
            .filter(|&p| result.tiles.entry_ref(p).terrain.can_found_city())
            .collect();
        if sites.is_empty() {
            let center = Point(size.0 / 2, size.1 / 2);
            result.set_terrain(center, Terrain::Grassland);
            sites.push(center);
        }

        let spacing = max(size.0, size.1) / (factions as i32 + 1);
        let mut starts: Vec<Point> = vec![];
        for _ in 0..factions {
            let start = result.pick_site(&sites, &starts, spacing);
            starts.push(start);
            let faction = result.add_faction(false);
            for name in ["Settlers", "Warriors", "Workers", "Explorer"] {
                result.add_unit(faction, name, start);
            }
        }

        let barbarians = result.add_faction(true);
        for _ in 0..3 {
            let camp = result.pick_site(&sites, &starts, spacing);
            if starts.iter().any(|&x| result.shape.distance(x, camp) < spacing / 2) { continue; }
            result.add_unit(barbarians, "Warriors", camp);
        }
        result
    }

    // Cellular automaton smoothing of random noise. The poles stay ocean.
    fn landmass(&mut self) -> Matrix<bool> {
        let size = self.shape.size;
        let mut land = Matrix::new(size, false);
        for y in 1..size.1 - 1 {
            for x in 0..size.0 {
                if self.rng.random_range(0..100) < 55 { land.set(Point(x, y), true); }
            }
        }
        for _ in 0..4 {
            let mut next = land.clone();
            for y in 1..size.1 - 1 {
                for x in 0..size.0 {
                    let p = Point(x, y);
                    let count = self.shape.adjacent(p).filter(|&q| land.get(q)).count();
                    next.set(p, count >= 5 || (count == 4 && land.get(p)));
                }
            }
            land = next;
        }
        land
    }

    fn pick_site(&mut self, sites: &[Point], taken: &[Point], spacing: i32) -> Point {
        let mut best = *sample(sites, &mut self.rng);
        for _ in 0..200 {
            if taken.iter().all(|&x| self.shape.distance(x, best) >= spacing) { break; }
            best = *sample(sites, &mut self.rng);
        }
        best
    }

    // Builders

    pub fn add_faction(&mut self, barbarian: bool) -> FactionId {
        let id = FactionId(self.factions.len() as u32);
        self.factions.push(Faction {
            barbarian,
            known: Matrix::new(self.shape.size, false),
            advances: vec![],
            researching: None,
            science: 0,
            messages: VecDeque::new(),
        });
        id
    }

    pub fn reveal_all(&mut self, faction: FactionId) {
        let Some(state) = self.factions.get_mut(faction.0 as usize) else { return };
        state.known.fill(true);
    }

    pub fn add_unit(&mut self, faction: FactionId, name: &str, pos: Point) -> UnitId {
        self.spawn(faction, UnitType::get(name), pos)
    }

    fn spawn(&mut self, faction: FactionId, kind: &'static UnitType, pos: Point) -> UnitId {
        let id = self.units.insert_with_key(|id| Unit {
            id,
            owner: faction,
            kind,
            pos,
            hp: UNIT_HP,
            moves: kind.move_points(),
            road_moves: 0,
            fortified: false,
            transport: None,
        });
        self.reveal(faction, pos, UNIT_VISION);
        id
    }

    pub fn add_city(&mut self, faction: FactionId, pos: Point) -> CityId {
        self.founded += 1;
        let name = format!("{} #{}", faction, self.founded);
        let id = self.cities.insert_with_key(|id| City {
            id,
            owner: faction,
            name,
            pos,
            size: 1,
            production: None,
            buildings: vec![],
        });
        self.stocks.insert(id, Stock::default());
        for p in self.shape.within(pos, 1) {
            let Some(tile) = self.tiles.entry_mut(p) else { continue };
            if p == pos || tile.owner.is_none() { tile.owner = Some(faction); }
            if p == pos { tile.road = true; }
        }
        self.reveal(faction, pos, CITY_VISION);
        id
    }

    // Removes a unit and anything it carries, without telling its owner.
    pub fn remove_unit(&mut self, id: UnitId) -> Option<Unit> {
        for cargo in self.cargo(id) { self.units.remove(cargo); }
        self.units.remove(id)
    }

    pub fn set_terrain(&mut self, p: Point, terrain: Terrain) {
        if let Some(x) = self.tiles.entry_mut(p) { x.terrain = terrain; }
    }

    pub fn set_resource(&mut self, p: Point, resource: Resource) {
        if let Some(x) = self.tiles.entry_mut(p) { x.resource = Some(resource); }
    }

    pub fn set_road(&mut self, p: Point) {
        if let Some(x) = self.tiles.entry_mut(p) { x.road = true; }
    }

    pub fn grant_advance(&mut self, faction: FactionId, name: &str) {
        let advance = Advance::get(name);
        let Some(state) = self.factions.get_mut(faction.0 as usize) else { return };
        if !state.advances.contains(&advance) { state.advances.push(advance); }
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Option<&mut Unit> { self.units.get_mut(id) }

    pub fn city_mut(&mut self, id: CityId) -> Option<&mut City> { self.cities.get_mut(id) }

    // Rejects the next `n` unit actions, whatever they are.
    pub fn fail_next_submissions(&mut self, n: usize) { self.failures = n; }

    pub fn submissions(&self) -> usize { self.submissions }

    // Helpers

    fn faction(&self, faction: FactionId) -> Option<&Faction> {
        self.factions.get(faction.0 as usize)
    }

    fn knows(&self, faction: FactionId, name: &str) -> bool {
        self.faction(faction).is_some_and(|x| x.advances.iter().any(|a| a.name == name))
    }

    fn allowed(&self, faction: FactionId, requires: Option<&str>) -> bool {
        requires.map_or(true, |x| self.knows(faction, x))
    }

    fn reveal(&mut self, faction: FactionId, pos: Point, radius: i32) {
        let points = self.shape.within(pos, radius);
        let Some(state) = self.factions.get_mut(faction.0 as usize) else { return };
        for p in points { state.known.set(p, true); }
    }

    fn tell(&mut self, faction: FactionId, message: Message) {
        let Some(state) = self.factions.get_mut(faction.0 as usize) else { return };
        state.messages.push_back(message);
    }

    fn cargo(&self, transport: UnitId) -> Vec<UnitId> {
        self.units.values().filter(|x| x.transport == Some(transport)).map(|x| x.id).collect()
    }

    // The unit, if `faction` owns it and it can still act this turn.
    fn active(&mut self, faction: FactionId, id: UnitId) -> Option<&mut Unit> {
        self.units.get_mut(id).filter(|x| x.owner == faction && x.can_act())
    }

    fn kill(&mut self, id: UnitId) {
        let Some(unit) = self.remove_unit(id) else { return };
        self.tell(unit.owner, Message::UnitLost(id));
    }

    fn meet(&mut self, faction: FactionId, pos: Point) {
        let mut others = vec![];
        for p in self.shape.within(pos, UNIT_VISION) {
            let cities = self.city_at(p).and_then(|x| self.cities.get(x)).map(|x| x.owner);
            let units = self.units_at(p).into_iter().filter_map(|x| self.units.get(x)).map(|x| x.owner);
            others.extend(cities.into_iter().chain(units).filter(|&x| x != faction));
        }
        others.sort();
        others.dedup();
        for other in others {
            if self.relation(faction, other) != Relation::NoContact { continue; }
            self.set_relation(faction, other, Relation::Peace);
            self.tell(faction, Message::FactionMet(other));
            self.tell(other, Message::FactionMet(faction));
        }
    }

    // Actions

    fn act(&mut self, faction: FactionId, action: Action) -> bool {
        match action {
            Action::EndTurn => { self.end_turn(faction); true }
            Action::Move { unit, delta } => self.move_unit(faction, unit, delta),
            Action::FoundCity { unit } => self.found_city(faction, unit),
            Action::Skip { unit } => {
                let Some(unit) = self.active(faction, unit) else { return false };
                unit.moves = 0;
                unit.road_moves = 0;
                true
            }
            Action::Fortify { unit } => {
                let Some(unit) = self.active(faction, unit) else { return false };
                if unit.kind.is_sea() || unit.transport.is_some() { return false; }
                unit.fortified = true;
                unit.moves = 0;
                unit.road_moves = 0;
                true
            }
            Action::Improve { unit, improvement } => self.improve(faction, unit, improvement),
            Action::Load { unit, transport } => self.load(faction, unit, transport),
            Action::Unload { unit } => self.unload(faction, unit),
            Action::SetProduction { city, production } => {
                let Some(x) = self.cities.get(city) else { return false };
                if x.owner != faction { return false; }
                let ok = match production {
                    Production::Unit(x) => self.buildable_units(city).contains(&x),
                    Production::Building(x) => self.buildable_buildings(city).contains(&x),
                };
                if !ok { return false; }
                let Some(x) = self.cities.get_mut(city) else { return false };
                x.production = Some(production);
                true
            }
            Action::SetResearch { advance } => {
                if !self.researchable(faction).contains(&advance) { return false; }
                let Some(state) = self.factions.get_mut(faction.0 as usize) else { return false };
                state.researching = Some(advance);
                true
            }
        }
    }

    fn move_unit(&mut self, faction: FactionId, id: UnitId, delta: Point) -> bool {
        let Some(unit) = self.active(faction, id) else { return false };
        let (kind, source, aboard) = (unit.kind, unit.pos, unit.transport.is_some());
        if !delta.is_adjacent() { return false; }
        let Some(target) = self.shape.step(source, delta) else { return false };

        if hostile_at(&*self, faction, target) { return self.attack(id, target); }
        if foreign_at(&*self, faction, target) || !self.can_enter(kind, target) { return false; }

        let from = self.tiles.entry_ref(source);
        let to = self.tiles.entry_ref(target);
        let cost = move_cost(from.road && !aboard, to.road, to.terrain);

        let cargo = self.cargo(id);
        let Some(unit) = self.units.get_mut(id) else { return false };
        unit.pos = target;
        unit.moves = max(unit.moves - cost, 0);
        unit.fortified = false;
        unit.transport = None;
        for x in cargo {
            if let Some(x) = self.units.get_mut(x) { x.pos = target; }
        }
        self.reveal(faction, target, UNIT_VISION);
        self.meet(faction, target);
        true
    }

    fn defense_value(&self, unit: &Unit, walls: bool) -> i32 {
        let mut result = 2 * unit.kind.defense;
        if unit.fortified { result = result * 3 / 2; }
        if walls { result *= 2; }
        result
    }

    // The attacker stays put. Only the strongest defender fights.
    fn attack(&mut self, id: UnitId, target: Point) -> bool {
        let Some(attacker) = self.units.get(id) else { return false };
        if attacker.kind.attack <= 0 { return false; }
        let (faction, attack) = (attacker.owner, 2 * attacker.kind.attack);

        let city = self.city_at(target);
        let walls = city.and_then(|x| self.cities.get(x))
            .is_some_and(|x| x.buildings.iter().any(|b| b.has(BUILDING_DEFENSE)));
        let defender = self.units_at(target).into_iter().filter_map(|x| self.units.get(x))
            .map(|x| (self.defense_value(x, walls), x.id))
            .max_by_key(|x| x.0);

        let Some((defense, defender)) = defender else {
            let Some(city) = city else { return false };
            return self.capture(id, city);
        };
        let won = defense == 0 || self.rng.random_range(0..attack + defense) < attack;
        if let Some(x) = self.units.get_mut(id) {
            x.moves = 0;
            x.road_moves = 0;
            x.fortified = false;
        }
        debug!(%faction, ?target, won, "combat");
        self.kill(if won { defender } else { id });
        true
    }

    fn capture(&mut self, id: UnitId, city: CityId) -> bool {
        let Some(unit) = self.units.get_mut(id) else { return false };
        let Some(x) = self.cities.get_mut(city) else { return false };
        let (faction, previous, pos) = (unit.owner, x.owner, x.pos);
        unit.pos = pos;
        unit.moves = 0;
        x.owner = faction;
        x.production = None;
        for p in self.shape.within(pos, 1) {
            let Some(tile) = self.tiles.entry_mut(p) else { continue };
            if tile.owner == Some(previous) { tile.owner = Some(faction); }
        }
        debug!(%faction, %previous, ?pos, "city captured");
        self.tell(previous, Message::CityLost(city));
        self.reveal(faction, pos, CITY_VISION);
        true
    }

    fn found_city(&mut self, faction: FactionId, id: UnitId) -> bool {
        let Some(unit) = self.active(faction, id) else { return false };
        if !unit.kind.is_settler() || unit.transport.is_some() { return false; }
        let pos = unit.pos;
        let tile = self.tiles.entry_ref(pos);
        if !tile.terrain.can_found_city() || tile.owner.is_some_and(|x| x != faction) {
            return false;
        }
        if self.city_at(pos).is_some() { return false; }
        self.remove_unit(id);
        self.add_city(faction, pos);
        true
    }

    fn improve(&mut self, faction: FactionId, id: UnitId, improvement: Improvement) -> bool {
        let Some(unit) = self.active(faction, id) else { return false };
        if !unit.kind.is_worker() { return false; }
        let pos = unit.pos;
        let tile = self.tiles.entry_ref(pos);
        let terrain = tile.terrain;
        if tile.owner.is_some_and(|x| x != faction) || !self.can_improve(pos, improvement) {
            return false;
        }
        if let Some(x) = self.units.get_mut(id) {
            x.moves = 0;
            x.road_moves = 0;
        }

        let progress = self.progress.entry((pos, improvement)).or_insert(0);
        *progress += 1;
        if *progress < improvement.build_turns(terrain) { return true; }
        self.progress.remove(&(pos, improvement));
        if let Some(tile) = self.tiles.entry_mut(pos) {
            match improvement {
                Improvement::Road => tile.road = true,
                x => tile.improvement = Some(x),
            }
        }
        true
    }

    fn load(&mut self, faction: FactionId, id: UnitId, transport: UnitId) -> bool {
        let Some(ship) = self.units.get(transport) else { return false };
        if ship.owner != faction || !ship.kind.is_transport() { return false; }
        let (pos, capacity) = (ship.pos, ship.kind.capacity as usize);
        if self.cargo(transport).len() >= capacity { return false; }

        let shape = self.shape;
        let Some(unit) = self.active(faction, id) else { return false };
        if unit.kind.is_sea() || unit.transport.is_some() { return false; }
        let delta = shape.delta(unit.pos, pos);
        if delta != Point::default() && !delta.is_adjacent() { return false; }
        unit.pos = pos;
        unit.transport = Some(transport);
        unit.moves = 0;
        unit.fortified = false;
        true
    }

    // Only onto land: at sea, a passenger leaves by moving ashore.
    fn unload(&mut self, faction: FactionId, id: UnitId) -> bool {
        let Some(unit) = self.units.get(id) else { return false };
        if unit.owner != faction || unit.transport.is_none() { return false; }
        if !self.tiles.entry_ref(unit.pos).terrain.is_land() { return false; }
        let Some(unit) = self.units.get_mut(id) else { return false };
        unit.transport = None;
        true
    }

    // Turn processing

    fn end_turn(&mut self, faction: FactionId) {
        for unit in self.units.values_mut().filter(|x| x.owner == faction) {
            unit.moves = unit.kind.move_points();
            unit.road_moves = 0;
        }
        let mut cities = self.faction_cities(faction);
        cities.sort();
        let trade: i32 = cities.into_iter().map(|x| self.work_city(x)).sum();
        self.research(faction, trade);
    }

    fn city_yield(&self, city: &City) -> Yield {
        let mut tiles: Vec<Yield> = self.shape.within(city.pos, CITY_RADIUS).into_iter()
            .filter(|&p| p != city.pos)
            .map(|p| self.tiles.entry_ref(p))
            .filter(|x| x.owner.map_or(true, |o| o == city.owner))
            .map(tile_yield)
            .collect();
        tiles.sort_by_key(|x| -(3 * x.food + 2 * x.shields + x.trade));
        let center = tile_yield(self.tiles.entry_ref(city.pos));
        let worked = tiles.into_iter().take(city.size as usize).fold(center, |acc, x| acc + x);
        Yield { shields: max(worked.shields, 1), ..worked }
    }

    // Feeds and grows the city, then advances its production. Returns the
    // trade it produced.
    fn work_city(&mut self, id: CityId) -> i32 {
        let Some(city) = self.cities.get(id) else { return 0 };
        let Yield { food, shields, trade } = self.city_yield(city);
        let (size, production) = (city.size, city.production);

        let Some(stock) = self.stocks.get_mut(id) else { return trade };
        stock.food = max(stock.food + food - FOOD_PER_SIZE * size, 0);
        stock.shields += shields;
        let grow = stock.food >= GROWTH_PER_SIZE * (size + 1);
        if grow { stock.food = 0; }
        let done = production.filter(|x| stock.shields >= x.cost());

        if grow {
            if let Some(city) = self.cities.get_mut(id) { city.size += 1; }
        }
        if let Some(x) = done { self.complete(id, x); }
        trade
    }

    fn complete(&mut self, id: CityId, production: Production) {
        let Some(city) = self.cities.get_mut(id) else { return };
        if let Production::Unit(x) = production {
            // Settlers come out of the population.
            if x.is_settler() {
                if city.size < 2 { return; }
                city.size -= 1;
            }
        }
        city.production = None;
        let (owner, pos) = (city.owner, city.pos);
        if let Some(stock) = self.stocks.get_mut(id) { stock.shields -= production.cost(); }

        let message = match production {
            Production::Unit(kind) => Message::UnitBuilt(id, self.spawn(owner, kind, pos)),
            Production::Building(x) => {
                if let Some(city) = self.cities.get_mut(id) { city.buildings.push(x); }
                Message::BuildingBuilt(id, x)
            }
        };
        trace!(%owner, name = production.name(), "built");
        self.tell(owner, message);
    }

    fn research(&mut self, faction: FactionId, trade: i32) {
        let Some(state) = self.factions.get_mut(faction.0 as usize) else { return };
        state.science += trade + 1;
        let Some(advance) = state.researching else { return };
        if state.science < advance.cost { return; }
        state.science -= advance.cost;
        state.advances.push(advance);
        state.researching = None;
        state.messages.push_back(Message::AdvanceLearned(advance));
    }
}

//////////////////////////////////////////////////////////////////////////////

// World and Arbiter

impl World for Sandbox {
    fn shape(&self) -> MapShape { self.shape }

    fn tile(&self, p: Point) -> Option<&Tile> {
        let p = self.shape.normalize(p)?;
        Some(self.tiles.entry_ref(p))
    }

    fn is_known(&self, faction: FactionId, p: Point) -> bool {
        let Some(p) = self.shape.normalize(p) else { return false };
        self.faction(faction).is_some_and(|x| x.known.get(p))
    }

    fn unit(&self, id: UnitId) -> Option<&Unit> { self.units.get(id) }

    fn units_at(&self, p: Point) -> Vec<UnitId> {
        self.units.values().filter(|x| x.pos == p).map(|x| x.id).collect()
    }

    fn city(&self, id: CityId) -> Option<&City> { self.cities.get(id) }

    fn city_at(&self, p: Point) -> Option<CityId> {
        self.cities.values().find(|x| x.pos == p).map(|x| x.id)
    }

    fn factions(&self) -> Vec<FactionId> {
        (0..self.factions.len()).map(|x| FactionId(x as u32)).collect()
    }

    fn faction_units(&self, faction: FactionId) -> Vec<UnitId> {
        self.units.values().filter(|x| x.owner == faction).map(|x| x.id).collect()
    }

    fn faction_cities(&self, faction: FactionId) -> Vec<CityId> {
        self.cities.values().filter(|x| x.owner == faction).map(|x| x.id).collect()
    }

    fn is_barbarian(&self, faction: FactionId) -> bool {
        self.faction(faction).is_some_and(|x| x.barbarian)
    }

    fn relation(&self, a: FactionId, b: FactionId) -> Relation {
        if a == b { return Relation::Peace; }
        let key = if a < b { (a, b) } else { (b, a) };
        self.relations.get(&key).copied().unwrap_or_default()
    }

    fn can_enter(&self, kind: &'static UnitType, p: Point) -> bool {
        let Some(tile) = self.tile(p) else { return false };
        if kind.is_sea() {
            tile.terrain == Terrain::Ocean || self.city_at(p).is_some()
        } else {
            tile.terrain.is_land()
        }
    }

    fn can_improve(&self, p: Point, improvement: Improvement) -> bool {
        let Some(tile) = self.tile(p) else { return false };
        if !improvement.allowed_on(tile.terrain) || tile.has(improvement) { return false; }
        improvement == Improvement::Road || self.city_at(p).is_none()
    }

    fn buildable_units(&self, city: CityId) -> Vec<&'static UnitType> {
        let Some(city) = self.cities.get(city) else { return vec![] };
        let coastal = self.shape.adjacent(city.pos)
            .any(|p| self.tiles.entry_ref(p).terrain == Terrain::Ocean);
        UnitType::all().iter()
            .filter(|x| self.allowed(city.owner, x.requires))
            .filter(|x| coastal || !x.is_sea())
            .collect()
    }

    fn buildable_buildings(&self, city: CityId) -> Vec<&'static Building> {
        let Some(city) = self.cities.get(city) else { return vec![] };
        Building::all().iter()
            .filter(|x| self.allowed(city.owner, x.requires) && !city.has(*x))
            .collect()
    }

    fn researching(&self, faction: FactionId) -> Option<&'static Advance> {
        self.faction(faction)?.researching
    }

    fn researchable(&self, faction: FactionId) -> Vec<&'static Advance> {
        let Some(state) = self.faction(faction) else { return vec![] };
        Advance::all().iter()
            .filter(|x| !state.advances.contains(x))
            .filter(|x| x.requires.iter().all(|&r| self.knows(faction, r)))
            .collect()
    }
}

impl Arbiter for Sandbox {
    fn submit(&mut self, faction: FactionId, action: Action) -> bool {
        self.submissions += 1;
        if self.failures > 0 && action.unit().is_some() {
            self.failures -= 1;
            trace!(%faction, ?action, "forced rejection");
            return false;
        }
        let accepted = self.act(faction, action);
        if !accepted { trace!(%faction, ?action, "rejected"); }
        accepted
    }

    fn pop_message(&mut self, faction: FactionId) -> Option<Message> {
        self.factions.get_mut(faction.0 as usize)?.messages.pop_front()
    }

    fn set_relation(&mut self, a: FactionId, b: FactionId, relation: Relation) {
        if a == b { return; }
        let key = if a < b { (a, b) } else { (b, a) };
        self.relations.insert(key, relation);
    }
}

//////////////////////////////////////////////////////////////////////////////
