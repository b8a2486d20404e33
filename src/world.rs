use slotmap::new_key_type;

use crate::base::{MapShape, Point};
use crate::rules::{Advance, Building, Improvement, Resource, Terrain, UnitType};

//////////////////////////////////////////////////////////////////////////////

// Identifiers

new_key_type! {
    pub struct UnitId;
    pub struct CityId;
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FactionId(pub u32);

impl std::fmt::Display for FactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "faction-{}", self.0)
    }
}

//////////////////////////////////////////////////////////////////////////////

// World state, as the AI sees it

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Tile {
    pub terrain: Terrain,
    pub road: bool,
    pub improvement: Option<Improvement>,
    pub resource: Option<Resource>,
    pub owner: Option<FactionId>,
}

impl Tile {
    pub fn new(terrain: Terrain) -> Self {
        Self { terrain, road: false, improvement: None, resource: None, owner: None }
    }

    pub fn has(&self, improvement: Improvement) -> bool {
        match improvement {
            Improvement::Road => self.road,
            x => self.improvement == Some(x),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Unit {
    pub id: UnitId,
    pub owner: FactionId,
    pub kind: &'static UnitType,
    pub pos: Point,
    pub hp: i32,
    pub moves: i32,
    pub road_moves: i32,
    pub fortified: bool,
    pub transport: Option<UnitId>,
}

impl Unit {
    pub fn can_act(&self) -> bool { self.moves > 0 || self.road_moves > 0 }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Production {
    Unit(&'static UnitType),
    Building(&'static Building),
}

impl Production {
    pub fn cost(&self) -> i32 {
        match self {
            Production::Unit(x) => x.cost,
            Production::Building(x) => x.cost,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Production::Unit(x) => x.name,
            Production::Building(x) => x.name,
        }
    }
}

#[derive(Clone, Debug)]
pub struct City {
    pub id: CityId,
    pub owner: FactionId,
    pub name: String,
    pub pos: Point,
    pub size: i32,
    pub production: Option<Production>,
    pub buildings: Vec<&'static Building>,
}

impl City {
    pub fn has(&self, building: &'static Building) -> bool {
        self.buildings.contains(&building)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Relation { #[default] NoContact, Peace, War }

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Message {
    UnitBuilt(CityId, UnitId),
    BuildingBuilt(CityId, &'static Building),
    AdvanceLearned(&'static Advance),
    UnitLost(UnitId),
    CityLost(CityId),
    FactionMet(FactionId),
}

//////////////////////////////////////////////////////////////////////////////

// Action requests, the only thing the AI hands to the arbiter

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    EndTurn,
    Move { unit: UnitId, delta: Point },
    FoundCity { unit: UnitId },
    Skip { unit: UnitId },
    Fortify { unit: UnitId },
    Improve { unit: UnitId, improvement: Improvement },
    Load { unit: UnitId, transport: UnitId },
    Unload { unit: UnitId },
    SetProduction { city: CityId, production: Production },
    SetResearch { advance: &'static Advance },
}

impl Action {
    pub fn unit(&self) -> Option<UnitId> {
        match *self {
            Action::Move { unit, .. } | Action::FoundCity { unit } |
            Action::Skip { unit } | Action::Fortify { unit } |
            Action::Improve { unit, .. } | Action::Load { unit, .. } |
            Action::Unload { unit } => Some(unit),
            Action::EndTurn | Action::SetProduction { .. } | Action::SetResearch { .. } => None,
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Interfaces consumed by the AI

pub trait World {
    fn shape(&self) -> MapShape;
    fn tile(&self, p: Point) -> Option<&Tile>;
    fn is_known(&self, faction: FactionId, p: Point) -> bool;

    fn unit(&self, id: UnitId) -> Option<&Unit>;
    fn units_at(&self, p: Point) -> Vec<UnitId>;
    fn city(&self, id: CityId) -> Option<&City>;
    fn city_at(&self, p: Point) -> Option<CityId>;

    fn factions(&self) -> Vec<FactionId>;
    fn faction_units(&self, faction: FactionId) -> Vec<UnitId>;
    fn faction_cities(&self, faction: FactionId) -> Vec<CityId>;
    fn is_barbarian(&self, faction: FactionId) -> bool;
    fn relation(&self, a: FactionId, b: FactionId) -> Relation;

    // Terrain legality only: occupancy is the caller's concern.
    fn can_enter(&self, kind: &'static UnitType, p: Point) -> bool;
    fn can_improve(&self, p: Point, improvement: Improvement) -> bool;

    fn buildable_units(&self, city: CityId) -> Vec<&'static UnitType>;
    fn buildable_buildings(&self, city: CityId) -> Vec<&'static Building>;
    fn researching(&self, faction: FactionId) -> Option<&'static Advance>;
    fn researchable(&self, faction: FactionId) -> Vec<&'static Advance>;
}

pub trait Arbiter: World {
    fn submit(&mut self, faction: FactionId, action: Action) -> bool;
    fn pop_message(&mut self, faction: FactionId) -> Option<Message>;
    fn set_relation(&mut self, a: FactionId, b: FactionId, relation: Relation);
}

//////////////////////////////////////////////////////////////////////////////

// Derived queries shared by orders and objectives

pub fn is_hostile<W: World + ?Sized>(world: &W, me: FactionId, other: FactionId) -> bool {
    me != other && world.relation(me, other) == Relation::War
}

// Is there something at `p` that `faction` can attack?
pub fn hostile_at<W: World + ?Sized>(world: &W, faction: FactionId, p: Point) -> bool {
    if let Some(city) = world.city_at(p).and_then(|x| world.city(x)) {
        if is_hostile(world, faction, city.owner) { return true; }
    }
    world.units_at(p).into_iter().filter_map(|x| world.unit(x))
        .any(|x| is_hostile(world, faction, x.owner))
}

// Is there a unit or city at `p` owned by anyone but `faction`?
pub fn foreign_at<W: World + ?Sized>(world: &W, faction: FactionId, p: Point) -> bool {
    if let Some(city) = world.city_at(p).and_then(|x| world.city(x)) {
        if city.owner != faction { return true; }
    }
    world.units_at(p).into_iter().filter_map(|x| world.unit(x)).any(|x| x.owner != faction)
}

pub fn own_city_at<W: World + ?Sized>(world: &W, faction: FactionId, p: Point) -> Option<CityId> {
    let id = world.city_at(p)?;
    if world.city(id)?.owner == faction { Some(id) } else { None }
}

pub fn defenders_at<W: World + ?Sized>(world: &W, faction: FactionId, p: Point) -> i32 {
    world.units_at(p).into_iter().filter_map(|x| world.unit(x))
        .filter(|x| x.owner == faction && x.kind.is_military()).count() as i32
}
