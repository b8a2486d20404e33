use lazy_static::lazy_static;

use crate::base::HashMap;

//////////////////////////////////////////////////////////////////////////////

// Movement

// Move points are counted in thirds, so that a road step can cost one third
// of a regular step.
pub const SINGLE_MOVE: i32 = 3;
pub const ROAD_MOVE_COST: i32 = 1;

// Cities work the tiles within this many 8-connected steps of their center.
pub const CITY_RADIUS: i32 = 2;

//////////////////////////////////////////////////////////////////////////////

// Terrain

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Terrain { Ocean, Grassland, Plains, Desert, Forest, Hills, Mountains, Tundra }

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Yield {
    pub food: i32,
    pub shields: i32,
    pub trade: i32,
}

impl std::ops::Add for Yield {
    type Output = Yield;
    fn add(self, other: Yield) -> Yield {
        Yield {
            food: self.food + other.food,
            shields: self.shields + other.shields,
            trade: self.trade + other.trade,
        }
    }
}

impl Terrain {
    pub const ALL: [Terrain; 8] = [
        Terrain::Ocean, Terrain::Grassland, Terrain::Plains, Terrain::Desert,
        Terrain::Forest, Terrain::Hills, Terrain::Mountains, Terrain::Tundra,
    ];

    pub fn is_land(&self) -> bool { *self != Terrain::Ocean }

    pub fn move_cost(&self) -> i32 {
        match self {
            Terrain::Forest | Terrain::Hills => 2,
            Terrain::Mountains => 3,
            _ => 1,
        }
    }

    pub fn base_yield(&self) -> Yield {
        let (food, shields, trade) = match self {
            Terrain::Ocean     => (1, 0, 2),
            Terrain::Grassland => (2, 0, 0),
            Terrain::Plains    => (1, 1, 0),
            Terrain::Desert    => (0, 1, 0),
            Terrain::Forest    => (1, 2, 0),
            Terrain::Hills     => (1, 0, 0),
            Terrain::Mountains => (0, 1, 0),
            Terrain::Tundra    => (1, 0, 0),
        };
        Yield { food, shields, trade }
    }

    pub fn can_found_city(&self) -> bool {
        self.is_land() && *self != Terrain::Mountains
    }
}

//////////////////////////////////////////////////////////////////////////////

// Terrain improvements and resources

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Improvement { Road, Irrigation, Mine }

impl Improvement {
    // Worker-turns needed to finish this improvement on the given terrain.
    pub fn build_turns(&self, terrain: Terrain) -> i32 {
        let base = match self {
            Improvement::Road => 2,
            Improvement::Irrigation => 5,
            Improvement::Mine => 10,
        };
        base * terrain.move_cost()
    }

    pub fn allowed_on(&self, terrain: Terrain) -> bool {
        match self {
            Improvement::Road => terrain.is_land(),
            Improvement::Irrigation => matches!(terrain,
                Terrain::Grassland | Terrain::Plains | Terrain::Desert | Terrain::Hills),
            Improvement::Mine => matches!(terrain,
                Terrain::Desert | Terrain::Hills | Terrain::Mountains),
        }
    }

    pub fn bonus(&self, terrain: Terrain) -> Yield {
        if !self.allowed_on(terrain) { return Yield::default(); }
        match self {
            Improvement::Road => {
                let trade = matches!(terrain,
                    Terrain::Grassland | Terrain::Plains | Terrain::Desert) as i32;
                Yield { trade, ..Default::default() }
            }
            Improvement::Irrigation => Yield { food: 1, ..Default::default() },
            Improvement::Mine => {
                let shields = if terrain == Terrain::Hills { 3 } else { 1 };
                Yield { shields, ..Default::default() }
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Resource { Wheat, Iron, Gold }

impl Resource {
    pub fn bonus(&self) -> Yield {
        match self {
            Resource::Wheat => Yield { food: 2, ..Default::default() },
            Resource::Iron  => Yield { shields: 2, ..Default::default() },
            Resource::Gold  => Yield { trade: 3, ..Default::default() },
        }
    }
}

//////////////////////////////////////////////////////////////////////////////

// Unit types

pub const UNIT_SETTLER: u32 = 1 << 0;
pub const UNIT_WORKER: u32 = 1 << 1;
pub const UNIT_EXPLORER: u32 = 1 << 2;
pub const UNIT_SEA: u32 = 1 << 3;
pub const UNIT_TRANSPORT: u32 = 1 << 4;

const UNIT_CIVILIAN: u32 = UNIT_SETTLER | UNIT_WORKER | UNIT_EXPLORER;

pub struct UnitType {
    pub name: &'static str,
    pub attack: i32,
    pub defense: i32,
    pub moves: i32,
    pub cost: i32,
    pub capacity: i32,
    pub flags: u32,
    pub requires: Option<&'static str>,
}

impl UnitType {
    pub fn get(name: &str) -> &'static UnitType {
        UNIT_INDEX.get(name).map(|&i| &UNIT_TYPES[i])
            .unwrap_or_else(|| panic!("Unknown unit type: {}", name))
    }

    pub fn all() -> &'static [UnitType] { &UNIT_TYPES }

    pub fn is_settler(&self) -> bool { self.flags & UNIT_SETTLER != 0 }
    pub fn is_worker(&self) -> bool { self.flags & UNIT_WORKER != 0 }
    pub fn is_explorer(&self) -> bool { self.flags & UNIT_EXPLORER != 0 }
    pub fn is_sea(&self) -> bool { self.flags & UNIT_SEA != 0 }
    pub fn is_transport(&self) -> bool { self.flags & UNIT_TRANSPORT != 0 }

    pub fn is_military(&self) -> bool {
        self.flags & UNIT_CIVILIAN == 0 && (self.attack > 0 || self.defense > 0)
    }

    pub fn move_points(&self) -> i32 { self.moves * SINGLE_MOVE }
}

impl std::fmt::Debug for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl Eq for &'static UnitType {}

impl PartialEq for &'static UnitType {
    fn eq(&self, next: &&'static UnitType) -> bool {
        *self as *const UnitType == *next as *const UnitType
    }
}

lazy_static! {
    static ref UNIT_TYPES: Vec<UnitType> = {
        let items = [
            // name,       a, d, m, cost, cap, flags,                       requires
            ("Settlers",   0, 1, 1, 30,   0,   UNIT_SETTLER,                None),
            ("Workers",    0, 0, 1, 20,   0,   UNIT_WORKER,                 None),
            ("Explorer",   0, 0, 3, 20,   0,   UNIT_EXPLORER,               None),
            ("Warriors",   1, 1, 1, 10,   0,   0,                           None),
            ("Phalanx",    1, 2, 1, 20,   0,   0,                           Some("Bronze Working")),
            ("Archers",    3, 2, 1, 30,   0,   0,                           None),
            ("Horsemen",   2, 1, 2, 20,   0,   0,                           Some("Horseback Riding")),
            ("Legion",     4, 2, 1, 40,   0,   0,                           Some("Iron Working")),
            ("Catapult",   6, 1, 1, 40,   0,   0,                           Some("Mathematics")),
            ("Trireme",    1, 1, 3, 40,   2,   UNIT_SEA | UNIT_TRANSPORT,   None),
        ];
        items.into_iter().map(|(name, attack, defense, moves, cost, capacity, flags, requires)| {
            UnitType { name, attack, defense, moves, cost, capacity, flags, requires }
        }).collect()
    };

    static ref UNIT_INDEX: HashMap<&'static str, usize> =
        UNIT_TYPES.iter().enumerate().map(|(i, x)| (x.name, i)).collect();
}

//////////////////////////////////////////////////////////////////////////////

// City buildings

pub const BUILDING_GRANARY: u32 = 1 << 0;
pub const BUILDING_COMMERCE: u32 = 1 << 1;
pub const BUILDING_SCIENCE: u32 = 1 << 2;
pub const BUILDING_DEFENSE: u32 = 1 << 3;
pub const BUILDING_CONTENT: u32 = 1 << 4;

pub struct Building {
    pub name: &'static str,
    pub cost: i32,
    pub flags: u32,
    pub requires: Option<&'static str>,
}

impl Building {
    pub fn get(name: &str) -> &'static Building {
        BUILDING_INDEX.get(name).map(|&i| &BUILDINGS[i])
            .unwrap_or_else(|| panic!("Unknown building: {}", name))
    }

    pub fn all() -> &'static [Building] { &BUILDINGS }

    pub fn has(&self, flag: u32) -> bool { self.flags & flag != 0 }
}

impl std::fmt::Debug for Building {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl Eq for &'static Building {}

impl PartialEq for &'static Building {
    fn eq(&self, next: &&'static Building) -> bool {
        *self as *const Building == *next as *const Building
    }
}

lazy_static! {
    static ref BUILDINGS: Vec<Building> = {
        let items = [
            ("Temple",     30, BUILDING_CONTENT,  None),
            ("Granary",    40, BUILDING_GRANARY,  Some("Pottery")),
            ("City Walls", 60, BUILDING_DEFENSE,  Some("Masonry")),
            ("Marketplace", 60, BUILDING_COMMERCE, Some("Currency")),
            ("Library",    60, BUILDING_SCIENCE,  Some("Writing")),
        ];
        items.into_iter().map(|(name, cost, flags, requires)| {
            Building { name, cost, flags, requires }
        }).collect()
    };

    static ref BUILDING_INDEX: HashMap<&'static str, usize> =
        BUILDINGS.iter().enumerate().map(|(i, x)| (x.name, i)).collect();
}

//////////////////////////////////////////////////////////////////////////////

// Advances

pub struct Advance {
    pub name: &'static str,
    pub cost: i32,
    pub requires: &'static [&'static str],
}

impl Advance {
    pub fn get(name: &str) -> &'static Advance {
        ADVANCES.iter().find(|x| x.name == name)
            .unwrap_or_else(|| panic!("Unknown advance: {}", name))
    }

    pub fn all() -> &'static [Advance] { &ADVANCES }
}

impl std::fmt::Debug for Advance {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl Eq for &'static Advance {}

impl PartialEq for &'static Advance {
    fn eq(&self, next: &&'static Advance) -> bool {
        *self as *const Advance == *next as *const Advance
    }
}

static ADVANCES: [Advance; 10] = [
    Advance { name: "Alphabet",         cost: 20, requires: &[] },
    Advance { name: "Bronze Working",   cost: 20, requires: &[] },
    Advance { name: "Horseback Riding", cost: 20, requires: &[] },
    Advance { name: "Masonry",          cost: 20, requires: &[] },
    Advance { name: "Pottery",          cost: 20, requires: &[] },
    Advance { name: "Currency",         cost: 40, requires: &["Bronze Working"] },
    Advance { name: "Writing",          cost: 40, requires: &["Alphabet"] },
    Advance { name: "Iron Working",     cost: 50, requires: &["Bronze Working"] },
    Advance { name: "The Wheel",        cost: 40, requires: &["Horseback Riding"] },
    Advance { name: "Mathematics",      cost: 60, requires: &["Alphabet", "Masonry"] },
];

//////////////////////////////////////////////////////////////////////////////

// Movement costs

pub fn move_cost(from_road: bool, to_road: bool, to: Terrain) -> i32 {
    if from_road && to_road { return ROAD_MOVE_COST; }
    to.move_cost() * SINGLE_MOVE
}

//////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lookups() {
        let settlers = UnitType::get("Settlers");
        assert!(settlers.is_settler());
        assert!(!settlers.is_military());
        assert!(UnitType::get("Legion").is_military());
        assert!(UnitType::get("Trireme").is_transport());
        assert_eq!(Building::get("Granary").requires, Some("Pottery"));
        assert_eq!(Advance::get("Mathematics").requires.len(), 2);
    }

    #[test]
    fn test_move_costs() {
        assert_eq!(move_cost(true, true, Terrain::Mountains), ROAD_MOVE_COST);
        assert_eq!(move_cost(false, true, Terrain::Hills), 2 * SINGLE_MOVE);
        assert_eq!(move_cost(true, false, Terrain::Grassland), SINGLE_MOVE);
    }

    #[test]
    fn test_improvement_bonuses() {
        assert_eq!(Improvement::Mine.bonus(Terrain::Hills).shields, 3);
        assert_eq!(Improvement::Mine.bonus(Terrain::Grassland), Yield::default());
        assert_eq!(Improvement::Road.bonus(Terrain::Plains).trade, 1);
        assert!(!Improvement::Road.allowed_on(Terrain::Ocean));
    }
}
