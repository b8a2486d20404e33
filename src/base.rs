use std::cmp::max;
use std::fmt::Debug;

use rand::Rng;

//////////////////////////////////////////////////////////////////////////////

// Basics

pub type RNG = rand::rngs::StdRng;
pub type HashSet<K> = fxhash::FxHashSet<K>;
pub type HashMap<K, V> = fxhash::FxHashMap<K, V>;

pub fn clamp<T: PartialOrd>(x: T, min: T, max: T) -> T {
    if x < min { min } else if x > max { max } else { x }
}

pub fn sample<'a, T>(xs: &'a [T], rng: &mut RNG) -> &'a T {
    assert!(!xs.is_empty());
    &xs[rng.random_range(0..xs.len())]
}

pub fn weighted<'a, T: Debug>(xs: &'a [(i32, T)], rng: &mut RNG) -> &'a T {
    let total = xs.iter().fold(0, |acc, x| acc + x.0);
    assert!(total > 0, "Total: {}; values: {:?}", total, xs);
    let mut value = rng.random_range(0..total);
    for (weight, choice) in xs {
        value -= weight;
        if value < 0 { return choice; }
    }
    &xs[xs.len() - 1].1
}

//////////////////////////////////////////////////////////////////////////////

// Point and Direction

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Point(pub i32, pub i32);

impl Point {
    pub fn len_l1(&self) -> i32 {
        max(self.0.abs(), self.1.abs())
    }

    pub fn is_adjacent(&self) -> bool {
        *self != dirs::NONE && self.len_l1() == 1
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, other: Point) -> Point {
        Point(self.0 + other.0, self.1 + other.1)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, other: Point) -> Point {
        Point(self.0 - other.0, self.1 - other.1)
    }
}

pub mod dirs {
    use crate::base::Point;

    pub const NONE: Point = Point( 0,  0);
    pub const N:    Point = Point( 0, -1);
    pub const S:    Point = Point( 0,  1);
    pub const E:    Point = Point( 1,  0);
    pub const W:    Point = Point(-1,  0);
    pub const NE:   Point = Point( 1, -1);
    pub const NW:   Point = Point(-1, -1);
    pub const SE:   Point = Point( 1,  1);
    pub const SW:   Point = Point(-1,  1);

    pub const ALL: [Point; 8] = [N, S, E, W, NE, NW, SE, SW];
}

//////////////////////////////////////////////////////////////////////////////

// MapShape: grid bounds, with optional wrapping in either axis

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MapShape {
    pub size: Point,
    pub wrap_x: bool,
    pub wrap_y: bool,
}

impl MapShape {
    pub fn new(size: Point) -> Self {
        Self { size, wrap_x: false, wrap_y: false }
    }

    pub fn wrapping(size: Point) -> Self {
        Self { size, wrap_x: true, wrap_y: false }
    }

    // Maps a point onto the grid, or returns None if it falls off an edge
    // that doesn't wrap.
    pub fn normalize(&self, p: Point) -> Option<Point> {
        let Point(sx, sy) = self.size;
        let x = if self.wrap_x { p.0.rem_euclid(sx) } else { p.0 };
        let y = if self.wrap_y { p.1.rem_euclid(sy) } else { p.1 };
        if 0 <= x && x < sx && 0 <= y && y < sy { Some(Point(x, y)) } else { None }
    }

    pub fn step(&self, p: Point, dir: Point) -> Option<Point> {
        self.normalize(p + dir)
    }

    // The shortest vector from `a` to `b`, taking wrapping into account.
    pub fn delta(&self, a: Point, b: Point) -> Point {
        let wrap = |d: i32, size: i32, wraps: bool| {
            if !wraps || size == 0 { return d; }
            let d = d.rem_euclid(size);
            if 2 * d > size { d - size } else { d }
        };
        let d = b - a;
        Point(wrap(d.0, self.size.0, self.wrap_x), wrap(d.1, self.size.1, self.wrap_y))
    }

    // Number of 8-connected steps between two points.
    pub fn distance(&self, a: Point, b: Point) -> i32 {
        self.delta(a, b).len_l1()
    }

    pub fn adjacent(&self, p: Point) -> impl Iterator<Item = Point> + '_ {
        dirs::ALL.iter().filter_map(move |&dir| self.step(p, dir))
    }

    // All grid points within `radius` 8-connected steps of `p`, in a fixed order.
    pub fn within(&self, p: Point, radius: i32) -> Vec<Point> {
        let mut result = vec![];
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let Some(x) = self.normalize(p + Point(dx, dy)) else { continue };
                if !result.contains(&x) { result.push(x); }
            }
        }
        result
    }
}

//////////////////////////////////////////////////////////////////////////////

// Matrix

#[derive(Clone, Default)]
pub struct Matrix<T> {
    pub data: Vec<T>,
    pub size: Point,
    pub default: T,
}

impl<T: Clone> Matrix<T> {
    pub fn new(size: Point, value: T) -> Self {
        assert!(0 <= size.0);
        assert!(0 <= size.1);
        let mut data = Vec::new();
        data.resize((size.0 * size.1) as usize, value.clone());
        Self { data, size, default: value }
    }

    pub fn get(&self, point: Point) -> T {
        let Some(x) = self.index(point) else { return self.default.clone(); };
        self.data[x].clone()
    }

    pub fn set(&mut self, point: Point, value: T) {
        let Some(x) = self.index(point) else { return; };
        self.data[x] = value;
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn entry_ref(&self, point: Point) -> &T {
        let Some(x) = self.index(point) else { return &self.default; };
        &self.data[x]
    }

    pub fn entry_mut(&mut self, point: Point) -> Option<&mut T> {
        let x = self.index(point)?;
        Some(&mut self.data[x])
    }

    #[inline(always)]
    pub fn contains(&self, point: Point) -> bool {
        let Point(px, py) = point;
        let Point(sx, sy) = self.size;
        0 <= px && px < sx && 0 <= py && py < sy
    }

    #[inline(always)]
    pub fn index(&self, point: Point) -> Option<usize> {
        if !self.contains(point) { return None; }
        Some((point.0 + point.1 * self.size.0) as usize)
    }
}

//////////////////////////////////////////////////////////////////////////////
