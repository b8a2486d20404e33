use std::collections::VecDeque;

use tracing::error;

use crate::base::{HashMap, MapShape, Point, dirs};
use crate::rules::{ROAD_MOVE_COST, SINGLE_MOVE, UnitType, move_cost};
use crate::world::{FactionId, Unit, World, foreign_at};

//////////////////////////////////////////////////////////////////////////////

// A path runs from the source to the goal, inclusive of both ends. An empty
// path means that there is no route.

pub type Path = Vec<Point>;

//////////////////////////////////////////////////////////////////////////////

// Heap, used for A*

#[derive(Clone, Copy, Eq, PartialEq)] struct AStarHeapIndex(i32);
#[derive(Clone, Copy, Eq, PartialEq)] struct AStarNodeIndex(i32);

const NOT_IN_HEAP: AStarHeapIndex = AStarHeapIndex(-1);
const SOURCE_NODE: AStarNodeIndex = AStarNodeIndex(-1);

struct AStarNode {
    distance: i32,
    index: AStarHeapIndex,
    parent: AStarNodeIndex,
    pos: Point,
    score: i32,
}

#[derive(Default)]
struct AStarHeap {
    nodes: Vec<AStarNode>,
    heap: Vec<AStarNodeIndex>,
}

impl AStarNode {
    fn new(pos: Point, parent: AStarNodeIndex, distance: i32, score: i32) -> Self {
        Self { distance, index: NOT_IN_HEAP, parent, pos, score }
    }
}

impl AStarHeap {
    // Heap operations

    fn is_empty(&self) -> bool { self.heap.is_empty() }

    fn extract_min(&mut self) -> Option<AStarNodeIndex> {
        let mut index = AStarHeapIndex(0);
        let result = *self.heap.first()?;
        self.mut_node(result).index = NOT_IN_HEAP;

        let node = self.heap.pop()?;
        if self.is_empty() { return Some(result); }

        let limit = self.heap.len() as i32;
        let score = self.get_node(node).score;
        let (mut c0, mut c1) = Self::children(index);

        while c0.0 < limit {
            let mut child_index = c0;
            let mut child_score = self.heap_score(c0);
            if c1.0 < limit {
                let c1_score = self.heap_score(c1);
                if c1_score < child_score {
                    (child_index, child_score) = (c1, c1_score);
                }
            }
            if score <= child_score { break; }

            self.heap_move(child_index, index);
            (c0, c1) = Self::children(child_index);
            index = child_index;
        }

        self.mut_node(node).index = index;
        self.set_heap(index, node);
        Some(result)
    }

    fn heapify(&mut self, n: AStarNodeIndex) {
        let score = self.get_node(n).score;
        let mut index = self.get_node(n).index;

        while index.0 > 0 {
            let parent_index = Self::parent(index);
            let parent_score = self.heap_score(parent_index);
            if parent_score <= score { break; }

            self.heap_move(parent_index, index);
            index = parent_index;
        }

        self.mut_node(n).index = index;
        self.set_heap(index, n);
    }

    fn push(&mut self, mut node: AStarNode) -> AStarNodeIndex {
        debug_assert!(node.index == NOT_IN_HEAP);
        node.index = AStarHeapIndex(self.heap.len() as i32);
        let result = AStarNodeIndex(self.nodes.len() as i32);
        self.nodes.push(node);
        self.heap.push(result);
        self.heapify(result);
        result
    }

    // Lower-level helpers

    fn heap_score(&self, h: AStarHeapIndex) -> i32 {
        self.get_node(self.get_heap(h)).score
    }

    fn heap_move(&mut self, from: AStarHeapIndex, to: AStarHeapIndex) {
        let node = self.get_heap(from);
        self.mut_node(node).index = to;
        self.set_heap(to, node);
    }

    fn get_heap(&self, h: AStarHeapIndex) -> AStarNodeIndex {
        self.heap[h.0 as usize]
    }

    fn set_heap(&mut self, h: AStarHeapIndex, n: AStarNodeIndex) {
        self.heap[h.0 as usize] = n;
    }

    fn get_node(&self, n: AStarNodeIndex) -> &AStarNode {
        &self.nodes[n.0 as usize]
    }

    fn mut_node(&mut self, n: AStarNodeIndex) -> &mut AStarNode {
        &mut self.nodes[n.0 as usize]
    }

    fn parent(h: AStarHeapIndex) -> AStarHeapIndex {
        AStarHeapIndex((h.0 - 1) / 2)
    }

    fn children(h: AStarHeapIndex) -> (AStarHeapIndex, AStarHeapIndex) {
        (AStarHeapIndex(2 * h.0 + 1), AStarHeapIndex(2 * h.0 + 2))
    }
}

//////////////////////////////////////////////////////////////////////////////

// A*

// Best-first search from `source` to the first point satisfying `goal`.
//
// `neighbors` appends the points reachable in one step, `cost` prices that
// step, and `heuristic` must not overestimate the remaining cost: once a
// point is extracted from the heap its distance is final and it is never
// reopened. `limit` bounds the number of extractions.
#[allow(non_snake_case)]
pub fn AStar<G, N, C, H>(source: Point, goal: G, mut neighbors: N, cost: C,
                         heuristic: H, limit: i32) -> Path
where G: Fn(Point) -> bool,
      N: FnMut(Point, &mut Vec<Point>),
      C: Fn(Point, Point) -> i32,
      H: Fn(Point) -> i32 {
    let mut map: HashMap<Point, AStarNodeIndex> = HashMap::default();
    let mut heap = AStarHeap::default();
    let mut buffer = vec![];

    let score = heuristic(source);
    let node = AStarNode::new(source, SOURCE_NODE, 0, score);
    map.insert(source, heap.push(node));

    for _ in 0..limit {
        let Some(prev) = heap.extract_min() else { break };
        let prev_pos = heap.get_node(prev).pos;
        let prev_distance = heap.get_node(prev).distance;
        if goal(prev_pos) {
            let mut result = vec![];
            let mut current = heap.get_node(prev);
            while current.parent != SOURCE_NODE {
                result.push(current.pos);
                current = heap.get_node(current.parent);
            }
            result.push(source);
            result.reverse();
            return result;
        }

        buffer.clear();
        neighbors(prev_pos, &mut buffer);

        for &next in &buffer {
            let step = cost(prev_pos, next);
            if step < 0 {
                error!(from = ?prev_pos, to = ?next, step, "negative edge cost; skipping edge");
                continue;
            }
            let distance = prev_distance + step;

            map.entry(next).and_modify(|x| {
                // Points no longer in the heap have a final distance.
                let existing = heap.mut_node(*x);
                if existing.index != NOT_IN_HEAP && existing.distance > distance {
                    existing.score += distance - existing.distance;
                    existing.distance = distance;
                    existing.parent = prev;
                    heap.heapify(*x);
                }
            }).or_insert_with(|| {
                let score = distance + heuristic(next);
                let node = AStarNode::new(next, prev, distance, score);
                heap.push(node)
            });
        }
    }

    vec![]
}

pub fn path_cost<C: Fn(Point, Point) -> i32>(path: &[Point], cost: C) -> i32 {
    path.windows(2).map(|x| cost(x[0], x[1])).sum()
}

//////////////////////////////////////////////////////////////////////////////

// BFS (breadth-first search for the nearest point matching a predicate)

pub struct BFSResult<T> {
    pub path: Path,
    pub target: Point,
    pub found: T,
}

// `target` is called on every visited point, starting with `source`, until it
// returns Some. It may have side effects; whatever it returns is handed back
// to the caller in `found`. It is called at most `range` times.
#[allow(non_snake_case)]
pub fn BFS<N, P, T>(source: Point, mut neighbors: N, range: i32, mut target: P)
        -> Option<BFSResult<T>>
where N: FnMut(Point, &mut Vec<Point>),
      P: FnMut(Point) -> Option<T> {
    let mut parents: HashMap<Point, Point> = HashMap::default();
    let mut queue = VecDeque::new();
    let mut buffer = vec![];
    let mut remaining = range;

    parents.insert(source, source);
    queue.push_back(source);

    while let Some(point) = queue.pop_front() {
        if remaining <= 0 { break; }
        remaining -= 1;

        if let Some(found) = target(point) {
            let mut path = vec![point];
            let mut current = point;
            while current != source {
                current = parents[&current];
                path.push(current);
            }
            path.reverse();
            return Some(BFSResult { path, target: point, found });
        }

        buffer.clear();
        neighbors(point, &mut buffer);
        for &next in &buffer {
            if parents.contains_key(&next) { continue; }
            parents.insert(next, point);
            queue.push_back(next);
        }
    }
    None
}

// Every point reached by a breadth-first flood from `source`, with its step
// count, in visit order. At most `range` points are returned.
#[allow(non_snake_case)]
pub fn BFSMap<N: FnMut(Point, &mut Vec<Point>)>(
        source: Point, mut neighbors: N, range: i32) -> Vec<(Point, i32)> {
    let mut seen: HashMap<Point, i32> = HashMap::default();
    let mut queue = VecDeque::new();
    let mut result = vec![];
    let mut buffer = vec![];

    seen.insert(source, 0);
    queue.push_back((source, 0));

    while let Some((point, steps)) = queue.pop_front() {
        if result.len() as i32 >= range { break; }
        result.push((point, steps));

        buffer.clear();
        neighbors(point, &mut buffer);
        for &next in &buffer {
            if seen.contains_key(&next) { continue; }
            seen.insert(next, steps + 1);
            queue.push_back((next, steps + 1));
        }
    }
    result
}

//////////////////////////////////////////////////////////////////////////////

// Mover: neighbor, cost, and heuristic functions for one unit type

pub struct Mover<'a, W: World + ?Sized> {
    world: &'a W,
    shape: MapShape,
    faction: FactionId,
    kind: &'static UnitType,
    ignore_enemies: bool,
    roads_only: bool,
}

impl<'a, W: World + ?Sized> Mover<'a, W> {
    pub fn new(world: &'a W, unit: &Unit) -> Self {
        Self::for_kind(world, unit.owner, unit.kind)
    }

    pub fn for_kind(world: &'a W, faction: FactionId, kind: &'static UnitType) -> Self {
        let shape = world.shape();
        Self { world, shape, faction, kind, ignore_enemies: false, roads_only: false }
    }

    pub fn ignoring_enemies(mut self) -> Self { self.ignore_enemies = true; self }

    // Terrain, fog, and road checks. Occupancy is checked separately so that
    // a search's own goal can always be entered.
    pub fn passable(&self, p: Point) -> bool {
        let Some(tile) = self.world.tile(p) else { return false };
        if !self.world.is_known(self.faction, p) { return false; }
        if !self.world.can_enter(self.kind, p) { return false; }
        !self.roads_only || tile.road
    }

    pub fn allowed(&self, p: Point) -> bool {
        if !self.passable(p) { return false; }
        self.ignore_enemies || !foreign_at(self.world, self.faction, p)
    }

    pub fn neighbors(&self, p: Point, out: &mut Vec<Point>) {
        self.expand(p, out, None);
    }

    fn expand(&self, p: Point, out: &mut Vec<Point>, goal: Option<Point>) {
        for &dir in &dirs::ALL {
            let Some(next) = self.shape.step(p, dir) else { continue };
            let ok = if Some(next) == goal { self.passable(next) } else { self.allowed(next) };
            if ok { out.push(next); }
        }
    }

    pub fn cost(&self, a: Point, b: Point) -> i32 {
        let (Some(from), Some(to)) = (self.world.tile(a), self.world.tile(b)) else {
            return 3 * SINGLE_MOVE;
        };
        move_cost(from.road, to.road, to.terrain)
    }

    pub fn heuristic(&self, p: Point, target: Point) -> i32 {
        self.shape.distance(p, target) * ROAD_MOVE_COST
    }

    pub fn route(&self, source: Point, target: Point, limit: i32) -> Path {
        if source == target { return vec![source]; }
        AStar(source, |p| p == target,
              |p, out| self.expand(p, out, Some(target)),
              |a, b| self.cost(a, b),
              |p| self.heuristic(p, target), limit)
    }

    // Only an existing road network counts; nothing is planned.
    pub fn route_on_roads(&self, source: Point, target: Point, limit: i32) -> Path {
        let roads = Mover { roads_only: true, ..*self };
        roads.route(source, target, limit)
    }

    pub fn nearest<T, P: FnMut(Point) -> Option<T>>(
            &self, source: Point, range: i32, target: P) -> Option<BFSResult<T>> {
        BFS(source, |p, out| self.neighbors(p, out), range, target)
    }

    pub fn reachable(&self, source: Point, range: i32) -> Vec<(Point, i32)> {
        BFSMap(source, |p, out| self.neighbors(p, out), range)
    }
}

//////////////////////////////////////////////////////////////////////////////
