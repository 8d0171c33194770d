//! Track grid: terrain classification, tile variants and procedural layout.

use crate::math::Vector2;
use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// World size of one grid cell.
pub const TILE_SIZE: f32 = 64.0;

/// Both ends derive the race track from this seed when a game starts; the
/// protocol itself never carries map data.
pub const DEFAULT_TRACK_SEED: u64 = 0x5EED_CA55;

/// Generation parameters for the race track. Client and server must feed
/// `generate_seeded` the same values or their maps desync.
pub const TRACK_WIDTH: usize = 32;
pub const TRACK_HEIGHT: usize = 32;
pub const TRACK_ROOMS: usize = 6;

const MIN_ROOM_SIZE: usize = 2;
const MAX_ROOM_SIZE: usize = 4;

/// Terrain classification of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terrain {
    Road,
    Grass,
    Abyss,
}

impl Terrain {
    /// Fraction of top speed available on this terrain.
    pub fn speed_modifier(&self) -> f32 {
        match self {
            Terrain::Road => 1.0,
            Terrain::Grass => 0.2,
            Terrain::Abyss => 0.0,
        }
    }
}

/// Sprite-selection variant of a road cell, derived from which of the four
/// neighbors are also road. Closed set; the renderer maps these to tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileKind {
    Isolated,
    StubTop,
    StubBottom,
    StubLeft,
    StubRight,
    Vertical,
    Horizontal,
    CornerTopLeft,
    CornerTopRight,
    CornerBottomLeft,
    CornerBottomRight,
    TeeLeft,
    TeeRight,
    TeeTop,
    TeeBottom,
    Cross,
}

const MASK_TOP: u8 = 1;
const MASK_BOTTOM: u8 = 2;
const MASK_LEFT: u8 = 4;
const MASK_RIGHT: u8 = 8;

impl TileKind {
    /// Maps a 4-bit neighbor mask (top, bottom, left, right) to its variant.
    pub fn from_mask(mask: u8) -> TileKind {
        match mask & 0x0F {
            0 => TileKind::Isolated,
            1 => TileKind::StubTop,
            2 => TileKind::StubBottom,
            4 => TileKind::StubLeft,
            8 => TileKind::StubRight,
            3 => TileKind::Vertical,
            12 => TileKind::Horizontal,
            5 => TileKind::CornerTopLeft,
            9 => TileKind::CornerTopRight,
            6 => TileKind::CornerBottomLeft,
            10 => TileKind::CornerBottomRight,
            7 => TileKind::TeeLeft,
            11 => TileKind::TeeRight,
            13 => TileKind::TeeTop,
            14 => TileKind::TeeBottom,
            _ => TileKind::Cross,
        }
    }
}

/// Immutable grid of terrain cells. Dimensions are fixed at generation and
/// every cell has exactly one classification.
#[derive(Debug, Clone)]
pub struct TrackMap {
    width: usize,
    height: usize,
    cells: Vec<Terrain>,
    /// Spawn and finish cell, center of the first room.
    finish_cell: (usize, usize),
    /// Ordered checkpoint positions (world coordinates), one lap around.
    route: Vec<Vector2>,
}

impl TrackMap {
    /// Generates a track from an OS-random seed.
    pub fn generate(width: usize, height: usize, room_count: usize) -> TrackMap {
        Self::generate_seeded(width, height, room_count, rand::thread_rng().gen())
    }

    /// Generates a fully connected road circuit with no dead ends: rooms are
    /// carved first, then consecutive room centers (last back to first) are
    /// joined by L-shaped corridors.
    pub fn generate_seeded(width: usize, height: usize, room_count: usize, seed: u64) -> TrackMap {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut cells = vec![Terrain::Grass; width * height];

        // Abyss ring around the playable area
        for x in 0..width {
            cells[x] = Terrain::Abyss;
            cells[(height - 1) * width + x] = Terrain::Abyss;
        }
        for y in 0..height {
            cells[y * width] = Terrain::Abyss;
            cells[y * width + width - 1] = Terrain::Abyss;
        }

        // Carve rooms, remembering their centers as the checkpoint route
        let mut centers: Vec<(usize, usize)> = Vec::with_capacity(room_count);
        for _ in 0..room_count.max(1) {
            let room_w = rng.gen_range(MIN_ROOM_SIZE..=MAX_ROOM_SIZE);
            let room_h = rng.gen_range(MIN_ROOM_SIZE..=MAX_ROOM_SIZE);
            let x0 = rng.gen_range(2..width.saturating_sub(room_w + 2).max(3));
            let y0 = rng.gen_range(2..height.saturating_sub(room_h + 2).max(3));

            for y in y0..y0 + room_h {
                for x in x0..x0 + room_w {
                    cells[y * width + x] = Terrain::Road;
                }
            }
            centers.push((x0 + room_w / 2, y0 + room_h / 2));
        }

        // Connect centers into a closed circuit
        for i in 0..centers.len() {
            let from = centers[i];
            let to = centers[(i + 1) % centers.len()];
            Self::carve_corridor(&mut cells, width, from, to);
        }

        let route = centers
            .iter()
            .map(|&(x, y)| Self::cell_center(x, y))
            .collect();

        debug!(
            "Generated {}x{} track with {} rooms (seed {})",
            width,
            height,
            centers.len(),
            seed
        );

        TrackMap {
            width,
            height,
            cells,
            finish_cell: centers[0],
            route,
        }
    }

    fn carve_corridor(cells: &mut [Terrain], width: usize, from: (usize, usize), to: (usize, usize)) {
        let (x0, y0) = from;
        let (x1, y1) = to;

        for x in x0.min(x1)..=x0.max(x1) {
            cells[y0 * width + x] = Terrain::Road;
        }
        for y in y0.min(y1)..=y0.max(y1) {
            cells[y * width + x1] = Terrain::Road;
        }
    }

    fn cell_center(x: usize, y: usize) -> Vector2 {
        Vector2::new(
            x as f32 * TILE_SIZE + TILE_SIZE / 2.0,
            y as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Terrain at a cell; anywhere off the grid counts as abyss.
    pub fn terrain_at(&self, x: i32, y: i32) -> Terrain {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            return Terrain::Abyss;
        }
        self.cells[y as usize * self.width + x as usize]
    }

    /// Whether a car can occupy the cell at all.
    pub fn is_movable(&self, x: i32, y: i32) -> bool {
        self.terrain_at(x, y) != Terrain::Abyss
    }

    /// Speed modifier for a world-space position.
    pub fn speed_modifier_at(&self, position: &Vector2) -> f32 {
        let x = (position.x / TILE_SIZE).floor() as i32;
        let y = (position.y / TILE_SIZE).floor() as i32;
        self.terrain_at(x, y).speed_modifier()
    }

    /// 4-bit road-neighbor mask for a cell (top, bottom, left, right).
    /// Top is the cell above in world space (y + 1).
    pub fn tile_mask(&self, x: i32, y: i32) -> u8 {
        let mut mask = 0;
        if self.terrain_at(x, y + 1) == Terrain::Road {
            mask |= MASK_TOP;
        }
        if self.terrain_at(x, y - 1) == Terrain::Road {
            mask |= MASK_BOTTOM;
        }
        if self.terrain_at(x - 1, y) == Terrain::Road {
            mask |= MASK_LEFT;
        }
        if self.terrain_at(x + 1, y) == Terrain::Road {
            mask |= MASK_RIGHT;
        }
        mask
    }

    /// Tile variant for a road cell, `None` elsewhere.
    pub fn tile_at(&self, x: i32, y: i32) -> Option<TileKind> {
        if self.terrain_at(x, y) != Terrain::Road {
            return None;
        }
        Some(TileKind::from_mask(self.tile_mask(x, y)))
    }

    pub fn finish_cell(&self) -> (usize, usize) {
        self.finish_cell
    }

    /// World position of the spawn/finish cell center.
    pub fn finish_cell_pos(&self) -> Vector2 {
        Self::cell_center(self.finish_cell.0, self.finish_cell.1)
    }

    /// Checkpoint route, one waypoint per room in circuit order.
    pub fn route(&self) -> &[Vector2] {
        &self.route
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn road_cells(map: &TrackMap) -> Vec<(i32, i32)> {
        let mut cells = Vec::new();
        for y in 0..map.height() as i32 {
            for x in 0..map.width() as i32 {
                if map.terrain_at(x, y) == Terrain::Road {
                    cells.push((x, y));
                }
            }
        }
        cells
    }

    #[test]
    fn test_dimensions_fixed() {
        let map = TrackMap::generate_seeded(40, 30, 6, 1);
        assert_eq!(map.width(), 40);
        assert_eq!(map.height(), 30);
    }

    #[test]
    fn test_every_cell_classified() {
        let map = TrackMap::generate_seeded(32, 32, 5, 2);
        for y in 0..32 {
            for x in 0..32 {
                // terrain_at never fails in-bounds; classification is total
                let _ = map.terrain_at(x, y).speed_modifier();
            }
        }
    }

    #[test]
    fn test_out_of_bounds_is_abyss() {
        let map = TrackMap::generate_seeded(32, 32, 5, 3);
        assert_eq!(map.terrain_at(-1, 0), Terrain::Abyss);
        assert_eq!(map.terrain_at(0, 32), Terrain::Abyss);
        assert!(!map.is_movable(-5, -5));
    }

    #[test]
    fn test_road_network_fully_connected() {
        for seed in [1, 7, 42, 1234] {
            let map = TrackMap::generate_seeded(48, 48, 8, seed);
            let roads = road_cells(&map);
            assert!(!roads.is_empty());

            let start = map.finish_cell();
            let start = (start.0 as i32, start.1 as i32);
            assert_eq!(map.terrain_at(start.0, start.1), Terrain::Road);

            let mut visited = std::collections::HashSet::new();
            let mut queue = VecDeque::new();
            visited.insert(start);
            queue.push_back(start);
            while let Some((x, y)) = queue.pop_front() {
                for (nx, ny) in [(x, y + 1), (x, y - 1), (x - 1, y), (x + 1, y)] {
                    if map.terrain_at(nx, ny) == Terrain::Road && visited.insert((nx, ny)) {
                        queue.push_back((nx, ny));
                    }
                }
            }

            assert_eq!(visited.len(), roads.len(), "seed {} disconnected", seed);
        }
    }

    #[test]
    fn test_no_dead_ends() {
        for seed in [1, 7, 42, 1234] {
            let map = TrackMap::generate_seeded(48, 48, 8, seed);
            for (x, y) in road_cells(&map) {
                let neighbors = [(x, y + 1), (x, y - 1), (x - 1, y), (x + 1, y)]
                    .iter()
                    .filter(|&&(nx, ny)| map.terrain_at(nx, ny) == Terrain::Road)
                    .count();
                assert!(
                    neighbors >= 2,
                    "seed {}: dead end at ({}, {})",
                    seed,
                    x,
                    y
                );
            }
        }
    }

    #[test]
    fn test_generation_deterministic_for_seed() {
        let a = TrackMap::generate_seeded(32, 32, 6, 99);
        let b = TrackMap::generate_seeded(32, 32, 6, 99);
        assert_eq!(a.finish_cell(), b.finish_cell());
        for y in 0..32 {
            for x in 0..32 {
                assert_eq!(a.terrain_at(x, y), b.terrain_at(x, y));
            }
        }
    }

    #[test]
    fn test_tile_mask_matches_neighbors() {
        let map = TrackMap::generate_seeded(32, 32, 6, 5);
        for (x, y) in road_cells(&map) {
            let mask = map.tile_mask(x, y);
            assert_eq!(mask & MASK_TOP != 0, map.terrain_at(x, y + 1) == Terrain::Road);
            assert_eq!(mask & MASK_RIGHT != 0, map.terrain_at(x + 1, y) == Terrain::Road);

            let kind = map.tile_at(x, y).expect("road cell has a tile");
            // No dead ends means no stub or isolated tiles either
            assert!(!matches!(
                kind,
                TileKind::Isolated
                    | TileKind::StubTop
                    | TileKind::StubBottom
                    | TileKind::StubLeft
                    | TileKind::StubRight
            ));
        }
    }

    #[test]
    fn test_tile_kind_from_mask_is_total() {
        for mask in 0..16u8 {
            let _ = TileKind::from_mask(mask);
        }
        assert_eq!(TileKind::from_mask(MASK_TOP | MASK_BOTTOM), TileKind::Vertical);
        assert_eq!(TileKind::from_mask(MASK_LEFT | MASK_RIGHT), TileKind::Horizontal);
        assert_eq!(TileKind::from_mask(0x0F), TileKind::Cross);
    }

    #[test]
    fn test_speed_modifier_lookup() {
        let map = TrackMap::generate_seeded(32, 32, 6, 11);
        let finish = map.finish_cell_pos();
        assert_eq!(map.speed_modifier_at(&finish), 1.0);

        let off_world = Vector2::new(-500.0, -500.0);
        assert_eq!(map.speed_modifier_at(&off_world), 0.0);
    }

    #[test]
    fn test_route_follows_rooms() {
        let map = TrackMap::generate_seeded(32, 32, 6, 13);
        assert_eq!(map.route().len(), 6);
        assert_eq!(map.route()[0], map.finish_cell_pos());
        for waypoint in map.route() {
            assert_eq!(map.speed_modifier_at(waypoint), 1.0);
        }
    }
}
