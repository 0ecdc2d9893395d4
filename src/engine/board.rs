use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{ALGAE_PROBABILITY, BOARD_HEIGHT, BOARD_WIDTH, POISON_PROBABILITY};

/// Integer cell coordinate, origin in the south-west corner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Point {
        Point { x, y }
    }

    pub const fn offset(self, dx: i32, dy: i32) -> Point {
        Point::new(self.x + dx, self.y + dy)
    }

    /// Largest per-axis distance.
    pub fn chebyshev(self, other: Point) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn manhattan(self, other: Point) -> i32 {
        (self.x - other.x).abs() + (self.y - other.y).abs()
    }
}

/// Content of one board cell. `is_poison` is only meaningful when `has_algae` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tile {
    pub has_algae: bool,
    pub is_poison: bool,
    pub is_wall: bool,
}

/// The square grid. Walls are fixed at construction; algae only changes through
/// [`Board::take_algae`] and [`Board::poison`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
    walls: Vec<Point>,
}

impl Board {
    /// A board without walls or algae.
    pub fn empty(width: i32, height: i32) -> Board {
        assert!(width > 0 && height > 0, "board must not be empty");
        Board {
            width,
            height,
            tiles: vec![Tile::default(); (width * height) as usize],
            walls: Vec::new(),
        }
    }

    /// The standard board with its symmetric walls and no algae.
    pub fn with_walls() -> Board {
        let mut board = Board::empty(BOARD_WIDTH, BOARD_HEIGHT);
        for x in 0..BOARD_WIDTH {
            for y in 0..BOARD_HEIGHT {
                if is_standard_wall(x, y) {
                    board.place_wall(Point::new(x, y));
                }
            }
        }
        board
    }

    /// The standard board with algae drawn from `seed`.
    ///
    /// A cell holds algae with probability [`ALGAE_PROBABILITY`]; algae is poisonous with
    /// probability [`POISON_PROBABILITY`].
    pub fn generate(seed: u64) -> Board {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut board = Board::with_walls();
        for x in 0..BOARD_WIDTH {
            for y in 0..BOARD_HEIGHT {
                let point = Point::new(x, y);
                let roll: f64 = rng.gen();
                if board.is_wall(point) || roll >= ALGAE_PROBABILITY {
                    continue;
                }
                let poison = roll < ALGAE_PROBABILITY * POISON_PROBABILITY;
                board.place_algae(point, poison);
            }
        }
        board
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn in_bounds(&self, p: Point) -> bool {
        (0..self.width).contains(&p.x) && (0..self.height).contains(&p.y)
    }

    pub fn clamp(&self, p: Point) -> Point {
        Point::new(p.x.clamp(0, self.width - 1), p.y.clamp(0, self.height - 1))
    }

    fn index(&self, p: Point) -> Option<usize> {
        self.in_bounds(p)
            .then(|| (p.y * self.width + p.x) as usize)
    }

    pub fn tile(&self, p: Point) -> Option<&Tile> {
        self.index(p).map(|i| &self.tiles[i])
    }

    fn tile_mut(&mut self, p: Point) -> Option<&mut Tile> {
        self.index(p).map(|i| &mut self.tiles[i])
    }

    pub fn is_wall(&self, p: Point) -> bool {
        self.tile(p).is_some_and(|t| t.is_wall)
    }

    pub fn walls(&self) -> &[Point] {
        &self.walls
    }

    /// Turns a cell into a wall, clearing any algae on it.
    pub fn place_wall(&mut self, p: Point) -> bool {
        let Some(tile) = self.tile_mut(p) else {
            return false;
        };
        if tile.is_wall {
            return true;
        }
        *tile = Tile {
            has_algae: false,
            is_poison: false,
            is_wall: true,
        };
        self.walls.push(p);
        true
    }

    /// Puts algae on a cell. Walls and out-of-bounds cells are refused.
    pub fn place_algae(&mut self, p: Point, poison: bool) -> bool {
        match self.tile_mut(p) {
            Some(tile) if !tile.is_wall => {
                tile.has_algae = true;
                tile.is_poison = poison;
                true
            }
            _ => false,
        }
    }

    /// Clears algae from a cell, returning whether it was poisonous.
    pub(crate) fn take_algae(&mut self, p: Point) -> Option<bool> {
        let tile = self.tile_mut(p)?;
        if !tile.has_algae {
            return None;
        }
        let poison = tile.is_poison;
        tile.has_algae = false;
        tile.is_poison = false;
        Some(poison)
    }

    /// Marks healthy algae as poisonous. Returns false when there was nothing to poison.
    pub(crate) fn poison(&mut self, p: Point) -> bool {
        match self.tile_mut(p) {
            Some(tile) if tile.has_algae && !tile.is_poison => {
                tile.is_poison = true;
                true
            }
            _ => false,
        }
    }

    /// Every algae cell in column-major order.
    pub fn algae_cells(&self) -> impl Iterator<Item = (Point, Tile)> + '_ {
        (0..self.width)
            .flat_map(move |x| (0..self.height).map(move |y| Point::new(x, y)))
            .filter_map(|p| self.tile(p).filter(|t| t.has_algae).map(|t| (p, *t)))
    }

    /// Number of non-poisonous algae cells.
    pub fn healthy_algae(&self) -> u32 {
        self.algae_cells().filter(|(_, t)| !t.is_poison).count() as u32
    }
}

fn is_standard_wall(x: i32, y: i32) -> bool {
    let arm = |v: i32| (3..6).contains(&v) || (14..17).contains(&v);
    ((x == 6 || x == 13) && arm(y)) || ((y == 6 || y == 13) && arm(x))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walls_are_symmetric() {
        let board = Board::with_walls();
        assert_eq!(board.walls().len(), 24);
        for &w in board.walls() {
            let mirrored = Point::new(BOARD_WIDTH - 1 - w.x, w.y);
            assert!(board.is_wall(mirrored), "{w:?} has no mirror");
            assert!(board.is_wall(Point::new(w.y, w.x)));
        }
    }

    #[test]
    fn generation_is_reproducible_and_never_puts_algae_on_walls() {
        let a = Board::generate(7);
        let b = Board::generate(7);
        assert_eq!(a, b);
        assert!(a.algae_cells().all(|(p, _)| !a.is_wall(p)));
        assert!(a.algae_cells().count() > 0);
    }

    #[test]
    fn algae_cannot_be_placed_on_a_wall() {
        let mut board = Board::with_walls();
        assert!(!board.place_algae(Point::new(6, 3), false));
        assert!(!board.place_algae(Point::new(20, 0), false));
        assert!(board.place_algae(Point::new(0, 0), true));
    }

    #[test]
    fn take_and_poison() {
        let mut board = Board::empty(5, 5);
        let p = Point::new(2, 2);
        board.place_algae(p, false);
        assert_eq!(board.healthy_algae(), 1);
        assert!(board.poison(p));
        assert!(!board.poison(p));
        assert_eq!(board.healthy_algae(), 0);
        assert_eq!(board.take_algae(p), Some(true));
        assert_eq!(board.take_algae(p), None);
    }

    #[test]
    fn distances() {
        let a = Point::new(1, 1);
        let b = Point::new(3, 0);
        assert_eq!(a.chebyshev(b), 2);
        assert_eq!(a.manhattan(b), 3);
    }
}
