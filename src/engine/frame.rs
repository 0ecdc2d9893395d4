use super::{Direction, Point};

/// The coordinate frame a player sees the board in.
///
/// With [`Frame::MirrorX`] the player's view is reflected across the vertical axis, so both
/// players see their own banks on the same side of the board. The transform is an
/// involution: the same call maps board coordinates to player coordinates and back.
/// It is applied to every position in that player's view and to every spawn location and
/// direction that player sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frame {
    #[default]
    Identity,
    MirrorX,
}

impl Frame {
    pub fn point(self, p: Point, width: i32) -> Point {
        match self {
            Frame::Identity => p,
            Frame::MirrorX => Point::new(width - 1 - p.x, p.y),
        }
    }

    pub fn direction(self, d: Direction) -> Direction {
        match self {
            Frame::Identity => d,
            Frame::MirrorX => d.mirrored(),
        }
    }
}
