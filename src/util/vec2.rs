use serde::{Deserialize, Serialize};

/// World-space position of a body or camera, in map units
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Tile coordinates of this position on a grid of `tile_size` units.
    /// Negative positions floor towards the previous tile.
    pub fn to_tile(&self, tile_size: f32) -> (i32, i32) {
        (
            (self.x / tile_size).floor() as i32,
            (self.y / tile_size).floor() as i32,
        )
    }
}
