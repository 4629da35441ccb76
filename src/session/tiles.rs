//! Tile splitting and ordering.

use crate::params::TileOrder;

/// A rectangular region of the render buffer, in buffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    /// Position of the tile in render order.
    pub index: u32,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Tile {
    pub fn pixel_count(&self) -> usize {
        self.w as usize * self.h as usize
    }

    fn center(&self) -> (f32, f32) {
        (
            self.x as f32 + self.w as f32 * 0.5,
            self.y as f32 + self.h as f32 * 0.5,
        )
    }
}

/// Splits a `width` x `height` buffer into tiles of at most `tile_size`,
/// ordered by `order`. Row 0 is the top of the image.
pub fn split(width: u32, height: u32, tile_size: (u32, u32), order: TileOrder) -> Vec<Tile> {
    let (tw, th) = (tile_size.0.max(1), tile_size.1.max(1));
    let mut tiles = Vec::new();
    for y in (0..height).step_by(th as usize) {
        for x in (0..width).step_by(tw as usize) {
            tiles.push(Tile {
                index: 0,
                x,
                y,
                w: tw.min(width - x),
                h: th.min(height - y),
            });
        }
    }

    let (cx, cy) = (width as f32 * 0.5, height as f32 * 0.5);
    match order {
        TileOrder::LeftToRight => tiles.sort_by_key(|t| (t.x, t.y)),
        TileOrder::RightToLeft => tiles.sort_by_key(|t| (std::cmp::Reverse(t.x), t.y)),
        TileOrder::TopToBottom => tiles.sort_by_key(|t| (t.y, t.x)),
        TileOrder::BottomToTop => tiles.sort_by_key(|t| (std::cmp::Reverse(t.y), t.x)),
        TileOrder::Center => tiles.sort_by(|a, b| {
            let da = distance_sq(a.center(), (cx, cy));
            let db = distance_sq(b.center(), (cx, cy));
            da.total_cmp(&db)
        }),
        // Square rings around the centre, each walked by angle.
        TileOrder::HilbertSpiral => tiles.sort_by(|a, b| {
            let ka = spiral_key(a, (cx, cy), (tw, th));
            let kb = spiral_key(b, (cx, cy), (tw, th));
            ka.0.cmp(&kb.0).then(ka.1.total_cmp(&kb.1))
        }),
    }

    for (index, tile) in tiles.iter_mut().enumerate() {
        tile.index = index as u32;
    }
    tiles
}

fn distance_sq(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)
}

fn spiral_key(tile: &Tile, center: (f32, f32), size: (u32, u32)) -> (u32, f32) {
    let (x, y) = tile.center();
    let dx = (x - center.0) / size.0 as f32;
    let dy = (y - center.1) / size.1 as f32;
    let ring = dx.abs().max(dy.abs()).round() as u32;
    (ring, dy.atan2(dx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_covers_buffer() {
        let tiles = split(10, 7, (4, 4), TileOrder::TopToBottom);
        assert_eq!(tiles.len(), 6);
        let area: usize = tiles.iter().map(Tile::pixel_count).sum();
        assert_eq!(area, 70);
        assert_eq!(tiles[2], Tile { index: 2, x: 8, y: 0, w: 2, h: 4 });
    }

    #[test]
    fn test_orders() {
        let ltr = split(8, 8, (4, 4), TileOrder::LeftToRight);
        assert_eq!((ltr[1].x, ltr[1].y), (0, 4));

        let btt = split(8, 8, (4, 4), TileOrder::BottomToTop);
        assert_eq!(btt[0].y, 4);

        let center = split(12, 12, (4, 4), TileOrder::Center);
        assert_eq!((center[0].x, center[0].y), (4, 4));

        let spiral = split(12, 12, (4, 4), TileOrder::HilbertSpiral);
        assert_eq!((spiral[0].x, spiral[0].y), (4, 4));
        assert_eq!(spiral.len(), 9);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(split(0, 5, (4, 4), TileOrder::Center).is_empty());
    }
}
