// SPDX-License-Identifier: CEPL-1.0
use crate::RenderSize;

/// Largest square that fits inside a framebuffer, centered on the long axis.
/// The board is square, so everything outside it is letterbox.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SquareViewport {
    pub x: f32,
    pub y: f32,
    pub side: f32,
}

impl SquareViewport {
    pub fn fit(size: RenderSize) -> Self {
        let (w, h) = (size.width as f32, size.height as f32);
        if size.width < size.height {
            SquareViewport {
                x: 0.0,
                y: (h - w) / 2.0,
                side: w,
            }
        } else {
            SquareViewport {
                x: (w - h) / 2.0,
                y: 0.0,
                side: h,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(width: u32, height: u32) -> RenderSize {
        RenderSize { width, height }
    }

    #[test]
    fn landscape_is_pillarboxed() {
        let vp = SquareViewport::fit(size(400, 300));
        assert_eq!(vp, SquareViewport { x: 50.0, y: 0.0, side: 300.0 });

        let vp = SquareViewport::fit(size(800, 600));
        assert_eq!(vp, SquareViewport { x: 100.0, y: 0.0, side: 600.0 });
    }

    #[test]
    fn portrait_is_letterboxed() {
        let vp = SquareViewport::fit(size(300, 500));
        assert_eq!(vp, SquareViewport { x: 0.0, y: 100.0, side: 300.0 });
    }

    #[test]
    fn square_fills_everything() {
        let vp = SquareViewport::fit(size(512, 512));
        assert_eq!(vp, SquareViewport { x: 0.0, y: 0.0, side: 512.0 });
    }

    #[test]
    fn odd_difference_keeps_half_pixel_offset() {
        let vp = SquareViewport::fit(size(101, 100));
        assert_eq!(vp.side, 100.0);
        assert_eq!(vp.x, 0.5);
    }
}
