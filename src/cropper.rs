//! Crop-handle geometry.
//!
//! Four corner handles define a free-form crop quadrilateral inside a
//! `width` x `height` display rectangle. Each handle keeps a committed base
//! position and an in-progress drag offset; the offset is folded into the
//! base when the drag is released. Handles are clamped to the rectangle
//! independently of each other, so corners may cross.

use crate::state::{Corner, CropQuad, Point};

/// Side of the square hit box around each handle.
pub const HANDLE_BOX: f32 = 45.0;
/// Diameter of the visible handle dot.
pub const HANDLE_DOT: f32 = HANDLE_BOX * 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
/// One draggable corner: committed position plus the live drag position.
pub struct Handle {
    base: Point,
    current: Point,
}

impl Handle {
    pub fn new(at: Point) -> Self {
        Self {
            base: at,
            current: at,
        }
    }

    /// Committed position, ignoring any drag in progress.
    pub fn base(&self) -> Point {
        self.base
    }

    /// Position as currently displayed.
    pub fn position(&self) -> Point {
        self.current
    }

    fn flatten(&mut self) {
        self.base = self.current;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CropHandles {
    width: f32,
    height: f32,
    top_left: Handle,
    top_right: Handle,
    bottom_right: Handle,
    bottom_left: Handle,
}

impl CropHandles {
    /// Handles at the corners of the rectangle, or at `initial` when resuming.
    /// Resumed corners are pulled into the rectangle.
    pub fn new(width: f32, height: f32, initial: Option<CropQuad>) -> Self {
        let (width, height) = (width.max(0.0), height.max(0.0));
        let quad = match initial {
            Some(quad) => quad.map(|p| Point::new(p.x.clamp(0.0, width), p.y.clamp(0.0, height))),
            None => CropQuad::from_size(width, height),
        };
        Self {
            width,
            height,
            top_left: Handle::new(quad.top_left),
            top_right: Handle::new(quad.top_right),
            bottom_right: Handle::new(quad.bottom_right),
            bottom_left: Handle::new(quad.bottom_left),
        }
    }

    pub fn bounds(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    pub fn handle(&self, corner: Corner) -> &Handle {
        match corner {
            Corner::TopLeft => &self.top_left,
            Corner::TopRight => &self.top_right,
            Corner::BottomRight => &self.bottom_right,
            Corner::BottomLeft => &self.bottom_left,
        }
    }

    fn handle_mut(&mut self, corner: Corner) -> &mut Handle {
        match corner {
            Corner::TopLeft => &mut self.top_left,
            Corner::TopRight => &mut self.top_right,
            Corner::BottomRight => &mut self.bottom_right,
            Corner::BottomLeft => &mut self.bottom_left,
        }
    }

    /// Apply a cumulative drag delta to `corner`, saturating at the edges.
    pub fn drag(&mut self, corner: Corner, dx: f32, dy: f32) {
        let (width, height) = (self.width, self.height);
        let handle = self.handle_mut(corner);
        handle.current = Point::new(
            saturate(handle.base.x, dx, width),
            saturate(handle.base.y, dy, height),
        );
    }

    /// Commit the drag on `corner` and return the committed quadrilateral.
    pub fn release(&mut self, corner: Corner) -> CropQuad {
        self.handle_mut(corner).flatten();
        let quad = self.committed();
        tracing::debug!(?corner, overlay = %self.overlay_points(), "crop handle released");
        quad
    }

    pub fn committed(&self) -> CropQuad {
        self.quad_with(Handle::base)
    }

    /// Positions including any drag in progress.
    pub fn live(&self) -> CropQuad {
        self.quad_with(Handle::position)
    }

    fn quad_with(&self, pick: impl Fn(&Handle) -> Point) -> CropQuad {
        CropQuad {
            top_left: pick(&self.top_left),
            top_right: pick(&self.top_right),
            bottom_left: pick(&self.bottom_left),
            bottom_right: pick(&self.bottom_right),
        }
    }

    /// Overlay polygon as `"x,y x,y x,y x,y"`, clockwise from the top-left.
    pub fn overlay_points(&self) -> String {
        let live = self.live();
        Corner::ALL
            .iter()
            .map(|&corner| {
                let p = live.get(corner);
                format!("{},{}", p.x, p.y)
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Top-left of the hit box for `corner`. Boxes are shifted inward so
    /// they stay inside the rectangle when the handle sits on its edge.
    pub fn hit_box_origin(&self, corner: Corner) -> Point {
        let (tx, ty) = match corner {
            Corner::TopLeft => (-15.0, -15.0),
            Corner::TopRight => (-30.0, -15.0),
            Corner::BottomLeft => (-15.0, -30.0),
            Corner::BottomRight => (-30.0, -30.0),
        };
        let p = self.handle(corner).position();
        Point::new(p.x + tx, p.y + ty)
    }

    /// Handle whose hit box contains `pos`, nearest first.
    pub fn hit_test(&self, pos: Point) -> Option<Corner> {
        Corner::ALL
            .iter()
            .copied()
            .filter(|&corner| {
                let origin = self.hit_box_origin(corner);
                pos.x >= origin.x
                    && pos.x <= origin.x + HANDLE_BOX
                    && pos.y >= origin.y
                    && pos.y <= origin.y + HANDLE_BOX
            })
            .min_by(|&a, &b| {
                distance_sq(self.handle(a).position(), pos)
                    .total_cmp(&distance_sq(self.handle(b).position(), pos))
            })
    }
}

/// Whether the quadrilateral, walked clockwise from the top-left, turns the
/// same way at every corner. Crossed or dented quads are not convex.
pub fn is_convex(quad: &CropQuad) -> bool {
    let points = Corner::ALL.map(|corner| quad.get(corner));
    let mut sign = 0.0f32;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        let c = points[(i + 2) % points.len()];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross == 0.0 {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

/// `base + delta`, pinned to `0` or `limit` when it would leave `[0, limit]`.
fn saturate(base: f32, delta: f32, limit: f32) -> f32 {
    let candidate = base + delta;
    if candidate < 0.0 {
        0.0
    } else if candidate > limit {
        limit
    } else {
        candidate
    }
}

fn distance_sq(a: Point, b: Point) -> f32 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    dx * dx + dy * dy
}

#[derive(Debug, Clone, Copy)]
struct Grab {
    corner: Corner,
    start: Point,
}

#[derive(Debug, Default)]
/// Pointer gesture driving at most one handle at a time.
pub struct DragGesture {
    grab: Option<Grab>,
}

impl DragGesture {
    /// Start a drag at `pos`. Returns `false` when no handle is under the pointer.
    pub fn grab(&mut self, handles: &CropHandles, pos: Point) -> bool {
        self.grab = handles
            .hit_test(pos)
            .map(|corner| Grab { corner, start: pos });
        self.grab.is_some()
    }

    pub fn active(&self) -> Option<Corner> {
        self.grab.map(|g| g.corner)
    }

    pub fn move_to(&mut self, handles: &mut CropHandles, pos: Point) {
        if let Some(grab) = self.grab {
            handles.drag(grab.corner, pos.x - grab.start.x, pos.y - grab.start.y);
        }
    }

    /// End the drag. Yields the committed quadrilateral once per release.
    pub fn release(&mut self, handles: &mut CropHandles) -> Option<CropQuad> {
        let grab = self.grab.take()?;
        Some(handles.release(grab.corner))
    }
}
