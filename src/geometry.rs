/// Screen/world point types and the image-centered coordinate transform.
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("no image is loaded")]
    NoImageLoaded,
}

pub type GeometryResult<T> = std::result::Result<T, GeometryError>;

/// Pixel offset from the displayed image's top-left corner, Y pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenPoint {
    pub x: i32,
    pub y: i32,
}

impl ScreenPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn delta_to(self, other: ScreenPoint) -> (i32, i32) {
        (
            other.x.saturating_sub(self.x),
            other.y.saturating_sub(self.y),
        )
    }
}

/// Offset from the image center, Y pointing up.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPoint {
    pub x: f64,
    pub y: f64,
}

impl WorldPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

/// Inclusive screen rectangle derived from two corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScreenRect {
    pub fn from_corners(a: ScreenPoint, b: ScreenPoint) -> Self {
        Self {
            left: a.x.min(b.x),
            top: a.y.min(b.y),
            right: a.x.max(b.x),
            bottom: a.y.max(b.y),
        }
    }

    pub const fn top_left(&self) -> ScreenPoint {
        ScreenPoint::new(self.left, self.top)
    }

    pub const fn bottom_right(&self) -> ScreenPoint {
        ScreenPoint::new(self.right, self.bottom)
    }

    pub fn width(&self) -> i64 {
        i64::from(self.right) - i64::from(self.left)
    }

    pub fn height(&self) -> i64 {
        i64::from(self.bottom) - i64::from(self.top)
    }

    pub fn contains(&self, point: ScreenPoint) -> bool {
        (self.left..=self.right).contains(&point.x) && (self.top..=self.bottom).contains(&point.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBounds {
    pub width: u32,
    pub height: u32,
}

impl ImageBounds {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn center(self) -> (f64, f64) {
        (f64::from(self.width) / 2.0, f64::from(self.height) / 2.0)
    }
}

/// Maps between screen and world space for the currently bound image.
///
/// World space has its origin at the image center and an upward Y axis, so
/// `world = (sx - W/2, H/2 - sy)`. Without a bound image every conversion
/// fails with [`GeometryError::NoImageLoaded`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinateTransform {
    bounds: Option<ImageBounds>,
}

impl CoordinateTransform {
    pub const fn unbound() -> Self {
        Self { bounds: None }
    }

    pub const fn for_image(bounds: ImageBounds) -> Self {
        Self {
            bounds: Some(bounds),
        }
    }

    pub const fn bounds(&self) -> Option<ImageBounds> {
        self.bounds
    }

    pub const fn is_bound(&self) -> bool {
        self.bounds.is_some()
    }

    fn center(&self) -> GeometryResult<(f64, f64)> {
        self.bounds
            .map(ImageBounds::center)
            .ok_or(GeometryError::NoImageLoaded)
    }

    pub fn to_world(&self, point: ScreenPoint) -> GeometryResult<WorldPoint> {
        let (center_x, center_y) = self.center()?;
        Ok(WorldPoint::new(
            f64::from(point.x) - center_x,
            center_y - f64::from(point.y),
        ))
    }

    pub fn from_world(&self, point: WorldPoint) -> GeometryResult<ScreenPoint> {
        let (center_x, center_y) = self.center()?;
        Ok(ScreenPoint::new(
            round_to_pixel(point.x + center_x),
            round_to_pixel(center_y - point.y),
        ))
    }

    /// Screen deltas map to world deltas with the Y axis flipped; no centering
    /// is involved, so this only requires a bound image for consistency.
    pub fn delta_to_world(&self, dx: i32, dy: i32) -> GeometryResult<(f64, f64)> {
        self.center()?;
        Ok((f64::from(dx), -f64::from(dy)))
    }
}

fn round_to_pixel(value: f64) -> i32 {
    let rounded = value.round();
    if rounded >= f64::from(i32::MAX) {
        i32::MAX
    } else if rounded <= f64::from(i32::MIN) {
        i32::MIN
    } else {
        rounded as i32
    }
}
