//! Categorized rectangles in world space.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{
    CoordinateTransform, GeometryError, ScreenPoint, ScreenRect, WorldPoint,
};

/// Drags at or below this size on either axis are discarded.
pub const DEFAULT_MIN_REGION_SIZE: u32 = 5;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[serde(alias = "不能放的")]
    #[default]
    Blocked,
    #[serde(alias = "水路")]
    Waterway,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Blocked, Category::Waterway];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Waterway => "waterway",
        }
    }

    const fn slot(self) -> usize {
        match self {
            Self::Blocked => 0,
            Self::Waterway => 1,
        }
    }

    /// Resolves a project-file key, including the labels older project files used.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "blocked" | "不能放的" => Some(Self::Blocked),
            "waterway" | "水路" => Some(Self::Waterway),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = RegionError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::from_key(value).ok_or_else(|| RegionError::UnknownCategory(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegionError {
    #[error("region {width}x{height} is below the minimum size of {min} px")]
    DegenerateRegion { width: i64, height: i64, min: u32 },
    #[error("region store is empty")]
    EmptyStore,
    #[error("no {category} region at index {index}")]
    RegionNotFound { category: Category, index: usize },
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

pub type RegionResult<T> = std::result::Result<T, RegionError>;

/// One rectangle. `corner_a` is the screen top-left and `corner_b` the screen
/// bottom-right at creation time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
    pub category: Category,
    pub corner_a: WorldPoint,
    pub corner_b: WorldPoint,
}

impl Region {
    pub const fn new(category: Category, corner_a: WorldPoint, corner_b: WorldPoint) -> Self {
        Self {
            category,
            corner_a,
            corner_b,
        }
    }

    pub fn screen_bounds(&self, transform: &CoordinateTransform) -> RegionResult<ScreenRect> {
        let a = transform.from_world(self.corner_a)?;
        let b = transform.from_world(self.corner_b)?;
        Ok(ScreenRect::from_corners(a, b))
    }

    fn translate(&mut self, dx: f64, dy: f64) {
        self.corner_a = self.corner_a.translated(dx, dy);
        self.corner_b = self.corner_b.translated(dx, dy);
    }
}

/// The canonical set of regions, bucketed per category.
///
/// `insertion_order` records the category of every insertion so that
/// `remove_last` and `find_at` can walk regions in global insertion order.
/// Each bucket only ever grows at its end or is emptied, so the n-th
/// occurrence of a category in the order is the n-th region of its bucket.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStore {
    buckets: [Vec<Region>; 2],
    insertion_order: Vec<Category>,
    min_size: u32,
}

impl Default for RegionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionStore {
    pub fn new() -> Self {
        Self::with_min_size(DEFAULT_MIN_REGION_SIZE)
    }

    pub fn with_min_size(min_size: u32) -> Self {
        Self {
            buckets: [Vec::new(), Vec::new()],
            insertion_order: Vec::new(),
            min_size,
        }
    }

    pub const fn min_size(&self) -> u32 {
        self.min_size
    }

    /// Changes the threshold for future drags; stored regions are kept as is.
    pub fn set_min_size(&mut self, min_size: u32) {
        self.min_size = min_size;
    }

    pub fn regions(&self, category: Category) -> &[Region] {
        &self.buckets[category.slot()]
    }

    pub fn get(&self, category: Category, index: usize) -> Option<&Region> {
        self.buckets[category.slot()].get(index)
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn count(&self, category: Category) -> usize {
        self.buckets[category.slot()].len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Regions in global insertion order, paired with their index inside their category.
    pub fn iter_insertion_order(&self) -> impl Iterator<Item = (usize, &Region)> + '_ {
        let mut seen = [0usize; 2];
        self.insertion_order.iter().filter_map(move |category| {
            let slot = category.slot();
            let index = seen[slot];
            seen[slot] += 1;
            self.buckets[slot].get(index).map(|region| (index, region))
        })
    }

    /// Appends an already-converted region; used when rebuilding from a project record.
    pub fn push_world(&mut self, region: Region) {
        self.buckets[region.category.slot()].push(region);
        self.insertion_order.push(region.category);
    }

    pub fn add(
        &mut self,
        category: Category,
        corner_a: ScreenPoint,
        corner_b: ScreenPoint,
        transform: &CoordinateTransform,
    ) -> RegionResult<Region> {
        let rect = ScreenRect::from_corners(corner_a, corner_b);
        let min = i64::from(self.min_size);
        if rect.width() <= min || rect.height() <= min {
            return Err(RegionError::DegenerateRegion {
                width: rect.width(),
                height: rect.height(),
                min: self.min_size,
            });
        }

        let region = Region::new(
            category,
            transform.to_world(rect.top_left())?,
            transform.to_world(rect.bottom_right())?,
        );
        self.push_world(region);
        Ok(region)
    }

    pub fn remove_last(&mut self) -> RegionResult<Region> {
        let category = self.insertion_order.pop().ok_or(RegionError::EmptyStore)?;
        self.buckets[category.slot()]
            .pop()
            .ok_or(RegionError::EmptyStore)
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.insertion_order.clear();
    }

    /// Translates a region by a screen-space delta. The world corners are
    /// updated in place; translation commutes with the axis flip so the
    /// corner order is preserved.
    pub fn move_region(
        &mut self,
        index: usize,
        category: Category,
        delta: (i32, i32),
        transform: &CoordinateTransform,
    ) -> RegionResult<Region> {
        let (dx, dy) = transform.delta_to_world(delta.0, delta.1)?;
        let region = self.buckets[category.slot()]
            .get_mut(index)
            .ok_or(RegionError::RegionNotFound { category, index })?;
        region.translate(dx, dy);
        Ok(*region)
    }

    pub fn find_at(
        &self,
        point: ScreenPoint,
        transform: &CoordinateTransform,
    ) -> RegionResult<Option<(Category, usize)>> {
        for (index, region) in self.iter_insertion_order() {
            if region.screen_bounds(transform)?.contains(point) {
                return Ok(Some((region.category, index)));
            }
        }
        Ok(None)
    }
}
