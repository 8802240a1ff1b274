//! Finding the nearest block of a given type around a point.
//!
//! The search cube is cut into regions of [`REGION_SIZE`]³ blocks. Each region
//! is fetched with a single bulk read, and regions are visited nearest first,
//! so the scan can stop as soon as no unvisited region could contain anything
//! closer than the best match so far.
//!
//! API coordinates are relative to the world spawn point, so the cube is not
//! clipped to any height range. Reads outside the world return air.

use std::future::Future;

use itertools::iproduct;
use nalgebra::Point3;
use snafu::{ensure, OptionExt, Snafu};
use tracing::debug;

use crate::connection::{Protocol, Tile};
use crate::{World, WorldError};

/// Edge length of the regions requested from the server.
pub const REGION_SIZE: i32 = 16;

/// Largest accepted search radius, in blocks.
pub const MAX_SEARCH_RADIUS: u32 = 1024;

#[derive(Debug, Snafu)]
pub enum SearchError {
    #[snafu(display("Search radius {radius} is larger than {MAX_SEARCH_RADIUS}"))]
    RadiusTooLarge { radius: u32 },
    #[snafu(display("Failed to read blocks: {source}"), context(false))]
    Read { source: WorldError },
    #[snafu(display("Expected {expected} blocks between {min} and {max}, got {actual}"))]
    ShortRead {
        min: Point3<i32>,
        max: Point3<i32>,
        expected: usize,
        actual: usize,
    },
}

impl SearchError {
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Read { source } if source.is_connection_lost())
    }
}

/// Anything that can answer bulk block reads.
pub trait BlockSource {
    /// Block ids in the inclusive cuboid `min..=max`, in y, then x, then z
    /// order.
    fn blocks(
        &mut self,
        min: Point3<i32>,
        max: Point3<i32>,
    ) -> impl Future<Output = Result<Vec<Tile>, WorldError>> + Send;
}

impl<T: Protocol + Send> BlockSource for World<T> {
    async fn blocks(
        &mut self,
        min: Point3<i32>,
        max: Point3<i32>,
    ) -> Result<Vec<Tile>, WorldError> {
        self.get_blocks(min, max).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindBlockOptions {
    /// The block to look for.
    pub matching: Tile,
    /// Maximum Euclidean distance from the origin, in blocks. At most
    /// [`MAX_SEARCH_RADIUS`].
    pub max_distance: u32,
}

/// An inclusive cuboid of blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Region {
    min: Point3<i32>,
    max: Point3<i32>,
}

impl Region {
    fn size(&self) -> [usize; 3] {
        [0, 1, 2].map(|axis| (self.max[axis] - self.min[axis] + 1) as usize)
    }

    fn volume(&self) -> usize {
        self.size().iter().product()
    }

    /// Position of the `index`th block of a bulk read over this region.
    fn position(&self, index: usize) -> Point3<i32> {
        let [size_x, _, size_z] = self.size();
        let layer = size_x * size_z;
        let (y, rest) = (index / layer, index % layer);
        let (x, z) = (rest / size_z, rest % size_z);
        self.min + nalgebra::Vector3::new(x as i32, y as i32, z as i32)
    }

    /// Squared distance from `point` to the closest block in the region.
    fn min_distance_sq(&self, point: &Point3<i32>) -> i64 {
        (0..3)
            .map(|axis| {
                let d = (self.min[axis] - point[axis])
                    .max(point[axis] - self.max[axis])
                    .max(0) as i64;
                d * d
            })
            .sum()
    }
}

fn distance_sq(a: &Point3<i32>, b: &Point3<i32>) -> i64 {
    let d = (a - b).map(i64::from);
    d.dot(&d)
}

/// Splits the search cube around `origin` into regions, nearest first.
/// Regions that lie entirely outside the search sphere are left out.
///
/// `radius` must be at most [`MAX_SEARCH_RADIUS`].
fn regions(origin: Point3<i32>, radius: i32) -> Vec<(i64, Region)> {
    let radius_sq = i64::from(radius).pow(2);
    let lo = origin.map(|c| c.saturating_sub(radius));
    let hi = origin.map(|c| c.saturating_add(radius));

    let step = REGION_SIZE as usize;
    let last = |start: i32, end: i32| start.saturating_add(REGION_SIZE - 1).min(end);
    let mut regions: Vec<_> = iproduct!(
        (lo.x..=hi.x).step_by(step),
        (lo.y..=hi.y).step_by(step),
        (lo.z..=hi.z).step_by(step)
    )
    .map(|(x, y, z)| Region {
        min: Point3::new(x, y, z),
        max: Point3::new(last(x, hi.x), last(y, hi.y), last(z, hi.z)),
    })
    .map(|region| (region.min_distance_sq(&origin), region))
    .filter(|(d, _)| *d <= radius_sq)
    .collect();
    regions.sort_by_key(|(d, _)| *d);
    regions
}

/// Finds the block matching `options.matching` closest to `origin`.
///
/// Ties go to whichever block was read first.
pub async fn find_block<S: BlockSource>(
    source: &mut S,
    origin: Point3<i32>,
    options: &FindBlockOptions,
) -> Result<Option<Point3<i32>>, SearchError> {
    let radius = options.max_distance;
    let radius = i32::try_from(radius)
        .ok()
        .filter(|_| radius <= MAX_SEARCH_RADIUS)
        .context(RadiusTooLargeSnafu { radius })?;
    let radius_sq = i64::from(radius).pow(2);
    let mut best: Option<(i64, Point3<i32>)> = None;
    let mut reads = 0;

    for (region_distance, region) in regions(origin, radius) {
        if matches!(best, Some((best_distance, _)) if best_distance <= region_distance) {
            break;
        }

        let tiles = source.blocks(region.min, region.max).await?;
        reads += 1;
        ensure!(
            tiles.len() == region.volume(),
            ShortReadSnafu {
                min: region.min,
                max: region.max,
                expected: region.volume(),
                actual: tiles.len(),
            }
        );

        for (index, tile) in tiles.into_iter().enumerate() {
            if tile != options.matching {
                continue;
            }
            let position = region.position(index);
            let distance = distance_sq(&position, &origin);
            let closer = best.map_or(true, |(best_distance, _)| distance < best_distance);
            if distance <= radius_sq && closer {
                best = Some((distance, position));
            }
        }
    }

    debug!(%origin, reads, found = ?best.map(|(_, p)| p), "block search finished");
    Ok(best.map(|(_, position)| position))
}
