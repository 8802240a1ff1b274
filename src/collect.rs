//! Harvesting blocks: the single collect operation and the greedy loop that
//! keeps collecting the nearest match until none is left.

use std::future::Future;

use nalgebra::{Point3, Vector3};
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tracing::{error, info};

use crate::connection::{Protocol, Tile};
use crate::entity::{Entity, Player};
use crate::search::{find_block, FindBlockOptions, SearchError};
use crate::{World, WorldError};

/// Face neighbours in the order a standing spot is picked: on top first, then
/// the four sides, then underneath.
const STANDING_SPOTS: [(i32, i32, i32); 6] = [
    (0, 1, 0),
    (1, 0, 0),
    (-1, 0, 0),
    (0, 0, 1),
    (0, 0, -1),
    (0, -1, 0),
];

#[derive(Debug, Snafu)]
pub enum CollectError {
    #[snafu(display("Block search failed: {source}"))]
    Search { source: SearchError },
    #[snafu(display("Could not locate the player: {source}"))]
    Locate { source: WorldError },
    #[snafu(display("Block at {target} is now {found}, not {expected}"))]
    TargetChanged {
        target: Point3<i32>,
        expected: Tile,
        found: Tile,
    },
    #[snafu(display("Block at {target} has no free face to stand at"))]
    Unreachable { target: Point3<i32> },
    #[snafu(display("Block at {target} is still {found} after breaking it"))]
    BreakFailed { target: Point3<i32>, found: Tile },
    #[snafu(display("{source}"), context(false))]
    World { source: WorldError },
}

impl CollectError {
    /// Whether the failure came from a broken connection rather than from
    /// the world.
    pub fn is_connection_lost(&self) -> bool {
        match self {
            Self::Search { source } => source.is_connection_lost(),
            Self::Locate { source } | Self::World { source } => source.is_connection_lost(),
            _ => false,
        }
    }
}

/// What the collection loop is doing, for anyone watching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionEvent {
    /// A block was picked as the next target.
    Target(Point3<i32>),
    /// The target was collected; the player now stands at `player`.
    Collected {
        block: Point3<i32>,
        player: Point3<i32>,
    },
}

/// Why the collection loop stopped.
#[derive(Debug)]
pub enum Finish {
    /// No matching block is left within range.
    Exhausted,
    /// A search or collect attempt failed; the rest of the task was dropped.
    Failed(CollectError),
}

#[derive(Debug)]
pub struct CollectionReport {
    pub collected: usize,
    pub scans: usize,
    pub finish: Finish,
}

/// The two steps of the greedy loop.
pub trait Harvester {
    /// The nearest block worth collecting, if any.
    fn find_nearest(
        &mut self,
    ) -> impl Future<Output = Result<Option<Point3<i32>>, CollectError>> + Send;

    /// Collects the block at `target`, returning where the player ended up.
    fn collect(
        &mut self,
        target: Point3<i32>,
    ) -> impl Future<Output = Result<Point3<i32>, CollectError>> + Send;
}

/// Repeatedly collects the nearest block until there is none left or an
/// attempt fails. A scan only starts once the previous attempt has resolved.
pub async fn collect_all<H: Harvester>(
    harvester: &mut H,
    mut on_event: impl FnMut(CollectionEvent) + Send,
) -> CollectionReport {
    let mut collected = 0;
    let mut scans = 0;

    let finish = loop {
        scans += 1;
        let target = match harvester.find_nearest().await {
            Ok(Some(target)) => target,
            Ok(None) => break Finish::Exhausted,
            Err(err) => {
                error!("{err}");
                break Finish::Failed(err);
            }
        };

        on_event(CollectionEvent::Target(target));
        let player = match harvester.collect(target).await {
            Ok(player) => player,
            Err(err) => {
                error!(%target, "{err}");
                break Finish::Failed(err);
            }
        };
        collected += 1;
        on_event(CollectionEvent::Collected {
            block: target,
            player,
        });
    };

    info!(collected, scans, "collection finished");
    CollectionReport {
        collected,
        scans,
        finish,
    }
}

/// Index of the block at `offset` from the centre in a 3×3×3 bulk read.
fn neighbourhood_index(offset: Vector3<i32>) -> usize {
    ((offset.y + 1) * 9 + (offset.x + 1) * 3 + (offset.z + 1)) as usize
}

/// Picks where to stand to break the centre of a 3×3×3 neighbourhood.
fn standing_spot(neighbourhood: &[Tile]) -> Option<Vector3<i32>> {
    STANDING_SPOTS
        .into_iter()
        .map(|(x, y, z)| Vector3::new(x, y, z))
        .find(|&offset| neighbourhood.get(neighbourhood_index(offset)) == Some(&Tile::AIR))
}

/// Walks the player next to `target` and breaks it. Returns the tile the
/// player was moved to.
///
/// Fails if the block is no longer `expected`, if it is buried, or if it is
/// still there afterwards.
pub async fn collect_block<T: Protocol + Send>(
    world: &mut World<T>,
    player: &mut Player<T>,
    expected: Tile,
    target: Point3<i32>,
) -> Result<Point3<i32>, CollectError> {
    let one = Vector3::repeat(1);
    let neighbourhood = world.get_blocks(target - one, target + one).await?;

    let found = neighbourhood[neighbourhood_index(Vector3::zeros())];
    ensure!(
        found == expected,
        TargetChangedSnafu {
            target,
            expected,
            found
        }
    );

    let offset = standing_spot(&neighbourhood).context(UnreachableSnafu { target })?;
    let standing = target + offset;
    player.set_tile(standing).await?;
    world.set_block(target, Tile::AIR).await?;

    let found = world.get_block(target).await?;
    ensure!(found == Tile::AIR, BreakFailedSnafu { target, found });
    Ok(standing)
}

/// Harvests one kind of block around a player.
#[derive(Debug)]
pub struct WorldHarvester<T: Protocol> {
    world: World<T>,
    player: Player<T>,
    options: FindBlockOptions,
}

impl<T: Protocol> WorldHarvester<T> {
    pub const fn new(world: World<T>, player: Player<T>, options: FindBlockOptions) -> Self {
        Self {
            world,
            player,
            options,
        }
    }
}

impl<T: Protocol + Send> Harvester for WorldHarvester<T> {
    async fn find_nearest(&mut self) -> Result<Option<Point3<i32>>, CollectError> {
        let origin = self.player.get_tile().await.context(LocateSnafu)?;
        find_block(&mut self.world, origin, &self.options)
            .await
            .context(SearchSnafu)
    }

    async fn collect(&mut self, target: Point3<i32>) -> Result<Point3<i32>, CollectError> {
        collect_block(&mut self.world, &mut self.player, self.options.matching, target).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Serves a fixed list of targets and fails the collect attempt with the
    /// given index, if any.
    struct Scripted {
        targets: VecDeque<Point3<i32>>,
        fail_at: Option<usize>,
        scans: usize,
        attempts: usize,
    }

    impl Scripted {
        fn new(count: i32, fail_at: Option<usize>) -> Self {
            Self {
                targets: (0..count).map(|i| Point3::new(i, 64, 0)).collect(),
                fail_at,
                scans: 0,
                attempts: 0,
            }
        }
    }

    impl Harvester for Scripted {
        async fn find_nearest(&mut self) -> Result<Option<Point3<i32>>, CollectError> {
            self.scans += 1;
            Ok(self.targets.front().copied())
        }

        async fn collect(&mut self, target: Point3<i32>) -> Result<Point3<i32>, CollectError> {
            self.attempts += 1;
            if self.fail_at == Some(self.attempts - 1) {
                return UnreachableSnafu { target }.fail();
            }
            self.targets.pop_front();
            Ok(target + Vector3::y())
        }
    }

    #[tokio::test]
    async fn nothing_to_collect() {
        let mut harvester = Scripted::new(0, None);
        let report = collect_all(&mut harvester, |_| {}).await;
        assert_eq!(harvester.attempts, 0);
        assert_eq!(report.collected, 0);
        assert_eq!(report.scans, 1);
        assert!(matches!(report.finish, Finish::Exhausted));
    }

    #[tokio::test]
    async fn collects_every_block_then_rescans_once() {
        let mut harvester = Scripted::new(5, None);
        let mut events = Vec::new();
        let report = collect_all(&mut harvester, |event| events.push(event)).await;
        assert_eq!(harvester.attempts, 5);
        assert_eq!(harvester.scans, 6);
        assert_eq!(report.collected, 5);
        assert_eq!(report.scans, 6);
        assert!(matches!(report.finish, Finish::Exhausted));
        assert_eq!(events.len(), 10);
        assert_eq!(events[0], CollectionEvent::Target(Point3::new(0, 64, 0)));
        assert_eq!(
            events[9],
            CollectionEvent::Collected {
                block: Point3::new(4, 64, 0),
                player: Point3::new(4, 65, 0),
            }
        );
    }

    #[tokio::test]
    async fn stops_after_the_first_failure() {
        let mut harvester = Scripted::new(5, Some(2));
        let report = collect_all(&mut harvester, |_| {}).await;
        assert_eq!(harvester.attempts, 3);
        assert_eq!(report.collected, 2);
        assert_eq!(report.scans, 3);
        assert!(matches!(
            report.finish,
            Finish::Failed(CollectError::Unreachable { .. })
        ));
    }

    #[tokio::test]
    async fn search_errors_stop_the_loop() {
        struct Broken;

        impl Harvester for Broken {
            async fn find_nearest(&mut self) -> Result<Option<Point3<i32>>, CollectError> {
                Err(SearchError::ShortRead {
                    min: Point3::origin(),
                    max: Point3::origin(),
                    expected: 1,
                    actual: 0,
                })
                .context(SearchSnafu)
            }

            async fn collect(&mut self, _: Point3<i32>) -> Result<Point3<i32>, CollectError> {
                unreachable!("nothing was found")
            }
        }

        let report = collect_all(&mut Broken, |_| {}).await;
        assert_eq!(report.collected, 0);
        assert!(matches!(report.finish, Finish::Failed(CollectError::Search { .. })));
    }

    #[test]
    fn world_failures_are_not_connection_losses() {
        let err = CollectError::Unreachable {
            target: Point3::origin(),
        };
        assert!(!err.is_connection_lost());
    }

    fn neighbourhood(centre: Tile, air_at: &[Vector3<i32>]) -> Vec<Tile> {
        let mut tiles = vec![Tile(3); 27];
        tiles[neighbourhood_index(Vector3::zeros())] = centre;
        for &offset in air_at {
            tiles[neighbourhood_index(offset)] = Tile::AIR;
        }
        tiles
    }

    #[test]
    fn centre_is_the_middle_of_the_read() {
        assert_eq!(neighbourhood_index(Vector3::zeros()), 13);
        assert_eq!(neighbourhood_index(Vector3::new(-1, -1, -1)), 0);
        assert_eq!(neighbourhood_index(Vector3::new(1, 1, 1)), 26);
    }

    #[test]
    fn prefers_standing_on_top() {
        let tiles = neighbourhood(Tile(2), &[Vector3::new(0, 1, 0), Vector3::new(1, 0, 0)]);
        assert_eq!(standing_spot(&tiles), Some(Vector3::new(0, 1, 0)));
    }

    #[test]
    fn falls_back_to_sides_then_below() {
        let tiles = neighbourhood(Tile(2), &[Vector3::new(0, 0, -1), Vector3::new(0, -1, 0)]);
        assert_eq!(standing_spot(&tiles), Some(Vector3::new(0, 0, -1)));

        let tiles = neighbourhood(Tile(2), &[Vector3::new(0, -1, 0)]);
        assert_eq!(standing_spot(&tiles), Some(Vector3::new(0, -1, 0)));
    }

    #[test]
    fn buried_blocks_are_unreachable() {
        let tiles = neighbourhood(Tile(2), &[Vector3::new(1, 1, 1)]);
        assert_eq!(standing_spot(&tiles), None);
    }
}
