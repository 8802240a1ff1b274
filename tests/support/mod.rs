//! An in-process stand-in for a Minecraft API server with a tiny world.
//!
//! Coordinates are relative to the spawn point like on a real server: the
//! player spawns at the origin, standing on the surface at `y = -1`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use itertools::Itertools;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

pub const AIR: u16 = 0;
pub const GRASS: u16 = 2;
pub const DIRT: u16 = 3;

pub type Position = (i32, i32, i32);

#[derive(Debug, Default)]
pub struct FakeWorld {
    pub blocks: HashMap<Position, u16>,
    pub player_name: String,
    pub player_id: i32,
    pub player: Position,
    /// Messages the agent posted, in order.
    pub chat: Vec<String>,
    /// Messages waiting to be handed out by `events.chat.posts`.
    pub pending_chat: Vec<(i32, String)>,
    /// Logins to reject before accepting one.
    pub failed_logins_left: usize,
    pub logins: usize,
    /// Set to answer `custom.reborn.version`.
    pub reborn: Option<String>,
    /// Holds back the reply to the next call of this method.
    pub delay_once: Option<(&'static str, Duration)>,
    /// Hangs up instead of answering the next call of this method.
    pub hang_up_once: Option<&'static str>,
    /// Broken grass grows back one block further along x.
    pub regrow: bool,
    /// When each connection was accepted.
    pub accepts: Vec<Instant>,
    /// Connections that are still being served.
    pub open: usize,
}

enum Response {
    Silent,
    Line(String, Option<Duration>),
    HangUp,
}

impl FakeWorld {
    /// A patch of dirt with grass at the given positions and the player
    /// standing at the origin on top of it.
    pub fn meadow(player_name: &str, grass: &[Position]) -> Self {
        let mut blocks: HashMap<_, _> = (-10..=10)
            .cartesian_product(-4..=-1)
            .cartesian_product(-10..=10)
            .map(|((x, y), z)| ((x, y, z), DIRT))
            .collect();
        for &position in grass {
            blocks.insert(position, GRASS);
        }

        Self {
            blocks,
            player_name: player_name.to_owned(),
            player_id: 42,
            player: (0, 0, 0),
            ..Self::default()
        }
    }

    pub fn block(&self, position: Position) -> u16 {
        self.blocks.get(&position).copied().unwrap_or(AIR)
    }

    pub fn count(&self, tile: u16) -> usize {
        self.blocks.values().filter(|&&t| t == tile).count()
    }

    fn respond(&mut self, line: &str) -> Response {
        let name = line.split('(').next().unwrap_or_default();
        if self.hang_up_once == Some(name) {
            self.hang_up_once = None;
            return Response::HangUp;
        }
        let delay = match self.delay_once {
            Some((method, delay)) if method == name => {
                self.delay_once = None;
                Some(delay)
            }
            _ => None,
        };
        match self.handle(line) {
            Some(reply) => Response::Line(reply, delay),
            None => Response::Silent,
        }
    }

    /// Answers one command line. Commands without a response return `None`.
    fn handle(&mut self, line: &str) -> Option<String> {
        let fail = Some("Fail".to_owned());
        let Some((name, args)) = line.split_once('(') else {
            return fail;
        };
        let args = args.strip_suffix(')').unwrap_or(args);
        let numbers: Vec<i32> = args
            .split(',')
            .filter_map(|arg| arg.trim().parse().ok())
            .collect();

        match name {
            "world.getPlayerId" => {
                self.logins += 1;
                if self.failed_logins_left > 0 {
                    self.failed_logins_left -= 1;
                    return fail;
                }
                if args == self.player_name {
                    Some(self.player_id.to_string())
                } else {
                    fail
                }
            }
            "custom.reborn.version" => self.reborn.clone().or(fail),
            "entity.getTile" => {
                let (x, y, z) = self.player;
                Some(format!("{x},{y},{z}"))
            }
            "entity.setTile" => {
                if let [_, x, y, z] = numbers[..] {
                    self.player = (x, y, z);
                }
                None
            }
            "world.getBlock" => match numbers[..] {
                [x, y, z] => Some(self.block((x, y, z)).to_string()),
                _ => fail,
            },
            "world.getBlocks" => match numbers[..] {
                [x1, y1, z1, x2, y2, z2] => {
                    let ids = (y1.min(y2)..=y1.max(y2))
                        .cartesian_product(x1.min(x2)..=x1.max(x2))
                        .cartesian_product(z1.min(z2)..=z1.max(z2))
                        .map(|((y, x), z)| self.block((x, y, z)))
                        .join(",");
                    Some(ids)
                }
                _ => fail,
            },
            "world.setBlock" => {
                if let [x, y, z, tile] = numbers[..] {
                    if tile == i32::from(AIR) {
                        let broken = self.blocks.remove(&(x, y, z));
                        if self.regrow && broken == Some(GRASS) {
                            self.blocks.insert((x + 1, y, z), GRASS);
                        }
                    } else {
                        self.blocks.insert((x, y, z), tile as u16);
                    }
                }
                None
            }
            "chat.post" => {
                self.chat.push(args.to_owned());
                None
            }
            "events.chat.posts" => Some(
                self.pending_chat
                    .drain(..)
                    .map(|(entity, message)| format!("{entity},{message}"))
                    .join("|"),
            ),
            _ => fail,
        }
    }
}

pub struct FakeServer {
    pub addr: SocketAddr,
    world: Arc<Mutex<FakeWorld>>,
}

impl FakeServer {
    pub async fn spawn(world: FakeWorld) -> Self {
        Self::spawn_on("127.0.0.1:0".parse().unwrap(), world).await
    }

    pub async fn spawn_on(addr: SocketAddr, world: FakeWorld) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let world = Arc::new(Mutex::new(world));

        let shared = world.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                {
                    let mut world = shared.lock().unwrap();
                    world.accepts.push(Instant::now());
                    world.open += 1;
                }
                tokio::spawn(serve(stream, shared.clone()));
            }
        });

        Self { addr, world }
    }

    pub fn world(&self) -> MutexGuard<'_, FakeWorld> {
        self.world.lock().unwrap()
    }

    /// Waits until every client has hung up and its last lines are handled.
    pub async fn settle(&self) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.world().open > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("clients should hang up");
    }
}

async fn serve(stream: TcpStream, world: Arc<Mutex<FakeWorld>>) {
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let response = world.lock().unwrap().respond(&line);
        match response {
            Response::Silent => {}
            Response::HangUp => break,
            Response::Line(reply, delay) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                if write.write_all(format!("{reply}\n").as_bytes()).await.is_err() {
                    break;
                }
            }
        }
    }
    world.lock().unwrap().open -= 1;
}
