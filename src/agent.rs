//! The connection manager: carries out what the [`Machine`] decides and feeds
//! back what happened.

use futures_util::future::{BoxFuture, OptionFuture};
use futures_util::stream::BoxStream;
use futures_util::{FutureExt, StreamExt};
use snafu::Snafu;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::block::BlockTable;
use crate::collect::{collect_all, CollectionEvent, CollectionReport, Finish, WorldHarvester};
use crate::config::{Config, ConfigError, AUTO_VERSION};
use crate::connection::QueuedConnection;
use crate::entity::{Entity, Player};
use crate::search::FindBlockOptions;
use crate::state::{Action, Event, Machine, State};
use crate::ticks::{ticks, wait_for_ticks};
use crate::viewer::{Viewer, ViewerError};
use crate::world::ChatEvent;
use crate::{World, WorldError};

/// Block table used when the server answers the MCPI Reborn version probe.
const REBORN_VERSION: &str = "mcpi-reborn";

#[derive(Debug, Snafu)]
pub enum AgentError {
    #[snafu(display("{source}"), context(false))]
    Config { source: ConfigError },
    #[snafu(display("{source}"), context(false))]
    Viewer { source: ViewerError },
}

type ChatStream = BoxStream<'static, Result<ChatEvent, WorldError>>;

/// Everything tied to one connection. Dropping it ends the session.
struct Session {
    world: World,
    player: Option<Player<QueuedConnection>>,
    version: String,
    search: Option<FindBlockOptions>,
    timer: Option<BoxFuture<'static, ()>>,
    collection: Option<BoxFuture<'static, CollectionReport>>,
    chat: Option<ChatStream>,
}

impl Session {
    fn new(world: World, version: &str) -> Self {
        Self {
            world,
            player: None,
            version: version.to_owned(),
            search: None,
            timer: None,
            collection: None,
            chat: None,
        }
    }

    /// Resolves the configured player and settles the game version.
    async fn log_in(&mut self, config: &Config) -> Result<Player<QueuedConnection>, WorldError> {
        let id = self.world.player_id(&config.username).await?;
        if self.version == AUTO_VERSION {
            let reported = self.world.reborn_version().await?;
            info!(%reported, "server is MCPI Reborn");
            self.version = REBORN_VERSION.to_owned();
        }

        info!(
            username = %config.username,
            entity = %id,
            version = %self.version,
            "logged in"
        );
        let player = self.world.player(id);
        self.player = Some(player.clone());
        Ok(player)
    }
}

pub struct Agent {
    config: Config,
    machine: Machine,
    viewer: Viewer,
    session: Option<Session>,
}

impl Agent {
    pub fn new(config: Config) -> Self {
        let viewer = Viewer::new(config.username.as_str());
        Self {
            config,
            machine: Machine::new(),
            viewer,
            session: None,
        }
    }

    pub fn viewer(&self) -> &Viewer {
        &self.viewer
    }

    /// Runs until the session timer has run out and the agent has left.
    ///
    /// Connection problems never end the run; the agent keeps reconnecting.
    pub async fn run(mut self) -> Result<(), AgentError> {
        let mut actions = self.machine.start();
        loop {
            let event = if actions.is_empty() {
                if self.machine.state() == State::Done {
                    info!("done");
                    return Ok(());
                }
                self.next_event().await
            } else {
                let action = actions.remove(0);
                debug!(?action, state = %self.machine.state());
                match self.execute(action).await? {
                    Some(event) => event,
                    None => continue,
                }
            };

            // An event replaces whatever was still queued.
            debug!(?event, state = %self.machine.state());
            actions = self.machine.handle(event);
            let state = self.machine.state();
            self.viewer.update(|snapshot| snapshot.state = state);
        }
    }

    /// Carries out one action. Returns the event it produced, if any.
    async fn execute(&mut self, action: Action) -> Result<Option<Event>, AgentError> {
        let event = match action {
            Action::Connect => Some(self.connect().await),
            Action::ScheduleReconnect => {
                if self.session.take().is_some() {
                    info!("session closed");
                }
                info!(delay = ?self.config.retry_delay, "reconnecting");
                sleep(self.config.retry_delay).await;
                Some(Event::RetryDue)
            }
            Action::Authenticate => Some(self.authenticate().await),
            Action::OpenViewer => {
                self.viewer.open(self.config.viewer_addr()).await?;
                None
            }
            Action::Chat(message) => self.chat(message).await,
            Action::StartTimer => {
                if let Some(session) = &mut self.session {
                    info!(ticks = self.config.session_ticks, "session timer started");
                    session.timer = Some(wait_for_ticks(self.config.session_ticks).boxed());
                }
                None
            }
            Action::LoadBlocks => Some(self.load_blocks()),
            Action::StartCollection => {
                self.start_collection();
                None
            }
            Action::Quit => {
                if let Some(session) = self.session.take() {
                    if let Err(err) = session.world.disconnect().await {
                        warn!("failed to close the connection cleanly: {err}");
                    }
                }
                None
            }
        };
        Ok(event)
    }

    async fn connect(&mut self) -> Event {
        let Config { host, port, .. } = &self.config;
        let options = self.config.connect_options();
        match World::connect_with_options((host.as_str(), *port), options).await {
            Ok(world) => {
                info!(%host, port, "connected");
                self.session = Some(Session::new(world, &self.config.game_version));
                Event::Connected
            }
            Err(err) => {
                warn!(%host, port, "failed to connect: {err}");
                Event::ConnectFailed
            }
        }
    }

    async fn authenticate(&mut self) -> Event {
        let Some(session) = &mut self.session else {
            return Event::AuthFailed;
        };
        let mut player = match session.log_in(&self.config).await {
            Ok(player) => player,
            Err(err) => {
                warn!(username = %self.config.username, "failed to log in: {err}");
                return Event::AuthFailed;
            }
        };

        let period = ticks(self.config.chat_poll_ticks);
        session.chat = Some(session.world.chat_events(period).boxed());

        if let Ok(position) = player.get_tile().await {
            self.viewer.update(|snapshot| snapshot.set_player(position));
        }
        Event::LoggedIn
    }

    async fn chat(&mut self, message: &'static str) -> Option<Event> {
        let Some(session) = &mut self.session else {
            return Some(Event::ConnectionLost);
        };
        match session.world.post(message).await {
            Ok(()) => {
                debug!(message, "posted to chat");
                None
            }
            Err(err) if err.is_connection_lost() => {
                warn!("failed to post to chat: {err}");
                Some(Event::ConnectionLost)
            }
            Err(err) => {
                warn!("failed to post to chat: {err}");
                None
            }
        }
    }

    fn load_blocks(&mut self) -> Event {
        let Some(session) = &mut self.session else {
            return Event::ConnectionLost;
        };
        let table = match BlockTable::load(&session.version) {
            Ok(table) => table,
            Err(err) => {
                error!("no block table: {err}");
                return Event::BlocksUnavailable;
            }
        };
        let matching = match table.id(&self.config.target_block) {
            Ok(matching) => matching,
            Err(err) => {
                error!("{err}");
                return Event::BlocksUnavailable;
            }
        };

        debug!(version = table.version(), %matching, "block table loaded");
        session.search = Some(FindBlockOptions {
            matching,
            max_distance: self.config.search_radius,
        });
        Event::BlocksLoaded
    }

    fn start_collection(&mut self) {
        let Some(session) = &mut self.session else {
            return;
        };
        let (Some(player), Some(options)) = (session.player.clone(), session.search.clone())
        else {
            return;
        };

        info!(block = %self.config.target_block, "collecting");
        let mut harvester = WorldHarvester::new(session.world.clone(), player, options);
        let viewer = self.viewer.clone();
        let collection = async move {
            collect_all(&mut harvester, move |event| {
                viewer.update(|snapshot| match event {
                    CollectionEvent::Target(target) => snapshot.set_target(target),
                    CollectionEvent::Collected { block, player } => {
                        snapshot.record_collected(block);
                        snapshot.set_player(player);
                    }
                })
            })
            .await
        };
        session.collection = Some(collection.boxed());
    }

    /// Waits for the live session to produce an event, logging chat messages
    /// in the meantime.
    async fn next_event(&mut self) -> Event {
        let Some(Session {
            timer,
            collection,
            chat,
            ..
        }) = &mut self.session
        else {
            return Event::ConnectionLost;
        };

        loop {
            tokio::select! {
                Some(()) = OptionFuture::from(timer.as_mut()) => {
                    info!("session time is up");
                    return Event::TimerElapsed;
                }
                Some(report) = OptionFuture::from(collection.as_mut()) => {
                    *collection = None;
                    return match report.finish {
                        Finish::Failed(err) if err.is_connection_lost() => Event::ConnectionLost,
                        _ => Event::CollectionFinished,
                    };
                }
                Some(message) = OptionFuture::from(chat.as_mut().map(|chat| chat.next())) => {
                    match message {
                        Some(Ok(ChatEvent { entity, message })) => {
                            info!(target: "chat", "{entity}: {message}");
                        }
                        Some(Err(err)) if err.is_connection_lost() => {
                            warn!("lost the connection: {err}");
                            return Event::ConnectionLost;
                        }
                        Some(Err(err)) => {
                            warn!("stopped reading chat: {err}");
                            *chat = None;
                        }
                        None => *chat = None,
                    }
                }
                else => {
                    warn!("session has nothing left to wait for");
                    return Event::ConnectionLost;
                }
            }
        }
    }
}
