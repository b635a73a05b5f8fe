use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

use imsg_types::api::{ChatResponse, MessageResponse, SearchResponse};

use crate::api::{ApiClient, ClientError, HistoryCursor};
use crate::engine::{Effect, Engine};
use crate::view;

const CHAT_LIMIT: u32 = 50;
const SEARCH_LIMIT: u32 = 50;
const MESSAGE_LINES: usize = 30;

const HELP: &str =
    "/chats  /open <n>  /older  /retry  /search <q>  /quit  (anything else is sent; // sends a leading /)";

/// Everything the app loop reacts to. Producers only enqueue these.
#[derive(Debug)]
pub enum AppEvent {
    Input(String),
    InputClosed,
    ChatsLoaded(Result<Vec<ChatResponse>, ClientError>),
    InitialPage {
        chat_id: i64,
        generation: u64,
        result: Result<Vec<MessageResponse>, ClientError>,
    },
    OlderPage {
        chat_id: i64,
        generation: u64,
        result: Result<Vec<MessageResponse>, ClientError>,
    },
    ResyncPage {
        chat_id: i64,
        generation: u64,
        result: Result<Vec<MessageResponse>, ClientError>,
    },
    SendFinished {
        generation: u64,
        text: String,
        result: Result<(), ClientError>,
    },
    SearchResults {
        query: String,
        result: Result<SearchResponse, ClientError>,
    },
    LiveConnected,
    LiveDisconnected,
    LiveBatch(Vec<MessageResponse>),
    LiveError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Chats,
    Open(usize),
    Older,
    Retry,
    Search(String),
    Quit,
    Help,
    Send(String),
    Invalid(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(literal) = line.strip_prefix("//") {
            return Command::Send(format!("/{}", literal));
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line.to_string());
        };

        let (word, arg) = match rest.split_once(char::is_whitespace) {
            Some((word, arg)) => (word, arg.trim()),
            None => (rest, ""),
        };
        match word {
            "chats" => Command::Chats,
            "older" => Command::Older,
            "retry" => Command::Retry,
            "quit" | "q" => Command::Quit,
            "help" => Command::Help,
            "open" => match arg.parse::<usize>() {
                Ok(n) if n > 0 => Command::Open(n),
                _ => Command::Invalid("usage: /open <n>".into()),
            },
            "search" if !arg.is_empty() => Command::Search(arg.to_string()),
            "search" => Command::Invalid("usage: /search <text>".into()),
            other => Command::Invalid(format!("unknown command /{} ({})", other, HELP)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, Clone, PartialEq)]
enum Screen {
    Chats,
    Conversation,
    Search {
        query: String,
        results: Vec<MessageResponse>,
        total: usize,
    },
}

/// Single owner of the engine. Network work is spawned and reports back
/// through the same queue the input reader and live listener feed.
pub struct App {
    client: Arc<ApiClient>,
    events: UnboundedSender<AppEvent>,
    engine: Engine,
    chats: Vec<ChatResponse>,
    chat_title: String,
    screen: Screen,
    live: LiveStatus,
    follow_tail: bool,
    notice: Option<String>,
}

impl App {
    pub fn new(client: Arc<ApiClient>, events: UnboundedSender<AppEvent>, page_size: u32) -> Self {
        Self {
            client,
            events,
            engine: Engine::new(page_size),
            chats: Vec::new(),
            chat_title: String::new(),
            screen: Screen::Chats,
            live: LiveStatus::Connecting,
            follow_tail: true,
            notice: None,
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn chats(&self) -> &[ChatResponse] {
        &self.chats
    }

    pub fn live_status(&self) -> LiveStatus {
        self.live
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub async fn run<W: Write>(
        mut self,
        mut events: UnboundedReceiver<AppEvent>,
        out: &mut W,
    ) -> anyhow::Result<()> {
        self.execute(vec![Effect::RefreshChats]);
        self.draw(out)?;
        while let Some(event) = events.recv().await {
            if self.handle(event) == Flow::Quit {
                break;
            }
            self.draw(out)?;
        }
        Ok(())
    }

    pub fn handle(&mut self, event: AppEvent) -> Flow {
        let effects = match event {
            AppEvent::Input(line) => {
                self.notice = None;
                match Command::parse(&line) {
                    Command::Quit => return Flow::Quit,
                    command => self.command(command),
                }
            }
            AppEvent::InputClosed => return Flow::Quit,
            AppEvent::ChatsLoaded(Ok(chats)) => {
                self.chats = chats;
                Vec::new()
            }
            AppEvent::ChatsLoaded(Err(e)) => {
                self.notice = Some(format!("Could not load chats: {}", e));
                Vec::new()
            }
            AppEvent::InitialPage { chat_id, generation, result } => {
                self.engine
                    .initial_page_loaded(generation, chat_id, result.map_err(|e| e.to_string()))
            }
            AppEvent::OlderPage { chat_id, generation, result } => {
                if let Err(e) = &result {
                    self.notice = Some(format!("Could not load earlier messages: {}", e));
                }
                self.engine
                    .older_page_loaded(generation, chat_id, result.map_err(|e| e.to_string()))
            }
            AppEvent::ResyncPage { chat_id, generation, result } => {
                if let Err(e) = &result {
                    warn!("Resync failed: {}", e);
                }
                self.engine
                    .resync_loaded(generation, chat_id, result.map_err(|e| e.to_string()))
            }
            AppEvent::SendFinished { generation, text, result } => {
                if let Err(e) = &result {
                    debug!("Send failed ({:?}): {}", e.kind(), e);
                }
                self.engine
                    .send_finished(generation, &text, result.map_err(|e| e.to_string()));
                Vec::new()
            }
            AppEvent::SearchResults { query, result } => {
                match result {
                    Ok(found) => {
                        self.screen = Screen::Search {
                            query,
                            results: found.messages,
                            total: found.total,
                        };
                    }
                    Err(e) => self.notice = Some(format!("Search failed: {}", e)),
                }
                Vec::new()
            }
            AppEvent::LiveConnected => {
                let reconnected = self.live == LiveStatus::Reconnecting;
                self.live = LiveStatus::Connected;
                if reconnected {
                    let mut effects = self.engine.resync();
                    effects.push(Effect::RefreshChats);
                    effects
                } else {
                    Vec::new()
                }
            }
            AppEvent::LiveDisconnected => {
                self.live = LiveStatus::Reconnecting;
                Vec::new()
            }
            AppEvent::LiveBatch(rows) => self.engine.receive_batch(rows),
            AppEvent::LiveError(message) => {
                self.notice = Some(format!("Server: {}", message));
                Vec::new()
            }
        };
        self.execute(effects);
        Flow::Continue
    }

    fn command(&mut self, command: Command) -> Vec<Effect> {
        match command {
            Command::Chats => {
                self.screen = Screen::Chats;
                vec![Effect::RefreshChats]
            }
            Command::Open(n) => {
                let Some(chat) = self.chats.get(n - 1) else {
                    self.notice = Some(format!("No chat {}. /chats lists them.", n));
                    return Vec::new();
                };
                self.chat_title = chat.title();
                let (chat_id, target) = (chat.rowid, chat.send_target().to_string());
                self.screen = Screen::Conversation;
                self.follow_tail = true;
                self.engine.switch_chat(chat_id, target)
            }
            Command::Older => {
                self.screen = Screen::Conversation;
                let effects = self.engine.load_older();
                if effects.is_empty() && !self.engine.has_more_older() {
                    self.notice = Some("No earlier messages.".into());
                } else {
                    self.follow_tail = false;
                }
                effects
            }
            Command::Retry => {
                let effects = self.engine.retry_failed();
                if effects.is_empty() {
                    self.notice = Some("Nothing to retry.".into());
                }
                effects
            }
            Command::Search(query) => {
                let client = self.client.clone();
                self.spawn(async move {
                    let result = client.search(&query, None, SEARCH_LIMIT, 0).await;
                    AppEvent::SearchResults { query, result }
                });
                Vec::new()
            }
            Command::Help => {
                self.notice = Some(HELP.into());
                Vec::new()
            }
            Command::Send(text) => {
                if self.engine.active_chat().is_none() {
                    self.notice = Some("Open a chat first (/chats, /open <n>).".into());
                    return Vec::new();
                }
                if text.trim().is_empty() {
                    return Vec::new();
                }
                self.screen = Screen::Conversation;
                self.engine.submit(&text)
            }
            Command::Invalid(message) => {
                self.notice = Some(message);
                Vec::new()
            }
            Command::Quit => Vec::new(),
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            let client = self.client.clone();
            match effect {
                Effect::FetchLatest { chat_id, generation, limit } => self.spawn(async move {
                    let result = client.history(chat_id, HistoryCursor::Latest, limit).await;
                    AppEvent::InitialPage { chat_id, generation, result: result.map(|h| h.messages) }
                }),
                Effect::FetchOlder { chat_id, generation, before, limit } => {
                    self.spawn(async move {
                        let result = client.history(chat_id, HistoryCursor::Before(before), limit).await;
                        AppEvent::OlderPage { chat_id, generation, result: result.map(|h| h.messages) }
                    })
                }
                Effect::FetchResync { chat_id, generation, limit } => self.spawn(async move {
                    let result = client.history(chat_id, HistoryCursor::Latest, limit).await;
                    AppEvent::ResyncPage { chat_id, generation, result: result.map(|h| h.messages) }
                }),
                Effect::Send { generation, recipient, text } => self.spawn(async move {
                    let result = client.send(&recipient, &text).await;
                    AppEvent::SendFinished { generation, text, result }
                }),
                Effect::RefreshChats => self.spawn(async move {
                    AppEvent::ChatsLoaded(client.chats(CHAT_LIMIT).await)
                }),
                Effect::ScrollToBottom => self.follow_tail = true,
            }
        }
    }

    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = AppEvent> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            // The loop is gone once the user quits.
            let _ = events.send(task.await);
        });
    }

    pub fn render(&self) -> Vec<String> {
        let mut lines = match &self.screen {
            Screen::Chats => {
                let mut lines = vec!["== chats ==".to_string()];
                lines.extend(view::chat_list(&self.chats));
                lines
            }
            Screen::Conversation => {
                view::conversation(&self.chat_title, &self.engine, MESSAGE_LINES, self.follow_tail)
            }
            Screen::Search { query, results, total } => view::search_results(query, results, *total),
        };

        lines.push(String::new());
        let live = match self.live {
            LiveStatus::Connecting => "connecting",
            LiveStatus::Connected => "live",
            LiveStatus::Reconnecting => "reconnecting",
        };
        match &self.notice {
            Some(notice) => lines.push(format!("[{}] {}", live, notice)),
            None => lines.push(format!("[{}] /help for commands", live)),
        }
        lines
    }

    fn draw<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        write!(out, "\x1b[2J\x1b[H")?;
        for line in self.render() {
            writeln!(out, "{}", line)?;
        }
        write!(out, "> ")?;
        out.flush()
    }
}
