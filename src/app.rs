use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use chrono::Local;
use ratatui::widgets::ListState;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::api::{Backend, ChatDescriptor, ChatReply, ChatRequest, HistoryEntry, ModelDescriptor, default_model};
use crate::config::Config;
use crate::host::{FALLBACK_USER_ID, Haptic, Host, Theme};

/// Shown when the backend answers but reports a failed turn.
pub const SOFT_FAILURE_TEXT: &str = "Sorry, the assistant could not handle that request.";
/// Shown when the request itself never completed.
pub const HARD_FAILURE_TEXT: &str = "Connection problem. Please try again later.";

pub const MAIN_CHAT_TITLE: &str = "Main";
const NEW_CHAT_TITLE: &str = "New chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: String,
}

/// Stable handle for one in-flight turn. The typing placeholder is inserted
/// and later removed by the same token, so a slow reply can never detach the
/// wrong entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnToken(u64);

#[derive(Debug)]
pub enum TranscriptEntry {
    Message(ChatMessage),
    Pending(TurnToken),
}

pub struct PendingTurn {
    pub token: TurnToken,
    pub task: JoinHandle<Result<ChatReply>>,
}

/// Session-wide state derived from storage and host context at startup.
/// Chat requests snapshot these values; settings drafts never leak in here
/// until they are saved.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub selected_model: String,
    pub system_prompt: String,
    pub chat_id: Option<i64>,
    pub chat_title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsFocus {
    Models,
    Prompt,
}

pub struct App {
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Transcript state
    pub transcript: Vec<TranscriptEntry>,
    pub chat_scroll: u16,
    pub chat_height: u16,
    pub chat_width: u16,
    pub total_chat_lines: u16,

    // Composer state
    pub input: String,
    pub input_cursor: usize,
    pub pending_turn: Option<PendingTurn>,

    // Animation state
    pub animation_frame: u8,

    // Model picker state
    pub models: Vec<ModelDescriptor>,
    pub show_model_picker: bool,
    pub model_state: ListState,

    // Settings overlay state (drafts, committed only on save)
    pub show_settings: bool,
    pub settings_focus: SettingsFocus,
    pub settings_model_state: ListState,
    pub draft_prompt: String,
    pub draft_cursor: usize,

    // Clear-history confirmation
    pub show_confirm_clear: bool,

    // Conversation picker state
    pub show_chat_picker: bool,
    pub chats: Vec<ChatDescriptor>,
    pub chat_state: ListState,
    pub show_rename_input: bool,
    pub rename_input: String,
    pub rename_cursor: usize,
    pub rename_target: Option<i64>,

    pub session: Session,
    pub theme: Theme,

    backend: Arc<dyn Backend>,
    host: Arc<dyn Host>,
    config_path: PathBuf,
    next_token: u64,
}

impl App {
    /// Build the session from preferences and host context, then fetch the
    /// model catalog and prior history concurrently. Neither fetch failing is
    /// surfaced to the user: the catalog falls back to the built-in default
    /// entry, history to an empty transcript.
    pub async fn initialize(
        backend: Arc<dyn Backend>,
        host: Arc<dyn Host>,
        config: Config,
        config_path: PathBuf,
    ) -> Self {
        let user_id = host.user_id().unwrap_or(FALLBACK_USER_ID);
        let theme = host.accent().map(Theme::with_accent).unwrap_or_default();

        let (models, history) = tokio::join!(backend.models(), backend.history(user_id, None));

        let models = match models {
            Ok(models) if !models.is_empty() => models,
            Ok(_) => vec![default_model()],
            Err(err) => {
                warn!(error = %err, "model catalog unavailable, using fallback");
                vec![default_model()]
            }
        };

        let session = Session {
            user_id,
            selected_model: config.selected_model.unwrap_or_else(|| default_model().id),
            system_prompt: config.system_prompt.unwrap_or_default(),
            chat_id: None,
            chat_title: None,
        };

        let mut app = Self {
            should_quit: false,
            // The composer starts focused, like the web original
            input_mode: InputMode::Editing,

            transcript: Vec::new(),
            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            total_chat_lines: 0,

            input: String::new(),
            input_cursor: 0,
            pending_turn: None,

            animation_frame: 0,

            models,
            show_model_picker: false,
            model_state: ListState::default(),

            show_settings: false,
            settings_focus: SettingsFocus::Models,
            settings_model_state: ListState::default(),
            draft_prompt: String::new(),
            draft_cursor: 0,

            show_confirm_clear: false,

            show_chat_picker: false,
            chats: Vec::new(),
            chat_state: ListState::default(),
            show_rename_input: false,
            rename_input: String::new(),
            rename_cursor: 0,
            rename_target: None,

            session,
            theme,

            backend,
            host,
            config_path,
            next_token: 0,
        };

        match history {
            Ok(history) => app.rebuild_transcript(history),
            Err(err) => warn!(error = %err, "history unavailable, starting empty"),
        }

        app
    }

    fn timestamp() -> String {
        Local::now().format("%H:%M").to_string()
    }

    fn next_turn_token(&mut self) -> TurnToken {
        self.next_token += 1;
        TurnToken(self.next_token)
    }

    pub fn selected_model_label(&self) -> &str {
        self.models
            .iter()
            .find(|m| m.id == self.session.selected_model)
            .map(|m| m.label.as_str())
            .unwrap_or(self.session.selected_model.as_str())
    }

    pub fn active_chat_title(&self) -> &str {
        self.session.chat_title.as_deref().unwrap_or(MAIN_CHAT_TITLE)
    }

    pub fn push_message(&mut self, role: Role, content: String) {
        self.transcript.push(TranscriptEntry::Message(ChatMessage {
            role,
            content,
            timestamp: Self::timestamp(),
        }));
        self.scroll_to_bottom();
    }

    /// Replace the transcript with server history. The backend labels bot
    /// turns "assistant"; anything else renders as the user.
    pub fn rebuild_transcript(&mut self, history: Vec<HistoryEntry>) {
        self.transcript = history
            .into_iter()
            .map(|entry| {
                let role = if entry.role == "assistant" { Role::Bot } else { Role::User };
                TranscriptEntry::Message(ChatMessage {
                    role,
                    content: entry.content,
                    timestamp: Self::timestamp(),
                })
            })
            .collect();
        self.scroll_to_bottom();
    }

    /// Whether the send control renders enabled.
    pub fn send_enabled(&self) -> bool {
        !self.input.trim().is_empty()
    }

    /// Submit the composer content as a chat turn.
    ///
    /// Whitespace-only input is dropped without a request. The user message
    /// renders immediately; the reply arrives through [`Self::poll_pending`].
    /// One turn may be in flight at a time.
    pub fn send_message(&mut self) -> Option<TurnToken> {
        let text = self.input.trim();
        if text.is_empty() || self.pending_turn.is_some() {
            return None;
        }
        let text = text.to_string();

        self.input.clear();
        self.input_cursor = 0;
        self.push_message(Role::User, text.clone());

        let token = self.next_turn_token();
        self.transcript.push(TranscriptEntry::Pending(token));

        let request = ChatRequest {
            user_id: self.session.user_id,
            prompt: text,
            model_id: self.session.selected_model.clone(),
            system_prompt: self.session.system_prompt.clone(),
            chat_id: self.session.chat_id,
        };
        let backend = Arc::clone(&self.backend);
        let task = tokio::spawn(async move { backend.chat(request).await });

        self.pending_turn = Some(PendingTurn { token, task });
        self.scroll_to_bottom();
        Some(token)
    }

    /// Apply the outcome of a finished turn: drop the placeholder by token,
    /// then append the reply or the matching failure message.
    pub fn resolve_turn(&mut self, token: TurnToken, outcome: Result<ChatReply>) {
        self.transcript
            .retain(|entry| !matches!(entry, TranscriptEntry::Pending(t) if *t == token));

        match outcome {
            Ok(reply) if reply.success => {
                self.push_message(Role::Bot, reply.response);
                self.host.haptic(Haptic::Success);
            }
            Ok(reply) => {
                let content = if reply.response.is_empty() {
                    SOFT_FAILURE_TEXT.to_string()
                } else {
                    format!("{} ({})", SOFT_FAILURE_TEXT, reply.response)
                };
                self.push_message(Role::Bot, content);
            }
            Err(err) => {
                warn!(error = %err, "chat turn failed");
                self.push_message(Role::Bot, HARD_FAILURE_TEXT.to_string());
            }
        }
    }

    /// Pick up the in-flight turn once its task has finished.
    pub async fn poll_pending(&mut self) {
        let finished = self
            .pending_turn
            .as_ref()
            .map(|p| p.task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(pending) = self.pending_turn.take() {
            let outcome = match pending.task.await {
                Ok(outcome) => outcome,
                Err(err) => Err(anyhow!("chat task aborted: {err}")),
            };
            self.resolve_turn(pending.token, outcome);
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.pending_turn.is_some() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Transcript scrolling
    pub fn scroll_down(&mut self) {
        if self.chat_scroll < self.total_chat_lines.saturating_sub(self.chat_height) {
            self.chat_scroll = self.chat_scroll.saturating_add(1);
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Keep the newest entry visible. Line counts are estimated with the
    /// same wrap math the renderer uses; character counts, not bytes, so
    /// multi-byte text doesn't overshoot.
    pub fn scroll_to_bottom(&mut self) {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for entry in &self.transcript {
            match entry {
                TranscriptEntry::Message(msg) => {
                    total_lines += 1; // role line
                    for line in msg.content.lines() {
                        let char_count = line.chars().count();
                        if char_count == 0 {
                            total_lines += 1;
                        } else {
                            total_lines += ((char_count / wrap_width) + 1) as u16;
                        }
                    }
                    total_lines += 1; // blank line after message
                }
                TranscriptEntry::Pending(_) => {
                    total_lines += 3; // role line + indicator + blank
                }
            }
        }

        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };
        self.chat_scroll = total_lines.saturating_sub(visible_height);
    }

    // Clear-history flow
    pub fn request_clear(&mut self) {
        self.show_confirm_clear = true;
    }

    pub fn cancel_clear(&mut self) {
        self.show_confirm_clear = false;
    }

    /// Confirmed by the user: issue the clear request, and only on a
    /// successful acknowledgement empty the transcript.
    pub async fn confirm_clear(&mut self) {
        self.show_confirm_clear = false;

        match self
            .backend
            .clear_history(self.session.user_id, self.session.chat_id)
            .await
        {
            Ok(true) => {
                self.transcript.clear();
                self.chat_scroll = 0;
                self.host.haptic(Haptic::Success);
                info!(user_id = self.session.user_id, "history cleared");
            }
            Ok(false) => warn!("history clear refused by server"),
            Err(err) => warn!(error = %err, "history clear failed"),
        }
    }

    // Model picker
    pub fn open_model_picker(&mut self) {
        let current = self
            .models
            .iter()
            .position(|m| m.id == self.session.selected_model)
            .unwrap_or(0);
        self.model_state.select(Some(current));
        self.show_model_picker = true;
    }

    pub fn model_nav_down(&mut self) {
        let len = self.models.len();
        if len > 0 {
            let i = self.model_state.selected().unwrap_or(0);
            self.model_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn model_nav_up(&mut self) {
        let i = self.model_state.selected().unwrap_or(0);
        self.model_state.select(Some(i.saturating_sub(1)));
    }

    pub fn select_model(&mut self) {
        if let Some(i) = self.model_state.selected() {
            if let Some(model) = self.models.get(i) {
                self.session.selected_model = model.id.clone();
                self.show_model_picker = false;
                if let Err(err) = Config::save_selected_model(&self.config_path, &self.session.selected_model) {
                    warn!(error = %err, "could not persist model choice");
                }
            }
        }
    }

    // Settings overlay
    pub fn open_settings(&mut self) {
        let current = self
            .models
            .iter()
            .position(|m| m.id == self.session.selected_model)
            .unwrap_or(0);
        self.settings_model_state.select(Some(current));
        self.draft_prompt = self.session.system_prompt.clone();
        self.draft_cursor = self.draft_prompt.chars().count();
        self.settings_focus = SettingsFocus::Models;
        self.show_settings = true;
    }

    pub fn toggle_settings_focus(&mut self) {
        self.settings_focus = match self.settings_focus {
            SettingsFocus::Models => SettingsFocus::Prompt,
            SettingsFocus::Prompt => SettingsFocus::Models,
        };
    }

    pub fn settings_model_nav_down(&mut self) {
        let len = self.models.len();
        if len > 0 {
            let i = self.settings_model_state.selected().unwrap_or(0);
            self.settings_model_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn settings_model_nav_up(&mut self) {
        let i = self.settings_model_state.selected().unwrap_or(0);
        self.settings_model_state.select(Some(i.saturating_sub(1)));
    }

    /// Discard the draft without touching the session.
    pub fn close_settings(&mut self) {
        self.show_settings = false;
        self.draft_prompt.clear();
        self.draft_cursor = 0;
    }

    /// Commit the settings draft: update the session, write both preferences
    /// to disk, dismiss the overlay. The prompt is free-form, no validation.
    pub fn save_settings(&mut self) {
        if let Some(i) = self.settings_model_state.selected() {
            if let Some(model) = self.models.get(i) {
                self.session.selected_model = model.id.clone();
            }
        }
        self.session.system_prompt = self.draft_prompt.clone();

        let config = Config {
            selected_model: Some(self.session.selected_model.clone()),
            system_prompt: Some(self.session.system_prompt.clone()),
        };
        if let Err(err) = config.save_to(&self.config_path) {
            warn!(error = %err, "could not persist settings");
        }

        self.close_settings();
    }

    // Conversation picker
    pub async fn open_chat_picker(&mut self) {
        match self.backend.chats(self.session.user_id).await {
            Ok(chats) if !chats.is_empty() => self.chats = chats,
            Ok(_) => {
                self.chats = vec![ChatDescriptor {
                    id: None,
                    title: MAIN_CHAT_TITLE.to_string(),
                }]
            }
            Err(err) => {
                warn!(error = %err, "conversation list unavailable");
                self.chats = vec![ChatDescriptor {
                    id: None,
                    title: MAIN_CHAT_TITLE.to_string(),
                }];
            }
        }

        let current = self
            .chats
            .iter()
            .position(|c| c.id == self.session.chat_id)
            .unwrap_or(0);
        self.chat_state.select(Some(current));
        self.show_chat_picker = true;
    }

    pub fn chat_nav_down(&mut self) {
        let len = self.chats.len();
        if len > 0 {
            let i = self.chat_state.selected().unwrap_or(0);
            self.chat_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn chat_nav_up(&mut self) {
        let i = self.chat_state.selected().unwrap_or(0);
        self.chat_state.select(Some(i.saturating_sub(1)));
    }

    fn selected_chat(&self) -> Option<&ChatDescriptor> {
        self.chat_state.selected().and_then(|i| self.chats.get(i))
    }

    /// Switch the session to the highlighted conversation and reload its
    /// history.
    pub async fn select_chat(&mut self) {
        let Some(chat) = self.selected_chat().cloned() else {
            return;
        };
        self.session.chat_id = chat.id;
        self.session.chat_title = chat.id.map(|_| chat.title);
        self.show_chat_picker = false;
        self.reload_history().await;
    }

    pub async fn create_chat(&mut self) {
        match self
            .backend
            .create_chat(self.session.user_id, NEW_CHAT_TITLE)
            .await
        {
            Ok(Some(chat_id)) => {
                self.session.chat_id = Some(chat_id);
                self.session.chat_title = Some(NEW_CHAT_TITLE.to_string());
                self.transcript.clear();
                self.chat_scroll = 0;
                self.show_chat_picker = false;
            }
            Ok(None) => warn!("server refused to create a conversation"),
            Err(err) => warn!(error = %err, "conversation create failed"),
        }
    }

    pub async fn delete_selected_chat(&mut self) {
        let Some(chat) = self.selected_chat().cloned() else {
            return;
        };
        // The main conversation cannot be deleted, only cleared
        let Some(chat_id) = chat.id else {
            return;
        };

        match self.backend.delete_chat(self.session.user_id, chat_id).await {
            Ok(true) => {
                self.chats.retain(|c| c.id != Some(chat_id));
                self.chat_state.select(Some(0));
                if self.session.chat_id == Some(chat_id) {
                    self.session.chat_id = None;
                    self.session.chat_title = None;
                    self.reload_history().await;
                }
            }
            Ok(false) => warn!("server refused to delete conversation"),
            Err(err) => warn!(error = %err, "conversation delete failed"),
        }
    }

    pub fn open_rename_input(&mut self) {
        let Some(chat) = self.selected_chat() else {
            return;
        };
        let Some(chat_id) = chat.id else {
            return;
        };
        let title = chat.title.clone();
        self.rename_target = Some(chat_id);
        self.rename_input = title;
        self.rename_cursor = self.rename_input.chars().count();
        self.show_rename_input = true;
    }

    pub fn cancel_rename(&mut self) {
        self.show_rename_input = false;
        self.rename_input.clear();
        self.rename_cursor = 0;
        self.rename_target = None;
    }

    pub async fn confirm_rename(&mut self) {
        let Some(chat_id) = self.rename_target else {
            self.cancel_rename();
            return;
        };
        let title = self.rename_input.trim().to_string();
        if title.is_empty() {
            self.cancel_rename();
            return;
        }

        match self
            .backend
            .rename_chat(self.session.user_id, chat_id, &title)
            .await
        {
            Ok(true) => {
                if let Some(chat) = self.chats.iter_mut().find(|c| c.id == Some(chat_id)) {
                    chat.title = title.clone();
                }
                if self.session.chat_id == Some(chat_id) {
                    self.session.chat_title = Some(title);
                }
            }
            Ok(false) => warn!("server refused to rename conversation"),
            Err(err) => warn!(error = %err, "conversation rename failed"),
        }

        self.cancel_rename();
    }

    /// Re-fetch history for the active conversation. On failure the
    /// transcript keeps its current content.
    pub async fn reload_history(&mut self) {
        match self
            .backend
            .history(self.session.user_id, self.session.chat_id)
            .await
        {
            Ok(history) => self.rebuild_transcript(history),
            Err(err) => warn!(error = %err, "history reload failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct StubBackend {
        models: Option<Vec<ModelDescriptor>>,
        history: Option<Vec<HistoryEntry>>,
        reply: Option<ChatReply>,
        chat_requests: Mutex<Vec<ChatRequest>>,
        history_requests: Mutex<Vec<Option<i64>>>,
        clear_calls: Mutex<usize>,
    }

    impl Default for StubBackend {
        fn default() -> Self {
            Self {
                models: Some(vec![
                    ModelDescriptor {
                        id: "yandexgpt/rc".to_string(),
                        label: "YandexGPT 5.1 Pro".to_string(),
                    },
                    ModelDescriptor {
                        id: "deepseek-reasoner".to_string(),
                        label: "DeepSeek Reasoner".to_string(),
                    },
                ]),
                history: Some(Vec::new()),
                reply: Some(ChatReply {
                    success: true,
                    response: "ok".to_string(),
                }),
                chat_requests: Mutex::new(Vec::new()),
                history_requests: Mutex::new(Vec::new()),
                clear_calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Backend for StubBackend {
        async fn models(&self) -> Result<Vec<ModelDescriptor>> {
            self.models.clone().ok_or_else(|| anyhow!("offline"))
        }

        async fn history(&self, _user_id: i64, chat_id: Option<i64>) -> Result<Vec<HistoryEntry>> {
            self.history_requests.lock().unwrap().push(chat_id);
            self.history.clone().ok_or_else(|| anyhow!("offline"))
        }

        async fn clear_history(&self, _user_id: i64, _chat_id: Option<i64>) -> Result<bool> {
            *self.clear_calls.lock().unwrap() += 1;
            Ok(true)
        }

        async fn chat(&self, request: ChatRequest) -> Result<ChatReply> {
            self.chat_requests.lock().unwrap().push(request);
            self.reply.clone().ok_or_else(|| anyhow!("offline"))
        }

        async fn chats(&self, _user_id: i64) -> Result<Vec<ChatDescriptor>> {
            Ok(vec![
                ChatDescriptor {
                    id: None,
                    title: MAIN_CHAT_TITLE.to_string(),
                },
                ChatDescriptor {
                    id: Some(4),
                    title: "Rust help".to_string(),
                },
            ])
        }

        async fn create_chat(&self, _user_id: i64, _title: &str) -> Result<Option<i64>> {
            Ok(Some(99))
        }

        async fn delete_chat(&self, _user_id: i64, _chat_id: i64) -> Result<bool> {
            Ok(true)
        }

        async fn rename_chat(&self, _user_id: i64, _chat_id: i64, _title: &str) -> Result<bool> {
            Ok(true)
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        haptics: Mutex<Vec<Haptic>>,
    }

    impl Host for RecordingHost {
        fn user_id(&self) -> Option<i64> {
            Some(7)
        }

        fn haptic(&self, kind: Haptic) {
            self.haptics.lock().unwrap().push(kind);
        }
    }

    async fn app_with(backend: Arc<StubBackend>, host: Arc<RecordingHost>) -> (App, TempDir) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let app = App::initialize(backend, host, Config::new(), path).await;
        (app, dir)
    }

    async fn finish_turn(app: &mut App) {
        let pending = app.pending_turn.take().expect("turn in flight");
        let outcome = pending.task.await.expect("task join");
        app.resolve_turn(pending.token, outcome);
    }

    fn messages(app: &App) -> Vec<(Role, String)> {
        app.transcript
            .iter()
            .filter_map(|entry| match entry {
                TranscriptEntry::Message(m) => Some((m.role, m.content.clone())),
                TranscriptEntry::Pending(_) => None,
            })
            .collect()
    }

    fn has_placeholder(app: &App) -> bool {
        app.transcript
            .iter()
            .any(|entry| matches!(entry, TranscriptEntry::Pending(_)))
    }

    #[tokio::test]
    async fn whitespace_only_input_sends_nothing() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(Arc::clone(&backend), Arc::default()).await;

        app.input = "  \n\t ".to_string();
        assert!(app.send_message().is_none());

        assert!(app.transcript.is_empty());
        assert!(backend.chat_requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_renders_user_message_and_placeholder() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(backend, Arc::default()).await;

        app.input = "Hello".to_string();
        app.send_message().unwrap();

        assert_eq!(messages(&app), vec![(Role::User, "Hello".to_string())]);
        assert!(has_placeholder(&app));
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn successful_turn_appends_one_bot_message() {
        let backend = Arc::new(StubBackend {
            reply: Some(ChatReply {
                success: true,
                response: "Hi".to_string(),
            }),
            ..Default::default()
        });
        let host = Arc::new(RecordingHost::default());
        let (mut app, _dir) = app_with(backend, Arc::clone(&host)).await;

        app.input = "Hello".to_string();
        app.send_message().unwrap();
        finish_turn(&mut app).await;

        assert_eq!(
            messages(&app),
            vec![
                (Role::User, "Hello".to_string()),
                (Role::Bot, "Hi".to_string()),
            ]
        );
        assert!(!has_placeholder(&app));
        assert_eq!(host.haptics.lock().unwrap().as_slice(), &[Haptic::Success]);
    }

    #[tokio::test]
    async fn logical_failure_appends_apology_with_detail() {
        let backend = Arc::new(StubBackend {
            reply: Some(ChatReply {
                success: false,
                response: "quota exceeded".to_string(),
            }),
            ..Default::default()
        });
        let host = Arc::new(RecordingHost::default());
        let (mut app, _dir) = app_with(backend, Arc::clone(&host)).await;

        app.input = "Hello".to_string();
        app.send_message().unwrap();
        finish_turn(&mut app).await;

        let messages = messages(&app);
        let (role, content) = messages.last().unwrap();
        assert_eq!(*role, Role::Bot);
        assert!(content.contains(SOFT_FAILURE_TEXT));
        assert!(content.contains("quota exceeded"));
        assert!(!has_placeholder(&app));
        assert!(host.haptics.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_appends_retry_message() {
        let backend = Arc::new(StubBackend {
            reply: None,
            ..Default::default()
        });
        let (mut app, _dir) = app_with(backend, Arc::default()).await;

        app.input = "Hello".to_string();
        app.send_message().unwrap();
        finish_turn(&mut app).await;

        let messages = messages(&app);
        assert_eq!(
            messages.last().unwrap(),
            &(Role::Bot, HARD_FAILURE_TEXT.to_string())
        );
        assert!(!has_placeholder(&app));
    }

    #[tokio::test]
    async fn only_one_turn_in_flight() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(backend, Arc::default()).await;

        app.input = "first".to_string();
        assert!(app.send_message().is_some());

        app.input = "second".to_string();
        assert!(app.send_message().is_none());

        let placeholders = app
            .transcript
            .iter()
            .filter(|e| matches!(e, TranscriptEntry::Pending(_)))
            .count();
        assert_eq!(placeholders, 1);
    }

    #[tokio::test]
    async fn history_roles_map_to_display_roles() {
        let backend = Arc::new(StubBackend {
            history: Some(vec![
                HistoryEntry {
                    role: "assistant".to_string(),
                    content: "Hello".to_string(),
                },
                HistoryEntry {
                    role: "user".to_string(),
                    content: "Hi".to_string(),
                },
            ]),
            ..Default::default()
        });
        let (app, _dir) = app_with(backend, Arc::default()).await;

        assert_eq!(
            messages(&app),
            vec![
                (Role::Bot, "Hello".to_string()),
                (Role::User, "Hi".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn model_catalog_failure_falls_back_to_default() {
        let backend = Arc::new(StubBackend {
            models: None,
            ..Default::default()
        });
        let (app, _dir) = app_with(backend, Arc::default()).await;

        assert_eq!(app.models, vec![default_model()]);
        assert_eq!(app.session.selected_model, default_model().id);
    }

    #[tokio::test]
    async fn history_failure_leaves_transcript_empty() {
        let backend = Arc::new(StubBackend {
            history: None,
            ..Default::default()
        });
        let (app, _dir) = app_with(backend, Arc::default()).await;

        assert!(app.transcript.is_empty());
    }

    #[tokio::test]
    async fn clear_without_confirmation_changes_nothing() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(Arc::clone(&backend), Arc::default()).await;

        app.push_message(Role::User, "keep".to_string());
        app.request_clear();
        app.cancel_clear();

        assert_eq!(messages(&app), vec![(Role::User, "keep".to_string())]);
        assert_eq!(*backend.clear_calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn confirmed_clear_posts_once_and_empties_transcript() {
        let backend = Arc::new(StubBackend::default());
        let host = Arc::new(RecordingHost::default());
        let (mut app, _dir) = app_with(Arc::clone(&backend), Arc::clone(&host)).await;

        app.push_message(Role::User, "gone".to_string());
        app.request_clear();
        app.confirm_clear().await;

        assert!(app.transcript.is_empty());
        assert_eq!(*backend.clear_calls.lock().unwrap(), 1);
        assert_eq!(host.haptics.lock().unwrap().as_slice(), &[Haptic::Success]);
    }

    #[tokio::test]
    async fn save_settings_commits_session_and_disk() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(backend, Arc::default()).await;

        app.open_settings();
        app.settings_model_nav_down();
        app.draft_prompt = "Answer briefly.".to_string();
        app.save_settings();

        assert_eq!(app.session.selected_model, "deepseek-reasoner");
        assert_eq!(app.session.system_prompt, "Answer briefly.");
        assert!(!app.show_settings);

        let stored = Config::load_from(&app.config_path).unwrap();
        assert_eq!(stored.selected_model.as_deref(), Some("deepseek-reasoner"));
        assert_eq!(stored.system_prompt.as_deref(), Some("Answer briefly."));
    }

    #[tokio::test]
    async fn dismissed_settings_draft_never_reaches_session() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(backend, Arc::default()).await;

        app.open_settings();
        app.draft_prompt = "unsaved".to_string();
        app.close_settings();

        assert_eq!(app.session.system_prompt, "");
    }

    #[tokio::test]
    async fn chat_request_snapshots_last_saved_preferences() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(Arc::clone(&backend), Arc::default()).await;

        app.open_settings();
        app.settings_model_nav_down();
        app.draft_prompt = "Be terse.".to_string();
        app.save_settings();

        app.input = "question".to_string();
        app.send_message().unwrap();
        finish_turn(&mut app).await;

        let requests = backend.chat_requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user_id, 7);
        assert_eq!(requests[0].model_id, "deepseek-reasoner");
        assert_eq!(requests[0].system_prompt, "Be terse.");
        assert_eq!(requests[0].prompt, "question");
    }

    #[tokio::test]
    async fn switching_conversation_reloads_its_history() {
        let backend = Arc::new(StubBackend::default());
        let (mut app, _dir) = app_with(Arc::clone(&backend), Arc::default()).await;

        app.open_chat_picker().await;
        app.chat_nav_down();
        app.select_chat().await;

        assert_eq!(app.session.chat_id, Some(4));
        assert_eq!(app.active_chat_title(), "Rust help");
        // initialize + the switch
        assert_eq!(
            backend.history_requests.lock().unwrap().as_slice(),
            &[None, Some(4)]
        );
    }
}
