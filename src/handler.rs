use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use crate::app::{App, InputMode, SettingsFocus};
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Cursor-aware editing shared by the composer, the prompt draft, and the
/// rename field. Returns false for keys the field doesn't consume.
fn edit_text(text: &mut String, cursor: &mut usize, key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
            true
        }
        KeyCode::Delete => {
            let char_count = text.chars().count();
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(text, *cursor);
                text.remove(byte_pos);
            }
            true
        }
        KeyCode::Left => {
            *cursor = cursor.saturating_sub(1);
            true
        }
        KeyCode::Right => {
            let char_count = text.chars().count();
            *cursor = (*cursor + 1).min(char_count);
            true
        }
        KeyCode::Home => {
            *cursor = 0;
            true
        }
        KeyCode::End => {
            *cursor = text.chars().count();
            true
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(text, *cursor);
            text.insert(byte_pos, c);
            *cursor += 1;
            true
        }
        _ => false,
    }
}

fn insert_newline(text: &mut String, cursor: &mut usize) {
    let byte_pos = char_to_byte_index(text, *cursor);
    text.insert(byte_pos, '\n');
    *cursor += 1;
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => {}
        AppEvent::Tick => {
            app.tick_animation();
            app.poll_pending().await;
        }
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Global quit, any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    // Overlays take the key stream, innermost first
    if app.show_rename_input {
        handle_rename_key(app, key).await;
        return Ok(());
    }
    if app.show_confirm_clear {
        handle_confirm_clear_key(app, key).await;
        return Ok(());
    }
    if app.show_settings {
        handle_settings_key(app, key);
        return Ok(());
    }
    if app.show_chat_picker {
        handle_chat_picker_key(app, key).await;
        return Ok(());
    }
    if app.show_model_picker {
        handle_model_picker_key(app, key);
        return Ok(());
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_key(app, key).await,
        InputMode::Editing => handle_editing_key(app, key),
    }
    Ok(())
}

async fn handle_normal_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,

        // Back to the composer
        KeyCode::Char('i') | KeyCode::Enter => {
            app.input_mode = InputMode::Editing;
            app.input_cursor = app.input.chars().count();
        }

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_up(),
        KeyCode::Char('g') => app.scroll_to_top(),
        KeyCode::Char('G') => app.scroll_to_bottom(),

        KeyCode::Char('m') => app.open_model_picker(),
        KeyCode::Char('s') => app.open_settings(),
        KeyCode::Char('c') => app.open_chat_picker().await,
        KeyCode::Char('x') => app.request_clear(),

        _ => {}
    }
}

fn handle_editing_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        // Enter sends; Shift+Enter keeps the newline
        KeyCode::Enter => {
            if key.modifiers.contains(KeyModifiers::SHIFT) {
                insert_newline(&mut app.input, &mut app.input_cursor);
            } else {
                app.send_message();
            }
        }
        _ => {
            edit_text(&mut app.input, &mut app.input_cursor, &key);
        }
    }
}

async fn handle_confirm_clear_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
            app.confirm_clear().await;
        }
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            app.cancel_clear();
        }
        _ => {}
    }
}

fn handle_model_picker_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_model_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.model_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.model_nav_up(),
        KeyCode::Enter => app.select_model(),
        _ => {}
    }
}

fn handle_settings_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.close_settings(),
        KeyCode::Tab => app.toggle_settings_focus(),
        KeyCode::Enter => {
            if key.modifiers.contains(KeyModifiers::SHIFT)
                && app.settings_focus == SettingsFocus::Prompt
            {
                insert_newline(&mut app.draft_prompt, &mut app.draft_cursor);
            } else {
                app.save_settings();
            }
        }
        KeyCode::Up => app.settings_model_nav_up(),
        KeyCode::Down => app.settings_model_nav_down(),
        _ => match app.settings_focus {
            SettingsFocus::Models => match key.code {
                KeyCode::Char('j') => app.settings_model_nav_down(),
                KeyCode::Char('k') => app.settings_model_nav_up(),
                _ => {}
            },
            SettingsFocus::Prompt => {
                edit_text(&mut app.draft_prompt, &mut app.draft_cursor, &key);
            }
        },
    }
}

async fn handle_chat_picker_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.show_chat_picker = false,
        KeyCode::Char('j') | KeyCode::Down => app.chat_nav_down(),
        KeyCode::Char('k') | KeyCode::Up => app.chat_nav_up(),
        KeyCode::Enter => app.select_chat().await,
        KeyCode::Char('n') => app.create_chat().await,
        KeyCode::Char('d') => app.delete_selected_chat().await,
        KeyCode::Char('r') => app.open_rename_input(),
        _ => {}
    }
}

async fn handle_rename_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => app.cancel_rename(),
        KeyCode::Enter => app.confirm_rename().await,
        _ => {
            edit_text(&mut app.rename_input, &mut app.rename_cursor, &key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use async_trait::async_trait;
    use crate::api::{Backend, ChatDescriptor, ChatReply, ChatRequest, HistoryEntry, ModelDescriptor};
    use crate::config::Config;
    use crate::host::{Haptic, Host};

    struct NullBackend;

    #[async_trait]
    impl Backend for NullBackend {
        async fn models(&self) -> Result<Vec<ModelDescriptor>> {
            Ok(Vec::new())
        }
        async fn history(&self, _user_id: i64, _chat_id: Option<i64>) -> Result<Vec<HistoryEntry>> {
            Ok(Vec::new())
        }
        async fn clear_history(&self, _user_id: i64, _chat_id: Option<i64>) -> Result<bool> {
            Ok(true)
        }
        async fn chat(&self, _request: ChatRequest) -> Result<ChatReply> {
            Ok(ChatReply {
                success: true,
                response: String::new(),
            })
        }
        async fn chats(&self, _user_id: i64) -> Result<Vec<ChatDescriptor>> {
            Ok(Vec::new())
        }
        async fn create_chat(&self, _user_id: i64, _title: &str) -> Result<Option<i64>> {
            Ok(None)
        }
        async fn delete_chat(&self, _user_id: i64, _chat_id: i64) -> Result<bool> {
            Ok(true)
        }
        async fn rename_chat(&self, _user_id: i64, _chat_id: i64, _title: &str) -> Result<bool> {
            Ok(true)
        }
    }

    struct NullHost;

    impl Host for NullHost {
        fn user_id(&self) -> Option<i64> {
            None
        }
        fn haptic(&self, _kind: Haptic) {}
    }

    async fn editing_app() -> (App, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        let app = App::initialize(Arc::new(NullBackend), Arc::new(NullHost), Config::new(), path).await;
        (app, dir)
    }

    #[tokio::test]
    async fn enter_submits_the_composer() {
        let (mut app, _dir) = editing_app().await;
        assert_eq!(app.input_mode, InputMode::Editing);

        for c in "hi there".chars() {
            handle_key(&mut app, KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
                .await
                .unwrap();
        }
        handle_key(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE))
            .await
            .unwrap();

        assert!(app.pending_turn.is_some());
        assert!(app.input.is_empty());
    }

    #[tokio::test]
    async fn shift_enter_inserts_a_newline_instead() {
        let (mut app, _dir) = editing_app().await;

        handle_key(&mut app, KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE))
            .await
            .unwrap();
        handle_key(&mut app, KeyEvent::new(KeyCode::Enter, KeyModifiers::SHIFT))
            .await
            .unwrap();
        handle_key(&mut app, KeyEvent::new(KeyCode::Char('b'), KeyModifiers::NONE))
            .await
            .unwrap();

        assert_eq!(app.input, "a\nb");
        assert!(app.pending_turn.is_none());
    }

    #[tokio::test]
    async fn editing_is_utf8_safe() {
        let (mut app, _dir) = editing_app().await;

        for c in "héllo".chars() {
            handle_key(&mut app, KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE))
                .await
                .unwrap();
        }
        handle_key(&mut app, KeyEvent::new(KeyCode::Left, KeyModifiers::NONE))
            .await
            .unwrap();
        handle_key(&mut app, KeyEvent::new(KeyCode::Backspace, KeyModifiers::NONE))
            .await
            .unwrap();

        assert_eq!(app.input, "hélo");
    }
}
