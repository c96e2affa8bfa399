use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};
use crate::app::{App, ChatMessage, InputMode, Role, SettingsFocus, TranscriptEntry};
use crate::format::{Block as TextBlock, Inline, format_text};

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(input_height(app)),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_transcript(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);

    // Overlays (in order of priority)
    if app.show_model_picker {
        render_model_picker(app, frame, area);
    }
    if app.show_chat_picker {
        render_chat_picker(app, frame, area);
    }
    if app.show_settings {
        render_settings(app, frame, area);
    }
    if app.show_confirm_clear {
        render_confirm_clear(app, frame, area);
    }
    if app.show_rename_input {
        render_rename_input(app, frame, area);
    }
}

fn overlay_open(app: &App) -> bool {
    app.show_model_picker
        || app.show_chat_picker
        || app.show_settings
        || app.show_confirm_clear
        || app.show_rename_input
}

/// Composer height: grow-only auto-size recomputed from the content each
/// frame, plus borders.
fn input_height(app: &App) -> u16 {
    let lines = app.input.split('\n').count() as u16;
    lines.clamp(1, 5) + 2
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" charla ", Style::default().fg(app.theme.accent).bold()),
        Span::styled(
            format!(" {} ", app.selected_model_label()),
            Style::default().fg(Color::White),
        ),
        Span::styled(
            format!("· {} ", app.active_chat_title()),
            Style::default().fg(Color::Gray),
        ),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn message_lines(app: &App, msg: &ChatMessage) -> Vec<Line<'static>> {
    let (name, color) = match msg.role {
        Role::User => ("You", app.theme.user),
        Role::Bot => ("Bot", app.theme.bot),
    };

    let mut lines = vec![Line::from(vec![
        Span::styled(name.to_string(), Style::default().fg(color).bold()),
        Span::raw("  "),
        Span::styled(msg.timestamp.clone(), Style::default().fg(Color::DarkGray)),
    ])];

    for block in format_text(&msg.content) {
        match block {
            TextBlock::Paragraph(paragraph) => {
                for runs in paragraph {
                    let spans: Vec<Span<'static>> = runs
                        .into_iter()
                        .map(|run| match run {
                            Inline::Text(text) => Span::raw(text),
                            Inline::Code(code) => {
                                Span::styled(code, Style::default().fg(Color::Yellow))
                            }
                        })
                        .collect();
                    lines.push(Line::from(spans));
                }
            }
            TextBlock::Code(code) => {
                for code_line in code.trim_matches('\n').lines() {
                    lines.push(Line::from(Span::styled(
                        format!("  {}", code_line),
                        Style::default().fg(Color::White).bg(Color::Black),
                    )));
                }
            }
        }
    }

    lines.push(Line::default());
    lines
}

fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();

    for entry in &app.transcript {
        match entry {
            TranscriptEntry::Message(msg) => lines.extend(message_lines(app, msg)),
            TranscriptEntry::Pending(_) => {
                let dots = ".".repeat(app.animation_frame as usize + 1);
                lines.push(Line::from(Span::styled(
                    "Bot".to_string(),
                    Style::default().fg(app.theme.bot).bold(),
                )));
                lines.push(Line::from(Span::styled(
                    format!("typing{}", dots),
                    Style::default().fg(Color::DarkGray).italic(),
                )));
                lines.push(Line::default());
            }
        }
    }

    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "No messages yet. Say hi!".to_string(),
            Style::default().fg(Color::DarkGray),
        )));
    }

    lines
}

fn render_transcript(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(format!(" {} ", app.active_chat_title()));
    let inner = block.inner(area);

    // Dimensions feed the scroll math in app.rs
    app.chat_width = inner.width;
    app.chat_height = inner.height;

    let lines = transcript_lines(app);
    let wrap_width = inner.width.max(1) as usize;
    let mut total: u16 = 0;
    for line in &lines {
        let width = line.width();
        if width == 0 {
            total += 1;
        } else {
            total += ((width / wrap_width) + 1) as u16;
        }
    }
    app.total_chat_lines = total;

    let paragraph = Paragraph::new(Text::from(lines))
        .wrap(Wrap { trim: false })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(block, area);
    frame.render_widget(paragraph, inner);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let focused = app.input_mode == InputMode::Editing && !overlay_open(app);
    let border_style = if focused {
        Style::default().fg(app.theme.accent)
    } else {
        Style::default().fg(Color::DarkGray)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style)
        .title(" Message ");
    let inner = block.inner(area);

    frame.render_widget(block, area);
    frame.render_widget(Paragraph::new(app.input.as_str()), inner);

    if focused {
        let (mut row, mut col) = (0u16, 0u16);
        for c in app.input.chars().take(app.input_cursor) {
            if c == '\n' {
                row += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        let x = inner.x + col.min(inner.width.saturating_sub(1));
        let y = inner.y + row.min(inner.height.saturating_sub(1));
        frame.set_cursor_position((x, y));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);
    let disabled_style = Style::default().bg(Color::Black).fg(Color::DarkGray);

    let hints = match app.input_mode {
        InputMode::Editing => {
            // The send hint doubles as the enabled/disabled send control
            let send_style = if app.send_enabled() { key_style } else { disabled_style };
            vec![
                Span::styled(" Enter ", send_style),
                Span::styled(" send ", if app.send_enabled() { label_style } else { disabled_style }),
                Span::styled(" Shift+Enter ", key_style),
                Span::styled(" newline ", label_style),
                Span::styled(" Esc ", key_style),
                Span::styled(" menu ", label_style),
            ]
        }
        InputMode::Normal => vec![
            Span::styled(" i ", key_style),
            Span::styled(" write ", label_style),
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" m ", key_style),
            Span::styled(" model ", label_style),
            Span::styled(" s ", key_style),
            Span::styled(" settings ", label_style),
            Span::styled(" c ", key_style),
            Span::styled(" chats ", label_style),
            Span::styled(" x ", key_style),
            Span::styled(" clear ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
    };

    frame.render_widget(Paragraph::new(Line::from(hints)), area);
}

fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn render_model_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let height = (app.models.len() as u16 + 2).min(area.height.saturating_sub(2)).max(3);
    let popup = centered_rect(44, height, area);

    let items: Vec<ListItem> = app
        .models
        .iter()
        .map(|m| {
            let marker = if m.id == app.session.selected_model { "● " } else { "  " };
            ListItem::new(format!("{}{}", marker, m.label))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.accent))
                .title(" Model  (Enter select, Esc close) "),
        )
        .highlight_style(Style::default().fg(app.theme.accent).reversed())
        .highlight_symbol("> ");

    frame.render_widget(Clear, popup);
    frame.render_stateful_widget(list, popup, &mut app.model_state);
}

fn render_chat_picker(app: &mut App, frame: &mut Frame, area: Rect) {
    let height = (app.chats.len() as u16 + 2).min(area.height.saturating_sub(2)).max(3);
    let popup = centered_rect(48, height, area);

    let items: Vec<ListItem> = app
        .chats
        .iter()
        .map(|c| {
            let marker = if c.id == app.session.chat_id { "● " } else { "  " };
            ListItem::new(format!("{}{}", marker, c.title))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(app.theme.accent))
                .title(" Chats  (Enter open, n new, r rename, d delete) "),
        )
        .highlight_style(Style::default().fg(app.theme.accent).reversed())
        .highlight_symbol("> ");

    frame.render_widget(Clear, popup);
    frame.render_stateful_widget(list, popup, &mut app.chat_state);
}

fn render_settings(app: &mut App, frame: &mut Frame, area: Rect) {
    let model_rows = (app.models.len() as u16).clamp(1, 8);
    let popup = centered_rect(56, model_rows + 8, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.accent))
        .title(" Settings  (Tab field, Enter save, Esc cancel) ");
    let inner = block.inner(popup);

    frame.render_widget(Clear, popup);
    frame.render_widget(block, popup);

    let [models_area, prompt_area] = Layout::vertical([
        Constraint::Length(model_rows + 2),
        Constraint::Min(3),
    ])
    .areas(inner);

    let focus_style = Style::default().fg(app.theme.accent);
    let blur_style = Style::default().fg(Color::DarkGray);

    let items: Vec<ListItem> = app
        .models
        .iter()
        .map(|m| ListItem::new(m.label.clone()))
        .collect();
    let models = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(if app.settings_focus == SettingsFocus::Models {
                    focus_style
                } else {
                    blur_style
                })
                .title(" Model "),
        )
        .highlight_style(Style::default().fg(app.theme.accent).reversed())
        .highlight_symbol("> ");
    frame.render_stateful_widget(models, models_area, &mut app.settings_model_state);

    let prompt_block = Block::default()
        .borders(Borders::ALL)
        .border_style(if app.settings_focus == SettingsFocus::Prompt {
            focus_style
        } else {
            blur_style
        })
        .title(" System prompt ");
    let prompt_inner = prompt_block.inner(prompt_area);
    frame.render_widget(prompt_block, prompt_area);
    frame.render_widget(
        Paragraph::new(app.draft_prompt.as_str()).wrap(Wrap { trim: false }),
        prompt_inner,
    );

    if app.settings_focus == SettingsFocus::Prompt && prompt_inner.width > 0 {
        let (mut row, mut col) = (0u16, 0u16);
        for c in app.draft_prompt.chars().take(app.draft_cursor) {
            if c == '\n' {
                row += 1;
                col = 0;
            } else {
                col += 1;
            }
        }
        // Account for soft wrap inside the prompt box
        row += col / prompt_inner.width;
        col %= prompt_inner.width;
        let x = prompt_inner.x + col;
        let y = prompt_inner.y + row.min(prompt_inner.height.saturating_sub(1));
        frame.set_cursor_position((x, y));
    }
}

fn render_confirm_clear(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(44, 5, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red))
        .title(" Clear history ");
    let inner = block.inner(popup);

    frame.render_widget(Clear, popup);
    frame.render_widget(block, popup);

    let text = Text::from(vec![
        Line::from(format!(
            "Delete all messages in \"{}\"?",
            app.active_chat_title()
        )),
        Line::from(vec![
            Span::styled(" y ", Style::default().bg(Color::Red).fg(Color::White)),
            Span::raw(" yes   "),
            Span::styled(" n ", Style::default().bg(Color::DarkGray).fg(Color::White)),
            Span::raw(" no"),
        ]),
    ]);
    frame.render_widget(Paragraph::new(text).wrap(Wrap { trim: false }), inner);
}

fn render_rename_input(app: &App, frame: &mut Frame, area: Rect) {
    let popup = centered_rect(44, 3, area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(app.theme.accent))
        .title(" Rename chat  (Enter save, Esc cancel) ");
    let inner = block.inner(popup);

    frame.render_widget(Clear, popup);
    frame.render_widget(block, popup);
    frame.render_widget(Paragraph::new(app.rename_input.as_str()), inner);

    let col = (app.rename_cursor as u16).min(inner.width.saturating_sub(1));
    frame.set_cursor_position((inner.x + col, inner.y));
}
