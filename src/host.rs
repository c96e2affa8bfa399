//! Host platform integration.
//!
//! The web original leaned on a messaging platform for identity, theming and
//! haptic feedback. Here the terminal plus process environment plays that
//! role, behind a trait so controller tests can observe the calls.

use std::io::Write;

use ratatui::style::Color;

/// Identifier used when the host supplies no user context (local development).
pub const FALLBACK_USER_ID: i64 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Haptic {
    Success,
}

/// Colors derived from the host's theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub accent: Color,
    pub user: Color,
    pub bot: Color,
}

impl Theme {
    pub fn with_accent(accent: Color) -> Self {
        Self {
            accent,
            user: Color::Green,
            bot: accent,
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::with_accent(Color::Cyan)
    }
}

pub trait Host: Send + Sync {
    /// Identity supplied by the host context, if any.
    fn user_id(&self) -> Option<i64>;

    /// Theme accent, if the host has one configured.
    fn accent(&self) -> Option<Color> {
        None
    }

    fn haptic(&self, kind: Haptic);
}

/// Terminal-backed host: identity comes from CLI/env, the success haptic is
/// the terminal bell.
pub struct TerminalHost {
    user_id: Option<i64>,
    accent: Option<Color>,
}

impl TerminalHost {
    pub fn new(user_id: Option<i64>, accent: Option<Color>) -> Self {
        Self { user_id, accent }
    }
}

impl Host for TerminalHost {
    fn user_id(&self) -> Option<i64> {
        self.user_id
    }

    fn accent(&self) -> Option<Color> {
        self.accent
    }

    fn haptic(&self, _kind: Haptic) {
        let mut stderr = std::io::stderr();
        let _ = stderr.write_all(b"\x07");
        let _ = stderr.flush();
    }
}
