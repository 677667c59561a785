//! Color constants for the terminal user interface.

use ratatui::style::Color;

use crate::fields::{Priority, Status};

/// Used for the To Do column
pub const SLATE_BLUE: Color = Color::Rgb(70, 90, 160);
/// Used for the In Progress column
pub const GOLD: Color = Color::Rgb(255, 215, 0);
/// Used for the Done column
pub const DARK_GREEN: Color = Color::Rgb(0, 110, 40);
/// Used for high priority and failure notices
pub const DARK_RED: Color = Color::Rgb(150, 20, 20);
/// Used for cards awaiting confirmation
pub const DARK_PURPLE: Color = Color::Rgb(86, 60, 92);

pub fn status_color(status: Status) -> Color {
    match status {
        Status::Todo => SLATE_BLUE,
        Status::InProgress => GOLD,
        Status::Done => DARK_GREEN,
    }
}

pub fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Low => Color::Gray,
        Priority::Medium => Color::White,
        Priority::High => Color::LightRed,
    }
}

/// Readable foreground on top of `status_color`.
pub fn text_on(status: Status) -> Color {
    match status {
        Status::InProgress => Color::Rgb(20, 20, 20),
        _ => Color::White,
    }
}
