//! Board TUI entry point and setup.

use std::io;

use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{prelude::CrosstermBackend, Terminal};

use crate::controller::BoardController;
use crate::error::Result;
use crate::task::TaskFilter;
use crate::tui::board::BoardApp;

/// Initialise and run the Kanban board until the user quits.
pub async fn run_board(controller: BoardController, filter: TaskFilter) -> Result<()> {
    let mut app = BoardApp::new(controller, filter);
    app.reload().await;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = app.run(&mut terminal).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    // Let moves made just before quitting reach the store.
    app.finish().await;
    result
}
