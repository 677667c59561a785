//! Kanban board interface.
//!
//! Three columns, one per status. Cards move with Ctrl/Shift+arrows, or are
//! picked up with Space, carried with the arrows and dropped with Space. Moves
//! show up immediately and are confirmed in the background; a failed confirm
//! puts the card back and reports the error in the status bar.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    backend::Backend,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame, Terminal,
};
use tracing::warn;

use crate::controller::{BoardController, MoveOutcome, MoveTicket};
use crate::db::{format_due_relative, format_priority, format_status, today};
use crate::drag::{DragCoordinator, KeyCommand, Slot};
use crate::error::{Error, Result};
use crate::fields::Status;
use crate::task::{TaskDetail, TaskFilter};
use crate::tui::colors::{priority_color, status_color, text_on, DARK_PURPLE, DARK_RED};
use crate::view::{board_view, CardView, ColumnView};

const CARD_HEIGHT: usize = 5;

/// Main board application state
pub struct BoardApp {
    controller: BoardController,
    drag: DragCoordinator,
    filter: TaskFilter,
    selected_column: usize,
    selected_card: usize,
    column_scroll_offsets: [usize; 3],
    status_message: String,
    status_is_error: bool,
    detail: Option<TaskDetail>,
    quit: bool,
}

impl BoardApp {
    pub fn new(controller: BoardController, filter: TaskFilter) -> Self {
        BoardApp {
            controller,
            drag: DragCoordinator::new(),
            filter,
            selected_column: 0,
            selected_card: 0,
            column_scroll_offsets: [0; 3],
            status_message: String::new(),
            status_is_error: false,
            detail: None,
            quit: false,
        }
    }

    fn selected_status(&self) -> Status {
        Status::from_index(self.selected_column).unwrap_or(Status::Todo)
    }

    fn selected_task(&self) -> Option<u64> {
        self.controller
            .board()
            .column(self.selected_status())
            .get(self.selected_card)
            .copied()
    }

    /// Keep the cursor on an existing card.
    fn clamp_selection(&mut self) {
        let len = self.controller.board().column(self.selected_status()).len();
        if len == 0 {
            self.selected_card = 0;
        } else if self.selected_card >= len {
            self.selected_card = len - 1;
        }
    }

    /// Put the cursor on `task_id` wherever it currently sits.
    fn follow(&mut self, task_id: u64) {
        if let Some((status, index)) = self.controller.board().position_of(task_id) {
            self.selected_column = status.index();
            self.selected_card = index;
        }
    }

    fn set_status_message(&mut self, msg: String) {
        self.status_message = msg;
        self.status_is_error = false;
    }

    fn set_error(&mut self, context: &str, error: &Error) {
        self.status_message = format!("{context}: {error}");
        self.status_is_error = true;
    }

    fn clear_status_message(&mut self) {
        self.status_message.clear();
        self.status_is_error = false;
    }

    /// Reload the board from the store.
    pub async fn reload(&mut self) {
        match self.controller.load_tasks(&self.filter).await {
            Ok(n) => self.set_status_message(format!("Loaded {n} tasks")),
            Err(e) => self.set_error("Load failed", &e),
        }
        self.clamp_selection();
    }

    /// Wait for outstanding confirms before the board goes away.
    pub async fn finish(&mut self) {
        for outcome in self.controller.settle().await {
            if let MoveOutcome::RolledBack { task_id, error, .. } = outcome {
                warn!(task = task_id, %error, "move lost on exit");
            }
        }
    }

    /// Fold finished confirms into the UI.
    fn absorb_outcomes(&mut self) {
        for outcome in self.controller.poll_outcomes() {
            self.drag.resolve(&outcome);
            if let MoveOutcome::RolledBack { task_id, error, .. } = &outcome {
                self.set_error(&format!("Move of #{task_id} failed, card restored"), error);
            }
        }
        if !self.drag.is_dragging() {
            self.clamp_selection();
        }
    }

    fn after_move(&mut self, task_id: u64, moved: Result<Option<MoveTicket>>) {
        match moved {
            Ok(Some(_)) => {
                self.follow(task_id);
                let status = self.selected_status();
                self.set_status_message(format!("Moved #{task_id} to {}", format_status(status)));
            }
            Ok(None) => {}
            Err(e) => self.set_error("Move failed", &e),
        }
    }

    fn key_move(&mut self, command: KeyCommand) {
        let Some(task_id) = self.selected_task() else {
            return;
        };
        let moved = self.drag.key_move(&mut self.controller, task_id, command);
        self.after_move(task_id, moved);
    }

    fn grab_or_drop(&mut self) {
        if let Some(task_id) = self.drag.dragged() {
            let moved = self.drag.drop_at_preview(&mut self.controller);
            self.after_move(task_id, moved);
            if !self.drag.is_dragging() && self.status_message.starts_with("Dragging") {
                self.clear_status_message();
            }
            return;
        }
        let Some(task_id) = self.selected_task() else {
            return;
        };
        match self.drag.begin(self.controller.board(), task_id) {
            Ok(_) => self.set_status_message(format!(
                "Dragging #{task_id} | arrows: choose slot | Space: drop | Esc: cancel"
            )),
            Err(e) => self.set_error("Cannot pick up card", &e),
        }
    }

    async fn toggle_detail(&mut self) {
        if self.detail.take().is_some() {
            return;
        }
        let Some(task_id) = self.selected_task() else {
            return;
        };
        match self.controller.task_detail(task_id).await {
            Ok(detail) => self.detail = Some(detail),
            Err(e) => self.set_error("Cannot load task", &e),
        }
    }

    /// Handle one key press.
    pub async fn handle_key(&mut self, key: KeyEvent) {
        if self.detail.is_some() {
            if matches!(key.code, KeyCode::Enter | KeyCode::Esc | KeyCode::Char('q')) {
                self.detail = None;
            }
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);

        if self.drag.is_dragging() {
            let command = match key.code {
                KeyCode::Up => Some(KeyCommand::Up),
                KeyCode::Down => Some(KeyCommand::Down),
                KeyCode::Left => Some(KeyCommand::Left),
                KeyCode::Right => Some(KeyCommand::Right),
                _ => None,
            };
            if let Some(command) = command {
                self.drag.nudge(self.controller.board(), command);
                return;
            }
            match key.code {
                KeyCode::Char(' ') | KeyCode::Enter => self.grab_or_drop(),
                KeyCode::Esc => {
                    self.drag.cancel();
                    self.set_status_message("Drag cancelled".into());
                }
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Char('c') if ctrl => self.quit = true,
            KeyCode::Esc if !self.status_message.is_empty() => self.clear_status_message(),
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Left if ctrl || shift => self.key_move(KeyCommand::Left),
            KeyCode::Right if ctrl || shift => self.key_move(KeyCommand::Right),
            KeyCode::Up if ctrl || shift => self.key_move(KeyCommand::Up),
            KeyCode::Down if ctrl || shift => self.key_move(KeyCommand::Down),
            KeyCode::Left | KeyCode::Char('h') => {
                self.selected_column = self.selected_column.saturating_sub(1);
                self.clamp_selection();
            }
            KeyCode::Right | KeyCode::Char('l') => {
                self.selected_column = (self.selected_column + 1).min(Status::ALL.len() - 1);
                self.clamp_selection();
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_card = self.selected_card.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.selected_card += 1;
                self.clamp_selection();
            }
            KeyCode::Char(' ') => self.grab_or_drop(),
            KeyCode::Enter => self.toggle_detail().await,
            KeyCode::Char('r') => self.reload().await,
            _ => {}
        }
    }

    /// Main event loop
    pub async fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        while !self.quit {
            self.absorb_outcomes();
            terminal.draw(|f| self.render(f))?;
            if event::poll(Duration::from_millis(50))? {
                if let Event::Key(key) = event::read()? {
                    if key.kind == KeyEventKind::Press {
                        self.handle_key(key).await;
                    }
                }
            }
        }
        Ok(())
    }

    fn render(&mut self, f: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Board
                Constraint::Length(1), // Status bar
            ])
            .split(f.area());

        self.render_header(f, chunks[0]);
        self.render_board(f, chunks[1]);
        self.render_status_bar(f, chunks[2]);

        if let Some(detail) = &self.detail {
            render_detail_popup(f, detail);
        }
    }

    fn render_header(&self, f: &mut Frame, area: Rect) {
        let pending = if self.controller.has_pending() { "  syncing…" } else { "" };
        let header_text = vec![Line::from(vec![
            Span::styled("TASK BOARD", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw("  "),
            Span::styled(
                format!("{} tasks{pending}", self.controller.board().len()),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::ITALIC),
            ),
        ])];

        let header_block = Paragraph::new(header_text)
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center);
        f.render_widget(header_block, area);
    }

    fn render_board(&mut self, f: &mut Frame, area: Rect) {
        let columns = board_view(&self.controller, today());
        let columns_layout = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Ratio(1, 3); 3])
            .split(area);

        for (column, &column_area) in columns.iter().zip(columns_layout.iter()) {
            self.render_column(f, column_area, column);
        }
    }

    fn render_column(&mut self, f: &mut Frame, area: Rect, column: &ColumnView) {
        let index = column.drop_target().index();
        let is_selected = index == self.selected_column;
        let preview = self.drag.preview().filter(|slot| slot.status == column.status);
        let color = status_color(column.status);

        let border_style = if is_selected || preview.is_some() {
            Style::default().fg(color).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .title(format!(" {} ({}) ", column.title, column.count))
            .border_style(border_style);
        let inner = block.inner(area);
        f.render_widget(block, area);

        if let Some(message) = column.empty_message.filter(|_| preview.is_none()) {
            let empty = Paragraph::new(message)
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center);
            f.render_widget(empty, Rect { height: 1, ..inner });
            return;
        }

        let available_height = inner.height as usize;
        let visible_cards = (available_height / CARD_HEIGHT).max(1);
        let focus = match preview {
            Some(slot) => Some(slot.index),
            None if is_selected => Some(self.selected_card),
            None => None,
        };
        let mut scroll_offset = self.column_scroll_offsets[index];
        if let Some(focus) = focus {
            if focus < scroll_offset {
                scroll_offset = focus;
            } else if focus >= scroll_offset + visible_cards {
                scroll_offset = focus + 1 - visible_cards;
            }
        }
        self.column_scroll_offsets[index] = scroll_offset;

        let dragged = self.drag.dragged();
        let mut current_y = 0;
        let mut slot_index = 0;
        let mut drawn = 0;
        for card in &column.cards {
            if Some(card.id) == dragged && preview.is_some() {
                // The dragged card is drawn at its preview slot instead.
                continue;
            }
            if preview == Some(Slot::new(column.status, slot_index)) {
                if slot_index >= scroll_offset && current_y + CARD_HEIGHT <= available_height {
                    render_drop_slot(f, card_rect(inner, current_y), color);
                    current_y += CARD_HEIGHT;
                }
            }
            if slot_index >= scroll_offset {
                if current_y + CARD_HEIGHT > available_height {
                    break;
                }
                let selected = is_selected && preview.is_none() && slot_index == self.selected_card;
                self.render_card(f, card_rect(inner, current_y), card, selected);
                current_y += CARD_HEIGHT;
                drawn += 1;
            }
            slot_index += 1;
        }
        if let Some(slot) = preview {
            if slot.index >= slot_index && current_y + CARD_HEIGHT <= available_height {
                render_drop_slot(f, card_rect(inner, current_y), color);
            }
        }

        if scroll_offset > 0 {
            let indicator = Paragraph::new(format!("▲ +{scroll_offset} above")).style(Style::default().fg(Color::Cyan));
            f.render_widget(indicator, Rect { height: 1, ..inner });
        }
        let remaining = column.cards.len().saturating_sub(scroll_offset + drawn);
        if remaining > 0 && preview.is_none() && inner.height > 0 {
            let indicator = Paragraph::new(format!("▼ +{remaining} below")).style(Style::default().fg(Color::Cyan));
            f.render_widget(indicator, Rect { y: inner.y + inner.height - 1, height: 1, ..inner });
        }
    }

    fn render_card(&self, f: &mut Frame, area: Rect, card: &CardView, is_selected: bool) {
        let style = if is_selected {
            Style::default().bg(status_color(card.status)).fg(text_on(card.status)).add_modifier(Modifier::BOLD)
        } else if card.pending {
            Style::default().bg(DARK_PURPLE)
        } else {
            Style::default().bg(Color::DarkGray)
        };

        let mut card_text = vec![Line::from(vec![
            Span::raw(format!("{} #{} ", card.handle, card.id)),
            Span::raw(card.title.clone()),
        ])];
        if let Some(excerpt) = &card.excerpt {
            card_text.push(Line::from(Span::styled(excerpt.clone(), Style::default().add_modifier(Modifier::ITALIC))));
        }

        let mut meta = vec![Span::styled(card.priority_label, Style::default().fg(priority_color(card.priority)))];
        if let Some(due) = &card.due_label {
            let due_style = if card.overdue { Style::default().fg(Color::LightRed) } else { Style::default() };
            meta.push(Span::raw(" | "));
            meta.push(Span::styled(due.clone(), due_style));
        }
        if let Some(initials) = &card.assignee_initials {
            meta.push(Span::raw(format!(" | {initials}")));
        }
        if card.pending {
            meta.push(Span::raw(" | saving…"));
        }
        card_text.push(Line::from(meta));

        let card_block = Paragraph::new(card_text)
            .block(Block::default().borders(Borders::ALL))
            .style(style)
            .wrap(Wrap { trim: true });
        f.render_widget(card_block, area);
    }

    fn render_status_bar(&self, f: &mut Frame, area: Rect) {
        let status_text = if !self.status_message.is_empty() {
            self.status_message.clone()
        } else {
            "←/→: column | ↑/↓: card | Ctrl+arrows: move | Space: drag | Enter: details | r: reload | q: quit"
                .to_string()
        };
        let style = if self.status_is_error {
            Style::default().bg(DARK_RED).fg(Color::White)
        } else {
            let status = self.selected_status();
            Style::default().bg(status_color(status)).fg(text_on(status))
        };
        f.render_widget(Paragraph::new(status_text).style(style), area);
    }
}

fn card_rect(inner: Rect, y: usize) -> Rect {
    Rect {
        x: inner.x,
        y: inner.y + y as u16,
        width: inner.width,
        height: CARD_HEIGHT as u16,
    }
}

fn render_drop_slot(f: &mut Frame, area: Rect, color: Color) {
    let slot = Paragraph::new("drop here")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(color)));
    f.render_widget(slot, area);
}

fn render_detail_popup(f: &mut Frame, detail: &TaskDetail) {
    let popup_area = {
        let area = f.area();
        let popup_width = (area.width * 80) / 100;
        let popup_height = (area.height * 80) / 100;
        let x = (area.width - popup_width) / 2;
        let y = (area.height - popup_height) / 2;
        Rect::new(x, y, popup_width, popup_height)
    };
    f.render_widget(Clear, popup_area);

    let task = &detail.task;
    let mut lines = vec![
        Line::from(Span::styled(
            format!("Task #{}: {}", task.id, task.title),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(format!("Status:       {}", format_status(task.status))),
        Line::from(format!("Priority:     {}", format_priority(task.priority))),
        Line::from(format!("Due:          {}", format_due_relative(task.due_date, today()))),
        Line::from(format!("Assignee:     {}", task.assignee_id.as_deref().unwrap_or("-"))),
        Line::from(format!("Project:      {}", task.project_id.map_or_else(|| "-".into(), |p| p.to_string()))),
        Line::from(format!("Time logged:  {:.2}h", detail.total_hours)),
        Line::from(""),
        Line::from("Description:"),
        Line::from(task.description.as_deref().unwrap_or("-").to_string()),
    ];

    if !detail.children.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from("Subtasks:"));
        for child in &detail.children {
            lines.push(Line::from(format!("  - #{} {} [{}]", child.id, child.title, format_status(child.status))));
        }
    }
    if !detail.notes.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from("Notes:"));
        for note in &detail.notes {
            lines.push(Line::from(format!("  {}  {}", note.created_at.format("%Y-%m-%d"), note.text)));
        }
    }

    let popup_block = Block::default()
        .borders(Borders::ALL)
        .title("Task Details (Press Enter to close)")
        .title_alignment(Alignment::Center)
        .border_style(Style::default().fg(status_color(task.status)).add_modifier(Modifier::BOLD));
    let popup = Paragraph::new(lines)
        .block(popup_block)
        .wrap(Wrap { trim: true })
        .style(Style::default().bg(Color::Black));
    f.render_widget(popup, popup_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use ratatui::backend::TestBackend;

    use crate::db::Database;
    use crate::store::{LocalStore, TaskStore};
    use crate::task::{NewTask, Task, TaskPage, TaskPatch};

    /// Reads from an in-memory database and refuses every update.
    struct RejectingStore(LocalStore);

    #[async_trait]
    impl TaskStore for RejectingStore {
        async fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskPage> {
            self.0.list_tasks(filter).await
        }

        async fn get_task(&self, id: u64) -> Result<TaskDetail> {
            self.0.get_task(id).await
        }

        async fn create_task(&self, new: NewTask) -> Result<Task> {
            self.0.create_task(new).await
        }

        async fn update_task(&self, _id: u64, _patch: TaskPatch) -> Result<Task> {
            Err(Error::Network("connection reset".into()))
        }

        async fn delete_task(&self, id: u64) -> Result<()> {
            self.0.delete_task(id).await
        }
    }

    async fn app(titles: &[&str]) -> (BoardApp, Vec<u64>) {
        let store = LocalStore::in_memory(Database::default());
        let mut ids = Vec::new();
        for title in titles {
            ids.push(store.create_task(NewTask::titled(*title)).await.unwrap().id);
        }
        let store: Arc<dyn TaskStore> = Arc::new(store);
        let mut app = BoardApp::new(BoardController::new(store), TaskFilter::default());
        app.reload().await;
        (app, ids)
    }

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    fn screen(app: &mut BoardApp) -> String {
        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        terminal.backend().buffer().content.iter().map(|c| c.symbol()).collect()
    }

    #[tokio::test]
    async fn test_ctrl_arrows_move_selected_card() {
        let (mut app, ids) = app(&["Print test tile", "Email wholesaler"]).await;
        app.handle_key(key(KeyCode::Right, KeyModifiers::CONTROL)).await;
        assert_eq!(app.controller.board().position_of(ids[0]), Some((Status::InProgress, 0)));
        assert_eq!(app.selected_column, 1);

        app.controller.settle().await;
        app.handle_key(key(KeyCode::Left, KeyModifiers::NONE)).await;
        app.handle_key(key(KeyCode::Down, KeyModifiers::SHIFT)).await;
        assert_eq!(app.controller.board().column(Status::Todo), &[ids[1]]);
    }

    #[tokio::test]
    async fn test_space_drag_and_escape() {
        let (mut app, ids) = app(&["Calibrate bed", "Restock boxes"]).await;
        app.handle_key(key(KeyCode::Char(' '), KeyModifiers::NONE)).await;
        assert_eq!(app.drag.dragged(), Some(ids[0]));
        app.handle_key(key(KeyCode::Right, KeyModifiers::NONE)).await;
        app.handle_key(key(KeyCode::Right, KeyModifiers::NONE)).await;
        app.handle_key(key(KeyCode::Esc, KeyModifiers::NONE)).await;
        assert_eq!(app.drag.dragged(), None);
        assert_eq!(app.controller.board().position_of(ids[0]), Some((Status::Todo, 0)));
        assert!(!app.quit);

        app.handle_key(key(KeyCode::Char(' '), KeyModifiers::NONE)).await;
        app.handle_key(key(KeyCode::Down, KeyModifiers::NONE)).await;
        app.handle_key(key(KeyCode::Char(' '), KeyModifiers::NONE)).await;
        assert_eq!(app.controller.board().column(Status::Todo), &[ids[1], ids[0]]);
        assert_eq!(app.selected_card, 1);

        app.controller.settle().await;
        app.handle_key(key(KeyCode::Esc, KeyModifiers::NONE)).await;
        assert!(app.status_message.is_empty());
        assert!(!app.quit);
        app.handle_key(key(KeyCode::Char('q'), KeyModifiers::NONE)).await;
        assert!(app.quit);
    }

    #[tokio::test]
    async fn test_render_shows_columns_and_empty_state() {
        let (mut app, _) = app(&["Photograph dragon figurine"]).await;
        let text = screen(&mut app);
        assert!(text.contains("To Do (1)"));
        assert!(text.contains("In Progress (0)"));
        assert!(text.contains("No tasks"));
        assert!(text.contains("Photograph"));
    }

    #[tokio::test]
    async fn test_enter_opens_detail() {
        let (mut app, _) = app(&["Pack order 2211"]).await;
        app.handle_key(key(KeyCode::Enter, KeyModifiers::NONE)).await;
        assert!(app.detail.is_some());
        assert!(screen(&mut app).contains("Task Details"));
        app.handle_key(key(KeyCode::Enter, KeyModifiers::NONE)).await;
        assert!(app.detail.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_move_restores_card_and_shows_dismissible_error() {
        let local = LocalStore::in_memory(Database::default());
        let id = local.create_task(NewTask::titled("Ship order 3310")).await.unwrap().id;
        let store: Arc<dyn TaskStore> = Arc::new(RejectingStore(local));
        let mut app = BoardApp::new(BoardController::new(store), TaskFilter::default());
        app.reload().await;

        app.handle_key(key(KeyCode::Right, KeyModifiers::CONTROL)).await;
        assert_eq!(app.controller.board().position_of(id), Some((Status::InProgress, 0)));

        tokio::time::sleep(Duration::from_millis(10)).await;
        app.absorb_outcomes();
        assert!(app.status_is_error);
        assert!(app.status_message.contains("connection reset"));
        assert_eq!(app.controller.board().position_of(id), Some((Status::Todo, 0)));
        assert!(!app.controller.is_pending(id));
        assert_eq!(app.drag.state(), crate::drag::DragState::Idle);

        app.handle_key(key(KeyCode::Esc, KeyModifiers::NONE)).await;
        assert!(app.status_message.is_empty());
        assert!(!app.status_is_error);
        assert!(!app.quit);
    }
}
