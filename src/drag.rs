//! Drag gesture tracking.
//!
//! `DragCoordinator` follows one reorder gesture from grab to drop and turns
//! it into a single `move_task` call. Keyboard commands go through the same
//! slot arithmetic so both paths issue identical moves.

use crate::board::Board;
use crate::controller::{BoardController, MoveOutcome, MoveTicket};
use crate::error::{Error, Result};
use crate::fields::Status;

/// A position on the board: a column and an index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub status: Status,
    pub index: usize,
}

impl Slot {
    pub fn new(status: Status, index: usize) -> Self {
        Slot { status, index }
    }
}

/// Where a dropped or nudged task should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveIntent {
    pub task_id: u64,
    pub to: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Up,
    Down,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        task_id: u64,
        origin: Slot,
        preview: Option<Slot>,
    },
    Resolving {
        task_id: u64,
        generation: u64,
    },
}

#[derive(Debug, Default)]
pub struct DragCoordinator {
    state: DragState,
}

impl DragCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DragState {
        self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging { .. })
    }

    /// Task being dragged, if any.
    pub fn dragged(&self) -> Option<u64> {
        match self.state {
            DragState::Dragging { task_id, .. } => Some(task_id),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<Slot> {
        match self.state {
            DragState::Dragging { preview, .. } => preview,
            _ => None,
        }
    }

    /// Pick up `task_id`. Allowed while a previous drop is still resolving.
    pub fn begin(&mut self, board: &Board, task_id: u64) -> Result<Slot> {
        if let DragState::Dragging { task_id: current, .. } = self.state {
            return Err(Error::Conflict(format!("task {current} is already being dragged")));
        }
        let (status, index) = board.position_of(task_id).ok_or_else(|| Error::not_found("task", task_id))?;
        let origin = Slot::new(status, index);
        self.state = DragState::Dragging {
            task_id,
            origin,
            preview: Some(origin),
        };
        Ok(origin)
    }

    /// Record the slot under the pointer. `None` means outside every column.
    /// Returns the clamped preview slot.
    pub fn hover(&mut self, board: &Board, target: Option<Slot>) -> Option<Slot> {
        let DragState::Dragging { task_id, origin, .. } = self.state else {
            return None;
        };
        let preview = target.map(|slot| clamp(board, task_id, slot));
        self.state = DragState::Dragging { task_id, origin, preview };
        preview
    }

    /// Shift the preview one step, as the arrow keys do mid-drag.
    pub fn nudge(&mut self, board: &Board, command: KeyCommand) -> Option<Slot> {
        let DragState::Dragging { task_id, origin, preview } = self.state else {
            return None;
        };
        let from = preview.unwrap_or(origin);
        let next = step(board, task_id, from, command).unwrap_or(from);
        self.hover(board, Some(next))
    }

    pub fn cancel(&mut self) {
        if self.is_dragging() {
            self.state = DragState::Idle;
        }
    }

    /// End the gesture over `target` and return the move to make, if any.
    /// Dropping outside every column or back onto the origin yields nothing.
    pub fn release(&mut self, board: &Board, target: Option<Slot>) -> Option<MoveIntent> {
        let DragState::Dragging { task_id, origin, .. } = self.state else {
            return None;
        };
        self.state = DragState::Idle;
        let to = clamp(board, task_id, target?);
        (to != origin).then_some(MoveIntent { task_id, to })
    }

    /// Drop onto `target` and hand the move to the controller.
    pub fn drop_onto(&mut self, controller: &mut BoardController, target: Option<Slot>) -> Result<Option<MoveTicket>> {
        let Some(intent) = self.release(controller.board(), target) else {
            return Ok(None);
        };
        self.submit(controller, intent)
    }

    /// Drop at the current preview slot.
    pub fn drop_at_preview(&mut self, controller: &mut BoardController) -> Result<Option<MoveTicket>> {
        let target = self.preview();
        self.drop_onto(controller, target)
    }

    /// Keyboard move of a task that is not being dragged.
    pub fn key_move(
        &mut self,
        controller: &mut BoardController,
        task_id: u64,
        command: KeyCommand,
    ) -> Result<Option<MoveTicket>> {
        if self.dragged() == Some(task_id) {
            return Err(Error::Conflict(format!("task {task_id} is being dragged")));
        }
        match key_intent(controller.board(), task_id, command)? {
            Some(intent) => self.submit(controller, intent),
            None => Ok(None),
        }
    }

    /// Leave `Resolving` once the outcome of the tracked move arrives.
    pub fn resolve(&mut self, outcome: &MoveOutcome) {
        if let DragState::Resolving { task_id, generation } = self.state {
            if outcome.task_id() == task_id && outcome.generation() >= generation {
                self.state = DragState::Idle;
            }
        }
    }

    fn submit(&mut self, controller: &mut BoardController, intent: MoveIntent) -> Result<Option<MoveTicket>> {
        let ticket = controller.move_task(intent.task_id, intent.to.status, intent.to.index)?;
        if let Some(ticket) = ticket {
            if !self.is_dragging() {
                self.state = DragState::Resolving {
                    task_id: ticket.task_id,
                    generation: ticket.generation,
                };
            }
        }
        Ok(ticket)
    }
}

/// The move a keyboard command makes for `task_id`, or `None` at an edge.
pub fn key_intent(board: &Board, task_id: u64, command: KeyCommand) -> Result<Option<MoveIntent>> {
    let (status, index) = board.position_of(task_id).ok_or_else(|| Error::not_found("task", task_id))?;
    Ok(step(board, task_id, Slot::new(status, index), command).map(|to| MoveIntent { task_id, to }))
}

fn step(board: &Board, task_id: u64, from: Slot, command: KeyCommand) -> Option<Slot> {
    let to = match command {
        KeyCommand::Up => Slot::new(from.status, from.index.checked_sub(1)?),
        KeyCommand::Down if from.index < board.max_index(task_id, from.status) => {
            Slot::new(from.status, from.index + 1)
        }
        KeyCommand::Down => return None,
        KeyCommand::Left => Slot::new(Status::from_index(from.status.index().checked_sub(1)?)?, from.index),
        KeyCommand::Right => Slot::new(Status::from_index(from.status.index() + 1)?, from.index),
    };
    Some(clamp(board, task_id, to))
}

fn clamp(board: &Board, task_id: u64, slot: Slot) -> Slot {
    Slot::new(slot.status, slot.index.min(board.max_index(task_id, slot.status)))
}
