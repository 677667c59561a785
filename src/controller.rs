//! Board state controller.
//!
//! Owns the `Board` cache and keeps it in step with a `TaskStore`. Moves are
//! applied to the cache first and confirmed in the background; the store's
//! answer then either replaces the optimistic record or rolls it back.
//!
//! Each task carries a generation counter that is bumped on every move. A
//! confirm only runs if its generation is still current when its turn comes,
//! and only the reply of the current generation touches the cache. Confirms
//! for one task are serialized: while one is in flight the next move waits in
//! a single-slot queue, so the store sees the moves in issue order and never
//! sees a move that was superseded before it was sent.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::board::Board;
use crate::error::{Error, Result};
use crate::fields::{SortKey, SortOrder, Status};
use crate::store::TaskStore;
use crate::task::{NewTask, Task, TaskDetail, TaskFilter, TaskPatch, MAX_PAGE_SIZE};

pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle for one issued move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MoveTicket {
    pub task_id: u64,
    pub generation: u64,
}

/// How a move ended.
#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    /// The store accepted the latest move; the cache holds its record.
    Confirmed { task: Task, generation: u64 },
    /// The latest move failed; the cache is back to the last confirmed record.
    RolledBack { task_id: u64, generation: u64, error: Error },
    /// A newer move (or a delete) made this one irrelevant.
    Superseded { task_id: u64, generation: u64 },
}

impl MoveOutcome {
    pub fn task_id(&self) -> u64 {
        match self {
            MoveOutcome::Confirmed { task, .. } => task.id,
            MoveOutcome::RolledBack { task_id, .. } | MoveOutcome::Superseded { task_id, .. } => *task_id,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            MoveOutcome::Confirmed { generation, .. }
            | MoveOutcome::RolledBack { generation, .. }
            | MoveOutcome::Superseded { generation, .. } => *generation,
        }
    }

    pub fn ticket(&self) -> MoveTicket {
        MoveTicket {
            task_id: self.task_id(),
            generation: self.generation(),
        }
    }
}

/// Confirm bookkeeping for a task with a confirm outstanding.
#[derive(Debug)]
struct Track {
    /// Last record the store is known to hold; restored on rollback.
    baseline: Task,
    in_flight: bool,
    queued: Option<(u64, TaskPatch)>,
}

#[derive(Debug)]
struct Reply {
    task_id: u64,
    generation: u64,
    /// `None` when the confirm went stale before it was sent.
    result: Option<Result<Task>>,
}

pub struct BoardController {
    store: Arc<dyn TaskStore>,
    board: Board,
    tracks: HashMap<u64, Track>,
    generations: HashMap<u64, Arc<AtomicU64>>,
    ready: VecDeque<MoveOutcome>,
    tx: UnboundedSender<Reply>,
    rx: UnboundedReceiver<Reply>,
    confirm_timeout: Duration,
}

impl BoardController {
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        BoardController {
            store,
            board: Board::default(),
            tracks: HashMap::new(),
            generations: HashMap::new(),
            ready: VecDeque::new(),
            tx,
            rx,
            confirm_timeout: DEFAULT_CONFIRM_TIMEOUT,
        }
    }

    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// True while a confirm for `task_id` is outstanding.
    pub fn is_pending(&self, task_id: u64) -> bool {
        self.tracks.contains_key(&task_id)
    }

    pub fn has_pending(&self) -> bool {
        !self.tracks.is_empty()
    }

    /// Replace the cache with every task matching `filter`. Returns the number loaded.
    ///
    /// Moves still awaiting confirmation survive the reload: the cache keeps
    /// their optimistic record and the loaded one becomes the rollback point.
    pub async fn load_tasks(&mut self, filter: &TaskFilter) -> Result<usize> {
        let mut query = TaskFilter {
            page: Some(1),
            limit: Some(MAX_PAGE_SIZE),
            sort_by: Some(SortKey::Order),
            sort_order: Some(SortOrder::Asc),
            ..filter.clone()
        };
        let mut tasks = Vec::new();
        loop {
            let page = self.store.list_tasks(&query).await?;
            tasks.extend(page.tasks);
            let current = page.pagination.current_page;
            if current >= page.pagination.total_pages {
                break;
            }
            query.page = Some(current + 1);
        }

        for task in &mut tasks {
            let Some(track) = self.tracks.get_mut(&task.id) else {
                continue;
            };
            track.baseline = task.clone();
            if let Some(optimistic) = self.board.get(task.id) {
                debug!(task = task.id, "reload kept pending move");
                *task = optimistic.clone();
            }
        }

        self.board.replace_all(tasks);
        info!(tasks = self.board.len(), "board loaded");
        Ok(self.board.len())
    }

    /// Move a task to `index` of the `status` column.
    ///
    /// The cache changes immediately; the store is updated in the background.
    /// `index` is the task's final position and is clamped to the column.
    /// Returns `None` when the task already sits in that slot.
    pub fn move_task(&mut self, task_id: u64, status: Status, index: usize) -> Result<Option<MoveTicket>> {
        let current = self
            .board
            .get(task_id)
            .cloned()
            .ok_or_else(|| Error::not_found("task", task_id))?;
        let index = index.min(self.board.max_index(task_id, status));
        if self.board.position_of(task_id) == Some((status, index)) {
            return Ok(None);
        }

        let order = match self.board.order_for_slot(task_id, status, index) {
            Some(order) => order,
            None => {
                self.respace(status, task_id);
                self.board
                    .order_for_slot(task_id, status, index)
                    .ok_or_else(|| Error::Conflict(format!("no room in {} column", status.as_str())))?
            }
        };
        self.track(&current);

        info!(task = task_id, from = current.status.as_str(), to = status.as_str(), index, "moving task");
        self.board.upsert(Task { status, order, ..current });
        let generation = self.stage(task_id, TaskPatch::position(status, order));
        Ok(Some(MoveTicket { task_id, generation }))
    }

    /// Move a task and wait for the store's verdict.
    ///
    /// Outcomes of other tasks that arrive meanwhile stay queued for
    /// `next_outcome`.
    pub async fn move_task_confirmed(&mut self, task_id: u64, status: Status, index: usize) -> Result<Task> {
        let Some(ticket) = self.move_task(task_id, status, index)? else {
            return self
                .board
                .get(task_id)
                .cloned()
                .ok_or_else(|| Error::not_found("task", task_id));
        };
        let mut others = Vec::new();
        let verdict = loop {
            let Some(outcome) = self.next_outcome().await else {
                break Err(Error::Conflict(format!("move of task {task_id} was dropped")));
            };
            if outcome.ticket() != ticket {
                others.push(outcome);
                continue;
            }
            break match outcome {
                MoveOutcome::Confirmed { task, .. } => Ok(task),
                MoveOutcome::RolledBack { error, .. } => Err(error),
                MoveOutcome::Superseded { .. } => Err(Error::Conflict(format!(
                    "move of task {task_id} was superseded"
                ))),
            };
        };
        for outcome in others.into_iter().rev() {
            self.ready.push_front(outcome);
        }
        verdict
    }

    /// Full record of one task, straight from the store.
    pub async fn task_detail(&self, task_id: u64) -> Result<TaskDetail> {
        self.store.get_task(task_id).await
    }

    /// Create a task in the store, then add it to the cache.
    pub async fn create_task(&mut self, new: NewTask) -> Result<Task> {
        let task = self.store.create_task(new).await?;
        if task.parent_id.is_none() {
            self.board.upsert(task.clone());
        }
        Ok(task)
    }

    /// Delete a task in the store, then drop it from the cache.
    pub async fn delete_task(&mut self, task_id: u64) -> Result<()> {
        self.store.delete_task(task_id).await?;
        self.board.remove(task_id);
        if self.tracks.contains_key(&task_id) {
            self.bump(task_id);
            if let Some((queued, _)) = self.tracks.get_mut(&task_id).and_then(|t| t.queued.take()) {
                self.ready.push_back(MoveOutcome::Superseded { task_id, generation: queued });
            }
        }
        Ok(())
    }

    /// Wait for the next move outcome. `None` once nothing is outstanding.
    pub async fn next_outcome(&mut self) -> Option<MoveOutcome> {
        if let Some(outcome) = self.ready.pop_front() {
            return Some(outcome);
        }
        if self.tracks.is_empty() {
            return None;
        }
        let reply = self.rx.recv().await?;
        Some(self.apply(reply))
    }

    /// Outcomes that are already available, without waiting.
    pub fn poll_outcomes(&mut self) -> Vec<MoveOutcome> {
        while let Ok(reply) = self.rx.try_recv() {
            let outcome = self.apply(reply);
            self.ready.push_back(outcome);
        }
        self.ready.drain(..).collect()
    }

    /// Wait until every outstanding confirm has resolved.
    pub async fn settle(&mut self) -> Vec<MoveOutcome> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next_outcome().await {
            outcomes.push(outcome);
        }
        outcomes
    }

    fn counter(&mut self, task_id: u64) -> Arc<AtomicU64> {
        Arc::clone(self.generations.entry(task_id).or_default())
    }

    fn generation_of(&self, task_id: u64) -> u64 {
        self.generations
            .get(&task_id)
            .map_or(0, |g| g.load(Ordering::SeqCst))
    }

    fn bump(&mut self, task_id: u64) -> u64 {
        self.counter(task_id).fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Start tracking `task` unless a confirm chain is already open for it.
    fn track(&mut self, task: &Task) {
        self.tracks.entry(task.id).or_insert_with(|| Track {
            baseline: task.clone(),
            in_flight: false,
            queued: None,
        });
    }

    /// Spread the siblings of `moving` in `status` back out to `ORDER_STEP`
    /// spacing and confirm each one whose order changed.
    fn respace(&mut self, status: Status, moving: u64) {
        let changes = self.board.respaced(status, moving);
        info!(column = status.as_str(), tasks = changes.len(), "respacing column orders");
        for (id, order) in changes {
            let Some(sibling) = self.board.get(id).cloned() else {
                continue;
            };
            self.track(&sibling);
            self.board.upsert(Task { order, ..sibling });
            self.stage(id, TaskPatch::position(status, order));
        }
    }

    /// Issue a new generation for `task_id` and send or queue its patch.
    fn stage(&mut self, task_id: u64, patch: TaskPatch) -> u64 {
        let generation = self.bump(task_id);
        let Some(track) = self.tracks.get_mut(&task_id) else {
            return generation;
        };
        if track.in_flight {
            if let Some((replaced, _)) = track.queued.replace((generation, patch)) {
                self.ready.push_back(MoveOutcome::Superseded { task_id, generation: replaced });
            }
            debug!(task = task_id, generation, "confirm queued behind in-flight request");
        } else {
            track.in_flight = true;
            self.dispatch(task_id, generation, patch);
        }
        generation
    }

    fn dispatch(&mut self, task_id: u64, generation: u64, patch: TaskPatch) {
        let store = Arc::clone(&self.store);
        let counter = self.counter(task_id);
        let tx = self.tx.clone();
        let timeout = self.confirm_timeout;
        tokio::spawn(async move {
            let result = if counter.load(Ordering::SeqCst) != generation {
                debug!(task = task_id, generation, "skipping stale confirm");
                None
            } else {
                debug!(task = task_id, generation, "sending confirm");
                Some(match tokio::time::timeout(timeout, store.update_task(task_id, patch)).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::Network(format!("confirm timed out after {}s", timeout.as_secs_f64()))),
                })
            };
            // The receiver lives as long as the controller; a send error only
            // means the board is gone.
            let _ = tx.send(Reply { task_id, generation, result });
        });
    }

    /// Fold one confirm reply into the cache and start the next queued confirm.
    fn apply(&mut self, reply: Reply) -> MoveOutcome {
        let Reply { task_id, generation, result } = reply;
        let latest = self.generation_of(task_id);
        let Some(track) = self.tracks.get_mut(&task_id) else {
            return MoveOutcome::Superseded { task_id, generation };
        };
        track.in_flight = false;

        let outcome = match result {
            Some(Ok(task)) if generation == latest => {
                track.baseline = task.clone();
                // A reload may have filtered the task off the board.
                if self.board.get(task_id).is_some() {
                    self.board.upsert(task.clone());
                }
                MoveOutcome::Confirmed { task, generation }
            }
            Some(Err(error)) if generation == latest => {
                warn!(task = task_id, generation, kind = error.kind(), %error, "move rejected, rolling back");
                if self.board.get(task_id).is_some() {
                    self.board.upsert(track.baseline.clone());
                }
                MoveOutcome::RolledBack { task_id, generation, error }
            }
            Some(Ok(task)) => {
                debug!(task = task_id, generation, latest, "discarding stale confirm");
                track.baseline = task;
                MoveOutcome::Superseded { task_id, generation }
            }
            Some(Err(error)) => {
                debug!(task = task_id, generation, latest, %error, "stale confirm failed");
                MoveOutcome::Superseded { task_id, generation }
            }
            None => MoveOutcome::Superseded { task_id, generation },
        };

        match track.queued.take() {
            Some((next, patch)) if next == latest => {
                track.in_flight = true;
                self.dispatch(task_id, next, patch);
            }
            Some((next, _)) => {
                self.ready.push_back(MoveOutcome::Superseded { task_id, generation: next });
                self.tracks.remove(&task_id);
            }
            None => {
                self.tracks.remove(&task_id);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::db::Database;
    use crate::store::LocalStore;
    use crate::task::TaskPage;

    enum Step {
        Reply { delay: Duration },
        Fail { delay: Duration, error: Error },
        Hang,
    }

    /// Task store over an in-memory database that records every update and
    /// answers them according to a per-task script.
    struct ScriptedStore {
        inner: LocalStore,
        updates: Mutex<Vec<(u64, TaskPatch)>>,
        script: Mutex<HashMap<u64, VecDeque<Step>>>,
    }

    impl ScriptedStore {
        fn new() -> Self {
            ScriptedStore {
                inner: LocalStore::in_memory(Database::default()),
                updates: Mutex::new(Vec::new()),
                script: Mutex::new(HashMap::new()),
            }
        }

        fn then(&self, task_id: u64, step: Step) {
            self.script.lock().unwrap().entry(task_id).or_default().push_back(step);
        }

        fn updates(&self) -> Vec<(u64, TaskPatch)> {
            self.updates.lock().unwrap().clone()
        }

        async fn stored(&self, id: u64) -> Task {
            self.inner.get_task(id).await.unwrap().task
        }
    }

    #[async_trait]
    impl TaskStore for ScriptedStore {
        async fn list_tasks(&self, filter: &TaskFilter) -> Result<TaskPage> {
            self.inner.list_tasks(filter).await
        }

        async fn get_task(&self, id: u64) -> Result<TaskDetail> {
            self.inner.get_task(id).await
        }

        async fn create_task(&self, new: NewTask) -> Result<Task> {
            self.inner.create_task(new).await
        }

        async fn update_task(&self, id: u64, patch: TaskPatch) -> Result<Task> {
            self.updates.lock().unwrap().push((id, patch.clone()));
            let step = self.script.lock().unwrap().get_mut(&id).and_then(VecDeque::pop_front);
            match step {
                None => {}
                Some(Step::Reply { delay }) => tokio::time::sleep(delay).await,
                Some(Step::Fail { delay, error }) => {
                    tokio::time::sleep(delay).await;
                    return Err(error);
                }
                Some(Step::Hang) => tokio::time::sleep(Duration::from_secs(3600)).await,
            }
            self.inner.update_task(id, patch).await
        }

        async fn delete_task(&self, id: u64) -> Result<()> {
            self.inner.delete_task(id).await
        }
    }

    async fn seed(store: &ScriptedStore, title: &str, status: Status, order: f64) -> u64 {
        let new = NewTask {
            status: Some(status),
            order: Some(order),
            ..NewTask::titled(title)
        };
        store.inner.create_task(new).await.unwrap().id
    }

    async fn controller(store: &Arc<ScriptedStore>) -> BoardController {
        let shared: Arc<dyn TaskStore> = store.clone();
        let mut controller = BoardController::new(shared);
        controller.load_tasks(&TaskFilter::default()).await.unwrap();
        controller
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_into_empty_column() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let b = seed(&store, "B", Status::Todo, 2.0).await;
        let mut board = controller(&store).await;

        let ticket = board.move_task(a, Status::InProgress, 0).unwrap().unwrap();
        assert!(board.is_pending(a));
        assert_eq!(board.board().column(Status::InProgress), &[a]);

        let outcomes = board.settle().await;
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(&outcomes[0], MoveOutcome::Confirmed { task, generation }
            if task.id == a && *generation == ticket.generation));
        assert_eq!(board.board().column(Status::InProgress), &[a]);
        assert_eq!(board.board().column(Status::Todo), &[b]);
        assert!(!board.is_pending(a));
        assert_eq!(store.stored(a).await.status, Status::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_move_is_never_sent() {
        let store = Arc::new(ScriptedStore::new());
        let c = seed(&store, "C", Status::Todo, 1.0).await;
        seed(&store, "D", Status::InProgress, 1.0).await;
        let mut board = controller(&store).await;

        let first = board.move_task(c, Status::Done, 0).unwrap().unwrap();
        let second = board.move_task(c, Status::InProgress, 1).unwrap().unwrap();
        assert!(second.generation > first.generation);

        let outcomes = board.settle().await;
        assert!(outcomes.contains(&MoveOutcome::Superseded { task_id: c, generation: first.generation }));
        assert!(matches!(outcomes.last(), Some(MoveOutcome::Confirmed { task, .. }) if task.status == Status::InProgress));

        let updates = store.updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].1.status, Some(Status::InProgress));
        assert_eq!(store.stored(c).await.status, Status::InProgress);
        assert_eq!(board.board().get(c).unwrap().status, Status::InProgress);
        assert_eq!(board.board().position_of(c), Some((Status::InProgress, 1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_reply_is_discarded() {
        let store = Arc::new(ScriptedStore::new());
        let c = seed(&store, "C", Status::Todo, 1.0).await;
        let mut board = controller(&store).await;

        store.then(c, Step::Reply { delay: secs(5) });
        let first = board.move_task(c, Status::Done, 0).unwrap().unwrap();
        // Let the first confirm reach the store before the second move.
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = board.move_task(c, Status::InProgress, 0).unwrap().unwrap();

        let outcomes = board.settle().await;
        assert_eq!(outcomes[0], MoveOutcome::Superseded { task_id: c, generation: first.generation });
        assert_eq!(outcomes[1].ticket(), second);
        assert_eq!(store.updates().len(), 2);
        assert_eq!(board.board().get(c).unwrap().status, Status::InProgress);
        assert_eq!(store.stored(c).await.status, Status::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_move_restores_snapshot() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        seed(&store, "B", Status::Todo, 2.0).await;
        seed(&store, "X", Status::Done, 1.0).await;
        seed(&store, "Y", Status::Done, 2.0).await;
        let mut board = controller(&store).await;
        let snapshot = board.board().clone();

        store.then(a, Step::Fail { delay: secs(1), error: Error::Validation("rejected".into()) });
        board.move_task(a, Status::Done, 2).unwrap();
        assert_eq!(board.board().position_of(a), Some((Status::Done, 2)));

        let outcomes = board.settle().await;
        assert!(matches!(&outcomes[0], MoveOutcome::RolledBack { error: Error::Validation(_), .. }));
        assert_eq!(board.board(), &snapshot);
        assert_eq!(store.stored(a).await.status, Status::Todo);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_rolls_back_as_network_error() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let shared: Arc<dyn TaskStore> = store.clone();
        let mut board = BoardController::new(shared).with_confirm_timeout(secs(2));
        board.load_tasks(&TaskFilter::default()).await.unwrap();
        let snapshot = board.board().clone();

        store.then(a, Step::Hang);
        let ticket = board.move_task(a, Status::Done, 0).unwrap().unwrap();
        let outcome = board.next_outcome().await.unwrap();
        assert_eq!(outcome.ticket(), ticket);
        assert!(matches!(outcome, MoveOutcome::RolledBack { error: Error::Network(_), .. }));
        assert_eq!(board.board(), &snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_after_superseded_success_keeps_confirmed_state() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let mut board = controller(&store).await;

        store.then(a, Step::Reply { delay: secs(1) });
        store.then(a, Step::Fail { delay: secs(1), error: Error::Network("reset".into()) });
        board.move_task(a, Status::InProgress, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        board.move_task(a, Status::Done, 0).unwrap();

        board.settle().await;
        // The store holds the first move, so that is what the board falls back to.
        let cached = board.board().get(a).unwrap().clone();
        assert_eq!(cached.status, Status::InProgress);
        assert_eq!(cached, store.stored(a).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_move_wins() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let mut board = controller(&store).await;

        store.then(a, Step::Reply { delay: secs(3) });
        store.then(a, Step::Reply { delay: secs(1) });
        board.move_task(a, Status::Done, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        board.move_task(a, Status::InProgress, 0).unwrap();
        board.move_task(a, Status::Todo, 0).unwrap();
        board.move_task(a, Status::Done, 0).unwrap();

        board.settle().await;
        assert_eq!(board.board().get(a).unwrap().status, Status::Done);
        assert_eq!(store.stored(a).await.status, Status::Done);
        // The first confirm and the final one; the two in between never left.
        assert_eq!(store.updates().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_to_current_slot_is_noop() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        seed(&store, "B", Status::Todo, 2.0).await;
        let mut board = controller(&store).await;

        assert_eq!(board.move_task(a, Status::Todo, 0).unwrap(), None);
        assert!(matches!(board.move_task(99, Status::Todo, 0), Err(Error::NotFound(_))));
        assert!(board.settle().await.is_empty());
        assert!(store.updates().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_gap_respaces_column() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let b = seed(&store, "B", Status::Todo, 1.0 + 1e-7).await;
        let c = seed(&store, "C", Status::Done, 1.0).await;
        let mut board = controller(&store).await;

        board.move_task(c, Status::Todo, 1).unwrap();
        assert_eq!(board.board().column(Status::Todo), &[a, c, b]);
        assert!(board.is_pending(a) && board.is_pending(b));

        board.settle().await;
        assert_eq!(board.board().column(Status::Todo), &[a, c, b]);
        assert_eq!(store.stored(a).await.order, 1024.0);
        assert_eq!(store.stored(c).await.order, 1536.0);
        assert_eq!(store.stored(b).await.order, 2048.0);
        assert_eq!(store.updates().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rollback_does_not_undo_other_task_move() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1024.0).await;
        let b = seed(&store, "B", Status::Todo, 2048.0).await;
        let c = seed(&store, "C", Status::Todo, 3072.0).await;
        let mut board = controller(&store).await;

        store.then(a, Step::Fail { delay: secs(2), error: Error::Conflict("stale".into()) });
        board.move_task(a, Status::Todo, 2).unwrap();
        board.move_task(c, Status::Todo, 0).unwrap();
        assert_eq!(board.board().column(Status::Todo), &[c, b, a]);

        let outcomes = board.settle().await;
        assert!(matches!(&outcomes[0], MoveOutcome::Confirmed { task, .. } if task.id == c));
        assert!(matches!(&outcomes[1], MoveOutcome::RolledBack { task_id, .. } if *task_id == a));

        // A returns to 1024 which C now also holds; creation order breaks the tie.
        let cached_c = board.board().get(c).unwrap().clone();
        assert_eq!(cached_c.order, 1024.0);
        assert_eq!(board.board().get(a).unwrap().order, 1024.0);
        assert_eq!(board.board().column(Status::Todo), &[a, c, b]);
        assert_eq!(cached_c, store.stored(c).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_task_confirmed_reports_error() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let mut board = controller(&store).await;

        let moved = board.move_task_confirmed(a, Status::Done, 0).await.unwrap();
        assert_eq!(moved.status, Status::Done);

        store.then(a, Step::Fail { delay: secs(1), error: Error::Auth("expired".into()) });
        let err = board.move_task_confirmed(a, Status::Todo, 0).await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert_eq!(board.board().get(a).unwrap().status, Status::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_keeps_pending_move() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let mut board = controller(&store).await;

        store.then(a, Step::Reply { delay: secs(1) });
        let ticket = board.move_task(a, Status::Done, 0).unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        board.load_tasks(&TaskFilter::default()).await.unwrap();
        assert_eq!(board.board().get(a).unwrap().status, Status::Done);
        assert!(board.is_pending(a));

        let outcomes = board.settle().await;
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].ticket(), ticket);
        assert!(matches!(&outcomes[0], MoveOutcome::Confirmed { .. }));
        let cached = board.board().get(a).unwrap().clone();
        assert_eq!(cached.status, Status::Done);
        assert_eq!(cached, store.stored(a).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_confirm_after_reload_restores_loaded_record() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let mut board = controller(&store).await;

        store.then(a, Step::Fail { delay: secs(1), error: Error::Network("reset".into()) });
        board.move_task(a, Status::Done, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let retitled = TaskPatch {
            title: Some("A, renamed elsewhere".into()),
            ..TaskPatch::default()
        };
        store.inner.update_task(a, retitled).await.unwrap();
        board.load_tasks(&TaskFilter::default()).await.unwrap();

        let outcomes = board.settle().await;
        assert!(matches!(&outcomes[0], MoveOutcome::RolledBack { error: Error::Network(_), .. }));
        let cached = board.board().get(a).unwrap().clone();
        assert_eq!(cached.title, "A, renamed elsewhere");
        assert_eq!(cached.status, Status::Todo);
        assert_eq!(cached, store.stored(a).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_for_task_filtered_out_by_reload_leaves_board() {
        let store = Arc::new(ScriptedStore::new());
        let a = seed(&store, "A", Status::Todo, 1.0).await;
        let b = seed(&store, "B", Status::Todo, 2.0).await;
        let mut board = controller(&store).await;

        store.then(a, Step::Reply { delay: secs(1) });
        board.move_task(a, Status::Done, 0).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let only_b = TaskFilter {
            search: Some("B".into()),
            ..TaskFilter::default()
        };
        board.load_tasks(&only_b).await.unwrap();

        board.settle().await;
        assert_eq!(board.board().get(a), None);
        assert_eq!(board.board().column(Status::Todo), &[b]);
        assert_eq!(store.stored(a).await.status, Status::Done);
    }

    #[tokio::test]
    async fn test_create_and_delete_are_pessimistic() {
        let store = Arc::new(ScriptedStore::new());
        let mut board = controller(&store).await;

        let err = board.create_task(NewTask::titled("")).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(board.board().is_empty());

        let task = board.create_task(NewTask::titled("Pack order #1182")).await.unwrap();
        assert_eq!(board.board().column(Status::Todo), &[task.id]);

        board.delete_task(task.id).await.unwrap();
        assert!(board.board().is_empty());
        assert!(matches!(board.delete_task(task.id).await, Err(Error::NotFound(_))));
    }
}
