//! Command implementations for the CLI interface.
//!
//! Every handler works against the store traits, so the same command runs on
//! the local JSON database or on a remote store. Handlers print their result
//! to stdout and return errors to `main`, which reports them and exits
//! non-zero.

use std::io;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{CommandFactory, Subcommand};
use clap_complete::{generate, Shell};

use crate::cli::Cli;
use crate::config::Settings;
use crate::controller::BoardController;
use crate::db::*;
use crate::error::{Error, Result};
use crate::fields::*;
use crate::project::{NewProject, ProjectPatch, ProjectSummary};
use crate::store::Backend;
use crate::task::*;

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the local database over the REST API.
    Serve {
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: std::net::SocketAddr,
    },

    /// Open the Kanban board.
    Board {
        /// Only show tasks of this project.
        #[arg(long)]
        project: Option<u64>,
        /// Only show tasks assigned to this user.
        #[arg(long)]
        assignee: Option<String>,
    },

    /// Add a new task.
    Add {
        /// Short title for the task.
        title: String,
        /// Optional longer description.
        #[arg(long)]
        desc: Option<String>,
        /// Project ID.
        #[arg(long)]
        project: Option<u64>,
        /// Parent task ID (one level of nesting).
        #[arg(long)]
        parent: Option<u64>,
        /// Status: todo | in-progress | done.
        #[arg(long, value_enum)]
        status: Option<Status>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        /// Due date: YYYY-MM-DD, "today", "tomorrow", or "in Nd".
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
    },

    /// List root tasks with optional filters.
    List {
        #[arg(long, value_enum)]
        status: Option<Status>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long)]
        project: Option<u64>,
        #[arg(long)]
        assignee: Option<String>,
        /// Case-insensitive match on title or description.
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        limit: u32,
        #[arg(long, value_enum, default_value_t = SortKey::CreatedAt)]
        sort: SortKey,
        #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
        order: SortOrder,
    },

    /// View a task with its notes, subtasks and logged time.
    View {
        id: u64,
    },

    /// Update fields on a task.
    Update {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(long, conflicts_with = "clear_desc")]
        desc: Option<String>,
        #[arg(long, value_enum)]
        status: Option<Status>,
        #[arg(long, value_enum)]
        priority: Option<Priority>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long, conflicts_with = "clear_assignee")]
        assignee: Option<String>,
        #[arg(long, conflicts_with = "clear_project")]
        project: Option<u64>,
        #[arg(long, conflicts_with = "clear_parent")]
        parent: Option<u64>,
        #[arg(long)]
        clear_desc: bool,
        #[arg(long)]
        clear_due: bool,
        #[arg(long)]
        clear_assignee: bool,
        #[arg(long)]
        clear_project: bool,
        #[arg(long)]
        clear_parent: bool,
    },

    /// Move a task to a column, optionally at a position (0 = top).
    Move {
        id: u64,
        #[arg(value_enum)]
        status: Status,
        /// Final position in the column. Defaults to the bottom.
        index: Option<usize>,
    },

    /// Delete a task with its notes and time entries.
    Delete {
        id: u64,
    },

    /// Manage task notes.
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Log and review time spent on tasks.
    Time {
        #[command(subcommand)]
        action: TimeAction,
    },

    /// Manage projects.
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum NoteAction {
    /// Add a note to a task.
    Add { task: u64, text: String },
    /// List a task's notes, newest first.
    List { task: u64 },
    /// Delete a note by ID.
    Delete { id: u64 },
}

#[derive(Subcommand)]
pub enum TimeAction {
    /// Log hours against a task.
    Log {
        task: u64,
        hours: f64,
        /// Day the work was done. Defaults to today.
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        desc: Option<String>,
    },
    /// List a task's time entries with their total.
    List { task: u64 },
    /// Replace a time entry.
    Update {
        id: u64,
        hours: f64,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        desc: Option<String>,
    },
    /// Delete a time entry by ID.
    Delete { id: u64 },
}

#[derive(Subcommand)]
pub enum ProjectAction {
    /// List projects with their task counts.
    List,
    /// Add a project.
    Add {
        name: String,
        #[arg(long)]
        desc: Option<String>,
        #[arg(long, value_enum)]
        status: Option<ProjectStatus>,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Show one project.
    View { id: u64 },
    /// Update fields on a project.
    Update {
        id: u64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_desc")]
        desc: Option<String>,
        #[arg(long, value_enum)]
        status: Option<ProjectStatus>,
        #[arg(long, conflicts_with = "clear_start")]
        start: Option<String>,
        #[arg(long, conflicts_with = "clear_due")]
        due: Option<String>,
        #[arg(long)]
        clear_desc: bool,
        #[arg(long)]
        clear_start: bool,
        #[arg(long)]
        clear_due: bool,
    },
    /// Delete a project that owns no tasks.
    Delete { id: u64 },
}

/// Run one store command. `Serve`, `Board` and `Completions` are dispatched by `main`.
pub async fn run<S: Backend + 'static>(command: Commands, store: Arc<S>, settings: &Settings) -> Result<()> {
    match command {
        Commands::Add { title, desc, project, parent, status, priority, due, assignee } => {
            let new = NewTask {
                title,
                description: desc,
                project_id: project,
                parent_id: parent,
                status,
                priority,
                due_date: due.as_deref().map(parse_date).transpose()?,
                assignee_id: assignee,
                order: None,
            };
            cmd_add(&*store, new).await
        }
        Commands::List { status, priority, project, assignee, search, page, limit, sort, order } => {
            let filter = TaskFilter {
                project_id: project,
                status,
                priority,
                assignee_id: assignee,
                search,
                page: Some(page),
                limit: Some(limit),
                sort_by: Some(sort),
                sort_order: Some(order),
            };
            cmd_list(&*store, &filter).await
        }
        Commands::View { id } => cmd_view(&*store, id).await,
        Commands::Update {
            id, title, desc, status, priority, due, assignee, project, parent,
            clear_desc, clear_due, clear_assignee, clear_project, clear_parent,
        } => {
            let patch = TaskPatch {
                title,
                description: optional(desc, clear_desc),
                status,
                priority,
                order: None,
                assignee_id: optional(assignee, clear_assignee),
                due_date: optional(due.as_deref().map(parse_date).transpose()?, clear_due),
                project_id: optional(project, clear_project),
                parent_id: optional(parent, clear_parent),
            };
            cmd_update(&*store, id, patch).await
        }
        Commands::Move { id, status, index } => cmd_move(store, id, status, index, settings).await,
        Commands::Delete { id } => cmd_delete(&*store, id).await,
        Commands::Note { action } => cmd_note(&*store, action).await,
        Commands::Time { action } => cmd_time(&*store, action).await,
        Commands::Project { action } => cmd_project(&*store, action).await,
        Commands::Serve { .. } | Commands::Board { .. } | Commands::Completions { .. } => {
            Err(Error::Conflict("command is not a store command".into()))
        }
    }
}

/// Patch value for a nullable field: a new value, an explicit clear, or untouched.
fn optional<T>(value: Option<T>, clear: bool) -> Option<Option<T>> {
    if clear {
        Some(None)
    } else {
        value.map(Some)
    }
}

fn parse_date(input: &str) -> Result<NaiveDate> {
    parse_due_input(input, today()).ok_or_else(|| Error::validation(format!("cannot parse date '{input}'")))
}

pub async fn cmd_add<S: Backend + ?Sized>(store: &S, new: NewTask) -> Result<()> {
    let task = store.create_task(new).await?;
    println!("Added task {}", task.id);
    Ok(())
}

/// List one page of tasks.
pub async fn cmd_list<S: Backend + ?Sized>(store: &S, filter: &TaskFilter) -> Result<()> {
    let page = store.list_tasks(filter).await?;
    print_table(&page.tasks);
    let p = page.pagination;
    println!("\nPage {} of {} ({} tasks)", p.current_page, p.total_pages, p.total_tasks);
    Ok(())
}

pub async fn cmd_view<S: Backend + ?Sized>(store: &S, id: u64) -> Result<()> {
    let detail = store.get_task(id).await?;
    let task = &detail.task;
    let today = today();
    println!("ID:           {}", task.id);
    println!("Title:        {}", task.title);
    println!("Status:       {}", format_status(task.status));
    println!("Priority:     {}", format_priority(task.priority));
    println!("Project:      {}", task.project_id.map_or_else(|| "-".into(), |p| p.to_string()));
    println!("Parent:       {}", task.parent_id.map_or_else(|| "-".into(), |p| p.to_string()));
    println!("Assignee:     {}", task.assignee_id.as_deref().unwrap_or("-"));
    println!(
        "Due:          {}",
        match task.due_date {
            Some(d) => format!("{d} ({})", format_due_relative(Some(d), today)),
            None => "-".into(),
        }
    );
    println!("Created UTC:  {}", task.created_at.to_rfc3339());
    println!("Updated UTC:  {}", task.updated_at.to_rfc3339());
    println!("Description:\n{}\n", task.description.as_deref().unwrap_or("-"));

    println!("Subtasks:");
    if detail.children.is_empty() {
        println!("  -");
    }
    for child in &detail.children {
        println!("  - {} [{}] (#{})", child.title, format_status(child.status), child.id);
    }

    println!("Notes:");
    if detail.notes.is_empty() {
        println!("  -");
    }
    for note in &detail.notes {
        println!("  #{} {}  {}", note.id, note.created_at.format("%Y-%m-%d %H:%M"), note.text);
    }

    println!("Time logged:  {:.2}h over {} entries", detail.total_hours, detail.time_entries.len());
    Ok(())
}

pub async fn cmd_update<S: Backend + ?Sized>(store: &S, id: u64, patch: TaskPatch) -> Result<()> {
    let task = store.update_task(id, patch).await?;
    println!("Updated task {} ({})", task.id, format_status(task.status));
    Ok(())
}

/// Move a task through the board controller and wait for the store to confirm.
pub async fn cmd_move<S: Backend + 'static>(
    store: Arc<S>,
    id: u64,
    status: Status,
    index: Option<usize>,
    settings: &Settings,
) -> Result<()> {
    let mut controller = BoardController::new(store).with_confirm_timeout(settings.timeout);
    controller.load_tasks(&TaskFilter::default()).await?;
    let task = controller
        .move_task_confirmed(id, status, index.unwrap_or(usize::MAX))
        .await?;
    let (column, position) = controller
        .board()
        .position_of(task.id)
        .unwrap_or((task.status, 0));
    println!("Moved task {} to {} at position {}", task.id, format_status(column), position);
    Ok(())
}

pub async fn cmd_delete<S: Backend + ?Sized>(store: &S, id: u64) -> Result<()> {
    store.delete_task(id).await?;
    println!("Deleted task {id}");
    Ok(())
}

pub async fn cmd_note<S: Backend + ?Sized>(store: &S, action: NoteAction) -> Result<()> {
    match action {
        NoteAction::Add { task, text } => {
            let note = store.add_note(task, text).await?;
            println!("Added note {} to task {}", note.id, note.task_id);
        }
        NoteAction::List { task } => {
            let notes = store.list_notes(task).await?;
            if notes.is_empty() {
                println!("No notes.");
            }
            for note in notes {
                println!("{:<5} {}  {}", note.id, note.created_at.format("%Y-%m-%d %H:%M"), note.text);
            }
        }
        NoteAction::Delete { id } => {
            store.delete_note(id).await?;
            println!("Deleted note {id}");
        }
    }
    Ok(())
}

pub async fn cmd_time<S: Backend + ?Sized>(store: &S, action: TimeAction) -> Result<()> {
    match action {
        TimeAction::Log { task, hours, date, desc } => {
            let input = time_input(hours, date, desc)?;
            let entry = store.add_time_entry(task, input).await?;
            println!("Logged {:.2}h on task {} (entry {})", entry.hours, entry.task_id, entry.id);
        }
        TimeAction::List { task } => {
            let sheet = store.list_time_entries(task).await?;
            println!("{:<5} {:<10} {:>6}  {}", "ID", "Date", "Hours", "Description");
            for e in &sheet.time_entries {
                println!(
                    "{:<5} {:<10} {:>6.2}  {}",
                    e.id,
                    e.date,
                    e.hours,
                    e.description.as_deref().unwrap_or("")
                );
            }
            println!("Total: {:.2}h", sheet.total_hours);
        }
        TimeAction::Update { id, hours, date, desc } => {
            let input = time_input(hours, date, desc)?;
            let entry = store.update_time_entry(id, input).await?;
            println!("Updated time entry {} ({:.2}h)", entry.id, entry.hours);
        }
        TimeAction::Delete { id } => {
            store.delete_time_entry(id).await?;
            println!("Deleted time entry {id}");
        }
    }
    Ok(())
}

fn time_input(hours: f64, date: Option<String>, description: Option<String>) -> Result<TimeEntryInput> {
    let date = match date {
        Some(d) => parse_date(&d)?,
        None => today(),
    };
    Ok(TimeEntryInput { hours, date, description })
}

pub async fn cmd_project<S: Backend + ?Sized>(store: &S, action: ProjectAction) -> Result<()> {
    match action {
        ProjectAction::List => {
            let projects = store.list_projects().await?;
            println!("{:<5} {:<11} {:>5} {:>5}  {}", "ID", "Status", "Tasks", "Done", "Name");
            for p in &projects {
                println!(
                    "{:<5} {:<11} {:>5} {:>5}  {}",
                    p.project.id,
                    format_project_status(p.project.status),
                    p.task_count,
                    p.completed_count,
                    p.project.name
                );
            }
        }
        ProjectAction::Add { name, desc, status, start, due } => {
            let new = NewProject {
                name,
                description: desc,
                status,
                start_date: start.as_deref().map(parse_date).transpose()?,
                due_date: due.as_deref().map(parse_date).transpose()?,
            };
            let summary = store.create_project(new).await?;
            println!("Added project {}", summary.project.id);
        }
        ProjectAction::View { id } => print_project(&store.get_project(id).await?),
        ProjectAction::Update { id, name, desc, status, start, due, clear_desc, clear_start, clear_due } => {
            let patch = ProjectPatch {
                name,
                description: optional(desc, clear_desc),
                status,
                start_date: optional(start.as_deref().map(parse_date).transpose()?, clear_start),
                due_date: optional(due.as_deref().map(parse_date).transpose()?, clear_due),
            };
            let summary = store.update_project(id, patch).await?;
            println!("Updated project {}", summary.project.id);
        }
        ProjectAction::Delete { id } => {
            store.delete_project(id).await?;
            println!("Deleted project {id}");
        }
    }
    Ok(())
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut io::stdout());
}

fn print_table(tasks: &[Task]) {
    println!(
        "{:<5} {:<11} {:<6} {:<10} {:<8} {}",
        "ID", "Status", "Pri", "Due", "Assignee", "Title"
    );
    let today = today();
    for t in tasks {
        println!(
            "{:<5} {:<11} {:<6} {:<10} {:<8} {}",
            t.id,
            format_status(t.status),
            format_priority(t.priority),
            format_due_relative(t.due_date, today),
            truncate(t.assignee_id.as_deref().unwrap_or("-"), 8),
            t.title
        );
    }
}

fn print_project(summary: &ProjectSummary) {
    let p = &summary.project;
    let date = |d: Option<NaiveDate>| d.map_or_else(|| "-".into(), |d| d.to_string());
    println!("ID:           {}", p.id);
    println!("Name:         {}", p.name);
    println!("Status:       {}", format_project_status(p.status));
    println!("Start:        {}", date(p.start_date));
    println!("Due:          {}", date(p.due_date));
    println!("Tasks:        {} ({} done)", summary.task_count, summary.completed_count);
    println!("Description:\n{}", p.description.as_deref().unwrap_or("-"));
}
