//! A user's to-do list.

use axum::{
    extract::{FromRef, State},
    response::Response,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error, UserId,
    envelope::{created, non_empty, ok, success},
    extract::{JsonBody, QueryParams},
    realtime::{ChangeFeed, ChangeKind, Table},
    store::Store,
};

/// The database ID of a todo.
pub type TodoId = i64;

/// How many todos are returned when the client does not ask for a limit.
pub const DEFAULT_LIMIT: u32 = 50;

/// A task on a user's to-do list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    /// The ID of the todo.
    pub id: TodoId,
    /// The user the todo belongs to.
    pub user_id: UserId,
    /// What needs doing.
    pub task: String,
    /// Whether the task is done.
    pub is_complete: bool,
    /// When the todo was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Filters for [query_todos].
#[derive(Debug, Clone, PartialEq)]
pub struct TodoQuery {
    /// Only include this user's todos.
    pub user_id: Option<UserId>,
    /// Only include finished or unfinished todos.
    pub is_complete: Option<bool>,
    /// The maximum number of todos to return.
    pub limit: u32,
}

const TODO_COLUMNS: &str = "id, user_id, task, is_complete, created_at";

/// Create the todo table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_todo_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS todo (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                task TEXT NOT NULL,
                is_complete INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_todo_row(row: &Row) -> Result<Todo, rusqlite::Error> {
    let user_id: String = row.get(1)?;

    Ok(Todo {
        id: row.get(0)?,
        user_id: UserId::new(user_id),
        task: row.get(2)?,
        is_complete: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Add an unfinished task to `user_id`'s list.
///
/// # Errors
/// Returns an [Error::SqlError] if the insert failed.
pub fn create_todo(user_id: &UserId, task: &str, connection: &Connection) -> Result<Todo, Error> {
    let todo = connection
        .prepare(&format!(
            "INSERT INTO todo (user_id, task, created_at) VALUES (?1, ?2, ?3)
             RETURNING {TODO_COLUMNS}"
        ))?
        .query_row(
            (user_id.as_str(), task, OffsetDateTime::now_utc()),
            map_todo_row,
        )?;

    Ok(todo)
}

/// Get todos matching `query`, newest first.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn query_todos(query: &TodoQuery, connection: &Connection) -> Result<Vec<Todo>, Error> {
    connection
        .prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todo
             WHERE (?1 IS NULL OR user_id = ?1)
               AND (?2 IS NULL OR is_complete = ?2)
             ORDER BY created_at DESC, id DESC
             LIMIT ?3"
        ))?
        .query_map(
            (
                query.user_id.as_ref().map(UserId::as_str),
                query.is_complete,
                query.limit,
            ),
            map_todo_row,
        )?
        .map(|maybe_todo| maybe_todo.map_err(Error::from))
        .collect()
}

/// Change the task text and/or completion of todo `id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such todo.
pub fn update_todo(
    id: TodoId,
    task: Option<&str>,
    is_complete: Option<bool>,
    connection: &Connection,
) -> Result<Todo, Error> {
    connection
        .prepare(&format!(
            "UPDATE todo SET
                task = COALESCE(?1, task),
                is_complete = COALESCE(?2, is_complete)
             WHERE id = ?3
             RETURNING {TODO_COLUMNS}"
        ))?
        .query_row((task, is_complete, id), map_todo_row)
        .optional()?
        .ok_or(Error::NotFound)
}

/// Delete todo `id`.
///
/// # Errors
/// Returns [Error::NotFound] if there is no such todo.
pub fn delete_todo(id: TodoId, connection: &Connection) -> Result<(), Error> {
    match connection.execute("DELETE FROM todo WHERE id = ?1", [id])? {
        0 => Err(Error::NotFound),
        _ => Ok(()),
    }
}

/// The state needed by the todo endpoints.
#[derive(Debug, Clone)]
pub struct TodoState {
    /// The store holding the todos.
    pub store: Store,
    /// Where todo changes are published.
    pub changes: ChangeFeed,
}

impl FromRef<AppState> for TodoState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            changes: state.changes.clone(),
        }
    }
}

/// The query string for [get_todos].
#[derive(Debug, Deserialize)]
pub struct TodoListQuery {
    /// Only include this user's todos.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    /// `true` or `false`.
    #[serde(rename = "isComplete")]
    pub is_complete: Option<String>,
    /// The maximum number of todos to return.
    pub limit: Option<u32>,
}

/// A route handler for listing todos, newest first.
pub async fn get_todos(
    State(state): State<TodoState>,
    QueryParams(query): QueryParams<TodoListQuery>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    query_todos(
        &TodoQuery {
            user_id: non_empty(query.user_id).map(UserId::new),
            // Anything other than "true" means unfinished todos.
            is_complete: query.is_complete.map(|value| value == "true"),
            limit: query.limit.unwrap_or(DEFAULT_LIMIT),
        },
        &connection,
    )
    .map(ok)
}

/// The JSON body for creating a todo.
#[derive(Debug, Deserialize)]
pub struct TodoForm {
    /// The user the todo belongs to.
    pub user_id: Option<String>,
    /// What needs doing.
    pub task: Option<String>,
}

/// A route handler for creating a todo.
pub async fn post_todo(
    State(state): State<TodoState>,
    JsonBody(form): JsonBody<TodoForm>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let (Some(user_id), Some(task)) = (non_empty(form.user_id), non_empty(form.task)) else {
        return Err(Error::Validation(
            "Missing required fields: user_id, task".to_owned(),
        ));
    };

    let todo = create_todo(&UserId::new(user_id), &task, &connection)?;
    drop(connection);

    state
        .changes
        .publish_row(Table::Todos, ChangeKind::Insert, todo.id, &todo);

    Ok(created(todo))
}

/// The JSON body for editing a todo.
#[derive(Debug, Deserialize)]
pub struct EditTodoForm {
    /// The todo to edit.
    pub id: Option<TodoId>,
    /// The new task text.
    pub task: Option<String>,
    /// Whether the task is done.
    pub is_complete: Option<bool>,
}

/// A route handler for editing a todo.
pub async fn put_todo(
    State(state): State<TodoState>,
    JsonBody(form): JsonBody<EditTodoForm>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let id = form
        .id
        .ok_or_else(|| Error::Validation("Missing required field: id".to_owned()))?;

    let todo = update_todo(id, form.task.as_deref(), form.is_complete, &connection)?;
    drop(connection);

    state
        .changes
        .publish_row(Table::Todos, ChangeKind::Update, todo.id, &todo);

    Ok(ok(todo))
}

/// The query string for [delete_todo_endpoint].
#[derive(Debug, Deserialize)]
pub struct DeleteTodoQuery {
    /// The todo to delete.
    pub id: Option<TodoId>,
}

/// A route handler for deleting a todo.
pub async fn delete_todo_endpoint(
    State(state): State<TodoState>,
    QueryParams(query): QueryParams<DeleteTodoQuery>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    let id = query
        .id
        .ok_or_else(|| Error::Validation("Missing required query: id".to_owned()))?;

    delete_todo(id, &connection)?;
    drop(connection);

    state.changes.publish_delete(Table::Todos, id);

    Ok(success())
}
