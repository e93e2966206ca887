//! User profiles: display names, avatar and presence.
//!
//! A profile shares its ID with the [UserId] of the session, is upserted by the
//! profile endpoint and has its presence updated on log-in and log-out. Profiles
//! are never deleted.

use axum::{
    extract::{FromRef, State},
    response::Response,
};
use rusqlite::{Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    AppState, Error, UserId,
    db::parse_text_column,
    envelope::{created, non_empty, ok},
    extract::{JsonBody, QueryParams},
    realtime::{ChangeFeed, ChangeKind, Table},
    store::Store,
};

/// Whether a user is currently signed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileStatus {
    /// Signed in.
    Online,
    /// Signed out.
    Offline,
}

impl ProfileStatus {
    fn as_str(self) -> &'static str {
        match self {
            ProfileStatus::Online => "online",
            ProfileStatus::Offline => "offline",
        }
    }
}

impl std::str::FromStr for ProfileStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(ProfileStatus::Online),
            "offline" => Ok(ProfileStatus::Offline),
            other => Err(Error::Validation(format!("Unknown profile status {other}"))),
        }
    }
}

/// A user's public profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// The ID of the user the profile belongs to.
    pub id: UserId,
    /// The user's given name.
    pub first_name: Option<String>,
    /// The user's family name.
    pub last_name: Option<String>,
    /// Where the user's avatar image is hosted.
    pub avatar_url: Option<String>,
    /// Whether the user is signed in.
    pub status: ProfileStatus,
    /// When the user last signed in or out.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_seen_at: Option<OffsetDateTime>,
    /// When the profile last changed.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Create the profile table.
///
/// # Errors
/// Returns an error if the SQL query failed.
pub fn create_profile_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS profile (
                id TEXT PRIMARY KEY,
                first_name TEXT,
                last_name TEXT,
                avatar_url TEXT,
                status TEXT NOT NULL DEFAULT 'offline',
                last_seen_at TEXT,
                updated_at TEXT NOT NULL
                )",
        (),
    )?;

    Ok(())
}

fn map_profile_row(row: &Row) -> Result<Profile, rusqlite::Error> {
    let id: String = row.get(0)?;

    Ok(Profile {
        id: UserId::new(id),
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        avatar_url: row.get(3)?,
        status: parse_text_column(row, 4)?,
        last_seen_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const SELECT_PROFILE: &str =
    "SELECT id, first_name, last_name, avatar_url, status, last_seen_at, updated_at FROM profile";

/// The editable fields of a profile.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpsert {
    /// The ID of the user the profile belongs to.
    pub id: Option<String>,
    /// The user's given name.
    pub first_name: Option<String>,
    /// The user's family name.
    pub last_name: Option<String>,
    /// Where the user's avatar image is hosted.
    pub avatar_url: Option<String>,
}

/// Insert or replace the profile `id`, marking the user online.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn upsert_profile(
    id: &UserId,
    upsert: ProfileUpsert,
    connection: &Connection,
) -> Result<Profile, Error> {
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO profile
            (id, first_name, last_name, avatar_url, status, last_seen_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'online', ?5, ?5)
         ON CONFLICT(id) DO UPDATE SET
            first_name = excluded.first_name,
            last_name = excluded.last_name,
            avatar_url = excluded.avatar_url,
            status = excluded.status,
            last_seen_at = excluded.last_seen_at,
            updated_at = excluded.updated_at",
        (
            id.as_str(),
            non_empty(upsert.first_name),
            non_empty(upsert.last_name),
            non_empty(upsert.avatar_url),
            now,
        ),
    )?;

    get_profile(id, connection)
}

/// Record that `id` signed in or out.
///
/// Creates a bare profile if the user has none yet.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn set_presence(
    id: &UserId,
    status: ProfileStatus,
    connection: &Connection,
) -> Result<Profile, Error> {
    let now = OffsetDateTime::now_utc();

    connection.execute(
        "INSERT INTO profile (id, status, last_seen_at, updated_at) VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(id) DO UPDATE SET
            status = excluded.status,
            last_seen_at = excluded.last_seen_at,
            updated_at = excluded.updated_at",
        (id.as_str(), status.as_str(), now),
    )?;

    get_profile(id, connection)
}

/// Get the profile of `id`.
///
/// # Errors
/// Returns [Error::NotFound] if the user has no profile.
pub fn get_profile(id: &UserId, connection: &Connection) -> Result<Profile, Error> {
    connection
        .prepare(&format!("{SELECT_PROFILE} WHERE id = ?1"))?
        .query_row([id.as_str()], map_profile_row)
        .optional()?
        .ok_or(Error::NotFound)
}

/// Get every profile ordered by first name.
///
/// # Errors
/// Returns an [Error::SqlError] if the query failed.
pub fn list_profiles(connection: &Connection) -> Result<Vec<Profile>, Error> {
    connection
        .prepare(&format!("{SELECT_PROFILE} ORDER BY first_name ASC, rowid ASC"))?
        .query_map([], map_profile_row)?
        .map(|maybe_profile| maybe_profile.map_err(Error::from))
        .collect()
}

/// The state needed by the profile endpoints.
#[derive(Debug, Clone)]
pub struct ProfileState {
    /// The store holding the profiles.
    pub store: Store,
    /// Where profile changes are published.
    pub changes: ChangeFeed,
}

impl FromRef<AppState> for ProfileState {
    fn from_ref(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
            changes: state.changes.clone(),
        }
    }
}

/// The query string for [get_profiles].
#[derive(Debug, Deserialize)]
pub struct ProfileQuery {
    /// Fetch only this user's profile.
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

/// Get a single profile when `userId` is given, otherwise the contact list of
/// all profiles ordered by first name.
pub async fn get_profiles(
    State(state): State<ProfileState>,
    QueryParams(query): QueryParams<ProfileQuery>,
) -> Result<Response, Error> {
    let connection = state.store.connection()?;

    match non_empty(query.user_id) {
        Some(user_id) => get_profile(&UserId::new(user_id), &connection).map(ok),
        None => list_profiles(&connection).map(ok),
    }
}

/// Create or replace a profile.
pub async fn post_profile(
    State(state): State<ProfileState>,
    JsonBody(upsert): JsonBody<ProfileUpsert>,
) -> Result<Response, Error> {
    let id = non_empty(upsert.id.clone())
        .map(UserId::new)
        .ok_or_else(|| Error::Validation("User ID is required".to_owned()))?;

    let connection = state.store.connection()?;
    let profile = upsert_profile(&id, upsert, &connection)?;
    drop(connection);

    state
        .changes
        .publish_row(Table::Profiles, ChangeKind::Update, &profile.id, &profile);

    Ok(created(profile))
}

#[cfg(test)]
mod database_tests {
    use rusqlite::Connection;

    use crate::{Error, UserId};

    use super::{
        ProfileStatus, ProfileUpsert, create_profile_table, get_profile, list_profiles,
        set_presence, upsert_profile,
    };

    fn get_connection() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        create_profile_table(&connection).unwrap();
        connection
    }

    fn named(first_name: &str) -> ProfileUpsert {
        ProfileUpsert {
            first_name: Some(first_name.to_owned()),
            ..Default::default()
        }
    }

    #[test]
    fn upsert_creates_then_replaces() {
        let connection = get_connection();
        let id = UserId::new("u1");

        upsert_profile(&id, named("Budi"), &connection).unwrap();
        let profile = upsert_profile(&id, named("Sari"), &connection).unwrap();

        assert_eq!(profile.first_name.as_deref(), Some("Sari"));
        assert_eq!(profile.status, ProfileStatus::Online);
        assert_eq!(list_profiles(&connection).unwrap().len(), 1);
    }

    #[test]
    fn empty_names_are_stored_as_null() {
        let connection = get_connection();

        let profile = upsert_profile(&UserId::new("u1"), named(""), &connection).unwrap();

        assert_eq!(profile.first_name, None);
    }

    #[test]
    fn list_orders_by_first_name() {
        let connection = get_connection();
        upsert_profile(&UserId::new("u1"), named("Wati"), &connection).unwrap();
        upsert_profile(&UserId::new("u2"), named("Adi"), &connection).unwrap();

        let names: Vec<_> = list_profiles(&connection)
            .unwrap()
            .into_iter()
            .filter_map(|profile| profile.first_name)
            .collect();

        assert_eq!(names, ["Adi", "Wati"]);
    }

    #[test]
    fn presence_keeps_names() {
        let connection = get_connection();
        let id = UserId::new("u1");
        upsert_profile(&id, named("Budi"), &connection).unwrap();

        let profile = set_presence(&id, ProfileStatus::Offline, &connection).unwrap();

        assert_eq!(profile.status, ProfileStatus::Offline);
        assert_eq!(profile.first_name.as_deref(), Some("Budi"));
        assert!(profile.last_seen_at.is_some());
    }

    #[test]
    fn presence_creates_missing_profile() {
        let connection = get_connection();

        let profile =
            set_presence(&UserId::new("u1"), ProfileStatus::Online, &connection).unwrap();

        assert_eq!(profile.status, ProfileStatus::Online);
        assert_eq!(profile.first_name, None);
    }

    #[test]
    fn get_unknown_profile_is_not_found() {
        let connection = get_connection();

        assert_eq!(
            get_profile(&UserId::new("nobody"), &connection),
            Err(Error::NotFound)
        );
    }
}
