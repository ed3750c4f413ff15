use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Result, Row};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{Purpose, StoredToken, Task, User};
use crate::tasks::TaskChanges;

pub type DbPool = Arc<Mutex<Connection>>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id BLOB PRIMARY KEY,
        email TEXT UNIQUE NOT NULL,
        password_hash TEXT NOT NULL,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE TABLE IF NOT EXISTS user_tokens (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        token TEXT NOT NULL,
        purpose TEXT NOT NULL,
        UNIQUE (user_id, token)
    );

    CREATE TABLE IF NOT EXISTS tasks (
        id BLOB PRIMARY KEY,
        owner_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        text TEXT NOT NULL,
        completed INTEGER NOT NULL DEFAULT 0,
        completed_at TEXT,
        created_at INTEGER DEFAULT (strftime('%s', 'now'))
    );

    CREATE INDEX IF NOT EXISTS idx_tasks_owner ON tasks (owner_id);
";

pub fn init_db(path: impl AsRef<Path>) -> Result<DbPool> {
    setup(Connection::open(path)?)
}

pub fn open_in_memory() -> Result<DbPool> {
    setup(Connection::open_in_memory()?)
}

fn setup(conn: Connection) -> Result<DbPool> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

// A panic while holding the lock leaves the connection usable; SQLite rolls
// back any statement that did not finish.
fn lock(pool: &DbPool) -> MutexGuard<'_, Connection> {
    pool.lock().unwrap_or_else(PoisonError::into_inner)
}

// User operations
pub fn create_user(
    pool: &DbPool,
    id: Uuid,
    email: &str,
    password_hash: &str,
) -> Result<User, AppError> {
    let conn = lock(pool);
    insert_user(&conn, id, email, password_hash)?;

    Ok(User {
        id,
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        tokens: Vec::new(),
    })
}

/// Stores a new user together with their first token. Either both rows land
/// or neither does.
pub fn create_user_with_token(
    pool: &DbPool,
    id: Uuid,
    email: &str,
    password_hash: &str,
    first: StoredToken,
) -> Result<User, AppError> {
    let mut conn = lock(pool);
    let tx = conn.transaction()?;
    insert_user(&tx, id, email, password_hash)?;
    tx.execute(
        "INSERT INTO user_tokens (user_id, token, purpose) VALUES (?1, ?2, ?3)",
        (id, &first.token, first.purpose.as_str()),
    )?;
    tx.commit()?;

    Ok(User {
        id,
        email: email.to_string(),
        password_hash: password_hash.to_string(),
        tokens: vec![first],
    })
}

fn insert_user(
    conn: &Connection,
    id: Uuid,
    email: &str,
    password_hash: &str,
) -> Result<(), AppError> {
    let inserted = conn.execute(
        "INSERT INTO users (id, email, password_hash) VALUES (?1, ?2, ?3)",
        (id, email, password_hash),
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(AppError::validation("email", "Email already registered"))
        }
        Err(e) => Err(e.into()),
    }
}

pub fn find_user_by_id(pool: &DbPool, id: Uuid) -> Result<Option<User>, AppError> {
    let conn = lock(pool);
    let user = conn
        .query_row(
            "SELECT id, email, password_hash FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?;
    with_tokens(&conn, user)
}

pub fn find_user_by_email(pool: &DbPool, email: &str) -> Result<Option<User>, AppError> {
    let conn = lock(pool);
    let user = conn
        .query_row(
            "SELECT id, email, password_hash FROM users WHERE email = ?1",
            [email],
            user_from_row,
        )
        .optional()?;
    with_tokens(&conn, user)
}

fn user_from_row(row: &Row) -> Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        tokens: Vec::new(),
    })
}

fn with_tokens(conn: &Connection, user: Option<User>) -> Result<Option<User>, AppError> {
    let Some(mut user) = user else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT token, purpose FROM user_tokens WHERE user_id = ?1 ORDER BY seq ASC",
    )?;
    user.tokens = stmt
        .query_map([user.id], |row| {
            let purpose: String = row.get(1)?;
            Ok(StoredToken {
                token: row.get(0)?,
                purpose: purpose.parse().map_err(|e: String| {
                    rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into())
                })?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(user))
}

// Token operations
pub fn push_token(
    pool: &DbPool,
    user_id: Uuid,
    token: &str,
    purpose: Purpose,
) -> Result<(), AppError> {
    let conn = lock(pool);
    conn.execute(
        "INSERT INTO user_tokens (user_id, token, purpose) VALUES (?1, ?2, ?3)",
        (user_id, token, purpose.as_str()),
    )?;
    Ok(())
}

/// Returns whether a token was actually removed.
pub fn pull_token(pool: &DbPool, user_id: Uuid, token: &str) -> Result<bool, AppError> {
    let conn = lock(pool);
    let rows = conn.execute(
        "DELETE FROM user_tokens WHERE user_id = ?1 AND token = ?2",
        (user_id, token),
    )?;
    Ok(rows > 0)
}

// Task operations. Every statement is filtered by owner.
pub fn create_task(pool: &DbPool, owner_id: Uuid, text: &str) -> Result<Task, AppError> {
    let conn = lock(pool);
    let id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO tasks (id, owner_id, text) VALUES (?1, ?2, ?3)",
        (id, owner_id, text),
    )?;
    get_task_internal(&conn, owner_id, id)?
        .ok_or_else(|| AppError::Database("inserted task vanished".into()))
}

pub fn list_tasks(pool: &DbPool, owner_id: Uuid) -> Result<Vec<Task>, AppError> {
    let conn = lock(pool);
    let mut stmt = conn.prepare(
        "SELECT id, text, completed, completed_at, owner_id FROM tasks
         WHERE owner_id = ?1 ORDER BY created_at ASC, rowid ASC",
    )?;
    let tasks = stmt
        .query_map([owner_id], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tasks)
}

pub fn get_task(pool: &DbPool, owner_id: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
    let conn = lock(pool);
    get_task_internal(&conn, owner_id, id)
}

pub fn update_task(
    pool: &DbPool,
    owner_id: Uuid,
    id: Uuid,
    changes: &TaskChanges,
) -> Result<Option<Task>, AppError> {
    let conn = lock(pool);
    let completed_at = changes.completed_at.map(format_timestamp).transpose()?;

    let rows = match &changes.text {
        Some(text) => conn.execute(
            "UPDATE tasks SET text = ?1, completed = ?2, completed_at = ?3
             WHERE id = ?4 AND owner_id = ?5",
            (text, changes.completed as i32, completed_at, id, owner_id),
        )?,
        None => conn.execute(
            "UPDATE tasks SET completed = ?1, completed_at = ?2
             WHERE id = ?3 AND owner_id = ?4",
            (changes.completed as i32, completed_at, id, owner_id),
        )?,
    };

    if rows == 0 {
        return Ok(None);
    }
    get_task_internal(&conn, owner_id, id)
}

/// Removes the task and hands back what was removed.
pub fn delete_task(pool: &DbPool, owner_id: Uuid, id: Uuid) -> Result<Option<Task>, AppError> {
    let conn = lock(pool);
    let Some(task) = get_task_internal(&conn, owner_id, id)? else {
        return Ok(None);
    };
    conn.execute(
        "DELETE FROM tasks WHERE id = ?1 AND owner_id = ?2",
        (id, owner_id),
    )?;
    Ok(Some(task))
}

fn get_task_internal(
    conn: &Connection,
    owner_id: Uuid,
    id: Uuid,
) -> Result<Option<Task>, AppError> {
    let task = conn
        .query_row(
            "SELECT id, text, completed, completed_at, owner_id FROM tasks
             WHERE id = ?1 AND owner_id = ?2",
            (id, owner_id),
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

fn task_from_row(row: &Row) -> Result<Task> {
    let completed_at: Option<String> = row.get(3)?;
    let completed_at = completed_at
        .map(|raw| OffsetDateTime::parse(&raw, &Rfc3339))
        .transpose()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;

    Ok(Task {
        id: row.get(0)?,
        text: row.get(1)?,
        completed: row.get::<_, i32>(2)? != 0,
        completed_at,
        owner_id: row.get(4)?,
    })
}

fn format_timestamp(ts: OffsetDateTime) -> Result<String, AppError> {
    ts.format(&Rfc3339)
        .map_err(|e| AppError::Internal(format!("timestamp formatting failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn pool_with_user(email: &str) -> (DbPool, User) {
        let pool = open_in_memory().unwrap();
        let user = create_user(&pool, Uuid::new_v4(), email, "hash").unwrap();
        (pool, user)
    }

    #[test]
    fn duplicate_email_is_a_validation_error() {
        let (pool, _) = pool_with_user("a@b.com");
        let err = create_user(&pool, Uuid::new_v4(), "a@b.com", "other").unwrap_err();
        assert!(matches!(err, AppError::Validation { field: "email", .. }));
    }

    #[test]
    fn signup_rows_are_stored_together() {
        let pool = open_in_memory().unwrap();
        let first = StoredToken {
            token: "first".into(),
            purpose: Purpose::Access,
        };
        let user =
            create_user_with_token(&pool, Uuid::new_v4(), "a@b.com", "hash", first).unwrap();
        let loaded = find_user_by_email(&pool, "a@b.com").unwrap().unwrap();
        assert_eq!(loaded.tokens, user.tokens);

        // A failed token insert leaves no half-created account behind.
        lock(&pool).execute_batch("DROP TABLE user_tokens;").unwrap();
        let second = StoredToken {
            token: "second".into(),
            purpose: Purpose::Access,
        };
        assert!(
            create_user_with_token(&pool, Uuid::new_v4(), "c@d.com", "hash", second).is_err()
        );
        let users: i64 = lock(&pool)
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 1);
    }

    #[test]
    fn tokens_keep_issuance_order() {
        let (pool, user) = pool_with_user("a@b.com");
        for t in ["first", "second", "third"] {
            push_token(&pool, user.id, t, Purpose::Access).unwrap();
        }

        let loaded = find_user_by_email(&pool, "a@b.com").unwrap().unwrap();
        let tokens: Vec<_> = loaded.tokens.iter().map(|t| t.token.as_str()).collect();
        assert_eq!(tokens, ["first", "second", "third"]);
        assert!(loaded.tokens.iter().all(|t| t.purpose == Purpose::Access));
    }

    #[test]
    fn pull_token_removes_only_the_match() {
        let (pool, user) = pool_with_user("a@b.com");
        push_token(&pool, user.id, "keep", Purpose::Access).unwrap();
        push_token(&pool, user.id, "drop", Purpose::Access).unwrap();

        assert!(pull_token(&pool, user.id, "drop").unwrap());
        assert!(!pull_token(&pool, user.id, "drop").unwrap());

        let loaded = find_user_by_id(&pool, user.id).unwrap().unwrap();
        assert!(loaded.holds_token("keep"));
        assert!(!loaded.holds_token("drop"));
    }

    #[test]
    fn pushing_a_token_for_a_missing_user_fails() {
        let pool = open_in_memory().unwrap();
        assert!(push_token(&pool, Uuid::new_v4(), "t", Purpose::Access).is_err());
    }

    #[test]
    fn task_statements_are_owner_scoped() {
        let (pool, alice) = pool_with_user("alice@example.com");
        let bob = create_user(&pool, Uuid::new_v4(), "bob@example.com", "hash").unwrap();
        let task = create_task(&pool, alice.id, "alice's task").unwrap();

        assert!(list_tasks(&pool, bob.id).unwrap().is_empty());
        assert!(get_task(&pool, bob.id, task.id).unwrap().is_none());

        let changes = TaskChanges {
            text: Some("hijacked".into()),
            completed: true,
            completed_at: Some(datetime!(2024-01-01 0:00 UTC)),
        };
        assert!(update_task(&pool, bob.id, task.id, &changes).unwrap().is_none());
        assert!(delete_task(&pool, bob.id, task.id).unwrap().is_none());

        let still = get_task(&pool, alice.id, task.id).unwrap().unwrap();
        assert_eq!(still, task);
    }

    #[test]
    fn completed_at_keeps_sub_second_precision() {
        let (pool, user) = pool_with_user("a@b.com");
        let task = create_task(&pool, user.id, "write report").unwrap();
        let at = datetime!(2024-03-05 14:30:15.123456789 UTC);

        let updated = update_task(
            &pool,
            user.id,
            task.id,
            &TaskChanges {
                text: None,
                completed: true,
                completed_at: Some(at),
            },
        )
        .unwrap()
        .unwrap();

        assert_eq!(updated.text, "write report");
        assert_eq!(updated.completed_at, Some(at));
    }

    #[test]
    fn delete_returns_the_removed_task() {
        let (pool, user) = pool_with_user("a@b.com");
        let task = create_task(&pool, user.id, "one-off").unwrap();

        assert_eq!(delete_task(&pool, user.id, task.id).unwrap(), Some(task.clone()));
        assert!(get_task(&pool, user.id, task.id).unwrap().is_none());
        assert!(delete_task(&pool, user.id, task.id).unwrap().is_none());
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.db");

        let user_id = {
            let pool = init_db(&path).unwrap();
            let user = create_user(&pool, Uuid::new_v4(), "a@b.com", "hash").unwrap();
            push_token(&pool, user.id, "tok", Purpose::Access).unwrap();
            create_task(&pool, user.id, "persisted").unwrap();
            user.id
        };

        let pool = init_db(&path).unwrap();
        let user = find_user_by_id(&pool, user_id).unwrap().unwrap();
        assert!(user.holds_token("tok"));
        assert_eq!(list_tasks(&pool, user_id).unwrap()[0].text, "persisted");
    }
}
