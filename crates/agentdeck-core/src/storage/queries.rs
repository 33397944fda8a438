//! Chat history queries

use crate::error::Result;
use crate::types::{MessageRole, NewMessage};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

/// Stored conversation with one agent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSessionRecord {
    pub id: String,
    pub agent_id: String,
    pub agent_name: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
}

/// One stored transcript line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessageRecord {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub agent_name: Option<String>,
    pub created_at: String,
}

/// Fixed-width UTC timestamp, so text ordering matches time ordering
fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

// ===== Session Queries =====

pub fn create_chat_session(
    conn: &Connection,
    id: &str,
    agent_id: &str,
    agent_name: &str,
) -> Result<ChatSessionRecord> {
    let now = now();
    conn.execute(
        r#"
        INSERT INTO chat_sessions (id, agent_id, agent_name, title, created_at, updated_at)
        VALUES (?, ?, ?, '', ?, ?)
        "#,
        params![id, agent_id, agent_name, now, now],
    )?;

    Ok(ChatSessionRecord {
        id: id.to_string(),
        agent_id: agent_id.to_string(),
        agent_name: agent_name.to_string(),
        title: String::new(),
        created_at: now.clone(),
        updated_at: now,
        message_count: 0,
        last_message: None,
    })
}

const SESSION_LISTING: &str = r#"
    SELECT s.id, s.agent_id, s.agent_name, s.title, s.created_at, s.updated_at,
           (SELECT COUNT(*) FROM chat_messages WHERE session_id = s.id) AS message_count,
           (SELECT content FROM chat_messages WHERE session_id = s.id ORDER BY id DESC LIMIT 1) AS last_message
    FROM chat_sessions s
"#;

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ChatSessionRecord> {
    Ok(ChatSessionRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        agent_name: row.get(2)?,
        title: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        message_count: row.get(6)?,
        last_message: row.get(7)?,
    })
}

/// Sessions, most recently updated first, optionally for one agent
pub fn list_chat_sessions(
    conn: &Connection,
    agent_id: Option<&str>,
    limit: usize,
) -> Result<Vec<ChatSessionRecord>> {
    let sessions = match agent_id {
        Some(agent_id) => {
            let sql = format!(
                "{} WHERE s.agent_id = ? ORDER BY s.updated_at DESC, s.rowid DESC LIMIT ?",
                SESSION_LISTING
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![agent_id, limit as i64], session_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let sql = format!(
                "{} ORDER BY s.updated_at DESC, s.rowid DESC LIMIT ?",
                SESSION_LISTING
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit as i64], session_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        }
    };

    Ok(sessions)
}

pub fn get_chat_session(conn: &Connection, id: &str) -> Result<Option<ChatSessionRecord>> {
    let sql = format!("{} WHERE s.id = ?", SESSION_LISTING);
    let session = conn
        .query_row(&sql, params![id], session_from_row)
        .optional()?;
    Ok(session)
}

pub fn get_recent_chats(conn: &Connection, limit: usize) -> Result<Vec<ChatSessionRecord>> {
    list_chat_sessions(conn, None, limit)
}

/// Set the title unless one is already there
pub fn update_session_title(conn: &Connection, session_id: &str, title: &str) -> Result<bool> {
    let changed = conn.execute(
        r#"
        UPDATE chat_sessions SET title = ?, updated_at = ?
        WHERE id = ? AND (title IS NULL OR title = '')
        "#,
        params![title, now(), session_id],
    )?;
    Ok(changed > 0)
}

pub fn touch_session(conn: &Connection, session_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE chat_sessions SET updated_at = ? WHERE id = ?",
        params![now(), session_id],
    )?;
    Ok(())
}

/// Delete a session and its messages. Returns false if it did not exist.
pub fn delete_chat_session(conn: &Connection, session_id: &str) -> Result<bool> {
    conn.execute(
        "DELETE FROM chat_messages WHERE session_id = ?",
        params![session_id],
    )?;
    let deleted = conn.execute("DELETE FROM chat_sessions WHERE id = ?", params![session_id])?;
    Ok(deleted > 0)
}

// ===== Message Queries =====

/// Append a message and bump the session's update time
pub fn save_message(conn: &Connection, session_id: &str, message: &NewMessage) -> Result<i64> {
    conn.execute(
        r#"
        INSERT INTO chat_messages (session_id, role, content, agent_name, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
        params![
            session_id,
            message.role.as_str(),
            message.content,
            message.agent_name,
            now(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    touch_session(conn, session_id)?;
    Ok(id)
}

/// Transcript of one session in insertion order
pub fn get_session_messages(conn: &Connection, session_id: &str) -> Result<Vec<ChatMessageRecord>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, session_id, role, content, agent_name, created_at
        FROM chat_messages
        WHERE session_id = ?
        ORDER BY id ASC
        "#,
    )?;

    let messages = stmt
        .query_map(params![session_id], |row| {
            let role: String = row.get(2)?;
            Ok((
                role,
                ChatMessageRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    role: MessageRole::User,
                    content: row.get(3)?,
                    agent_name: row.get(4)?,
                    created_at: row.get(5)?,
                },
            ))
        })?
        .filter_map(|r| r.ok())
        .filter_map(|(role, mut record)| {
            record.role = MessageRole::parse(&role)?;
            Some(record)
        })
        .collect();

    Ok(messages)
}
