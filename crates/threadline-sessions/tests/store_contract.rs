// Behaviour every session backend must share. Each scenario runs against
// the file store and the sqlite store.

use std::thread::sleep;
use std::time::Duration;

use chrono::Utc;
use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;
use threadline_sessions::db::init_db;
use threadline_sessions::{
    FileSessionStore, Message, Part, Role, SessionError, SessionManager, SqliteSessionStore,
    FALLBACK_TITLE,
};

/// Keeps the temp dir alive as long as the manager.
struct Harness {
    manager: SessionManager,
    _dir: Option<TempDir>,
}

fn file_backend() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let manager = SessionManager::new(Box::new(FileSessionStore::new(dir.path().join(".chats"))));
    Harness {
        manager,
        _dir: Some(dir),
    }
}

fn sqlite_backend() -> Harness {
    let conn = Connection::open_in_memory().unwrap();
    init_db(&conn).unwrap();
    Harness {
        manager: SessionManager::new(Box::new(SqliteSessionStore::new(conn))),
        _dir: None,
    }
}

fn backends() -> Vec<(&'static str, Harness)> {
    vec![("file", file_backend()), ("sqlite", sqlite_backend())]
}

fn hello() -> Vec<Message> {
    vec![Message::text(Role::User, "Hello")]
}

#[test]
fn unsaved_id_loads_empty() {
    for (name, h) in backends() {
        let id = h.manager.create();
        assert!(h.manager.load(id.as_str()).unwrap().is_empty(), "{name}");
    }
}

#[test]
fn malformed_ids_load_empty() {
    for (name, h) in backends() {
        for bad in ["", "../secrets", "a b", "x.json"] {
            assert!(h.manager.load(bad).unwrap().is_empty(), "{name}: {bad:?}");
        }
    }
}

#[test]
fn save_then_load_round_trips_opaque_parts() {
    let transcript: Vec<Message> = serde_json::from_value(json!([
        {"id": "m1", "role": "system", "parts": [{"type": "text", "text": "Be brief."}]},
        {
            "id": "m2",
            "role": "user",
            "parts": [
                {"type": "file", "mediaType": "image/png", "url": "data:image/png;base64,AAAA"},
                {"type": "text", "text": "What is in this picture?"}
            ]
        },
        {
            "id": "m3",
            "role": "assistant",
            "metadata": {"finishReason": "stop"},
            "parts": [
                {"type": "step-start"},
                {"type": "tool-lookup", "toolCallId": "c1", "state": "output-available",
                 "input": {"q": "cat"}, "output": {"hits": 3}},
                {"type": "text", "text": "A cat.", "state": "done"}
            ]
        }
    ]))
    .unwrap();

    for (name, h) in backends() {
        h.manager.save("round1", transcript.clone()).unwrap();
        let loaded = h.manager.load("round1").unwrap();
        assert_eq!(loaded, transcript, "{name}");
        assert!(matches!(loaded[1].parts[0], Part::Opaque(_)), "{name}");
        assert_eq!(
            serde_json::to_value(&loaded).unwrap(),
            serde_json::to_value(&transcript).unwrap(),
            "{name}"
        );
    }
}

#[test]
fn second_save_replaces_first() {
    for (name, h) in backends() {
        h.manager
            .save("lww", vec![Message::text(Role::User, "first version")])
            .unwrap();
        let second = vec![
            Message::text(Role::User, "second version"),
            Message::text(Role::Assistant, "ok"),
        ];
        h.manager.save("lww", second.clone()).unwrap();

        assert_eq!(h.manager.load("lww").unwrap(), second, "{name}");
        let list = h.manager.list().unwrap();
        assert_eq!(list.len(), 1, "{name}");
        assert_eq!(list[0].title, "second version", "{name}");
    }
}

#[test]
fn list_is_newest_first() {
    for (name, h) in backends() {
        h.manager.save("older", hello()).unwrap();
        sleep(Duration::from_millis(10));
        h.manager.save("newer", hello()).unwrap();

        let ids: Vec<_> = h
            .manager
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.id.to_string())
            .collect();
        assert_eq!(ids, ["newer", "older"], "{name}");

        // Re-saving the older session moves it to the front.
        sleep(Duration::from_millis(10));
        h.manager.save("older", hello()).unwrap();
        let first = h.manager.list().unwrap().remove(0);
        assert_eq!(first.id.as_str(), "older", "{name}");
    }
}

#[test]
fn empty_id_save_is_rejected_without_write() {
    for (name, h) in backends() {
        let err = h.manager.save("", hello()).unwrap_err();
        assert!(matches!(err, SessionError::InvalidArgument(_)), "{name}");
        assert!(h.manager.list().unwrap().is_empty(), "{name}");
    }
}

#[test]
fn path_like_id_save_is_rejected() {
    for (name, h) in backends() {
        let err = h.manager.save("../escape", hello()).unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT", "{name}");
    }
}

#[test]
fn transcript_without_user_text_gets_fallback_title() {
    for (name, h) in backends() {
        let summary = h
            .manager
            .save("notext", vec![Message::text(Role::Assistant, "Hi, how can I help?")])
            .unwrap();
        assert_eq!(summary.title, FALLBACK_TITLE, "{name}");
        assert_eq!(h.manager.list().unwrap()[0].title, FALLBACK_TITLE, "{name}");
    }
}

#[test]
fn hello_scenario() {
    for (name, h) in backends() {
        let before = Utc::now() - chrono::Duration::seconds(1);
        let summary = h.manager.save("abc123", hello()).unwrap();

        let loaded = h.manager.load("abc123").unwrap();
        assert_eq!(loaded, hello(), "{name}");

        let list = h.manager.list().unwrap();
        let entry = list
            .iter()
            .find(|s| s.id.as_str() == "abc123")
            .expect("listed");
        assert_eq!(entry.title, "Hello", "{name}");
        assert!(entry.last_modified >= before, "{name}");
        assert_eq!(entry, &summary, "{name}");

        let listing = serde_json::to_value(&list).unwrap();
        assert_eq!(listing[0]["id"], "abc123");
        assert_eq!(listing[0]["title"], "Hello");
        assert!(listing[0]["lastModified"].is_i64());
    }
}

#[test]
fn sessions_are_independent() {
    for (name, h) in backends() {
        h.manager
            .save("one", vec![Message::text(Role::User, "first topic")])
            .unwrap();
        h.manager
            .save("two", vec![Message::text(Role::User, "second topic")])
            .unwrap();
        assert_eq!(h.manager.load("one").unwrap()[0].plain_text(), "first topic", "{name}");
        assert_eq!(h.manager.load("two").unwrap()[0].plain_text(), "second topic", "{name}");
    }
}
