use std::collections::BTreeSet;
use std::fs;
use std::thread;

use anyhow::Result;
use proptest::prelude::*;
use tempfile::tempdir;

use crate::capability::testing::{Bigram, Delimit, Lowercase, StopWord};
use crate::engine::{journal_path, snapshot_path, table_dir};
use crate::*;

// ---------------------- Helpers ----------------------

fn paths() -> Result<(Namespace, Table)> {
    let ns = Namespace::new();
    let table = ns.create_table(TableConfig::new("Paths"))?;
    for p in ["/", "/tmp", "/usr/bin", "/usr/local/bin"] {
        table.add(p)?;
    }
    Ok((ns, table))
}

fn strings(cursor: PrefixCursor) -> Result<Vec<String>> {
    Ok(cursor.keys()?.iter().map(Key::to_string).collect())
}

fn uints(cursor: PrefixCursor) -> Result<Vec<u64>> {
    Ok(cursor.keys()?.iter().filter_map(Key::as_u64).collect())
}

// ---------------------- Prefix cursors ----------------------

#[test]
fn prefix_cursor_ascending() -> Result<()> {
    let (_ns, paths) = paths()?;
    let keys = strings(paths.open_prefix_cursor("/", CursorOptions::new())?)?;
    assert_eq!(keys, ["/", "/tmp", "/usr/bin", "/usr/local/bin"]);

    let keys = strings(paths.open_prefix_cursor("/usr", CursorOptions::new())?)?;
    assert_eq!(keys, ["/usr/bin", "/usr/local/bin"]);
    Ok(())
}

#[test]
fn prefix_cursor_descending_with_key_bytes() -> Result<()> {
    let (_ns, paths) = paths()?;
    let cursor = paths.open_prefix_cursor(
        "/usr/local",
        CursorOptions::new().descending().key_bytes(4),
    )?;
    assert_eq!(cursor.order(), Order::Descending);
    assert_eq!(strings(cursor)?, ["/usr/local/bin", "/usr/bin"]);
    Ok(())
}

#[test]
fn prefix_cursor_offset_and_limit() -> Result<()> {
    let (_ns, paths) = paths()?;
    let keys = strings(paths.open_prefix_cursor("/", CursorOptions::new().offset(1).limit(2))?)?;
    assert_eq!(keys, ["/tmp", "/usr/bin"]);

    let keys = strings(paths.open_prefix_cursor(
        "/",
        CursorOptions::new().descending().offset(3).limit(5),
    )?)?;
    assert_eq!(keys, ["/"]);

    let keys = strings(paths.open_prefix_cursor("/", CursorOptions::new().limit(0))?)?;
    assert!(keys.is_empty());
    Ok(())
}

#[test]
fn descending_is_reverse_of_ascending() -> Result<()> {
    let (_ns, paths) = paths()?;
    for word in ["/usr/share", "/var", "/var/log", "/tmp/x", ""] {
        paths.add(word)?;
    }
    let mut asc = strings(paths.each())?;
    let desc = strings(paths.open_cursor(CursorOptions::new().descending()))?;
    asc.reverse();
    assert_eq!(asc, desc);
    Ok(())
}

#[test]
fn missing_prefix_yields_nothing() -> Result<()> {
    let (_ns, paths) = paths()?;
    assert!(strings(paths.open_prefix_cursor("/opt", CursorOptions::new())?)?.is_empty());
    assert_eq!(
        strings(paths.open_prefix_cursor("/opt", CursorOptions::new().key_bytes(0))?)?.len(),
        4
    );
    Ok(())
}

#[test]
fn cursor_survives_interleaved_inserts() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Words"))?;
    for i in (0..400).step_by(2) {
        t.add(format!("k{i:04}"))?;
    }

    let mut cursor = t.each();
    let mut seen = Vec::new();
    for _ in 0..50 {
        seen.push(cursor.next().transpose()?.map(|r| r.key.to_string()));
    }
    for i in (1..400).step_by(2) {
        t.add(format!("k{i:04}"))?;
        t.add(format!("k{i:04}/{}", i * 7))?;
    }
    for record in cursor {
        seen.push(Some(record?.key.to_string()));
    }
    let seen: Vec<String> = seen.into_iter().flatten().collect();

    assert!(seen.windows(2).all(|w| w[0] < w[1]), "out of order or duplicate");
    for i in (0..400).step_by(2) {
        assert!(seen.contains(&format!("k{i:04}")));
    }
    t.verify()?;
    Ok(())
}

#[test]
fn concurrent_readers_see_ordered_keys() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Shared"))?;
    for i in 0..100u32 {
        t.add(format!("base/{i:03}"))?;
    }

    thread::scope(|s| {
        let writer = t.clone();
        s.spawn(move || {
            for i in 0..500u32 {
                writer.add(format!("base/{:03}/{i}", i % 100)).unwrap();
                if i % 3 == 0 {
                    writer.delete(format!("base/{:03}/{i}", i % 100).as_str()).unwrap();
                }
            }
        });
        for _ in 0..4 {
            let reader = t.clone();
            s.spawn(move || {
                for _ in 0..10 {
                    let keys: Vec<String> = reader
                        .open_prefix_cursor("base/", CursorOptions::new())
                        .unwrap()
                        .map(|r| r.unwrap().key.to_string())
                        .collect();
                    assert!(keys.windows(2).all(|w| w[0] < w[1]));
                }
            });
        }
    });

    t.verify()?;
    assert_eq!(t.len(), 100 + 500 - 167);
    Ok(())
}

// ---------------------- Add / update / delete ----------------------

#[test]
fn add_reports_created() -> Result<()> {
    let ns = Namespace::new();
    let users = ns.create_table(TableConfig::new("Users"))?;
    let name = users.define_column("name", DataType::ShortText)?;

    let first = users.add_with("bob", &[("name", "Bob".into())])?;
    assert!(first.is_added());
    assert_eq!(first.id(), RecordId::new(1));

    let again = users.add_with("bob", &[("name", "Robert".into())])?;
    assert!(!again.created);
    assert_eq!(again.record, first.record);
    assert_eq!(name.get(first.id())?, Some(Value::from("Bob")));

    let second = users.add("alice")?;
    assert_eq!(second.id(), RecordId::new(2));
    assert_eq!(users.len(), 2);
    Ok(())
}

#[test]
fn add_with_unknown_column_creates_nothing() -> Result<()> {
    let ns = Namespace::new();
    let users = ns.create_table(TableConfig::new("Users"))?;
    let err = users.add_with("bob", &[("age", Value::Int(3))]).unwrap_err();
    assert!(matches!(err, TableError::NotFound(_)));
    assert!(!users.has_key("bob")?);
    assert!(users.is_empty());
    Ok(())
}

#[test]
fn update_keeps_ids() -> Result<()> {
    let ns = Namespace::new();
    let users = ns.create_table(TableConfig::new("Users").value_type(DataType::Int32))?;
    let age = users.define_column("age", DataType::UInt8)?;
    let bob = users.add("bob")?.id();
    let carol = users.add("carol")?.id();
    users.set_value(bob, 7)?;
    age.set(bob, 31u8)?;

    let renamed = users.update("bob", "robert")?;
    assert_eq!(renamed.id, bob);
    assert_eq!(renamed.key, Key::from("robert"));
    assert!(!users.has_key("bob")?);
    assert_eq!(users.get("robert")?.map(|r| r.id), Some(bob));
    assert_eq!(users.value(bob)?, Some(Value::Int(7)));
    assert_eq!(age.get(bob)?, Some(Value::UInt(31)));

    let by_id = users.update(carol, "caroline")?;
    assert_eq!(by_id.id, carol);
    assert_eq!(users.record(carol)?.map(|r| r.key), Some(Key::from("caroline")));

    assert_eq!(users.update(bob, "robert")?.id, bob);
    assert!(matches!(
        users.update(bob, "caroline"),
        Err(TableError::DuplicateKey { id, .. }) if id == carol
    ));
    assert!(matches!(users.update("nobody", "x"), Err(TableError::NotFound(_))));
    assert!(matches!(
        users.update(RecordId::new(99), "x"),
        Err(TableError::NotFound(_))
    ));
    users.verify()?;
    Ok(())
}

#[test]
fn delete_frees_ids_and_cells() -> Result<()> {
    let ns = Namespace::new();
    let users = ns.create_table(TableConfig::new("Users"))?;
    let bio = users.define_column("bio", DataType::Text)?;
    for name in ["a", "b", "c"] {
        let id = users.add(name)?.id();
        bio.set(id, format!("bio of {name}"))?;
    }
    assert_eq!(users.storage_stats().live_segments, 3);

    assert_eq!(users.delete("b")?, RecordId::new(2));
    assert_eq!(users.storage_stats().live_segments, 2);
    assert!(!users.has_key("b")?);
    assert!(users.record(RecordId::new(2))?.is_none());
    assert!(matches!(bio.get(RecordId::new(2)), Err(TableError::NotFound(_))));
    assert!(matches!(users.delete("b"), Err(TableError::NotFound(_))));

    assert_eq!(users.delete(RecordId::new(1))?, RecordId::new(1));
    assert_eq!(users.add("d")?.id(), RecordId::new(1));
    assert_eq!(users.add("e")?.id(), RecordId::new(2));
    assert_eq!(users.add("f")?.id(), RecordId::new(4));
    assert_eq!(bio.get(RecordId::new(1))?, None);
    users.verify()?;
    Ok(())
}

#[test]
fn long_keys_survive_updates_and_defrag() -> Result<()> {
    let ns = Namespace::new();
    let urls = ns.create_table(TableConfig::new("Urls"))?;
    let long = |i: u32| format!("https://example.org/articles/{i:05}/index.html");
    for i in 0..50 {
        urls.add(long(i))?;
    }
    for i in (0..50).step_by(2) {
        urls.update(long(i).as_str(), format!("{}?page=2", long(i)))?;
    }
    assert!(urls.fragmentation() > 0.0);
    assert!(urls.defrag(None)? > 0);
    assert_eq!(urls.fragmentation(), 0.0);

    for i in 0..50 {
        let expected = if i % 2 == 0 {
            format!("{}?page=2", long(i))
        } else {
            long(i)
        };
        let record = urls.get(expected.as_str())?.expect("key present");
        assert_eq!(record.id, RecordId::new(i + 1));
    }
    urls.verify()?;
    Ok(())
}

// ---------------------- Key types ----------------------

#[test]
fn unsigned_keys_iterate_numerically() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Numbers").key_type(DataType::UInt32))?;
    for n in [5u32, 1, 7, 2] {
        t.add(n)?;
    }
    assert_eq!(uints(t.each())?, [1, 2, 5, 7]);
    assert_eq!(uints(t.open_cursor(CursorOptions::new().descending()))?, [7, 5, 2, 1]);
    assert_eq!(uints(t.open_prefix_cursor(5u32, CursorOptions::new())?)?, [5]);
    assert!(t.has_key(7u32)?);
    assert!(!t.has_key(3u32)?);

    assert!(matches!(t.add("five"), Err(TableError::InvalidKeyType { .. })));
    assert!(matches!(t.add(-1i32), Err(TableError::InvalidKeyType { .. })));
    assert!(matches!(t.add(1u64 << 40), Err(TableError::InvalidKeyType { .. })));
    Ok(())
}

#[test]
fn signed_keys_put_negatives_first() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Offsets").key_type(DataType::Int32))?;
    for n in [3i32, -5, 0, -1, i32::MIN, i32::MAX] {
        t.add(n)?;
    }
    let keys: Vec<i64> = t.keys()?.iter().filter_map(Key::as_i64).collect();
    assert_eq!(keys, [i64::from(i32::MIN), -5, -1, 0, 3, i64::from(i32::MAX)]);
    assert_eq!(t.get(-5i32)?.map(|r| r.key), Some(Key::Int(-5)));
    Ok(())
}

#[test]
fn empty_key_is_a_record() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Tags"))?;
    t.add("")?;
    t.add("a")?;
    assert!(t.has_key("")?);
    assert_eq!(strings(t.each())?, ["", "a"]);
    t.delete("")?;
    assert_eq!(strings(t.each())?, ["a"]);
    Ok(())
}

// ---------------------- Value slots ----------------------

#[test]
fn value_slots() -> Result<()> {
    let ns = Namespace::new();
    let counts = ns.create_table(TableConfig::new("Counts").value_type(DataType::Int32))?;
    assert!(counts.supports_key());
    assert!(counts.supports_value());

    let id = counts.add("hits")?.id();
    assert_eq!(counts.value(id)?, Some(Value::Int(0)));
    counts.set_value(id, -42)?;
    assert_eq!(counts.value(id)?, Some(Value::Int(-42)));
    assert!(matches!(
        counts.set_value(id, "many"),
        Err(TableError::InvalidValue { .. })
    ));

    let plain = ns.create_table(TableConfig::new("Plain"))?;
    let id = plain.add("x")?.id();
    assert!(!plain.supports_value());
    assert_eq!(plain.value(id)?, None);
    assert!(matches!(
        plain.set_value(id, 1),
        Err(TableError::UnsupportedOperation(_))
    ));
    Ok(())
}

// ---------------------- Columns and defrag ----------------------

#[test]
fn column_bounds() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Docs"))?;
    let title = t.define_column("title", DataType::ShortText)?;
    let body = t.define_column("body", DataType::LongText)?;
    let score = t.define_column("score", DataType::Float)?;
    assert!(matches!(
        t.define_column("title", DataType::Text),
        Err(TableError::DuplicateName(_))
    ));

    let id = t.add("doc")?.id();
    assert!(matches!(
        title.set(id, "x".repeat(4097)),
        Err(TableError::InvalidValue { .. })
    ));
    title.set(id, "x".repeat(4096))?;
    body.set(id, "y".repeat(100_000))?;
    score.set(id, 0.5)?;
    assert!(matches!(score.set(id, "high"), Err(TableError::InvalidValue { .. })));
    assert_eq!(score.get(id)?, Some(Value::Float(0.5)));
    assert_eq!(body.get(id)?.and_then(|v| v.as_str().map(str::len)), Some(100_000));
    assert!(matches!(
        title.set(RecordId::new(9), "t"),
        Err(TableError::NotFound(_))
    ));
    assert_eq!(t.columns().len(), 3);
    Ok(())
}

#[test]
fn defrag_reclaims_overwritten_cells() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Notes"))?;
    let text = t.define_column("text", DataType::Text)?;
    let mut ids = Vec::new();
    for i in 0..20 {
        let id = t.add(format!("note{i}"))?.id();
        text.set(id, format!("note number {i}"))?;
        ids.push(id);
    }
    assert_eq!(t.defrag(None)?, 0);

    for (i, id) in ids.iter().enumerate().filter(|(i, _)| i % 2 == 0) {
        text.set(*id, format!("note number {i}, now with a much longer body"))?;
    }
    let before = t.storage_stats();
    assert_eq!(before.dead_segments, 10);
    assert!(t.defrag(None)? > 0);
    assert_eq!(t.storage_stats().dead_segments, 0);
    assert!(t.storage_stats().heap_bytes < before.heap_bytes);

    for (i, id) in ids.iter().enumerate() {
        let expected = if i % 2 == 0 {
            format!("note number {i}, now with a much longer body")
        } else {
            format!("note number {i}")
        };
        assert_eq!(text.get(*id)?, Some(Value::Text(expected)));
    }
    assert_eq!(t.defrag(None)?, 0);
    Ok(())
}

#[test]
fn bounded_defrag_makes_progress() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Chunks"))?;
    let data = t.define_column("data", DataType::Text)?;
    let mut ids = Vec::new();
    for i in 0..30 {
        let id = t.add(format!("c{i:02}"))?.id();
        data.set(id, "v".repeat(32))?;
        ids.push(id);
    }
    for id in ids.iter().step_by(3) {
        data.set(*id, "w".repeat(64))?;
    }
    assert_eq!(t.storage_stats().dead_segments, 10);
    let mut total = 0;
    for _ in 0..100 {
        let n = t.defrag(Some(4))?;
        assert!(n <= 4);
        if n == 0 {
            break;
        }
        total += n;
    }
    assert!(total > 0);
    assert_eq!(t.fragmentation(), 0.0);
    assert_eq!(data.get(RecordId::new(1))?, Some(Value::Text("w".repeat(64))));
    Ok(())
}

// ---------------------- Metadata ----------------------

#[test]
fn rename_cascades_to_columns() -> Result<()> {
    let ns = Namespace::new();
    let users = ns.create_table(TableConfig::new("Users"))?;
    let name = users.define_column("name", DataType::ShortText)?;
    ns.create_table(TableConfig::new("Groups"))?;
    assert_eq!(name.name(), "Users.name");

    users.rename("People")?;
    assert_eq!(users.name(), "People");
    assert_eq!(name.name(), "People.name");
    assert!(ns.table("Users").is_none());
    assert_eq!(ns.table("People").map(|t| t.name()), Some("People".into()));

    assert!(matches!(users.rename("Groups"), Err(TableError::DuplicateName(_))));
    assert!(matches!(users.rename("bad.name"), Err(TableError::InvalidName(_))));
    users.rename("People")?;
    assert_eq!(ns.table_names(), ["Groups", "People"]);

    ns.remove_table("People")?;
    assert!(matches!(
        users.rename("Again"),
        Err(TableError::UnsupportedOperation(_))
    ));
    Ok(())
}

#[test]
fn encoding_defaults_to_utf8() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Plain"))?;
    assert_eq!(t.encoding(), Encoding::Utf8);
    let latin = ns.create_table(TableConfig::new("Latin").encoding(Encoding::Latin1))?;
    assert_eq!(latin.encoding(), Encoding::Latin1);
    assert_eq!(latin.key_type(), DataType::ShortText);
    assert_eq!(latin.value_type(), None);
    Ok(())
}

#[test]
fn tokenizer_and_filters() -> Result<()> {
    let ns = Namespace::new();
    ns.register_tokenizer(Bigram);
    ns.register_tokenizer(Delimit);
    ns.register_token_filter(Lowercase);
    ns.register_token_filter(StopWord(&["the"]));

    let terms = ns.create_table(TableConfig::new("Terms"))?;
    assert!(terms.default_tokenizer().is_none());
    assert!(matches!(
        terms.tokenize("abc"),
        Err(TableError::UnsupportedOperation(_))
    ));

    terms.set_default_tokenizer(Some("TokenBigram"))?;
    assert_eq!(
        terms.default_tokenizer().map(|t| t.name().to_owned()),
        Some("TokenBigram".into())
    );
    assert_eq!(terms.tokenize("abc")?, ["ab", "bc"]);

    assert!(matches!(
        terms.set_default_tokenizer(Some("TokenMecab")),
        Err(TableError::NotFound(_))
    ));
    assert!(terms.default_tokenizer().is_some());
    terms.set_default_tokenizer(None)?;
    assert!(terms.default_tokenizer().is_none());

    terms.set_token_filters(&["TokenFilterLowercase"])?;
    assert_eq!(terms.token_filters().len(), 1);
    assert!(terms
        .set_token_filters(&["TokenFilterLowercase", "TokenFilterNope"])
        .is_err());
    assert_eq!(terms.token_filters().len(), 1);

    let words = ns.create_table(
        TableConfig::new("Words")
            .default_tokenizer("TokenDelimit")
            .token_filters(["TokenFilterLowercase", "TokenFilterStopWord"]),
    )?;
    assert_eq!(words.tokenize("The Quick fox")?, ["quick", "fox"]);
    let names: Vec<String> = words
        .token_filters()
        .iter()
        .map(|f| f.name().to_owned())
        .collect();
    assert_eq!(names, ["TokenFilterLowercase", "TokenFilterStopWord"]);
    Ok(())
}

// ---------------------- Persistence ----------------------

fn persistent(dir: &std::path::Path) -> TableConfig {
    persistent_named(dir, "Users")
}

fn persistent_named(dir: &std::path::Path, name: &str) -> TableConfig {
    TableConfig::new(name).value_type(DataType::UInt16).dir(dir)
}

#[test]
fn journal_replay_restores_table() -> Result<()> {
    let dir = tempdir()?;
    {
        let ns = Namespace::new();
        let users = ns.create_table(persistent(dir.path()))?;
        assert!(users.is_persistent());
        for name in ["alice", "bob", "carol", "a-much-longer-user-name-than-usual"] {
            users.add(name)?;
        }
        users.set_value(RecordId::new(2), 300u16)?;
        users.update("carol", "caroline")?;
        users.delete("alice")?;
    }

    let ns = Namespace::new();
    let users = ns.create_table(persistent(dir.path()))?;
    assert_eq!(
        strings(users.each())?,
        ["a-much-longer-user-name-than-usual", "bob", "caroline"]
    );
    assert_eq!(users.get("bob")?.map(|r| r.id), Some(RecordId::new(2)));
    assert_eq!(users.get("caroline")?.map(|r| r.id), Some(RecordId::new(3)));
    assert_eq!(users.value(RecordId::new(2))?, Some(Value::UInt(300)));
    assert_eq!(users.add("dave")?.id(), RecordId::new(1));
    users.verify()?;
    Ok(())
}

#[test]
fn checkpoint_truncates_journal() -> Result<()> {
    let dir = tempdir()?;
    let journal = journal_path(&table_dir(dir.path(), "Users"));
    let snapshot = snapshot_path(&table_dir(dir.path(), "Users"));
    {
        let ns = Namespace::new();
        let users = ns.create_table(persistent(dir.path()))?;
        for name in ["alice", "bob", "carol", "dave"] {
            users.add(name)?;
        }
        users.set_value(RecordId::new(4), 9u16)?;
        users.delete("bob")?;
        users.delete("dave")?;
        assert!(fs::metadata(&journal)?.len() > 0);

        users.checkpoint()?;
        assert_eq!(fs::metadata(&journal)?.len(), 0);
        assert!(snapshot.exists());

        users.add("erin")?;
    }

    let ns = Namespace::new();
    let users = ns.create_table(persistent(dir.path()))?;
    assert_eq!(strings(users.each())?, ["alice", "carol", "erin"]);
    assert_eq!(users.get("erin")?.map(|r| r.id), Some(RecordId::new(2)));
    assert_eq!(users.add("frank")?.id(), RecordId::new(4));
    assert_eq!(users.value(RecordId::new(4))?, Some(Value::UInt(0)));
    assert_eq!(users.add("gina")?.id(), RecordId::new(5));
    Ok(())
}

#[test]
fn checkpoint_needs_persistence() -> Result<()> {
    let ns = Namespace::new();
    let t = ns.create_table(TableConfig::new("Mem"))?;
    assert!(matches!(
        t.checkpoint(),
        Err(TableError::UnsupportedOperation(_))
    ));
    Ok(())
}

#[test]
fn rename_moves_files() -> Result<()> {
    let dir = tempdir()?;
    {
        let ns = Namespace::new();
        let users = ns.create_table(persistent(dir.path()))?;
        users.add("alice")?;
        users.checkpoint()?;
        users.add("bob")?;
        users.rename("People")?;
        users.add("carol")?;
    }
    let people_dir = table_dir(dir.path(), "People");
    assert!(!table_dir(dir.path(), "Users").exists());
    assert!(snapshot_path(&people_dir).exists());
    assert!(journal_path(&people_dir).exists());

    let ns = Namespace::new();
    let people = ns.create_table(persistent_named(dir.path(), "People"))?;
    assert_eq!(strings(people.each())?, ["alice", "bob", "carol"]);

    ns.remove_table("People")?;
    assert!(!people_dir.exists());
    Ok(())
}

#[test]
fn rename_keeps_snapshot_and_journal_together() -> Result<()> {
    let dir = tempdir()?;
    {
        let ns = Namespace::new();
        let users = ns.create_table(persistent(dir.path()))?;
        users.add("alice")?;
        users.checkpoint()?;
        users.add("bob")?;
        users.rename("People")?;
    }

    // Either name sees the whole table or nothing at all.
    let ns = Namespace::new();
    let users = ns.create_table(persistent(dir.path()))?;
    assert!(users.is_empty());
    let people = ns.create_table(persistent_named(dir.path(), "People"))?;
    assert_eq!(strings(people.each())?, ["alice", "bob"]);
    Ok(())
}

#[test]
fn rename_onto_existing_files_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    {
        let ns = Namespace::new();
        let people = ns.create_table(persistent_named(dir.path(), "People"))?;
        people.add("zoe")?;
    }
    let ns = Namespace::new();
    let users = ns.create_table(persistent(dir.path()))?;
    users.add("alice")?;
    assert!(matches!(
        users.rename("People"),
        Err(TableError::DuplicateName(_))
    ));
    assert_eq!(users.name(), "Users");
    users.add("bob")?;
    drop(ns);

    let ns = Namespace::new();
    let users = ns.create_table(persistent(dir.path()))?;
    assert_eq!(strings(users.each())?, ["alice", "bob"]);
    Ok(())
}

#[test]
fn stale_journal_after_checkpoint_is_skipped() -> Result<()> {
    let dir = tempdir()?;
    let journal = journal_path(&table_dir(dir.path(), "Users"));
    {
        let ns = Namespace::new();
        let users = ns.create_table(persistent(dir.path()))?;
        users.add("alice")?;
        users.add("bob")?;
        users.set_value(RecordId::new(2), 7u16)?;
        let before = fs::read(&journal)?;

        users.checkpoint()?;
        // Crash after the snapshot rename, before the journal truncation.
        fs::write(&journal, before)?;
    }

    {
        let ns = Namespace::new();
        let users = ns.create_table(persistent(dir.path()))?;
        assert_eq!(strings(users.each())?, ["alice", "bob"]);
        assert_eq!(users.value(RecordId::new(2))?, Some(Value::UInt(7)));
        users.verify()?;
        assert_eq!(users.add("carol")?.id(), RecordId::new(3));
        users.delete("alice")?;
    }

    let ns = Namespace::new();
    let users = ns.create_table(persistent(dir.path()))?;
    assert_eq!(strings(users.each())?, ["bob", "carol"]);
    users.verify()?;
    Ok(())
}

#[test]
fn corrupt_snapshot_is_reported() -> Result<()> {
    let dir = tempdir()?;
    {
        let ns = Namespace::new();
        let users = ns.create_table(persistent(dir.path()))?;
        users.add("alice")?;
        users.checkpoint()?;
    }
    let path = snapshot_path(&table_dir(dir.path(), "Users"));
    let mut bytes = fs::read(&path)?;
    bytes[0] ^= 0xFF;
    fs::write(&path, bytes)?;

    let ns = Namespace::new();
    assert!(matches!(
        ns.create_table(persistent(dir.path())),
        Err(TableError::Snapshot(_))
    ));
    Ok(())
}

// ---------------------- Properties ----------------------

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(prop::sample::select(vec![b'a', b'b', b'c', b'/']), 0..6)
}

proptest! {
    #[test]
    fn cursor_matches_sorted_filter(
        keys in prop::collection::btree_set(key_strategy(), 0..60),
        prefix in key_strategy(),
        key_bytes in prop::option::of(0usize..6),
        offset in 0usize..5,
        limit in prop::option::of(0usize..10),
        descending in any::<bool>(),
    ) {
        let ns = Namespace::new();
        let t = ns.create_table(TableConfig::new("Prop")).unwrap();
        for k in &keys {
            t.add(k.as_slice()).unwrap();
        }

        let cut = key_bytes.map_or(prefix.len(), |n| n.min(prefix.len()));
        let effective = &prefix[..cut];
        let mut expected: Vec<Vec<u8>> = keys
            .iter()
            .filter(|k| k.starts_with(effective))
            .cloned()
            .collect();
        if descending {
            expected.reverse();
        }
        let expected: Vec<Vec<u8>> = expected
            .into_iter()
            .skip(offset)
            .take(limit.unwrap_or(usize::MAX))
            .collect();

        let mut options = CursorOptions::new().offset(offset);
        options.limit = limit;
        options.key_bytes = key_bytes;
        if descending {
            options = options.descending();
        }
        let got: Vec<Vec<u8>> = t
            .open_prefix_cursor(prefix.as_slice(), options)
            .unwrap()
            .keys()
            .unwrap()
            .into_iter()
            .filter_map(|k| k.as_bytes().map(<[u8]>::to_vec))
            .collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn deletes_keep_index_consistent(
        keys in prop::collection::vec(key_strategy(), 1..80),
        drop_every in 2usize..5,
    ) {
        let ns = Namespace::new();
        let t = ns.create_table(TableConfig::new("Prop")).unwrap();
        let mut live = BTreeSet::new();
        for (i, k) in keys.iter().enumerate() {
            t.add(k.as_slice()).unwrap();
            live.insert(k.clone());
            if i % drop_every == 0 {
                t.delete(Key::from(k.as_slice())).unwrap();
                live.remove(k);
            }
        }
        t.verify().unwrap();
        let got: Vec<Vec<u8>> = t
            .keys()
            .unwrap()
            .into_iter()
            .filter_map(|k| k.as_bytes().map(<[u8]>::to_vec))
            .collect();
        prop_assert_eq!(got, live.into_iter().collect::<Vec<_>>());
    }
}
