//! End-to-end tests against an on-disk SQLite database

use litequery::{Clauses, Connector, Filter, LiteQueryError, Record, Shape};
use serde_json::json;
use tempfile::TempDir;

const SCHEMA: &str = "
    CREATE TABLE users (
        user_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_name TEXT NOT NULL,
        email TEXT NOT NULL,
        status INTEGER NOT NULL DEFAULT 0,
        age INTEGER
    );
";

/// Opens a fresh database file; the directory lives as long as the returned guard.
fn connect() -> (TempDir, Connector) {
    let dir = tempfile::tempdir().unwrap();
    let dsn = format!("dbi:SQLite:dbname={}", dir.path().join("app.db").display());
    let connector = Connector::connect(&dsn, "app", "secret").unwrap();
    connector
        .run(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .unwrap();
    (dir, connector)
}

fn add_user(connector: &Connector, name: &str, status: i64, age: i64) {
    connector
        .resultset("users")
        .unwrap()
        .insert(
            &Record::new()
                .set("user_name", name)
                .set("email", format!("{}@x.com", name))
                .set("status", status)
                .set("age", age),
        )
        .unwrap();
}

#[test]
fn test_chained_search_returns_matching_hash_rows() {
    let (_dir, connector) = connect();
    add_user(&connector, "ann", 0, 34);
    add_user(&connector, "bob", 0, 17);
    add_user(&connector, "cat", 1, 40);
    add_user(&connector, "dan", 0, 18);

    let rows = connector
        .resultset("users")
        .unwrap()
        .refine(Filter::new().and("status", 0))
        .refine(Filter::new().and("age", json!({">=": 18})))
        .search(Filter::new(), Clauses::new().order_by(["user_id"]))
        .array_of_hash_rows(&["user_id", "email"])
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["email"], json!("ann@x.com"));
    assert_eq!(rows[1]["email"], json!("dan@x.com"));
    for row in &rows {
        assert_eq!(row.len(), 2);
        assert!(row.contains_key("user_id") && row.contains_key("email"));
    }
}

#[test]
fn test_insert_then_count() {
    let (_dir, connector) = connect();
    let users = connector.resultset("users").unwrap();
    users
        .insert(
            &Record::try_from(json!({"user_name": "jsmith", "email": "jsmith@x.com"})).unwrap(),
        )
        .unwrap();

    assert_eq!(users.refine(Filter::new().and("user_name", "jsmith")).count().unwrap(), 1);
    assert_eq!(users.refine(Filter::new().and("user_name", "nobody")).count().unwrap(), 0);
}

#[test]
fn test_hash_of_hash_rows_keeps_last_duplicate() {
    let (_dir, connector) = connect();
    add_user(&connector, "twin", 0, 20);
    add_user(&connector, "solo", 0, 30);
    add_user(&connector, "twin", 1, 21);

    let keyed = connector
        .resultset("users")
        .unwrap()
        .search(Filter::new(), Clauses::new().order_by(["user_id"]))
        .hash_of_hash_rows("user_name", &["user_name", "age"])
        .unwrap();

    assert_eq!(keyed.len(), 2);
    assert_eq!(keyed["twin"]["age"], json!(21));
    assert_eq!(keyed["solo"]["age"], json!(30));
}

#[test]
fn test_paging_through_results() {
    let (_dir, connector) = connect();
    for i in 0..15 {
        add_user(&connector, &format!("u{:02}", i), 0, 20 + i);
    }
    let users = connector
        .resultset("users")
        .unwrap()
        .search(Filter::new(), Clauses::new().order_by(["user_name"]));

    let first = users.search(Filter::new(), Clauses::new().page(1));
    let second = users.search(Filter::new(), Clauses::new().page(2));

    assert_eq!(first.column("user_name").unwrap().len(), 10);
    let names = second.column("user_name").unwrap();
    assert_eq!(names.first(), Some(&json!("u10")));
    assert_eq!(names.len(), 5);

    assert_eq!(first.count().unwrap(), 10);
    assert_eq!(second.count().unwrap(), 5);
    let pager = second.pager().unwrap();
    assert_eq!(pager.entries_per_page(), 10);
    assert_eq!(pager.last_page(), 2);
    assert_eq!(pager.previous_page(), Some(1));
    assert_eq!(pager.next_page(), None);
}

#[test]
fn test_pager_requires_page_clause() {
    let (_dir, connector) = connect();
    let users = connector.resultset("users").unwrap();
    assert!(matches!(users.pager(), Err(LiteQueryError::Usage(_))));
}

#[test]
fn test_transaction_rolls_back_result_set_work() {
    let (_dir, connector) = connect();
    let users = connector.resultset("users").unwrap();

    let outcome: litequery::Result<()> = connector.txn(|_| {
        users.insert(&Record::new().set("user_name", "temp").set("email", "t@x.com"))?;
        assert_eq!(users.count()?, 1);
        Err(LiteQueryError::Usage("changed my mind".to_string()))
    });
    assert!(outcome.is_err());
    assert_eq!(users.count().unwrap(), 0);

    connector
        .txn(|_| {
            users.insert(&Record::new().set("user_name", "kept").set("email", "k@x.com"))?;
            let nested: litequery::Result<()> = connector.savepoint(|_| {
                users.insert(&Record::new().set("user_name", "dropped").set("email", "d@x.com"))?;
                Err(LiteQueryError::Usage("undo".to_string()))
            });
            assert!(nested.is_err());
            Ok(())
        })
        .unwrap();
    assert_eq!(users.column("user_name").unwrap(), vec![json!("kept")]);
}

#[test]
fn test_update_delete_and_single_rows() {
    let (_dir, connector) = connect();
    add_user(&connector, "ann", 0, 34);
    add_user(&connector, "bob", 0, 17);
    let users = connector.resultset("users").unwrap();

    let minors = users.refine(Filter::new().and("age", json!({"<": 18})));
    assert_eq!(minors.update(&Record::new().set("status", 2)).unwrap(), 1);

    let bob = users
        .refine(Filter::new().and("user_name", "bob"))
        .hash_row(&["status"])
        .unwrap()
        .unwrap();
    assert_eq!(bob["status"], json!(2));

    let ann = users
        .refine(Filter::new().and("user_name", "ann"))
        .array_row(&["user_name", "age"])
        .unwrap();
    assert_eq!(ann, Some(vec![json!("ann"), json!(34)]));

    assert_eq!(users.refine(Filter::new().and("status", 2)).delete().unwrap(), 1);
    assert_eq!(users.array_of_array_rows(&["user_name"]).unwrap(), vec![vec![json!("ann")]]);
}

#[test]
fn test_generic_fetch_dispatch() {
    let (_dir, connector) = connect();
    add_user(&connector, "ann", 0, 34);
    let users = connector.resultset("users").unwrap();

    let scalar = users.fetch(Shape::Scalar, &["MAX(age)"]).unwrap().into_scalar().unwrap();
    assert_eq!(scalar, Some(json!(34)));
    assert!(users.fetch(Shape::Column, &["age"]).unwrap().into_hash_row().is_err());
}

#[test]
fn test_unsupported_backend() {
    match Connector::connect("dbi:Pg:dbname=app;host=db", "app", "secret") {
        Err(LiteQueryError::Unsupported(_)) => {}
        other => panic!("Expected Unsupported error, got {:?}", other),
    }
}
