use rusqlite::{params, Connection};
use rust_collection::{all, Database, DatabaseConfig, Direction, Error, Field, Result, Value};
use tempfile::NamedTempFile;

// Helper function to create an in-memory database for testing
fn create_test_db() -> Result<Database> {
    let conn = Connection::open_in_memory()?;
    initialize_schema(&conn)?;
    Ok(Database::from_connection(conn))
}

// Helper function to create a temporary file-based database
fn create_temp_db() -> Result<(Database, NamedTempFile)> {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_str().unwrap().to_string();
    let db = Database::open(&DatabaseConfig::new(path))?;
    initialize_schema(db.connection())?;
    Ok((db, temp_file))
}

// Users(1 Ann 30, 2 Bo 40), Countries(1 IT, 2 DE), Tasks(1..3).
// Junction ids start at 100 so they never coincide with task ids.
fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE Countries (id INTEGER PRIMARY KEY, iso_code TEXT NOT NULL);
        CREATE TABLE Users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            age INTEGER,
            countriesId INTEGER
        );
        CREATE TABLE Tasks (id INTEGER PRIMARY KEY, description TEXT NOT NULL);
        CREATE TABLE TasksUsers (
            id INTEGER PRIMARY KEY,
            tasksId INTEGER NOT NULL,
            usersId INTEGER NOT NULL
        );
        INSERT INTO Countries (iso_code) VALUES ('IT'), ('DE');
        INSERT INTO Users (name, age, countriesId) VALUES ('Ann', 30, 1), ('Bo', 40, NULL);
        INSERT INTO Tasks (description) VALUES ('write report'), ('review code'), ('ship it');
        INSERT INTO TasksUsers (id, tasksId, usersId) VALUES (100, 1, 1);
        "#,
    )?;
    Ok(())
}

fn junction_rows(db: &Database, task: i64, user: i64) -> i64 {
    db.connection()
        .query_row(
            "SELECT COUNT(*) FROM TasksUsers WHERE tasksId = ?1 AND usersId = ?2",
            params![task, user],
            |row| row.get(0),
        )
        .unwrap()
}

#[test]
fn test_count_and_limit() -> Result<()> {
    let db = create_test_db()?;
    assert_eq!(all(&db, "Users")?.count()?, 2);
    assert_eq!(all(&db, "Users")?.limit(1).count()?, 1);
    assert_eq!(all(&db, "Users")?.limit(5).count()?, 2);
    assert_eq!(all(&db, "Tasks")?.offset(1).count()?, 2);
    assert_eq!(all(&db, "Tasks")?.offset(5).count()?, 0);
    assert!(!all(&db, "Tasks")?.is_empty()?);
    Ok(())
}

#[test]
fn test_filter_then_count() -> Result<()> {
    let db = create_test_db()?;
    assert_eq!(all(&db, "Users")?.filter("age", ">", 35).count()?, 1);
    assert_eq!(all(&db, "Users")?.between("age", 25, 45).count()?, 2);
    assert_eq!(all(&db, "Users")?.filter("name", "LIKE", "A%").count()?, 1);
    Ok(())
}

#[test]
fn test_order_limit_as_scalar() -> Result<()> {
    let db = create_test_db()?;
    let mut first = all(&db, "Users")?.order("name", Direction::Asc).limit(1);
    assert_eq!(first.value("name")?, Value::from("Ann"));

    let mut oldest = all(&db, "Users")?.order("age", Direction::Desc).limit(1);
    assert_eq!(oldest.value("name")?, Value::from("Bo"));
    Ok(())
}

#[test]
fn test_filter_by_id_matches_direct_lookup() -> Result<()> {
    let db = create_test_db()?;
    let direct: String = db
        .connection()
        .query_row("SELECT name FROM Users WHERE id = ?", [2], |row| row.get(0))?;
    let mut bo = all(&db, "Users")?.filter("id", "=", 2);
    assert_eq!(bo.value("name")?, Value::Text(direct));
    assert_eq!(bo.id()?, Value::Integer(2));
    Ok(())
}

#[test]
fn test_chaining_is_non_destructive() -> Result<()> {
    let db = create_test_db()?;
    let mut everyone = all(&db, "Users")?;
    let before = everyone.shape().clone();
    let mut adults = everyone.filter("age", ">", 35).order("name", Direction::Desc).limit(1);

    assert_eq!(everyone.shape(), &before);
    assert_eq!(adults.count()?, 1);
    let names: Vec<Value> = everyone
        .iter()
        .map(|row| row.and_then(|row| row.value("name")))
        .collect::<Result<_>>()?;
    assert_eq!(names, [Value::from("Ann"), Value::from("Bo")]);
    Ok(())
}

#[test]
fn test_iteration_protocol() -> Result<()> {
    let db = create_test_db()?;
    let mut tasks = all(&db, "Tasks")?.order("id", Direction::Asc);
    assert_eq!(tasks.position(), -1);
    assert!(!tasks.has_current());

    tasks.rewind()?;
    let mut seen = Vec::new();
    while tasks.has_current() {
        let row = tasks.current().unwrap();
        assert_eq!(row.position(), tasks.position());
        seen.push(row.id()?);
        tasks.advance()?;
    }
    assert_eq!(seen, [Value::from(1), Value::from(2), Value::from(3)]);

    // an exhausted cursor re-executes on the next pass
    assert_eq!(tasks.iter().count(), 3);
    Ok(())
}

#[test]
fn test_create_new_returns_inserted_row() -> Result<()> {
    let db = create_test_db()?;
    let users = all(&db, "Users")?;
    let mut cy = users.create_new([("name", Value::from("Cy")), ("age", Value::from(22))])?;
    let id = db.last_insert_id();

    assert_eq!(cy.count()?, 1);
    let mut fresh = all(&db, "Users")?.filter("id", "=", id);
    assert_eq!(fresh.value("name")?, Value::from("Cy"));
    assert_eq!(fresh.value("age")?, Value::from(22));
    assert_eq!(cy.id()?, Value::Integer(id));
    Ok(())
}

#[test]
fn test_save_during_iteration_round_trip() -> Result<()> {
    let db = create_test_db()?;
    let mut users = all(&db, "Users")?.order("id", Direction::Asc);
    users.rewind()?;
    while users.has_current() {
        let age = users.value("age")?.as_i64().unwrap_or(0);
        users.set("age", age + 1);
        users.advance()?;
    }
    assert!(users.has_pending_changes());
    users.save()?;
    assert!(!users.has_pending_changes());

    assert_eq!(all(&db, "Users")?.filter("id", "=", 1).value("age")?, Value::from(31));
    assert_eq!(all(&db, "Users")?.filter("id", "=", 2).value("age")?, Value::from(41));
    Ok(())
}

#[test]
fn test_scalar_write_after_read() -> Result<()> {
    let db = create_test_db()?;
    let mut ann = all(&db, "Users")?.filter("name", "=", "Ann");
    assert_eq!(ann.value("age")?, Value::from(30));
    ann.set("age", 33);
    ann.save()?;
    assert_eq!(all(&db, "Users")?.filter("id", "=", 1).value("age")?, Value::from(33));
    Ok(())
}

#[test]
fn test_unpositioned_save_requires_one_row() -> Result<()> {
    let db = create_test_db()?;
    let mut everyone = all(&db, "Users")?;
    everyone.set("age", 99);
    let err = everyone.save().unwrap_err();
    assert!(matches!(err, Error::AmbiguousSave { matched: 2, .. }));
    assert!(everyone.has_pending_changes());
    assert_eq!(all(&db, "Users")?.filter("age", "=", 99).count()?, 0);

    let mut bo = all(&db, "Users")?.filter("name", "=", "Bo");
    bo.set("age", 50);
    bo.save()?;
    assert_eq!(all(&db, "Users")?.filter("id", "=", 2).value("age")?, Value::from(50));
    Ok(())
}

#[test]
fn test_update_all_honours_limit() -> Result<()> {
    let db = create_test_db()?;
    let affected = all(&db, "Users")?
        .order("age", Direction::Desc)
        .limit(1)
        .update_all([("age", 0)])?;
    assert_eq!(affected, 1);
    assert_eq!(all(&db, "Users")?.filter("id", "=", 2).value("age")?, Value::from(0));
    assert_eq!(all(&db, "Users")?.filter("id", "=", 1).value("age")?, Value::from(30));
    Ok(())
}

#[test]
fn test_singular_relation() -> Result<()> {
    let db = create_test_db()?;
    let mut ann = all(&db, "Users")?.filter("id", "=", 1);
    let mut country = match ann.get("countries")? {
        Field::SingularLink(country) => country,
        other => panic!("expected a singular link, got {other:?}"),
    };
    assert_eq!(country.value("iso_code")?, Value::from("IT"));
    Ok(())
}

#[test]
fn test_singular_link_overwrites_and_unlinks() -> Result<()> {
    let db = create_test_db()?;
    let mut bo = all(&db, "Users")?.filter("id", "=", 2);
    let mut italy = all(&db, "Countries")?.filter("iso_code", "=", "IT");
    let mut germany = all(&db, "Countries")?.filter("iso_code", "=", "DE");

    bo.link(&mut italy)?;
    bo.link(&mut germany)?;
    let mut country = all(&db, "Users")?
        .filter("id", "=", 2)
        .get("countries")?
        .into_collection()
        .unwrap();
    assert_eq!(country.value("iso_code")?, Value::from("DE"));

    bo.unlink(&mut germany)?;
    assert!(all(&db, "Users")?.filter("id", "=", 2).value("countriesId")?.is_null());
    Ok(())
}

#[test]
fn test_multiple_relation_through_junction() -> Result<()> {
    let db = create_test_db()?;
    let mut tasks = all(&db, "Users")?
        .filter("id", "=", 1)
        .get("tasks")?
        .into_collection()
        .unwrap();
    assert_eq!(tasks.count()?, 1);
    assert_eq!(tasks.id()?, Value::Integer(1));
    assert_eq!(tasks.value("description")?, Value::from("write report"));

    // unqualified fields refer to the related table, not the junction
    assert_eq!(tasks.filter("id", "=", 1).count()?, 1);
    Ok(())
}

#[test]
fn test_multiple_link_adds_one_junction_row_per_call() -> Result<()> {
    let db = create_test_db()?;
    let mut bo = all(&db, "Users")?.filter("id", "=", 2);
    let mut task = all(&db, "Tasks")?.filter("id", "=", 3);

    bo.link(&mut task)?;
    assert_eq!(junction_rows(&db, 3, 2), 1);
    bo.link(&mut task)?;
    assert_eq!(junction_rows(&db, 3, 2), 2);

    let mut bos_tasks = bo.get("tasks")?.into_collection().unwrap();
    assert_eq!(bos_tasks.count()?, 2);

    bo.unlink(&mut task)?;
    assert_eq!(junction_rows(&db, 3, 2), 0);
    assert_eq!(junction_rows(&db, 1, 1), 1);
    Ok(())
}

#[test]
fn test_relations_from_row_views() -> Result<()> {
    let db = create_test_db()?;
    let mut users = all(&db, "Users")?.order("id", Direction::Asc);
    let mut counts = Vec::new();
    for user in users.iter() {
        let mut tasks = user?.get("tasks")?.into_collection().unwrap();
        counts.push(tasks.count()?);
    }
    assert_eq!(counts, [1, 0]);

    // and back from a task to its users
    let mut task = all(&db, "Tasks")?.filter("id", "=", 1);
    let mut owners = task.get("users")?.into_collection().unwrap();
    assert_eq!(owners.value("name")?, Value::from("Ann"));
    Ok(())
}

#[test]
fn test_delete_row_by_row() -> Result<()> {
    let db = create_test_db()?;
    let deleted = all(&db, "Tasks")?
        .order("id", Direction::Desc)
        .limit(2)
        .delete()?;
    assert_eq!(deleted, 2);
    let mut remaining = all(&db, "Tasks")?;
    assert_eq!(remaining.count()?, 1);
    assert_eq!(remaining.id()?, Value::Integer(1));

    assert_eq!(all(&db, "Tasks")?.filter("id", "=", 42).delete()?, 0);
    Ok(())
}

#[test]
fn test_errors() -> Result<()> {
    let db = create_test_db()?;
    assert!(matches!(all(&db, "Pets"), Err(Error::TableNotFound(name)) if name == "Pets"));

    let mut ann = all(&db, "Users")?.filter("id", "=", 1);
    assert!(matches!(ann.get("pets"), Err(Error::UnknownRelation { .. })));

    let mut nobody = all(&db, "Users")?.filter("id", "=", 42);
    assert!(matches!(nobody.value("name"), Err(Error::EmptyResult { .. })));
    assert!(nobody.current().is_none());

    let mut bad = all(&db, "Users")?.filter("nope", "=", 1);
    assert!(matches!(bad.count(), Err(Error::Statement(_))));
    Ok(())
}

#[test]
fn test_file_database_persists() -> Result<()> {
    let (db, temp_file) = create_temp_db()?;
    all(&db, "Users")?.create_new([("name", "Dee")])?;
    drop(db);

    let config = DatabaseConfig::new(temp_file.path().to_str().unwrap())
        .with_create_if_missing(false);
    let reopened = Database::open(&config)?;
    assert_eq!(all(&reopened, "Users")?.filter("name", "=", "Dee").count()?, 1);
    Ok(())
}

#[test]
fn test_rewind_mid_pass_continues_open_result() -> Result<()> {
    let db = create_test_db()?;
    let mut users = all(&db, "Users")?.order("id", Direction::Asc);
    assert_eq!(users.value("name")?, Value::from("Ann"));
    assert_eq!(users.position(), 0);

    // no re-execution: the pass picks up at the next unread row
    users.rewind()?;
    assert_eq!(users.position(), 0);
    assert_eq!(users.value("name")?, Value::from("Bo"));

    users.advance()?;
    assert!(!users.has_current());
    Ok(())
}

#[test]
fn test_save_flushes_pass_writes_before_staged_ones() -> Result<()> {
    let db = create_test_db()?;
    let mut users = all(&db, "Users")?.order("id", Direction::Asc);
    users.set("age", 1);
    users.rewind()?;
    users.set("name", "Renamed");

    let err = users.save().unwrap_err();
    assert!(matches!(err, Error::AmbiguousSave { matched: 2, .. }));
    assert_eq!(all(&db, "Users")?.filter("id", "=", 1).value("name")?, Value::from("Renamed"));
    assert_eq!(all(&db, "Users")?.filter("age", "=", 1).count()?, 0);

    assert!(users.has_pending_changes());
    users.discard_changes();
    assert!(!users.has_pending_changes());
    users.save()?;
    Ok(())
}

#[test]
fn test_partial_save_keeps_unflushed_writes() -> Result<()> {
    let db = create_test_db()?;
    let mut users = all(&db, "Users")?.order("id", Direction::Asc);
    users.rewind()?;
    users.set("name", "Annie");
    users.advance()?;
    users.set("name", Value::Null);

    let err = users.save().unwrap_err();
    assert!(matches!(err, Error::Statement(_)));
    assert_eq!(all(&db, "Users")?.filter("id", "=", 1).value("name")?, Value::from("Annie"));
    assert_eq!(all(&db, "Users")?.filter("id", "=", 2).value("name")?, Value::from("Bo"));
    assert!(users.has_pending_changes());
    Ok(())
}
