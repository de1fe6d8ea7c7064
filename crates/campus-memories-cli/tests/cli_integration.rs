use std::ffi::OsStr;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_cm<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_cm"))
        .args(args)
        .stdin(Stdio::null())
        .output()
        .unwrap_or_else(|err| panic!("failed to execute cm binary: {err}"))
}

fn run_cm_with_stdin<I, S>(args: I, input: &str) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut child = Command::new(env!("CARGO_BIN_EXE_cm"))
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap_or_else(|err| panic!("failed to spawn cm binary: {err}"));
    child
        .stdin
        .take()
        .unwrap_or_else(|| panic!("stdin should be piped"))
        .write_all(input.as_bytes())
        .unwrap_or_else(|err| panic!("failed to write stdin: {err}"));
    child.wait_with_output().unwrap_or_else(|err| panic!("failed to wait for cm binary: {err}"))
}

fn parse_success(output: &Output) -> Value {
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "cm command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    parse_success(&run_cm(args))
}

fn as_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn as_array<'a>(value: &'a Value, key: &str) -> &'a Vec<Value> {
    value
        .get(key)
        .and_then(Value::as_array)
        .unwrap_or_else(|| panic!("missing array field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn write_file(path: &Path, body: &[u8]) {
    fs::write(path, body)
        .unwrap_or_else(|err| panic!("failed to write fixture {}: {err}", path.display()));
}

fn add_memory(db: &str, args: &[&str]) -> Value {
    let mut full = vec!["--db", db, "memory", "add"];
    full.extend_from_slice(args);
    let payload = run_json(full);
    payload.get("memory").cloned().unwrap_or_else(|| panic!("missing memory in {payload}"))
}

#[test]
fn lunch_memory_lifecycle_add_filter_count_delete() {
    let dir = unique_temp_dir("cm-cli-lifecycle");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);

    let memory = add_memory(
        db_str,
        &["--lat", "23.1", "--lng", "72.5", "--title", "  Lunch  ", "--category", "food"],
    );
    assert_eq!(as_str(&memory, "title"), "Lunch");
    assert_eq!(as_str(&memory, "type"), "food");
    assert_eq!(as_str(&memory, "description"), "");
    assert!(as_array(&memory, "photos").is_empty());
    assert!(memory.get("createdAt").is_some());
    let id = as_str(&memory, "id").to_string();

    let all = run_json(["--db", db_str, "memory", "list"]);
    assert_eq!(as_str(&all, "contract_version"), "cli.v1");
    assert_eq!(as_str(&all, "filter"), "all");
    assert_eq!(as_array(&all, "memories").len(), 1);

    let food = run_json(["--db", db_str, "memory", "list", "--filter", "food"]);
    assert_eq!(as_array(&food, "memories").len(), 1);
    let study = run_json(["--db", db_str, "memory", "list", "--filter", "study"]);
    assert!(as_array(&study, "memories").is_empty());

    let counts = run_json(["--db", db_str, "memory", "counts"]);
    assert_eq!(as_u64(&counts, "total"), 1);
    assert_eq!(counts["by_category"]["food"], Value::from(1));
    assert_eq!(counts["by_category"]["study"], Value::from(0));

    let deleted = run_json(["--db", db_str, "memory", "delete", "--id", id.as_str(), "--yes"]);
    assert_eq!(deleted["deleted"], Value::Bool(true));
    assert_eq!(as_u64(&deleted, "remaining"), 0);

    let after = run_json(["--db", db_str, "memory", "list"]);
    assert!(as_array(&after, "memories").is_empty());
    assert_eq!(as_u64(&after["counts"], "total"), 0);
}

#[test]
fn add_rejects_missing_title_and_category_without_persisting() {
    let dir = unique_temp_dir("cm-cli-validation");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);

    let no_title = run_cm([
        "--db", db_str, "memory", "add", "--lat", "23.1", "--lng", "72.5", "--title", "   ",
        "--category", "fun",
    ]);
    assert!(!no_title.status.success());
    assert!(String::from_utf8_lossy(&no_title.stderr).contains("Please enter a title"));

    let no_category = run_cm([
        "--db", db_str, "memory", "add", "--lat", "23.1", "--lng", "72.5", "--title", "Gig",
    ]);
    assert!(!no_category.status.success());
    assert!(String::from_utf8_lossy(&no_category.stderr).contains("Please select a memory type"));

    let list = run_json(["--db", db_str, "memory", "list"]);
    assert!(as_array(&list, "memories").is_empty());
}

#[test]
fn declined_confirmation_keeps_the_memory() {
    let dir = unique_temp_dir("cm-cli-confirm");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);

    let memory = add_memory(
        db_str,
        &["--lat", "23.13", "--lng", "72.54", "--title", "Library", "--category", "study"],
    );
    let id = as_str(&memory, "id").to_string();

    let declined =
        run_cm_with_stdin(["--db", db_str, "memory", "delete", "--id", id.as_str()], "n\n");
    let declined = parse_success(&declined);
    assert_eq!(declined["deleted"], Value::Bool(false));
    assert_eq!(as_u64(&declined, "remaining"), 1);

    let unknown = run_json([
        "--db",
        db_str,
        "memory",
        "delete",
        "--id",
        "01ARZ3NDEKTSV4RRFFQ69G5FAV",
        "--yes",
    ]);
    assert_eq!(unknown["deleted"], Value::Bool(false));

    let accepted =
        run_cm_with_stdin(["--db", db_str, "memory", "delete", "--id", id.as_str()], "yes\n");
    let accepted = parse_success(&accepted);
    assert_eq!(accepted["deleted"], Value::Bool(true));
    assert_eq!(as_u64(&accepted, "remaining"), 0);
}

#[test]
fn photos_keep_selection_order_and_gallery_wraps() {
    let dir = unique_temp_dir("cm-cli-gallery");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);
    let first = dir.join("first.png");
    let second = dir.join("second.png");
    let notes = dir.join("notes.txt");
    let third = dir.join("third.jpg");
    write_file(&first, b"first");
    write_file(&second, b"second");
    write_file(&notes, b"not an image");
    write_file(&third, b"third");

    let output = run_cm([
        "--db",
        db_str,
        "memory",
        "add",
        "--lat",
        "23.1",
        "--lng",
        "72.5",
        "--title",
        "Fest",
        "--category",
        "events",
        "--photo",
        path_str(&first),
        "--photo",
        path_str(&second),
        "--photo",
        path_str(&notes),
        "--photo",
        path_str(&third),
    ]);
    let payload = parse_success(&output);
    let failures = as_array(&payload, "photo_failures");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].as_str().is_some_and(|failure| failure.contains("notes.txt")));

    let memory = &payload["memory"];
    let photos = as_array(memory, "photos");
    assert_eq!(
        photos,
        &vec![
            Value::from("data:image/png;base64,Zmlyc3Q="),
            Value::from("data:image/png;base64,c2Vjb25k"),
            Value::from("data:image/jpeg;base64,dGhpcmQ="),
        ]
    );
    let id = as_str(memory, "id").to_string();

    let opened = run_json(["--db", db_str, "gallery", "view", "--id", id.as_str()]);
    assert_eq!(opened["open"], Value::Bool(true));
    assert_eq!(as_str(&opened["view"], "counter"), "1 / 3");
    assert_eq!(opened["view"]["show_navigation"], Value::Bool(true));

    let wrapped =
        run_json(["--db", db_str, "gallery", "view", "--id", id.as_str(), "--key", "left"]);
    assert_eq!(as_u64(&wrapped["view"], "index"), 2);
    assert_eq!(as_str(&wrapped["view"], "counter"), "3 / 3");
    assert_eq!(as_str(&wrapped["view"], "image"), "data:image/jpeg;base64,dGhpcmQ=");

    let around = run_json([
        "--db",
        db_str,
        "gallery",
        "view",
        "--id",
        id.as_str(),
        "--key",
        "right",
        "--key",
        "right",
        "--key",
        "right",
    ]);
    assert_eq!(as_str(&around["view"], "counter"), "1 / 3");

    let closed =
        run_json(["--db", db_str, "gallery", "view", "--id", id.as_str(), "--key", "escape"]);
    assert_eq!(closed["open"], Value::Bool(false));
    assert_eq!(closed["view"], Value::Null);
}

#[test]
fn gallery_stays_closed_for_memories_without_photos() {
    let dir = unique_temp_dir("cm-cli-gallery-empty");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);

    let memory = add_memory(
        db_str,
        &["--lat", "23.1", "--lng", "72.5", "--title", "Chai", "--category", "friends"],
    );
    let id = as_str(&memory, "id").to_string();

    let view = run_json(["--db", db_str, "gallery", "view", "--id", id.as_str(), "--key", "right"]);
    assert_eq!(view["open"], Value::Bool(false));

    let unknown = run_json(["--db", db_str, "gallery", "view", "--id", "1718000000000"]);
    assert_eq!(unknown["open"], Value::Bool(false));
    assert_eq!(as_str(&unknown, "id"), "1718000000000");

    let blank_id = run_cm(["--db", db_str, "gallery", "view", "--id", "  "]);
    assert!(!blank_id.status.success());
    assert!(String::from_utf8_lossy(&blank_id.stderr).contains("memory id must not be empty"));
}

#[test]
fn map_markers_follow_filter_and_render_popups() {
    let dir = unique_temp_dir("cm-cli-markers");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);
    let one = dir.join("one.gif");
    let two = dir.join("two.webp");
    write_file(&one, b"one");
    write_file(&two, b"two");

    add_memory(
        db_str,
        &[
            "--lat",
            "23.1",
            "--lng",
            "72.5",
            "--title",
            "Match",
            "--category",
            "sports",
            "--photo",
            path_str(&one),
            "--photo",
            path_str(&two),
        ],
    );
    add_memory(
        db_str,
        &[
            "--lat",
            "23.2",
            "--lng",
            "72.6",
            "--title",
            "Exam prep",
            "--description",
            "Finals week",
            "--category",
            "study",
        ],
    );

    let all = run_json(["--db", db_str, "map", "markers"]);
    assert_eq!(as_array(&all, "markers").len(), 2);
    assert_eq!(all["viewport"]["zoom"], Value::from(16));
    assert_eq!(all["viewport"]["center"]["lat"], Value::from(23.1328));

    let sports = run_json(["--db", db_str, "map", "markers", "--filter", "sports"]);
    let markers = as_array(&sports, "markers");
    assert_eq!(markers.len(), 1);
    let marker = &markers[0];
    assert_eq!(as_str(&marker["icon"], "color"), "#10b981");
    assert_eq!(marker["icon"]["anchor"], serde_json::json!([20, 50]));
    let popup = &marker["popup"];
    assert_eq!(as_str(popup, "title"), "Match");
    assert_eq!(as_str(popup, "description"), "No description");
    assert_eq!(as_str(&popup["thumbnail"], "more_label"), "+1 more");
    assert_eq!(as_str(&popup["thumbnail"], "src"), "data:image/gif;base64,b25l");

    let food = run_json(["--db", db_str, "map", "markers", "--filter", "food"]);
    assert!(as_array(&food, "markers").is_empty());

    let bad_filter = run_cm(["--db", db_str, "map", "markers", "--filter", "music"]);
    assert!(!bad_filter.status.success());
}

#[test]
fn map_pin_reports_svg_and_anchors() {
    let pin = run_json(["map", "pin", "--category", "food"]);
    assert_eq!(as_str(&pin, "category"), "food");
    assert_eq!(as_str(&pin, "label"), "Food");
    let icon = &pin["icon"];
    assert_eq!(as_str(icon, "color"), "#ef4444");
    assert_eq!(icon["size"], serde_json::json!([40, 50]));
    assert_eq!(icon["popup_anchor"], serde_json::json!([0, -50]));
    assert!(as_str(icon, "svg").contains("#ef4444"));
}

#[test]
fn config_file_moves_viewport_and_storage_key() {
    let dir = unique_temp_dir("cm-cli-config");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);
    let config = dir.join("cm.yaml");
    write_file(
        &config,
        concat!(
            "storage_key: hostel-memories\n",
            "map:\n  center: { lat: 19.076, lng: 72.8777 }\n  zoom: 14\n",
        )
        .as_bytes(),
    );
    let config_str = path_str(&config);

    add_memory(
        db_str,
        &["--lat", "23.1", "--lng", "72.5", "--title", "Default key", "--category", "fun"],
    );

    let scoped = run_json(["--db", db_str, "--config", config_str, "map", "markers"]);
    assert!(as_array(&scoped, "markers").is_empty());
    assert_eq!(scoped["viewport"]["zoom"], Value::from(14));
    assert_eq!(scoped["viewport"]["center"]["lat"], Value::from(19.076));

    let unscoped = run_json(["--db", db_str, "memory", "list"]);
    assert_eq!(as_array(&unscoped, "memories").len(), 1);

    let broken = dir.join("broken.yaml");
    write_file(&broken, b"map:\n  zoom: 40\n");
    let rejected = run_cm(["--db", db_str, "--config", path_str(&broken), "memory", "list"]);
    assert!(!rejected.status.success());
    assert!(String::from_utf8_lossy(&rejected.stderr).contains("invalid config file"));
}

#[test]
fn popup_dates_follow_configured_utc_offset() {
    let dir = unique_temp_dir("cm-cli-offset");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);
    let east = dir.join("east.yaml");
    let west = dir.join("west.yaml");
    write_file(&east, b"utc_offset_minutes: 840\n");
    write_file(&west, b"utc_offset_minutes: -720\n");

    add_memory(
        db_str,
        &["--lat", "23.1", "--lng", "72.5", "--title", "Sunrise", "--category", "fun"],
    );

    let popup_date = |config: &Path| {
        let markers = run_json(["--db", db_str, "--config", path_str(config), "map", "markers"]);
        as_str(&as_array(&markers, "markers")[0]["popup"], "date").to_string()
    };
    // +14:00 and -12:00 are 26 hours apart, so the calendar day always differs.
    assert_ne!(popup_date(&east), popup_date(&west));

    let invalid = dir.join("invalid.yaml");
    write_file(&invalid, b"utc_offset_minutes: 100000\n");
    let rejected = run_cm(["--db", db_str, "--config", path_str(&invalid), "map", "markers"]);
    assert!(!rejected.status.success());
    assert!(String::from_utf8_lossy(&rejected.stderr).contains("invalid config file"));
}

#[test]
fn db_commands_report_schema_and_round_trip_backups() {
    let dir = unique_temp_dir("cm-cli-db");
    let db = dir.join("memories.sqlite3");
    let db_str = path_str(&db);
    let backup = dir.join("backup.sqlite3");

    let before = run_json(["--db", db_str, "db", "schema-version"]);
    assert_eq!(as_u64(&before, "current_version"), 0);
    assert_eq!(before["up_to_date"], Value::Bool(false));

    let dry_run = run_json(["--db", db_str, "db", "migrate", "--dry-run"]);
    assert_eq!(dry_run["would_apply_versions"], serde_json::json!([1]));

    let migrated = run_json(["--db", db_str, "db", "migrate"]);
    assert_eq!(as_u64(&migrated, "after_version"), 1);
    assert_eq!(migrated["up_to_date"], Value::Bool(true));

    add_memory(
        db_str,
        &["--lat", "23.1", "--lng", "72.5", "--title", "Kept", "--category", "friends"],
    );
    let backed_up = run_json(["--db", db_str, "db", "backup", "--out", path_str(&backup)]);
    assert_eq!(as_str(&backed_up, "status"), "ok");
    assert_eq!(as_u64(&backed_up, "entries"), 1);

    add_memory(
        db_str,
        &["--lat", "23.1", "--lng", "72.5", "--title", "Lost", "--category", "friends"],
    );
    assert_eq!(as_array(&run_json(["--db", db_str, "memory", "list"]), "memories").len(), 2);

    let restored = run_json(["--db", db_str, "db", "restore", "--in", path_str(&backup)]);
    assert_eq!(as_u64(&restored, "current_version"), 1);
    assert_eq!(as_u64(&restored, "entries"), 1);

    let list = run_json(["--db", db_str, "memory", "list"]);
    let memories = as_array(&list, "memories");
    assert_eq!(memories.len(), 1);
    assert_eq!(as_str(&memories[0], "title"), "Kept");

    let integrity = run_json(["--db", db_str, "db", "integrity-check"]);
    assert_eq!(integrity["quick_check_ok"], Value::Bool(true));
    assert_eq!(as_u64(&integrity, "entries"), 1);
    assert!(as_u64(&integrity, "value_bytes") > 0);

    let keys = run_json(["--db", db_str, "db", "keys"]);
    let entries = as_array(&keys, "entries");
    assert_eq!(entries.len(), 1);
    assert_eq!(as_str(&entries[0], "key"), "campus-memories");
    assert_eq!(as_u64(&entries[0], "value_bytes"), as_u64(&integrity, "value_bytes"));
}
