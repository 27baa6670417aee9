use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn grid(branch: &str, course: &str, teacher: &str, room: &str) -> serde_json::Value {
    json!({
        "program": "BTech",
        "branch": branch,
        "semester": "1",
        "type": "full-time",
        "monday": {
            "9:00-10:00": { "course": course, "teacher": teacher, "room": room }
        }
    })
}

#[test]
fn detect_acknowledge_and_resolve_against_saved() {
    let workspace = temp_dir("timetabled-conflicts-lifecycle");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetables.create",
        json!({ "timetable": grid("ECE", "EC101", "Dr. Smith", "R202") }),
    );
    let saved_id = saved["id"].as_str().expect("id").to_string();

    let draft = grid("CSE", "CS101", "dr. smith ", "R101");
    let scanned = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "conflicts.scan",
        json!({ "timetable": draft }),
    );
    assert_eq!(scanned["status"], json!("conflicted"));
    let shown = scanned["conflicts"].as_array().expect("conflicts");
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0]["type"], json!("teacher"));
    assert_eq!(shown[0]["severity"], json!("high"));
    assert_eq!(
        shown[0]["message"],
        json!("Teacher \"dr. smith \" is already teaching \"EC101\" for BTech ECE - Sem 1")
    );
    let records = &scanned["timetable"]["monday"]["9:00-10:00"]["conflicts"];
    assert_eq!(records[0]["conflictType"], json!("teacher"));
    assert_eq!(records[0]["branch"], json!("ECE"));
    assert_eq!(records[0]["ignorable"], json!(false));
    let annotated = scanned["timetable"].clone();

    // The caller's dismissal set hides the record without touching the grid.
    let key = shown[0]["dismissalKey"].clone();
    let hidden = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "conflicts.extract",
        json!({ "timetable": annotated, "dismissed": [key] }),
    );
    assert_eq!(hidden["conflicts"], json!([]));

    let acked = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "conflicts.markIgnorable",
        json!({ "timetable": annotated, "day": "monday", "timeSlot": "9:00-10:00", "index": 0 }),
    );
    assert_eq!(acked["statistics"]["ignorable"], json!(1));
    assert_eq!(acked["statistics"]["blocking"], json!(0));
    let acked_records = acked["timetable"]["monday"]["9:00-10:00"]["conflicts"].clone();
    assert_eq!(acked_records[0]["ignorable"], json!(true));

    let check = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "conflicts.checkSlot",
        json!({
            "day": "monday",
            "timeSlot": "9:00-10:00",
            "slot": { "course": "CS101", "teacher": "DR. SMITH", "room": "R9" },
            "previous": acked_records
        }),
    );
    assert_eq!(check["hasConflicts"], json!(true));
    assert_eq!(check["canProceed"], json!(true));

    let fresh = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "conflicts.checkSlot",
        json!({
            "day": "monday",
            "timeSlot": "9:00-10:00",
            "slot": { "course": "CS101", "teacher": "DR. SMITH", "room": "R9" }
        }),
    );
    assert_eq!(fresh["canProceed"], json!(false));

    // Still valid while the other timetable exists.
    let kept = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "conflicts.resolve",
        json!({ "timetable": acked["timetable"] }),
    );
    assert_eq!(kept["statistics"]["total"], json!(1));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "timetables.delete",
        json!({ "id": saved_id }),
    );
    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "conflicts.resolve",
        json!({ "timetable": acked["timetable"] }),
    );
    assert_eq!(resolved["statistics"]["total"], json!(0));
    assert!(resolved["timetable"]["monday"]["9:00-10:00"]
        .get("conflicts")
        .is_none());
}

#[test]
fn open_draft_shadows_its_saved_copy() {
    let workspace = temp_dir("timetabled-draft-priority");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let saved = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetables.create",
        json!({ "timetable": grid("ECE", "EC101", "Dr. Smith", "R202") }),
    );

    // The ECE timetable is open with an unsaved teacher change.
    let mut ece_draft = saved["timetable"].clone();
    ece_draft["monday"]["9:00-10:00"]["teacher"] = json!("Prof. Rao");

    let scanned = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "conflicts.scan",
        json!({
            "timetable": grid("CSE", "CS101", "Dr. Smith", "R101"),
            "drafts": [ece_draft]
        }),
    );
    assert_eq!(scanned["status"], json!("clean"));
    assert_eq!(scanned["conflicts"], json!([]));

    // A draft teacher collision suppresses a saved teacher collision for the
    // same slot, but a saved room collision still shows.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "timetables.create",
        json!({ "timetable": grid("ME", "ME101", "Dr. Lee", "R101") }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "timetables.create",
        json!({ "timetable": grid("CE", "CE101", "Dr. Smith", "R300") }),
    );
    let mixed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "conflicts.scan",
        json!({
            "timetable": grid("CSE", "CS101", "Dr. Smith", "R101"),
            "drafts": [grid("EE", "EE101", "Dr. Smith", "R500")]
        }),
    );
    let shown = mixed["conflicts"].as_array().expect("conflicts");
    assert_eq!(shown.len(), 2, "{}", mixed);
    assert_eq!(shown[0]["type"], json!("teacher"));
    assert_eq!(shown[0]["branch"], json!("EE"));
    assert_eq!(shown[1]["type"], json!("room"));
    assert_eq!(shown[1]["branch"], json!("ME"));
}

#[test]
fn batch_summary_lookup_and_suggestions() {
    let workspace = temp_dir("timetabled-batch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timetables.create",
        json!({ "timetable": grid("ECE", "EC101", "Dr. Smith", "R202") }),
    );

    let drafts = json!([
        grid("CSE", "CS101", "Prof. Rao", "R101"),
        grid("ME", "ME101", "Dr. Lee", "r101"),
        grid("CE", "CE101", "Dr. Kim", "R300"),
    ]);
    let batch = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "conflicts.batch",
        json!({ "drafts": drafts }),
    );
    let items = batch["timetables"].as_array().expect("timetables");
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["conflicts"][0]["type"], json!("room"));
    assert_eq!(items[0]["conflicts"][0]["branch"], json!("ME"));
    assert_eq!(items[1]["conflicts"][0]["branch"], json!("CSE"));
    assert_eq!(items[2]["status"], json!("clean"));
    assert_eq!(batch["summary"]["timetablesWithConflicts"], json!(2));
    assert_eq!(batch["summary"]["conflictRate"], json!(66.7));

    let users = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "conflicts.findTimetables",
        json!({
            "type": "teacher",
            "name": "dr. smith",
            "day": "monday",
            "timeSlot": "9:00-10:00",
            "drafts": [grid("CSE", "CS101", "Dr. Smith", "R101")]
        }),
    );
    let found = users["timetables"].as_array().expect("timetables");
    assert_eq!(found.len(), 2);
    assert_eq!(found[0]["identifier"], json!("BTech-CSE-Sem1-full-time"));
    assert_eq!(found[1]["identifier"], json!("BTech-ECE-Sem1-full-time"));

    let suggest = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "conflicts.suggest",
        json!({
            "timetable": grid("CSE", "CS101", "Dr. Smith", "R101"),
            "day": "monday",
            "timeSlot": "9:00-10:00"
        }),
    );
    let options = suggest["suggestions"].as_array().expect("suggestions");
    assert_eq!(options.len(), 5);
    assert_eq!(options[0]["day"], json!("monday"));
    assert_eq!(options[0]["timeSlot"], json!("7:00-8:00"));

    let summary = request_ok(&mut stdin, &mut reader, "6", "conflicts.summary", json!({}));
    assert_eq!(summary["summary"]["totalTimetables"], json!(1));
    assert_eq!(summary["summary"]["totalConflicts"], json!(0));
}
