use crate::config::{DetectorConfig, GENERATOR_ENV};
use crate::embed::{extract_for_display, DisplayConflict};
use crate::grid::{GridStatus, WeekGrid};
use crate::index::scan_batch;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::process::{Command, Stdio};
use uuid::Uuid;

pub type GenerateResult<T> = Result<T, GenerateError>;

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("generator output is not valid JSON: {0}")]
    Unparseable(String),

    #[error("generator output is not a JSON array")]
    NotAnArray,

    #[error("generated item {0} is not an object")]
    ItemNotObject(usize),

    #[error("generator unavailable: {0}")]
    Unavailable(String),

    #[error("generator failed: {0}")]
    Failed(String),
}

impl GenerateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unparseable(_) | Self::NotAnArray | Self::ItemNotObject(_) => {
                "generator_output_rejected"
            }
            Self::Unavailable(_) => "generator_unavailable",
            Self::Failed(_) => "generator_failed",
        }
    }
}

/// What the generator is asked to schedule. Each list is passed through as-is.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GenerationRequest {
    pub classes: Value,
    pub courses: Value,
    pub teachers: Value,
    pub rooms: Value,
}

pub trait CompletionService {
    fn complete(&self, prompt: &str) -> GenerateResult<String>;
}

/// Runs an external program with the prompt on stdin and takes its stdout as
/// the completion.
pub struct CommandCompletion {
    program: String,
    args: Vec<String>,
}

impl CommandCompletion {
    pub fn new(command: &[String]) -> GenerateResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| GenerateError::Unavailable(format!("{} is empty", GENERATOR_ENV)))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl CompletionService for CommandCompletion {
    fn complete(&self, prompt: &str) -> GenerateResult<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GenerateError::Unavailable(format!("{}: {}", self.program, e)))?;

        // Feed stdin from a separate thread so a chatty child cannot block us.
        let writer = child.stdin.take().map(|mut stdin| {
            let prompt = prompt.to_string();
            std::thread::spawn(move || match stdin.write_all(prompt.as_bytes()) {
                Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
                _ => Ok(()),
            })
        });

        let output = child
            .wait_with_output()
            .map_err(|e| GenerateError::Failed(e.to_string()))?;
        if let Some(handle) = writer {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(GenerateError::Failed(format!("writing prompt: {}", e))),
                Err(_) => return Err(GenerateError::Failed("prompt writer panicked".into())),
            }
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GenerateError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }
        String::from_utf8(output.stdout)
            .map_err(|_| GenerateError::Failed("completion is not valid UTF-8".into()))
    }
}

pub fn build_prompt(request: &GenerationRequest) -> String {
    let pretty = |v: &Value| serde_json::to_string_pretty(v).unwrap_or_else(|_| "null".into());
    let slot_labels = crate::grid::TIME_SLOT_LABELS.join(", ");
    format!(
        r#"You schedule weekly class timetables for an educational institution.

Hard rules:
1. A teacher is in at most one place in any time slot.
2. A room hosts at most one class in any time slot.
3. Do not exceed the overall credits of any class.
4. Reply with JSON only.

Classes: {classes}
Courses: {courses}
Teachers: {teachers}
Rooms: {rooms}

Reply with a JSON array holding one object per class:
{{"class": "<class id>", "timetable": {{"program": "...", "branch": "...", "semester": "...", "type": "full-time", "batch": "...", "overallCredits": "...", "monday": {{"7:00-8:00": {{"course": "", "teacher": "", "room": ""}}, ...}}, ...}}}}

Days are monday through saturday. Slots are: {slots}.
Use empty strings for free slots."#,
        classes = pretty(&request.classes),
        courses = pretty(&request.courses),
        teachers = pretty(&request.teachers),
        rooms = pretty(&request.rooms),
        slots = slot_labels,
    )
}

/// Trims a completion down to the JSON it should contain: code fences are
/// dropped, then everything outside the outermost `[`...`]`.
pub fn strip_wrapping(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    s = s.trim();
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    match (s.find('['), s.rfind(']')) {
        (Some(start), Some(end)) if end > start => &s[start..=end],
        _ => s,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedItem {
    /// Class identifier from a `{"class", "timetable"}` envelope.
    pub class: Option<Value>,
    pub grid: WeekGrid,
}

/// Parses and normalizes a whole completion. Any malformed item rejects the
/// batch.
pub fn parse_generated_batch(raw: &str) -> GenerateResult<Vec<GeneratedItem>> {
    let value: Value = serde_json::from_str(strip_wrapping(raw))
        .map_err(|e| GenerateError::Unparseable(e.to_string()))?;
    let items = value.as_array().ok_or(GenerateError::NotAnArray)?;

    let now = crate::db::now_rfc3339();
    let mut out = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let obj = item.as_object().ok_or(GenerateError::ItemNotObject(i))?;
        let (class, body) = match obj.get("timetable") {
            Some(inner) if inner.is_object() => (obj.get("class").cloned(), inner),
            Some(_) => return Err(GenerateError::ItemNotObject(i)),
            None => (None, item),
        };
        out.push(GeneratedItem {
            class,
            grid: normalize(body, &now),
        });
    }
    Ok(out)
}

fn normalize(body: &Value, now: &str) -> WeekGrid {
    let mut grid = WeekGrid::from_value(body);
    grid.fill_missing_cells();
    if grid.id.is_none() {
        grid.id = Some(Uuid::new_v4().to_string());
    }
    if grid.created_at.is_none() {
        grid.created_at = Some(now.to_string());
    }
    if grid.updated_at.is_none() {
        grid.updated_at = Some(now.to_string());
    }
    grid
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedTimetable {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<Value>,
    pub timetable: WeekGrid,
    pub status: GridStatus,
    pub conflicts: Vec<DisplayConflict>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedBatch {
    pub timetables: Vec<GeneratedTimetable>,
    pub total_conflicts: usize,
    pub clean: bool,
}

/// Parses a completion and scans the batch against itself and the saved
/// timetables. Nothing is persisted here.
pub fn validate_batch(
    raw: &str,
    saved: &[WeekGrid],
    cfg: &DetectorConfig,
) -> GenerateResult<GeneratedBatch> {
    let items = match parse_generated_batch(raw) {
        Ok(items) => items,
        Err(e) => {
            tracing::warn!(error = %e, "rejected generator output");
            return Err(e);
        }
    };
    let (classes, grids): (Vec<_>, Vec<_>) = items.into_iter().map(|i| (i.class, i.grid)).unzip();
    let scanned = scan_batch(&grids, saved, cfg);

    let timetables: Vec<GeneratedTimetable> = classes
        .into_iter()
        .zip(scanned)
        .map(|(class, grid)| GeneratedTimetable {
            class,
            status: grid.status(),
            conflicts: extract_for_display(&grid),
            timetable: grid,
        })
        .collect();
    let total_conflicts = timetables.iter().map(|t| t.conflicts.len()).sum();

    tracing::info!(
        timetables = timetables.len(),
        conflicts = total_conflicts,
        "validated generated batch"
    );
    Ok(GeneratedBatch {
        clean: total_conflicts == 0,
        total_conflicts,
        timetables,
    })
}

pub fn generate_timetables(
    service: &dyn CompletionService,
    request: &GenerationRequest,
    saved: &[WeekGrid],
    cfg: &DetectorConfig,
) -> GenerateResult<GeneratedBatch> {
    let prompt = build_prompt(request);
    tracing::info!(prompt_bytes = prompt.len(), "requesting timetable generation");
    let completion = service.complete(&prompt)?;
    validate_batch(&completion, saved, cfg)
}
