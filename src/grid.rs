use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

pub const TIME_SLOT_LABELS: [&str; 12] = [
    "7:00-8:00",
    "8:00-9:00",
    "9:00-10:00",
    "10:00-11:00",
    "11:00-12:00",
    "12:00-13:00",
    "13:00-14:00",
    "14:00-15:00",
    "15:00-16:00",
    "16:00-17:00",
    "17:00-18:00",
    "18:00-19:00",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Weekday {
    pub const ALL: [Weekday; 6] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
    ];

    /// JSON key used by the grid interchange format.
    pub fn key(self) -> &'static str {
        match self {
            Self::Monday => "monday",
            Self::Tuesday => "tuesday",
            Self::Wednesday => "wednesday",
            Self::Thursday => "thursday",
            Self::Friday => "friday",
            Self::Saturday => "saturday",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|d| d.key() == s)
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl Serialize for Weekday {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.key())
    }
}

impl<'de> Deserialize<'de> for Weekday {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| de::Error::custom(format!("unknown day: {}", s)))
    }
}

/// One of the twelve hour-long teaching periods, ordered by start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeSlot(u8);

impl TimeSlot {
    pub fn all() -> impl Iterator<Item = TimeSlot> {
        (0..TIME_SLOT_LABELS.len() as u8).map(TimeSlot)
    }

    pub fn label(self) -> &'static str {
        TIME_SLOT_LABELS[self.0 as usize]
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        TIME_SLOT_LABELS
            .iter()
            .position(|l| *l == s)
            .map(|i| TimeSlot(i as u8))
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for TimeSlot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for TimeSlot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| de::Error::custom(format!("unknown time slot: {}", s)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Teacher,
    Room,
}

impl ResourceType {
    pub const ALL: [ResourceType; 2] = [ResourceType::Teacher, ResourceType::Room];

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Some(Self::Teacher),
            "room" => Some(Self::Room),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Teacher => "teacher",
            Self::Room => "room",
        }
    }
}

/// The five fields that identify a timetable independently of its record id.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalKey {
    pub program: String,
    pub branch: String,
    pub semester: String,
    pub academic_type: String,
    pub batch: String,
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-Sem{}-{}",
            self.program, self.branch, self.semester, self.academic_type
        )?;
        if !self.batch.is_empty() {
            write!(f, "-{}", self.batch)?;
        }
        Ok(())
    }
}

/// A collision between the slot it is attached to and the same cell of another
/// timetable. Wire names follow the stored document format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    #[serde(rename = "conflictType", alias = "resourceType")]
    pub resource_type: ResourceType,
    #[serde(rename = "conflictingResource", alias = "resourceName", default)]
    pub resource_name: String,
    #[serde(default)]
    pub conflicting_course: String,
    #[serde(default)]
    pub program: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub semester: String,
    #[serde(default)]
    pub batch: String,
    #[serde(rename = "type", alias = "academicType", default)]
    pub academic_type: String,
    #[serde(default)]
    pub ignorable: bool,
}

impl ConflictRecord {
    pub fn other_key(&self) -> LogicalKey {
        LogicalKey {
            program: self.program.clone(),
            branch: self.branch.clone(),
            semester: self.semester.clone(),
            academic_type: self.academic_type.clone(),
            batch: self.batch.clone(),
        }
    }

    /// Same resource type against the same other timetable.
    pub fn same_source(&self, other: &ConflictRecord) -> bool {
        self.resource_type == other.resource_type
            && self.program == other.program
            && self.branch == other.branch
            && self.semester == other.semester
            && self.batch == other.batch
            && self.academic_type == other.academic_type
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotAssignment {
    pub course: String,
    pub teacher: String,
    pub room: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflicts: Option<Vec<ConflictRecord>>,
}

impl SlotAssignment {
    pub fn new(course: &str, teacher: &str, room: &str) -> Self {
        Self {
            course: course.to_string(),
            teacher: teacher.to_string(),
            room: room.to_string(),
            conflicts: None,
        }
    }

    /// Nothing assigned: exempt from conflict detection.
    pub fn is_empty(&self) -> bool {
        self.course.trim().is_empty() && self.teacher.trim().is_empty() && self.room.trim().is_empty()
    }

    pub fn resource(&self, resource_type: ResourceType) -> &str {
        match resource_type {
            ResourceType::Teacher => &self.teacher,
            ResourceType::Room => &self.room,
        }
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicts.as_ref().is_some_and(|c| !c.is_empty())
    }

    /// Reads whatever fields are usable. Conflict entries that do not parse as
    /// records (older free-text notes) are dropped since they are derived data.
    pub fn from_value(v: &Value) -> Self {
        let Some(obj) = v.as_object() else {
            return Self::default();
        };
        let conflicts = obj.get("conflicts").and_then(|c| c.as_array()).map(|items| {
            items
                .iter()
                .filter_map(|item| serde_json::from_value::<ConflictRecord>(item.clone()).ok())
                .collect::<Vec<_>>()
        });
        Self {
            course: text_field(obj, "course"),
            teacher: text_field(obj, "teacher"),
            room: text_field(obj, "room"),
            conflicts,
        }
    }
}

impl<'de> Deserialize<'de> for SlotAssignment {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&v))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GridStatus {
    IncompleteMetadata,
    Unchecked,
    Clean,
    Conflicted,
}

pub type DaySlots = BTreeMap<TimeSlot, SlotAssignment>;

/// One class timetable: six days of twelve slots plus its identity fields.
///
/// Cells missing from `days` mean "no assignment there". Top-level fields the
/// grid does not interpret (e.g. `overallCredits`) are carried in `extra` so the
/// document round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeekGrid {
    pub id: Option<String>,
    pub program: String,
    pub branch: String,
    pub semester: String,
    pub academic_type: String,
    pub batch: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub days: BTreeMap<Weekday, DaySlots>,
    pub extra: Map<String, Value>,
    /// Set by a full detection pass, reset by any edit. Not serialized.
    pub checked: bool,
}

const KNOWN_FIELDS: [&str; 10] = [
    "id",
    "program",
    "course",
    "branch",
    "semester",
    "type",
    "academicType",
    "batch",
    "createdAt",
    "updatedAt",
];

impl WeekGrid {
    /// Every day and slot present with an empty assignment.
    #[cfg(test)]
    pub fn empty() -> Self {
        let mut grid = Self::default();
        grid.fill_missing_cells();
        grid
    }

    pub fn key(&self) -> LogicalKey {
        LogicalKey {
            program: self.program.clone(),
            branch: self.branch.clone(),
            semester: self.semester.clone(),
            academic_type: self.academic_type.clone(),
            batch: self.batch.clone(),
        }
    }

    pub fn set_key(&mut self, key: LogicalKey) {
        self.program = key.program;
        self.branch = key.branch;
        self.semester = key.semester;
        self.academic_type = key.academic_type;
        self.batch = key.batch;
        self.clear_conflicts();
    }

    pub fn cell(&self, day: Weekday, slot: TimeSlot) -> Option<&SlotAssignment> {
        self.days.get(&day).and_then(|d| d.get(&slot))
    }

    pub fn cell_mut(&mut self, day: Weekday, slot: TimeSlot) -> Option<&mut SlotAssignment> {
        self.days.get_mut(&day).and_then(|d| d.get_mut(&slot))
    }

    /// Replaces one cell. Its derived conflicts are discarded and the grid is
    /// no longer considered checked.
    pub fn set_slot(&mut self, day: Weekday, slot: TimeSlot, assignment: SlotAssignment) {
        let assignment = SlotAssignment {
            conflicts: None,
            ..assignment
        };
        self.days.entry(day).or_default().insert(slot, assignment);
        self.checked = false;
    }

    pub fn fill_missing_cells(&mut self) {
        for day in Weekday::ALL {
            let slots = self.days.entry(day).or_default();
            for slot in TimeSlot::all() {
                slots.entry(slot).or_default();
            }
        }
    }

    /// Cells in day-then-slot order.
    pub fn cells(&self) -> impl Iterator<Item = (Weekday, TimeSlot, &SlotAssignment)> {
        self.days
            .iter()
            .flat_map(|(day, slots)| slots.iter().map(move |(slot, a)| (*day, *slot, a)))
    }

    pub fn clear_conflicts(&mut self) {
        for slots in self.days.values_mut() {
            for a in slots.values_mut() {
                a.conflicts = None;
            }
        }
        self.checked = false;
    }

    pub fn conflicts(&self) -> impl Iterator<Item = (Weekday, TimeSlot, &ConflictRecord)> {
        self.cells().flat_map(|(day, slot, a)| {
            a.conflicts
                .iter()
                .flatten()
                .map(move |c| (day, slot, c))
        })
    }

    pub fn status(&self) -> GridStatus {
        if !crate::detect::is_eligible_for_conflict_check(self) {
            return GridStatus::IncompleteMetadata;
        }
        if self.cells().any(|(_, _, a)| a.has_conflicts()) {
            return GridStatus::Conflicted;
        }
        if !self.checked {
            return GridStatus::Unchecked;
        }
        GridStatus::Clean
    }

    /// Builds a grid from a stored or received document without failing:
    /// non-string identity fields are stringified when scalar, malformed days
    /// and slots are left out.
    pub fn from_value(v: &Value) -> Self {
        let Some(obj) = v.as_object() else {
            return Self::default();
        };

        let mut program = text_field(obj, "program");
        if program.is_empty() {
            program = text_field(obj, "course");
        }
        let mut academic_type = text_field(obj, "type");
        if academic_type.is_empty() {
            academic_type = text_field(obj, "academicType");
        }

        let mut days = BTreeMap::new();
        for day in Weekday::ALL {
            let Some(day_obj) = obj.get(day.key()).and_then(|d| d.as_object()) else {
                continue;
            };
            let mut slots = DaySlots::new();
            for (label, cell) in day_obj {
                let Some(slot) = TimeSlot::parse(label) else {
                    continue;
                };
                if cell.is_object() {
                    slots.insert(slot, SlotAssignment::from_value(cell));
                }
            }
            days.insert(day, slots);
        }

        let extra = obj
            .iter()
            .filter(|(k, _)| {
                !KNOWN_FIELDS.contains(&k.as_str())
                    && !Weekday::ALL.iter().any(|d| d.key() == k.as_str())
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Self {
            id: obj
                .get("id")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .filter(|s| !s.is_empty()),
            program,
            branch: text_field(obj, "branch"),
            semester: text_field(obj, "semester"),
            academic_type,
            batch: text_field(obj, "batch"),
            created_at: opt_text_field(obj, "createdAt"),
            updated_at: opt_text_field(obj, "updatedAt"),
            days,
            extra,
            checked: false,
        }
    }
}

impl Serialize for WeekGrid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        map.serialize_entry("program", &self.program)?;
        map.serialize_entry("branch", &self.branch)?;
        map.serialize_entry("semester", &self.semester)?;
        map.serialize_entry("type", &self.academic_type)?;
        map.serialize_entry("batch", &self.batch)?;
        if let Some(v) = &self.created_at {
            map.serialize_entry("createdAt", v)?;
        }
        if let Some(v) = &self.updated_at {
            map.serialize_entry("updatedAt", v)?;
        }
        for (k, v) in &self.extra {
            map.serialize_entry(k, v)?;
        }
        for (day, slots) in &self.days {
            let by_label: Vec<(&str, &SlotAssignment)> =
                slots.iter().map(|(s, a)| (s.label(), a)).collect();
            map.serialize_entry(day.key(), &OrderedSlots(&by_label))?;
        }
        map.end()
    }
}

struct OrderedSlots<'a>(&'a [(&'a str, &'a SlotAssignment)]);

impl Serialize for OrderedSlots<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, a) in self.0 {
            map.serialize_entry(label, a)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for WeekGrid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let v = Value::deserialize(deserializer)?;
        if !v.is_object() {
            return Err(de::Error::custom("timetable must be a JSON object"));
        }
        Ok(Self::from_value(&v))
    }
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
    match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn opt_text_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}
