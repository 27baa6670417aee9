use crate::grid::{SlotAssignment, TimeSlot, WeekGrid, Weekday};

pub fn grid(id: &str, program: &str, branch: &str, semester: &str, academic_type: &str) -> WeekGrid {
    let mut g = WeekGrid::empty();
    g.id = Some(id.to_string());
    g.program = program.to_string();
    g.branch = branch.to_string();
    g.semester = semester.to_string();
    g.academic_type = academic_type.to_string();
    g
}

pub fn slot(label: &str) -> TimeSlot {
    TimeSlot::parse(label).expect("known slot label")
}

pub fn assign(g: &mut WeekGrid, day: Weekday, label: &str, course: &str, teacher: &str, room: &str) {
    g.set_slot(day, slot(label), SlotAssignment::new(course, teacher, room));
}

/// CSE and ECE grids sharing Dr. Smith on Monday 9:00, in different rooms.
pub fn smith_pair() -> (WeekGrid, WeekGrid) {
    let mut g1 = grid("g1", "BTech", "CSE", "1", "full-time");
    assign(&mut g1, Weekday::Monday, "9:00-10:00", "CS101", "Dr. Smith", "R101");
    let mut g2 = grid("g2", "BTech", "ECE", "1", "full-time");
    assign(&mut g2, Weekday::Monday, "9:00-10:00", "EC101", "Dr. Smith", "R202");
    (g1, g2)
}
