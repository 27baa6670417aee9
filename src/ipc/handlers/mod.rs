pub mod conflicts;
pub mod core;
pub mod generate;
pub mod load;
pub mod setup;
pub mod timetables;
