pub mod company;
pub mod placement;
pub mod student;
