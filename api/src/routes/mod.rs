//! Route handlers

pub mod assessments;
pub mod compare;
pub mod health;
pub mod reports;
pub mod schedules;
