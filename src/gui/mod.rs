//! Interactive morph loop: the iced application and its background worker.

pub mod app;
pub mod worker;
