// Preview server library - request routing core plus the runtime pieces used by the binary

pub mod app;
pub mod config;
pub mod model;
pub mod primitives;
pub mod services;
pub mod view;
