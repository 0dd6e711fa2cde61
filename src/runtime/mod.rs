pub mod snapshot;
pub mod controller;
