pub mod algebra;
pub mod states;
pub mod params;
pub mod engine;
pub mod forces;
pub mod density;
pub mod drape;
pub mod integrator;
pub mod clock;
pub mod edits;
pub mod scenario;
