pub mod render;
pub mod serve;
pub mod status;
pub mod sync;
pub mod trigger;
