pub mod clock;
pub mod dir;
pub mod logging;
pub mod month;
pub mod time;
