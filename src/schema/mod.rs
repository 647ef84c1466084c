pub mod round;
pub mod theme;
