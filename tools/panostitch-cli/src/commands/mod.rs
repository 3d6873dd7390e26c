pub mod check;
pub mod find;
pub mod probe;
pub mod unwarp;
