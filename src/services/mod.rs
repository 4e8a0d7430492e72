pub mod controller;
pub mod script;
pub mod speech;
