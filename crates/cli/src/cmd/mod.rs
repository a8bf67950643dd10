pub mod query;
pub mod roster;
pub mod whoami;
