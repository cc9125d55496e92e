pub mod drop;
pub mod track;
