//! Narrow interfaces to the collaborators the signal core never touches directly.

pub mod config_port;
pub mod data_port;
pub mod symbol_map_port;
