//! View components handed to the editor host

pub mod floating;
