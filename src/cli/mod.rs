pub mod command;
pub mod dump;
pub mod info;
pub mod nals;
pub mod stream;
