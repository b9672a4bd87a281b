pub mod responses;
pub mod session;
pub mod settings;
