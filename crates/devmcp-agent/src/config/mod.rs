pub mod resolve;
pub mod types;

pub use resolve::{resolve, CliOverrides};
pub use types::ServerConfig;
