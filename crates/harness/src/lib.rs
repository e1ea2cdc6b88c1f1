mod oracle;
mod session;

pub use oracle::ScoreOracle;
pub use session::{TestSession, temp_storage};
