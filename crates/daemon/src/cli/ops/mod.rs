pub mod check;
pub mod serve;
pub mod version;

pub use check::Check;
pub use serve::Serve;
pub use version::Version;
