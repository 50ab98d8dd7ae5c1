mod backend;
mod backends;
mod loader;
mod result;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use loader::{DetectorHandle, DetectorLoader, LoadAttempt, LoadReport, LoadedDetector};
pub use result::{class_table, RawDetection, RawDetections};
