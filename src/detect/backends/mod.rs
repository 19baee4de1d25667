pub mod http;
pub mod null;
pub mod scripted;

pub use http::HttpDetector;
pub use null::NullDetector;
pub use scripted::ScriptedDetector;
