//! Tool executors and the registry that resolves them by name.

pub mod calc;
pub mod http_get;
pub mod registry;

pub use calc::CalcTool;
pub use http_get::HttpGetTool;
pub use registry::ToolRegistry;
