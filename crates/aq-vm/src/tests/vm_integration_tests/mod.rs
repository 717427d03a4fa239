
pub mod builtins;
pub mod functions;
pub mod linking;
pub mod references;
