//! Service layer.
//!
//! Holds the state the tools and resources share, so handlers stay thin.

pub mod workspace;

pub use workspace::WorkspaceService;
