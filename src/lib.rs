//! msviz - interactive mass-spectrometry point viewer core
//!
//! The client-side state of a viewer for large (mz, rt, intensity) point
//! clouds: a constrained view window over the data domain, point visibility
//! and sampling, manual segmentation of points into traces and traces into
//! envelopes, and a batched change queue synchronised with a remote data
//! server. Rendering and HTTP are left to the host; see [`session::Session`]
//! for the entry point.

pub mod bookmarks;
pub mod change_queue;
pub mod color_utils;
pub mod config;
pub mod constants;
pub mod editor;
pub mod error;
pub mod keybindings;
pub mod logging;
pub mod points;
pub mod registry;
pub mod remote;
pub mod session;
pub mod view_range;

pub use config::PersistedState;
pub use error::{RemoteError, SegmentError};
pub use session::Session;
