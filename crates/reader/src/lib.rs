//! Reading engine: virtual pagination across chapters, page flipping,
//! progress seeking and background preloading.
//!
//! [`ReaderSession`] is the entry point for hosts. The transitions it is
//! built from ([`FlipEngine`], [`SeekProgress`],
//! [`SettingsUpdateCoordinator`], [`PreloadManager`]) are public as well;
//! each one takes a [`ReaderState`] snapshot and returns a new one.

pub mod error;
pub mod flip;
pub mod paginate;
pub mod preload;
pub mod progress;
pub mod seek;
pub mod session;
pub mod settings;
pub mod state;
mod switch;
#[cfg(test)]
mod testing;
pub mod virtual_pages;

pub use crate::flip::{FlipDirection, FlipEngine, FlipOutcome};
pub use crate::paginate::{PaginationEvent, PaginationService};
pub use crate::preload::{PreloadManager, PreloadReport};
pub use crate::progress::ProgressTracker;
pub use crate::seek::{SeekOutcome, SeekProgress};
pub use crate::session::{BackgroundUpdate, ReaderSession};
pub use crate::settings::{RepaginationTier, SettingsUpdateCoordinator};
pub use crate::state::{ReaderState, VirtualPage};
pub use crate::virtual_pages::VirtualPageBuilder;
