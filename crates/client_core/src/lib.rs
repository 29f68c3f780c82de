//! Client-side controllers for the cover page admin app.
//!
//! The server owns pagination, search and validation; this crate owns the
//! conversation with it: a pager that survives slow and out-of-order
//! responses, a composer that aggregates picks into a printable document,
//! and a registry controller shared by every admin table. Backends are
//! injected as trait objects so every controller is testable without a
//! server.

pub mod backends;
pub mod composer;
pub mod error;
pub mod http;
pub mod pagination;
pub mod registry;

pub use backends::{
    CompositionBackend, ListingBackend, MissingCompositionBackend, MissingListingBackend,
    MissingRegistryBackend, RegistryBackend, RegistryEntity,
};
pub use composer::{format_stream_list, CoverComposer, CoverSelection, SessionPhase};
pub use error::{ComposeError, FetchError};
pub use http::HttpBackend;
pub use pagination::{CollectionPager, PageLoad, PagerEvent, PagerOptions};
pub use registry::{BulkDelete, RegistryController};
