use async_trait::async_trait;

use shared::{
    domain::{
        Collection, CourseRef, PageId, PageSummary, ProgramRef, QuestionSummary, StudentRef,
    },
    protocol::{
        ActionOutcome, CourseUpsert, CoverPageDocument, NewQuestion, PageRequest, PageResult,
        ProgramUpsert, StudentUpsert,
    },
};

use crate::error::FetchError;

/// Serves one page of a server-paginated collection.
#[async_trait]
pub trait ListingBackend<T>: Send + Sync {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>, FetchError>;
}

/// Persists and recalls composed cover page documents.
#[async_trait]
pub trait CompositionBackend: Send + Sync {
    async fn save_page(&self, document: &CoverPageDocument) -> Result<ActionOutcome, FetchError>;
    async fn load_page(&self, id: PageId) -> Result<CoverPageDocument, FetchError>;
    async fn save_question(&self, content: &str) -> Result<ActionOutcome, FetchError>;
}

/// Row type managed by a [`crate::registry::RegistryController`]. Ties a
/// listed row to the payload used to create or edit it.
pub trait RegistryEntity: Clone + Send + Sync + 'static {
    type Draft: Send + Sync;

    fn entity_id(&self) -> i64;
    fn collection() -> Collection;
}

impl RegistryEntity for StudentRef {
    type Draft = StudentUpsert;

    fn entity_id(&self) -> i64 {
        self.id.0
    }

    fn collection() -> Collection {
        Collection::Students
    }
}

impl RegistryEntity for ProgramRef {
    type Draft = ProgramUpsert;

    fn entity_id(&self) -> i64 {
        self.id.0
    }

    fn collection() -> Collection {
        Collection::Programs
    }
}

impl RegistryEntity for CourseRef {
    type Draft = CourseUpsert;

    fn entity_id(&self) -> i64 {
        self.id.0
    }

    fn collection() -> Collection {
        Collection::Courses
    }
}

impl RegistryEntity for QuestionSummary {
    type Draft = NewQuestion;

    fn entity_id(&self) -> i64 {
        self.id.0
    }

    fn collection() -> Collection {
        Collection::Questions
    }
}

impl RegistryEntity for PageSummary {
    type Draft = CoverPageDocument;

    fn entity_id(&self) -> i64 {
        self.id.0
    }

    fn collection() -> Collection {
        Collection::Pages
    }
}

/// Creates, edits and deletes rows of one registry collection.
#[async_trait]
pub trait RegistryBackend<E: RegistryEntity>: Send + Sync {
    async fn create(&self, draft: &E::Draft) -> Result<ActionOutcome, FetchError>;
    async fn update(&self, id: i64, draft: &E::Draft) -> Result<ActionOutcome, FetchError>;
    async fn delete(&self, id: i64) -> Result<ActionOutcome, FetchError>;
}

fn not_configured(what: &str) -> FetchError {
    FetchError::Rejected(format!("{what} backend is not configured"))
}

/// Placeholder wired in when a controller is built without a backend, so a
/// misconfigured embedding fails loudly instead of hanging.
pub struct MissingListingBackend;

#[async_trait]
impl<T: Send + 'static> ListingBackend<T> for MissingListingBackend {
    async fn fetch_page(&self, _request: &PageRequest) -> Result<PageResult<T>, FetchError> {
        Err(not_configured("listing"))
    }
}

pub struct MissingCompositionBackend;

#[async_trait]
impl CompositionBackend for MissingCompositionBackend {
    async fn save_page(&self, _document: &CoverPageDocument) -> Result<ActionOutcome, FetchError> {
        Err(not_configured("composition"))
    }

    async fn load_page(&self, _id: PageId) -> Result<CoverPageDocument, FetchError> {
        Err(not_configured("composition"))
    }

    async fn save_question(&self, _content: &str) -> Result<ActionOutcome, FetchError> {
        Err(not_configured("composition"))
    }
}

pub struct MissingRegistryBackend;

#[async_trait]
impl<E: RegistryEntity> RegistryBackend<E> for MissingRegistryBackend {
    async fn create(&self, _draft: &E::Draft) -> Result<ActionOutcome, FetchError> {
        Err(not_configured("registry"))
    }

    async fn update(&self, _id: i64, _draft: &E::Draft) -> Result<ActionOutcome, FetchError> {
        Err(not_configured("registry"))
    }

    async fn delete(&self, _id: i64) -> Result<ActionOutcome, FetchError> {
        Err(not_configured("registry"))
    }
}
