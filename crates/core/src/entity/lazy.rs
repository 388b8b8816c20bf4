use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use tokio::sync::Mutex;

use crate::store::{DocumentData, Reference, Result, SharedStore, StoreError};

/// Decoding rules for one kind of document.
pub trait Schema: Send + Sync + 'static {
    /// Collection documents of this kind live in.
    const COLLECTION: &'static str;
    /// Name used in errors and logs.
    const ENTITY: &'static str;

    type Fields: Send + Sync + 'static;

    /// Decodes raw document data into typed fields.
    ///
    /// Relationship fields must be built as reference-only [`Lazy`] handles so
    /// decoding never fetches anything.
    fn decode(store: &SharedStore, data: &DocumentData) -> Result<Self::Fields>;
}

enum LoadState<F> {
    NotLoaded,
    Loaded(Arc<F>),
}

struct Inner<S: Schema> {
    reference: Option<Reference>,
    store: SharedStore,
    state: RwLock<LoadState<S::Fields>>,
    load: Mutex<()>,
}

/// A domain object backed by one remote document, loaded on first use.
///
/// Fields are fetched once and memoized until [`Lazy::invalidate`] is called;
/// they are never refreshed behind the caller's back. Clones share the same
/// loaded state. Separate handles built from the same reference do not.
pub struct Lazy<S: Schema> {
    inner: Arc<Inner<S>>,
}

impl<S: Schema> Lazy<S> {
    fn build(store: SharedStore, reference: Option<Reference>, state: LoadState<S::Fields>) -> Self {
        Self {
            inner: Arc::new(Inner {
                reference,
                store,
                state: RwLock::new(state),
                load: Mutex::new(()),
            }),
        }
    }

    /// Creates an unloaded handle; the document is fetched on first field access.
    pub fn from_reference(store: SharedStore, reference: Reference) -> Self {
        debug_assert_eq!(reference.collection(), S::COLLECTION);
        Self::build(store, Some(reference), LoadState::NotLoaded)
    }

    /// Creates an unloaded handle for a document id in this schema's collection.
    pub fn from_id(store: SharedStore, id: impl Into<String>) -> Self {
        Self::from_reference(store, Reference::new(S::COLLECTION, id))
    }

    /// Creates a handle from document data the caller already holds.
    ///
    /// No fetch happens; the fields are exactly what [`Lazy::materialize`]
    /// would decode from the same data.
    pub fn with_data(
        store: SharedStore,
        reference: Option<Reference>,
        data: &DocumentData,
    ) -> Result<Self> {
        let fields = S::decode(&store, data)?;
        Ok(Self::build(
            store,
            reference,
            LoadState::Loaded(Arc::new(fields)),
        ))
    }

    pub fn reference(&self) -> Option<&Reference> {
        self.inner.reference.as_ref()
    }

    pub fn id(&self) -> Option<&str> {
        self.inner.reference.as_ref().map(Reference::id)
    }

    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    /// Returns the reference or [`StoreError::MissingReference`].
    pub fn require_reference(&self) -> Result<&Reference> {
        self.reference()
            .ok_or(StoreError::MissingReference { entity: S::ENTITY })
    }

    /// Returns true if both handles point at the same document.
    pub fn same_document(&self, other: &Self) -> bool {
        matches!((self.reference(), other.reference()), (Some(a), Some(b)) if a == b)
    }

    fn read_state(&self) -> RwLockReadGuard<'_, LoadState<S::Fields>> {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store_state(&self, state: LoadState<S::Fields>) {
        *self
            .inner
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn is_materialized(&self) -> bool {
        matches!(*self.read_state(), LoadState::Loaded(_))
    }

    /// Returns the fields if already loaded, without fetching.
    pub fn loaded(&self) -> Option<Arc<S::Fields>> {
        match &*self.read_state() {
            LoadState::Loaded(fields) => Some(Arc::clone(fields)),
            LoadState::NotLoaded => None,
        }
    }

    /// Loads the document if it has not been loaded yet.
    ///
    /// Concurrent callers on the same handle wait for a single fetch. A
    /// missing document fails with [`StoreError::NotFound`] and, like any
    /// other failure, leaves the handle unloaded so a later call retries.
    pub async fn materialize(&self) -> Result<()> {
        self.fields().await.map(|_| ())
    }

    /// Returns the fields, loading the document first if needed.
    pub async fn fields(&self) -> Result<Arc<S::Fields>> {
        if let Some(fields) = self.loaded() {
            return Ok(fields);
        }

        let _gate = self.inner.load.lock().await;
        // Another caller may have finished loading while we waited.
        if let Some(fields) = self.loaded() {
            tracing::trace!(entity = S::ENTITY, "Entity loaded by concurrent caller");
            return Ok(fields);
        }

        let reference = self.require_reference()?;
        let data = self
            .inner
            .store
            .get_document(reference)
            .await?
            .ok_or_else(|| StoreError::not_found(reference))?;

        let fields = Arc::new(S::decode(&self.inner.store, &data)?);
        self.store_state(LoadState::Loaded(Arc::clone(&fields)));
        tracing::debug!(entity = S::ENTITY, %reference, "Entity materialized");

        Ok(fields)
    }

    /// Drops the loaded fields so the next access fetches the document again.
    pub fn invalidate(&self) {
        self.store_state(LoadState::NotLoaded);
    }

    /// Replaces the loaded fields with a decode of `data`.
    ///
    /// Used by mutations to mirror the state they just read or wrote.
    pub fn apply(&self, data: &DocumentData) -> Result<Arc<S::Fields>> {
        let fields = Arc::new(S::decode(&self.inner.store, data)?);
        self.store_state(LoadState::Loaded(Arc::clone(&fields)));
        Ok(fields)
    }
}

impl<S: Schema> Clone for Lazy<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: Schema> fmt::Debug for Lazy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(S::ENTITY)
            .field("reference", &self.inner.reference)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, FieldReader, InMemoryStore};
    use serde_json::{json, Value};
    use std::time::Duration;

    struct NoteSchema;

    struct NoteFields {
        title: String,
        parent: Option<Lazy<NoteSchema>>,
        links: Vec<Lazy<NoteSchema>>,
    }

    impl Schema for NoteSchema {
        const COLLECTION: &'static str = "notes";
        const ENTITY: &'static str = "Note";

        type Fields = NoteFields;

        fn decode(store: &SharedStore, data: &DocumentData) -> Result<NoteFields> {
            let fields = FieldReader::new(Self::ENTITY, data);
            Ok(NoteFields {
                title: fields.string("title")?,
                parent: fields
                    .reference("parent")?
                    .map(|reference| Lazy::from_reference(store.clone(), reference)),
                links: fields
                    .references("links")?
                    .into_iter()
                    .map(|reference| Lazy::from_reference(store.clone(), reference))
                    .collect(),
            })
        }
    }

    type Note = Lazy<NoteSchema>;

    fn data(value: Value) -> DocumentData {
        value.as_object().cloned().unwrap()
    }

    fn note(id: &str) -> Reference {
        Reference::new("notes", id)
    }

    async fn setup() -> (InMemoryStore, SharedStore) {
        let memory = InMemoryStore::new();
        memory
            .set_document(
                &note("root"),
                data(json!({ "title": "Root", "links": ["notes/child", "notes/root"] })),
            )
            .await
            .unwrap();
        memory
            .set_document(
                &note("child"),
                data(json!({ "title": "Child", "parent": "notes/root" })),
            )
            .await
            .unwrap();
        let store: SharedStore = Arc::new(memory.clone());
        (memory, store)
    }

    #[tokio::test]
    async fn test_reference_only_defers_fetch() {
        let (memory, store) = setup().await;

        let root = Note::from_id(store, "root");

        assert!(!root.is_materialized());
        assert!(root.loaded().is_none());
        assert_eq!(memory.stats().gets, 0);
    }

    #[tokio::test]
    async fn test_repeated_access_fetches_once() {
        let (memory, store) = setup().await;
        let root = Note::from_id(store, "root");

        assert_eq!(root.fields().await.unwrap().title, "Root");
        assert_eq!(root.fields().await.unwrap().links.len(), 2);
        root.materialize().await.unwrap();

        assert!(root.is_materialized());
        assert_eq!(memory.stats().gets, 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_fetches_once() {
        let memory = InMemoryStore::new().with_latency(Duration::from_millis(20));
        memory
            .set_document(&note("root"), data(json!({ "title": "Root" })))
            .await
            .unwrap();
        let store: SharedStore = Arc::new(memory.clone());
        let root = Note::from_id(store, "root");

        let (a, b, c) = tokio::join!(root.fields(), root.fields(), root.materialize());

        assert_eq!(a.unwrap().title, "Root");
        assert_eq!(b.unwrap().title, "Root");
        assert!(c.is_ok());
        assert_eq!(memory.stats().gets, 1);
    }

    #[tokio::test]
    async fn test_clones_share_loaded_state() {
        let (memory, store) = setup().await;
        let root = Note::from_id(store, "root");
        let copy = root.clone();

        root.materialize().await.unwrap();

        assert!(copy.is_materialized());
        copy.fields().await.unwrap();
        assert_eq!(memory.stats().gets, 1);
    }

    #[tokio::test]
    async fn test_with_data_never_fetches() {
        let (memory, store) = setup().await;
        let payload = memory.peek_document(&note("child")).await.unwrap();

        let child = Note::with_data(store.clone(), Some(note("child")), &payload).unwrap();

        assert!(child.is_materialized());
        let fields = child.fields().await.unwrap();
        assert_eq!(fields.title, "Child");
        assert_eq!(memory.stats().gets, 0);

        // Same decode as the fetching path.
        let fetched = Note::from_id(store, "child");
        let fetched_fields = fetched.fields().await.unwrap();
        assert_eq!(fetched_fields.title, fields.title);
        assert_eq!(
            fetched_fields.parent.as_ref().and_then(Lazy::reference),
            fields.parent.as_ref().and_then(Lazy::reference)
        );
    }

    #[tokio::test]
    async fn test_relationships_are_reference_only() {
        let (memory, store) = setup().await;
        let child = Note::from_id(store, "child");

        let fields = child.fields().await.unwrap();
        let parent = fields.parent.clone().unwrap();

        assert!(!parent.is_materialized());
        assert_eq!(parent.reference(), Some(&note("root")));
        assert_eq!(memory.stats().gets, 1);

        assert_eq!(parent.fields().await.unwrap().title, "Root");
        assert_eq!(memory.stats().gets, 2);
    }

    #[tokio::test]
    async fn test_cycles_resolve_on_demand() {
        let (memory, store) = setup().await;
        let root = Note::from_id(store, "root");

        // root links to itself; each hop is a separate handle loaded on request.
        let fields = root.fields().await.unwrap();
        let again = fields.links[1].clone();
        assert!(again.same_document(&root));
        assert!(!again.is_materialized());

        let deeper = again.fields().await.unwrap().links[1].clone();
        assert!(!deeper.is_materialized());
        assert_eq!(memory.stats().gets, 2);
    }

    #[tokio::test]
    async fn test_absent_relationship_is_none() {
        let (_, store) = setup().await;
        let root = Note::from_id(store, "root");

        assert!(root.fields().await.unwrap().parent.is_none());
    }

    #[tokio::test]
    async fn test_not_found_is_retried() {
        let (memory, store) = setup().await;
        let ghost = Note::from_id(store, "ghost");

        let first = ghost.fields().await;
        assert!(matches!(
            first,
            Err(StoreError::NotFound { ref reference }) if *reference == note("ghost")
        ));
        assert!(!ghost.is_materialized());

        memory
            .set_document(&note("ghost"), data(json!({ "title": "Boo" })))
            .await
            .unwrap();

        assert_eq!(ghost.fields().await.unwrap().title, "Boo");
        assert_eq!(memory.stats().gets, 2);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_cached() {
        let (memory, store) = setup().await;
        let root = Note::from_id(store, "root");
        memory.set_unavailable(true);

        assert!(matches!(
            root.materialize().await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(!root.is_materialized());

        memory.set_unavailable(false);
        assert!(root.materialize().await.is_ok());
    }

    #[tokio::test]
    async fn test_decode_failure_leaves_entity_unloaded() {
        let (memory, store) = setup().await;
        memory
            .set_document(&note("bad"), data(json!({ "title": 42 })))
            .await
            .unwrap();
        let bad = Note::from_id(store, "bad");

        assert!(matches!(
            bad.materialize().await,
            Err(StoreError::InvalidData(_))
        ));
        assert!(!bad.is_materialized());
    }

    #[tokio::test]
    async fn test_detached_entity_cannot_materialize() {
        let (_, store) = setup().await;
        let detached = Note::build(store, None, LoadState::NotLoaded);

        assert_eq!(
            detached.materialize().await,
            Err(StoreError::MissingReference { entity: "Note" })
        );
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (memory, store) = setup().await;
        let root = Note::from_id(store, "root");
        root.materialize().await.unwrap();

        memory
            .set_document(&note("root"), data(json!({ "title": "Renamed" })))
            .await
            .unwrap();
        assert_eq!(root.fields().await.unwrap().title, "Root");

        root.invalidate();
        assert!(!root.is_materialized());
        assert_eq!(root.fields().await.unwrap().title, "Renamed");
        assert_eq!(memory.stats().gets, 2);
    }

    #[tokio::test]
    async fn test_apply_replaces_mirror() {
        let (memory, store) = setup().await;
        let root = Note::from_id(store, "root");

        root.apply(&data(json!({ "title": "Mirrored" }))).unwrap();

        assert_eq!(root.fields().await.unwrap().title, "Mirrored");
        assert_eq!(memory.stats().gets, 0);
    }
}
