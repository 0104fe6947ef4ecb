use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::{Form, Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::info;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "JSESSIONID";
pub const DEMO_EMAIL: &str = "dspacedemo+admin@gmail.com";
pub const DEMO_PASSWORD: &str = "dspace";
const HANDLE_PREFIX: &str = "123456789";
const DEFAULT_LIMIT: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Community {
    pub uuid: Uuid,
    pub name: String,
    pub handle: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub link: String,
    pub count_items: i64,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub introductory_text: String,
    #[serde(default)]
    pub copyright_text: String,
    #[serde(default)]
    pub sidebar_text: String,
    #[serde(skip)]
    pub parent: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    pub uuid: Uuid,
    pub name: String,
    pub handle: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub link: String,
    pub number_items: i64,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub introductory_text: String,
    #[serde(default)]
    pub copyright_text: String,
    #[serde(default)]
    pub sidebar_text: String,
    #[serde(skip)]
    pub community: Option<Uuid>,
}

/// Items are served the way DSpace 6 does: flags as strings and
/// `lastModified` without a zone.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub uuid: Uuid,
    pub name: String,
    pub handle: String,
    #[serde(rename = "type")]
    pub object_type: String,
    pub link: String,
    pub last_modified: String,
    pub archived: String,
    pub withdrawn: String,
    #[serde(skip)]
    pub collection: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bitstream {
    pub uuid: Uuid,
    pub name: String,
    pub handle: Option<String>,
    #[serde(rename = "type")]
    pub object_type: String,
    pub link: String,
    pub bundle_name: String,
    pub size_bytes: i64,
    pub mime_type: String,
    #[serde(skip)]
    pub item: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePolicy {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub eperson_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub rp_description: Option<String>,
    #[serde(default)]
    pub rp_name: Option<String>,
    #[serde(default)]
    pub rp_type: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CreateContainer {
    pub name: String,
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContainer {
    pub name: Option<String>,
    pub short_description: Option<String>,
    pub introductory_text: Option<String>,
    pub copyright_text: Option<String>,
    pub sidebar_text: Option<String>,
}

#[derive(Deserialize)]
pub struct CreateItem {
    #[serde(rename = "type", default)]
    pub object_type: Option<String>,
    pub metadata: Vec<MetadataEntry>,
}

#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn now() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

fn paginate<T>(records: impl Iterator<Item = T>, page: &Page) -> Vec<T> {
    records.skip(page.offset).take(page.limit).collect()
}

/// In-memory repository. Vectors keep insertion order so pages are stable.
#[derive(Debug, Default)]
pub struct Repository {
    pub communities: Vec<Community>,
    pub collections: Vec<Collection>,
    pub items: Vec<Item>,
    pub bitstreams: Vec<Bitstream>,
    pub metadata: HashMap<Uuid, Vec<MetadataEntry>>,
    pub policies: HashMap<Uuid, Vec<ResourcePolicy>>,
    sessions: HashSet<String>,
    last_handle: u64,
    last_policy_id: i64,
}

impl Repository {
    fn next_handle(&mut self) -> String {
        self.last_handle += 1;
        format!("{HANDLE_PREFIX}/{}", self.last_handle)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn add_community(&mut self, name: &str, parent: Option<Uuid>) -> Community {
        let uuid = Uuid::new_v4();
        let community = Community {
            uuid,
            name: name.to_string(),
            handle: self.next_handle(),
            object_type: "community".to_string(),
            link: format!("/rest/communities/{uuid}"),
            count_items: 0,
            short_description: String::new(),
            introductory_text: String::new(),
            copyright_text: String::new(),
            sidebar_text: String::new(),
            parent,
        };
        self.communities.push(community.clone());
        community
    }

    pub fn add_collection(&mut self, community: Uuid, name: &str) -> Collection {
        let uuid = Uuid::new_v4();
        let collection = Collection {
            uuid,
            name: name.to_string(),
            handle: self.next_handle(),
            object_type: "collection".to_string(),
            link: format!("/rest/collections/{uuid}"),
            number_items: 0,
            short_description: String::new(),
            introductory_text: String::new(),
            copyright_text: String::new(),
            sidebar_text: String::new(),
            community: Some(community),
        };
        self.collections.push(collection.clone());
        collection
    }

    /// Add an item named after its `dc.title`, bumping the owning
    /// collection's and community's counters.
    pub fn add_item(&mut self, collection: Uuid, metadata: Vec<MetadataEntry>) -> Item {
        let uuid = Uuid::new_v4();
        let item = Item {
            uuid,
            name: title_of(&metadata).unwrap_or_else(|| "Untitled".to_string()),
            handle: self.next_handle(),
            object_type: "item".to_string(),
            link: format!("/rest/items/{uuid}"),
            last_modified: now(),
            archived: "true".to_string(),
            withdrawn: "false".to_string(),
            collection: Some(collection),
        };
        self.metadata.insert(uuid, metadata);

        self.adjust_counts(collection, 1);

        self.items.push(item.clone());
        item
    }

    /// Add a bitstream readable by anonymous users.
    pub fn add_bitstream(&mut self, item: Uuid, name: &str, size_bytes: i64) -> Bitstream {
        let uuid = Uuid::new_v4();
        let bitstream = Bitstream {
            uuid,
            name: name.to_string(),
            handle: None,
            object_type: "bitstream".to_string(),
            link: format!("/rest/bitstreams/{uuid}"),
            bundle_name: "ORIGINAL".to_string(),
            size_bytes,
            mime_type: "application/octet-stream".to_string(),
            item: Some(item),
        };
        self.last_policy_id += 1;
        self.policies.insert(
            uuid,
            vec![ResourcePolicy {
                id: self.last_policy_id,
                action: Some("READ".to_string()),
                group_id: Some("anonymous".to_string()),
                resource_id: Some(uuid.to_string()),
                resource_type: Some("bitstream".to_string()),
                rp_type: Some("TYPE_INHERITED".to_string()),
                ..ResourcePolicy::default()
            }],
        );
        self.bitstreams.push(bitstream.clone());
        bitstream
    }

    /// Item counters of a collection and its owning community.
    fn adjust_counts(&mut self, collection: Uuid, delta: i64) {
        let mut community = None;
        if let Some(c) = self.collections.iter_mut().find(|c| c.uuid == collection) {
            c.number_items += delta;
            community = c.community;
        }
        if let Some(c) = community.and_then(|id| self.communities.iter_mut().find(|c| c.uuid == id)) {
            c.count_items += delta;
        }
    }

    pub fn remove_item(&mut self, id: Uuid) -> bool {
        let Some(pos) = self.items.iter().position(|i| i.uuid == id) else {
            return false;
        };
        let item = self.items.remove(pos);
        self.metadata.remove(&id);
        if let Some(collection) = item.collection {
            self.adjust_counts(collection, -1);
        }
        let orphaned: Vec<Uuid> = self
            .bitstreams
            .iter()
            .filter(|b| b.item == Some(id))
            .map(|b| b.uuid)
            .collect();
        for bitstream in orphaned {
            self.remove_bitstream(bitstream);
        }
        true
    }

    /// Remove a collection with its items.
    pub fn remove_collection(&mut self, id: Uuid) -> bool {
        if !self.collections.iter().any(|c| c.uuid == id) {
            return false;
        }
        let owned: Vec<Uuid> = self
            .items
            .iter()
            .filter(|i| i.collection == Some(id))
            .map(|i| i.uuid)
            .collect();
        for item in owned {
            self.remove_item(item);
        }
        self.collections.retain(|c| c.uuid != id);
        true
    }

    /// Remove a community with its whole subtree.
    pub fn remove_community(&mut self, id: Uuid) -> bool {
        if !self.communities.iter().any(|c| c.uuid == id) {
            return false;
        }
        let children: Vec<Uuid> = self
            .communities
            .iter()
            .filter(|c| c.parent == Some(id))
            .map(|c| c.uuid)
            .collect();
        for child in children {
            self.remove_community(child);
        }
        let collections: Vec<Uuid> = self
            .collections
            .iter()
            .filter(|c| c.community == Some(id))
            .map(|c| c.uuid)
            .collect();
        for collection in collections {
            self.remove_collection(collection);
        }
        self.communities.retain(|c| c.uuid != id);
        true
    }

    pub fn remove_bitstream(&mut self, id: Uuid) -> bool {
        let before = self.bitstreams.len();
        self.bitstreams.retain(|b| b.uuid != id);
        self.policies.remove(&id);
        self.bitstreams.len() != before
    }

    fn touch_item(&mut self, id: Uuid) {
        let title = self.metadata.get(&id).and_then(|m| title_of(m));
        if let Some(item) = self.items.iter_mut().find(|i| i.uuid == id) {
            item.last_modified = now();
            if let Some(title) = title {
                item.name = title;
            }
        }
    }
}

fn title_of(metadata: &[MetadataEntry]) -> Option<String> {
    metadata
        .iter()
        .find(|m| m.key == "dc.title")
        .map(|m| m.value.clone())
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<RwLock<Repository>>,
    credentials: Arc<(String, String)>,
}

impl AppState {
    /// State accepting exactly one account.
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            repo: Arc::new(RwLock::new(Repository::default())),
            credentials: Arc::new((email.to_string(), password.to_string())),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEMO_EMAIL, DEMO_PASSWORD)
    }
}

pub fn app() -> Router {
    app_with(AppState::default())
}

/// The REST API mounted under `/rest`, as DSpace deploys it.
pub fn app_with(state: AppState) -> Router {
    let protected = Router::new()
        .route("/logout", post(logout))
        .route("/communities", get(list_communities).post(create_top_community))
        .route("/communities/top-communities", get(list_top_communities))
        .route(
            "/communities/{id}",
            get(get_community).put(update_community).delete(delete_community),
        )
        .route(
            "/communities/{id}/collections",
            get(list_community_collections).post(create_collection),
        )
        .route(
            "/communities/{id}/communities",
            get(list_subcommunities).post(create_subcommunity),
        )
        .route("/collections", get(list_collections))
        .route(
            "/collections/{id}",
            get(get_collection).put(update_collection).delete(delete_collection),
        )
        .route(
            "/collections/{id}/items",
            get(list_collection_items).post(create_item),
        )
        .route("/items", get(list_items))
        .route("/items/{id}", get(get_item).delete(delete_item))
        .route(
            "/items/{id}/metadata",
            get(get_metadata).post(add_metadata).put(update_metadata),
        )
        .route("/items/{id}/bitstreams", get(list_item_bitstreams))
        .route("/bitstreams", get(list_bitstreams))
        .route("/bitstreams/{id}", get(get_bitstream).delete(delete_bitstream))
        .route("/bitstreams/{id}/policy", get(list_policies).post(add_policy))
        .route("/bitstreams/{id}/policy/{policy_id}", delete(delete_policy))
        .route("/handle/{prefix}/{suffix}", get(resolve_handle))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let api = Router::new()
        .route("/login", post(login))
        .merge(protected)
        .with_state(state);

    Router::new().nest("/rest", api)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with(state)).await
}

/// Value of the session cookie in a request, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, token)| token.to_string())
}

async fn require_session(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let known = match session_token(request.headers()) {
        Some(token) => state.repo.read().await.sessions.contains(&token),
        None => false,
    };
    if !known {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    next.run(request).await
}

async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Response {
    let (email, password) = state.credentials.as_ref();
    if form.email != *email || form.password != *password {
        info!(email = %form.email, "rejected login");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let token = Uuid::new_v4().simple().to_string();
    state.repo.write().await.sessions.insert(token.clone());
    info!(email = %form.email, "login");
    (
        StatusCode::OK,
        [(
            header::SET_COOKIE,
            format!("{SESSION_COOKIE}={token}; Path=/rest; HttpOnly"),
        )],
    )
        .into_response()
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    if let Some(token) = session_token(&headers) {
        state.repo.write().await.sessions.remove(&token);
    }
    StatusCode::OK
}

// --- communities ---

async fn list_communities(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Json<Vec<Community>> {
    let repo = state.repo.read().await;
    Json(paginate(repo.communities.iter().cloned(), &page))
}

async fn list_top_communities(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Json<Vec<Community>> {
    let repo = state.repo.read().await;
    let top = repo.communities.iter().filter(|c| c.parent.is_none()).cloned();
    Json(paginate(top, &page))
}

async fn get_community(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Community>, StatusCode> {
    let repo = state.repo.read().await;
    repo.communities
        .iter()
        .find(|c| c.uuid == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn create_top_community(
    State(state): State<AppState>,
    Json(input): Json<CreateContainer>,
) -> Json<Community> {
    let community = state.repo.write().await.add_community(&input.name, None);
    info!(name = %community.name, "created community");
    Json(community)
}

async fn create_subcommunity(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateContainer>,
) -> Result<Json<Community>, StatusCode> {
    let mut repo = state.repo.write().await;
    if !repo.communities.iter().any(|c| c.uuid == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(repo.add_community(&input.name, Some(id))))
}

async fn list_subcommunities(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Community>>, StatusCode> {
    let repo = state.repo.read().await;
    if !repo.communities.iter().any(|c| c.uuid == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let children = repo.communities.iter().filter(|c| c.parent == Some(id)).cloned();
    Ok(Json(paginate(children, &page)))
}

async fn update_community(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateContainer>,
) -> StatusCode {
    let mut repo = state.repo.write().await;
    let Some(community) = repo.communities.iter_mut().find(|c| c.uuid == id) else {
        return StatusCode::NOT_FOUND;
    };
    apply_update(
        input,
        &mut community.name,
        &mut community.short_description,
        &mut community.introductory_text,
        &mut community.copyright_text,
        &mut community.sidebar_text,
    );
    StatusCode::OK
}

async fn delete_community(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.repo.write().await.remove_community(id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

fn apply_update(
    input: UpdateContainer,
    name: &mut String,
    short_description: &mut String,
    introductory_text: &mut String,
    copyright_text: &mut String,
    sidebar_text: &mut String,
) {
    if let Some(v) = input.name {
        *name = v;
    }
    if let Some(v) = input.short_description {
        *short_description = v;
    }
    if let Some(v) = input.introductory_text {
        *introductory_text = v;
    }
    if let Some(v) = input.copyright_text {
        *copyright_text = v;
    }
    if let Some(v) = input.sidebar_text {
        *sidebar_text = v;
    }
}

// --- collections ---

async fn list_collections(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Json<Vec<Collection>> {
    let repo = state.repo.read().await;
    Json(paginate(repo.collections.iter().cloned(), &page))
}

async fn list_community_collections(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Collection>>, StatusCode> {
    let repo = state.repo.read().await;
    if !repo.communities.iter().any(|c| c.uuid == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let owned = repo.collections.iter().filter(|c| c.community == Some(id)).cloned();
    Ok(Json(paginate(owned, &page)))
}

async fn create_collection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateContainer>,
) -> Result<Json<Collection>, StatusCode> {
    let mut repo = state.repo.write().await;
    if !repo.communities.iter().any(|c| c.uuid == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(Json(repo.add_collection(id, &input.name)))
}

async fn get_collection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Collection>, StatusCode> {
    let repo = state.repo.read().await;
    repo.collections
        .iter()
        .find(|c| c.uuid == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_collection(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateContainer>,
) -> StatusCode {
    let mut repo = state.repo.write().await;
    let Some(collection) = repo.collections.iter_mut().find(|c| c.uuid == id) else {
        return StatusCode::NOT_FOUND;
    };
    apply_update(
        input,
        &mut collection.name,
        &mut collection.short_description,
        &mut collection.introductory_text,
        &mut collection.copyright_text,
        &mut collection.sidebar_text,
    );
    StatusCode::OK
}

async fn delete_collection(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.repo.write().await.remove_collection(id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn list_collection_items(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Item>>, StatusCode> {
    let repo = state.repo.read().await;
    if !repo.collections.iter().any(|c| c.uuid == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let owned = repo.items.iter().filter(|i| i.collection == Some(id)).cloned();
    Ok(Json(paginate(owned, &page)))
}

async fn create_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateItem>,
) -> Result<Json<Item>, StatusCode> {
    if input.object_type.as_deref().is_some_and(|t| t != "item") {
        return Err(StatusCode::BAD_REQUEST);
    }
    let mut repo = state.repo.write().await;
    if !repo.collections.iter().any(|c| c.uuid == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let item = repo.add_item(id, input.metadata);
    info!(uuid = %item.uuid, "created item");
    Ok(Json(item))
}

// --- items ---

async fn list_items(State(state): State<AppState>, Query(page): Query<Page>) -> Json<Vec<Item>> {
    let repo = state.repo.read().await;
    Json(paginate(repo.items.iter().cloned(), &page))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Item>, StatusCode> {
    let repo = state.repo.read().await;
    repo.items
        .iter()
        .find(|i| i.uuid == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_item(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.repo.write().await.remove_item(id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn get_metadata(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<MetadataEntry>>, StatusCode> {
    let repo = state.repo.read().await;
    repo.metadata
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn add_metadata(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<Vec<MetadataEntry>>,
) -> StatusCode {
    let mut repo = state.repo.write().await;
    let Some(entries) = repo.metadata.get_mut(&id) else {
        return StatusCode::NOT_FOUND;
    };
    entries.extend(input);
    repo.touch_item(id);
    StatusCode::OK
}

/// Values of every key present in the payload are replaced; other keys are
/// left alone.
async fn update_metadata(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<Vec<MetadataEntry>>,
) -> StatusCode {
    let mut repo = state.repo.write().await;
    let Some(entries) = repo.metadata.get_mut(&id) else {
        return StatusCode::NOT_FOUND;
    };
    let keys: HashSet<&str> = input.iter().map(|m| m.key.as_str()).collect();
    entries.retain(|m| !keys.contains(m.key.as_str()));
    entries.extend(input.iter().cloned());
    repo.touch_item(id);
    StatusCode::OK
}

async fn list_item_bitstreams(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<Bitstream>>, StatusCode> {
    let repo = state.repo.read().await;
    if !repo.items.iter().any(|i| i.uuid == id) {
        return Err(StatusCode::NOT_FOUND);
    }
    let owned = repo.bitstreams.iter().filter(|b| b.item == Some(id)).cloned();
    Ok(Json(paginate(owned, &page)))
}

// --- bitstreams ---

async fn list_bitstreams(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> Json<Vec<Bitstream>> {
    let repo = state.repo.read().await;
    Json(paginate(repo.bitstreams.iter().cloned(), &page))
}

async fn get_bitstream(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Bitstream>, StatusCode> {
    let repo = state.repo.read().await;
    repo.bitstreams
        .iter()
        .find(|b| b.uuid == id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_bitstream(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.repo.write().await.remove_bitstream(id) {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn list_policies(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ResourcePolicy>>, StatusCode> {
    let repo = state.repo.read().await;
    repo.policies
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn add_policy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut input): Json<ResourcePolicy>,
) -> StatusCode {
    let mut repo = state.repo.write().await;
    if !repo.policies.contains_key(&id) {
        return StatusCode::NOT_FOUND;
    }
    repo.last_policy_id += 1;
    input.id = repo.last_policy_id;
    input.resource_id = Some(id.to_string());
    if let Some(policies) = repo.policies.get_mut(&id) {
        policies.push(input);
    }
    StatusCode::OK
}

async fn delete_policy(
    State(state): State<AppState>,
    Path((id, policy_id)): Path<(Uuid, i64)>,
) -> StatusCode {
    let mut repo = state.repo.write().await;
    let Some(policies) = repo.policies.get_mut(&id) else {
        return StatusCode::NOT_FOUND;
    };
    let before = policies.len();
    policies.retain(|p| p.id != policy_id);
    if policies.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}

// --- handles ---

async fn resolve_handle(
    State(state): State<AppState>,
    Path((prefix, suffix)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let handle = format!("{prefix}/{suffix}");
    let repo = state.repo.read().await;

    let found = repo
        .communities
        .iter()
        .find(|c| c.handle == handle)
        .map(|c| (c.uuid, "community", c.name.clone()))
        .or_else(|| {
            repo.collections
                .iter()
                .find(|c| c.handle == handle)
                .map(|c| (c.uuid, "collection", c.name.clone()))
        })
        .or_else(|| {
            repo.items
                .iter()
                .find(|i| i.handle == handle)
                .map(|i| (i.uuid, "item", i.name.clone()))
        });

    let (uuid, object_type, name) = found.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({
        "uuid": uuid,
        "type": object_type,
        "name": name,
        "handle": handle,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: &str) -> MetadataEntry {
        MetadataEntry {
            key: key.to_string(),
            value: value.to_string(),
            language: Some("en".to_string()),
        }
    }

    #[test]
    fn item_serializes_like_dspace() {
        let mut repo = Repository::default();
        let community = repo.add_community("Europe 2019", None);
        let collection = repo.add_collection(community.uuid, "Papers");
        let item = repo.add_item(collection.uuid, vec![entry("dc.title", "White paper")]);

        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["name"], "White paper");
        assert_eq!(json["type"], "item");
        assert_eq!(json["archived"], "true");
        assert_eq!(json["withdrawn"], "false");
        assert!(json["lastModified"].as_str().unwrap().contains(' '));
        assert!(json.get("collection").is_none());
    }

    #[test]
    fn adding_items_bumps_counters() {
        let mut repo = Repository::default();
        let community = repo.add_community("C", None);
        let collection = repo.add_collection(community.uuid, "Papers");
        repo.add_item(collection.uuid, Vec::new());
        repo.add_item(collection.uuid, Vec::new());
        assert_eq!(repo.collections[0].number_items, 2);
        assert_eq!(repo.communities[0].count_items, 2);
        assert_eq!(repo.items[0].name, "Untitled");
    }

    #[test]
    fn handles_are_sequential() {
        let mut repo = Repository::default();
        let a = repo.add_community("A", None);
        let b = repo.add_community("B", Some(a.uuid));
        assert_eq!(a.handle, "123456789/1");
        assert_eq!(b.handle, "123456789/2");
    }

    #[test]
    fn removing_item_drops_its_bitstreams_and_policies() {
        let mut repo = Repository::default();
        let community = repo.add_community("C", None);
        let collection = repo.add_collection(community.uuid, "Papers");
        let item = repo.add_item(collection.uuid, Vec::new());
        let bitstream = repo.add_bitstream(item.uuid, "report.pdf", 1024);

        assert!(repo.remove_item(item.uuid));
        assert!(repo.bitstreams.is_empty());
        assert!(!repo.policies.contains_key(&bitstream.uuid));
        assert!(!repo.remove_item(item.uuid));
    }

    #[test]
    fn session_cookie_is_found_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, "theme=dark; JSESSIONID=abc".parse().unwrap());
        assert_eq!(session_token(&headers).as_deref(), Some("abc"));
        assert_eq!(session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn page_defaults_to_hundred() {
        let page: Page = serde_json::from_str("{}").unwrap();
        assert_eq!(page.offset, 0);
        assert_eq!(page.limit, 100);
    }

    #[test]
    fn removing_items_lowers_counters() {
        let mut repo = Repository::default();
        let community = repo.add_community("C", None);
        let collection = repo.add_collection(community.uuid, "Papers");
        let first = repo.add_item(collection.uuid, Vec::new());
        repo.add_item(collection.uuid, Vec::new());

        assert!(repo.remove_item(first.uuid));
        assert_eq!(repo.collections[0].number_items, 1);
        assert_eq!(repo.communities[0].count_items, 1);
    }

    #[test]
    fn removing_collection_drops_items_and_counts() {
        let mut repo = Repository::default();
        let community = repo.add_community("C", None);
        let papers = repo.add_collection(community.uuid, "Papers");
        let theses = repo.add_collection(community.uuid, "Theses");
        repo.add_item(papers.uuid, Vec::new());
        repo.add_item(papers.uuid, Vec::new());
        repo.add_item(theses.uuid, Vec::new());

        assert!(repo.remove_collection(papers.uuid));
        assert_eq!(repo.items.len(), 1);
        assert_eq!(repo.communities[0].count_items, 1);
        assert!(!repo.remove_collection(papers.uuid));
    }

    #[test]
    fn removing_community_cascades_through_subtree() {
        let mut repo = Repository::default();
        let root = repo.add_community("Root", None);
        let child = repo.add_community("Child", Some(root.uuid));
        let grandchild = repo.add_community("Grandchild", Some(child.uuid));
        let other = repo.add_community("Other", None);
        let nested = repo.add_collection(grandchild.uuid, "Nested");
        let kept = repo.add_collection(other.uuid, "Kept");
        let item = repo.add_item(nested.uuid, Vec::new());
        repo.add_bitstream(item.uuid, "report.pdf", 10);
        repo.add_item(kept.uuid, Vec::new());

        assert!(repo.remove_community(root.uuid));
        let names: Vec<_> = repo.communities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Other"]);
        assert_eq!(repo.collections.len(), 1);
        assert_eq!(repo.collections[0].uuid, kept.uuid);
        assert_eq!(repo.items.len(), 1);
        assert!(repo.bitstreams.is_empty());
        assert!(!repo.remove_community(root.uuid));
    }
}
