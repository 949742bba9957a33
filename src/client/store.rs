use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::listing::{DEFAULT_PAGE_SIZE, PageRequest, Paginated};
use crate::models::{
    AdminAccount, Church, ChurchChanges, MessageResponse, NewChurch, NewPosition, NewSubject,
    NewUser, Position, PositionChanges, Subject, SubjectChanges, UserChanges, UserDetail,
};

use super::{ApiRequest, ClientError, ListQuery, Transport, call};

/// One CRUD resource as the API exposes it.
pub trait Resource: Send + Sync + 'static {
    /// Collection path under `/api`.
    const PATH: &'static str;

    type Item: DeserializeOwned + Clone + Send + Sync;
    type Create: Serialize + Send + Sync;
    type Update: Serialize + Send + Sync;

    fn id(item: &Self::Item) -> i64;
}

pub struct Churches;
pub struct Positions;
pub struct Subjects;
pub struct Workers;
pub struct Admins;
pub struct Users;

impl Resource for Churches {
    const PATH: &'static str = "/church";
    type Item = Church;
    type Create = NewChurch;
    type Update = ChurchChanges;

    fn id(item: &Church) -> i64 {
        item.id
    }
}

impl Resource for Positions {
    const PATH: &'static str = "/positions";
    type Item = Position;
    type Create = NewPosition;
    type Update = PositionChanges;

    fn id(item: &Position) -> i64 {
        item.id
    }
}

impl Resource for Subjects {
    const PATH: &'static str = "/subjects";
    type Item = Subject;
    type Create = NewSubject;
    type Update = SubjectChanges;

    fn id(item: &Subject) -> i64 {
        item.id
    }
}

impl Resource for Workers {
    const PATH: &'static str = "/users/workers";
    type Item = UserDetail;
    type Create = NewUser;
    type Update = UserChanges;

    fn id(item: &UserDetail) -> i64 {
        item.user.id
    }
}

impl Resource for Admins {
    const PATH: &'static str = "/users/admin";
    type Item = AdminAccount;
    type Create = NewUser;
    type Update = UserChanges;

    fn id(item: &AdminAccount) -> i64 {
        item.id
    }
}

impl Resource for Users {
    const PATH: &'static str = "/users";
    type Item = UserDetail;
    type Create = NewUser;
    type Update = UserChanges;

    fn id(item: &UserDetail) -> i64 {
        item.user.id
    }
}

/// Client-side cache of one resource: the current page, the selected item
/// and the state of the last operation.
pub struct ResourceStore<R: Resource, T: Transport> {
    transport: Arc<T>,
    pub items: Vec<R::Item>,
    pub current: Option<R::Item>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
    pub total_pages: i64,
    pub is_loading: bool,
    pub is_creating: bool,
    pub is_updating: bool,
    pub is_deleting: bool,
    pub error: Option<String>,
    _resource: PhantomData<R>,
}

impl<R: Resource, T: Transport> ResourceStore<R, T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            items: Vec::new(),
            current: None,
            total: 0,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            total_pages: 0,
            is_loading: false,
            is_creating: false,
            is_updating: false,
            is_deleting: false,
            error: None,
            _resource: PhantomData,
        }
    }

    fn item_path(id: i64) -> String {
        format!("{}/{}", R::PATH, id)
    }

    fn set_total(&mut self, total: i64) {
        let page = PageRequest {
            page: self.page,
            page_size: self.page_size.max(1),
        };
        self.total = total.max(0);
        self.total_pages = page.total_pages(self.total);
    }

    fn record<V>(&mut self, result: Result<V, ClientError>) -> Result<V, ClientError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                self.error = Some(err.message());
                Err(err)
            }
        }
    }

    /// Loads one page and replaces `items` with it.
    pub async fn fetch(&mut self, query: &ListQuery) -> Result<(), ClientError> {
        self.is_loading = true;
        self.error = None;

        let request = ApiRequest::get(R::PATH).with_query(query.pairs());
        let result = call::<Paginated<R::Item>, _>(self.transport.as_ref(), request).await;
        self.is_loading = false;

        let page = self.record(result)?;
        self.items = page.data;
        self.total = page.total;
        self.page = page.page;
        self.page_size = page.page_size;
        self.total_pages = page.total_pages;
        Ok(())
    }

    /// Loads one item into `current`.
    pub async fn get(&mut self, id: i64) -> Result<R::Item, ClientError> {
        self.is_loading = true;
        self.error = None;

        let request = ApiRequest::get(Self::item_path(id));
        let result = call::<R::Item, _>(self.transport.as_ref(), request).await;
        self.is_loading = false;

        let item = self.record(result)?;
        self.current = Some(item.clone());
        Ok(item)
    }

    pub async fn create(&mut self, payload: &R::Create) -> Result<R::Item, ClientError> {
        self.is_creating = true;
        self.error = None;

        let result = match ApiRequest::post(R::PATH).with_json(payload) {
            Ok(request) => call::<R::Item, _>(self.transport.as_ref(), request).await,
            Err(err) => Err(err),
        };
        self.is_creating = false;

        let item = self.record(result)?;
        self.items.push(item.clone());
        self.set_total(self.total + 1);
        Ok(item)
    }

    pub async fn update(&mut self, id: i64, changes: &R::Update) -> Result<R::Item, ClientError> {
        self.is_updating = true;
        self.error = None;

        let result = match ApiRequest::put(Self::item_path(id)).with_json(changes) {
            Ok(request) => call::<R::Item, _>(self.transport.as_ref(), request).await,
            Err(err) => Err(err),
        };
        self.is_updating = false;

        let item = self.record(result)?;
        if let Some(existing) = self.items.iter_mut().find(|existing| R::id(existing) == id) {
            *existing = item.clone();
        }
        if self.current.as_ref().is_some_and(|current| R::id(current) == id) {
            self.current = Some(item.clone());
        }
        Ok(item)
    }

    pub async fn delete(&mut self, id: i64) -> Result<String, ClientError> {
        self.is_deleting = true;
        self.error = None;

        let request = ApiRequest::delete(Self::item_path(id));
        let result = call::<MessageResponse, _>(self.transport.as_ref(), request).await;
        self.is_deleting = false;

        let response = self.record(result)?;
        let before = self.items.len();
        self.items.retain(|item| R::id(item) != id);
        if self.items.len() < before {
            self.set_total(self.total - 1);
        }
        self.current = None;
        Ok(response.message)
    }

    pub fn reset(&mut self) {
        let transport = Arc::clone(&self.transport);
        *self = Self::new(transport);
    }
}
