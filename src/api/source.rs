use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use super::client::ApiClient;
use super::error::ApiError;
use super::normalize::Page;
use crate::models::DonationFilter;

/// Where a query controller gets its pages from.
#[async_trait]
pub trait ListSource: Send + Sync + 'static {
    /// Query identity. A change of params is a new query.
    type Params: Clone + PartialEq + fmt::Debug + Send + Sync + 'static;
    type Item: Clone + Send + Sync + 'static;

    async fn fetch_page(
        &self,
        params: &Self::Params,
        offset: usize,
        page_size: usize,
    ) -> Result<Page<Self::Item>, ApiError>;
}

/// Filter types that can be sent as list query parameters.
pub trait ListParams {
    fn to_query(&self) -> Vec<(String, String)>;
}

impl ListParams for DonationFilter {
    fn to_query(&self) -> Vec<(String, String)> {
        DonationFilter::to_query(self)
    }
}

impl ListParams for () {
    fn to_query(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

impl ListParams for Vec<(String, String)> {
    fn to_query(&self) -> Vec<(String, String)> {
        self.clone()
    }
}

/// A REST list endpoint whose items deserialize into `T`.
pub struct EndpointSource<P, T> {
    client: ApiClient,
    path: String,
    _marker: PhantomData<fn(P) -> T>,
}

impl<P, T> EndpointSource<P, T> {
    pub fn new(client: ApiClient, path: impl Into<String>) -> Self {
        Self {
            client,
            path: path.into(),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl<P, T> ListSource for EndpointSource<P, T>
where
    P: ListParams + Clone + PartialEq + fmt::Debug + Send + Sync + 'static,
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    type Params = P;
    type Item = T;

    async fn fetch_page(
        &self,
        params: &P,
        offset: usize,
        page_size: usize,
    ) -> Result<Page<T>, ApiError> {
        let query = params.to_query();
        self.client
            .fetch_list(&self.path, &query, offset, page_size)
            .await?
            .decode()
    }
}
