//! Paginated fetching over the retrying HTTP client
//!
//! A fetch session walks the pages of one [`FetchRequest`] lazily. Each page
//! goes through [`HttpClient::request`] and therefore inherits the full retry
//! policy; the first failure that survives retries ends the stream.

use super::strategies::CursorPaginator;
use super::types::{FetchRequest, NextPage, Page, PaginationState, Paginator};
use crate::decode::{JsonDecoder, RecordDecoder};
use crate::error::{Error, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::types::StringMap;
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Fetches every page of a listing endpoint
#[derive(Clone)]
pub struct PaginatedFetcher {
    client: HttpClient,
    paginator: Arc<dyn Paginator>,
    decoder: Arc<dyn RecordDecoder>,
}

impl PaginatedFetcher {
    /// Cursor pagination over `results`, the shape of every CRM v3 listing
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            paginator: Arc::new(CursorPaginator::default()),
            decoder: Arc::new(JsonDecoder::default()),
        }
    }

    /// Use a different pagination strategy
    #[must_use]
    pub fn with_paginator(mut self, paginator: impl Paginator + 'static) -> Self {
        self.paginator = Arc::new(paginator);
        self
    }

    /// Use a different record extractor
    #[must_use]
    pub fn with_decoder(mut self, decoder: impl RecordDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// The underlying client
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// Lazily yield pages in server order.
    ///
    /// The stream ends after the page without a next cursor, after the page
    /// that reaches `request.limit`, or right after the first `Err`.
    pub fn fetch_all(&self, request: FetchRequest) -> impl Stream<Item = Result<Page>> {
        let session = FetchSession::new(self.clone(), request);

        stream::try_unfold(session, |mut session| async move {
            Ok(session.next_page().await?.map(|page| (page, session)))
        })
    }

    /// Fetch every page and concatenate the records
    pub async fn collect_records(&self, request: FetchRequest) -> Result<Vec<Value>> {
        let pages: Vec<Page> = self.fetch_all(request).try_collect().await?;
        Ok(pages.into_iter().flat_map(|page| page.records).collect())
    }
}

impl std::fmt::Debug for PaginatedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaginatedFetcher")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

/// Where the next request goes
#[derive(Debug, Clone)]
enum Target {
    /// First page: request query plus the paginator's initial params
    Initial,
    /// Same URL with cursor params merged over the request query
    Params(StringMap),
    /// Absolute next link, used as-is
    Url(String),
}

struct FetchSession {
    fetcher: PaginatedFetcher,
    request: FetchRequest,
    state: PaginationState,
    target: Target,
    index: usize,
    fetched: usize,
    done: bool,
}

impl FetchSession {
    fn new(fetcher: PaginatedFetcher, request: FetchRequest) -> Self {
        Self {
            fetcher,
            request,
            state: PaginationState::new(),
            target: Target::Initial,
            index: 0,
            fetched: 0,
            done: false,
        }
    }

    fn remaining(&self) -> Option<usize> {
        self.request
            .limit
            .map(|limit| limit.saturating_sub(self.fetched))
    }

    fn request_config(&self) -> (String, RequestConfig) {
        let mut config = RequestConfig::new();
        if let Some(ref body) = self.request.body {
            config = config.json(body.clone());
        }

        match &self.target {
            Target::Initial => {
                let initial = self.fetcher.paginator.initial_params(&self.state);
                let config = config.queries(&self.request.query).queries(&initial);
                (self.request.url.clone(), config)
            }
            Target::Params(params) => {
                let config = config.queries(&self.request.query).queries(params);
                (self.request.url.clone(), config)
            }
            Target::Url(url) => (url.clone(), config),
        }
    }

    async fn next_page(&mut self) -> Result<Option<Page>> {
        if self.done || self.remaining() == Some(0) {
            return Ok(None);
        }

        let (url, config) = self.request_config();
        let previous_cursor = self.state.cursor.clone();

        let response = self
            .fetcher
            .client
            .request(self.request.method, &url, config)
            .await?;
        let mut records = self.fetcher.decoder.records(&response.body)?;

        let next = self.fetcher.paginator.process_response(
            &response.body,
            &response.headers,
            records.len(),
            &mut self.state,
        );

        if let Some(remaining) = self.remaining() {
            if records.len() >= remaining {
                records.truncate(remaining);
                self.done = true;
            }
        }
        self.fetched += records.len();

        let next_cursor = match next {
            NextPage::Done => {
                self.done = true;
                None
            }
            NextPage::Continue { query_params, url } => {
                let cursor = self.state.cursor.clone();
                if cursor.is_some() && cursor == previous_cursor {
                    return Err(Error::malformed(format!(
                        "cursor did not advance after page {} of {}",
                        self.index, self.request.url
                    )));
                }
                // next links must be absolute
                self.target = match url {
                    Some(link) => Target::Url(url::Url::parse(&link)?.into()),
                    None => Target::Params(query_params),
                };
                cursor
            }
        };

        info!(
            "Fetched page {} from {} ({} records, {} total)",
            self.index + 1,
            self.request.url,
            records.len(),
            self.fetched
        );
        if let Some(ref cursor) = next_cursor {
            debug!("Next cursor: {cursor}");
        }

        let page = Page {
            index: self.index,
            records,
            next_cursor,
        };
        self.index += 1;
        Ok(Some(page))
    }
}
