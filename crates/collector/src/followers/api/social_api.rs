//! Provider API client
//!
//! Typed access to the three endpoints the pipeline consumes:
//! - follower id listing (cursor paginated)
//! - batch user lookup
//! - follower count for progress estimation

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use tracing::debug;
use url::Url;

use crate::followers::api::executor::RequestExecutor;
use crate::followers::core::{
    ApiRequest, CollectorError, FollowerId, FollowerRecord, JoinedAt, Result,
};

pub const FOLLOWER_IDS_PATH: &str = "1.1/followers/ids.json";
pub const USERS_LOOKUP_PATH: &str = "1.1/users/lookup.json";
pub const USERS_SHOW_PATH: &str = "1.1/users/show.json";

/// Opaque listing cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor(i64);

impl Cursor {
    /// Sentinel that requests the first page
    pub const INITIAL: Cursor = Cursor(-1);
    /// Sentinel that marks the end of pagination
    pub const TERMINAL: Cursor = Cursor(0);

    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn is_terminal(&self) -> bool {
        *self == Cursor::TERMINAL
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An id as the provider may send it: a JSON number or a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum WireId {
    Number(u64),
    Text(String),
}

impl From<WireId> for FollowerId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => FollowerId::from(n),
            WireId::Text(s) => FollowerId::from(s),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireIdsPage {
    #[serde(default)]
    ids: Vec<WireId>,
    #[serde(default)]
    next_cursor: i64,
}

/// One page of the follower id listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowerIdsPage {
    pub ids: Vec<FollowerId>,
    pub next_cursor: Cursor,
}

impl FollowerIdsPage {
    /// The page served for a missing listing: empty and final
    pub fn empty() -> Self {
        Self {
            ids: Vec::new(),
            next_cursor: Cursor::TERMINAL,
        }
    }
}

/// A user object from the batch lookup endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct LookupUser {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub id_str: Option<String>,
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl LookupUser {
    /// Text id, preferring `id_str` over the lossy numeric field
    pub fn follower_id(&self) -> Option<FollowerId> {
        self.id_str
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(FollowerId::from)
            .or_else(|| self.id.map(FollowerId::from))
    }

    /// Convert to a store record stamped with `resolved_at`
    pub fn into_record(self, resolved_at: DateTime<Utc>) -> Option<FollowerRecord> {
        let id = self.follower_id()?;
        let joined_at = self
            .created_at
            .as_deref()
            .map(JoinedAt::parse)
            .unwrap_or(JoinedAt::Unknown);

        Some(FollowerRecord {
            id,
            screen_name: self.screen_name,
            display_name: self.name,
            followers_count: self.followers_count,
            joined_at,
            resolved_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct UserCount {
    #[serde(default)]
    followers_count: u64,
}

/// Typed client for the provider API
#[derive(Clone)]
pub struct SocialApi {
    executor: RequestExecutor,
    base: Url,
}

impl SocialApi {
    pub fn new(executor: RequestExecutor) -> Result<Self> {
        let base = executor.config().api_base_url()?;
        Ok(Self { executor, base })
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Fetch one page of follower ids for `handle`
    pub async fn follower_ids_page(&self, handle: &str, cursor: Cursor) -> Result<FollowerIdsPage> {
        let request = ApiRequest::new(&self.base, FOLLOWER_IDS_PATH)?
            .with_query("screen_name", handle)
            .with_query("cursor", cursor)
            .with_query("count", self.executor.config().effective_page_size())
            .with_query("stringify_ids", "true");

        let page: Option<WireIdsPage> = self.get_json(&request).await?;
        Ok(match page {
            Some(page) => FollowerIdsPage {
                ids: page.ids.into_iter().map(FollowerId::from).collect(),
                next_cursor: Cursor::new(page.next_cursor),
            },
            None => {
                debug!("No follower listing for @{}", handle);
                FollowerIdsPage::empty()
            }
        })
    }

    /// Resolve a batch of ids to user objects
    ///
    /// Deleted or suspended accounts are simply absent from the result.
    pub async fn lookup_users(&self, ids: &[FollowerId]) -> Result<Vec<LookupUser>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids.iter().map(FollowerId::as_str).collect::<Vec<_>>().join(",");
        let request = ApiRequest::new(&self.base, USERS_LOOKUP_PATH)?.with_query("user_id", joined);

        let users: Option<Vec<LookupUser>> = self.get_json(&request).await?;
        Ok(users.unwrap_or_default())
    }

    /// Current follower count of `handle`, or `None` if the account is missing
    pub async fn followers_count(&self, handle: &str) -> Result<Option<u64>> {
        let request = ApiRequest::new(&self.base, USERS_SHOW_PATH)?.with_query("screen_name", handle);
        let user: Option<UserCount> = self.get_json(&request).await?;
        Ok(user.map(|u| u.followers_count))
    }

    async fn get_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<Option<T>> {
        let Some(response) = self.executor.execute(request).await? else {
            return Ok(None);
        };

        serde_json::from_str(&response.body)
            .map(Some)
            .map_err(|e| CollectorError::InvalidResponse {
                url: request.to_string(),
                reason: e.to_string(),
                body: response.body.chars().take(512).collect(),
            })
    }
}
