use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::{Result, RosterError};
use crate::fetcher::{PageRequest, PagedFetcher};
use crate::types::{CollectionSelector, Member, Page};

/// Member directory served by a pg_graphql (relay-style) endpoint.
pub struct GraphQl {
    client: Client,
    endpoint: String,
    api_key: String,
}

impl std::fmt::Debug for GraphQl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQl")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl From<reqwest::Error> for RosterError {
    fn from(err: reqwest::Error) -> Self {
        RosterError::Api(err.to_string())
    }
}

impl From<serde_json::Error> for RosterError {
    fn from(err: serde_json::Error) -> Self {
        RosterError::Api(format!("malformed response: {}", err))
    }
}

impl GraphQl {
    pub fn new(endpoint: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            endpoint,
            api_key,
        }
    }

    async fn post(&self, query: &str, variables: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(RosterError::Api(format!("GraphQL {}: {}", status, text)));
        }

        Ok(response.json().await?)
    }
}

fn collection_field(selector: CollectionSelector) -> &'static str {
    match selector {
        CollectionSelector::AllMembers => "memberCollection",
        CollectionSelector::MembersNotInFamily => "memberNotInFamilyCollection",
    }
}

const MEMBER_FIELDS: &str = "id name phoneNumber profileImage email createdAt";

fn build_query(selector: CollectionSelector, search: bool) -> String {
    let field = collection_field(selector);
    let (params, filter) = if search {
        (
            ", $term: String!",
            ", filter: {or: [{name: {ilike: $term}}, {phoneNumber: {ilike: $term}}]}",
        )
    } else {
        ("", "")
    };
    format!(
        "query Members($first: Int!, $after: Cursor{params}) {{ \
         {field}(first: $first, after: $after{filter}, orderBy: [{{createdAt: DescNullsLast}}]) {{ \
         edges {{ node {{ {MEMBER_FIELDS} }} }} \
         pageInfo {{ hasNextPage endCursor }} }} }}"
    )
}

/// `%query%` for an `ilike` match, with LIKE wildcards in the query escaped.
fn ilike_term(query: &str) -> String {
    let mut term = String::with_capacity(query.len() + 2);
    term.push('%');
    for c in query.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            term.push('\\');
        }
        term.push(c);
    }
    term.push('%');
    term
}

// GraphQL response types

#[derive(Deserialize)]
struct GqlError {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlConnection {
    #[serde(default)]
    edges: Vec<GqlEdge>,
    page_info: Option<GqlPageInfo>,
}

#[derive(Deserialize)]
struct GqlEdge {
    node: GqlMember,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlPageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlMember {
    id: Option<String>,
    name: Option<String>,
    phone_number: Option<String>,
    profile_image: Option<String>,
    email: Option<String>,
    created_at: Option<String>,
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|n| n.and_utc())
        })
}

fn parse_page(body: Value, field: &str) -> Result<Page<Member>> {
    if let Some(errors) = body.get("errors").filter(|e| !e.is_null()) {
        let errors: Vec<GqlError> = serde_json::from_value(errors.clone())?;
        if let Some(first) = errors.into_iter().next() {
            return Err(RosterError::Api(first.message));
        }
    }

    let connection = match body.get("data").and_then(|d| d.get(field)) {
        Some(Value::Null) | None => {
            return Err(RosterError::Api(format!("response has no {}", field)))
        }
        Some(value) => serde_json::from_value::<GqlConnection>(value.clone())?,
    };

    // Rows without an id or name can't be selected.
    let items = connection
        .edges
        .into_iter()
        .filter_map(|edge| {
            let m = edge.node;
            Some(Member {
                id: m.id?,
                name: m.name?,
                phone_number: m.phone_number.unwrap_or_default(),
                profile_image: m.profile_image.unwrap_or_default(),
                email: m.email.unwrap_or_default(),
                joined_at: m.created_at.as_deref().and_then(parse_datetime),
            })
        })
        .collect();

    let (has_next_page, end_cursor) = connection
        .page_info
        .map(|p| (p.has_next_page, p.end_cursor))
        .unwrap_or((false, None));

    Ok(Page {
        items,
        has_next_page,
        end_cursor,
    })
}

#[async_trait]
impl PagedFetcher<Member> for GraphQl {
    fn name(&self) -> &str {
        "GraphQL"
    }

    async fn recent_page(&self, request: &PageRequest) -> Result<Page<Member>> {
        let query = build_query(request.selector, false);
        let variables = json!({ "first": request.limit, "after": request.cursor });
        let body = self.post(&query, variables).await?;
        parse_page(body, collection_field(request.selector))
    }

    async fn search_page(&self, query: &str, request: &PageRequest) -> Result<Page<Member>> {
        let gql = build_query(request.selector, true);
        let variables = json!({
            "first": request.limit,
            "after": request.cursor,
            "term": ilike_term(query),
        });
        let body = self.post(&gql, variables).await?;
        parse_page(body, collection_field(request.selector))
    }
}
