//! Paged entity queries against the workspace API.

use log::debug;
use reqwest::StatusCode;
use serde_json::Value;
use url::Url;

use super::core::{data_array, expect_status, read_json, MqmClient};
use crate::error::{MqmError, Result};
use crate::types::{ListItem, PagedList, Release, Taxonomy};

const URI_RELEASES: &str = "releases";
const URI_TAXONOMY_NODES: &str = "taxonomy_nodes";
const URI_LIST_ITEMS: &str = "list_nodes";

const TAXONOMY_ITEM_NODE: &str = "taxonomy_item_node";
const TAXONOMY_CATEGORY_NODE: &str = "taxonomy_category_node";

const ENTITY_CONTEXT: &str = "Failed to obtain entities";

/// Builds a value from one entity object of a query response.
pub trait EntityFactory: Sized {
    fn from_entity(entity: &Value) -> Result<Self>;
}

impl EntityFactory for Release {
    fn from_entity(entity: &Value) -> Result<Self> {
        Ok(Self {
            id: required_i64(entity, "id")?,
            name: required_str(entity, "name")?,
        })
    }
}

impl EntityFactory for ListItem {
    fn from_entity(entity: &Value) -> Result<Self> {
        Ok(Self {
            id: required_i64(entity, "id")?,
            name: required_str(entity, "name")?,
        })
    }
}

impl EntityFactory for Taxonomy {
    /// Follows `taxonomy_root` to build the parent chain; a node without one is a root.
    fn from_entity(entity: &Value) -> Result<Self> {
        let parent = match entity.get("taxonomy_root") {
            Some(root) if root.is_object() => Some(Self::from_entity(root)?),
            _ => None,
        };
        Ok(Self::new(
            Some(required_i64(entity, "id")?),
            Some(required_str(entity, "name")?),
            parent,
        ))
    }
}

impl MqmClient {
    /// Releases whose name contains `name`.
    pub async fn query_releases(
        &self,
        name: Option<&str>,
        workspace_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<PagedList<Release>> {
        let conditions: Vec<String> = name_condition(name).into_iter().collect();
        let uri = self.entity_uri(URI_RELEASES, &conditions, workspace_id, offset, limit)?;
        self.get_entities(uri, offset).await
    }

    /// Taxonomy items, optionally restricted to one category.
    pub async fn query_taxonomy_items(
        &self,
        taxonomy_root_id: Option<i64>,
        name: Option<&str>,
        workspace_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<PagedList<Taxonomy>> {
        let mut conditions: Vec<String> = name_condition(name).into_iter().collect();
        if let Some(root_id) = taxonomy_root_id {
            conditions.push(condition("taxonomy_root.id", &root_id.to_string()));
        }
        conditions.push(condition("subtype", TAXONOMY_ITEM_NODE));

        let uri = self.entity_uri(URI_TAXONOMY_NODES, &conditions, workspace_id, offset, limit)?;
        self.get_entities(uri, offset).await
    }

    /// Taxonomy categories whose name contains `name`.
    pub async fn query_taxonomy_categories(
        &self,
        name: Option<&str>,
        workspace_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<PagedList<Taxonomy>> {
        let mut conditions: Vec<String> = name_condition(name).into_iter().collect();
        conditions.push(condition("subtype", TAXONOMY_CATEGORY_NODE));

        let uri = self.entity_uri(URI_TAXONOMY_NODES, &conditions, workspace_id, offset, limit)?;
        self.get_entities(uri, offset).await
    }

    /// Taxonomy nodes of any kind matching `name` on themselves or their category.
    pub async fn query_taxonomies(
        &self,
        name: Option<&str>,
        workspace_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<PagedList<Taxonomy>> {
        let conditions: Vec<String> = non_empty(name)
            .map(|name| {
                any_of(&[
                    condition("name", &wildcard(name)),
                    condition("taxonomy_root.name", &wildcard(name)),
                ])
            })
            .into_iter()
            .collect();

        let uri = self.entity_uri(URI_TAXONOMY_NODES, &conditions, workspace_id, offset, limit)?;
        self.get_entities(uri, offset).await
    }

    /// Values of one list.
    pub async fn query_list_items(
        &self,
        list_id: i64,
        name: Option<&str>,
        workspace_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<PagedList<ListItem>> {
        let mut conditions: Vec<String> = name_condition(name).into_iter().collect();
        conditions.push(condition("list_root.id", &list_id.to_string()));

        let uri = self.entity_uri(URI_LIST_ITEMS, &conditions, workspace_id, offset, limit)?;
        self.get_entities(uri, offset).await
    }

    fn entity_uri(
        &self,
        template: &str,
        conditions: &[String],
        workspace_id: i64,
        offset: usize,
        limit: usize,
    ) -> Result<Url> {
        let mut uri = self.config.workspace_api_uri(workspace_id, template, &[])?;
        {
            let mut query = uri.query_pairs_mut();
            if !conditions.is_empty() {
                query.append_pair("query", &format!("\"{}\"", conditions.join(";")));
            }
            query
                .append_pair("offset", &offset.to_string())
                .append_pair("limit", &limit.to_string());
        }
        Ok(uri)
    }

    async fn get_entities<T: EntityFactory>(&self, uri: Url, offset: usize) -> Result<PagedList<T>> {
        debug!("GET {uri}");
        let response = self
            .execute(self.http.get(uri), "Cannot retrieve entities from MQM")
            .await?;
        let response = expect_status(response, StatusCode::OK, "Entity retrieval failed").await?;

        let json = read_json(response, ENTITY_CONTEXT).await?;
        let items = data_array(&json, ENTITY_CONTEXT)?
            .iter()
            .map(T::from_entity)
            .collect::<Result<Vec<_>>>()?;
        let total_count = json
            .get("total_count")
            .and_then(Value::as_u64)
            .map_or(items.len(), |count| count as usize);

        Ok(PagedList {
            items,
            offset,
            total_count,
        })
    }
}

/// `field='value'` with backslashes and quotes escaped.
pub(crate) fn condition(field: &str, value: &str) -> String {
    format!("{field}='{}'", escape_query_value(value))
}

/// Joins conditions into a single OR group.
pub(crate) fn any_of(conditions: &[String]) -> String {
    conditions.join("||")
}

fn name_condition(name: Option<&str>) -> Option<String> {
    non_empty(name).map(|name| condition("name", &wildcard(name)))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn wildcard(value: &str) -> String {
    format!("*{value}*")
}

fn escape_query_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '\'' | '"') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn required_i64(entity: &Value, key: &str) -> Result<i64> {
    entity
        .get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| MqmError::invalid_response(ENTITY_CONTEXT, format!("missing numeric '{key}'")))
}

fn required_str(entity: &Value, key: &str) -> Result<String> {
    entity
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| MqmError::invalid_response(ENTITY_CONTEXT, format!("missing string '{key}'")))
}
