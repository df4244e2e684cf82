//! Generic CRUD pipeline over an [`EntityStore`], specialized per entity by [`EntityHooks`].

use crate::error::AppError;
use crate::events::{emit, DomainEvent, EventSink};
use crate::hooks::EntityHooks;
use crate::models::{decode, decode_all};
use crate::response::Paging;
use crate::schema::{CREATED_AT, PRIMARY_KEY};
use crate::service::validation::Mode;
use crate::sort::{Direction, SortResolver};
use crate::store::{EntityStore, FindMany, Record};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Query parameters that drive paging and sorting rather than filtering.
const CONTROL_PARAMS: [&str; 6] = ["page", "page_size", "sort_by", "sort", "sort_order", "order"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub key: String,
    pub direction: Direction,
}

/// A list request split into entity filters and paging/sort controls.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListRequest {
    pub filters: HashMap<String, String>,
    pub sort: Option<SortSpec>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl ListRequest {
    /// From snake_cased query parameters. Unparseable paging values count as absent.
    pub fn from_params(mut params: HashMap<String, String>) -> Self {
        let page = params.get("page").and_then(|s| s.trim().parse().ok());
        let page_size = params.get("page_size").and_then(|s| s.trim().parse().ok());
        let key = params
            .get("sort_by")
            .or_else(|| params.get("sort"))
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let direction = Direction::parse(
            params
                .get("sort_order")
                .or_else(|| params.get("order"))
                .map(String::as_str),
        );
        for p in CONTROL_PARAMS {
            params.remove(p);
        }
        ListRequest {
            filters: params,
            sort: key.map(|key| SortSpec { key, direction }),
            page,
            page_size,
        }
    }
}

/// `(page, page_size)` with page floored at 1 and page size clamped to `1..=100`.
pub fn clamp_paging(page: Option<i64>, page_size: Option<i64>) -> (u32, u32) {
    let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
    let size = page_size
        .unwrap_or(DEFAULT_PAGE_SIZE as i64)
        .clamp(1, MAX_PAGE_SIZE as i64) as u32;
    (page, size)
}

#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn paging(&self) -> Paging {
        Paging {
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }
}

/// One engine per entity type. Cheap to share behind an `Arc`.
pub struct CrudEngine<H: EntityHooks> {
    hooks: H,
    store: Arc<dyn EntityStore>,
    events: Arc<dyn EventSink>,
    sorter: Arc<SortResolver>,
}

impl<H: EntityHooks> CrudEngine<H> {
    pub fn new(
        hooks: H,
        store: Arc<dyn EntityStore>,
        events: Arc<dyn EventSink>,
        sorter: Arc<SortResolver>,
    ) -> Self {
        CrudEngine {
            hooks,
            store,
            events,
            sorter,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    pub async fn list(&self, request: &ListRequest) -> Result<Page<H::Dto>, AppError> {
        let kind = self.hooks.kind();
        let (page, page_size) = clamp_paging(request.page, request.page_size);
        let filter = self.hooks.build_filter(&request.filters)?;
        let query = FindMany::new(filter.clone())
            .includes(self.hooks.relations())
            .offset((page as u64 - 1) * page_size as u64)
            .limit(page_size as u64);

        let (total, rows) = tokio::try_join!(
            self.store.count(kind, &filter),
            self.store.find_many(kind, &query)
        )?;
        let records: Vec<H::Record> = decode_all(kind, rows)?;
        let mut items = self.hooks.project_many(&records);
        if let Some(sort) = &request.sort {
            items = self.sorter.sorted(&items, &sort.key, sort.direction);
        }
        tracing::debug!(entity = %kind, total, page, page_size, "list");
        Ok(Page {
            items,
            total,
            page,
            page_size,
            total_pages: total.div_ceil(page_size as u64),
        })
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<H::Dto>, AppError> {
        let kind = self.hooks.kind();
        let Some(row) = self.store.find_one(kind, id, &self.hooks.relations()).await? else {
            return Ok(None);
        };
        let record: H::Record = decode(kind, row)?;
        Ok(Some(self.hooks.project_one(&record)))
    }

    /// Strip system fields, validate and normalize. Shared with the scheduler so that
    /// coordinated creates run the same pipeline as plain ones.
    pub fn prepare(&self, mut input: Record, mode: Mode) -> Result<Record, AppError> {
        input.remove(PRIMARY_KEY);
        input.remove(CREATED_AT);
        self.hooks.validate(&input, mode)?;
        Ok(self.hooks.normalize_input(input))
    }

    pub async fn create(&self, input: Record) -> Result<H::Dto, AppError> {
        let kind = self.hooks.kind();
        let data = self.prepare(input, Mode::Create)?;
        let row = self.store.create(kind, &data, &self.hooks.relations()).await?;
        let id = row.get(PRIMARY_KEY).and_then(Value::as_i64);
        let record: H::Record = decode(kind, row)?;
        let dto = self.hooks.project_one(&record);
        if let Err(e) = self.hooks.after_create(self.events.as_ref(), &record).await {
            tracing::warn!(entity = %kind, error = %e, "after_create hook failed");
        }
        if let Some(id) = id {
            emit(self.events.as_ref(), DomainEvent::Created { kind, id });
        }
        Ok(dto)
    }

    /// Partial update: only the fields present are validated and written. The previous row
    /// is read in the same transaction and handed to `after_update`.
    pub async fn update(&self, id: i64, input: Record) -> Result<H::Dto, AppError> {
        let kind = self.hooks.kind();
        let data = self.prepare(input, Mode::Update)?;
        let relations = self.hooks.relations();
        if data.is_empty() {
            let row = self
                .store
                .find_one(kind, id, &relations)
                .await?
                .ok_or_else(|| AppError::not_found(kind, id))?;
            let record: H::Record = decode(kind, row)?;
            return Ok(self.hooks.project_one(&record));
        }

        let mut tx = self.store.begin().await?;
        let before = tx
            .find_one(kind, id, &[])
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))?;
        let after = tx
            .update(kind, id, &data, &relations)
            .await?
            .ok_or_else(|| AppError::not_found(kind, id))?;
        tx.commit().await?;

        let before: H::Record = decode(kind, before)?;
        let record: H::Record = decode(kind, after)?;
        if let Err(e) = self.hooks.after_update(self.events.as_ref(), &before, &record).await {
            tracing::warn!(entity = %kind, id, error = %e, "after_update hook failed");
        }
        emit(self.events.as_ref(), DomainEvent::Updated { kind, id });
        Ok(self.hooks.project_one(&record))
    }

    /// Guard, then delete, in one transaction. Returns the deleted id.
    pub async fn delete(&self, id: i64) -> Result<i64, AppError> {
        let kind = self.hooks.kind();
        let mut tx = self.store.begin().await?;
        if tx.find_one(kind, id, &[]).await?.is_none() {
            return Err(AppError::not_found(kind, id));
        }
        self.hooks.before_delete(&mut *tx, id).await?;
        if tx.delete(kind, id).await?.is_none() {
            return Err(AppError::not_found(kind, id));
        }
        tx.commit().await?;
        emit(self.events.as_ref(), DomainEvent::Deleted { kind, id });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn paging_is_clamped() {
        assert_eq!(clamp_paging(None, None), (1, 10));
        assert_eq!(clamp_paging(Some(0), Some(0)), (1, 1));
        assert_eq!(clamp_paging(Some(-4), Some(500)), (1, 100));
        assert_eq!(clamp_paging(Some(3), Some(25)), (3, 25));
    }

    #[test]
    fn list_request_separates_controls_from_filters() {
        let req = ListRequest::from_params(params(&[
            ("page", "2"),
            ("page_size", "abc"),
            ("sort_by", "price"),
            ("order", "DESC"),
            ("species", "dog"),
        ]));
        assert_eq!(req.page, Some(2));
        assert_eq!(req.page_size, None);
        assert_eq!(
            req.sort,
            Some(SortSpec {
                key: "price".into(),
                direction: Direction::Desc
            })
        );
        assert_eq!(req.filters, params(&[("species", "dog")]));
    }

    #[test]
    fn blank_sort_key_means_store_order() {
        let req = ListRequest::from_params(params(&[("sort", "  "), ("sort_order", "desc")]));
        assert_eq!(req.sort, None);
        assert!(req.filters.is_empty());
    }

    #[test]
    fn page_exposes_envelope_paging() {
        let page = Page {
            items: vec![1, 2],
            total: 12,
            page: 2,
            page_size: 10,
            total_pages: 2,
        };
        assert_eq!(
            page.paging(),
            Paging {
                total: 12,
                page: 2,
                page_size: 10,
                total_pages: 2
            }
        );
    }
}
