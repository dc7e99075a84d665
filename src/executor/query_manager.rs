use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use serde::{Serialize, Deserialize};
use crate::core::config::Config;
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{Handle, PackedObject};
use crate::executor::activity::{ActivityEntry, ActivityLog};
use crate::executor::distinct::distinct_by_projection;
use crate::executor::ordering::{check_order_by, order_selection, Selection};
use crate::executor::pivot::{compute_pivot, PivotLevel, PivotRequest};
use crate::query::ast::{AndQuery, OrQuery};
use crate::query::matcher::ObjectMatcher;
use crate::query::optimizer::optimize_query;
use crate::query::planner::QueryPlanner;
use crate::query::types::{ExecutionPlan, IndexUse, OrderingStrategy, SortOrder, Strategy};
use crate::schema::schema::IndexType;
use crate::store::DataStore;
use crate::transaction::response::{EvalResponse, Response};

/// Read requests served by the query manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryRequest {
    Get(OrQuery),
    Eval(OrQuery),
    Pivot(PivotRequest),
}

impl QueryRequest {
    pub fn collection(&self) -> &str {
        match self {
            QueryRequest::Get(query) | QueryRequest::Eval(query) => &query.collection,
            QueryRequest::Pivot(request) => &request.query.collection,
        }
    }
}

type RequestedOrder<'q> = Option<(&'q str, SortOrder)>;

/// Plans and executes queries against one collection.
///
/// Performs no locking: the caller holds a read guard on the store for the whole call.
pub struct QueryManager<'a> {
    store: &'a DataStore,
    config: &'a Config,
    activity: Option<&'a ActivityLog>,
}

impl<'a> QueryManager<'a> {
    pub fn new(store: &'a DataStore, config: &'a Config) -> Self {
        QueryManager { store, config, activity: None }
    }

    pub fn with_activity_log(mut self, activity: &'a ActivityLog) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn process_query(&self, query: &OrQuery) -> Result<Vec<Arc<PackedObject>>> {
        self.process_query_with_plan(query).map(|(objects, _)| objects)
    }

    /// Execute `query` and return the objects together with the plan that produced them
    pub fn process_query_with_plan(&self, query: &OrQuery) -> Result<(Vec<Arc<PackedObject>>, ExecutionPlan)> {
        let started = Instant::now();
        let query = self.prepare(query)?;

        let (handles, mut plan) = self.resolve(&query)?;
        let objects = self.post_process(&query, handles);

        plan.distinct = query.distinct;
        plan.take = query.take;
        plan.result_count = objects.len();
        plan.elapsed = started.elapsed();

        tracing::debug!(collection = %query.collection, query = %query, plan = %plan, "query processed");
        self.record_activity(&query, &plan);
        Ok((objects, plan))
    }

    /// Count the matches and report whether the loaded domain answers the query completely
    pub fn eval(&self, query: &OrQuery) -> Result<EvalResponse> {
        let mut query = query.clone();
        query.only_if_complete = false;
        query.order_by = None;

        let count = self.process_query(&query)?.len();
        let complete = self.store.domain().is_some_and(|domain| domain.covers(&query));
        Ok(EvalResponse { count, complete })
    }

    pub fn pivot(&self, request: &PivotRequest) -> Result<PivotLevel> {
        let objects = self.process_query(&request.query)?;
        compute_pivot(self.store.schema(), &objects, request, self.config.pivot_shards)
    }

    /// Handles of every object `query` selects; used by remove-many requests
    pub fn select_handles(&self, query: &OrQuery) -> Result<RoaringBitmap> {
        let objects = self.process_query(query)?;
        Ok(objects
            .iter()
            .filter_map(|object| self.store.handle_of(&object.primary_key))
            .collect())
    }

    /// Request boundary: every failure becomes an exception response
    pub fn handle(&self, request: &QueryRequest) -> Response {
        let response = match request {
            QueryRequest::Get(query) if query.count_only => {
                self.process_query(query).map(|objects| Response::ItemsCount(objects.len()))
            }
            QueryRequest::Get(query) => self
                .process_query(query)
                .map(|objects| Response::Items(objects.iter().map(|o| o.as_ref().clone()).collect())),
            QueryRequest::Eval(query) => self.eval(query).map(Response::Eval),
            QueryRequest::Pivot(request) => self.pivot(request).map(Response::Pivot),
        };
        response.unwrap_or_else(|err| {
            tracing::warn!(collection = %request.collection(), error = %err, "query failed");
            Response::from(err)
        })
    }

    /// Optimize a copy of the query and reject what can not be executed
    fn prepare(&self, query: &OrQuery) -> Result<OrQuery> {
        if query.collection != self.store.name() {
            return Err(Error::unknown_collection(&query.collection));
        }

        let mut query = query.clone();
        optimize_query(&mut query)?;

        let schema = self.store.schema();
        let properties = query
            .elements
            .iter()
            .flat_map(|and| and.elements.iter().map(|atomic| &atomic.property))
            .chain(&query.selected_properties);
        for property in properties {
            if schema.slot(property).is_none() {
                return Err(Error::new(
                    ErrorKind::UnsupportedQuery,
                    format!("Unknown property '{}' in '{}'", property, schema.name),
                ));
            }
        }

        if let Some(property) = &query.order_by {
            if !query.has_full_text() {
                check_order_by(self.store, property)?;
            }
        }

        if query.only_if_complete && !self.store.domain().is_some_and(|domain| domain.covers(&query)) {
            return Err(Error::new(
                ErrorKind::DomainNotComplete,
                format!("Data loaded in '{}' does not cover: {}", query.collection, query),
            ));
        }
        Ok(query)
    }

    fn resolve(&self, query: &OrQuery) -> Result<(Vec<Handle>, ExecutionPlan)> {
        if let Some(text) = query.full_text_query.as_deref().filter(|_| query.has_full_text()) {
            return Ok(self.resolve_full_text(query, text));
        }

        let order = query
            .order_by
            .as_deref()
            .map(|property| (property, SortOrder::from_descending(query.order_descending)));
        let (selection, mut plan) = self.resolve_structured(query, order);

        let handles = match order {
            Some((property, order)) => {
                let (handles, strategy) = order_selection(self.store, selection, property, order)?;
                plan.ordering = strategy;
                handles
            }
            None => selection.into_handles(),
        };
        Ok((handles, plan))
    }

    /// Full-text hits in rank order; with structured predicates, only the hits they also select
    fn resolve_full_text(&self, query: &OrQuery, text: &str) -> (Vec<Handle>, ExecutionPlan) {
        let full_text = self.store.full_text();

        if query.is_empty() {
            let cap = match query.take {
                Some(take) if !query.distinct => query.skip.saturating_add(take),
                _ => usize::MAX,
            };
            let plan = ExecutionPlan::new(&query.collection, Strategy::FullText);
            return (full_text.search(text, cap), plan);
        }

        let ((selection, branch), hits) = rayon::join(
            || self.resolve_structured(query, None),
            || full_text.search(text, usize::MAX),
        );
        let selected = selection.into_bitmap();
        let handles = hits.into_iter().filter(|h| selected.contains(*h)).collect();

        let mut plan = ExecutionPlan::new(&query.collection, Strategy::Mixed);
        plan.branches.push(branch);
        (handles, plan)
    }

    fn resolve_structured(&self, query: &OrQuery, order: RequestedOrder<'_>) -> (Selection, ExecutionPlan) {
        if query.elements.iter().any(|and| and.is_empty()) || query.elements.is_empty() {
            return self.full_scan(&query.collection, None, order);
        }

        // A single predicate goes through the planner too: it returns at most one candidate
        if let [and] = query.elements.as_slice() {
            return self.process_and_query(&query.collection, and, order);
        }

        let branches: Vec<(Selection, ExecutionPlan)> = if self.config.parallel_or_branches {
            query
                .elements
                .par_iter()
                .map(|and| self.process_and_query(&query.collection, and, None))
                .collect()
        } else {
            query
                .elements
                .iter()
                .map(|and| self.process_and_query(&query.collection, and, None))
                .collect()
        };

        let mut plan = ExecutionPlan::new(&query.collection, Strategy::Union);
        let mut union = RoaringBitmap::new();
        for (selection, branch) in branches {
            union |= selection.into_bitmap();
            plan.branches.push(branch);
        }
        (Selection::Unordered(union), plan)
    }

    /// Narrow with at most two indexes, then match the remaining predicates
    fn process_and_query(&self, collection: &str, query: &AndQuery, order: RequestedOrder<'_>) -> (Selection, ExecutionPlan) {
        let candidates = QueryPlanner::new(self.store).get_indexes_for_query(query);
        let Some(first) = candidates.first() else {
            return self.full_scan(collection, Some(query), order);
        };

        let mut used = vec![first];
        if let Some(second) = candidates.get(1) {
            if second.count <= first.count.saturating_mul(self.config.index_pruning_factor) {
                used.push(second);
            }
        }

        let strategy = if first.is_primary() {
            Strategy::PrimaryKey
        } else if used.len() == 2 {
            Strategy::Intersection
        } else {
            Strategy::SingleIndex
        };
        let mut plan = ExecutionPlan::new(collection, strategy);

        let mut selected = RoaringBitmap::new();
        for (i, candidate) in used.iter().enumerate() {
            plan.indexes.push(IndexUse {
                property: candidate.index.name().to_string(),
                predicate: candidate.query.to_string(),
                count: candidate.count,
            });
            let found = candidate.index.get_many(&candidate.query.values(), candidate.query.operator);
            if i == 0 {
                selected = found;
            } else {
                selected &= found;
            }
            if selected.is_empty() {
                break;
            }
        }

        let residual: Vec<_> = query
            .elements
            .iter()
            .filter(|atomic| !used.iter().any(|c| std::ptr::eq(*atomic, c.query)))
            .cloned()
            .collect();
        plan.residual_predicates = residual.len();

        if !residual.is_empty() && !selected.is_empty() {
            let residual = AndQuery::from_elements(residual);
            let matcher = ObjectMatcher::new(self.store.schema());
            selected = selected
                .iter()
                .filter(|h| self.store.get(*h).is_some_and(|o| matcher.matches_and(o, &residual)))
                .collect();
        }
        (Selection::Unordered(selected), plan)
    }

    /// Match every object; walks the ordered index instead when an order is requested
    fn full_scan(&self, collection: &str, filter: Option<&AndQuery>, order: RequestedOrder<'_>) -> (Selection, ExecutionPlan) {
        let mut plan = ExecutionPlan::new(collection, Strategy::FullScan);
        plan.residual_predicates = filter.map_or(0, |and| and.elements.len());

        let matcher = ObjectMatcher::new(self.store.schema());
        let keep = |handle: Handle| match filter {
            Some(and) => self.store.get(handle).is_some_and(|o| matcher.matches_and(o, and)),
            None => true,
        };

        let ordered_index = order.and_then(|(property, order)| {
            self.store
                .try_get_index(property)
                .filter(|index| index.index_type() == IndexType::Ordered)
                .map(|index| (index, order))
        });
        if let Some((index, order)) = ordered_index {
            let handles = index
                .get_all(order.is_descending())
                .into_iter()
                .filter(|h| keep(*h))
                .collect();
            plan.ordering = OrderingStrategy::FreeFromScan;
            return (Selection::Ordered(handles), plan);
        }

        let selected = self.store.all_handles().iter().filter(|h| keep(*h)).collect();
        (Selection::Unordered(selected), plan)
    }

    /// Distinct, then skip, then take; bumps the access counters
    fn post_process(&self, query: &OrQuery, handles: Vec<Handle>) -> Vec<Arc<PackedObject>> {
        self.store.increment_read_count();

        let objects: Vec<Arc<PackedObject>> = handles
            .into_iter()
            .filter_map(|handle| self.store.get(handle).cloned())
            .collect();
        let objects = if query.distinct {
            distinct_by_projection(self.store.schema(), objects, &query.selected_properties)
        } else {
            objects
        };
        let objects: Vec<Arc<PackedObject>> = objects
            .into_iter()
            .skip(query.skip)
            .take(query.take.unwrap_or(usize::MAX))
            .collect();

        if !objects.is_empty() {
            self.store.increment_hit_count();
        }
        self.store.touch_many(&objects);
        objects
    }

    fn record_activity(&self, query: &OrQuery, plan: &ExecutionPlan) {
        if let Some(activity) = self.activity {
            activity.record(ActivityEntry {
                timestamp: Utc::now(),
                collection: query.collection.clone(),
                query: query.to_string(),
                plan: plan.to_string(),
                items: plan.result_count,
                elapsed_micros: plan.elapsed.as_micros() as u64,
            });
        }
    }
}
