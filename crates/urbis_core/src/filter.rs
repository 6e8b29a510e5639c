//! Composable read filters.
//!
//! A query is a list of [`Predicate`]s plus ordering and paging. Storage pushes
//! whatever it can into SQL for the base branch; [`ResolveQuery::apply`] then
//! runs every predicate uniformly over the merged result.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::geometry::Geometry;
use crate::ids::*;
use crate::overlay::{
    BufferRecord, FunctionalZoneRecord, GeometryRecord, IndicatorValueRecord, Origin,
    PhysicalObjectRecord, PhysicalObjectWithGeometryRecord, ServiceRecord,
    ServiceWithGeometryRecord, UrbanObjectView,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    PhysicalObjectType(PhysicalObjectTypeId),
    PhysicalObjectFunction(PhysicalObjectFunctionId),
    ServiceType(ServiceTypeId),
    Territory(TerritoryId),
    /// Case-insensitive substring of the record name.
    NameContains(String),
    FunctionalZoneType(FunctionalZoneTypeId),
    BufferType(BufferTypeId),
    Indicator(IndicatorId),
    OnlyScenarioObjects,
}

/// Attribute access shared by every record kind; `None` means the record has no such attribute.
pub trait Filterable {
    fn physical_object_type_id(&self) -> Option<PhysicalObjectTypeId> {
        None
    }
    fn physical_object_function_id(&self) -> Option<PhysicalObjectFunctionId> {
        None
    }
    fn service_type_id(&self) -> Option<ServiceTypeId> {
        None
    }
    fn territory_ids(&self) -> Vec<TerritoryId> {
        Vec::new()
    }
    fn name(&self) -> Option<&str> {
        None
    }
    fn functional_zone_type_id(&self) -> Option<FunctionalZoneTypeId> {
        None
    }
    fn buffer_type_id(&self) -> Option<BufferTypeId> {
        None
    }
    fn indicator_id(&self) -> Option<IndicatorId> {
        None
    }
    fn is_scenario_object(&self) -> bool;
}

impl Predicate {
    /// Predicates naming an attribute the record kind does not carry never exclude it.
    pub fn matches<R: Filterable + ?Sized>(&self, record: &R) -> bool {
        match self {
            Predicate::PhysicalObjectType(id) => record
                .physical_object_type_id()
                .is_none_or(|value| value == *id),
            Predicate::PhysicalObjectFunction(id) => record
                .physical_object_function_id()
                .is_none_or(|value| value == *id),
            Predicate::ServiceType(id) => record.service_type_id().is_none_or(|value| value == *id),
            Predicate::Territory(id) => {
                let territories = record.territory_ids();
                territories.is_empty() || territories.contains(id)
            }
            Predicate::NameContains(needle) => {
                let needle = needle.to_lowercase();
                record
                    .name()
                    .is_some_and(|name| name.to_lowercase().contains(&needle))
            }
            Predicate::FunctionalZoneType(id) => record
                .functional_zone_type_id()
                .is_none_or(|value| value == *id),
            Predicate::BufferType(id) => record.buffer_type_id().is_none_or(|value| value == *id),
            Predicate::Indicator(id) => record.indicator_id().is_none_or(|value| value == *id),
            Predicate::OnlyScenarioObjects => record.is_scenario_object(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderBy {
    #[default]
    Id,
    CreatedAt,
    UpdatedAt,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

/// Sort keys every record kind exposes.
pub trait Ordered {
    fn primary_key(&self) -> i64;
    fn origin(&self) -> Origin;
    fn created_at(&self) -> Timestamp;
    fn updated_at(&self) -> Timestamp;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolveQuery {
    #[serde(default)]
    pub predicates: Vec<Predicate>,
    #[serde(default)]
    pub order_by: OrderBy,
    #[serde(default)]
    pub direction: Direction,
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    /// Restrict the reachable territory to cities.
    #[serde(default)]
    pub cities_only: bool,
}

impl ResolveQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn ordered_by(mut self, order_by: OrderBy, direction: Direction) -> Self {
        self.order_by = order_by;
        self.direction = direction;
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }

    pub fn matches<R: Filterable + ?Sized>(&self, record: &R) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(record))
    }

    /// Filters, orders and pages a merged result.
    ///
    /// Timestamp ordering breaks ties by primary key ascending, then base before scenario.
    pub fn apply<R: Filterable + Ordered>(&self, records: Vec<R>) -> Vec<R> {
        let mut kept: Vec<R> = records.into_iter().filter(|r| self.matches(r)).collect();
        let tie_break = |a: &R, b: &R| {
            a.primary_key()
                .cmp(&b.primary_key())
                .then(a.origin().cmp(&b.origin()))
        };
        kept.sort_by(|a, b| {
            let primary = match self.order_by {
                OrderBy::Id => Ordering::Equal,
                OrderBy::CreatedAt => a.created_at().cmp(&b.created_at()),
                OrderBy::UpdatedAt => a.updated_at().cmp(&b.updated_at()),
            };
            let primary = match self.direction {
                Direction::Asc => primary,
                Direction::Desc => primary.reverse(),
            };
            match (self.order_by, self.direction) {
                (OrderBy::Id, Direction::Desc) => tie_break(b, a),
                _ => primary.then_with(|| tie_break(a, b)),
            }
        });
        let iter = kept.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Boundary of a context read: territories around the project plus an optional shape.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextQuery {
    #[serde(flatten)]
    pub query: ResolveQuery,
    /// Replaces the union of the project's context territories when supplied.
    pub boundary: Option<Geometry>,
}

impl Filterable for UrbanObjectView {
    fn physical_object_type_id(&self) -> Option<PhysicalObjectTypeId> {
        Some(self.physical_object.item.physical_object_type_id)
    }
    fn service_type_id(&self) -> Option<ServiceTypeId> {
        self.service.as_ref().map(|s| s.item.service_type_id)
    }
    fn territory_ids(&self) -> Vec<TerritoryId> {
        vec![self.object_geometry.item.territory_id]
    }
    fn name(&self) -> Option<&str> {
        self.physical_object.item.name.as_deref()
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_object
    }
}

impl Filterable for PhysicalObjectRecord {
    fn physical_object_type_id(&self) -> Option<PhysicalObjectTypeId> {
        Some(self.physical_object.physical_object_type_id)
    }
    fn physical_object_function_id(&self) -> Option<PhysicalObjectFunctionId> {
        self.function_id
    }
    fn territory_ids(&self) -> Vec<TerritoryId> {
        self.territories.clone()
    }
    fn name(&self) -> Option<&str> {
        self.physical_object.name.as_deref()
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_object
    }
}

impl Ordered for PhysicalObjectRecord {
    fn primary_key(&self) -> i64 {
        self.physical_object.physical_object_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        self.physical_object.created_at
    }
    fn updated_at(&self) -> Timestamp {
        self.physical_object.updated_at
    }
}

impl Filterable for PhysicalObjectWithGeometryRecord {
    fn physical_object_type_id(&self) -> Option<PhysicalObjectTypeId> {
        Some(self.physical_object.physical_object_type_id)
    }
    fn physical_object_function_id(&self) -> Option<PhysicalObjectFunctionId> {
        self.function_id
    }
    fn territory_ids(&self) -> Vec<TerritoryId> {
        vec![self.object_geometry.territory_id]
    }
    fn name(&self) -> Option<&str> {
        self.physical_object.name.as_deref()
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_physical_object || self.is_scenario_geometry
    }
}

impl Ordered for PhysicalObjectWithGeometryRecord {
    fn primary_key(&self) -> i64 {
        self.physical_object.physical_object_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        self.physical_object.created_at
    }
    fn updated_at(&self) -> Timestamp {
        self.physical_object.updated_at
    }
}

impl Filterable for ServiceRecord {
    fn service_type_id(&self) -> Option<ServiceTypeId> {
        Some(self.service.service_type_id)
    }
    fn territory_ids(&self) -> Vec<TerritoryId> {
        self.territories.clone()
    }
    fn name(&self) -> Option<&str> {
        self.service.name.as_deref()
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_object
    }
}

impl Ordered for ServiceRecord {
    fn primary_key(&self) -> i64 {
        self.service.service_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        self.service.created_at
    }
    fn updated_at(&self) -> Timestamp {
        self.service.updated_at
    }
}

impl Filterable for ServiceWithGeometryRecord {
    fn service_type_id(&self) -> Option<ServiceTypeId> {
        Some(self.service.service_type_id)
    }
    fn territory_ids(&self) -> Vec<TerritoryId> {
        vec![self.object_geometry.territory_id]
    }
    fn name(&self) -> Option<&str> {
        self.service.name.as_deref()
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_service || self.is_scenario_geometry
    }
}

impl Ordered for ServiceWithGeometryRecord {
    fn primary_key(&self) -> i64 {
        self.service.service_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        self.service.created_at
    }
    fn updated_at(&self) -> Timestamp {
        self.service.updated_at
    }
}

impl Filterable for GeometryRecord {
    fn territory_ids(&self) -> Vec<TerritoryId> {
        vec![self.object_geometry.territory_id]
    }
    fn name(&self) -> Option<&str> {
        self.object_geometry.address.as_deref()
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_object
    }
}

impl Ordered for GeometryRecord {
    fn primary_key(&self) -> i64 {
        self.object_geometry.object_geometry_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        self.object_geometry.created_at
    }
    fn updated_at(&self) -> Timestamp {
        self.object_geometry.updated_at
    }
}

impl Filterable for BufferRecord {
    fn buffer_type_id(&self) -> Option<BufferTypeId> {
        Some(self.buffer.buffer_type_id)
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_object
    }
}

impl Ordered for BufferRecord {
    fn primary_key(&self) -> i64 {
        self.buffer.urban_object_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        Timestamp(0)
    }
    fn updated_at(&self) -> Timestamp {
        Timestamp(0)
    }
}

impl Filterable for FunctionalZoneRecord {
    fn functional_zone_type_id(&self) -> Option<FunctionalZoneTypeId> {
        Some(self.functional_zone.functional_zone_type_id)
    }
    fn territory_ids(&self) -> Vec<TerritoryId> {
        self.functional_zone.territory_id.into_iter().collect()
    }
    fn name(&self) -> Option<&str> {
        self.functional_zone.name.as_deref()
    }
    fn is_scenario_object(&self) -> bool {
        self.is_scenario_object
    }
}

impl Ordered for FunctionalZoneRecord {
    fn primary_key(&self) -> i64 {
        self.functional_zone.functional_zone_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        self.functional_zone.created_at
    }
    fn updated_at(&self) -> Timestamp {
        self.functional_zone.updated_at
    }
}

impl Filterable for IndicatorValueRecord {
    fn territory_ids(&self) -> Vec<TerritoryId> {
        self.value.territory_id.into_iter().collect()
    }
    fn indicator_id(&self) -> Option<IndicatorId> {
        Some(self.value.indicator_id)
    }
    fn is_scenario_object(&self) -> bool {
        true
    }
}

impl Ordered for IndicatorValueRecord {
    fn primary_key(&self) -> i64 {
        self.value.indicator_id.0
    }
    fn origin(&self) -> Origin {
        self.origin
    }
    fn created_at(&self) -> Timestamp {
        self.value.created_at
    }
    fn updated_at(&self) -> Timestamp {
        self.value.updated_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PhysicalObject;

    fn record(id: i64, name: &str, created: i64, origin: Origin) -> PhysicalObjectRecord {
        PhysicalObjectRecord {
            physical_object: PhysicalObject {
                physical_object_id: PhysicalObjectId(id),
                physical_object_type_id: PhysicalObjectTypeId(id % 2),
                name: Some(name.to_string()),
                properties: serde_json::Value::Null,
                created_at: Timestamp(created),
                updated_at: Timestamp(created),
            },
            function_id: None,
            territories: vec![TerritoryId(1)],
            is_scenario_object: origin == Origin::Scenario,
            origin,
        }
    }

    #[test]
    fn predicates_compose_conjunctively() {
        let query = ResolveQuery::new()
            .with(Predicate::PhysicalObjectType(PhysicalObjectTypeId(1)))
            .with(Predicate::NameContains("SCHOOL".into()));
        let records = vec![
            record(1, "old school", 0, Origin::Base),
            record(3, "hospital", 0, Origin::Base),
            record(2, "school annex", 0, Origin::Base),
        ];
        let kept = query.apply(records);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].physical_object.physical_object_id, PhysicalObjectId(1));
    }

    #[test]
    fn timestamp_ties_break_by_primary_key_then_base_first() {
        let query = ResolveQuery::new().ordered_by(OrderBy::CreatedAt, Direction::Asc);
        let records = vec![
            record(5, "e", 10, Origin::Base),
            record(2, "b", 10, Origin::Scenario),
            record(2, "b", 10, Origin::Base),
            record(9, "i", 1, Origin::Base),
        ];
        let ordered: Vec<(i64, Origin)> = query
            .apply(records)
            .into_iter()
            .map(|r| (r.physical_object.physical_object_id.0, r.origin))
            .collect();
        assert_eq!(
            ordered,
            vec![
                (9, Origin::Base),
                (2, Origin::Base),
                (2, Origin::Scenario),
                (5, Origin::Base)
            ]
        );
    }

    #[test]
    fn paging_applies_after_ordering() {
        let query = ResolveQuery::new().page(2, 1);
        let records = (1..=5).map(|id| record(id, "x", 0, Origin::Base)).collect();
        let ids: Vec<i64> = query
            .apply(records)
            .into_iter()
            .map(|r| r.physical_object.physical_object_id.0)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn inapplicable_predicates_do_not_exclude() {
        let predicate = Predicate::ServiceType(ServiceTypeId(4));
        assert!(predicate.matches(&record(1, "x", 0, Origin::Base)));
        assert!(!Predicate::OnlyScenarioObjects.matches(&record(1, "x", 0, Origin::Base)));
    }
}
