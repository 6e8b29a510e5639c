use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::geometry::Geometry;
use crate::ids::*;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Territory {
    pub territory_id: TerritoryId,
    pub parent_id: Option<TerritoryId>,
    pub name: String,
    pub level: i32,
    pub geometry: Geometry,
    pub centre_point: Geometry,
    pub is_city: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewTerritory {
    pub parent_id: Option<TerritoryId>,
    pub name: String,
    pub geometry: Geometry,
    pub centre_point: Option<Geometry>,
    pub is_city: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    pub user_id: UserId,
    pub name: String,
    pub region_id: TerritoryId,
    pub is_regional: bool,
    pub is_public: bool,
    pub territory: Option<Geometry>,
    pub context_territories: Vec<TerritoryId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub region_id: TerritoryId,
    pub is_regional: bool,
    pub is_public: bool,
    /// Required for non-regional projects, ignored for regional ones.
    pub territory: Option<Geometry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub scenario_id: ScenarioId,
    pub project_id: ProjectId,
    pub parent_id: Option<ScenarioId>,
    pub name: String,
    pub is_based: bool,
    /// Still resolving through `parent_id` because neither side has written since the fork.
    pub is_attached: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalObjectFunction {
    pub function_id: PhysicalObjectFunctionId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalObjectType {
    pub physical_object_type_id: PhysicalObjectTypeId,
    pub function_id: PhysicalObjectFunctionId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceType {
    pub service_type_id: ServiceTypeId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionalZoneType {
    pub functional_zone_type_id: FunctionalZoneTypeId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferType {
    pub buffer_type_id: BufferTypeId,
    pub name: String,
}

/// Default radius (in meters) for a buffer type keyed by exactly one of the two object types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DefaultBufferValue {
    pub buffer_type_id: BufferTypeId,
    pub physical_object_type_id: Option<PhysicalObjectTypeId>,
    pub service_type_id: Option<ServiceTypeId>,
    pub buffer_value: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalObject {
    pub physical_object_id: PhysicalObjectId,
    pub physical_object_type_id: PhysicalObjectTypeId,
    pub name: Option<String>,
    pub properties: JsonValue,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectGeometry {
    pub object_geometry_id: ObjectGeometryId,
    pub territory_id: TerritoryId,
    pub geometry: Geometry,
    pub centre_point: Geometry,
    pub address: Option<String>,
    pub is_cut: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub service_id: ServiceId,
    pub service_type_id: ServiceTypeId,
    pub name: Option<String>,
    pub capacity: Option<i64>,
    pub properties: JsonValue,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalObjectInput {
    pub physical_object_type_id: PhysicalObjectTypeId,
    pub name: Option<String>,
    #[serde(default)]
    pub properties: JsonValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhysicalObjectPatch {
    pub physical_object_type_id: Option<PhysicalObjectTypeId>,
    pub name: Option<String>,
    pub properties: Option<JsonValue>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectGeometryInput {
    pub territory_id: TerritoryId,
    pub geometry: Geometry,
    pub centre_point: Option<Geometry>,
    pub address: Option<String>,
    /// Keep the geometry as supplied even when it leaves the project territory.
    #[serde(default)]
    pub non_clippable: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectGeometryPatch {
    pub territory_id: Option<TerritoryId>,
    pub geometry: Option<Geometry>,
    pub centre_point: Option<Geometry>,
    pub address: Option<String>,
    #[serde(default)]
    pub non_clippable: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceInput {
    pub service_type_id: ServiceTypeId,
    pub name: Option<String>,
    pub capacity: Option<i64>,
    #[serde(default)]
    pub properties: JsonValue,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePatch {
    pub service_type_id: Option<ServiceTypeId>,
    pub name: Option<String>,
    pub capacity: Option<i64>,
    pub properties: Option<JsonValue>,
}

/// Payload of a brand new urban object (physical object + geometry + optional service).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewUrbanObject {
    pub physical_object: PhysicalObjectInput,
    pub geometry: ObjectGeometryInput,
    pub service: Option<ServiceInput>,
}

/// Replacement payload for any subset of an identity's sub-objects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UrbanObjectEdit {
    pub physical_object: Option<PhysicalObjectInput>,
    pub geometry: Option<ObjectGeometryInput>,
    pub service: Option<ServiceInput>,
}

impl UrbanObjectEdit {
    pub fn is_empty(&self) -> bool {
        self.physical_object.is_none() && self.geometry.is_none() && self.service.is_none()
    }
}

/// Reuse of an existing physical object with a new geometry inside a scenario.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExistingPhysicalObject {
    pub physical_object_id: PhysicalObjectId,
    pub is_scenario_object: bool,
    pub geometry: ObjectGeometryInput,
    pub service: Option<ServiceInput>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionalZone {
    pub functional_zone_id: FunctionalZoneId,
    pub functional_zone_type_id: FunctionalZoneTypeId,
    pub name: Option<String>,
    pub territory_id: Option<TerritoryId>,
    pub geometry: Geometry,
    pub year: i32,
    pub source: String,
    pub properties: JsonValue,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionalZoneInput {
    pub functional_zone_type_id: FunctionalZoneTypeId,
    pub name: Option<String>,
    pub territory_id: Option<TerritoryId>,
    pub geometry: Geometry,
    pub year: i32,
    pub source: String,
    #[serde(default)]
    pub properties: JsonValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Buffer {
    pub buffer_type_id: BufferTypeId,
    pub urban_object_id: UrbanObjectId,
    pub geometry: Geometry,
    pub is_custom: bool,
    pub is_cut: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferInput {
    pub buffer_type_id: BufferTypeId,
    pub urban_object_id: UrbanObjectId,
    pub is_scenario_object: bool,
    /// Explicit shape; derived from the default radius when absent.
    pub geometry: Option<Geometry>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    pub indicator_id: IndicatorId,
    pub parent_id: Option<IndicatorId>,
    pub name_full: String,
    pub name_short: String,
    pub measurement_unit: Option<String>,
    pub level: i32,
    pub list_label: String,
    pub service_type_id: Option<ServiceTypeId>,
    pub physical_object_type_id: Option<PhysicalObjectTypeId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewIndicator {
    pub parent_id: Option<IndicatorId>,
    pub name_full: String,
    pub name_short: String,
    pub measurement_unit: Option<String>,
    pub service_type_id: Option<ServiceTypeId>,
    pub physical_object_type_id: Option<PhysicalObjectTypeId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorTreeQuery {
    pub parent_id: Option<IndicatorId>,
    /// Whole subtree instead of direct children only.
    pub get_all_subtree: bool,
    pub name: Option<String>,
    /// Only indicators with at least one value recorded for this territory.
    pub territory_id: Option<TerritoryId>,
    pub service_type_id: Option<ServiceTypeId>,
    pub physical_object_type_id: Option<PhysicalObjectTypeId>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateType {
    Year,
    HalfYear,
    Quarter,
    Month,
    Day,
}

impl DateType {
    pub fn as_str(self) -> &'static str {
        match self {
            DateType::Year => "year",
            DateType::HalfYear => "half_year",
            DateType::Quarter => "quarter",
            DateType::Month => "month",
            DateType::Day => "day",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "year" => Some(DateType::Year),
            "half_year" => Some(DateType::HalfYear),
            "quarter" => Some(DateType::Quarter),
            "month" => Some(DateType::Month),
            "day" => Some(DateType::Day),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Real,
    Forecast,
    Target,
}

impl ValueType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValueType::Real => "real",
            ValueType::Forecast => "forecast",
            ValueType::Target => "target",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "real" => Some(ValueType::Real),
            "forecast" => Some(ValueType::Forecast),
            "target" => Some(ValueType::Target),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValue {
    pub indicator_id: IndicatorId,
    pub territory_id: TerritoryId,
    pub date_type: DateType,
    pub date_value: time::Date,
    pub value_type: ValueType,
    pub information_source: String,
    pub value: f64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValueInput {
    pub indicator_id: IndicatorId,
    pub territory_id: TerritoryId,
    pub date_type: DateType,
    pub date_value: time::Date,
    pub value_type: ValueType,
    pub information_source: String,
    pub value: f64,
}

/// Indicator value classified against the bind of its region and level.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinnedIndicatorValue {
    pub value: IndicatorValue,
    pub indicator: Indicator,
    pub territory_name: String,
    pub level: i32,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValuesQuery {
    pub indicator_ids: Vec<IndicatorId>,
    pub value_type: Option<ValueType>,
    pub information_source: Option<String>,
    pub start_date: Option<time::Date>,
    pub end_date: Option<time::Date>,
    /// Keep only the newest row per (indicator, territory, value type).
    pub last_only: bool,
    pub include_child_territories: bool,
    pub cities_only: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TerritoryIndicatorBind {
    pub indicator_id: IndicatorId,
    pub territory_id: TerritoryId,
    pub level: i32,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioIndicatorValue {
    pub indicator_id: IndicatorId,
    pub scenario_id: ScenarioId,
    pub territory_id: Option<TerritoryId>,
    pub value: f64,
    pub value_type: ValueType,
    pub information_source: String,
    pub properties: JsonValue,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioIndicatorValueInput {
    pub indicator_id: IndicatorId,
    pub territory_id: Option<TerritoryId>,
    pub value: f64,
    pub value_type: ValueType,
    pub information_source: String,
    #[serde(default)]
    pub properties: JsonValue,
}
