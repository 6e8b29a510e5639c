//! Overlay vocabulary: how a scenario link points at either tier, what shape a
//! link has, the per-identity state machine and the merged records the resolver
//! hands back.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{UrbisError, UrbisResult};
use crate::ids::*;
use crate::model::{
    Buffer, FunctionalZone, ObjectGeometry, PhysicalObject, ScenarioIndicatorValue, Service,
};

/// Where a scenario row's sub-object lives.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "tier", content = "id", rename_all = "snake_case")]
pub enum Pointer<I> {
    Base(I),
    Local(I),
    None,
}

impl<I: Copy + From<i64> + Into<i64>> Pointer<I> {
    /// Builds a pointer from the (local, base) column pair; both set is corrupt state.
    pub fn from_columns(local: Option<i64>, base: Option<i64>) -> UrbisResult<Self> {
        match (local, base) {
            (Some(_), Some(_)) => Err(UrbisError::internal(
                "scenario row points at both a local and a base sub-object",
            )),
            (Some(id), None) => Ok(Pointer::Local(I::from(id))),
            (None, Some(id)) => Ok(Pointer::Base(I::from(id))),
            (None, None) => Ok(Pointer::None),
        }
    }

    /// (local, base) column pair.
    pub fn to_columns(self) -> (Option<i64>, Option<i64>) {
        match self {
            Pointer::Base(id) => (None, Some(id.into())),
            Pointer::Local(id) => (Some(id.into()), None),
            Pointer::None => (None, None),
        }
    }
}

impl<I> Pointer<I> {
    pub fn is_local(&self) -> bool {
        matches!(self, Pointer::Local(_))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Pointer::None)
    }
}

macro_rules! into_i64 {
    ($($name:ident),+) => {
        $(impl From<$name> for i64 {
            fn from(value: $name) -> i64 {
                value.0
            }
        })+
    };
}

into_i64!(PhysicalObjectId, ObjectGeometryId, ServiceId, UrbanObjectId);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct LinkPointers {
    pub physical_object: Pointer<PhysicalObjectId>,
    pub object_geometry: Pointer<ObjectGeometryId>,
    pub service: Pointer<ServiceId>,
}

impl LinkPointers {
    pub fn tombstone() -> Self {
        Self {
            physical_object: Pointer::None,
            object_geometry: Pointer::None,
            service: Pointer::None,
        }
    }

    fn any_local(&self) -> bool {
        self.physical_object.is_local() || self.object_geometry.is_local() || self.service.is_local()
    }

    fn all_none(&self) -> bool {
        self.physical_object.is_none() && self.object_geometry.is_none() && self.service.is_none()
    }
}

/// A scenario link row as stored.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct OverlayLink {
    pub link_id: UrbanObjectId,
    pub scenario_id: ScenarioId,
    pub base_urban_object_id: Option<UrbanObjectId>,
    pub pointers: LinkPointers,
}

impl OverlayLink {
    pub fn shape(&self) -> UrbisResult<LinkShape> {
        LinkShape::classify(self.base_urban_object_id, &self.pointers)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LinkShape {
    /// Base identity hidden in this scenario.
    Tombstone(UrbanObjectId),
    /// Base identity carried into the scenario tier without own payload.
    Reference(UrbanObjectId),
    /// Base identity superseded by scenario payload.
    Overridden(UrbanObjectId),
    /// Scenario-only identity.
    Native,
}

impl LinkShape {
    pub fn classify(base: Option<UrbanObjectId>, pointers: &LinkPointers) -> UrbisResult<Self> {
        match base {
            Some(base) if pointers.all_none() => Ok(LinkShape::Tombstone(base)),
            Some(base) if pointers.any_local() => Ok(LinkShape::Overridden(base)),
            Some(base) => Ok(LinkShape::Reference(base)),
            None if pointers.physical_object.is_none() || pointers.object_geometry.is_none() => {
                Err(UrbisError::internal(
                    "native scenario row is missing its physical object or geometry",
                ))
            }
            None => Ok(LinkShape::Native),
        }
    }

    pub fn base(&self) -> Option<UrbanObjectId> {
        match self {
            LinkShape::Tombstone(id) | LinkShape::Reference(id) | LinkShape::Overridden(id) => {
                Some(*id)
            }
            LinkShape::Native => None,
        }
    }
}

/// Lifecycle of one identity inside one scenario.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum LinkState {
    Inherited,
    Overridden,
    Hidden,
    Native,
    Removed,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transition {
    Promote,
    Edit,
    Hide,
    Delete,
    Restore,
}

impl LinkState {
    pub fn of(shape: Option<LinkShape>) -> Self {
        match shape {
            None => LinkState::Inherited,
            Some(LinkShape::Tombstone(_)) => LinkState::Hidden,
            Some(LinkShape::Reference(_) | LinkShape::Overridden(_)) => LinkState::Overridden,
            Some(LinkShape::Native) => LinkState::Native,
        }
    }

    /// Next state, or `None` when the transition does not apply.
    pub fn apply(self, transition: Transition) -> Option<LinkState> {
        use LinkState::*;
        use Transition::*;
        match (self, transition) {
            (Inherited, Promote) => Some(Overridden),
            (Inherited, Hide) => Some(Hidden),
            (Overridden, Edit) => Some(Overridden),
            (Overridden, Hide) => Some(Hidden),
            (Overridden, Delete) => Some(Inherited),
            (Hidden, Restore) => Some(Inherited),
            (Native, Edit) => Some(Native),
            (Native, Delete) => Some(Removed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    Base,
    Scenario,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tiered<T> {
    pub item: T,
    pub is_scenario_object: bool,
}

impl<T> Tiered<T> {
    pub fn base(item: T) -> Self {
        Self {
            item,
            is_scenario_object: false,
        }
    }

    pub fn local(item: T) -> Self {
        Self {
            item,
            is_scenario_object: true,
        }
    }
}

/// A base urban object with its sub-objects loaded.
#[derive(Clone, Debug, PartialEq)]
pub struct BaseUrbanObject {
    pub urban_object_id: UrbanObjectId,
    pub physical_object: PhysicalObject,
    pub object_geometry: ObjectGeometry,
    pub service: Option<Service>,
}

/// Sub-objects a scenario link resolves to through its pointers.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayDelta {
    pub link_id: UrbanObjectId,
    pub physical_object: Option<Tiered<PhysicalObject>>,
    pub object_geometry: Option<Tiered<ObjectGeometry>>,
    pub service: Option<Tiered<Service>>,
}

impl OverlayDelta {
    fn has_payload(&self) -> bool {
        self.physical_object.as_ref().is_some_and(|p| p.is_scenario_object)
            || self.object_geometry.as_ref().is_some_and(|g| g.is_scenario_object)
            || self.service.as_ref().is_some_and(|s| s.is_scenario_object)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolved<B, D> {
    Base(B),
    Overridden { base: B, delta: D },
    Native(D),
}

/// One identity as a scenario sees it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UrbanObjectView {
    /// Base id for inherited rows, scenario link id otherwise.
    pub urban_object_id: UrbanObjectId,
    pub base_urban_object_id: Option<UrbanObjectId>,
    pub origin: Origin,
    /// The identity lives in the scenario tier and carries its own payload.
    pub is_scenario_object: bool,
    pub physical_object: Tiered<PhysicalObject>,
    pub object_geometry: Tiered<ObjectGeometry>,
    pub service: Option<Tiered<Service>>,
}

impl Resolved<BaseUrbanObject, OverlayDelta> {
    /// Scenario payload wins slot by slot; physical object and geometry fall back
    /// to the superseded base identity, a service slot left empty stays empty.
    pub fn materialize(self) -> UrbisResult<UrbanObjectView> {
        match self {
            Resolved::Base(base) => Ok(UrbanObjectView {
                urban_object_id: base.urban_object_id,
                base_urban_object_id: None,
                origin: Origin::Base,
                is_scenario_object: false,
                physical_object: Tiered::base(base.physical_object),
                object_geometry: Tiered::base(base.object_geometry),
                service: base.service.map(Tiered::base),
            }),
            Resolved::Overridden { base, delta } => {
                let is_scenario_object = delta.has_payload();
                Ok(UrbanObjectView {
                    urban_object_id: delta.link_id,
                    base_urban_object_id: Some(base.urban_object_id),
                    origin: Origin::Scenario,
                    is_scenario_object,
                    physical_object: delta
                        .physical_object
                        .unwrap_or_else(|| Tiered::base(base.physical_object)),
                    object_geometry: delta
                        .object_geometry
                        .unwrap_or_else(|| Tiered::base(base.object_geometry)),
                    service: delta.service,
                })
            }
            Resolved::Native(delta) => {
                let is_scenario_object = delta.has_payload();
                let (Some(physical_object), Some(object_geometry)) =
                    (delta.physical_object, delta.object_geometry)
                else {
                    return Err(UrbisError::internal(format!(
                        "scenario urban object {} lost its physical object or geometry",
                        delta.link_id
                    )));
                };
                Ok(UrbanObjectView {
                    urban_object_id: delta.link_id,
                    base_urban_object_id: None,
                    origin: Origin::Scenario,
                    is_scenario_object,
                    physical_object,
                    object_geometry,
                    service: delta.service,
                })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolveKind {
    PhysicalObject,
    PhysicalObjectWithGeometry,
    Service,
    ServiceWithGeometry,
    Geometry,
    FunctionalZone,
    Buffer,
    IndicatorValue,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalObjectRecord {
    pub physical_object: PhysicalObject,
    pub function_id: Option<PhysicalObjectFunctionId>,
    pub territories: Vec<TerritoryId>,
    pub is_scenario_object: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhysicalObjectWithGeometryRecord {
    pub urban_object_id: UrbanObjectId,
    pub physical_object: PhysicalObject,
    pub function_id: Option<PhysicalObjectFunctionId>,
    pub object_geometry: ObjectGeometry,
    pub is_scenario_physical_object: bool,
    pub is_scenario_geometry: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub service: Service,
    pub territories: Vec<TerritoryId>,
    pub is_scenario_object: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceWithGeometryRecord {
    pub urban_object_id: UrbanObjectId,
    pub service: Service,
    pub object_geometry: ObjectGeometry,
    pub is_scenario_service: bool,
    pub is_scenario_geometry: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeometryRecord {
    pub object_geometry: ObjectGeometry,
    pub is_scenario_object: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BufferRecord {
    pub buffer: Buffer,
    pub is_scenario_object: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionalZoneRecord {
    pub functional_zone: FunctionalZone,
    pub is_scenario_object: bool,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndicatorValueRecord {
    pub value: ScenarioIndicatorValue,
    pub origin: Origin,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedRecord {
    PhysicalObject(PhysicalObjectRecord),
    PhysicalObjectWithGeometry(PhysicalObjectWithGeometryRecord),
    Service(ServiceRecord),
    ServiceWithGeometry(ServiceWithGeometryRecord),
    Geometry(GeometryRecord),
    FunctionalZone(FunctionalZoneRecord),
    Buffer(BufferRecord),
    IndicatorValue(IndicatorValueRecord),
}

fn origin_of(is_scenario_object: bool) -> Origin {
    if is_scenario_object {
        Origin::Scenario
    } else {
        Origin::Base
    }
}

/// Distinct physical objects across views, each with the territories it appears in.
pub fn project_physical_objects(
    views: &[UrbanObjectView],
    functions: &HashMap<PhysicalObjectTypeId, PhysicalObjectFunctionId>,
) -> Vec<PhysicalObjectRecord> {
    let mut by_key: BTreeMap<(bool, PhysicalObjectId), PhysicalObjectRecord> = BTreeMap::new();
    for view in views {
        let tiered = &view.physical_object;
        let key = (tiered.is_scenario_object, tiered.item.physical_object_id);
        let territory = view.object_geometry.item.territory_id;
        let entry = by_key.entry(key).or_insert_with(|| PhysicalObjectRecord {
            physical_object: tiered.item.clone(),
            function_id: functions
                .get(&tiered.item.physical_object_type_id)
                .copied(),
            territories: Vec::new(),
            is_scenario_object: tiered.is_scenario_object,
            origin: origin_of(tiered.is_scenario_object),
        });
        if !entry.territories.contains(&territory) {
            entry.territories.push(territory);
        }
    }
    by_key.into_values().collect()
}

pub fn project_physical_objects_with_geometry(
    views: &[UrbanObjectView],
    functions: &HashMap<PhysicalObjectTypeId, PhysicalObjectFunctionId>,
) -> Vec<PhysicalObjectWithGeometryRecord> {
    views
        .iter()
        .map(|view| PhysicalObjectWithGeometryRecord {
            urban_object_id: view.urban_object_id,
            physical_object: view.physical_object.item.clone(),
            function_id: functions
                .get(&view.physical_object.item.physical_object_type_id)
                .copied(),
            object_geometry: view.object_geometry.item.clone(),
            is_scenario_physical_object: view.physical_object.is_scenario_object,
            is_scenario_geometry: view.object_geometry.is_scenario_object,
            origin: view.origin,
        })
        .collect()
}

pub fn project_services(views: &[UrbanObjectView]) -> Vec<ServiceRecord> {
    let mut by_key: BTreeMap<(bool, ServiceId), ServiceRecord> = BTreeMap::new();
    for view in views {
        let Some(service) = &view.service else {
            continue;
        };
        let key = (service.is_scenario_object, service.item.service_id);
        let territory = view.object_geometry.item.territory_id;
        let entry = by_key.entry(key).or_insert_with(|| ServiceRecord {
            service: service.item.clone(),
            territories: Vec::new(),
            is_scenario_object: service.is_scenario_object,
            origin: origin_of(service.is_scenario_object),
        });
        if !entry.territories.contains(&territory) {
            entry.territories.push(territory);
        }
    }
    by_key.into_values().collect()
}

pub fn project_services_with_geometry(views: &[UrbanObjectView]) -> Vec<ServiceWithGeometryRecord> {
    views
        .iter()
        .filter_map(|view| {
            view.service.as_ref().map(|service| ServiceWithGeometryRecord {
                urban_object_id: view.urban_object_id,
                service: service.item.clone(),
                object_geometry: view.object_geometry.item.clone(),
                is_scenario_service: service.is_scenario_object,
                is_scenario_geometry: view.object_geometry.is_scenario_object,
                origin: view.origin,
            })
        })
        .collect()
}

pub fn project_geometries(views: &[UrbanObjectView]) -> Vec<GeometryRecord> {
    let mut by_key: BTreeMap<(bool, ObjectGeometryId), GeometryRecord> = BTreeMap::new();
    for view in views {
        let geometry = &view.object_geometry;
        by_key
            .entry((geometry.is_scenario_object, geometry.item.object_geometry_id))
            .or_insert_with(|| GeometryRecord {
                object_geometry: geometry.item.clone(),
                is_scenario_object: geometry.is_scenario_object,
                origin: origin_of(geometry.is_scenario_object),
            });
    }
    by_key.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn physical(id: i64, name: &str) -> PhysicalObject {
        PhysicalObject {
            physical_object_id: PhysicalObjectId(id),
            physical_object_type_id: PhysicalObjectTypeId(1),
            name: Some(name.to_string()),
            properties: serde_json::json!({}),
            created_at: Timestamp(0),
            updated_at: Timestamp(0),
        }
    }

    fn geometry(id: i64) -> ObjectGeometry {
        ObjectGeometry {
            object_geometry_id: ObjectGeometryId(id),
            territory_id: TerritoryId(1),
            geometry: Geometry::point(0.5, 0.5),
            centre_point: Geometry::point(0.5, 0.5),
            address: None,
            is_cut: false,
            created_at: Timestamp(0),
            updated_at: Timestamp(0),
        }
    }

    fn base_object() -> BaseUrbanObject {
        BaseUrbanObject {
            urban_object_id: UrbanObjectId(10),
            physical_object: physical(1, "old"),
            object_geometry: geometry(1),
            service: None,
        }
    }

    #[test]
    fn pointer_columns_are_exclusive() {
        let pointer = Pointer::<PhysicalObjectId>::from_columns(Some(3), None).expect("local");
        assert_eq!(pointer, Pointer::Local(PhysicalObjectId(3)));
        assert_eq!(pointer.to_columns(), (Some(3), None));
        assert!(Pointer::<PhysicalObjectId>::from_columns(Some(1), Some(2)).is_err());
    }

    #[test]
    fn link_shapes_follow_pointers() {
        let base = Some(UrbanObjectId(5));
        assert_eq!(
            LinkShape::classify(base, &LinkPointers::tombstone()).expect("tombstone"),
            LinkShape::Tombstone(UrbanObjectId(5))
        );
        let reference = LinkPointers {
            physical_object: Pointer::Base(PhysicalObjectId(1)),
            object_geometry: Pointer::Base(ObjectGeometryId(1)),
            service: Pointer::None,
        };
        assert_eq!(
            LinkShape::classify(base, &reference).expect("reference"),
            LinkShape::Reference(UrbanObjectId(5))
        );
        let overridden = LinkPointers {
            physical_object: Pointer::Local(PhysicalObjectId(9)),
            ..reference
        };
        assert_eq!(
            LinkShape::classify(base, &overridden).expect("overridden"),
            LinkShape::Overridden(UrbanObjectId(5))
        );
        assert!(LinkShape::classify(None, &LinkPointers::tombstone()).is_err());
    }

    #[test]
    fn state_machine_releases_overridden_on_delete() {
        let state = LinkState::Inherited.apply(Transition::Promote);
        assert_eq!(state, Some(LinkState::Overridden));
        assert_eq!(
            LinkState::Overridden.apply(Transition::Delete),
            Some(LinkState::Inherited)
        );
        assert_eq!(LinkState::Overridden.apply(Transition::Promote), None);
        assert_eq!(LinkState::Hidden.apply(Transition::Restore), Some(LinkState::Inherited));
        assert_eq!(LinkState::Native.apply(Transition::Delete), Some(LinkState::Removed));
        assert_eq!(LinkState::Removed.apply(Transition::Edit), None);
    }

    #[test]
    fn overridden_payload_wins_and_base_fills_gaps() {
        let resolved = Resolved::Overridden {
            base: base_object(),
            delta: OverlayDelta {
                link_id: UrbanObjectId(77),
                physical_object: Some(Tiered::local(physical(2, "new"))),
                object_geometry: None,
                service: None,
            },
        };
        let view = resolved.materialize().expect("materialize");
        assert_eq!(view.origin, Origin::Scenario);
        assert!(view.is_scenario_object);
        assert_eq!(view.physical_object.item.name.as_deref(), Some("new"));
        assert!(!view.object_geometry.is_scenario_object);
        assert_eq!(view.object_geometry.item.object_geometry_id, ObjectGeometryId(1));
        assert_eq!(view.base_urban_object_id, Some(UrbanObjectId(10)));
    }

    #[test]
    fn native_without_geometry_is_corrupt() {
        let resolved: Resolved<BaseUrbanObject, OverlayDelta> = Resolved::Native(OverlayDelta {
            link_id: UrbanObjectId(1),
            physical_object: Some(Tiered::local(physical(2, "x"))),
            object_geometry: None,
            service: None,
        });
        assert!(resolved.materialize().is_err());
    }

    #[test]
    fn physical_objects_are_distinct_per_tier() {
        let base = Resolved::Base(base_object()).materialize().expect("base");
        let mut second = base.clone();
        second.urban_object_id = UrbanObjectId(11);
        second.object_geometry.item.territory_id = TerritoryId(2);
        let records = project_physical_objects(&[base, second], &HashMap::new());
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].territories, vec![TerritoryId(1), TerritoryId(2)]);
        assert_eq!(records[0].origin, Origin::Base);
    }
}
