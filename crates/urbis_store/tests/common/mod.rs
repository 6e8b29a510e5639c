#![allow(dead_code)]

use std::sync::Arc;

use tempfile::{TempDir, tempdir};
use urbis_store::*;

/// A seeded database: country > region > district > city, one object function with a
/// building type, a service type, a buffer type and a functional zone type.
pub struct World {
    pub store: UrbisStore,
    pub dir: TempDir,
    pub owner: Actor,
    pub region: Territory,
    pub district: Territory,
    pub city: Territory,
    pub function: PhysicalObjectFunction,
    pub building: PhysicalObjectType,
    pub school: ServiceType,
    pub buffer_type: BufferType,
    pub zone_type: FunctionalZoneType,
}

pub fn test_config(dir: &TempDir, failpoints: &[&str]) -> UrbisConfig {
    let mut config = UrbisConfig::default_sqlite(dir.path().join("urbis.sqlite").to_string_lossy());
    config.geometry = Some(GeometryConfig {
        meters_per_unit: Some(1.0),
        context_buffer_meters: Some(1.0),
        crop_min_share: Some(0.1),
        region_level: Some(2),
    });
    if !failpoints.is_empty() {
        config.failpoints = Some(failpoints.iter().map(|name| name.to_string()).collect());
    }
    config
}

pub async fn world() -> UrbisResult<World> {
    world_with(&[], None).await
}

pub async fn world_with(
    failpoints: &[&str],
    sink: Option<Arc<dyn EventSink>>,
) -> UrbisResult<World> {
    let dir = tempdir().expect("tempdir");
    let config = test_config(&dir, failpoints);
    seeded(dir, config, sink).await
}

/// Small batch and parameter limits force every multi-row path through several chunks.
pub async fn world_with_limits(limits: LimitsConfig) -> UrbisResult<World> {
    let dir = tempdir().expect("tempdir");
    let mut config = test_config(&dir, &[]);
    config.limits = Some(limits);
    seeded(dir, config, None).await
}

async fn seeded(
    dir: TempDir,
    config: UrbisConfig,
    sink: Option<Arc<dyn EventSink>>,
) -> UrbisResult<World> {
    let mut store = UrbisStore::connect(&config, dir.path()).await?;
    if let Some(sink) = sink {
        store = store.with_event_sink(sink);
    }

    let country = store
        .add_territory(territory(None, "country", Geometry::rect(0.0, 0.0, 100.0, 100.0), false))
        .await?;
    let region = store
        .add_territory(territory(
            Some(country.territory_id),
            "region",
            Geometry::rect(0.0, 0.0, 20.0, 20.0),
            false,
        ))
        .await?;
    let district = store
        .add_territory(territory(
            Some(region.territory_id),
            "district",
            Geometry::rect(0.0, 0.0, 20.0, 20.0),
            false,
        ))
        .await?;
    let city = store
        .add_territory(territory(
            Some(district.territory_id),
            "city",
            Geometry::rect(0.0, 0.0, 20.0, 20.0),
            true,
        ))
        .await?;
    let function = store
        .add_physical_object_function("residential".to_string())
        .await?;
    let building = store
        .add_physical_object_type(function.function_id, "house".to_string())
        .await?;
    let school = store.add_service_type("school".to_string()).await?;
    let buffer_type = store.add_buffer_type("noise".to_string()).await?;
    let zone_type = store.add_functional_zone_type("park".to_string()).await?;

    Ok(World {
        store,
        dir,
        owner: Actor::user("planner"),
        region,
        district,
        city,
        function,
        building,
        school,
        buffer_type,
        zone_type,
    })
}

pub fn territory(
    parent_id: Option<TerritoryId>,
    name: &str,
    geometry: Geometry,
    is_city: bool,
) -> NewTerritory {
    NewTerritory {
        parent_id,
        name: name.to_string(),
        geometry,
        centre_point: None,
        is_city,
    }
}

impl World {
    pub fn new_object(&self, name: &str, geometry: Geometry) -> NewUrbanObject {
        NewUrbanObject {
            physical_object: PhysicalObjectInput {
                physical_object_type_id: self.building.physical_object_type_id,
                name: Some(name.to_string()),
                properties: serde_json::json!({}),
            },
            geometry: ObjectGeometryInput {
                territory_id: self.city.territory_id,
                geometry,
                centre_point: None,
                address: None,
                non_clippable: false,
            },
            service: None,
        }
    }

    pub async fn base_object(&self, name: &str, geometry: Geometry) -> UrbisResult<UrbanObjectView> {
        BaseLayerApi::add_urban_object(&self.store, self.new_object(name, geometry)).await
    }

    pub async fn regional_project(&self) -> UrbisResult<CreatedProject> {
        self.store
            .create_project(
                &self.owner,
                NewProject {
                    name: "regional plan".to_string(),
                    region_id: self.region.territory_id,
                    is_regional: true,
                    is_public: false,
                    territory: None,
                },
            )
            .await
    }

    pub async fn project(&self, territory: Geometry) -> UrbisResult<CreatedProject> {
        self.store
            .create_project(
                &self.owner,
                NewProject {
                    name: "district plan".to_string(),
                    region_id: self.region.territory_id,
                    is_regional: false,
                    is_public: false,
                    territory: Some(territory),
                },
            )
            .await
    }

    pub async fn physical_objects(
        &self,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Vec<PhysicalObjectRecord>> {
        self.store
            .physical_objects(scenario_id, Some(&self.owner), &ResolveQuery::new())
            .await
    }

    pub async fn views(&self, scenario_id: ScenarioId) -> UrbisResult<Vec<UrbanObjectView>> {
        self.store
            .urban_objects(scenario_id, Some(&self.owner), &ResolveQuery::new())
            .await
    }

    pub fn rename(&self, name: &str) -> PhysicalObjectInput {
        PhysicalObjectInput {
            physical_object_type_id: self.building.physical_object_type_id,
            name: Some(name.to_string()),
            properties: serde_json::json!({}),
        }
    }
}

pub fn names(records: &[PhysicalObjectRecord]) -> Vec<String> {
    let mut names: Vec<String> = records
        .iter()
        .filter_map(|record| record.physical_object.name.clone())
        .collect();
    names.sort();
    names
}
