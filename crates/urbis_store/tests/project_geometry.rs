mod common;

use common::{names, world, world_with_limits};
use urbis_core::geometry::{to_multi_polygon, within};
use urbis_store::*;

fn project_area() -> Geometry {
    Geometry::rect(0.0, 0.0, 10.0, 10.0)
}

#[tokio::test]
async fn project_reads_are_clipped_to_the_territory() -> UrbisResult<()> {
    let w = world().await?;
    w.base_object("inner", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    w.base_object("border", Geometry::rect(8.0, 8.0, 12.0, 12.0)).await?;
    w.base_object("sliver", Geometry::rect(9.9, 0.0, 19.9, 1.0)).await?;
    w.base_object("outside", Geometry::rect(15.0, 15.0, 16.0, 16.0)).await?;
    let created = w.project(project_area()).await?;
    let based = created.based_scenario.scenario_id;
    assert!(created.based_scenario.is_based);
    assert_eq!(created.project.context_territories, vec![w.district.territory_id]);

    let native = OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("overhang", Geometry::rect(9.0, 9.0, 11.0, 11.0)),
    )
    .await?;
    assert!(native.object_geometry.item.is_cut);
    assert!((native.object_geometry.item.geometry.area() - 1.0).abs() < 1e-9);

    let boundary = to_multi_polygon(&project_area());
    let records = w
        .store
        .geometries(based, Some(&w.owner), &ResolveQuery::new())
        .await?;
    assert_eq!(records.len(), 3);
    for record in &records {
        let geometry = &record.object_geometry;
        assert!(
            within(&geometry.geometry, &boundary)
                || (geometry.geometry.is_empty() && geometry.is_cut),
            "{geometry:?} leaks out of the project"
        );
    }
    let cropped: Vec<&GeometryRecord> = records
        .iter()
        .filter(|record| record.object_geometry.is_cut)
        .collect();
    assert_eq!(cropped.len(), 2);
    assert!(cropped.iter().all(|record| record.is_scenario_object));
    assert_eq!(
        names(&w.physical_objects(based).await?),
        vec!["border", "inner", "overhang"]
    );
    Ok(())
}

#[tokio::test]
async fn geometries_outside_the_project_are_rejected_unless_unclippable() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;
    let outside = OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("far away", Geometry::rect(15.0, 15.0, 16.0, 16.0)),
    )
    .await;
    assert!(matches!(
        outside,
        Err(UrbisError::InvalidValue { code: "P0102", .. })
    ));

    let mut input = w.new_object("bridge", Geometry::rect(9.0, 4.0, 12.0, 5.0));
    input.geometry.non_clippable = true;
    let view = OverlayWriteApi::add_urban_object(&w.store, based, &w.owner, input).await?;
    assert!(!view.object_geometry.item.is_cut);
    assert_eq!(
        view.object_geometry.item.geometry,
        Geometry::rect(9.0, 4.0, 12.0, 5.0)
    );
    Ok(())
}

#[tokio::test]
async fn project_territory_must_sit_inside_the_region() -> UrbisResult<()> {
    let w = world().await?;
    let outside = w.project(Geometry::rect(30.0, 30.0, 40.0, 40.0)).await;
    assert!(matches!(
        outside,
        Err(UrbisError::InvalidValue { code: "P0100", .. })
    ));
    let missing = w
        .store
        .create_project(
            &w.owner,
            NewProject {
                name: "no territory".into(),
                region_id: w.region.territory_id,
                is_regional: false,
                is_public: false,
                territory: None,
            },
        )
        .await;
    assert!(matches!(
        missing,
        Err(UrbisError::InvalidValue { code: "P0100", .. })
    ));
    Ok(())
}

#[tokio::test]
async fn project_based_scenarios_point_at_the_regional_one() -> UrbisResult<()> {
    let w = world().await?;
    let regional = w.regional_project().await?;
    let created = w.project(project_area()).await?;
    assert_eq!(
        created.based_scenario.parent_id,
        Some(regional.based_scenario.scenario_id)
    );
    assert!(!created.based_scenario.is_attached);
    Ok(())
}

#[tokio::test]
async fn context_reads_cover_the_surroundings() -> UrbisResult<()> {
    let w = world().await?;
    w.base_object("inner", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    w.base_object("outside", Geometry::rect(15.0, 15.0, 16.0, 16.0)).await?;
    let regional = w.regional_project().await?.based_scenario.scenario_id;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;

    let records = w
        .store
        .resolve_context(
            based,
            Some(&w.owner),
            ResolveKind::PhysicalObject,
            &ContextQuery::default(),
        )
        .await?;
    let mut found: Vec<String> = records
        .into_iter()
        .filter_map(|record| match record {
            ResolvedRecord::PhysicalObject(record) => record.physical_object.name,
            _ => None,
        })
        .collect();
    found.sort();
    assert_eq!(found, vec!["inner", "outside"]);

    let narrowed = w
        .store
        .resolve_context(
            based,
            Some(&w.owner),
            ResolveKind::Geometry,
            &ContextQuery {
                query: ResolveQuery::new(),
                boundary: Some(Geometry::rect(14.0, 14.0, 20.0, 20.0)),
            },
        )
        .await?;
    assert_eq!(narrowed.len(), 1);

    let regional_context = w
        .store
        .resolve_context(
            regional,
            Some(&w.owner),
            ResolveKind::PhysicalObject,
            &ContextQuery::default(),
        )
        .await;
    assert!(matches!(
        regional_context,
        Err(UrbisError::NotAllowedInRegionalProject)
    ));
    Ok(())
}

#[tokio::test]
async fn default_buffers_are_rings_around_the_owner() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(3.0, 3.0, 4.0, 4.0)).await?;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;
    w.store
        .put_default_buffer_value(DefaultBufferValue {
            buffer_type_id: w.buffer_type.buffer_type_id,
            physical_object_type_id: Some(w.building.physical_object_type_id),
            service_type_id: None,
            buffer_value: 1.0,
        })
        .await?;

    let record = w
        .store
        .put_buffer(
            based,
            &w.owner,
            BufferInput {
                buffer_type_id: w.buffer_type.buffer_type_id,
                urban_object_id: house.urban_object_id,
                is_scenario_object: false,
                geometry: None,
            },
        )
        .await?;
    assert!(!record.buffer.is_custom);
    assert!(!record.buffer.is_cut);
    let area = record.buffer.geometry.area();
    assert!(area > 6.9 && area < 7.2, "ring area {area}");
    assert!(!within(
        &Geometry::point(3.5, 3.5),
        &to_multi_polygon(&record.buffer.geometry)
    ));

    let buffers = w
        .store
        .buffers(based, Some(&w.owner), &ResolveQuery::new())
        .await?;
    assert_eq!(buffers.len(), 1);
    assert_eq!(buffers[0].origin, Origin::Scenario);
    assert_eq!(buffers[0].buffer.urban_object_id, record.buffer.urban_object_id);
    let views = w.views(based).await?;
    assert_eq!(views[0].base_urban_object_id, Some(house.urban_object_id));
    assert!(!views[0].is_scenario_object);
    Ok(())
}

#[tokio::test]
async fn buffers_without_a_default_radius_fail() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(3.0, 3.0, 4.0, 4.0)).await?;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;
    let result = w
        .store
        .put_buffer(
            based,
            &w.owner,
            BufferInput {
                buffer_type_id: w.buffer_type.buffer_type_id,
                urban_object_id: house.urban_object_id,
                is_scenario_object: false,
                geometry: None,
            },
        )
        .await;
    assert!(matches!(
        result,
        Err(UrbisError::CustomTrigger { code: "P0112", .. })
    ));
    let rows = w.physical_objects(based).await?;
    assert_eq!(rows[0].origin, Origin::Base);

    let ambiguous = w
        .store
        .put_default_buffer_value(DefaultBufferValue {
            buffer_type_id: w.buffer_type.buffer_type_id,
            physical_object_type_id: Some(w.building.physical_object_type_id),
            service_type_id: Some(w.school.service_type_id),
            buffer_value: 5.0,
        })
        .await;
    assert!(matches!(
        ambiguous,
        Err(UrbisError::CustomTrigger { code: "P0113", .. })
    ));
    Ok(())
}

#[tokio::test]
async fn buffers_clipped_away_are_kept_empty() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(3.0, 3.0, 4.0, 4.0)).await?;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;
    let record = w
        .store
        .put_buffer(
            based,
            &w.owner,
            BufferInput {
                buffer_type_id: w.buffer_type.buffer_type_id,
                urban_object_id: house.urban_object_id,
                is_scenario_object: false,
                geometry: Some(Geometry::rect(15.0, 15.0, 16.0, 16.0)),
            },
        )
        .await?;
    assert!(record.buffer.is_custom);
    assert!(record.buffer.is_cut);
    assert!(record.buffer.geometry.is_empty());
    let stored = w
        .store
        .buffers(based, Some(&w.owner), &ResolveQuery::new())
        .await?;
    assert_eq!(stored.len(), 1);
    assert!(stored[0].buffer.geometry.is_empty());

    w.store
        .delete_buffer(
            based,
            &w.owner,
            record.buffer.urban_object_id,
            true,
            w.buffer_type.buffer_type_id,
        )
        .await?;
    assert!(w
        .store
        .buffers(based, Some(&w.owner), &ResolveQuery::new())
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn regional_scenarios_refuse_project_only_writes() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(3.0, 3.0, 4.0, 4.0)).await?;
    let regional = w.regional_project().await?.based_scenario.scenario_id;
    let buffer = w
        .store
        .put_buffer(
            regional,
            &w.owner,
            BufferInput {
                buffer_type_id: w.buffer_type.buffer_type_id,
                urban_object_id: house.urban_object_id,
                is_scenario_object: false,
                geometry: Some(Geometry::rect(2.0, 2.0, 5.0, 5.0)),
            },
        )
        .await;
    assert!(matches!(buffer, Err(UrbisError::NotAllowedInRegionalScenario)));
    let zones = w
        .store
        .add_functional_zones(
            regional,
            &w.owner,
            vec![FunctionalZoneInput {
                functional_zone_type_id: w.zone_type.functional_zone_type_id,
                name: Some("park".into()),
                territory_id: None,
                geometry: Geometry::rect(1.0, 1.0, 2.0, 2.0),
                year: 2030,
                source: "plan".into(),
                properties: serde_json::Value::Null,
            }],
        )
        .await;
    assert!(matches!(zones, Err(UrbisError::NotAllowedInRegionalScenario)));
    Ok(())
}

#[tokio::test]
async fn functional_zones_follow_the_project_border() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;
    let zone = |name: &str, geometry: Geometry| FunctionalZoneInput {
        functional_zone_type_id: w.zone_type.functional_zone_type_id,
        name: Some(name.to_string()),
        territory_id: Some(w.city.territory_id),
        geometry,
        year: 2030,
        source: "plan".into(),
        properties: serde_json::Value::Null,
    };
    let added = w
        .store
        .add_functional_zones(
            based,
            &w.owner,
            vec![zone("park", Geometry::rect(5.0, 5.0, 15.0, 15.0))],
        )
        .await?;
    assert_eq!(added.len(), 1);
    let id = added[0].functional_zone.functional_zone_id;
    assert!((added[0].functional_zone.geometry.area() - 25.0).abs() < 1e-9);

    let updated = w
        .store
        .put_functional_zone(
            based,
            &w.owner,
            id,
            zone("square", Geometry::rect(1.0, 1.0, 3.0, 3.0)),
        )
        .await?;
    assert_eq!(updated.functional_zone.functional_zone_id, id);
    let listed = w
        .store
        .functional_zones(based, Some(&w.owner), &ResolveQuery::new())
        .await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].functional_zone.name.as_deref(), Some("square"));

    let outside = w
        .store
        .add_functional_zones(
            based,
            &w.owner,
            vec![zone("lake", Geometry::rect(15.0, 15.0, 16.0, 16.0))],
        )
        .await;
    assert!(matches!(
        outside,
        Err(UrbisError::InvalidValue { code: "P0102", .. })
    ));

    w.store.delete_functional_zone(based, &w.owner, id).await?;
    assert!(w
        .store
        .functional_zones(based, Some(&w.owner), &ResolveQuery::new())
        .await?
        .is_empty());
    Ok(())
}

#[tokio::test]
async fn replacing_a_function_swaps_its_objects() -> UrbisResult<()> {
    let w = world().await?;
    w.base_object("old house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let commercial = w
        .store
        .add_physical_object_function("commercial".into())
        .await?;
    let shop = w
        .store
        .add_physical_object_type(commercial.function_id, "shop".into())
        .await?;
    let mut kiosk = w.new_object("kiosk", Geometry::rect(6.0, 6.0, 7.0, 7.0));
    kiosk.physical_object.physical_object_type_id = shop.physical_object_type_id;
    BaseLayerApi::add_urban_object(&w.store, kiosk.clone()).await?;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;

    let wrong = w
        .store
        .replace_objects_by_function(based, &w.owner, w.function.function_id, vec![kiosk])
        .await;
    assert!(matches!(
        wrong,
        Err(UrbisError::InvalidValue { code: "P0100", .. })
    ));

    let created = w
        .store
        .replace_objects_by_function(
            based,
            &w.owner,
            w.function.function_id,
            vec![
                w.new_object("new house", Geometry::rect(3.0, 3.0, 4.0, 4.0)),
                w.new_object("new flat", Geometry::rect(4.0, 4.0, 5.0, 5.0)),
            ],
        )
        .await?;
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|view| view.origin == Origin::Scenario));
    assert_eq!(
        names(&w.physical_objects(based).await?),
        vec!["kiosk", "new flat", "new house"]
    );
    let filtered = w
        .store
        .physical_objects(
            based,
            Some(&w.owner),
            &ResolveQuery::new().with(Predicate::PhysicalObjectFunction(w.function.function_id)),
        )
        .await?;
    assert_eq!(names(&filtered), vec!["new flat", "new house"]);
    Ok(())
}

#[tokio::test]
async fn chunked_replace_keeps_services_with_their_objects() -> UrbisResult<()> {
    let w = world_with_limits(LimitsConfig {
        max_insert_batch: Some(2),
        max_in_params: Some(3),
    })
    .await?;
    let house = w.base_object("old house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    w.base_object("old barn", Geometry::rect(2.0, 1.0, 3.0, 2.0)).await?;
    let commercial = w
        .store
        .add_physical_object_function("commercial".into())
        .await?;
    let shop = w
        .store
        .add_physical_object_type(commercial.function_id, "shop".into())
        .await?;
    let mut kiosk = w.new_object("kiosk", Geometry::rect(8.0, 8.0, 9.0, 9.0));
    kiosk.physical_object.physical_object_type_id = shop.physical_object_type_id;
    BaseLayerApi::add_urban_object(&w.store, kiosk).await?;
    let based = w.project(project_area()).await?.based_scenario.scenario_id;

    let overridden = w
        .store
        .edit_urban_object(
            based,
            &w.owner,
            house.urban_object_id,
            false,
            UrbanObjectEdit {
                physical_object: Some(w.rename("old house v2")),
                ..UrbanObjectEdit::default()
            },
        )
        .await?;
    assert_eq!(overridden.base_urban_object_id, Some(house.urban_object_id));
    OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("native flat", Geometry::rect(3.0, 1.0, 4.0, 2.0)),
    )
    .await?;
    assert_eq!(
        names(&w.physical_objects(based).await?),
        vec!["kiosk", "native flat", "old barn", "old house v2"]
    );

    let objects: Vec<NewUrbanObject> = (0..5)
        .map(|i| {
            let x = 1.0 + i as f64;
            let mut object =
                w.new_object(&format!("new {i}"), Geometry::rect(x, 5.0, x + 0.5, 5.5));
            if i % 2 == 0 {
                object.service = Some(ServiceInput {
                    service_type_id: w.school.service_type_id,
                    name: Some(format!("school {i}")),
                    capacity: Some(100 + i),
                    properties: serde_json::json!({}),
                });
            }
            object
        })
        .collect();
    let created = w
        .store
        .replace_objects_by_function(based, &w.owner, w.function.function_id, objects)
        .await?;
    assert_eq!(created.len(), 5);

    let reread = w.views(based).await?;
    for views in [&created, &reread] {
        for view in views.iter().filter(|view| view.origin == Origin::Scenario) {
            let name = view.physical_object.item.name.clone().unwrap_or_default();
            let index: i64 = name
                .strip_prefix("new ")
                .and_then(|i| i.parse().ok())
                .expect("replacement object");
            let service = view
                .service
                .as_ref()
                .map(|s| (s.item.name.clone().unwrap_or_default(), s.item.capacity));
            if index % 2 == 0 {
                assert_eq!(service, Some((format!("school {index}"), Some(100 + index))));
            } else {
                assert_eq!(service, None);
            }
        }
    }
    assert_eq!(
        names(&w.physical_objects(based).await?),
        vec!["kiosk", "new 0", "new 1", "new 2", "new 3", "new 4"]
    );
    assert!(reread.iter().all(|view| {
        view.urban_object_id != overridden.urban_object_id
            && view.base_urban_object_id != Some(house.urban_object_id)
    }));
    Ok(())
}
