mod common;

use common::{names, world};
use urbis_store::*;

#[tokio::test]
async fn untouched_base_rows_resolve_unchanged() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let shed = w.base_object("shed", Geometry::rect(3.0, 3.0, 4.0, 4.0)).await?;
    let created = w.regional_project().await?;
    let scenario = created.based_scenario.scenario_id;

    let records = w.physical_objects(scenario).await?;
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.origin, Origin::Base);
        assert!(!record.is_scenario_object);
        assert_eq!(record.function_id, Some(w.function.function_id));
        assert_eq!(record.territories, vec![w.city.territory_id]);
    }
    let house_row = records
        .iter()
        .find(|r| r.physical_object.physical_object_id == house.physical_object.item.physical_object_id)
        .expect("house resolved");
    assert_eq!(house_row.physical_object, house.physical_object.item);
    assert!(records
        .iter()
        .any(|r| r.physical_object == shed.physical_object.item));
    Ok(())
}

#[tokio::test]
async fn promotion_is_visible_only_in_the_editing_scenario() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let created = w.regional_project().await?;
    let based = created.based_scenario.scenario_id;
    let left = w.store.fork_scenario(&w.owner, based, "left".into()).await?;
    let right = w.store.fork_scenario(&w.owner, based, "right".into()).await?;

    let record = w
        .store
        .put_physical_object(
            left.scenario_id,
            &w.owner,
            house.physical_object.item.physical_object_id,
            false,
            w.rename("renovated house"),
        )
        .await?;
    assert!(record.is_scenario_object);
    assert_eq!(record.origin, Origin::Scenario);

    let left_rows = w.physical_objects(left.scenario_id).await?;
    assert_eq!(left_rows.len(), 1);
    assert_eq!(left_rows[0].physical_object.name.as_deref(), Some("renovated house"));
    assert!(left_rows[0].is_scenario_object);

    for scenario in [based, right.scenario_id] {
        let rows = w.physical_objects(scenario).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].origin, Origin::Base);
        assert_eq!(rows[0].physical_object, house.physical_object.item);
    }

    let views = w.views(left.scenario_id).await?;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].base_urban_object_id, Some(house.urban_object_id));
    assert!(!views[0].object_geometry.is_scenario_object);
    Ok(())
}

#[tokio::test]
async fn second_promotion_of_the_same_identity_is_rejected() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let scenario = w.regional_project().await?.based_scenario.scenario_id;

    w.store
        .edit_urban_object(
            scenario,
            &w.owner,
            house.urban_object_id,
            false,
            UrbanObjectEdit {
                physical_object: Some(w.rename("first")),
                ..UrbanObjectEdit::default()
            },
        )
        .await?;
    let again = w
        .store
        .edit_urban_object(
            scenario,
            &w.owner,
            house.urban_object_id,
            false,
            UrbanObjectEdit {
                physical_object: Some(w.rename("second")),
                ..UrbanObjectEdit::default()
            },
        )
        .await;
    assert!(matches!(again, Err(UrbisError::AlreadyEdited { .. })));

    let by_sub_object = w
        .store
        .put_physical_object(
            scenario,
            &w.owner,
            house.physical_object.item.physical_object_id,
            false,
            w.rename("third"),
        )
        .await;
    assert!(matches!(by_sub_object, Err(UrbisError::AlreadyEdited { .. })));
    assert_eq!(names(&w.physical_objects(scenario).await?), vec!["first"]);
    Ok(())
}

#[tokio::test]
async fn hidden_rows_stay_in_the_parent_and_come_back_on_restore() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    w.base_object("shed", Geometry::rect(3.0, 3.0, 4.0, 4.0)).await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let child = w.store.fork_scenario(&w.owner, based, "child".into()).await?;

    w.store
        .delete_urban_object(child.scenario_id, &w.owner, house.urban_object_id, false)
        .await?;
    assert_eq!(names(&w.physical_objects(child.scenario_id).await?), vec!["shed"]);
    assert_eq!(names(&w.physical_objects(based).await?), vec!["house", "shed"]);
    assert_eq!(names(&w.physical_objects(child.scenario_id).await?), vec!["shed"]);

    let twice = w
        .store
        .delete_urban_object(child.scenario_id, &w.owner, house.urban_object_id, false)
        .await;
    assert!(matches!(twice, Err(UrbisError::AlreadyEdited { .. })));

    w.store
        .restore_urban_object(child.scenario_id, &w.owner, house.urban_object_id)
        .await?;
    let rows = w.physical_objects(child.scenario_id).await?;
    assert_eq!(names(&rows), vec!["house", "shed"]);
    assert!(rows.iter().all(|r| r.origin == Origin::Base));
    Ok(())
}

#[tokio::test]
async fn deleting_a_promoted_row_releases_the_base_row() -> UrbisResult<()> {
    let w = world().await?;
    let object = w.base_object("kiosk", Geometry::point(0.5, 0.5)).await?;
    let created = w.project(Geometry::rect(0.0, 0.0, 1.0, 1.0)).await?;
    let based = created.based_scenario.scenario_id;
    let s1 = w.store.fork_scenario(&w.owner, based, "s1".into()).await?.scenario_id;

    let rows = w.physical_objects(s1).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin, Origin::Base);
    assert_eq!(
        rows[0].physical_object.physical_object_type_id,
        w.building.physical_object_type_id
    );

    w.store
        .put_physical_object(
            s1,
            &w.owner,
            object.physical_object.item.physical_object_id,
            false,
            w.rename("pavilion"),
        )
        .await?;
    let rows = w.physical_objects(s1).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin, Origin::Scenario);
    assert_eq!(rows[0].physical_object.name.as_deref(), Some("pavilion"));
    let rows = w.physical_objects(based).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin, Origin::Base);
    assert_eq!(rows[0].physical_object.name.as_deref(), Some("kiosk"));

    let promoted = w
        .views(s1)
        .await?
        .into_iter()
        .find(|view| view.origin == Origin::Scenario)
        .expect("promoted identity");
    w.store
        .delete_urban_object(s1, &w.owner, promoted.urban_object_id, true)
        .await?;

    let rows = w.physical_objects(s1).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin, Origin::Base);
    assert_eq!(rows[0].physical_object, object.physical_object.item);
    let restore = w
        .store
        .restore_urban_object(s1, &w.owner, object.urban_object_id)
        .await;
    assert!(matches!(restore, Err(UrbisError::NotFoundByParams { .. })));
    Ok(())
}

#[tokio::test]
async fn native_objects_live_and_die_in_their_scenario() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let view = OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("new tower", Geometry::rect(5.0, 5.0, 6.0, 6.0)),
    )
    .await?;
    assert_eq!(view.origin, Origin::Scenario);
    assert!(view.is_scenario_object);
    assert_eq!(view.base_urban_object_id, None);
    assert_eq!(names(&w.physical_objects(based).await?), vec!["new tower"]);

    w.store
        .delete_urban_object(based, &w.owner, view.urban_object_id, true)
        .await?;
    assert!(w.physical_objects(based).await?.is_empty());
    let missing = w
        .store
        .delete_urban_object(based, &w.owner, view.urban_object_id, true)
        .await;
    assert!(matches!(missing, Err(UrbisError::NotFoundById { .. })));
    Ok(())
}

#[tokio::test]
async fn deleting_a_base_service_keeps_the_building() -> UrbisResult<()> {
    let w = world().await?;
    let mut input = w.new_object("school building", Geometry::rect(1.0, 1.0, 2.0, 2.0));
    input.service = Some(ServiceInput {
        service_type_id: w.school.service_type_id,
        name: Some("school 7".into()),
        capacity: Some(600),
        properties: serde_json::json!({}),
    });
    let base = BaseLayerApi::add_urban_object(&w.store, input).await?;
    let service_id = base.service.as_ref().expect("service").item.service_id;
    let based = w.regional_project().await?.based_scenario.scenario_id;

    w.store
        .delete_service(based, &w.owner, service_id, false)
        .await?;
    let services = w
        .store
        .services(based, Some(&w.owner), &ResolveQuery::new())
        .await?;
    assert!(services.is_empty());
    let views = w.views(based).await?;
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].base_urban_object_id, Some(base.urban_object_id));
    assert!(views[0].service.is_none());
    assert_eq!(views[0].physical_object.item, base.physical_object.item);
    Ok(())
}

#[tokio::test]
async fn patches_merge_with_the_current_row() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;

    let promoted = w
        .store
        .patch_physical_object(
            based,
            &w.owner,
            house.physical_object.item.physical_object_id,
            false,
            PhysicalObjectPatch {
                properties: Some(serde_json::json!({"floors": 3})),
                ..PhysicalObjectPatch::default()
            },
        )
        .await?;
    assert_eq!(promoted.physical_object.name.as_deref(), Some("house"));
    assert_eq!(promoted.physical_object.properties["floors"], 3);

    let renamed = w
        .store
        .patch_physical_object(
            based,
            &w.owner,
            promoted.physical_object.physical_object_id,
            true,
            PhysicalObjectPatch {
                name: Some("tall house".into()),
                ..PhysicalObjectPatch::default()
            },
        )
        .await?;
    assert_eq!(renamed.physical_object.name.as_deref(), Some("tall house"));
    assert_eq!(renamed.physical_object.properties["floors"], 3);
    assert_eq!(
        renamed.physical_object.physical_object_id,
        promoted.physical_object.physical_object_id
    );
    Ok(())
}

#[tokio::test]
async fn strangers_cannot_write() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let stranger = Actor::user("someone else");

    let write = w
        .store
        .delete_urban_object(based, &stranger, house.urban_object_id, false)
        .await;
    assert!(matches!(write, Err(UrbisError::Forbidden { .. })));
    let read = w
        .store
        .physical_objects(based, Some(&stranger), &ResolveQuery::new())
        .await;
    assert!(matches!(read, Err(UrbisError::Forbidden { .. })));

    let admin = Actor::superuser("admin");
    w.store
        .delete_urban_object(based, &admin, house.urban_object_id, false)
        .await?;
    assert!(w.physical_objects(based).await?.is_empty());
    Ok(())
}
