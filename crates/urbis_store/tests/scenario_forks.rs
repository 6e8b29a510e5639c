mod common;

use std::sync::Arc;

use common::{names, world, world_with};
use urbis_store::*;

fn sorted(mut views: Vec<UrbanObjectView>) -> Vec<UrbanObjectView> {
    views.sort_by_key(|view| view.urban_object_id);
    views
}

#[tokio::test]
async fn forks_start_equal_and_then_diverge() -> UrbisResult<()> {
    let w = world().await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let tower = OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("tower", Geometry::rect(5.0, 5.0, 6.0, 6.0)),
    )
    .await?;
    let child = w.store.fork_scenario(&w.owner, based, "child".into()).await?;
    assert!(child.is_attached);
    assert_eq!(child.parent_id, Some(based));
    assert_eq!(
        sorted(w.views(child.scenario_id).await?),
        sorted(w.views(based).await?)
    );

    // parent edit: the child keeps what it saw at fork time
    w.store
        .put_physical_object(
            based,
            &w.owner,
            tower.physical_object.item.physical_object_id,
            true,
            w.rename("tower v2"),
        )
        .await?;
    assert_eq!(names(&w.physical_objects(based).await?), vec!["house", "tower v2"]);
    assert_eq!(
        names(&w.physical_objects(child.scenario_id).await?),
        vec!["house", "tower"]
    );
    let child_now = w.store.get_scenario(Some(&w.owner), child.scenario_id).await?;
    assert!(!child_now.is_attached);

    // child edit: the parent never sees it
    w.store
        .delete_urban_object(child.scenario_id, &w.owner, house.urban_object_id, false)
        .await?;
    assert_eq!(names(&w.physical_objects(child.scenario_id).await?), vec!["tower"]);
    assert_eq!(names(&w.physical_objects(based).await?), vec!["house", "tower v2"]);
    Ok(())
}

#[tokio::test]
async fn ids_read_through_an_attached_fork_stay_usable() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("tower", Geometry::rect(5.0, 5.0, 6.0, 6.0)),
    )
    .await?;
    let child = w.store.fork_scenario(&w.owner, based, "child".into()).await?;
    let seen = w.views(child.scenario_id).await?;
    assert_eq!(seen.len(), 1);
    let seen = &seen[0];

    let record = w
        .store
        .put_physical_object(
            child.scenario_id,
            &w.owner,
            seen.physical_object.item.physical_object_id,
            true,
            w.rename("child tower"),
        )
        .await?;
    assert_ne!(
        record.physical_object.physical_object_id,
        seen.physical_object.item.physical_object_id
    );
    assert_eq!(
        names(&w.physical_objects(child.scenario_id).await?),
        vec!["child tower"]
    );
    assert_eq!(names(&w.physical_objects(based).await?), vec!["tower"]);

    w.store
        .delete_urban_object(child.scenario_id, &w.owner, seen.urban_object_id, true)
        .await?;
    assert!(w.physical_objects(child.scenario_id).await?.is_empty());
    assert_eq!(names(&w.physical_objects(based).await?), vec!["tower"]);
    Ok(())
}

#[tokio::test]
async fn ids_read_from_a_fork_survive_a_parent_write() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let tower = OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("tower", Geometry::rect(5.0, 5.0, 6.0, 6.0)),
    )
    .await?;
    let child = w.store.fork_scenario(&w.owner, based, "child".into()).await?;
    let seen = w.views(child.scenario_id).await?.remove(0);

    w.store
        .put_physical_object(
            based,
            &w.owner,
            tower.physical_object.item.physical_object_id,
            true,
            w.rename("tower v2"),
        )
        .await?;
    assert!(!w.store.get_scenario(Some(&w.owner), child.scenario_id).await?.is_attached);

    w.store
        .delete_urban_object(child.scenario_id, &w.owner, seen.urban_object_id, true)
        .await?;
    assert!(w.physical_objects(child.scenario_id).await?.is_empty());
    assert_eq!(names(&w.physical_objects(based).await?), vec!["tower v2"]);
    Ok(())
}

#[tokio::test]
async fn every_id_from_one_read_outlives_the_first_write() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    for (name, x) in [("a", 1.0), ("b", 3.0)] {
        OverlayWriteApi::add_urban_object(
            &w.store,
            based,
            &w.owner,
            w.new_object(name, Geometry::rect(x, x, x + 1.0, x + 1.0)),
        )
        .await?;
    }
    let child = w.store.fork_scenario(&w.owner, based, "child".into()).await?;
    let seen = sorted(w.views(child.scenario_id).await?);
    assert_eq!(seen.len(), 2);

    w.store
        .delete_urban_object(child.scenario_id, &w.owner, seen[0].urban_object_id, true)
        .await?;
    w.store
        .delete_urban_object(child.scenario_id, &w.owner, seen[1].urban_object_id, true)
        .await?;
    assert!(w.physical_objects(child.scenario_id).await?.is_empty());
    assert_eq!(names(&w.physical_objects(based).await?), vec!["a", "b"]);

    let again = w
        .store
        .delete_urban_object(child.scenario_id, &w.owner, seen[1].urban_object_id, true)
        .await;
    assert!(matches!(again, Err(UrbisError::NotFoundById { .. })));
    Ok(())
}

#[tokio::test]
async fn ids_follow_a_chain_of_attached_forks() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("kiosk", Geometry::rect(5.0, 5.0, 6.0, 6.0)),
    )
    .await?;
    let middle = w.store.fork_scenario(&w.owner, based, "middle".into()).await?;
    let leaf = w
        .store
        .fork_scenario(&w.owner, middle.scenario_id, "leaf".into())
        .await?;
    let seen = w.views(leaf.scenario_id).await?.remove(0);

    // the middle write hands the leaf its own rows, then the middle goes away
    w.store
        .put_physical_object(
            middle.scenario_id,
            &w.owner,
            seen.physical_object.item.physical_object_id,
            true,
            w.rename("middle kiosk"),
        )
        .await?;
    w.store.delete_scenario(&w.owner, middle.scenario_id).await?;

    let record = w
        .store
        .put_physical_object(
            leaf.scenario_id,
            &w.owner,
            seen.physical_object.item.physical_object_id,
            true,
            w.rename("leaf kiosk"),
        )
        .await?;
    assert_eq!(record.physical_object.name.as_deref(), Some("leaf kiosk"));
    assert_eq!(
        names(&w.physical_objects(leaf.scenario_id).await?),
        vec!["leaf kiosk"]
    );
    assert_eq!(names(&w.physical_objects(based).await?), vec!["kiosk"]);
    Ok(())
}

#[tokio::test]
async fn copies_own_their_rows() -> UrbisResult<()> {
    let w = world().await?;
    w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    OverlayWriteApi::add_urban_object(
        &w.store,
        based,
        &w.owner,
        w.new_object("tower", Geometry::rect(5.0, 5.0, 6.0, 6.0)),
    )
    .await?;
    w.store
        .put_scenario_indicator_value(
            based,
            &w.owner,
            ScenarioIndicatorValueInput {
                indicator_id: w
                    .store
                    .add_indicator(NewIndicator {
                        parent_id: None,
                        name_full: "population".into(),
                        name_short: "pop".into(),
                        measurement_unit: Some("people".into()),
                        service_type_id: None,
                        physical_object_type_id: None,
                    })
                    .await?
                    .indicator_id,
                territory_id: None,
                value: 1200.0,
                value_type: ValueType::Forecast,
                information_source: "model".into(),
                properties: serde_json::Value::Null,
            },
        )
        .await?;

    let copy = w.store.copy_scenario(&w.owner, based, "copy".into()).await?;
    assert!(!copy.is_attached);
    assert!(!copy.is_based);
    assert_eq!(
        names(&w.physical_objects(copy.scenario_id).await?),
        vec!["house", "tower"]
    );
    let copied_values = w
        .store
        .indicator_values(copy.scenario_id, Some(&w.owner), &ResolveQuery::new())
        .await?;
    assert_eq!(copied_values.len(), 1);
    assert_eq!(copied_values[0].value.scenario_id, copy.scenario_id);

    let copied_tower = w
        .views(copy.scenario_id)
        .await?
        .into_iter()
        .find(|view| view.origin == Origin::Scenario)
        .expect("copied tower");
    w.store
        .delete_urban_object(copy.scenario_id, &w.owner, copied_tower.urban_object_id, true)
        .await?;
    assert_eq!(names(&w.physical_objects(copy.scenario_id).await?), vec!["house"]);
    assert_eq!(names(&w.physical_objects(based).await?), vec!["house", "tower"]);
    Ok(())
}

#[tokio::test]
async fn based_scenarios_cannot_be_deleted() -> UrbisResult<()> {
    let w = world().await?;
    let created = w.regional_project().await?;
    let result = w
        .store
        .delete_scenario(&w.owner, created.based_scenario.scenario_id)
        .await;
    assert!(matches!(
        result,
        Err(UrbisError::InvalidBaseScenario { scenario_id }) if scenario_id == created.based_scenario.scenario_id.0
    ));
    let listed = w
        .store
        .list_scenarios(Some(&w.owner), created.project.project_id)
        .await?;
    assert_eq!(listed.len(), 1);
    Ok(())
}

#[tokio::test]
async fn deleting_a_scenario_keeps_its_attached_children_intact() -> UrbisResult<()> {
    let w = world().await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let middle = w.store.fork_scenario(&w.owner, based, "middle".into()).await?;
    OverlayWriteApi::add_urban_object(
        &w.store,
        middle.scenario_id,
        &w.owner,
        w.new_object("kiosk", Geometry::rect(5.0, 5.0, 6.0, 6.0)),
    )
    .await?;
    let leaf = w
        .store
        .fork_scenario(&w.owner, middle.scenario_id, "leaf".into())
        .await?;
    assert_eq!(names(&w.physical_objects(leaf.scenario_id).await?), vec!["kiosk"]);

    w.store.delete_scenario(&w.owner, middle.scenario_id).await?;
    let gone = w.store.get_scenario(Some(&w.owner), middle.scenario_id).await;
    assert!(matches!(gone, Err(UrbisError::NotFoundById { .. })));
    let leaf_now = w.store.get_scenario(Some(&w.owner), leaf.scenario_id).await?;
    assert_eq!(leaf_now.parent_id, None);
    assert!(!leaf_now.is_attached);
    assert_eq!(names(&w.physical_objects(leaf.scenario_id).await?), vec!["kiosk"]);
    Ok(())
}

#[tokio::test]
async fn failed_promotion_leaves_no_trace() -> UrbisResult<()> {
    let w = world_with(&["put_physical_object"], None).await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let child = w.store.fork_scenario(&w.owner, based, "child".into()).await?;

    let failed = w
        .store
        .put_physical_object(
            child.scenario_id,
            &w.owner,
            house.physical_object.item.physical_object_id,
            false,
            w.rename("lost edit"),
        )
        .await;
    assert!(matches!(failed, Err(UrbisError::Storage { .. })));
    let rows = w.physical_objects(child.scenario_id).await?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].origin, Origin::Base);
    assert_eq!(rows[0].physical_object, house.physical_object.item);
    let child_now = w.store.get_scenario(Some(&w.owner), child.scenario_id).await?;
    assert!(child_now.is_attached);

    let view = w
        .store
        .edit_urban_object(
            child.scenario_id,
            &w.owner,
            house.urban_object_id,
            false,
            UrbanObjectEdit {
                physical_object: Some(w.rename("kept edit")),
                ..UrbanObjectEdit::default()
            },
        )
        .await?;
    assert_eq!(view.physical_object.item.name.as_deref(), Some("kept edit"));
    Ok(())
}

#[tokio::test]
async fn committed_writes_publish_events() -> UrbisResult<()> {
    let (sink, mut events) = ChannelEventSink::new();
    let w = world_with(&[], Some(Arc::new(sink))).await?;
    let house = w.base_object("house", Geometry::rect(1.0, 1.0, 2.0, 2.0)).await?;
    let based = w.regional_project().await?.based_scenario.scenario_id;
    let mut seeded = Vec::new();
    while let Ok(event) = events.try_recv() {
        seeded.push(event);
    }
    assert!(seeded.contains(&ChangeEvent::territory(
        w.city.territory_id,
        ChangeKind::UrbanObject,
        house.urban_object_id.0
    )));
    assert!(seeded.contains(&ChangeEvent::scenario(
        based,
        ChangeKind::ScenarioCreated,
        based.0
    )));

    let view = w
        .store
        .edit_urban_object(
            based,
            &w.owner,
            house.urban_object_id,
            false,
            UrbanObjectEdit {
                physical_object: Some(w.rename("house v2")),
                ..UrbanObjectEdit::default()
            },
        )
        .await?;
    assert_eq!(
        events.try_recv().ok(),
        Some(ChangeEvent::scenario(
            based,
            ChangeKind::UrbanObject,
            view.urban_object_id.0
        ))
    );

    let child = w.store.fork_scenario(&w.owner, based, "child".into()).await?;
    assert_eq!(
        events.try_recv().ok(),
        Some(ChangeEvent::scenario(
            child.scenario_id,
            ChangeKind::ScenarioCreated,
            child.scenario_id.0
        ))
    );
    w.store.delete_scenario(&w.owner, child.scenario_id).await?;
    assert_eq!(
        events.try_recv().ok(),
        Some(ChangeEvent::scenario(
            child.scenario_id,
            ChangeKind::ScenarioDeleted,
            child.scenario_id.0
        ))
    );
    assert!(events.try_recv().is_err());
    Ok(())
}
