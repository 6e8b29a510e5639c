mod common;

use common::world;
use time::{Date, Month};
use urbis_store::*;

fn year(y: i32) -> Date {
    Date::from_calendar_date(y, Month::January, 1).expect("valid date")
}

fn indicator(parent_id: Option<IndicatorId>, name: &str) -> NewIndicator {
    NewIndicator {
        parent_id,
        name_full: name.to_string(),
        name_short: name.chars().take(4).collect(),
        measurement_unit: None,
        service_type_id: None,
        physical_object_type_id: None,
    }
}

fn value(
    indicator_id: IndicatorId,
    territory_id: TerritoryId,
    date: Date,
    value: f64,
) -> IndicatorValueInput {
    IndicatorValueInput {
        indicator_id,
        territory_id,
        date_type: DateType::Year,
        date_value: date,
        value_type: ValueType::Real,
        information_source: "census".into(),
        value,
    }
}

#[tokio::test]
async fn indicator_tree_levels_and_labels() -> UrbisResult<()> {
    let w = world().await?;
    let root = w.store.add_indicator(indicator(None, "Population")).await?;
    let adults = w
        .store
        .add_indicator(indicator(Some(root.indicator_id), "Adult population"))
        .await?;
    let children = w
        .store
        .add_indicator(indicator(Some(root.indicator_id), "Child population"))
        .await?;
    let seniors = w
        .store
        .add_indicator(indicator(Some(adults.indicator_id), "Senior population"))
        .await?;
    assert_eq!((root.level, root.list_label.as_str()), (1, "1"));
    assert_eq!((adults.level, adults.list_label.as_str()), (2, "1.1"));
    assert_eq!(children.list_label, "1.2");
    assert_eq!((seniors.level, seniors.list_label.as_str()), (3, "1.1.1"));

    let roots = w
        .store
        .get_indicators_by_parent(&IndicatorTreeQuery::default())
        .await?;
    assert_eq!(roots, vec![root.clone()]);
    let direct = w
        .store
        .get_indicators_by_parent(&IndicatorTreeQuery {
            parent_id: Some(root.indicator_id),
            ..IndicatorTreeQuery::default()
        })
        .await?;
    assert_eq!(direct, vec![adults.clone(), children.clone()]);
    let subtree = w
        .store
        .get_indicators_by_parent(&IndicatorTreeQuery {
            parent_id: Some(root.indicator_id),
            get_all_subtree: true,
            name: Some("SENIOR".into()),
            ..IndicatorTreeQuery::default()
        })
        .await?;
    assert_eq!(subtree, vec![seniors]);

    w.store
        .add_indicator_value(value(children.indicator_id, w.city.territory_id, year(2020), 10.0))
        .await?;
    let with_values = w
        .store
        .get_indicators_by_parent(&IndicatorTreeQuery {
            parent_id: Some(root.indicator_id),
            get_all_subtree: true,
            territory_id: Some(w.city.territory_id),
            ..IndicatorTreeQuery::default()
        })
        .await?;
    assert_eq!(with_values, vec![children]);

    let orphan = w
        .store
        .add_indicator(indicator(Some(IndicatorId(9_999)), "Orphan"))
        .await;
    assert!(matches!(orphan, Err(UrbisError::NotFoundById { .. })));
    Ok(())
}

#[tokio::test]
async fn base_values_are_unique_per_key_and_upsertable() -> UrbisResult<()> {
    let w = world().await?;
    let population = w.store.add_indicator(indicator(None, "Population")).await?;
    let input = value(population.indicator_id, w.city.territory_id, year(2020), 100.0);
    w.store.add_indicator_value(input.clone()).await?;
    let duplicate = w.store.add_indicator_value(input.clone()).await;
    assert!(matches!(duplicate, Err(UrbisError::AlreadyExists { .. })));

    let updated = w
        .store
        .put_indicator_value(IndicatorValueInput {
            value: 150.0,
            ..input.clone()
        })
        .await?;
    assert_eq!(updated.value, 150.0);
    assert_eq!(updated.date_value, year(2020));
    let values = w
        .store
        .get_indicator_values_by_territory(w.city.territory_id, &IndicatorValuesQuery::default())
        .await?;
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value.value, 150.0);
    assert_eq!(values[0].territory_name, "city");
    Ok(())
}

#[tokio::test]
async fn values_are_binned_against_their_region() -> UrbisResult<()> {
    let w = world().await?;
    let population = w.store.add_indicator(indicator(None, "Population")).await?;
    let id = population.indicator_id;
    for (date, amount) in [(year(2019), 80.0), (year(2021), 120.0), (year(2020), 95.0)] {
        w.store
            .add_indicator_value(value(id, w.city.territory_id, date, amount))
            .await?;
    }
    w.store
        .add_indicator_value(value(id, w.district.territory_id, year(2020), 500.0))
        .await?;
    w.store
        .put_territory_indicator_bind(TerritoryIndicatorBind {
            indicator_id: id,
            territory_id: w.region.territory_id,
            level: w.city.level,
            min_value: Some(50.0),
            max_value: Some(150.0),
        })
        .await?;

    let latest = w
        .store
        .get_indicator_values_by_territory(
            w.region.territory_id,
            &IndicatorValuesQuery {
                include_child_territories: true,
                last_only: true,
                ..IndicatorValuesQuery::default()
            },
        )
        .await?;
    assert_eq!(latest.len(), 2);
    let city = latest
        .iter()
        .find(|v| v.value.territory_id == w.city.territory_id)
        .expect("city value");
    assert_eq!(city.value.value, 120.0);
    assert_eq!(city.level, w.city.level);
    assert_eq!((city.min_value, city.max_value), (Some(50.0), Some(150.0)));
    assert_eq!(city.indicator, population);
    let district = latest
        .iter()
        .find(|v| v.value.territory_id == w.district.territory_id)
        .expect("district value");
    assert_eq!((district.min_value, district.max_value), (None, None));

    let cities = w
        .store
        .get_indicator_values_by_territory(
            w.region.territory_id,
            &IndicatorValuesQuery {
                include_child_territories: true,
                cities_only: true,
                start_date: Some(year(2020)),
                ..IndicatorValuesQuery::default()
            },
        )
        .await?;
    let mut amounts: Vec<f64> = cities.iter().map(|v| v.value.value).collect();
    amounts.sort_by(f64::total_cmp);
    assert_eq!(amounts, vec![95.0, 120.0]);

    let binds = w
        .store
        .get_territory_indicator_binds(w.region.territory_id, Some(id))
        .await?;
    assert_eq!(binds.len(), 1);
    let inverted = w
        .store
        .put_territory_indicator_bind(TerritoryIndicatorBind {
            indicator_id: id,
            territory_id: w.region.territory_id,
            level: w.city.level,
            min_value: Some(10.0),
            max_value: Some(1.0),
        })
        .await;
    assert!(matches!(
        inverted,
        Err(UrbisError::InvalidValue { code: "P0100", .. })
    ));
    Ok(())
}

#[tokio::test]
async fn scenario_values_are_upserted_and_scoped() -> UrbisResult<()> {
    let w = world().await?;
    let population = w.store.add_indicator(indicator(None, "Population")).await?;
    let regional = w.regional_project().await?.based_scenario.scenario_id;
    let project = w
        .project(Geometry::rect(0.0, 0.0, 10.0, 10.0))
        .await?
        .based_scenario
        .scenario_id;
    let input = ScenarioIndicatorValueInput {
        indicator_id: population.indicator_id,
        territory_id: Some(w.city.territory_id),
        value: 10.0,
        value_type: ValueType::Target,
        information_source: "plan".into(),
        properties: serde_json::Value::Null,
    };

    let in_project = w
        .store
        .put_scenario_indicator_value(project, &w.owner, input.clone())
        .await;
    assert!(matches!(in_project, Err(UrbisError::NotAllowedInProjectScenario)));

    let first = w
        .store
        .put_scenario_indicator_value(regional, &w.owner, input.clone())
        .await?;
    let second = w
        .store
        .put_scenario_indicator_value(
            regional,
            &w.owner,
            ScenarioIndicatorValueInput {
                value: 12.0,
                ..input.clone()
            },
        )
        .await?;
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.properties, serde_json::json!({}));
    let resolved = w
        .store
        .indicator_values(regional, Some(&w.owner), &ResolveQuery::new())
        .await?;
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].value.value, 12.0);
    assert_eq!(resolved[0].origin, Origin::Scenario);

    w.store
        .put_scenario_indicator_value(
            project,
            &w.owner,
            ScenarioIndicatorValueInput {
                territory_id: None,
                ..input
            },
        )
        .await?;
    assert_eq!(
        w.store
            .indicator_values(project, Some(&w.owner), &ResolveQuery::new())
            .await?
            .len(),
        1
    );

    w.store
        .delete_scenario_indicator_values(regional, &w.owner, Some(population.indicator_id))
        .await?;
    assert!(w
        .store
        .indicator_values(regional, Some(&w.owner), &ResolveQuery::new())
        .await?
        .is_empty());
    Ok(())
}
