use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, ExprTrait, OnConflict, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, QueryResult, TransactionTrait};
use time::{Date, Month};

use crate::base::properties_or_empty;
use crate::db::*;
use crate::store::{
    UrbisStore, col_name, exec, exec_count, insert_returning_id, push_values, query_all,
    query_one, read_json,
};
use urbis_core::error::INVALID_VALUE;
use urbis_core::*;

pub(crate) fn date_text(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

pub(crate) fn parse_date(raw: &str) -> UrbisResult<Date> {
    let corrupt = || UrbisError::internal(format!("stored date {raw:?} is not YYYY-MM-DD"));
    let mut parts = raw.splitn(3, '-');
    let year: i32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(corrupt)?;
    let month: u8 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(corrupt)?;
    let day: u8 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(corrupt)?;
    let month = Month::try_from(month).map_err(|_| corrupt())?;
    Date::from_calendar_date(year, month, day).map_err(|_| corrupt())
}

fn indicator_select() -> SelectStatement {
    Query::select()
        .from(Indicators::Table)
        .columns([
            Indicators::IndicatorId,
            Indicators::ParentId,
            Indicators::NameFull,
            Indicators::NameShort,
            Indicators::MeasurementUnit,
            Indicators::Level,
            Indicators::ListLabel,
            Indicators::ServiceTypeId,
            Indicators::PhysicalObjectTypeId,
        ])
        .order_by(Indicators::IndicatorId, Order::Asc)
        .to_owned()
}

fn read_indicator(row: &QueryResult) -> UrbisResult<Indicator> {
    let parent_id: Option<i64> = row.try_get("", &col_name(Indicators::ParentId))?;
    let service_type_id: Option<i64> = row.try_get("", &col_name(Indicators::ServiceTypeId))?;
    let physical_object_type_id: Option<i64> =
        row.try_get("", &col_name(Indicators::PhysicalObjectTypeId))?;
    Ok(Indicator {
        indicator_id: IndicatorId(row.try_get("", &col_name(Indicators::IndicatorId))?),
        parent_id: parent_id.map(IndicatorId),
        name_full: row.try_get("", &col_name(Indicators::NameFull))?,
        name_short: row.try_get("", &col_name(Indicators::NameShort))?,
        measurement_unit: row.try_get("", &col_name(Indicators::MeasurementUnit))?,
        level: row.try_get("", &col_name(Indicators::Level))?,
        list_label: row.try_get("", &col_name(Indicators::ListLabel))?,
        service_type_id: service_type_id.map(ServiceTypeId),
        physical_object_type_id: physical_object_type_id.map(PhysicalObjectTypeId),
    })
}

const VALUE_COLUMNS: [IndicatorValues; 9] = [
    IndicatorValues::IndicatorId,
    IndicatorValues::TerritoryId,
    IndicatorValues::DateType,
    IndicatorValues::DateValue,
    IndicatorValues::ValueType,
    IndicatorValues::InformationSource,
    IndicatorValues::Value,
    IndicatorValues::CreatedAt,
    IndicatorValues::UpdatedAt,
];

fn read_indicator_value(row: &QueryResult) -> UrbisResult<IndicatorValue> {
    let date_type: String = row.try_get("", &col_name(IndicatorValues::DateType))?;
    let date_value: String = row.try_get("", &col_name(IndicatorValues::DateValue))?;
    let value_type: String = row.try_get("", &col_name(IndicatorValues::ValueType))?;
    Ok(IndicatorValue {
        indicator_id: IndicatorId(row.try_get("", &col_name(IndicatorValues::IndicatorId))?),
        territory_id: TerritoryId(row.try_get("", &col_name(IndicatorValues::TerritoryId))?),
        date_type: DateType::parse(&date_type)
            .ok_or_else(|| UrbisError::internal(format!("unknown date type {date_type:?}")))?,
        date_value: parse_date(&date_value)?,
        value_type: ValueType::parse(&value_type)
            .ok_or_else(|| UrbisError::internal(format!("unknown value type {value_type:?}")))?,
        information_source: row.try_get("", &col_name(IndicatorValues::InformationSource))?,
        value: row.try_get("", &col_name(IndicatorValues::Value))?,
        created_at: Timestamp(row.try_get("", &col_name(IndicatorValues::CreatedAt))?),
        updated_at: Timestamp(row.try_get("", &col_name(IndicatorValues::UpdatedAt))?),
    })
}

fn read_bind(row: &QueryResult) -> UrbisResult<TerritoryIndicatorBind> {
    Ok(TerritoryIndicatorBind {
        indicator_id: IndicatorId(row.try_get("", &col_name(TerritoryIndicatorBinds::IndicatorId))?),
        territory_id: TerritoryId(row.try_get("", &col_name(TerritoryIndicatorBinds::TerritoryId))?),
        level: row.try_get("", &col_name(TerritoryIndicatorBinds::Level))?,
        min_value: row.try_get("", &col_name(TerritoryIndicatorBinds::MinValue))?,
        max_value: row.try_get("", &col_name(TerritoryIndicatorBinds::MaxValue))?,
    })
}

fn bind_select() -> SelectStatement {
    Query::select()
        .from(TerritoryIndicatorBinds::Table)
        .columns([
            TerritoryIndicatorBinds::IndicatorId,
            TerritoryIndicatorBinds::TerritoryId,
            TerritoryIndicatorBinds::Level,
            TerritoryIndicatorBinds::MinValue,
            TerritoryIndicatorBinds::MaxValue,
        ])
        .to_owned()
}

const SCENARIO_VALUE_COLUMNS: [ScenarioIndicatorValues; 10] = [
    ScenarioIndicatorValues::IndicatorValueId,
    ScenarioIndicatorValues::IndicatorId,
    ScenarioIndicatorValues::ScenarioId,
    ScenarioIndicatorValues::TerritoryId,
    ScenarioIndicatorValues::Value,
    ScenarioIndicatorValues::ValueType,
    ScenarioIndicatorValues::InformationSource,
    ScenarioIndicatorValues::Properties,
    ScenarioIndicatorValues::CreatedAt,
    ScenarioIndicatorValues::UpdatedAt,
];

fn read_scenario_value(row: &QueryResult) -> UrbisResult<ScenarioIndicatorValue> {
    let territory_id: Option<i64> =
        row.try_get("", &col_name(ScenarioIndicatorValues::TerritoryId))?;
    let value_type: String = row.try_get("", &col_name(ScenarioIndicatorValues::ValueType))?;
    Ok(ScenarioIndicatorValue {
        indicator_id: IndicatorId(row.try_get("", &col_name(ScenarioIndicatorValues::IndicatorId))?),
        scenario_id: ScenarioId(row.try_get("", &col_name(ScenarioIndicatorValues::ScenarioId))?),
        territory_id: territory_id.map(TerritoryId),
        value: row.try_get("", &col_name(ScenarioIndicatorValues::Value))?,
        value_type: ValueType::parse(&value_type)
            .ok_or_else(|| UrbisError::internal(format!("unknown value type {value_type:?}")))?,
        information_source: row
            .try_get("", &col_name(ScenarioIndicatorValues::InformationSource))?,
        properties: read_json(row, &col_name(ScenarioIndicatorValues::Properties))?,
        created_at: Timestamp(row.try_get("", &col_name(ScenarioIndicatorValues::CreatedAt))?),
        updated_at: Timestamp(row.try_get("", &col_name(ScenarioIndicatorValues::UpdatedAt))?),
    })
}

fn latest_per_key(values: Vec<IndicatorValue>) -> Vec<IndicatorValue> {
    let mut latest: BTreeMap<(IndicatorId, TerritoryId, ValueType), IndicatorValue> =
        BTreeMap::new();
    for value in values {
        let key = (value.indicator_id, value.territory_id, value.value_type);
        match latest.get(&key) {
            Some(kept) if kept.date_value >= value.date_value => {}
            _ => {
                latest.insert(key, value);
            }
        }
    }
    latest.into_values().collect()
}

fn indicator_subtree(
    indicators: &[Indicator],
    parent: Option<IndicatorId>,
    whole_subtree: bool,
) -> Vec<IndicatorId> {
    let mut children: HashMap<Option<IndicatorId>, Vec<IndicatorId>> = HashMap::new();
    for indicator in indicators {
        children
            .entry(indicator.parent_id)
            .or_default()
            .push(indicator.indicator_id);
    }
    let mut out = Vec::new();
    let mut queue = VecDeque::from([parent]);
    while let Some(current) = queue.pop_front() {
        for child in children.get(&current).into_iter().flatten() {
            out.push(*child);
            if whole_subtree {
                queue.push_back(Some(*child));
            }
        }
    }
    out
}

impl UrbisStore {
    async fn load_indicators<C: ConnectionTrait>(&self, conn: &C) -> UrbisResult<Vec<Indicator>> {
        query_all(conn, &indicator_select())
            .await?
            .iter()
            .map(read_indicator)
            .collect()
    }

    async fn require_indicator<C: ConnectionTrait>(
        &self,
        conn: &C,
        indicator_id: IndicatorId,
    ) -> UrbisResult<Indicator> {
        let select = indicator_select()
            .and_where(Expr::col(Indicators::IndicatorId).eq(indicator_id.0))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_indicator(&row))
            .transpose()?
            .ok_or_else(|| UrbisError::not_found_by_id("indicator", indicator_id.0))
    }

    async fn find_indicator_value<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &IndicatorValueInput,
    ) -> UrbisResult<Option<IndicatorValue>> {
        let select = Query::select()
            .from(IndicatorValues::Table)
            .columns(VALUE_COLUMNS)
            .and_where(Expr::col(IndicatorValues::IndicatorId).eq(input.indicator_id.0))
            .and_where(Expr::col(IndicatorValues::TerritoryId).eq(input.territory_id.0))
            .and_where(Expr::col(IndicatorValues::DateType).eq(input.date_type.as_str()))
            .and_where(Expr::col(IndicatorValues::DateValue).eq(date_text(input.date_value)))
            .and_where(Expr::col(IndicatorValues::ValueType).eq(input.value_type.as_str()))
            .and_where(
                Expr::col(IndicatorValues::InformationSource).eq(input.information_source.as_str()),
            )
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_indicator_value(&row))
            .transpose()
    }

    async fn check_value_input<C: ConnectionTrait>(
        &self,
        conn: &C,
        input: &IndicatorValueInput,
    ) -> UrbisResult<()> {
        self.require_indicator(conn, input.indicator_id).await?;
        self.territory_exists(conn, input.territory_id).await?;
        if !input.value.is_finite() {
            return Err(UrbisError::invalid_with_code(
                INVALID_VALUE,
                "indicator value must be a finite number",
            ));
        }
        Ok(())
    }

    pub(crate) async fn load_scenario_indicator_values<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        indicator_id: Option<IndicatorId>,
    ) -> UrbisResult<Vec<ScenarioIndicatorValue>> {
        let mut select = Query::select();
        select
            .from(ScenarioIndicatorValues::Table)
            .columns(SCENARIO_VALUE_COLUMNS)
            .and_where(Expr::col(ScenarioIndicatorValues::ScenarioId).eq(scenario_id.0))
            .order_by(ScenarioIndicatorValues::IndicatorValueId, Order::Asc);
        if let Some(indicator_id) = indicator_id {
            select.and_where(Expr::col(ScenarioIndicatorValues::IndicatorId).eq(indicator_id.0));
        }
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_scenario_value)
            .collect()
    }
}

#[async_trait]
impl IndicatorApi for UrbisStore {
    async fn add_indicator(&self, input: NewIndicator) -> UrbisResult<Indicator> {
        if input.name_full.trim().is_empty() || input.name_short.trim().is_empty() {
            return Err(UrbisError::invalid("indicator names must not be empty"));
        }
        let tx = self.conn.begin().await?;
        if let Some(service_type_id) = input.service_type_id {
            self.service_type_exists(&tx, service_type_id).await?;
        }
        if let Some(type_id) = input.physical_object_type_id {
            self.type_exists(&tx, type_id).await?;
        }
        let parent = match input.parent_id {
            Some(parent_id) => Some(self.require_indicator(&tx, parent_id).await?),
            None => None,
        };
        let siblings = self
            .load_indicators(&tx)
            .await?
            .iter()
            .filter(|indicator| indicator.parent_id == input.parent_id)
            .count();
        let (level, list_label) = match &parent {
            Some(parent) => (
                parent.level + 1,
                format!("{}.{}", parent.list_label, siblings + 1),
            ),
            None => (1, (siblings + 1).to_string()),
        };
        let mut insert = Query::insert();
        insert.into_table(Indicators::Table).columns([
            Indicators::ParentId,
            Indicators::NameFull,
            Indicators::NameShort,
            Indicators::MeasurementUnit,
            Indicators::Level,
            Indicators::ListLabel,
            Indicators::ServiceTypeId,
            Indicators::PhysicalObjectTypeId,
        ]);
        push_values(
            &mut insert,
            vec![
                input.parent_id.map(|id| id.0).into(),
                input.name_full.clone().into(),
                input.name_short.clone().into(),
                input.measurement_unit.clone().into(),
                level.into(),
                list_label.clone().into(),
                input.service_type_id.map(|id| id.0).into(),
                input.physical_object_type_id.map(|id| id.0).into(),
            ],
        )?;
        let id = insert_returning_id(&tx, insert, Indicators::IndicatorId).await?;
        tx.commit().await?;
        Ok(Indicator {
            indicator_id: IndicatorId(id),
            parent_id: input.parent_id,
            name_full: input.name_full,
            name_short: input.name_short,
            measurement_unit: input.measurement_unit,
            level,
            list_label,
            service_type_id: input.service_type_id,
            physical_object_type_id: input.physical_object_type_id,
        })
    }

    async fn get_indicators_by_parent(
        &self,
        query: &IndicatorTreeQuery,
    ) -> UrbisResult<Vec<Indicator>> {
        let conn = &self.conn;
        if let Some(parent_id) = query.parent_id {
            self.require_indicator(conn, parent_id).await?;
        }
        let indicators = self.load_indicators(conn).await?;
        let order = indicator_subtree(&indicators, query.parent_id, query.get_all_subtree);
        let with_values: Option<HashSet<IndicatorId>> = match query.territory_id {
            Some(territory_id) => {
                self.territory_exists(conn, territory_id).await?;
                let select = Query::select()
                    .distinct()
                    .from(IndicatorValues::Table)
                    .column(IndicatorValues::IndicatorId)
                    .and_where(Expr::col(IndicatorValues::TerritoryId).eq(territory_id.0))
                    .to_owned();
                let mut ids = HashSet::new();
                for row in query_all(conn, &select).await? {
                    ids.insert(IndicatorId(
                        row.try_get("", &col_name(IndicatorValues::IndicatorId))?,
                    ));
                }
                Some(ids)
            }
            None => None,
        };
        let needle = query.name.as_ref().map(|name| name.to_lowercase());
        let by_id: HashMap<IndicatorId, &Indicator> = indicators
            .iter()
            .map(|indicator| (indicator.indicator_id, indicator))
            .collect();
        Ok(order
            .into_iter()
            .filter_map(|id| by_id.get(&id).copied())
            .filter(|indicator| {
                needle
                    .as_ref()
                    .is_none_or(|needle| indicator.name_full.to_lowercase().contains(needle))
            })
            .filter(|indicator| {
                query
                    .service_type_id
                    .is_none_or(|id| indicator.service_type_id == Some(id))
            })
            .filter(|indicator| {
                query
                    .physical_object_type_id
                    .is_none_or(|id| indicator.physical_object_type_id == Some(id))
            })
            .filter(|indicator| {
                with_values
                    .as_ref()
                    .is_none_or(|ids| ids.contains(&indicator.indicator_id))
            })
            .cloned()
            .collect())
    }

    async fn add_indicator_value(&self, input: IndicatorValueInput) -> UrbisResult<IndicatorValue> {
        let tx = self.conn.begin().await?;
        self.check_value_input(&tx, &input).await?;
        if self.find_indicator_value(&tx, &input).await?.is_some() {
            return Err(UrbisError::already_exists(format!(
                "indicator {} already has a {} value for territory {} on {}",
                input.indicator_id,
                input.value_type.as_str(),
                input.territory_id,
                date_text(input.date_value)
            )));
        }
        let now = Timestamp::now();
        let mut insert = Query::insert();
        insert
            .into_table(IndicatorValues::Table)
            .columns(VALUE_COLUMNS);
        push_values(
            &mut insert,
            vec![
                input.indicator_id.0.into(),
                input.territory_id.0.into(),
                input.date_type.as_str().into(),
                date_text(input.date_value).into(),
                input.value_type.as_str().into(),
                input.information_source.clone().into(),
                input.value.into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        exec(&tx, &insert).await?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::territory(
            input.territory_id,
            ChangeKind::IndicatorValue,
            input.indicator_id.0,
        )])
        .await;
        Ok(IndicatorValue {
            indicator_id: input.indicator_id,
            territory_id: input.territory_id,
            date_type: input.date_type,
            date_value: input.date_value,
            value_type: input.value_type,
            information_source: input.information_source,
            value: input.value,
            created_at: now,
            updated_at: now,
        })
    }

    async fn put_indicator_value(&self, input: IndicatorValueInput) -> UrbisResult<IndicatorValue> {
        let tx = self.conn.begin().await?;
        self.check_value_input(&tx, &input).await?;
        let now = Timestamp::now();
        let mut insert = Query::insert();
        insert
            .into_table(IndicatorValues::Table)
            .columns(VALUE_COLUMNS)
            .on_conflict(
                OnConflict::columns([
                    IndicatorValues::IndicatorId,
                    IndicatorValues::TerritoryId,
                    IndicatorValues::DateType,
                    IndicatorValues::DateValue,
                    IndicatorValues::ValueType,
                    IndicatorValues::InformationSource,
                ])
                .update_columns([IndicatorValues::Value, IndicatorValues::UpdatedAt])
                .to_owned(),
            );
        push_values(
            &mut insert,
            vec![
                input.indicator_id.0.into(),
                input.territory_id.0.into(),
                input.date_type.as_str().into(),
                date_text(input.date_value).into(),
                input.value_type.as_str().into(),
                input.information_source.clone().into(),
                input.value.into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        exec(&tx, &insert).await?;
        let stored = self
            .find_indicator_value(&tx, &input)
            .await?
            .ok_or_else(|| UrbisError::internal("upserted indicator value vanished"))?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::territory(
            input.territory_id,
            ChangeKind::IndicatorValue,
            input.indicator_id.0,
        )])
        .await;
        Ok(stored)
    }

    async fn get_indicator_values_by_territory(
        &self,
        territory_id: TerritoryId,
        query: &IndicatorValuesQuery,
    ) -> UrbisResult<Vec<BinnedIndicatorValue>> {
        let conn = &self.conn;
        self.territory_exists(conn, territory_id).await?;
        let tree = self.territory_tree(conn).await?;
        let territories = if query.include_child_territories {
            tree.subtree(territory_id, query.cities_only)
        } else {
            vec![territory_id]
        };
        let raw: Vec<i64> = territories.iter().map(|id| id.0).collect();
        let mut values = Vec::new();
        for chunk in raw.chunks(self.limits.max_in_params.saturating_sub(16).max(1)) {
            let mut select = Query::select();
            select
                .from(IndicatorValues::Table)
                .columns(VALUE_COLUMNS)
                .and_where(Expr::col(IndicatorValues::TerritoryId).is_in(chunk.iter().copied()));
            if !query.indicator_ids.is_empty() {
                select.and_where(
                    Expr::col(IndicatorValues::IndicatorId)
                        .is_in(query.indicator_ids.iter().map(|id| id.0)),
                );
            }
            if let Some(value_type) = query.value_type {
                select.and_where(Expr::col(IndicatorValues::ValueType).eq(value_type.as_str()));
            }
            if let Some(source) = &query.information_source {
                select.and_where(Expr::col(IndicatorValues::InformationSource).eq(source.as_str()));
            }
            if let Some(start) = query.start_date {
                select.and_where(Expr::col(IndicatorValues::DateValue).gte(date_text(start)));
            }
            if let Some(end) = query.end_date {
                select.and_where(Expr::col(IndicatorValues::DateValue).lte(date_text(end)));
            }
            for row in query_all(conn, &select).await? {
                values.push(read_indicator_value(&row)?);
            }
        }
        if query.last_only {
            values = latest_per_key(values);
        }
        values.sort_by(|a, b| {
            (a.territory_id, a.indicator_id, a.date_value, a.value_type)
                .cmp(&(b.territory_id, b.indicator_id, b.date_value, b.value_type))
        });

        let indicators: HashMap<IndicatorId, Indicator> = self
            .load_indicators(conn)
            .await?
            .into_iter()
            .map(|indicator| (indicator.indicator_id, indicator))
            .collect();
        let touched: Vec<TerritoryId> = values
            .iter()
            .map(|value| value.territory_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let names: HashMap<TerritoryId, String> = self
            .load_territories(conn, &touched)
            .await?
            .into_iter()
            .map(|territory| (territory.territory_id, territory.name))
            .collect();
        let binds: HashMap<(IndicatorId, TerritoryId, i32), TerritoryIndicatorBind> =
            query_all(conn, &bind_select())
                .await?
                .iter()
                .map(read_bind)
                .collect::<UrbisResult<Vec<_>>>()?
                .into_iter()
                .map(|bind| ((bind.indicator_id, bind.territory_id, bind.level), bind))
                .collect();

        let region_level = self.geometry.region_level;
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            let indicator = indicators.get(&value.indicator_id).cloned().ok_or_else(|| {
                UrbisError::internal(format!(
                    "indicator value references missing indicator {}",
                    value.indicator_id
                ))
            })?;
            let level = tree
                .node(value.territory_id)
                .map(|node| node.level)
                .unwrap_or_default();
            let bind = tree
                .ancestor_at_level(value.territory_id, region_level)
                .and_then(|region| binds.get(&(value.indicator_id, region, level)));
            out.push(BinnedIndicatorValue {
                territory_name: names.get(&value.territory_id).cloned().unwrap_or_default(),
                level,
                min_value: bind.and_then(|bind| bind.min_value),
                max_value: bind.and_then(|bind| bind.max_value),
                indicator,
                value,
            });
        }
        Ok(out)
    }

    async fn put_territory_indicator_bind(
        &self,
        bind: TerritoryIndicatorBind,
    ) -> UrbisResult<TerritoryIndicatorBind> {
        if let (Some(min), Some(max)) = (bind.min_value, bind.max_value)
            && min > max
        {
            return Err(UrbisError::invalid_with_code(
                INVALID_VALUE,
                format!("bind minimum {min} exceeds maximum {max}"),
            ));
        }
        if bind.level < 1 {
            return Err(UrbisError::invalid_with_code(
                INVALID_VALUE,
                format!("territory level {} is out of range", bind.level),
            ));
        }
        let tx = self.conn.begin().await?;
        self.require_indicator(&tx, bind.indicator_id).await?;
        self.territory_exists(&tx, bind.territory_id).await?;
        let mut insert = Query::insert();
        insert
            .into_table(TerritoryIndicatorBinds::Table)
            .columns([
                TerritoryIndicatorBinds::IndicatorId,
                TerritoryIndicatorBinds::TerritoryId,
                TerritoryIndicatorBinds::Level,
                TerritoryIndicatorBinds::MinValue,
                TerritoryIndicatorBinds::MaxValue,
            ])
            .on_conflict(
                OnConflict::columns([
                    TerritoryIndicatorBinds::IndicatorId,
                    TerritoryIndicatorBinds::TerritoryId,
                    TerritoryIndicatorBinds::Level,
                ])
                .update_columns([
                    TerritoryIndicatorBinds::MinValue,
                    TerritoryIndicatorBinds::MaxValue,
                ])
                .to_owned(),
            );
        push_values(
            &mut insert,
            vec![
                bind.indicator_id.0.into(),
                bind.territory_id.0.into(),
                bind.level.into(),
                bind.min_value.into(),
                bind.max_value.into(),
            ],
        )?;
        exec(&tx, &insert).await?;
        tx.commit().await?;
        Ok(bind)
    }

    async fn get_territory_indicator_binds(
        &self,
        territory_id: TerritoryId,
        indicator_id: Option<IndicatorId>,
    ) -> UrbisResult<Vec<TerritoryIndicatorBind>> {
        self.territory_exists(&self.conn, territory_id).await?;
        let mut select = bind_select();
        select
            .and_where(Expr::col(TerritoryIndicatorBinds::TerritoryId).eq(territory_id.0))
            .order_by(TerritoryIndicatorBinds::IndicatorId, Order::Asc)
            .order_by(TerritoryIndicatorBinds::Level, Order::Asc);
        if let Some(indicator_id) = indicator_id {
            select.and_where(Expr::col(TerritoryIndicatorBinds::IndicatorId).eq(indicator_id.0));
        }
        query_all(&self.conn, &select)
            .await?
            .iter()
            .map(read_bind)
            .collect()
    }

    async fn put_scenario_indicator_value(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        input: ScenarioIndicatorValueInput,
    ) -> UrbisResult<ScenarioIndicatorValue> {
        let tx = self.conn.begin().await?;
        let mut ctx = self
            .load_context(&tx, scenario_id, Some(actor), Access::Write)
            .await?;
        if let Some(territory_id) = input.territory_id {
            if !ctx.is_regional() {
                return Err(UrbisError::NotAllowedInProjectScenario);
            }
            self.territory_exists(&tx, territory_id).await?;
        }
        self.require_indicator(&tx, input.indicator_id).await?;
        if !input.value.is_finite() {
            return Err(UrbisError::invalid_with_code(
                INVALID_VALUE,
                "indicator value must be a finite number",
            ));
        }
        self.prepare_for_write(&tx, &mut ctx).await?;

        let mut lookup = Query::select();
        lookup
            .from(ScenarioIndicatorValues::Table)
            .columns(SCENARIO_VALUE_COLUMNS)
            .and_where(Expr::col(ScenarioIndicatorValues::ScenarioId).eq(scenario_id.0))
            .and_where(Expr::col(ScenarioIndicatorValues::IndicatorId).eq(input.indicator_id.0))
            .and_where(
                Expr::col(ScenarioIndicatorValues::ValueType).eq(input.value_type.as_str()),
            )
            .and_where(
                Expr::col(ScenarioIndicatorValues::InformationSource)
                    .eq(input.information_source.as_str()),
            );
        match input.territory_id {
            Some(territory_id) => lookup
                .and_where(Expr::col(ScenarioIndicatorValues::TerritoryId).eq(territory_id.0)),
            None => lookup.and_where(Expr::col(ScenarioIndicatorValues::TerritoryId).is_null()),
        };
        let existing = query_one(&tx, &lookup)
            .await?
            .map(|row| {
                let id: i64 = row.try_get("", &col_name(ScenarioIndicatorValues::IndicatorValueId))?;
                Ok::<_, UrbisError>((id, read_scenario_value(&row)?))
            })
            .transpose()?;

        let now = Timestamp::now();
        let properties = properties_or_empty(&input.properties);
        let created_at = match existing {
            Some((id, current)) => {
                let update = Query::update()
                    .table(ScenarioIndicatorValues::Table)
                    .values([
                        (ScenarioIndicatorValues::Value, input.value.into()),
                        (ScenarioIndicatorValues::Properties, properties.to_string().into()),
                        (ScenarioIndicatorValues::UpdatedAt, now.as_millis().into()),
                    ])
                    .and_where(Expr::col(ScenarioIndicatorValues::IndicatorValueId).eq(id))
                    .to_owned();
                exec(&tx, &update).await?;
                current.created_at
            }
            None => {
                let mut insert = Query::insert();
                insert.into_table(ScenarioIndicatorValues::Table).columns([
                    ScenarioIndicatorValues::IndicatorId,
                    ScenarioIndicatorValues::ScenarioId,
                    ScenarioIndicatorValues::TerritoryId,
                    ScenarioIndicatorValues::Value,
                    ScenarioIndicatorValues::ValueType,
                    ScenarioIndicatorValues::InformationSource,
                    ScenarioIndicatorValues::Properties,
                    ScenarioIndicatorValues::CreatedAt,
                    ScenarioIndicatorValues::UpdatedAt,
                ]);
                push_values(
                    &mut insert,
                    vec![
                        input.indicator_id.0.into(),
                        scenario_id.0.into(),
                        input.territory_id.map(|id| id.0).into(),
                        input.value.into(),
                        input.value_type.as_str().into(),
                        input.information_source.clone().into(),
                        properties.to_string().into(),
                        now.as_millis().into(),
                        now.as_millis().into(),
                    ],
                )?;
                exec(&tx, &insert).await?;
                now
            }
        };
        self.maybe_failpoint("put_scenario_indicator_value")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::IndicatorValue,
            input.indicator_id.0,
        )])
        .await;
        Ok(ScenarioIndicatorValue {
            indicator_id: input.indicator_id,
            scenario_id,
            territory_id: input.territory_id,
            value: input.value,
            value_type: input.value_type,
            information_source: input.information_source,
            properties,
            created_at,
            updated_at: now,
        })
    }

    async fn delete_scenario_indicator_values(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        indicator_id: Option<IndicatorId>,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        let mut ctx = self
            .load_context(&tx, scenario_id, Some(actor), Access::Write)
            .await?;
        if let Some(indicator_id) = indicator_id {
            self.require_indicator(&tx, indicator_id).await?;
        }
        self.prepare_for_write(&tx, &mut ctx).await?;
        let removed = self
            .load_scenario_indicator_values(&tx, scenario_id, indicator_id)
            .await?;
        let mut delete = Query::delete();
        delete
            .from_table(ScenarioIndicatorValues::Table)
            .and_where(Expr::col(ScenarioIndicatorValues::ScenarioId).eq(scenario_id.0));
        if let Some(indicator_id) = indicator_id {
            delete.and_where(Expr::col(ScenarioIndicatorValues::IndicatorId).eq(indicator_id.0));
        }
        let count = exec_count(&tx, &delete).await?;
        log::debug!("scenario {scenario_id}: removed {count} indicator values");
        self.maybe_failpoint("delete_scenario_indicator_values")?;
        tx.commit().await?;
        let indicators: HashSet<i64> = removed.iter().map(|value| value.indicator_id.0).collect();
        let mut indicators: Vec<i64> = indicators.into_iter().collect();
        indicators.sort_unstable();
        self.publish(
            indicators
                .into_iter()
                .map(|id| ChangeEvent::scenario(scenario_id, ChangeKind::IndicatorValue, id))
                .collect(),
        )
        .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(indicator: i64, territory: i64, date: Date, value: f64) -> IndicatorValue {
        IndicatorValue {
            indicator_id: IndicatorId(indicator),
            territory_id: TerritoryId(territory),
            date_type: DateType::Year,
            date_value: date,
            value_type: ValueType::Real,
            information_source: "census".into(),
            value,
            created_at: Timestamp(0),
            updated_at: Timestamp(0),
        }
    }

    fn date(year: i32) -> Date {
        Date::from_calendar_date(year, Month::January, 1).expect("valid date")
    }

    #[test]
    fn dates_round_trip_through_text() {
        let d = Date::from_calendar_date(2024, Month::March, 7).expect("valid date");
        assert_eq!(date_text(d), "2024-03-07");
        assert_eq!(parse_date("2024-03-07").expect("parse"), d);
        assert!(parse_date("2024-13-01").is_err());
    }

    #[test]
    fn latest_is_picked_per_key() {
        let values = vec![
            value(1, 10, date(2020), 1.0),
            value(1, 10, date(2023), 3.0),
            value(1, 10, date(2021), 2.0),
            value(2, 10, date(2019), 9.0),
        ];
        let latest = latest_per_key(values);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].value, 3.0);
        assert_eq!(latest[1].value, 9.0);
    }

    #[test]
    fn subtree_is_breadth_first() {
        let make = |id: i64, parent: Option<i64>| Indicator {
            indicator_id: IndicatorId(id),
            parent_id: parent.map(IndicatorId),
            name_full: format!("indicator {id}"),
            name_short: format!("i{id}"),
            measurement_unit: None,
            level: 1,
            list_label: id.to_string(),
            service_type_id: None,
            physical_object_type_id: None,
        };
        let all = vec![make(1, None), make(2, Some(1)), make(3, Some(2)), make(4, Some(1))];
        assert_eq!(
            indicator_subtree(&all, Some(IndicatorId(1)), false),
            vec![IndicatorId(2), IndicatorId(4)]
        );
        assert_eq!(
            indicator_subtree(&all, Some(IndicatorId(1)), true),
            vec![IndicatorId(2), IndicatorId(4), IndicatorId(3)]
        );
        assert_eq!(indicator_subtree(&all, None, false), vec![IndicatorId(1)]);
    }
}
