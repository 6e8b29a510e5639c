use async_trait::async_trait;
use sea_orm::sea_query::{Expr, ExprTrait, Query};
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::base::properties_or_empty;
use crate::db::*;
use crate::store::{RowKind, ScenarioContext, UrbisStore, exec, exec_count, query_one};
use urbis_core::error::GEOMETRY_EMPTY;
use urbis_core::geometry::KindRule;
use urbis_core::*;

impl UrbisStore {
    pub(crate) async fn functional_zone_type_exists<C: ConnectionTrait>(
        &self,
        conn: &C,
        functional_zone_type_id: FunctionalZoneTypeId,
    ) -> UrbisResult<()> {
        let select = Query::select()
            .from(FunctionalZoneTypes::Table)
            .column(FunctionalZoneTypes::FunctionalZoneTypeId)
            .and_where(
                Expr::col(FunctionalZoneTypes::FunctionalZoneTypeId).eq(functional_zone_type_id.0),
            )
            .to_owned();
        match query_one(conn, &select).await? {
            Some(_) => Ok(()),
            None => Err(UrbisError::not_found_by_id(
                "functional zone type",
                functional_zone_type_id.0,
            )),
        }
    }

    async fn prepare_zone<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        input: &FunctionalZoneInput,
        created_at: Timestamp,
    ) -> UrbisResult<FunctionalZone> {
        self.functional_zone_type_exists(conn, input.functional_zone_type_id)
            .await?;
        if let Some(territory_id) = input.territory_id {
            self.territory_exists(conn, territory_id).await?;
        }
        input
            .geometry
            .validate(KindRule::Only(GeometryKind::Area))?;
        let clipped = self.clip_for_project(ctx, &input.geometry)?;
        if clipped.geometry.is_empty() {
            return Err(UrbisError::invalid_with_code(
                GEOMETRY_EMPTY,
                "functional zone lies outside the project territory",
            ));
        }
        Ok(FunctionalZone {
            functional_zone_id: FunctionalZoneId(0),
            functional_zone_type_id: input.functional_zone_type_id,
            name: input.name.clone(),
            territory_id: input.territory_id,
            geometry: clipped.geometry,
            year: input.year,
            source: input.source.clone(),
            properties: properties_or_empty(&input.properties),
            created_at,
            updated_at: Timestamp::now(),
        })
    }

    async fn zone_context<C: ConnectionTrait>(
        &self,
        conn: &C,
        scenario_id: ScenarioId,
        actor: &Actor,
    ) -> UrbisResult<ScenarioContext> {
        let mut ctx = self
            .load_context(conn, scenario_id, Some(actor), Access::Write)
            .await?;
        ctx.require_project_scenario()?;
        self.prepare_for_write(conn, &mut ctx).await?;
        Ok(ctx)
    }
}

fn zone_record(functional_zone: FunctionalZone) -> FunctionalZoneRecord {
    FunctionalZoneRecord {
        functional_zone,
        is_scenario_object: true,
        origin: Origin::Scenario,
    }
}

#[async_trait]
impl FunctionalZoneApi for UrbisStore {
    async fn add_functional_zones(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        zones: Vec<FunctionalZoneInput>,
    ) -> UrbisResult<Vec<FunctionalZoneRecord>> {
        let tx = self.conn.begin().await?;
        let ctx = self.zone_context(&tx, scenario_id, actor).await?;
        let now = Timestamp::now();
        let mut prepared = Vec::with_capacity(zones.len());
        for zone in &zones {
            prepared.push(self.prepare_zone(&tx, &ctx, zone, now).await?);
        }
        let inserted = self
            .insert_scenario_functional_zones(&tx, scenario_id, &prepared)
            .await?;
        self.maybe_failpoint("add_functional_zones")?;
        tx.commit().await?;
        self.publish(
            inserted
                .iter()
                .map(|zone| {
                    ChangeEvent::scenario(
                        scenario_id,
                        ChangeKind::FunctionalZone,
                        zone.functional_zone_id.0,
                    )
                })
                .collect(),
        )
        .await;
        Ok(inserted.into_iter().map(zone_record).collect())
    }

    async fn put_functional_zone(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        functional_zone_id: FunctionalZoneId,
        input: FunctionalZoneInput,
    ) -> UrbisResult<FunctionalZoneRecord> {
        let tx = self.conn.begin().await?;
        let ctx = self.zone_context(&tx, scenario_id, actor).await?;
        let functional_zone_id: FunctionalZoneId = self
            .current_id(&tx, scenario_id, RowKind::FunctionalZone, functional_zone_id.0)
            .await?;
        let current = self
            .load_scenario_functional_zones(&tx, scenario_id)
            .await?
            .into_iter()
            .find(|zone| zone.functional_zone_id == functional_zone_id)
            .ok_or_else(|| {
                UrbisError::not_found_by_id("scenario functional zone", functional_zone_id.0)
            })?;
        let zone = FunctionalZone {
            functional_zone_id,
            ..self
                .prepare_zone(&tx, &ctx, &input, current.created_at)
                .await?
        };
        let update = Query::update()
            .table(ScenarioFunctionalZones::Table)
            .values([
                (
                    FunctionalZones::FunctionalZoneTypeId,
                    zone.functional_zone_type_id.0.into(),
                ),
                (FunctionalZones::Name, zone.name.clone().into()),
                (
                    FunctionalZones::TerritoryId,
                    zone.territory_id.map(|id| id.0).into(),
                ),
                (FunctionalZones::Geometry, zone.geometry.to_json()?.into()),
                (FunctionalZones::Year, zone.year.into()),
                (FunctionalZones::Source, zone.source.clone().into()),
                (FunctionalZones::Properties, zone.properties.to_string().into()),
                (FunctionalZones::UpdatedAt, zone.updated_at.as_millis().into()),
            ])
            .and_where(Expr::col(FunctionalZones::FunctionalZoneId).eq(functional_zone_id.0))
            .and_where(Expr::col(ScenarioFunctionalZones::ScenarioId).eq(scenario_id.0))
            .to_owned();
        exec(&tx, &update).await?;
        self.maybe_failpoint("put_functional_zone")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::FunctionalZone,
            functional_zone_id.0,
        )])
        .await;
        Ok(zone_record(zone))
    }

    async fn delete_functional_zone(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
        functional_zone_id: FunctionalZoneId,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        self.zone_context(&tx, scenario_id, actor).await?;
        let functional_zone_id: FunctionalZoneId = self
            .current_id(&tx, scenario_id, RowKind::FunctionalZone, functional_zone_id.0)
            .await?;
        let delete = Query::delete()
            .from_table(ScenarioFunctionalZones::Table)
            .and_where(Expr::col(FunctionalZones::FunctionalZoneId).eq(functional_zone_id.0))
            .and_where(Expr::col(ScenarioFunctionalZones::ScenarioId).eq(scenario_id.0))
            .to_owned();
        if exec_count(&tx, &delete).await? == 0 {
            return Err(UrbisError::not_found_by_id(
                "scenario functional zone",
                functional_zone_id.0,
            ));
        }
        self.maybe_failpoint("delete_functional_zone")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::FunctionalZone,
            functional_zone_id.0,
        )])
        .await;
        Ok(())
    }

    async fn delete_functional_zones(
        &self,
        scenario_id: ScenarioId,
        actor: &Actor,
    ) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        self.zone_context(&tx, scenario_id, actor).await?;
        let existing = self.load_scenario_functional_zones(&tx, scenario_id).await?;
        let delete = Query::delete()
            .from_table(ScenarioFunctionalZones::Table)
            .and_where(Expr::col(ScenarioFunctionalZones::ScenarioId).eq(scenario_id.0))
            .to_owned();
        exec(&tx, &delete).await?;
        self.maybe_failpoint("delete_functional_zones")?;
        tx.commit().await?;
        self.publish(
            existing
                .iter()
                .map(|zone| {
                    ChangeEvent::scenario(
                        scenario_id,
                        ChangeKind::FunctionalZone,
                        zone.functional_zone_id.0,
                    )
                })
                .collect(),
        )
        .await;
        Ok(())
    }
}
