use std::collections::HashSet;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, ExprTrait, Order, Query};
use sea_orm::{ConnectionTrait, TransactionTrait};

use crate::db::*;
use crate::store::{
    ScenarioContext, UrbisStore, exec, insert_returning_id, push_values, query_all,
    read_scenario, scenarios_select,
};
use urbis_core::error::INVALID_VALUE;
use urbis_core::geometry::{KindRule, buffer_ring, clip_to, intersects, to_multi_polygon, within};
use urbis_core::*;

const BASED_SCENARIO_NAME: &str = "base scenario";

impl UrbisStore {
    async fn insert_scenario<C: ConnectionTrait>(
        &self,
        conn: &C,
        project_id: ProjectId,
        parent_id: Option<ScenarioId>,
        name: &str,
        is_based: bool,
        is_attached: bool,
    ) -> UrbisResult<Scenario> {
        if name.trim().is_empty() {
            return Err(UrbisError::invalid("scenario name must not be empty"));
        }
        let now = Timestamp::now();
        let mut insert = Query::insert();
        insert.into_table(Scenarios::Table).columns([
            Scenarios::ProjectId,
            Scenarios::ParentId,
            Scenarios::Name,
            Scenarios::IsBased,
            Scenarios::IsAttached,
            Scenarios::CreatedAt,
            Scenarios::UpdatedAt,
        ]);
        push_values(
            &mut insert,
            vec![
                project_id.0.into(),
                parent_id.map(|id| id.0).into(),
                name.to_string().into(),
                is_based.into(),
                is_attached.into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        let scenario_id = insert_returning_id(conn, insert, Scenarios::ScenarioId).await?;
        Ok(Scenario {
            scenario_id: ScenarioId(scenario_id),
            project_id,
            parent_id,
            name: name.to_string(),
            is_based,
            is_attached,
            created_at: now,
            updated_at: now,
        })
    }

    async fn context_territories<C: ConnectionTrait>(
        &self,
        conn: &C,
        region_id: TerritoryId,
        territory: &Geometry,
    ) -> UrbisResult<Vec<TerritoryId>> {
        let tree = self.territory_tree(conn).await?;
        let subtree = tree.subtree(region_id, false);
        let Some(city_level) = subtree
            .iter()
            .filter_map(|id| tree.node(*id))
            .filter(|node| node.is_city)
            .map(|node| node.level)
            .max()
        else {
            return Ok(Vec::new());
        };
        let candidates: Vec<TerritoryId> = subtree
            .iter()
            .copied()
            .filter(|id| tree.node(*id).is_some_and(|node| node.level == city_level - 1))
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let footprint = to_multi_polygon(territory);
        let ring = to_multi_polygon(&buffer_ring(
            territory,
            self.geometry.to_units(self.geometry.context_buffer_meters),
        )?);
        Ok(self
            .load_territories(conn, &candidates)
            .await?
            .into_iter()
            .filter(|t| intersects(&t.geometry, &footprint) || intersects(&t.geometry, &ring))
            .map(|t| t.territory_id)
            .collect())
    }

    async fn crop_border_objects<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
    ) -> UrbisResult<usize> {
        let Some(boundary) = ctx.boundary() else {
            return Ok(0);
        };
        let tree = self.territory_tree(conn).await?;
        let territories = tree.subtree(ctx.project.region_id, false);
        let min_share = self.geometry.crop_min_share;
        let crossing = self
            .base_views(
                conn,
                &territories,
                |object| {
                    let geometry = &object.object_geometry.geometry;
                    geometry.kind() == GeometryKind::Area
                        && intersects(geometry, &boundary)
                        && !within(geometry, &boundary)
                },
                &HashSet::new(),
                &ResolveQuery::new(),
            )
            .await?;
        let scenario_id = ctx.scenario_id();
        let now = Timestamp::now();
        let mut cropped = 0;
        for view in crossing {
            let base = &view.object_geometry.item;
            let clipped = clip_to(&base.geometry, &boundary)?;
            let total = base.geometry.area();
            if clipped.geometry.is_empty() || total <= 0.0 {
                continue;
            }
            if clipped.geometry.area() / total < min_share {
                continue;
            }
            let centre_point = clipped
                .geometry
                .centroid()
                .unwrap_or_else(|| base.centre_point.clone());
            let geometry = ObjectGeometry {
                object_geometry_id: ObjectGeometryId(0),
                territory_id: base.territory_id,
                geometry: clipped.geometry,
                centre_point,
                address: base.address.clone(),
                is_cut: true,
                created_at: now,
                updated_at: now,
            };
            let local = self
                .insert_local_geometries(conn, scenario_id, &[(Some(base.object_geometry_id.0), geometry)])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| UrbisError::internal("geometry insert returned no row"))?;
            let pointers = LinkPointers {
                physical_object: Pointer::Base(view.physical_object.item.physical_object_id),
                object_geometry: Pointer::Local(local.object_geometry_id),
                service: view
                    .service
                    .as_ref()
                    .map_or(Pointer::None, |s| Pointer::Base(s.item.service_id)),
            };
            let link_id = self
                .claim_base_object(conn, scenario_id, view.urban_object_id, pointers)
                .await?;
            self.adopt_base_buffers(conn, view.urban_object_id, link_id, None)
                .await?;
            cropped += 1;
        }
        Ok(cropped)
    }

    async fn insert_project<C: ConnectionTrait>(
        &self,
        conn: &C,
        actor: &Actor,
        input: &NewProject,
        context_territories: &[TerritoryId],
    ) -> UrbisResult<Project> {
        let now = Timestamp::now();
        let mut insert = Query::insert();
        insert.into_table(Projects::Table).columns([
            Projects::UserId,
            Projects::Name,
            Projects::RegionId,
            Projects::IsRegional,
            Projects::IsPublic,
            Projects::ContextTerritories,
            Projects::CreatedAt,
            Projects::UpdatedAt,
        ]);
        push_values(
            &mut insert,
            vec![
                actor.id.0.clone().into(),
                input.name.clone().into(),
                input.region_id.0.into(),
                input.is_regional.into(),
                input.is_public.into(),
                serde_json::to_string(context_territories)?.into(),
                now.as_millis().into(),
                now.as_millis().into(),
            ],
        )?;
        let project_id = ProjectId(insert_returning_id(conn, insert, Projects::ProjectId).await?);
        let territory = if input.is_regional {
            None
        } else {
            input.territory.clone()
        };
        if let Some(geometry) = &territory {
            let centre_point = geometry
                .centroid()
                .ok_or_else(|| UrbisError::invalid("project territory has no centroid"))?;
            let mut insert = Query::insert();
            insert.into_table(ProjectTerritories::Table).columns([
                ProjectTerritories::ProjectId,
                ProjectTerritories::Geometry,
                ProjectTerritories::CentrePoint,
            ]);
            push_values(
                &mut insert,
                vec![
                    project_id.0.into(),
                    geometry.to_json()?.into(),
                    centre_point.to_json()?.into(),
                ],
            )?;
            exec(conn, &insert).await?;
        }
        Ok(Project {
            project_id,
            user_id: actor.id.clone(),
            name: input.name.clone(),
            region_id: input.region_id,
            is_regional: input.is_regional,
            is_public: input.is_public,
            territory,
            context_territories: context_territories.to_vec(),
            created_at: now,
            updated_at: now,
        })
    }

    async fn release_children<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
    ) -> UrbisResult<()> {
        let scenario_id = ctx.scenario_id();
        let children = scenarios_select()
            .and_where(Expr::col(Scenarios::ParentId).eq(scenario_id.0))
            .order_by(Scenarios::ScenarioId, Order::Asc)
            .to_owned();
        for row in query_all(conn, &children).await? {
            let child = read_scenario(&row)?;
            if child.is_attached {
                self.materialize_rows(conn, ctx.source, child.scenario_id)
                    .await?;
            }
        }
        let orphan = Query::update()
            .table(Scenarios::Table)
            .values([(Scenarios::ParentId, Option::<i64>::None.into())])
            .and_where(Expr::col(Scenarios::ParentId).eq(scenario_id.0))
            .to_owned();
        exec(conn, &orphan).await
    }
}

#[async_trait]
impl ScenarioApi for UrbisStore {
    async fn create_project(
        &self,
        actor: &Actor,
        input: NewProject,
    ) -> UrbisResult<CreatedProject> {
        if input.name.trim().is_empty() {
            return Err(UrbisError::invalid("project name must not be empty"));
        }
        let tx = self.conn.begin().await?;
        let region = self.require_territory(&tx, input.region_id).await?;
        let context_territories = if input.is_regional {
            Vec::new()
        } else {
            let territory = input.territory.as_ref().ok_or_else(|| {
                UrbisError::invalid_with_code(
                    INVALID_VALUE,
                    "a project outside the regional scope needs a territory",
                )
            })?;
            territory.validate(KindRule::Only(GeometryKind::Area))?;
            if !within(territory, &to_multi_polygon(&region.geometry)) {
                return Err(UrbisError::invalid_with_code(
                    INVALID_VALUE,
                    format!(
                        "project territory must lie within region {}",
                        region.territory_id
                    ),
                ));
            }
            self.context_territories(&tx, region.territory_id, territory)
                .await?
        };
        let project = self
            .insert_project(&tx, actor, &input, &context_territories)
            .await?;
        let parent = if input.is_regional {
            None
        } else {
            self.regional_based_scenario(&tx, input.region_id).await?
        };
        let based_scenario = self
            .insert_scenario(
                &tx,
                project.project_id,
                parent,
                BASED_SCENARIO_NAME,
                true,
                false,
            )
            .await?;
        let ctx = ScenarioContext {
            source: based_scenario.scenario_id,
            scenario: based_scenario.clone(),
            project: project.clone(),
        };
        let cropped = self.crop_border_objects(&tx, &ctx).await?;
        log::debug!(
            "project {}: based scenario {}, {} context territories, {} border objects cropped",
            project.project_id,
            based_scenario.scenario_id,
            context_territories.len(),
            cropped
        );
        self.maybe_failpoint("create_project")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            based_scenario.scenario_id,
            ChangeKind::ScenarioCreated,
            based_scenario.scenario_id.0,
        )])
        .await;
        Ok(CreatedProject {
            project,
            based_scenario,
        })
    }

    async fn get_project(
        &self,
        actor: Option<&Actor>,
        project_id: ProjectId,
    ) -> UrbisResult<Project> {
        let project = self
            .load_project(&self.conn, project_id)
            .await?
            .ok_or_else(|| UrbisError::not_found_by_id("project", project_id.0))?;
        self.check_access(&project, actor, Access::Read)?;
        Ok(project)
    }

    async fn get_scenario(
        &self,
        actor: Option<&Actor>,
        scenario_id: ScenarioId,
    ) -> UrbisResult<Scenario> {
        let ctx = self
            .load_context(&self.conn, scenario_id, actor, Access::Read)
            .await?;
        Ok(ctx.scenario)
    }

    async fn list_scenarios(
        &self,
        actor: Option<&Actor>,
        project_id: ProjectId,
    ) -> UrbisResult<Vec<Scenario>> {
        self.get_project(actor, project_id).await?;
        let select = scenarios_select()
            .and_where(Expr::col(Scenarios::ProjectId).eq(project_id.0))
            .order_by(Scenarios::ScenarioId, Order::Asc)
            .to_owned();
        query_all(&self.conn, &select)
            .await?
            .iter()
            .map(read_scenario)
            .collect()
    }

    async fn fork_scenario(
        &self,
        actor: &Actor,
        parent_id: ScenarioId,
        name: String,
    ) -> UrbisResult<Scenario> {
        let tx = self.conn.begin().await?;
        let ctx = self
            .load_context(&tx, parent_id, Some(actor), Access::Write)
            .await?;
        let scenario = self
            .insert_scenario(
                &tx,
                ctx.project.project_id,
                Some(parent_id),
                &name,
                false,
                true,
            )
            .await?;
        self.maybe_failpoint("fork_scenario")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario.scenario_id,
            ChangeKind::ScenarioCreated,
            scenario.scenario_id.0,
        )])
        .await;
        Ok(scenario)
    }

    async fn copy_scenario(
        &self,
        actor: &Actor,
        source_id: ScenarioId,
        name: String,
    ) -> UrbisResult<Scenario> {
        let tx = self.conn.begin().await?;
        let ctx = self
            .load_context(&tx, source_id, Some(actor), Access::Write)
            .await?;
        let scenario = self
            .insert_scenario(
                &tx,
                ctx.project.project_id,
                ctx.scenario.parent_id,
                &name,
                false,
                false,
            )
            .await?;
        self.copy_scenario_rows(&tx, ctx.source, scenario.scenario_id)
            .await?;
        self.maybe_failpoint("copy_scenario")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario.scenario_id,
            ChangeKind::ScenarioCreated,
            scenario.scenario_id.0,
        )])
        .await;
        Ok(scenario)
    }

    async fn delete_scenario(&self, actor: &Actor, scenario_id: ScenarioId) -> UrbisResult<()> {
        let tx = self.conn.begin().await?;
        let ctx = self
            .load_context(&tx, scenario_id, Some(actor), Access::Write)
            .await?;
        if ctx.scenario.is_based {
            return Err(UrbisError::InvalidBaseScenario {
                scenario_id: scenario_id.0,
            });
        }
        self.release_children(&tx, &ctx).await?;
        let delete = Query::delete()
            .from_table(Scenarios::Table)
            .and_where(Expr::col(Scenarios::ScenarioId).eq(scenario_id.0))
            .to_owned();
        exec(&tx, &delete).await?;
        self.maybe_failpoint("delete_scenario")?;
        tx.commit().await?;
        self.publish(vec![ChangeEvent::scenario(
            scenario_id,
            ChangeKind::ScenarioDeleted,
            scenario_id.0,
        )])
        .await;
        Ok(())
    }
}
