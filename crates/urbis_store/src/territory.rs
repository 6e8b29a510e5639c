use std::collections::{HashMap, HashSet, VecDeque};

use geo::MultiPolygon;
use sea_orm::ConnectionTrait;
use sea_orm::sea_query::{Expr, ExprTrait, Order, Query};

use crate::db::Territories;
use crate::store::{ScenarioContext, UrbisStore, col_name, query_all, query_one, read_geometry};
use urbis_core::geometry::within;
use urbis_core::{ObjectGeometry, Territory, TerritoryId, UrbisError, UrbisResult};

#[derive(Clone, Copy, Debug)]
pub(crate) struct TerritoryNode {
    pub territory_id: TerritoryId,
    pub parent_id: Option<TerritoryId>,
    pub level: i32,
    pub is_city: bool,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct TerritoryTree {
    nodes: HashMap<TerritoryId, TerritoryNode>,
    children: HashMap<TerritoryId, Vec<TerritoryId>>,
}

impl TerritoryTree {
    fn new(nodes: Vec<TerritoryNode>) -> Self {
        let mut children: HashMap<TerritoryId, Vec<TerritoryId>> = HashMap::new();
        for node in &nodes {
            if let Some(parent) = node.parent_id {
                children.entry(parent).or_default().push(node.territory_id);
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }
        Self {
            nodes: nodes.into_iter().map(|node| (node.territory_id, node)).collect(),
            children,
        }
    }

    pub fn node(&self, territory_id: TerritoryId) -> Option<&TerritoryNode> {
        self.nodes.get(&territory_id)
    }

    pub fn subtree(&self, root: TerritoryId, cities_only: bool) -> Vec<TerritoryId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            if !cities_only || node.is_city {
                out.push(current);
            }
            if let Some(children) = self.children.get(&current) {
                queue.extend(children.iter().copied());
            }
        }
        out
    }

    pub fn children(&self, territory_id: TerritoryId) -> &[TerritoryId] {
        self.children
            .get(&territory_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn ancestor_at_level(&self, territory_id: TerritoryId, level: i32) -> Option<TerritoryId> {
        let mut current = self.nodes.get(&territory_id)?;
        let mut steps = 0;
        loop {
            if current.level == level {
                return Some(current.territory_id);
            }
            if current.level < level || steps > self.nodes.len() {
                return None;
            }
            current = self.nodes.get(&current.parent_id?)?;
            steps += 1;
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Reach {
    pub territories: Vec<TerritoryId>,
    territory_set: HashSet<TerritoryId>,
    pub boundary: Option<MultiPolygon<f64>>,
}

impl Reach {
    pub fn admits(&self, geometry: &ObjectGeometry) -> bool {
        self.territory_set.contains(&geometry.territory_id)
            && self
                .boundary
                .as_ref()
                .is_none_or(|boundary| within(&geometry.geometry, boundary))
    }
}

impl UrbisStore {
    pub(crate) async fn territory_tree<C: ConnectionTrait>(
        &self,
        conn: &C,
    ) -> UrbisResult<TerritoryTree> {
        let select = Query::select()
            .from(Territories::Table)
            .columns([
                Territories::TerritoryId,
                Territories::ParentId,
                Territories::Level,
                Territories::IsCity,
            ])
            .to_owned();
        let mut nodes = Vec::new();
        for row in query_all(conn, &select).await? {
            let parent_id: Option<i64> = row.try_get("", &col_name(Territories::ParentId))?;
            nodes.push(TerritoryNode {
                territory_id: TerritoryId(row.try_get("", &col_name(Territories::TerritoryId))?),
                parent_id: parent_id.map(TerritoryId),
                level: row.try_get("", &col_name(Territories::Level))?,
                is_city: row.try_get("", &col_name(Territories::IsCity))?,
            });
        }
        Ok(TerritoryTree::new(nodes))
    }

    pub(crate) async fn load_territory<C: ConnectionTrait>(
        &self,
        conn: &C,
        territory_id: TerritoryId,
    ) -> UrbisResult<Option<Territory>> {
        let select = territory_select()
            .and_where(Expr::col(Territories::TerritoryId).eq(territory_id.0))
            .to_owned();
        query_one(conn, &select)
            .await?
            .map(|row| read_territory(&row))
            .transpose()
    }

    pub(crate) async fn require_territory<C: ConnectionTrait>(
        &self,
        conn: &C,
        territory_id: TerritoryId,
    ) -> UrbisResult<Territory> {
        self.load_territory(conn, territory_id)
            .await?
            .ok_or_else(|| UrbisError::not_found_by_id("territory", territory_id.0))
    }

    pub(crate) async fn load_territories<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[TerritoryId],
    ) -> UrbisResult<Vec<Territory>> {
        let raw: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let mut out = Vec::with_capacity(raw.len());
        for chunk in raw.chunks(self.limits.max_in_params) {
            let select = territory_select()
                .and_where(Expr::col(Territories::TerritoryId).is_in(chunk.iter().copied()))
                .order_by(Territories::TerritoryId, Order::Asc)
                .to_owned();
            for row in query_all(conn, &select).await? {
                out.push(read_territory(&row)?);
            }
        }
        Ok(out)
    }

    pub(crate) async fn reach<C: ConnectionTrait>(
        &self,
        conn: &C,
        ctx: &ScenarioContext,
        cities_only: bool,
    ) -> UrbisResult<Reach> {
        let tree = self.territory_tree(conn).await?;
        let territories = tree.subtree(ctx.project.region_id, cities_only);
        log::debug!(
            "scenario {} reaches {} territories",
            ctx.scenario_id(),
            territories.len()
        );
        Ok(Reach {
            territory_set: territories.iter().copied().collect(),
            territories,
            boundary: ctx.boundary(),
        })
    }
}

fn territory_select() -> sea_orm::sea_query::SelectStatement {
    Query::select()
        .from(Territories::Table)
        .columns([
            Territories::TerritoryId,
            Territories::ParentId,
            Territories::Name,
            Territories::Level,
            Territories::Geometry,
            Territories::CentrePoint,
            Territories::IsCity,
        ])
        .to_owned()
}

pub(crate) fn read_territory(row: &sea_orm::QueryResult) -> UrbisResult<Territory> {
    let parent_id: Option<i64> = row.try_get("", &col_name(Territories::ParentId))?;
    Ok(Territory {
        territory_id: TerritoryId(row.try_get("", &col_name(Territories::TerritoryId))?),
        parent_id: parent_id.map(TerritoryId),
        name: row.try_get("", &col_name(Territories::Name))?,
        level: row.try_get("", &col_name(Territories::Level))?,
        geometry: read_geometry(row, &col_name(Territories::Geometry))?,
        centre_point: read_geometry(row, &col_name(Territories::CentrePoint))?,
        is_city: row.try_get("", &col_name(Territories::IsCity))?,
    })
}
