use sea_orm::sea_query;
use sea_orm_migration::prelude::Iden;

#[derive(Iden, Clone, Copy)]
pub enum Territories {
    Table,
    TerritoryId,
    ParentId,
    Name,
    Level,
    Geometry,
    CentrePoint,
    IsCity,
}

#[derive(Iden, Clone, Copy)]
pub enum PhysicalObjectFunctions {
    Table,
    FunctionId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum PhysicalObjectTypes {
    Table,
    PhysicalObjectTypeId,
    FunctionId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum ServiceTypes {
    Table,
    ServiceTypeId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum FunctionalZoneTypes {
    Table,
    FunctionalZoneTypeId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum BufferTypes {
    Table,
    BufferTypeId,
    Name,
}

#[derive(Iden, Clone, Copy)]
pub enum DefaultBufferValues {
    Table,
    DefaultBufferValueId,
    BufferTypeId,
    PhysicalObjectTypeId,
    ServiceTypeId,
    BufferValue,
}

#[derive(Iden, Clone, Copy)]
pub enum PhysicalObjects {
    Table,
    PhysicalObjectId,
    PhysicalObjectTypeId,
    Name,
    Properties,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum ObjectGeometries {
    Table,
    ObjectGeometryId,
    TerritoryId,
    Geometry,
    CentrePoint,
    Address,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Services {
    Table,
    ServiceId,
    ServiceTypeId,
    Name,
    Capacity,
    Properties,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum UrbanObjects {
    Table,
    UrbanObjectId,
    PhysicalObjectId,
    ObjectGeometryId,
    ServiceId,
}

#[derive(Iden, Clone, Copy)]
pub enum Buffers {
    Table,
    BufferTypeId,
    UrbanObjectId,
    Geometry,
    IsCustom,
}

#[derive(Iden, Clone, Copy)]
pub enum FunctionalZones {
    Table,
    FunctionalZoneId,
    FunctionalZoneTypeId,
    Name,
    TerritoryId,
    Geometry,
    Year,
    Source,
    Properties,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum Projects {
    Table,
    ProjectId,
    UserId,
    Name,
    RegionId,
    IsRegional,
    IsPublic,
    ContextTerritories,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum ProjectTerritories {
    Table,
    ProjectId,
    Geometry,
    CentrePoint,
}

#[derive(Iden, Clone, Copy)]
pub enum Scenarios {
    Table,
    ScenarioId,
    ProjectId,
    ParentId,
    Name,
    IsBased,
    IsAttached,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioPhysicalObjects {
    Table,
    ScenarioId,
    PublicPhysicalObjectId,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioObjectGeometries {
    Table,
    ScenarioId,
    PublicObjectGeometryId,
    IsCut,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioServices {
    Table,
    ScenarioId,
    PublicServiceId,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioUrbanObjects {
    Table,
    UrbanObjectId,
    ScenarioId,
    PublicUrbanObjectId,
    PhysicalObjectId,
    PublicPhysicalObjectId,
    ObjectGeometryId,
    PublicObjectGeometryId,
    ServiceId,
    PublicServiceId,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioBuffers {
    Table,
    BufferTypeId,
    UrbanObjectId,
    Geometry,
    IsCustom,
    IsCut,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioFunctionalZones {
    Table,
    ScenarioId,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioRowAliases {
    Table,
    ScenarioId,
    Kind,
    OldId,
    NewId,
}

#[derive(Iden, Clone, Copy)]
pub enum Indicators {
    Table,
    IndicatorId,
    ParentId,
    NameFull,
    NameShort,
    MeasurementUnit,
    Level,
    ListLabel,
    ServiceTypeId,
    PhysicalObjectTypeId,
}

#[derive(Iden, Clone, Copy)]
pub enum IndicatorValues {
    Table,
    IndicatorValueId,
    IndicatorId,
    TerritoryId,
    DateType,
    DateValue,
    ValueType,
    InformationSource,
    Value,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden, Clone, Copy)]
pub enum TerritoryIndicatorBinds {
    Table,
    IndicatorId,
    TerritoryId,
    Level,
    MinValue,
    MaxValue,
}

#[derive(Iden, Clone, Copy)]
pub enum ScenarioIndicatorValues {
    Table,
    IndicatorValueId,
    IndicatorId,
    ScenarioId,
    TerritoryId,
    Value,
    ValueType,
    InformationSource,
    Properties,
    CreatedAt,
    UpdatedAt,
}
