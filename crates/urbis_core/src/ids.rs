use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

macro_rules! int_id {
    ($($name:ident),+ $(,)?) => {
        $(
            #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
            #[serde(transparent)]
            pub struct $name(pub i64);

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }

            impl From<i64> for $name {
                fn from(value: i64) -> Self {
                    Self(value)
                }
            }
        )+
    };
}

int_id!(
    TerritoryId,
    ProjectId,
    ScenarioId,
    UrbanObjectId,
    PhysicalObjectId,
    ObjectGeometryId,
    ServiceId,
    PhysicalObjectTypeId,
    PhysicalObjectFunctionId,
    ServiceTypeId,
    FunctionalZoneId,
    FunctionalZoneTypeId,
    BufferTypeId,
    IndicatorId,
    IndicatorValueId,
);

#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The acting user supplied by the caller with every request.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub is_superuser: bool,
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            is_superuser: false,
        }
    }

    pub fn superuser(id: impl Into<String>) -> Self {
        Self {
            id: UserId(id.into()),
            is_superuser: true,
        }
    }
}

/// Unix milliseconds.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self((nanos / 1_000_000) as i64)
    }

    pub fn as_millis(self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{ScenarioId, Timestamp};

    #[test]
    fn ids_serialize_as_bare_integers() {
        let json = serde_json::to_string(&ScenarioId(12)).expect("serialize");
        assert_eq!(json, "12");
        let back: ScenarioId = serde_json::from_str("12").expect("deserialize");
        assert_eq!(back, ScenarioId(12));
    }

    #[test]
    fn timestamp_is_after_2020() {
        assert!(Timestamp::now().as_millis() > 1_577_836_800_000);
    }
}
