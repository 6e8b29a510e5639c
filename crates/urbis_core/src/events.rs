use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{UrbisError, UrbisResult};
use crate::ids::{ScenarioId, TerritoryId};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum EventScope {
    Territory(TerritoryId),
    Scenario(ScenarioId),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ScenarioCreated,
    ScenarioDeleted,
    UrbanObject,
    PhysicalObject,
    ObjectGeometry,
    Service,
    Buffer,
    FunctionalZone,
    IndicatorValue,
    Territory,
}

/// Published once per changed entity after the write commits.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub scope: EventScope,
    pub kind: ChangeKind,
    pub entity_id: i64,
}

impl ChangeEvent {
    pub fn scenario(scenario_id: ScenarioId, kind: ChangeKind, entity_id: i64) -> Self {
        Self {
            scope: EventScope::Scenario(scenario_id),
            kind,
            entity_id,
        }
    }

    pub fn territory(territory_id: TerritoryId, kind: ChangeKind, entity_id: i64) -> Self {
        Self {
            scope: EventScope::Territory(territory_id),
            kind,
            entity_id,
        }
    }
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: ChangeEvent) -> UrbisResult<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopEventSink;

#[async_trait]
impl EventSink for NoopEventSink {
    async fn publish(&self, _event: ChangeEvent) -> UrbisResult<()> {
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel.
#[derive(Clone, Debug)]
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ChangeEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn publish(&self, event: ChangeEvent) -> UrbisResult<()> {
        self.sender
            .send(event)
            .map_err(|err| UrbisError::storage(format!("event channel closed: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_delivers_in_send_order() {
        let (sink, mut receiver) = ChannelEventSink::new();
        let first = ChangeEvent::scenario(ScenarioId(1), ChangeKind::PhysicalObject, 10);
        let second = ChangeEvent::territory(TerritoryId(2), ChangeKind::IndicatorValue, 11);
        sink.publish(first).await.expect("publish");
        sink.publish(second).await.expect("publish");
        assert_eq!(receiver.recv().await, Some(first));
        assert_eq!(receiver.recv().await, Some(second));
    }

    #[tokio::test]
    async fn closed_channel_reports_error() {
        let (sink, receiver) = ChannelEventSink::new();
        drop(receiver);
        let event = ChangeEvent::scenario(ScenarioId(1), ChangeKind::Buffer, 1);
        assert!(sink.publish(event).await.is_err());
    }
}
