use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::{EventSink, UrbisConfig, UrbisResult, UrbisStore};

const DEFAULT_DB_NAME: &str = "urbis.sqlite";

pub fn default_sqlite_path(base: &Path) -> PathBuf {
    base.join(DEFAULT_DB_NAME)
}

pub fn load_or_init_config(base: &Path) -> UrbisResult<UrbisConfig> {
    UrbisConfig::load_or_init(base, &default_sqlite_path(base))
}

pub async fn open_store(base: &Path, sink: Option<Arc<dyn EventSink>>) -> UrbisResult<UrbisStore> {
    let config = load_or_init_config(base)?;
    let store = UrbisStore::connect(&config, base).await?;
    Ok(match sink {
        Some(sink) => store.with_event_sink(sink),
        None => store,
    })
}

#[cfg(test)]
mod tests {
    use super::{default_sqlite_path, load_or_init_config, open_store};
    use crate::{BaseLayerApi, ChangeEvent, ChangeKind, ChannelEventSink, Geometry, NewTerritory};
    use std::sync::Arc;
    use tempfile::tempdir;

    #[tokio::test]
    async fn opened_store_publishes_base_layer_changes() {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let config = load_or_init_config(base).expect("config");
        assert_eq!(config.backend_name(), "sqlite");

        let (sink, mut events) = ChannelEventSink::new();
        let store = open_store(base, Some(Arc::new(sink))).await.expect("open store");
        assert!(default_sqlite_path(base).exists());
        let country = store
            .add_territory(NewTerritory {
                parent_id: None,
                name: "country".into(),
                geometry: Geometry::rect(0.0, 0.0, 1.0, 1.0),
                centre_point: None,
                is_city: false,
            })
            .await
            .expect("territory");
        assert_eq!(country.level, 1);
        assert_eq!(
            events.try_recv().ok(),
            Some(ChangeEvent::territory(
                country.territory_id,
                ChangeKind::Territory,
                country.territory_id.0
            ))
        );
    }
}
