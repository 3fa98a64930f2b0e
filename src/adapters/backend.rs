//! Builds the persistence backend selected in `[incremental]`.

use crate::adapters::disk_store::DiskStore;
use crate::adapters::store_recorder::StoreRecorder;
use crate::domain::error::IncrementalError;
use crate::domain::orchestrator::Backend;
use crate::domain::settings::BackendSettings;
use crate::ports::persist_port::PersistStore;
use crate::ports::summary_port::SummaryPort;
use std::rc::Rc;
use tracing::info;

type StoreHandles = (Rc<dyn PersistStore>, Option<Rc<dyn SummaryPort>>);

/// Open the configured store. Document stores also act as the summary sink.
pub fn open_store(settings: &BackendSettings) -> Result<StoreHandles, IncrementalError> {
    info!(backend = settings.kind(), strategy_id = settings.strategy_id(), "opening persistence backend");

    match settings {
        BackendSettings::Disk {
            persist_folder,
            strategy_id,
        } => {
            let store: Rc<dyn PersistStore> = Rc::new(DiskStore::new(persist_folder, strategy_id));
            Ok((store, None))
        }
        #[cfg(feature = "sqlite")]
        BackendSettings::Sqlite {
            path,
            pool_size,
            strategy_id,
        } => {
            use crate::adapters::sqlite_store::SqliteDocumentStore;
            let document = Rc::new(SqliteDocumentStore::open(path, *pool_size, strategy_id)?);
            let store: Rc<dyn PersistStore> = document.clone();
            let sink: Rc<dyn SummaryPort> = document;
            Ok((store, Some(sink)))
        }
        #[cfg(feature = "postgres")]
        BackendSettings::Postgres {
            connection_string,
            strategy_id,
        } => {
            use crate::adapters::postgres_store::PostgresDocumentStore;
            let document = Rc::new(PostgresDocumentStore::connect(connection_string, strategy_id)?);
            let store: Rc<dyn PersistStore> = document.clone();
            let sink: Rc<dyn SummaryPort> = document;
            Ok((store, Some(sink)))
        }
        #[allow(unreachable_patterns)]
        other => Err(IncrementalError::ConfigInvalid {
            section: "incremental".into(),
            key: "recorder".into(),
            reason: format!("{} support is not compiled into this build", other.kind()),
        }),
    }
}

/// Open the store and a recorder over it.
pub fn open_backend(
    settings: &BackendSettings,
    risk_free_rate: f64,
) -> Result<Backend, IncrementalError> {
    let (store, summary) = open_store(settings)?;
    let mut recorder = StoreRecorder::open(store.clone(), settings.strategy_id())?;
    if let Some(sink) = summary {
        recorder = recorder.with_summary(sink, risk_free_rate);
    }
    Ok(Backend {
        store,
        recorder: Box::new(recorder),
    })
}
